//! Write-once responses.
//!
//! [`ResponseEmitter`] writes at most one body per request. Every terminating
//! write unwinds to the dispatch boundary right after the bytes reach the
//! [`ResponseWriter`], so no handler code runs after it, however deep in the
//! call stack the write happened.

mod image;
mod writer;

pub use self::image::{DEFAULT_JPEG_QUALITY, ImageEncoding};
pub use writer::{BufferedWriter, ResponseWriter};

#[cfg(test)]
pub(crate) use writer::MockResponseWriter;

use crate::terminate::terminate;
use ::image::DynamicImage;
use cookie::Cookie;
use http::{HeaderName, HeaderValue, StatusCode, header};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{error, warn};

const ALLOW_CREDENTIALS: &str = "true";
const ALLOW_METHODS: &str = "GET, POST, PUT, PATCH, DELETE, OPTIONS";
const ALLOW_HEADERS: &str = "Origin, No-Cache, X-Requested-With, If-Modified-Since, Pragma, Last-Modified, \
                             Cache-Control, Expires, Content-Type, X-E4M-With";

const JSON_CONTENT_TYPE: &str = "application/json";
const ENCODE_FAILURE: &[u8] = br#"{"code":500,"data":null,"message":"failed to encode response"}"#;

/// The `{code, data, message}` body of every structured response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T = Value> {
    pub code: i32,
    pub data: T,
    pub message: String,
}

impl<T> Envelope<T> {
    pub fn new(code: i32, data: T, message: impl Into<String>) -> Self {
        Self { code, data, message: message.into() }
    }
}

/// Whether the response has been written, and the last status set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseState {
    written: bool,
    status: Option<StatusCode>,
}

impl ResponseState {
    pub fn is_written(&self) -> bool {
        self.written
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }
}

/// Called with the body and the last status after a terminating write.
pub type WriteCallback = Box<dyn FnMut(&[u8], Option<StatusCode>) + Send>;

pub struct ResponseEmitter<W = BufferedWriter> {
    writer: W,
    state: ResponseState,
    callback: Option<WriteCallback>,
}

impl<W: fmt::Debug> fmt::Debug for ResponseEmitter<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseEmitter")
            .field("writer", &self.writer)
            .field("state", &self.state)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

impl<W: ResponseWriter> ResponseEmitter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, state: ResponseState::default(), callback: None }
    }

    pub fn state(&self) -> ResponseState {
        self.state
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn into_writer(self) -> W {
        self.writer
    }

    /// Registers the hook run after every terminating write.
    pub fn on_write(&mut self, callback: impl FnMut(&[u8], Option<StatusCode>) + Send + 'static) {
        self.callback = Some(Box::new(callback));
    }

    /// Sets the HTTP status. Ignored once the body has been written.
    pub fn set_status(&mut self, status: StatusCode) {
        if self.state.written {
            warn!(%status, "status set after the response was written, ignored");
            return;
        }
        self.writer.write_status(status);
        self.state.status = Some(status);
    }

    /// Replaces header `name`. Invalid names or values are logged and skipped,
    /// and so is any call once the body has been written.
    pub fn set_header(&mut self, name: &str, value: &str) {
        if self.state.written {
            warn!(name, "header set after the response was written, ignored");
            return;
        }
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => self.writer.set_header(name, value),
            _ => warn!(name, value, "invalid response header, skipped"),
        }
    }

    /// Adds a `Set-Cookie` for `name` with path `/`, neither `Secure` nor
    /// `HttpOnly`. Ignored once the body has been written.
    pub fn set_cookie(&mut self, name: &str, value: &str) {
        if self.state.written {
            warn!(name, "cookie set after the response was written, ignored");
            return;
        }
        let cookie = Cookie::build((name, value)).path("/").secure(false).http_only(false).build();
        match HeaderValue::try_from(cookie.to_string()) {
            Ok(value) => self.writer.append_header(header::SET_COOKIE, value),
            Err(e) => warn!(name, cause = %e, "invalid cookie, skipped"),
        }
    }

    /// Writes `data` and ends the request.
    pub fn write_raw(&mut self, data: impl AsRef<[u8]>) -> ! {
        self.emit(data.as_ref(), true);
        terminate()
    }

    /// Writes `data` without ending the request or running the write hook.
    pub fn write_raw_no_terminate(&mut self, data: impl AsRef<[u8]>, status: Option<StatusCode>) {
        if let Some(status) = status {
            self.set_status(status);
        }
        self.emit(data.as_ref(), false);
    }

    /// Writes `payload` as an [`Envelope`] and ends the request.
    ///
    /// If the payload cannot be serialized, a 500 envelope describing the
    /// failure is written instead.
    pub fn write_envelope<T: Serialize + ?Sized>(&mut self, payload: &T, message: &str, code: i32) -> ! {
        if self.state.written {
            warn!(code, "response already written, dropping the envelope");
            terminate()
        }
        let body = self.encode(payload, message, code);
        self.write_raw(body)
    }

    /// Writes an error envelope whose data is `extra`, or `null` when empty.
    ///
    /// Does not end the request; see [`write_error_and_terminate`](Self::write_error_and_terminate).
    pub fn write_error(&mut self, message: &str, code: i32, extra: impl IntoIterator<Item = Value>) {
        if self.state.written {
            warn!(code, message, "response already written, dropping the error envelope");
            return;
        }
        let body = self.encode_error(message, code, extra);
        self.emit(&body, true);
    }

    pub fn write_error_and_terminate(&mut self, message: &str, code: i32, extra: impl IntoIterator<Item = Value>) -> ! {
        self.write_error(message, code, extra);
        terminate()
    }

    /// Writes a code `0` envelope with no data; the message defaults to
    /// `"success"`.
    pub fn write_success(&mut self, message: Option<&str>) -> ! {
        self.write_envelope(&Value::Null, message.unwrap_or("success"), 0)
    }

    /// Writes a code `0` envelope carrying `payload` and an empty message.
    pub fn write_data<T: Serialize + ?Sized>(&mut self, payload: &T) -> ! {
        self.write_envelope(payload, "", 0)
    }

    /// Encodes `image` and ends the request.
    ///
    /// An encoding failure is answered with a 500 error envelope.
    pub fn write_image(&mut self, image: &DynamicImage, encoding: ImageEncoding) -> ! {
        if self.state.written {
            warn!("response already written, dropping the image");
            terminate()
        }
        match encoding.encode(image) {
            Ok(bytes) => {
                self.writer.set_header(header::CONTENT_TYPE, HeaderValue::from_static(encoding.content_type()));
                self.write_raw(bytes)
            }
            Err(e) => {
                error!(cause = %e, "failed to encode image response");
                self.set_status(StatusCode::INTERNAL_SERVER_ERROR);
                self.write_error_and_terminate(&format!("failed to encode image: {e}"), 500, [])
            }
        }
    }

    fn encode_error(&mut self, message: &str, code: i32, extra: impl IntoIterator<Item = Value>) -> Vec<u8> {
        let extra = extra.into_iter().collect::<Vec<_>>();
        let data = if extra.is_empty() { Value::Null } else { Value::Array(extra) };
        self.encode(&data, message, code)
    }

    fn encode<T: Serialize + ?Sized>(&mut self, payload: &T, message: &str, code: i32) -> Vec<u8> {
        self.writer.set_header(header::CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));

        match serde_json::to_vec(&Envelope::new(code, payload, message)) {
            Ok(body) => body,
            Err(e) => {
                error!(cause = %e, "failed to encode response envelope");
                self.set_status(StatusCode::INTERNAL_SERVER_ERROR);
                let message = format!("failed to encode response: {e}");
                serde_json::to_vec(&Envelope::new(500, Value::Null, message)).unwrap_or_else(|_| ENCODE_FAILURE.to_vec())
            }
        }
    }

    fn emit(&mut self, data: &[u8], notify: bool) {
        if self.state.written {
            warn!(len = data.len(), "response already written, dropping the second body");
            return;
        }

        self.writer.set_header(header::ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static(ALLOW_CREDENTIALS));
        self.writer.set_header(header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOW_METHODS));
        self.writer.set_header(header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(ALLOW_HEADERS));

        if let Err(e) = self.writer.write(data) {
            error!(cause = %e, len = data.len(), "failed to write response");
        }
        self.state.written = true;

        if notify && let Some(callback) = self.callback.as_mut() {
            callback(data, self.state.status);
        }
    }
}
