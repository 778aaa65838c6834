use bytes::{Bytes, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue, Response, StatusCode};
use http_body_util::Full;
use std::io;

/// The transport side of a response.
///
/// [`ResponseEmitter`](crate::ResponseEmitter) drives it; implementations only
/// move bytes and headers to wherever the response goes.
#[cfg_attr(test, mockall::automock)]
pub trait ResponseWriter {
    /// Replaces every value of `name`.
    fn set_header(&mut self, name: HeaderName, value: HeaderValue);

    fn append_header(&mut self, name: HeaderName, value: HeaderValue);

    fn write_status(&mut self, status: StatusCode);

    fn write(&mut self, data: &[u8]) -> io::Result<()>;
}

/// Collects a response in memory for the server to send afterwards.
#[derive(Debug)]
pub struct BufferedWriter {
    status: StatusCode,
    headers: HeaderMap,
    body: BytesMut,
    writes: usize,
}

impl BufferedWriter {
    pub fn new() -> Self {
        Self { status: StatusCode::OK, headers: HeaderMap::new(), body: BytesMut::new(), writes: 0 }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// How many times [`write`](ResponseWriter::write) was called.
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn into_response(self) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(self.body.freeze()));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

impl Default for BufferedWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseWriter for BufferedWriter {
    fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.append(name, value);
    }

    fn write_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.writes += 1;
        self.body.extend_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_into_response() {
        let mut writer = BufferedWriter::new();
        writer.write_status(StatusCode::CREATED);
        writer.set_header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        writer.append_header(header::SET_COOKIE, HeaderValue::from_static("a=1"));
        writer.append_header(header::SET_COOKIE, HeaderValue::from_static("b=2"));
        writer.write(b"hello ").unwrap();
        writer.write(b"world").unwrap();

        assert_eq!(writer.writes(), 2);

        let response = writer.into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers().get_all(header::SET_COOKIE).iter().count(), 2);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from("hello world"));
    }
}
