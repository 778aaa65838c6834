use crate::params::multipart::MultipartBody;
use bytes::Bytes;
use http::request::Parts;
use http::{HeaderMap, Method, Uri, Version, header};
use mime::Mime;
use tracing::warn;

/// Method, target and version of the request line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHead {
    method: Method,
    uri: Uri,
    version: Version,
}

impl RequestHead {
    pub fn new(method: Method, uri: Uri, version: Version) -> Self {
        Self { method, uri, version }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// The request path, which is also the route key.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn version(&self) -> Version {
        self.version
    }
}

/// The undigested sources of one request's parameters.
///
/// [`RawRequest::from_parts`] fills it from an incoming request; the `with_*`
/// methods feed each source directly.
#[derive(Debug, Clone, Default)]
pub struct RawRequest {
    pub(crate) head: RequestHead,
    pub(crate) query: Option<String>,
    pub(crate) form: Option<Bytes>,
    pub(crate) multipart: Option<MultipartBody>,
    pub(crate) json: Option<Bytes>,
    pub(crate) headers: HeaderMap,
    pub(crate) multipart_limit: u64,
}

impl RawRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifies `body` by the request's `Content-Type`.
    ///
    /// URL-encoded and multipart bodies are consumed as forms; any other body
    /// is kept verbatim as the JSON candidate.
    pub fn from_parts(parts: &Parts, body: Bytes, multipart_limit: u64) -> Self {
        let mut raw = Self::new()
            .with_head(RequestHead::new(parts.method.clone(), parts.uri.clone(), parts.version))
            .with_headers(parts.headers.clone())
            .with_multipart_limit(multipart_limit);
        if let Some(query) = parts.uri.query() {
            raw = raw.with_query(query);
        }

        let content_type = parts.headers.get(header::CONTENT_TYPE).and_then(|value| value.to_str().ok());
        let mime = content_type.and_then(|value| value.parse::<Mime>().ok());

        match mime {
            Some(mime) if mime.essence_str() == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str() => raw.with_form(body),
            Some(mime) if mime.essence_str() == mime::MULTIPART_FORM_DATA.essence_str() => {
                match MultipartBody::from_content_type(content_type.unwrap_or_default(), body) {
                    Ok(multipart) => raw.with_multipart(multipart),
                    Err(e) => {
                        warn!(cause = %e, "multipart request without a usable boundary, body ignored");
                        raw
                    }
                }
            }
            _ if body.is_empty() => raw,
            _ => raw.with_json(body),
        }
    }

    pub fn with_head(mut self, head: RequestHead) -> Self {
        self.head = head;
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Sets an `application/x-www-form-urlencoded` body.
    pub fn with_form(mut self, form: impl Into<Bytes>) -> Self {
        self.form = Some(form.into());
        self
    }

    pub fn with_multipart(mut self, multipart: MultipartBody) -> Self {
        self.multipart = Some(multipart);
        self
    }

    /// Sets the body that is read as a flat JSON object and kept for [`body`].
    ///
    /// [`body`]: crate::ParameterStore::body
    pub fn with_json(mut self, json: impl Into<Bytes>) -> Self {
        self.json = Some(json.into());
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Size limit for the multipart body, `0` selects the default.
    pub fn with_multipart_limit(mut self, limit: u64) -> Self {
        self.multipart_limit = limit;
        self
    }
}
