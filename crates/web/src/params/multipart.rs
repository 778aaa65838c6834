//! `multipart/form-data` bodies: text fields and uploaded files.

use bytes::Bytes;
use futures::stream;
use mime::Mime;
use multer::{Constraints, Multipart, SizeLimit};
use std::convert::Infallible;

/// Size limit applied to a whole multipart body when the caller passes `0`.
pub const DEFAULT_MULTIPART_LIMIT: u64 = 32 << 20;

/// Resolves a caller-supplied limit, `0` meaning [`DEFAULT_MULTIPART_LIMIT`].
pub(crate) fn effective_limit(limit: u64) -> u64 {
    if limit == 0 { DEFAULT_MULTIPART_LIMIT } else { limit }
}

/// A multipart body waiting to be parsed.
#[derive(Debug, Clone)]
pub struct MultipartBody {
    boundary: String,
    body: Bytes,
}

impl MultipartBody {
    pub fn new(boundary: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self { boundary: boundary.into(), body: body.into() }
    }

    /// Extracts the boundary from a `multipart/form-data` content type.
    pub fn from_content_type(content_type: &str, body: Bytes) -> Result<Self, multer::Error> {
        let boundary = multer::parse_boundary(content_type)?;
        Ok(Self { boundary, body })
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }
}

/// A file received in a multipart body.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    field_name: String,
    file_name: Option<String>,
    content_type: Option<Mime>,
    data: Bytes,
}

impl UploadedFile {
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn content_type(&self) -> Option<&Mime> {
        self.content_type.as_ref()
    }

    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Fields and files in body order.
#[derive(Debug, Default)]
pub(crate) struct MultipartForm {
    pub(crate) fields: Vec<(String, String)>,
    pub(crate) files: Vec<UploadedFile>,
}

/// Parses `body` into `form`.
///
/// Parts are appended as they are read, so on error `form` still holds every
/// part that preceded the failure. A `limit` of `0` means
/// [`DEFAULT_MULTIPART_LIMIT`].
pub(crate) async fn parse(body: &MultipartBody, limit: u64, form: &mut MultipartForm) -> Result<(), multer::Error> {
    let constraints = Constraints::new().size_limit(SizeLimit::new().whole_stream(effective_limit(limit)));

    let chunk = body.body.clone();
    let body_stream = stream::once(async move { Ok::<Bytes, Infallible>(chunk) });
    let mut multipart = Multipart::with_constraints(body_stream, body.boundary.clone(), constraints);

    while let Some(field) = multipart.next_field().await? {
        let Some(field_name) = field.name().map(str::to_owned) else {
            continue;
        };
        let file_name = field.file_name().map(str::to_owned);
        let content_type = field.content_type().cloned();
        let data = field.bytes().await?;

        if file_name.is_some() {
            form.files.push(UploadedFile { field_name, file_name, content_type, data });
        } else {
            form.fields.push((field_name, String::from_utf8_lossy(&data).into_owned()));
        }
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const BOUNDARY: &str = "X-EASY-BOUNDARY";

    pub(crate) fn text_part(name: &str, value: &str) -> String {
        format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
    }

    pub(crate) fn file_part(name: &str, file_name: &str, content: &str) -> String {
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
             Content-Type: text/plain\r\n\r\n{content}\r\n"
        )
    }

    pub(crate) fn multipart_body(parts: &[String]) -> MultipartBody {
        let mut body = parts.concat();
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        MultipartBody::new(BOUNDARY, body)
    }

    #[tokio::test]
    async fn test_parse_fields_and_files() {
        let body = multipart_body(&[
            text_part("a", "2"),
            file_part("avatar", "me.txt", "hello"),
            text_part("b", "x y"),
        ]);

        let mut form = MultipartForm::default();
        parse(&body, 0, &mut form).await.unwrap();

        assert_eq!(form.fields, vec![("a".to_string(), "2".to_string()), ("b".to_string(), "x y".to_string())]);
        assert_eq!(form.files.len(), 1);

        let file = &form.files[0];
        assert_eq!(file.field_name(), "avatar");
        assert_eq!(file.file_name(), Some("me.txt"));
        assert_eq!(file.content_type(), Some(&mime::TEXT_PLAIN));
        assert_eq!(file.bytes().as_ref(), b"hello");
    }

    #[tokio::test]
    async fn test_parse_respects_limit() {
        let body = multipart_body(&[text_part("a", "1"), file_part("f", "big.txt", &"x".repeat(1024))]);

        let mut form = MultipartForm::default();
        let result = parse(&body, 128, &mut form).await;

        assert!(matches!(result, Err(multer::Error::StreamSizeExceeded { .. })));
        assert!(form.files.is_empty());
    }

    #[test]
    fn test_boundary_from_content_type() {
        let body = MultipartBody::from_content_type("multipart/form-data; boundary=abc123", Bytes::new()).unwrap();
        assert_eq!(body.boundary(), "abc123");

        assert!(matches!(MultipartBody::from_content_type("multipart/form-data", Bytes::new()), Err(_)));
    }
}
