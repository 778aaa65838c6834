//! Unified request parameters.
//!
//! A [`ParameterStore`] digests every parameter source of one request (URL
//! query, URL-encoded form, multipart form, JSON body, headers and cookies)
//! into per-source maps plus a single *merged* map consulted by the typed
//! accessors of [`RequestContext`](crate::RequestContext).
//!
//! Sources are written into the merged map in this order, later writes
//! replacing earlier ones for the same key:
//!
//! 1. URL query
//! 2. URL-encoded form body
//! 3. multipart form fields
//! 4. JSON body keys
//!
//! A key present in only one source always keeps that source's value.

pub(crate) mod decode;
mod json;
pub mod multipart;
mod raw;

pub(crate) use multipart::effective_limit;
pub use multipart::{DEFAULT_MULTIPART_LIMIT, MultipartBody, UploadedFile};
pub use raw::{RawRequest, RequestHead};

use crate::error::{DecodeError, ParamsError};
use bytes::Bytes;
use cookie::Cookie;
use http::{HeaderMap, header};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use tracing::warn;

/// Where a parameter came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Query,
    Form,
    Multipart,
    Json,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Source::Query => "query",
            Source::Form => "form",
            Source::Multipart => "multipart",
            Source::Json => "json",
        };
        f.write_str(name)
    }
}

/// A non-fatal problem met while building a [`ParameterStore`].
#[derive(Debug)]
pub enum Diagnostic {
    /// A key or value kept its raw text because it could not be decoded.
    Decode { source: Source, raw: String, error: DecodeError },
    /// The multipart body stopped parsing; parts read before the failure are kept.
    Multipart { error: ParamsError },
}

#[derive(Debug, Default)]
pub struct ParameterStore {
    head: RequestHead,
    query: HashMap<String, String>,
    form: HashMap<String, String>,
    merged: HashMap<String, String>,
    values: HashMap<String, Vec<String>>,
    headers: HashMap<String, String>,
    cookies: HashMap<String, String>,
    files: HashMap<String, Vec<UploadedFile>>,
    file: Option<UploadedFile>,
    body: Bytes,
    diagnostics: Vec<Diagnostic>,
}

impl ParameterStore {
    /// Digests every source of `raw`.
    ///
    /// Never fails: undecodable text is kept raw, a broken multipart body
    /// contributes the parts read before the break, and a body that is not a
    /// JSON object contributes nothing to the merged map. Each of these is
    /// logged and recorded in [`diagnostics`](Self::diagnostics).
    pub async fn build(raw: RawRequest) -> Self {
        let mut store = Self { head: raw.head, ..Self::default() };

        if let Some(query) = raw.query.as_deref() {
            store.absorb_encoded(Source::Query, query);
        }

        if let Some(form) = raw.form.as_deref() {
            store.absorb_encoded(Source::Form, &String::from_utf8_lossy(form));
        }

        if let Some(body) = raw.multipart.as_ref() {
            let mut form = multipart::MultipartForm::default();
            if let Err(e) = multipart::parse(body, raw.multipart_limit, &mut form).await {
                warn!(cause = %e, "failed to parse multipart body, keeping the parts read so far");
                store.diagnostics.push(Diagnostic::Multipart { error: e.into() });
            }

            let mut failures = Vec::new();
            let fields = form
                .fields
                .into_iter()
                .map(|(key, value)| {
                    let value = decode::decode_or_keep(&value, &mut failures);
                    (key, value)
                })
                .collect::<Vec<_>>();
            store.record_failures(Source::Multipart, failures);
            store.absorb(Source::Multipart, fields);
            store.absorb_files(form.files);
        }

        if let Some(json) = raw.json {
            store.absorb(Source::Json, json::flat_pairs(&json));
            store.body = json;
        }

        store.absorb_headers(&raw.headers);
        store
    }

    fn absorb_encoded(&mut self, source: Source, encoded: &str) {
        let mut pairs = Vec::new();
        for pair in decode::parse_pairs(encoded) {
            self.record_failures(source, pair.failures);
            pairs.push((pair.key, pair.value));
        }
        self.absorb(source, pairs);
    }

    fn record_failures(&mut self, source: Source, failures: Vec<(String, DecodeError)>) {
        for (raw, error) in failures {
            warn!(%source, raw = %raw, cause = %error, "failed to decode parameter, keeping raw value");
            self.diagnostics.push(Diagnostic::Decode { source, raw, error });
        }
    }

    /// Writes one source into its own map and the merged map.
    ///
    /// Within a source the first value of a repeated key wins; across sources
    /// the later source wins.
    fn absorb(&mut self, source: Source, pairs: Vec<(String, String)>) {
        let mut firsts: HashMap<String, String> = HashMap::with_capacity(pairs.len());
        for (key, value) in pairs {
            if source != Source::Json {
                self.values.entry(key.clone()).or_default().push(value.clone());
            }
            firsts.entry(key).or_insert(value);
        }

        let target = match source {
            Source::Query => &mut self.query,
            Source::Form | Source::Multipart | Source::Json => &mut self.form,
        };
        for (key, value) in firsts {
            target.insert(key.clone(), value.clone());
            self.merged.insert(key, value);
        }
    }

    /// Files are grouped by field, and the last one in body order becomes
    /// the primary [`file`](Self::file).
    fn absorb_files(&mut self, files: Vec<UploadedFile>) {
        for file in files {
            self.file = Some(file.clone());
            self.files.entry(file.field_name().to_owned()).or_default().push(file);
        }
    }

    fn absorb_headers(&mut self, headers: &HeaderMap) {
        for (name, value) in headers {
            if let Entry::Vacant(entry) = self.headers.entry(name.as_str().to_owned()) {
                entry.insert(String::from_utf8_lossy(value.as_bytes()).into_owned());
            }
        }

        for value in headers.get_all(header::COOKIE) {
            let Ok(value) = value.to_str() else {
                continue;
            };
            for cookie in Cookie::split_parse(value).flatten() {
                self.cookies.insert(cookie.name().to_owned(), cookie.value().to_owned());
            }
        }
    }

    /// Method, URI and version of the request.
    pub fn request(&self) -> &RequestHead {
        &self.head
    }

    /// Looks up `key` in the merged map.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.merged.get(key).map(String::as_str)
    }

    /// Every key of every source, resolved by precedence.
    pub fn merged(&self) -> &HashMap<String, String> {
        &self.merged
    }

    pub fn query(&self) -> &HashMap<String, String> {
        &self.query
    }

    /// Parameters carried by the body: URL-encoded form, multipart fields and
    /// JSON keys, in that precedence.
    pub fn form(&self) -> &HashMap<String, String> {
        &self.form
    }

    /// All decoded values received for `key` from the query, form and
    /// multipart sources, in arrival order.
    pub fn values(&self, key: &str) -> &[String] {
        self.values.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// The first value of header `name`, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Headers keyed by lowercase name.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn cookies(&self) -> &HashMap<String, String> {
        &self.cookies
    }

    /// Files uploaded under `field`.
    pub fn files(&self, field: &str) -> &[UploadedFile] {
        self.files.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn all_files(&self) -> &HashMap<String, Vec<UploadedFile>> {
        &self.files
    }

    /// The last file of the multipart body, if any.
    pub fn file(&self) -> Option<&UploadedFile> {
        self.file.as_ref()
    }

    /// The request body exactly as received; empty for form bodies.
    pub fn raw_body(&self) -> &[u8] {
        &self.body
    }

    /// The JSON body with every merged key it lacks added at the top level.
    ///
    /// The raw body itself is left untouched.
    pub fn body(&self) -> Value {
        json::with_extra_keys(&self.body, &self.merged)
    }

    /// Deserializes the merged map, coercing text into the field types of `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, ParamsError> {
        let encoded = serde_urlencoded::to_string(&self.merged)?;
        Ok(serde_urlencoded::from_str(&encoded)?)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}
