//! Per-request context handed to handlers.
//!
//! [`RequestContext`] pairs the request's [`ParameterStore`] with its
//! [`ResponseEmitter`]. The `require_*` accessors answer the request with an
//! error envelope and terminate when a parameter is missing or malformed, so
//! they only ever return usable values.

use crate::params::{ParameterStore, RequestHead};
use crate::response::{BufferedWriter, ResponseEmitter, ResponseWriter};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt::Display;
use std::str::FromStr;

/// Envelope code for a missing or empty required parameter.
pub const MISSING_PARAM_CODE: i32 = 404;
/// Envelope code for a parameter that failed to convert, and for
/// [`check_error_and_terminate`](RequestContext::check_error_and_terminate).
pub const INVALID_PARAM_CODE: i32 = 504;

#[derive(Debug)]
pub struct RequestContext<W = BufferedWriter> {
    params: ParameterStore,
    response: ResponseEmitter<W>,
}

impl<W: ResponseWriter> RequestContext<W> {
    pub fn new(params: ParameterStore, response: ResponseEmitter<W>) -> Self {
        Self { params, response }
    }

    pub fn params(&self) -> &ParameterStore {
        &self.params
    }

    pub fn response(&self) -> &ResponseEmitter<W> {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut ResponseEmitter<W> {
        &mut self.response
    }

    pub fn into_response(self) -> ResponseEmitter<W> {
        self.response
    }

    /// Method, URI and version of the request being handled.
    pub fn request(&self) -> &RequestHead {
        self.params.request()
    }

    /// See [`ParameterStore::body`].
    pub fn body(&self) -> Value {
        self.params.body()
    }

    /// Returns the merged value of `key`, which must be present and non-empty.
    pub fn require_string(&mut self, key: &str) -> String {
        match self.params.get(key) {
            Some(value) if !value.is_empty() => value.to_owned(),
            _ => {
                let message = format!("invalid parameter, [{key}] must not be empty");
                self.response.write_error_and_terminate(&message, MISSING_PARAM_CODE, [])
            }
        }
    }

    /// Parses the required parameter `key` as a 32-bit integer.
    pub fn require_int(&mut self, key: &str) -> i32 {
        self.require_parsed(key)
    }

    pub fn require_int64(&mut self, key: &str) -> i64 {
        self.require_parsed(key)
    }

    pub fn require_float(&mut self, key: &str) -> f64 {
        self.require_parsed(key)
    }

    /// Parses the required parameter `key` with [`FromStr`].
    pub fn require_parsed<T>(&mut self, key: &str) -> T
    where
        T: FromStr,
        T::Err: Display,
    {
        let text = self.require_string(key);
        match text.parse::<T>() {
            Ok(value) => value,
            Err(e) => {
                let message = format!("invalid parameter [{key}]: {e}");
                self.response.write_error_and_terminate(&message, INVALID_PARAM_CODE, [])
            }
        }
    }

    /// Deserializes every merged parameter into `T`.
    pub fn require_struct<T: DeserializeOwned>(&mut self) -> T {
        match self.params.deserialize() {
            Ok(value) => value,
            Err(e) => self.response.write_error_and_terminate(&e.to_string(), INVALID_PARAM_CODE, []),
        }
    }

    /// Unwraps `result`, or answers with an error envelope and terminates.
    ///
    /// The envelope message is `messages` joined with `,`, or the error's own
    /// text when `messages` is empty.
    pub fn check_error_and_terminate<T, E: Display>(&mut self, result: Result<T, E>, messages: &[&str]) -> T {
        match result {
            Ok(value) => value,
            Err(e) => {
                let message = if messages.is_empty() { e.to_string() } else { messages.join(",") };
                self.response.write_error_and_terminate(&message, INVALID_PARAM_CODE, [])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::RawRequest;
    use crate::response::Envelope;
    use crate::terminate::is_termination;
    use http::{Method, Uri, Version};
    use serde::Deserialize;
    use serde_json::json;
    use std::panic::{AssertUnwindSafe, catch_unwind};

    async fn context(query: &str) -> RequestContext {
        let params = ParameterStore::build(RawRequest::new().with_query(query)).await;
        RequestContext::new(params, ResponseEmitter::new(BufferedWriter::new()))
    }

    /// Runs `f`, which must terminate, and returns the written envelope.
    fn terminated_with(ctx: &mut RequestContext, f: impl FnOnce(&mut RequestContext)) -> Envelope {
        let payload = catch_unwind(AssertUnwindSafe(|| f(ctx))).expect_err("accessor should terminate");
        assert!(is_termination(payload.as_ref()));
        serde_json::from_slice(ctx.response().writer().body()).unwrap()
    }

    #[tokio::test]
    async fn test_require_present_values() {
        let mut ctx = context("name=tom&age=18&big=9000000000&ratio=0.5").await;

        assert_eq!(ctx.require_string("name"), "tom");
        assert_eq!(ctx.require_int("age"), 18);
        assert_eq!(ctx.require_int64("big"), 9_000_000_000);
        assert!((ctx.require_float("ratio") - 0.5).abs() < f64::EPSILON);
        assert!(!ctx.response().state().is_written());
    }

    #[tokio::test]
    async fn test_missing_parameter_never_returns() {
        let mut ctx = context("empty=").await;
        let mut reached = false;

        let envelope = terminated_with(&mut ctx, |ctx| {
            ctx.require_string("absent");
            reached = true;
        });

        assert!(!reached);
        assert_eq!(envelope.code, 404);
        assert_eq!(envelope.message, "invalid parameter, [absent] must not be empty");
        assert_eq!(envelope.data, Value::Null);
        assert_eq!(ctx.response().writer().writes(), 1);

        let mut ctx = self::context("empty=").await;
        let envelope = terminated_with(&mut ctx, |ctx| {
            ctx.require_string("empty");
        });
        assert_eq!(envelope.code, 404);
    }

    #[tokio::test]
    async fn test_unparsable_int_is_504() {
        let mut ctx = context("age=abc&big=9000000000").await;
        let envelope = terminated_with(&mut ctx, |ctx| {
            ctx.require_int("age");
        });
        assert_eq!(envelope.code, 504);
        assert!(envelope.message.starts_with("invalid parameter [age]"));

        let mut ctx = self::context("big=9000000000").await;
        let envelope = terminated_with(&mut ctx, |ctx| {
            ctx.require_int("big");
        });
        assert_eq!(envelope.code, 504);
    }

    #[tokio::test]
    async fn test_check_error_and_terminate() {
        let mut ctx = context("").await;
        assert_eq!(ctx.check_error_and_terminate(Ok::<_, String>(5), &[]), 5);

        let envelope = terminated_with(&mut ctx, |ctx| {
            ctx.check_error_and_terminate(Err::<(), _>("disk full"), &[]);
        });
        assert_eq!(envelope, Envelope::new(504, Value::Null, "disk full"));

        let mut ctx = self::context("").await;
        let envelope = terminated_with(&mut ctx, |ctx| {
            ctx.check_error_and_terminate(Err::<(), _>("disk full"), &["save failed", "retry later"]);
        });
        assert_eq!(envelope.message, "save failed,retry later");
    }

    #[tokio::test]
    async fn test_require_struct() {
        #[derive(Deserialize, Debug, PartialEq)]
        struct Login {
            user: String,
            remember: bool,
        }

        let mut ctx = context("user=tom&remember=true").await;
        assert_eq!(ctx.require_struct::<Login>(), Login { user: "tom".to_string(), remember: true });

        let mut ctx = self::context("user=tom").await;
        let envelope = terminated_with(&mut ctx, |ctx| {
            ctx.require_struct::<Login>();
        });
        assert_eq!(envelope.code, 504);
    }

    #[tokio::test]
    async fn test_request_head() {
        let head = RequestHead::new(Method::DELETE, Uri::from_static("/user/7?force=1"), Version::HTTP_10);
        let params = ParameterStore::build(RawRequest::new().with_head(head).with_query("force=1")).await;
        let ctx = RequestContext::new(params, ResponseEmitter::new(BufferedWriter::new()));

        assert_eq!(ctx.request().method(), &Method::DELETE);
        assert_eq!(ctx.request().path(), "/user/7");
        assert_eq!(ctx.request().version(), Version::HTTP_10);
        assert_eq!(ctx.params().get("force"), Some("1"));

        let ctx = context("").await;
        assert_eq!(ctx.request().method(), &Method::GET);
        assert_eq!(ctx.request().path(), "/");
    }

    #[tokio::test]
    async fn test_body_view() {
        let ctx = context("a=1").await;
        assert_eq!(ctx.body(), json!({"a": "1"}));
    }
}
