//! Unified request parameters and write-once responses for plain HTTP handlers.
//!
//! Handlers are synchronous functions taking a [`RequestContext`]:
//!
//! - every parameter source (query, URL-encoded form, multipart form, JSON
//!   body, headers, cookies) is digested into a [`ParameterStore`], whose
//!   merged view resolves keys by a fixed precedence;
//! - responses go through a [`ResponseEmitter`], which writes a single
//!   [`Envelope`] (or raw bytes, or an image) and then unwinds straight to the
//!   [`Dispatcher`], so nothing after a write ever runs.
//!
//! # Example
//!
//! ```no_run
//! use easy_web::{RequestContext, RouteTable, Server};
//! use serde_json::json;
//!
//! fn user(ctx: &mut RequestContext) {
//!     let id = ctx.require_int64("id");
//!     let name = ctx.params().get("name").unwrap_or("anonymous").to_owned();
//!     ctx.response_mut().write_data(&json!({ "id": id, "name": name }));
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let routes = RouteTable::builder().route("/user", user).build();
//!
//!     Server::builder()
//!         .routes(routes)
//!         .address("127.0.0.1:8080")
//!         .build()
//!         .unwrap()
//!         .start()
//!         .await;
//! }
//! ```

mod context;
mod dispatcher;
mod server;
mod terminate;

pub mod error;
pub mod params;
pub mod response;

pub use context::{INVALID_PARAM_CODE, MISSING_PARAM_CODE, RequestContext};
pub use dispatcher::{Dispatcher, HANDLER_FAULT_CODE, ROUTE_NOT_FOUND, ROUTE_NOT_FOUND_CODE, RouteTable, RouteTableBuilder};
pub use params::{ParameterStore, RawRequest, RequestHead};
pub use response::{BufferedWriter, Envelope, ImageEncoding, ResponseEmitter, ResponseState, ResponseWriter};
pub use server::{BODY_TOO_LARGE_CODE, Server, ServerBuilder};
pub use terminate::Terminated;
