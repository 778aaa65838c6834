//! Host HTTP server.
//!
//! Serves HTTP/1.1 with hyper. For every request the body is collected up to
//! the request size limit, a [`RequestContext`] is built and the
//! [`Dispatcher`] runs on tokio's blocking pool, so handler code stays
//! synchronous. The request path is the route key.

use crate::context::RequestContext;
use crate::dispatcher::{Dispatcher, RouteTable};
use crate::error::ServerBuildError;
use crate::params::{ParameterStore, RawRequest, effective_limit};
use crate::response::{BufferedWriter, ResponseEmitter};
use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::error::Error as StdError;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Envelope code and HTTP status of a request whose body exceeds the limit.
pub const BODY_TOO_LARGE_CODE: i32 = 413;

#[derive(Debug)]
pub struct ServerBuilder {
    routes: Option<RouteTable>,
    address: Option<io::Result<Vec<SocketAddr>>>,
    multipart_limit: u64,
}

impl ServerBuilder {
    fn new() -> Self {
        Self { routes: None, address: None, multipart_limit: 0 }
    }

    pub fn address<A: ToSocketAddrs>(mut self, address: A) -> Self {
        self.address = Some(address.to_socket_addrs().map(Iterator::collect));
        self
    }

    pub fn routes(mut self, routes: RouteTable) -> Self {
        self.routes = Some(routes);
        self
    }

    /// Size limit of request bodies, `0` (the default) selects
    /// [`DEFAULT_MULTIPART_LIMIT`](crate::params::DEFAULT_MULTIPART_LIMIT).
    ///
    /// Larger bodies are answered with a 413 envelope without being read in
    /// full. Multipart parsing applies the same limit.
    pub fn multipart_limit(mut self, limit: u64) -> Self {
        self.multipart_limit = limit;
        self
    }

    pub fn build(self) -> Result<Server, ServerBuildError> {
        let routes = self.routes.ok_or(ServerBuildError::MissingRoutes)?;
        let address = self
            .address
            .ok_or(ServerBuildError::MissingAddress)?
            .map_err(|source| ServerBuildError::InvalidAddress { source })?;
        Ok(Server { dispatcher: Arc::new(Dispatcher::new(routes)), address, multipart_limit: self.multipart_limit })
    }
}

#[derive(Debug)]
pub struct Server {
    dispatcher: Arc<Dispatcher>,
    address: Vec<SocketAddr>,
    multipart_limit: u64,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub async fn start(self) {
        let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
        if tracing::subscriber::set_global_default(subscriber).is_err() {
            debug!("global subscriber already set");
        }

        info!("start listening at {:?}", self.address);
        let tcp_listener = match TcpListener::bind(self.address.as_slice()).await {
            Ok(tcp_listener) => tcp_listener,
            Err(e) => {
                error!(cause = %e, "bind server error");
                return;
            }
        };

        let dispatcher = self.dispatcher;
        let multipart_limit = self.multipart_limit;
        loop {
            let (tcp_stream, remote_addr) = match tcp_listener.accept().await {
                Ok(stream_and_addr) => stream_and_addr,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            };

            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move {
                let service = service_fn(move |req| handle(Arc::clone(&dispatcher), multipart_limit, req));
                match http1::Builder::new().serve_connection(TokioIo::new(tcp_stream), service).await {
                    Ok(()) => debug!(%remote_addr, "finished process, connection shutdown"),
                    Err(e) => error!(%remote_addr, cause = %e, "service has error, connection shutdown"),
                }
            });
        }
    }
}

async fn handle(
    dispatcher: Arc<Dispatcher>,
    multipart_limit: u64,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let Some(body) = read_body(body, multipart_limit).await else {
        warn!(path = parts.uri.path(), "request body exceeds the size limit, rejected");
        return Ok(body_too_large());
    };

    Ok(respond(&dispatcher, RawRequest::from_parts(&parts, body, multipart_limit), parts.uri.path()).await)
}

/// Collects `body`, stopping as soon as it grows past `limit` bytes.
///
/// Returns `None` for an over-limit body. Other read failures are logged and
/// yield an empty body.
async fn read_body<B>(body: B, limit: u64) -> Option<Bytes>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    let limit = usize::try_from(effective_limit(limit)).unwrap_or(usize::MAX);
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Some(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => None,
        Err(e) => {
            warn!(cause = %e, "failed to read request body, treating it as empty");
            Some(Bytes::new())
        }
    }
}

fn body_too_large() -> Response<Full<Bytes>> {
    let mut response = ResponseEmitter::new(BufferedWriter::new());
    response.set_status(StatusCode::PAYLOAD_TOO_LARGE);
    response.write_error("request body too large", BODY_TOO_LARGE_CODE, []);
    response.into_writer().into_response()
}

/// Builds the context for `raw`, dispatches `route` and returns what the
/// handler wrote.
pub(crate) async fn respond(dispatcher: &Arc<Dispatcher>, raw: RawRequest, route: &str) -> Response<Full<Bytes>> {
    let params = ParameterStore::build(raw).await;
    let mut ctx = RequestContext::new(params, ResponseEmitter::new(BufferedWriter::new()));

    let dispatcher = Arc::clone(dispatcher);
    let route = route.to_owned();
    let dispatched = tokio::task::spawn_blocking(move || {
        dispatcher.dispatch(&route, &mut ctx);
        ctx.into_response().into_writer().into_response()
    })
    .await;

    match dispatched {
        Ok(response) => response,
        Err(e) => {
            error!(cause = %e, "dispatch task failed");
            let mut response = Response::new(Full::new(Bytes::new()));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Envelope;
    use serde_json::{Value, json};

    fn dispatcher() -> Arc<Dispatcher> {
        let routes = RouteTable::builder()
            .route("/echo", |ctx: &mut RequestContext| {
                let body = ctx.body();
                ctx.response_mut().write_data(&body);
            })
            .route("/head", |ctx: &mut RequestContext| {
                let head = format!("{} {}", ctx.request().method(), ctx.request().path());
                ctx.response_mut().write_data(&head);
            })
            .route("/cookie", |ctx: &mut RequestContext| {
                ctx.response_mut().set_cookie("sid", "1");
                ctx.response_mut().write_success(None);
            })
            .build();
        Arc::new(Dispatcher::new(routes))
    }

    async fn envelope(response: Response<Full<Bytes>>) -> Envelope {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[test]
    fn test_build_requires_routes_and_address() {
        let missing_routes = Server::builder().address("127.0.0.1:0").build();
        assert!(matches!(missing_routes, Err(ServerBuildError::MissingRoutes)));

        let missing_address = Server::builder().routes(RouteTable::builder().build()).build();
        assert!(matches!(missing_address, Err(ServerBuildError::MissingAddress)));

        let invalid_address = Server::builder().routes(RouteTable::builder().build()).address("not an address").build();
        assert!(matches!(invalid_address, Err(ServerBuildError::InvalidAddress { .. })));

        let server = Server::builder().routes(RouteTable::builder().build()).address("127.0.0.1:0").build();
        assert!(matches!(server, Ok(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_respond_merges_sources() {
        let request = Request::builder()
            .uri("/echo?a=1&b=query")
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(())
            .unwrap();
        let (parts, ()) = request.into_parts();
        let raw = RawRequest::from_parts(&parts, Bytes::from(r#"{"b":"json"}"#), 0);

        let response = respond(&dispatcher(), raw, parts.uri.path()).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(envelope(response).await.data, json!({"a": "1", "b": "json"}));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_respond_exposes_request_head() {
        let request = Request::builder().method(http::Method::PUT).uri("/head?x=1").body(()).unwrap();
        let (parts, ()) = request.into_parts();
        let raw = RawRequest::from_parts(&parts, Bytes::new(), 0);

        let response = respond(&dispatcher(), raw, parts.uri.path()).await;

        assert_eq!(envelope(response).await.data, json!("PUT /head"));
    }

    #[tokio::test]
    async fn test_read_body_stops_at_limit() {
        let small = read_body(Full::new(Bytes::from_static(b"a=1&b=2")), 16).await;
        assert_eq!(small.as_deref(), Some(&b"a=1&b=2"[..]));

        let large = read_body(Full::new(Bytes::from(vec![b'x'; 64])), 16).await;
        assert!(large.is_none());

        let exact = read_body(Full::new(Bytes::from(vec![b'x'; 16])), 16).await;
        assert_eq!(exact.map(|body| body.len()), Some(16));
    }

    #[tokio::test]
    async fn test_body_too_large_envelope() {
        let response = body_too_large();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(response.headers().get(http::header::CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(envelope(response).await, Envelope::new(413, Value::Null, "request body too large"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_respond_unknown_route_and_cookie() {
        let response = respond(&dispatcher(), RawRequest::new(), "/missing").await;
        assert_eq!(envelope(response).await.code, 404);

        let response = respond(&dispatcher(), RawRequest::new(), "/cookie").await;
        assert_eq!(response.headers().get(http::header::SET_COOKIE).unwrap(), "sid=1; Path=/");
        assert_eq!(envelope(response).await.message, "success");
    }
}
