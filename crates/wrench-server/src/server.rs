//! The HTTP/1.1 server.
//!
//! One tokio task per connection, served by hyper. Each request is matched in
//! the [`RouteTable`], its body collected up to `max_body_bytes`, and handed
//! to the endpoint's chain together with a fresh [`RouteContext`].

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{ALLOW, CONTENT_TYPE};
use http::{HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use wrench_config::ServerConfig;
use wrench_core::RouteContext;

use crate::error::ServerError;
use crate::health::{HealthCheck, HEALTH_PATHS};
use crate::routes::{RouteLookup, RouteTable};
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// Response type produced by the server.
pub type HttpResponse = Response<Full<Bytes>>;

/// Serves a [`RouteTable`] over HTTP.
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    routes: RouteTable,
    health: HealthCheck,
}

impl Server {
    /// Creates a server; nothing is bound until it runs.
    pub fn new(config: ServerConfig, routes: RouteTable, health: HealthCheck) -> Self {
        Self {
            config,
            routes,
            health,
        }
    }

    /// The configured listen address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ServerError> {
        self.config
            .http_addr
            .parse()
            .map_err(|e: std::net::AddrParseError| ServerError::InvalidAddress {
                addr: self.config.http_addr.clone(),
                reason: e.to_string(),
            })
    }

    /// Binds the configured address and serves until SIGTERM or Ctrl+C.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(ShutdownSignal::with_os_signals())
            .await
    }

    /// Binds the configured address and serves until `shutdown` triggers.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let addr = self.socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        self.serve(listener, shutdown).await
    }

    /// Serves connections from an already bound listener.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: ShutdownSignal,
    ) -> Result<(), ServerError> {
        let local = listener.local_addr()?;
        info!(addr = %local, routes = self.routes.len(), "gateway listening");

        let server = Arc::new(self);
        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        let server = Arc::clone(&server);
                        let guard = tracker.track();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            server.connection(stream, remote, shutdown).await;
                            drop(guard);
                        });
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
                () = shutdown.wait() => break,
            }
        }

        let grace = server.config.shutdown_timeout();
        info!(
            active = tracker.active(),
            grace_secs = grace.as_secs(),
            "shutting down"
        );
        if tokio::time::timeout(grace, tracker.idle()).await.is_err() {
            warn!(active = tracker.active(), "shutdown timeout reached");
        }
        info!("gateway stopped");
        Ok(())
    }

    async fn connection(
        self: Arc<Self>,
        stream: tokio::net::TcpStream,
        remote: SocketAddr,
        shutdown: ShutdownSignal,
    ) {
        let server = Arc::clone(&self);
        let service = service_fn(move |request: Request<Incoming>| {
            let server = Arc::clone(&server);
            async move { Ok::<_, Infallible>(server.handle(request).await) }
        });

        let connection = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
        tokio::pin!(connection);

        tokio::select! {
            result = connection.as_mut() => {
                if let Err(e) = result {
                    debug!(%remote, error = %e, "connection closed with error");
                }
            }
            () = shutdown.wait() => {
                connection.as_mut().graceful_shutdown();
                if let Err(e) = connection.await {
                    debug!(%remote, error = %e, "connection closed during shutdown");
                }
            }
        }
    }

    /// Answers one request.
    pub async fn handle<B>(&self, request: Request<B>) -> HttpResponse
    where
        B: hyper::body::Body<Data = Bytes>,
        B::Error: std::error::Error + Send + Sync + 'static,
    {
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        if method == Method::GET && HEALTH_PATHS.contains(&path.as_str()) {
            return self.health_response();
        }

        let route = match self.routes.lookup(&method, &path) {
            RouteLookup::Found(route) => route,
            RouteLookup::MethodNotAllowed(allowed) => {
                debug!(%method, %path, "method not allowed");
                let mut response = json_response(
                    StatusCode::METHOD_NOT_ALLOWED,
                    &serde_json::json!({"error": "Method Not Allowed", "path": path}),
                );
                let allow: Vec<&str> = allowed.iter().map(Method::as_str).collect();
                if let Ok(value) = HeaderValue::from_str(&allow.join(", ")) {
                    response.headers_mut().insert(ALLOW, value);
                }
                return response;
            }
            RouteLookup::NotFound => {
                debug!(%method, %path, "no route");
                return json_response(
                    StatusCode::NOT_FOUND,
                    &serde_json::json!({"error": "Not Found", "path": path}),
                );
            }
        };

        let (parts, body) = request.into_parts();
        let read = tokio::time::timeout(
            self.config.request_timeout(),
            Limited::new(body, self.config.max_body_bytes).collect(),
        )
        .await;
        let body = match read {
            Ok(Ok(collected)) => collected.to_bytes(),
            Ok(Err(e)) if e.is::<http_body_util::LengthLimitError>() => {
                warn!(%path, limit = self.config.max_body_bytes, "request body too large");
                return text_response(StatusCode::PAYLOAD_TOO_LARGE, "request body too large");
            }
            Ok(Err(e)) => {
                warn!(%path, error = %e, "failed to read request body");
                return text_response(StatusCode::BAD_REQUEST, "failed to read request body");
            }
            Err(_) => {
                warn!(%path, "request body timed out");
                return text_response(StatusCode::REQUEST_TIMEOUT, "request body timed out");
            }
        };

        let context = RouteContext::new(
            parts.method,
            parts.uri,
            parts.headers,
            body,
            Arc::clone(route.endpoint()),
        );
        route.chain().respond(&context).await
    }

    fn health_response(&self) -> HttpResponse {
        match serde_json::to_value(self.health.status()) {
            Ok(body) => json_response(StatusCode::OK, &body),
            Err(e) => {
                error!(error = %e, "failed to encode health status");
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "health unavailable")
            }
        }
    }
}

fn json_response(status: StatusCode, body: &serde_json::Value) -> HttpResponse {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn text_response(status: StatusCode, message: &'static str) -> HttpResponse {
    let mut response = Response::new(Full::new(Bytes::from_static(message.as_bytes())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}
