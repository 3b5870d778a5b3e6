//! HTTP server that fronts a router with the rate limiting layer.

use std::future::Future;
use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::layer::RateLimitLayer;
use crate::error::{Result, TurnstileError};
use crate::ratelimit::Options;

/// Serves an axum router behind a [`RateLimitLayer`].
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// The rate limit layer shared by every route
    layer: RateLimitLayer,
    /// Routes to protect
    routes: Router,
}

impl HttpServer {
    /// Create a server for `options` with the default echo route.
    pub fn new(addr: SocketAddr, options: Options) -> Self {
        Self {
            addr,
            layer: options.middleware(),
            routes: Router::new().fallback(admitted),
        }
    }

    /// Replace the protected routes.
    pub fn with_routes(mut self, routes: Router) -> Self {
        self.routes = routes;
        self
    }

    /// The full router, rate limiting layer included.
    pub fn router(&self) -> Router {
        self.routes.clone().layer(self.layer.clone())
    }

    /// Start the server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await?;

        info!(
            addr = %listener.local_addr()?,
            strategy = %self.layer.dispatcher().strategy_kind(),
            "Starting HTTP server"
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                TurnstileError::Io(e)
            })
    }
}

async fn admitted() -> &'static str {
    "ok\n"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::routing::get;
    use http::{Request, StatusCode};
    use std::time::Duration;
    use tower::ServiceExt;

    use crate::middleware::X_RATELIMIT_LIMIT;
    use crate::ratelimit::{fnv1a_32, RequestHead};

    fn addr() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    fn tenant(head: &RequestHead<'_>) -> String {
        head.path_segment(1).unwrap_or_default().to_string()
    }

    #[tokio::test]
    async fn test_router_applies_layer() {
        let options = Options::global()
            .with_default_quota(1, Duration::from_secs(1))
            .unwrap();
        let server = HttpServer::new(addr(), options);

        let first = server
            .router()
            .oneshot(Request::new(Body::empty()))
            .await
            .unwrap();
        let second = server
            .router()
            .oneshot(Request::new(Body::empty()))
            .await
            .unwrap();

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(first.headers()[X_RATELIMIT_LIMIT], "60");
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_custom_routes_keyed_by_path() {
        let options = Options::limit_by_bucketed_keys(4, fnv1a_32, tenant)
            .with_default_quota(1, Duration::from_secs(60))
            .unwrap();
        let server = HttpServer::new(addr(), options)
            .with_routes(Router::new().route("/tenants/:id", get(|| async { "tenant" })));

        let request = |uri: &str| Request::builder().uri(uri).body(Body::empty()).unwrap();

        let a = server.router().oneshot(request("/tenants/a")).await.unwrap();
        let a_again = server.router().oneshot(request("/tenants/a")).await.unwrap();
        let b = server.router().oneshot(request("/tenants/b")).await.unwrap();

        assert_eq!(a.status(), StatusCode::OK);
        assert_eq!(a_again.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(b.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_serve_with_shutdown() {
        let server = HttpServer::new(addr(), Options::global());
        let result = server.serve_with_shutdown(async {}).await;
        assert!(result.is_ok());
    }
}
