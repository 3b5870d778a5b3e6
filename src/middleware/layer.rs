//! Tower layer that installs the rate limiting middleware.

use std::sync::Arc;

use tower::Layer;

use super::service::RateLimitService;
use crate::ratelimit::{Dispatcher, Options};

/// A layer wrapping services in [`RateLimitService`].
///
/// Every service produced by one layer shares the same dispatcher, and so
/// the same buckets.
#[derive(Clone, Debug)]
pub struct RateLimitLayer {
    dispatcher: Arc<Dispatcher>,
}

impl RateLimitLayer {
    /// Create a new rate limit layer from `options`.
    pub fn new(options: Options) -> Self {
        Self::with_dispatcher(Arc::new(Dispatcher::new(options)))
    }

    /// Create a layer around an existing dispatcher.
    pub fn with_dispatcher(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// The shared dispatcher.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, service: S) -> Self::Service {
        RateLimitService::new(service, Arc::clone(&self.dispatcher))
    }
}

impl Options {
    /// Finish configuration and build the middleware.
    pub fn middleware(self) -> RateLimitLayer {
        RateLimitLayer::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::StrategyKind;
    use http::{Request, Response, StatusCode};
    use std::convert::Infallible;
    use std::time::Duration;
    use tower::{service_fn, ServiceBuilder, ServiceExt};

    async fn ok(_request: Request<()>) -> Result<Response<String>, Infallible> {
        Ok(Response::new(String::new()))
    }

    #[test]
    fn test_middleware_selects_strategy() {
        let layer = Options::global().middleware();
        assert_eq!(layer.dispatcher().strategy_kind(), StrategyKind::Global);
    }

    #[tokio::test]
    async fn test_services_from_one_layer_share_buckets() {
        let layer = Options::global()
            .with_default_quota(1, Duration::from_secs(60))
            .unwrap()
            .middleware();

        let first = layer.layer(service_fn(ok));
        let second = layer.layer(service_fn(ok));

        let a = first.oneshot(Request::new(())).await.unwrap();
        let b = second.oneshot(Request::new(())).await.unwrap();

        assert_eq!(a.status(), StatusCode::OK);
        assert_eq!(b.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_service_builder() {
        let service = ServiceBuilder::new()
            .layer(
                Options::global()
                    .with_default_quota(0, Duration::from_secs(1))
                    .unwrap()
                    .with_status(StatusCode::SERVICE_UNAVAILABLE)
                    .middleware(),
            )
            .service_fn(ok);

        let response = service.oneshot(Request::new(())).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
