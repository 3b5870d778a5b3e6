//! Middleware service that enforces rate limits on HTTP requests.
//!
//! Admitted responses get `X-RateLimit-Limit` unless the inner service
//! already set one.

use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use http::header::{HeaderName, HeaderValue, RETRY_AFTER};
use http::{HeaderMap, Request, Response, StatusCode};
use tower::Service;
use tracing::warn;

use crate::ratelimit::{Decision, Dispatcher, RequestHead};

/// Header carrying the quota in requests per minute, set on every response.
pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");

/// Wraps an inner service and admits or rejects each request before it.
#[derive(Clone, Debug)]
pub struct RateLimitService<S> {
    inner: S,
    dispatcher: Arc<Dispatcher>,
}

impl<S> RateLimitService<S> {
    /// Wrap `inner`, deciding with `dispatcher`.
    pub fn new(inner: S, dispatcher: Arc<Dispatcher>) -> Self {
        Self { inner, dispatcher }
    }

    /// The wrapped service.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Unwrap the inner service.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RateLimitService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let decision = self.dispatcher.check(&RequestHead::from_request(&request));

        match decision {
            Decision::Allowed { limit } => {
                let future = self.inner.call(request);
                Box::pin(async move {
                    let mut response = future.await?;
                    // A value set by the inner service is kept
                    if !response.headers().contains_key(&X_RATELIMIT_LIMIT) {
                        set_header(response.headers_mut(), X_RATELIMIT_LIMIT, &limit);
                    }
                    Ok(response)
                })
            }
            Decision::Rejected {
                limit,
                retry_after,
                status,
            } => {
                let response = rejection(status, &limit, &retry_after);
                Box::pin(async move { Ok(response) })
            }
        }
    }
}

/// Empty-bodied rejection carrying both rate limit headers.
fn rejection<B: Default>(status: StatusCode, limit: &str, retry_after: &str) -> Response<B> {
    let mut response = Response::new(B::default());
    *response.status_mut() = status;

    let headers = response.headers_mut();
    set_header(headers, X_RATELIMIT_LIMIT, limit);
    set_header(headers, RETRY_AFTER, retry_after);
    response
}

fn set_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(e) => warn!(header = %name, value, error = %e, "Dropping invalid header value"),
    }
}
