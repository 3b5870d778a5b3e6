//! HTTP request pipeline integration.
//!
//! [`RateLimitLayer`] plugs the dispatcher into any tower stack (axum,
//! tonic, hyper-util). Admitted requests reach the inner service and get an
//! `X-RateLimit-Limit` header on the way out, unless the inner service set
//! one itself. Rejected requests never reach it and are answered with the
//! configured status plus `Retry-After`.

mod layer;
mod server;
mod service;

pub use layer::RateLimitLayer;
pub use server::HttpServer;
pub use service::{RateLimitService, X_RATELIMIT_LIMIT};
