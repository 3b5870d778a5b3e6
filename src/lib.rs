//! Turnstile - Request Admission Middleware
//!
//! This crate decides, per incoming HTTP request, whether to admit or reject
//! it against a configurable rate quota. Requests are limited globally, per
//! key, or per key with the key space spread over independently locked
//! shards. The decision engine lives in [`ratelimit`]; [`middleware`] plugs
//! it into tower-based servers.

pub mod config;
pub mod error;
pub mod middleware;
pub mod ratelimit;
