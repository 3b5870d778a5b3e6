//! Turns a strategy's limiter into an admission decision.

use http::StatusCode;
use tracing::{debug, info, trace};

use super::options::Options;
use super::request::RequestHead;
use super::strategy::{Strategy, StrategyKind};

/// Outcome of one admission check, with the header text to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Forward the request.
    Allowed {
        /// `X-RateLimit-Limit` value
        limit: String,
    },
    /// Answer with `status` and do not forward.
    Rejected {
        /// `X-RateLimit-Limit` value
        limit: String,
        /// `Retry-After` value
        retry_after: String,
        /// Configured rejection status
        status: StatusCode,
    },
}

impl Decision {
    /// Whether the request may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    /// `X-RateLimit-Limit` value, present on every decision.
    pub fn limit(&self) -> &str {
        match self {
            Decision::Allowed { limit } | Decision::Rejected { limit, .. } => limit,
        }
    }
}

/// Holds the options and the strategy chosen from them.
///
/// Thread-safe; share it behind an `Arc`.
#[derive(Debug)]
pub struct Dispatcher {
    status: StatusCode,
    strategy: Strategy,
}

impl Dispatcher {
    /// Select the strategy for `options`. Done once; never re-evaluated per request.
    pub fn new(options: Options) -> Self {
        let strategy = Strategy::select(&options);

        info!(
            strategy = %strategy.kind(),
            shards = options.shards(),
            status = options.status().as_u16(),
            "Rate limiter initialized"
        );

        Self {
            status: options.status(),
            strategy,
        }
    }

    /// Consume one token for `request` and report what to do with it.
    pub fn check(&self, request: &RequestHead<'_>) -> Decision {
        let limiter = self.strategy.resolve(request);
        let allowed = limiter.allow();

        trace!(
            method = %request.method,
            path = request.uri.path(),
            allowed,
            "Checked rate limit"
        );

        if allowed {
            Decision::Allowed {
                limit: limiter.rpm().to_string(),
            }
        } else {
            debug!(
                method = %request.method,
                path = request.uri.path(),
                limit = limiter.rpm(),
                "Rate limit exceeded"
            );
            Decision::Rejected {
                limit: limiter.rpm().to_string(),
                retry_after: limiter.retry_after().to_string(),
                status: self.status,
            }
        }
    }

    /// The strategy in use.
    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    /// Shortcut for `strategy().kind()`.
    pub fn strategy_kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    /// Status written on rejection.
    pub fn status(&self) -> StatusCode {
        self.status
    }
}
