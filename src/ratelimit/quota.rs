//! Quota model: a "N requests per interval" policy.

use std::time::Duration;

use crate::error::{Result, TurnstileError};

const UNLIMITED_RPM: &str = "unlimited";

/// A maximum request rate, expressed as a number of requests per interval.
///
/// All derived values (token rate and header text) are computed once when
/// the quota is built, so a `Quota` is fully determined by its request count
/// and interval.
#[derive(Debug, Clone, PartialEq)]
pub struct Quota {
    /// Maximum requests per interval; also the burst size of the bucket
    max_requests: u32,
    /// Interval the requests are spread over
    interval: Duration,
    /// Tokens replenished per second
    rate: f64,
    /// Requests per minute, as sent in `X-RateLimit-Limit`
    rpm: String,
    /// Whole seconds of the interval, as sent in `Retry-After`
    retry_after: String,
}

impl Quota {
    /// Create a quota allowing `max_requests` per `interval`.
    ///
    /// Fails when `interval` is zero.
    pub fn new(max_requests: u32, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(TurnstileError::InvalidQuota(format!(
                "{} requests over a zero interval",
                max_requests
            )));
        }
        Ok(Self::from_parts(max_requests, interval))
    }

    /// `max_requests` per second.
    pub fn per_second(max_requests: u32) -> Self {
        Self::from_parts(max_requests, Duration::from_secs(1))
    }

    /// `max_requests` per minute.
    pub fn per_minute(max_requests: u32) -> Self {
        Self::from_parts(max_requests, Duration::from_secs(60))
    }

    /// `max_requests` per hour.
    pub fn per_hour(max_requests: u32) -> Self {
        Self::from_parts(max_requests, Duration::from_secs(3600))
    }

    /// The quota that never rejects.
    pub fn unlimited() -> Self {
        Self {
            max_requests: u32::MAX,
            interval: Duration::MAX,
            rate: f64::INFINITY,
            rpm: UNLIMITED_RPM.to_string(),
            retry_after: String::new(),
        }
    }

    // Caller guarantees a non-zero interval.
    fn from_parts(max_requests: u32, interval: Duration) -> Self {
        let secs = interval.as_secs_f64();
        let requests = f64::from(max_requests);

        Self {
            max_requests,
            interval,
            rate: requests / secs,
            rpm: ((requests * 60.0 / secs).floor() as u64).to_string(),
            retry_after: interval.as_secs().to_string(),
        }
    }

    /// Maximum requests per interval.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// The interval requests are counted over.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Tokens per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Requests per minute as header text, or `"unlimited"`.
    pub fn rpm(&self) -> &str {
        &self.rpm
    }

    /// Whole seconds of the interval as header text; empty when unlimited.
    pub fn retry_after(&self) -> &str {
        &self.retry_after
    }

    /// Whether this quota admits every request.
    pub fn is_unlimited(&self) -> bool {
        self.rate.is_infinite()
    }
}

impl Default for Quota {
    fn default() -> Self {
        Self::unlimited()
    }
}
