//! Rate limiting options, built once before serving traffic.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;

use super::quota::Quota;
use super::request::RequestHead;
use crate::error::Result;

/// Extracts the rate limiting key from a request.
pub type KeyFn = Arc<dyn Fn(&RequestHead<'_>) -> String + Send + Sync>;
/// Maps a key to the quota its limiter is built with.
pub type QuotaFn = Arc<dyn Fn(&str) -> Quota + Send + Sync>;
/// 32-bit digest of the key bytes, used to pick a shard.
pub type HashFn = Arc<dyn Fn(&[u8]) -> u32 + Send + Sync>;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a, the stock shard hash.
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Configuration for a rate limiting dispatcher.
///
/// Start from [`Options::global`], [`Options::limit_by_keys`] or
/// [`Options::limit_by_bucketed_keys`], then adjust the quota and the
/// rejection status. Every callback is shared by all in-flight requests and
/// must be safe to call concurrently.
#[derive(Clone)]
pub struct Options {
    pub(crate) status: StatusCode,
    pub(crate) shards: usize,
    pub(crate) get_key: Option<KeyFn>,
    pub(crate) get_hash: Option<HashFn>,
    pub(crate) get_quota: QuotaFn,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            shards: 0,
            get_key: None,
            get_hash: None,
            get_quota: Arc::new(|_: &str| Quota::unlimited()),
        }
    }
}

impl Options {
    /// One bucket shared by every request.
    pub fn global() -> Self {
        Self::default()
    }

    /// One bucket per key, all keys behind a single lock.
    pub fn limit_by_keys<K>(get_key: K) -> Self
    where
        K: Fn(&RequestHead<'_>) -> String + Send + Sync + 'static,
    {
        Self {
            get_key: Some(Arc::new(get_key)),
            ..Self::default()
        }
    }

    /// One bucket per key, keys spread over `shards` independently locked
    /// maps by `get_hash`.
    pub fn limit_by_bucketed_keys<H, K>(shards: usize, get_hash: H, get_key: K) -> Self
    where
        H: Fn(&[u8]) -> u32 + Send + Sync + 'static,
        K: Fn(&RequestHead<'_>) -> String + Send + Sync + 'static,
    {
        Self {
            shards,
            get_key: Some(Arc::new(get_key)),
            get_hash: Some(Arc::new(get_hash)),
            ..Self::default()
        }
    }

    /// Apply `max_requests` per `interval` to every key.
    pub fn with_default_quota(self, max_requests: u32, interval: Duration) -> Result<Self> {
        Ok(self.with_quota(Quota::new(max_requests, interval)?))
    }

    /// Apply `quota` to every key.
    pub fn with_quota(mut self, quota: Quota) -> Self {
        self.get_quota = Arc::new(move |_: &str| quota.clone());
        self
    }

    /// Pick the quota per key.
    pub fn with_quota_by_keys<Q>(mut self, get_quota: Q) -> Self
    where
        Q: Fn(&str) -> Quota + Send + Sync + 'static,
    {
        self.get_quota = Arc::new(get_quota);
        self
    }

    /// Status written when a request is rejected. Defaults to 429.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Status written when a request is rejected.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Configured shard count; zero means unsharded.
    pub fn shards(&self) -> usize {
        self.shards
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("status", &self.status)
            .field("shards", &self.shards)
            .field("get_key", &self.get_key.is_some())
            .field("get_hash", &self.get_hash.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account_id(head: &RequestHead<'_>) -> String {
        head.query_param("account_id").unwrap_or_default()
    }

    #[test]
    fn test_fnv1a_32_reference_values() {
        assert_eq!(fnv1a_32(b""), 0x811c_9dc5);
        assert_eq!(fnv1a_32(b"a"), 0xe40c_292c);
        assert_eq!(fnv1a_32(b"foobar"), 0xbf9c_f968);
    }

    #[test]
    fn test_global_defaults() {
        let opts = Options::global();

        assert_eq!(opts.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(opts.shards(), 0);
        assert!(opts.get_key.is_none());
        assert!(opts.get_hash.is_none());
        assert!((opts.get_quota)("anything").is_unlimited());
    }

    #[test]
    fn test_limit_by_keys() {
        let opts = Options::limit_by_keys(account_id);

        assert!(opts.get_key.is_some());
        assert!(opts.get_hash.is_none());
        assert_eq!(opts.shards(), 0);
    }

    #[test]
    fn test_limit_by_bucketed_keys() {
        let opts = Options::limit_by_bucketed_keys(10, fnv1a_32, account_id);

        assert!(opts.get_key.is_some());
        assert!(opts.get_hash.is_some());
        assert_eq!(opts.shards(), 10);
    }

    #[test]
    fn test_with_default_quota() {
        let opts = Options::global()
            .with_default_quota(5, Duration::from_secs(10))
            .unwrap();

        let quota = (opts.get_quota)("any");
        assert_eq!(quota.max_requests(), 5);
        assert_eq!(quota.interval(), Duration::from_secs(10));
    }

    #[test]
    fn test_with_default_quota_zero_interval() {
        assert!(Options::global().with_default_quota(5, Duration::ZERO).is_err());
    }

    #[test]
    fn test_with_quota_by_keys() {
        let opts = Options::limit_by_keys(account_id).with_quota_by_keys(|key| {
            if key == "premium" {
                Quota::per_second(100)
            } else {
                Quota::per_second(1)
            }
        });

        assert_eq!((opts.get_quota)("premium").max_requests(), 100);
        assert_eq!((opts.get_quota)("basic").max_requests(), 1);
    }

    #[test]
    fn test_with_status() {
        let opts = Options::global().with_status(StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(opts.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
