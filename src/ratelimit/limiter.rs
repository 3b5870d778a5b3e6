//! A single token bucket paired with the quota it was built from.

use std::fmt;
use std::num::NonZeroU32;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota as GovernorQuota, RateLimiter as GovernorRateLimiter};

use super::quota::Quota;

type DirectRateLimiter = GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// The token bucket behind a limiter.
enum TokenBucket {
    /// Admits everything
    Open,
    /// Zero capacity, admits nothing
    Closed,
    /// GCRA bucket with burst equal to the quota's request count
    Metered(DirectRateLimiter),
}

impl TokenBucket {
    fn for_quota(quota: &Quota) -> Self {
        if quota.is_unlimited() {
            return TokenBucket::Open;
        }

        let Some(burst) = NonZeroU32::new(quota.max_requests()) else {
            return TokenBucket::Closed;
        };

        // One token comes back every interval / max_requests.
        match GovernorQuota::with_period(quota.interval() / burst.get()) {
            Some(gq) => TokenBucket::Metered(DirectRateLimiter::direct(gq.allow_burst(burst))),
            // Period rounds down to zero: the refill is effectively instant.
            None => TokenBucket::Open,
        }
    }

    fn try_acquire(&self) -> bool {
        match self {
            TokenBucket::Open => true,
            TokenBucket::Closed => false,
            TokenBucket::Metered(bucket) => bucket.check().is_ok(),
        }
    }
}

impl fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenBucket::Open => f.write_str("Open"),
            TokenBucket::Closed => f.write_str("Closed"),
            TokenBucket::Metered(_) => f.write_str("Metered"),
        }
    }
}

/// Admission state for one key (or for the whole server, in global mode).
///
/// `allow` is safe to call from many requests at once; the bucket does its
/// own synchronization.
#[derive(Debug)]
pub struct Limiter {
    bucket: TokenBucket,
    quota: Quota,
}

impl Limiter {
    /// Build a full bucket for `quota`.
    pub fn new(quota: Quota) -> Self {
        Self {
            bucket: TokenBucket::for_quota(&quota),
            quota,
        }
    }

    /// Try to take one token. Returns `true` if the request is admitted.
    pub fn allow(&self) -> bool {
        self.bucket.try_acquire()
    }

    /// Text for the `X-RateLimit-Limit` header.
    pub fn rpm(&self) -> &str {
        self.quota.rpm()
    }

    /// Text for the `Retry-After` header.
    pub fn retry_after(&self) -> &str {
        self.quota.retry_after()
    }

    /// The quota this limiter enforces.
    pub fn quota(&self) -> &Quota {
        &self.quota
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_limiter_allows_up_to_burst() {
        let limiter = Limiter::new(Quota::per_minute(3));

        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(limiter.allow());
        assert!(!limiter.allow());
    }

    #[test]
    fn test_limiter_refills() {
        let limiter = Limiter::new(Quota::new(1, Duration::from_millis(50)).unwrap());

        assert!(limiter.allow());
        assert!(!limiter.allow());

        std::thread::sleep(Duration::from_millis(80));
        assert!(limiter.allow());
    }

    #[test]
    fn test_zero_quota_never_allows() {
        let limiter = Limiter::new(Quota::per_second(0));

        for _ in 0..10 {
            assert!(!limiter.allow());
        }
    }

    #[test]
    fn test_unlimited_always_allows() {
        let limiter = Limiter::new(Quota::unlimited());

        for _ in 0..10_000 {
            assert!(limiter.allow());
        }
        assert_eq!(limiter.rpm(), "unlimited");
        assert_eq!(limiter.retry_after(), "");
    }

    #[test]
    fn test_descriptions_are_stable() {
        let limiter = Limiter::new(Quota::new(1, Duration::from_secs(2)).unwrap());

        let before = (limiter.rpm().to_string(), limiter.retry_after().to_string());
        for _ in 0..5 {
            limiter.allow();
        }

        assert_eq!(limiter.rpm(), before.0);
        assert_eq!(limiter.retry_after(), before.1);
        assert_eq!(limiter.rpm(), "30");
        assert_eq!(limiter.retry_after(), "2");
    }

    #[test]
    fn test_concurrent_allow_never_exceeds_burst() {
        let limiter = Arc::new(Limiter::new(Quota::per_hour(25)));
        let admitted = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..20 {
                        if limiter.allow() {
                            admitted.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                });
            }
        });

        assert_eq!(admitted.load(Ordering::SeqCst), 25);
    }
}
