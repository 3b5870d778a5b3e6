//! Strategies that decide which limiter governs a request.
//!
//! A strategy is selected once from the [`Options`] and never changes while
//! serving. Keyed strategies create limiters lazily: the first request for a
//! key builds its bucket, later requests reuse it. Creation happens inside
//! the owning lock, so two racing first requests for the same key always end
//! up sharing one limiter.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::limiter::Limiter;
use super::options::{HashFn, KeyFn, Options, QuotaFn};
use super::request::RequestHead;

/// Which strategy a dispatcher runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// Single bucket for every request
    Global,
    /// One bucket per key, one lock
    Key,
    /// One bucket per key, one lock per shard
    BucketedKey,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyKind::Global => "global",
            StrategyKind::Key => "key",
            StrategyKind::BucketedKey => "bucketed_key",
        };
        f.write_str(name)
    }
}

/// Key to limiter map behind one mutex.
struct LimiterMap {
    limiters: Mutex<HashMap<String, Arc<Limiter>>>,
}

impl LimiterMap {
    fn new() -> Self {
        Self {
            limiters: Mutex::new(HashMap::new()),
        }
    }

    /// Return the limiter for `key`, building it under the lock on first use.
    fn get_or_create(&self, key: &str, get_quota: &QuotaFn) -> Arc<Limiter> {
        let mut limiters = self.limiters.lock();

        if let Some(limiter) = limiters.get(key) {
            return Arc::clone(limiter);
        }

        let quota = get_quota(key);
        debug!(
            key = %key,
            rpm = quota.rpm(),
            "Creating new limiter"
        );
        let limiter = Arc::new(Limiter::new(quota));
        limiters.insert(key.to_owned(), Arc::clone(&limiter));
        limiter
    }

    fn len(&self) -> usize {
        self.limiters.lock().len()
    }
}

/// A single limiter built eagerly from the quota for the empty key.
pub struct GlobalStrategy {
    limiter: Arc<Limiter>,
}

impl GlobalStrategy {
    /// Build the shared limiter.
    pub fn new(get_quota: &QuotaFn) -> Self {
        Self {
            limiter: Arc::new(Limiter::new(get_quota(""))),
        }
    }

    /// Always the same limiter.
    pub fn resolve(&self, _request: &RequestHead<'_>) -> Arc<Limiter> {
        Arc::clone(&self.limiter)
    }
}

/// Per-key limiters in one map behind one mutex.
pub struct KeyStrategy {
    get_key: KeyFn,
    get_quota: QuotaFn,
    limiters: LimiterMap,
}

impl KeyStrategy {
    /// Create an empty per-key strategy.
    pub fn new(get_key: KeyFn, get_quota: QuotaFn) -> Self {
        Self {
            get_key,
            get_quota,
            limiters: LimiterMap::new(),
        }
    }

    /// Limiter for the request's key.
    pub fn resolve(&self, request: &RequestHead<'_>) -> Arc<Limiter> {
        let key = (self.get_key)(request);
        self.resolve_key(&key)
    }

    /// Limiter for `key`, created on first use.
    pub fn resolve_key(&self, key: &str) -> Arc<Limiter> {
        self.limiters.get_or_create(key, &self.get_quota)
    }

    /// Number of keys seen so far.
    pub fn limiter_count(&self) -> usize {
        self.limiters.len()
    }
}

/// Per-key limiters spread over independently locked shards.
///
/// A key always hashes to the same shard, so only keys that collide into a
/// shard contend for its lock.
pub struct BucketedKeyStrategy {
    get_key: KeyFn,
    get_hash: HashFn,
    get_quota: QuotaFn,
    shards: Box<[LimiterMap]>,
}

impl BucketedKeyStrategy {
    /// Create `shard_count` empty shards.
    ///
    /// `shard_count` must be non-zero; [`Strategy::select`] never builds this
    /// strategy otherwise.
    pub fn new(shard_count: usize, get_hash: HashFn, get_key: KeyFn, get_quota: QuotaFn) -> Self {
        assert!(shard_count > 0, "bucketed strategy needs at least one shard");

        Self {
            get_key,
            get_hash,
            get_quota,
            shards: (0..shard_count).map(|_| LimiterMap::new()).collect(),
        }
    }

    /// Limiter for the request's key.
    pub fn resolve(&self, request: &RequestHead<'_>) -> Arc<Limiter> {
        let key = (self.get_key)(request);
        self.resolve_key(&key)
    }

    /// Limiter for `key`, created on first use. Only the key's shard is locked.
    pub fn resolve_key(&self, key: &str) -> Arc<Limiter> {
        self.shards[self.shard_for(key)].get_or_create(key, &self.get_quota)
    }

    /// Index of the shard `key` lives in.
    pub fn shard_for(&self, key: &str) -> usize {
        let hash = (self.get_hash)(key.as_bytes());
        (u64::from(hash) % self.shards.len() as u64) as usize
    }

    /// Number of shards.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Number of keys seen so far, across all shards.
    pub fn limiter_count(&self) -> usize {
        self.shards.iter().map(LimiterMap::len).sum()
    }
}

/// The strategy a dispatcher resolves limiters with.
pub enum Strategy {
    Global(GlobalStrategy),
    Key(KeyStrategy),
    BucketedKey(BucketedKeyStrategy),
}

impl Strategy {
    /// Pick a strategy from the options.
    ///
    /// - no key extractor: global
    /// - key extractor, plus a hash function and at least one shard: bucketed
    /// - key extractor otherwise: key
    pub fn select(options: &Options) -> Self {
        let get_quota = Arc::clone(&options.get_quota);

        let Some(get_key) = options.get_key.clone() else {
            return Strategy::Global(GlobalStrategy::new(&get_quota));
        };

        match (&options.get_hash, options.shards) {
            (Some(get_hash), shards) if shards > 0 => Strategy::BucketedKey(
                BucketedKeyStrategy::new(shards, Arc::clone(get_hash), get_key, get_quota),
            ),
            (Some(_), _) => {
                warn!("Hash function configured with zero shards, limiting by unsharded keys");
                Strategy::Key(KeyStrategy::new(get_key, get_quota))
            }
            (None, shards) => {
                if shards > 0 {
                    warn!(shards, "Shards configured without a hash function, limiting by unsharded keys");
                }
                Strategy::Key(KeyStrategy::new(get_key, get_quota))
            }
        }
    }

    /// Limiter governing `request`, created on first use.
    pub fn resolve(&self, request: &RequestHead<'_>) -> Arc<Limiter> {
        match self {
            Strategy::Global(s) => s.resolve(request),
            Strategy::Key(s) => s.resolve(request),
            Strategy::BucketedKey(s) => s.resolve(request),
        }
    }

    /// Which variant this is.
    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Global(_) => StrategyKind::Global,
            Strategy::Key(_) => StrategyKind::Key,
            Strategy::BucketedKey(_) => StrategyKind::BucketedKey,
        }
    }

    /// Number of limiters currently held.
    pub fn limiter_count(&self) -> usize {
        match self {
            Strategy::Global(_) => 1,
            Strategy::Key(s) => s.limiter_count(),
            Strategy::BucketedKey(s) => s.limiter_count(),
        }
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Strategy")
            .field("kind", &self.kind())
            .field("limiters", &self.limiter_count())
            .finish()
    }
}
