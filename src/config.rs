//! Configuration management for Turnstile.
//!
//! Configuration is read from a YAML, TOML or JSON file and can be
//! overridden with `TURNSTILE__`-prefixed environment variables, using `__`
//! between nested keys (e.g. `TURNSTILE__RATE_LIMITING__STATUS=503`).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TurnstileError};
use crate::ratelimit::{fnv1a_32, Options, Quota, RequestHead};

const ENV_PREFIX: &str = "TURNSTILE";
const ENV_SEPARATOR: &str = "__";

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Status code for rejected requests
    #[serde(default = "default_status")]
    pub status: u16,

    /// Number of lock shards for per-key limiting; 0 disables sharding
    #[serde(default)]
    pub shards: usize,

    /// Where the rate limiting key comes from
    #[serde(default)]
    pub key: KeySource,

    /// Quota applied to every key without an override; unlimited if absent
    #[serde(default)]
    pub default_quota: Option<QuotaConfig>,

    /// Per-key quotas. Keys are matched exactly, case included.
    #[serde(default)]
    pub overrides: Vec<OverrideConfig>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            status: default_status(),
            shards: 0,
            key: KeySource::default(),
            default_quota: None,
            overrides: Vec::new(),
        }
    }
}

fn default_status() -> u16 {
    StatusCode::TOO_MANY_REQUESTS.as_u16()
}

/// A quota as written in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Requests allowed per interval
    pub requests: u32,

    /// Interval length in seconds
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_interval_secs() -> u64 {
    60
}

impl QuotaConfig {
    /// Build the quota, rejecting a zero interval.
    pub fn to_quota(&self) -> Result<Quota> {
        Quota::new(self.requests, Duration::from_secs(self.interval_secs))
    }
}

/// A quota for one key.
///
/// The key is a value rather than a map key so that file sources which
/// normalize map keys leave it untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideConfig {
    /// Key this quota applies to
    pub key: String,

    /// Requests allowed per interval
    pub requests: u32,

    /// Interval length in seconds
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl OverrideConfig {
    /// Build the quota for this key.
    pub fn to_quota(&self) -> Result<Quota> {
        QuotaConfig {
            requests: self.requests,
            interval_secs: self.interval_secs,
        }
        .to_quota()
    }
}

/// Where the rate limiting key is read from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum KeySource {
    /// No key: one global bucket
    #[default]
    None,
    /// A request header
    Header { name: String },
    /// A query string parameter
    Query { name: String },
    /// A path segment, counted from 0 after the leading slash
    Path { index: usize },
}

impl KeySource {
    /// Read the key from `request`. Missing values map to the empty key.
    pub fn extract(&self, request: &RequestHead<'_>) -> String {
        match self {
            KeySource::None => String::new(),
            KeySource::Header { name } => request.header(name).unwrap_or_default().to_string(),
            KeySource::Query { name } => request.query_param(name).unwrap_or_default(),
            KeySource::Path { index } => request.path_segment(*index).unwrap_or_default().to_string(),
        }
    }
}

impl TurnstileConfig {
    /// Load configuration from a file, with environment overrides on top.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator(ENV_SEPARATOR))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator(ENV_SEPARATOR))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse configuration: {}", e)))
    }
}

impl RateLimitingConfig {
    /// Build dispatcher options from this configuration.
    pub fn to_options(&self) -> Result<Options> {
        let status =
            StatusCode::from_u16(self.status).map_err(|_| TurnstileError::InvalidStatus(self.status))?;

        let default_quota = match &self.default_quota {
            Some(quota) => quota.to_quota()?,
            None => Quota::unlimited(),
        };
        let overrides = self
            .overrides
            .iter()
            .map(|entry| entry.to_quota().map(|quota| (entry.key.clone(), quota)))
            .collect::<Result<HashMap<String, Quota>>>()?;

        let options = match &self.key {
            KeySource::None => Options::global(),
            source => {
                let source = source.clone();
                let get_key = move |request: &RequestHead<'_>| source.extract(request);
                if self.shards > 0 {
                    Options::limit_by_bucketed_keys(self.shards, fnv1a_32, get_key)
                } else {
                    Options::limit_by_keys(get_key)
                }
            }
        };

        let options = if overrides.is_empty() {
            options.with_quota(default_quota)
        } else {
            options.with_quota_by_keys(move |key| {
                overrides
                    .get(key)
                    .cloned()
                    .unwrap_or_else(|| default_quota.clone())
            })
        };

        Ok(options.with_status(status))
    }
}
