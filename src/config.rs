//! Limiter configuration.
//!
//! Configuration is supplied at construction: the limits of every metered category, the idle
//! eviction threshold, the checkpoint interval, and the shard count of the bucket store. It can be
//! built in code, deserialized with `serde` (durations in milliseconds), or taken from the
//! environment on top of the defaults.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::category::{CategoryLimits, QuotaCategory};
use crate::error::ConfigError;
use crate::store::DEFAULT_SHARDS;

/// Limits per metered category.
pub type LimitTable = BTreeMap<QuotaCategory, CategoryLimits>;

/// Default idle time after which a bucket may be evicted.
pub const DEFAULT_IDLE_EVICTION: Duration = Duration::from_secs(60 * 60);
/// Default interval between background snapshot saves.
pub const DEFAULT_CHECKPOINT_INTERVAL: Duration = Duration::from_secs(30);

const ENV_IDLE_EVICTION_MS: &str = "QUOTAWARDEN_IDLE_EVICTION_MS";
const ENV_CHECKPOINT_INTERVAL_MS: &str = "QUOTAWARDEN_CHECKPOINT_INTERVAL_MS";
const ENV_SHARDS: &str = "QUOTAWARDEN_SHARDS";

/// Full limiter configuration.
///
/// ```
/// use quotawarden::{CategoryLimits, QuotaCategory, RateLimiterConfig};
/// use std::time::Duration;
///
/// let config = RateLimiterConfig::builder()
///     .limit(QuotaCategory::ForegroundCall, CategoryLimits::new(10.0, 0.1).unwrap())
///     .idle_eviction(Duration::from_secs(600))
///     .build()
///     .unwrap();
/// assert_eq!(config.shards(), 64);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    limits: LimitTable,
    #[serde(rename = "idle_eviction_ms", with = "duration_millis")]
    idle_eviction: Duration,
    #[serde(rename = "checkpoint_interval_ms", with = "duration_millis")]
    checkpoint_interval: Duration,
    shards: usize,
}

impl Default for RateLimiterConfig {
    /// Defaults for the three metered categories. Each bucket refills completely within fifteen
    /// minutes, well inside the idle eviction threshold, so evicting an idle bucket never hands
    /// back budget the caller was not already owed.
    fn default() -> Self {
        Self {
            limits: default_limits(),
            idle_eviction: DEFAULT_IDLE_EVICTION,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            shards: DEFAULT_SHARDS,
        }
    }
}

fn default_limits() -> LimitTable {
    let window = Duration::from_secs(15 * 60);
    [
        (QuotaCategory::ForegroundCall, 1_000),
        (QuotaCategory::BackgroundCall, 300),
        (QuotaCategory::DataWrite, 10_000),
    ]
    .into_iter()
    .filter_map(|(category, capacity)| {
        CategoryLimits::per_window(capacity, window).ok().map(|limits| (category, limits))
    })
    .collect()
}

impl RateLimiterConfig {
    /// Start from an empty limit table and default tuning.
    pub fn builder() -> RateLimiterConfigBuilder {
        RateLimiterConfigBuilder::new()
    }

    /// Defaults, overridden by `QUOTAWARDEN_*` environment variables when set.
    ///
    /// Recognized: `QUOTAWARDEN_IDLE_EVICTION_MS`, `QUOTAWARDEN_CHECKPOINT_INTERVAL_MS`,
    /// `QUOTAWARDEN_SHARDS`. Unparseable values are ignored with a warning.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary key lookup, then validate.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse = |name: &str| -> Option<u64> {
            let raw = lookup(name)?;
            match raw.trim().parse::<u64>() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(
                        target: "quotawarden::config",
                        variable = name,
                        value = %raw,
                        "ignoring unparseable override"
                    );
                    None
                }
            }
        };
        if let Some(ms) = parse(ENV_IDLE_EVICTION_MS) {
            self.idle_eviction = Duration::from_millis(ms);
        }
        if let Some(ms) = parse(ENV_CHECKPOINT_INTERVAL_MS) {
            self.checkpoint_interval = Duration::from_millis(ms);
        }
        if let Some(n) = parse(ENV_SHARDS) {
            self.shards = usize::try_from(n).unwrap_or(usize::MAX);
        }
        self.validate()?;
        Ok(self)
    }

    /// Check the values that cannot be enforced by construction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shards == 0 {
            return Err(ConfigError::ZeroShards);
        }
        if self.checkpoint_interval.is_zero() {
            return Err(ConfigError::ZeroCheckpointInterval);
        }
        Ok(())
    }

    pub fn limits(&self) -> &LimitTable {
        &self.limits
    }

    /// Limits of one category, if configured.
    pub fn limit(&self, category: QuotaCategory) -> Option<CategoryLimits> {
        self.limits.get(&category).copied()
    }

    pub fn idle_eviction(&self) -> Duration {
        self.idle_eviction
    }

    pub fn checkpoint_interval(&self) -> Duration {
        self.checkpoint_interval
    }

    pub fn shards(&self) -> usize {
        self.shards
    }
}

/// Builder for [`RateLimiterConfig`].
#[derive(Debug, Clone)]
pub struct RateLimiterConfigBuilder {
    config: RateLimiterConfig,
}

impl Default for RateLimiterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiterConfigBuilder {
    pub fn new() -> Self {
        Self { config: RateLimiterConfig { limits: LimitTable::new(), ..Default::default() } }
    }

    /// Set the limits of `category`. Limits for [`QuotaCategory::Unmetered`] are ignored.
    pub fn limit(mut self, category: QuotaCategory, limits: CategoryLimits) -> Self {
        if category.is_metered() {
            self.config.limits.insert(category, limits);
        }
        self
    }

    pub fn idle_eviction(mut self, after: Duration) -> Self {
        self.config.idle_eviction = after;
        self
    }

    pub fn checkpoint_interval(mut self, every: Duration) -> Self {
        self.config.checkpoint_interval = every;
        self
    }

    pub fn shards(mut self, shards: usize) -> Self {
        self.config.shards = shards;
        self
    }

    pub fn build(self) -> Result<RateLimiterConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
