//! Dispatcher configuration.
//!
//! Every value has a default and may be overridden from the environment:
//!
//! | Variable | Default |
//! |---|---|
//! | `STATUS_DISPATCH_PUBLISHING_ENABLED` | `true` |
//! | `STATUS_DISPATCH_RETRY_ENABLED` | `true` |
//! | `STATUS_DISPATCH_RETRY_INITIAL_DELAY_MS` | `10000` |
//! | `STATUS_DISPATCH_RETRY_MAX_DELAY_MS` | `3600000` |
//! | `STATUS_DISPATCH_RETRY_MAX_DURATION_MS` | `86400000` |
//! | `STATUS_DISPATCH_LOCK_STRIPES` | `1000` |
//! | `STATUS_DISPATCH_ORDER_CACHE_CAPACITY` | `1000` |
//! | `STATUS_DISPATCH_CHECK_STATUS_BEFORE_PUBLISHING` | `true` |
//! | `STATUS_DISPATCH_QUEUE_ENABLED` | `true` |
//! | `STATUS_DISPATCH_FEATURE_CACHE_TTL_SECS` | `300` |

use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Default delay before the first retry (10 seconds).
const DEFAULT_INITIAL_DELAY_MS: u64 = 10_000;

/// Default delay ceiling (1 hour).
const DEFAULT_MAX_DELAY_MS: u64 = 3_600_000;

/// Default ceiling on time spent retrying since the first failure (1 day).
const DEFAULT_MAX_DURATION_MS: u64 = 86_400_000;

const DEFAULT_LOCK_STRIPES: usize = 1000;

const DEFAULT_ORDER_CACHE_CAPACITY: usize = 1000;

const DEFAULT_FEATURE_CACHE_TTL_SECS: u64 = 300;

/// A malformed configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{name} must be a boolean, got {value:?}")]
    InvalidBool { name: &'static str, value: String },

    #[error("{name} must be a non-negative integer, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("{name} must be at least 1")]
    Zero { name: &'static str },
}

/// Backoff settings for failed publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetryConfig {
    /// Whether failed publishes are retried at all.
    pub enabled: bool,

    /// Delay before the first retry. Each following retry doubles it.
    #[serde(serialize_with = "as_millis")]
    pub initial_delay: Duration,

    /// A retry whose delay would exceed this is refused.
    #[serde(serialize_with = "as_millis")]
    pub max_delay: Duration,

    /// Retries stop once this much time has passed since the first failure
    /// of the build type.
    #[serde(serialize_with = "as_millis")]
    pub max_duration: Duration,
}

impl RetryConfig {
    pub const DEFAULT: Self = Self {
        enabled: true,
        initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
        max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        max_duration: Duration::from_millis(DEFAULT_MAX_DURATION_MS),
    };

    pub const DISABLED: Self = Self {
        enabled: false,
        ..Self::DEFAULT
    };
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Whole milliseconds of `duration`, saturating at `u64::MAX`.
pub(crate) fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn as_millis<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration_millis(*value))
}

/// Configuration for the [`EventDispatcher`](super::EventDispatcher).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatcherConfig {
    /// Global publishing switch. A build type can override it with
    /// `status_publisher.enabled=true`.
    pub publishing_enabled: bool,

    pub retry: RetryConfig,

    /// Number of lock stripes.
    pub lock_stripes: usize,

    /// Number of promotions remembered by the order cache.
    pub order_cache_capacity: usize,

    /// Ask the hosting service for the current status before publishing a
    /// queue event.
    pub check_status_before_publishing: bool,

    /// Whether QUEUED and REMOVED_FROM_QUEUE are published.
    pub queue_enabled: bool,

    /// How long the "build type uses status publishing" answer is cached.
    #[serde(serialize_with = "as_millis")]
    pub feature_cache_ttl: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatcherConfig {
    pub fn new() -> Self {
        DispatcherConfig {
            publishing_enabled: true,
            retry: RetryConfig::DEFAULT,
            lock_stripes: DEFAULT_LOCK_STRIPES,
            order_cache_capacity: DEFAULT_ORDER_CACHE_CAPACITY,
            check_status_before_publishing: true,
            queue_enabled: true,
            feature_cache_ttl: Duration::from_secs(DEFAULT_FEATURE_CACHE_TTL_SECS),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_publishing_enabled(mut self, enabled: bool) -> Self {
        self.publishing_enabled = enabled;
        self
    }

    pub fn with_lock_stripes(mut self, stripes: usize) -> Self {
        self.lock_stripes = stripes.max(1);
        self
    }

    pub fn with_order_cache_capacity(mut self, capacity: usize) -> Self {
        self.order_cache_capacity = capacity.max(1);
        self
    }

    pub fn with_status_check(mut self, enabled: bool) -> Self {
        self.check_status_before_publishing = enabled;
        self
    }

    pub fn with_queue_enabled(mut self, enabled: bool) -> Self {
        self.queue_enabled = enabled;
        self
    }

    pub fn with_feature_cache_ttl(mut self, ttl: Duration) -> Self {
        self.feature_cache_ttl = ttl;
        self
    }

    /// Reads the configuration from `STATUS_DISPATCH_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::new();
        let vars = Vars { lookup: &lookup };

        let retry = RetryConfig {
            enabled: vars.bool("STATUS_DISPATCH_RETRY_ENABLED", defaults.retry.enabled)?,
            initial_delay: vars.millis(
                "STATUS_DISPATCH_RETRY_INITIAL_DELAY_MS",
                defaults.retry.initial_delay,
            )?,
            max_delay: vars.millis("STATUS_DISPATCH_RETRY_MAX_DELAY_MS", defaults.retry.max_delay)?,
            max_duration: vars.millis(
                "STATUS_DISPATCH_RETRY_MAX_DURATION_MS",
                defaults.retry.max_duration,
            )?,
        };

        Ok(DispatcherConfig {
            publishing_enabled: vars.bool(
                "STATUS_DISPATCH_PUBLISHING_ENABLED",
                defaults.publishing_enabled,
            )?,
            retry,
            lock_stripes: vars.positive("STATUS_DISPATCH_LOCK_STRIPES", defaults.lock_stripes)?,
            order_cache_capacity: vars.positive(
                "STATUS_DISPATCH_ORDER_CACHE_CAPACITY",
                defaults.order_cache_capacity,
            )?,
            check_status_before_publishing: vars.bool(
                "STATUS_DISPATCH_CHECK_STATUS_BEFORE_PUBLISHING",
                defaults.check_status_before_publishing,
            )?,
            queue_enabled: vars.bool("STATUS_DISPATCH_QUEUE_ENABLED", defaults.queue_enabled)?,
            feature_cache_ttl: Duration::from_secs(vars.number(
                "STATUS_DISPATCH_FEATURE_CACHE_TTL_SECS",
                defaults.feature_cache_ttl.as_secs(),
            )?),
        })
    }
}

struct Vars<'a, F> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &'static str, default: bool) -> Result<bool, ConfigError> {
        let Some(value) = self.get(name) else {
            return Ok(default);
        };
        match value.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidBool { name, value }),
        }
    }

    fn number<T: FromStr>(&self, name: &'static str, default: T) -> Result<T, ConfigError> {
        match self.get(name) {
            None => Ok(default),
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidNumber { name, value }),
        }
    }

    fn positive(&self, name: &'static str, default: usize) -> Result<usize, ConfigError> {
        match self.number(name, default)? {
            0 => Err(ConfigError::Zero { name }),
            n => Ok(n),
        }
    }

    fn millis(&self, name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        self.number(name, duration_millis(default))
            .map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults() {
        let config = DispatcherConfig::new();
        assert!(config.publishing_enabled);
        assert!(config.retry.enabled);
        assert_eq!(config.retry.initial_delay, Duration::from_secs(10));
        assert_eq!(config.retry.max_delay, Duration::from_secs(3600));
        assert_eq!(config.retry.max_duration, Duration::from_secs(86_400));
        assert_eq!(config.lock_stripes, 1000);
        assert_eq!(config.order_cache_capacity, 1000);
        assert!(config.check_status_before_publishing);
        assert!(config.queue_enabled);
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = DispatcherConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, DispatcherConfig::new());
    }

    #[test]
    fn overrides_are_applied() {
        let config = DispatcherConfig::from_lookup(lookup(&[
            ("STATUS_DISPATCH_RETRY_ENABLED", "false"),
            ("STATUS_DISPATCH_RETRY_INITIAL_DELAY_MS", "500"),
            ("STATUS_DISPATCH_LOCK_STRIPES", "8"),
            ("STATUS_DISPATCH_QUEUE_ENABLED", "no"),
            ("STATUS_DISPATCH_FEATURE_CACHE_TTL_SECS", "1"),
        ]))
        .unwrap();
        assert!(!config.retry.enabled);
        assert_eq!(config.retry.initial_delay, Duration::from_millis(500));
        assert_eq!(config.lock_stripes, 8);
        assert!(!config.queue_enabled);
        assert_eq!(config.feature_cache_ttl, Duration::from_secs(1));
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert_eq!(
            DispatcherConfig::from_lookup(lookup(&[("STATUS_DISPATCH_RETRY_ENABLED", "maybe")])),
            Err(ConfigError::InvalidBool {
                name: "STATUS_DISPATCH_RETRY_ENABLED",
                value: "maybe".to_string()
            })
        );
        assert!(matches!(
            DispatcherConfig::from_lookup(lookup(&[("STATUS_DISPATCH_RETRY_MAX_DELAY_MS", "-1")])),
            Err(ConfigError::InvalidNumber { .. })
        ));
        assert_eq!(
            DispatcherConfig::from_lookup(lookup(&[("STATUS_DISPATCH_LOCK_STRIPES", "0")])),
            Err(ConfigError::Zero {
                name: "STATUS_DISPATCH_LOCK_STRIPES"
            })
        );
    }

    #[test]
    fn builder_clamps_sizes() {
        let config = DispatcherConfig::new()
            .with_lock_stripes(0)
            .with_order_cache_capacity(0);
        assert_eq!(config.lock_stripes, 1);
        assert_eq!(config.order_cache_capacity, 1);
    }

    #[test]
    fn millis_saturate_instead_of_truncating() {
        assert_eq!(duration_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(duration_millis(Duration::MAX), u64::MAX);
    }
}
