//! Typed guard configuration with documented defaults.
//!
//! Every knob the guard exposes lives here, validated once at construction
//! (and again on [`crate::ExecutionGuard::update_config`]). Hosts decide how
//! these values are sourced — files, environment, UI forms — this crate only
//! consumes the finished struct.

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// A single sliding-window rule: at most `limit` admissions per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub limit: u64,
    pub window: Duration,
}

impl RateLimitRule {
    pub fn new(limit: u64, window: Duration) -> Self {
        Self { limit, window }
    }
}

/// Deduplication cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeduplicationConfig {
    pub enabled: bool,
    /// How long a stored response satisfies repeat lookups.
    pub ttl: Duration,
    /// Hard cap on the entry map; least-recently-accessed entries are
    /// evicted once it is reached.
    pub max_entries: usize,
    /// Ring-buffer cap on the observability request log.
    pub request_log_cap: usize,
    /// Fold a canonical rendering of the request body into the fingerprint.
    /// Off by default: two requests to the same URL and method collide even
    /// when their payloads differ.
    pub include_body: bool,
}

impl Default for DeduplicationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(300),
            max_entries: 1000,
            request_log_cap: 1000,
            include_body: false,
        }
    }
}

/// Sliding-window rate limiting rules, evaluated in field order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    pub enabled: bool,
    pub per_minute: RateLimitRule,
    pub per_hour: RateLimitRule,
    pub per_day: RateLimitRule,
    /// The shortest, most sensitive rule; tripping it feeds the breaker.
    pub burst: RateLimitRule,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            per_minute: RateLimitRule::new(60, Duration::from_secs(60)),
            per_hour: RateLimitRule::new(500, Duration::from_secs(3600)),
            per_day: RateLimitRule::new(5000, Duration::from_secs(86_400)),
            burst: RateLimitRule::new(10, Duration::from_secs(10)),
        }
    }
}

impl RateLimitingConfig {
    /// Largest configured window; window entries older than this are swept.
    pub fn max_window(&self) -> Duration {
        self.per_minute
            .window
            .max(self.per_hour.window)
            .max(self.per_day.window)
            .max(self.burst.window)
    }
}

/// Circuit breaker parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub enabled: bool,
    /// Burst trips or recorded transport failures needed to open.
    pub failure_threshold: u32,
    /// How long an open breaker blocks before probing recovery.
    pub recovery_time: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 20,
            recovery_time: Duration::from_secs(60),
        }
    }
}

/// Provider fallback parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// How long a failed provider is excluded from candidate selection.
    pub recovery_cooldown: Duration,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            recovery_cooldown: Duration::from_secs(60),
        }
    }
}

/// Durable snapshot settings. Load/save is best-effort either way.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PersistenceConfig {
    pub enabled: bool,
    /// Snapshot file location; `None` disables the file store even when
    /// `enabled` is set.
    pub path: Option<PathBuf>,
}

/// Top-level guard configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub deduplication: DeduplicationConfig,
    pub rate_limiting: RateLimitingConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub fallback: FallbackConfig,
    pub persistence: PersistenceConfig,
}

impl GuardConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deduplication(mut self, dedup: DeduplicationConfig) -> Self {
        self.deduplication = dedup;
        self
    }

    pub fn with_rate_limiting(mut self, limits: RateLimitingConfig) -> Self {
        self.rate_limiting = limits;
        self
    }

    pub fn with_circuit_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = breaker;
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackConfig) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_persistence(mut self, persistence: PersistenceConfig) -> Self {
        self.persistence = persistence;
        self
    }

    /// Reject configurations the guard cannot run with.
    pub fn validate(&self) -> Result<()> {
        let rules = [
            ("rate_limiting.per_minute", &self.rate_limiting.per_minute),
            ("rate_limiting.per_hour", &self.rate_limiting.per_hour),
            ("rate_limiting.per_day", &self.rate_limiting.per_day),
            ("rate_limiting.burst", &self.rate_limiting.burst),
        ];
        for (path, rule) in rules {
            if rule.limit == 0 {
                return Err(Self::invalid(path, "limit must be greater than zero"));
            }
            if rule.window.is_zero() {
                return Err(Self::invalid(path, "window must be greater than zero"));
            }
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(Self::invalid(
                "circuit_breaker.failure_threshold",
                "threshold must be greater than zero",
            ));
        }
        if self.circuit_breaker.recovery_time.is_zero() {
            return Err(Self::invalid(
                "circuit_breaker.recovery_time",
                "recovery time must be greater than zero",
            ));
        }
        if self.deduplication.ttl.is_zero() {
            return Err(Self::invalid(
                "deduplication.ttl",
                "ttl must be greater than zero",
            ));
        }
        if self.deduplication.max_entries == 0 {
            return Err(Self::invalid(
                "deduplication.max_entries",
                "cache must allow at least one entry",
            ));
        }
        if self.deduplication.request_log_cap == 0 {
            return Err(Self::invalid(
                "deduplication.request_log_cap",
                "request log must retain at least one record",
            ));
        }
        Ok(())
    }

    fn invalid(path: &str, details: &str) -> Error {
        Error::configuration_with_context(
            "invalid guard configuration",
            ErrorContext::new()
                .with_field_path(path)
                .with_details(details)
                .with_source("config"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(GuardConfig::default().validate().is_ok());
    }

    #[test]
    fn test_default_rule_values() {
        let cfg = GuardConfig::default();
        assert_eq!(cfg.rate_limiting.per_minute.limit, 60);
        assert_eq!(cfg.rate_limiting.per_hour.limit, 500);
        assert_eq!(cfg.rate_limiting.per_day.limit, 5000);
        assert_eq!(cfg.rate_limiting.burst.limit, 10);
        assert_eq!(cfg.rate_limiting.burst.window, Duration::from_secs(10));
        assert_eq!(cfg.circuit_breaker.failure_threshold, 20);
        assert_eq!(cfg.circuit_breaker.recovery_time, Duration::from_secs(60));
        assert_eq!(cfg.fallback.recovery_cooldown, Duration::from_secs(60));
        assert_eq!(cfg.deduplication.ttl, Duration::from_secs(300));
        assert!(!cfg.deduplication.include_body);
    }

    #[test]
    fn test_zero_limit_rejected() {
        let mut cfg = GuardConfig::default();
        cfg.rate_limiting.burst.limit = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("rate_limiting.burst"));
    }

    #[test]
    fn test_zero_window_rejected() {
        let mut cfg = GuardConfig::default();
        cfg.rate_limiting.per_hour.window = Duration::ZERO;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let mut cfg = GuardConfig::default();
        cfg.circuit_breaker.failure_threshold = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_max_window_picks_largest() {
        let cfg = RateLimitingConfig::default();
        assert_eq!(cfg.max_window(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let cfg = GuardConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: GuardConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }
}
