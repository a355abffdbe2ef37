use super::circuit_breaker::{BreakerSnapshot, CircuitBreaker};
use crate::config::{CircuitBreakerConfig, RateLimitRule, RateLimitingConfig};
use crate::util::format_window_ms;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

/// Scope counted against every entry regardless of owner.
pub const GLOBAL_SCOPE: &str = "global";
/// Scope used when the caller has no session/client identity.
pub const ANONYMOUS_SCOPE: &str = "anonymous";

/// The configured rules, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    PerMinute,
    PerHour,
    PerDay,
    Burst,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::PerMinute => "per_minute",
            RuleKind::PerHour => "per_hour",
            RuleKind::PerDay => "per_day",
            RuleKind::Burst => "burst",
        }
    }
}

/// Outcome of an admission check. A decision value, never an error: the
/// guarded fetch path converts rejections for the fallback loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionDecision {
    Admitted,
    Limited {
        reason: String,
        retry_after_secs: u64,
        /// The rule that tripped; `None` for a breaker rejection.
        rule: Option<RuleKind>,
    },
}

impl AdmissionDecision {
    pub fn is_limited(&self) -> bool {
        matches!(self, AdmissionDecision::Limited { .. })
    }
}

/// Current usage against one rule, all scopes combined.
#[derive(Debug, Clone, Serialize)]
pub struct RuleUsage {
    pub current: u64,
    pub limit: u64,
    pub percentage: u64,
    pub window_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterStats {
    pub circuit_breaker_state: String,
    pub failure_count: u32,
    pub total_requests_tracked: usize,
    /// Keyed by rule name (`per_minute`, `per_hour`, `per_day`, `burst`).
    pub rules: HashMap<String, RuleUsage>,
}

#[derive(Debug, Clone)]
struct WindowEntry {
    at: Instant,
    scope: String,
}

struct Inner {
    entries: Vec<WindowEntry>,
    config: RateLimitingConfig,
}

/// Multi-window sliding-window rate limiter with an embedded breaker.
///
/// Admission is synchronous and fail-fast: a rejected request is never
/// queued or delayed, the decision is simply returned.
pub struct RateLimiter {
    inner: Mutex<Inner>,
    breaker: CircuitBreaker,
}

impl RateLimiter {
    pub fn new(config: RateLimitingConfig, breaker_config: CircuitBreakerConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: Vec::new(),
                config,
            }),
            breaker: CircuitBreaker::new(breaker_config),
        }
    }

    /// Admission check for one scope.
    ///
    /// Order matters: the breaker gates first (an open breaker consults no
    /// rule window and records nothing), then stale entries are swept, then
    /// each rule is counted in declared order. Only a fully admitted request
    /// appends a window entry.
    pub fn check(&self, scope: &str) -> AdmissionDecision {
        let mut inner = self.inner.lock().unwrap();
        if !inner.config.enabled {
            return AdmissionDecision::Admitted;
        }

        if let Err(retry_after_secs) = self.breaker.gate() {
            return AdmissionDecision::Limited {
                reason: "circuit breaker open".to_string(),
                retry_after_secs,
                rule: None,
            };
        }

        let now = Instant::now();
        let max_window = inner.config.max_window();
        inner.entries.retain(|e| now.duration_since(e.at) < max_window);

        let rules = [
            (RuleKind::PerMinute, inner.config.per_minute),
            (RuleKind::PerHour, inner.config.per_hour),
            (RuleKind::PerDay, inner.config.per_day),
            (RuleKind::Burst, inner.config.burst),
        ];

        for (kind, rule) in rules {
            if let Some(decision) = Self::check_rule(&inner.entries, scope, now, kind, rule) {
                if kind == RuleKind::Burst {
                    self.breaker.on_burst_trip();
                }
                tracing::warn!(scope, rule = kind.as_str(), "rate limit tripped");
                return decision;
            }
        }

        inner.entries.push(WindowEntry {
            at: now,
            scope: scope.to_string(),
        });
        self.breaker.on_admitted();
        AdmissionDecision::Admitted
    }

    fn check_rule(
        entries: &[WindowEntry],
        scope: &str,
        now: Instant,
        kind: RuleKind,
        rule: RateLimitRule,
    ) -> Option<AdmissionDecision> {
        let in_window = entries.iter().filter(|e| {
            now.duration_since(e.at) < rule.window && (scope == GLOBAL_SCOPE || e.scope == scope)
        });
        let mut count: u64 = 0;
        let mut oldest: Option<Instant> = None;
        for entry in in_window {
            count += 1;
            oldest = Some(match oldest {
                Some(o) if o <= entry.at => o,
                _ => entry.at,
            });
        }
        if count < rule.limit {
            return None;
        }
        // Time until the oldest in-window entry leaves the window.
        let retry_after_secs = oldest
            .map(|o| {
                let remaining = rule.window.saturating_sub(now.duration_since(o));
                remaining.as_secs_f64().ceil() as u64
            })
            .unwrap_or_else(|| rule.window.as_secs())
            .max(1);
        Some(AdmissionDecision::Limited {
            reason: format!(
                "{} requests per {}",
                rule.limit,
                format_window_ms(rule.window.as_millis() as u64)
            ),
            retry_after_secs,
            rule: Some(kind),
        })
    }

    /// Report a transport-level success. Separate from window accounting.
    pub fn record_success(&self, _scope: &str) {
        self.breaker.record_success();
    }

    /// Report a transport-level failure. Separate from window accounting.
    pub fn record_failure(&self, _scope: &str) {
        self.breaker.record_failure();
    }

    pub fn reset_breaker(&self) {
        self.breaker.reset();
    }

    /// Drop all window entries and reset the breaker.
    pub fn reset(&self) {
        self.inner.lock().unwrap().entries.clear();
        self.breaker.reset();
    }

    pub fn set_config(&self, config: RateLimitingConfig, breaker_config: CircuitBreakerConfig) {
        self.inner.lock().unwrap().config = config;
        self.breaker.set_config(breaker_config);
    }

    pub fn breaker_snapshot(&self) -> BreakerSnapshot {
        self.breaker.snapshot()
    }

    pub fn stats(&self) -> RateLimiterStats {
        let inner = self.inner.lock().unwrap();
        let now = Instant::now();
        let rules = [
            (RuleKind::PerMinute, inner.config.per_minute),
            (RuleKind::PerHour, inner.config.per_hour),
            (RuleKind::PerDay, inner.config.per_day),
            (RuleKind::Burst, inner.config.burst),
        ];
        let mut usage = HashMap::new();
        for (kind, rule) in rules {
            let current = inner
                .entries
                .iter()
                .filter(|e| now.duration_since(e.at) < rule.window)
                .count() as u64;
            usage.insert(
                kind.as_str().to_string(),
                RuleUsage {
                    current,
                    limit: rule.limit,
                    percentage: current * 100 / rule.limit.max(1),
                    window_ms: rule.window.as_millis() as u64,
                },
            );
        }
        let breaker = self.breaker.snapshot();
        RateLimiterStats {
            circuit_breaker_state: breaker.state.to_string(),
            failure_count: breaker.failure_count,
            total_requests_tracked: inner.entries.len(),
            rules: usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn limiter_with(per_minute: u64, burst: u64, threshold: u32) -> RateLimiter {
        let config = RateLimitingConfig {
            enabled: true,
            per_minute: RateLimitRule::new(per_minute, Duration::from_secs(60)),
            per_hour: RateLimitRule::new(500, Duration::from_secs(3600)),
            per_day: RateLimitRule::new(5000, Duration::from_secs(86_400)),
            burst: RateLimitRule::new(burst, Duration::from_secs(10)),
        };
        let breaker = CircuitBreakerConfig {
            enabled: true,
            failure_threshold: threshold,
            recovery_time: Duration::from_millis(100),
        };
        RateLimiter::new(config, breaker)
    }

    #[test]
    fn test_per_minute_limit_boundary() {
        // burst high enough to stay out of the way
        let rl = limiter_with(60, 1000, 1000);
        for _ in 0..60 {
            assert_eq!(rl.check("s1"), AdmissionDecision::Admitted);
        }
        match rl.check("s1") {
            AdmissionDecision::Limited {
                reason,
                retry_after_secs,
                rule,
            } => {
                assert_eq!(rule, Some(RuleKind::PerMinute));
                assert!(reason.contains("60 requests per 1m"));
                assert!(retry_after_secs > 0);
            }
            other => panic!("expected limited, got {:?}", other),
        }
    }

    #[test]
    fn test_scopes_counted_independently() {
        let rl = limiter_with(2, 1000, 1000);
        assert_eq!(rl.check("s1"), AdmissionDecision::Admitted);
        assert_eq!(rl.check("s1"), AdmissionDecision::Admitted);
        assert!(rl.check("s1").is_limited());
        // a different scope still has budget
        assert_eq!(rl.check("s2"), AdmissionDecision::Admitted);
    }

    #[test]
    fn test_global_scope_counts_all_entries() {
        let rl = limiter_with(3, 1000, 1000);
        assert_eq!(rl.check("s1"), AdmissionDecision::Admitted);
        assert_eq!(rl.check("s2"), AdmissionDecision::Admitted);
        assert_eq!(rl.check("s3"), AdmissionDecision::Admitted);
        assert!(rl.check(GLOBAL_SCOPE).is_limited());
    }

    #[test]
    fn test_rejected_request_not_recorded() {
        let rl = limiter_with(2, 1000, 1000);
        rl.check("s1");
        rl.check("s1");
        for _ in 0..5 {
            assert!(rl.check("s1").is_limited());
        }
        assert_eq!(rl.stats().total_requests_tracked, 2);
    }

    #[test]
    fn test_burst_trips_feed_breaker() {
        let rl = limiter_with(1000, 2, 3);
        rl.check("s1");
        rl.check("s1");
        // burst tripped three times, threshold 3 -> breaker opens
        assert!(rl.check("s1").is_limited());
        assert!(rl.check("s1").is_limited());
        match rl.check("s1") {
            AdmissionDecision::Limited { rule, .. } => assert_eq!(rule, Some(RuleKind::Burst)),
            other => panic!("expected limited, got {:?}", other),
        }
        // breaker now open: rejection without consulting rules
        match rl.check("s1") {
            AdmissionDecision::Limited { reason, rule, .. } => {
                assert_eq!(reason, "circuit breaker open");
                assert_eq!(rule, None);
            }
            other => panic!("expected limited, got {:?}", other),
        }
    }

    #[test]
    fn test_breaker_rejects_even_fresh_scope() {
        let rl = limiter_with(1000, 1, 1);
        rl.check("s1");
        assert!(rl.check("s1").is_limited()); // burst trip -> breaker opens
        // fresh scope with zero usage is still rejected
        match rl.check("brand-new") {
            AdmissionDecision::Limited { reason, .. } => {
                assert_eq!(reason, "circuit breaker open")
            }
            other => panic!("expected limited, got {:?}", other),
        }
    }

    #[test]
    fn test_breaker_recovery_cycle() {
        let rl = limiter_with(1000, 1, 1);
        rl.check("s1");
        assert!(rl.check("s1").is_limited()); // opens the breaker
        thread::sleep(Duration::from_millis(120));
        // recovery elapsed: gate flips to HALF_OPEN, fresh scope admits and closes
        assert_eq!(rl.check("s2"), AdmissionDecision::Admitted);
        let snap = rl.breaker_snapshot();
        assert_eq!(snap.state.to_string(), "CLOSED");
        assert_eq!(snap.failure_count, 0);
    }

    #[test]
    fn test_window_expiry_frees_budget() {
        let config = RateLimitingConfig {
            enabled: true,
            per_minute: RateLimitRule::new(2, Duration::from_millis(80)),
            per_hour: RateLimitRule::new(500, Duration::from_secs(3600)),
            per_day: RateLimitRule::new(5000, Duration::from_secs(86_400)),
            burst: RateLimitRule::new(1000, Duration::from_secs(10)),
        };
        let rl = RateLimiter::new(config, CircuitBreakerConfig::default());
        rl.check("s1");
        rl.check("s1");
        assert!(rl.check("s1").is_limited());
        thread::sleep(Duration::from_millis(100));
        assert_eq!(rl.check("s1"), AdmissionDecision::Admitted);
    }

    #[test]
    fn test_record_hooks_reach_breaker() {
        let rl = limiter_with(1000, 1000, 2);
        rl.record_failure("s1");
        rl.record_failure("s1");
        assert!(rl.check("s1").is_limited());
        rl.reset_breaker();
        assert_eq!(rl.check("s1"), AdmissionDecision::Admitted);
    }

    #[test]
    fn test_disabled_limiter_admits_everything() {
        let config = RateLimitingConfig {
            enabled: false,
            per_minute: RateLimitRule::new(1, Duration::from_secs(60)),
            ..Default::default()
        };
        let rl = RateLimiter::new(config, CircuitBreakerConfig::default());
        for _ in 0..10 {
            assert_eq!(rl.check("s1"), AdmissionDecision::Admitted);
        }
    }

    #[test]
    fn test_stats_usage_shape() {
        let rl = limiter_with(60, 10, 20);
        rl.check("s1");
        rl.check("s2");
        let stats = rl.stats();
        assert_eq!(stats.circuit_breaker_state, "CLOSED");
        assert_eq!(stats.total_requests_tracked, 2);
        let burst = &stats.rules["burst"];
        assert_eq!(burst.current, 2);
        assert_eq!(burst.limit, 10);
        assert_eq!(burst.percentage, 20);
        assert_eq!(burst.window_ms, 10_000);
        assert!(stats.rules.contains_key("per_minute"));
        assert!(stats.rules.contains_key("per_hour"));
        assert!(stats.rules.contains_key("per_day"));
    }

    #[test]
    fn test_retry_after_reflects_remaining_window() {
        let rl = limiter_with(1, 1000, 1000);
        rl.check("s1");
        match rl.check("s1") {
            AdmissionDecision::Limited {
                retry_after_secs, ..
            } => {
                // the only entry just landed, so nearly the whole window remains
                assert!(retry_after_secs >= 59 && retry_after_secs <= 60);
            }
            other => panic!("expected limited, got {:?}", other),
        }
    }
}
