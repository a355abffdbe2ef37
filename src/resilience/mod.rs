//! 弹性模块：滑动窗口限流与熔断器，守护上游调用免受洪峰冲击。
//!
//! # Resilience Module
//!
//! Admission control for outbound calls: several sliding-window counters at
//! different timescales, escalating to a circuit breaker under sustained
//! pressure.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`RateLimiter`] | Multi-window sliding-window limiter with lazy sweeping |
//! | [`CircuitBreaker`] | `CLOSED`/`OPEN`/`HALF_OPEN` machine with timer-free recovery |
//! | [`AdmissionDecision`] | Admit/reject outcome returned as a value, never thrown |
//!
//! ## Circuit Breaker
//!
//! - **Closed**: normal operation, requests pass through
//! - **Open**: failures exceeded threshold, requests fail fast
//! - **Half-Open**: cool-down elapsed, the next admitted request closes it
//!
//! The `OPEN -> HALF_OPEN` transition is a pure function of "now", evaluated
//! lazily inside the next admission check. No background timer exists.

pub mod circuit_breaker;
pub mod rate_limiter;

pub use circuit_breaker::{BreakerSnapshot, BreakerState, CircuitBreaker};
pub use rate_limiter::{
    AdmissionDecision, RateLimiter, RateLimiterStats, RuleKind, RuleUsage, ANONYMOUS_SCOPE,
    GLOBAL_SCOPE,
};
