//! # execution-guard
//!
//! 出站请求执行守卫：为上游 AI 提供商调用提供响应去重、多窗口限流与熔断、
//! 以及按优先级排序的提供商回退。
//!
//! Outbound request execution guard for AI provider calls. Every upstream
//! request runs through one [`ExecutionGuard`] aggregate, which combines
//! three responsibilities:
//!
//! - **Response deduplication** — content-addressed caching keyed by a
//!   deterministic fingerprint of the request target and method, with TTL
//!   expiry and single-flight coalescing of concurrent identical calls.
//! - **Rate limiting with a circuit breaker** — sliding-window counters
//!   across several timescales (burst, minute, hour, day) that escalate to
//!   a `CLOSED`/`OPEN`/`HALF_OPEN` breaker under sustained pressure.
//! - **Provider fallback** — priority-ordered candidate chains with
//!   per-provider failure cool-downs and first-success short-circuiting.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use execution_guard::{
//!     ExecutionGuard, FallbackChain, GuardConfig, ProviderDescriptor, TransportRequest,
//! };
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> execution_guard::Result<()> {
//!     let guard = ExecutionGuard::builder()
//!         .with_config(GuardConfig::default())
//!         .build()?;
//!
//!     guard.register_chain(
//!         "chat",
//!         FallbackChain::new(ProviderDescriptor::new("openrouter", "gpt-4o", 1))
//!             .with_fallback(ProviderDescriptor::new("groq", "llama-3.3-70b", 2)),
//!     );
//!
//!     let result = guard
//!         .execute_with_fallback("chat", |provider| {
//!             Some(TransportRequest::post(
//!                 format!("https://{}.example.com/v1/chat", provider.name),
//!                 json!({ "model": provider.model, "messages": [] }),
//!             ))
//!         })
//!         .await?;
//!     println!("{result}");
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`fingerprint`] | Deterministic request fingerprinting |
//! | [`cache`] | Deduplication cache and request log |
//! | [`resilience`] | Sliding-window rate limiter and circuit breaker |
//! | [`fallback`] | Provider chains and failure cool-downs |
//! | [`guard`] | The [`ExecutionGuard`] aggregate |
//! | [`transport`] | Transport trait and the `reqwest` implementation |
//! | [`persistence`] | Best-effort durable snapshots |
//! | [`config`] | Typed configuration with validated defaults |
//!
//! The guard never retries a candidate and never queues a rejected request;
//! retry policy belongs to the caller. Dashboards, configuration loading,
//! and HTTP routing are host concerns.

pub mod cache;
pub mod config;
pub mod fallback;
pub mod fingerprint;
pub mod guard;
pub mod persistence;
pub mod resilience;
pub mod transport;

mod util;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};

// Re-export main types for convenience
pub use config::{
    CircuitBreakerConfig, DeduplicationConfig, FallbackConfig, GuardConfig, PersistenceConfig,
    RateLimitRule, RateLimitingConfig,
};
pub use fallback::{FallbackChain, ProviderDescriptor};
pub use fingerprint::{Fingerprint, FingerprintGenerator};
pub use guard::{ExecutionGuard, ExecutionGuardBuilder, GuardStats};
pub use persistence::{FileStore, GuardSnapshot, NullStore, SnapshotStore};
pub use resilience::{AdmissionDecision, BreakerState, ANONYMOUS_SCOPE, GLOBAL_SCOPE};
pub use transport::{HttpTransport, Transport, TransportError, TransportRequest, TransportResponse};
