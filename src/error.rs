use crate::transport::TransportError;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorContext {
    /// Configuration key or field that caused the error (e.g., "rate_limiting.per_minute.limit")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected range, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "config", "persistence")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Unified error type for the execution guard.
///
/// Admission rejections (`RateLimited`, `CircuitOpen`) only cross this
/// boundary on the guarded fetch path; the limiter itself reports them as
/// decision values. Persistence failures never surface here at all — they
/// are logged and swallowed where they happen.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Rate limit exceeded: {reason}. Retry after {retry_after_secs}s")]
    RateLimited {
        reason: String,
        retry_after_secs: u64,
    },

    #[error("Circuit breaker open. Retry after {retry_after_secs}s")]
    CircuitOpen { retry_after_secs: u64 },

    #[error("Network transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Fallback chain '{chain}' not found")]
    UnknownChain { chain: String },

    #[error("All providers in chain '{chain}' exhausted")]
    ChainExhausted {
        chain: String,
        #[source]
        source: Option<Box<Error>>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// True for admission rejections (rate limit or open breaker).
    pub fn is_admission_rejection(&self) -> bool {
        matches!(self, Error::RateLimited { .. } | Error::CircuitOpen { .. })
    }

    /// Suggested wait before retrying, when the error carries one.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Error::RateLimited {
                retry_after_secs, ..
            }
            | Error::CircuitOpen { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}
