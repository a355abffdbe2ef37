//! Transport seam.
//!
//! The guard never talks to the network directly; it hands a
//! [`TransportRequest`] to whatever [`Transport`] implementation it was
//! constructed with and gets back a [`TransportResponse`] carrying an
//! ok/failed flag and a structured body. Timeouts and cancellation are the
//! transport's responsibility, not the guard's.

mod http;

pub use http::HttpTransport;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid target URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Transport error: {0}")]
    Other(String),
}

/// A fully prepared outbound request.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TransportRequest {
    pub url: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl TransportRequest {
    pub fn new(url: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(url, "GET")
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self::new(url, "POST").with_body(body)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A delivered upstream response.
///
/// `ok` reflects the upstream's own success signal (2xx for HTTP). The body
/// is parsed JSON when the payload parses, and a JSON string of the raw text
/// otherwise. Failures to deliver at all surface as [`TransportError`].
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub ok: bool,
    pub status: u16,
    pub body: Value,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(
        &self,
        request: &TransportRequest,
    ) -> std::result::Result<TransportResponse, TransportError>;
}
