//! Request fingerprinting.
//!
//! A fingerprint is a deterministic, fixed-length digest of a request's
//! target URL and method. Identical inputs always produce identical output;
//! there is no dependence on wall clock, call count, or (by default) the
//! request body.

use crate::transport::TransportRequest;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Number of hex characters kept from the SHA-256 digest.
const FINGERPRINT_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Fingerprint {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Derives fingerprints from request targets.
pub struct FingerprintGenerator {
    include_body: bool,
}

impl FingerprintGenerator {
    pub fn new() -> Self {
        Self {
            include_body: false,
        }
    }

    /// Fold a canonical rendering of the body into the digest. Default off:
    /// requests to the same URL and method collide regardless of payload.
    pub fn with_include_body(mut self, include_body: bool) -> Self {
        self.include_body = include_body;
        self
    }

    /// Digest of `{method, url}` (plus the body when enabled), truncated to
    /// 16 hex characters. Method is uppercased so `get` and `GET` agree.
    pub fn fingerprint(&self, url: &str, method: &str) -> Fingerprint {
        self.digest(url, method, None)
    }

    pub fn fingerprint_request(&self, request: &TransportRequest) -> Fingerprint {
        let body = if self.include_body {
            request.body.as_ref()
        } else {
            None
        };
        self.digest(&request.url, &request.method, body)
    }

    fn digest(&self, url: &str, method: &str, body: Option<&serde_json::Value>) -> Fingerprint {
        let mut parts: BTreeMap<&str, String> = BTreeMap::new();
        parts.insert("url", url.to_string());
        parts.insert("method", method.to_ascii_uppercase());
        if let Some(body) = body {
            parts.insert("body", serde_json::to_string(body).unwrap_or_default());
        }
        let canonical = serde_json::to_string(&parts).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let hex: String = hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        Fingerprint(hex[..FINGERPRINT_LEN].to_string())
    }
}

impl Default for FingerprintGenerator {
    fn default() -> Self {
        Self::new()
    }
}
