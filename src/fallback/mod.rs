//! Provider fallback chains.
//!
//! Pure selection logic: no network calls here. A chain is an ordered set of
//! provider candidates; the guard walks them in priority order, skipping
//! providers still inside their failure cool-down, and short-circuits on the
//! first success. This module owns the chain registry and the per-provider
//! failure status map.

use crate::util::now_ms;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

/// One provider candidate, supplied by host configuration. Read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub name: String,
    /// Provider-native model identifier the endpoint serves.
    pub model: String,
    /// Lower value = tried earlier. Ties keep input order.
    pub priority: u32,
    pub enabled: bool,
}

impl ProviderDescriptor {
    pub fn new(name: impl Into<String>, model: impl Into<String>, priority: u32) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            priority,
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackChain {
    pub primary: ProviderDescriptor,
    pub fallbacks: Vec<ProviderDescriptor>,
}

impl FallbackChain {
    pub fn new(primary: ProviderDescriptor) -> Self {
        Self {
            primary,
            fallbacks: Vec::new(),
        }
    }

    pub fn with_fallback(mut self, provider: ProviderDescriptor) -> Self {
        self.fallbacks.push(provider);
        self
    }
}

/// Most recent failure for a provider. Presence alone means the provider is
/// excluded from selection until the cool-down elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub last_failure: u64,
}

/// Chain registry plus per-provider failure bookkeeping.
pub struct FallbackOrchestrator {
    chains: RwLock<HashMap<String, FallbackChain>>,
    failures: RwLock<HashMap<String, ProviderFailure>>,
}

impl FallbackOrchestrator {
    pub fn new() -> Self {
        Self {
            chains: RwLock::new(HashMap::new()),
            failures: RwLock::new(HashMap::new()),
        }
    }

    pub fn register_chain(&self, chain_id: impl Into<String>, chain: FallbackChain) {
        let chain_id = chain_id.into();
        tracing::info!(chain = %chain_id, "registered fallback chain");
        self.chains.write().unwrap().insert(chain_id, chain);
    }

    pub fn chain(&self, chain_id: &str) -> Option<FallbackChain> {
        self.chains.read().unwrap().get(chain_id).cloned()
    }

    /// Enabled candidates in try order: ascending priority, stable on ties.
    pub fn candidates(&self, chain: &FallbackChain) -> Vec<ProviderDescriptor> {
        let mut all: Vec<ProviderDescriptor> = std::iter::once(chain.primary.clone())
            .chain(chain.fallbacks.iter().cloned())
            .filter(|p| p.enabled)
            .collect();
        all.sort_by_key(|p| p.priority);
        all
    }

    /// True while `now - last_failure < cool_down`.
    pub fn in_cooldown(&self, provider: &str, cool_down: Duration) -> bool {
        let failures = self.failures.read().unwrap();
        match failures.get(provider) {
            Some(f) => now_ms().saturating_sub(f.last_failure) < cool_down.as_millis() as u64,
            None => false,
        }
    }

    pub fn record_failure(&self, provider: &str) {
        tracing::warn!(provider, "provider failed, entering cool-down");
        self.failures.write().unwrap().insert(
            provider.to_string(),
            ProviderFailure {
                last_failure: now_ms(),
            },
        );
    }

    /// Success deletes the failure status outright.
    pub fn record_success(&self, provider: &str) {
        self.failures.write().unwrap().remove(provider);
    }

    pub fn failure_statuses(&self) -> HashMap<String, ProviderFailure> {
        self.failures.read().unwrap().clone()
    }

    pub(crate) fn import_failures(&self, failures: HashMap<String, ProviderFailure>) {
        *self.failures.write().unwrap() = failures;
    }

    /// Drop all chains and failure statuses.
    pub fn reset(&self) {
        self.chains.write().unwrap().clear();
        self.failures.write().unwrap().clear();
    }

    /// Drop failure statuses only (chains survive a cache clear).
    pub fn clear_failures(&self) {
        self.failures.write().unwrap().clear();
    }
}

impl Default for FallbackOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> FallbackChain {
        FallbackChain::new(ProviderDescriptor::new("b", "model-b", 2))
            .with_fallback(ProviderDescriptor::new("a", "model-a", 1))
            .with_fallback(ProviderDescriptor::new("c", "model-c", 3).disabled())
    }

    #[test]
    fn test_candidates_sorted_and_filtered() {
        let orch = FallbackOrchestrator::new();
        let names: Vec<String> = orch
            .candidates(&chain())
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_candidates_stable_on_priority_ties() {
        let orch = FallbackOrchestrator::new();
        let chain = FallbackChain::new(ProviderDescriptor::new("first", "m", 1))
            .with_fallback(ProviderDescriptor::new("second", "m", 1))
            .with_fallback(ProviderDescriptor::new("third", "m", 1));
        let names: Vec<String> = orch
            .candidates(&chain)
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_chain_lookup() {
        let orch = FallbackOrchestrator::new();
        orch.register_chain("default", chain());
        assert!(orch.chain("default").is_some());
        assert!(orch.chain("missing").is_none());
    }

    #[test]
    fn test_cooldown_lifecycle() {
        let orch = FallbackOrchestrator::new();
        let cool_down = Duration::from_secs(60);
        assert!(!orch.in_cooldown("a", cool_down));
        orch.record_failure("a");
        assert!(orch.in_cooldown("a", cool_down));
        orch.record_success("a");
        assert!(!orch.in_cooldown("a", cool_down));
        assert!(orch.failure_statuses().is_empty());
    }

    #[test]
    fn test_cooldown_expires() {
        let orch = FallbackOrchestrator::new();
        orch.record_failure("a");
        assert!(orch.in_cooldown("a", Duration::from_millis(30)));
        std::thread::sleep(Duration::from_millis(40));
        assert!(!orch.in_cooldown("a", Duration::from_millis(30)));
        // status still present until the next success deletes it
        assert!(orch.failure_statuses().contains_key("a"));
    }

    #[test]
    fn test_reset_clears_chains_and_failures() {
        let orch = FallbackOrchestrator::new();
        orch.register_chain("default", chain());
        orch.record_failure("a");
        orch.reset();
        assert!(orch.chain("default").is_none());
        assert!(orch.failure_statuses().is_empty());
    }
}
