//! The guard aggregate.
//!
//! One [`ExecutionGuard`] owns every piece of outbound-call mediation: the
//! fingerprint generator, the deduplication cache, the rate limiter with its
//! breaker, the fallback chain registry, the transport, and the snapshot
//! store. Hosts construct it explicitly (no global instance exists) and
//! inject it wherever upstream calls are made.

use crate::cache::{CacheStats, DedupCache};
use crate::config::GuardConfig;
use crate::fallback::{
    FallbackChain, FallbackOrchestrator, ProviderDescriptor, ProviderFailure,
};
use crate::fingerprint::{Fingerprint, FingerprintGenerator};
use crate::persistence::{FileStore, GuardSnapshot, NullStore, SnapshotStore};
use crate::resilience::{AdmissionDecision, RateLimiter, RateLimiterStats};
use crate::transport::{HttpTransport, Transport, TransportRequest};
use crate::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Aggregate view over every subsystem, shaped for route handlers and UIs.
#[derive(Debug, Clone, Serialize)]
pub struct GuardStats {
    pub deduplication: CacheStats,
    pub rate_limiting: RateLimiterStats,
    pub providers: HashMap<String, ProviderFailure>,
}

pub struct ExecutionGuardBuilder {
    config: GuardConfig,
    transport: Option<Arc<dyn Transport>>,
    store: Option<Box<dyn SnapshotStore>>,
}

impl ExecutionGuardBuilder {
    pub fn new() -> Self {
        Self {
            config: GuardConfig::default(),
            transport: None,
            store: None,
        }
    }

    pub fn with_config(mut self, config: GuardConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_store(mut self, store: Box<dyn SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<ExecutionGuard> {
        self.config.validate()?;
        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => Arc::new(HttpTransport::new()?),
        };
        let store: Box<dyn SnapshotStore> = match self.store {
            Some(s) => s,
            None => match (&self.config.persistence.enabled, &self.config.persistence.path) {
                (true, Some(path)) => Box::new(FileStore::new(path)),
                _ => Box::new(NullStore::new()),
            },
        };

        let guard = ExecutionGuard {
            cache: DedupCache::new(self.config.deduplication.clone()),
            limiter: RateLimiter::new(
                self.config.rate_limiting.clone(),
                self.config.circuit_breaker.clone(),
            ),
            orchestrator: FallbackOrchestrator::new(),
            transport,
            store,
            in_flight: Mutex::new(HashMap::new()),
            config: Mutex::new(self.config),
        };
        guard.restore();
        Ok(guard)
    }
}

impl Default for ExecutionGuardBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Outbound request execution guard.
pub struct ExecutionGuard {
    cache: DedupCache,
    limiter: RateLimiter,
    orchestrator: FallbackOrchestrator,
    transport: Arc<dyn Transport>,
    store: Box<dyn SnapshotStore>,
    /// Single-flight gate: one async mutex per in-progress fingerprint.
    in_flight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    config: Mutex<GuardConfig>,
}

impl ExecutionGuard {
    pub fn builder() -> ExecutionGuardBuilder {
        ExecutionGuardBuilder::new()
    }

    /// Default configuration over the given transport. Mostly for tests and
    /// small hosts; production callers go through [`Self::builder`].
    pub fn with_transport(transport: Arc<dyn Transport>) -> Result<Self> {
        Self::builder().with_transport(transport).build()
    }

    /// Fetch through the full guard path: fingerprint, cache lookup,
    /// single-flight coalescing, admission check, transport call, store.
    ///
    /// Only responses the transport marks ok are cached. Admission
    /// rejections surface as [`Error::RateLimited`] / [`Error::CircuitOpen`]
    /// so the fallback loop treats them like any other provider failure.
    pub async fn guarded_fetch(&self, request: &TransportRequest, scope: &str) -> Result<Value> {
        let (fingerprint, ttl) = {
            let config = self.config.lock().unwrap();
            let generator =
                FingerprintGenerator::new().with_include_body(config.deduplication.include_body);
            (
                generator.fingerprint_request(request),
                config.deduplication.ttl,
            )
        };

        loop {
            if let Some(hit) = self.cache.lookup(&fingerprint, ttl) {
                return Ok(hit);
            }

            let gate = {
                let mut in_flight = self.in_flight.lock().unwrap();
                in_flight
                    .entry(fingerprint.as_str().to_string())
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                    .clone()
            };

            match gate.clone().try_lock_owned() {
                Ok(_leader) => {
                    let result = self.fetch_uncached(&fingerprint, request, scope).await;
                    self.in_flight
                        .lock()
                        .unwrap()
                        .remove(fingerprint.as_str());
                    return result;
                }
                Err(_) => {
                    // Another identical call is in flight; wait for it to
                    // finish, then re-check the cache. If the leader failed
                    // nothing was stored and this caller takes its own turn.
                    let _waited = gate.lock_owned().await;
                }
            }
        }
    }

    async fn fetch_uncached(
        &self,
        fingerprint: &Fingerprint,
        request: &TransportRequest,
        scope: &str,
    ) -> Result<Value> {
        match self.limiter.check(scope) {
            AdmissionDecision::Admitted => {}
            AdmissionDecision::Limited {
                reason,
                retry_after_secs,
                rule,
            } => {
                return Err(match rule {
                    None => Error::CircuitOpen { retry_after_secs },
                    Some(_) => Error::RateLimited {
                        reason,
                        retry_after_secs,
                    },
                });
            }
        }

        tracing::debug!(fingerprint = %fingerprint, url = %request.url, "cache miss, fetching");
        let response = match self.transport.execute(request).await {
            Ok(response) => {
                self.limiter.record_success(scope);
                response
            }
            Err(e) => {
                self.limiter.record_failure(scope);
                return Err(Error::Transport(e));
            }
        };

        self.cache.record_request(fingerprint, &request.url);
        if response.ok {
            self.cache.store(fingerprint, response.body.clone());
        }
        self.save_snapshot();
        Ok(response.body)
    }

    pub fn register_chain(&self, chain_id: impl Into<String>, chain: FallbackChain) {
        self.orchestrator.register_chain(chain_id, chain);
    }

    /// Walk the chain's enabled candidates in priority order until one
    /// succeeds. Providers inside their failure cool-down are skipped, a
    /// `None` from the preparer skips without marking a failure, and the
    /// first success short-circuits. Exhaustion surfaces the last
    /// underlying error.
    pub async fn execute_with_fallback<F>(&self, chain_id: &str, preparer: F) -> Result<Value>
    where
        F: Fn(&ProviderDescriptor) -> Option<TransportRequest>,
    {
        let chain = self
            .orchestrator
            .chain(chain_id)
            .ok_or_else(|| Error::UnknownChain {
                chain: chain_id.to_string(),
            })?;
        let cool_down = self.config.lock().unwrap().fallback.recovery_cooldown;

        let mut last_error: Option<Error> = None;
        for candidate in self.orchestrator.candidates(&chain) {
            if self.orchestrator.in_cooldown(&candidate.name, cool_down) {
                tracing::debug!(provider = %candidate.name, "skipping provider in cool-down");
                continue;
            }
            let Some(request) = preparer(&candidate) else {
                continue;
            };
            match self
                .guarded_fetch(&request, crate::resilience::ANONYMOUS_SCOPE)
                .await
            {
                Ok(value) => {
                    self.orchestrator.record_success(&candidate.name);
                    self.save_snapshot();
                    return Ok(value);
                }
                Err(e) => {
                    tracing::warn!(provider = %candidate.name, error = %e, "provider attempt failed");
                    self.orchestrator.record_failure(&candidate.name);
                    self.save_snapshot();
                    last_error = Some(e);
                }
            }
        }

        Err(Error::ChainExhausted {
            chain: chain_id.to_string(),
            source: last_error.map(Box::new),
        })
    }

    pub fn stats(&self) -> GuardStats {
        GuardStats {
            deduplication: self.cache.stats(),
            rate_limiting: self.limiter.stats(),
            providers: self.orchestrator.failure_statuses(),
        }
    }

    /// Drop cached responses, the request log, and provider failure
    /// statuses. Registered chains survive.
    pub fn clear_cache(&self) {
        self.cache.clear();
        self.orchestrator.clear_failures();
        self.save_snapshot();
    }

    pub fn reset_circuit_breaker(&self) {
        self.limiter.reset_breaker();
    }

    /// Swap in a new validated configuration. Window entries, cached
    /// responses, and breaker state carry over.
    pub fn update_config(&self, config: GuardConfig) -> Result<()> {
        config.validate()?;
        self.cache.set_config(config.deduplication.clone());
        self.limiter
            .set_config(config.rate_limiting.clone(), config.circuit_breaker.clone());
        *self.config.lock().unwrap() = config;
        Ok(())
    }

    pub fn config(&self) -> GuardConfig {
        self.config.lock().unwrap().clone()
    }

    /// Return the guard to a just-constructed, empty state. Intended for
    /// tests and host shutdown paths.
    pub fn reset(&self) {
        self.cache.clear();
        self.limiter.reset();
        self.orchestrator.reset();
        self.in_flight.lock().unwrap().clear();
    }

    fn restore(&self) {
        let Some(snapshot) = self.store.load() else {
            return;
        };
        tracing::info!(
            cache_entries = snapshot.cache.len(),
            providers = snapshot.providers.len(),
            "restored guard snapshot"
        );
        self.cache
            .import(snapshot.cache, snapshot.requests, snapshot.total_requests);
        self.orchestrator.import_failures(snapshot.providers);
    }

    fn save_snapshot(&self) {
        if !self.config.lock().unwrap().persistence.enabled {
            return;
        }
        let (cache, requests, total_requests) = self.cache.export();
        let snapshot = GuardSnapshot {
            cache,
            requests,
            providers: self.orchestrator.failure_statuses(),
            total_requests,
        };
        self.store.save(&snapshot);
    }
}
