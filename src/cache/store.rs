use crate::config::DeduplicationConfig;
use crate::fingerprint::Fingerprint;
use crate::util::now_ms;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use std::time::Duration;
use uuid::Uuid;

/// A cached successful response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub response: Value,
    /// Wall-clock milliseconds at store time.
    pub stored_at: u64,
    /// 1 on store; each hit increments. Repeats are `hit_count - 1`.
    pub hit_count: u64,
    /// Updated on every hit; drives capacity eviction.
    pub last_accessed: u64,
}

impl CacheEntry {
    fn new(response: Value, now: u64) -> Self {
        Self {
            response,
            stored_at: now,
            hit_count: 1,
            last_accessed: now,
        }
    }

    fn is_expired(&self, now: u64, ttl: Duration) -> bool {
        now.saturating_sub(self.stored_at) >= ttl.as_millis() as u64
    }
}

/// One guarded network call, kept for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: Uuid,
    pub timestamp: u64,
    pub fingerprint: String,
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_entries: usize,
    /// Percentage: `cache_hits / total_requests * 100`, 0 when idle.
    pub cache_hit_rate: f64,
}

struct Inner {
    entries: HashMap<String, CacheEntry>,
    log: VecDeque<RequestRecord>,
    total_requests: u64,
    config: DeduplicationConfig,
}

/// Fingerprint-keyed response cache with a bounded request log.
pub struct DedupCache {
    inner: RwLock<Inner>,
}

impl DedupCache {
    pub fn new(config: DeduplicationConfig) -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                log: VecDeque::new(),
                total_requests: 0,
                config,
            }),
        }
    }

    /// A hit requires `now - stored_at < ttl`. Hits bump `hit_count` and
    /// return a deep copy of the stored response; misses leave the cache
    /// unchanged.
    pub fn lookup(&self, fingerprint: &Fingerprint, ttl: Duration) -> Option<Value> {
        let mut inner = self.inner.write().unwrap();
        if !inner.config.enabled {
            return None;
        }
        let now = now_ms();
        let entry = inner.entries.get_mut(fingerprint.as_str())?;
        if entry.is_expired(now, ttl) {
            return None;
        }
        entry.hit_count += 1;
        entry.last_accessed = now;
        tracing::debug!(fingerprint = %fingerprint, "cache hit");
        Some(entry.response.clone())
    }

    /// Unconditionally overwrites any existing entry, resetting `hit_count`
    /// to 1. Evicts expired then least-recently-accessed entries first when
    /// the map is at capacity.
    pub fn store(&self, fingerprint: &Fingerprint, response: Value) {
        let mut inner = self.inner.write().unwrap();
        if !inner.config.enabled {
            return;
        }
        let now = now_ms();
        if !inner.entries.contains_key(fingerprint.as_str()) {
            Self::evict_if_needed(&mut inner, now);
        }
        inner
            .entries
            .insert(fingerprint.as_str().to_string(), CacheEntry::new(response, now));
    }

    /// Append to the bounded request log, dropping the oldest record once
    /// the cap is reached.
    pub fn record_request(&self, fingerprint: &Fingerprint, target: &str) {
        let mut inner = self.inner.write().unwrap();
        let record = RequestRecord {
            id: Uuid::new_v4(),
            timestamp: now_ms(),
            fingerprint: fingerprint.as_str().to_string(),
            target: target.to_string(),
        };
        inner.log.push_back(record);
        let cap = inner.config.request_log_cap;
        while inner.log.len() > cap {
            inner.log.pop_front();
        }
        inner.total_requests += 1;
    }

    /// Drops all entries, the request log, and the request counter.
    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.entries.clear();
        inner.log.clear();
        inner.total_requests = 0;
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.read().unwrap();
        let cache_hits: u64 = inner
            .entries
            .values()
            .map(|e| e.hit_count.saturating_sub(1))
            .sum();
        let total = inner.total_requests;
        CacheStats {
            total_requests: total,
            cache_hits,
            cache_entries: inner.entries.len(),
            cache_hit_rate: if total > 0 {
                cache_hits as f64 / total as f64 * 100.0
            } else {
                0.0
            },
        }
    }

    pub fn set_config(&self, config: DeduplicationConfig) {
        let mut inner = self.inner.write().unwrap();
        inner.config = config;
    }

    pub(crate) fn export(&self) -> (HashMap<String, CacheEntry>, Vec<RequestRecord>, u64) {
        let inner = self.inner.read().unwrap();
        (
            inner.entries.clone(),
            inner.log.iter().cloned().collect(),
            inner.total_requests,
        )
    }

    /// Restore a snapshot, keeping only entries still inside the TTL.
    pub(crate) fn import(
        &self,
        entries: HashMap<String, CacheEntry>,
        log: Vec<RequestRecord>,
        total_requests: u64,
    ) {
        let mut inner = self.inner.write().unwrap();
        let now = now_ms();
        let ttl = inner.config.ttl;
        inner.entries = entries
            .into_iter()
            .filter(|(_, e)| !e.is_expired(now, ttl))
            .collect();
        let cap = inner.config.request_log_cap;
        let skip = log.len().saturating_sub(cap);
        inner.log = log.into_iter().skip(skip).collect();
        inner.total_requests = total_requests;
    }

    fn evict_if_needed(inner: &mut Inner, now: u64) {
        let max = inner.config.max_entries;
        if inner.entries.len() < max {
            return;
        }
        let ttl = inner.config.ttl;
        inner.entries.retain(|_, e| !e.is_expired(now, ttl));
        while inner.entries.len() >= max {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    inner.entries.remove(&k);
                }
                None => break,
            }
        }
    }
}
