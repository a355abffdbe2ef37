//! 响应去重缓存模块：按请求指纹缓存成功响应，抑制重复的上游调用。
//!
//! # Deduplication Cache Module
//!
//! Maps a request [`Fingerprint`](crate::fingerprint::Fingerprint) to the
//! last successful response observed for it, suppressing temporally
//! separated repeats of the same call within a TTL.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`DedupCache`] | Entry map with TTL lookups, capacity eviction, and a bounded request log |
//! | [`CacheEntry`] | Stored response with `stored_at` and `hit_count` |
//! | [`RequestRecord`] | Observability record of one guarded network call |
//! | [`CacheStats`] | Hit/entry counters and the derived hit rate |
//!
//! Hits return a deep copy; callers can never corrupt the stored entry.
//! Only the guard's fetch path stores entries, and only for responses the
//! transport marked successful.

mod store;

pub use store::{CacheEntry, CacheStats, DedupCache, RequestRecord};
