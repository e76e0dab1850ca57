use moka::sync::Cache as MokaCache;
use moka::Expiry;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::query::QueryResponse;

fn fingerprint(sql: &str, params: &std::collections::BTreeMap<String, serde_json::Value>) -> String {
    let canonical = serde_json::json!({ "sql": sql, "parameters": params });
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

struct CachedEntry {
    response: QueryResponse,
    ttl: Duration,
}

/// Per-entry TTL for `moka`'s eviction policy: each cached response carries
/// its own requested TTL rather than one cache-wide duration, the same way
/// the `caibirdme-ltbridge` label cache customizes per-entry expiry.
struct ResponseExpiry;

impl Expiry<String, Arc<CachedEntry>> for ResponseExpiry {
    fn expire_after_create(&self, _key: &String, value: &Arc<CachedEntry>, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Capability a query engine consults for cached results. `Clear` invalidates
/// everything; there is no narrower invalidation policy (see DESIGN.md).
pub trait Cache: Send + Sync {
    fn get(&self, key: &str) -> Option<QueryResponse>;
    fn set(&self, key: String, value: QueryResponse, ttl: Duration);
    fn delete(&self, key: &str);
    fn clear(&self);
    fn size(&self) -> usize;
}

/// `moka`-backed cache: capacity-bound eviction and per-entry TTL handled
/// natively by the crate rather than hand-rolled `Instant` bookkeeping.
pub struct MokaQueryCache {
    inner: MokaCache<String, Arc<CachedEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: Arc<AtomicU64>,
}

impl MokaQueryCache {
    pub fn new(capacity: usize) -> Self {
        let evictions = Arc::new(AtomicU64::new(0));
        let evictions_listener = evictions.clone();
        let inner = MokaCache::builder()
            .max_capacity(capacity.max(1) as u64)
            .expire_after(ResponseExpiry)
            .eviction_listener(move |_k, _v, _cause| {
                evictions_listener.fetch_add(1, Ordering::Relaxed);
            })
            .build();
        Self { inner, hits: AtomicU64::new(0), misses: AtomicU64::new(0), evictions }
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_rate: if total > 0 { hits as f64 / total as f64 } else { 0.0 },
            size: self.size(),
        }
    }

    /// Drive moka's pending maintenance (expiry, eviction) immediately
    /// instead of waiting for it to happen lazily on next access.
    pub fn sweep(&self) {
        self.inner.run_pending_tasks();
    }
}

impl Cache for MokaQueryCache {
    fn get(&self, key: &str) -> Option<QueryResponse> {
        match self.inner.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.response.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn set(&self, key: String, value: QueryResponse, ttl: Duration) {
        self.inner.insert(key, Arc::new(CachedEntry { response: value, ttl }));
    }

    fn delete(&self, key: &str) {
        self.inner.invalidate(key);
    }

    fn clear(&self) {
        self.inner.invalidate_all();
    }

    fn size(&self) -> usize {
        self.inner.entry_count() as usize
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate: f64,
    pub size: usize,
}

/// Two-level cache: a small hot L1 over a larger L2. L2 hits promote into
/// L1; `InvalidatePattern` is not implemented beyond `clear` on both levels
/// (see DESIGN.md open question).
pub struct LayeredCache {
    l1: MokaQueryCache,
    l2: MokaQueryCache,
}

impl LayeredCache {
    pub fn new(l1_capacity: usize, l2_capacity: usize) -> Self {
        Self { l1: MokaQueryCache::new(l1_capacity), l2: MokaQueryCache::new(l2_capacity) }
    }
}

impl Cache for LayeredCache {
    fn get(&self, key: &str) -> Option<QueryResponse> {
        if let Some(v) = self.l1.get(key) {
            return Some(v);
        }
        let v = self.l2.get(key)?;
        self.l1.set(key.to_string(), v.clone(), Duration::from_secs(60));
        Some(v)
    }

    fn set(&self, key: String, value: QueryResponse, ttl: Duration) {
        self.l1.set(key.clone(), value.clone(), ttl.min(Duration::from_secs(60)));
        self.l2.set(key, value, ttl);
    }

    fn delete(&self, key: &str) {
        self.l1.delete(key);
        self.l2.delete(key);
    }

    fn clear(&self) {
        self.l1.clear();
        self.l2.clear();
    }

    fn size(&self) -> usize {
        self.l1.size() + self.l2.size()
    }
}

pub fn cache_key(sql: &str, params: &std::collections::BTreeMap<String, serde_json::Value>) -> String {
    fingerprint(sql, params)
}

pub fn spawn_cache_sweeper(cache: std::sync::Arc<MokaQueryCache>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            cache.sweep();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_for_same_input() {
        let params = std::collections::BTreeMap::new();
        assert_eq!(fingerprint("SELECT 1", &params), fingerprint("SELECT 1", &params));
    }

    #[test]
    fn get_set_round_trip() {
        let cache = MokaQueryCache::new(10);
        let response = QueryResponse::error_response("SELECT 1", "none");
        cache.set("k".into(), response.clone(), Duration::from_secs(60));
        assert!(cache.get("k").is_some());
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let cache = MokaQueryCache::new(10);
        let response = QueryResponse::error_response("SELECT 1", "none");
        cache.set("k".into(), response, Duration::from_millis(0));
        cache.sweep();
        assert!(cache.get("k").is_none());
    }
}
