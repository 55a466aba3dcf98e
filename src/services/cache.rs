//! In-process TTL cache for upstream tracking responses
//!
//! Keys are built from operation name plus input parameter
//! (`"getLatestTrackingUpdates.{shipmentId}"`); entries expire after a fixed
//! TTL and are evicted lazily on the next lookup. There is no
//! invalidation-on-write path and concurrent misses for the same key are not
//! collapsed; each caller computes independently.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

struct CacheEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

/// String-keyed TTL cache over serialized JSON responses
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }

    /// Look up a live entry, evicting it if expired.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if Instant::now() < entry.expires_at => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        let entry = CacheEntry { value, expires_at: Instant::now() + ttl };
        self.entries.lock().insert(key.to_string(), entry);
    }

    /// Return the cached value for `key`, or run `compute` and cache its
    /// result for `ttl`.
    ///
    /// The result is cached only when `compute` succeeds and `cacheable`
    /// holds for the produced value; an empty tracking response, for example,
    /// is likely transient and would poison the cache for the TTL window.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: &str,
        ttl: Duration,
        cacheable: impl Fn(&serde_json::Value) -> bool,
        compute: F,
    ) -> Result<serde_json::Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<serde_json::Value, E>>,
    {
        if let Some(hit) = self.get(key) {
            return Ok(hit);
        }

        let value = compute().await?;
        if cacheable(&value) {
            self.put(key, value.clone(), ttl);
        }
        Ok(value)
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn always(_: &serde_json::Value) -> bool {
        true
    }

    #[tokio::test]
    async fn test_hit_within_ttl_skips_compute() {
        let cache = ResponseCache::new();
        let calls = AtomicU32::new(0);

        let compute = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, std::convert::Infallible>(serde_json::json!({"n": 1}))
        };

        let first = cache
            .get_or_compute("op.k", Duration::from_secs(60), always, compute)
            .await
            .unwrap();
        let second = cache
            .get_or_compute("op.k", Duration::from_secs(60), always, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, std::convert::Infallible>(serde_json::json!({"n": 2}))
            })
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_recomputes() {
        let cache = ResponseCache::new();
        cache.put("op.k", serde_json::json!("old"), Duration::from_millis(5));

        tokio::time::sleep(Duration::from_millis(20)).await;

        let value = cache
            .get_or_compute("op.k", Duration::from_secs(60), always, || async {
                Ok::<_, std::convert::Infallible>(serde_json::json!("new"))
            })
            .await
            .unwrap();
        assert_eq!(value, serde_json::json!("new"));
    }

    #[tokio::test]
    async fn test_uncacheable_value_not_stored() {
        let cache = ResponseCache::new();
        let calls = AtomicU32::new(0);

        let not_empty =
            |v: &serde_json::Value| !v.as_array().map(|a| a.is_empty()).unwrap_or(false);

        for _ in 0..2 {
            let value = cache
                .get_or_compute("op.k", Duration::from_secs(60), not_empty, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, std::convert::Infallible>(serde_json::json!([]))
                })
                .await
                .unwrap();
            assert_eq!(value, serde_json::json!([]));
        }

        // Empty responses never cached, so compute runs every time
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_compute_failure_not_cached() {
        let cache = ResponseCache::new();

        let result: Result<serde_json::Value, &str> = cache
            .get_or_compute("op.k", Duration::from_secs(60), always, || async { Err("upstream") })
            .await;
        assert!(result.is_err());
        assert!(cache.get("op.k").is_none());

        // A later success goes through normally
        let value = cache
            .get_or_compute("op.k", Duration::from_secs(60), always, || async {
                Ok::<_, &str>(serde_json::json!(1))
            })
            .await
            .unwrap();
        assert_eq!(value, serde_json::json!(1));
    }

    #[test]
    fn test_distinct_keys_do_not_collide() {
        let cache = ResponseCache::new();
        cache.put("getLatestTrackingUpdates.a", serde_json::json!(1), Duration::from_secs(60));
        cache.put("detectCarrierForTracking.a", serde_json::json!(2), Duration::from_secs(60));

        assert_eq!(cache.get("getLatestTrackingUpdates.a"), Some(serde_json::json!(1)));
        assert_eq!(cache.get("detectCarrierForTracking.a"), Some(serde_json::json!(2)));
    }
}
