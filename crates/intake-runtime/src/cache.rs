//! Content-addressed result cache.
//!
//! Identical input text (modulo surrounding whitespace) in the same
//! mode hashes to the same key regardless of call site, so repeated
//! requests skip the backend entirely within the TTL. Built on moka,
//! whose `get_with` gives single-flight semantics: concurrent lookups
//! of one key share a single in-flight computation instead of each
//! invoking the backend.

use moka::future::Cache;
use std::future::Future;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Duration;

use intake_core::ParseMode;

use crate::engine::ExtractionResult;

/// Cache key: content hash of the input text plus the parse mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    content_hash: u64,
    mode: ParseMode,
}

impl CacheKey {
    /// Derive a key from input text and mode.
    ///
    /// The text is trimmed first so incidental surrounding whitespace
    /// does not defeat the cache.
    pub fn new(input: &str, mode: ParseMode) -> Self {
        Self {
            content_hash: hash_content(input.trim()),
            mode,
        }
    }
}

fn hash_content(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

/// Extraction result cache with TTL and a size bound.
pub struct ResultCache {
    cache: Cache<CacheKey, ExtractionResult>,
}

impl ResultCache {
    /// Create a cache holding at most `max_entries` results, each
    /// expiring `ttl` after insertion.
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    /// Return the cached result for `key`, computing and storing it
    /// via `compute` on a miss.
    ///
    /// At most one `compute` runs per key at a time: concurrent
    /// callers for the same key wait for and share the first caller's
    /// in-flight result.
    pub async fn get_or_compute<F>(&self, key: CacheKey, compute: F) -> ExtractionResult
    where
        F: Future<Output = ExtractionResult>,
    {
        self.cache.get_with(key, compute).await
    }

    /// Look up a key without computing.
    pub async fn get(&self, key: &CacheKey) -> Option<ExtractionResult> {
        self.cache.get(key).await
    }

    /// Purge all entries immediately. Safe to call concurrently with
    /// lookups.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Current entry count (approximate until [`sync`](Self::sync)).
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Flush pending maintenance so counts and evictions are exact.
    pub async fn sync(&self) {
        self.cache.run_pending_tasks().await;
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(500, Duration::from_secs(3600))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ErrorDescriptor, ErrorKind};
    use intake_core::ParsedDocument;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn doc() -> ParsedDocument {
        let mut doc = ParsedDocument::new();
        doc.open_section("claim_info".to_string())
            .insert("policy_number".to_string(), "ABC123".to_string());
        doc
    }

    #[test]
    fn test_key_is_stable_across_call_sites() {
        assert_eq!(
            CacheKey::new("some email", ParseMode::Lenient),
            CacheKey::new("some email", ParseMode::Lenient)
        );
    }

    #[test]
    fn test_key_trims_surrounding_whitespace() {
        assert_eq!(
            CacheKey::new("  some email \n", ParseMode::Lenient),
            CacheKey::new("some email", ParseMode::Lenient)
        );
    }

    #[test]
    fn test_key_distinguishes_mode() {
        assert_ne!(
            CacheKey::new("some email", ParseMode::Strict),
            CacheKey::new("some email", ParseMode::Lenient)
        );
    }

    #[tokio::test]
    async fn test_miss_computes_then_hit_reuses() {
        let cache = ResultCache::default();
        let key = CacheKey::new("input", ParseMode::Lenient);
        let computes = AtomicUsize::new(0);

        for _ in 0..3 {
            let result = cache
                .get_or_compute(key, async {
                    computes.fetch_add(1, Ordering::SeqCst);
                    Ok(doc())
                })
                .await;
            assert_eq!(result.unwrap(), doc());
        }

        assert_eq!(computes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_single_flight_under_concurrency() {
        let cache = ResultCache::default();
        let key = CacheKey::new("input", ParseMode::Lenient);
        let computes = AtomicUsize::new(0);

        let compute = || async {
            computes.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(doc())
        };

        let (a, b) = tokio::join!(
            cache.get_or_compute(key, compute()),
            cache.get_or_compute(key, compute()),
        );

        assert_eq!(a, b);
        assert_eq!(computes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_entries_expire_after_ttl() {
        let cache = ResultCache::new(500, Duration::from_millis(50));
        let key = CacheKey::new("input", ParseMode::Lenient);
        let computes = AtomicUsize::new(0);

        let _ = cache
            .get_or_compute(key, async {
                computes.fetch_add(1, Ordering::SeqCst);
                Ok(doc())
            })
            .await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cache.get(&key).await.is_none());

        let _ = cache
            .get_or_compute(key, async {
                computes.fetch_add(1, Ordering::SeqCst);
                Ok(doc())
            })
            .await;
        assert_eq!(computes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_all_purges_immediately() {
        let cache = ResultCache::default();
        let key = CacheKey::new("input", ParseMode::Lenient);

        let _ = cache.get_or_compute(key, async { Ok(doc()) }).await;
        assert!(cache.get(&key).await.is_some());

        cache.invalidate_all();
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_error_sentinel_is_cached_too() {
        let cache = ResultCache::default();
        let key = CacheKey::new("input", ParseMode::Strict);
        let computes = AtomicUsize::new(0);

        for _ in 0..2 {
            let result = cache
                .get_or_compute(key, async {
                    computes.fetch_add(1, Ordering::SeqCst);
                    Err(ErrorDescriptor {
                        kind: ErrorKind::LoopDetected,
                        message: "loop detected for field 'name'".to_string(),
                    })
                })
                .await;
            assert_eq!(result.unwrap_err().kind, ErrorKind::LoopDetected);
        }

        assert_eq!(computes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_entry_count_after_sync() {
        let cache = ResultCache::default();
        for i in 0..4 {
            let key = CacheKey::new(&format!("input-{i}"), ParseMode::Lenient);
            let _ = cache.get_or_compute(key, async { Ok(doc()) }).await;
        }
        cache.sync().await;
        assert_eq!(cache.entry_count(), 4);
    }
}
