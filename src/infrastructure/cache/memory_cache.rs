//! In-process TTL cache for normalized registry lookups

use crate::domain::VulnerabilityRecord;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{debug, info};

/// Cache entry holding an immutable record list until it expires
#[derive(Debug, Clone)]
struct CacheEntry {
    records: Arc<[VulnerabilityRecord]>,
    expires_at: Instant,
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expired_entries: u64,
    pub cleanup_runs: u64,
    pub total_entries: u64,
    /// Keys with a lookup currently in flight
    pub in_flight_keys: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Lookup cache keyed by `cpe:<cpe>`, `keyword:<kw>` or `id:<registry id>`
pub struct LookupCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
    /// Per-key locks serializing registry calls for the same key
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    stats: Mutex<CacheStats>,
}

impl LookupCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
            key_locks: Mutex::new(HashMap::new()),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    pub fn cpe_key(cpe: &str) -> String {
        format!("cpe:{}", cpe)
    }

    /// Registry IDs used as keywords share one key regardless of case
    pub fn keyword_key(keyword: &str) -> String {
        let keyword = keyword.trim();
        if keyword.get(..4).is_some_and(|p| p.eq_ignore_ascii_case("cve-")) {
            format!("keyword:{}", keyword.to_ascii_uppercase())
        } else {
            format!("keyword:{}", keyword)
        }
    }

    pub fn id_key(id: &str) -> String {
        format!("id:{}", id.trim().to_ascii_uppercase())
    }

    /// Get a live entry, recording a hit or a miss
    pub async fn get(&self, key: &str) -> Option<Arc<[VulnerabilityRecord]>> {
        let found = self.peek(key).await;
        let mut stats = self.stats.lock().await;
        if found.is_some() {
            stats.hits += 1;
            debug!(key = key, "Cache hit");
        } else {
            stats.misses += 1;
            debug!(key = key, "Cache miss");
        }
        found
    }

    /// Get a live entry without touching the hit/miss counters
    pub async fn peek(&self, key: &str) -> Option<Arc<[VulnerabilityRecord]>> {
        let expired = {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Some(entry.records.clone());
                }
                Some(_) => true,
                None => false,
            }
        };

        if expired {
            let mut entries = self.entries.write().await;
            if entries
                .get(key)
                .is_some_and(|entry| entry.expires_at <= Instant::now())
            {
                entries.remove(key);
                self.stats.lock().await.expired_entries += 1;
                debug!(key = key, "Evicted expired cache entry");
            }
        }

        None
    }

    /// Store records under `key` for the configured TTL
    pub async fn insert(&self, key: String, records: Arc<[VulnerabilityRecord]>) {
        let entry = CacheEntry {
            records,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.write().await.insert(key, entry);
    }

    /// Index each record under its registry ID. A live index entry is left as written.
    pub async fn index_by_id(&self, records: &[VulnerabilityRecord]) {
        if records.is_empty() {
            return;
        }
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        for record in records {
            let key = Self::id_key(record.id.as_str());
            if entries.get(&key).is_some_and(|entry| entry.expires_at > now) {
                continue;
            }
            entries.insert(
                key,
                CacheEntry {
                    records: Arc::from(vec![record.clone()]),
                    expires_at: now + self.ttl,
                },
            );
        }
    }

    /// Get or create the in-flight lock for `key`
    pub async fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the in-flight lock for `key` once no other caller holds or waits on it
    pub async fn release_key_lock(&self, key: &str, lock: &Arc<Mutex<()>>) {
        let mut locks = self.key_locks.lock().await;
        // Only the map and the releasing caller reference an idle lock
        if locks
            .get(key)
            .is_some_and(|held| Arc::ptr_eq(held, lock) && Arc::strong_count(lock) <= 2)
        {
            locks.remove(key);
        }
    }

    /// Remove every expired entry and every idle in-flight lock
    pub async fn cleanup_expired_entries(&self) -> u64 {
        let now = Instant::now();
        let removed = {
            let mut entries = self.entries.write().await;
            let before = entries.len();
            entries.retain(|_, entry| entry.expires_at > now);
            (before - entries.len()) as u64
        };

        self.key_locks
            .lock()
            .await
            .retain(|_, lock| Arc::strong_count(lock) > 1);

        let mut stats = self.stats.lock().await;
        stats.expired_entries += removed;
        stats.cleanup_runs += 1;
        debug!(
            removed = removed,
            cleanup_runs = stats.cleanup_runs,
            "Cache cleanup completed"
        );
        removed
    }

    /// Start a background task sweeping expired entries every `every`
    pub fn start_background_cleanup(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            loop {
                ticker.tick().await;
                let removed = self.cleanup_expired_entries().await;
                if removed > 0 {
                    info!(removed = removed, "Background cache cleanup evicted expired entries");
                }
            }
        })
    }

    pub async fn stats(&self) -> CacheStats {
        let mut stats = self.stats.lock().await.clone();
        stats.total_entries = self.entries.read().await.len() as u64;
        stats.in_flight_keys = self.key_locks.lock().await.len() as u64;
        stats
    }
}
