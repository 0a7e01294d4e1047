use dashmap::DashMap;
use serde::Serialize;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tokio::{task::JoinHandle, time::interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::clock::{Clock, SystemClock};

/// Default lifetime for entries stored without an explicit TTL (24 hours).
pub const DEFAULT_TTL: Duration = Duration::from_secs(86_400);

/// Default period of the background expiry sweep (10 minutes).
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(600);

/// Longest lifetime any entry gets; longer TTLs are clamped to it.
pub const MAX_TTL: Duration = Duration::from_secs(365 * 86_400);

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    expired_removed: AtomicU64,
}

/// In-process key/value store with per-entry expiration.
///
/// Expiry is enforced twice: a read past `expires_at` drops the entry and
/// reports a miss, and [`TtlCache::spawn_sweeper`] prunes whatever nobody
/// reads. There is no size-based eviction.
#[derive(Debug)]
pub struct TtlCache<V> {
    data: Arc<DashMap<String, CacheEntry<V>>>,
    counters: Arc<Counters>,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(default_ttl: Duration) -> Self {
        Self::with_clock(default_ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            data: Arc::new(DashMap::new()),
            counters: Arc::new(Counters::default()),
            default_ttl,
            clock,
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        if let Some(entry) = self.data.get(key) {
            if !entry.is_expired(now) {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            drop(entry);
            if self.data.remove_if(key, |_, e| e.is_expired(now)).is_some() {
                self.counters.expired_removed.fetch_add(1, Ordering::Relaxed);
                debug!("⏰ Expired cache entry dropped on read: {}", key);
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Stores `value`, replacing any previous entry and its expiry.
    ///
    /// `None` or a zero duration falls back to the cache's default TTL, and
    /// nothing lives longer than [`MAX_TTL`].
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let ttl = match ttl {
            Some(ttl) if !ttl.is_zero() => ttl,
            _ => self.default_ttl,
        }
        .min(MAX_TTL);
        let now = self.clock.now();
        let entry = CacheEntry {
            value,
            expires_at: now.checked_add(ttl).unwrap_or(now),
        };
        self.data.insert(key.into(), entry);
    }

    pub fn delete(&self, key: &str) -> bool {
        self.data.remove(key).is_some()
    }

    /// Drops every entry. Administrative use only.
    pub fn flush(&self) {
        let removed = self.data.len();
        self.data.clear();
        info!("🧹 Cache flushed ({} entries)", removed);
    }

    /// Existence check that honours expiry but leaves hit/miss counters alone.
    pub fn has(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.data
            .get(key)
            .map(|entry| !entry.is_expired(now))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Removes every expired entry and returns how many went away.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.data.len();
        self.data.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.data.len());

        if removed > 0 {
            self.counters
                .expired_removed
                .fetch_add(removed as u64, Ordering::Relaxed);
            debug!("Purged {} expired cache entries", removed);
        }

        removed
    }

    /// Starts the periodic expiry sweep on the current runtime.
    ///
    /// The task holds its own handle on the map, so it never blocks readers
    /// for longer than one shard lock, and exits once `shutdown` is cancelled.
    pub fn spawn_sweeper(&self, every: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let cache = self.clone();

        tokio::spawn(async move {
            let mut ticker = interval(every);
            // El primer tick es inmediato
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Cache sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = cache.purge_expired();
                        if removed > 0 {
                            info!("🧹 Cache sweep: removed {} expired entries", removed);
                        }
                    }
                }
            }
        })
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            keys: self.data.len(),
            expired_removed: self.counters.expired_removed.load(Ordering::Relaxed),
        }
    }
}

impl<V> Clone for TtlCache<V> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            counters: self.counters.clone(),
            default_ttl: self.default_ttl,
            clock: self.clock.clone(),
        }
    }
}

/// Snapshot of cache counters for the admin surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub keys: usize,
    pub expired_removed: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "📊 Cache: {} keys, {} hits, {} misses ({:.1}% hit rate), {} expired removed",
            self.keys,
            self.hits,
            self.misses,
            self.hit_rate() * 100.0,
            self.expired_removed
        )
    }
}
