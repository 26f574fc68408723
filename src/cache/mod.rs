//! Bounded response cache with fixed TTL and FIFO eviction.
//!
//! The cache is shared by every in-flight request behind an `Arc`. A single
//! mutex covers lookups and the evict-then-insert sequence, and is never
//! held across an await point.
//!
//! Entries expire once more than a fixed `ttl` has passed since insertion,
//! independent of the TTLs in the DNS answer itself.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::body::Bytes;
use tokio::time::Instant;

use crate::doh::{CacheKey, DohFormat};
use crate::observability::metrics;

/// A stored upstream answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    /// Encoding of `body`, which also fixes the response Content-Type.
    pub format: DohFormat,
    pub body: Bytes,
}

#[derive(Debug)]
struct CacheEntry {
    data: CachedResponse,
    expires_at: Instant,
    /// Insertion sequence number, used to match `order` slots.
    seq: u64,
}

/// Counters exposed for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    /// Insertion order. May contain stale slots for keys that were lazily
    /// expired; those are skipped on eviction.
    order: VecDeque<(u64, CacheKey)>,
    next_seq: u64,
    stats: CacheStats,
}

impl CacheState {
    fn evict_oldest(&mut self) -> Option<CacheKey> {
        while let Some((seq, key)) = self.order.pop_front() {
            let live = self.entries.get(&key).is_some_and(|e| e.seq == seq);
            if live {
                self.entries.remove(&key);
                self.stats.evictions += 1;
                return Some(key);
            }
        }
        None
    }

    fn compact_order(&mut self, max_entries: usize) {
        if self.order.len() > max_entries.saturating_mul(2) {
            let entries = &self.entries;
            self.order
                .retain(|(seq, key)| entries.get(key).is_some_and(|e| e.seq == *seq));
        }
    }
}

/// Shared cache of upstream answers keyed by [`CacheKey`].
#[derive(Debug)]
pub struct ResponseCache {
    state: Mutex<CacheState>,
    max_entries: usize,
    ttl: Duration,
}

impl ResponseCache {
    /// Create an empty cache. `max_entries == 0` disables caching.
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            max_entries,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_enabled(&self) -> bool {
        self.max_entries > 0
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up `key`, dropping the entry if its TTL has elapsed.
    pub fn get(&self, key: &CacheKey) -> Option<CachedResponse> {
        let now = Instant::now();
        let mut guard = self.lock();
        let state = &mut *guard;

        let expired = match state.entries.get(key) {
            Some(entry) if now <= entry.expires_at => {
                let data = entry.data.clone();
                state.stats.hits += 1;
                return Some(data);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            state.entries.remove(key);
            state.stats.expirations += 1;
            tracing::trace!(cache_key = %key, "Cache entry expired");
        }
        state.stats.misses += 1;
        metrics::record_cache_size(state.entries.len());
        None
    }

    /// Store `data` under `key` for one TTL.
    ///
    /// When the cache is full and `key` is new, the earliest inserted entry
    /// is evicted first. Replacing an existing key keeps its position.
    pub fn put(&self, key: CacheKey, data: CachedResponse) {
        if !self.is_enabled() {
            return;
        }

        let expires_at = Instant::now() + self.ttl;
        let mut state = self.lock();

        if let Some(entry) = state.entries.get_mut(&key) {
            entry.data = data;
            entry.expires_at = expires_at;
            return;
        }

        if state.entries.len() >= self.max_entries {
            if let Some(evicted) = state.evict_oldest() {
                tracing::debug!(cache_key = %evicted, "Evicted oldest cache entry");
            }
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.order.push_back((seq, key.clone()));
        state.entries.insert(
            key,
            CacheEntry {
                data,
                expires_at,
                seq,
            },
        );
        state.compact_order(self.max_entries);
        metrics::record_cache_size(state.entries.len());
    }

    /// Number of physically stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            entries: state.entries.len(),
            ..state.stats
        }
    }
}
