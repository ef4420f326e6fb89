//! Content-addressed result cache with TTL expiry and LRU eviction.
//!
//! Keys are [`ContentHash`]es over bars, parameters and benchmark, so two
//! jobs share an entry only when their inputs are identical.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use backlab_core::fingerprint::ContentHash;

use crate::runner::BacktestResult;

/// Shared store of finished results.
pub trait ResultCache: Send + Sync {
    fn get(&self, key: &ContentHash) -> Option<BacktestResult>;
    fn put(&self, key: ContentHash, result: BacktestResult);
    /// Remove one entry; returns whether it was present.
    fn evict(&self, key: &ContentHash) -> bool;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Entry {
    result: BacktestResult,
    inserted: Instant,
    last_used: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<ContentHash, Entry>,
    /// Monotonic use counter for LRU ordering.
    tick: u64,
}

impl Inner {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

/// In-process cache bounded by entry count, with per-entry time-to-live.
///
/// Expired entries are dropped lazily on lookup and before eviction.
/// At capacity, the least recently used entry makes room for the new one.
pub struct TtlLruCache {
    inner: Mutex<Inner>,
    ttl: Duration,
    capacity: usize,
}

impl TtlLruCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut inner = self.lock();
        Self::purge(&mut inner, self.ttl)
    }

    fn purge(inner: &mut Inner, ttl: Duration) -> usize {
        let before = inner.entries.len();
        inner.entries.retain(|_, e| e.inserted.elapsed() < ttl);
        before - inner.entries.len()
    }

    // Entries are inserted whole; a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ResultCache for TtlLruCache {
    fn get(&self, key: &ContentHash) -> Option<BacktestResult> {
        let mut inner = self.lock();
        let tick = inner.next_tick();
        match inner.entries.get_mut(key) {
            Some(e) if e.inserted.elapsed() < self.ttl => {
                e.last_used = tick;
                return Some(e.result.clone());
            }
            Some(_) => {}
            None => return None,
        }
        inner.entries.remove(key);
        None
    }

    fn put(&self, key: ContentHash, result: BacktestResult) {
        let mut inner = self.lock();
        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.capacity {
            Self::purge(&mut inner, self.ttl);
            if inner.entries.len() >= self.capacity {
                let oldest = inner
                    .entries
                    .iter()
                    .min_by_key(|(_, e)| e.last_used)
                    .map(|(k, _)| *k);
                if let Some(k) = oldest {
                    inner.entries.remove(&k);
                }
            }
        }
        let tick = inner.next_tick();
        inner.entries.insert(
            key,
            Entry {
                result,
                inserted: Instant::now(),
                last_used: tick,
            },
        );
    }

    fn evict(&self, key: &ContentHash) -> bool {
        self.lock().entries.remove(key).is_some()
    }

    fn len(&self) -> usize {
        self.lock().entries.len()
    }
}
