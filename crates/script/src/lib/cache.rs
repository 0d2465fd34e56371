use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    expires_at: Instant,
    last_access: u64,
}

struct CacheState<K, V> {
    entries: HashMap<K, Entry<V>>,
    // Monotonic access counter, cheaper and more deterministic than timestamps for LRU order
    tick: u64,
}

/// In-memory cache with per-entry expiry and a size bound.
///
/// Expired entries are dropped lazily on access (or via [`TtlCache::cleanup_expired`]); when
/// full, inserting a new key evicts the least recently used entry.
pub struct TtlCache<K, V> {
    state: Mutex<CacheState<K, V>>,
    default_ttl: Duration,
    max_entries: usize,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(default_ttl: Duration, max_entries: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                tick: 0,
            }),
            default_ttl,
            max_entries: max_entries.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<K, V>> {
        // Entries are plain values, so a panic elsewhere can't leave them half-written
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut state = self.lock();
        state.tick += 1;
        let tick = state.tick;
        let now = Instant::now();

        match state.entries.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.last_access = tick;
                Some(entry.value.clone())
            }
            Some(_) => {
                state.entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V) {
        self.insert_with_ttl(key, value, self.default_ttl)
    }

    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let mut state = self.lock();
        state.tick += 1;
        let tick = state.tick;
        let now = Instant::now();

        if !state.entries.contains_key(&key) && state.entries.len() >= self.max_entries {
            state.entries.retain(|_, entry| entry.expires_at > now);
            if state.entries.len() >= self.max_entries {
                let lru_key = state
                    .entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.last_access)
                    .map(|(key, _)| key.clone());
                if let Some(lru_key) = lru_key {
                    state.entries.remove(&lru_key);
                }
            }
        }

        state.entries.insert(
            key,
            Entry {
                value,
                expires_at: now + ttl,
                last_access: tick,
            },
        );
    }

    /// Returns the cached value, or computes and caches it. Failures are not cached.
    pub async fn get_or_try_insert_with<E, F, Fut>(&self, key: K, ttl: Duration, f: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        // Lock is not held across the await: concurrent misses may compute the same value twice
        let value = f().await?;
        self.insert_with_ttl(key, value.clone(), ttl);
        Ok(value)
    }

    pub fn cleanup_expired(&self) -> usize {
        let mut state = self.lock();
        let now = Instant::now();
        let before = state.entries.len();
        state.entries.retain(|_, entry| entry.expires_at > now);
        before - state.entries.len()
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Number of stored entries, including expired ones not yet cleaned up.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
