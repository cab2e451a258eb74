use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::debug;

/// Time source for cache validity checks. Injectable so tests can advance
/// time without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

struct CacheEntry<T> {
    data: T,
    stored_at: Instant,
}

/// Process-wide TTL cache keyed by caller-supplied strings. Concurrent
/// writers to the same key race last-write-wins; entries are idempotent
/// snapshots so that is acceptable.
pub struct ResultCache<T> {
    entries: Mutex<HashMap<String, CacheEntry<T>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<T: Clone> ResultCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    /// Returns a clone of the entry while it is within its TTL.
    pub fn get(&self, key: &str) -> Option<T> {
        let entries = self.entries.lock().unwrap();
        let entry = entries.get(key)?;

        if self.clock.now().duration_since(entry.stored_at) < self.ttl {
            debug!("Cache hit for key: {key}");
            Some(entry.data.clone())
        } else {
            debug!("Cache entry expired for key: {key}");
            None
        }
    }

    pub fn insert(&self, key: &str, data: T) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key.to_owned(),
            CacheEntry {
                data,
                stored_at: self.clock.now(),
            },
        );
    }

    /// Clears one key, or everything when no key is given.
    pub fn clear(&self, key: Option<&str>) {
        let mut entries = self.entries.lock().unwrap();
        match key {
            Some(key) => {
                entries.remove(key);
            }
            None => entries.clear(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
