//! Time-bounded map used by the NLP, DOM-analysis and fragility caches.
//!
//! Entries expire lazily when read and are swept in bulk on writes once per
//! sweep interval, so nothing holds timer handles.

use crate::clock::Clock;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

/// Default time-to-live for engine caches (5 minutes)
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct Slot<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

/// Last-write-wins map with per-entry expiry
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: HashMap<K, Slot<V>>,
    ttl: Duration,
    sweep_interval: Duration,
    last_sweep: DateTime<Utc>,
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Create a cache whose entries live for `ttl`
    #[must_use]
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let last_sweep = clock.now();
        Self {
            entries: HashMap::new(),
            ttl,
            sweep_interval: ttl,
            last_sweep,
            clock,
        }
    }

    /// Override how often expired entries are swept on insert
    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Entry lifetime
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fetch a live entry, dropping it if it has expired
    pub fn get(&mut self, key: &K) -> Option<V> {
        let now = self.clock.now();
        match self.entries.get(key) {
            Some(slot) if slot.expires_at > now => Some(slot.value.clone()),
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert or replace an entry
    pub fn insert(&mut self, key: K, value: V) {
        let now = self.clock.now();
        if elapsed(self.last_sweep, now) >= self.sweep_interval {
            self.sweep();
        }
        let ttl = chrono::Duration::from_std(self.ttl)
            .unwrap_or_else(|_| chrono::Duration::days(3650));
        let expires_at = now + ttl;
        self.entries.insert(key, Slot { value, expires_at });
    }

    /// Remove an entry
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|slot| slot.value)
    }

    /// Drop every expired entry, returning how many were removed
    pub fn sweep(&mut self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, slot| slot.expires_at > now);
        self.last_sweep = now;
        before - self.entries.len()
    }

    /// Remove everything
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of stored entries (expired ones included until swept)
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn elapsed(from: DateTime<Utc>, to: DateTime<Utc>) -> Duration {
    (to - from).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;

    fn cache(clock: &Arc<FakeClock>) -> TtlCache<String, u32> {
        TtlCache::new(Duration::from_secs(300), clock.clone())
    }

    #[test]
    fn test_get_before_expiry() {
        let clock = Arc::new(FakeClock::at_ms(0));
        let mut c = cache(&clock);
        c.insert("a".to_string(), 1);

        clock.fast_forward(Duration::from_secs(299));
        assert_eq!(c.get(&"a".to_string()), Some(1));
    }

    #[test]
    fn test_lazy_expiry_on_read() {
        let clock = Arc::new(FakeClock::at_ms(0));
        let mut c = cache(&clock);
        c.insert("a".to_string(), 1);

        clock.fast_forward(Duration::from_secs(300));
        assert_eq!(c.get(&"a".to_string()), None);
        assert!(c.is_empty());
    }

    #[test]
    fn test_sweep_on_insert() {
        let clock = Arc::new(FakeClock::at_ms(0));
        let mut c = cache(&clock);
        c.insert("old".to_string(), 1);

        clock.fast_forward(Duration::from_secs(301));
        c.insert("new".to_string(), 2);

        assert_eq!(c.len(), 1);
        assert_eq!(c.get(&"new".to_string()), Some(2));
    }

    #[test]
    fn test_last_write_wins() {
        let clock = Arc::new(FakeClock::at_ms(0));
        let mut c = cache(&clock);
        c.insert("k".to_string(), 1);
        c.insert("k".to_string(), 2);
        assert_eq!(c.get(&"k".to_string()), Some(2));
    }

    #[test]
    fn test_remove_and_clear() {
        let clock = Arc::new(FakeClock::at_ms(0));
        let mut c = cache(&clock);
        c.insert("a".to_string(), 1);
        c.insert("b".to_string(), 2);

        assert_eq!(c.remove(&"a".to_string()), Some(1));
        c.clear();
        assert!(c.is_empty());
    }

    #[test]
    fn test_explicit_sweep_counts_removed() {
        let clock = Arc::new(FakeClock::at_ms(0));
        let mut c = cache(&clock).with_sweep_interval(Duration::from_secs(3600));
        c.insert("a".to_string(), 1);
        clock.fast_forward(Duration::from_secs(100));
        c.insert("b".to_string(), 2);

        clock.fast_forward(Duration::from_secs(250));
        assert_eq!(c.sweep(), 1);
        assert_eq!(c.len(), 1);
    }
}
