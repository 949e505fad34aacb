//! Dedup state
//!
//! The dedup cache is the only state that outlives a single event. It maps
//! keys to the time they were first alerted on and behaves as a sliding
//! window: a periodic pass drops entries older than the retention horizon,
//! and a hard ceiling clears everything if the pass finds the cache too big.

mod key;

pub use key::{build_key, DEFAULT_KEY_GRANULARITY_SECS};

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Source of "now" for the cache; injected so eviction can be tested.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and replays
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Result of one eviction pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EvictionStats {
    /// Entries older than the retention horizon
    pub expired: usize,
    /// Entries dropped by the ceiling clear (0 when it did not trigger)
    pub cleared: usize,
    pub remaining: usize,
}

/// Time-aware set of already-alerted keys
pub struct DedupCache {
    entries: Mutex<HashMap<String, DateTime<Utc>>>,
    retention: Duration,
    max_entries: usize,
    clock: Arc<dyn Clock>,
}

impl DedupCache {
    pub fn new(retention: Duration, max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            retention,
            max_entries,
            clock,
        }
    }

    /// Cache backed by the wall clock
    pub fn with_system_clock(retention: Duration, max_entries: usize) -> Self {
        Self::new(retention, max_entries, Arc::new(SystemClock))
    }

    // Every mutation is a single map call, so a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn seen(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// Record a key as alerted; an existing entry keeps its first-seen time.
    pub fn remember(&self, key: &str) {
        let now = self.clock.now();
        self.lock().entry(key.to_string()).or_insert(now);
    }

    /// Check and insert under one lock scope.
    ///
    /// Returns true when the key was not present, i.e. the caller owns the
    /// alert for it. Concurrent callers with the same key get exactly one true.
    pub fn check_and_remember(&self, key: &str) -> bool {
        let now = self.clock.now();
        let mut entries = self.lock();
        if entries.contains_key(key) {
            return false;
        }
        entries.insert(key.to_string(), now);
        true
    }

    /// Drop entries first seen before `now - retention`, then clear the whole
    /// cache if it still holds more than the ceiling. O(n) in entry count.
    pub fn evict(&self, now: DateTime<Utc>) -> EvictionStats {
        let horizon = now - self.retention;
        let mut entries = self.lock();

        let before = entries.len();
        entries.retain(|_, first_seen| *first_seen >= horizon);
        let expired = before - entries.len();

        let cleared = if entries.len() > self.max_entries {
            let count = entries.len();
            entries.clear();
            count
        } else {
            0
        };

        EvictionStats {
            expired,
            cleared,
            remaining: entries.len(),
        }
    }

    /// Eviction pass at the injected clock's current time
    pub fn evict_now(&self) -> EvictionStats {
        self.evict(self.clock.now())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::thread;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 0).unwrap()
    }

    fn cache_with_clock(
        retention_hours: i64,
        max_entries: usize,
    ) -> (DedupCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        let cache = DedupCache::new(Duration::hours(retention_hours), max_entries, clock.clone());
        (cache, clock)
    }

    #[test]
    fn test_check_and_remember_suppresses_repeat() {
        let (cache, _clock) = cache_with_clock(24, 1000);
        assert!(cache.check_and_remember("alice@203.0.113.5@202401151430"));
        assert!(!cache.check_and_remember("alice@203.0.113.5@202401151430"));
        assert!(cache.check_and_remember("alice@203.0.113.5@202401151431"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_seen_and_remember() {
        let (cache, _clock) = cache_with_clock(24, 1000);
        assert!(!cache.seen("k"));
        cache.remember("k");
        assert!(cache.seen("k"));
        assert!(!cache.seen("K"));
    }

    #[test]
    fn test_eviction_removes_only_expired_entries() {
        let (cache, clock) = cache_with_clock(1, 1000);
        cache.remember("old");
        clock.advance(Duration::minutes(45));
        cache.remember("fresh");

        clock.advance(Duration::minutes(30));
        let stats = cache.evict_now();
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.cleared, 0);
        assert!(!cache.seen("old"));
        assert!(cache.seen("fresh"));
    }

    #[test]
    fn test_remember_keeps_first_seen() {
        let (cache, clock) = cache_with_clock(1, 1000);
        cache.remember("k");
        clock.advance(Duration::minutes(50));
        cache.remember("k");
        clock.advance(Duration::minutes(20));
        cache.evict_now();
        assert!(!cache.seen("k"));
    }

    #[test]
    fn test_ceiling_clears_whole_cache() {
        let (cache, _clock) = cache_with_clock(24, 10);
        for i in 0..11 {
            assert!(cache.check_and_remember(&format!("user{i}@198.51.100.1@202401151430")));
        }
        assert_eq!(cache.len(), 11);

        let stats = cache.evict_now();
        assert_eq!(stats.cleared, 11);
        assert_eq!(stats.remaining, 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_at_ceiling_is_kept() {
        let (cache, _clock) = cache_with_clock(24, 10);
        for i in 0..10 {
            cache.remember(&format!("k{i}"));
        }
        assert_eq!(cache.evict_now().remaining, 10);
    }

    #[test]
    fn test_concurrent_same_key_alerts_once() {
        let (cache, _clock) = cache_with_clock(24, 1000);
        let cache = Arc::new(cache);
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || cache.check_and_remember("bob@192.0.2.10@202401151430"))
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
