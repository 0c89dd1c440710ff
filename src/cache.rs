//! Response cache: one feature collection per endpoint, valid for a fixed TTL.
//!
//! There is no invalidation on upstream changes. Concurrent misses on the same
//! key may each recompute; the last write wins.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::{FeatureCollection, RegionLevel};

/// Default time-to-live of a cached response
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Cache slot identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Hospitals,
    Aggregated(RegionLevel),
    OsmHospitals,
    NearbyHelipads,
}

/// Time source for expiry decisions
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.lock().map(|now| *now).unwrap_or_else(|e| *e.into_inner())
    }
}

struct CacheEntry {
    value: Arc<FeatureCollection>,
    created: Instant,
}

pub struct ResponseCache<C: Clock = SystemClock> {
    entries: RwLock<HashMap<Endpoint, CacheEntry>>,
    ttl: Duration,
    clock: C,
}

impl ResponseCache<SystemClock> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, SystemClock)
    }
}

impl<C: Clock> ResponseCache<C> {
    pub fn with_clock(ttl: Duration, clock: C) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached value for `key` if it is younger than the TTL
    pub fn get(&self, key: Endpoint) -> Option<Arc<FeatureCollection>> {
        let entries = match self.entries.read() {
            Ok(entries) => entries,
            Err(_) => {
                warn!("Response cache lock poisoned; treating {:?} as a miss", key);
                return None;
            }
        };
        let entry = entries.get(&key)?;
        if self.clock.now().duration_since(entry.created) < self.ttl {
            Some(Arc::clone(&entry.value))
        } else {
            None
        }
    }

    /// Store `value` under `key`. A failed write is logged and otherwise ignored.
    pub fn insert(&self, key: Endpoint, value: Arc<FeatureCollection>) {
        match self.entries.write() {
            Ok(mut entries) => {
                entries.insert(
                    key,
                    CacheEntry {
                        value,
                        created: self.clock.now(),
                    },
                );
            }
            Err(_) => warn!("Response cache lock poisoned; not caching {:?}", key),
        }
    }

    /// Return the cached value, or compute, store and return a fresh one.
    ///
    /// Errors from `compute` are returned as-is and nothing is cached.
    pub async fn get_or_try_insert_with<F, Fut>(
        &self,
        key: Endpoint,
        compute: F,
    ) -> Result<Arc<FeatureCollection>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<FeatureCollection>>,
    {
        if let Some(hit) = self.get(key) {
            debug!("Cache hit for {:?}", key);
            return Ok(hit);
        }

        debug!("Cache miss for {:?}", key);
        let value = Arc::new(compute().await?);
        self.insert(key, Arc::clone(&value));
        Ok(value)
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn collection(n: usize) -> FeatureCollection {
        let features = (0..n)
            .map(|_| crate::models::Feature::new(None, Default::default()))
            .collect();
        FeatureCollection::new(features)
    }

    #[tokio::test]
    async fn test_hit_within_ttl() {
        let clock = ManualClock::new();
        let cache = ResponseCache::with_clock(DEFAULT_TTL, clock.clone());
        let calls = AtomicUsize::new(0);

        for n in 1..=2 {
            let value = cache
                .get_or_try_insert_with(Endpoint::Hospitals, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(collection(n))
                })
                .await
                .unwrap();
            assert_eq!(value.len(), 1);
            clock.advance(Duration::from_secs(1800));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expiry_recomputes_once() {
        let clock = ManualClock::new();
        let cache = ResponseCache::with_clock(DEFAULT_TTL, clock.clone());
        let calls = AtomicUsize::new(0);
        let compute = |n: usize| {
            let calls = &calls;
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(collection(n))
            }
        };

        cache
            .get_or_try_insert_with(Endpoint::OsmHospitals, compute(1))
            .await
            .unwrap();
        clock.advance(DEFAULT_TTL);
        let fresh = cache
            .get_or_try_insert_with(Endpoint::OsmHospitals, compute(2))
            .await
            .unwrap();
        let again = cache
            .get_or_try_insert_with(Endpoint::OsmHospitals, compute(3))
            .await
            .unwrap();

        assert_eq!(fresh.len(), 2);
        assert_eq!(again.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let cache = ResponseCache::new(DEFAULT_TTL);
        cache.insert(Endpoint::Aggregated(RegionLevel::District), Arc::new(collection(1)));
        assert!(cache.get(Endpoint::Aggregated(RegionLevel::State)).is_none());
        assert!(cache.get(Endpoint::Aggregated(RegionLevel::District)).is_some());
        cache.clear();
        assert!(cache.get(Endpoint::Aggregated(RegionLevel::District)).is_none());
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache = ResponseCache::new(DEFAULT_TTL);
        let result = cache
            .get_or_try_insert_with(Endpoint::NearbyHelipads, || async {
                Err(Error::StoreUnavailable("down".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert!(cache.get(Endpoint::NearbyHelipads).is_none());
    }

    #[tokio::test]
    async fn test_poisoned_lock_still_returns_value() {
        let cache = ResponseCache::new(DEFAULT_TTL);
        let poisoned = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = cache.entries.write().unwrap();
            panic!("writer died holding the lock");
        }));
        assert!(poisoned.is_err());
        assert!(cache.entries.is_poisoned());

        let value = cache
            .get_or_try_insert_with(Endpoint::Hospitals, || async { Ok(collection(3)) })
            .await
            .unwrap();
        assert_eq!(value.len(), 3);
        assert!(cache.get(Endpoint::Hospitals).is_none());
    }
}
