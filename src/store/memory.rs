//! In-memory store, used for tests and for serving fixture data.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::FacilityStore;
use crate::error::{Error, Result};
use crate::models::{HospitalRecord, PoiKind, PoiRecord, RegionRecord, RegionSource};

#[derive(Default)]
struct Counters {
    queries: AtomicUsize,
    offline: AtomicBool,
}

/// Store holding all rows in memory
#[derive(Clone, Default)]
pub struct MemoryStore {
    hospitals: Arc<Vec<HospitalRecord>>,
    regions: Arc<Vec<RegionRecord>>,
    pois: Arc<Vec<PoiRecord>>,
    counters: Arc<Counters>,
}

impl MemoryStore {
    pub fn with_hospitals(mut self, hospitals: Vec<HospitalRecord>) -> Self {
        self.hospitals = Arc::new(hospitals);
        self
    }

    pub fn with_regions(mut self, regions: Vec<RegionRecord>) -> Self {
        self.regions = Arc::new(regions);
        self
    }

    pub fn with_pois(mut self, pois: Vec<PoiRecord>) -> Self {
        self.pois = Arc::new(pois);
        self
    }

    /// Number of queries answered so far
    pub fn query_count(&self) -> usize {
        self.counters.queries.load(Ordering::SeqCst)
    }

    /// Make every subsequent query fail, as an unreachable store would
    pub fn set_offline(&self, offline: bool) {
        self.counters.offline.store(offline, Ordering::SeqCst);
    }

    fn begin(&self) -> Result<()> {
        if self.counters.offline.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable("memory store is offline".to_string()));
        }
        self.counters.queries.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl FacilityStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        if self.counters.offline.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable("memory store is offline".to_string()));
        }
        Ok(())
    }

    async fn hospitals(&self) -> Result<Vec<HospitalRecord>> {
        self.begin()?;
        Ok(self.hospitals.as_ref().clone())
    }

    async fn regions(&self, source: RegionSource) -> Result<Vec<RegionRecord>> {
        self.begin()?;
        Ok(self
            .regions
            .iter()
            .filter(|r| r.source == source)
            .cloned()
            .collect())
    }

    async fn pois(&self, kind: PoiKind) -> Result<Vec<PoiRecord>> {
        self.begin()?;
        Ok(self.pois.iter().filter(|p| p.kind == kind).cloned().collect())
    }
}
