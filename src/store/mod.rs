//! Facility store adapters.
//!
//! The engine only reads from the store. Adapters return raw rows; geometry
//! text is parsed by the engine so that malformed rows can be dropped one by one.

mod memory;
mod scylla;

use std::future::Future;

use crate::error::Result;
use crate::models::{HospitalRecord, PoiKind, PoiRecord, RegionRecord, RegionSource};

pub use self::memory::MemoryStore;
pub use self::scylla::ScyllaStore;

/// Read-only query interface over hospitals, regions and OSM points of interest
pub trait FacilityStore: Send + Sync {
    /// Check that the store answers queries
    fn ping(&self) -> impl Future<Output = Result<()>> + Send;

    /// Every stored hospital row, historical snapshots included
    fn hospitals(&self) -> impl Future<Output = Result<Vec<HospitalRecord>>> + Send;

    /// Every polygon part stored in one region table
    fn regions(
        &self,
        source: RegionSource,
    ) -> impl Future<Output = Result<Vec<RegionRecord>>> + Send;

    /// Every point of interest of one kind
    fn pois(&self, kind: PoiKind) -> impl Future<Output = Result<Vec<PoiRecord>>> + Send;
}
