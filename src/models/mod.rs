//! Core data models for the capacity engine.

pub mod facility;
pub mod geojson;
pub mod poi;
pub mod region;

pub use facility::{CapacityDimension, Facility, HospitalRecord};
pub use geojson::{Feature, FeatureCollection, Geometry, Properties};
pub use poi::{OsmElement, Poi, PoiKind, PoiRecord};
pub use region::{Region, RegionKey, RegionLevel, RegionRecord, RegionSource};
