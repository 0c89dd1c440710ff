//! Spatial join engine.
//!
//! Containment joins use an R-tree over region bounding boxes followed by an
//! exact point-in-polygon test. Distance joins use an R-tree over unit-sphere
//! positions so nearest-neighbour search is geodesic.

mod index;
mod join;
mod nearest;

pub use index::RegionSpatialIndex;
pub use join::{containment_join, JoinedRegion};
pub use nearest::{nearest_within, Located, NearestIndex, NearestPair, DEFAULT_MAX_DISTANCE_M};
