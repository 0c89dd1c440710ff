//! Capacity Atlas - regional ICU capacity aggregation
//!
//! This library provides the spatial join, tally and caching engine shared by
//! the query and ingest binaries.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod feature;
pub mod hierarchy;
pub mod models;
pub mod spatial;
pub mod store;
pub mod tally;

pub use engine::CapacityEngine;
pub use error::{Error, Result};
pub use models::{CapacityDimension, FeatureCollection, RegionLevel};
