//! Administrative regions and the hierarchy levels they belong to.

use geo::{MultiPolygon, Point};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::geojson::Geometry;
use crate::error::Error;

/// Supported aggregation levels, finest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum RegionLevel {
    /// District (Landkreis / kreisfreie Stadt)
    District,
    /// Sub-state region (Regierungsbezirk)
    SubState,
    /// State (Bundesland)
    State,
}

impl RegionLevel {
    pub fn all() -> &'static [RegionLevel] {
        &[RegionLevel::District, RegionLevel::SubState, RegionLevel::State]
    }

    /// Path segment used by the HTTP API
    pub fn slug(&self) -> &'static str {
        match self {
            RegionLevel::District => "district",
            RegionLevel::SubState => "sub-state",
            RegionLevel::State => "state",
        }
    }
}

impl FromStr for RegionLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "district" | "landkreise" => Ok(RegionLevel::District),
            "sub-state" | "regierungsbezirke" => Ok(RegionLevel::SubState),
            "state" | "bundeslander" => Ok(RegionLevel::State),
            other => Err(Error::UnknownHierarchyLevel(other.to_string())),
        }
    }
}

impl std::fmt::Display for RegionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

/// Backing region tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionSource {
    Districts,
    Substates,
    States,
}

impl RegionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegionSource::Districts => "districts",
            RegionSource::Substates => "substates",
            RegionSource::States => "states",
        }
    }
}

impl FromStr for RegionSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "districts" => Ok(RegionSource::Districts),
            "substates" => Ok(RegionSource::Substates),
            "states" => Ok(RegionSource::States),
            other => Err(Error::Config(format!("unknown region source '{}'", other))),
        }
    }
}

/// One stored polygon part of an administrative unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRecord {
    pub source: RegionSource,
    pub id: String,
    #[serde(default)]
    pub part: i32,
    pub name: String,
    /// State key (`sn_l`)
    pub state_code: String,
    /// Sub-state key (`sn_r`)
    #[serde(default)]
    pub substate_code: Option<String>,
    /// District key (`sn_k`)
    #[serde(default)]
    pub district_code: Option<String>,
    /// GeoJSON text of the polygon
    pub geom: String,
}

/// Identity of an administrative unit at one level
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegionKey {
    pub state_code: String,
    pub substate_code: Option<String>,
    pub district_code: Option<String>,
    pub name: String,
}

impl RegionKey {
    /// Key of `record` at `level`. Codes finer than the level are dropped so that
    /// all parts of one unit collapse onto the same key.
    pub fn of(record: &RegionRecord, level: RegionLevel) -> Self {
        let (substate_code, district_code) = match level {
            RegionLevel::District => (record.substate_code.clone(), record.district_code.clone()),
            RegionLevel::SubState => (record.substate_code.clone(), None),
            RegionLevel::State => (None, None),
        };
        Self {
            state_code: record.state_code.clone(),
            substate_code,
            district_code,
            name: record.name.clone(),
        }
    }
}

/// An administrative unit ready for joining: parts unioned, centroid computed
#[derive(Debug, Clone)]
pub struct Region {
    pub key: RegionKey,
    pub level: RegionLevel,
    pub area: MultiPolygon<f64>,
    /// Geometry emitted in responses
    pub outline: Geometry,
    pub centroid: Option<Point<f64>>,
}

impl Region {
    pub fn name(&self) -> &str {
        &self.key.name
    }
}
