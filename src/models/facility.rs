//! Hospital capacity records and the live-facility view over them.

use chrono::{DateTime, Utc};
use geo::Point;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::geojson::Geometry;

/// Independent ICU capacity dimensions reported per hospital
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub enum CapacityDimension {
    /// Low-care ICU beds
    #[serde(rename = "icu_low_state")]
    IcuLow,
    /// High-care ICU beds
    #[serde(rename = "icu_high_state")]
    IcuHigh,
    /// ECMO
    #[serde(rename = "ecmo_state")]
    Ecmo,
}

impl CapacityDimension {
    pub fn all() -> &'static [CapacityDimension] {
        &[
            CapacityDimension::IcuLow,
            CapacityDimension::IcuHigh,
            CapacityDimension::Ecmo,
        ]
    }

    /// Property name used in stored rows and in responses
    pub fn field_name(&self) -> &'static str {
        match self {
            CapacityDimension::IcuLow => "icu_low_state",
            CapacityDimension::IcuHigh => "icu_high_state",
            CapacityDimension::Ecmo => "ecmo_state",
        }
    }
}

/// A hospital row as held by the store. Several rows may share a name; each is
/// one historical snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HospitalRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub icu_low_state: Option<String>,
    #[serde(default)]
    pub icu_high_state: Option<String>,
    #[serde(default)]
    pub ecmo_state: Option<String>,
    pub last_update: DateTime<Utc>,
    /// GeoJSON text of the hospital location
    #[serde(default)]
    pub geom: Option<String>,
}

impl HospitalRecord {
    pub fn state(&self, dimension: CapacityDimension) -> Option<&str> {
        match dimension {
            CapacityDimension::IcuLow => self.icu_low_state.as_deref(),
            CapacityDimension::IcuHigh => self.icu_high_state.as_deref(),
            CapacityDimension::Ecmo => self.ecmo_state.as_deref(),
        }
    }
}

/// A live hospital with a usable point location
#[derive(Debug, Clone)]
pub struct Facility {
    pub record: HospitalRecord,
    pub location: Point<f64>,
}

impl Facility {
    /// Build a facility from a record. Records without a location, or whose
    /// location is not a parseable point, are not joinable and yield `None`.
    pub fn from_record(record: HospitalRecord) -> Option<Self> {
        let text = record.geom.as_deref()?;
        let location = match Geometry::parse(&record.id, text) {
            Ok(geometry) => geometry.to_point(),
            Err(e) => {
                warn!("Skipping hospital '{}': {}", record.name, e);
                return None;
            }
        };
        match location {
            Some(location) => Some(Self { record, location }),
            None => {
                warn!("Skipping hospital '{}': location is not a point", record.name);
                None
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn state(&self, dimension: CapacityDimension) -> Option<&str> {
        self.record.state(dimension)
    }
}

/// Keep only the most recent record per hospital name.
///
/// The result is ordered by name. On equal timestamps the record seen first wins.
pub fn latest_per_name(records: Vec<HospitalRecord>) -> Vec<HospitalRecord> {
    let mut latest: HashMap<String, HospitalRecord> = HashMap::with_capacity(records.len());

    for record in records {
        match latest.get(&record.name) {
            Some(current) if current.last_update >= record.last_update => {}
            _ => {
                latest.insert(record.name.clone(), record);
            }
        }
    }

    let mut live: Vec<HospitalRecord> = latest.into_values().collect();
    live.sort_by(|a, b| a.name.cmp(&b.name));
    live
}

/// Live, joinable facilities: latest record per name with a valid point location
pub fn live_facilities(records: Vec<HospitalRecord>) -> Vec<Facility> {
    latest_per_name(records)
        .into_iter()
        .filter_map(Facility::from_record)
        .collect()
}
