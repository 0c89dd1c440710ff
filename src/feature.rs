//! Feature collection builder: turns joined regions, hospital rows and POI
//! pairs into GeoJSON features.

use serde_json::{json, Value};
use tracing::warn;

use crate::models::{
    CapacityDimension, Feature, Geometry, HospitalRecord, Poi, Properties, Region,
    RegionLevel,
};
use crate::spatial::{JoinedRegion, NearestPair};
use crate::tally::CapacityTallies;

/// Identity attributes of a region, as the level exposes them
fn region_identity(region: &Region, properties: &mut Properties) {
    let key = &region.key;
    properties.insert("sn_l".to_string(), json!(key.state_code));
    if matches!(region.level, RegionLevel::District | RegionLevel::SubState) {
        properties.insert("sn_r".to_string(), json!(key.substate_code));
    }
    if region.level == RegionLevel::District {
        properties.insert("sn_k".to_string(), json!(key.district_code));
    }
    properties.insert("name".to_string(), json!(key.name));
}

/// One feature for an aggregated region
pub fn region_feature(region: &Region, tallies: &CapacityTallies) -> Feature {
    let mut properties = Properties::new();
    region_identity(region, &mut properties);

    let centroid = region
        .centroid
        .as_ref()
        .map(|c| json!(Geometry::from(c)))
        .unwrap_or(Value::Null);
    properties.insert("centroid".to_string(), centroid);

    for (dimension, tally) in tallies.iter() {
        properties.insert(dimension.field_name().to_string(), json!(tally));
    }

    Feature::new(Some(region.outline.clone()), properties)
}

/// Features for every joined region, tallied per capacity dimension
pub fn region_features(joined: &[JoinedRegion<'_>]) -> Vec<Feature> {
    joined
        .iter()
        .map(|j| region_feature(j.region, &CapacityTallies::from_facilities(&j.facilities)))
        .collect()
}

/// Raw features for live hospital records.
///
/// A record without a location gets a null geometry; a record whose stored
/// location cannot be parsed is dropped.
pub fn hospital_features(records: &[HospitalRecord]) -> Vec<Feature> {
    records
        .iter()
        .filter_map(|record| {
            let geometry = match record.geom.as_deref() {
                None => None,
                Some(text) => match Geometry::parse(&record.id, text) {
                    Ok(geometry) => Some(geometry),
                    Err(e) => {
                        warn!("Dropping hospital '{}' from listing: {}", record.name, e);
                        return None;
                    }
                },
            };

            let mut properties = Properties::new();
            properties.insert("index".to_string(), json!(record.id));
            properties.insert("name".to_string(), json!(record.name));
            properties.insert("address".to_string(), json!(record.address));
            properties.insert("contact".to_string(), json!(record.contact));
            for dimension in CapacityDimension::all() {
                properties.insert(
                    dimension.field_name().to_string(),
                    json!(record.state(*dimension)),
                );
            }
            properties.insert(
                "last_update".to_string(),
                json!(record.last_update.to_rfc3339()),
            );

            Some(Feature::new(geometry, properties))
        })
        .collect()
}

/// Point features for OSM points of interest
pub fn poi_features(pois: &[Poi]) -> Vec<Feature> {
    pois.iter()
        .map(|poi| {
            let mut properties = Properties::new();
            properties.insert("osm_id".to_string(), json!(poi.record.osm_id));
            properties.insert("osm_type".to_string(), json!(poi.record.element.as_str()));
            properties.insert("name".to_string(), json!(poi.record.name));
            Feature::new(Some(Geometry::from(&poi.location)), properties)
        })
        .collect()
}

/// Helipad features, each carrying its distance to the paired hospital
pub fn helipad_features(pairs: &[NearestPair<'_, Poi, Poi>]) -> Vec<Feature> {
    pairs
        .iter()
        .map(|pair| {
            let helipad = pair.candidate;
            let hospital = pair.reference;

            let mut properties = Properties::new();
            properties.insert("osm_id".to_string(), json!(helipad.record.osm_id));
            properties.insert("osm_type".to_string(), json!(helipad.record.element.as_str()));
            properties.insert("name".to_string(), json!(helipad.record.name));
            properties.insert("distance_to_hospital".to_string(), json!(pair.distance_m));
            properties.insert("hospital_osm_id".to_string(), json!(hospital.record.osm_id));
            properties.insert("hospital_name".to_string(), json!(hospital.record.name));

            Feature::new(Some(Geometry::from(&helipad.location)), properties)
        })
        .collect()
}
