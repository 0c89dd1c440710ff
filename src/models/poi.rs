//! OpenStreetMap points of interest used by the proximity queries.

use geo::Point;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::warn;

use super::geojson::Geometry;
use crate::error::Error;

/// Kind of point of interest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoiKind {
    /// `amenity=hospital` with `emergency=yes`
    Hospital,
    /// `aeroway=helipad`
    Helipad,
}

impl PoiKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoiKind::Hospital => "hospital",
            PoiKind::Helipad => "helipad",
        }
    }

    /// Every kind the tags qualify for. Polygons and nodes are classified
    /// alike; a hospital with its own helipad tag yields both kinds.
    pub fn from_tags(tags: &osmpbfreader::Tags) -> Vec<Self> {
        let tag_is = |key: &str, value: &str| tags.get(key).map(|v| v == value).unwrap_or(false);

        let mut kinds = Vec::new();
        if tag_is("amenity", "hospital") && tag_is("emergency", "yes") {
            kinds.push(PoiKind::Hospital);
        }
        if tag_is("aeroway", "helipad") {
            kinds.push(PoiKind::Helipad);
        }
        kinds
    }
}

/// OSM element type. Node and way ids are separate id spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsmElement {
    Node,
    Way,
}

impl OsmElement {
    pub fn as_str(&self) -> &'static str {
        match self {
            OsmElement::Node => "node",
            OsmElement::Way => "way",
        }
    }
}

impl FromStr for OsmElement {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "node" => Ok(OsmElement::Node),
            "way" => Ok(OsmElement::Way),
            other => Err(Error::Config(format!("unknown osm element '{}'", other))),
        }
    }
}

impl FromStr for PoiKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hospital" => Ok(PoiKind::Hospital),
            "helipad" => Ok(PoiKind::Helipad),
            other => Err(Error::Config(format!("unknown poi kind '{}'", other))),
        }
    }
}

/// A stored OSM point of interest. Areal objects are stored as their centroid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoiRecord {
    pub kind: PoiKind,
    pub element: OsmElement,
    pub osm_id: i64,
    #[serde(default)]
    pub name: Option<String>,
    /// GeoJSON text of the point
    pub geom: String,
}

/// A point of interest with a parsed location
#[derive(Debug, Clone)]
pub struct Poi {
    pub record: PoiRecord,
    pub location: Point<f64>,
}

impl Poi {
    /// Parse the stored location; unusable rows are logged and skipped.
    pub fn from_record(record: PoiRecord) -> Option<Self> {
        let id = format!("{}/{}", record.element.as_str(), record.osm_id);
        match Geometry::parse(&id, &record.geom).map(|g| g.to_point()) {
            Ok(Some(location)) => Some(Self { record, location }),
            Ok(None) => {
                warn!("Skipping {} {}: location is not a point", record.kind.as_str(), id);
                None
            }
            Err(e) => {
                warn!("Skipping {} {}: {}", record.kind.as_str(), id, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osmpbfreader::Tags;

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        let mut tags = Tags::new();
        for (k, v) in pairs {
            tags.insert((*k).into(), (*v).into());
        }
        tags
    }

    #[test]
    fn test_classification() {
        assert_eq!(
            PoiKind::from_tags(&tags(&[("amenity", "hospital"), ("emergency", "yes")])),
            vec![PoiKind::Hospital]
        );
        assert!(PoiKind::from_tags(&tags(&[("amenity", "hospital")])).is_empty());
        assert_eq!(
            PoiKind::from_tags(&tags(&[("aeroway", "helipad")])),
            vec![PoiKind::Helipad]
        );
        assert!(PoiKind::from_tags(&tags(&[("amenity", "clinic")])).is_empty());
    }

    #[test]
    fn test_hospital_with_helipad_tag_has_both_kinds() {
        let kinds = PoiKind::from_tags(&tags(&[
            ("amenity", "hospital"),
            ("emergency", "yes"),
            ("aeroway", "helipad"),
        ]));
        assert_eq!(kinds, vec![PoiKind::Hospital, PoiKind::Helipad]);
    }

    #[test]
    fn test_element_parse_and_way_record() {
        assert_eq!("way".parse::<OsmElement>().unwrap(), OsmElement::Way);
        assert!("relation".parse::<OsmElement>().is_err());

        let record = PoiRecord {
            kind: PoiKind::Helipad,
            element: OsmElement::Way,
            osm_id: 7,
            name: None,
            geom: r#"{"type":"Point","coordinates":[9.0,48.0]}"#.to_string(),
        };
        let poi = Poi::from_record(record).unwrap();
        assert_eq!(poi.location, Point::new(9.0, 48.0));
    }
}
