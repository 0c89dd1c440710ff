//! GeoJSON geometry and feature collection types.
//!
//! The store keeps geometries as GeoJSON text. They are parsed into [`Geometry`]
//! before they go anywhere near a response, and converted to `geo_types` for the
//! spatial work.

use geo_types::{Coord, LineString, MultiPolygon, Point, Polygon};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// A `[lon, lat]` position
pub type Position = [f64; 2];

/// GeoJSON geometry object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Position),
    LineString(Vec<Position>),
    Polygon(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

impl Geometry {
    /// Parse stored GeoJSON text. `id` names the owning record for error reporting.
    pub fn parse(id: &str, text: &str) -> Result<Self> {
        let geometry: Geometry =
            serde_json::from_str(text).map_err(|e| Error::malformed(id, e))?;
        geometry.validate().map_err(|reason| Error::malformed(id, reason))?;
        Ok(geometry)
    }

    fn validate(&self) -> std::result::Result<(), &'static str> {
        let finite = |p: &Position| p[0].is_finite() && p[1].is_finite();
        let ring_ok = |ring: &Vec<Position>| ring.len() >= 4 && ring.iter().all(finite);

        match self {
            Geometry::Point(p) if !finite(p) => Err("non-finite point"),
            Geometry::LineString(line) if line.len() < 2 => Err("line with fewer than 2 positions"),
            Geometry::Polygon(rings) if rings.is_empty() || !rings.iter().all(ring_ok) => {
                Err("polygon with an empty or short ring")
            }
            Geometry::MultiPolygon(polys)
                if polys.is_empty()
                    || polys
                        .iter()
                        .any(|rings| rings.is_empty() || !rings.iter().all(ring_ok)) =>
            {
                Err("multipolygon with an empty or short ring")
            }
            _ => Ok(()),
        }
    }

    /// Point view of this geometry, if it is a point
    pub fn to_point(&self) -> Option<Point<f64>> {
        match self {
            Geometry::Point([x, y]) => Some(Point::new(*x, *y)),
            _ => None,
        }
    }

    /// Areal view of this geometry; polygons become single-part multipolygons
    pub fn to_multi_polygon(&self) -> Option<MultiPolygon<f64>> {
        match self {
            Geometry::Polygon(rings) => Some(MultiPolygon::new(vec![polygon_from_rings(rings)])),
            Geometry::MultiPolygon(polys) => Some(MultiPolygon::new(
                polys.iter().map(|rings| polygon_from_rings(rings)).collect(),
            )),
            _ => None,
        }
    }
}

fn polygon_from_rings(rings: &[Vec<Position>]) -> Polygon<f64> {
    let mut rings = rings.iter().map(|ring| {
        LineString::new(ring.iter().map(|[x, y]| Coord { x: *x, y: *y }).collect())
    });
    let exterior = rings.next().unwrap_or_else(|| LineString::new(vec![]));
    Polygon::new(exterior, rings.collect())
}

fn ring_positions(ring: &LineString<f64>) -> Vec<Position> {
    ring.coords().map(|c| [c.x, c.y]).collect()
}

impl From<&Point<f64>> for Geometry {
    fn from(point: &Point<f64>) -> Self {
        Geometry::Point([point.x(), point.y()])
    }
}

impl From<&Polygon<f64>> for Geometry {
    fn from(polygon: &Polygon<f64>) -> Self {
        Geometry::Polygon(polygon_rings(polygon))
    }
}

impl From<&MultiPolygon<f64>> for Geometry {
    fn from(multi: &MultiPolygon<f64>) -> Self {
        Geometry::MultiPolygon(multi.iter().map(polygon_rings).collect())
    }
}

fn polygon_rings(polygon: &Polygon<f64>) -> Vec<Vec<Position>> {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(ring_positions)
        .collect()
}

/// Feature properties; a BTreeMap keeps the key order stable between requests
pub type Properties = BTreeMap<String, Value>;

/// Single GeoJSON feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub feature_type: String,
    pub geometry: Option<Geometry>,
    pub properties: Properties,
}

impl Feature {
    pub fn new(geometry: Option<Geometry>, properties: Properties) -> Self {
        Self {
            feature_type: "Feature".to_string(),
            geometry,
            properties,
        }
    }
}

/// GeoJSON feature collection, the shape of every data endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub collection_type: String,
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            collection_type: "FeatureCollection".to_string(),
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
