//! Extraction of emergency hospitals and helipads from an OSM PBF file.

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use osmpbfreader::{OsmObj, OsmPbfReader};
use std::io::{Read, Seek};
use tracing::{debug, info, warn};

use capacity_atlas::models::{Geometry, OsmElement, PoiKind, PoiRecord};

use crate::geometry::WayLocator;

/// Collect every hospital/helipad node and way. Ways are reduced to their centroid.
pub fn extract_pois<R: Read + Seek>(reader: &mut OsmPbfReader<R>) -> Result<Vec<PoiRecord>> {
    let locator = WayLocator::build(reader, |tags| !PoiKind::from_tags(tags).is_empty())?;

    info!("Extracting points of interest...");
    reader.rewind()?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template(
        "{spinner:.green} [{elapsed_precise}] {pos} objects scanned ({per_sec}) {msg}",
    )?);

    let mut pois = Vec::new();

    for obj in reader.iter() {
        pb.inc(1);

        let obj = match obj {
            Ok(o) => o,
            Err(e) => {
                warn!("Error reading OSM object: {}", e);
                continue;
            }
        };

        let (kinds, element, osm_id, point, name) = match &obj {
            OsmObj::Node(node) => {
                let kinds = PoiKind::from_tags(&node.tags);
                if kinds.is_empty() {
                    continue;
                }
                let point = geo::Point::new(node.lon(), node.lat());
                (kinds, OsmElement::Node, node.id.0, point, node.tags.get("name"))
            }
            OsmObj::Way(way) => {
                let kinds = PoiKind::from_tags(&way.tags);
                if kinds.is_empty() {
                    continue;
                }
                let Some(point) = locator.centroid(way.id) else {
                    debug!("Could not resolve geometry for way {}", way.id.0);
                    continue;
                };
                (kinds, OsmElement::Way, way.id.0, point, way.tags.get("name"))
            }
            OsmObj::Relation(_) => continue,
        };

        let geom = serde_json::to_string(&Geometry::from(&point))?;
        for kind in kinds {
            pois.push(PoiRecord {
                kind,
                element,
                osm_id,
                name: name.map(|n| n.to_string()),
                geom: geom.clone(),
            });
        }
        pb.set_message(format!("{} found", pois.len()));
    }

    pb.finish_with_message(format!("{} points of interest", pois.len()));

    let helipads = pois.iter().filter(|p| p.kind == PoiKind::Helipad).count();
    info!(
        "Extracted {} emergency hospitals and {} helipads",
        pois.len() - helipads,
        helipads
    );

    Ok(pois)
}
