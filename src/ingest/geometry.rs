//! Way geometry lookups backed by an on-disk node coordinate store.

use anyhow::Result;
use geo::{Centroid, Coord, LineString, Point, Polygon};
use hashbrown::{HashMap, HashSet};
use osmpbfreader::{NodeId, OsmObj, OsmPbfReader, WayId};
use sled::Db;
use std::io::{Read, Seek};
use tempfile::{Builder, TempDir};
use tracing::info;

/// Resolves the location of selected ways from their member nodes
pub struct WayLocator {
    node_db: Db,
    way_nodes: HashMap<WayId, Vec<NodeId>>,
    // Keeps the sled directory alive as long as the locator
    _dir: TempDir,
}

impl WayLocator {
    /// Scan the file twice: once for ways accepted by `filter`, once for the
    /// coordinates of their nodes.
    pub fn build<R: Read + Seek, F>(reader: &mut OsmPbfReader<R>, filter: F) -> Result<Self>
    where
        F: Fn(&osmpbfreader::Tags) -> bool,
    {
        info!("Pass 1/2: Identifying relevant ways...");
        reader.rewind()?;

        let mut way_nodes = HashMap::new();
        let mut needed_nodes = HashSet::new();

        for obj in reader.iter() {
            if let OsmObj::Way(way) = obj? {
                if filter(&way.tags) {
                    needed_nodes.extend(way.nodes.iter().copied());
                    way_nodes.insert(way.id, way.nodes);
                }
            }
        }

        info!(
            "Found {} relevant ways referencing {} nodes",
            way_nodes.len(),
            needed_nodes.len()
        );

        info!("Pass 2/2: Storing node coordinates...");
        reader.rewind()?;

        let dir = Builder::new().prefix("capacity-atlas-nodes-").tempdir()?;
        let db = sled::open(dir.path())?;
        let mut stored = 0usize;

        for obj in reader.iter() {
            if let OsmObj::Node(node) = obj? {
                if needed_nodes.contains(&node.id) {
                    let mut value = [0u8; 16];
                    value[0..8].copy_from_slice(&node.lon().to_be_bytes());
                    value[8..16].copy_from_slice(&node.lat().to_be_bytes());
                    db.insert(node.id.0.to_be_bytes(), &value)?;
                    stored += 1;
                }
            }
        }

        db.flush()?;
        info!("Stored {} node coordinates", stored);

        Ok(Self {
            node_db: db,
            way_nodes,
            _dir: dir,
        })
    }

    fn coord(&self, node: NodeId) -> Option<Coord<f64>> {
        let bytes = self.node_db.get(node.0.to_be_bytes()).ok()??;
        let lon = f64::from_be_bytes(bytes.get(0..8)?.try_into().ok()?);
        let lat = f64::from_be_bytes(bytes.get(8..16)?.try_into().ok()?);
        Some(Coord { x: lon, y: lat })
    }

    /// Representative point of a way: the centroid of its closed ring, or of
    /// its line when the way is open
    pub fn centroid(&self, way: WayId) -> Option<Point<f64>> {
        let nodes = self.way_nodes.get(&way)?;
        let coords: Vec<Coord<f64>> = nodes.iter().filter_map(|n| self.coord(*n)).collect();

        match coords.len() {
            0 => None,
            1 => Some(Point::from(coords[0])),
            _ if coords.len() >= 4 && coords.first() == coords.last() => {
                Polygon::new(LineString::new(coords), vec![]).centroid()
            }
            _ => LineString::new(coords).centroid(),
        }
    }
}
