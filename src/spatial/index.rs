//! Spatial index for fast region containment lookups.

use geo::coordinate_position::{CoordPos, CoordinatePosition};
use geo::{BoundingRect, Coord, Point};
use rstar::{RTree, RTreeObject, AABB};
use tracing::info;

use crate::models::Region;

/// Wrapper for R-tree indexing of regions
#[derive(Clone)]
struct IndexedRegion {
    ordinal: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedRegion {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Spatial index over one level's regions, addressed by their position in the
/// slice it was built from.
pub struct RegionSpatialIndex<'a> {
    regions: &'a [Region],
    tree: RTree<IndexedRegion>,
}

impl<'a> RegionSpatialIndex<'a> {
    /// Build spatial index from regions
    pub fn build(regions: &'a [Region]) -> Self {
        let indexed: Vec<IndexedRegion> = regions
            .iter()
            .enumerate()
            .filter_map(|(ordinal, region)| {
                let rect = region.area.bounding_rect()?;
                Some(IndexedRegion {
                    ordinal,
                    envelope: AABB::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                })
            })
            .collect();

        let tree = RTree::bulk_load(indexed);
        info!("Region index built with {} entries", tree.size());

        Self { regions, tree }
    }

    /// Ordinals of every region containing `point`, boundary included, ascending
    pub fn lookup(&self, point: Point<f64>) -> Vec<usize> {
        let coord = Coord {
            x: point.x(),
            y: point.y(),
        };
        let query_envelope = AABB::from_point([coord.x, coord.y]);

        // Envelope candidates from the R-tree, then the exact test
        let mut hits: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&query_envelope)
            .filter(|ir| {
                self.regions[ir.ordinal].area.coordinate_position(&coord) != CoordPos::Outside
            })
            .map(|ir| ir.ordinal)
            .collect();

        hits.sort_unstable();
        hits
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::tests::square_region;
    use crate::models::RegionLevel;

    #[test]
    fn test_empty_index() {
        let index = RegionSpatialIndex::build(&[]);
        assert!(index.is_empty());
        assert!(index.lookup(Point::new(8.5, 47.4)).is_empty());
    }

    #[test]
    fn test_interior_and_boundary() {
        let regions = vec![
            square_region("A", RegionLevel::District, 0.0, 0.0, 1.0),
            square_region("B", RegionLevel::District, 1.0, 0.0, 1.0),
        ];
        let index = RegionSpatialIndex::build(&regions);
        assert_eq!(index.len(), 2);

        assert_eq!(index.lookup(Point::new(0.5, 0.5)), vec![0]);
        assert_eq!(index.lookup(Point::new(1.5, 0.5)), vec![1]);
        // Shared edge touches both
        assert_eq!(index.lookup(Point::new(1.0, 0.5)), vec![0, 1]);
        assert!(index.lookup(Point::new(5.0, 5.0)).is_empty());
    }
}
