//! Nearest-neighbour distance join between two point sets.
//!
//! Candidates are indexed as positions on the unit sphere. The straight-line
//! (chord) distance between two such positions grows monotonically with their
//! great-circle distance, so the R-tree's Euclidean nearest neighbour is also
//! the geodesic nearest neighbour, whatever the latitude.

use geo::{Distance, Haversine, Point};
use rstar::primitives::GeomWithData;
use rstar::RTree;

use crate::models::{Facility, Poi};

/// Default proximity threshold for the helipad query
pub const DEFAULT_MAX_DISTANCE_M: f64 = 1000.0;

/// Anything with a lon/lat location
pub trait Located {
    fn location(&self) -> Point<f64>;
}

impl Located for Poi {
    fn location(&self) -> Point<f64> {
        self.location
    }
}

impl Located for Facility {
    fn location(&self) -> Point<f64> {
        self.location
    }
}

type SphereEntry = GeomWithData<[f64; 3], usize>;

fn to_unit_sphere(point: Point<f64>) -> [f64; 3] {
    let lon = point.x().to_radians();
    let lat = point.y().to_radians();
    [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()]
}

/// R-tree over candidate locations
pub struct NearestIndex<'a, T> {
    candidates: &'a [T],
    tree: RTree<SphereEntry>,
}

impl<'a, T: Located> NearestIndex<'a, T> {
    pub fn build(candidates: &'a [T]) -> Self {
        let entries = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| SphereEntry::new(to_unit_sphere(c.location()), i))
            .collect();
        Self {
            candidates,
            tree: RTree::bulk_load(entries),
        }
    }

    /// Nearest candidate to `point` and its great-circle distance in meters
    pub fn nearest(&self, point: Point<f64>) -> Option<(&'a T, f64)> {
        let entry = self.tree.nearest_neighbor(&to_unit_sphere(point))?;
        let candidate = &self.candidates[entry.data];
        Some((candidate, Haversine.distance(point, candidate.location())))
    }
}

/// A reference point paired with its nearest candidate
#[derive(Debug)]
pub struct NearestPair<'a, R, C> {
    pub reference: &'a R,
    pub candidate: &'a C,
    pub distance_m: f64,
}

/// For each reference, pair it with its single nearest candidate when that
/// candidate is strictly closer than `max_distance_m`.
pub fn nearest_within<'a, R: Located, C: Located>(
    references: &'a [R],
    candidates: &'a [C],
    max_distance_m: f64,
) -> Vec<NearestPair<'a, R, C>> {
    let index = NearestIndex::build(candidates);

    references
        .iter()
        .filter_map(|reference| {
            let (candidate, distance_m) = index.nearest(reference.location())?;
            (distance_m < max_distance_m).then_some(NearestPair {
                reference,
                candidate,
                distance_m,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Spot(Point<f64>);

    impl Located for Spot {
        fn location(&self) -> Point<f64> {
            self.0
        }
    }

    // Meters per degree of latitude on the haversine sphere
    fn lat_offset(meters: f64) -> f64 {
        let point = Point::new(0.0, 0.0);
        meters / Haversine.distance(point, Point::new(0.0, 1.0))
    }

    #[test]
    fn test_only_close_pairs() {
        let hospital = Spot(Point::new(9.0, 48.0));
        let near = Spot(Point::new(9.0, 48.0 + lat_offset(500.0)));
        let far = Spot(Point::new(9.0, 48.0 - lat_offset(2000.0)));

        let references = vec![hospital];
        let candidates = vec![far, near];
        let pairs = nearest_within(&references, &candidates, DEFAULT_MAX_DISTANCE_M);

        assert_eq!(pairs.len(), 1);
        assert!((pairs[0].distance_m - 500.0).abs() < 1.0);
        assert!(std::ptr::eq(pairs[0].candidate, &candidates[1]));
    }

    #[test]
    fn test_nothing_within_threshold() {
        let references = vec![Spot(Point::new(9.0, 48.0))];
        let candidates = vec![Spot(Point::new(9.0, 48.0 + lat_offset(2000.0)))];
        assert!(nearest_within(&references, &candidates, DEFAULT_MAX_DISTANCE_M).is_empty());
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let references = vec![Spot(Point::new(0.0, 0.0))];
        let candidates = vec![Spot(Point::new(0.0, 0.0))];
        assert!(nearest_within(&references, &candidates, 0.0).is_empty());
        assert_eq!(nearest_within(&references, &candidates, 1.0).len(), 1);
    }

    #[test]
    fn test_geodesic_not_planar_nearest() {
        // At 60°N a degree of longitude is half a degree of latitude on the ground
        let origin = Spot(Point::new(10.0, 60.0));
        let east = Spot(Point::new(10.015, 60.0));
        let north = Spot(Point::new(10.0, 60.0101));

        let references = vec![origin];
        let candidates = vec![north, east];
        let pairs = nearest_within(&references, &candidates, 5000.0);
        assert_eq!(pairs.len(), 1);
        assert!(std::ptr::eq(pairs[0].candidate, &candidates[1]));
    }

    #[test]
    fn test_empty_sets() {
        let spots: Vec<Spot> = vec![Spot(Point::new(0.0, 0.0))];
        let none: Vec<Spot> = Vec::new();
        assert!(nearest_within(&spots, &none, 1000.0).is_empty());
        assert!(nearest_within(&none, &spots, 1000.0).is_empty());
    }
}
