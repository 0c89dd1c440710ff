//! Left containment join of facilities into regions.

use rayon::prelude::*;
use tracing::{debug, warn};

use super::RegionSpatialIndex;
use crate::models::{Facility, Region};

/// One region together with the facilities located inside it
#[derive(Debug)]
pub struct JoinedRegion<'a> {
    pub region: &'a Region,
    pub facilities: Vec<&'a Facility>,
}

/// Join every facility into the region that contains it.
///
/// Every region appears exactly once and in input order, including regions that
/// contain no facility. A facility contained by several regions is assigned to
/// the first of them.
pub fn containment_join<'a>(
    regions: &'a [Region],
    facilities: &'a [Facility],
) -> Vec<JoinedRegion<'a>> {
    let index = RegionSpatialIndex::build(regions);

    let assignments: Vec<Option<usize>> = facilities
        .par_iter()
        .map(|facility| {
            let hits = index.lookup(facility.location);
            if hits.len() > 1 {
                let names: Vec<&str> = hits.iter().map(|&i| regions[i].name()).collect();
                warn!(
                    "Hospital '{}' lies in {} regions {:?}; assigning it to '{}'",
                    facility.name(),
                    hits.len(),
                    names,
                    names[0]
                );
            }
            hits.first().copied()
        })
        .collect();

    let mut joined: Vec<JoinedRegion<'a>> = regions
        .iter()
        .map(|region| JoinedRegion {
            region,
            facilities: Vec::new(),
        })
        .collect();

    let mut unmatched = 0usize;
    for (facility, assignment) in facilities.iter().zip(assignments) {
        match assignment {
            Some(ordinal) => joined[ordinal].facilities.push(facility),
            None => unmatched += 1,
        }
    }

    debug!(
        "Joined {} hospitals into {} regions ({} outside every region)",
        facilities.len() - unmatched,
        regions.len(),
        unmatched
    );

    joined
}
