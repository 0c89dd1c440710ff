//! Hierarchy resolver: which region tables back each aggregation level, and
//! how their rows are filtered, merged and grouped into joinable regions.

use geo::{BooleanOps, Centroid, MultiPolygon};
use hashbrown::HashMap;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::{Geometry, Region, RegionKey, RegionLevel, RegionRecord, RegionSource};
use crate::store::FacilityStore;

fn default_lake_marker() -> String {
    "Bodensee".to_string()
}

fn default_substate_states() -> Vec<String> {
    ["Baden-Württemberg", "Bayern", "Hessen", "Nordrhein-Westfalen"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Data-driven exceptions of the region hierarchy
#[derive(Debug, Deserialize, Clone)]
pub struct HierarchyConfig {
    /// Substring marking the lake variant of a state polygon
    #[serde(default = "default_lake_marker")]
    pub lake_marker: String,
    /// States that have genuine sub-state polygons
    #[serde(default = "default_substate_states")]
    pub substate_states: Vec<String>,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            lake_marker: default_lake_marker(),
            substate_states: default_substate_states(),
        }
    }
}

/// Predicate over region rows, used to exclude rows from a level
#[derive(Debug, Clone, PartialEq)]
pub enum RegionFilter {
    NameContains(String),
    NameIn(Vec<String>),
    AnyOf(Vec<RegionFilter>),
}

impl RegionFilter {
    pub fn matches(&self, record: &RegionRecord) -> bool {
        match self {
            RegionFilter::NameContains(marker) => record.name.contains(marker.as_str()),
            RegionFilter::NameIn(names) => names.iter().any(|n| *n == record.name),
            RegionFilter::AnyOf(filters) => filters.iter().any(|f| f.matches(record)),
        }
    }
}

/// Fallback table used where the primary table has no coverage
#[derive(Debug, Clone)]
pub struct FallbackPlan {
    pub source: RegionSource,
    /// Fallback rows matching this are dropped (covered by the primary table)
    pub exclude: RegionFilter,
}

/// How one level is assembled from region tables
#[derive(Debug, Clone)]
pub struct LevelPlan {
    pub level: RegionLevel,
    pub primary: RegionSource,
    pub exclude: Option<RegionFilter>,
    pub fallback: Option<FallbackPlan>,
}

/// Resolves a level to the flat list of region rows that make it up
#[derive(Debug, Clone)]
pub struct HierarchyResolver {
    plans: Vec<LevelPlan>,
}

impl HierarchyResolver {
    pub fn new(plans: Vec<LevelPlan>) -> Self {
        Self { plans }
    }

    /// The standard table: districts as stored; sub-state regions where they
    /// exist and whole states elsewhere; states without their lake variants.
    pub fn from_config(config: &HierarchyConfig) -> Self {
        let lake = RegionFilter::NameContains(config.lake_marker.clone());

        Self::new(vec![
            LevelPlan {
                level: RegionLevel::District,
                primary: RegionSource::Districts,
                exclude: None,
                fallback: None,
            },
            LevelPlan {
                level: RegionLevel::SubState,
                primary: RegionSource::Substates,
                exclude: Some(lake.clone()),
                fallback: Some(FallbackPlan {
                    source: RegionSource::States,
                    exclude: RegionFilter::AnyOf(vec![
                        RegionFilter::NameIn(config.substate_states.clone()),
                        lake.clone(),
                    ]),
                }),
            },
            LevelPlan {
                level: RegionLevel::State,
                primary: RegionSource::States,
                exclude: Some(lake),
                fallback: None,
            },
        ])
    }

    pub fn plan(&self, level: RegionLevel) -> Option<&LevelPlan> {
        self.plans.iter().find(|p| p.level == level)
    }

    /// Filter and concatenate primary and fallback rows for one plan
    pub fn select(
        plan: &LevelPlan,
        primary: Vec<RegionRecord>,
        fallback: Vec<RegionRecord>,
    ) -> Vec<RegionRecord> {
        let keep_primary = |r: &RegionRecord| plan.exclude.as_ref().map_or(true, |f| !f.matches(r));
        let mut rows: Vec<RegionRecord> = primary.into_iter().filter(keep_primary).collect();

        if let Some(fallback_plan) = &plan.fallback {
            let before = rows.len();
            rows.extend(
                fallback
                    .into_iter()
                    .filter(|r| !fallback_plan.exclude.matches(r)),
            );
            debug!(
                "{}: {} primary rows, {} fallback rows",
                plan.level,
                before,
                rows.len() - before
            );
        }

        rows
    }

    /// Fetch the tables backing `level` and return its region rows
    pub async fn resolve<S: FacilityStore>(
        &self,
        level: RegionLevel,
        store: &S,
    ) -> Result<Vec<RegionRecord>> {
        let Some(plan) = self.plan(level) else {
            return Ok(Vec::new());
        };

        let primary = store.regions(plan.primary).await?;
        let fallback = match &plan.fallback {
            Some(fallback_plan) => store.regions(fallback_plan.source).await?,
            None => Vec::new(),
        };

        Ok(Self::select(plan, primary, fallback))
    }
}

/// Group part rows into administrative units at `level`.
///
/// Units keep the order in which their first part appears. Multi-part units are
/// unioned; a unit with any unparseable part is dropped.
pub fn group_regions(level: RegionLevel, rows: &[RegionRecord]) -> Vec<Region> {
    let mut order: Vec<(RegionKey, Vec<&RegionRecord>)> = Vec::new();
    let mut positions: HashMap<RegionKey, usize> = HashMap::new();

    for row in rows {
        let key = RegionKey::of(row, level);
        match positions.get(&key) {
            Some(&pos) => order[pos].1.push(row),
            None => {
                positions.insert(key.clone(), order.len());
                order.push((key, vec![row]));
            }
        }
    }

    order
        .into_iter()
        .filter_map(|(key, parts)| build_region(level, key, &parts))
        .collect()
}

fn build_region(level: RegionLevel, key: RegionKey, parts: &[&RegionRecord]) -> Option<Region> {
    let mut geometries = Vec::with_capacity(parts.len());
    for part in parts {
        let parsed = Geometry::parse(&part.id, &part.geom).and_then(|g| {
            let area = g.to_multi_polygon().ok_or_else(|| {
                crate::error::Error::malformed(&part.id, "region geometry is not areal")
            })?;
            Ok((g, area))
        });
        match parsed {
            Ok(pair) => geometries.push(pair),
            Err(e) => {
                warn!("Dropping region '{}' at level {}: {}", key.name, level, e);
                return None;
            }
        }
    }

    let (outline, area) = if geometries.len() == 1 {
        geometries.pop()?
    } else {
        let mut areas = geometries.into_iter().map(|(_, area)| area);
        let first = areas.next()?;
        let union: MultiPolygon<f64> = areas.fold(first, |acc, area| acc.union(&area));
        (Geometry::from(&union), union)
    };

    let centroid = area.centroid();

    Some(Region {
        key,
        level,
        area,
        outline,
        centroid,
    })
}
