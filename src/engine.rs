//! Engine facade: one method per endpoint, each answered from the response
//! cache or recomputed from the store.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::cache::{Clock, Endpoint, ResponseCache, SystemClock};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::feature;
use crate::hierarchy::{group_regions, HierarchyResolver};
use crate::models::facility::{latest_per_name, live_facilities};
use crate::models::{FeatureCollection, HospitalRecord, Poi, PoiKind, RegionLevel, RegionRecord};
use crate::spatial::{containment_join, nearest_within};
use crate::store::FacilityStore;

/// Aggregate live hospitals into the regions of one level.
///
/// Pure over its inputs: `rows` are the resolved region rows for `level`,
/// `hospitals` every stored hospital row including history.
pub fn aggregate(
    level: RegionLevel,
    rows: &[RegionRecord],
    hospitals: Vec<HospitalRecord>,
) -> FeatureCollection {
    let regions = group_regions(level, rows);
    let facilities = live_facilities(hospitals);
    let joined = containment_join(&regions, &facilities);
    FeatureCollection::new(feature::region_features(&joined))
}

pub struct CapacityEngine<S: FacilityStore, C: Clock = SystemClock> {
    store: S,
    cache: ResponseCache<C>,
    resolver: HierarchyResolver,
    store_timeout: Duration,
    max_distance_m: f64,
}

impl<S: FacilityStore> CapacityEngine<S> {
    pub fn new(store: S, config: &Config) -> Self {
        Self::with_clock(store, config, SystemClock)
    }
}

impl<S: FacilityStore, C: Clock> CapacityEngine<S, C> {
    pub fn with_clock(store: S, config: &Config, clock: C) -> Self {
        Self {
            store,
            cache: ResponseCache::with_clock(config.cache.ttl(), clock),
            resolver: HierarchyResolver::from_config(&config.hierarchy),
            store_timeout: config.store.timeout(),
            max_distance_m: config.nearby.max_distance_m,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &ResponseCache<C> {
        &self.cache
    }

    /// Run a store operation, failing fast when it exceeds the configured bound
    async fn bounded<T>(&self, op: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.store_timeout, op)
            .await
            .map_err(|_| {
                Error::StoreUnavailable(format!(
                    "no answer within {}s",
                    self.store_timeout.as_secs_f64()
                ))
            })?
    }

    /// Readiness: the store must answer
    pub async fn health(&self) -> Result<()> {
        self.bounded(self.store.ping()).await
    }

    /// Latest record of every hospital, unaggregated
    pub async fn hospitals(&self) -> Result<Arc<FeatureCollection>> {
        self.cache
            .get_or_try_insert_with(Endpoint::Hospitals, || async {
                let records = latest_per_name(self.bounded(self.store.hospitals()).await?);
                debug!("Listing {} live hospitals", records.len());
                Ok(FeatureCollection::new(feature::hospital_features(&records)))
            })
            .await
    }

    /// Capacity tallies per region of `level`
    pub async fn aggregated(&self, level: RegionLevel) -> Result<Arc<FeatureCollection>> {
        self.cache
            .get_or_try_insert_with(Endpoint::Aggregated(level), || async move {
                let start = Instant::now();
                let rows = self
                    .bounded(self.resolver.resolve(level, &self.store))
                    .await?;
                let hospitals = self.bounded(self.store.hospitals()).await?;

                // Union and join are CPU bound
                let collection =
                    tokio::task::spawn_blocking(move || aggregate(level, &rows, hospitals))
                        .await
                        .map_err(|e| Error::Task(e.to_string()))?;
                info!(
                    "Aggregated {} regions at level {} in {:?}",
                    collection.len(),
                    level,
                    start.elapsed()
                );
                Ok(collection)
            })
            .await
    }

    /// Emergency-capable hospitals from OSM
    pub async fn osm_hospitals(&self) -> Result<Arc<FeatureCollection>> {
        self.cache
            .get_or_try_insert_with(Endpoint::OsmHospitals, || async {
                let hospitals = self.load_pois(PoiKind::Hospital).await?;
                Ok(FeatureCollection::new(feature::poi_features(&hospitals)))
            })
            .await
    }

    /// Helipads that are the nearest helipad of an emergency hospital and
    /// closer to it than the configured threshold
    pub async fn nearby_helipads(&self) -> Result<Arc<FeatureCollection>> {
        self.cache
            .get_or_try_insert_with(Endpoint::NearbyHelipads, || async {
                let hospitals = self.load_pois(PoiKind::Hospital).await?;
                let helipads = self.load_pois(PoiKind::Helipad).await?;

                let pairs = nearest_within(&hospitals, &helipads, self.max_distance_m);
                info!(
                    "{} of {} emergency hospitals have a helipad within {} m",
                    pairs.len(),
                    hospitals.len(),
                    self.max_distance_m
                );
                Ok(FeatureCollection::new(feature::helipad_features(&pairs)))
            })
            .await
    }

    async fn load_pois(&self, kind: PoiKind) -> Result<Vec<Poi>> {
        let records = self.bounded(self.store.pois(kind)).await?;
        Ok(records.into_iter().filter_map(Poi::from_record).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::hierarchy::tests::{region_row, square_geom};
    use crate::models::facility::tests::hospital;
    use crate::models::{Geometry, OsmElement, PoiRecord, RegionSource};
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn district_store() -> MemoryStore {
        let regions = vec![
            region_row(RegionSource::Districts, "A", "01", square_geom(0.0, 0.0, 1.0)),
            region_row(RegionSource::Districts, "B", "01", square_geom(5.0, 5.0, 1.0)),
        ];
        let hospitals = vec![
            hospital("h1", 0.25, 0.25, Some("free")),
            hospital("h2", 0.75, 0.75, Some("full")),
        ];
        MemoryStore::default()
            .with_regions(regions)
            .with_hospitals(hospitals)
    }

    fn engine(store: MemoryStore) -> (CapacityEngine<MemoryStore, ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        (
            CapacityEngine::with_clock(store, &Config::default(), clock.clone()),
            clock,
        )
    }

    #[tokio::test]
    async fn test_district_end_to_end() {
        let (engine, _) = engine(district_store());
        let collection = engine.aggregated(RegionLevel::District).await.unwrap();
        assert_eq!(collection.len(), 2);

        let a = &collection.features[0];
        assert_eq!(a.properties["name"], "A");
        assert_eq!(a.properties["icu_low_state"], json!({"free": 1, "full": 1}));

        let b = &collection.features[1];
        assert_eq!(b.properties["name"], "B");
        assert_eq!(b.properties["icu_low_state"], json!({"": 0}));
        let stored: Geometry = serde_json::from_str(&square_geom(5.0, 5.0, 1.0)).unwrap();
        assert_eq!(b.geometry, Some(stored));
    }

    #[tokio::test]
    async fn test_only_latest_snapshot_counts() {
        let mut old = hospital("h1", 0.25, 0.25, Some("free"));
        old.last_update = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let new = hospital("h1", 0.25, 0.25, Some("full"));
        let store = MemoryStore::default()
            .with_regions(vec![region_row(
                RegionSource::Districts,
                "A",
                "01",
                square_geom(0.0, 0.0, 1.0),
            )])
            .with_hospitals(vec![old, new]);

        let (engine, _) = engine(store);
        let collection = engine.aggregated(RegionLevel::District).await.unwrap();
        assert_eq!(collection.features[0].properties["icu_low_state"], json!({"full": 1}));

        let listing = engine.hospitals().await.unwrap();
        assert_eq!(listing.len(), 1);
    }

    #[tokio::test]
    async fn test_cached_payload_is_identical() {
        let (engine, clock) = engine(district_store());
        let first = engine.aggregated(RegionLevel::District).await.unwrap();
        let queries = engine.store().query_count();

        clock.advance(Duration::from_secs(60));
        let second = engine.aggregated(RegionLevel::District).await.unwrap();

        assert_eq!(
            serde_json::to_vec(first.as_ref()).unwrap(),
            serde_json::to_vec(second.as_ref()).unwrap()
        );
        assert_eq!(engine.store().query_count(), queries);
    }

    #[tokio::test]
    async fn test_expired_entry_recomputes_once() {
        let (engine, clock) = engine(district_store());
        engine.aggregated(RegionLevel::District).await.unwrap();
        let per_compute = engine.store().query_count();

        clock.advance(Duration::from_secs(3600));
        engine.aggregated(RegionLevel::District).await.unwrap();
        engine.aggregated(RegionLevel::District).await.unwrap();

        assert_eq!(engine.store().query_count(), per_compute * 2);
    }

    #[tokio::test]
    async fn test_store_outage_surfaces() {
        let (engine, _) = engine(district_store());
        engine.store().set_offline(true);

        assert!(matches!(
            engine.aggregated(RegionLevel::State).await,
            Err(Error::StoreUnavailable(_))
        ));
        assert!(engine.health().await.is_err());

        engine.store().set_offline(false);
        assert!(engine.health().await.is_ok());
        assert!(engine.aggregated(RegionLevel::State).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_substate_level_mixes_tables() {
        let mut rows = vec![
            region_row(RegionSource::States, "Bayern", "09", square_geom(0.0, 0.0, 1.0)),
            region_row(RegionSource::States, "Bayern (Bodensee)", "09", square_geom(0.0, 2.0, 1.0)),
            region_row(RegionSource::States, "Berlin", "11", square_geom(4.0, 0.0, 1.0)),
        ];
        let mut oberbayern =
            region_row(RegionSource::Substates, "Oberbayern", "09", square_geom(0.0, 0.0, 0.5));
        oberbayern.substate_code = Some("1".to_string());
        rows.push(oberbayern);

        let store = MemoryStore::default()
            .with_regions(rows)
            .with_hospitals(vec![hospital("Charité", 4.5, 0.5, Some("free"))]);
        let (engine, _) = engine(store);

        let collection = engine.aggregated(RegionLevel::SubState).await.unwrap();
        let names: Vec<&str> = collection
            .features
            .iter()
            .filter_map(|f| f.properties["name"].as_str())
            .collect();
        assert_eq!(names, vec!["Oberbayern", "Berlin"]);
        assert_eq!(
            collection.features[1].properties["icu_low_state"],
            json!({"free": 1})
        );
    }

    fn poi(kind: PoiKind, osm_id: i64, lon: f64, lat: f64) -> PoiRecord {
        PoiRecord {
            kind,
            element: OsmElement::Node,
            osm_id,
            name: Some(format!("{}-{}", kind.as_str(), osm_id)),
            geom: format!(r#"{{"type":"Point","coordinates":[{},{}]}}"#, lon, lat),
        }
    }

    #[tokio::test]
    async fn test_nearby_helipads() {
        // 0.0045° of latitude is about 500 m, 0.018° about 2000 m
        let store = MemoryStore::default().with_pois(vec![
            poi(PoiKind::Hospital, 1, 9.0, 48.0),
            poi(PoiKind::Helipad, 10, 9.0, 48.0045),
            poi(PoiKind::Hospital, 2, 12.0, 50.0),
            poi(PoiKind::Helipad, 20, 12.0, 50.018),
        ]);
        let (engine, _) = engine(store);

        let collection = engine.nearby_helipads().await.unwrap();
        assert_eq!(collection.len(), 1);
        let properties = &collection.features[0].properties;
        assert_eq!(properties["osm_id"], 10);
        assert_eq!(properties["hospital_osm_id"], 1);
        let distance = properties["distance_to_hospital"].as_f64().unwrap();
        assert!(distance > 450.0 && distance < 550.0);

        let hospitals = engine.osm_hospitals().await.unwrap();
        assert_eq!(hospitals.len(), 2);
    }

    #[tokio::test]
    async fn test_hospital_tagged_as_helipad_pairs_with_itself() {
        let mut way_helipad = poi(PoiKind::Helipad, 5, 9.0, 48.0045);
        way_helipad.element = OsmElement::Way;
        let store = MemoryStore::default().with_pois(vec![
            poi(PoiKind::Hospital, 5, 9.0, 48.0),
            poi(PoiKind::Helipad, 5, 9.0, 48.0),
            way_helipad,
        ]);
        let (engine, _) = engine(store);

        let collection = engine.nearby_helipads().await.unwrap();
        assert_eq!(collection.len(), 1);
        let properties = &collection.features[0].properties;
        assert_eq!(properties["osm_type"], "node");
        assert_eq!(properties["distance_to_hospital"].as_f64(), Some(0.0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_aggregation_runs_alongside_other_requests() {
        let engine = Arc::new(engine(district_store()).0);
        let levels = RegionLevel::all().iter().copied().map(|level| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.aggregated(level).await })
        });

        let (health, results) =
            tokio::join!(engine.health(), futures::future::join_all(levels));
        assert!(health.is_ok());
        for result in results {
            assert!(result.unwrap().is_ok());
        }
    }
}
