use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::FacilityStore;
use crate::error::{Error, Result};
use crate::models::{HospitalRecord, OsmElement, PoiKind, PoiRecord, RegionRecord, RegionSource};

type HospitalRow = (
    String,
    i64,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

type PoiRow = (String, i64, Option<String>, String);

type RegionRow = (
    String,
    i32,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
);

/// Store backed by ScyllaDB. Geometries are kept as GeoJSON text columns.
#[derive(Clone)]
pub struct ScyllaStore {
    session: Arc<Session>,
    keyspace: String,
}

impl ScyllaStore {
    pub async fn new(uri: &str, keyspace: &str, connect_timeout: Duration) -> Result<Self> {
        info!("Connecting to ScyllaDB at {}...", uri);
        let session: Session = SessionBuilder::new()
            .known_node(uri)
            .connection_timeout(connect_timeout)
            .build()
            .await
            .map_err(Error::store)?;

        let store = Self {
            session: Arc::new(session),
            keyspace: keyspace.to_string(),
        };

        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        let ks = &self.keyspace;
        let statements = [
            format!(
                "CREATE KEYSPACE IF NOT EXISTS {ks}
                 WITH REPLICATION = {{
                    'class' : 'SimpleStrategy',
                    'replication_factor' : 1
                 }}"
            ),
            // One row per snapshot; the clustering key keeps the history per name
            format!(
                "CREATE TABLE IF NOT EXISTS {ks}.hospitals (
                    name text,
                    last_update bigint,
                    id text,
                    address text,
                    contact text,
                    icu_low_state text,
                    icu_high_state text,
                    ecmo_state text,
                    geom text,
                    PRIMARY KEY (name, last_update)
                ) WITH CLUSTERING ORDER BY (last_update DESC)"
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {ks}.regions (
                    source text,
                    id text,
                    part int,
                    name text,
                    sn_l text,
                    sn_r text,
                    sn_k text,
                    geom text,
                    PRIMARY KEY (source, id, part)
                )"
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {ks}.osm_pois (
                    kind text,
                    element text,
                    osm_id bigint,
                    name text,
                    geom text,
                    PRIMARY KEY (kind, element, osm_id)
                )"
            ),
        ];

        for statement in statements {
            self.session
                .query_unpaged(statement, &[])
                .await
                .map_err(Error::store)?;
        }

        Ok(())
    }

    pub async fn insert_hospital(&self, record: &HospitalRecord) -> Result<()> {
        let query = format!(
            "INSERT INTO {}.hospitals (name, last_update, id, address, contact, icu_low_state, icu_high_state, ecmo_state, geom)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.keyspace
        );
        self.session
            .query_unpaged(
                query,
                (
                    &record.name,
                    record.last_update.timestamp_millis(),
                    &record.id,
                    &record.address,
                    &record.contact,
                    &record.icu_low_state,
                    &record.icu_high_state,
                    &record.ecmo_state,
                    &record.geom,
                ),
            )
            .await
            .map_err(Error::store)?;
        Ok(())
    }

    pub async fn insert_region(&self, record: &RegionRecord) -> Result<()> {
        let query = format!(
            "INSERT INTO {}.regions (source, id, part, name, sn_l, sn_r, sn_k, geom)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            self.keyspace
        );
        self.session
            .query_unpaged(
                query,
                (
                    record.source.as_str(),
                    &record.id,
                    record.part,
                    &record.name,
                    &record.state_code,
                    &record.substate_code,
                    &record.district_code,
                    &record.geom,
                ),
            )
            .await
            .map_err(Error::store)?;
        Ok(())
    }

    pub async fn insert_poi(&self, record: &PoiRecord) -> Result<()> {
        let query = format!(
            "INSERT INTO {}.osm_pois (kind, element, osm_id, name, geom) VALUES (?, ?, ?, ?, ?)",
            self.keyspace
        );
        self.session
            .query_unpaged(
                query,
                (
                    record.kind.as_str(),
                    record.element.as_str(),
                    record.osm_id,
                    &record.name,
                    &record.geom,
                ),
            )
            .await
            .map_err(Error::store)?;
        Ok(())
    }
}

impl FacilityStore for ScyllaStore {
    async fn ping(&self) -> Result<()> {
        self.session
            .query_unpaged("SELECT release_version FROM system.local", &[])
            .await
            .map_err(Error::store)?;
        Ok(())
    }

    async fn hospitals(&self) -> Result<Vec<HospitalRecord>> {
        let query = format!(
            "SELECT name, last_update, id, address, contact, icu_low_state, icu_high_state, ecmo_state, geom
             FROM {}.hospitals",
            self.keyspace
        );

        let rows: Vec<HospitalRow> = self
            .session
            .query_iter(query, &[])
            .await
            .map_err(Error::store)?
            .rows_stream::<HospitalRow>()
            .map_err(Error::store)?
            .try_collect()
            .await
            .map_err(Error::store)?;

        let mut records = Vec::with_capacity(rows.len());
        for (name, millis, id, address, contact, icu_low, icu_high, ecmo, geom) in rows {
            let Some(last_update) = DateTime::<Utc>::from_timestamp_millis(millis) else {
                warn!("Skipping hospital '{}': timestamp {} out of range", name, millis);
                continue;
            };
            records.push(HospitalRecord {
                id,
                name,
                address,
                contact,
                icu_low_state: icu_low,
                icu_high_state: icu_high,
                ecmo_state: ecmo,
                last_update,
                geom,
            });
        }

        Ok(records)
    }

    async fn regions(&self, source: RegionSource) -> Result<Vec<RegionRecord>> {
        let query = format!(
            "SELECT id, part, name, sn_l, sn_r, sn_k, geom FROM {}.regions WHERE source = ?",
            self.keyspace
        );

        let rows: Vec<RegionRow> = self
            .session
            .query_iter(query, (source.as_str(),))
            .await
            .map_err(Error::store)?
            .rows_stream::<RegionRow>()
            .map_err(Error::store)?
            .try_collect()
            .await
            .map_err(Error::store)?;

        Ok(rows
            .into_iter()
            .map(
                |(id, part, name, state_code, substate_code, district_code, geom)| RegionRecord {
                    source,
                    id,
                    part,
                    name,
                    state_code,
                    substate_code,
                    district_code,
                    geom,
                },
            )
            .collect())
    }

    async fn pois(&self, kind: PoiKind) -> Result<Vec<PoiRecord>> {
        let query = format!(
            "SELECT element, osm_id, name, geom FROM {}.osm_pois WHERE kind = ?",
            self.keyspace
        );

        let rows: Vec<PoiRow> = self
            .session
            .query_iter(query, (kind.as_str(),))
            .await
            .map_err(Error::store)?
            .rows_stream::<PoiRow>()
            .map_err(Error::store)?
            .try_collect()
            .await
            .map_err(Error::store)?;

        let mut records = Vec::with_capacity(rows.len());
        for (element, osm_id, name, geom) in rows {
            let element: OsmElement = match element.parse() {
                Ok(element) => element,
                Err(e) => {
                    warn!("Skipping {} {}: {}", kind.as_str(), osm_id, e);
                    continue;
                }
            };
            records.push(PoiRecord {
                kind,
                element,
                osm_id,
                name,
                geom,
            });
        }

        Ok(records)
    }
}
