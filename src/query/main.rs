//! Query server for regional capacity data.
//!
//! Serves hospital capacity aggregated per district, sub-state region and
//! state, plus the OSM hospital and helipad proximity layers, as GeoJSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use clap::Parser;
use serde::Serialize;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use capacity_atlas::config::Config;
use capacity_atlas::store::{FacilityStore, ScyllaStore};
use capacity_atlas::{CapacityEngine, Error, FeatureCollection, RegionLevel};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

const GEOJSON_CONTENT_TYPE: &str = "application/geo+json";

#[derive(Parser, Debug)]
#[command(name = "query")]
#[command(about = "Regional capacity query server")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address (overrides the config file)
    #[arg(short, long)]
    listen: Option<String>,

    /// ScyllaDB URL (overrides the config file)
    #[arg(long)]
    scylla_url: Option<String>,
}

type AppState<S> = Arc<CapacityEngine<S>>;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    if let Some(url) = args.scylla_url {
        config.store.scylla_url = url;
    }

    info!("Capacity Atlas Query Server");

    let store = ScyllaStore::new(
        &config.store.scylla_url,
        &config.store.keyspace,
        config.store.timeout(),
    )
    .await
    .context("Failed to connect to ScyllaDB")?;

    let engine = Arc::new(CapacityEngine::new(store, &config));
    if let Err(e) = engine.health().await {
        warn!("Store is not answering yet: {}", e);
    }

    let app = router(engine);

    info!("Starting server on {}", config.server.listen);

    let listener = tokio::net::TcpListener::bind(&config.server.listen).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router<S: FacilityStore + 'static>(engine: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health_handler::<S>))
        .route("/hospitals", get(hospitals_handler::<S>))
        .route("/hospitals/{level}", get(aggregated_handler::<S>))
        .route("/osm/hospitals", get(osm_hospitals_handler::<S>))
        .route("/osm/nearby_helipads", get(nearby_helipads_handler::<S>))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

/// Map engine errors onto HTTP status codes
fn error_response(e: Error) -> (StatusCode, String) {
    match e {
        Error::UnknownHierarchyLevel(_) => (StatusCode::BAD_REQUEST, e.to_string()),
        Error::StoreUnavailable(_) => {
            error!("Query failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
        other => {
            error!("Query failed: {}", other);
            (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

/// Serialize a feature collection as GeoJSON
fn geojson(collection: Arc<FeatureCollection>) -> Response {
    match serde_json::to_vec(collection.as_ref()) {
        Ok(body) => ([(header::CONTENT_TYPE, GEOJSON_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    store: bool,
}

/// Readiness probe, including store connectivity
async fn health_handler<S: FacilityStore>(
    State(engine): State<AppState<S>>,
) -> (StatusCode, Json<HealthResponse>) {
    match engine.health().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                store: true,
            }),
        ),
        Err(e) => {
            warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded",
                    store: false,
                }),
            )
        }
    }
}

/// All hospitals, latest snapshot each
async fn hospitals_handler<S: FacilityStore>(
    State(engine): State<AppState<S>>,
) -> Result<Response, (StatusCode, String)> {
    let collection = engine.hospitals().await.map_err(error_response)?;
    Ok(geojson(collection))
}

/// Capacity tallies per region of the requested level
async fn aggregated_handler<S: FacilityStore>(
    State(engine): State<AppState<S>>,
    Path(level): Path<String>,
) -> Result<Response, (StatusCode, String)> {
    let level: RegionLevel = level.parse().map_err(error_response)?;
    let collection = engine.aggregated(level).await.map_err(error_response)?;
    Ok(geojson(collection))
}

/// Emergency hospitals from OSM
async fn osm_hospitals_handler<S: FacilityStore>(
    State(engine): State<AppState<S>>,
) -> Result<Response, (StatusCode, String)> {
    let collection = engine.osm_hospitals().await.map_err(error_response)?;
    Ok(geojson(collection))
}

/// Helipads near emergency hospitals
async fn nearby_helipads_handler<S: FacilityStore>(
    State(engine): State<AppState<S>>,
) -> Result<Response, (StatusCode, String)> {
    let collection = engine.nearby_helipads().await.map_err(error_response)?;
    Ok(geojson(collection))
}
