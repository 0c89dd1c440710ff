//! Ingest pipeline.
//!
//! Loads region polygons, hospital capacity snapshots and OSM points of
//! interest into the store read by the query server.

mod geometry;
mod hospitals;
mod osm;
mod regions;

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use osmpbfreader::OsmPbfReader;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use capacity_atlas::config::Config;
use capacity_atlas::models::RegionSource;
use capacity_atlas::store::ScyllaStore;

use crate::hospitals::{HospitalFetcher, DEFAULT_PAGE_SIZE};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "ingest")]
#[command(about = "Load regions, hospitals and OSM points of interest into ScyllaDB")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// ScyllaDB URL (overrides the config file)
    #[arg(long, global = true)]
    scylla_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load administrative polygons from GeoJSON
    Regions {
        /// Region table to load into (districts, substates, states)
        #[arg(long)]
        source: String,

        /// GeoJSON file, or directory searched for *.geojson
        #[arg(long)]
        path: PathBuf,
    },

    /// Fetch hospital capacity snapshots from the upstream service
    Hospitals {
        /// Upstream query URL; paging parameters are appended
        #[arg(long)]
        url: String,

        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: usize,
    },

    /// Extract emergency hospitals and helipads from an OSM PBF file
    Osm {
        /// OSM PBF file to import
        #[arg(short, long)]
        file: PathBuf,
    },
}

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
    if let Some(url) = args.scylla_url {
        config.store.scylla_url = url;
    }

    info!("Capacity Atlas Ingest");

    let store = ScyllaStore::new(
        &config.store.scylla_url,
        &config.store.keyspace,
        config.store.timeout(),
    )
    .await
    .context("Failed to connect to ScyllaDB")?;

    match args.command {
        Command::Regions { source, path } => {
            let source: RegionSource = source.parse()?;
            let rows = regions::load_regions(source, &path)?;
            info!("Writing {} rows into {}", rows.len(), source.as_str());
            for row in &rows {
                store.insert_region(row).await?;
            }
        }
        Command::Hospitals { url, page_size } => {
            let fetcher = HospitalFetcher::new(&url, page_size)?;
            let records = fetcher.fetch_all().await?;
            info!("Writing {} hospital snapshots", records.len());
            for record in &records {
                store.insert_hospital(record).await?;
            }
        }
        Command::Osm { file } => {
            info!("File: {}", file.display());
            let handle = File::open(&file).context("Failed to open PBF file")?;
            let mut reader = OsmPbfReader::new(BufReader::new(handle));
            let pois = osm::extract_pois(&mut reader)?;
            for poi in &pois {
                store.insert_poi(poi).await?;
            }
        }
    }

    info!("Ingest complete");
    Ok(())
}
