use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::hierarchy::HierarchyConfig;
use crate::spatial::DEFAULT_MAX_DISTANCE_M;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub nearby: NearbyConfig,
    #[serde(default)]
    pub hierarchy: HierarchyConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_scylla_url")]
    pub scylla_url: String,
    #[serde(default = "default_keyspace")]
    pub keyspace: String,
    /// Upper bound for a single store round trip
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NearbyConfig {
    #[serde(default = "default_max_distance_m")]
    pub max_distance_m: f64,
}

fn default_listen() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_scylla_url() -> String {
    "127.0.0.1".to_string()
}

fn default_keyspace() -> String {
    "capacity".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_max_distance_m() -> f64 {
    DEFAULT_MAX_DISTANCE_M
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            scylla_url: default_scylla_url(),
            keyspace: default_keyspace(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl Default for NearbyConfig {
    fn default() -> Self {
        Self {
            max_distance_m: default_max_distance_m(),
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.store.timeout_secs == 0 {
            return Err(Error::Config("store.timeout_secs must be positive".to_string()));
        }
        if self.cache.ttl_secs == 0 {
            return Err(Error::Config("cache.ttl_secs must be positive".to_string()));
        }
        if !(self.nearby.max_distance_m > 0.0) {
            return Err(Error::Config(
                "nearby.max_distance_m must be positive".to_string(),
            ));
        }
        if self.hierarchy.lake_marker.is_empty() {
            return Err(Error::Config("hierarchy.lake_marker must not be empty".to_string()));
        }
        Ok(())
    }
}
