//! Paginated fetch of hospital capacity snapshots from an upstream feature service.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use capacity_atlas::models::{Geometry, HospitalRecord};

/// Page size of the upstream service
pub const DEFAULT_PAGE_SIZE: usize = 2000;

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    features: Vec<PageFeature>,
}

#[derive(Debug, Deserialize)]
struct PageFeature {
    attributes: Attributes,
    #[serde(default)]
    geometry: Option<XY>,
}

#[derive(Debug, Deserialize)]
struct XY {
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize)]
struct Attributes {
    #[serde(default)]
    id: Option<String>,
    name: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    contact: Option<String>,
    #[serde(default)]
    icu_low_state: Option<String>,
    #[serde(default)]
    icu_high_state: Option<String>,
    #[serde(default)]
    ecmo_state: Option<String>,
    /// Epoch milliseconds
    last_update: Option<i64>,
}

/// URL of the page starting at `offset`
pub fn page_url(base: &Url, offset: usize, page_size: usize) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut()
        .append_pair("resultOffset", &offset.to_string())
        .append_pair("resultRecordCount", &page_size.to_string());
    url
}

/// Parse one page into records. Rows lacking a name or timestamp are skipped.
/// Returns the records and the number of raw rows on the page.
pub fn parse_page(body: &str) -> Result<(Vec<HospitalRecord>, usize)> {
    let page: Page = serde_json::from_str(body).context("Failed to parse page")?;
    let raw = page.features.len();

    let mut records = Vec::with_capacity(raw);
    for feature in page.features {
        let attrs = feature.attributes;
        let Some(name) = attrs.name.filter(|n| !n.is_empty()) else {
            warn!("Skipping hospital row without a name");
            continue;
        };
        let Some(last_update) = attrs.last_update.and_then(DateTime::<Utc>::from_timestamp_millis)
        else {
            warn!("Skipping hospital '{}': missing or invalid last_update", name);
            continue;
        };

        let geom = match feature.geometry {
            Some(XY { x, y }) => Some(serde_json::to_string(&Geometry::Point([x, y]))?),
            None => None,
        };

        records.push(HospitalRecord {
            id: attrs.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            name,
            address: attrs.address,
            contact: attrs.contact,
            icu_low_state: attrs.icu_low_state,
            icu_high_state: attrs.icu_high_state,
            ecmo_state: attrs.ecmo_state,
            last_update,
            geom,
        });
    }

    Ok((records, raw))
}

/// Fetches every page of the upstream service until an empty page comes back
pub struct HospitalFetcher {
    client: Client,
    base: Url,
    page_size: usize,
}

impl HospitalFetcher {
    pub fn new(base: &str, page_size: usize) -> Result<Self> {
        Ok(Self {
            client: Client::builder()
                .user_agent("CapacityAtlas/0.1 (ingest)")
                .timeout(Duration::from_secs(60))
                .build()
                .context("Failed to create HTTP client")?,
            base: Url::parse(base).context("Invalid upstream URL")?,
            page_size,
        })
    }

    pub async fn fetch_all(&self) -> Result<Vec<HospitalRecord>> {
        let mut records = Vec::new();
        let mut offset = 0;

        loop {
            let url = page_url(&self.base, offset, self.page_size);
            debug!("Fetching {}", url);

            let body = self
                .client
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?;

            let (page, raw) = parse_page(&body)
                .with_context(|| format!("Bad page at offset {}", offset))?;
            if raw == 0 {
                break;
            }

            records.extend(page);
            offset += raw;
            info!("Fetched {} rows so far", offset);
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_url() {
        let base = Url::parse("https://example.org/query?f=json&where=1%3D1").unwrap();
        let url = page_url(&base, 4000, 2000);
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("resultOffset".to_string(), "4000".to_string())));
        assert!(pairs.contains(&("resultRecordCount".to_string(), "2000".to_string())));
        assert!(pairs.contains(&("where".to_string(), "1=1".to_string())));
    }

    #[test]
    fn test_parse_page() {
        let body = r#"{"features": [
            {"attributes": {"id": "k1", "name": "Klinikum", "icu_low_state": "VERFUEGBAR",
                            "last_update": 1585735200000},
             "geometry": {"x": 11.5, "y": 48.1}},
            {"attributes": {"name": "Unplaced", "last_update": 1585735200000}},
            {"attributes": {"name": "Undated"}},
            {"attributes": {"last_update": 1585735200000}}
        ]}"#;

        let (records, raw) = parse_page(body).unwrap();
        assert_eq!(raw, 4);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "k1");
        assert_eq!(records[0].icu_low_state.as_deref(), Some("VERFUEGBAR"));
        let location = Geometry::parse("k1", records[0].geom.as_deref().unwrap()).unwrap();
        assert_eq!(location, Geometry::Point([11.5, 48.1]));
        assert!(records[1].geom.is_none());
        assert!(!records[1].id.is_empty());
    }

    #[test]
    fn test_empty_page_ends_paging() {
        let (records, raw) = parse_page(r#"{"features": []}"#).unwrap();
        assert!(records.is_empty());
        assert_eq!(raw, 0);
    }
}
