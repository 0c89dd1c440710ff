//! Loading of administrative region polygons from GeoJSON files.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use capacity_atlas::models::{Geometry, RegionRecord, RegionSource};

#[derive(Debug, Deserialize)]
struct RawCollection {
    features: Vec<RawFeature>,
}

#[derive(Debug, Deserialize)]
struct RawFeature {
    geometry: Option<Value>,
    #[serde(default)]
    properties: HashMap<String, Value>,
}

/// GeoJSON files under `path` (the file itself, or every `*.geojson` below it)
pub fn region_files(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }

    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().map(|ext| ext == "geojson").unwrap_or(false))
        .collect();
    files.sort();
    files
}

/// Property lookup tolerant of the upper-case attribute names of VG250 exports
fn property(properties: &HashMap<String, Value>, key: &str) -> Option<String> {
    let value = properties
        .get(key)
        .or_else(|| properties.get(&key.to_uppercase()))?;
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse one feature collection into region rows.
///
/// Features sharing an identity are stored as numbered parts of one unit.
pub fn parse_regions(source: RegionSource, content: &str) -> Result<Vec<RegionRecord>> {
    let collection: RawCollection =
        serde_json::from_str(content).context("Failed to parse GeoJSON feature collection")?;

    let mut rows = Vec::with_capacity(collection.features.len());

    for (i, feature) in collection.features.into_iter().enumerate() {
        let props = &feature.properties;
        let (Some(name), Some(state_code)) = (property(props, "gen"), property(props, "sn_l"))
        else {
            warn!("Skipping feature {}: missing name or state key", i);
            continue;
        };

        let substate_code = property(props, "sn_r");
        let district_code = property(props, "sn_k");
        let id = property(props, "ags").unwrap_or_else(|| {
            [
                Some(state_code.as_str()),
                substate_code.as_deref(),
                district_code.as_deref(),
                Some(name.as_str()),
            ]
            .iter()
            .flatten()
            .copied()
            .collect::<Vec<_>>()
            .join("-")
        });

        let Some(geometry) = feature.geometry else {
            warn!("Skipping region '{}': no geometry", name);
            continue;
        };
        let geom = geometry.to_string();
        if let Err(e) = Geometry::parse(&id, &geom) {
            warn!("Skipping region '{}': {}", name, e);
            continue;
        }

        rows.push(RegionRecord {
            source,
            id,
            part: 0,
            name,
            state_code,
            substate_code,
            district_code,
            geom,
        });
    }

    number_parts(&mut rows);
    Ok(rows)
}

/// Number rows sharing an id 0, 1, 2... in order of appearance
fn number_parts(rows: &mut [RegionRecord]) {
    let mut parts: HashMap<String, i32> = HashMap::new();
    for row in rows {
        let part = parts.entry(row.id.clone()).or_insert(0);
        row.part = *part;
        *part += 1;
    }
}

/// Load every region file under `path`
pub fn load_regions(source: RegionSource, path: &Path) -> Result<Vec<RegionRecord>> {
    let mut rows = Vec::new();
    for file in region_files(path) {
        let content = fs::read_to_string(&file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        let parsed = parse_regions(source, &content)
            .with_context(|| format!("Failed to load {}", file.display()))?;
        info!("{}: {} region rows", file.display(), parsed.len());
        rows.extend(parsed);
    }
    number_parts(&mut rows);
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLLECTION: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature",
             "properties": {"GEN": "Bayern", "SN_L": "09", "SN_R": "0"},
             "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}},
            {"type": "Feature",
             "properties": {"GEN": "Bayern", "SN_L": "09", "SN_R": "0"},
             "geometry": {"type": "Polygon", "coordinates": [[[2,0],[3,0],[3,1],[2,1],[2,0]]]}},
            {"type": "Feature",
             "properties": {"GEN": "Nowhere"},
             "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}},
            {"type": "Feature",
             "properties": {"gen": "Broken", "sn_l": "01"},
             "geometry": {"type": "Polygon", "coordinates": [[[0,0]]]}}
        ]
    }"#;

    #[test]
    fn test_parse_regions() {
        let rows = parse_regions(RegionSource::States, COLLECTION).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, rows[1].id);
        assert_eq!(rows[0].part, 0);
        assert_eq!(rows[1].part, 1);
        assert_eq!(rows[0].state_code, "09");
        assert!(Geometry::parse("x", &rows[1].geom).is_ok());
    }

    #[test]
    fn test_region_files_in_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.geojson"), COLLECTION).unwrap();
        fs::write(dir.path().join("a.geojson"), COLLECTION).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let files = region_files(dir.path());
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.geojson"));

        let rows = load_regions(RegionSource::States, dir.path()).unwrap();
        assert_eq!(rows.len(), 4);
        let parts: Vec<i32> = rows.iter().map(|r| r.part).collect();
        assert_eq!(parts, vec![0, 1, 2, 3]);
    }
}
