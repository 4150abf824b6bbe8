//! TOML configuration for the build pipeline and the annotation engine.
//!
//! Every field has a default, so an empty file (or no file) yields the
//! standard US state extract setup.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::annotate::{EmptyQueryPolicy, PlanarProjection};

const US_PARTITIONS: &str = "alabama, alaska, arizona, arkansas, norcal, socal, colorado, connecticut, delaware, district of columbia, florida, georgia, hawaii, idaho, illinois, indiana, iowa, kansas, kentucky, louisiana, maine, maryland, massachusetts, michigan, minnesota, mississippi, missouri, montana, nebraska, nevada, new hampshire, new jersey, new mexico, new york, north carolina, north dakota, ohio, oklahoma, oregon, pennsylvania, puerto rico, rhode island, south carolina, south dakota, tennessee, texas, united states virgin islands, utah, vermont, virginia, washington, west virginia, wisconsin, wyoming";

const DEFAULT_LAYERS: &[&str] = &[
    "buildings",
    "landuse",
    "natural",
    "places",
    "pofw",
    "pois",
    "railways",
    "roads",
    "traffic",
    "transport",
    "water",
    "waterways",
];

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub build: BuildConfig,
    pub annotate: AnnotateConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BuildConfig {
    /// Partitions in canonical processing order; resumption relies on it
    pub partitions: Vec<String>,

    pub layers: Vec<String>,

    /// Candidate tag columns; on equal cardinality the later one wins
    pub tag_columns: Vec<String>,

    /// Label hierarchy CSV, defaults to `<root>/label_hierarchy.csv`
    pub hierarchy_path: Option<PathBuf>,

    /// Discard extracts, combined datasets and the manifest before building
    pub fresh: bool,

    /// Show a progress bar while building
    pub progress: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            partitions: US_PARTITIONS.split(", ").map(String::from).collect(),
            layers: DEFAULT_LAYERS.iter().map(|s| s.to_string()).collect(),
            tag_columns: vec!["fclass".to_string(), "type".to_string()],
            hierarchy_path: None,
            fresh: false,
            progress: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AnnotateConfig {
    pub projection: PlanarProjection,
    pub empty_query: EmptyQueryPolicy,
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Load from a file if given, otherwise use defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.build.partitions.len(), 54);
        assert_eq!(config.build.partitions[0], "alabama");
        assert_eq!(config.build.partitions[9], "district of columbia");
        assert_eq!(config.build.layers.len(), 12);
        assert_eq!(config.annotate.empty_query, EmptyQueryPolicy::Ignore);
    }

    #[test]
    fn test_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [build]
            partitions = ["ohio", "utah"]
            fresh = true

            [annotate]
            empty_query = "reject"

            [annotate.projection]
            center_lat = 52.0
            center_lon = 10.0
            "#,
        )
        .unwrap();

        assert_eq!(config.build.partitions, vec!["ohio", "utah"]);
        assert!(config.build.fresh);
        assert_eq!(config.build.tag_columns, vec!["fclass", "type"]);
        assert_eq!(config.annotate.empty_query, EmptyQueryPolicy::Reject);
        assert_eq!(config.annotate.projection.center_lat, 52.0);
        assert_eq!(config.annotate.projection.radius, 6_370_997.0);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("landmarks.toml");
        fs::write(&path, "[build]\nlayers = [\"pois\"]\n").unwrap();

        let config = Config::load_or_default(Some(&path)).unwrap();
        assert_eq!(config.build.layers, vec!["pois"]);
        assert!(Config::load_from_file(dir.path().join("missing.toml")).is_err());
    }
}
