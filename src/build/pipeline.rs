//! `build(database_root)`: hierarchy parsing, extraction and consolidation in one call.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use super::builder::{BuildReport, DatabaseBuilder};
use super::consolidate::{ConsolidationReport, Consolidator};
use crate::config::BuildConfig;
use crate::error::{Error, Result};
use crate::models::LabelHierarchy;

pub const RAW_DIR: &str = "raw";
pub const EXTRACT_DIR: &str = "extracts";
pub const COMBINED_DIR: &str = "combined";
pub const HIERARCHY_FILE: &str = "label_hierarchy.csv";

/// Directory layout of a database root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseLayout {
    pub root: PathBuf,
    pub raw_dir: PathBuf,
    pub extract_dir: PathBuf,
    pub combined_dir: PathBuf,
    pub hierarchy_path: PathBuf,
}

impl DatabaseLayout {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            raw_dir: root.join(RAW_DIR),
            extract_dir: root.join(EXTRACT_DIR),
            combined_dir: root.join(COMBINED_DIR),
            hierarchy_path: root.join(HIERARCHY_FILE),
        }
    }

    /// Remove extracts, the manifest and combined datasets. Raw data stays.
    pub fn reset(&self) -> Result<()> {
        for dir in [&self.extract_dir, &self.combined_dir] {
            if dir.exists() {
                info!("Removing {}", dir.display());
                fs::remove_dir_all(dir).map_err(|e| Error::io(dir, e))?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct PipelineReport {
    pub leaves: usize,
    pub build: BuildReport,
    pub consolidation: ConsolidationReport,
}

/// Build a database with the default configuration
pub fn build<P: AsRef<Path>>(database_root: P) -> Result<PipelineReport> {
    build_with_config(database_root, &BuildConfig::default())
}

pub fn build_with_config<P: AsRef<Path>>(database_root: P, config: &BuildConfig) -> Result<PipelineReport> {
    let layout = DatabaseLayout::new(database_root.as_ref());
    if config.fresh {
        layout.reset()?;
    }

    let hierarchy_path = config
        .hierarchy_path
        .clone()
        .unwrap_or_else(|| layout.hierarchy_path.clone());
    let hierarchy = LabelHierarchy::from_path(&hierarchy_path)?;
    info!(
        "Label hierarchy: {} leaves, {} distinct labels",
        hierarchy.leaf_count(),
        hierarchy.labels.len()
    );

    let build = DatabaseBuilder::new(config, &hierarchy).build(&layout.raw_dir, &layout.extract_dir)?;
    let consolidation = Consolidator::new(&hierarchy).consolidate(&layout.extract_dir, &layout.combined_dir)?;

    Ok(PipelineReport {
        leaves: hierarchy.leaf_count(),
        build,
        consolidation,
    })
}
