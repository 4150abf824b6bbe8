//! Build manifest: the explicit record of completed work.
//!
//! Every extract file the builder writes is recorded with its checksum, and a
//! partition is marked complete only after all of its layers were processed.
//! A file on disk without a matching manifest entry is treated as unfinished.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::dataset::{file_checksum, write_atomic};
use crate::error::{Error, Result};

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStatus {
    Complete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionEntry {
    pub status: PartitionStatus,
    pub completed_at: DateTime<Utc>,
}

/// One written extract file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractEntry {
    pub partition: String,
    /// Leaf path rendered as `level1;level2;level3`
    pub leaf: String,
    pub records: usize,
    pub checksum: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(skip)]
    root: PathBuf,

    pub partitions: BTreeMap<String, PartitionEntry>,

    /// Keyed by path relative to the extract root, `/`-separated
    pub extracts: BTreeMap<String, ExtractEntry>,
}

impl Manifest {
    /// Empty manifest for an extract root
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            ..Default::default()
        }
    }

    pub fn path_for(root: &Path) -> PathBuf {
        root.join(MANIFEST_FILE)
    }

    /// Load the manifest of an extract root, `None` if there is none yet
    pub fn load(root: &Path) -> Result<Option<Self>> {
        let path = Self::path_for(root);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read(&path).map_err(|e| Error::io(&path, e))?;
        let mut manifest: Manifest = serde_json::from_slice(&content)?;
        manifest.root = root.to_path_buf();
        debug!(
            "Loaded manifest: {} complete partitions, {} extracts",
            manifest.partitions.len(),
            manifest.extracts.len()
        );
        Ok(Some(manifest))
    }

    pub fn save(&self) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        write_atomic(&Self::path_for(&self.root), &bytes)
    }

    pub fn is_partition_complete(&self, partition: &str) -> bool {
        matches!(
            self.partitions.get(partition),
            Some(PartitionEntry {
                status: PartitionStatus::Complete,
                ..
            })
        )
    }

    pub fn mark_partition_complete(&mut self, partition: &str) {
        self.partitions.insert(
            partition.to_string(),
            PartitionEntry {
                status: PartitionStatus::Complete,
                completed_at: Utc::now(),
            },
        );
    }

    pub fn record_extract(&mut self, relative: &str, entry: ExtractEntry) {
        self.extracts.insert(relative.to_string(), entry);
    }

    /// Whether an extract is recorded and the file on disk still matches it
    pub fn is_extract_valid(&self, relative: &str) -> bool {
        let Some(entry) = self.extracts.get(relative) else {
            return false;
        };
        let path = self.root.join(relative);
        match file_checksum(&path) {
            Ok(sum) if sum == entry.checksum => true,
            Ok(_) => {
                warn!("Checksum mismatch for {}, rebuilding", path.display());
                false
            }
            Err(_) => false,
        }
    }
}
