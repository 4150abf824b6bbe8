//! Merging of per-partition extracts into one dataset per leaf and geometry kind.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{Category, GeometryKind, LabelHierarchy, LeafPath, PoiRecord};
use crate::storage::{read_records, write_records};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ConsolidationReport {
    /// Combined files written in this run
    pub written: usize,
    /// Leaf merges skipped because their output already existed
    pub skipped: usize,
    /// Line records moved out of point datasets
    pub lines_separated: usize,
}

pub struct Consolidator<'a> {
    hierarchy: &'a LabelHierarchy,
}

impl<'a> Consolidator<'a> {
    pub fn new(hierarchy: &'a LabelHierarchy) -> Self {
        Self { hierarchy }
    }

    /// Merge the extracts of every leaf. Existing combined files are never
    /// recomputed.
    pub fn consolidate(&self, extract_root: &Path, combined_root: &Path) -> Result<ConsolidationReport> {
        let mut report = ConsolidationReport::default();

        for (leaf_path, _) in self.hierarchy.leaves() {
            let extract_dir = leaf_path.dir(extract_root);
            let combined_dir = leaf_path.dir(combined_root);
            self.merge_points(&leaf_path, &extract_dir, &combined_dir, &mut report)?;
            self.merge_polygons(&leaf_path, &extract_dir, &combined_dir, &mut report)?;
        }

        info!(
            "Consolidation finished: {} datasets written, {} already present, {} lines separated",
            report.written, report.skipped, report.lines_separated
        );
        Ok(report)
    }

    fn merge_points(
        &self,
        leaf: &LeafPath,
        extract_dir: &Path,
        combined_dir: &Path,
        report: &mut ConsolidationReport,
    ) -> Result<()> {
        let point_path = combined_dir.join(GeometryKind::Point.combined_file_name(&leaf.level3));
        let line_path = combined_dir.join(GeometryKind::Line.combined_file_name(&leaf.level3));
        if point_path.exists() || line_path.exists() {
            debug!("Point datasets of {} already combined", leaf);
            report.skipped += 1;
            return Ok(());
        }

        let records = read_extracts(extract_dir, Category::Point)?;
        if records.is_empty() {
            return Ok(());
        }
        let (lines, points): (Vec<PoiRecord>, Vec<PoiRecord>) = records
            .into_iter()
            .partition(|r| r.kind() == GeometryKind::Line);

        if !points.is_empty() {
            write_records(&point_path, &points)?;
            report.written += 1;
        }
        if !lines.is_empty() {
            write_records(&line_path, &lines)?;
            report.written += 1;
            report.lines_separated += lines.len();
        }
        debug!(
            "Combined {}: {} points, {} lines",
            leaf,
            points.len(),
            lines.len()
        );
        Ok(())
    }

    fn merge_polygons(
        &self,
        leaf: &LeafPath,
        extract_dir: &Path,
        combined_dir: &Path,
        report: &mut ConsolidationReport,
    ) -> Result<()> {
        let polygon_path = combined_dir.join(GeometryKind::Polygon.combined_file_name(&leaf.level3));
        if polygon_path.exists() {
            debug!("Polygon dataset of {} already combined", leaf);
            report.skipped += 1;
            return Ok(());
        }

        let records = read_extracts(extract_dir, Category::Polygon)?;
        if records.is_empty() {
            return Ok(());
        }
        write_records(&polygon_path, &records)?;
        report.written += 1;
        debug!("Combined {}: {} polygons", leaf, records.len());
        Ok(())
    }
}

/// Extract files of one category in a leaf directory, sorted by name
fn extract_files(extract_dir: &Path, category: Category) -> Result<Vec<PathBuf>> {
    if !extract_dir.is_dir() {
        return Ok(Vec::new());
    }
    let suffix = format!("_{}.csv", category);
    let mut files = Vec::new();
    for entry in fs::read_dir(extract_dir).map_err(|e| Error::io(extract_dir, e))? {
        let entry = entry.map_err(|e| Error::io(extract_dir, e))?;
        if entry.file_name().to_string_lossy().ends_with(&suffix) {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

fn read_extracts(extract_dir: &Path, category: Category) -> Result<Vec<PoiRecord>> {
    let mut records = Vec::new();
    for path in extract_files(extract_dir, category)? {
        records.extend(read_records(&path)?);
    }
    Ok(records)
}
