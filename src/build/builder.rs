//! Classification of raw partition layers into per-leaf extracts.
//!
//! Partitions are processed in the configured order. After each partition the
//! manifest is saved, so an interrupted build resumes after the furthest
//! completed partition.

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::coverage::CoverageReport;
use super::raw::{discover_layer_files, read_layer, RawLayer, RawLayerFile, TaggedGeometry};
use crate::config::BuildConfig;
use crate::error::{Error, Result};
use crate::hierarchy::is_multi_tag;
use crate::models::{Category, LabelHierarchy, LabelLeaf, PoiRecord};
use crate::storage::dataset::ensure_dir;
use crate::storage::{write_records, ExtractEntry, Manifest};

/// Outcome of one builder run
#[derive(Debug, Default, Serialize)]
pub struct BuildReport {
    pub partitions_processed: Vec<String>,
    pub partitions_skipped: Vec<String>,
    pub extracts_written: usize,
    /// Extracts already recorded in the manifest with a matching checksum
    pub extracts_kept: usize,
    /// Partition/layer/category combinations without raw files
    pub missing_layers: usize,
    /// Present only when the run covered every partition from the start
    pub coverage: Option<CoverageReport>,
}

pub struct DatabaseBuilder<'a> {
    config: &'a BuildConfig,
    hierarchy: &'a LabelHierarchy,
}

impl<'a> DatabaseBuilder<'a> {
    pub fn new(config: &'a BuildConfig, hierarchy: &'a LabelHierarchy) -> Self {
        Self { config, hierarchy }
    }

    /// Classify every partition under `raw_root` into extracts under
    /// `extract_root`, resuming from previous runs.
    pub fn build(&self, raw_root: &Path, extract_root: &Path) -> Result<BuildReport> {
        ensure_dir(extract_root)?;
        let partitions = &self.config.partitions;

        let (mut manifest, start) = match Manifest::load(extract_root)? {
            Some(manifest) => {
                let start = resume_index(&manifest, partitions);
                (manifest, start)
            }
            None => (
                Manifest::new(extract_root),
                infer_legacy_resume(extract_root, partitions),
            ),
        };
        if start > 0 {
            info!(
                "Resuming build at partition {} of {}",
                start + 1,
                partitions.len()
            );
        }

        let mut report = BuildReport::default();
        let mut coverage = CoverageReport::default();
        let pb = self.progress_bar(partitions.len() as u64);

        for (idx, partition) in partitions.iter().enumerate() {
            pb.set_message(partition.clone());
            if idx < start {
                debug!("Partition {} already processed", partition);
                report.partitions_skipped.push(partition.clone());
                pb.inc(1);
                continue;
            }

            info!("Processing partition {}", partition);
            self.process_partition(raw_root, extract_root, partition, &mut manifest, &mut coverage, &mut report)?;
            manifest.mark_partition_complete(partition);
            manifest.save()?;
            report.partitions_processed.push(partition.clone());
            pb.inc(1);
        }
        pb.finish_and_clear();

        info!(
            "Build finished: {} partitions processed, {} skipped, {} extracts written",
            report.partitions_processed.len(),
            report.partitions_skipped.len(),
            report.extracts_written
        );
        if start == 0 {
            coverage.log();
            report.coverage = Some(coverage);
        }
        Ok(report)
    }

    fn process_partition(
        &self,
        raw_root: &Path,
        extract_root: &Path,
        partition: &str,
        manifest: &mut Manifest,
        coverage: &mut CoverageReport,
        report: &mut BuildReport,
    ) -> Result<()> {
        let partition_dir = raw_root.join(partition);

        for &category in Category::all() {
            for layer in &self.config.layers {
                let files = discover_layer_files(&partition_dir, layer, category)?;
                if files.is_empty() {
                    debug!(
                        "{}",
                        Error::MissingPartitionData {
                            partition: partition.to_string(),
                            layer: layer.clone(),
                            category,
                        }
                    );
                    report.missing_layers += 1;
                    continue;
                }

                for file in files {
                    let raw = match read_layer(&file.path, &self.config.tag_columns) {
                        Ok(raw) => raw,
                        Err(e) => {
                            warn!("Skipping {}: {}", file.path.display(), e);
                            continue;
                        }
                    };
                    let layer_coverage = coverage.layer_mut(layer);
                    layer_coverage.total += raw.total as u64;
                    layer_coverage.labeled += raw.labeled as u64;

                    let included = self.extract_leaves(extract_root, partition, &file, &raw, manifest, report)?;
                    coverage.layer_mut(layer).included += included;
                }
            }
        }
        Ok(())
    }

    /// Write one extract per leaf matched by the records of a raw file.
    /// Returns the number of record placements.
    fn extract_leaves(
        &self,
        extract_root: &Path,
        partition: &str,
        file: &RawLayerFile,
        raw: &RawLayer,
        manifest: &mut Manifest,
        report: &mut BuildReport,
    ) -> Result<u64> {
        let mut included = 0u64;

        for (leaf_path, leaf) in self.hierarchy.leaves() {
            let file_name = extract_file_name(&leaf.name, partition, file);
            let relative = format!(
                "{}/{}/{}/{}",
                leaf_path.level1, leaf_path.level2, leaf_path.level3, file_name
            );

            if manifest.is_extract_valid(&relative) {
                if let Some(entry) = manifest.extracts.get(&relative) {
                    included += entry.records as u64;
                }
                report.extracts_kept += 1;
                continue;
            }

            let matched = match_leaf(&raw.records, leaf);
            if matched.is_empty() {
                continue;
            }
            let records: Vec<PoiRecord> = matched
                .into_iter()
                .map(|r| PoiRecord {
                    geometry: r.geometry.clone(),
                    tag: r.tag.clone(),
                    partition: partition.to_string(),
                    layer: file.layer.clone(),
                    category: file.category,
                })
                .collect();

            let path = leaf_path.dir(extract_root).join(&file_name);
            let checksum = write_records(&path, &records)?;
            manifest.record_extract(
                &relative,
                ExtractEntry {
                    partition: partition.to_string(),
                    leaf: leaf_path.to_string(),
                    records: records.len(),
                    checksum,
                },
            );
            included += records.len() as u64;
            report.extracts_written += 1;
        }
        Ok(included)
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.config.progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}

/// Partition name as used in file names: spaces become `-`
pub fn partition_slug(partition: &str) -> String {
    partition.replace(' ', "-")
}

/// `<leaf>_<partition-slug>_<layer>_<n>_<category>.csv`
pub fn extract_file_name(leaf: &str, partition: &str, file: &RawLayerFile) -> String {
    format!(
        "{}_{}_{}_{}_{}.csv",
        leaf,
        partition_slug(partition),
        file.layer,
        file.number,
        file.category
    )
}

/// Whether a normalized tag selects a match term: exact for single tags,
/// substring for multi-tag strings
pub fn tag_matches(tag: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    if is_multi_tag(tag) {
        tag.contains(term)
    } else {
        tag == term
    }
}

/// Records selected by the leaf label or any synonym, each once, in source order
pub fn match_leaf<'r>(records: &'r [TaggedGeometry], leaf: &LabelLeaf) -> Vec<&'r TaggedGeometry> {
    records
        .iter()
        .filter(|r| leaf.match_terms().any(|term| tag_matches(&r.tag, term)))
        .collect()
}

/// Index of the first partition to process given a manifest
fn resume_index(manifest: &Manifest, partitions: &[String]) -> usize {
    partitions
        .iter()
        .rposition(|p| manifest.is_partition_complete(p))
        .map_or(0, |idx| idx + 1)
}

/// Resume point for an extract tree written without a manifest: the
/// furthest partition with any extract file, which is processed again.
pub fn infer_legacy_resume(extract_root: &Path, partitions: &[String]) -> usize {
    let prefixes: Vec<String> = partitions
        .iter()
        .map(|p| format!("{}_", partition_slug(p)))
        .collect();

    let mut furthest: Option<usize> = None;
    for entry in WalkDir::new(extract_root)
        .min_depth(4)
        .max_depth(4)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(leaf) = entry.path().parent().and_then(|p| p.file_name()) else {
            continue;
        };
        let file_name = entry.file_name().to_string_lossy();
        let Some(rest) = file_name.strip_prefix(&format!("{}_", leaf.to_string_lossy())) else {
            continue;
        };
        if let Some(idx) = prefixes.iter().rposition(|prefix| rest.starts_with(prefix.as_str())) {
            furthest = Some(furthest.map_or(idx, |f| f.max(idx)));
        }
    }

    if let Some(idx) = furthest {
        info!(
            "No manifest found; extracts reach partition {}",
            partitions[idx]
        );
    }
    furthest.unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::parse_rows;
    use crate::storage::dataset::file_checksum;
    use crate::storage::read_records;
    use geo_types::{point, Geometry};
    use std::fs;
    use std::path::PathBuf;

    fn hierarchy() -> LabelHierarchy {
        parse_rows(vec![
            vec!["food", "", ""],
            vec!["", "restaurant", ""],
            vec!["", "", "diner", "eatery"],
            vec!["", "", "restaurant"],
            vec!["", "bar", ""],
            vec!["", "", "bar"],
            vec!["leisure", "", ""],
            vec!["", "park", ""],
            vec!["", "", "park"],
        ])
        .unwrap()
    }

    fn config(partitions: &[&str]) -> BuildConfig {
        BuildConfig {
            partitions: partitions.iter().map(|s| s.to_string()).collect(),
            layers: vec!["pois".to_string(), "roads".to_string()],
            progress: false,
            ..Default::default()
        }
    }

    fn raw_fixture() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("raw");
        let ohio = raw.join("ohio");
        let new_york = raw.join("new york");
        fs::create_dir_all(&ohio).unwrap();
        fs::create_dir_all(&new_york).unwrap();

        fs::write(
            ohio.join("gis_osm_pois_free_1.csv"),
            "osm_id,geometry,fclass\n\
             1,POINT(-82.9 40.0),Diner\n\
             2,POINT(-82.8 40.1),Restaurants;Bars\n\
             3,POINT(-82.7 40.2),bench\n",
        )
        .unwrap();
        fs::write(
            ohio.join("gis_osm_pois_a_free_1.csv"),
            "osm_id,geometry,fclass\n\
             4,\"POLYGON((-83 40,-82.9 40,-82.9 40.1,-83 40))\",Parks\n",
        )
        .unwrap();
        fs::write(
            new_york.join("gis_osm_pois_free_1.csv"),
            "osm_id,geometry,fclass\n5,POINT(-74.0 40.7),Eatery\n",
        )
        .unwrap();

        let extracts = dir.path().join("extracts");
        (dir, raw, extracts)
    }

    fn diner_ny(extracts: &Path) -> PathBuf {
        extracts.join("food/restaurant/diner/diner_new-york_pois_1_point.csv")
    }

    #[test]
    fn test_build_writes_leaf_extracts() {
        let (_dir, raw, extracts) = raw_fixture();
        let tree = hierarchy();
        let config = config(&["ohio", "new york"]);

        let report = DatabaseBuilder::new(&config, &tree).build(&raw, &extracts).unwrap();
        assert_eq!(report.partitions_processed, vec!["ohio", "new york"]);
        assert_eq!(report.extracts_written, 5);
        // roads everywhere, plus polygon pois for new york
        assert_eq!(report.missing_layers, 5);

        let diner = read_records(&extracts.join("food/restaurant/diner/diner_ohio_pois_1_point.csv")).unwrap();
        assert_eq!(diner.len(), 1);
        assert_eq!(diner[0].tag, "diner");
        assert_eq!(diner[0].geometry, Geometry::Point(point!(x: -82.9, y: 40.0)));

        let synonym = read_records(&diner_ny(&extracts)).unwrap();
        assert_eq!(synonym[0].tag, "eatery");
        assert_eq!(synonym[0].partition, "new york");

        // the multi-tag record lands in both leaves
        let restaurant =
            read_records(&extracts.join("food/restaurant/restaurant/restaurant_ohio_pois_1_point.csv")).unwrap();
        let bar = read_records(&extracts.join("food/bar/bar/bar_ohio_pois_1_point.csv")).unwrap();
        assert_eq!(restaurant[0].tag, "restaurants;bar");
        assert_eq!(bar[0].tag, "restaurants;bar");

        let park = read_records(&extracts.join("leisure/park/park/park_ohio_pois_1_polygon.csv")).unwrap();
        assert_eq!(park[0].category, Category::Polygon);

        let coverage = report.coverage.unwrap();
        let pois = coverage.layer("pois").unwrap();
        assert_eq!(pois.total, 5);
        assert_eq!(pois.labeled, 5);
        assert_eq!(pois.included, 5);
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let (_dir, raw, extracts) = raw_fixture();
        let tree = hierarchy();
        let config = config(&["ohio", "new york"]);
        let builder = DatabaseBuilder::new(&config, &tree);

        builder.build(&raw, &extracts).unwrap();
        let before = file_checksum(&diner_ny(&extracts)).unwrap();

        let report = builder.build(&raw, &extracts).unwrap();
        assert!(report.partitions_processed.is_empty());
        assert_eq!(report.partitions_skipped.len(), 2);
        assert_eq!(report.extracts_written, 0);
        assert!(report.coverage.is_none());
        assert_eq!(file_checksum(&diner_ny(&extracts)).unwrap(), before);
    }

    #[test]
    fn test_resume_after_completed_partition() {
        let (_dir, raw, extracts) = raw_fixture();
        let tree = hierarchy();

        DatabaseBuilder::new(&config(&["ohio"]), &tree)
            .build(&raw, &extracts)
            .unwrap();
        assert!(!diner_ny(&extracts).exists());

        let report = DatabaseBuilder::new(&config(&["ohio", "new york"]), &tree)
            .build(&raw, &extracts)
            .unwrap();
        assert_eq!(report.partitions_skipped, vec!["ohio"]);
        assert_eq!(report.partitions_processed, vec!["new york"]);
        assert!(report.coverage.is_none());
        assert!(diner_ny(&extracts).exists());
    }

    #[test]
    fn test_interrupted_partition_rewrites_damaged_extract() {
        let (_dir, raw, extracts) = raw_fixture();
        let tree = hierarchy();
        let config = config(&["ohio", "new york"]);
        let builder = DatabaseBuilder::new(&config, &tree);
        builder.build(&raw, &extracts).unwrap();

        // new york never finished, and its extract was cut short
        let mut manifest = Manifest::load(&extracts).unwrap().unwrap();
        manifest.partitions.remove("new york");
        manifest.save().unwrap();
        fs::write(diner_ny(&extracts), "geometry,tag\n").unwrap();

        let report = builder.build(&raw, &extracts).unwrap();
        assert_eq!(report.partitions_processed, vec!["new york"]);
        assert_eq!(report.extracts_written, 1);
        assert_eq!(read_records(&diner_ny(&extracts)).unwrap().len(), 1);
    }

    #[test]
    fn test_interrupted_partition_keeps_valid_extracts() {
        let (_dir, raw, extracts) = raw_fixture();
        let tree = hierarchy();
        let config = config(&["ohio", "new york"]);
        let builder = DatabaseBuilder::new(&config, &tree);
        builder.build(&raw, &extracts).unwrap();

        let mut manifest = Manifest::load(&extracts).unwrap().unwrap();
        manifest.partitions.remove("new york");
        manifest.save().unwrap();

        let report = builder.build(&raw, &extracts).unwrap();
        assert_eq!(report.extracts_written, 0);
        assert_eq!(report.extracts_kept, 1);
    }

    #[test]
    fn test_legacy_tree_resumes_at_furthest_partition() {
        let (_dir, raw, extracts) = raw_fixture();
        let tree = hierarchy();
        let partitions = ["ohio", "new york"];
        let config = config(&partitions);
        let builder = DatabaseBuilder::new(&config, &tree);
        builder.build(&raw, &extracts).unwrap();

        fs::remove_file(Manifest::path_for(&extracts)).unwrap();
        let names: Vec<String> = partitions.iter().map(|s| s.to_string()).collect();
        assert_eq!(infer_legacy_resume(&extracts, &names), 1);

        let report = builder.build(&raw, &extracts).unwrap();
        assert_eq!(report.partitions_skipped, vec!["ohio"]);
        assert_eq!(report.partitions_processed, vec!["new york"]);
    }

    #[test]
    fn test_legacy_inference_on_empty_tree() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(infer_legacy_resume(dir.path(), &["ohio".to_string()]), 0);
    }

    #[test]
    fn test_missing_partition_and_tag_column_are_skipped() {
        let (_dir, raw, extracts) = raw_fixture();
        fs::create_dir_all(raw.join("utah")).unwrap();
        fs::write(
            raw.join("utah/gis_osm_pois_free_1.csv"),
            "osm_id,geometry,name\n1,POINT(0 0),x\n",
        )
        .unwrap();
        let tree = hierarchy();
        let config = config(&["utah", "vermont"]);

        let report = DatabaseBuilder::new(&config, &tree).build(&raw, &extracts).unwrap();
        assert_eq!(report.partitions_processed, vec!["utah", "vermont"]);
        assert_eq!(report.extracts_written, 0);
        assert_eq!(report.missing_layers, 7);
    }

    #[test]
    fn test_match_leaf() {
        let record = |tag: &str| TaggedGeometry {
            geometry: point!(x: 0.0, y: 0.0).into(),
            tag: tag.to_string(),
        };
        let records = vec![
            record("diner"),
            record("diner_car"),
            record("eatery;diner"),
            record("cafe"),
        ];
        let leaf = LabelLeaf {
            name: "diner".to_string(),
            synonyms: vec!["eatery".to_string()],
        };

        let tags: Vec<&str> = match_leaf(&records, &leaf).iter().map(|r| r.tag.as_str()).collect();
        assert_eq!(tags, vec!["diner", "eatery;diner"]);
    }

    #[test]
    fn test_extract_file_name() {
        let file = RawLayerFile {
            path: PathBuf::from("gis_osm_pois_a_free_1.csv"),
            layer: "pois".to_string(),
            category: Category::Polygon,
            number: "1".to_string(),
        };
        assert_eq!(
            extract_file_name("park", "new york", &file),
            "park_new-york_pois_1_polygon.csv"
        );
    }
}
