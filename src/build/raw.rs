//! Raw partition layer files: discovery, tag column selection and reading.

use csv::StringRecord;
use geo_types::Geometry;
use hashbrown::HashSet;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::hierarchy::normalize_label;
use crate::models::{parse_wkt, Category};

const GEOMETRY_COLUMN: &str = "geometry";

/// One raw layer file of a partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLayerFile {
    pub path: PathBuf,
    pub layer: String,
    pub category: Category,
    /// File number taken from the name, e.g. `1` in `gis_osm_pois_free_1.csv`
    pub number: String,
}

/// Find the raw files of one layer and category in a partition directory,
/// sorted by file name.
pub fn discover_layer_files(partition_dir: &Path, layer: &str, category: Category) -> Result<Vec<RawLayerFile>> {
    if !partition_dir.is_dir() {
        return Ok(Vec::new());
    }

    let pattern = format!(
        r"^gis_osm_{}{}(\d+)\.csv$",
        regex::escape(layer),
        regex::escape(category.raw_infix())
    );
    let re = Regex::new(&pattern)?;

    let mut files = Vec::new();
    for entry in fs::read_dir(partition_dir).map_err(|e| Error::io(partition_dir, e))? {
        let entry = entry.map_err(|e| Error::io(partition_dir, e))?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if let Some(caps) = re.captures(&file_name) {
            files.push(RawLayerFile {
                path: entry.path(),
                layer: layer.to_string(),
                category,
                number: caps[1].to_string(),
            });
        }
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

/// A tagged record from a raw layer file
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedGeometry {
    pub geometry: Geometry<f64>,
    /// Normalized tag string
    pub tag: String,
}

/// Contents of one raw layer file after tag cleaning
#[derive(Debug, Default)]
pub struct RawLayer {
    pub tag_column: String,
    /// Tagged records with a valid geometry, in file order
    pub records: Vec<TaggedGeometry>,
    /// All rows in the file
    pub total: usize,
    /// Rows with a non-empty tag
    pub labeled: usize,
    /// Tagged rows dropped for an unparsable geometry
    pub malformed: usize,
}

/// Pick the tag column among `candidates` present in `headers`.
///
/// With several present, the one with most distinct non-empty values wins;
/// on equal counts the later candidate wins and the tie is logged.
pub fn select_tag_column(
    path: &Path,
    headers: &StringRecord,
    rows: &[StringRecord],
    candidates: &[String],
) -> Result<usize> {
    let mut best: Option<(usize, usize)> = None;
    let mut tied = false;

    for candidate in candidates {
        let Some(idx) = headers.iter().position(|h| h == candidate) else {
            continue;
        };
        let distinct = rows
            .iter()
            .filter_map(|row| row.get(idx))
            .filter(|v| !v.trim().is_empty())
            .collect::<HashSet<&str>>()
            .len();

        match best {
            Some((_, count)) if distinct < count => {}
            Some((_, count)) => {
                tied = distinct == count;
                best = Some((idx, distinct));
            }
            None => best = Some((idx, distinct)),
        }
    }

    let (idx, _) = best.ok_or_else(|| Error::MissingTagColumn {
        path: path.to_path_buf(),
    })?;
    if tied {
        warn!(
            "{}; using column '{}'",
            Error::AmbiguousTagColumn {
                path: path.to_path_buf()
            },
            &headers[idx]
        );
    }
    Ok(idx)
}

/// Read a raw layer file, keeping tagged records with normalized tags
pub fn read_layer(path: &Path, tag_columns: &[String]) -> Result<RawLayer> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    let geometry_idx = headers
        .iter()
        .position(|h| h == GEOMETRY_COLUMN)
        .ok_or_else(|| Error::Geometry {
            path: path.to_path_buf(),
            reason: "no geometry column".to_string(),
        })?;

    let rows = reader.records().collect::<std::result::Result<Vec<_>, _>>()?;
    let tag_idx = select_tag_column(path, &headers, &rows, tag_columns)?;

    let mut layer = RawLayer {
        tag_column: headers[tag_idx].to_string(),
        total: rows.len(),
        ..Default::default()
    };

    for row in &rows {
        let raw_tag = row.get(tag_idx).unwrap_or("").trim();
        if raw_tag.is_empty() {
            continue;
        }
        layer.labeled += 1;

        match parse_wkt(row.get(geometry_idx).unwrap_or("")) {
            Ok(geometry) => layer.records.push(TaggedGeometry {
                geometry,
                tag: normalize_label(raw_tag),
            }),
            Err(reason) => {
                debug!("Dropping record in {}: {}", path.display(), reason);
                layer.malformed += 1;
            }
        }
    }

    if layer.malformed > 0 {
        warn!(
            "{} malformed geometries dropped from {}",
            layer.malformed,
            path.display()
        );
    }
    Ok(layer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(cols: &[&str]) -> StringRecord {
        StringRecord::from(cols.to_vec())
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_discover_layer_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "gis_osm_pois_free_1.csv",
            "gis_osm_pois_free_2.csv",
            "gis_osm_pois_a_free_1.csv",
            "gis_osm_pois_free_1.txt",
            "gis_osm_pofw_free_1.csv",
        ] {
            fs::write(dir.path().join(name), "geometry,fclass\n").unwrap();
        }

        let points = discover_layer_files(dir.path(), "pois", Category::Point).unwrap();
        let numbers: Vec<&str> = points.iter().map(|f| f.number.as_str()).collect();
        assert_eq!(numbers, vec!["1", "2"]);

        let polygons = discover_layer_files(dir.path(), "pois", Category::Polygon).unwrap();
        assert_eq!(polygons.len(), 1);
        assert_eq!(polygons[0].category, Category::Polygon);

        assert!(discover_layer_files(&dir.path().join("absent"), "pois", Category::Point)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_select_tag_column_by_cardinality() {
        let headers = header(&["geometry", "fclass", "type"]);
        let rows = vec![
            header(&["", "cafe", "a"]),
            header(&["", "bar", "a"]),
            header(&["", "pub", "b"]),
        ];
        let candidates = strings(&["fclass", "type"]);
        assert_eq!(select_tag_column(Path::new("x"), &headers, &rows, &candidates).unwrap(), 1);
    }

    #[test]
    fn test_select_tag_column_tie_prefers_type() {
        let headers = header(&["geometry", "fclass", "type"]);
        let rows = vec![header(&["", "cafe", "a"]), header(&["", "bar", "b"])];
        let candidates = strings(&["fclass", "type"]);
        assert_eq!(select_tag_column(Path::new("x"), &headers, &rows, &candidates).unwrap(), 2);
    }

    #[test]
    fn test_select_tag_column_single_or_missing() {
        let candidates = strings(&["fclass", "type"]);
        let only_type = header(&["geometry", "type"]);
        assert_eq!(select_tag_column(Path::new("x"), &only_type, &[], &candidates).unwrap(), 1);

        let neither = header(&["geometry", "name"]);
        assert!(matches!(
            select_tag_column(Path::new("x"), &neither, &[], &candidates),
            Err(Error::MissingTagColumn { .. })
        ));
    }

    #[test]
    fn test_read_layer_cleans_tags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gis_osm_pois_free_1.csv");
        fs::write(
            &path,
            "osm_id,geometry,fclass\n\
             1,POINT(1 2),Fast Foods\n\
             2,POINT(3 4),\n\
             3,NOT WKT,cafe\n\
             4,POINT(5 6),Restaurants;Bars\n",
        )
        .unwrap();

        let layer = read_layer(&path, &strings(&["fclass", "type"])).unwrap();
        assert_eq!(layer.tag_column, "fclass");
        assert_eq!(layer.total, 4);
        assert_eq!(layer.labeled, 3);
        assert_eq!(layer.malformed, 1);

        let tags: Vec<&str> = layer.records.iter().map(|r| r.tag.as_str()).collect();
        assert_eq!(tags, vec!["fast_food", "restaurants;bar"]);
    }
}
