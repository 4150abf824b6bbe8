//! Catalog of combined datasets with lazily built nearest-neighbour indexes.

use geo::{BoundingRect, Centroid};
use geo_types::{Geometry, Rect};
use rstar::RTree;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::projection::{planar_distance, PlanarProjection};
use crate::error::{Error, Result};
use crate::models::{GeometryKind, LeafPath};
use crate::storage::read_records;

/// A combined dataset loaded into memory
pub struct LoadedDataset {
    /// Geometries in file order, unprojected
    pub geometries: Vec<Geometry<f64>>,
    bounds: Vec<Option<Rect<f64>>>,
    /// Projected representative points: the point itself or the centroid
    tree: RTree<[f64; 2]>,
}

impl LoadedDataset {
    pub fn from_geometries(geometries: Vec<Geometry<f64>>, projection: &PlanarProjection) -> Self {
        let mut representatives: Vec<[f64; 2]> = geometries
            .iter()
            .filter_map(|g| projection.project_geometry(g).centroid())
            .map(|p| [p.x(), p.y()])
            .collect();
        let before = representatives.len();
        representatives.retain(|p| p[0].is_finite() && p[1].is_finite());
        if representatives.len() < before {
            warn!(
                "{} records without a finite projected position left out of the index",
                before - representatives.len()
            );
        }
        let bounds = geometries.iter().map(|g| g.bounding_rect()).collect();

        Self {
            geometries,
            bounds,
            tree: RTree::bulk_load(representatives),
        }
    }

    /// Planar distance from a projected query point to the nearest record
    pub fn nearest_distance(&self, query: [f64; 2]) -> Option<f64> {
        self.tree
            .nearest_neighbor(&query)
            .map(|nearest| planar_distance(query, *nearest))
    }

    /// First geometry in file order satisfying `predicate`, skipping records
    /// whose bounding box misses `envelope`
    pub fn find_first<F>(&self, envelope: &Rect<f64>, predicate: F) -> Option<&Geometry<f64>>
    where
        F: Fn(&Geometry<f64>) -> bool,
    {
        self.geometries
            .iter()
            .zip(&self.bounds)
            .filter(|(_, bounds)| bounds.map_or(false, |b| rects_intersect(&b, envelope)))
            .map(|(geometry, _)| geometry)
            .find(|geometry| predicate(geometry))
    }

    pub fn len(&self) -> usize {
        self.geometries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }
}

fn rects_intersect(a: &Rect<f64>, b: &Rect<f64>) -> bool {
    a.min().x <= b.max().x && a.max().x >= b.min().x && a.min().y <= b.max().y && a.max().y >= b.min().y
}

/// Handle to one combined dataset file, loaded on first use
pub struct DatasetHandle {
    pub path: PathBuf,
    pub kind: GeometryKind,
    loaded: OnceLock<LoadedDataset>,
}

impl DatasetHandle {
    pub fn new(path: PathBuf, kind: GeometryKind) -> Self {
        Self {
            path,
            kind,
            loaded: OnceLock::new(),
        }
    }

    /// Handle with already loaded content
    pub fn preloaded(kind: GeometryKind, dataset: LoadedDataset) -> Self {
        let loaded = OnceLock::new();
        let _ = loaded.set(dataset);
        Self {
            path: PathBuf::new(),
            kind,
            loaded,
        }
    }

    pub fn load(&self, projection: &PlanarProjection) -> Result<&LoadedDataset> {
        if let Some(dataset) = self.loaded.get() {
            return Ok(dataset);
        }
        let geometries = read_records(&self.path)?
            .into_iter()
            .map(|r| r.geometry)
            .collect();
        let dataset = LoadedDataset::from_geometries(geometries, projection);
        debug!("Loaded {} records from {}", dataset.len(), self.path.display());
        Ok(self.loaded.get_or_init(|| dataset))
    }
}

/// Datasets available for one leaf
pub struct CatalogEntry {
    pub leaf: LeafPath,
    pub point: Option<DatasetHandle>,
    pub polygon: Option<DatasetHandle>,
}

impl CatalogEntry {
    fn new(leaf: LeafPath) -> Self {
        Self {
            leaf,
            point: None,
            polygon: None,
        }
    }

    /// Point then polygon handle, whichever exist
    pub fn handles(&self) -> impl Iterator<Item = &DatasetHandle> {
        self.point.iter().chain(self.polygon.iter())
    }
}

/// All leaves of a combined tree, in traversal order
#[derive(Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Walk `root/level1/level2/level3/` once and register every point and
    /// polygon dataset. Traversal is sorted by name so it is deterministic.
    pub fn scan(root: &Path) -> Result<Self> {
        let mut entries: Vec<CatalogEntry> = Vec::new();
        if !root.exists() {
            info!("Combined dataset root {} does not exist", root.display());
            return Ok(Self { entries });
        }

        for entry in WalkDir::new(root)
            .min_depth(4)
            .max_depth(4)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root).to_path_buf();
                Error::io(path, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let Some(leaf) = leaf_of(root, path) else {
                continue;
            };
            let file_name = entry.file_name().to_string_lossy();
            let kind = if file_name == GeometryKind::Point.combined_file_name(&leaf.level3) {
                GeometryKind::Point
            } else if file_name == GeometryKind::Polygon.combined_file_name(&leaf.level3) {
                GeometryKind::Polygon
            } else {
                continue;
            };

            if entries.last().map_or(true, |e| e.leaf != leaf) {
                entries.push(CatalogEntry::new(leaf));
            }
            if let Some(current) = entries.last_mut() {
                let handle = Some(DatasetHandle::new(path.to_path_buf(), kind));
                match kind {
                    GeometryKind::Point => current.point = handle,
                    _ => current.polygon = handle,
                }
            }
        }

        info!("Catalog built with {} leaves", entries.len());
        Ok(Self { entries })
    }

    pub fn from_entries(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of datasets across all leaves
    pub fn dataset_count(&self) -> usize {
        self.entries.iter().map(|e| e.handles().count()).sum()
    }
}

fn leaf_of(root: &Path, path: &Path) -> Option<LeafPath> {
    let relative = path.strip_prefix(root).ok()?;
    let mut parts = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned());
    Some(LeafPath::new(parts.next()?, parts.next()?, parts.next()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, PoiRecord};
    use crate::storage::write_records;
    use geo_types::{point, polygon};

    fn record(geometry: Geometry<f64>) -> PoiRecord {
        PoiRecord {
            geometry,
            tag: "x".to_string(),
            partition: "ohio".to_string(),
            layer: "pois".to_string(),
            category: Category::Point,
        }
    }

    #[test]
    fn test_scan_groups_datasets_by_leaf() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let p: Geometry<f64> = point!(x: -100.0, y: 45.0).into();
        write_records(&root.join("food/restaurant/diner/diner_point.csv"), &[record(p.clone())]).unwrap();
        write_records(&root.join("food/restaurant/diner/diner_polygon.csv"), &[record(p.clone())]).unwrap();
        write_records(&root.join("food/restaurant/diner/diner_line.csv"), &[record(p.clone())]).unwrap();
        write_records(&root.join("amenity/civic/library/library_polygon.csv"), &[record(p)]).unwrap();

        let catalog = Catalog::scan(root).unwrap();
        let leaves: Vec<String> = catalog.entries().iter().map(|e| e.leaf.to_string()).collect();
        assert_eq!(leaves, vec!["amenity;civic;library", "food;restaurant;diner"]);
        assert!(catalog.entries()[0].point.is_none());
        assert!(catalog.entries()[0].polygon.is_some());
        assert_eq!(catalog.dataset_count(), 3);
    }

    #[test]
    fn test_scan_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::scan(&dir.path().join("nope")).unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_nearest_distance_uses_polygon_centroid() {
        let projection = PlanarProjection::default();
        let square: Geometry<f64> = polygon![
            (x: -99.01, y: 44.99),
            (x: -98.99, y: 44.99),
            (x: -98.99, y: 45.01),
            (x: -99.01, y: 45.01),
        ]
        .into();
        let dataset = LoadedDataset::from_geometries(vec![square], &projection);

        let query = projection.project(-99.0, 45.0);
        let d = dataset.nearest_distance(query).unwrap();
        assert!(d < 50.0, "distance {}", d);
    }

    #[test]
    fn test_unprojectable_records_are_not_indexed() {
        let projection = PlanarProjection::default();
        let geometries: Vec<Geometry<f64>> = vec![
            point!(x: 80.0, y: -45.0).into(),
            point!(x: f64::NAN, y: 45.0).into(),
            point!(x: -100.0, y: 45.01).into(),
        ];
        let dataset = LoadedDataset::from_geometries(geometries, &projection);
        assert_eq!(dataset.len(), 3);

        let d = dataset.nearest_distance(projection.project(-100.0, 45.0)).unwrap();
        assert!((d - 1_112.0).abs() < 10.0, "distance {}", d);
    }

    #[test]
    fn test_nearest_distance_empty_dataset() {
        let dataset = LoadedDataset::from_geometries(vec![], &PlanarProjection::default());
        assert!(dataset.nearest_distance([0.0, 0.0]).is_none());
        assert!(dataset.is_empty());
    }

    #[test]
    fn test_handle_loads_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diner_point.csv");
        write_records(&path, &[record(point!(x: -100.0, y: 45.0).into())]).unwrap();

        let handle = DatasetHandle::new(path.clone(), GeometryKind::Point);
        let projection = PlanarProjection::default();
        assert_eq!(handle.load(&projection).unwrap().len(), 1);

        std::fs::remove_file(&path).unwrap();
        assert_eq!(handle.load(&projection).unwrap().len(), 1);
    }
}
