//! Semantic annotation queries over the combined datasets.
//!
//! Three operations are offered:
//! - `annotate_single_point`: distance from one location to the nearest
//!   record of every leaf, and the overall nearest label.
//! - `annotate_single_shape`: labels of point records contained in, and
//!   polygon records intersecting, a query polygon.
//! - `annotate_batch_points`: nearest label for every row of a table,
//!   loading each dataset once for the whole batch.

use geo::{BoundingRect, Contains, Intersects};
use geo_types::{Coord, Geometry, LineString, Polygon};
use serde::{Deserialize, Serialize, Serializer};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::catalog::Catalog;
use super::projection::PlanarProjection;
use super::table::PointTable;
use crate::build::DatabaseLayout;
use crate::config::AnnotateConfig;
use crate::error::{Error, Result};
use crate::models::GeometryKind;

pub const MATCHED_LABEL_COLUMN: &str = "matched_label";
pub const MIN_DISTANCE_COLUMN: &str = "min_distance";

const MIN_SHAPE_VERTICES: usize = 3;

/// What an empty coordinate list or table does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyQueryPolicy {
    /// Return no result without an error
    #[default]
    Ignore,
    /// Fail with `Error::EmptyQuery`
    Reject,
}

/// Result of a single point query
#[derive(Debug, Clone, Serialize)]
pub struct PointAnnotation {
    pub matched_label: String,
    /// Planar distance in metres
    pub min_distance: f64,
    /// Distance per dataset label in catalog traversal order, written out as
    /// a JSON object
    #[serde(serialize_with = "serialize_ordered_map")]
    pub distances_by_label: Vec<(String, f64)>,
}

impl PointAnnotation {
    pub fn distance_to(&self, label: &str) -> Option<f64> {
        self.distances_by_label
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, d)| *d)
    }
}

fn serialize_ordered_map<S: Serializer>(entries: &[(String, f64)], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_map(entries.iter().map(|(label, distance)| (label, distance)))
}

/// Result of a single shape query
#[derive(Debug, Clone, Serialize)]
pub struct ShapeAnnotation {
    /// Point labels, then polygon labels not already present
    pub matched_labels: Vec<String>,
    pub point_labels: Vec<String>,
    pub poly_labels: Vec<String>,
    /// First matching geometry of every matched leaf, in match order
    #[serde(serialize_with = "serialize_wkt_list")]
    pub matched_geometries: Vec<Geometry<f64>>,
}

fn serialize_wkt_list<S: Serializer>(geometries: &[Geometry<f64>], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    use wkt::ToWkt;
    serializer.collect_seq(geometries.iter().map(|g| g.wkt_string()))
}

/// Query engine over one combined dataset tree
pub struct AnnotationEngine {
    root: PathBuf,
    catalog: Catalog,
    projection: PlanarProjection,
    empty_query: EmptyQueryPolicy,
}

impl AnnotationEngine {
    /// Open the combined datasets of a database root with default settings
    pub fn open<P: AsRef<Path>>(database_root: P) -> Result<Self> {
        Self::with_config(database_root, &AnnotateConfig::default())
    }

    pub fn with_config<P: AsRef<Path>>(database_root: P, config: &AnnotateConfig) -> Result<Self> {
        let layout = DatabaseLayout::new(database_root.as_ref());
        let catalog = Catalog::scan(&layout.combined_dir)?;
        info!(
            "Annotation engine ready: {} leaves, {} datasets",
            catalog.len(),
            catalog.dataset_count()
        );
        Ok(Self {
            root: layout.combined_dir,
            catalog,
            projection: config.projection,
            empty_query: config.empty_query,
        })
    }

    /// Engine over an already assembled catalog
    pub fn from_catalog(catalog: Catalog, config: &AnnotateConfig) -> Self {
        Self {
            root: PathBuf::new(),
            catalog,
            projection: config.projection,
            empty_query: config.empty_query,
        }
    }

    pub fn combined_root(&self) -> &Path {
        &self.root
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Nearest label for one location.
    ///
    /// Computes one nearest-neighbour distance per point dataset and per
    /// polygon dataset (against polygon centroids).
    pub fn annotate_single_point(&self, lat: f64, lon: f64) -> Result<PointAnnotation> {
        let query = self.project_query(lat, lon)?;

        let mut distances: Vec<(String, f64)> = Vec::new();
        for entry in self.catalog.entries() {
            for handle in entry.handles() {
                let dataset = handle.load(&self.projection)?;
                if let Some(distance) = dataset.nearest_distance(query) {
                    distances.push((entry.leaf.label(handle.kind), distance));
                }
            }
        }

        let (idx, min_distance) =
            select_minimum(distances.iter().map(|(_, d)| *d)).ok_or(Error::NoMatchFound)?;
        let matched_label = distances[idx].0.clone();
        debug!(
            "Point ({}, {}) matched {} at {:.1}m",
            lat, lon, matched_label, min_distance
        );

        Ok(PointAnnotation {
            matched_label,
            min_distance,
            distances_by_label: distances,
        })
    }

    /// Labels inside or overlapping a query polygon given as parallel
    /// latitude and longitude lists.
    ///
    /// At most one match per leaf and geometry kind is reported: the first
    /// record in file order. A shape needs at least three vertices.
    pub fn annotate_single_shape(&self, lat_list: &[f64], lon_list: &[f64]) -> Result<Option<ShapeAnnotation>> {
        if lat_list.is_empty() || lon_list.is_empty() {
            return self.empty_input();
        }
        if lat_list.len() != lon_list.len() {
            warn!(
                "Shape has {} latitudes but {} longitudes; extra values are ignored",
                lat_list.len(),
                lon_list.len()
            );
        }
        let vertices = lat_list.len().min(lon_list.len());
        if vertices < MIN_SHAPE_VERTICES {
            return Err(Error::InvalidQuery(format!(
                "a shape needs at least {} vertices, got {}",
                MIN_SHAPE_VERTICES, vertices
            )));
        }
        for (lat, lon) in lat_list.iter().zip(lon_list) {
            validate_coordinate(*lat, *lon)?;
        }

        let shape = query_polygon(lat_list, lon_list);
        let Some(envelope) = shape.bounding_rect() else {
            return self.empty_input();
        };

        let mut point_labels = Vec::new();
        let mut poly_labels = Vec::new();
        let mut matched_geometries = Vec::new();

        for entry in self.catalog.entries() {
            if let Some(handle) = &entry.point {
                let dataset = handle.load(&self.projection)?;
                if let Some(geometry) = dataset.find_first(&envelope, |g| shape.contains(g)) {
                    point_labels.push(entry.leaf.label(GeometryKind::Point));
                    matched_geometries.push(geometry.clone());
                }
            }
            if let Some(handle) = &entry.polygon {
                let dataset = handle.load(&self.projection)?;
                if let Some(geometry) = dataset.find_first(&envelope, |g| shape.intersects(g)) {
                    poly_labels.push(entry.leaf.label(GeometryKind::Polygon));
                    matched_geometries.push(geometry.clone());
                }
            }
        }

        let mut matched_labels = point_labels.clone();
        for label in &poly_labels {
            if !matched_labels.contains(label) {
                matched_labels.push(label.clone());
            }
        }
        debug!("Shape matched {} labels", matched_labels.len());

        Ok(Some(ShapeAnnotation {
            matched_labels,
            point_labels,
            poly_labels,
            matched_geometries,
        }))
    }

    /// Nearest label for every row of `table`, appended as the
    /// `matched_label` and `min_distance` columns.
    pub fn annotate_batch_points(&self, mut table: PointTable, lat_col: &str, lon_col: &str) -> Result<Option<PointTable>> {
        if table.is_empty() {
            return self.empty_input();
        }

        let lats = table.float_column(lat_col)?;
        let lons = table.float_column(lon_col)?;
        let queries: Vec<[f64; 2]> = lats
            .iter()
            .zip(&lons)
            .enumerate()
            .map(|(row, (lat, lon))| {
                self.project_query(*lat, *lon)
                    .map_err(|e| Error::InvalidQuery(format!("row {}: {}", row + 1, e)))
            })
            .collect::<Result<_>>()?;

        let mut columns: Vec<(String, Vec<f64>)> = Vec::new();
        for entry in self.catalog.entries() {
            for handle in entry.handles() {
                let dataset = handle.load(&self.projection)?;
                if dataset.is_empty() {
                    continue;
                }
                let column = queries
                    .iter()
                    .map(|q| dataset.nearest_distance(*q).unwrap_or(f64::INFINITY))
                    .collect();
                columns.push((entry.leaf.label(handle.kind), column));
            }
        }
        if columns.is_empty() {
            return Err(Error::NoMatchFound);
        }
        info!(
            "Annotated {} points against {} datasets",
            queries.len(),
            columns.len()
        );

        let mut labels = Vec::with_capacity(queries.len());
        let mut distances = Vec::with_capacity(queries.len());
        for row in 0..queries.len() {
            match select_minimum(columns.iter().map(|(_, values)| values[row])) {
                Some((col, distance)) => {
                    labels.push(columns[col].0.clone());
                    distances.push(distance.to_string());
                }
                None => {
                    labels.push(String::new());
                    distances.push(String::new());
                }
            }
        }

        table.push_column(MATCHED_LABEL_COLUMN, labels);
        table.push_column(MIN_DISTANCE_COLUMN, distances);
        Ok(Some(table))
    }

    /// Planar position of a query location
    fn project_query(&self, lat: f64, lon: f64) -> Result<[f64; 2]> {
        validate_coordinate(lat, lon)?;
        self.projection.try_project(lon, lat).ok_or_else(|| {
            Error::InvalidQuery(format!(
                "({}, {}) has no position in the planar projection",
                lat, lon
            ))
        })
    }

    fn empty_input<T>(&self) -> Result<Option<T>> {
        match self.empty_query {
            EmptyQueryPolicy::Ignore => {
                debug!("Empty query input ignored");
                Ok(None)
            }
            EmptyQueryPolicy::Reject => Err(Error::EmptyQuery),
        }
    }
}

/// Finite latitude within ±90 and longitude within ±180
pub fn validate_coordinate(lat: f64, lon: f64) -> Result<()> {
    if lat.is_finite() && lon.is_finite() && lat.abs() <= 90.0 && lon.abs() <= 180.0 {
        Ok(())
    } else {
        Err(Error::InvalidQuery(format!(
            "coordinate ({}, {}) is out of range",
            lat, lon
        )))
    }
}

/// Simple polygon over the `(lon, lat)` vertices in the given order
pub fn query_polygon(lat_list: &[f64], lon_list: &[f64]) -> Polygon<f64> {
    let ring: Vec<Coord<f64>> = lon_list
        .iter()
        .zip(lat_list)
        .map(|(lon, lat)| Coord { x: *lon, y: *lat })
        .collect();
    Polygon::new(LineString::new(ring), vec![])
}

/// Index and value of the smallest distance; the first one wins on ties.
/// NaN never wins over a number.
pub fn select_minimum<I>(distances: I) -> Option<(usize, f64)>
where
    I: IntoIterator<Item = f64>,
{
    let mut best: Option<(usize, f64)> = None;
    for (idx, distance) in distances.into_iter().enumerate() {
        match best {
            Some((_, current)) if !(distance < current || (current.is_nan() && !distance.is_nan())) => {}
            _ => best = Some((idx, distance)),
        }
    }
    best
}
