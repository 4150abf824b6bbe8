//! Semantic annotation of coordinates against the combined datasets.

pub mod catalog;
pub mod engine;
pub mod projection;
pub mod table;

pub use catalog::{Catalog, CatalogEntry, DatasetHandle, LoadedDataset};
pub use engine::{
    query_polygon, select_minimum, AnnotationEngine, EmptyQueryPolicy, PointAnnotation, ShapeAnnotation,
    MATCHED_LABEL_COLUMN, MIN_DISTANCE_COLUMN,
};
pub use projection::{planar_distance, PlanarProjection};
pub use table::PointTable;
