//! Landmarks - a hierarchical POI database built from regional OSM extracts
//!
//! This library provides the database build pipeline and the semantic
//! annotation queries used by the `landmarks` binary.

pub mod annotate;
pub mod build;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod models;
pub mod storage;

pub use annotate::{AnnotationEngine, EmptyQueryPolicy, PointAnnotation, PointTable, ShapeAnnotation};
pub use build::{build, build_with_config, DatabaseLayout};
pub use config::Config;
pub use error::{Error, Result};
pub use models::{LabelHierarchy, LeafPath, PoiRecord};
