//! Core data models for the landmark database.

pub mod label;
pub mod record;

pub use label::{LabelHierarchy, LabelLeaf, LeafPath, Level1Node, Level2Node};
pub use record::{parse_wkt, Category, GeometryKind, PoiRecord};
