//! Database construction: raw partition layers to per-leaf extracts to
//! combined datasets.

pub mod builder;
pub mod consolidate;
pub mod coverage;
pub mod pipeline;
pub mod raw;

pub use builder::{BuildReport, DatabaseBuilder};
pub use consolidate::{ConsolidationReport, Consolidator};
pub use coverage::{CoverageReport, LayerCoverage};
pub use pipeline::{build, build_with_config, DatabaseLayout, PipelineReport};
