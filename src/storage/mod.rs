//! On-disk storage: record files and the build manifest.

pub mod dataset;
pub mod manifest;

pub use dataset::{read_records, write_records};
pub use manifest::{ExtractEntry, Manifest};
