//! Reading and writing POI record files.

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;
use xxhash_rust::xxh64::xxh64;

use crate::error::{Error, Result};
use crate::models::PoiRecord;

/// Write records to `path` as CSV and return the content checksum.
///
/// The content goes to a temporary file in the destination directory first
/// and is renamed into place once fully written, so a reader never observes
/// a partial file under the final name.
pub fn write_records(path: &Path, records: &[PoiRecord]) -> Result<u64> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        writer.serialize(record)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| Error::io(path, e.into_error()))?;

    write_atomic(path, &bytes)?;
    debug!("Wrote {} records to {}", records.len(), path.display());
    Ok(checksum(&bytes))
}

/// Read all records from a CSV record file
pub fn read_records(path: &Path) -> Result<Vec<PoiRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for row in reader.deserialize() {
        records.push(row?);
    }
    Ok(records)
}

/// Write bytes to a temporary sibling file, then rename it over `path`
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    ensure_dir(parent)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| Error::io(parent, e))?;
    tmp.write_all(bytes).map_err(|e| Error::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| Error::io(tmp.path(), e))?;
    tmp.persist(path)?;
    Ok(())
}

pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))
}

pub fn checksum(bytes: &[u8]) -> u64 {
    xxh64(bytes, 0)
}

/// Checksum of a file on disk
pub fn file_checksum(path: &Path) -> Result<u64> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    Ok(checksum(&bytes))
}
