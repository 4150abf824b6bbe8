//! Error types shared by the build pipeline and the annotation engine.

use std::path::PathBuf;

use thiserror::Error;

use crate::models::Category;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The label table violates the three-level nesting rules. Fatal for a build.
    #[error("malformed label hierarchy at row {row}: {reason}")]
    MalformedHierarchy { row: usize, reason: String },

    /// No raw layer file exists for this partition/layer/category.
    #[error("no raw data for partition '{partition}', layer '{layer}' ({category})")]
    MissingPartitionData {
        partition: String,
        layer: String,
        category: Category,
    },

    /// Both tag columns exist with the same number of distinct values.
    #[error("ambiguous tag column in {}", path.display())]
    AmbiguousTagColumn { path: PathBuf },

    /// Neither tag column candidate exists in a raw layer file.
    #[error("no tag column found in {}", path.display())]
    MissingTagColumn { path: PathBuf },

    #[error("query input is empty")]
    EmptyQuery,

    #[error("no dataset available to match against")]
    NoMatchFound,

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("bad geometry in {}: {reason}", path.display())]
    Geometry { path: PathBuf, reason: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Pattern(#[from] regex::Error),

    #[error("failed to move file into place: {0}")]
    Persist(#[from] tempfile::PersistError),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
