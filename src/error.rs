use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Error type for flattening, projection, merging and store persistence.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// The on-disk store does not have the column layout the registry declares.
    ///
    /// Fatal: callers are expected to halt rather than repair the file.
    #[error("store {} does not match schema for source '{source_name}': {detail}", path.display())]
    SchemaFormat {
        path: PathBuf,
        source_name: String,
        detail: String,
    },
    #[error(
        "ambiguous prefix mapping for key '{key}': '{raw_prefix}' maps to both '{first}' and '{second}'"
    )]
    AmbiguousPrefixMapping {
        key: String,
        raw_prefix: String,
        first: String,
        second: String,
    },
    #[error("malformed record: {0}")]
    MalformedRecord(String),
    #[error("store {} violates identifier '{identifier}': {detail}", path.display())]
    StoreIntegrity {
        path: PathBuf,
        identifier: String,
        detail: String,
    },
    #[error("unknown source '{0}'")]
    UnknownSource(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("unreadable input batch: {0}")]
    Input(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl HarvestError {
    /// True for header/layout disagreements between a store and its schema.
    pub fn is_schema_format(&self) -> bool {
        matches!(self, HarvestError::SchemaFormat { .. })
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;
