//! Error taxonomy for the import pipeline.
//!
//! Configuration-level errors (`UnsupportedType`, `UnsupportedDirectModeFeature`)
//! are raised before any I/O happens. `Connection` is the only error a caller may
//! reasonably retry, and retrying is a caller concern; the core never retries.

use thiserror::Error;

use crate::types::{CanonicalType, SourceType};

pub type Result<T> = std::result::Result<T, ImportError>;

#[derive(Error, Debug)]
pub enum ImportError {
    /// Failed to reach or authenticate against the source endpoint. Transient;
    /// the caller may retry the whole run.
    #[error("failed to connect to '{endpoint}': {message}")]
    Connection { endpoint: String, message: String },

    /// The source dialect exposes a type the mapper has no canonical
    /// representation for.
    #[error("source type {source_type} of column '{column}' has no canonical mapping")]
    UnsupportedType {
        column: String,
        source_type: SourceType,
    },

    /// The requested feature combination is outside the direct-mode subset.
    /// Raised before any connection is opened.
    #[error("direct mode does not support {feature}")]
    UnsupportedDirectModeFeature { feature: String },

    /// The run aborted mid-write. `rows_committed` rows are known durable.
    #[error("import aborted after {rows_committed} committed rows: {message}")]
    PartialWrite { rows_committed: u64, message: String },

    /// The catalog rejected a schema or write request.
    #[error("catalog error on table '{table}': {message}")]
    Catalog { table: String, message: String },

    /// A row carried a value incompatible with the column's catalog field type.
    #[error("value for column '{column}' does not fit catalog type {field_type}")]
    ValueOutOfRange {
        column: String,
        field_type: CanonicalType,
    },

    /// A connector handle was used outside its lifecycle, e.g. a second
    /// extraction from a sequence that is not restartable.
    #[error("connector handle misuse: {message}")]
    Handle { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ImportError {
    /// `true` if retrying the whole run could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ImportError::Connection { .. })
    }
}
