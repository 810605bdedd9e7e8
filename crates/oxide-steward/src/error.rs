//! Error types for document loading.

use std::path::PathBuf;

use oxide_steward_core::StewardError;

/// Errors raised while reading and composing definition documents.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// A document could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        /// Document path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A document is not a valid definition.
    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        /// Document path.
        path: PathBuf,
        /// Underlying error.
        source: StewardError,
    },

    /// Two documents declare the same table.
    #[error("Table {schema}.{table} is declared in more than one document")]
    DuplicateTable {
        /// Schema name.
        schema: String,
        /// Table name.
        table: String,
    },

    /// No document was given for a required definition.
    #[error("No definition documents given")]
    NoDocuments,
}

/// Result type for document loading.
pub type Result<T> = std::result::Result<T, LoadError>;
