//! Error types for the upgrade compiler.

use std::fmt;

/// Errors that abort a diff run.
///
/// Every error is fatal to the run: the orchestrator drops all stage
/// buffers instead of flushing them.
#[derive(Debug, thiserror::Error)]
pub enum StewardError {
    /// The definition tree is malformed.
    #[error("Definition error in {location}: {message}")]
    Definition {
        /// Where the problem was found.
        location: ObjectPath,
        /// What is wrong.
        message: String,
    },

    /// The target dialect cannot represent a requested feature and its
    /// policy for that feature is to fail.
    #[error("{dialect} does not support {feature} (on {object})")]
    DialectUnsupported {
        /// Dialect name.
        dialect: &'static str,
        /// Feature that has no representation.
        feature: String,
        /// Object that requested the feature.
        object: String,
    },

    /// Tables cannot be linearized, even after deferring foreign keys.
    #[error("Dependency ordering error: {0}")]
    Ordering(String),

    /// The resolved options contradict each other.
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// IO error while flushing stage output.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed definition document.
    #[error("Failed to read definition document: {0}")]
    Document(#[from] serde_json::Error),

    /// Multiple errors occurred.
    #[error("Multiple errors occurred:\n{}", .0.iter().map(|e| format!("  - {e}")).collect::<Vec<_>>().join("\n"))]
    Multiple(Vec<StewardError>),
}

impl StewardError {
    /// Creates a definition error for a table-level problem.
    pub fn table(schema: &str, table: &str, message: impl Into<String>) -> Self {
        Self::Definition {
            location: ObjectPath::table(schema, table),
            message: message.into(),
        }
    }

    /// Creates a definition error for a column-level problem.
    pub fn column(schema: &str, table: &str, column: &str, message: impl Into<String>) -> Self {
        Self::Definition {
            location: ObjectPath::column(schema, table, column),
            message: message.into(),
        }
    }

    /// Creates a definition error for a schema-level problem.
    pub fn schema(schema: &str, message: impl Into<String>) -> Self {
        Self::Definition {
            location: ObjectPath::schema(schema),
            message: message.into(),
        }
    }

    /// Creates an ordering error.
    pub fn ordering(message: impl Into<String>) -> Self {
        Self::Ordering(message.into())
    }

    /// Folds a list of errors into a single error, or `Ok` if empty.
    pub fn collect(mut errors: Vec<Self>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Multiple(errors)),
        }
    }
}

/// Identifies the schema object an error refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectPath {
    /// Schema name.
    pub schema: String,
    /// Table name, if the problem is table-scoped.
    pub table: Option<String>,
    /// Column name, if the problem is column-scoped.
    pub column: Option<String>,
}

impl ObjectPath {
    /// Path to a schema.
    #[must_use]
    pub fn schema(schema: &str) -> Self {
        Self {
            schema: schema.to_string(),
            table: None,
            column: None,
        }
    }

    /// Path to a table.
    #[must_use]
    pub fn table(schema: &str, table: &str) -> Self {
        Self {
            schema: schema.to_string(),
            table: Some(table.to_string()),
            column: None,
        }
    }

    /// Path to a column.
    #[must_use]
    pub fn column(schema: &str, table: &str, column: &str) -> Self {
        Self {
            schema: schema.to_string(),
            table: Some(table.to_string()),
            column: Some(column.to_string()),
        }
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.schema)?;
        if let Some(ref table) = self.table {
            write!(f, ".{table}")?;
        }
        if let Some(ref column) = self.column {
            write!(f, ".{column}")?;
        }
        Ok(())
    }
}

/// Result type for upgrade compilation.
pub type Result<T> = std::result::Result<T, StewardError>;
