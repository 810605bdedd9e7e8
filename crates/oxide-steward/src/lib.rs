//! Staged database upgrade scripts from declarative definitions.
//!
//! `oxide-steward` loads JSON definition documents, hands the old and new
//! trees to [`oxide_steward_core`] and writes the resulting stage scripts.
//!
//! # CLI Usage
//!
//! ```bash
//! # Upgrade scripts between two versions
//! oxide-steward --old v1.json --new v2.json --dialect pgsql8 --output-dir out/
//!
//! # Full build from scratch, one merged script
//! oxide-steward --new schema.json --new data.json --single-stage-upgrade
//!
//! # Data changes of two tables only
//! oxide-steward --old v1.json --new v2.json --only-data-sql \
//!     --limit-to-table app.users --limit-to-table app.roles
//! ```

pub mod document;
pub mod error;

use oxide_steward_core::dialect::{DialectAdapter, MySqlDialect, PostgresDialect};

pub use document::{compose, load_definition, load_document};
pub use error::{LoadError, Result};

/// Dialects selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialectName {
    /// PostgreSQL 8 and later.
    Pgsql8,
    /// MySQL 5 and later.
    Mysql5,
}

/// Identifier options shared by every dialect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NamingOptions {
    /// Quote every identifier.
    pub quote_all_names: bool,
    /// Prefix object names with their schema where schemas are flattened.
    pub use_schema_prefix: bool,
}

/// Builds the dialect adapter for `name`.
#[must_use]
pub fn dialect(name: DialectName, naming: NamingOptions) -> Box<dyn DialectAdapter> {
    match name {
        DialectName::Pgsql8 => {
            Box::new(PostgresDialect::new().quote_all_names(naming.quote_all_names))
        }
        DialectName::Mysql5 => Box::new(
            MySqlDialect::new()
                .quote_all_names(naming.quote_all_names)
                .use_schema_prefix(naming.use_schema_prefix),
        ),
    }
}
