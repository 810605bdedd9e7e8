//! Resolved options for one diff run.

use std::collections::BTreeSet;

use crate::error::{Result, StewardError};
use crate::model::TableKey;

/// Restricts a run to a set of tables.
///
/// Tables outside the filter still take part in dependency ordering, as
/// placeholders, but nothing is emitted for them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableFilter {
    tables: BTreeSet<TableKey>,
}

impl TableFilter {
    /// Creates an empty filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table.
    #[must_use]
    pub fn with_table(mut self, schema: &str, table: &str) -> Self {
        self.tables.insert(TableKey::new(schema, table));
        self
    }

    /// Parses a `schema.table` entry.
    pub fn parse_entry(entry: &str) -> Result<TableKey> {
        match entry.split_once('.') {
            Some((schema, table)) if !schema.is_empty() && !table.is_empty() => {
                Ok(TableKey::new(schema, table))
            }
            _ => Err(StewardError::InvalidOptions(format!(
                "table filter entry '{entry}' is not of the form schema.table"
            ))),
        }
    }

    /// Adds a parsed key.
    pub fn insert(&mut self, key: TableKey) {
        self.tables.insert(key);
    }

    /// Returns whether `key` is selected.
    #[must_use]
    pub fn contains(&self, key: &TableKey) -> bool {
        self.tables.contains(key)
    }

    /// Returns whether any table is selected in `schema`.
    #[must_use]
    pub fn touches_schema(&self, schema: &str) -> bool {
        let schema = crate::model::name_key(schema);
        self.tables.iter().any(|k| k.schema() == schema)
    }

    /// Returns whether the filter is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Options for a diff run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffOptions {
    /// Merge the four stages into one script.
    pub single_stage: bool,
    /// Emit structural changes only.
    pub only_schema_sql: bool,
    /// Emit data changes only.
    pub only_data_sql: bool,
    /// Limit the run to these tables.
    pub table_filter: Option<TableFilter>,
}

impl DiffOptions {
    /// Creates default options: four stages, schema and data.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges stages into a single script.
    #[must_use]
    pub fn single_stage(mut self) -> Self {
        self.single_stage = true;
        self
    }

    /// Emits structural changes only.
    #[must_use]
    pub fn only_schema(mut self) -> Self {
        self.only_schema_sql = true;
        self
    }

    /// Emits data changes only.
    #[must_use]
    pub fn only_data(mut self) -> Self {
        self.only_data_sql = true;
        self
    }

    /// Limits the run to the tables in `filter`.
    #[must_use]
    pub fn with_table_filter(mut self, filter: TableFilter) -> Self {
        self.table_filter = Some(filter);
        self
    }

    /// Checks that the options do not contradict each other.
    pub fn validate(&self) -> Result<()> {
        if self.only_schema_sql && self.only_data_sql {
            return Err(StewardError::InvalidOptions(
                "only-schema and only-data output are mutually exclusive".into(),
            ));
        }
        if self.table_filter.as_ref().is_some_and(TableFilter::is_empty) {
            return Err(StewardError::InvalidOptions(
                "table filter selects no tables".into(),
            ));
        }
        Ok(())
    }

    /// Returns whether structural statements are emitted.
    #[must_use]
    pub const fn emits_schema(&self) -> bool {
        !self.only_data_sql
    }

    /// Returns whether data statements are emitted.
    #[must_use]
    pub const fn emits_data(&self) -> bool {
        !self.only_schema_sql
    }

    /// Returns whether `key` is selected by the table filter.
    #[must_use]
    pub fn includes(&self, key: &TableKey) -> bool {
        match self.table_filter {
            Some(ref filter) => filter.contains(key),
            None => true,
        }
    }

    /// Returns whether schema-level objects (views, sequences, functions,
    /// types) are diffed. They are skipped when a table filter is active.
    #[must_use]
    pub const fn includes_schema_objects(&self) -> bool {
        self.table_filter.is_none()
    }
}
