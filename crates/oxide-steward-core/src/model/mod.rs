//! Definition tree types.
//!
//! A [`DefinitionTree`] is one version of a declarative database
//! definition: schemas with their tables, columns, constraints, indexes,
//! views, sequences, functions, types, grants and inline data rows.
//! Trees are produced by a document loader and are never mutated by the
//! diff engine.
//!
//! Every name lookup on these types is case-insensitive.

mod data;
mod objects;
mod table;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use data::{Cell, Row, RowSet};
pub use objects::{
    DialectSql, Function, FunctionParameter, Grant, Sequence, TypeDef, TypeField, TypeKind, View,
};
pub use table::{Column, Constraint, ConstraintKind, ForeignKeyAction, Index, Table, Trigger};

use crate::stage::Stage;

/// Case-insensitive identifier comparison.
#[must_use]
pub fn eq_ci(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Normalized (lowercase) form of an identifier, used as a map key.
#[must_use]
pub fn name_key(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// Case-insensitive identity of a table: `(schema, table)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableKey {
    schema: String,
    table: String,
}

impl TableKey {
    /// Creates a key; both parts are normalized.
    #[must_use]
    pub fn new(schema: &str, table: &str) -> Self {
        Self {
            schema: name_key(schema),
            table: name_key(table),
        }
    }

    /// Normalized schema name.
    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Normalized table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// One version of the database definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefinitionTree {
    /// Schemas in document order.
    #[serde(default)]
    pub schemas: Vec<Schema>,
    /// Free SQL statements attached to a stage.
    #[serde(default)]
    pub custom_sql: Vec<CustomSql>,
}

impl DefinitionTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a tree from a JSON document.
    pub fn from_json_str(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Adds a schema.
    #[must_use]
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schemas.push(schema);
        self
    }

    /// Looks up a schema by name.
    #[must_use]
    pub fn schema(&self, name: &str) -> Option<&Schema> {
        self.schemas.iter().find(|s| eq_ci(&s.name, name))
    }

    /// Looks up a table by schema and table name.
    #[must_use]
    pub fn table(&self, schema: &str, table: &str) -> Option<(&Schema, &Table)> {
        let schema = self.schema(schema)?;
        schema.table(table).map(|t| (schema, t))
    }

    /// Iterates over every `(schema, table)` pair in document order.
    pub fn tables(&self) -> impl Iterator<Item = (&Schema, &Table)> {
        self.schemas
            .iter()
            .flat_map(|s| s.tables.iter().map(move |t| (s, t)))
    }
}

/// A named container of tables and other objects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Schema name.
    pub name: String,
    /// Previous name, when the schema was renamed.
    #[serde(default)]
    pub old_name: Option<String>,
    /// Tables in document order.
    #[serde(default)]
    pub tables: Vec<Table>,
    /// Views.
    #[serde(default)]
    pub views: Vec<View>,
    /// Sequences.
    #[serde(default)]
    pub sequences: Vec<Sequence>,
    /// Functions.
    #[serde(default)]
    pub functions: Vec<Function>,
    /// User-defined types.
    #[serde(default)]
    pub types: Vec<TypeDef>,
    /// Grants on the schema itself.
    #[serde(default)]
    pub grants: Vec<Grant>,
}

impl Schema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds a table.
    #[must_use]
    pub fn with_table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    /// Looks up a table by name.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| eq_ci(&t.name, name))
    }

    /// Looks up a view by name.
    #[must_use]
    pub fn view(&self, name: &str) -> Option<&View> {
        self.views.iter().find(|v| eq_ci(&v.name, name))
    }

    /// Looks up a sequence by name.
    #[must_use]
    pub fn sequence(&self, name: &str) -> Option<&Sequence> {
        self.sequences.iter().find(|s| eq_ci(&s.name, name))
    }

    /// Looks up a type by name.
    #[must_use]
    pub fn type_def(&self, name: &str) -> Option<&TypeDef> {
        self.types.iter().find(|t| eq_ci(&t.name, name))
    }

    /// Looks up a function by its signature key (see [`Function::signature_key`]).
    #[must_use]
    pub fn function(&self, signature_key: &str) -> Option<&Function> {
        self.functions
            .iter()
            .find(|f| f.signature_key() == signature_key)
    }
}

/// A free SQL statement injected into one stage of the upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomSql {
    /// Stage the statement belongs to.
    pub stage: Stage,
    /// Emit at the beginning of the stage instead of the end.
    #[serde(default)]
    pub before: bool,
    /// Statement text, terminator included.
    pub sql: String,
    /// Optional comment written above the statement.
    #[serde(default)]
    pub comment: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_are_case_insensitive() {
        let tree = DefinitionTree::new()
            .with_schema(Schema::new("App").with_table(Table::new("Users")));

        assert!(tree.schema("app").is_some());
        assert!(tree.table("APP", "users").is_some());
        assert!(tree.table("app", "posts").is_none());
    }

    #[test]
    fn table_key_normalizes() {
        assert_eq!(TableKey::new("App", "Users"), TableKey::new("app", "USERS"));
        assert_eq!(TableKey::new("App", "Users").to_string(), "app.users");
    }

    #[test]
    fn parses_json_document() {
        let tree = DefinitionTree::from_json_str(
            r#"{
                "schemas": [{
                    "name": "public",
                    "tables": [{
                        "name": "users",
                        "primary_key": ["id"],
                        "columns": [
                            {"name": "id", "type": "serial"},
                            {"name": "name", "type": "varchar(100)", "nullable": false}
                        ],
                        "rows": {
                            "columns": ["id", "name"],
                            "rows": [["1", "alice"], {"cells": ["2", "bob"], "delete": true}]
                        }
                    }]
                }],
                "custom_sql": [{"stage": "stage2", "sql": "SELECT 1;"}]
            }"#,
        )
        .unwrap();

        let (_, users) = tree.table("public", "users").unwrap();
        assert_eq!(users.columns.len(), 2);
        assert!(users.columns[0].is_serial());
        assert!(!users.columns[1].nullable);
        let rows = users.rows.as_ref().unwrap();
        assert_eq!(rows.rows.len(), 2);
        assert!(rows.rows[1].delete);
        assert_eq!(tree.custom_sql[0].stage, Stage::Stage2);
    }

    #[test]
    fn malformed_document_is_an_error() {
        let err = DefinitionTree::from_json_str("{\"schemas\": 5}").unwrap_err();
        assert!(matches!(err, crate::StewardError::Document(_)));
    }
}
