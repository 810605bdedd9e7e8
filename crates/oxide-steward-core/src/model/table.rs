//! Tables and their table-scoped objects.

use serde::{Deserialize, Serialize};

use super::data::RowSet;
use super::objects::Grant;
use super::eq_ci;

const fn default_true() -> bool {
    true
}

fn default_for_each() -> String {
    "ROW".to_string()
}

/// A table definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Previous table name, when the table was renamed.
    #[serde(default)]
    pub old_name: Option<String>,
    /// Previous schema, when the table moved between schemas.
    #[serde(default)]
    pub old_schema: Option<String>,
    /// Primary key column names.
    #[serde(default)]
    pub primary_key: Vec<String>,
    /// Explicit primary key constraint name.
    #[serde(default)]
    pub primary_key_name: Option<String>,
    /// Schema of the inheritance parent (defaults to the table's schema).
    #[serde(default)]
    pub inherits_schema: Option<String>,
    /// Inheritance parent table.
    #[serde(default)]
    pub inherits_table: Option<String>,
    /// Columns in declaration order.
    #[serde(default)]
    pub columns: Vec<Column>,
    /// Explicit constraints.
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    /// Explicit indexes.
    #[serde(default)]
    pub indexes: Vec<Index>,
    /// Triggers.
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    /// Grants on the table.
    #[serde(default)]
    pub grants: Vec<Grant>,
    /// Inline data rows.
    #[serde(default)]
    pub rows: Option<RowSet>,
}

impl Table {
    /// Creates an empty table.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds a column.
    #[must_use]
    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Sets the primary key columns.
    #[must_use]
    pub fn with_primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| (*c).to_string()).collect();
        self
    }

    /// Adds an explicit constraint.
    #[must_use]
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Adds an index.
    #[must_use]
    pub fn with_index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    /// Sets the inline rows.
    #[must_use]
    pub fn with_rows(mut self, rows: RowSet) -> Self {
        self.rows = Some(rows);
        self
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| eq_ci(&c.name, name))
    }

    /// Returns `(schema, table)` of the inheritance parent, if any.
    #[must_use]
    pub fn inherits<'a>(&'a self, own_schema: &'a str) -> Option<(&'a str, &'a str)> {
        self.inherits_table.as_deref().map(|parent| {
            (
                self.inherits_schema.as_deref().unwrap_or(own_schema),
                parent,
            )
        })
    }

    /// Returns whether `column` is part of the primary key.
    #[must_use]
    pub fn is_primary_key_column(&self, column: &str) -> bool {
        self.primary_key.iter().any(|c| eq_ci(c, column))
    }
}

/// A column definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Declared type. May be omitted on a foreign key shorthand column.
    #[serde(default, rename = "type")]
    pub data_type: Option<String>,
    /// Whether the column allows NULL.
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Default expression.
    #[serde(default)]
    pub default: Option<String>,
    /// Previous name, when the column was renamed.
    #[serde(default)]
    pub old_name: Option<String>,
    /// Referenced schema of a foreign key shorthand.
    #[serde(default)]
    pub foreign_schema: Option<String>,
    /// Referenced table of a foreign key shorthand.
    #[serde(default)]
    pub foreign_table: Option<String>,
    /// Referenced column (defaults to the column's own name).
    #[serde(default)]
    pub foreign_column: Option<String>,
    /// Name of the implicit foreign key constraint.
    #[serde(default)]
    pub foreign_key_name: Option<String>,
    /// ON DELETE action of the implicit foreign key.
    #[serde(default)]
    pub foreign_on_delete: Option<ForeignKeyAction>,
    /// ON UPDATE action of the implicit foreign key.
    #[serde(default)]
    pub foreign_on_update: Option<ForeignKeyAction>,
    /// Explicit start value for a serial column.
    #[serde(default)]
    pub serial_start: Option<i64>,
    /// Conversion expression used when the column type changes.
    #[serde(default)]
    pub convert_using: Option<String>,
}

impl Column {
    /// Creates a nullable column of the given type.
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: Some(data_type.into()),
            nullable: true,
            default: None,
            old_name: None,
            foreign_schema: None,
            foreign_table: None,
            foreign_column: None,
            foreign_key_name: None,
            foreign_on_delete: None,
            foreign_on_update: None,
            serial_start: None,
            convert_using: None,
        }
    }

    /// Creates an untyped foreign key shorthand column.
    #[must_use]
    pub fn foreign(
        name: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        let mut col = Self::new(name, "");
        col.data_type = None;
        col.foreign_schema = Some(schema.into());
        col.foreign_table = Some(table.into());
        col.foreign_column = Some(column.into());
        col
    }

    /// Marks the column NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets the default expression.
    #[must_use]
    pub fn default_value(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Sets the previous column name.
    #[must_use]
    pub fn renamed_from(mut self, old_name: impl Into<String>) -> Self {
        self.old_name = Some(old_name.into());
        self
    }

    /// Returns whether the declared type is a serial pseudo-type.
    #[must_use]
    pub fn is_serial(&self) -> bool {
        self.data_type
            .as_deref()
            .is_some_and(|t| eq_ci(t, "serial") || eq_ci(t, "bigserial"))
    }

    /// Returns whether this column is a foreign key shorthand.
    #[must_use]
    pub const fn is_foreign_key(&self) -> bool {
        self.foreign_table.is_some()
    }

    /// `(schema, table)` referenced by the shorthand; the schema defaults
    /// to the owning table's schema.
    #[must_use]
    pub fn foreign_target<'a>(&'a self, own_schema: &'a str) -> Option<(&'a str, &'a str)> {
        self.foreign_table.as_deref().map(|table| {
            (
                self.foreign_schema.as_deref().unwrap_or(own_schema),
                table,
            )
        })
    }

    /// Name of the implicit foreign key constraint:
    /// `foreign_key_name`, or `<table>_<column>_fkey`.
    #[must_use]
    pub fn foreign_key_constraint_name(&self, table: &str) -> String {
        self.foreign_key_name
            .clone()
            .unwrap_or_else(|| format!("{table}_{}_fkey", self.name))
    }
}

/// Foreign key referential action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ForeignKeyAction {
    /// NO ACTION.
    NoAction,
    /// RESTRICT.
    Restrict,
    /// CASCADE.
    Cascade,
    /// SET NULL.
    SetNull,
    /// SET DEFAULT.
    SetDefault,
}

impl ForeignKeyAction {
    /// Returns the SQL keyword(s) for this action.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

/// Constraint type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConstraintKind {
    /// PRIMARY KEY.
    PrimaryKey,
    /// FOREIGN KEY.
    ForeignKey,
    /// UNIQUE.
    Unique,
    /// CHECK.
    Check,
}

impl ConstraintKind {
    /// Returns the SQL keyword(s) introducing this constraint kind.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::PrimaryKey => "PRIMARY KEY",
            Self::ForeignKey => "FOREIGN KEY",
            Self::Unique => "UNIQUE",
            Self::Check => "CHECK",
        }
    }
}

/// An explicit table constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    /// Constraint name.
    pub name: String,
    /// Constraint type.
    #[serde(rename = "type")]
    pub kind: ConstraintKind,
    /// Dialect-opaque definition fragment, e.g. `(a, b)` for UNIQUE,
    /// `(a) REFERENCES s.t (id)` for FOREIGN KEY, `(x > 0)` for CHECK.
    pub definition: String,
    /// Referenced schema (FOREIGN KEY only).
    #[serde(default)]
    pub foreign_schema: Option<String>,
    /// Referenced table (FOREIGN KEY only).
    #[serde(default)]
    pub foreign_table: Option<String>,
}

impl Constraint {
    /// Creates a constraint.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ConstraintKind, definition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            definition: definition.into(),
            foreign_schema: None,
            foreign_table: None,
        }
    }

    /// Sets the referenced table of a FOREIGN KEY constraint.
    #[must_use]
    pub fn references(mut self, schema: impl Into<String>, table: impl Into<String>) -> Self {
        self.foreign_schema = Some(schema.into());
        self.foreign_table = Some(table.into());
        self
    }

    /// `(schema, table)` referenced by a FOREIGN KEY constraint; the schema
    /// defaults to the owning table's schema.
    #[must_use]
    pub fn foreign_target<'a>(&'a self, own_schema: &'a str) -> Option<(&'a str, &'a str)> {
        self.foreign_table.as_deref().map(|table| {
            (
                self.foreign_schema.as_deref().unwrap_or(own_schema),
                table,
            )
        })
    }

    /// Column names listed in the leading parenthesized group of the
    /// definition, e.g. `["a", "b"]` for `(a, "b") REFERENCES ...`.
    #[must_use]
    pub fn leading_columns(&self) -> Vec<String> {
        let def = self.definition.trim_start();
        let Some(rest) = def.strip_prefix('(') else {
            return Vec::new();
        };
        let Some(end) = rest.find(')') else {
            return Vec::new();
        };
        rest[..end]
            .split(',')
            .map(|c| c.trim().trim_matches(|ch| ch == '"' || ch == '`').to_string())
            .filter(|c| !c.is_empty())
            .collect()
    }
}

/// An index definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    /// Index name.
    pub name: String,
    /// Whether the index is UNIQUE.
    #[serde(default)]
    pub unique: bool,
    /// Storage method hint (btree, hash, gin, ...).
    #[serde(default)]
    pub using: Option<String>,
    /// Ordered dimensions: column names or expressions.
    pub dimensions: Vec<String>,
}

impl Index {
    /// Creates a non-unique index over the given dimensions.
    #[must_use]
    pub fn new(name: impl Into<String>, dimensions: &[&str]) -> Self {
        Self {
            name: name.into(),
            unique: false,
            using: None,
            dimensions: dimensions.iter().map(|d| (*d).to_string()).collect(),
        }
    }

    /// Marks the index UNIQUE.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Returns whether the first dimension is `column`.
    #[must_use]
    pub fn leads_with(&self, column: &str) -> bool {
        self.dimensions.first().is_some_and(|d| eq_ci(d.trim(), column))
    }
}

/// A table trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    /// Trigger name.
    pub name: String,
    /// BEFORE, AFTER or INSTEAD OF.
    pub timing: String,
    /// Events: INSERT, UPDATE, DELETE.
    pub events: Vec<String>,
    /// ROW or STATEMENT.
    #[serde(default = "default_for_each")]
    pub for_each: String,
    /// Function call or trigger body.
    pub function: String,
    /// Restricts the trigger to one dialect.
    #[serde(default)]
    pub sql_format: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_columns_strips_quotes() {
        let c = Constraint::new(
            "fk",
            ConstraintKind::ForeignKey,
            r#"("owner_id", `Tenant`) REFERENCES app.users (id, tenant)"#,
        );
        assert_eq!(c.leading_columns(), vec!["owner_id", "Tenant"]);

        let check = Constraint::new("ck", ConstraintKind::Check, "price > 0");
        assert!(check.leading_columns().is_empty());
    }

    #[test]
    fn index_leading_dimension() {
        let idx = Index::new("idx", &["Owner_ID", "created_at"]);
        assert!(idx.leads_with("owner_id"));
        assert!(!idx.leads_with("created_at"));
    }

    #[test]
    fn serial_detection() {
        assert!(Column::new("id", "BIGSERIAL").is_serial());
        assert!(!Column::new("id", "bigint").is_serial());
        assert!(!Column::foreign("user_id", "app", "users", "id").is_serial());
    }

    #[test]
    fn inherits_defaults_to_own_schema() {
        let mut t = Table::new("child");
        t.inherits_table = Some("parent".into());
        assert_eq!(t.inherits("app"), Some(("app", "parent")));
        t.inherits_schema = Some("base".into());
        assert_eq!(t.inherits("app"), Some(("base", "parent")));
    }
}
