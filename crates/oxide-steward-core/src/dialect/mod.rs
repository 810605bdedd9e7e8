//! Database dialect adapters.
//!
//! A dialect renders every statement the differs emit and declares, through
//! [`Capabilities`], which couplings and features the target database has.
//! Rendering methods have ANSI-flavored defaults; concrete dialects override
//! what their database spells differently.

mod mysql;
mod postgres;

pub use mysql::MySqlDialect;
pub use postgres::PostgresDialect;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::catalog::{ResolvedColumn, ResolvedConstraint, ResolvedTable};
use crate::model::{Function, Index, Sequence, Trigger, TypeDef, TypeKind};
use crate::stage::TransactionEnvelope;

static PLAIN_IDENTIFIER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok());

/// Words that must be quoted when used as identifiers.
const RESERVED_WORDS: &[&str] = &[
    "ALL", "ALTER", "AND", "ANY", "AS", "ASC", "BETWEEN", "BY", "CASE", "CHECK", "COLUMN",
    "CONSTRAINT", "CREATE", "CROSS", "DEFAULT", "DELETE", "DESC", "DISTINCT", "DROP", "ELSE",
    "END", "EXISTS", "FALSE", "FOR", "FOREIGN", "FROM", "FULL", "GRANT", "GROUP", "HAVING", "IN",
    "INDEX", "INNER", "INSERT", "INTO", "IS", "JOIN", "KEY", "LEFT", "LIKE", "LIMIT", "NOT", "NULL",
    "OFFSET", "ON", "OR", "ORDER", "OUTER", "PRIMARY", "REFERENCES", "RIGHT", "SELECT", "SET",
    "TABLE", "THEN", "TO", "TRUE", "UNION", "UNIQUE", "UPDATE", "USER", "USING", "VALUES", "WHEN",
    "WHERE", "WITH",
];

/// Capability flags of a dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct Capabilities {
    /// DDL runs inside a transaction; stages get a BEGIN/COMMIT envelope.
    pub transactional_ddl: bool,
    /// Index and foreign-key changes of one table are merged into
    /// multi-clause ALTER TABLE statements.
    pub indexes_coupled_to_foreign_keys: bool,
    /// CREATE SEQUENCE exists; otherwise sequences are emulated.
    pub native_sequences: bool,
    /// The auto-increment flag lives on the primary key: it must be
    /// stripped before the key is dropped and restored after it is added.
    pub primary_key_carries_auto_increment: bool,
    /// Primary keys keep their declared name; otherwise every primary key
    /// is called `PRIMARY` and only its definition tells two apart.
    pub named_primary_keys: bool,
    /// INHERITS is materialized; otherwise inheritance is flattened.
    pub table_inheritance: bool,
    /// Schemas are real namespaces.
    pub multiple_schemas: bool,
    /// CHECK constraints are enforced.
    pub check_constraints: bool,
    /// CREATE TYPE exists for enum and composite types.
    pub user_defined_types: bool,
}

/// A feature a dialect may lack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Feature {
    /// CHECK constraints.
    CheckConstraint,
    /// Table inheritance.
    TableInheritance,
    /// Composite (record) types.
    CompositeType,
    /// FOR EACH STATEMENT triggers.
    StatementTrigger,
    /// Index storage methods other than btree and hash.
    IndexMethod,
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CheckConstraint => "CHECK constraints",
            Self::TableInheritance => "table inheritance",
            Self::CompositeType => "composite types",
            Self::StatementTrigger => "statement-level triggers",
            Self::IndexMethod => "index storage methods",
        };
        f.write_str(name)
    }
}

/// What to do when a definition asks for an unsupported feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeaturePolicy {
    /// Abort the run with [`crate::StewardError::DialectUnsupported`].
    Error,
    /// Skip the object and record a warning.
    Warn,
}

/// Per-feature policies held by a dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeaturePolicies {
    policies: BTreeMap<Feature, FeaturePolicy>,
}

impl Default for FeaturePolicies {
    fn default() -> Self {
        let policies = [
            (Feature::CheckConstraint, FeaturePolicy::Warn),
            (Feature::TableInheritance, FeaturePolicy::Warn),
            (Feature::CompositeType, FeaturePolicy::Error),
            (Feature::StatementTrigger, FeaturePolicy::Error),
            (Feature::IndexMethod, FeaturePolicy::Warn),
        ];
        Self {
            policies: policies.into_iter().collect(),
        }
    }
}

impl FeaturePolicies {
    /// Policy for `feature`.
    #[must_use]
    pub fn get(&self, feature: Feature) -> FeaturePolicy {
        self.policies
            .get(&feature)
            .copied()
            .unwrap_or(FeaturePolicy::Error)
    }

    /// Overrides the policy for `feature`.
    pub fn set(&mut self, feature: Feature, policy: FeaturePolicy) {
        self.policies.insert(feature, policy);
    }
}

/// Identifier quoting mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdentifierQuoting {
    /// Quote only names that are not plain identifiers or are reserved.
    #[default]
    IllegalOnly,
    /// Quote every name. Identifiers become case-sensitive.
    All,
}

/// Kind of object a grant applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantTarget {
    /// A schema.
    Schema,
    /// A table.
    Table,
    /// A view.
    View,
    /// A sequence.
    Sequence,
    /// A function.
    Function,
}

/// Returns whether `name` is a plain identifier (letters, digits and
/// underscores, not starting with a digit).
#[must_use]
pub fn is_plain_identifier(name: &str) -> bool {
    PLAIN_IDENTIFIER
        .as_ref()
        .is_some_and(|re| re.is_match(name))
}

/// Returns whether a declared type is numeric.
#[must_use]
pub fn is_numeric_type(data_type: &str) -> bool {
    let base = data_type
        .split('(')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    matches!(
        base.as_str(),
        "smallint"
            | "int"
            | "int2"
            | "int4"
            | "int8"
            | "integer"
            | "bigint"
            | "tinyint"
            | "mediumint"
            | "serial"
            | "bigserial"
            | "numeric"
            | "decimal"
            | "real"
            | "float"
            | "double"
            | "double precision"
    )
}

/// Returns whether a declared type is boolean.
#[must_use]
pub fn is_boolean_type(data_type: &str) -> bool {
    let t = data_type.trim();
    t.eq_ignore_ascii_case("boolean") || t.eq_ignore_ascii_case("bool")
}

/// Parses a boolean literal as written in definition documents.
#[must_use]
pub fn parse_boolean(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" | "on" => Some(true),
        "false" | "f" | "no" | "n" | "0" | "off" => Some(false),
        _ => None,
    }
}

/// Statement rendering and capability declaration for one database.
pub trait DialectAdapter: Send + Sync + fmt::Debug {
    /// Dialect name as used in `sql_format` tags (`pgsql8`, `mysql5`).
    fn name(&self) -> &'static str;

    /// Capability flags.
    fn capabilities(&self) -> Capabilities;

    /// Identifier quoting mode.
    fn quoting(&self) -> IdentifierQuoting;

    /// Policy for a feature this dialect lacks.
    fn feature_policy(&self, feature: Feature) -> FeaturePolicy;

    // ------------------------------------------------------------------
    // Names
    // ------------------------------------------------------------------

    /// Identifier quote character.
    fn quote_char(&self) -> char {
        '"'
    }

    /// Returns whether `name` is a reserved word.
    fn is_reserved(&self, name: &str) -> bool {
        let upper = name.to_ascii_uppercase();
        RESERVED_WORDS.contains(&upper.as_str())
    }

    /// Quotes an identifier according to the quoting mode.
    fn quote_identifier(&self, name: &str) -> String {
        let needs_quotes = match self.quoting() {
            IdentifierQuoting::All => true,
            IdentifierQuoting::IllegalOnly => !is_plain_identifier(name) || self.is_reserved(name),
        };
        if needs_quotes {
            let q = self.quote_char();
            let escaped = name.replace(q, &format!("{q}{q}"));
            format!("{q}{escaped}{q}")
        } else {
            name.to_string()
        }
    }

    /// Schema-qualified table reference.
    fn table_ref(&self, schema: &str, table: &str) -> String {
        format!(
            "{}.{}",
            self.quote_identifier(schema),
            self.quote_identifier(table)
        )
    }

    /// Schema-qualified reference to a view, sequence, function or type.
    fn object_ref(&self, schema: &str, name: &str) -> String {
        self.table_ref(schema, name)
    }

    /// Returns whether `schema` exists in every database of this dialect
    /// and is never created or dropped.
    fn is_implicit_schema(&self, _schema: &str) -> bool {
        false
    }

    /// BEGIN/COMMIT wrapping for each stage, if DDL is transactional.
    fn transaction_envelope(&self) -> Option<TransactionEnvelope> {
        self.capabilities()
            .transactional_ddl
            .then(|| TransactionEnvelope {
                begin: "BEGIN;".to_string(),
                commit: "COMMIT;".to_string(),
            })
    }

    // ------------------------------------------------------------------
    // Types and values
    // ------------------------------------------------------------------

    /// Integer type a serial pseudo-type stands for.
    fn serial_base_type(&self, declared: &str) -> &'static str {
        if declared.trim().eq_ignore_ascii_case("bigserial") {
            "bigint"
        } else {
            "integer"
        }
    }

    /// Renders an enum type inline, for dialects without CREATE TYPE.
    fn inline_enum(&self, values: &[String]) -> String {
        let labels: Vec<String> = values.iter().map(|v| quote_string(v)).collect();
        format!("ENUM({})", labels.join(", "))
    }

    /// Renders a literal value for a column of `data_type`.
    fn literal(&self, value: &str, data_type: &str) -> String {
        if is_numeric_type(data_type) && value.trim().parse::<f64>().is_ok() {
            return value.trim().to_string();
        }
        if is_boolean_type(data_type) {
            if let Some(b) = parse_boolean(value) {
                return if b { "TRUE" } else { "FALSE" }.to_string();
            }
        }
        quote_string(value)
    }

    /// Converts a declared default expression for this dialect.
    fn convert_default(&self, default: &str, _data_type: &str) -> String {
        default.to_string()
    }

    /// Type used in column definitions.
    fn column_type(&self, column: &ResolvedColumn) -> String {
        column.data_type.clone()
    }

    /// Full column definition: name, type, nullability and default.
    fn column_definition(&self, column: &ResolvedColumn) -> String {
        let mut parts = vec![
            self.quote_identifier(&column.name),
            self.column_type(column),
        ];
        if !column.nullable {
            parts.push("NOT NULL".to_string());
        }
        if let Some(ref default) = column.default {
            parts.push(format!(
                "DEFAULT {}",
                self.convert_default(default, &column.base_type)
            ));
        }
        parts.join(" ")
    }

    // ------------------------------------------------------------------
    // Tables and columns
    // ------------------------------------------------------------------

    /// CREATE TABLE with column definitions only; keys and indexes are
    /// added by later statements.
    fn create_table(&self, table: &ResolvedTable<'_>) -> String {
        let columns: Vec<String> = table
            .columns
            .iter()
            .map(|c| format!("\t{}", self.column_definition(c)))
            .collect();
        format!(
            "CREATE TABLE {} (\n{}\n)",
            self.table_ref(table.schema_name(), table.name()),
            columns.join(",\n")
        )
    }

    /// DROP TABLE.
    fn drop_table(&self, table_ref: &str) -> String {
        format!("DROP TABLE {table_ref}")
    }

    /// Renames a table within its schema.
    fn rename_table(&self, schema: &str, old_name: &str, new_name: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            self.table_ref(schema, old_name),
            self.quote_identifier(new_name)
        )
    }

    /// Moves a table to another schema, or `None` when the move does not
    /// change the table's physical name.
    fn move_table(&self, old_schema: &str, table: &str, new_schema: &str) -> Option<String> {
        Some(format!(
            "ALTER TABLE {} SET SCHEMA {}",
            self.table_ref(old_schema, table),
            self.quote_identifier(new_schema)
        ))
    }

    /// Multi-clause ALTER TABLE.
    fn alter_table(&self, table_ref: &str, clauses: &[String]) -> String {
        if clauses.len() == 1 {
            format!("ALTER TABLE {table_ref} {}", clauses[0])
        } else {
            format!("ALTER TABLE {table_ref}\n\t{}", clauses.join(",\n\t"))
        }
    }

    /// ADD COLUMN.
    fn add_column(&self, table_ref: &str, column: &ResolvedColumn) -> String {
        self.alter_table(
            table_ref,
            &[format!("ADD COLUMN {}", self.column_definition(column))],
        )
    }

    /// DROP COLUMN.
    fn drop_column(&self, table_ref: &str, column: &str) -> String {
        self.alter_table(
            table_ref,
            &[format!("DROP COLUMN {}", self.quote_identifier(column))],
        )
    }

    /// RENAME COLUMN; `column` is the new definition.
    fn rename_column(&self, table_ref: &str, old_name: &str, column: &ResolvedColumn) -> String {
        self.alter_table(
            table_ref,
            &[format!(
                "RENAME COLUMN {} TO {}",
                self.quote_identifier(old_name),
                self.quote_identifier(&column.name)
            )],
        )
    }

    /// Changes a column's type, converting values with `using` if given.
    fn alter_column_type(
        &self,
        table_ref: &str,
        column: &ResolvedColumn,
        using: Option<&str>,
    ) -> String {
        let mut clause = format!(
            "ALTER COLUMN {} TYPE {}",
            self.quote_identifier(&column.name),
            column.base_type
        );
        if let Some(using) = using {
            clause.push_str(" USING ");
            clause.push_str(using);
        }
        self.alter_table(table_ref, &[clause])
    }

    /// Applies the column's nullability.
    fn alter_column_nullability(&self, table_ref: &str, column: &ResolvedColumn) -> String {
        let action = if column.nullable {
            "DROP NOT NULL"
        } else {
            "SET NOT NULL"
        };
        self.alter_table(
            table_ref,
            &[format!(
                "ALTER COLUMN {} {action}",
                self.quote_identifier(&column.name)
            )],
        )
    }

    /// Applies the column's default, dropping it when absent.
    fn alter_column_default(&self, table_ref: &str, column: &ResolvedColumn) -> String {
        let name = self.quote_identifier(&column.name);
        let clause = match column.default {
            Some(ref default) => format!(
                "ALTER COLUMN {name} SET DEFAULT {}",
                self.convert_default(default, &column.base_type)
            ),
            None => format!("ALTER COLUMN {name} DROP DEFAULT"),
        };
        self.alter_table(table_ref, &[clause])
    }

    // ------------------------------------------------------------------
    // Constraints and indexes
    // ------------------------------------------------------------------

    /// `ADD CONSTRAINT ...` clause.
    fn add_constraint_clause(&self, constraint: &ResolvedConstraint) -> String {
        format!(
            "ADD CONSTRAINT {} {} {}",
            self.quote_identifier(&constraint.name),
            constraint.kind.as_sql(),
            constraint.definition
        )
    }

    /// `DROP CONSTRAINT ...` clause.
    fn drop_constraint_clause(&self, constraint: &ResolvedConstraint) -> String {
        format!("DROP CONSTRAINT {}", self.quote_identifier(&constraint.name))
    }

    /// Adds a constraint.
    fn add_constraint(&self, table_ref: &str, constraint: &ResolvedConstraint) -> String {
        self.alter_table(table_ref, &[self.add_constraint_clause(constraint)])
    }

    /// Drops a constraint.
    fn drop_constraint(&self, table_ref: &str, constraint: &ResolvedConstraint) -> String {
        self.alter_table(table_ref, &[self.drop_constraint_clause(constraint)])
    }

    /// Removes the auto-increment flag before a primary key is dropped.
    fn strip_auto_increment(&self, _table_ref: &str, _column: &ResolvedColumn) -> Option<String> {
        None
    }

    /// Restores the auto-increment flag after a primary key is added.
    fn restore_auto_increment(
        &self,
        _table_ref: &str,
        _column: &ResolvedColumn,
    ) -> Option<String> {
        None
    }

    /// Returns whether an index storage method is available.
    fn supports_index_method(&self, _method: &str) -> bool {
        true
    }

    /// Renders one index dimension: plain names are quoted, expressions
    /// pass through.
    fn index_dimension(&self, dimension: &str) -> String {
        let dimension = dimension.trim();
        if is_plain_identifier(dimension) {
            self.quote_identifier(dimension)
        } else {
            dimension.to_string()
        }
    }

    /// CREATE INDEX.
    fn create_index(&self, _schema: &str, table_ref: &str, index: &Index) -> String {
        let dims: Vec<String> = index
            .dimensions
            .iter()
            .map(|d| self.index_dimension(d))
            .collect();
        let mut sql = String::from("CREATE ");
        if index.unique {
            sql.push_str("UNIQUE ");
        }
        sql.push_str("INDEX ");
        sql.push_str(&self.quote_identifier(&index.name));
        sql.push_str(" ON ");
        sql.push_str(table_ref);
        if let Some(ref using) = index.using {
            sql.push_str(" USING ");
            sql.push_str(using);
        }
        sql.push_str(" (");
        sql.push_str(&dims.join(", "));
        sql.push(')');
        sql
    }

    /// DROP INDEX.
    fn drop_index(&self, schema: &str, _table_ref: &str, index: &Index) -> String {
        format!("DROP INDEX {}", self.object_ref(schema, &index.name))
    }

    /// `ADD INDEX ...` clause for merged ALTER TABLE statements.
    fn add_index_clause(&self, index: &Index) -> String {
        let dims: Vec<String> = index
            .dimensions
            .iter()
            .map(|d| self.index_dimension(d))
            .collect();
        let unique = if index.unique { "UNIQUE " } else { "" };
        format!(
            "ADD {unique}INDEX {} ({})",
            self.quote_identifier(&index.name),
            dims.join(", ")
        )
    }

    /// `DROP INDEX ...` clause for merged ALTER TABLE statements.
    fn drop_index_clause(&self, index: &Index) -> String {
        format!("DROP INDEX {}", self.quote_identifier(&index.name))
    }

    // ------------------------------------------------------------------
    // Data
    // ------------------------------------------------------------------

    /// INSERT of one row.
    fn insert(&self, table_ref: &str, columns: &[String], values: &[String]) -> String {
        let columns: Vec<String> = columns.iter().map(|c| self.quote_identifier(c)).collect();
        format!(
            "INSERT INTO {table_ref} ({}) VALUES ({})",
            columns.join(", "),
            values.join(", ")
        )
    }

    /// UPDATE of one row, keyed by primary key.
    fn update(
        &self,
        table_ref: &str,
        assignments: &[(String, String)],
        key: &[(String, String)],
    ) -> String {
        let sets: Vec<String> = assignments
            .iter()
            .map(|(c, v)| format!("{} = {v}", self.quote_identifier(c)))
            .collect();
        format!(
            "UPDATE {table_ref} SET {} WHERE {}",
            sets.join(", "),
            self.key_predicate(key)
        )
    }

    /// DELETE of one row, keyed by primary key.
    fn delete(&self, table_ref: &str, key: &[(String, String)]) -> String {
        format!("DELETE FROM {table_ref} WHERE {}", self.key_predicate(key))
    }

    /// `a = 1 AND b = 'x'` predicate over key values.
    fn key_predicate(&self, key: &[(String, String)]) -> String {
        let terms: Vec<String> = key
            .iter()
            .map(|(c, v)| {
                if v == "NULL" {
                    format!("{} IS NULL", self.quote_identifier(c))
                } else {
                    format!("{} = {v}", self.quote_identifier(c))
                }
            })
            .collect();
        terms.join(" AND ")
    }

    /// Sequence correction after explicit values were inserted into a
    /// serial primary key.
    fn serial_reset(&self, _schema: &str, _table: &str, _column: &str) -> Option<String> {
        None
    }

    // ------------------------------------------------------------------
    // Sequences
    // ------------------------------------------------------------------

    /// CREATE SEQUENCE.
    fn create_sequence(&self, schema: &str, sequence: &Sequence) -> Vec<String> {
        let mut sql = format!("CREATE SEQUENCE {}", self.object_ref(schema, &sequence.name));
        sql.push_str(&sequence_options(sequence));
        vec![sql]
    }

    /// ALTER SEQUENCE to the new options.
    fn alter_sequence(&self, schema: &str, sequence: &Sequence) -> Vec<String> {
        let mut sql = format!("ALTER SEQUENCE {}", self.object_ref(schema, &sequence.name));
        sql.push_str(&sequence_options(sequence));
        vec![sql]
    }

    /// DROP SEQUENCE.
    fn drop_sequence(&self, schema: &str, name: &str) -> Vec<String> {
        vec![format!("DROP SEQUENCE {}", self.object_ref(schema, name))]
    }

    /// Support objects needed before the first emulated sequence.
    fn sequence_support(&self) -> Vec<String> {
        Vec::new()
    }

    /// Emulation of a serial column that is not an auto-increment key.
    fn serial_emulation(&self, _schema: &str, _table: &str, _column: &ResolvedColumn) -> Vec<String> {
        Vec::new()
    }

    /// Removal of a serial emulation.
    fn drop_serial_emulation(&self, _schema: &str, _table: &str, _column: &str) -> Vec<String> {
        Vec::new()
    }

    // ------------------------------------------------------------------
    // Triggers, views, functions, types, schemas
    // ------------------------------------------------------------------

    /// Returns whether FOR EACH STATEMENT triggers exist.
    fn supports_statement_triggers(&self) -> bool {
        true
    }

    /// CREATE TRIGGER.
    fn create_trigger(&self, schema: &str, table_ref: &str, trigger: &Trigger) -> Vec<String> {
        vec![format!(
            "CREATE TRIGGER {} {} {} ON {table_ref} FOR EACH {} EXECUTE PROCEDURE {}",
            self.quote_identifier(&trigger.name),
            trigger.timing.to_ascii_uppercase(),
            trigger
                .events
                .iter()
                .map(|e| e.to_ascii_uppercase())
                .collect::<Vec<_>>()
                .join(" OR "),
            trigger.for_each.to_ascii_uppercase(),
            qualify_call(schema, &trigger.function),
        )]
    }

    /// DROP TRIGGER.
    fn drop_trigger(&self, _schema: &str, table_ref: &str, trigger: &Trigger) -> Vec<String> {
        vec![format!(
            "DROP TRIGGER IF EXISTS {} ON {table_ref}",
            self.quote_identifier(&trigger.name)
        )]
    }

    /// CREATE VIEW.
    fn create_view(&self, view_ref: &str, query: &str) -> String {
        format!(
            "CREATE VIEW {view_ref} AS {}",
            query.trim().trim_end_matches(';')
        )
    }

    /// DROP VIEW.
    fn drop_view(&self, view_ref: &str) -> String {
        format!("DROP VIEW IF EXISTS {view_ref}")
    }

    /// Creates or replaces a function.
    fn create_function(&self, schema: &str, function: &Function, body: &str) -> Vec<String> {
        let params: Vec<String> = function
            .parameters
            .iter()
            .map(|p| match p.name {
                Some(ref name) => format!("{} {}", self.quote_identifier(name), p.data_type),
                None => p.data_type.clone(),
            })
            .collect();
        let language = function.language.as_deref().unwrap_or("sql");
        vec![format!(
            "CREATE OR REPLACE FUNCTION {}({}) RETURNS {} AS $_$\n{}\n$_$ LANGUAGE {language}",
            self.object_ref(schema, &function.name),
            params.join(", "),
            function.returns,
            body.trim()
        )]
    }

    /// DROP FUNCTION.
    fn drop_function(&self, schema: &str, function: &Function) -> String {
        format!(
            "DROP FUNCTION IF EXISTS {}({})",
            self.object_ref(schema, &function.name),
            function.parameter_types()
        )
    }

    /// CREATE TYPE.
    fn create_type(&self, schema: &str, type_def: &TypeDef) -> String {
        let name = self.object_ref(schema, &type_def.name);
        match type_def.kind {
            TypeKind::Enum { ref values } => {
                let labels: Vec<String> = values.iter().map(|v| quote_string(v)).collect();
                format!("CREATE TYPE {name} AS ENUM ({})", labels.join(", "))
            }
            TypeKind::Composite { ref fields } => {
                let fields: Vec<String> = fields
                    .iter()
                    .map(|f| format!("{} {}", self.quote_identifier(&f.name), f.data_type))
                    .collect();
                format!("CREATE TYPE {name} AS ({})", fields.join(", "))
            }
        }
    }

    /// DROP TYPE.
    fn drop_type(&self, schema: &str, name: &str) -> String {
        format!("DROP TYPE {}", self.object_ref(schema, name))
    }

    /// CREATE SCHEMA.
    fn create_schema(&self, name: &str) -> String {
        format!("CREATE SCHEMA {}", self.quote_identifier(name))
    }

    /// Renames a schema.
    fn rename_schema(&self, old_name: &str, new_name: &str) -> String {
        format!(
            "ALTER SCHEMA {} RENAME TO {}",
            self.quote_identifier(old_name),
            self.quote_identifier(new_name)
        )
    }

    /// DROP SCHEMA.
    fn drop_schema(&self, name: &str) -> String {
        format!("DROP SCHEMA {}", self.quote_identifier(name))
    }

    // ------------------------------------------------------------------
    // Permissions
    // ------------------------------------------------------------------

    /// Keyword introducing the object in GRANT/REVOKE, or `None` when the
    /// dialect cannot grant on this kind of object.
    fn grant_object_keyword(&self, target: GrantTarget) -> Option<&'static str> {
        Some(match target {
            GrantTarget::Schema => "SCHEMA ",
            GrantTarget::Table | GrantTarget::View => "TABLE ",
            GrantTarget::Sequence => "SEQUENCE ",
            GrantTarget::Function => "FUNCTION ",
        })
    }

    /// GRANT statement.
    fn grant(
        &self,
        target: GrantTarget,
        object_ref: &str,
        operations: &[String],
        role: &str,
        with_grant_option: bool,
    ) -> Option<String> {
        let keyword = self.grant_object_keyword(target)?;
        let mut sql = format!(
            "GRANT {} ON {keyword}{object_ref} TO {}",
            operations.join(", "),
            self.quote_identifier(role)
        );
        if with_grant_option {
            sql.push_str(" WITH GRANT OPTION");
        }
        Some(sql)
    }

    /// REVOKE statement.
    fn revoke(
        &self,
        target: GrantTarget,
        object_ref: &str,
        operations: &[String],
        role: &str,
    ) -> Option<String> {
        let keyword = self.grant_object_keyword(target)?;
        Some(format!(
            "REVOKE {} ON {keyword}{object_ref} FROM {}",
            operations.join(", "),
            self.quote_identifier(role)
        ))
    }
}

/// Single-quoted string literal with embedded quotes doubled.
#[must_use]
pub fn quote_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn sequence_options(sequence: &Sequence) -> String {
    let mut sql = String::new();
    if let Some(increment) = sequence.increment {
        sql.push_str(&format!(" INCREMENT BY {increment}"));
    }
    if let Some(min) = sequence.min_value {
        sql.push_str(&format!(" MINVALUE {min}"));
    }
    if let Some(max) = sequence.max_value {
        sql.push_str(&format!(" MAXVALUE {max}"));
    }
    if let Some(start) = sequence.start {
        sql.push_str(&format!(" START WITH {start}"));
    }
    if let Some(cache) = sequence.cache {
        sql.push_str(&format!(" CACHE {cache}"));
    }
    sql.push_str(if sequence.cycle { " CYCLE" } else { " NO CYCLE" });
    sql
}

// Trigger functions without an explicit schema resolve in the table's schema.
fn qualify_call(schema: &str, function: &str) -> String {
    let call = function.trim();
    if call.contains('.') {
        call.to_string()
    } else if call.ends_with(')') {
        format!("{schema}.{call}")
    } else {
        format!("{schema}.{call}()")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_identifiers() {
        assert!(is_plain_identifier("user_id"));
        assert!(is_plain_identifier("_x1"));
        assert!(!is_plain_identifier("1abc"));
        assert!(!is_plain_identifier("first name"));
        assert!(!is_plain_identifier(""));
    }

    #[test]
    fn type_classification() {
        assert!(is_numeric_type("numeric(10, 2)"));
        assert!(is_numeric_type("BIGINT"));
        assert!(!is_numeric_type("varchar(10)"));
        assert!(is_boolean_type("Boolean"));
        assert_eq!(parse_boolean("t"), Some(true));
        assert_eq!(parse_boolean("maybe"), None);
    }

    #[test]
    fn string_quoting_doubles_quotes() {
        assert_eq!(quote_string("it's"), "'it''s'");
    }

    #[test]
    fn trigger_functions_are_qualified() {
        assert_eq!(qualify_call("app", "touch"), "app.touch()");
        assert_eq!(qualify_call("app", "touch('x')"), "app.touch('x')");
        assert_eq!(qualify_call("app", "util.touch()"), "util.touch()");
    }

    #[test]
    fn sequence_options_render_in_order() {
        let mut seq = Sequence::new("s");
        seq.increment = Some(2);
        seq.start = Some(10);
        assert_eq!(sequence_options(&seq), " INCREMENT BY 2 START WITH 10 NO CYCLE");
    }

    #[test]
    fn default_policies() {
        let policies = FeaturePolicies::default();
        assert_eq!(policies.get(Feature::CheckConstraint), FeaturePolicy::Warn);
        assert_eq!(policies.get(Feature::CompositeType), FeaturePolicy::Error);
    }
}
