//! Schema-level objects other than tables.

use serde::{Deserialize, Serialize};

use super::{eq_ci, name_key};

/// SQL text, optionally restricted to one dialect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialectSql {
    /// Dialect name (`pgsql8`, `mysql5`, ...); `None` applies to all.
    #[serde(default)]
    pub sql_format: Option<String>,
    /// The SQL text.
    pub sql: String,
}

impl DialectSql {
    /// Picks the text for `dialect`: an exact format match wins over a
    /// format-less entry.
    #[must_use]
    pub fn pick<'a>(candidates: &'a [Self], dialect: &str) -> Option<&'a str> {
        candidates
            .iter()
            .find(|c| c.sql_format.as_deref().is_some_and(|f| eq_ci(f, dialect)))
            .or_else(|| candidates.iter().find(|c| c.sql_format.is_none()))
            .map(|c| c.sql.as_str())
    }
}

/// A view definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    /// View name.
    pub name: String,
    /// Query text per dialect.
    pub queries: Vec<DialectSql>,
    /// Views (`name` or `schema.name`) this view selects from.
    #[serde(default)]
    pub depends_on_views: Vec<String>,
    /// Tables (`name` or `schema.name`) this view selects from.
    #[serde(default)]
    pub depends_on_tables: Vec<String>,
    /// Grants on the view.
    #[serde(default)]
    pub grants: Vec<Grant>,
}

/// A sequence definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    /// Sequence name.
    pub name: String,
    /// START WITH.
    #[serde(default)]
    pub start: Option<i64>,
    /// INCREMENT BY.
    #[serde(default)]
    pub increment: Option<i64>,
    /// MINVALUE.
    #[serde(default)]
    pub min_value: Option<i64>,
    /// MAXVALUE.
    #[serde(default)]
    pub max_value: Option<i64>,
    /// CACHE.
    #[serde(default)]
    pub cache: Option<i64>,
    /// CYCLE.
    #[serde(default)]
    pub cycle: bool,
    /// Grants on the sequence.
    #[serde(default)]
    pub grants: Vec<Grant>,
}

impl Sequence {
    /// Creates a sequence with database defaults.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Returns whether the sequence options (not grants) differ.
    #[must_use]
    pub fn options_differ(&self, other: &Self) -> bool {
        self.start != other.start
            || self.increment != other.increment
            || self.min_value != other.min_value
            || self.max_value != other.max_value
            || self.cache != other.cache
            || self.cycle != other.cycle
    }
}

/// A function parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionParameter {
    /// Parameter name.
    #[serde(default)]
    pub name: Option<String>,
    /// Parameter type.
    #[serde(rename = "type")]
    pub data_type: String,
}

/// A stored function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    /// Function name.
    pub name: String,
    /// Return type.
    pub returns: String,
    /// Implementation language.
    #[serde(default)]
    pub language: Option<String>,
    /// Ordered parameters.
    #[serde(default)]
    pub parameters: Vec<FunctionParameter>,
    /// Body per dialect.
    pub definitions: Vec<DialectSql>,
    /// Grants on the function.
    #[serde(default)]
    pub grants: Vec<Grant>,
}

impl Function {
    /// Case-insensitive identity: `name(type, type)`.
    #[must_use]
    pub fn signature_key(&self) -> String {
        let types: Vec<String> = self
            .parameters
            .iter()
            .map(|p| name_key(p.data_type.trim()))
            .collect();
        format!("{}({})", name_key(&self.name), types.join(","))
    }

    /// Comma-separated parameter types, as used by DROP FUNCTION.
    #[must_use]
    pub fn parameter_types(&self) -> String {
        self.parameters
            .iter()
            .map(|p| p.data_type.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A user-defined type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    /// Type name.
    pub name: String,
    /// Type structure.
    #[serde(flatten)]
    pub kind: TypeKind,
}

/// Structure of a user-defined type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeKind {
    /// Enumerated labels.
    Enum {
        /// Labels in order.
        values: Vec<String>,
    },
    /// Composite record type.
    Composite {
        /// Fields in order.
        fields: Vec<TypeField>,
    },
}

/// A field of a composite type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeField {
    /// Field name.
    pub name: String,
    /// Field type.
    #[serde(rename = "type")]
    pub data_type: String,
}

/// A permission grant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    /// Grantee roles.
    pub roles: Vec<String>,
    /// Operations (SELECT, INSERT, EXECUTE, USAGE, ALL, ...).
    pub operations: Vec<String>,
    /// WITH GRANT OPTION.
    #[serde(default)]
    pub with_grant_option: bool,
}

impl Grant {
    /// Creates a grant of `operations` to `roles`.
    #[must_use]
    pub fn new(roles: &[&str], operations: &[&str]) -> Self {
        Self {
            roles: roles.iter().map(|r| (*r).to_string()).collect(),
            operations: operations.iter().map(|o| (*o).to_string()).collect(),
            with_grant_option: false,
        }
    }
}
