//! Per-side resolution of a definition tree.
//!
//! A [`Catalog`] is built once for each side of a run. It orders the
//! tables, then resolves every table into its effective shape for the
//! target dialect:
//!
//! - untyped foreign-key shorthand columns take the referenced column's
//!   type (serial types map to their integer base type)
//! - inheritance is flattened when the dialect cannot materialize it
//! - the primary key and foreign-key shorthands become named constraints
//! - foreign keys without a supporting index get an implicit one
//!
//! Resolution also validates the tree; every problem found is reported,
//! not just the first.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::config::TableFilter;
use crate::dialect::{is_plain_identifier, DialectAdapter};
use crate::error::{Result, StewardError};
use crate::model::{
    eq_ci, name_key, Column, ConstraintKind, DefinitionTree, Index, RowSet, Schema, Table,
    TableKey, TypeKind,
};
use crate::order::{DependencyOrderer, TableOrder, TableRef};

const MAX_TYPE_CHAIN: usize = 32;

/// Name of every primary key on dialects that do not name them.
const UNNAMED_PRIMARY_KEY: &str = "PRIMARY";

/// A schema-qualified name with its declared spelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedName {
    /// Schema name.
    pub schema: String,
    /// Object name.
    pub name: String,
}

impl QualifiedName {
    /// Creates a qualified name.
    #[must_use]
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Returns whether both names match case-insensitively.
    #[must_use]
    pub fn matches(&self, schema: &str, name: &str) -> bool {
        eq_ci(&self.schema, schema) && eq_ci(&self.name, name)
    }
}

/// A column in its effective shape.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct ResolvedColumn {
    /// Column name.
    pub name: String,
    /// Effective type: the declared type, the inherited foreign-key type,
    /// or an inlined enum.
    pub data_type: String,
    /// Type used when altering: serial types map to their integer base.
    pub base_type: String,
    /// Whether NULL is allowed. Primary-key columns never are.
    pub nullable: bool,
    /// Default expression.
    pub default: Option<String>,
    /// Declared as a serial pseudo-type.
    pub serial: bool,
    /// Explicit serial start value.
    pub serial_start: Option<i64>,
    /// Serial realized as the auto-increment flag of the primary key.
    pub auto_increment: bool,
    /// Serial realized as an emulated sequence plus trigger.
    pub emulated_serial: bool,
    /// Previous name hint.
    pub old_name: Option<String>,
    /// Conversion expression for type changes.
    pub convert_using: Option<String>,
    /// User-defined type this column uses.
    pub type_ref: Option<QualifiedName>,
    /// Copied from a flattened inheritance parent.
    pub inherited: bool,
}

impl ResolvedColumn {
    /// A nullable column of `data_type` with no default.
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        let data_type = data_type.into();
        Self {
            name: name.into(),
            base_type: data_type.clone(),
            data_type,
            nullable: true,
            default: None,
            serial: false,
            serial_start: None,
            auto_increment: false,
            emulated_serial: false,
            old_name: None,
            convert_using: None,
            type_ref: None,
            inherited: false,
        }
    }

    /// Returns whether the effective (base) types differ.
    #[must_use]
    pub fn type_differs(&self, other: &Self) -> bool {
        normalize_sql(&self.base_type) != normalize_sql(&other.base_type)
    }

    /// Returns whether the defaults differ.
    #[must_use]
    pub fn default_differs(&self, other: &Self) -> bool {
        self.default.as_deref().map(normalize_sql) != other.default.as_deref().map(normalize_sql)
    }
}

/// A named constraint in its effective shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConstraint {
    /// Constraint name.
    pub name: String,
    /// Constraint type.
    pub kind: ConstraintKind,
    /// Rendered definition, e.g. `(a, b)` or `(x) REFERENCES s.t (id)`.
    pub definition: String,
    /// Constrained columns, when the definition names them.
    pub columns: Vec<String>,
    /// Referenced table (FOREIGN KEY only).
    pub references: Option<TableKey>,
    /// Auto-increment column carried by a primary key.
    pub auto_increment: Option<ResolvedColumn>,
    /// Synthesized from a column shorthand or the primary key list.
    pub implicit: bool,
}

impl ResolvedConstraint {
    /// Creates a constraint with no columns or reference.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ConstraintKind, definition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            definition: definition.into(),
            columns: Vec::new(),
            references: None,
            auto_increment: None,
            implicit: false,
        }
    }

    /// Returns whether two same-named constraints render identically.
    #[must_use]
    pub fn same_definition(&self, other: &Self) -> bool {
        self.kind == other.kind
            && normalize_sql(&self.definition) == normalize_sql(&other.definition)
            && self.auto_increment.as_ref().map(|c| (name_key(&c.name), normalize_sql(&c.base_type)))
                == other
                    .auto_increment
                    .as_ref()
                    .map(|c| (name_key(&c.name), normalize_sql(&c.base_type)))
    }

    /// Leading constrained column.
    #[must_use]
    pub fn leading_column(&self) -> Option<&str> {
        self.columns.first().map(String::as_str)
    }
}

/// A table in its effective shape.
#[derive(Debug, Clone)]
pub struct ResolvedTable<'a> {
    /// Case-insensitive identity.
    pub key: TableKey,
    /// Owning schema.
    pub schema: &'a Schema,
    /// Source definition.
    pub table: &'a Table,
    /// Effective columns.
    pub columns: Vec<ResolvedColumn>,
    /// Primary key first, then foreign-key shorthands, then explicit
    /// constraints in declaration order.
    pub constraints: Vec<ResolvedConstraint>,
    /// Explicit indexes followed by implicit foreign-key indexes.
    pub indexes: Vec<Index>,
    /// Materialized inheritance parent.
    pub inherits: Option<QualifiedName>,
    /// Parent whose columns were flattened into this table.
    pub flattened_from: Option<QualifiedName>,
}

impl<'a> ResolvedTable<'a> {
    /// Table name.
    #[must_use]
    pub fn name(&self) -> &'a str {
        &self.table.name
    }

    /// Schema name.
    #[must_use]
    pub fn schema_name(&self) -> &'a str {
        &self.schema.name
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ResolvedColumn> {
        self.columns.iter().find(|c| eq_ci(&c.name, name))
    }

    /// The primary key constraint.
    #[must_use]
    pub fn primary_key(&self) -> Option<&ResolvedConstraint> {
        self.constraints_of(ConstraintKind::PrimaryKey).next()
    }

    /// Constraints of one kind, in order.
    pub fn constraints_of(
        &self,
        kind: ConstraintKind,
    ) -> impl Iterator<Item = &ResolvedConstraint> + '_ {
        self.constraints.iter().filter(move |c| c.kind == kind)
    }

    /// Looks up an index by name.
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| eq_ci(&i.name, name))
    }

    /// Inline data rows.
    #[must_use]
    pub fn rows(&self) -> Option<&'a RowSet> {
        self.table.rows.as_ref()
    }
}

/// Case-insensitive name registry used to keep constraint and index names
/// unique within one table.
#[derive(Debug, Default)]
pub struct NameRegistry {
    names: BTreeSet<String>,
}

impl NameRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `name`; returns `false` if it was already taken.
    pub fn claim(&mut self, name: &str) -> bool {
        self.names.insert(name_key(name))
    }

    /// Claims `base`, or `base_2`, `base_3`, ... and returns the name
    /// claimed.
    pub fn claim_unique(&mut self, base: &str) -> String {
        if self.claim(base) {
            return base.to_string();
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base}_{n}");
            if self.claim(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// One side of a run: table order plus resolved tables.
#[derive(Debug)]
pub struct Catalog<'a> {
    /// Source tree.
    pub tree: &'a DefinitionTree,
    /// Dependency order.
    pub order: TableOrder<'a>,
    tables: BTreeMap<TableKey, ResolvedTable<'a>>,
}

impl<'a> Catalog<'a> {
    /// Orders and resolves `tree` for `dialect`.
    pub fn build(
        tree: &'a DefinitionTree,
        dialect: &dyn DialectAdapter,
        filter: Option<&'a TableFilter>,
    ) -> Result<Self> {
        let caps = dialect.capabilities();
        let order = DependencyOrderer::new(tree)
            .follow_inheritance(caps.table_inheritance)
            .with_filter(filter)
            .order()?;

        let resolver = Resolver {
            tree,
            dialect,
            lookup: tree
                .tables()
                .map(|(schema, table)| (TableKey::new(&schema.name, &table.name), TableRef { schema, table }))
                .collect(),
        };

        let mut tables = BTreeMap::new();
        let mut errors = Vec::new();
        let mut physical: BTreeMap<String, TableKey> = BTreeMap::new();
        for (schema, table) in tree.tables() {
            let table_ref = TableRef { schema, table };
            let key = table_ref.key();

            let name = dialect.table_ref(&schema.name, &table.name);
            if let Some(other) = physical.insert(name.clone(), key.clone()) {
                errors.push(StewardError::table(
                    &schema.name,
                    &table.name,
                    format!("maps to the same {} table name {name} as {other}", dialect.name()),
                ));
                continue;
            }

            match resolver.resolve(table_ref) {
                Ok(resolved) => {
                    tables.insert(key, resolved);
                }
                Err(StewardError::Multiple(mut inner)) => errors.append(&mut inner),
                Err(err) => errors.push(err),
            }
        }
        StewardError::collect(errors)?;

        debug!(tables = tables.len(), dialect = dialect.name(), "Resolved catalog");
        Ok(Self {
            tree,
            order,
            tables,
        })
    }

    /// Looks up a resolved table.
    #[must_use]
    pub fn table(&self, key: &TableKey) -> Option<&ResolvedTable<'a>> {
        self.tables.get(key)
    }

    /// Resolved tables the run processes, dependencies first.
    pub fn tables_in_order(&self) -> impl DoubleEndedIterator<Item = &ResolvedTable<'a>> + '_ {
        self.order
            .tables()
            .filter_map(move |t| self.tables.get(&t.key()))
    }
}

struct Resolver<'r, 'a> {
    tree: &'a DefinitionTree,
    dialect: &'r dyn DialectAdapter,
    lookup: BTreeMap<TableKey, TableRef<'a>>,
}

impl<'a> Resolver<'_, 'a> {
    fn resolve(&self, table_ref: TableRef<'a>) -> Result<ResolvedTable<'a>> {
        let caps = self.dialect.capabilities();
        let TableRef { schema, table } = table_ref;
        let schema_name = schema.name.as_str();
        let mut errors = Vec::new();

        // Columns, parent first when inheritance is flattened.
        let mut inherits = None;
        let mut flattened_from = None;
        let mut sources: Vec<(&'a str, &'a Table, &'a Column, bool)> = Vec::new();
        if let Some((parent_schema, parent_name)) = table.inherits(schema_name) {
            let parent_key = TableKey::new(parent_schema, parent_name);
            let Some(parent) = self.lookup.get(&parent_key).copied() else {
                return Err(StewardError::table(
                    schema_name,
                    &table.name,
                    format!("inherits from missing table {parent_key}"),
                ));
            };
            let parent_name = QualifiedName::new(&parent.schema.name, &parent.table.name);
            if caps.table_inheritance {
                inherits = Some(parent_name);
            } else {
                for (owner_schema, owner, column) in self.inherited_columns(parent, &mut vec![table_ref.key()])? {
                    if table.column(&column.name).is_none()
                        && !sources.iter().any(|(_, _, c, _)| eq_ci(&c.name, &column.name))
                    {
                        sources.push((owner_schema, owner, column, true));
                    }
                }
                flattened_from = Some(parent_name);
            }
        }
        sources.extend(table.columns.iter().map(|c| (schema_name, table, c, false)));

        let mut columns: Vec<ResolvedColumn> = Vec::with_capacity(sources.len());
        for (owner_schema, owner, column, inherited) in sources {
            if columns.iter().any(|c| eq_ci(&c.name, &column.name)) {
                errors.push(StewardError::column(
                    schema_name,
                    &table.name,
                    &column.name,
                    "column is declared more than once",
                ));
                continue;
            }
            match self.resolve_column(owner_schema, owner, column) {
                Ok(mut resolved) => {
                    resolved.inherited = inherited;
                    columns.push(resolved);
                }
                Err(err) => errors.push(err),
            }
        }

        // Primary key.
        if table.primary_key.is_empty() {
            errors.push(StewardError::table(
                schema_name,
                &table.name,
                "table has no primary key",
            ));
        }
        for pk in &table.primary_key {
            if !columns.iter().any(|c| eq_ci(&c.name, pk)) {
                errors.push(StewardError::column(
                    schema_name,
                    &table.name,
                    pk,
                    "primary key column does not exist",
                ));
            }
        }
        let sole_pk = match table.primary_key.as_slice() {
            [only] => Some(only.as_str()),
            _ => None,
        };
        for column in &mut columns {
            if table.is_primary_key_column(&column.name) {
                column.nullable = false;
            }
            if column.serial {
                column.auto_increment = caps.primary_key_carries_auto_increment
                    && sole_pk.is_some_and(|pk| eq_ci(pk, &column.name));
                column.emulated_serial = !caps.native_sequences && !column.auto_increment;
            }
        }

        let mut names = NameRegistry::new();
        let mut constraints = Vec::new();
        if !table.primary_key.is_empty() {
            let name = if caps.named_primary_keys {
                table
                    .primary_key_name
                    .clone()
                    .unwrap_or_else(|| format!("{}_pkey", table.name))
            } else {
                UNNAMED_PRIMARY_KEY.to_string()
            };
            names.claim(&name);
            constraints.push(ResolvedConstraint {
                definition: self.column_list(&table.primary_key),
                columns: table.primary_key.clone(),
                auto_increment: columns.iter().find(|c| c.auto_increment).cloned(),
                implicit: true,
                ..ResolvedConstraint::new(name, ConstraintKind::PrimaryKey, "")
            });
        }

        // Foreign-key shorthands.
        for column in &table.columns {
            let Some((ref_schema, ref_table)) = column.foreign_target(schema_name) else {
                continue;
            };
            let name = column.foreign_key_constraint_name(&table.name);
            if !names.claim(&name) {
                errors.push(StewardError::table(
                    schema_name,
                    &table.name,
                    format!("constraint name '{name}' is used more than once"),
                ));
                continue;
            }
            let Some(target) = self.lookup.get(&TableKey::new(ref_schema, ref_table)) else {
                errors.push(StewardError::column(
                    schema_name,
                    &table.name,
                    &column.name,
                    format!("foreign key references missing table {ref_schema}.{ref_table}"),
                ));
                continue;
            };
            let ref_column = column.foreign_column.as_deref().unwrap_or(&column.name);
            let mut definition = format!(
                "({}) REFERENCES {} ({})",
                self.dialect.quote_identifier(&column.name),
                self.dialect.table_ref(&target.schema.name, &target.table.name),
                self.dialect.quote_identifier(ref_column)
            );
            if let Some(action) = column.foreign_on_delete {
                definition.push_str(" ON DELETE ");
                definition.push_str(action.as_sql());
            }
            if let Some(action) = column.foreign_on_update {
                definition.push_str(" ON UPDATE ");
                definition.push_str(action.as_sql());
            }
            constraints.push(ResolvedConstraint {
                columns: vec![column.name.clone()],
                references: Some(TableKey::new(ref_schema, ref_table)),
                implicit: true,
                ..ResolvedConstraint::new(name, ConstraintKind::ForeignKey, definition)
            });
        }

        // Explicit constraints.
        for constraint in &table.constraints {
            if constraint.kind == ConstraintKind::PrimaryKey {
                errors.push(StewardError::table(
                    schema_name,
                    &table.name,
                    format!(
                        "primary key constraint '{}' must be declared through primary_key",
                        constraint.name
                    ),
                ));
                continue;
            }
            if !names.claim(&constraint.name) {
                errors.push(StewardError::table(
                    schema_name,
                    &table.name,
                    format!("constraint name '{}' is used more than once", constraint.name),
                ));
                continue;
            }
            let mut definition = constraint.definition.trim().to_string();
            if constraint.kind == ConstraintKind::Check && !definition.starts_with('(') {
                definition = format!("({definition})");
            }
            constraints.push(ResolvedConstraint {
                columns: constraint.leading_columns(),
                references: constraint
                    .foreign_target(schema_name)
                    .map(|(s, t)| TableKey::new(s, t)),
                ..ResolvedConstraint::new(constraint.name.clone(), constraint.kind, definition)
            });
        }

        // Indexes: explicit, then implicit foreign-key indexes.
        let mut indexes: Vec<Index> = Vec::new();
        for index in &table.indexes {
            if !names.claim(&index.name) {
                errors.push(StewardError::table(
                    schema_name,
                    &table.name,
                    format!("index name '{}' collides with another index or constraint", index.name),
                ));
                continue;
            }
            for dim in &index.dimensions {
                let dim = dim.trim();
                if is_plain_identifier(dim) && !columns.iter().any(|c| eq_ci(&c.name, dim)) {
                    errors.push(StewardError::column(
                        schema_name,
                        &table.name,
                        dim,
                        format!("index '{}' names a column that does not exist", index.name),
                    ));
                }
            }
            indexes.push(index.clone());
        }
        let leading_pk = table.primary_key.first();
        for fk in constraints
            .iter()
            .filter(|c| c.kind == ConstraintKind::ForeignKey)
        {
            let Some(leading) = fk.leading_column() else {
                continue;
            };
            let covered = indexes.iter().any(|i| i.leads_with(leading))
                || leading_pk.is_some_and(|pk| eq_ci(pk, leading));
            if covered {
                continue;
            }
            let name = names.claim_unique(&format!("{}_idx", fk.name));
            debug!(table = %table_ref.key(), index = %name, "Synthesized foreign key index");
            let dims: Vec<&str> = fk.columns.iter().map(String::as_str).collect();
            indexes.push(Index::new(name, &dims));
        }

        // Inline rows.
        if let Some(rows) = table.rows.as_ref() {
            for column in &rows.columns {
                if !columns.iter().any(|c| eq_ci(&c.name, column)) {
                    errors.push(StewardError::column(
                        schema_name,
                        &table.name,
                        column,
                        "data rows name a column that does not exist",
                    ));
                }
            }
            for (i, row) in rows.rows.iter().enumerate() {
                if row.cells.len() != rows.columns.len() {
                    errors.push(StewardError::table(
                        schema_name,
                        &table.name,
                        format!(
                            "data row {} has {} cells for {} columns",
                            i + 1,
                            row.cells.len(),
                            rows.columns.len()
                        ),
                    ));
                }
            }
        }

        StewardError::collect(errors)?;
        Ok(ResolvedTable {
            key: table_ref.key(),
            schema,
            table,
            columns,
            constraints,
            indexes,
            inherits,
            flattened_from,
        })
    }

    fn column_list(&self, columns: &[String]) -> String {
        let quoted: Vec<String> = columns
            .iter()
            .map(|c| self.dialect.quote_identifier(c))
            .collect();
        format!("({})", quoted.join(", "))
    }

    /// Columns of `parent` and its ancestors, ancestors first.
    fn inherited_columns(
        &self,
        parent: TableRef<'a>,
        seen: &mut Vec<TableKey>,
    ) -> Result<Vec<(&'a str, &'a Table, &'a Column)>> {
        let key = parent.key();
        if seen.contains(&key) {
            return Err(StewardError::ordering(format!(
                "inheritance cycle through {key}"
            )));
        }
        seen.push(key);

        let mut columns = Vec::new();
        if let Some((gp_schema, gp_name)) = parent.table.inherits(&parent.schema.name) {
            let gp_key = TableKey::new(gp_schema, gp_name);
            let Some(grandparent) = self.lookup.get(&gp_key).copied() else {
                return Err(StewardError::table(
                    &parent.schema.name,
                    &parent.table.name,
                    format!("inherits from missing table {gp_key}"),
                ));
            };
            for inherited in self.inherited_columns(grandparent, seen)? {
                if parent.table.column(&inherited.2.name).is_none() {
                    columns.push(inherited);
                }
            }
        }
        columns.extend(
            parent
                .table
                .columns
                .iter()
                .map(|c| (parent.schema.name.as_str(), parent.table, c)),
        );
        Ok(columns)
    }

    fn resolve_column(
        &self,
        owner_schema: &str,
        owner: &Table,
        column: &Column,
    ) -> Result<ResolvedColumn> {
        let declared = self.column_type(owner_schema, owner, column, 0)?;
        let serial = column.is_serial();
        let base_type = if serial {
            self.dialect.serial_base_type(&declared).to_string()
        } else {
            declared.clone()
        };

        let type_ref = self.user_type(owner_schema, &declared);
        let mut data_type = declared;
        if let Some(ref tr) = type_ref {
            if !self.dialect.capabilities().user_defined_types {
                let kind = self
                    .tree
                    .schema(&tr.schema)
                    .and_then(|s| s.type_def(&tr.name))
                    .map(|t| &t.kind);
                if let Some(TypeKind::Enum { values }) = kind {
                    data_type = self.dialect.inline_enum(values);
                }
            }
        }
        let base_type = if type_ref.is_some() && !serial {
            data_type.clone()
        } else {
            base_type
        };

        Ok(ResolvedColumn {
            name: column.name.clone(),
            data_type,
            base_type,
            nullable: column.nullable,
            default: column.default.clone(),
            serial,
            serial_start: column.serial_start,
            auto_increment: false,
            emulated_serial: false,
            old_name: column.old_name.clone(),
            convert_using: column.convert_using.clone(),
            type_ref,
            inherited: false,
        })
    }

    /// Declared type, following untyped foreign-key shorthands.
    fn column_type(
        &self,
        schema: &str,
        table: &Table,
        column: &Column,
        depth: usize,
    ) -> Result<String> {
        if let Some(t) = column.data_type.as_deref().filter(|t| !t.trim().is_empty()) {
            return Ok(t.trim().to_string());
        }
        let Some((ref_schema, ref_table)) = column.foreign_target(schema) else {
            return Err(StewardError::column(
                schema,
                &table.name,
                &column.name,
                "column has no type",
            ));
        };
        if depth >= MAX_TYPE_CHAIN {
            return Err(StewardError::column(
                schema,
                &table.name,
                &column.name,
                "foreign key type chain does not end in a typed column",
            ));
        }
        let ref_column_name = column.foreign_column.as_deref().unwrap_or(&column.name);
        let Some((target_schema, target_table, target_column)) =
            self.find_column(ref_schema, ref_table, ref_column_name)
        else {
            return Err(StewardError::column(
                schema,
                &table.name,
                &column.name,
                format!("foreign key references missing column {ref_schema}.{ref_table}.{ref_column_name}"),
            ));
        };
        let resolved = self.column_type(target_schema, target_table, target_column, depth + 1)?;
        if target_column.is_serial() {
            Ok(self.dialect.serial_base_type(&resolved).to_string())
        } else {
            Ok(resolved)
        }
    }

    /// Finds a column on a table or, through inheritance, its ancestors.
    fn find_column(
        &self,
        schema: &str,
        table: &str,
        column: &str,
    ) -> Option<(&'a str, &'a Table, &'a Column)> {
        let mut current = self.lookup.get(&TableKey::new(schema, table)).copied();
        let mut hops = 0;
        while let Some(t) = current {
            if let Some(c) = t.table.column(column) {
                return Some((t.schema.name.as_str(), t.table, c));
            }
            hops += 1;
            if hops > MAX_TYPE_CHAIN {
                return None;
            }
            current = t
                .table
                .inherits(&t.schema.name)
                .and_then(|(s, p)| self.lookup.get(&TableKey::new(s, p)).copied());
        }
        None
    }

    /// The user-defined type a declared type names, if any.
    fn user_type(&self, own_schema: &str, declared: &str) -> Option<QualifiedName> {
        let (schema, name) = declared
            .split_once('.')
            .map_or((own_schema, declared), |(s, n)| (s.trim(), n.trim()));
        let schema = self.tree.schema(schema)?;
        let type_def = schema.type_def(name)?;
        Some(QualifiedName::new(&schema.name, &type_def.name))
    }
}

/// Collapses whitespace runs so definitions compare by content.
#[must_use]
pub fn normalize_sql(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}
