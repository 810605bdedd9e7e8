//! Table and column differ.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::catalog::{Catalog, ResolvedColumn, ResolvedTable};
use crate::dialect::{DialectAdapter, Feature, IdentifierQuoting};
use crate::error::{Result, StewardError};
use crate::model::{eq_ci, TableKey};
use crate::stage::Stage;

use super::{DiffContext, StageWriter};

// ================================================================
// Table matching
// ================================================================

/// Pairs new tables with the old tables they continue, following
/// `old_schema`/`old_name` hints and schema renames.
#[derive(Debug, Default)]
pub(crate) struct TableMatches {
    new_to_old: BTreeMap<TableKey, TableKey>,
    old_to_new: BTreeMap<TableKey, TableKey>,
}

impl TableMatches {
    /// Matches every table of `new` against `old` and validates the
    /// column pairing of each match.
    pub(crate) fn build(
        dialect: &dyn DialectAdapter,
        old: &Catalog<'_>,
        new: &Catalog<'_>,
    ) -> Result<Self> {
        let mut matches = Self::default();
        let mut errors = Vec::new();

        for (schema, table) in new.tree.tables() {
            let new_key = TableKey::new(&schema.name, &table.name);
            let explicit = table.old_schema.is_some() || table.old_name.is_some();
            let hinted = TableKey::new(
                table
                    .old_schema
                    .as_deref()
                    .or(schema.old_name.as_deref())
                    .unwrap_or(&schema.name),
                table.old_name.as_deref().unwrap_or(&table.name),
            );

            let old_key = if old.table(&hinted).is_some() {
                if explicit && hinted != new_key && new.table(&hinted).is_some() {
                    errors.push(StewardError::table(
                        &schema.name,
                        &table.name,
                        format!("renamed from {hinted}, which still exists in the new definition"),
                    ));
                    continue;
                }
                hinted
            } else if old.table(&new_key).is_some() {
                new_key.clone()
            } else {
                continue;
            };

            if let Some(other) = matches.old_to_new.get(&old_key) {
                errors.push(StewardError::table(
                    &schema.name,
                    &table.name,
                    format!("{other} and {new_key} both continue old table {old_key}"),
                ));
                continue;
            }
            if old_key != new_key {
                debug!(old = %old_key, new = %new_key, "Matched renamed table");
            }
            matches.old_to_new.insert(old_key.clone(), new_key.clone());
            matches.new_to_old.insert(new_key, old_key);
        }

        for (old_key, new_key) in &matches.old_to_new {
            if let (Some(old_table), Some(new_table)) = (old.table(old_key), new.table(new_key)) {
                if let Err(err) = match_columns(dialect, old_table, new_table) {
                    errors.push(err);
                }
            }
        }

        StewardError::collect(errors)?;
        Ok(matches)
    }

    /// Old key of a new table.
    pub(crate) fn old_key(&self, new: &TableKey) -> Option<&TableKey> {
        self.new_to_old.get(new)
    }

    /// New key of an old table, if it survives.
    pub(crate) fn new_key(&self, old: &TableKey) -> Option<&TableKey> {
        self.old_to_new.get(old)
    }
}

// ================================================================
// Column matching
// ================================================================

/// How one column moves between the old and new table.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ColumnChange<'c> {
    /// Only in the new table.
    Added(&'c ResolvedColumn),
    /// In both tables, possibly renamed.
    Kept {
        old: &'c ResolvedColumn,
        new: &'c ResolvedColumn,
    },
    /// Only in the old table.
    Dropped(&'c ResolvedColumn),
}

fn same_identifier(dialect: &dyn DialectAdapter, a: &str, b: &str) -> bool {
    match dialect.quoting() {
        IdentifierQuoting::All => a == b,
        IdentifierQuoting::IllegalOnly => eq_ci(a, b),
    }
}

/// Pairs the columns of two matched tables.
///
/// New columns come first in declaration order, then dropped columns in
/// old order.
pub(crate) fn match_columns<'c>(
    dialect: &dyn DialectAdapter,
    old: &'c ResolvedTable<'_>,
    new: &'c ResolvedTable<'_>,
) -> Result<Vec<ColumnChange<'c>>> {
    let mut changes = Vec::with_capacity(new.columns.len());
    let mut claimed: BTreeSet<usize> = BTreeSet::new();
    let position = |name: &str| old.columns.iter().position(|c| eq_ci(&c.name, name));

    for column in &new.columns {
        let hinted = column.old_name.as_deref().and_then(|hint| {
            let pos = position(hint)?;
            Some((hint, pos))
        });
        let found = match hinted {
            Some((hint, pos)) => {
                let still_declared = new
                    .columns
                    .iter()
                    .any(|c| !std::ptr::eq(c, column) && eq_ci(&c.name, hint));
                if still_declared {
                    return Err(StewardError::column(
                        new.schema_name(),
                        new.name(),
                        &column.name,
                        format!("renamed from {hint}, which is still declared"),
                    ));
                }
                Some(pos)
            }
            None => {
                let pos = position(&column.name);
                if let Some(pos) = pos {
                    let old_name = &old.columns[pos].name;
                    if !same_identifier(dialect, old_name, &column.name) {
                        return Err(StewardError::column(
                            new.schema_name(),
                            new.name(),
                            &column.name,
                            format!(
                                "ambiguous rename from {old_name}: names differ only in case and no old_name is given"
                            ),
                        ));
                    }
                }
                pos
            }
        };

        match found {
            Some(pos) => {
                if !claimed.insert(pos) {
                    return Err(StewardError::column(
                        new.schema_name(),
                        new.name(),
                        &column.name,
                        format!("old column {} is continued twice", old.columns[pos].name),
                    ));
                }
                changes.push(ColumnChange::Kept {
                    old: &old.columns[pos],
                    new: column,
                });
            }
            None => changes.push(ColumnChange::Added(column)),
        }
    }

    changes.extend(
        old.columns
            .iter()
            .enumerate()
            .filter(|(i, _)| !claimed.contains(i))
            .map(|(_, c)| ColumnChange::Dropped(c)),
    );
    Ok(changes)
}

/// Returns whether an added column is created nullable and made NOT NULL
/// only after data is loaded.
fn deferred_not_null(column: &ResolvedColumn) -> bool {
    !column.nullable && column.default.is_none()
}

/// New keys of surviving tables whose shape changed (renamed, moved, or a
/// column added, dropped, renamed or retyped), plus old keys of dropped
/// tables.
pub(crate) fn reshaped_tables(ctx: &DiffContext<'_, '_>) -> Result<BTreeSet<TableKey>> {
    let mut keys = BTreeSet::new();
    for new in ctx.new.tables_in_order() {
        let Some(old) = ctx.old_table(new) else {
            continue;
        };
        let mut changed = old.key != new.key
            || !same_identifier(ctx.dialect, old.name(), new.name());
        for change in match_columns(ctx.dialect, old, new)? {
            changed |= match change {
                ColumnChange::Added(_) | ColumnChange::Dropped(_) => true,
                ColumnChange::Kept { old, new } => {
                    !same_identifier(ctx.dialect, &old.name, &new.name) || old.type_differs(new)
                }
            };
        }
        if changed {
            keys.insert(new.key.clone());
        }
    }
    keys.extend(
        ctx.old
            .tables_in_order()
            .filter(|t| !ctx.survives(t))
            .map(|t| t.key.clone()),
    );
    Ok(keys)
}

// ================================================================
// Stage 1
// ================================================================

/// Creates new tables and renames, moves and alters surviving ones, in
/// new dependency order.
///
/// `unkeyed` names the tables whose primary key is dropped at this point;
/// their columns are altered without the auto-increment flag, which the
/// primary-key add restores.
pub(crate) fn create_or_alter(
    ctx: &DiffContext<'_, '_>,
    out: &mut StageWriter,
    unkeyed: &BTreeSet<TableKey>,
) -> Result<()> {
    for new in ctx.new.tables_in_order() {
        match ctx.old_table(new) {
            None => create(ctx, out, new)?,
            Some(old) => {
                relocate(ctx, out, old, new);
                alter_columns(ctx, out, old, new, unkeyed.contains(&new.key))?;
            }
        }
    }
    Ok(())
}

fn create(ctx: &DiffContext<'_, '_>, out: &mut StageWriter, table: &ResolvedTable<'_>) -> Result<()> {
    let dialect = ctx.dialect;
    if let Some(ref parent) = table.flattened_from {
        out.unsupported(
            dialect,
            Stage::Stage1,
            Feature::TableInheritance,
            &table.key.to_string(),
        )?;
        out.comment(
            Stage::Stage1,
            &format!(
                "columns of {}.{} are copied into {}",
                parent.schema,
                parent.name,
                table.name()
            ),
        );
    }
    debug!(table = %table.key, "Creating table");
    out.emit(Stage::Stage1, dialect.create_table(table));
    emulate_serials(ctx, out, table, table.columns.iter());
    Ok(())
}

fn emulate_serials<'c>(
    ctx: &DiffContext<'_, '_>,
    out: &mut StageWriter,
    table: &ResolvedTable<'_>,
    columns: impl Iterator<Item = &'c ResolvedColumn>,
) {
    for column in columns.filter(|c| c.emulated_serial) {
        out.ensure_sequence_support(ctx.dialect, Stage::Stage1);
        out.emit_all(
            Stage::Stage1,
            ctx.dialect
                .serial_emulation(table.schema_name(), table.name(), column),
        );
    }
}

fn relocate(
    ctx: &DiffContext<'_, '_>,
    out: &mut StageWriter,
    old: &ResolvedTable<'_>,
    new: &ResolvedTable<'_>,
) {
    let dialect = ctx.dialect;
    if !eq_ci(old.schema_name(), new.schema_name()) {
        let carried_by_schema_rename = dialect.capabilities().multiple_schemas
            && new
                .schema
                .old_name
                .as_deref()
                .is_some_and(|o| eq_ci(o, old.schema_name()));
        if !carried_by_schema_rename {
            if let Some(sql) = dialect.move_table(old.schema_name(), old.name(), new.schema_name()) {
                out.emit(Stage::Stage1, sql);
            }
        }
    }
    if !same_identifier(dialect, old.name(), new.name()) {
        out.emit(
            Stage::Stage1,
            dialect.rename_table(new.schema_name(), old.name(), new.name()),
        );
    }
}

fn alter_columns(
    ctx: &DiffContext<'_, '_>,
    out: &mut StageWriter,
    old_table: &ResolvedTable<'_>,
    new_table: &ResolvedTable<'_>,
    unkeyed: bool,
) -> Result<()> {
    let dialect = ctx.dialect;
    let table_ref = ctx.table_ref(new_table);

    for change in match_columns(dialect, old_table, new_table)? {
        match change {
            ColumnChange::Added(column) => {
                if deferred_not_null(column) {
                    let relaxed = ResolvedColumn {
                        nullable: true,
                        ..column.clone()
                    };
                    out.emit(Stage::Stage1, dialect.add_column(&table_ref, &relaxed));
                } else {
                    out.emit(Stage::Stage1, dialect.add_column(&table_ref, column));
                }
                emulate_serials(ctx, out, new_table, std::iter::once(column));
            }
            ColumnChange::Kept { old, new } => {
                let new = if unkeyed && new.auto_increment {
                    Cow::Owned(ResolvedColumn {
                        auto_increment: false,
                        ..new.clone()
                    })
                } else {
                    Cow::Borrowed(new)
                };
                let new: &ResolvedColumn = &new;
                if !same_identifier(dialect, &old.name, &new.name) {
                    out.emit(
                        Stage::Stage1,
                        dialect.rename_column(&table_ref, &old.name, new),
                    );
                }
                if old.type_differs(new) {
                    out.emit(
                        Stage::Stage1,
                        dialect.alter_column_type(&table_ref, new, new.convert_using.as_deref()),
                    );
                }
                if old.serial != new.serial {
                    out.warn(
                        Stage::Stage1,
                        format!("{}.{}", new_table.key, new.name),
                        "serial flag changed; only the column type is altered",
                    );
                }
                if !old.nullable && new.nullable {
                    out.emit(
                        Stage::Stage1,
                        dialect.alter_column_nullability(&table_ref, new),
                    );
                }
                if old.default_differs(new) {
                    out.emit(Stage::Stage1, dialect.alter_column_default(&table_ref, new));
                }
                if new.emulated_serial && !old.emulated_serial {
                    emulate_serials(ctx, out, new_table, std::iter::once(new));
                } else if old.emulated_serial && !new.emulated_serial {
                    out.emit_all(
                        Stage::Stage1,
                        dialect.drop_serial_emulation(
                            old_table.schema_name(),
                            old_table.name(),
                            &old.name,
                        ),
                    );
                }
            }
            ColumnChange::Dropped(_) => {}
        }
    }
    Ok(())
}

// ================================================================
// Stage 3
// ================================================================

/// Makes columns NOT NULL once stage 2 has filled them.
pub(crate) fn enforce_not_null(ctx: &DiffContext<'_, '_>, out: &mut StageWriter) -> Result<()> {
    for new_table in ctx.new.tables_in_order() {
        let Some(old_table) = ctx.old_table(new_table) else {
            continue;
        };
        let table_ref = ctx.table_ref(new_table);
        for change in match_columns(ctx.dialect, old_table, new_table)? {
            let tightened = match change {
                ColumnChange::Added(column) if deferred_not_null(column) => Some(column),
                ColumnChange::Kept { old, new } if old.nullable && !new.nullable => Some(new),
                _ => None,
            };
            if let Some(column) = tightened {
                out.emit(
                    Stage::Stage3,
                    ctx.dialect.alter_column_nullability(&table_ref, column),
                );
            }
        }
    }
    Ok(())
}

/// Drops removed columns of surviving tables, in reverse old order.
pub(crate) fn drop_columns(ctx: &DiffContext<'_, '_>, out: &mut StageWriter) -> Result<()> {
    for old_table in ctx.old.tables_in_order().rev() {
        let Some(new_table) = ctx
            .matches
            .new_key(&old_table.key)
            .and_then(|key| ctx.new.table(key))
        else {
            continue;
        };
        let table_ref = ctx.table_ref(new_table);
        for change in match_columns(ctx.dialect, old_table, new_table)? {
            if let ColumnChange::Dropped(column) = change {
                out.emit(Stage::Stage3, ctx.dialect.drop_column(&table_ref, &column.name));
                if column.emulated_serial {
                    out.emit_all(
                        Stage::Stage3,
                        ctx.dialect.drop_serial_emulation(
                            old_table.schema_name(),
                            old_table.name(),
                            &column.name,
                        ),
                    );
                }
            }
        }
    }
    Ok(())
}

/// Drops removed tables in reverse old order. Deferred foreign keys
/// between removed tables go first, since they close a cycle.
pub(crate) fn drop_tables(ctx: &DiffContext<'_, '_>, out: &mut StageWriter) {
    let dropped = |key: &TableKey| ctx.matches.new_key(key).is_none();
    for deferred in &ctx.old.order.deferred {
        if !dropped(&deferred.table) || !dropped(&deferred.references) {
            continue;
        }
        let Some(table) = ctx.old.table(&deferred.table) else {
            continue;
        };
        if let Some(constraint) = table
            .constraints
            .iter()
            .find(|c| eq_ci(&c.name, &deferred.constraint))
        {
            out.emit(
                Stage::Stage3,
                ctx.dialect.drop_constraint(&ctx.table_ref(table), constraint),
            );
        }
    }

    for table in ctx.old.tables_in_order().rev() {
        if ctx.survives(table) {
            continue;
        }
        debug!(table = %table.key, "Dropping table");
        out.emit(Stage::Stage3, ctx.dialect.drop_table(&ctx.table_ref(table)));
        for column in table.columns.iter().filter(|c| c.emulated_serial) {
            out.emit_all(
                Stage::Stage3,
                ctx.dialect
                    .drop_serial_emulation(table.schema_name(), table.name(), &column.name),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::PostgresDialect;
    use crate::model::{Column, DefinitionTree, Schema, Table};

    fn tree(table: Table) -> DefinitionTree {
        DefinitionTree::new().with_schema(Schema::new("app").with_table(table))
    }

    fn users(columns: Vec<Column>) -> Table {
        let mut t = Table::new("users").with_primary_key(&["id"]);
        t.columns = columns;
        t
    }

    fn changes<'c>(
        dialect: &dyn DialectAdapter,
        old: &'c Catalog<'_>,
        new: &'c Catalog<'_>,
    ) -> Result<Vec<ColumnChange<'c>>> {
        let key = TableKey::new("app", "users");
        match_columns(dialect, old.table(&key).unwrap(), new.table(&key).unwrap())
    }

    #[test]
    fn columns_pair_by_name_and_hint() {
        let dialect = PostgresDialect::new();
        let old = tree(users(vec![
            Column::new("id", "int"),
            Column::new("login", "text"),
            Column::new("legacy", "text"),
        ]));
        let new = tree(users(vec![
            Column::new("ID", "int"),
            Column::new("username", "text").renamed_from("login"),
            Column::new("email", "text"),
        ]));
        let old = Catalog::build(&old, &dialect, None).unwrap();
        let new = Catalog::build(&new, &dialect, None).unwrap();

        let changes = changes(&dialect, &old, &new).unwrap();
        assert!(matches!(changes[0], ColumnChange::Kept { old, new } if old.name == "id" && new.name == "ID"));
        assert!(matches!(changes[1], ColumnChange::Kept { old, .. } if old.name == "login"));
        assert!(matches!(changes[2], ColumnChange::Added(c) if c.name == "email"));
        assert!(matches!(changes[3], ColumnChange::Dropped(c) if c.name == "legacy"));
    }

    #[test]
    fn case_only_rename_is_ambiguous_when_quoting_all() {
        let dialect = PostgresDialect::new().quote_all_names(true);
        let old = tree(users(vec![Column::new("id", "int"), Column::new("name", "text")]));
        let new = tree(users(vec![Column::new("id", "int"), Column::new("Name", "text")]));
        let old = Catalog::build(&old, &dialect, None).unwrap();
        let new = Catalog::build(&new, &dialect, None).unwrap();

        let err = changes(&dialect, &old, &new).unwrap_err();
        assert!(err.to_string().contains("ambiguous rename"), "{err}");
        assert!(TableMatches::build(&dialect, &old, &new).is_err());
    }

    #[test]
    fn hint_naming_a_live_column_is_rejected() {
        let dialect = PostgresDialect::new();
        let old = tree(users(vec![Column::new("id", "int"), Column::new("a", "text")]));
        let new = tree(users(vec![
            Column::new("id", "int"),
            Column::new("a", "text"),
            Column::new("b", "text").renamed_from("a"),
        ]));
        let old = Catalog::build(&old, &dialect, None).unwrap();
        let new = Catalog::build(&new, &dialect, None).unwrap();
        assert!(changes(&dialect, &old, &new).is_err());
    }

    #[test]
    fn tables_match_through_renames() {
        let dialect = PostgresDialect::new();
        let old = DefinitionTree::new().with_schema(
            Schema::new("app").with_table(users(vec![Column::new("id", "int")])),
        );
        let mut renamed = users(vec![Column::new("id", "int")]);
        renamed.name = "accounts".into();
        renamed.old_name = Some("users".into());
        let new = DefinitionTree::new().with_schema(Schema::new("app").with_table(renamed));

        let old = Catalog::build(&old, &dialect, None).unwrap();
        let new = Catalog::build(&new, &dialect, None).unwrap();
        let matches = TableMatches::build(&dialect, &old, &new).unwrap();
        assert_eq!(
            matches.old_key(&TableKey::new("app", "accounts")),
            Some(&TableKey::new("app", "users"))
        );
        assert!(matches.new_key(&TableKey::new("app", "users")).is_some());
    }

    #[test]
    fn schema_rename_carries_tables() {
        let dialect = PostgresDialect::new();
        let old = DefinitionTree::new().with_schema(
            Schema::new("legacy").with_table(users(vec![Column::new("id", "int")])),
        );
        let mut schema = Schema::new("app").with_table(users(vec![Column::new("id", "int")]));
        schema.old_name = Some("legacy".into());
        let new = DefinitionTree::new().with_schema(schema);

        let old = Catalog::build(&old, &dialect, None).unwrap();
        let new = Catalog::build(&new, &dialect, None).unwrap();
        let matches = TableMatches::build(&dialect, &old, &new).unwrap();
        assert_eq!(
            matches.old_key(&TableKey::new("app", "users")),
            Some(&TableKey::new("legacy", "users"))
        );
    }

    #[test]
    fn two_tables_cannot_continue_one() {
        let dialect = PostgresDialect::new();
        let old = tree(users(vec![Column::new("id", "int")]));
        let mut copy = users(vec![Column::new("id", "int")]);
        copy.name = "copy".into();
        copy.old_name = Some("users".into());
        let mut other = users(vec![Column::new("id", "int")]);
        other.name = "other".into();
        other.old_name = Some("users".into());
        let new = DefinitionTree::new()
            .with_schema(Schema::new("app").with_table(copy).with_table(other));

        let old = Catalog::build(&old, &dialect, None).unwrap();
        let new = Catalog::build(&new, &dialect, None).unwrap();
        let err = TableMatches::build(&dialect, &old, &new).unwrap_err();
        assert!(err.to_string().contains("both continue"), "{err}");
    }
}
