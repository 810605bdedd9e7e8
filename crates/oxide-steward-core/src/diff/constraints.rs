//! Constraint differ and the key plan of one run.
//!
//! Constraint and index changes are planned for every processed table
//! before anything is written, because two global rules cut across
//! tables:
//!
//! - every primary key is established before any foreign key is added
//! - a foreign key is rebuilt when the primary key it references is
//!   rebuilt anywhere in the run
//!
//! Dialects whose indexes are coupled to foreign keys get one merged
//! `ALTER TABLE` per table for index and foreign-key drops, and another
//! for the adds.

use std::collections::BTreeSet;

use tracing::debug;

use crate::catalog::{ResolvedConstraint, ResolvedTable};
use crate::dialect::{DialectAdapter, Feature};
use crate::error::Result;
use crate::model::{eq_ci, ConstraintKind, TableKey};
use crate::stage::Stage;

use super::indexes::{self, IndexDiff, IndexDiffer};
use super::{DiffContext, StageWriter};

/// Constraints of one kind to drop and to add for one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstraintDiff<'c> {
    /// Constraints of the old table that go away or change.
    pub to_drop: Vec<&'c ResolvedConstraint>,
    /// Constraints of the new table that are new or changed.
    pub to_add: Vec<&'c ResolvedConstraint>,
}

impl ConstraintDiff<'_> {
    /// Returns whether nothing changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_drop.is_empty() && self.to_add.is_empty()
    }
}

/// Compares the constraints of two versions of a table.
///
/// Constraints match by name (case-insensitive). A match with an identical
/// rendered definition is a no-op; anything else is a drop, an add, or
/// both.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstraintDiffer<'s> {
    rebuilt_primary_keys: Option<&'s BTreeSet<TableKey>>,
}

impl<'s> ConstraintDiffer<'s> {
    /// Creates a differ.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tables whose primary key is rebuilt in this run. Foreign keys
    /// referencing them are rebuilt too.
    #[must_use]
    pub fn with_rebuilt_primary_keys(mut self, tables: &'s BTreeSet<TableKey>) -> Self {
        self.rebuilt_primary_keys = Some(tables);
        self
    }

    fn forced(&self, constraint: &ResolvedConstraint) -> bool {
        constraint.kind == ConstraintKind::ForeignKey
            && constraint
                .references
                .as_ref()
                .is_some_and(|r| self.rebuilt_primary_keys.is_some_and(|set| set.contains(r)))
    }

    /// Diffs the constraints of `kind` between `old` (absent for a new
    /// table) and `new`.
    #[must_use]
    pub fn diff<'c>(
        &self,
        old: Option<&'c ResolvedTable<'_>>,
        new: &'c ResolvedTable<'_>,
        kind: ConstraintKind,
    ) -> ConstraintDiff<'c> {
        let old_constraints: Vec<&ResolvedConstraint> =
            old.map(|t| t.constraints_of(kind).collect()).unwrap_or_default();
        let new_constraints: Vec<&ResolvedConstraint> = new.constraints_of(kind).collect();

        let kept = |a: &ResolvedConstraint, b: &ResolvedConstraint| {
            eq_ci(&a.name, &b.name) && a.same_definition(b)
        };

        ConstraintDiff {
            to_drop: old_constraints
                .iter()
                .copied()
                .filter(|o| {
                    !new_constraints
                        .iter()
                        .any(|n| kept(o, n) && !self.forced(n))
                })
                .collect(),
            to_add: new_constraints
                .iter()
                .copied()
                .filter(|n| {
                    (old.is_some() && self.forced(n))
                        || !old_constraints.iter().any(|o| kept(o, n))
                })
                .collect(),
        }
    }
}

/// Primary-key drop as one unit: strip the auto-increment flag, then drop.
pub(crate) fn primary_key_drop(
    dialect: &dyn DialectAdapter,
    table_ref: &str,
    primary_key: &ResolvedConstraint,
) -> Vec<String> {
    let mut statements = Vec::with_capacity(2);
    if let Some(ref column) = primary_key.auto_increment {
        statements.extend(dialect.strip_auto_increment(table_ref, column));
    }
    statements.push(dialect.drop_constraint(table_ref, primary_key));
    statements
}

/// Primary-key add as one unit: add, then restore the auto-increment flag.
pub(crate) fn primary_key_add(
    dialect: &dyn DialectAdapter,
    table_ref: &str,
    primary_key: &ResolvedConstraint,
) -> Vec<String> {
    let mut statements = vec![dialect.add_constraint(table_ref, primary_key)];
    if let Some(ref column) = primary_key.auto_increment {
        statements.extend(dialect.restore_auto_increment(table_ref, column));
    }
    statements
}

// ================================================================
// Key plan
// ================================================================

struct TableKeys<'c, 'a> {
    old: Option<&'c ResolvedTable<'a>>,
    new: &'c ResolvedTable<'a>,
    primary: ConstraintDiff<'c>,
    foreign: ConstraintDiff<'c>,
    unique: ConstraintDiff<'c>,
    check: ConstraintDiff<'c>,
    indexes: IndexDiff<'c>,
}

/// Constraint and index changes of every processed table, in new order.
pub(crate) struct KeyPlan<'c, 'a> {
    tables: Vec<TableKeys<'c, 'a>>,
    /// Foreign keys of removed tables that reference a primary key or
    /// unique constraint dropped in stage 1.
    orphaned: Vec<(&'c ResolvedTable<'a>, &'c ResolvedConstraint)>,
    coupled: bool,
}

impl<'c, 'a> KeyPlan<'c, 'a> {
    pub(crate) fn build(ctx: &'c DiffContext<'_, 'a>) -> Self {
        let coupled = ctx.dialect.capabilities().indexes_coupled_to_foreign_keys;
        let pairs: Vec<(Option<&'c ResolvedTable<'a>>, &'c ResolvedTable<'a>)> = ctx
            .new
            .tables_in_order()
            .map(|new| (ctx.old_table(new), new))
            .collect();

        let rebuilt: BTreeSet<TableKey> = pairs
            .iter()
            .filter(|(old, new)| {
                old.is_some()
                    && !ConstraintDiffer::new()
                        .diff(*old, new, ConstraintKind::PrimaryKey)
                        .is_empty()
            })
            .map(|(_, new)| new.key.clone())
            .collect();
        let differ = ConstraintDiffer::new().with_rebuilt_primary_keys(&rebuilt);

        let tables: Vec<TableKeys<'c, 'a>> = pairs
            .into_iter()
            .map(|(old, new)| {
                let mut keys = TableKeys {
                    old,
                    new,
                    primary: differ.diff(old, new, ConstraintKind::PrimaryKey),
                    foreign: differ.diff(old, new, ConstraintKind::ForeignKey),
                    unique: differ.diff(old, new, ConstraintKind::Unique),
                    check: differ.diff(old, new, ConstraintKind::Check),
                    indexes: IndexDiffer::diff(old, new),
                };
                if coupled {
                    rebuild_on_index_change(&mut keys);
                }
                if !keys.primary.is_empty() || !keys.foreign.is_empty() || !keys.indexes.is_empty() {
                    debug!(
                        table = %new.key,
                        primary = keys.primary.to_add.len(),
                        foreign_drops = keys.foreign.to_drop.len(),
                        foreign_adds = keys.foreign.to_add.len(),
                        index_drops = keys.indexes.to_drop.len(),
                        index_adds = keys.indexes.to_add.len(),
                        "Planned key changes"
                    );
                }
                keys
            })
            .collect();

        let weakened: BTreeSet<&TableKey> = tables
            .iter()
            .filter(|t| !t.primary.to_drop.is_empty() || !t.unique.to_drop.is_empty())
            .filter_map(|t| t.old.map(|old| &old.key))
            .collect();
        let orphaned = ctx
            .old
            .tables_in_order()
            .filter(|t| !ctx.survives(t))
            .flat_map(|t| {
                t.constraints_of(ConstraintKind::ForeignKey)
                    .filter(|fk| fk.references.as_ref().is_some_and(|r| weakened.contains(r)))
                    .map(move |fk| (t, fk))
            })
            .collect();

        Self {
            tables,
            orphaned,
            coupled,
        }
    }

    /// Tables (new keys) whose primary key is dropped in stage 1 and added
    /// back later.
    pub(crate) fn unkeyed_tables(&self) -> BTreeSet<TableKey> {
        self.tables
            .iter()
            .filter(|t| !t.primary.to_drop.is_empty())
            .map(|t| t.new.key.clone())
            .collect()
    }

    /// Stage 1 removals: foreign keys (including those of removed tables
    /// that stand in the way), unique and check constraints, indexes,
    /// then primary keys.
    pub(crate) fn emit_drops(&self, ctx: &DiffContext<'_, '_>, out: &mut StageWriter) {
        let dialect = ctx.dialect;
        let surviving = || {
            self.tables
                .iter()
                .filter_map(|t| t.old.map(|old| (t, old, ctx.table_ref(old))))
        };

        for (keys, _, table_ref) in surviving() {
            if self.coupled {
                let clauses: Vec<String> = keys
                    .foreign
                    .to_drop
                    .iter()
                    .map(|fk| dialect.drop_constraint_clause(fk))
                    .chain(keys.indexes.to_drop.iter().map(|i| dialect.drop_index_clause(i)))
                    .collect();
                if !clauses.is_empty() {
                    out.emit(Stage::Stage1, dialect.alter_table(&table_ref, &clauses));
                }
            } else {
                for fk in &keys.foreign.to_drop {
                    out.emit(Stage::Stage1, dialect.drop_constraint(&table_ref, fk));
                }
            }
        }

        for (table, fk) in &self.orphaned {
            debug!(table = %table.key, constraint = %fk.name, "Dropping foreign key of removed table early");
            out.emit(Stage::Stage1, dialect.drop_constraint(&ctx.table_ref(table), fk));
        }

        let checks = dialect.capabilities().check_constraints;
        for (keys, _, table_ref) in surviving() {
            for constraint in &keys.unique.to_drop {
                out.emit(Stage::Stage1, dialect.drop_constraint(&table_ref, constraint));
            }
            if checks {
                for constraint in &keys.check.to_drop {
                    out.emit(Stage::Stage1, dialect.drop_constraint(&table_ref, constraint));
                }
            }
        }

        if !self.coupled {
            for (keys, old, table_ref) in surviving() {
                for index in &keys.indexes.to_drop {
                    out.emit(
                        Stage::Stage1,
                        dialect.drop_index(old.schema_name(), &table_ref, index),
                    );
                }
            }
        }

        for (keys, _, table_ref) in surviving() {
            for primary_key in &keys.primary.to_drop {
                out.emit_all(
                    Stage::Stage1,
                    primary_key_drop(dialect, &table_ref, primary_key),
                );
            }
        }
    }

    /// Primary keys of every table.
    pub(crate) fn emit_primary_keys(&self, ctx: &DiffContext<'_, '_>, out: &mut StageWriter) {
        for keys in &self.tables {
            let table_ref = ctx.table_ref(keys.new);
            for primary_key in &keys.primary.to_add {
                out.emit_all(
                    Stage::Stage1,
                    primary_key_add(ctx.dialect, &table_ref, primary_key),
                );
            }
        }
    }

    /// Unique and check constraints.
    pub(crate) fn emit_unique_and_check(
        &self,
        ctx: &DiffContext<'_, '_>,
        out: &mut StageWriter,
    ) -> Result<()> {
        let dialect = ctx.dialect;
        let checks = dialect.capabilities().check_constraints;
        for keys in &self.tables {
            let table_ref = ctx.table_ref(keys.new);
            for constraint in &keys.unique.to_add {
                out.emit(Stage::Stage1, dialect.add_constraint(&table_ref, constraint));
            }
            for constraint in &keys.check.to_add {
                if checks {
                    out.emit(Stage::Stage1, dialect.add_constraint(&table_ref, constraint));
                } else {
                    out.unsupported(
                        dialect,
                        Stage::Stage1,
                        Feature::CheckConstraint,
                        &format!("{}.{}", keys.new.key, constraint.name),
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Standalone index creation; coupled dialects add indexes together
    /// with foreign keys instead.
    pub(crate) fn emit_indexes(&self, ctx: &DiffContext<'_, '_>, out: &mut StageWriter) -> Result<()> {
        if self.coupled {
            return Ok(());
        }
        for keys in &self.tables {
            let table_ref = ctx.table_ref(keys.new);
            for index in &keys.indexes.to_add {
                let index = indexes::for_dialect(ctx.dialect, out, keys.new, index)?;
                out.emit(
                    Stage::Stage1,
                    ctx.dialect
                        .create_index(keys.new.schema_name(), &table_ref, &index),
                );
            }
        }
        Ok(())
    }

    /// Foreign keys, then the deferred ones that close dependency cycles.
    pub(crate) fn emit_foreign_keys(
        &self,
        ctx: &DiffContext<'_, '_>,
        out: &mut StageWriter,
    ) -> Result<()> {
        let dialect = ctx.dialect;
        let deferred = |keys: &TableKeys<'_, '_>, fk: &ResolvedConstraint| {
            ctx.new.order.is_deferred(&keys.new.key, &fk.name)
        };

        for keys in &self.tables {
            let table_ref = ctx.table_ref(keys.new);
            if self.coupled {
                let mut clauses = Vec::new();
                for index in &keys.indexes.to_add {
                    let index = indexes::for_dialect(dialect, out, keys.new, index)?;
                    clauses.push(dialect.add_index_clause(&index));
                }
                clauses.extend(
                    keys.foreign
                        .to_add
                        .iter()
                        .filter(|fk| !deferred(keys, fk))
                        .map(|fk| dialect.add_constraint_clause(fk)),
                );
                if !clauses.is_empty() {
                    out.emit(Stage::Stage1, dialect.alter_table(&table_ref, &clauses));
                }
            } else {
                for fk in keys.foreign.to_add.iter().filter(|fk| !deferred(keys, fk)) {
                    out.emit(Stage::Stage1, dialect.add_constraint(&table_ref, fk));
                }
            }
        }

        for keys in &self.tables {
            let table_ref = ctx.table_ref(keys.new);
            for fk in keys.foreign.to_add.iter().filter(|fk| deferred(keys, fk)) {
                debug!(table = %keys.new.key, constraint = %fk.name, "Adding deferred foreign key");
                out.emit(Stage::Stage1, dialect.add_constraint(&table_ref, fk));
            }
        }
        Ok(())
    }
}

/// On coupled dialects a foreign key cannot outlive the index that backs
/// it: when that index is dropped, the foreign key is rebuilt around it.
fn rebuild_on_index_change(keys: &mut TableKeys<'_, '_>) {
    let Some(old) = keys.old else {
        return;
    };
    for fk in old.constraints_of(ConstraintKind::ForeignKey) {
        let Some(leading) = fk.leading_column() else {
            continue;
        };
        if !keys.indexes.drops_leading(leading)
            || keys.foreign.to_drop.iter().any(|d| eq_ci(&d.name, &fk.name))
        {
            continue;
        }
        let Some(new_fk) = keys
            .new
            .constraints_of(ConstraintKind::ForeignKey)
            .find(|n| eq_ci(&n.name, &fk.name))
        else {
            continue;
        };
        keys.foreign.to_drop.push(fk);
        if !keys.foreign.to_add.iter().any(|a| eq_ci(&a.name, &new_fk.name)) {
            keys.foreign.to_add.push(new_fk);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::dialect::{MySqlDialect, PostgresDialect};
    use crate::model::{Column, Constraint, DefinitionTree, Schema, Table};

    fn tree(tables: Vec<Table>) -> DefinitionTree {
        let mut schema = Schema::new("app");
        schema.tables = tables;
        DefinitionTree::new().with_schema(schema)
    }

    fn parent(pk: &[&str]) -> Table {
        Table::new("parent")
            .with_column(Column::new("id", "int"))
            .with_column(Column::new("code", "text"))
            .with_primary_key(pk)
    }

    fn child() -> Table {
        Table::new("child")
            .with_column(Column::new("id", "int"))
            .with_column(Column::foreign("parent_id", "app", "parent", "id"))
            .with_primary_key(&["id"])
    }

    fn names(constraints: &[&ResolvedConstraint]) -> Vec<String> {
        constraints.iter().map(|c| c.name.clone()).collect()
    }

    #[test]
    fn unchanged_constraints_are_no_ops() {
        let t = tree(vec![parent(&["id"]), child()]);
        let catalog = Catalog::build(&t, &PostgresDialect::new(), None).unwrap();
        let child = catalog.table(&TableKey::new("app", "child")).unwrap();
        for kind in [
            ConstraintKind::PrimaryKey,
            ConstraintKind::ForeignKey,
            ConstraintKind::Unique,
            ConstraintKind::Check,
        ] {
            assert!(ConstraintDiffer::new().diff(Some(child), child, kind).is_empty());
        }
    }

    #[test]
    fn changed_definition_drops_and_adds() {
        let old = tree(vec![parent(&["id"])
            .with_constraint(Constraint::new("uq", ConstraintKind::Unique, "(code)"))
            .with_constraint(Constraint::new("gone", ConstraintKind::Check, "(id > 0)"))]);
        let new = tree(vec![parent(&["id"])
            .with_constraint(Constraint::new("UQ", ConstraintKind::Unique, "(code, id)"))
            .with_constraint(Constraint::new("fresh", ConstraintKind::Unique, "(id, code)"))]);
        let dialect = PostgresDialect::new();
        let old = Catalog::build(&old, &dialect, None).unwrap();
        let new = Catalog::build(&new, &dialect, None).unwrap();
        let key = TableKey::new("app", "parent");
        let (old, new) = (old.table(&key), new.table(&key).unwrap());

        let unique = ConstraintDiffer::new().diff(old, new, ConstraintKind::Unique);
        assert_eq!(names(&unique.to_drop), vec!["uq"]);
        assert_eq!(names(&unique.to_add), vec!["UQ", "fresh"]);

        let check = ConstraintDiffer::new().diff(old, new, ConstraintKind::Check);
        assert_eq!(names(&check.to_drop), vec!["gone"]);
        assert!(check.to_add.is_empty());
    }

    #[test]
    fn new_table_adds_all() {
        let t = tree(vec![parent(&["id"]), child()]);
        let catalog = Catalog::build(&t, &PostgresDialect::new(), None).unwrap();
        let child = catalog.table(&TableKey::new("app", "child")).unwrap();
        let fks = ConstraintDiffer::new().diff(None, child, ConstraintKind::ForeignKey);
        assert_eq!(names(&fks.to_add), vec!["child_parent_id_fkey"]);
        assert!(fks.to_drop.is_empty());
    }

    #[test]
    fn rebuilt_primary_key_forces_referencing_foreign_keys() {
        let t = tree(vec![parent(&["id"]), child()]);
        let catalog = Catalog::build(&t, &PostgresDialect::new(), None).unwrap();
        let child = catalog.table(&TableKey::new("app", "child")).unwrap();

        let rebuilt: BTreeSet<TableKey> = [TableKey::new("app", "parent")].into_iter().collect();
        let fks = ConstraintDiffer::new()
            .with_rebuilt_primary_keys(&rebuilt)
            .diff(Some(child), child, ConstraintKind::ForeignKey);
        assert_eq!(names(&fks.to_drop), vec!["child_parent_id_fkey"]);
        assert_eq!(names(&fks.to_add), vec!["child_parent_id_fkey"]);

        let pks = ConstraintDiffer::new()
            .with_rebuilt_primary_keys(&rebuilt)
            .diff(Some(child), child, ConstraintKind::PrimaryKey);
        assert!(pks.is_empty());
    }

    #[test]
    fn auto_increment_strip_precedes_drop() {
        let t = tree(vec![Table::new("t")
            .with_column(Column::new("id", "serial"))
            .with_primary_key(&["id"])]);
        let dialect = MySqlDialect::new();
        let catalog = Catalog::build(&t, &dialect, None).unwrap();
        let pk = catalog
            .table(&TableKey::new("app", "t"))
            .unwrap()
            .primary_key()
            .unwrap();

        let drop = primary_key_drop(&dialect, "`t`", pk);
        assert_eq!(drop.len(), 2);
        assert!(drop[0].contains("MODIFY COLUMN"), "{}", drop[0]);
        assert!(!drop[0].contains("AUTO_INCREMENT"), "{}", drop[0]);
        assert!(drop[1].contains("DROP PRIMARY KEY"), "{}", drop[1]);

        let add = primary_key_add(&dialect, "`t`", pk);
        assert!(add[0].contains("ADD PRIMARY KEY"), "{}", add[0]);
        assert!(add[1].ends_with("AUTO_INCREMENT"), "{}", add[1]);
    }

    #[test]
    fn primary_key_unit_is_plain_without_auto_increment() {
        let t = tree(vec![parent(&["id"])]);
        let dialect = PostgresDialect::new();
        let catalog = Catalog::build(&t, &dialect, None).unwrap();
        let pk = catalog
            .table(&TableKey::new("app", "parent"))
            .unwrap()
            .primary_key()
            .unwrap();
        assert_eq!(
            primary_key_drop(&dialect, "app.parent", pk),
            vec!["ALTER TABLE app.parent DROP CONSTRAINT parent_pkey"]
        );
    }
}
