//! Data row differ.
//!
//! Rows of the old and new row sets are matched by their primary-key
//! values. Stage 2 receives the inserts and updates, stage 4 the deletes.

use std::collections::BTreeMap;

use tracing::debug;

use crate::catalog::{ResolvedColumn, ResolvedTable};
use crate::dialect::DialectAdapter;
use crate::error::{Result, StewardError};
use crate::model::{eq_ci, Cell, Row, RowSet};

/// Statements reconciling the rows of one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowChanges {
    /// INSERT and UPDATE statements, in new row order.
    pub upserts: Vec<String>,
    /// DELETE statements, in old row order.
    pub deletes: Vec<String>,
    /// Number of inserted rows.
    pub inserted: usize,
    /// Number of updated rows.
    pub updated: usize,
    /// Sequence correction to run after the inserts.
    pub serial_reset: Option<String>,
}

impl RowChanges {
    /// Returns whether nothing changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }
}

/// Compares the inline rows of two versions of a table.
#[derive(Clone, Copy)]
pub struct DataRowDiffer<'d> {
    dialect: &'d dyn DialectAdapter,
}

impl<'d> DataRowDiffer<'d> {
    /// Creates a differ rendering for `dialect`.
    #[must_use]
    pub fn new(dialect: &'d dyn DialectAdapter) -> Self {
        Self { dialect }
    }

    /// Row statements for one stage: deletes when `delete_mode` is set,
    /// otherwise the inserts and updates followed by any sequence reset.
    pub fn diff(
        &self,
        old: Option<&ResolvedTable<'_>>,
        new: &ResolvedTable<'_>,
        delete_mode: bool,
    ) -> Result<Vec<String>> {
        let changes = self.changes(old, new)?;
        if delete_mode {
            return Ok(changes.deletes);
        }
        let mut statements = changes.upserts;
        statements.extend(changes.serial_reset);
        Ok(statements)
    }

    /// All row changes of `new` against `old` (absent for a new table).
    pub fn changes(
        &self,
        old: Option<&ResolvedTable<'_>>,
        new: &ResolvedTable<'_>,
    ) -> Result<RowChanges> {
        let empty = RowSet::default();
        let new_set = new.rows().unwrap_or(&empty);
        let old_set = old.and_then(ResolvedTable::rows).unwrap_or(&empty);
        if new_set.rows.is_empty() && old_set.rows.is_empty() {
            return Ok(RowChanges::default());
        }

        let columns = RowColumns::resolve(new, new_set, old_set)?;
        let table_ref = self.dialect.table_ref(new.schema_name(), new.name());

        let old_rows = self.index_rows(new, old_set, &columns, Side::Old)?;
        let new_rows = self.index_rows(new, new_set, &columns, Side::New)?;

        let mut changes = RowChanges::default();
        for (key, row) in &new_rows.ordered {
            if row.delete {
                continue;
            }
            match old_rows.live(key) {
                Some(old_row) => {
                    if let Some(sql) = self.update(&table_ref, &columns, key, old_row, row, new_set) {
                        changes.upserts.push(sql);
                        changes.updated += 1;
                    }
                }
                None => {
                    changes.upserts.push(self.insert(&table_ref, &columns, row, new_set));
                    changes.inserted += 1;
                }
            }
        }

        for (key, row) in &old_rows.ordered {
            if row.delete || new_rows.live(key).is_some() {
                continue;
            }
            changes
                .deletes
                .push(self.dialect.delete(&table_ref, &columns.key_pairs(key)));
        }

        if changes.inserted > 0 {
            changes.serial_reset = self.serial_reset(new, &columns);
        }
        if !changes.is_empty() {
            debug!(
                table = %new.key,
                inserted = changes.inserted,
                updated = changes.updated,
                deleted = changes.deletes.len(),
                "Reconciled data rows"
            );
        }
        Ok(changes)
    }

    fn index_rows<'r>(
        &self,
        table: &ResolvedTable<'_>,
        set: &'r RowSet,
        columns: &RowColumns<'_>,
        side: Side,
    ) -> Result<KeyedRows<'r>> {
        let mut keyed = KeyedRows::default();
        for (i, row) in set.rows.iter().enumerate() {
            let key: Vec<String> = columns
                .key
                .iter()
                .map(|k| {
                    let position = match side {
                        Side::Old => k.old_position,
                        Side::New => Some(k.new_position),
                    };
                    position
                        .and_then(|p| row.cells.get(p))
                        .map_or_else(|| "NULL".to_string(), |cell| self.value(cell, k.column))
                })
                .collect();
            if keyed.positions.insert(key.clone(), i).is_some() {
                return Err(StewardError::table(
                    table.schema_name(),
                    table.name(),
                    format!(
                        "{} data rows repeat the key ({})",
                        side.label(),
                        key.join(", ")
                    ),
                ));
            }
            keyed.ordered.push((key, row));
        }
        Ok(keyed)
    }

    fn insert(&self, table_ref: &str, columns: &RowColumns<'_>, row: &Row, set: &RowSet) -> String {
        let names: Vec<String> = columns.all.iter().map(|c| c.column.name.clone()).collect();
        let values: Vec<String> = columns
            .all
            .iter()
            .map(|c| {
                row.cell(set, &c.declared)
                    .map_or_else(|| "NULL".to_string(), |cell| self.value(cell, c.column))
            })
            .collect();
        self.dialect.insert(table_ref, &names, &values)
    }

    fn update(
        &self,
        table_ref: &str,
        columns: &RowColumns<'_>,
        key: &[String],
        old_row: &Row,
        new_row: &Row,
        new_set: &RowSet,
    ) -> Option<String> {
        let mut assignments = Vec::new();
        let mut previous = Vec::new();
        for c in columns.all.iter().filter(|c| !c.is_key) {
            let Some(cell) = new_row.cell(new_set, &c.declared) else {
                continue;
            };
            let value = self.value(cell, c.column);
            let old_value = c
                .old_position
                .and_then(|p| old_row.cells.get(p))
                .map(|old_cell| self.value(old_cell, c.column));
            match old_value {
                Some(ref old_value) if *old_value == value => {}
                Some(old_value) => {
                    previous.push(format!("{} = {old_value}", c.column.name));
                    assignments.push((c.column.name.clone(), value));
                }
                None => assignments.push((c.column.name.clone(), value)),
            }
        }
        if assignments.is_empty() {
            return None;
        }
        let update = self
            .dialect
            .update(table_ref, &assignments, &columns.key_pairs(key));
        if previous.is_empty() {
            return Some(update);
        }
        let previous = previous.join(", ").replace('\r', "").replace('\n', "\\n");
        Some(format!("-- previous values: {previous}\n{update}"))
    }

    /// SQL value of one cell.
    fn value(&self, cell: &Cell, column: &ResolvedColumn) -> String {
        if cell.null {
            "NULL".to_string()
        } else if cell.empty {
            "''".to_string()
        } else if cell.sql {
            format!("({})", cell.value)
        } else if !cell.value.is_empty() {
            self.dialect.literal(&cell.value, &column.base_type)
        } else {
            column.default.as_deref().map_or_else(
                || "NULL".to_string(),
                |d| self.dialect.convert_default(d, &column.base_type),
            )
        }
    }

    fn serial_reset(&self, table: &ResolvedTable<'_>, columns: &RowColumns<'_>) -> Option<String> {
        let [key] = columns.key.as_slice() else {
            return None;
        };
        let pk_columns = table.primary_key().map(|pk| pk.columns.len()).unwrap_or(0);
        if pk_columns != 1 || !key.column.serial || key.column.serial_start.is_some() {
            return None;
        }
        self.dialect
            .serial_reset(table.schema_name(), table.name(), &key.column.name)
    }
}

#[derive(Clone, Copy)]
enum Side {
    Old,
    New,
}

impl Side {
    const fn label(self) -> &'static str {
        match self {
            Self::Old => "old",
            Self::New => "new",
        }
    }
}

#[derive(Default)]
struct KeyedRows<'r> {
    ordered: Vec<(Vec<String>, &'r Row)>,
    positions: BTreeMap<Vec<String>, usize>,
}

impl<'r> KeyedRows<'r> {
    /// Live row with `key`, ignoring tombstones.
    fn live(&self, key: &[String]) -> Option<&'r Row> {
        self.positions
            .get(key)
            .map(|&i| self.ordered[i].1)
            .filter(|row| !row.delete)
    }
}

#[derive(Clone)]
struct RowColumn<'c> {
    /// Name as written in the new row set.
    declared: String,
    column: &'c ResolvedColumn,
    new_position: usize,
    old_position: Option<usize>,
    is_key: bool,
}

/// The new row set's columns, aligned with the old row set.
struct RowColumns<'c> {
    all: Vec<RowColumn<'c>>,
    key: Vec<RowColumn<'c>>,
}

impl<'c> RowColumns<'c> {
    fn resolve(table: &'c ResolvedTable<'_>, new_set: &RowSet, old_set: &RowSet) -> Result<Self> {
        let primary_key: Vec<&str> = table
            .primary_key()
            .map(|pk| pk.columns.iter().map(String::as_str).collect())
            .unwrap_or_default();

        let build = |declared: &str, new_position: usize| -> Result<RowColumn<'c>> {
            let column = table.column(declared).ok_or_else(|| {
                StewardError::column(
                    table.schema_name(),
                    table.name(),
                    declared,
                    "data rows name a column that does not exist",
                )
            })?;
            let old_position = column
                .old_name
                .as_deref()
                .and_then(|old| old_set.position(old))
                .or_else(|| old_set.position(&column.name));
            Ok(RowColumn {
                declared: declared.to_string(),
                column,
                new_position,
                old_position,
                is_key: primary_key.iter().any(|k| eq_ci(k, &column.name)),
            })
        };

        let mut all = Vec::with_capacity(new_set.columns.len());
        let mut key = Vec::new();
        if new_set.columns.is_empty() {
            // No rows left: align the old row set with the surviving columns.
            for (i, declared) in old_set.columns.iter().enumerate() {
                let Some(column) = table.columns.iter().find(|c| {
                    c.old_name.as_deref().is_some_and(|old| eq_ci(old, declared))
                        || eq_ci(&c.name, declared)
                }) else {
                    continue;
                };
                let column = RowColumn {
                    declared: column.name.clone(),
                    column,
                    new_position: i,
                    old_position: Some(i),
                    is_key: primary_key.iter().any(|k| eq_ci(k, &column.name)),
                };
                if column.is_key {
                    key.push(column.clone());
                }
                all.push(column);
            }
        }
        for (i, declared) in new_set.columns.iter().enumerate() {
            let column = build(declared, i)?;
            if column.is_key {
                key.push(column.clone());
            }
            all.push(column);
        }

        if key.is_empty() {
            return Err(StewardError::table(
                table.schema_name(),
                table.name(),
                "data rows name none of the primary key columns",
            ));
        }
        if !old_set.rows.is_empty() {
            if let Some(missing) = key.iter().find(|k| k.old_position.is_none()) {
                return Err(StewardError::column(
                    table.schema_name(),
                    table.name(),
                    &missing.column.name,
                    "old data rows lack this primary key column",
                ));
            }
        }
        Ok(Self { all, key })
    }

    fn key_pairs(&self, key: &[String]) -> Vec<(String, String)> {
        self.key
            .iter()
            .zip(key)
            .map(|(c, v)| (c.column.name.clone(), v.clone()))
            .collect()
    }
}
