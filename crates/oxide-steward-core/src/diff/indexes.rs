//! Index differ.

use std::borrow::Cow;

use crate::catalog::{normalize_sql, ResolvedTable};
use crate::dialect::{DialectAdapter, Feature};
use crate::error::Result;
use crate::model::{eq_ci, Index};
use crate::stage::Stage;

use super::StageWriter;

/// Indexes to drop and to add for one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexDiff<'i> {
    /// Indexes of the old table that go away or change.
    pub to_drop: Vec<&'i Index>,
    /// Indexes of the new table that are new or changed.
    pub to_add: Vec<&'i Index>,
}

impl IndexDiff<'_> {
    /// Returns whether nothing changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_drop.is_empty() && self.to_add.is_empty()
    }

    /// Returns whether an index leading with `column` is dropped.
    #[must_use]
    pub fn drops_leading(&self, column: &str) -> bool {
        self.to_drop.iter().any(|i| i.leads_with(column))
    }
}

/// Compares the indexes of two versions of a table.
///
/// Indexes match by name (case-insensitive). A matched pair with a
/// different definition is dropped and re-added.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexDiffer;

impl IndexDiffer {
    /// Diffs `old` (absent for a new table) against `new`.
    #[must_use]
    pub fn diff<'i>(old: Option<&'i ResolvedTable<'_>>, new: &'i ResolvedTable<'_>) -> IndexDiff<'i> {
        let old_indexes: &[Index] = match old {
            Some(t) => &t.indexes,
            None => &[],
        };
        let unchanged = |a: &Index, others: &[Index]| {
            others
                .iter()
                .any(|b| eq_ci(&a.name, &b.name) && same_index(a, b))
        };
        IndexDiff {
            to_drop: old_indexes
                .iter()
                .filter(|&i| !unchanged(i, &new.indexes))
                .collect(),
            to_add: new
                .indexes
                .iter()
                .filter(|&i| !unchanged(i, old_indexes))
                .collect(),
        }
    }
}

/// Returns whether two indexes have the same definition.
#[must_use]
pub fn same_index(a: &Index, b: &Index) -> bool {
    let method = |i: &Index| i.using.as_deref().map(str::to_ascii_lowercase);
    a.unique == b.unique
        && method(a) == method(b)
        && a.dimensions.len() == b.dimensions.len()
        && a
            .dimensions
            .iter()
            .zip(&b.dimensions)
            .all(|(x, y)| eq_ci(&normalize_sql(x), &normalize_sql(y)))
}

/// The index as the dialect can build it. An unsupported storage method is
/// dropped according to the dialect's policy.
pub(crate) fn for_dialect<'i>(
    dialect: &dyn DialectAdapter,
    out: &mut StageWriter,
    table: &ResolvedTable<'_>,
    index: &'i Index,
) -> Result<Cow<'i, Index>> {
    match index.using {
        Some(ref method) if !dialect.supports_index_method(method) => {
            out.unsupported(
                dialect,
                Stage::Stage1,
                Feature::IndexMethod,
                &format!("{}.{} USING {method}", table.key, index.name),
            )?;
            Ok(Cow::Owned(Index {
                using: None,
                ..index.clone()
            }))
        }
        _ => Ok(Cow::Borrowed(index)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::dialect::{MySqlDialect, PostgresDialect};
    use crate::model::{Column, DefinitionTree, Schema, Table, TableKey};

    fn table(indexes: Vec<Index>) -> DefinitionTree {
        let mut t = Table::new("t")
            .with_column(Column::new("id", "int"))
            .with_column(Column::new("a", "text"))
            .with_column(Column::new("b", "text"))
            .with_primary_key(&["id"]);
        t.indexes = indexes;
        DefinitionTree::new().with_schema(Schema::new("app").with_table(t))
    }

    fn names(indexes: &[&Index]) -> Vec<String> {
        indexes.iter().map(|i| i.name.clone()).collect()
    }

    #[test]
    fn match_by_name_and_definition() {
        let old = table(vec![
            Index::new("keep", &["a"]),
            Index::new("change", &["a"]),
            Index::new("gone", &["b"]),
        ]);
        let new = table(vec![
            Index::new("KEEP", &[" a "]),
            Index::new("change", &["a", "b"]),
            Index::new("fresh", &["b"]),
        ]);
        let dialect = PostgresDialect::new();
        let old = Catalog::build(&old, &dialect, None).unwrap();
        let new = Catalog::build(&new, &dialect, None).unwrap();
        let key = TableKey::new("app", "t");

        let diff = IndexDiffer::diff(old.table(&key), new.table(&key).unwrap());
        assert_eq!(names(&diff.to_drop), vec!["change", "gone"]);
        assert_eq!(names(&diff.to_add), vec!["change", "fresh"]);
    }

    #[test]
    fn new_table_adds_everything() {
        let new = table(vec![Index::new("ix", &["a"]).unique()]);
        let new = Catalog::build(&new, &PostgresDialect::new(), None).unwrap();
        let diff = IndexDiffer::diff(None, new.table(&TableKey::new("app", "t")).unwrap());
        assert!(diff.to_drop.is_empty());
        assert_eq!(names(&diff.to_add), vec!["ix"]);
    }

    #[test]
    fn identical_tables_have_no_changes() {
        let tree = table(vec![Index::new("ix", &["lower(a)"])]);
        let catalog = Catalog::build(&tree, &PostgresDialect::new(), None).unwrap();
        let t = catalog.table(&TableKey::new("app", "t")).unwrap();
        assert!(IndexDiffer::diff(Some(t), t).is_empty());
    }

    #[test]
    fn method_and_uniqueness_matter() {
        let mut gin = Index::new("ix", &["a"]);
        gin.using = Some("GIN".into());
        let mut gin_lower = gin.clone();
        gin_lower.using = Some("gin".into());
        assert!(same_index(&gin, &gin_lower));
        assert!(!same_index(&gin, &Index::new("ix", &["a"])));
        assert!(!same_index(&Index::new("ix", &["a"]), &Index::new("ix", &["a"]).unique()));
    }

    #[test]
    fn unsupported_method_is_dropped_with_warning() {
        let mut gin = Index::new("ix", &["a"]);
        gin.using = Some("gin".into());
        let tree = table(vec![gin.clone()]);
        let dialect = MySqlDialect::new();
        let catalog = Catalog::build(&tree, &dialect, None).unwrap();
        let t = catalog.table(&TableKey::new("app", "t")).unwrap();

        let mut out = StageWriter::new("mysql5", None, false);
        let adapted = for_dialect(&dialect, &mut out, t, &gin).unwrap();
        assert!(adapted.using.is_none());
        assert_eq!(out.finish().1.len(), 1);
    }
}
