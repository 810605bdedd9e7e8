//! Dependency ordering of tables.
//!
//! Tables are ordered so that every table appears after the tables its
//! foreign keys reference and after its inheritance parent. The sort is a
//! depth-first traversal seeded in document order, so the result is stable
//! for a given definition. A foreign key that closes a cycle is dropped from
//! the ordering and recorded as deferred: it is created after every other
//! foreign key. Inheritance edges cannot be deferred.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::config::TableFilter;
use crate::error::{Result, StewardError};
use crate::model::{ConstraintKind, DefinitionTree, Schema, Table, TableKey};

/// A table together with its schema.
#[derive(Debug, Clone, Copy)]
pub struct TableRef<'a> {
    /// Owning schema.
    pub schema: &'a Schema,
    /// The table.
    pub table: &'a Table,
}

impl TableRef<'_> {
    /// Case-insensitive identity.
    #[must_use]
    pub fn key(&self) -> TableKey {
        TableKey::new(&self.schema.name, &self.table.name)
    }
}

/// One entry of a table order.
#[derive(Debug, Clone)]
pub enum DependencyNode<'a> {
    /// A table the run processes.
    Real(TableRef<'a>),
    /// A table outside the run's table filter. It takes part in ordering
    /// and cycle detection, but nothing is emitted for it.
    Placeholder(TableKey),
}

impl<'a> DependencyNode<'a> {
    /// The table, unless this is a placeholder.
    #[must_use]
    pub const fn real(&self) -> Option<TableRef<'a>> {
        match *self {
            Self::Real(table) => Some(table),
            Self::Placeholder(_) => None,
        }
    }

    /// Returns whether this is a placeholder.
    #[must_use]
    pub const fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder(_))
    }
}

/// A foreign key removed from the ordering graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredForeignKey {
    /// Table that owns the constraint.
    pub table: TableKey,
    /// Constraint name.
    pub constraint: String,
    /// Referenced table.
    pub references: TableKey,
}

/// Result of ordering one definition tree.
#[derive(Debug, Clone, Default)]
pub struct TableOrder<'a> {
    /// Nodes, dependencies first.
    pub nodes: Vec<DependencyNode<'a>>,
    /// Cycle-closing foreign keys, in the order they were deferred.
    pub deferred: Vec<DeferredForeignKey>,
}

impl<'a> TableOrder<'a> {
    /// Processed tables, dependencies first.
    pub fn tables(&self) -> impl DoubleEndedIterator<Item = TableRef<'a>> + '_ {
        self.nodes.iter().filter_map(DependencyNode::real)
    }

    /// Returns whether the constraint `name` of `table` is deferred.
    #[must_use]
    pub fn is_deferred(&self, table: &TableKey, name: &str) -> bool {
        self.deferred
            .iter()
            .any(|d| &d.table == table && d.constraint.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

#[derive(Debug)]
enum EdgeKind {
    Inheritance,
    ForeignKey(String),
}

#[derive(Debug)]
struct Edge {
    target: TableKey,
    kind: EdgeKind,
}

/// Orders the tables of one definition tree.
#[derive(Debug)]
pub struct DependencyOrderer<'a> {
    tree: &'a DefinitionTree,
    follow_inheritance: bool,
    filter: Option<&'a TableFilter>,
}

impl<'a> DependencyOrderer<'a> {
    /// Creates an orderer that follows inheritance edges.
    #[must_use]
    pub const fn new(tree: &'a DefinitionTree) -> Self {
        Self {
            tree,
            follow_inheritance: true,
            filter: None,
        }
    }

    /// Whether inheritance is a dependency edge. Dialects that flatten
    /// inheritance do not need the parent to exist first.
    #[must_use]
    pub const fn follow_inheritance(mut self, follow: bool) -> Self {
        self.follow_inheritance = follow;
        self
    }

    /// Turns tables outside `filter` into placeholders.
    #[must_use]
    pub const fn with_filter(mut self, filter: Option<&'a TableFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Computes the order.
    pub fn order(&self) -> Result<TableOrder<'a>> {
        let mut lookup: BTreeMap<TableKey, TableRef<'a>> = BTreeMap::new();
        let mut seeds = Vec::new();
        for schema in &self.tree.schemas {
            for table in &schema.tables {
                let table_ref = TableRef { schema, table };
                let key = table_ref.key();
                if lookup.insert(key.clone(), table_ref).is_some() {
                    return Err(StewardError::table(
                        &schema.name,
                        &table.name,
                        "table is declared more than once",
                    ));
                }
                seeds.push(key);
            }
        }

        let mut walk = Walk {
            orderer: self,
            lookup: &lookup,
            marks: HashMap::new(),
            order: TableOrder::default(),
        };
        for key in &seeds {
            if !walk.marks.contains_key(key) {
                walk.visit(key)?;
            }
        }

        debug!(
            tables = walk.order.nodes.len(),
            deferred = walk.order.deferred.len(),
            "Ordered tables"
        );
        Ok(walk.order)
    }

    fn edges(&self, table_ref: TableRef<'a>) -> Result<Vec<Edge>> {
        let schema = table_ref.schema.name.as_str();
        let table = table_ref.table;
        let mut edges = Vec::new();

        if self.follow_inheritance {
            if let Some((parent_schema, parent)) = table.inherits(schema) {
                edges.push(Edge {
                    target: TableKey::new(parent_schema, parent),
                    kind: EdgeKind::Inheritance,
                });
            }
        }

        for column in &table.columns {
            if let Some((ref_schema, ref_table)) = column.foreign_target(schema) {
                edges.push(Edge {
                    target: TableKey::new(ref_schema, ref_table),
                    kind: EdgeKind::ForeignKey(column.foreign_key_constraint_name(&table.name)),
                });
            }
        }

        for constraint in &table.constraints {
            if constraint.kind != ConstraintKind::ForeignKey {
                continue;
            }
            let Some((ref_schema, ref_table)) = constraint.foreign_target(schema) else {
                return Err(StewardError::table(
                    schema,
                    &table.name,
                    format!(
                        "foreign key constraint '{}' does not name its referenced table",
                        constraint.name
                    ),
                ));
            };
            edges.push(Edge {
                target: TableKey::new(ref_schema, ref_table),
                kind: EdgeKind::ForeignKey(constraint.name.clone()),
            });
        }

        Ok(edges)
    }
}

struct Walk<'o, 'a> {
    orderer: &'o DependencyOrderer<'a>,
    lookup: &'o BTreeMap<TableKey, TableRef<'a>>,
    marks: HashMap<TableKey, Mark>,
    order: TableOrder<'a>,
}

impl<'a> Walk<'_, 'a> {
    fn visit(&mut self, key: &TableKey) -> Result<()> {
        let Some(&table_ref) = self.lookup.get(key) else {
            return Ok(());
        };
        self.marks.insert(key.clone(), Mark::Visiting);

        for edge in self.orderer.edges(table_ref)? {
            if !self.lookup.contains_key(&edge.target) {
                let what = match edge.kind {
                    EdgeKind::Inheritance => "inherits from".to_string(),
                    EdgeKind::ForeignKey(ref name) => format!("foreign key '{name}' references"),
                };
                return Err(StewardError::table(
                    &table_ref.schema.name,
                    &table_ref.table.name,
                    format!("{what} missing table {}", edge.target),
                ));
            }

            if &edge.target == key {
                match edge.kind {
                    EdgeKind::Inheritance => {
                        return Err(StewardError::ordering(format!(
                            "table {key} inherits from itself"
                        )));
                    }
                    // Satisfied by the table's own creation.
                    EdgeKind::ForeignKey(_) => {}
                }
                continue;
            }

            match self.marks.get(&edge.target).copied() {
                Some(Mark::Done) => {}
                Some(Mark::Visiting) => match edge.kind {
                    EdgeKind::Inheritance => {
                        return Err(StewardError::ordering(format!(
                            "inheritance cycle through {key} and {}",
                            edge.target
                        )));
                    }
                    EdgeKind::ForeignKey(constraint) => {
                        debug!(
                            table = %key,
                            constraint = %constraint,
                            references = %edge.target,
                            "Deferring cycle-closing foreign key"
                        );
                        self.order.deferred.push(DeferredForeignKey {
                            table: key.clone(),
                            constraint,
                            references: edge.target,
                        });
                    }
                },
                None => self.visit(&edge.target)?,
            }
        }

        self.marks.insert(key.clone(), Mark::Done);
        let included = self.orderer.filter.map_or(true, |f| f.contains(key));
        self.order.nodes.push(if included {
            DependencyNode::Real(table_ref)
        } else {
            DependencyNode::Placeholder(key.clone())
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Column, Constraint};

    fn table(name: &str) -> Table {
        Table::new(name)
            .with_column(Column::new("id", "integer"))
            .with_primary_key(&["id"])
    }

    fn fk(table: Table, column: &str, target: &str) -> Table {
        table.with_column(Column::foreign(column, "app", target, "id"))
    }

    fn names(order: &TableOrder<'_>) -> Vec<String> {
        order
            .nodes
            .iter()
            .map(|n| match n {
                DependencyNode::Real(t) => t.table.name.clone(),
                DependencyNode::Placeholder(k) => format!("?{}", k.table()),
            })
            .collect()
    }

    #[test]
    fn referenced_tables_come_first() {
        let tree = DefinitionTree::new().with_schema(
            Schema::new("app")
                .with_table(fk(table("orders"), "customer_id", "customers"))
                .with_table(table("customers")),
        );
        let order = DependencyOrderer::new(&tree).order().unwrap();
        assert_eq!(names(&order), vec!["customers", "orders"]);
        assert!(order.deferred.is_empty());
    }

    #[test]
    fn document_order_is_kept_without_edges() {
        let tree = DefinitionTree::new().with_schema(
            Schema::new("app")
                .with_table(table("b"))
                .with_table(table("a"))
                .with_table(table("c")),
        );
        let order = DependencyOrderer::new(&tree).order().unwrap();
        assert_eq!(names(&order), vec!["b", "a", "c"]);
    }

    #[test]
    fn cycle_defers_closing_foreign_key() {
        let tree = DefinitionTree::new().with_schema(
            Schema::new("app")
                .with_table(fk(table("a"), "b_id", "b"))
                .with_table(fk(table("b"), "a_id", "a")),
        );
        let order = DependencyOrderer::new(&tree).order().unwrap();
        assert_eq!(names(&order), vec!["b", "a"]);
        assert_eq!(order.deferred.len(), 1);
        let deferred = &order.deferred[0];
        assert_eq!(deferred.table, TableKey::new("app", "b"));
        assert_eq!(deferred.constraint, "b_a_id_fkey");
        assert!(order.is_deferred(&TableKey::new("app", "b"), "B_A_ID_FKEY"));
    }

    #[test]
    fn self_reference_is_not_deferred() {
        let tree = DefinitionTree::new()
            .with_schema(Schema::new("app").with_table(fk(table("node"), "parent_id", "node")));
        let order = DependencyOrderer::new(&tree).order().unwrap();
        assert_eq!(names(&order), vec!["node"]);
        assert!(order.deferred.is_empty());
    }

    #[test]
    fn inheritance_cycle_is_an_error() {
        let mut a = table("a");
        a.inherits_table = Some("b".into());
        let mut b = table("b");
        b.inherits_table = Some("a".into());
        let tree = DefinitionTree::new().with_schema(Schema::new("app").with_table(a).with_table(b));

        let err = DependencyOrderer::new(&tree).order().unwrap_err();
        assert!(matches!(err, StewardError::Ordering(_)));

        // Flattening dialects do not order by inheritance.
        assert!(DependencyOrderer::new(&tree)
            .follow_inheritance(false)
            .order()
            .is_ok());
    }

    #[test]
    fn missing_target_is_a_definition_error() {
        let tree = DefinitionTree::new()
            .with_schema(Schema::new("app").with_table(fk(table("orders"), "x_id", "nowhere")));
        let err = DependencyOrderer::new(&tree).order().unwrap_err();
        match err {
            StewardError::Definition { message, .. } => {
                assert!(message.contains("app.nowhere"), "{message}");
            }
            other => panic!("expected definition error, got {other:?}"),
        }
    }

    #[test]
    fn explicit_constraint_edges_are_followed() {
        let orders = table("orders").with_constraint(
            Constraint::new(
                "orders_customer_fk",
                ConstraintKind::ForeignKey,
                "(customer_id) REFERENCES crm.customers (id)",
            )
            .references("crm", "customers"),
        );
        let tree = DefinitionTree::new()
            .with_schema(Schema::new("app").with_table(orders))
            .with_schema(Schema::new("crm").with_table(table("customers")));
        let order = DependencyOrderer::new(&tree).order().unwrap();
        assert_eq!(names(&order), vec!["customers", "orders"]);
    }

    #[test]
    fn filtered_tables_become_placeholders() {
        let tree = DefinitionTree::new().with_schema(
            Schema::new("app")
                .with_table(fk(table("orders"), "customer_id", "customers"))
                .with_table(table("customers")),
        );
        let filter = TableFilter::new().with_table("app", "orders");
        let order = DependencyOrderer::new(&tree)
            .with_filter(Some(&filter))
            .order()
            .unwrap();
        assert_eq!(names(&order), vec!["?customers", "orders"]);
        assert_eq!(order.tables().count(), 1);
    }

    #[test]
    fn duplicate_tables_are_rejected() {
        let tree = DefinitionTree::new()
            .with_schema(Schema::new("app").with_table(table("t")).with_table(table("T")));
        assert!(DependencyOrderer::new(&tree).order().is_err());
    }
}
