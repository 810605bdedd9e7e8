//! Schema-level objects: schemas, user-defined types, views, functions,
//! sequences, table triggers and custom SQL.
//!
//! Schema-level objects are skipped entirely while a table filter is
//! active; triggers follow their tables.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::catalog::{normalize_sql, ResolvedColumn};
use crate::dialect::{DialectAdapter, Feature};
use crate::error::{Result, StewardError};
use crate::model::{
    eq_ci, name_key, DefinitionTree, DialectSql, Schema, TableKey, Trigger, TypeDef, TypeKind, View,
};
use crate::stage::Stage;

use super::{DiffContext, StageWriter};

/// Old counterpart of a new schema: same name, else its previous name.
pub(crate) fn old_schema<'t>(old: &'t DefinitionTree, new: &Schema) -> Option<&'t Schema> {
    old.schema(&new.name)
        .or_else(|| new.old_name.as_deref().and_then(|o| old.schema(o)))
}

/// New counterpart of an old schema.
pub(crate) fn new_schema<'t>(new: &'t DefinitionTree, old: &Schema) -> Option<&'t Schema> {
    new.schema(&old.name).or_else(|| {
        new.schemas
            .iter()
            .find(|s| s.old_name.as_deref().is_some_and(|o| eq_ci(o, &old.name)))
    })
}

// ================================================================
// Schemas
// ================================================================

fn manages_schema(ctx: &DiffContext<'_, '_>, name: &str) -> bool {
    ctx.dialect.capabilities().multiple_schemas
        && !ctx.dialect.is_implicit_schema(name)
        && ctx
            .options
            .table_filter
            .as_ref()
            .map_or(true, |f| f.touches_schema(name))
}

/// Creates new schemas and renames hinted ones.
pub(crate) fn create_schemas(ctx: &DiffContext<'_, '_>, out: &mut StageWriter) {
    for schema in &ctx.new.tree.schemas {
        if !manages_schema(ctx, &schema.name) || ctx.old.tree.schema(&schema.name).is_some() {
            continue;
        }
        let renamed_from = schema
            .old_name
            .as_deref()
            .and_then(|o| ctx.old.tree.schema(o));
        match renamed_from {
            Some(old) => {
                debug!(old = %old.name, new = %schema.name, "Renaming schema");
                out.emit(Stage::Stage1, ctx.dialect.rename_schema(&old.name, &schema.name));
            }
            None => out.emit(Stage::Stage1, ctx.dialect.create_schema(&schema.name)),
        }
    }
}

/// Drops schemas that are gone from the new tree.
pub(crate) fn drop_schemas(ctx: &DiffContext<'_, '_>, out: &mut StageWriter) {
    if !ctx.options.includes_schema_objects() {
        return;
    }
    for schema in ctx.old.tree.schemas.iter().rev() {
        if manages_schema(ctx, &schema.name) && new_schema(ctx.new.tree, schema).is_none() {
            out.emit(Stage::Stage3, ctx.dialect.drop_schema(&schema.name));
        }
    }
}

// ================================================================
// Types
// ================================================================

/// Creates new types and rebuilds changed ones.
///
/// A changed type is rebuilt in place: columns using it are converted to
/// text, the type is dropped and recreated, and the columns are converted
/// back through text.
pub(crate) fn create_types(ctx: &DiffContext<'_, '_>, out: &mut StageWriter) -> Result<()> {
    if !ctx.options.includes_schema_objects() {
        return Ok(());
    }
    let dialect = ctx.dialect;
    let udt = dialect.capabilities().user_defined_types;
    for schema in &ctx.new.tree.schemas {
        let previous = old_schema(ctx.old.tree, schema);
        for type_def in &schema.types {
            let old = previous.and_then(|s| s.type_def(&type_def.name).map(|t| (s, t)));
            if !udt {
                // Enums are inlined into column types.
                if let TypeKind::Composite { .. } = type_def.kind {
                    if old.map_or(true, |(_, t)| t.kind != type_def.kind) {
                        out.unsupported(
                            dialect,
                            Stage::Stage1,
                            Feature::CompositeType,
                            &format!("{}.{}", schema.name, type_def.name),
                        )?;
                    }
                }
                continue;
            }
            match old {
                None => out.emit(Stage::Stage1, dialect.create_type(&schema.name, type_def)),
                Some((old_schema, old_type)) if old_type.kind != type_def.kind => {
                    rebuild_type(ctx, out, old_schema, old_type, schema, type_def);
                }
                Some(_) => {}
            }
        }
    }
    Ok(())
}

fn rebuild_type(
    ctx: &DiffContext<'_, '_>,
    out: &mut StageWriter,
    old_schema: &Schema,
    old_type: &TypeDef,
    schema: &Schema,
    type_def: &TypeDef,
) {
    let dialect = ctx.dialect;
    debug!(schema = %schema.name, type_name = %type_def.name, "Rebuilding type");

    let users: Vec<(String, &ResolvedColumn)> = ctx
        .old
        .tables_in_order()
        .filter(|t| ctx.survives(t))
        .flat_map(|t| {
            let table_ref = ctx.table_ref(t);
            t.columns
                .iter()
                .filter(|c| {
                    c.type_ref
                        .as_ref()
                        .is_some_and(|r| r.matches(&old_schema.name, &old_type.name))
                })
                .map(move |c| (table_ref.clone(), c))
        })
        .collect();

    for (table_ref, column) in &users {
        let as_text = ResolvedColumn {
            data_type: "text".to_string(),
            base_type: "text".to_string(),
            ..(*column).clone()
        };
        out.emit(Stage::Stage1, dialect.alter_column_type(table_ref, &as_text, None));
    }
    out.emit(Stage::Stage1, dialect.drop_type(&old_schema.name, &old_type.name));
    out.emit(Stage::Stage1, dialect.create_type(&schema.name, type_def));
    for (table_ref, column) in &users {
        let using = format!(
            "{}::text::{}",
            dialect.quote_identifier(&column.name),
            column.base_type
        );
        out.emit(
            Stage::Stage1,
            dialect.alter_column_type(table_ref, column, Some(&using)),
        );
    }
}

/// Drops types that are gone from the new tree.
pub(crate) fn drop_types(ctx: &DiffContext<'_, '_>, out: &mut StageWriter) {
    if !ctx.options.includes_schema_objects() || !ctx.dialect.capabilities().user_defined_types {
        return;
    }
    for schema in ctx.old.tree.schemas.iter().rev() {
        let next = new_schema(ctx.new.tree, schema);
        for type_def in schema.types.iter().rev() {
            if next.and_then(|s| s.type_def(&type_def.name)).is_none() {
                out.emit(Stage::Stage3, ctx.dialect.drop_type(&schema.name, &type_def.name));
            }
        }
    }
}

// ================================================================
// Views
// ================================================================

type ViewKey = (String, String);

fn view_key(schema: &str, name: &str) -> ViewKey {
    (name_key(schema), name_key(name))
}

/// Resolves `name` or `schema.name` relative to `own_schema`.
fn reference_key(own_schema: &str, reference: &str) -> ViewKey {
    match reference.split_once('.') {
        Some((schema, name)) => view_key(schema.trim(), name.trim()),
        None => view_key(own_schema, reference.trim()),
    }
}

fn same_references(own_schema: &str, a: &[String], b: &[String]) -> bool {
    let keys = |refs: &[String]| -> BTreeSet<ViewKey> {
        refs.iter().map(|r| reference_key(own_schema, r)).collect()
    };
    keys(a) == keys(b)
}

#[derive(Clone, Copy)]
struct ViewNode<'t> {
    schema: &'t Schema,
    view: &'t View,
}

impl ViewNode<'_> {
    fn key(&self) -> ViewKey {
        view_key(&self.schema.name, &self.view.name)
    }

    fn depends_on_view(&self, keys: &BTreeSet<ViewKey>) -> bool {
        self.view
            .depends_on_views
            .iter()
            .any(|d| keys.contains(&reference_key(&self.schema.name, d)))
    }

    fn table_dependencies(&self) -> impl Iterator<Item = TableKey> + '_ {
        self.view.depends_on_tables.iter().map(|d| {
            let (schema, table) = reference_key(&self.schema.name, d);
            TableKey::new(&schema, &table)
        })
    }
}

/// Views of `tree`, each after the views it depends on.
fn ordered_views(tree: &DefinitionTree) -> Result<Vec<ViewNode<'_>>> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'t>(
        key: &ViewKey,
        nodes: &BTreeMap<ViewKey, ViewNode<'t>>,
        marks: &mut BTreeMap<ViewKey, Mark>,
        ordered: &mut Vec<ViewNode<'t>>,
    ) -> Result<()> {
        match marks.get(key) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                return Err(StewardError::ordering(format!(
                    "view {}.{} depends on itself",
                    key.0, key.1
                )))
            }
            None => {}
        }
        let Some(node) = nodes.get(key) else {
            return Ok(());
        };
        marks.insert(key.clone(), Mark::Visiting);
        for dependency in &node.view.depends_on_views {
            visit(&reference_key(&node.schema.name, dependency), nodes, marks, ordered)?;
        }
        marks.insert(key.clone(), Mark::Done);
        ordered.push(*node);
        Ok(())
    }

    let declared: Vec<ViewNode<'_>> = tree
        .schemas
        .iter()
        .flat_map(|schema| schema.views.iter().map(move |view| ViewNode { schema, view }))
        .collect();
    let nodes: BTreeMap<ViewKey, ViewNode<'_>> = declared.iter().map(|n| (n.key(), *n)).collect();

    let mut marks = BTreeMap::new();
    let mut ordered = Vec::with_capacity(declared.len());
    for node in &declared {
        visit(&node.key(), &nodes, &mut marks, &mut ordered)?;
    }
    Ok(ordered)
}

/// Which views are dropped, recreated and created in a run.
///
/// A surviving view is touched when its query or dependencies changed,
/// when it depends on a touched view, or when it depends on a table whose
/// shape changed. Touched views are dropped at the start of stage 1 and
/// recreated at its end.
#[derive(Default)]
pub(crate) struct ViewPlan<'t> {
    early_drops: Vec<(String, String)>,
    creates: Vec<ViewNode<'t>>,
    late_drops: Vec<(String, String)>,
    recreated: BTreeSet<ViewKey>,
}

impl<'t> ViewPlan<'t> {
    pub(crate) fn build(
        ctx: &DiffContext<'_, 't>,
        reshaped: &BTreeSet<TableKey>,
    ) -> Result<Self> {
        let mut plan = Self::default();
        if !ctx.options.includes_schema_objects() {
            return Ok(plan);
        }
        let dialect = ctx.dialect.name();
        let query = |v: &View| DialectSql::pick(&v.queries, dialect).map(normalize_sql);
        let table_reshaped = |key: &TableKey| {
            reshaped.contains(key)
                || ctx
                    .matches
                    .new_key(key)
                    .is_some_and(|k| reshaped.contains(k))
        };

        for node in ordered_views(ctx.new.tree)? {
            let old = old_schema(ctx.old.tree, node.schema).and_then(|s| s.view(&node.view.name));
            let Some(old) = old else {
                plan.creates.push(node);
                continue;
            };
            let own = &node.schema.name;
            let touched = query(old) != query(node.view)
                || !same_references(own, &old.depends_on_views, &node.view.depends_on_views)
                || !same_references(own, &old.depends_on_tables, &node.view.depends_on_tables)
                || node.depends_on_view(&plan.recreated)
                || node.table_dependencies().any(|k| reshaped.contains(&k));
            if touched {
                debug!(view = %format!("{}.{}", node.schema.name, node.view.name), "View touched");
                plan.recreated.insert(node.key());
                plan.creates.push(node);
            }
        }

        let mut early = BTreeSet::new();
        for node in ordered_views(ctx.old.tree)? {
            let successor = new_schema(ctx.new.tree, node.schema)
                .and_then(|s| s.view(&node.view.name).map(|v| view_key(&s.name, &v.name)));
            let name = (node.schema.name.clone(), node.view.name.clone());
            match successor {
                Some(ref key) if plan.recreated.contains(key) => {
                    early.insert(node.key());
                    plan.early_drops.push(name);
                }
                Some(_) => {}
                None if node.depends_on_view(&early)
                    || node.table_dependencies().any(|k| table_reshaped(&k)) =>
                {
                    early.insert(node.key());
                    plan.early_drops.push(name);
                }
                None => plan.late_drops.push(name),
            }
        }
        plan.early_drops.reverse();
        plan.late_drops.reverse();
        Ok(plan)
    }

    /// Returns whether the view is dropped and created again in this run.
    pub(crate) fn is_recreated(&self, schema: &str, view: &str) -> bool {
        self.recreated.contains(&view_key(schema, view))
    }

    /// Stage 1: touched views and removed views in their way, dependents
    /// first.
    pub(crate) fn emit_drops(&self, dialect: &dyn DialectAdapter, out: &mut StageWriter) {
        for (schema, view) in &self.early_drops {
            out.emit(Stage::Stage1, dialect.drop_view(&dialect.object_ref(schema, view)));
        }
    }

    /// Stage 1: new and touched views, dependencies first.
    pub(crate) fn emit_creates(&self, dialect: &dyn DialectAdapter, out: &mut StageWriter) {
        for node in &self.creates {
            let view_ref = dialect.object_ref(&node.schema.name, &node.view.name);
            match DialectSql::pick(&node.view.queries, dialect.name()) {
                Some(query) => out.emit(Stage::Stage1, dialect.create_view(&view_ref, query)),
                None => out.warn(
                    Stage::Stage1,
                    format!("{}.{}", node.schema.name, node.view.name),
                    format!("no query for {}; view skipped", dialect.name()),
                ),
            }
        }
    }

    /// Stage 3: remaining removed views, dependents first.
    pub(crate) fn emit_late_drops(&self, dialect: &dyn DialectAdapter, out: &mut StageWriter) {
        for (schema, view) in &self.late_drops {
            out.emit(Stage::Stage3, dialect.drop_view(&dialect.object_ref(schema, view)));
        }
    }
}

// ================================================================
// Functions and sequences
// ================================================================

/// Creates new functions and replaces changed ones. A function whose
/// return type changed is dropped first.
pub(crate) fn create_functions(ctx: &DiffContext<'_, '_>, out: &mut StageWriter) {
    if !ctx.options.includes_schema_objects() {
        return;
    }
    let dialect = ctx.dialect;
    for schema in &ctx.new.tree.schemas {
        let previous = old_schema(ctx.old.tree, schema);
        for function in &schema.functions {
            let Some(body) = DialectSql::pick(&function.definitions, dialect.name()) else {
                out.warn(
                    Stage::Stage1,
                    format!("{}.{}", schema.name, function.name),
                    format!("no definition for {}; function skipped", dialect.name()),
                );
                continue;
            };
            let old = previous.and_then(|s| s.function(&function.signature_key()).map(|f| (s, f)));
            if let Some((old_schema, old)) = old {
                let same_returns = eq_ci(&normalize_sql(&old.returns), &normalize_sql(&function.returns));
                let unchanged = same_returns
                    && old.language.as_deref().map(name_key) == function.language.as_deref().map(name_key)
                    && DialectSql::pick(&old.definitions, dialect.name()).map(normalize_sql)
                        == Some(normalize_sql(body));
                if unchanged {
                    continue;
                }
                if !same_returns {
                    out.emit(Stage::Stage1, dialect.drop_function(&old_schema.name, old));
                }
            }
            out.emit_all(Stage::Stage1, dialect.create_function(&schema.name, function, body));
        }
    }
}

/// Drops functions that are gone from the new tree.
pub(crate) fn drop_functions(ctx: &DiffContext<'_, '_>, out: &mut StageWriter) {
    if !ctx.options.includes_schema_objects() {
        return;
    }
    for schema in ctx.old.tree.schemas.iter().rev() {
        let next = new_schema(ctx.new.tree, schema);
        for function in schema.functions.iter().rev() {
            if next.and_then(|s| s.function(&function.signature_key())).is_none() {
                out.emit(Stage::Stage3, ctx.dialect.drop_function(&schema.name, function));
            }
        }
    }
}

/// Creates new sequences and alters changed ones.
pub(crate) fn create_sequences(ctx: &DiffContext<'_, '_>, out: &mut StageWriter) {
    if !ctx.options.includes_schema_objects() {
        return;
    }
    let dialect = ctx.dialect;
    let native = dialect.capabilities().native_sequences;
    for schema in &ctx.new.tree.schemas {
        let previous = old_schema(ctx.old.tree, schema);
        for sequence in &schema.sequences {
            match previous.and_then(|s| s.sequence(&sequence.name)) {
                None => {
                    if !native {
                        out.ensure_sequence_support(dialect, Stage::Stage1);
                    }
                    out.emit_all(Stage::Stage1, dialect.create_sequence(&schema.name, sequence));
                }
                Some(old) if old.options_differ(sequence) => {
                    out.emit_all(Stage::Stage1, dialect.alter_sequence(&schema.name, sequence));
                }
                Some(_) => {}
            }
        }
    }
}

/// Drops sequences that are gone from the new tree.
pub(crate) fn drop_sequences(ctx: &DiffContext<'_, '_>, out: &mut StageWriter) {
    if !ctx.options.includes_schema_objects() {
        return;
    }
    for schema in ctx.old.tree.schemas.iter().rev() {
        let next = new_schema(ctx.new.tree, schema);
        for sequence in schema.sequences.iter().rev() {
            if next.and_then(|s| s.sequence(&sequence.name)).is_none() {
                out.emit_all(Stage::Stage3, ctx.dialect.drop_sequence(&schema.name, &sequence.name));
            }
        }
    }
}

// ================================================================
// Triggers
// ================================================================

fn applies(trigger: &Trigger, dialect: &dyn DialectAdapter) -> bool {
    trigger
        .sql_format
        .as_deref()
        .map_or(true, |f| eq_ci(f, dialect.name()))
}

/// Drops removed or changed triggers of surviving tables, before the
/// tables are renamed.
pub(crate) fn drop_triggers(ctx: &DiffContext<'_, '_>, out: &mut StageWriter) {
    let dialect = ctx.dialect;
    for new in ctx.new.tables_in_order() {
        let Some(old) = ctx.old_table(new) else {
            continue;
        };
        let table_ref = ctx.table_ref(old);
        for trigger in old.table.triggers.iter().filter(|t| applies(t, dialect)) {
            if !new.table.triggers.contains(trigger) {
                out.emit_all(
                    Stage::Stage1,
                    dialect.drop_trigger(old.schema_name(), &table_ref, trigger),
                );
            }
        }
    }
}

/// Creates new or changed triggers.
pub(crate) fn create_triggers(ctx: &DiffContext<'_, '_>, out: &mut StageWriter) -> Result<()> {
    let dialect = ctx.dialect;
    for new in ctx.new.tables_in_order() {
        let old = ctx.old_table(new);
        let table_ref = ctx.table_ref(new);
        for trigger in new.table.triggers.iter().filter(|t| applies(t, dialect)) {
            if old.is_some_and(|o| o.table.triggers.contains(trigger)) {
                continue;
            }
            if eq_ci(trigger.for_each.trim(), "STATEMENT") && !dialect.supports_statement_triggers() {
                out.unsupported(
                    dialect,
                    Stage::Stage1,
                    Feature::StatementTrigger,
                    &format!("{}.{}", new.key, trigger.name),
                )?;
                continue;
            }
            out.emit_all(
                Stage::Stage1,
                dialect.create_trigger(new.schema_name(), &table_ref, trigger),
            );
        }
    }
    Ok(())
}

// ================================================================
// Custom SQL
// ================================================================

/// Writes the custom statements of `stage` that are new in this version.
pub(crate) fn custom_sql(ctx: &DiffContext<'_, '_>, out: &mut StageWriter, stage: Stage, before: bool) {
    let enabled = if stage.is_data() {
        ctx.options.emits_data()
    } else {
        ctx.options.emits_schema()
    };
    if !enabled {
        return;
    }
    for entry in &ctx.new.tree.custom_sql {
        if entry.stage != stage || entry.before != before || ctx.old.tree.custom_sql.contains(entry) {
            continue;
        }
        if let Some(ref comment) = entry.comment {
            out.comment(stage, comment);
        }
        out.emit(stage, entry.sql.clone());
    }
}
