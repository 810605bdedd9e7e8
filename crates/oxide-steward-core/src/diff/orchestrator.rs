//! The diff state machine.

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::catalog::{Catalog, ResolvedTable};
use crate::config::DiffOptions;
use crate::dialect::DialectAdapter;
use crate::error::Result;
use crate::model::DefinitionTree;
use crate::stage::{Stage, StageScripts};

use super::constraints::KeyPlan;
use super::data::{DataRowDiffer, RowChanges};
use super::grants::GrantPlan;
use super::objects::{self, ViewPlan};
use super::tables;
use super::{DiffContext, StageWriter, Warning};

/// States of one run, visited in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffState {
    /// Revoke permissions the new version drops.
    RevokePermissions,
    /// Schema changes that must precede data changes.
    StructuralStage1,
    /// Grant permissions the new version adds.
    GrantPermissions,
    /// Inserts and updates.
    DataStage2,
    /// Schema changes that must follow data changes.
    StructuralStage3,
    /// Deletes.
    DataStage4,
    /// Finished; the sinks are flushed.
    Done,
}

impl DiffState {
    /// The state that follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::RevokePermissions => Self::StructuralStage1,
            Self::StructuralStage1 => Self::GrantPermissions,
            Self::GrantPermissions => Self::DataStage2,
            Self::DataStage2 => Self::StructuralStage3,
            Self::StructuralStage3 => Self::DataStage4,
            Self::DataStage4 | Self::Done => Self::Done,
        }
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffReport {
    /// The finished scripts.
    pub scripts: StageScripts,
    /// Non-fatal problems, in the order they were noticed.
    pub warnings: Vec<Warning>,
}

/// Compiles the difference between two definition trees into staged SQL.
///
/// # Example
///
/// ```
/// use oxide_steward_core::prelude::*;
///
/// let new = DefinitionTree::new().with_schema(
///     Schema::new("app").with_table(
///         Table::new("users")
///             .with_column(Column::new("id", "serial"))
///             .with_column(Column::new("email", "text").not_null())
///             .with_primary_key(&["id"]),
///     ),
/// );
///
/// let dialect = PostgresDialect::new();
/// let report = DiffOrchestrator::new(&dialect, DiffOptions::new())
///     .run(None, &new)
///     .unwrap();
///
/// let stage1 = report.scripts.stage_text(Stage::Stage1);
/// assert!(stage1.contains("CREATE TABLE app.users"));
/// assert!(stage1.contains("ADD CONSTRAINT users_pkey PRIMARY KEY"));
/// ```
pub struct DiffOrchestrator<'d> {
    dialect: &'d dyn DialectAdapter,
    options: DiffOptions,
}

impl<'d> DiffOrchestrator<'d> {
    /// Creates an orchestrator for `dialect`.
    #[must_use]
    pub fn new(dialect: &'d dyn DialectAdapter, options: DiffOptions) -> Self {
        Self { dialect, options }
    }

    /// Options of this orchestrator.
    #[must_use]
    pub fn options(&self) -> &DiffOptions {
        &self.options
    }

    /// Diffs `old` (or nothing, for a full build) against `new`.
    ///
    /// Any error aborts the run; nothing written so far is returned.
    pub fn run(&self, old: Option<&DefinitionTree>, new: &DefinitionTree) -> Result<DiffReport> {
        self.options.validate()?;
        let empty = DefinitionTree::new();
        let old = old.unwrap_or(&empty);
        let filter = self.options.table_filter.as_ref();

        let ctx = DiffContext::new(
            self.dialect,
            &self.options,
            Catalog::build(old, self.dialect, filter)?,
            Catalog::build(new, self.dialect, filter)?,
        )?;
        let mut out = StageWriter::new(
            self.dialect.name(),
            self.dialect.transaction_envelope(),
            self.options.single_stage,
        );
        for stage in Stage::ALL {
            out.header(stage, format!("-- {stage}: {}", stage.description()));
        }

        let reshaped = if self.options.emits_schema() {
            tables::reshaped_tables(&ctx)?
        } else {
            BTreeSet::new()
        };
        let plans = Plans {
            views: ViewPlan::build(&ctx, &reshaped)?,
            keys: KeyPlan::build(&ctx),
        };
        let grants = GrantPlan::build(&ctx, &plans.views);
        let mut rows: Vec<(&ResolvedTable<'_>, RowChanges)> = Vec::new();

        let mut state = DiffState::RevokePermissions;
        while state != DiffState::Done {
            debug!(state = ?state, "Entering diff state");
            let schema = self.options.emits_schema();
            match state {
                DiffState::RevokePermissions => {
                    objects::custom_sql(&ctx, &mut out, Stage::Stage1, true);
                    if schema {
                        grants.emit_revokes(self.dialect, &mut out);
                    }
                }
                DiffState::StructuralStage1 => {
                    if schema {
                        structural_stage1(&ctx, &mut out, &plans)?;
                    }
                }
                DiffState::GrantPermissions => {
                    if schema {
                        grants.emit_grants(self.dialect, &mut out);
                    }
                    objects::custom_sql(&ctx, &mut out, Stage::Stage1, false);
                }
                DiffState::DataStage2 => {
                    objects::custom_sql(&ctx, &mut out, Stage::Stage2, true);
                    if self.options.emits_data() {
                        rows = row_changes(&ctx)?;
                        for (_, changes) in &rows {
                            out.emit_all(Stage::Stage2, changes.upserts.iter().cloned());
                        }
                        for (_, changes) in &rows {
                            out.emit_all(Stage::Stage2, changes.serial_reset.iter().cloned());
                        }
                    }
                    objects::custom_sql(&ctx, &mut out, Stage::Stage2, false);
                }
                DiffState::StructuralStage3 => {
                    objects::custom_sql(&ctx, &mut out, Stage::Stage3, true);
                    if schema {
                        structural_stage3(&ctx, &mut out, &plans)?;
                    }
                    objects::custom_sql(&ctx, &mut out, Stage::Stage3, false);
                }
                DiffState::DataStage4 => {
                    objects::custom_sql(&ctx, &mut out, Stage::Stage4, true);
                    for (_, changes) in rows.iter().rev() {
                        out.emit_all(Stage::Stage4, changes.deletes.iter().cloned());
                    }
                    objects::custom_sql(&ctx, &mut out, Stage::Stage4, false);
                }
                DiffState::Done => {}
            }
            state = state.next();
        }

        let (scripts, warnings) = out.finish();
        info!(
            dialect = self.dialect.name(),
            statements = scripts.scripts().iter().map(|s| s.body.len()).sum::<usize>(),
            warnings = warnings.len(),
            "Diff complete"
        );
        Ok(DiffReport { scripts, warnings })
    }
}

struct Plans<'c, 'a> {
    views: ViewPlan<'a>,
    keys: KeyPlan<'c, 'a>,
}

fn structural_stage1(
    ctx: &DiffContext<'_, '_>,
    out: &mut StageWriter,
    plans: &Plans<'_, '_>,
) -> Result<()> {
    let dialect = ctx.dialect;
    objects::create_schemas(ctx, out);
    objects::create_types(ctx, out)?;
    plans.views.emit_drops(dialect, out);
    objects::create_functions(ctx, out);
    objects::create_sequences(ctx, out);
    objects::drop_triggers(ctx, out);
    plans.keys.emit_drops(ctx, out);
    tables::create_or_alter(ctx, out, &plans.keys.unkeyed_tables())?;
    plans.keys.emit_primary_keys(ctx, out);
    plans.keys.emit_unique_and_check(ctx, out)?;
    plans.keys.emit_indexes(ctx, out)?;
    plans.keys.emit_foreign_keys(ctx, out)?;
    objects::create_triggers(ctx, out)?;
    plans.views.emit_creates(dialect, out);
    Ok(())
}

fn structural_stage3(
    ctx: &DiffContext<'_, '_>,
    out: &mut StageWriter,
    plans: &Plans<'_, '_>,
) -> Result<()> {
    plans.views.emit_late_drops(ctx.dialect, out);
    tables::enforce_not_null(ctx, out)?;
    tables::drop_columns(ctx, out)?;
    tables::drop_tables(ctx, out);
    objects::drop_sequences(ctx, out);
    objects::drop_functions(ctx, out);
    objects::drop_types(ctx, out);
    objects::drop_schemas(ctx, out);
    Ok(())
}

fn row_changes<'c, 'a>(
    ctx: &'c DiffContext<'_, 'a>,
) -> Result<Vec<(&'c ResolvedTable<'a>, RowChanges)>> {
    let differ = DataRowDiffer::new(ctx.dialect);
    ctx.new
        .tables_in_order()
        .map(|new| Ok((new, differ.changes(ctx.old_table(new), new)?)))
        .collect()
}
