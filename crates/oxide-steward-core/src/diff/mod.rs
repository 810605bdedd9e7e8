//! Diff engine.
//!
//! The differs in this module compare the old and new [`Catalog`]s of one
//! run and write statements into the four stages. [`DiffOrchestrator`]
//! drives them in the fixed state order:
//!
//! ```text
//! RevokePermissions -> StructuralStage1 -> GrantPermissions
//!     -> DataStage2 -> StructuralStage3 -> DataStage4 -> Done
//! ```
//!
//! All state of a run lives in a `DiffContext` (read-only catalogs and
//! matches) and a `StageWriter` (the sinks plus collected warnings).
//! Nothing survives between runs.

mod constraints;
mod data;
mod grants;
mod indexes;
mod objects;
mod orchestrator;
mod tables;

use std::fmt;

use tracing::warn;

use crate::catalog::{Catalog, ResolvedTable};
use crate::config::DiffOptions;
use crate::dialect::{DialectAdapter, Feature, FeaturePolicy};
use crate::error::{Result, StewardError};
use crate::stage::{Stage, StageEmitter, StageScripts, TransactionEnvelope};

pub use constraints::{ConstraintDiff, ConstraintDiffer};
pub use data::{DataRowDiffer, RowChanges};
pub use indexes::{IndexDiff, IndexDiffer};
pub use orchestrator::{DiffOrchestrator, DiffReport, DiffState};

use tables::TableMatches;

/// A non-fatal problem noticed while diffing.
///
/// Warnings are written into the stage being produced as `-- WARNING:`
/// comments and are also returned in the [`DiffReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    /// Stage the warning was written to.
    pub stage: Stage,
    /// Object the warning is about.
    pub object: String,
    /// What happened.
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.object, self.stage, self.message)
    }
}

/// Read-only inputs of one run.
pub(crate) struct DiffContext<'r, 'a> {
    pub(crate) dialect: &'r dyn DialectAdapter,
    pub(crate) options: &'r DiffOptions,
    pub(crate) old: Catalog<'a>,
    pub(crate) new: Catalog<'a>,
    pub(crate) matches: TableMatches,
}

impl<'r, 'a> DiffContext<'r, 'a> {
    pub(crate) fn new(
        dialect: &'r dyn DialectAdapter,
        options: &'r DiffOptions,
        old: Catalog<'a>,
        new: Catalog<'a>,
    ) -> Result<Self> {
        let matches = TableMatches::build(dialect, &old, &new)?;
        Ok(Self {
            dialect,
            options,
            old,
            new,
            matches,
        })
    }

    /// Physical reference of a resolved table.
    pub(crate) fn table_ref(&self, table: &ResolvedTable<'_>) -> String {
        self.dialect.table_ref(table.schema_name(), table.name())
    }

    /// The old counterpart of a new table, following renames.
    pub(crate) fn old_table(&self, new: &ResolvedTable<'_>) -> Option<&ResolvedTable<'a>> {
        self.matches
            .old_key(&new.key)
            .and_then(|key| self.old.table(key))
    }

    /// Returns whether the old table survives into the new tree.
    pub(crate) fn survives(&self, old: &ResolvedTable<'_>) -> bool {
        self.matches.new_key(&old.key).is_some()
    }
}

/// Mutable output of one run.
pub(crate) struct StageWriter {
    emitter: StageEmitter,
    warnings: Vec<Warning>,
    dialect: &'static str,
    sequence_support: bool,
}

impl StageWriter {
    pub(crate) fn new(
        dialect: &'static str,
        envelope: Option<TransactionEnvelope>,
        single_stage: bool,
    ) -> Self {
        Self {
            emitter: StageEmitter::new(envelope, single_stage),
            warnings: Vec::new(),
            dialect,
            sequence_support: false,
        }
    }

    /// Writes one statement, terminating it if needed.
    pub(crate) fn emit(&mut self, stage: Stage, sql: impl Into<String>) {
        let sql = sql.into();
        let sql = sql.trim_end();
        if sql.is_empty() {
            return;
        }
        let entry = if sql.ends_with(';') {
            sql.to_string()
        } else {
            format!("{sql};")
        };
        self.emitter.stage(stage).write(entry);
    }

    /// Writes several statements.
    pub(crate) fn emit_all(&mut self, stage: Stage, statements: impl IntoIterator<Item = String>) {
        for sql in statements {
            self.emit(stage, sql);
        }
    }

    /// Writes a `--` comment line.
    pub(crate) fn comment(&mut self, stage: Stage, text: &str) {
        let text = text.replace('\n', " ");
        self.emitter.stage(stage).write(format!("-- {text}"));
    }

    pub(crate) fn header(&mut self, stage: Stage, text: impl Into<String>) {
        self.emitter.stage(stage).append_header(text);
    }

    /// Records a warning in the stage output, the log and the report.
    pub(crate) fn warn(&mut self, stage: Stage, object: impl Into<String>, message: impl Into<String>) {
        let object = object.into();
        let message = message.into();
        warn!(stage = %stage, object = %object, "{message}");
        self.emitter
            .stage(stage)
            .write(format!("-- WARNING: {object}: {}", message.replace('\n', " ")));
        self.warnings.push(Warning {
            stage,
            object,
            message,
        });
    }

    /// Applies the dialect's policy for an unsupported feature: fails the
    /// run, or warns so the caller can skip the object.
    pub(crate) fn unsupported(
        &mut self,
        dialect: &dyn DialectAdapter,
        stage: Stage,
        feature: Feature,
        object: &str,
    ) -> Result<()> {
        match dialect.feature_policy(feature) {
            FeaturePolicy::Error => Err(StewardError::DialectUnsupported {
                dialect: self.dialect,
                feature: feature.to_string(),
                object: object.to_string(),
            }),
            FeaturePolicy::Warn => {
                self.warn(
                    stage,
                    object,
                    format!("{} does not support {feature}", self.dialect),
                );
                Ok(())
            }
        }
    }

    /// Writes the dialect's sequence support objects once per run.
    pub(crate) fn ensure_sequence_support(&mut self, dialect: &dyn DialectAdapter, stage: Stage) {
        if self.sequence_support {
            return;
        }
        self.sequence_support = true;
        self.emit_all(stage, dialect.sequence_support());
    }

    pub(crate) fn finish(self) -> (StageScripts, Vec<Warning>) {
        (self.emitter.finish(), self.warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{MySqlDialect, PostgresDialect};

    fn writer() -> StageWriter {
        StageWriter::new("pgsql8", None, false)
    }

    #[test]
    fn statements_are_terminated_once() {
        let mut out = writer();
        out.emit(Stage::Stage1, "DROP TABLE a");
        out.emit(Stage::Stage1, "DROP TABLE b;  ");
        out.emit(Stage::Stage1, "   ");
        let (scripts, _) = out.finish();
        assert_eq!(
            scripts.stage(Stage::Stage1).unwrap().body,
            vec!["DROP TABLE a;", "DROP TABLE b;"]
        );
    }

    #[test]
    fn warnings_land_in_output_and_report() {
        let mut out = writer();
        out.warn(Stage::Stage3, "app.t", "ignored\npermission");
        let (scripts, warnings) = out.finish();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].object, "app.t");
        assert_eq!(
            scripts.stage(Stage::Stage3).unwrap().body,
            vec!["-- WARNING: app.t: ignored permission"]
        );
    }

    #[test]
    fn unsupported_follows_policy() {
        let mut out = writer();
        let mysql = MySqlDialect::new();
        assert!(out
            .unsupported(&mysql, Stage::Stage1, Feature::CheckConstraint, "app.t.ck")
            .is_ok());
        let err = out
            .unsupported(&mysql, Stage::Stage1, Feature::CompositeType, "app.pair")
            .unwrap_err();
        assert!(matches!(err, StewardError::DialectUnsupported { .. }));
    }

    #[test]
    fn sequence_support_written_once() {
        let mut out = StageWriter::new("mysql5", None, false);
        let mysql = MySqlDialect::new();
        out.ensure_sequence_support(&mysql, Stage::Stage1);
        out.ensure_sequence_support(&mysql, Stage::Stage1);
        let (scripts, _) = out.finish();
        assert_eq!(
            scripts.stage(Stage::Stage1).unwrap().body.len(),
            mysql.sequence_support().len()
        );

        let mut out = writer();
        out.ensure_sequence_support(&PostgresDialect::new(), Stage::Stage1);
        assert!(out.finish().0.is_empty());
    }
}
