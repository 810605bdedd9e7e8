#![allow(dead_code)]

use oxide_steward_core::prelude::*;

/// Wraps tables into a one-schema tree named `app`.
pub fn app(tables: Vec<Table>) -> DefinitionTree {
    let mut schema = Schema::new("app");
    schema.tables = tables;
    DefinitionTree::new().with_schema(schema)
}

pub fn run(dialect: &dyn DialectAdapter, old: Option<&DefinitionTree>, new: &DefinitionTree) -> DiffReport {
    run_with(dialect, DiffOptions::new(), old, new)
}

pub fn run_with(
    dialect: &dyn DialectAdapter,
    options: DiffOptions,
    old: Option<&DefinitionTree>,
    new: &DefinitionTree,
) -> DiffReport {
    DiffOrchestrator::new(dialect, options)
        .run(old, new)
        .unwrap_or_else(|e| panic!("diff failed: {e}"))
}

/// Body entries of `stage`.
pub fn body(report: &DiffReport, stage: Stage) -> Vec<String> {
    report
        .scripts
        .stage(stage)
        .map(|s| s.body.clone())
        .unwrap_or_default()
}

/// Index of the first entry containing `needle`.
pub fn position(entries: &[String], needle: &str) -> usize {
    entries
        .iter()
        .position(|e| e.contains(needle))
        .unwrap_or_else(|| panic!("no entry contains {needle:?} in:\n{}", entries.join("\n")))
}

/// Number of entries containing `needle`.
pub fn count(entries: &[String], needle: &str) -> usize {
    entries.iter().filter(|e| e.contains(needle)).count()
}
