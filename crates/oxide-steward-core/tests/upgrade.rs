//! End-to-end upgrade scenarios through the orchestrator.

mod common;

use common::{app, body, count, position, run, run_with};
use oxide_steward_core::prelude::*;

fn t(rows: Option<RowSet>) -> Table {
    let table = Table::new("t")
        .with_column(Column::new("id", "int"))
        .with_column(Column::new("name", "text"))
        .with_primary_key(&["id"]);
    match rows {
        Some(rows) => table.with_rows(rows),
        None => table,
    }
}

fn u() -> Table {
    Table::new("u")
        .with_column(Column::new("id", "int"))
        .with_column(Column::foreign("t_id", "app", "t", "id"))
        .with_primary_key(&["id"])
}

// =============================================================================
// Structure
// =============================================================================

#[test]
fn new_table_with_foreign_key_follows_its_target() {
    // `u` is declared first; ordering must still create `t` before it.
    let new = app(vec![u(), t(None)]);
    let report = run(&PostgresDialect::new(), None, &new);
    let stage1 = body(&report, Stage::Stage1);

    let create_t = position(&stage1, "CREATE TABLE app.t");
    let create_u = position(&stage1, "CREATE TABLE app.u");
    let t_pkey = position(&stage1, "ADD CONSTRAINT t_pkey PRIMARY KEY");
    let fk = position(&stage1, "ADD CONSTRAINT u_t_id_fkey FOREIGN KEY");
    assert!(create_t < create_u);
    assert!(t_pkey < fk);
    assert!(stage1[fk].contains("REFERENCES app.t (id)"));

    assert!(report.scripts.stage(Stage::Stage3).unwrap().is_empty());
    assert!(report.scripts.stage(Stage::Stage4).unwrap().is_empty());
    assert!(report.warnings.is_empty());
}

#[test]
fn added_table_against_existing_one() {
    let old = app(vec![t(None)]);
    let new = app(vec![t(None), u()]);
    let report = run(&PostgresDialect::new(), Some(&old), &new);
    let stage1 = body(&report, Stage::Stage1);

    assert_eq!(count(&stage1, "CREATE TABLE"), 1);
    assert_eq!(count(&stage1, "t_pkey"), 0);
    let create_u = position(&stage1, "CREATE TABLE app.u");
    let fk = position(&stage1, "u_t_id_fkey FOREIGN KEY");
    assert!(create_u < fk);
    assert!(report.scripts.stage(Stage::Stage3).unwrap().is_empty());
}

#[test]
fn dropped_table_goes_to_stage3() {
    let old = app(vec![t(None), u()]);
    let new = app(vec![t(None)]);
    let report = run(&PostgresDialect::new(), Some(&old), &new);
    let stage3 = body(&report, Stage::Stage3);
    assert_eq!(stage3, vec!["DROP TABLE app.u;"]);
}

#[test]
fn removed_referencing_table_releases_rebuilt_primary_key() {
    let mut renamed = t(None);
    renamed.primary_key_name = Some("t_pk".into());
    let old = app(vec![t(None), u()]);
    let new = app(vec![renamed]);
    let report = run(&PostgresDialect::new(), Some(&old), &new);

    assert_eq!(
        body(&report, Stage::Stage1),
        vec![
            "ALTER TABLE app.u DROP CONSTRAINT u_t_id_fkey;",
            "ALTER TABLE app.t DROP CONSTRAINT t_pkey;",
            "ALTER TABLE app.t ADD CONSTRAINT t_pk PRIMARY KEY (id);",
        ]
    );
    assert_eq!(body(&report, Stage::Stage3), vec!["DROP TABLE app.u;"]);
}

#[test]
fn mutual_references_are_deferred_not_rejected() {
    let a = Table::new("a")
        .with_column(Column::new("id", "int"))
        .with_column(Column::foreign("b_id", "app", "b", "id"))
        .with_primary_key(&["id"]);
    let b = Table::new("b")
        .with_column(Column::new("id", "int"))
        .with_column(Column::foreign("a_id", "app", "a", "id"))
        .with_primary_key(&["id"]);
    let report = run(&PostgresDialect::new(), None, &app(vec![a, b]));
    let stage1 = body(&report, Stage::Stage1);

    let last_create = position(&stage1, "CREATE TABLE app.b").max(position(&stage1, "CREATE TABLE app.a"));
    assert!(position(&stage1, "a_b_id_fkey FOREIGN KEY") > last_create);
    assert!(position(&stage1, "b_a_id_fkey FOREIGN KEY") > last_create);
}

// =============================================================================
// Idempotence and determinism
// =============================================================================

#[test]
fn identical_trees_produce_empty_stages() {
    let tree = app(vec![
        u(),
        t(Some(RowSet::new(&["id", "name"]).row(&["1", "a"]))),
    ]);
    for dialect in [
        &PostgresDialect::new() as &dyn DialectAdapter,
        &MySqlDialect::new(),
    ] {
        let report = run(dialect, Some(&tree), &tree);
        assert!(report.scripts.is_empty(), "{}", dialect.name());
        assert_eq!(report.scripts.scripts().len(), 4);
        assert_eq!(report.scripts.stage_text(Stage::Stage1), "");
    }
}

#[test]
fn repeated_runs_are_identical() {
    let old = app(vec![t(Some(RowSet::new(&["id", "name"]).row(&["1", "a"])))]);
    let new = app(vec![
        u(),
        t(Some(RowSet::new(&["id", "name"]).row(&["1", "b"]).row(&["2", "c"]))),
    ]);
    let dialect = PostgresDialect::new();
    let first = run(&dialect, Some(&old), &new);
    let second = run(&dialect, Some(&old), &new);
    assert_eq!(first, second);
}

// =============================================================================
// Data
// =============================================================================

#[test]
fn rows_are_reconciled_by_primary_key() {
    let old = app(vec![t(Some(
        RowSet::new(&["id", "name"]).row(&["1", "a"]).row(&["2", "b"]),
    ))]);
    let new = app(vec![t(Some(
        RowSet::new(&["id", "name"]).row(&["1", "a2"]).row(&["3", "c"]),
    ))]);
    let report = run(&PostgresDialect::new(), Some(&old), &new);

    let stage2 = body(&report, Stage::Stage2);
    assert_eq!(
        stage2,
        vec![
            "-- previous values: name = 'a'\nUPDATE app.t SET name = 'a2' WHERE id = 1;",
            "INSERT INTO app.t (id, name) VALUES (3, 'c');",
        ]
    );
    assert_eq!(
        body(&report, Stage::Stage4),
        vec!["DELETE FROM app.t WHERE id = 2;"]
    );
    assert!(body(&report, Stage::Stage1).is_empty());
    assert!(body(&report, Stage::Stage3).is_empty());
}

#[test]
fn tombstones_on_both_sides_emit_nothing() {
    let rows = RowSet::new(&["id", "name"])
        .row(&["1", "a"])
        .tombstone(&["2", "b"]);
    let old = app(vec![t(Some(rows.clone()))]);
    let new = app(vec![t(Some(rows))]);
    let report = run(&PostgresDialect::new(), Some(&old), &new);
    assert!(report.scripts.is_empty());
}

#[test]
fn tombstone_in_new_version_deletes_row() {
    let old = app(vec![t(Some(
        RowSet::new(&["id", "name"]).row(&["1", "a"]).row(&["2", "b"]),
    ))]);
    let new = app(vec![t(Some(
        RowSet::new(&["id", "name"]).row(&["1", "a"]).tombstone(&["2", "b"]),
    ))]);
    let report = run(&PostgresDialect::new(), Some(&old), &new);
    assert!(body(&report, Stage::Stage2).is_empty());
    assert_eq!(
        body(&report, Stage::Stage4),
        vec!["DELETE FROM app.t WHERE id = 2;"]
    );
}

#[test]
fn deletes_run_children_first() {
    let parent = t(Some(RowSet::new(&["id", "name"]).row(&["1", "a"])));
    let child = u().with_rows(RowSet::new(&["id", "t_id"]).row(&["10", "1"]));
    let old = app(vec![parent, child]);
    let new = app(vec![t(None), u()]);
    let report = run(&PostgresDialect::new(), Some(&old), &new);

    let stage4 = body(&report, Stage::Stage4);
    assert!(position(&stage4, "DELETE FROM app.u") < position(&stage4, "DELETE FROM app.t"));
}

#[test]
fn serial_sequences_are_reset_after_inserts() {
    let users = Table::new("users")
        .with_column(Column::new("id", "serial"))
        .with_column(Column::new("email", "text"))
        .with_primary_key(&["id"])
        .with_rows(RowSet::new(&["id", "email"]).row(&["1", "a@example.com"]));
    let report = run(&PostgresDialect::new(), None, &app(vec![users]));
    let stage2 = body(&report, Stage::Stage2);
    assert_eq!(stage2.len(), 2);
    assert!(stage2[1].starts_with("SELECT setval(pg_get_serial_sequence('app.users', 'id')"));
}

// =============================================================================
// Dialect couplings
// =============================================================================

#[test]
fn mysql_strips_auto_increment_before_dropping_primary_key() {
    let table = |pk: &[&str]| {
        Table::new("t")
            .with_column(Column::new("id", "serial"))
            .with_column(Column::new("code", "int").not_null())
            .with_primary_key(pk)
    };
    let old = app(vec![table(&["id"])]);
    let new = app(vec![table(&["id", "code"])]);
    let report = run(&MySqlDialect::new(), Some(&old), &new);
    let stage1 = body(&report, Stage::Stage1);

    let strip = stage1
        .iter()
        .position(|e| e.contains("MODIFY COLUMN id") && !e.contains("AUTO_INCREMENT"))
        .unwrap_or_else(|| panic!("no strip in:\n{}", stage1.join("\n")));
    let drop = position(&stage1, "DROP PRIMARY KEY");
    let add = position(&stage1, "ADD PRIMARY KEY (id, code)");
    assert!(strip < drop);
    assert!(drop < add);
}

#[test]
fn mysql_widens_auto_increment_column_while_key_is_down() {
    let table = |id_type: &str| {
        Table::new("s")
            .with_column(Column::new("id", id_type))
            .with_primary_key(&["id"])
    };
    let old = app(vec![table("serial")]);
    let new = app(vec![table("bigserial")]);
    let report = run(&MySqlDialect::new(), Some(&old), &new);
    let stage1 = body(&report, Stage::Stage1);

    let drop = position(&stage1, "DROP PRIMARY KEY");
    let widen = position(&stage1, "MODIFY COLUMN id bigint");
    let add = position(&stage1, "ADD PRIMARY KEY (id)");
    assert!(drop < widen && widen < add, "{}", stage1.join("\n"));
    assert!(!stage1[widen].contains("AUTO_INCREMENT"), "{}", stage1[widen]);

    let flagged: Vec<usize> = stage1
        .iter()
        .enumerate()
        .filter(|(_, e)| e.contains("AUTO_INCREMENT"))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(flagged, vec![add + 1]);
    assert!(stage1[add + 1].ends_with("MODIFY COLUMN id bigint NOT NULL AUTO_INCREMENT;"));
}

#[test]
fn mysql_ignores_primary_key_names() {
    let mut renamed = t(None);
    renamed.primary_key_name = Some("t_pk".into());
    let old = app(vec![t(None), u()]);
    let new = app(vec![renamed, u()]);

    assert!(run(&MySqlDialect::new(), Some(&old), &new).scripts.is_empty());
    assert!(!run(&PostgresDialect::new(), Some(&old), &new).scripts.is_empty());
}

#[test]
fn mysql_rebuilds_foreign_key_around_its_changed_index() {
    let child = |dims: &[&str]| u().with_index(Index::new("u_t_id_ix", dims));
    let old = app(vec![t(None), child(&["t_id"])]);
    let new = app(vec![t(None), child(&["t_id", "id"])]);
    let report = run(&MySqlDialect::new(), Some(&old), &new);
    let stage1 = body(&report, Stage::Stage1);

    let drop = position(&stage1, "DROP FOREIGN KEY u_t_id_fkey");
    assert!(stage1[drop].starts_with("ALTER TABLE u"), "{}", stage1[drop]);
    assert!(stage1[drop].contains("DROP INDEX u_t_id_ix"), "{}", stage1[drop]);

    let add = position(&stage1, "ADD CONSTRAINT u_t_id_fkey FOREIGN KEY");
    assert!(drop < add);
    assert!(stage1[add].contains("ADD INDEX u_t_id_ix (t_id, id)"), "{}", stage1[add]);
    assert_eq!(count(&stage1, "DROP INDEX"), 1);
    assert_eq!(count(&stage1, "ADD INDEX"), 1);
    assert!(body(&report, Stage::Stage3).is_empty());
}

#[test]
fn mysql_merges_index_and_foreign_key_additions() {
    let report = run(&MySqlDialect::new(), None, &app(vec![t(None), u()]));
    let stage1 = body(&report, Stage::Stage1);

    let fk = position(&stage1, "ADD CONSTRAINT u_t_id_fkey FOREIGN KEY");
    assert!(stage1[fk].starts_with("ALTER TABLE u"));
    assert!(stage1[fk].contains("ADD INDEX u_t_id_fkey_idx (t_id)"), "{}", stage1[fk]);
    assert!(!stage1.join("\n").contains("BEGIN"));
}

#[test]
fn postgres_wraps_stages_in_transactions() {
    let report = run(&PostgresDialect::new(), None, &app(vec![t(None)]));
    let text = report.scripts.stage_text(Stage::Stage1);
    assert!(text.contains("BEGIN;\n"));
    assert!(text.trim_end().ends_with("COMMIT;"));
}

// =============================================================================
// Options
// =============================================================================

#[test]
fn single_stage_merges_all_output() {
    let old = app(vec![t(Some(RowSet::new(&["id", "name"]).row(&["2", "b"])))]);
    let new = app(vec![u(), t(Some(RowSet::new(&["id", "name"]).row(&["1", "a"])))]);
    let report = run_with(
        &PostgresDialect::new(),
        DiffOptions::new().single_stage(),
        Some(&old),
        &new,
    );

    assert_eq!(report.scripts.scripts().len(), 1);
    let single = report.scripts.single_stage().unwrap();
    let create = position(&single.body, "CREATE TABLE app.u");
    let insert = position(&single.body, "INSERT INTO app.t");
    let delete = position(&single.body, "DELETE FROM app.t");
    assert!(create < insert && insert < delete);

    let text = single.render();
    assert_eq!(text.matches("BEGIN;").count(), 1);
    assert!(text.contains("-- stage1: schema changes before data changes"));
    assert!(!text.contains("-- stage3"));
}

#[test]
fn table_filter_limits_the_diff() {
    let other = Table::new("other")
        .with_column(Column::new("id", "int"))
        .with_primary_key(&["id"]);
    let new = app(vec![t(None), other]);
    let options = DiffOptions::new().with_table_filter(TableFilter::new().with_table("app", "other"));
    let report = run_with(&PostgresDialect::new(), options, None, &new);
    let stage1 = body(&report, Stage::Stage1);
    assert_eq!(count(&stage1, "CREATE TABLE"), 1);
    assert!(stage1[position(&stage1, "CREATE TABLE")].contains("app.other"));
}

#[test]
fn documents_drive_the_same_engine() {
    let json = r#"{
        "schemas": [{
            "name": "app",
            "tables": [{
                "name": "t",
                "primary_key": ["id"],
                "columns": [
                    {"name": "id", "type": "int"},
                    {"name": "name", "type": "text"}
                ],
                "rows": {"columns": ["id", "name"], "rows": [[1, "a"], [2, null]]}
            }]
        }]
    }"#;
    let new = DefinitionTree::from_json_str(json).unwrap();
    let report = run(&PostgresDialect::new(), None, &new);
    assert_eq!(
        body(&report, Stage::Stage2),
        vec![
            "INSERT INTO app.t (id, name) VALUES (1, 'a');",
            "INSERT INTO app.t (id, name) VALUES (2, NULL);",
        ]
    );
}
