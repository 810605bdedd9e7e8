#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::{json, Value};

/// A one-table definition document with the given rows.
pub fn users_document(rows: &[(i64, &str)]) -> Value {
    let rows: Vec<Value> = rows.iter().map(|(id, email)| json!([id, email])).collect();
    json!({
        "schemas": [{
            "name": "app",
            "tables": [{
                "name": "users",
                "primary_key": ["id"],
                "columns": [
                    {"name": "id", "type": "int"},
                    {"name": "email", "type": "text", "nullable": false}
                ],
                "rows": {"columns": ["id", "email"], "rows": rows}
            }]
        }]
    })
}

pub fn write_document(dir: &Path, name: &str, document: &Value) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_string_pretty(document).unwrap()).unwrap();
    path
}

pub fn steward(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_oxide-steward"))
        .args(args)
        .env_remove("STEWARD_OLD")
        .env_remove("STEWARD_NEW")
        .env_remove("STEWARD_DIALECT")
        .env_remove("STEWARD_OUTPUT_DIR")
        .output()
        .unwrap()
}

pub fn sql_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".sql"))
        .collect();
    names.sort();
    names
}
