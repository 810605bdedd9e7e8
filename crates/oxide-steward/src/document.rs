//! Loading and composing definition documents.
//!
//! A definition may be split over several JSON documents. Composition
//! merges schemas by name (case-insensitively); every other object keeps
//! document order. A table may be declared only once across documents.

use std::path::{Path, PathBuf};

use oxide_steward_core::model::{eq_ci, DefinitionTree, Schema};
use tracing::debug;

use crate::error::{LoadError, Result};

/// Reads one document.
pub fn load_document(path: &Path) -> Result<DefinitionTree> {
    let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let tree = DefinitionTree::from_json_str(&text).map_err(|source| LoadError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(
        path = %path.display(),
        schemas = tree.schemas.len(),
        "Loaded definition document"
    );
    Ok(tree)
}

/// Reads and composes every document in `paths`.
pub fn load_definition(paths: &[PathBuf]) -> Result<DefinitionTree> {
    if paths.is_empty() {
        return Err(LoadError::NoDocuments);
    }
    let trees = paths
        .iter()
        .map(|p| load_document(p))
        .collect::<Result<Vec<_>>>()?;
    compose(trees)
}

/// Composes trees in order into one.
pub fn compose(trees: impl IntoIterator<Item = DefinitionTree>) -> Result<DefinitionTree> {
    let mut composed = DefinitionTree::new();
    for tree in trees {
        composed.custom_sql.extend(tree.custom_sql);
        for schema in tree.schemas {
            match composed
                .schemas
                .iter_mut()
                .find(|s| eq_ci(&s.name, &schema.name))
            {
                Some(existing) => merge_schema(existing, schema)?,
                None => composed.schemas.push(schema),
            }
        }
    }
    Ok(composed)
}

fn merge_schema(into: &mut Schema, from: Schema) -> Result<()> {
    for table in from.tables {
        if into.table(&table.name).is_some() {
            return Err(LoadError::DuplicateTable {
                schema: into.name.clone(),
                table: table.name,
            });
        }
        into.tables.push(table);
    }
    if into.old_name.is_none() {
        into.old_name = from.old_name;
    }
    into.views.extend(from.views);
    into.sequences.extend(from.sequences);
    into.functions.extend(from.functions);
    into.types.extend(from.types);
    into.grants.extend(from.grants);
    Ok(())
}
