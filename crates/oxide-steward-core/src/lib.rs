//! Schema-and-data upgrade compiler.
//!
//! `oxide-steward-core` takes two versions of a declarative database
//! definition and compiles the statements that move a database from the
//! old version to the new one:
//!
//! - Tables are ordered around foreign-key and inheritance edges, with
//!   cycle-closing foreign keys deferred
//! - Output is split into four stages so that additive schema changes
//!   precede data changes and destructive changes follow them
//! - Inline data rows are reconciled by primary key into INSERT, UPDATE
//!   and DELETE statements
//! - Constraint and index changes honor dialect couplings (auto-increment
//!   flags living on primary keys, indexes backing foreign keys)
//!
//! # Architecture
//!
//! - **Model** - [`DefinitionTree`] and friends, deserialized from JSON
//! - **Dialect** - [`DialectAdapter`] renders statements and declares
//!   [`Capabilities`]
//! - **Order** - dependency ordering of tables
//! - **Catalog** - per-side resolution of column types, implicit
//!   constraints and implicit indexes
//! - **Diff** - structural, constraint, index and data differs driven by
//!   [`DiffOrchestrator`]
//! - **Stage** - the four append-only output sinks
//! - **Output** - flushing stage scripts to files or streams
//!
//! # Example
//!
//! ```rust,ignore
//! use oxide_steward_core::prelude::*;
//!
//! let old = DefinitionTree::from_json_str(&std::fs::read_to_string("old.json")?)?;
//! let new = DefinitionTree::from_json_str(&std::fs::read_to_string("new.json")?)?;
//!
//! let dialect = PostgresDialect::new();
//! let report = DiffOrchestrator::new(&dialect, DiffOptions::new()).run(Some(&old), &new)?;
//! print!("{}", report.scripts.stage_text(Stage::Stage1));
//! ```

pub mod catalog;
pub mod config;
pub mod dialect;
pub mod diff;
pub mod error;
pub mod model;
pub mod order;
pub mod output;
pub mod stage;

pub use config::{DiffOptions, TableFilter};
pub use dialect::{Capabilities, DialectAdapter, MySqlDialect, PostgresDialect};
pub use diff::{DiffOrchestrator, DiffReport, Warning};
pub use error::{Result, StewardError};
pub use model::DefinitionTree;
pub use stage::{Stage, StageScripts};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::{DiffOptions, TableFilter};
    pub use crate::dialect::{
        Capabilities, DialectAdapter, Feature, FeaturePolicy, IdentifierQuoting, MySqlDialect,
        PostgresDialect,
    };
    pub use crate::diff::{DiffOrchestrator, DiffReport, Warning};
    pub use crate::error::{Result, StewardError};
    pub use crate::model::{
        Cell, Column, Constraint, ConstraintKind, DefinitionTree, ForeignKeyAction, Index, Row,
        RowSet, Schema, Table,
    };
    pub use crate::output::{write_scripts, write_to, OutputOptions};
    pub use crate::stage::{Stage, StageScripts};
}
