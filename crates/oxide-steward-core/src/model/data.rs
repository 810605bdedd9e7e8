//! Inline data rows.

use serde::{Deserialize, Serialize};

use super::eq_ci;

/// Literal rows declared for a table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowSet {
    /// Column names the row cells are aligned to. May be a subset of the
    /// table's columns, in any order.
    pub columns: Vec<String>,
    /// Rows in declaration order.
    #[serde(default)]
    pub rows: Vec<Row>,
}

impl RowSet {
    /// Creates a row set over the given columns.
    #[must_use]
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Appends a live row made of plain text cells.
    #[must_use]
    pub fn row(mut self, values: &[&str]) -> Self {
        self.rows.push(Row::new(values.iter().map(|v| Cell::text(*v)).collect()));
        self
    }

    /// Appends a tombstone row.
    #[must_use]
    pub fn tombstone(mut self, values: &[&str]) -> Self {
        let mut row = Row::new(values.iter().map(|v| Cell::text(*v)).collect());
        row.delete = true;
        self.rows.push(row);
        self
    }

    /// Position of `column` in the declared column list.
    #[must_use]
    pub fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| eq_ci(c, column))
    }

    /// Returns whether `column` is declared.
    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        self.position(column).is_some()
    }
}

/// One data row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RowDocument")]
pub struct Row {
    /// Cells aligned to [`RowSet::columns`].
    pub cells: Vec<Cell>,
    /// Tombstone marker.
    #[serde(default)]
    pub delete: bool,
}

impl Row {
    /// Creates a live row.
    #[must_use]
    pub const fn new(cells: Vec<Cell>) -> Self {
        Self {
            cells,
            delete: false,
        }
    }

    /// Cell for `column`, looked up through the row set's column list.
    #[must_use]
    pub fn cell<'a>(&'a self, set: &RowSet, column: &str) -> Option<&'a Cell> {
        set.position(column).and_then(|i| self.cells.get(i))
    }
}

/// One cell value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CellDocument")]
pub struct Cell {
    /// Literal text.
    #[serde(default)]
    pub value: String,
    /// Always NULL, whatever the text.
    #[serde(default)]
    pub null: bool,
    /// Explicit empty string.
    #[serde(default)]
    pub empty: bool,
    /// Raw SQL expression, emitted unescaped.
    #[serde(default)]
    pub sql: bool,
}

impl Cell {
    /// A plain text cell.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    /// A NULL cell.
    #[must_use]
    pub fn null() -> Self {
        Self {
            null: true,
            ..Self::default()
        }
    }

    /// An explicit empty string cell.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            empty: true,
            ..Self::default()
        }
    }

    /// A raw SQL expression cell.
    #[must_use]
    pub fn sql(expr: impl Into<String>) -> Self {
        Self {
            value: expr.into(),
            sql: true,
            ..Self::default()
        }
    }

    /// Returns whether the cell carries no value and no flag, so the
    /// column default applies.
    #[must_use]
    pub fn is_unset(&self) -> bool {
        !self.null && !self.empty && !self.sql && self.value.is_empty()
    }
}

// Documents may spell cells as bare JSON scalars or as detailed objects.
#[derive(Deserialize)]
#[serde(untagged)]
enum CellDocument {
    Null(()),
    Text(String),
    Bool(bool),
    Number(serde_json::Number),
    Detailed {
        #[serde(default)]
        value: String,
        #[serde(default)]
        null: bool,
        #[serde(default)]
        empty: bool,
        #[serde(default)]
        sql: bool,
    },
}

impl From<CellDocument> for Cell {
    fn from(doc: CellDocument) -> Self {
        match doc {
            CellDocument::Null(()) => Self::null(),
            CellDocument::Text(value) => Self::text(value),
            CellDocument::Bool(b) => Self::text(b.to_string()),
            CellDocument::Number(n) => Self::text(n.to_string()),
            CellDocument::Detailed {
                value,
                null,
                empty,
                sql,
            } => Self {
                value,
                null,
                empty,
                sql,
            },
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RowDocument {
    Cells(Vec<Cell>),
    Detailed {
        cells: Vec<Cell>,
        #[serde(default)]
        delete: bool,
    },
}

impl From<RowDocument> for Row {
    fn from(doc: RowDocument) -> Self {
        match doc {
            RowDocument::Cells(cells) => Self::new(cells),
            RowDocument::Detailed { cells, delete } => Self { cells, delete },
        }
    }
}
