//! # Subject-level tables
//!
//! The wide, one-row-per-subject representation shared by the derivation
//! and imputation stages. Cells are `Option<f64>`: `None` marks a missing
//! cell, which is the only place stage-local indeterminacy is recorded.
//! Categorical values are stored as their integer level codes.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Identifier of a survey wave (1-based, as in the field instruments).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WaveId(pub u8);

impl fmt::Display for WaveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

/// Name of the wide column holding `stem` at `wave`, e.g. `screen_w2`.
pub fn wave_column(stem: &str, wave: WaveId) -> String {
    format!("{stem}_{wave}")
}

/// Measurement type of a column. Drives both the imputation method check
/// and the dummy coding used when the column acts as a predictor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VariableKind {
    /// Unordered categories identified by their integer codes. The first
    /// level is the reference level for dummy coding.
    Categorical { levels: Vec<u8> },
    /// 0/1 indicator.
    Binary,
    Continuous,
}

impl VariableKind {
    /// Whether `value` is a legal cell value for this kind.
    pub fn admits(&self, value: f64) -> bool {
        match self {
            VariableKind::Categorical { levels } => levels.iter().any(|&l| f64::from(l) == value),
            VariableKind::Binary => value == 0.0 || value == 1.0,
            VariableKind::Continuous => value.is_finite(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: VariableKind,
    pub values: Vec<Option<f64>>,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: VariableKind, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            kind,
            values,
        }
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.values.iter().all(Option::is_some)
    }

    /// Row indices of missing cells, in row order.
    pub fn missing_rows(&self) -> Vec<usize> {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.is_none().then_some(i))
            .collect()
    }
}

#[derive(Error, Debug)]
pub enum TableError {
    #[error("Column '{column}' has {found} rows but the table has {expected}.")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },
    #[error("Column '{0}' appears more than once.")]
    DuplicateColumn(String),
    #[error("The required column '{0}' was not found in the table.")]
    ColumnNotFound(String),
    #[error("Column '{column}' contains the value {value}, which is not valid for its type.")]
    InvalidValue { column: String, value: f64 },
}

/// One row per subject, columns addressed by name. Row identity is the
/// `pids` vector; it never changes once the table is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectTable {
    pids: Vec<String>,
    columns: Vec<Column>,
}

impl SubjectTable {
    pub fn new(pids: Vec<String>) -> Self {
        Self {
            pids,
            columns: Vec::new(),
        }
    }

    /// Appends a column after checking its length, name and cell values.
    pub fn push_column(&mut self, column: Column) -> Result<(), TableError> {
        if column.values.len() != self.pids.len() {
            return Err(TableError::LengthMismatch {
                column: column.name,
                expected: self.pids.len(),
                found: column.values.len(),
            });
        }
        if self.column(&column.name).is_some() {
            return Err(TableError::DuplicateColumn(column.name));
        }
        if let Some(bad) = column.values.iter().flatten().find(|&&v| !column.kind.admits(v)) {
            return Err(TableError::InvalidValue {
                column: column.name.clone(),
                value: *bad,
            });
        }
        self.columns.push(column);
        Ok(())
    }

    pub fn pids(&self) -> &[String] {
        &self.pids
    }

    pub fn n_rows(&self) -> usize {
        self.pids.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn require(&self, name: &str) -> Result<&Column, TableError> {
        self.column(name)
            .ok_or_else(|| TableError::ColumnNotFound(name.to_string()))
    }

    /// Mutable access to the cells of one column. Kind and name stay fixed.
    pub fn values_mut(&mut self, name: &str) -> Result<&mut Vec<Option<f64>>, TableError> {
        self.columns
            .iter_mut()
            .find(|c| c.name == name)
            .map(|c| &mut c.values)
            .ok_or_else(|| TableError::ColumnNotFound(name.to_string()))
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Projects the table onto `names`, in the given order.
    pub fn select<'a, I>(&self, names: I) -> Result<SubjectTable, TableError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut projected = SubjectTable::new(self.pids.clone());
        for name in names {
            projected.push_column(self.require(name)?.clone())?;
        }
        Ok(projected)
    }

    pub fn missing_cells(&self) -> usize {
        self.columns.iter().map(Column::missing_count).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.columns.iter().all(Column::is_complete)
    }

    /// True when both tables share row identity and column schema
    /// (names, order and kinds); cell values may differ.
    pub fn same_shape(&self, other: &SubjectTable) -> bool {
        self.pids == other.pids
            && self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| a.name == b.name && a.kind == b.kind)
    }
}
