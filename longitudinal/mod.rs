//! # Person-period reshaping
//!
//! Turns each completed wide instance into long form and adds the
//! within-person (`_pmc`) and between-person (`_pm`) decompositions plus
//! grand-mean-centred age, all computed separately per imputation.

pub mod reshape;
pub mod schema;

pub use reshape::{LongTable, reshape, reshape_all};
pub use schema::{LongitudinalSchema, WaveTime};

use crate::shared::table::TableError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReshapeError {
    #[error(transparent)]
    Table(#[from] TableError),
    #[error("Column '{0}' is not present in the long table.")]
    ColumnNotFound(String),
    #[error("Cell '{column}' of subject '{pid}' is missing; only completed instances can be reshaped.")]
    IncompleteCell { column: String, pid: String },
    #[error("Invalid longitudinal schema: {0}")]
    InvalidSchema(String),
    #[error("Imputation {0} has no present waves to reshape.")]
    NoRows(usize),
    #[error("The imputation artifact holds no completed instances.")]
    NoImputations,
}
