//! # Variable derivation
//!
//! Deterministic, rule-based derivation of per-wave indicators from raw
//! survey responses: the three-level clinical screen, subscale scores,
//! recoded demographics and carried ages. Rules are evaluated identically
//! and independently per wave. An input that matches no rule produces a
//! missing value, never a default and never an error that aborts a subject.

pub mod demographics;
pub mod raw;
pub mod screen;
pub mod subject;
pub mod subscale;
pub mod wave;

pub use raw::{RawDemographics, RawSubject, RawWave, ScreenItems, load_raw_subjects};
pub use screen::{ScreenResult, classify};
pub use subject::{DerivationReport, DerivedSubject, derive_subject, derive_table, derived_table};
pub use subscale::{SubscaleDefinition, SubscaleScore};
pub use wave::{DerivedWave, derive_wave};

use crate::shared::table::{TableError, WaveId};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeriveError {
    #[error("Failed to read the raw input table: {0}")]
    Csv(#[from] csv::Error),
    #[error(
        "The required column '{0}' was not found in the raw input table. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error("Row {0} of the raw input table has an empty 'pid'.")]
    MissingPid(usize),
    #[error("The person identifier '{0}' appears more than once in the raw input table.")]
    DuplicatePid(String),
    #[error("The raw input table '{0}' contains no subjects.")]
    EmptyInput(PathBuf),
    #[error("No subject has any observed wave; nothing to analyse.")]
    NoEligibleSubjects,
    #[error(transparent)]
    Table(#[from] TableError),
}

/// The waves and subscales the derivation rules are applied over.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivationRules {
    pub waves: Vec<WaveId>,
    pub subscales: Vec<SubscaleDefinition>,
}

impl DerivationRules {
    /// Three annual waves; discrimination (the exposure), sleep problems
    /// and loneliness subscales.
    pub fn cohort() -> Self {
        Self {
            waves: vec![WaveId(1), WaveId(2), WaveId(3)],
            subscales: vec![
                SubscaleDefinition::numbered("dis", 6, 3),
                SubscaleDefinition::numbered("slp", 4, 4),
                SubscaleDefinition::numbered("lon", 3, 2),
            ],
        }
    }
}
