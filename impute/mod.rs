//! # Multiple imputation by chained equations
//!
//! Produces M completed copies of the derived subject table. Every
//! variable carries an explicit [`ImputationMethod`] from the
//! [`ImputationPlan`]; nothing is inferred from column names. Convergence
//! is reported, not enforced.

pub mod artifact;
pub mod convergence;
pub mod design;
pub mod logistic;
pub mod method;
pub mod mice;
pub mod pmm;
pub mod polytomous;

pub use artifact::ImputationArtifact;
pub use convergence::convergence_diagnostics;
pub use method::{ImputationMethod, ImputationPlan};
pub use mice::impute;

use crate::shared::artifact::ArtifactError;
use crate::shared::linalg::LinalgError;
use crate::shared::table::{TableError, VariableKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImputeError {
    #[error(transparent)]
    Table(#[from] TableError),
    #[error("The imputation plan lists no variables.")]
    EmptyPlan,
    #[error("Variable '{0}' appears more than once in the imputation plan.")]
    DuplicateVariable(String),
    #[error("Variable '{variable}' has {missing} missing cells but its imputation method is 'none'.")]
    MissingWithoutMethod { variable: String, missing: usize },
    #[error("Method '{method}' cannot impute variable '{variable}' of type {kind:?}.")]
    MethodMismatch {
        variable: String,
        method: ImputationMethod,
        kind: VariableKind,
    },
    #[error("Variable '{0}' has no observed values to model.")]
    NoObservedValues(String),
    #[error("The conditional model for '{variable}' could not be fitted: {source}")]
    Linalg {
        variable: String,
        #[source]
        source: LinalgError,
    },
    #[error("Invalid imputation settings: {0}")]
    InvalidConfig(String),
    #[error("Imputation artifact '{0}' has instances with differing schemas.")]
    InconsistentArtifact(PathBuf),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImputationConfig {
    /// Number of completed instances (M).
    pub imputations: usize,
    /// Rounds over the incomplete variables per instance.
    pub iterations: usize,
    pub seed: u64,
    /// Gaussian penalty precision on every conditional-model coefficient.
    pub ridge: f64,
    /// Donor pool size for predictive mean matching.
    pub donors: usize,
    /// Chain-mean R-hat above which a variable is reported.
    pub rhat_threshold: f64,
}

impl Default for ImputationConfig {
    fn default() -> Self {
        Self {
            imputations: 20,
            iterations: 10,
            seed: 20_240_601,
            ridge: 0.1,
            donors: 5,
            rhat_threshold: 1.1,
        }
    }
}

impl ImputationConfig {
    pub fn validate(&self) -> Result<(), ImputeError> {
        if self.imputations == 0 {
            return Err(ImputeError::InvalidConfig("at least one imputation is required".into()));
        }
        if self.iterations == 0 {
            return Err(ImputeError::InvalidConfig("at least one iteration is required".into()));
        }
        if !(self.ridge.is_finite() && self.ridge > 0.0) {
            return Err(ImputeError::InvalidConfig(format!(
                "ridge must be positive, got {}",
                self.ridge
            )));
        }
        if self.donors == 0 {
            return Err(ImputeError::InvalidConfig("donor pool must not be empty".into()));
        }
        Ok(())
    }
}
