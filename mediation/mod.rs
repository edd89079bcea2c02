//! # Mediation by difference in coefficients
//!
//! The exposure coefficient's pooled draws from the baseline model are
//! paired with those of each model that adds a mediator. Indirect effects
//! and percent mediated are computed per draw and only then summarized.

pub mod draws;
pub mod summary;

pub use draws::{CoefficientDraws, PairedDraws, PercentDraws, indirect_effect_draws, pair_draws, percent_mediated_draws};
pub use summary::{MediationEstimate, mediation_estimates, summarize_indirect, summarize_percent};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediationError {
    #[error("Cannot pair draws of '{baseline}' and '{adjusted}': {reason}")]
    PoolingMismatch {
        baseline: String,
        adjusted: String,
        reason: String,
    },
    #[error("Pooling mismatch in '{model}': instances record {recorded} draws but {pooled} are pooled.")]
    DrawCountMismatch {
        model: String,
        recorded: usize,
        pooled: usize,
    },
    #[error("Model '{0}' has no posterior draws.")]
    EmptyDraws(String),
    #[error("No pooled fit was supplied for model '{0}'.")]
    MissingFit(String),
    #[error("Model '{model}' has no coefficient named '{coefficient}'.")]
    MissingCoefficient { model: String, coefficient: String },
    #[error("The model family has no baseline model.")]
    NoBaseline,
}
