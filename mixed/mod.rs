//! # Multilevel Poisson models
//!
//! A fixed family of nested generalized linear mixed models (Poisson, log
//! link, subject-level random intercept and slopes), each fitted to every
//! completed long table by posterior sampling. Retained draws from all
//! imputations are pooled by concatenation, so each coefficient has one
//! pooled posterior sample from which means, 95% intervals and risk ratios
//! are read.
//!
//! The sampler sits behind [`PosteriorSampler`]; the built-in
//! [`NutsSampler`] runs `mini_mcmc` NUTS over the analytical log posterior.

pub mod design;
pub mod diagnostics;
pub mod fit;
pub mod hmc;
pub mod posterior;
pub mod spec;
pub mod store;

pub use design::DesignMatrices;
pub use diagnostics::{ParameterDiagnostics, SamplerDiagnostics};
pub use fit::{FixedEffectSummary, InstanceFit, PooledFit, VarianceSummary, fit_instance, fit_model};
pub use hmc::{NutsBackend, NutsSampler, NutsTarget, PosteriorSampler, SamplerConfig};
pub use posterior::{GlmmPosterior, LogDensity};
pub use spec::{Family, ModelFamily, ModelFamilyBuilder, ModelSpec, Outcome, RandomEffects, Term};
pub use store::{FitArtifact, FitStore};

use crate::longitudinal::ReshapeError;
use crate::shared::artifact::ArtifactError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FitError {
    #[error("Model '{model}' is invalid: {reason}")]
    InvalidSpec { model: String, reason: String },
    #[error("Invalid model family: {0}")]
    InvalidFamily(String),
    #[error("Model '{model}' needs column '{column}', which the long table does not have.")]
    ColumnNotFound { model: String, column: String },
    #[error("Model '{model}': outcome value {value} is not a valid count.")]
    InvalidOutcome { model: String, value: f64 },
    #[error("Model '{model}': predictor '{variable}' has the invalid value {value}.")]
    InvalidPredictor {
        model: String,
        variable: String,
        value: f64,
    },
    #[error("Invalid sampler configuration: {0}")]
    InvalidConfig(String),
    #[error("NUTS sampling failed: {0}")]
    Sampler(String),
    #[error("No finite starting point was found after {attempts} attempts.")]
    Initialisation { attempts: usize },
    #[error("Model '{0}' was given no imputed tables to fit.")]
    NoInstances(String),
    #[error("Failed to assemble posterior draws: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error(transparent)]
    Reshape(#[from] ReshapeError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}
