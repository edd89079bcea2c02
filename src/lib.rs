//! Multiple imputation, multilevel Poisson models and mediation summaries
//! for a three-wave adolescent cohort.
//!
//! Stages run strictly in order and hand each other immutable artifacts:
//! [`derive`] → [`impute`] → [`longitudinal`] → [`mixed`] → [`mediation`].

#[path = "../shared/mod.rs"]
pub mod shared;

#[path = "../derive/mod.rs"]
pub mod derive;

#[path = "../impute/mod.rs"]
pub mod impute;

#[path = "../longitudinal/mod.rs"]
pub mod longitudinal;

#[path = "../mixed/mod.rs"]
pub mod mixed;

#[path = "../mediation/mod.rs"]
pub mod mediation;

pub mod config;
pub mod pipeline;
pub mod report;
pub mod study;

pub use config::{ConfigError, PipelineConfig};
pub use pipeline::{PipelineError, PipelineOutput, run_pipeline};
pub use study::StudyDesign;
