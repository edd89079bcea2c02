//! Run configuration, loaded from TOML. Every field has a default, so a
//! file only needs the settings it changes.

use crate::impute::{ImputationConfig, ImputeError};
use crate::mixed::{FitError, SamplerConfig};
use crate::shared::artifact::{ArtifactError, load_toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Artifact(#[from] ArtifactError),
    #[error(transparent)]
    Imputation(#[from] ImputeError),
    #[error(transparent)]
    Sampler(#[from] FitError),
    #[error("The input table '{0}' does not exist.")]
    MissingInput(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Wide raw survey table (CSV).
    pub input: PathBuf,
    /// Directory receiving every artifact and report.
    pub output: PathBuf,
    pub imputation: ImputationConfig,
    pub sampler: SamplerConfig,
    /// Seed for subsampling draws when pooled counts differ.
    pub pairing_seed: u64,
    /// Ignore cached fits and sample again.
    pub refit: bool,
    pub show_progress: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("cohort.csv"),
            output: PathBuf::from("cohortmed_out"),
            imputation: ImputationConfig::default(),
            sampler: SamplerConfig::default(),
            pairing_seed: 20_240_603,
            refit: false,
            show_progress: true,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config: Self = load_toml(path)?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.imputation.validate()?;
        self.sampler.validate()?;
        if !self.input.is_file() {
            return Err(ConfigError::MissingInput(self.input.clone()));
        }
        Ok(())
    }

    pub fn derived_path(&self) -> PathBuf {
        self.output.join("derived.csv")
    }

    pub fn imputation_path(&self) -> PathBuf {
        self.output.join("imputations.json")
    }

    pub fn fits_dir(&self) -> PathBuf {
        self.output.join("fits")
    }

    pub fn report_path(&self, table: &str) -> PathBuf {
        self.output.join(format!("{table}.csv"))
    }
}
