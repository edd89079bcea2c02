//! On-disk cache of pooled fits, one TOML artifact per model name.
//!
//! An artifact that already exists is reused as-is: the stored fingerprint
//! is compared with the current inputs only to warn about staleness. Passing
//! `refit` discards it and fits again.

use super::FitError;
use super::fit::PooledFit;
use super::hmc::SamplerConfig;
use super::spec::ModelSpec;
use crate::longitudinal::LongTable;
use crate::shared::artifact::{ArtifactError, Fingerprinter, load_toml, save_toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitArtifact {
    /// SHA-256 over model specification, data and sampler settings.
    pub fingerprint: String,
    pub spec: ModelSpec,
    pub fit: PooledFit,
}

#[derive(Debug, Clone)]
pub struct FitStore {
    dir: PathBuf,
}

impl FitStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, model: &str) -> PathBuf {
        self.dir.join(format!("{model}.toml"))
    }

    pub fn contains(&self, model: &str) -> bool {
        self.path(model).is_file()
    }

    pub fn load(&self, model: &str) -> Result<FitArtifact, ArtifactError> {
        load_toml(&self.path(model))
    }

    pub fn save(&self, artifact: &FitArtifact) -> Result<(), ArtifactError> {
        save_toml(&self.path(&artifact.spec.name), artifact)
    }

    /// Returns the cached fit for `spec` unless it is absent or `refit` is
    /// set, in which case `fit` runs and its result is stored.
    pub fn get_or_fit<F>(&self, spec: &ModelSpec, fingerprint: &str, refit: bool, fit: F) -> Result<PooledFit, FitError>
    where
        F: FnOnce() -> Result<PooledFit, FitError>,
    {
        let path = self.path(&spec.name);
        if !refit && path.is_file() {
            let artifact = self.load(&spec.name)?;
            if artifact.fingerprint != fingerprint {
                log::warn!(
                    "Cached fit '{}' was produced from different inputs; reusing it anyway. Pass --refit to fit again.",
                    path.display()
                );
            }
            log::info!("Loaded cached fit for {} from '{}'", spec.name, path.display());
            return Ok(artifact.fit);
        }
        let pooled = fit()?;
        self.save(&FitArtifact {
            fingerprint: fingerprint.to_string(),
            spec: spec.clone(),
            fit: pooled.clone(),
        })?;
        log::info!("Saved fit for {} to '{}'", spec.name, path.display());
        Ok(pooled)
    }
}

/// Fingerprint of everything that determines a pooled fit.
pub fn fingerprint(spec: &ModelSpec, tables: &[LongTable], sampler: &SamplerConfig) -> Result<String, ArtifactError> {
    let mut hasher = Fingerprinter::new();
    hasher.update_json(spec)?.update_json(sampler)?;
    for long in tables {
        hasher.update_u64(long.imputation as u64).update_u64(long.n_rows() as u64);
        for pid in &long.subjects {
            hasher.update_str(pid);
        }
        for name in long.column_names() {
            hasher.update_str(name);
            if let Some(values) = long.column(name) {
                hasher.update_f64s(values.iter());
            }
        }
    }
    Ok(hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixed::hmc::{NutsSampler, PosteriorSampler};
    use crate::mixed::test_fixtures::{poisson_panel, simple_spec};
    use crate::mixed::fit::fit_model;

    fn sampler() -> NutsSampler {
        NutsSampler::new(SamplerConfig {
            chains: 2,
            warmup: 100,
            draws: 50,
            ..SamplerConfig::default()
        })
    }

    #[test]
    fn existing_artifact_skips_fitting() {
        let dir = tempfile::tempdir().unwrap();
        let store = FitStore::new(dir.path().join("fits"));
        let spec = simple_spec();
        let tables = vec![poisson_panel(1, 20, 0.2, 5)];
        let sampler = sampler();
        let print = fingerprint(&spec, &tables, PosteriorSampler::config(&sampler)).unwrap();

        let first = store
            .get_or_fit(&spec, &print, false, || fit_model(&spec, &tables, &sampler, false))
            .unwrap();
        assert!(store.contains("model_1"));

        let mut called = false;
        let second = store
            .get_or_fit(&spec, &print, false, || {
                called = true;
                fit_model(&spec, &tables, &sampler, false)
            })
            .unwrap();
        assert!(!called);
        assert_eq!(second.fixed_draws, first.fixed_draws);
        assert_eq!(second.coefficient_names, first.coefficient_names);

        let mut refitted = false;
        store
            .get_or_fit(&spec, &print, true, || {
                refitted = true;
                fit_model(&spec, &tables, &sampler, false)
            })
            .unwrap();
        assert!(refitted);
    }

    #[test]
    fn fingerprint_tracks_data_and_settings() {
        let spec = simple_spec();
        let a = vec![poisson_panel(1, 10, 0.2, 5)];
        let b = vec![poisson_panel(1, 10, 0.2, 6)];
        let config = SamplerConfig::default();
        let base = fingerprint(&spec, &a, &config).unwrap();
        assert_eq!(base, fingerprint(&spec, &a, &config).unwrap());
        assert_ne!(base, fingerprint(&spec, &b, &config).unwrap());
        let longer = SamplerConfig {
            draws: 2000,
            ..config
        };
        assert_ne!(base, fingerprint(&spec, &a, &longer).unwrap());
    }
}
