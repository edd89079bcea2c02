//! Stage orchestration. Each stage reads the previous stage's artifact and
//! writes its own under the output directory.

use crate::config::{ConfigError, PipelineConfig};
use crate::derive::{DerivationReport, DeriveError, derive_table, load_raw_subjects};
use crate::impute::{ImputationArtifact, ImputeError, impute};
use crate::longitudinal::{ReshapeError, reshape_all};
use crate::mediation::{MediationError, MediationEstimate, mediation_estimates};
use crate::mixed::store::fingerprint;
use crate::mixed::{FitError, FitStore, NutsSampler, PooledFit, fit_model};
use crate::report::{self, ReportError};
use crate::shared::diagnostics::Diagnostic;
use crate::shared::table::SubjectTable;
use crate::study::StudyDesign;
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Derivation failed: {0}")]
    Derive(#[from] DeriveError),
    #[error("Imputation failed: {0}")]
    Impute(#[from] ImputeError),
    #[error("Reshaping failed: {0}")]
    Reshape(#[from] ReshapeError),
    #[error("Model fitting failed: {0}")]
    Fit(#[from] FitError),
    #[error("Mediation summary failed: {0}")]
    Mediation(#[from] MediationError),
    #[error("Report export failed: {0}")]
    Report(#[from] ReportError),
}

/// Results of a full run, as exported to the report tables.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub derivation: DerivationReport,
    pub fits: Vec<PooledFit>,
    pub mediation: Vec<MediationEstimate>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Reads the raw table, derives the indicators and writes `derived.csv`.
pub fn derive_stage(config: &PipelineConfig, design: &StudyDesign) -> Result<(SubjectTable, DerivationReport), PipelineError> {
    let raw = load_raw_subjects(&config.input, &design.rules)?;
    let (table, derivation) = derive_table(&raw, &design.rules)?;
    derivation.diagnostics().iter().for_each(Diagnostic::emit);
    report::write_subject_table(&config.derived_path(), &table)?;
    Ok((table, derivation))
}

/// Reuses `imputations.json` when it was produced with the current plan
/// and settings; otherwise imputes and saves a new artifact.
pub fn impute_stage(config: &PipelineConfig, design: &StudyDesign, table: &SubjectTable) -> Result<ImputationArtifact, PipelineError> {
    let path = config.imputation_path();
    if path.is_file() {
        let cached = ImputationArtifact::load(&path)?;
        let input = table.select(design.plan.variables()).map_err(ImputeError::from)?;
        if cached.matches(&design.plan, &config.imputation) && cached.original() == Some(&input) {
            log::info!("Reusing {} completed instances from {}", cached.imputations(), path.display());
            return Ok(cached);
        }
        log::info!("{} was produced from other inputs; imputing again", path.display());
    }
    let start = Instant::now();
    let artifact = impute(table, &design.plan, &config.imputation)?;
    log::info!(
        "Imputed {} instances in {:.1}s",
        artifact.imputations(),
        start.elapsed().as_secs_f64()
    );
    artifact.save(&path)?;
    Ok(artifact)
}

/// Reshapes every completed instance and fits each model of the family,
/// reusing cached fits from `fits/`.
pub fn fit_stage(config: &PipelineConfig, design: &StudyDesign, artifact: &ImputationArtifact) -> Result<Vec<PooledFit>, PipelineError> {
    let tables = reshape_all(artifact, &design.schema)?;
    let sampler = NutsSampler::new(config.sampler.clone());
    let store = FitStore::new(config.fits_dir());
    let mut fits = Vec::with_capacity(design.family.models.len());
    for spec in &design.family.models {
        let print = fingerprint(spec, &tables, &config.sampler).map_err(FitError::from)?;
        let fit = store.get_or_fit(spec, &print, config.refit, || {
            fit_model(spec, &tables, &sampler, config.show_progress)
        })?;
        fits.push(fit);
    }
    report::write_fixed_effects(&config.report_path("fixed_effects"), &fits)?;
    report::write_variance_components(&config.report_path("variance_components"), &fits)?;
    Ok(fits)
}

/// derive → impute → reshape → fit → mediation, then the report tables.
pub fn run_pipeline(config: &PipelineConfig) -> Result<PipelineOutput, PipelineError> {
    config.validate()?;
    let design = StudyDesign::cohort()?;
    log::info!("Running cohort pipeline on {}", config.input.display());

    let (table, derivation) = derive_stage(config, &design)?;
    let artifact = impute_stage(config, &design, &table)?;
    let fits = fit_stage(config, &design, &artifact)?;
    let mediation = mediation_estimates(&design.family, &fits, config.pairing_seed)?;
    report::write_mediation(&config.report_path("mediation"), &mediation)?;

    let diagnostics: Vec<Diagnostic> = derivation
        .diagnostics()
        .into_iter()
        .chain(artifact.diagnostics.iter().cloned())
        .chain(fits.iter().flat_map(|f| f.diagnostics.iter().cloned()))
        .chain(mediation.iter().flat_map(|m| m.diagnostics.iter().cloned()))
        .collect();
    report::write_diagnostics(&config.report_path("diagnostics"), &diagnostics)?;
    log::info!(
        "Finished: {} models, {} mediation estimates, {} diagnostics",
        fits.len(),
        mediation.len(),
        diagnostics.len()
    );
    Ok(PipelineOutput {
        derivation,
        fits,
        mediation,
        diagnostics,
    })
}
