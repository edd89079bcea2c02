//! Per-instance fitting and pooling across imputations.

use super::FitError;
use super::design::DesignMatrices;
use super::diagnostics::SamplerDiagnostics;
use super::hmc::PosteriorSampler;
use super::posterior::GlmmPosterior;
use super::spec::ModelSpec;
use crate::longitudinal::LongTable;
use crate::shared::diagnostics::Diagnostic;
use crate::shared::seeding::stream_seed;
use crate::shared::stats::{Summary, summarize};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use itertools::Itertools;
use ndarray::{Array2, Axis, concatenate, s};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::IsTerminal;

/// Sampling summary of one imputation instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceFit {
    pub imputation: usize,
    pub draws: usize,
    pub diagnostics: SamplerDiagnostics,
}

/// Retained draws of one model pooled over every imputation by
/// concatenation, in imputation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PooledFit {
    pub model: String,
    pub coefficient_names: Vec<String>,
    pub random_names: Vec<String>,
    pub instances: Vec<InstanceFit>,
    /// Shape `(total draws, coefficients)`.
    pub fixed_draws: Array2<f64>,
    /// Random-effect standard deviations, shape `(total draws, components)`.
    pub sd_draws: Array2<f64>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedEffectSummary {
    pub term: String,
    /// Log-scale coefficient.
    pub coefficient: Summary,
    /// `exp` of the coefficient summary.
    pub risk_ratio: Summary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarianceSummary {
    /// e.g. `var(time)`
    pub component: String,
    pub variance: Summary,
}

impl PooledFit {
    pub fn imputations(&self) -> Vec<usize> {
        self.instances.iter().map(|i| i.imputation).collect()
    }

    pub fn total_draws(&self) -> usize {
        self.fixed_draws.nrows()
    }

    pub fn is_flagged(&self) -> bool {
        self.instances.iter().any(|i| i.diagnostics.flagged)
    }

    pub fn coefficient_draws(&self, name: &str) -> Option<Vec<f64>> {
        let j = self.coefficient_names.iter().position(|n| n == name)?;
        Some(self.fixed_draws.column(j).to_vec())
    }

    /// Pooled mean and 2.5/97.5 percentiles per coefficient, with the
    /// corresponding risk ratios.
    pub fn fixed_effects(&self) -> Vec<FixedEffectSummary> {
        self.coefficient_names
            .iter()
            .enumerate()
            .filter_map(|(j, name)| {
                let coefficient = summarize(&self.fixed_draws.column(j).to_vec())?;
                Some(FixedEffectSummary {
                    term: name.clone(),
                    coefficient,
                    risk_ratio: coefficient.map(f64::exp),
                })
            })
            .collect()
    }

    /// Summaries of the squared standard-deviation draws.
    pub fn variance_components(&self) -> Vec<VarianceSummary> {
        self.random_names
            .iter()
            .enumerate()
            .filter_map(|(k, name)| {
                let squared: Vec<f64> = self.sd_draws.column(k).iter().map(|sd| sd * sd).collect();
                Some(VarianceSummary {
                    component: name.replacen("sd(", "var(", 1),
                    variance: summarize(&squared)?,
                })
            })
            .collect()
    }
}

/// Fits one instance: every chain from `seed`. A failed chain fails the
/// instance.
pub fn fit_instance<S: PosteriorSampler>(
    spec: &ModelSpec,
    long: &LongTable,
    sampler: &S,
    seed: u64,
) -> Result<(InstanceFit, Array2<f64>), FitError> {
    let config = sampler.config();
    let design = DesignMatrices::build(spec, long)?;
    let posterior = GlmmPosterior::new(&design);
    let chains = sampler.run_chains(&posterior, seed)?;

    let names = spec
        .coefficient_names()
        .into_iter()
        .chain(spec.random_names().into_iter().map(|n| n.replacen("sd(", "log_sd(", 1)))
        .collect_vec();
    let diagnostics = SamplerDiagnostics::from_chains(&chains, &names, config.rhat_threshold);
    let views = chains.iter().map(|c| c.view()).collect_vec();
    let draws = concatenate(Axis(0), &views)?;
    log::debug!(
        "{} imputation {}: {} draws, max R-hat {:.3}, min ESS {:.0}",
        spec.name,
        long.imputation,
        draws.nrows(),
        diagnostics.max_rhat,
        diagnostics.min_ess
    );
    Ok((
        InstanceFit {
            imputation: long.imputation,
            draws: draws.nrows(),
            diagnostics,
        },
        draws,
    ))
}

fn progress_bar(len: u64, message: &str, show: bool) -> ProgressBar {
    let draw_target = if show && std::io::stderr().is_terminal() {
        ProgressDrawTarget::stderr_with_hz(10)
    } else {
        ProgressDrawTarget::hidden()
    };
    let pb = ProgressBar::with_draw_target(Some(len), draw_target);
    if let Ok(style) = ProgressStyle::with_template("> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} imputations ({eta}) {msg}") {
        pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
    }
    pb.set_message(message.to_string());
    pb
}

/// Fits `spec` to every long table in parallel and pools the retained
/// draws by concatenation in imputation order. Flagged instances are kept
/// and reported, never dropped or refitted.
pub fn fit_model<S: PosteriorSampler>(
    spec: &ModelSpec,
    tables: &[LongTable],
    sampler: &S,
    show_progress: bool,
) -> Result<PooledFit, FitError> {
    sampler.config().validate()?;
    spec.validate()?;
    if tables.is_empty() {
        return Err(FitError::NoInstances(spec.name.clone()));
    }
    log::info!("Fitting {} to {} imputations", spec.name, tables.len());
    let pb = progress_bar(tables.len() as u64, &spec.name, show_progress);
    let seed = sampler.config().seed;
    let fitted = tables
        .par_iter()
        .map(|long| {
            let result = fit_instance(spec, long, sampler, stream_seed(seed, long.imputation as u64));
            pb.inc(1);
            result
        })
        .collect::<Result<Vec<_>, _>>()?;
    pb.finish_and_clear();

    let (instances, draws): (Vec<InstanceFit>, Vec<Array2<f64>>) = fitted.into_iter().unzip();
    let views = draws.iter().map(|d| d.view()).collect_vec();
    let pooled = concatenate(Axis(0), &views)?;
    let p = spec.coefficient_names().len();
    let fixed_draws = pooled.slice(s![.., ..p]).to_owned();
    let sd_draws = pooled.slice(s![.., p..]).mapv(f64::exp);

    let diagnostics = instances
        .iter()
        .filter_map(|i| i.diagnostics.to_diagnostic(&spec.name, i.imputation))
        .collect_vec();
    diagnostics.iter().for_each(Diagnostic::emit);

    Ok(PooledFit {
        model: spec.name.clone(),
        coefficient_names: spec.coefficient_names(),
        random_names: spec.random_names(),
        instances,
        fixed_draws,
        sd_draws,
        diagnostics,
    })
}
