use super::MediationError;
use super::draws::{CoefficientDraws, indirect_effect_draws, pair_draws, percent_mediated_draws};
use crate::mixed::{ModelFamily, PooledFit};
use crate::shared::diagnostics::{Diagnostic, DiagnosticKind};
use crate::shared::stats::{Summary, summarize};
use serde::{Deserialize, Serialize};

/// Mean and 95% interval of the log-scale indirect draws, exponentiated.
pub fn summarize_indirect(indirect: &[f64]) -> Option<Summary> {
    summarize(indirect).map(|s| s.map(f64::exp))
}

/// Mean and 95% interval of per-draw percent mediated.
pub fn summarize_percent(percent: &[f64]) -> Option<Summary> {
    summarize(percent)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediationEstimate {
    /// The mediator this estimate is labelled by.
    pub mediator: String,
    /// Every mediator in the adjusted model, joined with `+`. Models nest
    /// cumulatively, so a later mediator's indirect effect is joint with
    /// all earlier ones.
    pub adjusted_for: String,
    pub baseline_model: String,
    pub adjusted_model: String,
    pub exposure: String,
    /// Paired draws used.
    pub draws: usize,
    /// Risk-ratio scale.
    pub indirect: Option<Summary>,
    pub percent_mediated: Option<Summary>,
    pub excluded_zero_baseline: usize,
    pub diagnostics: Vec<Diagnostic>,
}

fn find_fit<'a>(fits: &'a [PooledFit], model: &str) -> Result<&'a PooledFit, MediationError> {
    fits.iter()
        .find(|f| f.model == model)
        .ok_or_else(|| MediationError::MissingFit(model.to_string()))
}

/// One estimate per mediator, each comparing the model that adds it with
/// the baseline model of `family`.
pub fn mediation_estimates(family: &ModelFamily, fits: &[PooledFit], seed: u64) -> Result<Vec<MediationEstimate>, MediationError> {
    let baseline_spec = family.baseline().ok_or(MediationError::NoBaseline)?;
    let baseline = CoefficientDraws::from_fit(find_fit(fits, &baseline_spec.name)?, &family.exposure)?;

    family
        .mediated()
        .enumerate()
        .map(|(k, (mediator, spec))| -> Result<MediationEstimate, MediationError> {
            let adjusted = CoefficientDraws::from_fit(find_fit(fits, &spec.name)?, &family.exposure)?;
            let paired = pair_draws(&baseline, &adjusted, seed)?;
            let indirect = indirect_effect_draws(&paired);
            let percent = percent_mediated_draws(&indirect, &paired.baseline);

            let mut diagnostics = Vec::new();
            if !paired.resampled.is_empty() {
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::PoolingMismatch,
                        format!("{}/{}", baseline.model, adjusted.model),
                        format!(
                            "draw counts differed in imputations {:?}; the longer side was subsampled",
                            paired.resampled
                        ),
                    )
                    .with_value(paired.resampled.len() as f64),
                );
            }
            if percent.excluded > 0 {
                log::warn!(
                    "{mediator}: {} draws with a zero baseline coefficient excluded from percent mediated",
                    percent.excluded
                );
            }
            diagnostics.iter().for_each(Diagnostic::emit);

            Ok(MediationEstimate {
                mediator: mediator.to_string(),
                adjusted_for: family.mediators[..=k].join("+"),
                baseline_model: baseline.model.clone(),
                adjusted_model: adjusted.model.clone(),
                exposure: family.exposure.clone(),
                draws: indirect.len(),
                indirect: summarize_indirect(&indirect),
                percent_mediated: summarize_percent(&percent.values),
                excluded_zero_baseline: percent.excluded,
                diagnostics,
            })
        })
        .collect()
}
