//! Convergence summaries of one instance's chains.

use crate::shared::diagnostics::{Diagnostic, DiagnosticKind};
use crate::shared::stats::{effective_sample_size, split_rhat};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDiagnostics {
    pub name: String,
    pub rhat: f64,
    pub ess: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerDiagnostics {
    pub chains: usize,
    pub draws_per_chain: usize,
    pub max_rhat: f64,
    pub min_ess: f64,
    pub parameters: Vec<ParameterDiagnostics>,
    /// Set when R-hat exceeds the threshold.
    pub flagged: bool,
}

impl SamplerDiagnostics {
    /// `names` label the retained columns of every chain's draws.
    pub fn from_chains(chains: &[Array2<f64>], names: &[String], rhat_threshold: f64) -> Self {
        let draws_per_chain = chains.first().map_or(0, |c| c.nrows());
        let parameters: Vec<ParameterDiagnostics> = names
            .iter()
            .enumerate()
            .map(|(j, name)| {
                let per_chain: Vec<Vec<f64>> = chains.iter().map(|c| c.column(j).to_vec()).collect();
                ParameterDiagnostics {
                    name: name.clone(),
                    rhat: split_rhat(&per_chain),
                    ess: effective_sample_size(&per_chain),
                }
            })
            .collect();
        let max_rhat = parameters
            .iter()
            .map(|p| p.rhat)
            .filter(|r| !r.is_nan())
            .fold(f64::NAN, f64::max);
        let min_ess = parameters
            .iter()
            .map(|p| p.ess)
            .filter(|e| !e.is_nan())
            .fold(f64::NAN, f64::min);
        Self {
            chains: chains.len(),
            draws_per_chain,
            max_rhat,
            min_ess,
            parameters,
            flagged: max_rhat > rhat_threshold,
        }
    }

    /// The operator-facing diagnostic, if this fit is flagged.
    pub fn to_diagnostic(&self, model: &str, imputation: usize) -> Option<Diagnostic> {
        if !self.flagged {
            return None;
        }
        let worst = self
            .parameters
            .iter()
            .filter(|p| !p.rhat.is_nan())
            .max_by(|a, b| a.rhat.total_cmp(&b.rhat))
            .map_or("-", |p| p.name.as_str());
        Some(
            Diagnostic::new(
                DiagnosticKind::ModelFitDivergence,
                format!("{model}/imputation {imputation}"),
                format!(
                    "max R-hat {:.3} ({worst}), min ESS {:.0}; treat this fit as unreliable",
                    self.max_rhat, self.min_ess
                ),
            )
            .with_value(self.max_rhat),
        )
    }
}
