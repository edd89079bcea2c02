//! Chain-mean convergence checks across imputations.
//!
//! Each imputation is one chain; the monitored quantity is the mean of a
//! variable's imputed cells after every round. Only the second half of
//! the rounds is compared. Nothing here blocks the pipeline; the result
//! is reported alongside the artifact.

use super::ImputationArtifact;
use crate::shared::diagnostics::{Diagnostic, DiagnosticKind};
use crate::shared::stats::rhat;

/// R-hat of per-round means over the second half of each chain.
pub fn trace_rhat(chains: &[Vec<f64>]) -> f64 {
    let tails: Vec<Vec<f64>> = chains
        .iter()
        .map(|chain| chain[chain.len() / 2..].to_vec())
        .collect();
    rhat(&tails)
}

pub fn convergence_diagnostics(artifact: &ImputationArtifact, threshold: f64) -> Vec<Diagnostic> {
    if artifact.imputations() < 2 || artifact.iterations < 4 {
        return Vec::new();
    }
    artifact
        .traces
        .iter()
        .filter_map(|(variable, chains)| {
            let r = trace_rhat(chains);
            (r > threshold).then(|| {
                Diagnostic::new(
                    DiagnosticKind::ImputationNonconvergence,
                    variable.clone(),
                    format!("chain means have R-hat {r:.3} across imputations (threshold {threshold})"),
                )
                .with_value(r)
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impute::ImputationPlan;
    use std::collections::BTreeMap;

    fn artifact(traces: BTreeMap<String, Vec<Vec<f64>>>) -> ImputationArtifact {
        ImputationArtifact {
            seed: 1,
            iterations: 6,
            plan: ImputationPlan::new(),
            instances: vec![crate::shared::table::SubjectTable::new(Vec::new()); 3],
            traces,
            diagnostics: Vec::new(),
        }
    }

    #[test]
    fn separated_chains_are_reported() {
        let traces = BTreeMap::from([
            (
                "stuck".to_string(),
                vec![vec![0.0, 0.1, 0.0, 0.1, 0.0, 0.1], vec![0.9, 1.0, 0.9, 1.0, 0.9, 1.0]],
            ),
            (
                "mixed".to_string(),
                vec![vec![0.9, 0.1, 0.5, 0.4, 0.6, 0.5], vec![0.0, 0.6, 0.4, 0.6, 0.5, 0.4]],
            ),
        ]);
        let diags = convergence_diagnostics(&artifact(traces), 1.1);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].scope, "stuck");
        assert_eq!(diags[0].kind, DiagnosticKind::ImputationNonconvergence);
    }
}
