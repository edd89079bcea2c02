use super::MediationError;
use crate::mixed::PooledFit;
use crate::shared::seeding::stream_rng;
use rand::seq::index;

/// One coefficient's pooled draws, kept in per-imputation blocks so that
/// pairing never crosses imputation instances.
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientDraws {
    pub model: String,
    /// `(imputation, draws)` in pooling order.
    pub blocks: Vec<(usize, Vec<f64>)>,
}

impl CoefficientDraws {
    pub fn from_fit(fit: &PooledFit, coefficient: &str) -> Result<Self, MediationError> {
        let column = fit
            .coefficient_draws(coefficient)
            .ok_or_else(|| MediationError::MissingCoefficient {
                model: fit.model.clone(),
                coefficient: coefficient.to_string(),
            })?;
        let recorded: usize = fit.instances.iter().map(|i| i.draws).sum();
        if recorded != column.len() {
            return Err(MediationError::DrawCountMismatch {
                model: fit.model.clone(),
                recorded,
                pooled: column.len(),
            });
        }
        let mut blocks = Vec::with_capacity(fit.instances.len());
        let mut start = 0;
        for instance in &fit.instances {
            let end = start + instance.draws;
            blocks.push((instance.imputation, column[start..end].to_vec()));
            start = end;
        }
        Ok(Self {
            model: fit.model.clone(),
            blocks,
        })
    }

    pub fn total(&self) -> usize {
        self.blocks.iter().map(|(_, d)| d.len()).sum()
    }

    pub fn imputations(&self) -> Vec<usize> {
        self.blocks.iter().map(|(m, _)| *m).collect()
    }
}

/// Element-wise aligned baseline and adjusted draws.
#[derive(Debug, Clone, PartialEq)]
pub struct PairedDraws {
    pub baseline: Vec<f64>,
    pub adjusted: Vec<f64>,
    /// Imputations whose draw counts differed and were subsampled.
    pub resampled: Vec<usize>,
}

/// Keeps `n` of `draws`, chosen without replacement, in their original order.
fn subsample(draws: &[f64], n: usize, seed: u64, imputation: usize) -> Vec<f64> {
    let mut rng = stream_rng(seed, &[imputation as u64]);
    let mut keep = index::sample(&mut rng, draws.len(), n).into_vec();
    keep.sort_unstable();
    keep.into_iter().map(|i| draws[i]).collect()
}

/// Pairs draws by index within each imputation. Where an imputation has
/// unequal counts, the longer side is subsampled to the shorter one.
pub fn pair_draws(baseline: &CoefficientDraws, adjusted: &CoefficientDraws, seed: u64) -> Result<PairedDraws, MediationError> {
    for side in [baseline, adjusted] {
        if side.total() == 0 {
            return Err(MediationError::EmptyDraws(side.model.clone()));
        }
    }
    if baseline.imputations() != adjusted.imputations() {
        return Err(MediationError::PoolingMismatch {
            baseline: baseline.model.clone(),
            adjusted: adjusted.model.clone(),
            reason: format!(
                "imputation sets differ ({:?} vs {:?})",
                baseline.imputations(),
                adjusted.imputations()
            ),
        });
    }
    let mut paired = PairedDraws {
        baseline: Vec::with_capacity(baseline.total()),
        adjusted: Vec::with_capacity(adjusted.total()),
        resampled: Vec::new(),
    };
    for ((m, b), (_, a)) in baseline.blocks.iter().zip(&adjusted.blocks) {
        if b.len() == a.len() {
            paired.baseline.extend_from_slice(b);
            paired.adjusted.extend_from_slice(a);
            continue;
        }
        let n = b.len().min(a.len());
        log::info!(
            "Imputation {m}: resampling {} and {} draws to {n} before pairing",
            b.len(),
            a.len()
        );
        paired.baseline.extend(if b.len() > n { subsample(b, n, seed, *m) } else { b.clone() });
        paired.adjusted.extend(if a.len() > n { subsample(a, n, seed, *m) } else { a.clone() });
        paired.resampled.push(*m);
    }
    Ok(paired)
}

/// Log-scale indirect effect per draw: baseline minus adjusted.
pub fn indirect_effect_draws(paired: &PairedDraws) -> Vec<f64> {
    paired
        .baseline
        .iter()
        .zip(&paired.adjusted)
        .map(|(b, a)| b - a)
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct PercentDraws {
    pub values: Vec<f64>,
    /// Draws dropped because the baseline coefficient was exactly zero.
    pub excluded: usize,
}

/// `indirect / baseline × 100` per draw, skipping zero baselines.
pub fn percent_mediated_draws(indirect: &[f64], baseline: &[f64]) -> PercentDraws {
    let mut values = Vec::with_capacity(indirect.len());
    let mut excluded = 0;
    for (&ind, &base) in indirect.iter().zip(baseline) {
        if base == 0.0 {
            excluded += 1;
        } else {
            values.push(ind / base * 100.0);
        }
    }
    PercentDraws { values, excluded }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn draws(model: &str, blocks: Vec<(usize, Vec<f64>)>) -> CoefficientDraws {
        CoefficientDraws {
            model: model.into(),
            blocks,
        }
    }

    #[test]
    fn indirect_and_percent_are_computed_per_draw() {
        let base = draws("model_1", vec![(1, vec![0.40, 0.42, 0.38])]);
        let adj = draws("model_2", vec![(1, vec![0.20, 0.22, 0.18])]);
        let paired = pair_draws(&base, &adj, 1).unwrap();
        assert!(paired.resampled.is_empty());
        let indirect = indirect_effect_draws(&paired);
        for d in &indirect {
            assert_abs_diff_eq!(*d, 0.20, epsilon = 1e-12);
        }
        let percent = percent_mediated_draws(&indirect, &paired.baseline);
        assert_eq!(percent.excluded, 0);
        assert_abs_diff_eq!(percent.values[0], 50.0, epsilon = 1e-9);
        assert_abs_diff_eq!(percent.values[1], 47.619_047_619, epsilon = 1e-6);
        assert_abs_diff_eq!(percent.values[2], 52.631_578_947, epsilon = 1e-6);
    }

    #[test]
    fn zero_baseline_draws_are_excluded() {
        let percent = percent_mediated_draws(&[0.1, 0.2], &[0.0, 0.4]);
        assert_eq!(percent.excluded, 1);
        assert_eq!(percent.values.len(), 1);
        assert!(percent.values.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn unequal_counts_are_subsampled_within_imputation() {
        let base = draws("model_1", vec![(1, vec![1.0, 2.0, 3.0, 4.0]), (2, vec![5.0, 6.0])]);
        let adj = draws("model_2", vec![(1, vec![0.5, 0.5]), (2, vec![0.1, 0.2])]);
        let paired = pair_draws(&base, &adj, 9).unwrap();
        assert_eq!(paired.resampled, vec![1]);
        assert_eq!(paired.baseline.len(), 4);
        assert_eq!(paired.adjusted.len(), 4);
        assert!(paired.baseline[..2].iter().all(|v| (1.0..=4.0).contains(v)));
        assert!(paired.baseline[0] < paired.baseline[1]);
        assert_eq!(&paired.baseline[2..], &[5.0, 6.0]);
        assert_eq!(pair_draws(&base, &adj, 9).unwrap(), paired);
    }

    #[test]
    fn differing_imputation_sets_are_rejected() {
        let base = draws("model_1", vec![(1, vec![1.0]), (2, vec![1.0])]);
        let adj = draws("model_2", vec![(1, vec![1.0]), (3, vec![1.0])]);
        assert!(matches!(
            pair_draws(&base, &adj, 0),
            Err(MediationError::PoolingMismatch { .. })
        ));
        let empty = draws("model_3", vec![(1, vec![])]);
        assert!(matches!(pair_draws(&empty, &adj, 0), Err(MediationError::EmptyDraws(_))));
    }

    fn fit_with_counts(counts: &[(usize, usize)], pooled: usize) -> PooledFit {
        use crate::mixed::{InstanceFit, SamplerDiagnostics};
        use ndarray::Array2;
        let diagnostics = SamplerDiagnostics::from_chains(&[], &[], 1.05);
        PooledFit {
            model: "model_2".into(),
            coefficient_names: vec!["(Intercept)".into(), "x".into()],
            random_names: vec!["sd((Intercept))".into()],
            instances: counts
                .iter()
                .map(|&(imputation, draws)| InstanceFit {
                    imputation,
                    draws,
                    diagnostics: diagnostics.clone(),
                })
                .collect(),
            fixed_draws: Array2::from_shape_fn((pooled, 2), |(i, j)| (i * 2 + j) as f64),
            sd_draws: Array2::from_elem((pooled, 1), 0.5),
            diagnostics: Vec::new(),
        }
    }

    #[test]
    fn blocks_follow_recorded_instance_counts() {
        let fit = fit_with_counts(&[(1, 2), (2, 3)], 5);
        let draws = CoefficientDraws::from_fit(&fit, "x").unwrap();
        assert_eq!(draws.imputations(), vec![1, 2]);
        assert_eq!(draws.blocks[0].1, vec![1.0, 3.0]);
        assert_eq!(draws.blocks[1].1, vec![5.0, 7.0, 9.0]);
    }

    #[test]
    fn inconsistent_instance_counts_fail_loudly() {
        for (counts, pooled) in [(vec![(1, 2), (2, 3)], 4), (vec![(1, 2), (2, 1)], 5)] {
            let fit = fit_with_counts(&counts, pooled);
            match CoefficientDraws::from_fit(&fit, "x") {
                Err(MediationError::DrawCountMismatch { model, recorded, pooled: found }) => {
                    assert_eq!(model, "model_2");
                    assert_eq!(recorded, counts.iter().map(|c| c.1).sum::<usize>());
                    assert_eq!(found, pooled);
                }
                other => panic!("expected a draw count mismatch, got {other:?}"),
            }
        }
    }
}
