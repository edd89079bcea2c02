//! Posterior summaries and convergence statistics.
//!
//! R-hat follows Gelman et al. (BDA3, §11.4); the effective sample size uses
//! Geyer's initial positive sequence on the multi-chain autocorrelation
//! estimate, the same construction Stan reports.

use serde::{Deserialize, Serialize};

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Unbiased sample variance. `NaN` for fewer than two values.
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

/// Quantile by linear interpolation between order statistics
/// (Hyndman & Fan type 7, R's default). `sorted` must be ascending.
pub fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let h = (n - 1) as f64 * p.clamp(0.0, 1.0);
            let lo = h.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
        }
    }
}

/// Mean and central 95% interval of a set of draws.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub mean: f64,
    pub lower: f64,
    pub upper: f64,
}

impl Summary {
    pub fn map(self, f: impl Fn(f64) -> f64) -> Summary {
        Summary {
            mean: f(self.mean),
            lower: f(self.lower),
            upper: f(self.upper),
        }
    }
}

/// Summarizes finite draws; `None` when there are none.
pub fn summarize(draws: &[f64]) -> Option<Summary> {
    let mut sorted: Vec<f64> = draws.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    Some(Summary {
        mean: mean(&sorted),
        lower: quantile_sorted(&sorted, 0.025),
        upper: quantile_sorted(&sorted, 0.975),
    })
}

/// Potential scale reduction across chains of equal length.
///
/// Returns 1.0 when every chain is constant at the same value, and
/// infinity when chains are individually constant but disagree.
pub fn rhat(chains: &[Vec<f64>]) -> f64 {
    let m = chains.len();
    let n = chains.iter().map(Vec::len).min().unwrap_or(0);
    if m < 2 || n < 2 {
        return f64::NAN;
    }
    let chain_means: Vec<f64> = chains.iter().map(|c| mean(&c[..n])).collect();
    let within = chains.iter().map(|c| variance(&c[..n])).sum::<f64>() / m as f64;
    let between_over_n = variance(&chain_means);
    if within <= 0.0 {
        return if between_over_n <= 0.0 { 1.0 } else { f64::INFINITY };
    }
    let var_plus = (n - 1) as f64 / n as f64 * within + between_over_n;
    (var_plus / within).sqrt()
}

fn split_chains(chains: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let mut halves = Vec::with_capacity(chains.len() * 2);
    for chain in chains {
        let half = chain.len() / 2;
        halves.push(chain[..half].to_vec());
        halves.push(chain[chain.len() - half..].to_vec());
    }
    halves
}

/// R-hat on chains split in half, which also catches within-chain drift.
pub fn split_rhat(chains: &[Vec<f64>]) -> f64 {
    rhat(&split_chains(chains))
}

fn autocovariance(chain: &[f64], chain_mean: f64, lag: usize) -> f64 {
    let n = chain.len();
    if lag >= n {
        return 0.0;
    }
    chain[..n - lag]
        .iter()
        .zip(&chain[lag..])
        .map(|(a, b)| (a - chain_mean) * (b - chain_mean))
        .sum::<f64>()
        / n as f64
}

/// Effective sample size of the pooled chains.
pub fn effective_sample_size(chains: &[Vec<f64>]) -> f64 {
    let m = chains.len();
    let n = chains.iter().map(Vec::len).min().unwrap_or(0);
    if m == 0 || n < 4 {
        return f64::NAN;
    }
    let total = (m * n) as f64;
    let trimmed: Vec<&[f64]> = chains.iter().map(|c| &c[..n]).collect();
    let chain_means: Vec<f64> = trimmed.iter().map(|c| mean(c)).collect();
    let within = trimmed
        .iter()
        .zip(&chain_means)
        .map(|(c, &cm)| autocovariance(c, cm, 0) * n as f64 / (n - 1) as f64)
        .sum::<f64>()
        / m as f64;
    let between_over_n = if m > 1 { variance(&chain_means) } else { 0.0 };
    let var_plus = (n - 1) as f64 / n as f64 * within + between_over_n;
    if var_plus <= 0.0 || !var_plus.is_finite() {
        return total;
    }

    let rho = |lag: usize| -> f64 {
        let mean_autocov = trimmed
            .iter()
            .zip(&chain_means)
            .map(|(c, &cm)| autocovariance(c, cm, lag))
            .sum::<f64>()
            / m as f64;
        1.0 - (within - mean_autocov) / var_plus
    };

    // Geyer: sum consecutive pairs while positive, enforcing monotonicity.
    let mut tau = -1.0;
    let mut previous_pair = f64::INFINITY;
    let mut lag = 0;
    while lag + 1 < n {
        let pair = rho(lag) + rho(lag + 1);
        if pair <= 0.0 {
            break;
        }
        let pair = pair.min(previous_pair);
        tau += 2.0 * pair;
        previous_pair = pair;
        lag += 2;
    }
    let tau = tau.max(1.0 / total.log10().max(1.0));
    total / tau
}
