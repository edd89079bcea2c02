//! Predictive mean matching.
//!
//! Fits a ridge least-squares regression on the observed rows, draws
//! (σ*, β*) from its posterior, predicts the missing rows with β* and the
//! observed rows with β̂, then copies the observed value of a donor picked
//! at random among the nearest predictions.

use super::design::perturb;
use crate::shared::linalg::{FaerCholesky, LinalgError, covariance_root};
use faer::Side;
use ndarray::{Array1, Array2};
use rand::Rng;
use rand::seq::SliceRandom;
use rand_distr::{ChiSquared, Distribution};

#[derive(Debug, Clone)]
pub struct LinearDraw {
    pub beta_hat: Array1<f64>,
    pub beta_star: Array1<f64>,
    pub sigma_star: f64,
}

pub fn draw_linear<R: Rng + ?Sized>(
    x: &Array2<f64>,
    y: &Array1<f64>,
    ridge: f64,
    rng: &mut R,
) -> Result<LinearDraw, LinalgError> {
    let (n, p) = x.dim();
    let mut xtx = x.t().dot(x);
    xtx.diag_mut().mapv_inplace(|d| d + ridge);
    let beta_hat = xtx.cholesky(Side::Lower)?.solve_vec(&x.t().dot(y));
    let residual = y - &x.dot(&beta_hat);
    let rss = residual.dot(&residual);
    let df = n.saturating_sub(p).max(1) as f64;
    let chi2 = ChiSquared::new(df).map(|d| d.sample(&mut *rng)).unwrap_or(df);
    let sigma_star = (rss / chi2).sqrt();
    let root = covariance_root(&xtx)?;
    let beta_star = perturb(&beta_hat, &(root * sigma_star), rng);
    Ok(LinearDraw {
        beta_hat,
        beta_star,
        sigma_star,
    })
}

/// For each target prediction, picks one of the `donors` observed rows
/// with the closest prediction and returns its observed value.
pub fn match_donors<R: Rng + ?Sized>(
    observed_pred: &Array1<f64>,
    observed_values: &Array1<f64>,
    target_pred: &Array1<f64>,
    donors: usize,
    rng: &mut R,
) -> Vec<f64> {
    let donors = donors.clamp(1, observed_pred.len().max(1));
    target_pred
        .iter()
        .map(|&target| {
            let mut distances: Vec<(f64, usize)> = observed_pred
                .iter()
                .enumerate()
                .map(|(i, &pred)| ((pred - target).abs(), i))
                .collect();
            let k = donors.min(distances.len());
            if k < distances.len() {
                distances.select_nth_unstable_by(k - 1, |a, b| a.0.total_cmp(&b.0));
            }
            distances[..k]
                .choose(&mut *rng)
                .map_or(f64::NAN, |&(_, i)| observed_values[i])
        })
        .collect()
}
