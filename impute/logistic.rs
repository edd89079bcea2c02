//! Ridge-penalized binary logistic regression for imputing 0/1 variables.

use crate::shared::linalg::{FaerCholesky, LinalgError};
use faer::Side;
use ndarray::{Array1, Array2, Axis};

const MAX_ITERATIONS: usize = 50;
const TOLERANCE: f64 = 1e-8;

pub(crate) fn sigmoid(eta: f64) -> f64 {
    if eta >= 0.0 {
        1.0 / (1.0 + (-eta).exp())
    } else {
        let e = eta.exp();
        e / (1.0 + e)
    }
}

/// Posterior mode and precision of the coefficients under a Gaussian
/// penalty of precision `ridge`.
#[derive(Debug, Clone)]
pub struct LogisticFit {
    pub beta: Array1<f64>,
    pub precision: Array2<f64>,
    pub iterations: usize,
}

/// Newton-Raphson (IRLS) on the penalized log-likelihood.
pub fn fit_logistic(x: &Array2<f64>, y: &Array1<f64>, ridge: f64) -> Result<LogisticFit, LinalgError> {
    let p = x.ncols();
    let mut beta = Array1::<f64>::zeros(p);
    let penalty = Array2::<f64>::eye(p) * ridge;
    let mut precision = penalty.clone();
    let mut iterations = 0;
    while iterations < MAX_ITERATIONS {
        iterations += 1;
        let mu = x.dot(&beta).mapv(sigmoid);
        let w = mu.mapv(|m| (m * (1.0 - m)).max(1e-10));
        let xw = x * &w.view().insert_axis(Axis(1));
        precision = xw.t().dot(x) + &penalty;
        let gradient = x.t().dot(&(y - &mu)) - &beta * ridge;
        let step = precision.cholesky(Side::Lower)?.solve_vec(&gradient);
        beta += &step;
        if step.iter().all(|s| s.abs() < TOLERANCE) {
            break;
        }
    }
    if iterations == MAX_ITERATIONS {
        log::debug!("Logistic imputation model stopped at the iteration cap");
    }
    Ok(LogisticFit {
        beta,
        precision,
        iterations,
    })
}
