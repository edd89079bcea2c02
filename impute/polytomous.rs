//! Ridge-penalized multinomial logistic regression for unordered
//! categorical variables, with the first level as the reference.

use crate::shared::linalg::{FaerCholesky, LinalgError};
use faer::Side;
use ndarray::{Array1, Array2, Axis, s};

const MAX_ITERATIONS: usize = 50;
const TOLERANCE: f64 = 1e-8;

/// Stacked coefficients: block `k` (rows `k*p .. (k+1)*p`) belongs to
/// non-reference level `k + 1`.
#[derive(Debug, Clone)]
pub struct PolytomousFit {
    pub n_levels: usize,
    pub beta: Array1<f64>,
    pub precision: Array2<f64>,
}

/// Category probabilities of every row, shape `(n, n_levels)`.
pub fn probabilities(x: &Array2<f64>, beta: &Array1<f64>, n_levels: usize) -> Array2<f64> {
    let (n, p) = x.dim();
    let mut eta = Array2::<f64>::zeros((n, n_levels));
    for k in 1..n_levels {
        let block = beta.slice(s![(k - 1) * p..k * p]);
        eta.column_mut(k).assign(&x.dot(&block));
    }
    for mut row in eta.rows_mut() {
        let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|e| (e - max).exp());
        let total = row.sum();
        row.mapv_inplace(|e| e / total);
    }
    eta
}

/// `y` holds level indices `0..n_levels`.
pub fn fit_polytomous(
    x: &Array2<f64>,
    y: &[usize],
    n_levels: usize,
    ridge: f64,
) -> Result<PolytomousFit, LinalgError> {
    let (n, p) = x.dim();
    let k1 = n_levels.saturating_sub(1);
    let dim = k1 * p;
    let mut beta = Array1::<f64>::zeros(dim);
    let mut precision = Array2::<f64>::eye(dim) * ridge;

    let mut indicator = Array2::<f64>::zeros((n, n_levels));
    for (i, &level) in y.iter().enumerate() {
        indicator[(i, level)] = 1.0;
    }

    for iteration in 0..MAX_ITERATIONS {
        let probs = probabilities(x, &beta, n_levels);
        let mut gradient = Array1::<f64>::zeros(dim);
        for k in 0..k1 {
            let residual = &indicator.column(k + 1) - &probs.column(k + 1);
            let block = x.t().dot(&residual) - &beta.slice(s![k * p..(k + 1) * p]) * ridge;
            gradient.slice_mut(s![k * p..(k + 1) * p]).assign(&block);
        }
        let mut hessian = Array2::<f64>::zeros((dim, dim));
        for k in 0..k1 {
            for l in k..k1 {
                let pk = probs.column(k + 1);
                let pl = probs.column(l + 1);
                let w: Array1<f64> = if k == l {
                    pk.mapv(|v| v * (1.0 - v))
                } else {
                    -(&pk * &pl)
                };
                let xw = x * &w.insert_axis(Axis(1));
                let mut block = xw.t().dot(x);
                if k == l {
                    block.diag_mut().mapv_inplace(|d| d + ridge);
                }
                hessian
                    .slice_mut(s![k * p..(k + 1) * p, l * p..(l + 1) * p])
                    .assign(&block);
                if k != l {
                    hessian
                        .slice_mut(s![l * p..(l + 1) * p, k * p..(k + 1) * p])
                        .assign(&block.t());
                }
            }
        }
        let step = hessian.cholesky(Side::Lower)?.solve_vec(&gradient);
        beta += &step;
        precision = hessian;
        if step.iter().all(|v| v.abs() < TOLERANCE) {
            log::trace!("Multinomial model converged after {} iterations", iteration + 1);
            break;
        }
    }
    Ok(PolytomousFit {
        n_levels,
        beta,
        precision,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    #[test]
    fn intercept_only_fit_matches_observed_shares() {
        let y = vec![0, 0, 1, 1, 1, 2, 2, 2, 2, 2];
        let x = Array2::<f64>::ones((y.len(), 1));
        let fit = fit_polytomous(&x, &y, 3, 1e-8).unwrap();
        let probs = probabilities(&x, &fit.beta, 3);
        assert_abs_diff_eq!(probs[(0, 0)], 0.2, epsilon = 1e-6);
        assert_abs_diff_eq!(probs[(0, 1)], 0.3, epsilon = 1e-6);
        assert_abs_diff_eq!(probs[(0, 2)], 0.5, epsilon = 1e-6);
        assert_eq!(fit.precision.dim(), (2, 2));
    }

    #[test]
    fn probabilities_sum_to_one() {
        let x = ndarray::array![[1.0, 3.0], [1.0, -2.0]];
        let beta = ndarray::array![0.5, 40.0, -1.0, 2.0];
        let probs = probabilities(&x, &beta, 3);
        for row in probs.rows() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-12);
            assert!(row.iter().all(|p| p.is_finite()));
        }
    }
}
