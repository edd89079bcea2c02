//! Thin bridge between `ndarray` storage and `faer` factorizations.
//!
//! Only the symmetric positive-definite path is needed here: Newton steps in
//! the imputation models and the covariance roots used to draw parameter
//! vectors from their approximate posteriors.

use faer::linalg::solvers::{self, Solve};
use faer::{Mat, MatRef, Side};
use ndarray::{Array1, Array2, ArrayBase, Data, Ix1, Ix2};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinalgError {
    #[error("Cholesky factorization failed: {0:?}")]
    Cholesky(solvers::LltError),
}

fn mat_to_array(mat: MatRef<'_, f64>) -> Array2<f64> {
    Array2::from_shape_fn((mat.nrows(), mat.ncols()), |(i, j)| mat[(i, j)])
}

enum FaerStorage<'a> {
    Borrowed(MatRef<'a, f64>),
    Owned(Mat<f64>),
}

impl FaerStorage<'_> {
    #[inline]
    fn as_ref(&self) -> MatRef<'_, f64> {
        match self {
            FaerStorage::Borrowed(view) => *view,
            FaerStorage::Owned(mat) => mat.as_ref(),
        }
    }
}

/// Zero-copy view of a standard- or Fortran-layout ndarray matrix.
pub struct FaerArrayView<'a> {
    storage: FaerStorage<'a>,
}

impl<'a> FaerArrayView<'a> {
    pub fn new<S: Data<Elem = f64>>(array: &'a ArrayBase<S, Ix2>) -> Self {
        let (rows, cols) = array.dim();
        let storage = match array.as_slice_memory_order() {
            Some(slice) if array.is_standard_layout() => {
                FaerStorage::Borrowed(MatRef::from_row_major_slice(slice, rows, cols))
            }
            Some(slice) if array.t().is_standard_layout() => {
                FaerStorage::Borrowed(MatRef::from_column_major_slice(slice, rows, cols))
            }
            _ => FaerStorage::Owned(Mat::from_fn(rows, cols, |i, j| array[(i, j)])),
        };
        Self { storage }
    }

    #[inline]
    pub fn as_ref(&self) -> MatRef<'_, f64> {
        self.storage.as_ref()
    }
}

pub struct FaerColView<'a> {
    storage: FaerStorage<'a>,
}

impl<'a> FaerColView<'a> {
    pub fn new<S: Data<Elem = f64>>(array: &'a ArrayBase<S, Ix1>) -> Self {
        let len = array.len();
        let storage = match array.as_slice() {
            Some(slice) => FaerStorage::Borrowed(MatRef::from_row_major_slice(slice, len, 1)),
            None => FaerStorage::Owned(Mat::from_fn(len, 1, |i, _| array[i])),
        };
        Self { storage }
    }

    #[inline]
    pub fn as_ref(&self) -> MatRef<'_, f64> {
        self.storage.as_ref()
    }
}

pub struct FaerCholeskyFactor {
    factor: solvers::Llt<f64>,
}

impl FaerCholeskyFactor {
    pub fn solve_vec(&self, rhs: &Array1<f64>) -> Array1<f64> {
        let rhs_view = FaerColView::new(rhs);
        let sol = self.factor.solve(rhs_view.as_ref());
        Array1::from_shape_fn(rhs.len(), |i| sol[(i, 0)])
    }

    pub fn solve_mat(&self, rhs: &Array2<f64>) -> Array2<f64> {
        let rhs_view = FaerArrayView::new(rhs);
        let sol = self.factor.solve(rhs_view.as_ref());
        mat_to_array(sol.as_ref())
    }

    /// The lower-triangular factor `L` with `A = L Lᵀ`.
    pub fn lower(&self) -> Array2<f64> {
        mat_to_array(self.factor.L())
    }
}

pub trait FaerCholesky {
    fn cholesky(&self, side: Side) -> Result<FaerCholeskyFactor, LinalgError>;
}

impl<S: Data<Elem = f64>> FaerCholesky for ArrayBase<S, Ix2> {
    fn cholesky(&self, side: Side) -> Result<FaerCholeskyFactor, LinalgError> {
        let faer_view = FaerArrayView::new(self);
        let factor = faer_view
            .as_ref()
            .llt(side)
            .map_err(LinalgError::Cholesky)?;
        Ok(FaerCholeskyFactor { factor })
    }
}

/// Given a precision (negative Hessian) matrix `H`, returns `C` with
/// `C Cᵀ = H⁻¹`, so `mode + C z` with `z ~ N(0, I)` is a draw from the
/// Gaussian approximation to the posterior.
pub fn covariance_root(precision: &Array2<f64>) -> Result<Array2<f64>, LinalgError> {
    let dim = precision.nrows();
    let factor = precision.cholesky(Side::Lower)?;
    let covariance = factor.solve_mat(&Array2::eye(dim));
    // Symmetrize before the second factorization; the solve leaves
    // rounding-level asymmetry.
    let symmetric = (&covariance + &covariance.t()) * 0.5;
    Ok(symmetric.cholesky(Side::Lower)?.lower())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn cholesky_solves_spd_system() {
        let a = array![[4.0, 1.0], [1.0, 3.0]];
        let b = array![1.0, 2.0];
        let x = a.cholesky(Side::Lower).unwrap().solve_vec(&b);
        let back = a.dot(&x);
        assert_abs_diff_eq!(back[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(back[1], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn covariance_root_reproduces_inverse() {
        let h = array![[4.0, 1.0], [1.0, 3.0]];
        let c = covariance_root(&h).unwrap();
        let cov = c.dot(&c.t());
        let identity = h.dot(&cov);
        assert_abs_diff_eq!(identity[(0, 0)], 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(identity[(0, 1)], 0.0, epsilon = 1e-10);
        assert_abs_diff_eq!(identity[(1, 1)], 1.0, epsilon = 1e-10);
    }

    #[test]
    fn non_positive_definite_matrix_is_rejected() {
        let h = array![[1.0, 2.0], [2.0, 1.0]];
        assert!(h.cholesky(Side::Lower).is_err());
    }
}
