//! Predictor matrices for the conditional models.

use crate::shared::stats;
use crate::shared::table::VariableKind;
use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

/// Current completed values of one plan variable.
#[derive(Debug, Clone)]
pub struct VariableState {
    pub name: String,
    pub kind: VariableKind,
    pub values: Array1<f64>,
    /// Rows whose value is imputed rather than observed.
    pub missing: Vec<usize>,
}

impl VariableState {
    pub fn observed_rows(&self) -> Vec<usize> {
        let mut is_missing = vec![false; self.values.len()];
        for &i in &self.missing {
            is_missing[i] = true;
        }
        (0..self.values.len()).filter(|&i| !is_missing[i]).collect()
    }

    /// Number of predictor columns this variable contributes.
    fn width(&self) -> usize {
        match &self.kind {
            VariableKind::Categorical { levels } => levels.len().saturating_sub(1),
            VariableKind::Binary | VariableKind::Continuous => 1,
        }
    }

    fn encode_into(&self, mut out: ndarray::ArrayViewMut2<'_, f64>) {
        match &self.kind {
            VariableKind::Categorical { levels } => {
                for (j, level) in levels.iter().skip(1).enumerate() {
                    let level = f64::from(*level);
                    out.column_mut(j)
                        .iter_mut()
                        .zip(&self.values)
                        .for_each(|(cell, &v)| *cell = if v == level { 1.0 } else { 0.0 });
                }
            }
            VariableKind::Binary => out.column_mut(0).assign(&self.values),
            VariableKind::Continuous => {
                let values = self.values.to_vec();
                let mean = stats::mean(&values);
                let sd = stats::variance(&values).sqrt();
                let scale = if sd.is_finite() && sd > 0.0 { sd } else { 1.0 };
                out.column_mut(0)
                    .iter_mut()
                    .zip(&self.values)
                    .for_each(|(cell, &v)| *cell = (v - mean) / scale);
            }
        }
    }
}

/// Intercept plus every other variable: treatment dummies for categories
/// (first level as reference), 0/1 for binaries, standardized continuous.
pub fn predictor_matrix(states: &[VariableState], target: usize) -> Array2<f64> {
    let n = states.first().map_or(0, |s| s.values.len());
    let width: usize = 1 + states
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != target)
        .map(|(_, s)| s.width())
        .sum::<usize>();
    let mut x = Array2::zeros((n, width));
    x.column_mut(0).fill(1.0);
    let mut offset = 1;
    for (i, state) in states.iter().enumerate() {
        if i == target {
            continue;
        }
        let w = state.width();
        state.encode_into(x.slice_mut(ndarray::s![.., offset..offset + w]));
        offset += w;
    }
    x
}

pub fn take_rows(x: &Array2<f64>, rows: &[usize]) -> Array2<f64> {
    x.select(Axis(0), rows)
}

/// Draws `mode + C z` with `z ~ N(0, I)`.
pub fn perturb<R: Rng + ?Sized>(mode: &Array1<f64>, root: &Array2<f64>, rng: &mut R) -> Array1<f64> {
    let z: Array1<f64> = (0..mode.len()).map(|_| StandardNormal.sample(&mut *rng)).collect();
    mode + &root.dot(&z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn encodes_dummies_and_standardizes() {
        let states = vec![
            VariableState {
                name: "screen".into(),
                kind: VariableKind::Categorical { levels: vec![0, 1, 2] },
                values: array![0.0, 1.0, 2.0, 2.0],
                missing: vec![1],
            },
            VariableState {
                name: "flag".into(),
                kind: VariableKind::Binary,
                values: array![1.0, 0.0, 0.0, 1.0],
                missing: vec![],
            },
            VariableState {
                name: "age".into(),
                kind: VariableKind::Continuous,
                values: array![10.0, 12.0, 14.0, 16.0],
                missing: vec![],
            },
        ];
        let x = predictor_matrix(&states, 1);
        assert_eq!(x.dim(), (4, 4));
        assert_eq!(x.column(0).to_vec(), vec![1.0; 4]);
        assert_eq!(x.column(1).to_vec(), vec![0.0, 1.0, 0.0, 0.0]);
        assert_eq!(x.column(2).to_vec(), vec![0.0, 0.0, 1.0, 1.0]);
        assert!(x.column(3).sum().abs() < 1e-12);
        assert_eq!(states[0].observed_rows(), vec![0, 2, 3]);
    }
}
