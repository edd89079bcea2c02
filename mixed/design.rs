use super::FitError;
use super::spec::{ModelSpec, Term};
use crate::longitudinal::LongTable;
use ndarray::{Array1, Array2};

/// Numeric inputs of one GLMM fit.
#[derive(Debug, Clone)]
pub struct DesignMatrices {
    /// Fixed-effect design, intercept first, shape `(n, p)`.
    pub x: Array2<f64>,
    /// Random-effect design, shape `(n, q)`.
    pub z: Array2<f64>,
    /// Group (subject) index of every row.
    pub group: Vec<usize>,
    pub n_groups: usize,
    pub y: Array1<f64>,
}

impl DesignMatrices {
    pub fn build(spec: &ModelSpec, long: &LongTable) -> Result<Self, FitError> {
        spec.validate()?;
        let n = long.n_rows();
        let column = |name: &str| {
            long.column(name).ok_or_else(|| FitError::ColumnNotFound {
                model: spec.name.clone(),
                column: name.to_string(),
            })
        };

        let raw_y = column(spec.outcome.variable())?;
        let y = raw_y
            .iter()
            .map(|&v| {
                spec.outcome.response(v).ok_or_else(|| FitError::InvalidOutcome {
                    model: spec.name.clone(),
                    value: v,
                })
            })
            .collect::<Result<Array1<f64>, _>>()?;

        let p = spec.coefficient_names().len();
        let mut x = Array2::<f64>::zeros((n, p));
        x.column_mut(0).fill(1.0);
        let mut offset = 1;
        for term in &spec.fixed {
            let values = column(term.variable())?;
            match term {
                Term::Continuous { variable } => {
                    if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
                        return Err(FitError::InvalidPredictor {
                            model: spec.name.clone(),
                            variable: variable.clone(),
                            value: *bad,
                        });
                    }
                    x.column_mut(offset).assign(values);
                    offset += 1;
                }
                Term::Categorical {
                    variable, levels, ..
                } => {
                    if let Some(bad) = values.iter().find(|&&v| !levels.iter().any(|&l| f64::from(l) == v)) {
                        return Err(FitError::InvalidPredictor {
                            model: spec.name.clone(),
                            variable: variable.clone(),
                            value: *bad,
                        });
                    }
                    for level in term.contrast_levels() {
                        let level = f64::from(level);
                        x.column_mut(offset).assign(&values.mapv(|v| if v == level { 1.0 } else { 0.0 }));
                        offset += 1;
                    }
                }
            }
        }

        let q = spec.random.dim();
        let mut z = Array2::<f64>::zeros((n, q));
        let mut slot = 0;
        if spec.random.intercept {
            z.column_mut(0).fill(1.0);
            slot = 1;
        }
        for slope in &spec.random.slopes {
            z.column_mut(slot).assign(column(slope)?);
            slot += 1;
        }

        Ok(Self {
            x,
            z,
            group: long.subject.clone(),
            n_groups: long.n_subjects(),
            y,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.y.len()
    }

    pub fn n_fixed(&self) -> usize {
        self.x.ncols()
    }

    pub fn n_random(&self) -> usize {
        self.z.ncols()
    }
}
