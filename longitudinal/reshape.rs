//! Wide-to-long conversion and the person-level transforms.

use super::{LongitudinalSchema, ReshapeError};
use crate::impute::ImputationArtifact;
use crate::shared::table::{Column, SubjectTable, VariableKind, WaveId, wave_column};
use ahash::AHashMap;
use ndarray::Array1;
use rayon::prelude::*;
use std::collections::BTreeMap;

pub const TIME: &str = "time";
pub const AGE: &str = "age";
pub const AGE_GMC: &str = "age_gmc";

pub fn person_mean_column(stem: &str) -> String {
    format!("{stem}_pm")
}

pub fn person_centered_column(stem: &str) -> String {
    format!("{stem}_pmc")
}

/// Person-period rows of one completed imputation instance.
#[derive(Debug, Clone, PartialEq)]
pub struct LongTable {
    pub imputation: usize,
    /// Person identifier of every subject index.
    pub subjects: Vec<String>,
    /// Subject index of every row; rows of a subject are contiguous.
    pub subject: Vec<usize>,
    pub wave: Vec<WaveId>,
    columns: BTreeMap<String, Array1<f64>>,
    kinds: BTreeMap<String, VariableKind>,
}

impl LongTable {
    pub fn n_rows(&self) -> usize {
        self.subject.len()
    }

    pub fn n_subjects(&self) -> usize {
        self.subjects.len()
    }

    pub fn pid(&self, row: usize) -> &str {
        &self.subjects[self.subject[row]]
    }

    pub fn column(&self, name: &str) -> Option<&Array1<f64>> {
        self.columns.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&Array1<f64>, ReshapeError> {
        self.column(name)
            .ok_or_else(|| ReshapeError::ColumnNotFound(name.to_string()))
    }

    pub fn kind(&self, name: &str) -> Option<&VariableKind> {
        self.kinds.get(name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Re-aggregates rows into one row per subject with `<stem>_wK`
    /// columns; cells of waves without a row are missing.
    pub fn to_wide(&self, stems: &[&str], waves: &[WaveId]) -> Result<SubjectTable, ReshapeError> {
        let rows: AHashMap<(usize, WaveId), usize> = self
            .subject
            .iter()
            .zip(&self.wave)
            .enumerate()
            .map(|(row, (&s, &w))| ((s, w), row))
            .collect();
        let mut table = SubjectTable::new(self.subjects.clone());
        for &wave in waves {
            for &stem in stems {
                let values = self.require(stem)?;
                let kind = self.kind(stem).cloned().unwrap_or(VariableKind::Continuous);
                let cells = (0..self.n_subjects())
                    .map(|s| rows.get(&(s, wave)).map(|&row| values[row]))
                    .collect();
                table.push_column(Column::new(wave_column(stem, wave), kind, cells))?;
            }
        }
        Ok(table)
    }

    fn insert(&mut self, name: String, kind: VariableKind, values: Vec<f64>) {
        self.kinds.insert(name.clone(), kind);
        self.columns.insert(name, Array1::from(values));
    }
}

fn cell(table: &SubjectTable, column: &str, row: usize) -> Result<f64, ReshapeError> {
    table.require(column)?.values[row].ok_or_else(|| ReshapeError::IncompleteCell {
        column: column.to_string(),
        pid: table.pids()[row].clone(),
    })
}

/// Emits one row per (subject, present wave), then adds the person-mean
/// and person-mean-centred columns and grand-mean-centred age.
///
/// Age is centred on the mean over person-period rows, so subjects seen at
/// more waves carry more weight, matching the weighting of the model.
pub fn reshape(instance: &SubjectTable, imputation: usize, schema: &LongitudinalSchema) -> Result<LongTable, ReshapeError> {
    schema.validate()?;
    let mut subjects = Vec::new();
    let mut subject = Vec::new();
    let mut wave = Vec::new();
    let mut time = Vec::new();
    let mut age = Vec::new();
    let mut varying: Vec<Vec<f64>> = vec![Vec::new(); schema.time_varying.len()];
    let mut invariant: Vec<Vec<f64>> = vec![Vec::new(); schema.time_invariant.len()];

    for (row, pid) in instance.pids().iter().enumerate() {
        let mut has_rows = false;
        for wt in &schema.waves {
            let present = cell(instance, &wave_column(&schema.presence_stem, wt.wave), row)?;
            if present != 1.0 {
                continue;
            }
            if !has_rows {
                subjects.push(pid.clone());
                has_rows = true;
            }
            subject.push(subjects.len() - 1);
            wave.push(wt.wave);
            time.push(wt.time);
            age.push(cell(instance, &wave_column(&schema.age_stem, wt.wave), row)?);
            for (values, stem) in varying.iter_mut().zip(&schema.time_varying) {
                values.push(cell(instance, &wave_column(stem, wt.wave), row)?);
            }
            for (values, name) in invariant.iter_mut().zip(&schema.time_invariant) {
                values.push(cell(instance, name, row)?);
            }
        }
    }
    if subject.is_empty() {
        return Err(ReshapeError::NoRows(imputation));
    }

    let mut long = LongTable {
        imputation,
        subjects,
        subject,
        wave,
        columns: BTreeMap::new(),
        kinds: BTreeMap::new(),
    };
    let grand_mean = age.iter().sum::<f64>() / age.len() as f64;
    long.insert(AGE_GMC.to_string(), VariableKind::Continuous, age.iter().map(|a| a - grand_mean).collect());
    long.insert(AGE.to_string(), VariableKind::Continuous, age);
    long.insert(TIME.to_string(), VariableKind::Continuous, time);

    for (stem, values) in schema.time_varying.iter().zip(varying) {
        let first_wave = wave_column(stem, schema.waves[0].wave);
        let kind = instance.require(&first_wave)?.kind.clone();
        if schema.centered.contains(stem) {
            let means = person_means(&long.subject, long.n_subjects(), &values);
            let pm: Vec<f64> = long.subject.iter().map(|&s| means[s]).collect();
            let pmc: Vec<f64> = values.iter().zip(&pm).map(|(v, m)| v - m).collect();
            long.insert(person_mean_column(stem), VariableKind::Continuous, pm);
            long.insert(person_centered_column(stem), VariableKind::Continuous, pmc);
        }
        long.insert(stem.clone(), kind, values);
    }
    for (name, values) in schema.time_invariant.iter().zip(invariant) {
        let kind = instance.require(name)?.kind.clone();
        long.insert(name.clone(), kind, values);
    }
    Ok(long)
}

/// Arithmetic mean of `values` per subject index.
pub fn person_means(subject: &[usize], n_subjects: usize, values: &[f64]) -> Vec<f64> {
    let mut sums = vec![0.0; n_subjects];
    let mut counts = vec![0usize; n_subjects];
    for (&s, &v) in subject.iter().zip(values) {
        sums[s] += v;
        counts[s] += 1;
    }
    sums.iter()
        .zip(&counts)
        .map(|(&sum, &n)| if n > 0 { sum / n as f64 } else { f64::NAN })
        .collect()
}

/// Reshapes every completed instance (1..=M) in parallel, in order.
pub fn reshape_all(artifact: &ImputationArtifact, schema: &LongitudinalSchema) -> Result<Vec<LongTable>, ReshapeError> {
    let completed: Vec<(usize, &SubjectTable)> = artifact.completed().collect();
    if completed.is_empty() {
        return Err(ReshapeError::NoImputations);
    }
    let tables = completed
        .into_par_iter()
        .map(|(m, instance)| reshape(instance, m, schema))
        .collect::<Result<Vec<_>, _>>()?;
    log::info!(
        "Reshaped {} imputations into {} person-period rows each (first instance)",
        tables.len(),
        tables.first().map_or(0, LongTable::n_rows)
    );
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn wide() -> SubjectTable {
        let mut t = SubjectTable::new(vec!["a".into(), "b".into(), "c".into()]);
        let push = |t: &mut SubjectTable, name: &str, kind: VariableKind, v: [f64; 3]| {
            t.push_column(Column::new(name, kind, v.iter().map(|x| Some(*x)).collect()))
                .unwrap();
        };
        push(&mut t, "present_w1", VariableKind::Binary, [1.0, 1.0, 0.0]);
        push(&mut t, "present_w2", VariableKind::Binary, [1.0, 0.0, 1.0]);
        push(&mut t, "present_w3", VariableKind::Binary, [1.0, 0.0, 0.0]);
        push(&mut t, "age_w1", VariableKind::Continuous, [12.0, 13.0, 14.0]);
        push(&mut t, "age_w2", VariableKind::Continuous, [13.0, 14.0, 15.0]);
        push(&mut t, "age_w3", VariableKind::Continuous, [14.0, 15.0, 16.0]);
        push(&mut t, "dis_any_w1", VariableKind::Binary, [1.0, 1.0, 0.0]);
        push(&mut t, "dis_any_w2", VariableKind::Binary, [0.0, 0.0, 1.0]);
        push(&mut t, "dis_any_w3", VariableKind::Binary, [0.0, 1.0, 0.0]);
        push(&mut t, "urban", VariableKind::Binary, [1.0, 0.0, 1.0]);
        t
    }

    fn schema() -> LongitudinalSchema {
        LongitudinalSchema {
            time_varying: vec!["dis_any".into()],
            centered: vec!["dis_any".into()],
            time_invariant: vec!["urban".into()],
            ..LongitudinalSchema::default()
        }
    }

    #[test]
    fn emits_rows_for_present_waves_with_calendar_time() {
        let long = reshape(&wide(), 1, &schema()).unwrap();
        assert_eq!(long.n_rows(), 5);
        assert_eq!(long.subject, vec![0, 0, 0, 1, 2]);
        assert_eq!(long.require(TIME).unwrap().to_vec(), vec![0.0, 0.5, 1.0, 0.0, 0.5]);
        assert_eq!(long.require("urban").unwrap().to_vec(), vec![1.0, 1.0, 1.0, 0.0, 1.0]);
        assert_eq!(long.pid(4), "c");
    }

    #[test]
    fn person_transforms_and_row_weighted_age_centre() {
        let long = reshape(&wide(), 1, &schema()).unwrap();
        let pm = long.require("dis_any_pm").unwrap();
        let pmc = long.require("dis_any_pmc").unwrap();
        assert_abs_diff_eq!(pm[0], 1.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(pmc.slice(ndarray::s![0..3]).sum(), 0.0, epsilon = 1e-12);
        // single-wave subjects
        assert_eq!(pmc[3], 0.0);
        assert_eq!(pm[4], 1.0);
        assert_eq!(pmc[4], 0.0);
        // ages on rows: 12, 13, 14, 13, 15 -> mean 13.4
        let gmc = long.require(AGE_GMC).unwrap();
        assert_abs_diff_eq!(gmc[0], 12.0 - 13.4, epsilon = 1e-12);
        assert_abs_diff_eq!(gmc.sum(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn round_trips_present_cells() {
        let wide = wide();
        let long = reshape(&wide, 1, &schema()).unwrap();
        let waves = [WaveId(1), WaveId(2), WaveId(3)];
        let back = long.to_wide(&["dis_any", "age"], &waves).unwrap();
        for w in waves {
            let present = &wide.require(&wave_column("present", w)).unwrap().values;
            for stem in ["dis_any", "age"] {
                let original = &wide.require(&wave_column(stem, w)).unwrap().values;
                let rebuilt = &back.require(&wave_column(stem, w)).unwrap().values;
                for i in 0..3 {
                    if present[i] == Some(1.0) {
                        assert_eq!(rebuilt[i], original[i]);
                    } else {
                        assert_eq!(rebuilt[i], None);
                    }
                }
            }
        }
    }

    #[test]
    fn incomplete_cell_is_rejected() {
        let mut wide = wide();
        wide.values_mut("dis_any_w2").unwrap()[0] = None;
        assert!(matches!(
            reshape(&wide, 1, &schema()),
            Err(ReshapeError::IncompleteCell { column, pid }) if column == "dis_any_w2" && pid == "a"
        ));
    }
}
