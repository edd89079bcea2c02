//! Subject-level assembly: demographics, the age carry rule and the wide
//! derived table handed to the imputation stage.

use super::demographics::{GENDER, RACE, REGION, URBAN};
use super::raw::RawSubject;
use super::screen::ScreenResult;
use super::wave::{DerivedWave, derive_wave};
use super::{DerivationRules, DeriveError};
use crate::shared::diagnostics::{Diagnostic, DiagnosticKind};
use crate::shared::table::{Column, SubjectTable, VariableKind, WaveId, wave_column};
use std::collections::BTreeMap;

/// Years added per wave step when carrying an age across waves.
pub const YEARS_PER_WAVE: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct DerivedSubject {
    pub pid: String,
    pub gender: Option<u8>,
    pub race: Option<u8>,
    pub region: Option<u8>,
    pub urban: Option<u8>,
    pub waves: BTreeMap<WaveId, DerivedWave>,
}

impl DerivedSubject {
    pub fn has_present_wave(&self) -> bool {
        self.waves.values().any(|w| w.present)
    }
}

/// Fills missing wave ages from adjacent waves: a forward pass
/// (`age_w = age_{w-1} + gap`) that cascades, then a backward pass
/// (`age_w = age_{w+1} - gap`).
pub fn carry_ages(waves: &mut BTreeMap<WaveId, DerivedWave>) {
    let ids: Vec<WaveId> = waves.keys().copied().collect();
    let step = |a: WaveId, b: WaveId| (f64::from(b.0) - f64::from(a.0)) * YEARS_PER_WAVE;
    for pair in ids.windows(2) {
        let (prev, next) = (pair[0], pair[1]);
        let carried = waves[&prev].age.map(|age| age + step(prev, next));
        if let Some(wave) = waves.get_mut(&next) {
            if wave.age.is_none() {
                wave.age = carried;
            }
        }
    }
    for pair in ids.windows(2).rev() {
        let (prev, next) = (pair[0], pair[1]);
        let carried = waves[&next].age.map(|age| age - step(prev, next));
        if let Some(wave) = waves.get_mut(&prev) {
            if wave.age.is_none() {
                wave.age = carried;
            }
        }
    }
}

pub fn derive_subject(raw: &RawSubject, rules: &DerivationRules) -> DerivedSubject {
    let mut waves: BTreeMap<WaveId, DerivedWave> = rules
        .waves
        .iter()
        .filter_map(|&w| raw.waves.get(&w).map(|rw| (w, derive_wave(w, rw, &rules.subscales))))
        .collect();
    carry_ages(&mut waves);
    let d = &raw.demographics;
    DerivedSubject {
        pid: raw.pid.clone(),
        gender: GENDER.recode(d.gender),
        race: RACE.recode(d.race),
        region: REGION.recode(d.region),
        urban: URBAN.recode(d.urban),
        waves,
    }
}

/// Counts gathered while deriving, surfaced as diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivationReport {
    pub subjects_read: usize,
    pub excluded_without_waves: usize,
    pub indeterminate_screens: BTreeMap<WaveId, usize>,
    pub missing_subscales: BTreeMap<String, usize>,
    pub unmapped_demographics: usize,
}

impl DerivationReport {
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.indeterminate_screens
            .iter()
            .filter(|&(_, &n)| n > 0)
            .map(|(wave, &n)| {
                Diagnostic::new(
                    DiagnosticKind::DerivationIndeterminate,
                    wave_column("screen", *wave),
                    format!("{n} present-wave screens matched no rule and are left missing"),
                )
                .with_value(n as f64)
            })
            .collect()
    }
}

fn wave_of(subject: &DerivedSubject, wave: WaveId) -> Option<&DerivedWave> {
    subject.waves.get(&wave)
}

fn flag(value: bool) -> Option<f64> {
    Some(if value { 1.0 } else { 0.0 })
}

fn code(value: Option<u8>) -> Option<f64> {
    value.map(f64::from)
}

/// Derives every subject and lays the results out as the wide table.
/// Subjects with no present wave are dropped and counted.
pub fn derive_table(
    raw: &[RawSubject],
    rules: &DerivationRules,
) -> Result<(SubjectTable, DerivationReport), DeriveError> {
    let mut report = DerivationReport {
        subjects_read: raw.len(),
        ..DerivationReport::default()
    };
    let mut subjects = Vec::with_capacity(raw.len());
    for subject in raw {
        let d = &subject.demographics;
        report.unmapped_demographics += [
            GENDER.is_mapped(d.gender),
            RACE.is_mapped(d.race),
            REGION.is_mapped(d.region),
            URBAN.is_mapped(d.urban),
        ]
        .iter()
        .filter(|ok| !**ok)
        .count();
        let derived = derive_subject(subject, rules);
        if derived.has_present_wave() {
            subjects.push(derived);
        } else {
            report.excluded_without_waves += 1;
        }
    }
    if subjects.is_empty() {
        return Err(DeriveError::NoEligibleSubjects);
    }
    for subject in &subjects {
        for wave in subject.waves.values() {
            if wave.screen_indeterminate() {
                *report.indeterminate_screens.entry(wave.wave).or_default() += 1;
            }
            for (stem, score) in &wave.subscales {
                if wave.present && score.is_none() {
                    *report.missing_subscales.entry(stem.clone()).or_default() += 1;
                }
            }
        }
    }
    if report.excluded_without_waves > 0 {
        log::info!(
            "Excluded {} subjects with no observed wave",
            report.excluded_without_waves
        );
    }
    let table = derived_table(&subjects, rules)?;
    Ok((table, report))
}

/// Lays derived subjects out one row per subject. Column order: per wave
/// the presence flag, age, screen and subscale scores, then demographics.
pub fn derived_table(subjects: &[DerivedSubject], rules: &DerivationRules) -> Result<SubjectTable, DeriveError> {
    let mut table = SubjectTable::new(subjects.iter().map(|s| s.pid.clone()).collect());
    let screen_kind = VariableKind::Categorical {
        levels: ScreenResult::LEVELS.to_vec(),
    };

    for &wave in &rules.waves {
        table.push_column(Column::new(
            wave_column("present", wave),
            VariableKind::Binary,
            subjects.iter().map(|s| flag(wave_of(s, wave).is_some_and(|w| w.present))).collect(),
        ))?;
        table.push_column(Column::new(
            wave_column("age", wave),
            VariableKind::Continuous,
            subjects.iter().map(|s| wave_of(s, wave).and_then(|w| w.age)).collect(),
        ))?;
        table.push_column(Column::new(
            wave_column("screen", wave),
            screen_kind.clone(),
            subjects
                .iter()
                .map(|s| wave_of(s, wave).and_then(|w| w.screen).map(|r| f64::from(r.code())))
                .collect(),
        ))?;
        for def in &rules.subscales {
            let score = |s: &DerivedSubject| {
                s.waves
                    .get(&wave)
                    .and_then(|w| w.subscales.get(&def.stem).copied().flatten())
            };
            table.push_column(Column::new(
                wave_column(&def.sum_column(), wave),
                VariableKind::Continuous,
                subjects.iter().map(|s| score(s).map(|v| v.sum)).collect(),
            ))?;
            table.push_column(Column::new(
                wave_column(&def.percent_column(), wave),
                VariableKind::Continuous,
                subjects.iter().map(|s| score(s).map(|v| v.percent)).collect(),
            ))?;
            table.push_column(Column::new(
                wave_column(&def.any_column(), wave),
                VariableKind::Binary,
                subjects.iter().map(|s| score(s).and_then(|v| flag(v.any))).collect(),
            ))?;
        }
    }

    let demographics: [(&str, VariableKind, fn(&DerivedSubject) -> Option<u8>); 4] = [
        ("gender", VariableKind::Categorical { levels: GENDER.levels() }, |s| s.gender),
        ("race", VariableKind::Categorical { levels: RACE.levels() }, |s| s.race),
        ("region", VariableKind::Categorical { levels: REGION.levels() }, |s| s.region),
        ("urban", VariableKind::Binary, |s| s.urban),
    ];
    for (name, kind, get) in demographics {
        table.push_column(Column::new(
            name,
            kind,
            subjects.iter().map(|s| code(get(s))).collect(),
        ))?;
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derive::raw::{RawDemographics, RawWave, ScreenItems};

    fn wave(present: bool, age: Option<f64>) -> DerivedWave {
        DerivedWave {
            wave: WaveId(0),
            present,
            age,
            screen: None,
            subscales: BTreeMap::new(),
        }
    }

    #[test]
    fn ages_carry_forward_then_backward() {
        let mut waves: BTreeMap<WaveId, DerivedWave> = [
            (WaveId(1), wave(true, None)),
            (WaveId(2), wave(true, Some(14.0))),
            (WaveId(3), wave(true, None)),
        ]
        .into_iter()
        .collect();
        carry_ages(&mut waves);
        assert_eq!(waves[&WaveId(1)].age, Some(13.0));
        assert_eq!(waves[&WaveId(3)].age, Some(15.0));

        let mut first_only: BTreeMap<WaveId, DerivedWave> = [
            (WaveId(1), wave(true, Some(12.5))),
            (WaveId(2), wave(false, None)),
            (WaveId(3), wave(true, None)),
        ]
        .into_iter()
        .collect();
        carry_ages(&mut first_only);
        assert_eq!(first_only[&WaveId(3)].age, Some(14.5));

        let mut observed: BTreeMap<WaveId, DerivedWave> =
            [(WaveId(1), wave(true, Some(12.0))), (WaveId(2), wave(true, Some(12.4)))]
                .into_iter()
                .collect();
        carry_ages(&mut observed);
        assert_eq!(observed[&WaveId(2)].age, Some(12.4));
    }

    fn raw_subject(pid: &str, present: [i64; 3], root: Option<i64>) -> RawSubject {
        let rules = DerivationRules::cohort();
        let items = rules
            .subscales
            .iter()
            .flat_map(|s| s.items.iter())
            .map(|i| (i.clone(), Some(1)))
            .collect::<BTreeMap<_, _>>();
        RawSubject {
            pid: pid.to_string(),
            demographics: RawDemographics {
                gender: Some(2),
                race: Some(42),
                region: Some(3),
                urban: Some(1),
            },
            waves: rules
                .waves
                .iter()
                .zip(present)
                .map(|(&w, p)| {
                    (
                        w,
                        RawWave {
                            present: Some(p),
                            age: Some(12.0 + f64::from(w.0)),
                            screen: ScreenItems {
                                root,
                                ..ScreenItems::default()
                            },
                            items: items.clone(),
                        },
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn table_excludes_subjects_without_waves_and_reports_indeterminate_screens() {
        let rules = DerivationRules::cohort();
        let raw = vec![
            raw_subject("a", [1, 1, 0], Some(0)),
            raw_subject("b", [0, 0, 0], Some(0)),
            raw_subject("c", [1, 0, 1], None),
        ];
        let (table, report) = derive_table(&raw, &rules).unwrap();
        assert_eq!(table.pids(), &["a".to_string(), "c".to_string()]);
        assert_eq!(report.excluded_without_waves, 1);
        assert_eq!(report.unmapped_demographics, 3);
        assert_eq!(report.indeterminate_screens.get(&WaveId(1)), Some(&1));
        assert_eq!(report.indeterminate_screens.get(&WaveId(2)), None);
        assert_eq!(report.diagnostics().len(), 2);

        let screen = table.require("screen_w1").unwrap();
        assert_eq!(screen.values, vec![Some(0.0), None]);
        let race = table.require("race").unwrap();
        assert_eq!(race.values, vec![None, None]);
        let dis_pct = table.require("dis_pct_w2").unwrap();
        approx::assert_abs_diff_eq!(dis_pct.values[0].unwrap(), 100.0 / 3.0, epsilon = 1e-12);
        assert_eq!(table.require("present_w3").unwrap().values, vec![Some(0.0), Some(1.0)]);
        assert_eq!(table.require("urban").unwrap().values, vec![Some(1.0); 2]);
    }

    #[test]
    fn all_subjects_without_waves_is_an_error() {
        let rules = DerivationRules::cohort();
        let raw = vec![raw_subject("b", [0, 0, 0], Some(0))];
        assert!(matches!(
            derive_table(&raw, &rules),
            Err(DeriveError::NoEligibleSubjects)
        ));
    }
}
