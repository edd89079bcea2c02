//! Raw per-wave survey responses and the CSV loader for them.
//!
//! The input contract is fixed: one row per subject, a `pid` column, the
//! demographic columns `gender`, `race`, `region`, `urban`, and for every
//! wave `K` the columns `present_wK`, `age_wK`, the screen items
//! (`scr_root_wK`, `scr_fu1_wK` .. `scr_fu4_wK`, `scr_freq_wK`,
//! `scr_qual_wK`, `scr_spec_wK`) and every subscale item (`dis_1_wK`, ...).
//! Empty cells, `NA` and `.` are missing; negative item codes are missing
//! sentinels.

use super::{DerivationRules, DeriveError};
use crate::shared::table::{WaveId, wave_column};
use ahash::AHashSet;
use std::collections::BTreeMap;
use std::path::Path;

pub const SCREEN_ROOT: &str = "scr_root";
pub const SCREEN_FOLLOW_UPS: [&str; 4] = ["scr_fu1", "scr_fu2", "scr_fu3", "scr_fu4"];
pub const SCREEN_FREQUENCY: &str = "scr_freq";
pub const SCREEN_QUALIFIER: &str = "scr_qual";
pub const SCREEN_SPECIFICITY: &str = "scr_spec";

/// The clinical screen items of one wave.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScreenItems {
    pub root: Option<i64>,
    pub follow_ups: [Option<i64>; 4],
    pub frequency: Option<i64>,
    pub qualifier: Option<i64>,
    pub specificity: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawWave {
    /// Participation flag; the wave counts as observed only when this is 1.
    pub present: Option<i64>,
    pub age: Option<f64>,
    pub screen: ScreenItems,
    /// Subscale item responses keyed by item name (without wave suffix).
    pub items: BTreeMap<String, Option<i64>>,
}

impl RawWave {
    pub fn is_present(&self) -> bool {
        self.present == Some(1)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDemographics {
    pub gender: Option<i64>,
    pub race: Option<i64>,
    pub region: Option<i64>,
    pub urban: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawSubject {
    pub pid: String,
    pub demographics: RawDemographics,
    pub waves: BTreeMap<WaveId, RawWave>,
}

fn is_missing_token(cell: &str) -> bool {
    matches!(cell, "" | "NA" | "na" | "." | "NaN")
}

/// Parses a cell holding an integer code. Non-numeric text and fractional
/// values are treated as missing rather than rejected.
pub fn parse_code(cell: &str) -> Option<i64> {
    let cell = cell.trim();
    if is_missing_token(cell) {
        return None;
    }
    match cell.parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 => Some(v as i64),
        _ => {
            log::debug!("Unreadable code '{cell}' treated as missing");
            None
        }
    }
}

/// Like [`parse_code`], with negative sentinels mapped to missing.
pub fn parse_item(cell: &str) -> Option<i64> {
    parse_code(cell).filter(|&v| v >= 0)
}

pub fn parse_age(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if is_missing_token(cell) {
        return None;
    }
    cell.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0)
}

/// Header lookup with a clear error for absent columns.
struct Header {
    index: BTreeMap<String, usize>,
}

impl Header {
    fn new(record: &csv::StringRecord) -> Self {
        let index = record
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_string(), i))
            .collect();
        Self { index }
    }

    fn position(&self, name: &str) -> Result<usize, DeriveError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| DeriveError::ColumnNotFound(name.to_string()))
    }
}

struct WaveColumns {
    present: usize,
    age: usize,
    root: usize,
    follow_ups: [usize; 4],
    frequency: usize,
    qualifier: usize,
    specificity: usize,
    items: Vec<(String, usize)>,
}

impl WaveColumns {
    fn locate(header: &Header, wave: WaveId, rules: &DerivationRules) -> Result<Self, DeriveError> {
        let at = |stem: &str| header.position(&wave_column(stem, wave));
        let mut follow_ups = [0; 4];
        for (slot, stem) in follow_ups.iter_mut().zip(SCREEN_FOLLOW_UPS) {
            *slot = at(stem)?;
        }
        let items = rules
            .subscales
            .iter()
            .flat_map(|s| s.items.iter())
            .map(|item| Ok((item.clone(), at(item)?)))
            .collect::<Result<Vec<_>, DeriveError>>()?;
        Ok(Self {
            present: at("present")?,
            age: at("age")?,
            root: at(SCREEN_ROOT)?,
            follow_ups,
            frequency: at(SCREEN_FREQUENCY)?,
            qualifier: at(SCREEN_QUALIFIER)?,
            specificity: at(SCREEN_SPECIFICITY)?,
            items,
        })
    }

    fn read(&self, record: &csv::StringRecord) -> RawWave {
        let cell = |i: usize| record.get(i).unwrap_or("");
        RawWave {
            present: parse_code(cell(self.present)),
            age: parse_age(cell(self.age)),
            screen: ScreenItems {
                root: parse_item(cell(self.root)),
                follow_ups: self.follow_ups.map(|i| parse_item(cell(i))),
                frequency: parse_item(cell(self.frequency)),
                qualifier: parse_item(cell(self.qualifier)),
                specificity: parse_item(cell(self.specificity)),
            },
            items: self
                .items
                .iter()
                .map(|(name, i)| (name.clone(), parse_item(cell(*i))))
                .collect(),
        }
    }
}

/// Reads the wide raw table. Every column of the contract must be present;
/// duplicate person identifiers are rejected.
pub fn load_raw_subjects(path: &Path, rules: &DerivationRules) -> Result<Vec<RawSubject>, DeriveError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;
    let header = Header::new(reader.headers()?);
    let pid = header.position("pid")?;
    let gender = header.position("gender")?;
    let race = header.position("race")?;
    let region = header.position("region")?;
    let urban = header.position("urban")?;
    let waves = rules
        .waves
        .iter()
        .map(|&w| Ok((w, WaveColumns::locate(&header, w, rules)?)))
        .collect::<Result<Vec<_>, DeriveError>>()?;

    let mut seen = AHashSet::new();
    let mut subjects = Vec::new();
    for record in reader.records() {
        let record = record?;
        let id = record.get(pid).unwrap_or("").to_string();
        if id.is_empty() {
            return Err(DeriveError::MissingPid(subjects.len() + 1));
        }
        if !seen.insert(id.clone()) {
            return Err(DeriveError::DuplicatePid(id));
        }
        let cell = |i: usize| record.get(i).unwrap_or("");
        subjects.push(RawSubject {
            pid: id,
            demographics: RawDemographics {
                gender: parse_code(cell(gender)),
                race: parse_code(cell(race)),
                region: parse_code(cell(region)),
                urban: parse_code(cell(urban)),
            },
            waves: waves.iter().map(|(w, cols)| (*w, cols.read(&record))).collect(),
        });
    }
    if subjects.is_empty() {
        return Err(DeriveError::EmptyInput(path.to_path_buf()));
    }
    log::info!("Loaded {} subjects from {}", subjects.len(), path.display());
    Ok(subjects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn cell_parsing_maps_sentinels_to_missing() {
        assert_eq!(parse_code("3"), Some(3));
        assert_eq!(parse_code("2.0"), Some(2));
        assert_eq!(parse_code("NA"), None);
        assert_eq!(parse_code("abc"), None);
        assert_eq!(parse_code("1.5"), None);
        assert_eq!(parse_item("-9"), None);
        assert_eq!(parse_code("-9"), Some(-9));
        assert_eq!(parse_age("14.5"), Some(14.5));
        assert_eq!(parse_age(""), None);
    }

    fn header_for(rules: &DerivationRules) -> Vec<String> {
        let mut cols = vec!["pid", "gender", "race", "region", "urban"]
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();
        for &w in &rules.waves {
            for stem in ["present", "age", SCREEN_ROOT]
                .into_iter()
                .chain(SCREEN_FOLLOW_UPS)
                .chain([SCREEN_FREQUENCY, SCREEN_QUALIFIER, SCREEN_SPECIFICITY])
            {
                cols.push(wave_column(stem, w));
            }
            for item in rules.subscales.iter().flat_map(|s| s.items.iter()) {
                cols.push(wave_column(item, w));
            }
        }
        cols
    }

    #[test]
    fn loader_reads_contract_columns_and_rejects_duplicates() {
        let rules = DerivationRules::cohort();
        let header = header_for(&rules);
        let row = |pid: &str| {
            header
                .iter()
                .map(|c| match c.as_str() {
                    "pid" => pid.to_string(),
                    "present_w1" => "1".to_string(),
                    "age_w1" => "13".to_string(),
                    "dis_1_w1" => "-8".to_string(),
                    _ => "0".to_string(),
                })
                .collect::<Vec<_>>()
                .join(",")
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{}", header.join(",")).unwrap();
        writeln!(file, "{}", row("p1")).unwrap();
        writeln!(file, "{}", row("p2")).unwrap();
        drop(file);

        let subjects = load_raw_subjects(&path, &rules).unwrap();
        assert_eq!(subjects.len(), 2);
        let w1 = &subjects[0].waves[&WaveId(1)];
        assert!(w1.is_present());
        assert_eq!(w1.age, Some(13.0));
        assert_eq!(w1.items["dis_1"], None);
        assert_eq!(w1.items["dis_2"], Some(0));
        assert!(!subjects[0].waves[&WaveId(2)].is_present());

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{}", row("p1")).unwrap();
        drop(file);
        assert!(matches!(
            load_raw_subjects(&path, &rules),
            Err(DeriveError::DuplicatePid(id)) if id == "p1"
        ));
    }

    #[test]
    fn loader_reports_absent_contract_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.csv");
        std::fs::write(&path, "pid,gender\np1,1\n").unwrap();
        assert!(matches!(
            load_raw_subjects(&path, &DerivationRules::cohort()),
            Err(DeriveError::ColumnNotFound(c)) if c == "race"
        ));
    }
}
