use super::ReshapeError;
use crate::shared::table::WaveId;
use serde::{Deserialize, Serialize};

/// Calendar time assigned to a wave. Spacing follows the actual field
/// dates, so equal intervals are not assumed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaveTime {
    pub wave: WaveId,
    pub time: f64,
}

/// How wide columns map onto person-period rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongitudinalSchema {
    pub waves: Vec<WaveTime>,
    /// Stem of the 0/1 participation flag; only flagged waves become rows.
    pub presence_stem: String,
    pub age_stem: String,
    /// Stems carried onto every row as `<stem>`.
    pub time_varying: Vec<String>,
    /// Stems (a subset of `time_varying`) that also get `<stem>_pm` and
    /// `<stem>_pmc` columns.
    pub centered: Vec<String>,
    /// Subject-level columns repeated on every row.
    pub time_invariant: Vec<String>,
}

impl Default for LongitudinalSchema {
    fn default() -> Self {
        Self {
            waves: vec![
                WaveTime { wave: WaveId(1), time: 0.0 },
                WaveTime { wave: WaveId(2), time: 0.5 },
                WaveTime { wave: WaveId(3), time: 1.0 },
            ],
            presence_stem: "present".to_string(),
            age_stem: "age".to_string(),
            time_varying: Vec::new(),
            centered: Vec::new(),
            time_invariant: Vec::new(),
        }
    }
}

impl LongitudinalSchema {
    pub fn time_of(&self, wave: WaveId) -> Option<f64> {
        self.waves.iter().find(|w| w.wave == wave).map(|w| w.time)
    }

    pub fn validate(&self) -> Result<(), ReshapeError> {
        if self.waves.is_empty() {
            return Err(ReshapeError::InvalidSchema("no waves".into()));
        }
        for (i, w) in self.waves.iter().enumerate() {
            if !w.time.is_finite() {
                return Err(ReshapeError::InvalidSchema(format!("time of {} is not finite", w.wave)));
            }
            if self.waves[..i].iter().any(|o| o.wave == w.wave) {
                return Err(ReshapeError::InvalidSchema(format!("{} listed twice", w.wave)));
            }
        }
        if let Some(stem) = self.centered.iter().find(|c| !self.time_varying.contains(c)) {
            return Err(ReshapeError::InvalidSchema(format!(
                "centered stem '{stem}' is not time-varying"
            )));
        }
        Ok(())
    }
}
