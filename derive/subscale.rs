use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A fixed list of per-wave items summed into one score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscaleDefinition {
    pub stem: String,
    pub items: Vec<String>,
    /// Highest legal response code of every item; the lowest is 0.
    pub item_max: i64,
    /// Percentage scale applied to `sum / max possible`.
    pub scale: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubscaleScore {
    pub sum: f64,
    pub percent: f64,
    pub any: bool,
}

impl SubscaleDefinition {
    /// Items are named `<stem>_1` .. `<stem>_<n>`.
    pub fn numbered(stem: &str, n_items: usize, item_max: i64) -> Self {
        Self {
            stem: stem.to_string(),
            items: (1..=n_items).map(|i| format!("{stem}_{i}")).collect(),
            item_max,
            scale: 100.0,
        }
    }

    pub fn max_possible(&self) -> f64 {
        (self.items.len() as i64 * self.item_max) as f64
    }

    pub fn sum_column(&self) -> String {
        format!("{}_sum", self.stem)
    }

    pub fn percent_column(&self) -> String {
        format!("{}_pct", self.stem)
    }

    pub fn any_column(&self) -> String {
        format!("{}_any", self.stem)
    }

    /// Scores one wave. A single missing or out-of-range item makes the
    /// whole score missing.
    pub fn score(&self, responses: &BTreeMap<String, Option<i64>>) -> Option<SubscaleScore> {
        let mut sum = 0i64;
        for item in &self.items {
            let value = responses.get(item).copied().flatten()?;
            if !(0..=self.item_max).contains(&value) {
                return None;
            }
            sum += value;
        }
        let sum = sum as f64;
        Some(SubscaleScore {
            sum,
            percent: sum / self.max_possible() * self.scale,
            any: sum > 0.0,
        })
    }
}
