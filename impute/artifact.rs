use super::{ImputationConfig, ImputationPlan, ImputeError};
use crate::shared::artifact::{load_json, save_json};
use crate::shared::diagnostics::Diagnostic;
use crate::shared::table::SubjectTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Everything the imputation stage hands downstream, persisted as one
/// JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImputationArtifact {
    pub seed: u64,
    pub iterations: usize,
    /// Per-variable method map the instances were produced with.
    pub plan: ImputationPlan,
    /// Instance 0 is the input with its missing cells; 1..=M are completed.
    pub instances: Vec<SubjectTable>,
    /// Variable → instance (1..=M, stored from index 0) → per-round mean of
    /// the imputed cells.
    pub traces: BTreeMap<String, Vec<Vec<f64>>>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

impl ImputationArtifact {
    /// Number of completed instances (M).
    pub fn imputations(&self) -> usize {
        self.instances.len().saturating_sub(1)
    }

    pub fn original(&self) -> Option<&SubjectTable> {
        self.instances.first()
    }

    /// Completed instances with their imputation index, in order.
    pub fn completed(&self) -> impl Iterator<Item = (usize, &SubjectTable)> {
        self.instances.iter().enumerate().skip(1)
    }

    /// Whether this artifact was produced with the given settings.
    pub fn matches(&self, plan: &ImputationPlan, config: &ImputationConfig) -> bool {
        self.seed == config.seed
            && self.iterations == config.iterations
            && self.imputations() == config.imputations
            && &self.plan == plan
    }

    pub fn save(&self, path: &Path) -> Result<(), ImputeError> {
        save_json(path, self)?;
        log::info!("Imputation artifact written to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ImputeError> {
        let artifact: Self = load_json(path)?;
        let schema_consistent = artifact
            .original()
            .is_some_and(|first| artifact.instances.iter().all(|i| i.same_shape(first)));
        if !schema_consistent {
            return Err(ImputeError::InconsistentArtifact(path.to_path_buf()));
        }
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impute::ImputationMethod;
    use crate::shared::table::{Column, VariableKind};

    fn table(value: Option<f64>) -> SubjectTable {
        let mut t = SubjectTable::new(vec!["a".into()]);
        t.push_column(Column::new("flag", VariableKind::Binary, vec![value]))
            .unwrap();
        t
    }

    #[test]
    fn json_round_trip_keeps_missing_cells() {
        let plan = ImputationPlan::new().with("flag", ImputationMethod::Logistic);
        let artifact = ImputationArtifact {
            seed: u64::MAX,
            iterations: 2,
            plan: plan.clone(),
            instances: vec![table(None), table(Some(1.0))],
            traces: BTreeMap::from([("flag".to_string(), vec![vec![1.0, 1.0]])]),
            diagnostics: Vec::new(),
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("imputations.json");
        artifact.save(&path).unwrap();
        let loaded = ImputationArtifact::load(&path).unwrap();
        assert_eq!(loaded, artifact);
        assert_eq!(loaded.imputations(), 1);
        assert_eq!(loaded.completed().map(|(m, _)| m).collect::<Vec<_>>(), vec![1]);
        let config = ImputationConfig {
            seed: u64::MAX,
            iterations: 2,
            imputations: 1,
            ..ImputationConfig::default()
        };
        assert!(loaded.matches(&plan, &config));
        assert!(!loaded.matches(&plan, &ImputationConfig { imputations: 5, ..config }));
    }
}
