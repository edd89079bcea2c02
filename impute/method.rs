use super::ImputeError;
use crate::shared::table::{SubjectTable, VariableKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Conditional model used to fill a variable's missing cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputationMethod {
    /// Multinomial logistic regression, for unordered categories.
    Polytomous,
    /// Binary logistic regression.
    Logistic,
    /// Predictive mean matching on a Bayesian linear regression.
    Pmm,
    /// Never imputed; the variable must be fully observed.
    None,
}

impl ImputationMethod {
    pub fn suits(self, kind: &VariableKind) -> bool {
        match (self, kind) {
            (ImputationMethod::Polytomous, VariableKind::Categorical { levels }) => levels.len() >= 2,
            (ImputationMethod::Logistic, VariableKind::Binary) => true,
            (ImputationMethod::Pmm, VariableKind::Continuous) => true,
            (ImputationMethod::None, _) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ImputationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImputationMethod::Polytomous => "polyreg",
            ImputationMethod::Logistic => "logreg",
            ImputationMethod::Pmm => "pmm",
            ImputationMethod::None => "none",
        };
        f.write_str(name)
    }
}

/// Ordered mapping from variable name to imputation method. Built once
/// from the study design; the order is the visiting order of each round
/// and the column order of every imputed instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImputationPlan {
    entries: Vec<(String, ImputationMethod)>,
}

impl ImputationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, variable: impl Into<String>, method: ImputationMethod) -> Self {
        self.entries.push((variable.into(), method));
        self
    }

    pub fn entries(&self) -> &[(String, ImputationMethod)] {
        &self.entries
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(v, _)| v.as_str())
    }

    pub fn method(&self, variable: &str) -> Option<ImputationMethod> {
        self.entries
            .iter()
            .find_map(|(v, m)| (v == variable).then_some(*m))
    }

    /// Checks the plan against a table: every variable exists once, its
    /// method suits its kind, and anything with missing cells has a method
    /// and at least one observed value.
    pub fn validate(&self, table: &SubjectTable) -> Result<(), ImputeError> {
        if self.entries.is_empty() {
            return Err(ImputeError::EmptyPlan);
        }
        for (i, (variable, method)) in self.entries.iter().enumerate() {
            if self.entries[..i].iter().any(|(v, _)| v == variable) {
                return Err(ImputeError::DuplicateVariable(variable.clone()));
            }
            let column = table.require(variable)?;
            if !method.suits(&column.kind) {
                return Err(ImputeError::MethodMismatch {
                    variable: variable.clone(),
                    method: *method,
                    kind: column.kind.clone(),
                });
            }
            let missing = column.missing_count();
            if missing == 0 {
                continue;
            }
            if *method == ImputationMethod::None {
                return Err(ImputeError::MissingWithoutMethod {
                    variable: variable.clone(),
                    missing,
                });
            }
            if missing == column.values.len() {
                return Err(ImputeError::NoObservedValues(variable.clone()));
            }
        }
        Ok(())
    }
}
