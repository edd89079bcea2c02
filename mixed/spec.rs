//! Model specifications and the nested-family builder.

use super::FitError;
use serde::{Deserialize, Serialize};

pub const INTERCEPT: &str = "(Intercept)";

/// A fixed-effect term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Term {
    Continuous { variable: String },
    /// Treatment-coded; one coefficient per non-reference level.
    Categorical {
        variable: String,
        levels: Vec<u8>,
        reference: u8,
    },
}

impl Term {
    pub fn continuous(variable: &str) -> Self {
        Term::Continuous {
            variable: variable.to_string(),
        }
    }

    /// Categorical term with the first level as reference.
    pub fn categorical(variable: &str, levels: &[u8]) -> Self {
        Term::Categorical {
            variable: variable.to_string(),
            levels: levels.to_vec(),
            reference: levels.first().copied().unwrap_or(0),
        }
    }

    pub fn variable(&self) -> &str {
        match self {
            Term::Continuous { variable } | Term::Categorical { variable, .. } => variable,
        }
    }

    /// Non-reference levels of a categorical term, in order.
    pub fn contrast_levels(&self) -> Vec<u8> {
        match self {
            Term::Continuous { .. } => Vec::new(),
            Term::Categorical {
                levels, reference, ..
            } => levels.iter().copied().filter(|l| l != reference).collect(),
        }
    }

    pub fn coefficient_names(&self) -> Vec<String> {
        match self {
            Term::Continuous { variable } => vec![variable.clone()],
            Term::Categorical { variable, .. } => self
                .contrast_levels()
                .iter()
                .map(|l| format!("{variable}[{l}]"))
                .collect(),
        }
    }
}

/// The response: a count column, or an indicator that a categorical
/// column takes one of `levels`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    Count { variable: String },
    Indicator { variable: String, levels: Vec<u8> },
}

impl Outcome {
    pub fn variable(&self) -> &str {
        match self {
            Outcome::Count { variable } | Outcome::Indicator { variable, .. } => variable,
        }
    }

    /// Response value of a raw cell; `None` if the cell is not a valid count.
    pub fn response(&self, value: f64) -> Option<f64> {
        match self {
            Outcome::Count { .. } => (value >= 0.0 && value.fract() == 0.0).then_some(value),
            Outcome::Indicator { levels, .. } => {
                Some(if levels.iter().any(|&l| f64::from(l) == value) { 1.0 } else { 0.0 })
            }
        }
    }
}

/// Subject-level random intercept and slopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomEffects {
    /// Grouping label; groups are the person identifiers of the long table.
    pub group: String,
    pub intercept: bool,
    pub slopes: Vec<String>,
}

impl RandomEffects {
    pub fn dim(&self) -> usize {
        usize::from(self.intercept) + self.slopes.len()
    }

    /// Names of the standard-deviation parameters, e.g. `sd(time)`.
    pub fn names(&self) -> Vec<String> {
        self.intercept
            .then(|| format!("sd({INTERCEPT})"))
            .into_iter()
            .chain(self.slopes.iter().map(|s| format!("sd({s})")))
            .collect()
    }
}

/// Outcome distribution; Poisson with log link, so exponentiated
/// coefficients are rate (risk) ratios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    Poisson,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub outcome: Outcome,
    pub fixed: Vec<Term>,
    pub random: RandomEffects,
    pub family: Family,
}

impl ModelSpec {
    pub fn coefficient_names(&self) -> Vec<String> {
        std::iter::once(INTERCEPT.to_string())
            .chain(self.fixed.iter().flat_map(Term::coefficient_names))
            .collect()
    }

    pub fn random_names(&self) -> Vec<String> {
        self.random.names()
    }

    pub fn has_term(&self, variable: &str) -> bool {
        self.fixed.iter().any(|t| t.variable() == variable)
    }

    pub fn validate(&self) -> Result<(), FitError> {
        let invalid = |reason: String| FitError::InvalidSpec {
            model: self.name.clone(),
            reason,
        };
        for (i, term) in self.fixed.iter().enumerate() {
            if self.fixed[..i].iter().any(|t| t.variable() == term.variable()) {
                return Err(invalid(format!("term '{}' appears twice", term.variable())));
            }
            if term.variable() == self.outcome.variable() {
                return Err(invalid(format!("outcome '{}' used as a predictor", term.variable())));
            }
            if let Term::Categorical {
                variable,
                levels,
                reference,
            } = term
            {
                if levels.len() < 2 || !levels.contains(reference) {
                    return Err(invalid(format!(
                        "categorical term '{variable}' needs at least two levels including its reference"
                    )));
                }
            }
        }
        if self.random.dim() == 0 {
            return Err(invalid("no random-effect component".into()));
        }
        Ok(())
    }
}

/// Nested models sharing outcome, random effects and family. Model `k+1`
/// keeps every term of model `k`, in order, and adds at least one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFamily {
    pub exposure: String,
    pub models: Vec<ModelSpec>,
    /// Label of the mediator added by `models[k + 1]`.
    pub mediators: Vec<String>,
}

impl ModelFamily {
    pub fn baseline(&self) -> Option<&ModelSpec> {
        self.models.first()
    }

    /// Each mediator label with the model that first adds it.
    pub fn mediated(&self) -> impl Iterator<Item = (&str, &ModelSpec)> {
        self.mediators
            .iter()
            .map(String::as_str)
            .zip(self.models.iter().skip(1))
    }

    pub fn model(&self, name: &str) -> Option<&ModelSpec> {
        self.models.iter().find(|m| m.name == name)
    }

    pub fn validate(&self) -> Result<(), FitError> {
        let nesting = |reason: String| FitError::InvalidFamily(reason);
        let baseline = self
            .baseline()
            .ok_or_else(|| nesting("the family has no models".into()))?;
        if self.mediators.len() + 1 != self.models.len() {
            return Err(nesting("every model after the baseline must name its mediator".into()));
        }
        for model in &self.models {
            model.validate()?;
            if !matches!(
                model.fixed.iter().find(|t| t.variable() == self.exposure),
                Some(Term::Continuous { .. })
            ) {
                return Err(nesting(format!(
                    "{} lacks the continuous exposure term '{}'",
                    model.name, self.exposure
                )));
            }
        }
        for pair in self.models.windows(2) {
            let (smaller, larger) = (&pair[0], &pair[1]);
            let nested = larger.fixed.len() > smaller.fixed.len()
                && larger.fixed[..smaller.fixed.len()] == smaller.fixed[..]
                && larger.outcome == baseline.outcome
                && larger.random == baseline.random
                && larger.family == baseline.family;
            if !nested {
                return Err(nesting(format!("{} is not nested in {}", smaller.name, larger.name)));
            }
        }
        Ok(())
    }
}

/// Builds a nested family from a base specification by appending one
/// mediator block per model.
#[derive(Debug, Clone)]
pub struct ModelFamilyBuilder {
    base: ModelSpec,
    exposure: String,
    additions: Vec<(String, Vec<Term>)>,
}

impl ModelFamilyBuilder {
    pub fn new(base: ModelSpec, exposure: &str) -> Self {
        Self {
            base,
            exposure: exposure.to_string(),
            additions: Vec::new(),
        }
    }

    pub fn add_mediator(mut self, label: &str, terms: Vec<Term>) -> Self {
        self.additions.push((label.to_string(), terms));
        self
    }

    /// Models are named `model_1` (baseline), `model_2`, ...
    pub fn build(self) -> Result<ModelFamily, FitError> {
        let mut current = ModelSpec {
            name: "model_1".to_string(),
            ..self.base
        };
        let mut models = vec![current.clone()];
        let mut mediators = Vec::with_capacity(self.additions.len());
        for (k, (label, terms)) in self.additions.into_iter().enumerate() {
            if terms.is_empty() {
                return Err(FitError::InvalidFamily(format!("mediator '{label}' adds no terms")));
            }
            current.fixed.extend(terms);
            current.name = format!("model_{}", k + 2);
            models.push(current.clone());
            mediators.push(label);
        }
        let family = ModelFamily {
            exposure: self.exposure,
            models,
            mediators,
        };
        family.validate()?;
        Ok(family)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ModelSpec {
        ModelSpec {
            name: "base".into(),
            outcome: Outcome::Indicator {
                variable: "screen".into(),
                levels: vec![1, 2],
            },
            fixed: vec![
                Term::continuous("time"),
                Term::continuous("dis_any_pmc"),
                Term::categorical("race", &[1, 2, 3, 4]),
            ],
            random: RandomEffects {
                group: "pid".into(),
                intercept: true,
                slopes: vec!["time".into()],
            },
            family: Family::Poisson,
        }
    }

    #[test]
    fn builder_produces_cumulative_nested_models() {
        let family = ModelFamilyBuilder::new(base(), "dis_any_pmc")
            .add_mediator("sleep", vec![Term::continuous("slp_any_pmc")])
            .add_mediator("loneliness", vec![Term::continuous("lon_any_pmc")])
            .build()
            .unwrap();
        let names: Vec<_> = family.models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["model_1", "model_2", "model_3"]);
        assert!(family.models[2].has_term("slp_any_pmc"));
        assert!(family.models[2].has_term("lon_any_pmc"));
        assert!(!family.models[1].has_term("lon_any_pmc"));
        let mediated: Vec<_> = family.mediated().map(|(l, m)| (l, m.name.as_str())).collect();
        assert_eq!(mediated, vec![("sleep", "model_2"), ("loneliness", "model_3")]);
        assert_eq!(
            family.models[0].coefficient_names(),
            vec!["(Intercept)", "time", "dis_any_pmc", "race[2]", "race[3]", "race[4]"]
        );
        assert_eq!(family.models[0].random_names(), vec!["sd((Intercept))", "sd(time)"]);
    }

    #[test]
    fn builder_rejects_missing_exposure_and_duplicates() {
        let missing = ModelFamilyBuilder::new(base(), "nope").build();
        assert!(matches!(missing, Err(FitError::InvalidFamily(_))));
        let duplicate = ModelFamilyBuilder::new(base(), "dis_any_pmc")
            .add_mediator("again", vec![Term::continuous("time")])
            .build();
        assert!(matches!(duplicate, Err(FitError::InvalidSpec { .. })));
    }

    #[test]
    fn hand_edited_family_fails_nesting_check() {
        let mut family = ModelFamilyBuilder::new(base(), "dis_any_pmc")
            .add_mediator("sleep", vec![Term::continuous("slp_any_pmc")])
            .build()
            .unwrap();
        family.models[1].fixed.remove(0);
        assert!(family.validate().is_err());
    }

    #[test]
    fn indicator_outcome_maps_levels() {
        let outcome = base().outcome;
        assert_eq!(outcome.response(0.0), Some(0.0));
        assert_eq!(outcome.response(2.0), Some(1.0));
        let count = Outcome::Count { variable: "n".into() };
        assert_eq!(count.response(3.0), Some(3.0));
        assert_eq!(count.response(-1.0), None);
    }
}
