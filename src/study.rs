//! The fixed study: waves, derivation rules, imputation plan, long-form
//! schema and the nested model family.

use crate::derive::DerivationRules;
use crate::derive::demographics::{GENDER, RACE, REGION};
use crate::derive::screen::ScreenResult;
use crate::impute::{ImputationMethod, ImputationPlan};
use crate::longitudinal::reshape::{AGE_GMC, TIME, person_centered_column, person_mean_column};
use crate::longitudinal::{LongitudinalSchema, WaveTime};
use crate::mixed::{Family, FitError, ModelFamily, ModelFamilyBuilder, ModelSpec, Outcome, RandomEffects, Term};
use crate::shared::table::{WaveId, wave_column};

/// Exposure subscale: perceived discrimination.
pub const EXPOSURE: &str = "dis";
/// Mediator subscales with their labels, in the order they enter the models.
/// Models nest cumulatively: the loneliness model also holds the sleep
/// terms, so its estimate is the joint sleep and loneliness indirect effect.
pub const MEDIATORS: [(&str, &str); 2] = [("sleep", "slp"), ("loneliness", "lon")];

#[derive(Debug, Clone)]
pub struct StudyDesign {
    pub rules: DerivationRules,
    pub plan: ImputationPlan,
    pub schema: LongitudinalSchema,
    pub family: ModelFamily,
}

fn any_stem(subscale: &str) -> String {
    format!("{subscale}_any")
}

fn within_between(subscale: &str) -> Vec<Term> {
    let stem = any_stem(subscale);
    vec![
        Term::continuous(&person_centered_column(&stem)),
        Term::continuous(&person_mean_column(&stem)),
    ]
}

impl StudyDesign {
    pub fn cohort() -> Result<Self, FitError> {
        let rules = DerivationRules::cohort();
        let plan = Self::imputation_plan(&rules);
        let schema = Self::schema(&rules);
        let family = Self::model_family()?;
        Ok(Self {
            rules,
            plan,
            schema,
            family,
        })
    }

    /// Every per-wave indicator plus the demographics. Subscale sums and
    /// percentages are descriptive only and stay out of the imputation.
    fn imputation_plan(rules: &DerivationRules) -> ImputationPlan {
        let mut plan = ImputationPlan::new();
        for &wave in &rules.waves {
            plan = plan
                .with(wave_column("present", wave), ImputationMethod::None)
                .with(wave_column("age", wave), ImputationMethod::Pmm)
                .with(wave_column("screen", wave), ImputationMethod::Polytomous);
            for def in &rules.subscales {
                plan = plan.with(wave_column(&def.any_column(), wave), ImputationMethod::Logistic);
            }
        }
        plan.with("gender", ImputationMethod::Polytomous)
            .with("race", ImputationMethod::Polytomous)
            .with("region", ImputationMethod::Polytomous)
            .with("urban", ImputationMethod::Logistic)
    }

    /// Field waves were about six months apart, then a year.
    fn schema(rules: &DerivationRules) -> LongitudinalSchema {
        let times = [(WaveId(1), 0.0), (WaveId(2), 0.5), (WaveId(3), 1.0)];
        let waves = times
            .iter()
            .filter(|(w, _)| rules.waves.contains(w))
            .map(|&(wave, time)| WaveTime { wave, time })
            .collect();
        let centered: Vec<String> = std::iter::once(EXPOSURE)
            .chain(MEDIATORS.iter().map(|(_, s)| *s))
            .map(any_stem)
            .collect();
        LongitudinalSchema {
            waves,
            presence_stem: "present".into(),
            age_stem: "age".into(),
            time_varying: std::iter::once("screen".to_string()).chain(centered.iter().cloned()).collect(),
            centered,
            time_invariant: vec!["gender".into(), "race".into(), "region".into(), "urban".into()],
        }
    }

    /// Outcome: any screen concern. Exposure: within-person discrimination.
    /// Each mediator adds its within- and between-person terms on top of
    /// the previous model.
    fn model_family() -> Result<ModelFamily, FitError> {
        let exposure = within_between(EXPOSURE);
        let exposure_name = exposure[0].variable().to_string();
        let mut fixed = vec![Term::continuous(TIME)];
        fixed.extend(exposure);
        fixed.extend([
            Term::continuous(AGE_GMC),
            Term::categorical("gender", &GENDER.levels()),
            Term::categorical("race", &RACE.levels()),
            Term::categorical("region", &REGION.levels()),
            Term::continuous("urban"),
        ]);
        let base = ModelSpec {
            name: "model_1".into(),
            outcome: Outcome::Indicator {
                variable: "screen".into(),
                levels: vec![
                    ScreenResult::PrimaryConcernA.code(),
                    ScreenResult::PrimaryConcernB.code(),
                ],
            },
            fixed,
            random: RandomEffects {
                group: "pid".into(),
                intercept: true,
                slopes: vec![TIME.into()],
            },
            family: Family::Poisson,
        };
        MEDIATORS
            .iter()
            .fold(ModelFamilyBuilder::new(base, &exposure_name), |builder, (label, subscale)| {
                builder.add_mediator(label, within_between(subscale))
            })
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cohort_design_is_consistent() {
        let design = StudyDesign::cohort().unwrap();
        assert!(design.schema.validate().is_ok());
        assert_eq!(design.family.exposure, "dis_any_pmc");
        let names: Vec<&str> = design.family.models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["model_1", "model_2", "model_3"]);
        assert!(design.family.models[2].has_term("slp_any_pmc"));
        assert!(design.family.models[2].has_term("lon_any_pm"));
        assert_eq!(design.plan.method("screen_w2"), Some(ImputationMethod::Polytomous));
        assert_eq!(design.plan.method("dis_any_w3"), Some(ImputationMethod::Logistic));
        assert_eq!(design.plan.method("dis_sum_w1"), None);
        assert_eq!(design.schema.time_of(WaveId(2)), Some(0.5));
    }
}
