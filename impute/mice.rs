//! The chained-equations driver.

use super::design::{VariableState, perturb, predictor_matrix, take_rows};
use super::logistic::{fit_logistic, sigmoid};
use super::pmm::{draw_linear, match_donors};
use super::polytomous::{fit_polytomous, probabilities};
use super::{ImputationArtifact, ImputationConfig, ImputationMethod, ImputationPlan, ImputeError};
use crate::impute::convergence::convergence_diagnostics;
use crate::shared::linalg::{LinalgError, covariance_root};
use crate::shared::seeding::stream_rng;
use crate::shared::stats;
use crate::shared::table::{Column, SubjectTable, VariableKind};
use ndarray::Array1;
use rand::Rng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Imputes `table` `config.imputations` times.
///
/// The returned artifact holds M+1 instances: instance 0 is the input
/// projected onto the plan's variables, with its missing cells intact;
/// instances 1..=M are completed copies, each generated from its own
/// random stream derived from `config.seed`. Variables without missing
/// cells are copied unchanged and never modelled.
pub fn impute(
    table: &SubjectTable,
    plan: &ImputationPlan,
    config: &ImputationConfig,
) -> Result<ImputationArtifact, ImputeError> {
    config.validate()?;
    plan.validate(table)?;
    let input = table.select(plan.variables())?;
    let methods: Vec<ImputationMethod> = plan.entries().iter().map(|(_, m)| *m).collect();
    let targets: Vec<usize> = input
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.is_complete())
        .map(|(i, _)| i)
        .collect();

    log::info!(
        "Imputing {} missing cells across {} variables ({} imputations x {} iterations)",
        input.missing_cells(),
        targets.len(),
        config.imputations,
        config.iterations
    );

    let chains: Vec<(SubjectTable, Vec<Vec<f64>>)> = if targets.is_empty() {
        (0..config.imputations)
            .map(|_| (input.clone(), Vec::new()))
            .collect()
    } else {
        (1..=config.imputations)
            .into_par_iter()
            .map(|m| run_chain(&input, &methods, &targets, config, m as u64))
            .collect::<Result<Vec<_>, _>>()?
    };

    let mut traces: BTreeMap<String, Vec<Vec<f64>>> = BTreeMap::new();
    let mut instances = Vec::with_capacity(config.imputations + 1);
    instances.push(input.clone());
    for (instance, chain_trace) in chains {
        for (slot, means) in targets.iter().zip(chain_trace) {
            traces
                .entry(input.columns()[*slot].name.clone())
                .or_default()
                .push(means);
        }
        instances.push(instance);
    }

    let mut artifact = ImputationArtifact {
        seed: config.seed,
        iterations: config.iterations,
        plan: plan.clone(),
        instances,
        traces,
        diagnostics: Vec::new(),
    };
    artifact.diagnostics = convergence_diagnostics(&artifact, config.rhat_threshold);
    artifact.diagnostics.iter().for_each(|d| d.emit());
    Ok(artifact)
}

fn initial_state(column: &Column, rng: &mut StdRng) -> VariableState {
    let observed: Vec<f64> = column.values.iter().flatten().copied().collect();
    let missing = column.missing_rows();
    let values: Array1<f64> = column
        .values
        .iter()
        .map(|v| match v {
            Some(v) => *v,
            None => observed[rng.gen_range(0..observed.len())],
        })
        .collect();
    VariableState {
        name: column.name.clone(),
        kind: column.kind.clone(),
        values,
        missing,
    }
}

/// One imputation: random-hot-deck start, then `iterations` rounds over
/// the incomplete variables. Returns the completed table and, per target,
/// the mean of its imputed cells after every round.
fn run_chain(
    input: &SubjectTable,
    methods: &[ImputationMethod],
    targets: &[usize],
    config: &ImputationConfig,
    m: u64,
) -> Result<(SubjectTable, Vec<Vec<f64>>), ImputeError> {
    let mut rng = stream_rng(config.seed, &[m]);
    // Columns with no observed value never reach here; plan validation
    // rejects them.
    let mut states: Vec<VariableState> = input
        .columns()
        .iter()
        .map(|c| initial_state(c, &mut rng))
        .collect();
    let mut trace = vec![Vec::with_capacity(config.iterations); targets.len()];

    for iteration in 0..config.iterations {
        for (slot, &target) in targets.iter().enumerate() {
            let draws = draw_missing(&states, target, methods[target], config, &mut rng).map_err(|source| {
                ImputeError::Linalg {
                    variable: states[target].name.clone(),
                    source,
                }
            })?;
            let state = &mut states[target];
            for (&row, &value) in state.missing.iter().zip(&draws) {
                state.values[row] = value;
            }
            trace[slot].push(stats::mean(&draws));
        }
        log::debug!("Imputation {m}: finished round {}", iteration + 1);
    }

    let mut completed = input.clone();
    for &target in targets {
        let state = &states[target];
        let cells = completed.values_mut(&state.name)?;
        for (cell, &value) in cells.iter_mut().zip(&state.values) {
            *cell = Some(value);
        }
    }
    Ok((completed, trace))
}

/// Fits the target's conditional model on its observed rows and draws new
/// values for its missing rows.
fn draw_missing(
    states: &[VariableState],
    target: usize,
    method: ImputationMethod,
    config: &ImputationConfig,
    rng: &mut StdRng,
) -> Result<Vec<f64>, LinalgError> {
    let state = &states[target];
    let x = predictor_matrix(states, target);
    let observed = state.observed_rows();
    let x_obs = take_rows(&x, &observed);
    let x_mis = take_rows(&x, &state.missing);
    let y_obs: Array1<f64> = observed.iter().map(|&i| state.values[i]).collect();

    match (method, &state.kind) {
        (ImputationMethod::Logistic, _) => {
            let fit = fit_logistic(&x_obs, &y_obs, config.ridge)?;
            let beta = perturb(&fit.beta, &covariance_root(&fit.precision)?, rng);
            Ok(x_mis
                .dot(&beta)
                .iter()
                .map(|&eta| f64::from(u8::from(rng.gen_range(0.0..1.0) < sigmoid(eta))))
                .collect())
        }
        (ImputationMethod::Polytomous, VariableKind::Categorical { levels }) => {
            let y_index: Vec<usize> = y_obs
                .iter()
                .map(|&v| levels.iter().position(|&l| f64::from(l) == v).unwrap_or(0))
                .collect();
            let fit = fit_polytomous(&x_obs, &y_index, levels.len(), config.ridge)?;
            let beta = perturb(&fit.beta, &covariance_root(&fit.precision)?, rng);
            let probs = probabilities(&x_mis, &beta, fit.n_levels);
            Ok(probs
                .rows()
                .into_iter()
                .map(|row| {
                    let u: f64 = rng.gen_range(0.0..1.0);
                    let mut cumulative = 0.0;
                    let chosen = row
                        .iter()
                        .position(|&p| {
                            cumulative += p;
                            u < cumulative
                        })
                        .unwrap_or(levels.len() - 1);
                    f64::from(levels[chosen])
                })
                .collect())
        }
        (ImputationMethod::Pmm, _) => {
            let draw = draw_linear(&x_obs, &y_obs, config.ridge, rng)?;
            let observed_pred = x_obs.dot(&draw.beta_hat);
            let target_pred = x_mis.dot(&draw.beta_star);
            Ok(match_donors(&observed_pred, &y_obs, &target_pred, config.donors, rng))
        }
        // Unreachable after plan validation: the remaining pairs either
        // have no method or a kind the method does not suit.
        _ => Ok(state.missing.iter().map(|&i| state.values[i]).collect()),
    }
}
