//! CSV exports of the stage results.

use crate::mediation::MediationEstimate;
use crate::mixed::PooledFit;
use crate::shared::artifact::{ArtifactError, write_atomic};
use crate::shared::diagnostics::{Diagnostic, DiagnosticKind};
use crate::shared::table::SubjectTable;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to encode report: {0}")]
    Csv(#[from] csv::Error),
    #[error("Failed to flush report buffer: {0}")]
    Buffer(String),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

#[derive(Debug, Serialize)]
struct FixedEffectRow {
    model: String,
    term: String,
    estimate: f64,
    lower: f64,
    upper: f64,
    risk_ratio: f64,
    rr_lower: f64,
    rr_upper: f64,
}

#[derive(Debug, Serialize)]
struct VarianceRow {
    model: String,
    component: String,
    estimate: f64,
    lower: f64,
    upper: f64,
}

#[derive(Debug, Serialize)]
struct MediationRow<'a> {
    mediator: &'a str,
    adjusted_for: &'a str,
    baseline_model: &'a str,
    adjusted_model: &'a str,
    exposure: &'a str,
    draws: usize,
    indirect_rr: Option<f64>,
    indirect_lower: Option<f64>,
    indirect_upper: Option<f64>,
    percent_mediated: Option<f64>,
    percent_lower: Option<f64>,
    percent_upper: Option<f64>,
    excluded_zero_baseline: usize,
}

#[derive(Debug, Serialize)]
struct DiagnosticRow<'a> {
    kind: DiagnosticKind,
    scope: &'a str,
    message: &'a str,
    value: Option<f64>,
}

fn write_rows<T, I>(path: &Path, rows: I) -> Result<(), ReportError>
where
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ReportError::Buffer(e.to_string()))?;
    write_atomic(path, &bytes)?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

pub fn write_fixed_effects(path: &Path, fits: &[PooledFit]) -> Result<(), ReportError> {
    let mut rows = Vec::new();
    for fit in fits {
        for e in fit.fixed_effects() {
            rows.push(FixedEffectRow {
                model: fit.model.clone(),
                term: e.term,
                estimate: e.coefficient.mean,
                lower: e.coefficient.lower,
                upper: e.coefficient.upper,
                risk_ratio: e.risk_ratio.mean,
                rr_lower: e.risk_ratio.lower,
                rr_upper: e.risk_ratio.upper,
            });
        }
    }
    write_rows(path, rows)
}

pub fn write_variance_components(path: &Path, fits: &[PooledFit]) -> Result<(), ReportError> {
    let rows = fits.iter().flat_map(|fit| {
        fit.variance_components().into_iter().map(move |c| VarianceRow {
            model: fit.model.clone(),
            component: c.component,
            estimate: c.variance.mean,
            lower: c.variance.lower,
            upper: c.variance.upper,
        })
    });
    write_rows(path, rows)
}

pub fn write_mediation(path: &Path, estimates: &[MediationEstimate]) -> Result<(), ReportError> {
    write_rows(
        path,
        estimates.iter().map(|e| MediationRow {
            mediator: &e.mediator,
            adjusted_for: &e.adjusted_for,
            baseline_model: &e.baseline_model,
            adjusted_model: &e.adjusted_model,
            exposure: &e.exposure,
            draws: e.draws,
            indirect_rr: e.indirect.map(|s| s.mean),
            indirect_lower: e.indirect.map(|s| s.lower),
            indirect_upper: e.indirect.map(|s| s.upper),
            percent_mediated: e.percent_mediated.map(|s| s.mean),
            percent_lower: e.percent_mediated.map(|s| s.lower),
            percent_upper: e.percent_mediated.map(|s| s.upper),
            excluded_zero_baseline: e.excluded_zero_baseline,
        }),
    )
}

pub fn write_diagnostics(path: &Path, diagnostics: &[Diagnostic]) -> Result<(), ReportError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(["kind", "scope", "message", "value"])?;
    for d in diagnostics {
        writer.serialize(DiagnosticRow {
            kind: d.kind,
            scope: &d.scope,
            message: &d.message,
            value: d.value,
        })?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ReportError::Buffer(e.to_string()))?;
    write_atomic(path, &bytes)?;
    Ok(())
}

/// Wide table with `pid` first; missing cells are left empty.
pub fn write_subject_table(path: &Path, table: &SubjectTable) -> Result<(), ReportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(std::iter::once("pid").chain(table.column_names()))?;
    for (row, pid) in table.pids().iter().enumerate() {
        let cells = table
            .columns()
            .iter()
            .map(|c| c.values[row].map(|v| v.to_string()).unwrap_or_default());
        writer.write_record(std::iter::once(pid.clone()).chain(cells))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ReportError::Buffer(e.to_string()))?;
    write_atomic(path, &bytes)?;
    log::info!("Wrote {} subjects to {}", table.n_rows(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::table::{Column, VariableKind};
    use std::fs;

    #[test]
    fn subject_table_leaves_missing_cells_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("derived.csv");
        let mut table = SubjectTable::new(vec!["a".into(), "b".into()]);
        table
            .push_column(Column::new("age_w1", VariableKind::Continuous, vec![Some(13.5), None]))
            .unwrap();
        write_subject_table(&path, &table).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "pid,age_w1\na,13.5\nb,\n");
    }

    #[test]
    fn diagnostics_csv_has_header_even_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diagnostics.csv");
        write_diagnostics(&path, &[]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "kind,scope,message,value\n");

        let flagged = Diagnostic::new(DiagnosticKind::PoolingMismatch, "model_1/model_2", "resampled").with_value(1.0);
        write_diagnostics(&path, &[flagged]).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("pooling_mismatch,model_1/model_2,resampled,1.0"));
    }
}
