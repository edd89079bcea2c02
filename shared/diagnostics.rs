use serde::{Deserialize, Serialize};
use std::fmt;

/// The stage-level issue categories surfaced to the operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A per-wave derivation rule matched no branch; the value is missing.
    DerivationIndeterminate,
    /// Chained-equation chains did not mix across imputations.
    ImputationNonconvergence,
    /// The sampler reported divergences or elevated R-hat.
    ModelFitDivergence,
    /// Draw counts had to be reconciled before pairing.
    PoolingMismatch,
}

impl DiagnosticKind {
    pub fn describe(self) -> &'static str {
        match self {
            Self::DerivationIndeterminate => "derivation indeterminate",
            Self::ImputationNonconvergence => "imputation nonconvergence",
            Self::ModelFitDivergence => "model fit divergence",
            Self::PoolingMismatch => "pooling mismatch",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// A diagnostic attached to a stage artifact. `scope` names what it is about
/// (a variable, a model, a model/imputation pair).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub scope: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, scope: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            scope: scope.into(),
            message: message.into(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    /// Logs the diagnostic at warning level.
    pub fn emit(&self) {
        log::warn!("[{}] {}: {}", self.kind, self.scope, self.message);
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.kind, self.scope, self.message)
    }
}
