//! Error types for integration, experiment drivers and their outputs.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the integrator, the models and the experiment drivers.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// The state stopped being finite (NaN or infinite components).
    #[error("integration diverged at t = {t}: state is no longer finite")]
    IntegrationDivergence { t: f64 },

    /// The adaptive step size shrank below what the time resolution supports.
    #[error("step size collapsed to {h:e} at t = {t}")]
    StepSizeUnderflow { t: f64, h: f64 },

    /// The step budget ran out before the last sample was reached.
    #[error("integrator exhausted its budget of {steps} steps at t = {t}")]
    MaxStepsExceeded { t: f64, steps: usize },

    #[error("invalid time grid: {0}")]
    InvalidTimeGrid(String),

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// `(L1 - L2) / (L1 + L2)` has no value for these lysogen totals.
    #[error("payoff undefined for lysogen totals L1 = {l1}, L2 = {l2}")]
    UndefinedPayoff { l1: f64, l2: f64 },

    #[error("invalid iteration count {input:?}: expected an integer")]
    InvalidIterationCount { input: String },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SimulationError {
    /// True for failures of the numerical integration itself, as opposed to
    /// bad input or I/O.
    pub fn is_integration_failure(&self) -> bool {
        matches!(
            self,
            Self::IntegrationDivergence { .. }
                | Self::StepSizeUnderflow { .. }
                | Self::MaxStepsExceeded { .. }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SimulationError>;
