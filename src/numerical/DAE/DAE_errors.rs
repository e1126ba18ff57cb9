//! Error type shared by every part of the DAE solver.
use thiserror::Error;

/// Failures that can be reported by the DAE solver.
///
/// `ConvergenceFailure` is normally recovered inside the step controller by
/// shrinking the step and/or dropping the order; it reaches the caller only
/// after the configured number of consecutive failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SolverError {
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    #[error("Newton iterations failed to converge {failures} times in a row at t = {t}")]
    ConvergenceFailure { t: f64, failures: usize },

    #[error("linear solver failure: {0}")]
    LinearSolveFailure(String),

    #[error("step size underflow: h = {h:e} at t = {t}")]
    StepSizeUnderflow { t: f64, h: f64 },

    #[error("sparse matrix error: {0}")]
    SparseMatrixError(String),

    #[error("i/o error: {0}")]
    Io(String),
}

impl From<std::io::Error> for SolverError {
    fn from(e: std::io::Error) -> Self {
        SolverError::Io(e.to_string())
    }
}

impl From<csv::Error> for SolverError {
    fn from(e: csv::Error) -> Self {
        SolverError::Io(e.to_string())
    }
}

impl SolverError {
    /// `true` for errors that stop a running integration (as opposed to setup errors).
    pub fn is_fatal_runtime(&self) -> bool {
        matches!(
            self,
            SolverError::ConvergenceFailure { .. }
                | SolverError::LinearSolveFailure(_)
                | SolverError::StepSizeUnderflow { .. }
        )
    }
}
