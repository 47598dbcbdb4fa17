use thiserror::Error;

use crate::constants::Kalman;

/// Filter error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KalmanError {
    /// Innovation covariance could not be inverted, or the arithmetic
    /// produced NaN/Inf.
    #[error("Singular matrix at step {step}: {reason}")]
    SingularMatrix { step: usize, reason: String },

    #[error("Dimension mismatch for {matrix}: expected {expected:?}, found {found:?}")]
    DimensionMismatch {
        matrix: Kalman,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Band '{band}' not present in record {step}")]
    UnknownBand { band: String, step: usize },

    #[error("Record {0} carries no bands")]
    EmptyRecord(usize),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Worker thread panicked")]
    WorkerPanicked,
}

impl KalmanError {
    pub(crate) fn singular(step: usize, reason: impl Into<String>) -> Self {
        KalmanError::SingularMatrix {
            step,
            reason: reason.into(),
        }
    }

    /// Attach the failing step to a numeric error.
    pub fn at_step(self, step: usize) -> Self {
        match self {
            KalmanError::SingularMatrix { reason, .. } => KalmanError::SingularMatrix { step, reason },
            other => other,
        }
    }

    pub(crate) fn mismatch(matrix: Kalman, expected: (usize, usize), found: (usize, usize)) -> Self {
        KalmanError::DimensionMismatch {
            matrix,
            expected,
            found,
        }
    }
}

/// Result type for filter operations
pub type Result<T> = std::result::Result<T, KalmanError>;

/// Errors from loading collections and writing results
#[derive(Error, Debug)]
pub enum IoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Filter(#[from] KalmanError),
}
