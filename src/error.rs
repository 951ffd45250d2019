//! Error types for the composable-coda library.

use thiserror::Error;

/// Broad category of a failure, so callers can tell bad input data apart
/// from a bad configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The analysis configuration was rejected before any computation.
    Configuration,
    /// The input data violates a precondition of some stage.
    Data,
    /// A numerical degeneracy prevented a result.
    Numerical,
    /// Reading or writing failed.
    Io,
}

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum CodaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid count value '{value}' at row {row}, column {col}")]
    InvalidCount {
        value: String,
        row: usize,
        col: usize,
    },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Sample ID mismatch: {0}")]
    SampleMismatch(String),

    #[error("Missing column '{0}' in metadata")]
    MissingColumn(String),

    #[error("Invalid variable type for column '{column}': {reason}")]
    InvalidVariableType { column: String, reason: String },

    #[error("Empty data: {0}")]
    EmptyData(String),

    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("taxon filter: no taxa present in at least {threshold:.3} of {n_samples} samples")]
    InsufficientPrevalence { threshold: f64, n_samples: usize },

    #[error("rarefaction: sample '{sample_id}' has {total} reads, below the requested depth {depth}")]
    RowSumTooLow {
        sample_id: String,
        total: u64,
        depth: u64,
    },

    #[error("log-ratio undefined: {0}")]
    UndefinedLogRatio(String),

    #[error("ordination: no positive eigenvalue among {n_samples} samples")]
    SingularDistanceMatrix { n_samples: usize },

    #[error("balance selection: no taxon pair improves on the null association (best score {best_score})")]
    EmptyBalanceSets { best_score: f64 },

    #[error("balance selection: iteration cap {iterations} reached with an improving move still available")]
    NonConvergence { iterations: usize },

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CodaError {
    /// Category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            CodaError::Io(_) | CodaError::Yaml(_) | CodaError::Json(_) => ErrorCategory::Io,
            CodaError::InvalidParameter(_) => ErrorCategory::Configuration,
            CodaError::Numerical(_)
            | CodaError::SingularDistanceMatrix { .. }
            | CodaError::NonConvergence { .. } => ErrorCategory::Numerical,
            CodaError::InvalidCount { .. }
            | CodaError::DimensionMismatch { .. }
            | CodaError::SampleMismatch(_)
            | CodaError::MissingColumn(_)
            | CodaError::InvalidVariableType { .. }
            | CodaError::EmptyData(_)
            | CodaError::InsufficientPrevalence { .. }
            | CodaError::RowSumTooLow { .. }
            | CodaError::UndefinedLogRatio(_)
            | CodaError::EmptyBalanceSets { .. } => ErrorCategory::Data,
        }
    }
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, CodaError>;
