//! Error kinds raised by the pipeline.
//!
//! Row and bucket level errors are absorbed by the component that raised
//! them and tallied in [`RunDiagnostics`](crate::diagnostics::RunDiagnostics).
//! Only configuration and loader errors abort a run.

use thiserror::Error;

use crate::data::LoaderError;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Missing or unparseable required field. The row is dropped.
    #[error("Malformed row {row}: {reason}")]
    MalformedRow { row: usize, reason: String },

    /// Non-positive maturity or volatility, or a non-positive model price.
    #[error("Invalid numeric input ({key}): {reason}")]
    InvalidNumericInput { key: String, reason: String },

    /// A fit or weighting step had too few points to proceed.
    #[error("Insufficient data for {context}: found {found}, need {required}")]
    InsufficientData {
        context: String,
        found: usize,
        required: usize,
    },

    /// Inconsistent grid or threshold values. Fatal at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Loader error: {0}")]
    Loader(#[from] LoaderError),
}

impl PipelineError {
    /// Whether the error is local to a row or bucket and can be skipped.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MalformedRow { .. } | Self::InvalidNumericInput { .. } | Self::InsufficientData { .. }
        )
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
