//! Blocking validation gate
//!
//! Scores a candidate response across weighted criteria by invoking an
//! external validator LLM, applies thresholds, and returns a verdict. No
//! caller-visible response exists before this gate has run.

pub mod criteria;
pub mod gate;

pub use criteria::{criterion_prompt, parse_score};
pub use gate::{GateConfig, ValidatorGate};

use thiserror::Error;

/// Validator errors
#[derive(Error, Debug)]
pub enum ValidatorError {
    #[error("validator backend unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ValidatorError> for finsight_core::Error {
    fn from(err: ValidatorError) -> Self {
        finsight_core::Error::dependency("validator", err.to_string())
    }
}
