//! Error taxonomy
//!
//! Per-boundary error kinds surfaced to callers. Every surfaced error
//! carries a machine-readable kind and a human-readable reason.

use crate::verdict::ValidationVerdict;
use thiserror::Error;

/// Machine-readable error class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InputError,
    PiiFailure,
    DependencyUnavailable,
    Timeout,
    ValidationRejected,
    Overloaded,
    IntegrityError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InputError => "input_error",
            ErrorKind::PiiFailure => "pii_failure",
            ErrorKind::DependencyUnavailable => "dependency_unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ValidationRejected => "validation_rejected",
            ErrorKind::Overloaded => "overloaded",
            ErrorKind::IntegrityError => "integrity_error",
        }
    }
}

/// Pipeline error. Variants map 1:1 onto [`ErrorKind`].
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    Input(String),

    #[error("pseudonymization failed: {0}")]
    Pii(String),

    #[error("{subsystem} unavailable: {reason}")]
    DependencyUnavailable { subsystem: String, reason: String },

    #[error("deadline exceeded in {phase}")]
    Timeout { phase: String },

    #[error("response rejected by validator after {attempts} attempt(s)")]
    ValidationRejected {
        attempts: u32,
        verdict: Box<ValidationVerdict>,
    },

    #[error("pipeline at capacity")]
    Overloaded,

    #[error("repersonalization integrity check failed: {0}")]
    Integrity(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Input(_) => ErrorKind::InputError,
            Error::Pii(_) => ErrorKind::PiiFailure,
            Error::DependencyUnavailable { .. } => ErrorKind::DependencyUnavailable,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::ValidationRejected { .. } => ErrorKind::ValidationRejected,
            Error::Overloaded => ErrorKind::Overloaded,
            Error::Integrity(_) => ErrorKind::IntegrityError,
        }
    }

    pub fn dependency(subsystem: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::DependencyUnavailable {
            subsystem: subsystem.into(),
            reason: reason.into(),
        }
    }

    pub fn timeout(phase: impl Into<String>) -> Self {
        Error::Timeout { phase: phase.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
