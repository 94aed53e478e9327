//! Pseudonymization and repersonalization
//!
//! Deterministic, reversible transformation of sensitive record fields:
//! - Two-channel detection (field-name lexicon + content regex)
//! - Keyed-hash tokenization with stable per-kind prefixes
//! - Mappings persisted with TTL; in-process fallback when the store is down
//! - Integrity-verified reversal keyed by pseudonym id

pub mod detector;
pub mod pseudonymizer;
pub mod tokenizer;

pub use detector::{DetectionChannel, PiiDetector, PiiMatch};
pub use pseudonymizer::{PseudonymizeOutcome, Pseudonymizer, PseudonymizerConfig};
pub use tokenizer::Tokenizer;

use thiserror::Error;

/// Privacy errors
#[derive(Error, Debug)]
pub enum PrivacyError {
    #[error("token store unavailable: {0}")]
    TokenStoreUnavailable(String),

    #[error("unknown pseudonym id")]
    UnknownPseudonymId,

    #[error("pseudonym id expired")]
    ExpiredPseudonymId,

    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

impl From<PrivacyError> for finsight_core::Error {
    fn from(err: PrivacyError) -> Self {
        match err {
            PrivacyError::UnknownPseudonymId | PrivacyError::ExpiredPseudonymId => {
                finsight_core::Error::Pii(err.to_string())
            },
            PrivacyError::Integrity(msg) => finsight_core::Error::Integrity(msg),
            PrivacyError::TokenStoreUnavailable(reason) => {
                finsight_core::Error::dependency("token_store", reason)
            },
            PrivacyError::InvalidRecord(msg) => finsight_core::Error::Input(msg),
        }
    }
}
