//! Quality improvement engine
//!
//! Consumes validation verdicts: strong answers reinforce their prompt as a
//! success pattern; weak answers produce an improved template built from
//! deterministic per-criterion amendment blocks. Improved templates are
//! independent records that compete through reinforcement and fall out of
//! selection naturally when they keep scoring poorly.

pub mod amendments;
pub mod engine;

pub use amendments::{amendment_block, apply_amendments};
pub use engine::{ObserveOutcome, QualityEngine, QualityEngineConfig};

use thiserror::Error;

/// Quality engine errors
#[derive(Error, Debug)]
pub enum QualityError {
    #[error("substrate error: {0}")]
    Substrate(#[from] finsight_learning::LearningError),
}
