//! Prompt generation
//!
//! For an input record, return the best available prompt in strict order:
//! an improved template from the quality engine, then a high-similarity
//! reused pattern, then a freshly synthesized context template. Every
//! prompt demands the two-section response format.

pub mod enrichment;
pub mod generator;
pub mod templates;

pub use enrichment::{Augmentation, EnrichmentClient, EnrichmentClientConfig};
pub use generator::{GeneratedPrompt, PromptGenerator, PromptMetadata};
pub use templates::{fill_template, synthesize_template, ContextTag};

use thiserror::Error;

/// Prompt generation errors
#[derive(Error, Debug)]
pub enum PromptError {
    #[error("substrate error: {0}")]
    Substrate(#[from] finsight_learning::LearningError),

    #[error("quality engine error: {0}")]
    Quality(#[from] finsight_quality::QualityError),

    #[error("enrichment error: {0}")]
    Enrichment(String),

    #[error("enrichment timed out")]
    EnrichmentTimeout,
}
