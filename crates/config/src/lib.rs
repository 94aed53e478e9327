//! Configuration for the finsight pipeline
//!
//! Layered settings (defaults -> `config/default.toml` -> environment file
//! -> `FINSIGHT__` env vars) and centralized constants.

pub mod constants;
pub mod settings;

pub use settings::{
    load_settings, AdaptiveConfig, EnrichmentConfig, LearningConfig, ModelConfig,
    ObservabilityConfig, PipelineConfig, PrivacyConfig, RuntimeEnvironment, ServerConfig,
    Settings, ValidationMode, ValidatorConfig,
};

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("missing required setting: {0}")]
    Missing(String),
}
