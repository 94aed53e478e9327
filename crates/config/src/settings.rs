//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::constants::{adaptive, deadlines, endpoints, tokens, vectors};
use crate::ConfigError;

/// Runtime environment enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - relaxed validation, warnings only
    #[default]
    Development,
    /// Staging mode - stricter validation
    Staging,
    /// Production mode - all validations enforced
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub privacy: PrivacyConfig,

    #[serde(default)]
    pub learning: LearningConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub validator: ValidatorConfig,

    #[serde(default)]
    pub enrichment: EnrichmentConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_enabled: true,
            cors_origins: Vec::new(),
        }
    }
}

/// Pseudonymization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivacyConfig {
    /// Per-deployment tokenization secret. Loaded from
    /// `FINSIGHT__PRIVACY__SECRET` in production.
    #[serde(default = "default_privacy_secret")]
    pub secret: String,
    /// Mapping TTL in the token store (seconds).
    #[serde(default = "default_token_ttl")]
    pub ttl_seconds: i64,
    /// Minimum detector confidence before a field is pseudonymized.
    #[serde(default = "default_detection_confidence")]
    pub detection_confidence: f64,
    /// ScyllaDB nodes for the token store.
    #[serde(default = "default_scylla_hosts")]
    pub scylla_hosts: Vec<String>,
    #[serde(default = "default_scylla_keyspace")]
    pub keyspace: String,
    #[serde(default = "default_replication_factor")]
    pub replication_factor: u8,
    /// Use ScyllaDB when reachable; false pins the in-memory store.
    #[serde(default)]
    pub durable_store: bool,
}

fn default_privacy_secret() -> String {
    std::env::var("FINSIGHT_PRIVACY_SECRET").unwrap_or_else(|_| "dev-only-secret".to_string())
}

fn default_token_ttl() -> i64 {
    tokens::TTL_SECONDS
}

fn default_detection_confidence() -> f64 {
    0.6
}

fn default_scylla_hosts() -> Vec<String> {
    std::env::var("SCYLLA_HOSTS")
        .map(|s| s.split(',').map(|h| h.trim().to_string()).collect())
        .unwrap_or_else(|_| vec![endpoints::SCYLLA_DEFAULT.to_string()])
}

fn default_scylla_keyspace() -> String {
    std::env::var("SCYLLA_KEYSPACE").unwrap_or_else(|_| "finsight".to_string())
}

fn default_replication_factor() -> u8 {
    1
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            secret: default_privacy_secret(),
            ttl_seconds: default_token_ttl(),
            detection_confidence: default_detection_confidence(),
            scylla_hosts: default_scylla_hosts(),
            keyspace: default_scylla_keyspace(),
            replication_factor: default_replication_factor(),
            durable_store: false,
        }
    }
}

/// Learning substrate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningConfig {
    /// Qdrant endpoint
    #[serde(default = "default_qdrant_endpoint")]
    pub qdrant_endpoint: String,
    /// Qdrant API key (optional)
    #[serde(default)]
    pub qdrant_api_key: Option<String>,
    /// Embedding dimension, fixed per deployment.
    #[serde(default = "default_vector_dim")]
    pub vector_dim: usize,
    /// ONNX embedder model path. Only consulted when the server is built
    /// with the `onnx` feature; unset selects the keyed-hash fallback.
    #[serde(default)]
    pub model_path: Option<String>,
    /// Tokenizer file for the ONNX embedder.
    #[serde(default)]
    pub tokenizer_path: Option<String>,
    /// Decay tick period (seconds).
    #[serde(default = "default_decay_tick")]
    pub decay_tick_secs: u64,
    /// Enable age-based cleanup during decay ticks.
    #[serde(default)]
    pub cleanup_enabled: bool,
    /// Absolute age ceiling for cleanup candidates (hours).
    #[serde(default = "default_age_ceiling")]
    pub cleanup_age_ceiling_hours: i64,
    /// Records with at least this many uses are never auto-deleted.
    #[serde(default = "default_cleanup_min_uses")]
    pub cleanup_min_uses: u64,
    #[serde(default)]
    pub adaptive: AdaptiveConfig,
}

fn default_qdrant_endpoint() -> String {
    endpoints::QDRANT_DEFAULT.to_string()
}

fn default_vector_dim() -> usize {
    vectors::EMBEDDING_DIM
}

fn default_decay_tick() -> u64 {
    crate::constants::decay::TICK_SECS
}

fn default_age_ceiling() -> i64 {
    crate::constants::decay::AGE_CEILING_HOURS
}

fn default_cleanup_min_uses() -> u64 {
    crate::constants::decay::CLEANUP_MIN_USES
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            qdrant_endpoint: default_qdrant_endpoint(),
            qdrant_api_key: None,
            vector_dim: default_vector_dim(),
            model_path: None,
            tokenizer_path: None,
            decay_tick_secs: default_decay_tick(),
            cleanup_enabled: false,
            cleanup_age_ceiling_hours: default_age_ceiling(),
            cleanup_min_uses: default_cleanup_min_uses(),
            adaptive: AdaptiveConfig::default(),
        }
    }
}

/// Initial adaptive threshold values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveConfig {
    #[serde(default = "default_quality_gate")]
    pub quality_gate: f64,
    #[serde(default = "default_similarity_match")]
    pub similarity_match: f64,
    #[serde(default = "default_reinforcement_cutoff")]
    pub reinforcement_cutoff: f64,
}

fn default_quality_gate() -> f64 {
    adaptive::QUALITY_GATE_INITIAL
}

fn default_similarity_match() -> f64 {
    adaptive::SIMILARITY_MATCH_INITIAL
}

fn default_reinforcement_cutoff() -> f64 {
    adaptive::REINFORCEMENT_CUTOFF_INITIAL
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            quality_gate: default_quality_gate(),
            similarity_match: default_similarity_match(),
            reinforcement_cutoff: default_reinforcement_cutoff(),
        }
    }
}

/// Model backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model_name")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_model_endpoint() -> String {
    endpoints::MODEL_DEFAULT.to_string()
}

fn default_model_name() -> String {
    "qwen3:4b-instruct-2507-q4_K_M".to_string()
}

fn default_max_tokens() -> usize {
    1024
}

fn default_temperature() -> f32 {
    0.3
}

fn default_model_timeout() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    2
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: default_model_endpoint(),
            model: default_model_name(),
            api_key: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_model_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

/// Validator availability policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Backend unreachable fails the request.
    #[default]
    Strict,
    /// Backend unreachable approves at `acceptable`.
    Permissive,
}

/// Validator gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    #[serde(default = "default_validator_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_validator_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub mode: ValidationMode,
    /// Minimum overall score for approval.
    #[serde(default = "default_approval_gate")]
    pub approval_gate: f64,
    /// Per-criterion weak threshold used by the quality engine.
    #[serde(default = "default_criterion_threshold")]
    pub criterion_threshold: f64,
    #[serde(default = "default_criterion_timeout")]
    pub criterion_timeout_secs: u64,
    #[serde(default = "default_outer_timeout")]
    pub outer_timeout_secs: u64,
}

fn default_validator_endpoint() -> String {
    endpoints::VALIDATOR_DEFAULT.to_string()
}

fn default_validator_model() -> String {
    "qwen3:4b-instruct-2507-q4_K_M".to_string()
}

fn default_approval_gate() -> f64 {
    0.65
}

fn default_criterion_threshold() -> f64 {
    0.70
}

fn default_criterion_timeout() -> u64 {
    deadlines::CRITERION_SECS
}

fn default_outer_timeout() -> u64 {
    deadlines::VALIDATE_OUTER_SECS
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            endpoint: default_validator_endpoint(),
            model: default_validator_model(),
            api_key: None,
            mode: ValidationMode::default(),
            approval_gate: default_approval_gate(),
            criterion_threshold: default_criterion_threshold(),
            criterion_timeout_secs: default_criterion_timeout(),
            outer_timeout_secs: default_outer_timeout(),
        }
    }
}

/// Enrichment client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    #[serde(default = "default_enrichment_endpoint")]
    pub endpoint: String,
    /// Per-attempt deadline (seconds); on expiry enrichment degrades.
    #[serde(default = "default_enrichment_timeout")]
    pub timeout_secs: u64,
}

fn default_enrichment_endpoint() -> String {
    endpoints::ENRICHMENT_DEFAULT.to_string()
}

fn default_enrichment_timeout() -> u64 {
    deadlines::ENRICHMENT_SECS
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            endpoint: default_enrichment_endpoint(),
            timeout_secs: default_enrichment_timeout(),
        }
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum pipelines running concurrently.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Waiting requests beyond the cap; overflow is rejected.
    #[serde(default = "default_queue_bound")]
    pub queue_bound: usize,
    /// Generation attempts including validation-driven retries.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Seconds reserved out of the request budget for validation.
    #[serde(default = "default_validation_reserve")]
    pub validation_reserve_secs: u64,
}

fn default_max_concurrent() -> usize {
    16
}

fn default_queue_bound() -> usize {
    64
}

fn default_max_attempts() -> u32 {
    2
}

fn default_validation_reserve() -> u64 {
    deadlines::VALIDATION_RESERVE_SECS
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            queue_bound: default_queue_bound(),
            max_attempts: default_max_attempts(),
            validation_reserve_secs: default_validation_reserve(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            metrics_enabled: true,
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_privacy()?;
        self.validate_learning()?;
        self.validate_validator()?;
        self.validate_pipeline()?;
        Ok(())
    }

    fn validate_privacy(&self) -> Result<(), ConfigError> {
        if self.privacy.ttl_seconds <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "privacy.ttl_seconds".to_string(),
                message: "TTL must be positive".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.privacy.detection_confidence) {
            return Err(ConfigError::InvalidValue {
                field: "privacy.detection_confidence".to_string(),
                message: format!(
                    "Must be between 0.0 and 1.0, got {}",
                    self.privacy.detection_confidence
                ),
            });
        }
        if self.environment.is_strict() && self.privacy.secret == "dev-only-secret" {
            return Err(ConfigError::InvalidValue {
                field: "privacy.secret".to_string(),
                message: "default secret not allowed outside development".to_string(),
            });
        }
        Ok(())
    }

    fn validate_learning(&self) -> Result<(), ConfigError> {
        if self.learning.vector_dim == 0 {
            return Err(ConfigError::InvalidValue {
                field: "learning.vector_dim".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }
        let a = &self.learning.adaptive;
        for (field, value) in [
            ("learning.adaptive.quality_gate", a.quality_gate),
            ("learning.adaptive.similarity_match", a.similarity_match),
            (
                "learning.adaptive.reinforcement_cutoff",
                a.reinforcement_cutoff,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("Must be between 0.0 and 1.0, got {}", value),
                });
            }
        }
        Ok(())
    }

    fn validate_validator(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.validator.approval_gate) {
            return Err(ConfigError::InvalidValue {
                field: "validator.approval_gate".to_string(),
                message: format!(
                    "Must be between 0.0 and 1.0, got {}",
                    self.validator.approval_gate
                ),
            });
        }
        if self.validator.outer_timeout_secs < self.validator.criterion_timeout_secs {
            tracing::warn!(
                "validator.outer_timeout_secs ({}) is below criterion_timeout_secs ({}), \
                 criterion calls will be cut short by the outer deadline",
                self.validator.outer_timeout_secs,
                self.validator.criterion_timeout_secs
            );
        }
        Ok(())
    }

    fn validate_pipeline(&self) -> Result<(), ConfigError> {
        if self.pipeline.max_concurrent == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.max_concurrent".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }
        if self.pipeline.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.max_attempts".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Load settings from layered sources: built-in defaults, then
/// `config/default.toml`, then `config/{env}.toml`, then `FINSIGHT__`
/// environment variables (double underscore separates sections).
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    if Path::new("config/default.toml").exists() {
        builder = builder.add_source(File::with_name("config/default"));
    }

    if let Some(env_name) = env {
        let env_path = format!("config/{}", env_name);
        if Path::new(&format!("{}.toml", env_path)).exists() {
            builder = builder.add_source(File::with_name(&env_path));
        } else {
            tracing::warn!(environment = env_name, "No environment config file found");
        }
    }

    builder = builder.add_source(Environment::with_prefix("FINSIGHT").separator("__"));

    let config = builder
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let settings: Settings = config
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    settings.validate()?;
    Ok(settings)
}
