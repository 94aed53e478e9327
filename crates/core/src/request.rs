//! Pipeline request and result types

use crate::analysis::Analysis;
use crate::pii::{PiiSummary, PseudonymId};
use crate::record::Record;
use crate::verdict::ValidationVerdict;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Per-request feature toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    #[serde(default = "default_true")]
    pub enable_enrichment: bool,
    #[serde(default = "default_true")]
    pub enable_learning: bool,
    #[serde(default = "default_true")]
    pub enable_blocking_validation: bool,
    #[serde(default)]
    pub repersonalize_on_exit: bool,
    /// Business context tag steering template selection.
    #[serde(default)]
    pub context: Option<String>,
    /// Overall request budget in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    120_000
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            enable_enrichment: true,
            enable_learning: true,
            enable_blocking_validation: true,
            repersonalize_on_exit: false,
            context: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl RequestConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// One caller invocation. Owned exclusively by the orchestrator while in
/// flight.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub id: Uuid,
    pub record: Record,
    pub config: RequestConfig,
    pub received_at: DateTime<Utc>,
}

impl PipelineRequest {
    pub fn new(record: Record, config: RequestConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            record,
            config,
            received_at: Utc::now(),
        }
    }
}

/// Where the prompt came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptSource {
    Improved,
    Reused,
    Fresh,
}

/// Outcome of the enrichment step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStatus {
    Applied,
    Degraded,
    Disabled,
}

/// Which stored knowledge shaped this answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub prompt_source: PromptSource,
    pub pattern_id: Option<Uuid>,
    pub similarity: Option<f32>,
    pub cache_hit: bool,
    /// Stored patterns consulted at or above the similarity threshold.
    #[serde(default)]
    pub rag_hits: usize,
    pub enrichment: EnrichmentStatus,
    /// True when the hash-based fallback embedder produced the signature
    /// vector.
    pub embedder_fallback: bool,
    pub pseudonym_id: Option<PseudonymId>,
    pub pii: Option<PiiSummary>,
    /// Non-fatal learning-feedback failures, surfaced as metadata.
    #[serde(default)]
    pub feedback_errors: Vec<String>,
}

impl Default for Provenance {
    fn default() -> Self {
        Self {
            prompt_source: PromptSource::Fresh,
            pattern_id: None,
            similarity: None,
            cache_hit: false,
            rag_hits: 0,
            enrichment: EnrichmentStatus::Disabled,
            embedder_fallback: false,
            pseudonym_id: None,
            pii: None,
            feedback_errors: Vec::new(),
        }
    }
}

/// Wall-clock phase timings in milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Timings {
    pub pseudonymize_ms: u64,
    pub prompt_ms: u64,
    pub generation_ms: u64,
    pub validation_ms: u64,
    pub feedback_ms: u64,
    pub total_ms: u64,
    /// Generation attempts, including validation-driven retries.
    pub attempts: u32,
}

/// What the caller gets back. `analysis` is absent on failure; the verdict
/// is present whenever validation ran, so a caller can distinguish
/// `validation_rejected` (verdict, no analysis) from generation errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub request_id: Uuid,
    pub analysis: Option<Analysis>,
    pub validation: Option<ValidationVerdict>,
    pub provenance: Provenance,
    pub timings: Timings,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_config_defaults() {
        let config = RequestConfig::default();
        assert!(config.enable_enrichment);
        assert!(config.enable_learning);
        assert!(config.enable_blocking_validation);
        assert!(!config.repersonalize_on_exit);
        assert_eq!(config.timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_request_config_wire_defaults() {
        // Omitted toggles fall back to defaults when deserialized.
        let config: RequestConfig = serde_json::from_value(json!({})).unwrap();
        assert!(config.enable_blocking_validation);
        assert!(!config.repersonalize_on_exit);
    }

    #[test]
    fn test_prompt_source_wire_names() {
        assert_eq!(
            serde_json::to_value(PromptSource::Reused).unwrap(),
            json!("reused")
        );
        assert_eq!(
            serde_json::to_value(EnrichmentStatus::Degraded).unwrap(),
            json!("degraded")
        );
    }
}
