//! Validator gate
//!
//! Criteria are evaluated concurrently, each under its own deadline; the
//! whole call sits under an outer deadline that returns a partial verdict
//! built from whatever completed.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;

use finsight_config::{ValidationMode, ValidatorConfig};
use finsight_core::{
    Analysis, CriterionName, QualityLevel, Record, ValidationVerdict,
};
use finsight_llm::{LlmBackend, Message};

use crate::criteria::{criterion_prompt, parse_score};
use crate::ValidatorError;

/// Gate configuration
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub mode: ValidationMode,
    /// Minimum overall score for approval.
    pub approval_gate: f64,
    pub criterion_timeout: Duration,
    pub outer_timeout: Duration,
    /// Aggregation weights; callers may override per request, overrides do
    /// not persist.
    pub weights: BTreeMap<CriterionName, f64>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            mode: ValidationMode::Strict,
            approval_gate: 0.65,
            criterion_timeout: Duration::from_secs(10),
            outer_timeout: Duration::from_secs(20),
            weights: ValidationVerdict::default_weights(),
        }
    }
}

impl GateConfig {
    pub fn from_settings(settings: &ValidatorConfig) -> Self {
        Self {
            mode: settings.mode,
            approval_gate: settings.approval_gate,
            criterion_timeout: Duration::from_secs(settings.criterion_timeout_secs),
            outer_timeout: Duration::from_secs(settings.outer_timeout_secs),
            weights: ValidationVerdict::default_weights(),
        }
    }
}

/// The blocking quality gate.
pub struct ValidatorGate {
    backend: Arc<dyn LlmBackend>,
    config: GateConfig,
}

impl ValidatorGate {
    pub fn new(backend: Arc<dyn LlmBackend>, config: GateConfig) -> Self {
        Self { backend, config }
    }

    /// Probe the validator backend for /health.
    pub async fn ping(&self) -> bool {
        self.backend.is_available().await
    }

    /// Score a candidate response. Blocking: the caller gets nothing until
    /// this returns.
    pub async fn validate(
        &self,
        prompt: &str,
        record: &Record,
        response: &str,
    ) -> Result<ValidationVerdict, ValidatorError> {
        self.validate_weighted(prompt, record, response, None).await
    }

    /// Like [`validate`](Self::validate) with caller-supplied aggregation
    /// weights for this call only. Overrides never persist.
    pub async fn validate_weighted(
        &self,
        prompt: &str,
        record: &Record,
        response: &str,
        weights: Option<&BTreeMap<CriterionName, f64>>,
    ) -> Result<ValidationVerdict, ValidatorError> {
        let weights = weights.unwrap_or(&self.config.weights);

        if !self.backend.is_available().await {
            return match self.config.mode {
                ValidationMode::Strict => Err(ValidatorError::Unavailable(
                    "validator backend did not respond".to_string(),
                )),
                ValidationMode::Permissive => {
                    tracing::warn!("Validator unavailable, permissive mode approves");
                    Ok(ValidationVerdict {
                        overall_score: self.config.approval_gate,
                        per_criterion: BTreeMap::new(),
                        quality_level: QualityLevel::Acceptable,
                        approved: true,
                        rationale: "validator_unavailable".to_string(),
                        timed_out: Vec::new(),
                    })
                },
            };
        }

        let record_json =
            serde_json::to_string(record.as_value()).unwrap_or_else(|_| "{}".to_string());

        // Results land here so a blown outer deadline can still read what
        // completed.
        let scores: Arc<DashMap<CriterionName, f64>> = Arc::new(DashMap::new());
        let timed_out: Arc<DashMap<CriterionName, ()>> = Arc::new(DashMap::new());

        let mut tasks = Vec::new();
        for criterion in CriterionName::all() {
            let criterion = *criterion;

            // The structural criterion is literal: no section markers, no
            // call, score 0.
            if criterion == CriterionName::Structural
                && !Analysis::has_required_sections(response)
            {
                scores.insert(criterion, 0.0);
                continue;
            }

            let backend = self.backend.clone();
            let scores = scores.clone();
            let timed_out = timed_out.clone();
            let call_prompt = criterion_prompt(criterion, &record_json, prompt, response);
            let deadline = self.config.criterion_timeout;

            tasks.push(tokio::spawn(async move {
                let messages = [Message::user(call_prompt)];
                match tokio::time::timeout(deadline, backend.generate(&messages)).await {
                    Ok(Ok(result)) => {
                        scores.insert(criterion, parse_score(&result.text));
                    },
                    Ok(Err(e)) => {
                        tracing::warn!(criterion = %criterion, error = %e, "Criterion call failed, scoring 0");
                        scores.insert(criterion, 0.0);
                    },
                    Err(_) => {
                        tracing::warn!(criterion = %criterion, "Criterion call timed out, scoring 0");
                        scores.insert(criterion, 0.0);
                        timed_out.insert(criterion, ());
                    },
                }
            }));
        }

        let outer_hit = tokio::time::timeout(self.config.outer_timeout, join_all(tasks))
            .await
            .is_err();

        let collected: BTreeMap<CriterionName, f64> = CriterionName::all()
            .iter()
            .map(|c| (*c, scores.get(c).map(|s| *s).unwrap_or(0.0)))
            .collect();

        let mut verdict = if outer_hit {
            let mut v = ValidationVerdict::from_scores(
                collected,
                weights,
                self.config.approval_gate,
                "outer_timeout",
            );
            v.approved = false;
            v
        } else {
            let rationale = rationale_for(&collected, self.config.approval_gate, weights);
            ValidationVerdict::from_scores(
                collected,
                weights,
                self.config.approval_gate,
                rationale,
            )
        };

        verdict.timed_out = timed_out.iter().map(|e| *e.key()).collect();

        tracing::debug!(
            overall = verdict.overall_score,
            approved = verdict.approved,
            level = %verdict.quality_level,
            "Validation complete"
        );

        Ok(verdict)
    }
}

fn rationale_for(
    scores: &BTreeMap<CriterionName, f64>,
    gate: f64,
    weights: &BTreeMap<CriterionName, f64>,
) -> String {
    let overall: f64 = weights
        .iter()
        .map(|(name, w)| w * scores.get(name).copied().unwrap_or(0.0))
        .sum();
    if overall >= gate {
        "meets quality gate".to_string()
    } else {
        let weak: Vec<&str> = scores
            .iter()
            .filter(|(_, s)| **s < gate)
            .map(|(name, _)| name.as_str())
            .collect();
        format!("below quality gate, weak criteria: {}", weak.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use finsight_llm::{GenerationResult, LlmError};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Scripted backend: fixed reply, optional latency, switchable
    /// availability.
    struct StubBackend {
        reply: String,
        latency: Duration,
        available: AtomicBool,
    }

    impl StubBackend {
        fn scoring(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                latency: Duration::ZERO,
                available: AtomicBool::new(true),
            }
        }

        fn down() -> Self {
            Self {
                reply: String::new(),
                latency: Duration::ZERO,
                available: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl LlmBackend for StubBackend {
        async fn generate(&self, _messages: &[Message]) -> Result<GenerationResult, LlmError> {
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            Ok(GenerationResult {
                text: self.reply.clone(),
                tokens: 1,
                total_time_ms: 0,
            })
        }

        async fn is_available(&self) -> bool {
            self.available.load(Ordering::SeqCst)
        }

        fn model_name(&self) -> &str {
            "stub"
        }
    }

    const WELL_FORMED: &str = "## Insights\nvolume is up\n\n## Recommendations\nkeep monitoring";

    fn record() -> Record {
        Record::new(serde_json::json!({"amount": 100}))
    }

    #[tokio::test]
    async fn test_approves_well_formed_high_scores() {
        let gate = ValidatorGate::new(Arc::new(StubBackend::scoring("0.9")), GateConfig::default());
        let verdict = gate.validate("prompt", &record(), WELL_FORMED).await.unwrap();

        assert!((verdict.overall_score - 0.9).abs() < 1e-9);
        assert!(verdict.approved);
        assert_eq!(verdict.quality_level, QualityLevel::High);
        assert!(verdict.timed_out.is_empty());
    }

    #[tokio::test]
    async fn test_missing_sections_zero_structural_without_call() {
        let gate = ValidatorGate::new(Arc::new(StubBackend::scoring("1.0")), GateConfig::default());
        let verdict = gate
            .validate("prompt", &record(), "free text with no markers")
            .await
            .unwrap();

        assert_eq!(verdict.per_criterion[&CriterionName::Structural], 0.0);
        // Other criteria scored by the backend
        assert_eq!(verdict.per_criterion[&CriterionName::Accuracy], 1.0);
        assert!((verdict.overall_score - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_strict_mode_fails_when_unavailable() {
        let gate = ValidatorGate::new(Arc::new(StubBackend::down()), GateConfig::default());
        let err = gate.validate("prompt", &record(), WELL_FORMED).await.unwrap_err();
        assert!(matches!(err, ValidatorError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_permissive_mode_approves_when_unavailable() {
        let config = GateConfig {
            mode: ValidationMode::Permissive,
            ..Default::default()
        };
        let gate = ValidatorGate::new(Arc::new(StubBackend::down()), config);
        let verdict = gate.validate("prompt", &record(), WELL_FORMED).await.unwrap();

        assert!(verdict.approved);
        assert_eq!(verdict.quality_level, QualityLevel::Acceptable);
        assert_eq!(verdict.rationale, "validator_unavailable");
    }

    #[tokio::test]
    async fn test_slow_criterion_times_out_and_scores_zero() {
        let backend = StubBackend {
            reply: "0.9".to_string(),
            latency: Duration::from_millis(200),
            available: AtomicBool::new(true),
        };
        let config = GateConfig {
            criterion_timeout: Duration::from_millis(50),
            outer_timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let gate = ValidatorGate::new(Arc::new(backend), config);
        let verdict = gate.validate("prompt", &record(), WELL_FORMED).await.unwrap();

        assert_eq!(verdict.overall_score, 0.0);
        assert!(!verdict.approved);
        assert!(!verdict.timed_out.is_empty());
    }

    #[tokio::test]
    async fn test_outer_timeout_returns_partial_not_approved() {
        let backend = StubBackend {
            reply: "0.9".to_string(),
            latency: Duration::from_millis(500),
            available: AtomicBool::new(true),
        };
        let config = GateConfig {
            criterion_timeout: Duration::from_secs(5),
            outer_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let gate = ValidatorGate::new(Arc::new(backend), config);
        let verdict = gate.validate("prompt", &record(), WELL_FORMED).await.unwrap();

        assert!(!verdict.approved);
        assert_eq!(verdict.rationale, "outer_timeout");
    }

    #[tokio::test]
    async fn test_weight_override_applies_for_one_call() {
        // All the weight on structural: a response without sections scores
        // zero overall even though the backend scores everything else 1.0.
        let gate = ValidatorGate::new(Arc::new(StubBackend::scoring("1.0")), GateConfig::default());

        let mut structural_only = BTreeMap::new();
        structural_only.insert(CriterionName::Structural, 1.0);

        let verdict = gate
            .validate_weighted("prompt", &record(), "no markers", Some(&structural_only))
            .await
            .unwrap();
        assert_eq!(verdict.overall_score, 0.0);
        assert!(!verdict.approved);

        // The next unweighted call falls back to the configured weights.
        let verdict = gate.validate("prompt", &record(), WELL_FORMED).await.unwrap();
        assert!((verdict.overall_score - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unparseable_scores_fail_closed() {
        let gate = ValidatorGate::new(
            Arc::new(StubBackend::scoring("I cannot score this")),
            GateConfig::default(),
        );
        let verdict = gate.validate("prompt", &record(), WELL_FORMED).await.unwrap();
        assert_eq!(verdict.overall_score, 0.0);
        assert!(!verdict.approved);
    }
}
