//! Quality improvement engine
//!
//! Holds write and search capabilities over the substrate, never the
//! substrate itself, keeping the component graph one-way.

use std::sync::Arc;

use uuid::Uuid;

use finsight_core::pattern::{DATA_TYPE_BASE_PROMPT, DATA_TYPE_IMPROVED_TEMPLATE};
use finsight_core::{
    CriterionName, PatternKind, PatternMetadata, PatternRecord, PatternStats, ValidationVerdict,
};
use finsight_learning::{AdaptiveHandle, PatternSearch, PatternWriter, ScoredPattern};

use crate::amendments::apply_amendments;
use crate::QualityError;

/// Similarity at which two prompts on the same signature are treated as the
/// same pattern for stat accumulation.
const SAME_PATTERN_SIMILARITY: f32 = 0.999;

/// Quality engine configuration
#[derive(Debug, Clone)]
pub struct QualityEngineConfig {
    /// Criteria scoring below this are amended.
    pub criterion_threshold: f64,
}

impl Default for QualityEngineConfig {
    fn default() -> Self {
        Self {
            criterion_threshold: 0.70,
        }
    }
}

/// What one observation did to the store.
#[derive(Debug, Clone)]
pub enum ObserveOutcome {
    /// The prompt met the quality gate; its pattern was reinforced or
    /// appended.
    SuccessRecorded { pattern_id: Uuid },
    /// The prompt fell short; an improved template was stored.
    ImprovedTemplate {
        pattern_id: Uuid,
        amended: Vec<CriterionName>,
    },
}

/// Verdict-driven template improvement.
pub struct QualityEngine {
    writer: Arc<dyn PatternWriter>,
    search: Arc<dyn PatternSearch>,
    adaptive: AdaptiveHandle,
    config: QualityEngineConfig,
}

impl QualityEngine {
    pub fn new(
        writer: Arc<dyn PatternWriter>,
        search: Arc<dyn PatternSearch>,
        adaptive: AdaptiveHandle,
        config: QualityEngineConfig,
    ) -> Self {
        Self {
            writer,
            search,
            adaptive,
            config,
        }
    }

    /// Fold one validated interaction into the store.
    ///
    /// At or above the adaptive quality gate the prompt is recorded as a
    /// success pattern (no template mutation). Below it, every criterion
    /// under its threshold contributes its amendment block, and the result
    /// is stored as an improved template.
    pub async fn observe(
        &self,
        signature_vector: &[f32],
        prompt: &str,
        verdict: &ValidationVerdict,
        context: &str,
    ) -> Result<ObserveOutcome, QualityError> {
        if verdict.overall_score >= self.adaptive.quality_gate() {
            let pattern_id = self
                .record_or_reinforce(
                    signature_vector,
                    prompt,
                    DATA_TYPE_BASE_PROMPT,
                    context,
                    verdict,
                )
                .await?;
            return Ok(ObserveOutcome::SuccessRecorded { pattern_id });
        }

        let weak: Vec<CriterionName> = verdict
            .per_criterion
            .iter()
            .filter(|(_, score)| **score < self.config.criterion_threshold)
            .map(|(name, _)| *name)
            .collect();

        let improved = apply_amendments(prompt, &weak);
        let pattern_id = self
            .record_or_reinforce(
                signature_vector,
                &improved,
                DATA_TYPE_IMPROVED_TEMPLATE,
                context,
                verdict,
            )
            .await?;

        tracing::debug!(
            pattern_id = %pattern_id,
            amended = ?weak,
            score = verdict.overall_score,
            "Improved template stored"
        );

        Ok(ObserveOutcome::ImprovedTemplate {
            pattern_id,
            amended: weak,
        })
    }

    /// The highest-reinforcement improved template for this signature, at
    /// or above the adaptive similarity threshold.
    pub async fn get_improved(
        &self,
        signature_vector: &[f32],
    ) -> Result<Option<ScoredPattern>, QualityError> {
        let min_similarity = self.adaptive.similarity_match() as f32;
        let candidates = self
            .search
            .similar(PatternKind::Prompt, signature_vector, 16, min_similarity)
            .await?;

        let best = candidates
            .into_iter()
            .filter(|c| c.record.metadata.data_type == DATA_TYPE_IMPROVED_TEMPLATE)
            .max_by(|a, b| {
                a.record
                    .reinforcement
                    .partial_cmp(&b.record.reinforcement)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.record.tie_break(&a.record))
            });

        Ok(best)
    }

    /// Reinforce an existing identical pattern on this signature, or append
    /// a fresh one.
    async fn record_or_reinforce(
        &self,
        signature_vector: &[f32],
        payload: &str,
        data_type: &str,
        context: &str,
        verdict: &ValidationVerdict,
    ) -> Result<Uuid, QualityError> {
        let existing = self
            .search
            .similar(
                PatternKind::Prompt,
                signature_vector,
                16,
                SAME_PATTERN_SIMILARITY,
            )
            .await?
            .into_iter()
            .find(|c| c.record.metadata.data_type == data_type && c.record.payload == payload);

        if let Some(hit) = existing {
            self.writer
                .reinforce(
                    PatternKind::Prompt,
                    hit.record.id,
                    verdict.approved,
                    Some(verdict.overall_score),
                )
                .await?;
            return Ok(hit.record.id);
        }

        let record = PatternRecord::new(
            PatternKind::Prompt,
            signature_vector.to_vec(),
            payload.to_string(),
            PatternMetadata {
                context: context.to_string(),
                data_type: data_type.to_string(),
                domain: "financial_records".to_string(),
            },
            PatternStats::initial(verdict.approved, verdict.overall_score, chrono::Utc::now()),
        );
        let id = record.id;
        self.writer.append(record).await?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finsight_core::QualityLevel;
    use finsight_learning::{
        Embedder, LearningSubstrate, MemoryIndex, SubstrateConfig,
    };
    use std::collections::BTreeMap;

    async fn engine_with_substrate() -> (QualityEngine, Arc<LearningSubstrate>, Vec<f32>) {
        let substrate = Arc::new(
            LearningSubstrate::init(
                Arc::new(MemoryIndex::new()),
                Arc::new(Embedder::hash(32)),
                AdaptiveHandle::spawn(finsight_config::AdaptiveConfig::default()),
                SubstrateConfig {
                    vector_dim: 32,
                    query_top_k: 16,
                },
            )
            .await
            .unwrap(),
        );

        let engine = QualityEngine::new(
            substrate.clone(),
            substrate.clone(),
            substrate.adaptive().clone(),
            QualityEngineConfig::default(),
        );

        let record = finsight_core::Record::new(serde_json::json!({"customer": "CUST_x"}));
        let vector = substrate.signature_vector(&record).await.unwrap();
        (engine, substrate, vector)
    }

    fn verdict(overall: f64, per: &[(CriterionName, f64)]) -> ValidationVerdict {
        let per_criterion: BTreeMap<CriterionName, f64> = per.iter().copied().collect();
        ValidationVerdict {
            overall_score: overall,
            per_criterion,
            quality_level: QualityLevel::from_score(overall),
            approved: overall >= 0.65,
            rationale: "test".to_string(),
            timed_out: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_strong_verdict_records_success_pattern() {
        let (engine, _substrate, vector) = engine_with_substrate().await;
        let v = verdict(0.9, &[(CriterionName::Accuracy, 0.9)]);

        let outcome = engine
            .observe(&vector, "base prompt", &v, "banking")
            .await
            .unwrap();
        assert!(matches!(outcome, ObserveOutcome::SuccessRecorded { .. }));

        // No improved template exists for this signature.
        assert!(engine.get_improved(&vector).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_repeat_success_reinforces_same_pattern() {
        let (engine, substrate, vector) = engine_with_substrate().await;
        let v = verdict(0.9, &[(CriterionName::Accuracy, 0.9)]);

        let first = engine
            .observe(&vector, "base prompt", &v, "banking")
            .await
            .unwrap();
        let second = engine
            .observe(&vector, "base prompt", &v, "banking")
            .await
            .unwrap();

        let (ObserveOutcome::SuccessRecorded { pattern_id: a },
             ObserveOutcome::SuccessRecorded { pattern_id: b }) = (first, second)
        else {
            panic!("expected success outcomes");
        };
        assert_eq!(a, b);

        let stored = finsight_learning::PatternSearch::best_of(
            substrate.as_ref(),
            PatternKind::Prompt,
            &vector,
            0.9,
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(stored.record.stats.uses, 2);
    }

    #[tokio::test]
    async fn test_weak_verdict_stores_amended_template() {
        let (engine, _substrate, vector) = engine_with_substrate().await;
        let v = verdict(
            0.4,
            &[
                (CriterionName::Accuracy, 0.9),
                (CriterionName::Structural, 0.1),
                (CriterionName::Clarity, 0.5),
            ],
        );

        let outcome = engine
            .observe(&vector, "base prompt", &v, "banking")
            .await
            .unwrap();
        let ObserveOutcome::ImprovedTemplate { amended, .. } = outcome else {
            panic!("expected improved template");
        };
        assert!(amended.contains(&CriterionName::Structural));
        assert!(amended.contains(&CriterionName::Clarity));
        assert!(!amended.contains(&CriterionName::Accuracy));

        let improved = engine.get_improved(&vector).await.unwrap().unwrap();
        assert!(improved.record.payload.starts_with("base prompt"));
        assert!(improved
            .record
            .payload
            .contains(crate::amendments::amendment_block(CriterionName::Structural)));
    }

    #[tokio::test]
    async fn test_get_improved_ignores_base_prompts() {
        let (engine, _substrate, vector) = engine_with_substrate().await;
        let strong = verdict(0.9, &[(CriterionName::Accuracy, 0.9)]);
        engine
            .observe(&vector, "base prompt", &strong, "banking")
            .await
            .unwrap();

        assert!(engine.get_improved(&vector).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_better_template_preferred_over_worse() {
        // No negative-scoring pattern is preferentially retrieved over a
        // strictly better one for the same signature.
        let (engine, substrate, vector) = engine_with_substrate().await;

        let weak = verdict(0.3, &[(CriterionName::Clarity, 0.2)]);
        let outcome = engine
            .observe(&vector, "prompt one", &weak, "banking")
            .await
            .unwrap();
        let ObserveOutcome::ImprovedTemplate { pattern_id: poor_id, .. } = outcome else {
            panic!("expected improved template");
        };

        let weak_two = verdict(0.5, &[(CriterionName::Relevance, 0.3)]);
        let outcome = engine
            .observe(&vector, "prompt two", &weak_two, "banking")
            .await
            .unwrap();
        let ObserveOutcome::ImprovedTemplate { pattern_id: better_id, .. } = outcome else {
            panic!("expected improved template");
        };

        // Reinforce the better template with successes.
        for _ in 0..5 {
            finsight_learning::PatternWriter::reinforce(
                substrate.as_ref(),
                PatternKind::Prompt,
                better_id,
                true,
                Some(0.95),
            )
            .await
            .unwrap();
        }

        let retrieved = engine.get_improved(&vector).await.unwrap().unwrap();
        assert_eq!(retrieved.record.id, better_id);
        assert_ne!(retrieved.record.id, poor_id);
    }
}
