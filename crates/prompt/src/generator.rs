//! Prompt generator
//!
//! Strict source order: improved template, then high-similarity reuse, then
//! fresh synthesis. Given identical record, configuration, and substrate
//! state the generator returns the same prompt and metadata (modulo
//! timings).

use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use finsight_core::{EnrichmentStatus, PatternKind, PromptSource, Record};
use finsight_learning::{FeedbackEvent, LearningSubstrate, PatternSearch};
use finsight_quality::QualityEngine;

use crate::enrichment::EnrichmentClient;
use crate::templates::{fill_template, synthesize_template, ContextTag};
use crate::PromptError;

/// How a prompt came to be.
#[derive(Debug, Clone)]
pub struct PromptMetadata {
    pub source: PromptSource,
    pub similarity: Option<f32>,
    pub pattern_id: Option<Uuid>,
    pub enrichment: EnrichmentStatus,
    /// Stored prompt patterns at or above the similarity threshold for
    /// this signature.
    pub rag_hits: usize,
    pub generation_time_ms: u64,
}

/// A generated prompt plus the reusable template it was filled from.
#[derive(Debug, Clone)]
pub struct GeneratedPrompt {
    /// Fully parameterized prompt, ready for the model.
    pub prompt: String,
    /// The unfilled template; this is what learning feedback stores.
    pub template: String,
    /// Signature vector of the input record.
    pub signature_vector: Vec<f32>,
    pub metadata: PromptMetadata,
}

/// Prompt generator over the learning substrate and quality engine.
pub struct PromptGenerator {
    substrate: Arc<LearningSubstrate>,
    engine: Arc<QualityEngine>,
    enrichment: Option<Arc<EnrichmentClient>>,
}

impl PromptGenerator {
    pub fn new(
        substrate: Arc<LearningSubstrate>,
        engine: Arc<QualityEngine>,
        enrichment: Option<Arc<EnrichmentClient>>,
    ) -> Self {
        Self {
            substrate,
            engine,
            enrichment,
        }
    }

    /// Generate the best available prompt for a redacted record.
    ///
    /// Enrichment runs concurrently with cache consultation; its own
    /// deadline bounds it, and a failure only degrades the prompt.
    pub async fn generate(
        &self,
        record: &Record,
        context: ContextTag,
        enable_enrichment: bool,
    ) -> Result<GeneratedPrompt, PromptError> {
        let started = Instant::now();
        let signature_vector = self.substrate.signature_vector(record).await?;

        let (selection, augmentation, rag_hits) = tokio::join!(
            self.select_template(&signature_vector, context),
            async {
                if !enable_enrichment {
                    return None;
                }
                match &self.enrichment {
                    Some(client) => Some(client.augment(record, context.as_str()).await),
                    None => None,
                }
            },
            async {
                let min = self.substrate.adaptive().similarity_match() as f32;
                self.substrate
                    .similar(PatternKind::Prompt, &signature_vector, 16, min)
                    .await
                    .map(|hits| hits.len())
                    .unwrap_or(0)
            }
        );
        let (template, source, similarity, pattern_id) = selection?;

        let mut prompt = fill_template(&template, record);

        // Improved templates already encode what past verdicts asked for;
        // enrichment applies to the reuse and synthesis paths.
        let enrichment = if !enable_enrichment {
            EnrichmentStatus::Disabled
        } else if source == PromptSource::Improved {
            EnrichmentStatus::Disabled
        } else {
            match augmentation {
                Some(Ok(augmentation)) => {
                    prompt.push_str("\n\nExternal context:\n");
                    prompt.push_str(&augmentation.augmentation_text);
                    EnrichmentStatus::Applied
                },
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "Enrichment skipped");
                    EnrichmentStatus::Degraded
                },
                None => EnrichmentStatus::Degraded,
            }
        };

        Ok(GeneratedPrompt {
            prompt,
            template,
            signature_vector,
            metadata: PromptMetadata {
                source,
                similarity,
                pattern_id,
                enrichment,
                rag_hits,
                generation_time_ms: started.elapsed().as_millis() as u64,
            },
        })
    }

    async fn select_template(
        &self,
        signature_vector: &[f32],
        context: ContextTag,
    ) -> Result<(String, PromptSource, Option<f32>, Option<Uuid>), PromptError> {
        if let Some(improved) = self.engine.get_improved(signature_vector).await? {
            tracing::debug!(
                pattern_id = %improved.record.id,
                similarity = improved.similarity,
                "Using improved template"
            );
            return Ok((
                improved.record.payload,
                PromptSource::Improved,
                Some(improved.similarity),
                Some(improved.record.id),
            ));
        }

        let min_similarity = self.substrate.adaptive().similarity_match() as f32;
        if let Some(reused) = self
            .substrate
            .best_of(PatternKind::Prompt, signature_vector, min_similarity)
            .await?
        {
            tracing::debug!(
                pattern_id = %reused.record.id,
                similarity = reused.similarity,
                "Reusing stored prompt pattern"
            );
            self.substrate.adaptive().feed(FeedbackEvent::Reuse {
                similarity: reused.similarity,
            });
            return Ok((
                reused.record.payload,
                PromptSource::Reused,
                Some(reused.similarity),
                Some(reused.record.id),
            ));
        }

        Ok((
            synthesize_template(context),
            PromptSource::Fresh,
            None,
            None,
        ))
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use finsight_core::pattern::DATA_TYPE_BASE_PROMPT;
    use finsight_core::{PatternMetadata, PatternRecord, PatternStats, QualityLevel, ValidationVerdict};
    use finsight_learning::{
        AdaptiveHandle, Embedder, MemoryIndex, PatternWriter, SubstrateConfig,
    };
    use finsight_quality::QualityEngineConfig;
    use serde_json::json;
    use std::collections::BTreeMap;

    async fn generator() -> (PromptGenerator, Arc<LearningSubstrate>) {
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
        let engine = Arc::new(QualityEngine::new(
            substrate.clone(),
            substrate.clone(),
            substrate.adaptive().clone(),
            QualityEngineConfig::default(),
        ));
        (
            PromptGenerator::new(substrate.clone(), engine, None),
            substrate,
        )
    }

    fn record() -> Record {
        Record::new(json!({
            "customer_id": "CUST_abcd",
            "transactions": [{"amount": 5000, "type": "credit"}],
        }))
    }

    #[tokio::test]
    async fn test_fresh_synthesis_on_empty_substrate() {
        let (generator, _) = generator().await;
        let generated = generator
            .generate(&record(), ContextTag::Banking, false)
            .await
            .unwrap();

        assert_eq!(generated.metadata.source, PromptSource::Fresh);
        assert!(generated.metadata.pattern_id.is_none());
        assert_eq!(generated.metadata.rag_hits, 0);
        assert_eq!(generated.metadata.enrichment, EnrichmentStatus::Disabled);
        assert!(generated.prompt.contains("## Insights"));
        assert!(generated.prompt.contains("## Recommendations"));
        assert!(generated.prompt.contains("CUST_abcd"));
        // Template keeps the placeholder for storage
        assert!(generated.template.contains(crate::templates::RECORD_PLACEHOLDER));
    }

    #[tokio::test]
    async fn test_reuse_after_pattern_stored() {
        let (generator, substrate) = generator().await;
        let first = generator
            .generate(&record(), ContextTag::Banking, false)
            .await
            .unwrap();

        // Store the first prompt as an approved pattern, as the
        // orchestrator's feedback step would.
        let pattern = PatternRecord::new(
            PatternKind::Prompt,
            first.signature_vector.clone(),
            first.template.clone(),
            PatternMetadata {
                context: "banking".to_string(),
                data_type: DATA_TYPE_BASE_PROMPT.to_string(),
                domain: "financial_records".to_string(),
            },
            PatternStats::initial(true, 0.9, chrono::Utc::now()),
        );
        substrate.append(pattern.clone()).await.unwrap();

        let second = generator
            .generate(&record(), ContextTag::Banking, false)
            .await
            .unwrap();
        assert_eq!(second.metadata.source, PromptSource::Reused);
        assert_eq!(second.metadata.pattern_id, Some(pattern.id));
        assert!(second.metadata.similarity.unwrap() > 0.99);
        assert!(second.metadata.rag_hits >= 1);
        // The reused template is re-filled with the current record
        assert!(second.prompt.contains("CUST_abcd"));
    }

    #[tokio::test]
    async fn test_improved_template_takes_precedence() {
        let (generator, substrate) = generator().await;
        let first = generator
            .generate(&record(), ContextTag::Banking, false)
            .await
            .unwrap();

        // A weak verdict produces an improved template for this signature.
        let engine = QualityEngine::new(
            substrate.clone(),
            substrate.clone(),
            substrate.adaptive().clone(),
            QualityEngineConfig::default(),
        );
        let mut per_criterion = BTreeMap::new();
        per_criterion.insert(finsight_core::CriterionName::Structural, 0.1);
        let verdict = ValidationVerdict {
            overall_score: 0.4,
            per_criterion,
            quality_level: QualityLevel::Poor,
            approved: false,
            rationale: "weak".to_string(),
            timed_out: Vec::new(),
        };
        engine
            .observe(&first.signature_vector, &first.template, &verdict, "banking")
            .await
            .unwrap();

        let after = generator
            .generate(&record(), ContextTag::Banking, true)
            .await
            .unwrap();
        assert_eq!(after.metadata.source, PromptSource::Improved);
        assert!(after.prompt.contains("exactly two labeled sections"));
        // Improved path does not attempt enrichment
        assert_eq!(after.metadata.enrichment, EnrichmentStatus::Disabled);
    }

    #[tokio::test]
    async fn test_determinism_for_identical_state() {
        let (generator, _) = generator().await;
        let a = generator
            .generate(&record(), ContextTag::Risk, false)
            .await
            .unwrap();
        let b = generator
            .generate(&record(), ContextTag::Risk, false)
            .await
            .unwrap();
        assert_eq!(a.prompt, b.prompt);
        assert_eq!(a.signature_vector, b.signature_vector);
        assert_eq!(a.metadata.source, b.metadata.source);
    }

    #[tokio::test]
    async fn test_enrichment_degrades_without_client() {
        let (generator, _) = generator().await;
        let generated = generator
            .generate(&record(), ContextTag::Banking, true)
            .await
            .unwrap();
        assert_eq!(generated.metadata.enrichment, EnrichmentStatus::Degraded);
    }
}
