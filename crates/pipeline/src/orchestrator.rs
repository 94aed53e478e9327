//! Request orchestration
//!
//! Ordering guarantees within one request: pseudonymize happens before any
//! outbound call that could leak PII; validation happens before the
//! caller-visible response; learning feedback happens after validation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use finsight_core::pattern::DATA_TYPE_ANALYSIS;
use finsight_core::{
    Analysis, Error, PatternKind, PatternMetadata, PipelineRequest, PipelineResult, PromptSource,
    Provenance, Result, Timings, ValidationVerdict,
};
use finsight_learning::{FeedbackEvent, LearningSubstrate, PatternWriter};
use finsight_llm::{LlmBackend, Message};
use finsight_privacy::{PseudonymizeOutcome, Pseudonymizer};
use finsight_prompt::{ContextTag, GeneratedPrompt, PromptGenerator};
use finsight_quality::{apply_amendments, QualityEngine};
use finsight_validator::{ValidatorError, ValidatorGate};

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum pipelines running concurrently.
    pub max_concurrent: usize,
    /// Requests allowed to wait for a slot; overflow is rejected with no
    /// side effects.
    pub queue_bound: usize,
    /// Generation attempts, including validation-driven retries.
    pub max_attempts: u32,
    /// Reserved out of the request budget for validation.
    pub validation_reserve: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 16,
            queue_bound: 64,
            max_attempts: 2,
            validation_reserve: Duration::from_secs(20),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_settings(settings: &finsight_config::PipelineConfig) -> Self {
        Self {
            max_concurrent: settings.max_concurrent,
            queue_bound: settings.queue_bound,
            max_attempts: settings.max_attempts,
            validation_reserve: Duration::from_secs(settings.validation_reserve_secs),
        }
    }
}

/// Live counters for /status.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OrchestratorStatus {
    pub running: usize,
    pub waiting: usize,
    pub max_concurrent: usize,
    pub queue_bound: usize,
    pub completed: usize,
    pub rejected_overload: usize,
}

/// The pipeline orchestrator. Owns the in-flight request exclusively and
/// holds every component by reference.
pub struct Orchestrator {
    pseudonymizer: Arc<Pseudonymizer>,
    generator: Arc<PromptGenerator>,
    backend: Arc<dyn LlmBackend>,
    gate: Arc<ValidatorGate>,
    substrate: Arc<LearningSubstrate>,
    engine: Arc<QualityEngine>,
    config: OrchestratorConfig,
    slots: Arc<Semaphore>,
    waiting: AtomicUsize,
    running: AtomicUsize,
    completed: AtomicUsize,
    rejected_overload: AtomicUsize,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pseudonymizer: Arc<Pseudonymizer>,
        generator: Arc<PromptGenerator>,
        backend: Arc<dyn LlmBackend>,
        gate: Arc<ValidatorGate>,
        substrate: Arc<LearningSubstrate>,
        engine: Arc<QualityEngine>,
        config: OrchestratorConfig,
    ) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_concurrent));
        Self {
            pseudonymizer,
            generator,
            backend,
            gate,
            substrate,
            engine,
            config,
            slots,
            waiting: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            rejected_overload: AtomicUsize::new(0),
        }
    }

    pub fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            running: self.running.load(Ordering::Relaxed),
            waiting: self.waiting.load(Ordering::Relaxed),
            max_concurrent: self.config.max_concurrent,
            queue_bound: self.config.queue_bound,
            completed: self.completed.load(Ordering::Relaxed),
            rejected_overload: self.rejected_overload.load(Ordering::Relaxed),
        }
    }

    pub fn model_available(&self) -> &Arc<dyn LlmBackend> {
        &self.backend
    }

    /// Run one request through the pipeline. The response is returned only
    /// after validation is complete.
    pub async fn execute(
        &self,
        request: PipelineRequest,
        cancel: CancellationToken,
    ) -> Result<PipelineResult> {
        // Backpressure first: no side effects before a slot is held.
        let _permit = match self.slots.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                let waiting = self.waiting.fetch_add(1, Ordering::SeqCst);
                if waiting >= self.config.queue_bound {
                    self.waiting.fetch_sub(1, Ordering::SeqCst);
                    self.rejected_overload.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!("finsight_requests_overloaded").increment(1);
                    return Err(Error::Overloaded);
                }
                let acquired = tokio::select! {
                    permit = self.slots.clone().acquire_owned() => permit,
                    _ = cancel.cancelled() => {
                        self.waiting.fetch_sub(1, Ordering::SeqCst);
                        return Err(Error::timeout("queued (cancelled)"));
                    },
                };
                self.waiting.fetch_sub(1, Ordering::SeqCst);
                acquired.map_err(|_| Error::Overloaded)?
            },
        };

        self.running.fetch_add(1, Ordering::SeqCst);
        let outcome = self.run_pipeline(request, cancel).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::Relaxed);
        outcome
    }

    async fn run_pipeline(
        &self,
        request: PipelineRequest,
        cancel: CancellationToken,
    ) -> Result<PipelineResult> {
        let started = Instant::now();
        let deadline = started + request.config.timeout();
        let mut timings = Timings::default();
        let mut provenance = Provenance::default();
        provenance.embedder_fallback = self.substrate.embedder_is_fallback();

        tracing::info!(request_id = %request.id, "Pipeline started");

        // Phase 1: pseudonymize. Nothing leaves the process before this.
        let phase = Instant::now();
        let redaction = cancellable(&cancel, "pseudonymize", async {
            self.pseudonymizer
                .pseudonymize(&request.record)
                .await
                .map_err(Error::from)
        })
        .await?;
        timings.pseudonymize_ms = phase.elapsed().as_millis() as u64;

        let PseudonymizeOutcome {
            redacted,
            pseudonym_id,
            summary,
        } = redaction;
        provenance.pseudonym_id = Some(pseudonym_id);
        provenance.pii = Some(summary);

        // Phase 2: prompt generation (cache consultation and enrichment
        // run concurrently inside the generator).
        let phase = Instant::now();
        let context = ContextTag::parse(request.config.context.as_deref().unwrap_or_default());
        let generated = cancellable(&cancel, "prompt_generation", async {
            self.generator
                .generate(&redacted, context, request.config.enable_enrichment)
                .await
                .map_err(|e| Error::dependency("prompt_generator", e.to_string()))
        })
        .await?;
        timings.prompt_ms = phase.elapsed().as_millis() as u64;

        let GeneratedPrompt {
            prompt,
            template,
            signature_vector,
            metadata,
        } = generated;
        provenance.prompt_source = metadata.source;
        provenance.pattern_id = metadata.pattern_id;
        provenance.similarity = metadata.similarity;
        provenance.cache_hit = metadata.source != PromptSource::Fresh;
        provenance.rag_hits = metadata.rag_hits;
        provenance.enrichment = metadata.enrichment;

        // Phases 3-4: generation and blocking validation, with retries.
        let (analysis_text, verdict) = self
            .generate_and_validate(
                &request,
                &redacted,
                prompt,
                deadline,
                &cancel,
                &mut timings,
            )
            .await?;

        // Phase 5: learning feedback, after validation, failures non-fatal.
        if request.config.enable_learning {
            if let Some(ref verdict) = verdict {
                let phase = Instant::now();
                self.emit_feedback(
                    &signature_vector,
                    &template,
                    &analysis_text,
                    verdict,
                    context,
                    &mut provenance,
                )
                .await;
                timings.feedback_ms = phase.elapsed().as_millis() as u64;
            }
        }

        // A rejected response never reaches the caller as analysis.
        if let Some(ref v) = verdict {
            if !v.approved {
                timings.total_ms = started.elapsed().as_millis() as u64;
                metrics::counter!("finsight_requests_rejected").increment(1);
                return Err(Error::ValidationRejected {
                    attempts: timings.attempts,
                    verdict: Box::new(v.clone()),
                });
            }
        }

        // Phase 6: optional repersonalization of the analysis text.
        let final_text = if request.config.repersonalize_on_exit {
            self.pseudonymizer
                .repersonalize_text(pseudonym_id, &analysis_text)
                .await
                .map_err(Error::from)?
        } else {
            analysis_text
        };

        let analysis = Analysis::parse(&final_text).unwrap_or(Analysis {
            insights: final_text.clone(),
            recommendations: String::new(),
            raw: final_text,
        });

        timings.total_ms = started.elapsed().as_millis() as u64;
        metrics::counter!("finsight_requests_completed").increment(1);
        metrics::histogram!("finsight_request_duration_ms").record(timings.total_ms as f64);

        tracing::info!(
            request_id = %request.id,
            total_ms = timings.total_ms,
            attempts = timings.attempts,
            "Pipeline complete"
        );

        Ok(PipelineResult {
            request_id: request.id,
            analysis: Some(analysis),
            validation: verdict,
            provenance,
            timings,
        })
    }

    /// Model invocation plus blocking validation, retrying with the
    /// weakest-criterion amendment while attempts and deadline remain.
    async fn generate_and_validate(
        &self,
        request: &PipelineRequest,
        redacted: &finsight_core::Record,
        base_prompt: String,
        deadline: Instant,
        cancel: &CancellationToken,
        timings: &mut Timings,
    ) -> Result<(String, Option<ValidationVerdict>)> {
        let mut prompt = base_prompt;
        let mut last: Option<(String, ValidationVerdict)> = None;

        for attempt in 1..=self.config.max_attempts {
            timings.attempts = attempt;

            // Reserve validation time out of what's left of the budget.
            let remaining = deadline.saturating_duration_since(Instant::now());
            let model_budget = remaining
                .checked_sub(self.config.validation_reserve)
                .unwrap_or(Duration::ZERO);
            if model_budget.is_zero() {
                return Err(Error::timeout("generation"));
            }

            let phase = Instant::now();
            let messages = [Message::user(prompt.clone())];
            let generation = cancellable(cancel, "generation", async {
                match tokio::time::timeout(model_budget, self.backend.generate(&messages)).await {
                    Ok(Ok(result)) => Ok(result),
                    Ok(Err(e)) => Err(Error::dependency("model", e.to_string())),
                    Err(_) => Err(Error::timeout("generation")),
                }
            })
            .await?;
            timings.generation_ms += phase.elapsed().as_millis() as u64;

            let text = generation.text.trim().to_string();
            if text.is_empty() {
                return Err(Error::dependency("model", "empty response"));
            }

            if !request.config.enable_blocking_validation {
                return Ok((text, None));
            }

            let phase = Instant::now();
            let verdict = cancellable(cancel, "validation", async {
                match self.gate.validate(&prompt, redacted, &text).await {
                    Ok(verdict) => Ok(verdict),
                    Err(ValidatorError::Unavailable(reason)) => {
                        Err(Error::dependency("validator", reason))
                    },
                    Err(e) => Err(Error::dependency("validator", e.to_string())),
                }
            })
            .await?;
            timings.validation_ms += phase.elapsed().as_millis() as u64;

            if verdict.approved || attempt == self.config.max_attempts {
                return Ok((text, Some(verdict)));
            }

            // Rewrite the prompt with the verdict's weakest-criterion hint
            // and try again within the original deadline.
            if let Some(weakest) = verdict.weakest_criterion() {
                tracing::debug!(
                    request_id = %request.id,
                    attempt,
                    weakest = %weakest,
                    score = verdict.overall_score,
                    "Validation rejected, retrying with amendment"
                );
                prompt = apply_amendments(&prompt, &[weakest]);
            }
            last = Some((text, verdict));
        }

        // max_attempts >= 1 guarantees an attempt ran.
        let (text, verdict) = last.expect("at least one attempt");
        Ok((text, Some(verdict)))
    }

    /// Quality-engine observation and substrate appends, concurrently.
    /// Failures are attached to provenance, never surfaced.
    async fn emit_feedback(
        &self,
        signature_vector: &[f32],
        template: &str,
        analysis_text: &str,
        verdict: &ValidationVerdict,
        context: ContextTag,
        provenance: &mut Provenance,
    ) {
        self.substrate.adaptive().feed(FeedbackEvent::Interaction {
            overall_score: verdict.overall_score,
        });

        let observe = self.engine.observe(
            signature_vector,
            template,
            verdict,
            context.as_str(),
        );

        let analysis_record = async {
            // Only a base-prompt interaction appends a fresh prompt
            // pattern; the engine handles that side. Here the analysis
            // itself is recorded for later similarity analytics.
            self.substrate
                .record(
                    PatternKind::Analysis,
                    signature_vector.to_vec(),
                    analysis_text.to_string(),
                    PatternMetadata {
                        context: context.as_str().to_string(),
                        data_type: DATA_TYPE_ANALYSIS.to_string(),
                        domain: "financial_records".to_string(),
                    },
                    verdict.approved,
                    verdict.overall_score,
                )
                .await
        };

        let (observed, recorded) = tokio::join!(observe, analysis_record);

        // The engine may have already folded this interaction into the
        // reused pattern's stats; don't count it twice.
        let mut engine_touched = None;
        match observed {
            Ok(finsight_quality::ObserveOutcome::SuccessRecorded { pattern_id }) => {
                engine_touched = Some(pattern_id);
            },
            Ok(_) => {},
            Err(e) => {
                tracing::warn!(error = %e, "Quality engine feedback failed");
                provenance
                    .feedback_errors
                    .push(format!("quality_engine: {}", e));
            },
        }
        if let Err(e) = recorded {
            tracing::warn!(error = %e, "Analysis pattern append failed");
            provenance
                .feedback_errors
                .push(format!("analysis_append: {}", e));
        }

        // Reused templates fold this interaction into their stats.
        if let Some(pattern_id) = provenance.pattern_id {
            if engine_touched != Some(pattern_id) {
                if let Err(e) = self
                    .substrate
                    .reinforce(
                        PatternKind::Prompt,
                        pattern_id,
                        verdict.approved,
                        Some(verdict.overall_score),
                    )
                    .await
                {
                    tracing::warn!(error = %e, "Pattern reinforcement failed");
                    provenance
                        .feedback_errors
                        .push(format!("reinforce: {}", e));
                }
            }
        }
    }
}

/// Run a phase under the request's cancellation token. Cancellation is
/// cooperative: each phase boundary observes it, well within the grace
/// window.
async fn cancellable<T>(
    cancel: &CancellationToken,
    phase: &str,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        result = fut => result,
        _ = cancel.cancelled() => {
            tracing::debug!(phase, "Request cancelled");
            Err(Error::timeout(format!("{} (cancelled)", phase)))
        },
    }
}
