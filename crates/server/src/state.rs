//! Application state
//!
//! The explicit application context threaded through every handler.
//! Adapters (token store, vector index, embedder) are selected once at
//! startup from dependency health checks; the selection is surfaced in
//! /health.

use std::sync::Arc;

use parking_lot::RwLock;

use finsight_config::Settings;
use finsight_learning::{
    spawn_decay_task, AdaptiveHandle, Embedder, LearningSubstrate, MemoryIndex, QdrantIndex,
    SubstrateConfig, VectorIndex,
};
use finsight_llm::{create_backend, LlmBackend, LlmClientConfig};
use finsight_persistence::{
    init_token_store, InMemoryTokenStore, ScyllaConfig, TokenStore,
};
use finsight_pipeline::{Orchestrator, OrchestratorConfig};
use finsight_privacy::{Pseudonymizer, PseudonymizerConfig};
use finsight_prompt::{EnrichmentClient, EnrichmentClientConfig, PromptGenerator};
use finsight_quality::{QualityEngine, QualityEngineConfig};
use finsight_validator::{GateConfig, ValidatorGate};
use metrics_exporter_prometheus::PrometheusHandle;

use crate::ServerError;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<Settings>>,
    pub orchestrator: Arc<Orchestrator>,
    pub pseudonymizer: Arc<Pseudonymizer>,
    pub generator: Arc<PromptGenerator>,
    pub gate: Arc<ValidatorGate>,
    pub substrate: Arc<LearningSubstrate>,
    pub engine: Arc<QualityEngine>,
    pub token_store: Arc<dyn TokenStore>,
    pub model: Arc<dyn LlmBackend>,
    pub enrichment: Option<Arc<EnrichmentClient>>,
    pub metrics_handle: Option<Arc<PrometheusHandle>>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    /// Wire the full component graph from settings, selecting concrete
    /// adapters based on dependency health.
    pub async fn init(settings: Settings) -> Result<Self, ServerError> {
        // Token store: ScyllaDB when enabled and reachable, else in-memory.
        let token_store: Arc<dyn TokenStore> = if settings.privacy.durable_store {
            init_token_store(ScyllaConfig {
                hosts: settings.privacy.scylla_hosts.clone(),
                keyspace: settings.privacy.keyspace.clone(),
                replication_factor: settings.privacy.replication_factor,
            })
            .await
        } else {
            tracing::info!("Durable token store disabled, using in-memory store");
            Arc::new(InMemoryTokenStore::new())
        };

        let pseudonymizer = Arc::new(Pseudonymizer::new(
            PseudonymizerConfig {
                secret: settings.privacy.secret.clone(),
                ttl_seconds: settings.privacy.ttl_seconds,
                detection_confidence: settings.privacy.detection_confidence,
            },
            token_store.clone(),
        ));

        // Vector index: Qdrant when reachable, else in-memory linear scan
        // for the current process lifetime.
        let index: Arc<dyn VectorIndex> = match QdrantIndex::connect(
            &settings.learning.qdrant_endpoint,
            settings.learning.qdrant_api_key.as_deref(),
        ) {
            Ok(qdrant) if qdrant.ping().await => {
                tracing::info!(endpoint = %settings.learning.qdrant_endpoint, "Vector index backed by Qdrant");
                Arc::new(qdrant)
            },
            Ok(_) => {
                tracing::warn!("Qdrant unreachable, using in-memory vector index");
                Arc::new(MemoryIndex::new())
            },
            Err(e) => {
                tracing::warn!(error = %e, "Qdrant connection failed, using in-memory vector index");
                Arc::new(MemoryIndex::new())
            },
        };

        let embedder = Arc::new(build_embedder(&settings.learning));
        if embedder.is_fallback() {
            tracing::info!(dim = settings.learning.vector_dim, "Using keyed-hash fallback embedder");
        }

        let adaptive = AdaptiveHandle::spawn(settings.learning.adaptive.clone());
        let substrate = Arc::new(
            LearningSubstrate::init(
                index,
                embedder,
                adaptive,
                SubstrateConfig {
                    vector_dim: settings.learning.vector_dim,
                    query_top_k: 16,
                },
            )
            .await
            .map_err(|e| ServerError::Startup(e.to_string()))?,
        );

        spawn_decay_task(substrate.clone(), settings.learning.clone());

        let engine = Arc::new(QualityEngine::new(
            substrate.clone(),
            substrate.clone(),
            substrate.adaptive().clone(),
            QualityEngineConfig {
                criterion_threshold: settings.validator.criterion_threshold,
            },
        ));

        let enrichment = EnrichmentClient::new(EnrichmentClientConfig {
            endpoint: settings.enrichment.endpoint.clone(),
            timeout: std::time::Duration::from_secs(settings.enrichment.timeout_secs),
        })
        .map(Arc::new)
        .ok();

        let generator = Arc::new(PromptGenerator::new(
            substrate.clone(),
            engine.clone(),
            enrichment.clone(),
        ));

        let model = create_backend(LlmClientConfig::from_settings(&settings.model))
            .map_err(|e| ServerError::Startup(e.to_string()))?;

        let validator_backend = create_backend(LlmClientConfig {
            model: settings.validator.model.clone(),
            endpoint: settings.validator.endpoint.clone(),
            api_key: settings.validator.api_key.clone(),
            ..Default::default()
        })
        .map_err(|e| ServerError::Startup(e.to_string()))?;

        let gate = Arc::new(ValidatorGate::new(
            validator_backend,
            GateConfig::from_settings(&settings.validator),
        ));

        let orchestrator = Arc::new(Orchestrator::new(
            pseudonymizer.clone(),
            generator.clone(),
            model.clone(),
            gate.clone(),
            substrate.clone(),
            engine.clone(),
            OrchestratorConfig::from_settings(&settings.pipeline),
        ));

        Ok(Self {
            config: Arc::new(RwLock::new(settings)),
            orchestrator,
            pseudonymizer,
            generator,
            gate,
            substrate,
            engine,
            token_store,
            model,
            enrichment,
            metrics_handle: None,
            started_at: chrono::Utc::now(),
        })
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(Arc::new(handle));
        self
    }
}

/// Embedder selection: the ONNX model when the build and configuration
/// provide one, the deterministic keyed-hash embedder otherwise. Load
/// failure degrades to the fallback, like the other adapters.
#[cfg(feature = "onnx")]
fn build_embedder(config: &finsight_config::LearningConfig) -> Embedder {
    match (&config.model_path, &config.tokenizer_path) {
        (Some(model_path), Some(tokenizer_path)) => {
            match Embedder::onnx(model_path, tokenizer_path, config.vector_dim) {
                Ok(embedder) => {
                    tracing::info!(model = %model_path, "Embedder backed by ONNX model");
                    embedder
                },
                Err(e) => {
                    tracing::warn!(error = %e, "ONNX embedder failed to load, using keyed-hash fallback");
                    Embedder::hash(config.vector_dim)
                },
            }
        },
        _ => {
            tracing::info!("No embedder model configured, using keyed-hash fallback");
            Embedder::hash(config.vector_dim)
        },
    }
}

#[cfg(not(feature = "onnx"))]
fn build_embedder(config: &finsight_config::LearningConfig) -> Embedder {
    Embedder::hash(config.vector_dim)
}
