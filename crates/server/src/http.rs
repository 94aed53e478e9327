//! HTTP endpoints
//!
//! REST API for the analysis pipeline. /analyze responds only after
//! blocking validation has completed.

use axum::{
    extract::{Json, State},
    http::{HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use finsight_core::{
    Analysis, Error, ErrorKind, PipelineRequest, PseudonymId, Record, RequestConfig,
    ValidationVerdict,
};
use finsight_privacy::PrivacyError;

use crate::metrics::{record_request, record_validation_score};
use crate::state::AppState;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let config = state.config.read();
    let cors_layer = build_cors_layer(&config.server.cors_origins, config.server.cors_enabled);
    drop(config);

    Router::new()
        // Pipeline
        .route("/analyze", post(analyze))
        // Pseudonymization service
        .route("/pseudonymize", post(pseudonymize))
        .route("/repersonalize", post(repersonalize))
        // Prompt generator
        .route("/generate", post(generate))
        .route("/learn", post(learn))
        // Validator gate
        .route("/validate/response", post(validate_response))
        // Introspection
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/stats", get(stats))
        .route("/metrics", get(metrics_endpoint))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer)
        .with_state(state)
}

/// Build CORS layer from configured origins
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins (NOT FOR PRODUCTION)");
        return CorsLayer::permissive();
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    if parsed.is_empty() {
        return CorsLayer::new()
            .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any);
    }

    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Map a pipeline error onto a wire response. Every surfaced error carries
/// a machine-readable kind and a human-readable reason.
fn error_response(err: Error) -> (StatusCode, Json<Value>) {
    let status = match err.kind() {
        ErrorKind::InputError => StatusCode::BAD_REQUEST,
        ErrorKind::PiiFailure => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::DependencyUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::ValidationRejected => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Overloaded => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::IntegrityError => StatusCode::CONFLICT,
    };

    let mut body = json!({
        "error_kind": err.kind().as_str(),
        "reason": err.to_string(),
    });

    // A rejected validation still carries its verdict; the analysis field
    // stays absent so callers can tell rejection from generation failures.
    if let Error::ValidationRejected { ref verdict, .. } = err {
        body["validation"] = serde_json::to_value(verdict).unwrap_or(Value::Null);
    }

    (status, Json(body))
}

// ---------------------------------------------------------------------------
// /analyze

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    input_data: Value,
    #[serde(default)]
    request_config: Option<RequestConfig>,
}

#[derive(Debug, Serialize)]
struct AnalyzeResponse {
    analysis: Option<Analysis>,
    validation: Option<ValidationVerdict>,
    metadata: Value,
}

async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> impl IntoResponse {
    if !request.input_data.is_object() && !request.input_data.is_array() {
        record_request("input_error");
        return error_response(Error::Input(
            "input_data must be a JSON object or array".to_string(),
        ))
        .into_response();
    }

    let config = request.request_config.unwrap_or_default();
    let pipeline_request = PipelineRequest::new(Record::new(request.input_data), config);
    let cancel = CancellationToken::new();

    match state.orchestrator.execute(pipeline_request, cancel).await {
        Ok(result) => {
            record_request("ok");
            if let Some(ref verdict) = result.validation {
                record_validation_score(verdict.overall_score);
            }
            let metadata = json!({
                "request_id": result.request_id,
                "rag_hits": result.provenance.rag_hits,
                "prompt_source": result.provenance.prompt_source,
                "pattern_id": result.provenance.pattern_id,
                "similarity": result.provenance.similarity,
                "cache_hit": result.provenance.cache_hit,
                "enrichment": result.provenance.enrichment,
                "embedder_fallback": result.provenance.embedder_fallback,
                "pseudonym_id": result.provenance.pseudonym_id,
                "pii_summary": result.provenance.pii,
                "feedback_errors": result.provenance.feedback_errors,
                "timings": result.timings,
            });
            (
                StatusCode::OK,
                Json(
                    serde_json::to_value(AnalyzeResponse {
                        analysis: result.analysis,
                        validation: result.validation,
                        metadata,
                    })
                    .unwrap_or(Value::Null),
                ),
            )
                .into_response()
        },
        Err(err) => {
            record_request(err.kind().as_str());
            error_response(err).into_response()
        },
    }
}

// ---------------------------------------------------------------------------
// Pseudonymization service

#[derive(Debug, Deserialize)]
struct PseudonymizeRequest {
    data: Value,
}

async fn pseudonymize(
    State(state): State<AppState>,
    Json(request): Json<PseudonymizeRequest>,
) -> impl IntoResponse {
    let record = Record::new(request.data);
    match state.pseudonymizer.pseudonymize(&record).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({
                "pseudonym_id": outcome.pseudonym_id,
                "redacted_data": outcome.redacted.as_value(),
                "pii_summary": outcome.summary,
            })),
        )
            .into_response(),
        Err(e) => error_response(e.into()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct RepersonalizeRequest {
    pseudonym_id: String,
}

async fn repersonalize(
    State(state): State<AppState>,
    Json(request): Json<RepersonalizeRequest>,
) -> impl IntoResponse {
    let Ok(id) = request.pseudonym_id.parse::<PseudonymId>() else {
        return error_response(Error::Input("malformed pseudonym_id".to_string()))
            .into_response();
    };

    match state.pseudonymizer.repersonalize(id).await {
        Ok(record) => (
            StatusCode::OK,
            Json(json!({
                "original_data": record.into_value(),
                "verified": true,
            })),
        )
            .into_response(),
        Err(PrivacyError::UnknownPseudonymId) | Err(PrivacyError::ExpiredPseudonymId) => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error_kind": "pii_failure",
                "reason": "unknown or expired pseudonym id",
            })),
        )
            .into_response(),
        Err(e @ PrivacyError::Integrity(_)) => (
            StatusCode::CONFLICT,
            Json(json!({
                "error_kind": "integrity_error",
                "reason": e.to_string(),
            })),
        )
            .into_response(),
        Err(e) => error_response(e.into()).into_response(),
    }
}

// ---------------------------------------------------------------------------
// Prompt generator

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    record: Value,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    generation_type: Option<String>,
}

async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> impl IntoResponse {
    let record = Record::new(request.record);
    let context =
        finsight_prompt::ContextTag::parse(request.context.as_deref().unwrap_or_default());
    let generation_type = request.generation_type.unwrap_or_else(|| "standard".to_string());

    match state.generator.generate(&record, context, true).await {
        Ok(generated) => (
            StatusCode::OK,
            Json(json!({
                "prompt": generated.prompt,
                "metadata": {
                    "source": generated.metadata.source,
                    "similarity": generated.metadata.similarity,
                    "pattern_id": generated.metadata.pattern_id,
                    "enrichment_status": generated.metadata.enrichment,
                    "generation_time": generated.metadata.generation_time_ms,
                    "generation_type": generation_type,
                    "context": context.as_str(),
                },
            })),
        )
            .into_response(),
        Err(e) => error_response(Error::dependency("prompt_generator", e.to_string()))
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct LearnRequest {
    record: Value,
    prompt: String,
    #[serde(default)]
    analysis: Option<String>,
    validation_result: ValidationVerdict,
}

async fn learn(
    State(state): State<AppState>,
    Json(request): Json<LearnRequest>,
) -> impl IntoResponse {
    let record = Record::new(request.record);
    let signature_vector = match state.substrate.signature_vector(&record).await {
        Ok(v) => v,
        Err(e) => {
            return error_response(Error::dependency("vector_index", e.to_string()))
                .into_response()
        },
    };

    if let Err(e) = state
        .engine
        .observe(
            &signature_vector,
            &request.prompt,
            &request.validation_result,
            "generic",
        )
        .await
    {
        return error_response(Error::dependency("learning_substrate", e.to_string()))
            .into_response();
    }

    if let Some(analysis) = request.analysis {
        if let Err(e) = state
            .substrate
            .record(
                finsight_core::PatternKind::Analysis,
                signature_vector,
                analysis,
                finsight_core::PatternMetadata {
                    context: "generic".to_string(),
                    data_type: finsight_core::pattern::DATA_TYPE_ANALYSIS.to_string(),
                    domain: "financial_records".to_string(),
                },
                request.validation_result.approved,
                request.validation_result.overall_score,
            )
            .await
        {
            tracing::warn!(error = %e, "Analysis pattern append failed in /learn");
        }
    }

    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "quality_improvement_active": true,
        })),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Validator gate

#[derive(Debug, Deserialize)]
struct ValidateRequest {
    prompt: String,
    record: Value,
    response_data: String,
    /// Per-call aggregation weight overrides, keyed by criterion name.
    /// Never persisted.
    #[serde(default)]
    criteria_weights: Option<std::collections::BTreeMap<String, f64>>,
}

async fn validate_response(
    State(state): State<AppState>,
    Json(request): Json<ValidateRequest>,
) -> impl IntoResponse {
    let weights = match request.criteria_weights {
        Some(raw) => {
            let mut parsed = std::collections::BTreeMap::new();
            for (name, weight) in raw {
                let Some(criterion) = finsight_core::CriterionName::parse(&name) else {
                    return error_response(Error::Input(format!(
                        "unknown criterion: {}",
                        name
                    )))
                    .into_response();
                };
                parsed.insert(criterion, weight);
            }
            Some(parsed)
        },
        None => None,
    };

    let record = Record::new(request.record);
    match state
        .gate
        .validate_weighted(
            &request.prompt,
            &record,
            &request.response_data,
            weights.as_ref(),
        )
        .await
    {
        Ok(verdict) => {
            record_validation_score(verdict.overall_score);
            (StatusCode::OK, Json(serde_json::to_value(verdict).unwrap_or(Value::Null)))
                .into_response()
        },
        Err(e) => error_response(e.into()).into_response(),
    }
}

// ---------------------------------------------------------------------------
// Introspection

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let probe = std::time::Duration::from_secs(
        finsight_config::constants::deadlines::HEALTH_PROBE_SECS,
    );

    let (model_up, validator_up, vector_up, tokens_up, enrichment_up) = tokio::join!(
        tokio::time::timeout(probe, state.model.is_available()),
        tokio::time::timeout(probe, state.gate.ping()),
        tokio::time::timeout(probe, state.substrate.index().ping()),
        tokio::time::timeout(probe, state.token_store.ping()),
        async {
            match &state.enrichment {
                Some(client) => tokio::time::timeout(probe, client.ping()).await,
                None => Ok(false),
            }
        },
    );

    let model_up = model_up.unwrap_or(false);
    let validator_up = validator_up.unwrap_or(false);
    let vector_up = vector_up.unwrap_or(false);
    let tokens_up = tokens_up.unwrap_or(false);
    let enrichment_up = enrichment_up.unwrap_or(false);

    let mut degraded = Vec::new();
    if !model_up {
        degraded.push("model");
    }
    if !validator_up {
        degraded.push("validator");
    }
    if !vector_up {
        degraded.push("vector_index");
    }
    if !tokens_up {
        degraded.push("token_store");
    }
    if !enrichment_up {
        degraded.push("enrichment");
    }
    if state.substrate.embedder_is_fallback() {
        degraded.push("embedder");
    }

    // Degraded modes still answer 200 with the degraded subsystems listed.
    (
        StatusCode::OK,
        Json(json!({
            "status": if degraded.is_empty() { "healthy" } else { "degraded" },
            "degraded": degraded,
            "subsystems": {
                "model": model_up,
                "validator": validator_up,
                "vector_index": vector_up,
                "token_store": tokens_up,
                "enrichment": enrichment_up,
            },
            "adapters": {
                "vector_backend": state.substrate.index().backend(),
                "token_store_durable": state.token_store.is_durable(),
                "embedder": if state.substrate.embedder_is_fallback() { "fallback" } else { "onnx" },
            },
            "uptime_secs": (chrono::Utc::now() - state.started_at).num_seconds(),
        })),
    )
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "pipeline": state.orchestrator.status(),
        "adaptive": state.substrate.adaptive().snapshot(),
        "model": state.model.model_name(),
    }))
}

async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    let token_stats = state.token_store.stats().await.ok();

    let mut collections = serde_json::Map::new();
    for kind in finsight_core::PatternKind::all() {
        let count = state
            .substrate
            .index()
            .list(kind.collection_name(), 1024)
            .await
            .map(|hits| hits.len())
            .unwrap_or(0);
        collections.insert(kind.collection_name().to_string(), json!(count));
    }

    Json(json!({
        "token_store": token_stats.map(|s| json!({
            "backend": s.backend,
            "total_mappings": s.total_mappings,
            "quarantined": s.quarantined,
        })),
        "pattern_collections": collections,
    }))
}

async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics_handle {
        Some(handle) => (StatusCode::OK, handle.render()).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics not enabled").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (Error::Input("bad".into()), StatusCode::BAD_REQUEST),
            (Error::Overloaded, StatusCode::TOO_MANY_REQUESTS),
            (Error::timeout("generation"), StatusCode::GATEWAY_TIMEOUT),
            (
                Error::dependency("model", "down"),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                Error::Integrity("mismatch".into()),
                StatusCode::CONFLICT,
            ),
        ];
        for (err, expected) in cases {
            let (status, body) = error_response(err);
            assert_eq!(status, expected);
            assert!(body.0.get("error_kind").is_some());
            assert!(body.0.get("reason").is_some());
        }
    }

    #[test]
    fn test_rejected_error_carries_verdict() {
        let verdict = ValidationVerdict::from_scores(
            Default::default(),
            &ValidationVerdict::default_weights(),
            0.65,
            "weak",
        );
        let err = Error::ValidationRejected {
            attempts: 2,
            verdict: Box::new(verdict),
        };
        let (status, body) = error_response(err);
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        // Verdict present, analysis absent: callers can tell rejection
        // from generation failures.
        assert!(body.0.get("validation").is_some());
        assert!(body.0.get("analysis").is_none());
    }

    #[test]
    fn test_analyze_request_wire_shape() {
        let request: AnalyzeRequest = serde_json::from_value(json!({
            "input_data": {"customer_id": "C001"},
            "request_config": {"repersonalize_on_exit": true, "context": "banking"},
        }))
        .unwrap();
        let config = request.request_config.unwrap();
        assert!(config.repersonalize_on_exit);
        assert_eq!(config.context.as_deref(), Some("banking"));
        // Unspecified toggles default on
        assert!(config.enable_blocking_validation);
    }

    #[test]
    fn test_validate_request_accepts_weight_overrides() {
        let request: ValidateRequest = serde_json::from_value(json!({
            "prompt": "p",
            "record": {"a": 1},
            "response_data": "r",
            "criteria_weights": {"structural": 1.0},
        }))
        .unwrap();
        let weights = request.criteria_weights.unwrap();
        assert_eq!(weights.get("structural"), Some(&1.0));
    }
}
