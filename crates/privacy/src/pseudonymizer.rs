//! Pseudonymizer / Repersonalizer
//!
//! Pseudonymization happens before any outbound call that could leak PII;
//! the resulting mapping, stored with TTL, is the sole reversal source.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use finsight_core::record::parse_path;
use finsight_core::{
    FieldTransform, PiiSummary, PseudonymId, PseudonymMapping, Record,
};
use finsight_persistence::{InMemoryTokenStore, TokenStore};

use crate::detector::PiiDetector;
use crate::tokenizer::Tokenizer;
use crate::PrivacyError;

/// Pseudonymizer configuration
#[derive(Debug, Clone)]
pub struct PseudonymizerConfig {
    /// Per-deployment tokenization secret.
    pub secret: String,
    /// Mapping TTL in the token store (seconds).
    pub ttl_seconds: i64,
    /// Minimum detector confidence.
    pub detection_confidence: f64,
}

impl Default for PseudonymizerConfig {
    fn default() -> Self {
        Self {
            secret: "dev-only-secret".to_string(),
            ttl_seconds: 86_400,
            detection_confidence: 0.6,
        }
    }
}

/// What pseudonymization hands back to the orchestrator.
#[derive(Debug, Clone)]
pub struct PseudonymizeOutcome {
    pub redacted: Record,
    pub pseudonym_id: PseudonymId,
    pub summary: PiiSummary,
}

/// Deterministic, reversible de-identification of record fields.
pub struct Pseudonymizer {
    detector: PiiDetector,
    tokenizer: Tokenizer,
    store: Arc<dyn TokenStore>,
    /// In-process fallback used when the primary store rejects a write.
    fallback: InMemoryTokenStore,
    ttl_seconds: i64,
}

impl Pseudonymizer {
    pub fn new(config: PseudonymizerConfig, store: Arc<dyn TokenStore>) -> Self {
        Self {
            detector: PiiDetector::new(config.detection_confidence),
            tokenizer: Tokenizer::new(&config.secret),
            store,
            fallback: InMemoryTokenStore::new(),
            ttl_seconds: config.ttl_seconds,
        }
    }

    /// Replace every detected sensitive leaf with its token and persist the
    /// reversal mapping.
    ///
    /// Structure is preserved: only flagged leaves change. When the token
    /// store is unavailable the mapping degrades to in-process storage and
    /// the summary reports `durable = false`.
    pub async fn pseudonymize(
        &self,
        record: &Record,
    ) -> Result<PseudonymizeOutcome, PrivacyError> {
        let matches = self.detector.detect(record);

        let mut redacted = record.clone();
        let mut transforms = Vec::with_capacity(matches.len());

        for m in &matches {
            let token = self.tokenizer.tokenize(m.kind, &m.value);
            if !redacted.set_path(&m.path, Value::String(token.clone())) {
                return Err(PrivacyError::InvalidRecord(format!(
                    "path {} vanished during redaction",
                    m.path_string()
                )));
            }
            transforms.push(FieldTransform {
                path: m.path_string(),
                kind: m.kind,
                original: m.value.clone(),
                token,
                numeric: m.numeric,
            });
        }

        let mut mapping =
            PseudonymMapping::new(transforms, redacted.clone(), self.ttl_seconds);

        let durable = match self.store.put(&mapping).await {
            Ok(()) => self.store.is_durable(),
            Err(e) => {
                tracing::warn!(error = %e, "Token store write failed, degrading to in-process mapping");
                mapping.durable = false;
                self.fallback
                    .put(&mapping)
                    .await
                    .map_err(|e| PrivacyError::TokenStoreUnavailable(e.to_string()))?;
                false
            },
        };

        let summary = PiiSummary::from_transforms(&mapping.field_transforms, durable);

        tracing::debug!(
            pseudonym_id = %mapping.pseudonym_id,
            fields = summary.total(),
            durable,
            "Record pseudonymized"
        );

        Ok(PseudonymizeOutcome {
            redacted,
            pseudonym_id: mapping.pseudonym_id,
            summary,
        })
    }

    /// Restore the original record for a pseudonym id.
    ///
    /// Walks the recorded paths substituting tokens back to originals and
    /// verifies each token by recomputation; any mismatch quarantines the
    /// mapping and fails with an integrity error.
    pub async fn repersonalize(&self, id: PseudonymId) -> Result<Record, PrivacyError> {
        let mapping = self.lookup(id).await?;

        let mut restored = mapping.redacted_record.clone();

        for transform in &mapping.field_transforms {
            let segments = parse_path(&transform.path).ok_or_else(|| {
                PrivacyError::Integrity(format!("unparseable stored path {}", transform.path))
            })?;

            let current = restored
                .get_path(&segments)
                .and_then(Value::as_str)
                .map(str::to_owned);

            let matches_token = current.as_deref() == Some(transform.token.as_str())
                && self
                    .tokenizer
                    .verify(transform.kind, &transform.original, &transform.token);

            if !matches_token {
                self.quarantine(id).await;
                return Err(PrivacyError::Integrity(format!(
                    "token mismatch at {}",
                    transform.path
                )));
            }

            restored.set_path(&segments, restore_value(transform));
        }

        Ok(restored)
    }

    /// Substitute tokens appearing in free text back to their originals.
    /// Used when a caller asks for a repersonalized analysis.
    pub async fn repersonalize_text(
        &self,
        id: PseudonymId,
        text: &str,
    ) -> Result<String, PrivacyError> {
        let mapping = self.lookup(id).await?;

        let mut restored = text.to_string();
        for transform in &mapping.field_transforms {
            if restored.contains(&transform.token) {
                restored = restored.replace(&transform.token, &transform.original);
            }
        }
        Ok(restored)
    }

    async fn lookup(&self, id: PseudonymId) -> Result<PseudonymMapping, PrivacyError> {
        let primary = match self.store.get(id).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, "Token store read failed, consulting in-process fallback");
                None
            },
        };

        let mapping = match primary {
            Some(m) => Some(m),
            None => self
                .fallback
                .get(id)
                .await
                .map_err(|e| PrivacyError::TokenStoreUnavailable(e.to_string()))?,
        };

        let mapping = mapping.ok_or(PrivacyError::UnknownPseudonymId)?;
        if mapping.is_expired(Utc::now()) {
            return Err(PrivacyError::ExpiredPseudonymId);
        }
        Ok(mapping)
    }

    async fn quarantine(&self, id: PseudonymId) {
        if let Err(e) = self.store.quarantine(id).await {
            tracing::error!(error = %e, pseudonym_id = %id, "Failed to quarantine mapping");
        }
        let _ = self.fallback.quarantine(id).await;
    }
}

/// Rebuild the original leaf. Numeric leaves were stringified for
/// tokenization; restore the number form they arrived in.
fn restore_value(transform: &FieldTransform) -> Value {
    if transform.numeric {
        if let Ok(n) = transform.original.parse::<i64>() {
            return Value::from(n);
        }
        if let Ok(f) = transform.original.parse::<f64>() {
            if f.is_finite() {
                return Value::from(f);
            }
        }
    }
    Value::String(transform.original.clone())
}
