//! Enrichment client
//!
//! Queries the external intelligence service for context on entities named
//! in a record. Enrichment is always degradable: a timeout or failure
//! skips it and the pipeline moves on.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use finsight_core::Record;

use crate::PromptError;

/// Enrichment client configuration
#[derive(Debug, Clone)]
pub struct EnrichmentClientConfig {
    pub endpoint: String,
    /// Per-attempt deadline. The service contract caps a call at 30s; the
    /// pipeline default is 10s.
    pub timeout: Duration,
}

impl Default for EnrichmentClientConfig {
    fn default() -> Self {
        Self {
            endpoint: finsight_config::constants::endpoints::ENRICHMENT_DEFAULT.to_string(),
            timeout: Duration::from_secs(
                finsight_config::constants::deadlines::ENRICHMENT_SECS,
            ),
        }
    }
}

/// Successful augmentation.
#[derive(Debug, Clone, Deserialize)]
pub struct Augmentation {
    pub augmentation_text: String,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub cache_hit: bool,
    #[serde(default)]
    pub elapsed_ms: u64,
}

#[derive(Debug, Serialize)]
struct AugmentRequest<'a> {
    record: &'a Value,
    context: &'a str,
    optional_entities: Vec<String>,
}

/// Client for the external enrichment service.
pub struct EnrichmentClient {
    client: Client,
    config: EnrichmentClientConfig,
}

impl EnrichmentClient {
    pub fn new(config: EnrichmentClientConfig) -> Result<Self, PromptError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PromptError::Enrichment(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Request augmentation for a (redacted) record. The deadline is
    /// enforced both by the HTTP client and an outer timer, so a stalled
    /// connection cannot hold the prompt phase.
    pub async fn augment(
        &self,
        record: &Record,
        context: &str,
    ) -> Result<Augmentation, PromptError> {
        let request = AugmentRequest {
            record: record.as_value(),
            context,
            optional_entities: extract_entities(record),
        };

        let url = format!("{}/augment", self.config.endpoint.trim_end_matches('/'));
        let send = async {
            let response = self
                .client
                .post(&url)
                .json(&request)
                .send()
                .await
                .map_err(|e| PromptError::Enrichment(e.to_string()))?;

            if !response.status().is_success() {
                return Err(PromptError::Enrichment(format!(
                    "HTTP {}",
                    response.status()
                )));
            }

            response
                .json::<Augmentation>()
                .await
                .map_err(|e| PromptError::Enrichment(e.to_string()))
        };

        tokio::time::timeout(self.config.timeout, send)
            .await
            .map_err(|_| PromptError::EnrichmentTimeout)?
    }

    pub async fn ping(&self) -> bool {
        let url = format!("{}/health", self.config.endpoint.trim_end_matches('/'));
        self.client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

/// Entity-name candidates worth looking up externally: values of
/// entity-shaped fields plus pseudonymized organization/customer tokens.
pub fn extract_entities(record: &Record) -> Vec<String> {
    const ENTITY_FIELDS: &[&str] = &[
        "name",
        "company",
        "merchant",
        "counterparty",
        "vendor",
        "payee",
        "employer",
    ];

    let mut entities = Vec::new();
    record.walk_strings(&mut |path, value| {
        let field_hit = path.iter().rev().find_map(|seg| match seg {
            finsight_core::PathSegment::Key(k) => Some(k.to_lowercase()),
            _ => None,
        });
        let named_entity = field_hit
            .map(|k| ENTITY_FIELDS.iter().any(|f| k.contains(f)))
            .unwrap_or(false);
        let token_entity = value.starts_with("USER_") || value.starts_with("CUST_");

        if (named_entity || token_entity) && !entities.iter().any(|e| e == value) {
            entities.push(value.to_string());
        }
    });
    entities
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_entities_by_field_and_token() {
        let record = Record::new(json!({
            "name": "USER_abcd1234",
            "transactions": [
                {"merchant": "Northwind Traders", "amount": 120},
                {"merchant": "Northwind Traders", "amount": 80},
            ],
            "notes": "regular vendor",
        }));

        let entities = extract_entities(&record);
        assert!(entities.contains(&"USER_abcd1234".to_string()));
        assert!(entities.contains(&"Northwind Traders".to_string()));
        // Deduplicated
        assert_eq!(
            entities.iter().filter(|e| *e == "Northwind Traders").count(),
            1
        );
        // Free text is not an entity
        assert!(!entities.contains(&"regular vendor".to_string()));
    }

    #[tokio::test]
    async fn test_augment_times_out_against_dead_endpoint() {
        let client = EnrichmentClient::new(EnrichmentClientConfig {
            // Non-routable address, so the request cannot complete.
            endpoint: "http://10.255.255.1:9".to_string(),
            timeout: Duration::from_millis(100),
        })
        .unwrap();

        let record = Record::new(json!({"name": "x"}));
        let err = client.augment(&record, "banking").await.unwrap_err();
        assert!(matches!(
            err,
            PromptError::EnrichmentTimeout | PromptError::Enrichment(_)
        ));
    }
}
