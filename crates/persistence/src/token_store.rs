//! Token store implementations
//!
//! The mapping written here is the sole reversal source for a
//! pseudonymized request; losing it renders the request irreversible.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use finsight_core::{FieldTransform, PseudonymId, PseudonymMapping};

use crate::client::ScyllaClient;
use crate::error::PersistenceError;

/// Store totals for /stats.
#[derive(Debug, Clone)]
pub struct TokenStoreStats {
    pub backend: &'static str,
    pub total_mappings: u64,
    pub quarantined: u64,
}

/// Persistent key/value with TTL keyed by pseudonym id.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Write a mapping with its TTL. Overwrites an existing row for the
    /// same id.
    async fn put(&self, mapping: &PseudonymMapping) -> Result<(), PersistenceError>;

    /// Fetch a live mapping. Expired and quarantined mappings are not
    /// returned.
    async fn get(&self, id: PseudonymId) -> Result<Option<PseudonymMapping>, PersistenceError>;

    async fn delete(&self, id: PseudonymId) -> Result<(), PersistenceError>;

    /// Take a mapping out of circulation after an integrity failure.
    async fn quarantine(&self, id: PseudonymId) -> Result<(), PersistenceError>;

    /// True when mappings survive a process restart.
    fn is_durable(&self) -> bool;

    async fn stats(&self) -> Result<TokenStoreStats, PersistenceError>;

    /// Cheap liveness probe for /health.
    async fn ping(&self) -> bool;
}

/// ScyllaDB-backed store. Rows expire server-side via `USING TTL`.
pub struct ScyllaTokenStore {
    client: ScyllaClient,
}

impl ScyllaTokenStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TokenStore for ScyllaTokenStore {
    async fn put(&self, mapping: &PseudonymMapping) -> Result<(), PersistenceError> {
        let transforms_json = serde_json::to_string(&mapping.field_transforms)
            .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
        let redacted_json = serde_json::to_string(&mapping.redacted_record)
            .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

        let query = format!(
            "INSERT INTO {}.pseudonym_mappings
                (pseudonym_id, created_at, ttl_seconds, transforms_json, redacted_json, quarantined)
             VALUES (?, ?, ?, ?, ?, false) USING TTL ?",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    mapping.pseudonym_id.0,
                    mapping.created_at.timestamp_millis(),
                    mapping.ttl_seconds,
                    transforms_json,
                    redacted_json,
                    mapping.ttl_seconds as i32,
                ),
            )
            .await?;

        tracing::debug!(
            pseudonym_id = %mapping.pseudonym_id,
            fields = mapping.field_transforms.len(),
            "Pseudonym mapping persisted"
        );
        Ok(())
    }

    async fn get(&self, id: PseudonymId) -> Result<Option<PseudonymMapping>, PersistenceError> {
        let query = format!(
            "SELECT pseudonym_id, created_at, ttl_seconds, transforms_json, redacted_json, quarantined
             FROM {}.pseudonym_mappings WHERE pseudonym_id = ?",
            self.client.keyspace()
        );

        let result = self.client.session().query_unpaged(query, (id.0,)).await?;

        let Some(rows) = result.rows else {
            return Ok(None);
        };

        for row in rows {
            let (pseudonym_id, created_at, ttl_seconds, transforms_json, redacted_json, quarantined): (
                Uuid,
                i64,
                i64,
                String,
                String,
                bool,
            ) = row
                .into_typed()
                .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

            if quarantined {
                return Ok(None);
            }

            let field_transforms: Vec<FieldTransform> = serde_json::from_str(&transforms_json)
                .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
            let redacted_record = serde_json::from_str(&redacted_json)
                .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

            return Ok(Some(PseudonymMapping {
                pseudonym_id: PseudonymId(pseudonym_id),
                field_transforms,
                redacted_record,
                created_at: DateTime::from_timestamp_millis(created_at).unwrap_or_else(Utc::now),
                ttl_seconds,
                durable: true,
            }));
        }

        Ok(None)
    }

    async fn delete(&self, id: PseudonymId) -> Result<(), PersistenceError> {
        let query = format!(
            "DELETE FROM {}.pseudonym_mappings WHERE pseudonym_id = ?",
            self.client.keyspace()
        );
        self.client.session().query_unpaged(query, (id.0,)).await?;
        Ok(())
    }

    async fn quarantine(&self, id: PseudonymId) -> Result<(), PersistenceError> {
        let query = format!(
            "UPDATE {}.pseudonym_mappings SET quarantined = true WHERE pseudonym_id = ?",
            self.client.keyspace()
        );
        self.client.session().query_unpaged(query, (id.0,)).await?;
        tracing::warn!(pseudonym_id = %id, "Pseudonym mapping quarantined");
        Ok(())
    }

    fn is_durable(&self) -> bool {
        true
    }

    async fn stats(&self) -> Result<TokenStoreStats, PersistenceError> {
        let count_query = |filter: &str| {
            format!(
                "SELECT COUNT(*) FROM {}.pseudonym_mappings{}",
                self.client.keyspace(),
                filter
            )
        };
        let read_count = |result: scylla::QueryResult| {
            result
                .rows
                .and_then(|rows| rows.into_iter().next())
                .and_then(|row| row.into_typed::<(i64,)>().ok())
                .map(|(count,)| count.max(0) as u64)
                .unwrap_or(0)
        };

        let total = read_count(
            self.client
                .session()
                .query_unpaged(count_query(""), &[])
                .await?,
        );
        // Quarantined rows stay in the table until their TTL lapses; the
        // flag is not indexed, so this scan needs ALLOW FILTERING.
        let quarantined = read_count(
            self.client
                .session()
                .query_unpaged(
                    count_query(" WHERE quarantined = true ALLOW FILTERING"),
                    &[],
                )
                .await?,
        );

        Ok(TokenStoreStats {
            backend: "scylla",
            total_mappings: total,
            quarantined,
        })
    }

    async fn ping(&self) -> bool {
        self.client
            .session()
            .query_unpaged("SELECT now() FROM system.local", &[])
            .await
            .is_ok()
    }
}

/// In-process fallback. Mappings marked non-durable; expiry checked lazily
/// on read.
#[derive(Default)]
pub struct InMemoryTokenStore {
    mappings: DashMap<Uuid, PseudonymMapping>,
    quarantined: DashMap<Uuid, ()>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired mappings. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.mappings.len();
        self.mappings.retain(|_, m| !m.is_expired(now));
        before - self.mappings.len()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn put(&self, mapping: &PseudonymMapping) -> Result<(), PersistenceError> {
        let mut stored = mapping.clone();
        stored.durable = false;
        self.mappings.insert(mapping.pseudonym_id.0, stored);
        Ok(())
    }

    async fn get(&self, id: PseudonymId) -> Result<Option<PseudonymMapping>, PersistenceError> {
        if self.quarantined.contains_key(&id.0) {
            return Ok(None);
        }
        // The read guard must drop before any removal on the same shard.
        let expired = {
            match self.mappings.get(&id.0) {
                Some(entry) if !entry.is_expired(Utc::now()) => return Ok(Some(entry.clone())),
                Some(_) => true,
                None => false,
            }
        };
        if expired {
            // Lazy expiry
            self.mappings.remove(&id.0);
        }
        Ok(None)
    }

    async fn delete(&self, id: PseudonymId) -> Result<(), PersistenceError> {
        self.mappings.remove(&id.0);
        Ok(())
    }

    async fn quarantine(&self, id: PseudonymId) -> Result<(), PersistenceError> {
        self.quarantined.insert(id.0, ());
        tracing::warn!(pseudonym_id = %id, "Pseudonym mapping quarantined (in-memory)");
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }

    async fn stats(&self) -> Result<TokenStoreStats, PersistenceError> {
        Ok(TokenStoreStats {
            backend: "memory",
            total_mappings: self.mappings.len() as u64,
            quarantined: self.quarantined.len() as u64,
        })
    }

    async fn ping(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finsight_core::PiiKind;

    fn mapping(ttl_seconds: i64) -> PseudonymMapping {
        PseudonymMapping::new(
            vec![FieldTransform {
                path: "name".to_string(),
                kind: PiiKind::Name,
                original: "Jane Doe".to_string(),
                token: "USER_deadbeef".to_string(),
                numeric: false,
            }],
            finsight_core::Record::new(serde_json::json!({"name": "USER_deadbeef"})),
            ttl_seconds,
        )
    }

    #[tokio::test]
    async fn test_memory_round_trip() {
        let store = InMemoryTokenStore::new();
        let m = mapping(3600);
        store.put(&m).await.unwrap();

        let fetched = store.get(m.pseudonym_id).await.unwrap().unwrap();
        assert_eq!(fetched.field_transforms, m.field_transforms);
        // In-memory storage is flagged non-durable
        assert!(!fetched.durable);
        assert!(!store.is_durable());
    }

    #[tokio::test]
    async fn test_memory_expiry() {
        let store = InMemoryTokenStore::new();
        let mut m = mapping(60);
        m.created_at = Utc::now() - chrono::Duration::seconds(120);
        store.put(&m).await.unwrap();

        assert!(store.get(m.pseudonym_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_quarantine_hides_mapping() {
        let store = InMemoryTokenStore::new();
        let m = mapping(3600);
        store.put(&m).await.unwrap();

        store.quarantine(m.pseudonym_id).await.unwrap();
        assert!(store.get(m.pseudonym_id).await.unwrap().is_none());

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.quarantined, 1);
    }

    #[tokio::test]
    async fn test_memory_unknown_id() {
        let store = InMemoryTokenStore::new();
        assert!(store
            .get(PseudonymId::generate())
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_purge_expired() {
        let store = InMemoryTokenStore::new();
        let mut old = mapping(60);
        old.created_at = Utc::now() - chrono::Duration::hours(1);
        let fresh = mapping(3600);

        store.mappings.insert(old.pseudonym_id.0, old);
        store.mappings.insert(fresh.pseudonym_id.0, fresh);

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.mappings.len(), 1);
    }
}
