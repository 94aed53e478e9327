//! ScyllaDB schema creation

use crate::error::PersistenceError;
use scylla::Session;

/// Create the keyspace if it doesn't exist
pub async fn create_keyspace(
    session: &Session,
    keyspace: &str,
    replication_factor: u8,
) -> Result<(), PersistenceError> {
    let query = format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
        keyspace, replication_factor
    );

    session
        .query_unpaged(query, &[])
        .await
        .map_err(|e| PersistenceError::Schema(format!("Failed to create keyspace: {}", e)))?;

    Ok(())
}

/// Create all required tables
pub async fn create_tables(session: &Session, keyspace: &str) -> Result<(), PersistenceError> {
    // Pseudonym mappings. Row TTL is applied per insert from the mapping's
    // own ttl_seconds; the table default is a safety net.
    let mappings_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.pseudonym_mappings (
            pseudonym_id UUID,
            created_at TIMESTAMP,
            ttl_seconds BIGINT,
            transforms_json TEXT,
            redacted_json TEXT,
            quarantined BOOLEAN,
            PRIMARY KEY (pseudonym_id)
        ) WITH default_time_to_live = 86400
    "#,
        keyspace
    );

    session
        .query_unpaged(mappings_table, &[])
        .await
        .map_err(|e| {
            PersistenceError::Schema(format!("Failed to create pseudonym_mappings table: {}", e))
        })?;

    tracing::info!("All tables created successfully");
    Ok(())
}
