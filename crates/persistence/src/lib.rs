//! Token store for pseudonym mappings
//!
//! Persistent key/value with TTL keyed by pseudonym id. The ScyllaDB
//! implementation survives restarts; the in-memory implementation is the
//! explicit fallback selected at startup when the cluster is unreachable.

pub mod client;
pub mod error;
pub mod schema;
pub mod token_store;

pub use client::{ScyllaClient, ScyllaConfig};
pub use error::PersistenceError;
pub use token_store::{InMemoryTokenStore, ScyllaTokenStore, TokenStore, TokenStoreStats};

use std::sync::Arc;

/// Connect to ScyllaDB and return a durable token store, or fall back to
/// the in-memory store when the cluster is unreachable.
///
/// The selection is surfaced through [`TokenStore::is_durable`] so /health
/// can report it.
pub async fn init_token_store(config: ScyllaConfig) -> Arc<dyn TokenStore> {
    match ScyllaClient::connect(config).await {
        Ok(client) => match client.ensure_schema().await {
            Ok(()) => {
                tracing::info!("Token store backed by ScyllaDB");
                Arc::new(ScyllaTokenStore::new(client))
            },
            Err(e) => {
                tracing::warn!(error = %e, "Schema setup failed, using in-memory token store");
                Arc::new(InMemoryTokenStore::new())
            },
        },
        Err(e) => {
            tracing::warn!(error = %e, "ScyllaDB unreachable, using in-memory token store");
            Arc::new(InMemoryTokenStore::new())
        },
    }
}
