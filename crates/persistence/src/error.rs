//! Persistence errors

use thiserror::Error;

/// Token store errors
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("connection error: {0}")]
    Connection(#[from] scylla::transport::errors::NewSessionError),

    #[error("query error: {0}")]
    Query(#[from] scylla::transport::errors::QueryError),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}
