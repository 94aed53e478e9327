//! finsight server
//!
//! HTTP endpoints for the analysis pipeline: /analyze (blocking-validated),
//! pseudonymization, prompt generation, validation, learning feedback, and
//! health/status/metrics surfaces.

pub mod http;
pub mod metrics;
pub mod state;

pub use http::create_router;
pub use metrics::init_metrics;
pub use state::AppState;

use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("startup error: {0}")]
    Startup(String),

    #[error("internal error: {0}")]
    Internal(String),
}
