//! Centralized constants
//!
//! Default endpoints, deadlines, and tuning values shared across crates.

/// Default service endpoints.
pub mod endpoints {
    /// Qdrant gRPC endpoint.
    pub const QDRANT_DEFAULT: &str = "http://localhost:6334";
    /// Ollama-compatible model backend.
    pub const MODEL_DEFAULT: &str = "http://localhost:11434";
    /// Validator backend (an LLM endpoint scored per criterion).
    pub const VALIDATOR_DEFAULT: &str = "http://localhost:11434";
    /// Enrichment service.
    pub const ENRICHMENT_DEFAULT: &str = "http://localhost:8090";
    /// ScyllaDB node for the token store.
    pub const SCYLLA_DEFAULT: &str = "127.0.0.1:9042";
}

/// Embedding space. One dimension per deployment; collections are created
/// with it and never change it afterwards.
pub mod vectors {
    pub const EMBEDDING_DIM: usize = 384;
}

/// Deadlines, in line with the pipeline contract.
pub mod deadlines {
    /// Hard ceiling for one enrichment attempt (seconds).
    pub const ENRICHMENT_SECS: u64 = 10;
    /// Hard client deadline for the enrichment service (seconds).
    pub const ENRICHMENT_CLIENT_HARD_SECS: u64 = 30;
    /// Per-criterion validator call (seconds).
    pub const CRITERION_SECS: u64 = 10;
    /// Whole validate call (seconds).
    pub const VALIDATE_OUTER_SECS: u64 = 20;
    /// Reserved out of the request budget for validation (seconds).
    pub const VALIDATION_RESERVE_SECS: u64 = 20;
    /// Cooperative cancellation grace (milliseconds).
    pub const CANCEL_GRACE_MS: u64 = 250;
    /// Dependency probe budget for /health (seconds).
    pub const HEALTH_PROBE_SECS: u64 = 5;
}

/// Adaptive threshold tuning.
pub mod adaptive {
    pub const QUALITY_GATE_INITIAL: f64 = 0.70;
    pub const SIMILARITY_MATCH_INITIAL: f64 = 0.80;
    pub const REINFORCEMENT_CUTOFF_INITIAL: f64 = 0.60;
    pub const ROLLING_WINDOW: usize = 50;
    pub const STEP: f64 = 0.01;
    pub const DRIFT_MARGIN: f64 = 0.05;
    pub const QUALITY_GATE_MIN: f64 = 0.50;
    pub const QUALITY_GATE_MAX: f64 = 0.95;
}

/// Token store defaults.
pub mod tokens {
    /// Default pseudonym-mapping TTL (24 hours).
    pub const TTL_SECONDS: i64 = 86_400;
}

/// Substrate decay defaults.
pub mod decay {
    /// Decay tick period (seconds).
    pub const TICK_SECS: u64 = 60;
    /// Absolute age ceiling before a record becomes a cleanup candidate
    /// (30 days, in hours).
    pub const AGE_CEILING_HOURS: i64 = 720;
    /// Records at or above this use count are never auto-deleted.
    pub const CLEANUP_MIN_USES: u64 = 5;
}
