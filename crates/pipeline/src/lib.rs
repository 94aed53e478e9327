//! Pipeline orchestrator
//!
//! Sequences one request end to end: pseudonymize, generate a prompt,
//! invoke the model, validate (blocking), feed the learning store, and
//! optionally repersonalize. Enforces deadlines, cooperative cancellation,
//! and bounded backpressure.

pub mod orchestrator;

pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorStatus};
