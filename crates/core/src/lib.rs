//! Core types for the finsight analysis pipeline
//!
//! This crate provides foundational types used across all other crates:
//! - `Record` tree documents with json-path addressing
//! - PII kinds and pseudonym mappings
//! - Pattern records with reinforcement stats
//! - Validation verdicts and quality levels
//! - Pipeline request/result types
//! - Error taxonomy

pub mod analysis;
pub mod error;
pub mod pattern;
pub mod pii;
pub mod record;
pub mod request;
pub mod verdict;

pub use analysis::Analysis;
pub use error::{Error, ErrorKind, Result};
pub use pattern::{PatternKind, PatternMetadata, PatternRecord, PatternStats};
pub use pii::{
    FieldTransform, PiiFieldInfo, PiiKind, PiiSummary, PseudonymId, PseudonymMapping,
};
pub use record::{PathSegment, Record};
pub use request::{
    EnrichmentStatus, PipelineRequest, PipelineResult, PromptSource, Provenance, RequestConfig,
    Timings,
};
pub use verdict::{CriterionName, QualityLevel, ValidationVerdict};
