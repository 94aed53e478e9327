//! Validation verdicts
//!
//! Criterion names, quality levels, and the verdict shape returned by the
//! blocking validator gate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Default approval gate when no configuration overrides it.
pub const DEFAULT_APPROVAL_GATE: f64 = 0.65;

/// Closed criterion set scored by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionName {
    Accuracy,
    Completeness,
    Clarity,
    Relevance,
    Structural,
}

impl CriterionName {
    pub fn all() -> &'static [CriterionName] {
        &[
            CriterionName::Accuracy,
            CriterionName::Completeness,
            CriterionName::Clarity,
            CriterionName::Relevance,
            CriterionName::Structural,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CriterionName::Accuracy => "accuracy",
            CriterionName::Completeness => "completeness",
            CriterionName::Clarity => "clarity",
            CriterionName::Relevance => "relevance",
            CriterionName::Structural => "structural",
        }
    }

    /// Default aggregation weight. The defaults sum to 1.
    pub fn default_weight(&self) -> f64 {
        match self {
            CriterionName::Accuracy => 0.30,
            CriterionName::Completeness => 0.25,
            CriterionName::Clarity => 0.20,
            CriterionName::Relevance => 0.15,
            CriterionName::Structural => 0.10,
        }
    }

    pub fn parse(s: &str) -> Option<CriterionName> {
        match s {
            "accuracy" => Some(CriterionName::Accuracy),
            "completeness" => Some(CriterionName::Completeness),
            "clarity" => Some(CriterionName::Clarity),
            "relevance" => Some(CriterionName::Relevance),
            "structural" => Some(CriterionName::Structural),
            _ => None,
        }
    }
}

impl fmt::Display for CriterionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quality band derived from the overall score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLevel {
    Exemplary,
    High,
    Acceptable,
    Poor,
}

impl QualityLevel {
    /// Pure threshold mapping: exemplary >= 0.95, high >= 0.80,
    /// acceptable >= 0.65, else poor.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.95 {
            QualityLevel::Exemplary
        } else if score >= 0.80 {
            QualityLevel::High
        } else if score >= 0.65 {
            QualityLevel::Acceptable
        } else {
            QualityLevel::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityLevel::Exemplary => "exemplary",
            QualityLevel::High => "high",
            QualityLevel::Acceptable => "acceptable",
            QualityLevel::Poor => "poor",
        }
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one blocking validation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationVerdict {
    /// Weighted aggregate in [0, 1].
    pub overall_score: f64,
    pub per_criterion: BTreeMap<CriterionName, f64>,
    pub quality_level: QualityLevel,
    pub approved: bool,
    pub rationale: String,
    /// Criteria whose calls exceeded their deadline and scored 0.
    #[serde(default)]
    pub timed_out: Vec<CriterionName>,
}

impl ValidationVerdict {
    /// Aggregate per-criterion scores with the given weights and gate.
    /// Missing criteria contribute 0 at their weight.
    pub fn from_scores(
        scores: BTreeMap<CriterionName, f64>,
        weights: &BTreeMap<CriterionName, f64>,
        approval_gate: f64,
        rationale: impl Into<String>,
    ) -> Self {
        let overall_score: f64 = weights
            .iter()
            .map(|(name, weight)| weight * scores.get(name).copied().unwrap_or(0.0))
            .sum();
        let overall_score = overall_score.clamp(0.0, 1.0);

        Self {
            overall_score,
            per_criterion: scores,
            quality_level: QualityLevel::from_score(overall_score),
            approved: overall_score >= approval_gate,
            rationale: rationale.into(),
            timed_out: Vec::new(),
        }
    }

    /// Default weight table.
    pub fn default_weights() -> BTreeMap<CriterionName, f64> {
        CriterionName::all()
            .iter()
            .map(|c| (*c, c.default_weight()))
            .collect()
    }

    /// The criterion with the lowest score, used for retry hints.
    pub fn weakest_criterion(&self) -> Option<CriterionName> {
        self.per_criterion
            .iter()
            .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(name, _)| *name)
    }
}
