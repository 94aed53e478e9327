//! Pattern records
//!
//! Records stored in the learning substrate: a signature vector, a payload,
//! and reinforcement stats that rank reuse candidates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

/// Reinforcement half-life in hours (7 days).
pub const RECENCY_HALF_LIFE_HOURS: f64 = 168.0;

/// Payload classes stored in `PatternMetadata::data_type`.
pub const DATA_TYPE_BASE_PROMPT: &str = "base_prompt";
pub const DATA_TYPE_IMPROVED_TEMPLATE: &str = "improved_template";
pub const DATA_TYPE_ANALYSIS: &str = "analysis";
pub const DATA_TYPE_VALIDATION: &str = "validation";

/// Typed pattern collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Prompt,
    Analysis,
    Validation,
    Reasoning,
    CrossLink,
}

impl PatternKind {
    pub fn all() -> &'static [PatternKind] {
        &[
            PatternKind::Prompt,
            PatternKind::Analysis,
            PatternKind::Validation,
            PatternKind::Reasoning,
            PatternKind::CrossLink,
        ]
    }

    /// Name of the backing vector collection.
    pub fn collection_name(&self) -> &'static str {
        match self {
            PatternKind::Prompt => "prompt_patterns",
            PatternKind::Analysis => "analysis_patterns",
            PatternKind::Validation => "validation_patterns",
            PatternKind::Reasoning => "reasoning_patterns",
            PatternKind::CrossLink => "cross_component_links",
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection_name())
    }
}

/// Context tags attached to a pattern.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternMetadata {
    /// Business context tag (banking, lending, risk, ...).
    pub context: String,
    /// Payload class, e.g. `base_prompt`, `improved_template`, `analysis`.
    pub data_type: String,
    pub domain: String,
}

/// Usage statistics. `uses` is monotonic; stats are never rewound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternStats {
    pub uses: u64,
    pub successes: u64,
    pub quality_sum: f64,
    pub quality_n: u64,
    pub last_used_at: DateTime<Utc>,
    pub confidence: f64,
}

impl PatternStats {
    /// Stats for a freshly recorded interaction.
    pub fn initial(approved: bool, overall_score: f64, now: DateTime<Utc>) -> Self {
        Self {
            uses: 1,
            successes: if approved { 1 } else { 0 },
            quality_sum: overall_score,
            quality_n: 1,
            last_used_at: now,
            confidence: 0.5, // 1 / (1 + uses)
        }
    }

    /// Fold one more interaction into the stats. Monotonic in `uses`.
    pub fn register_use(&mut self, approved: bool, overall_score: Option<f64>, now: DateTime<Utc>) {
        self.uses += 1;
        if approved {
            self.successes += 1;
        }
        if let Some(score) = overall_score {
            self.quality_sum += score;
            self.quality_n += 1;
        }
        self.last_used_at = now;
        self.confidence = 1.0 / (1.0 + self.uses as f64);
    }

    pub fn success_rate(&self) -> f64 {
        if self.uses == 0 {
            0.0
        } else {
            self.successes as f64 / self.uses as f64
        }
    }

    pub fn avg_quality(&self) -> f64 {
        if self.quality_n == 0 {
            0.0
        } else {
            self.quality_sum / self.quality_n as f64
        }
    }

    /// Exponential recency factor, half-life 7 days.
    pub fn recency(&self, now: DateTime<Utc>) -> f64 {
        let age_hours = (now - self.last_used_at).num_seconds().max(0) as f64 / 3600.0;
        (2.0_f64).powf(-age_hours / RECENCY_HALF_LIFE_HOURS)
    }

    /// Reinforcement score:
    /// `0.4 * success_rate + 0.3 * avg_quality + 0.2 * recency + 0.1 * min(1, uses / 10)`,
    /// clamped to [0, 1].
    pub fn reinforcement(&self, now: DateTime<Utc>) -> f64 {
        let confidence_factor = (self.uses as f64 / 10.0).min(1.0);
        let score = 0.4 * self.success_rate()
            + 0.3 * self.avg_quality()
            + 0.2 * self.recency(now)
            + 0.1 * confidence_factor;
        score.clamp(0.0, 1.0)
    }
}

/// A record in the learning substrate. Never mutated destructively:
/// updates go through `register_use` and reinforcement recomputation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRecord {
    pub id: Uuid,
    pub kind: PatternKind,
    /// Embedding of the canonicalized input signature, not the raw input.
    pub signature_vector: Vec<f32>,
    /// Prompt text / analysis text / validation verdict blob.
    pub payload: String,
    pub metadata: PatternMetadata,
    pub stats: PatternStats,
    /// Cached reinforcement, recomputed on every stat update so reads stay
    /// cheap. Not recomputed at query time.
    pub reinforcement: f64,
}

impl PatternRecord {
    pub fn new(
        kind: PatternKind,
        signature_vector: Vec<f32>,
        payload: String,
        metadata: PatternMetadata,
        stats: PatternStats,
    ) -> Self {
        let reinforcement = stats.reinforcement(Utc::now());
        Self {
            id: Uuid::new_v4(),
            kind,
            signature_vector,
            payload,
            metadata,
            stats,
            reinforcement,
        }
    }

    pub fn refresh_reinforcement(&mut self, now: DateTime<Utc>) {
        self.reinforcement = self.stats.reinforcement(now);
    }

    /// Stable ranking for candidates with equal weighted score: `Less`
    /// means `self` ranks first. Newer `last_used_at` wins, then the lower
    /// id.
    pub fn tie_break(&self, other: &PatternRecord) -> Ordering {
        other
            .stats
            .last_used_at
            .cmp(&self.stats.last_used_at)
            .then_with(|| self.id.cmp(&other.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_initial_stats() {
        let now = Utc::now();
        let stats = PatternStats::initial(true, 0.9, now);
        assert_eq!(stats.uses, 1);
        assert_eq!(stats.successes, 1);
        assert_eq!(stats.quality_n, 1);
        assert!((stats.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_register_use_is_monotonic() {
        let now = Utc::now();
        let mut stats = PatternStats::initial(false, 0.4, now);
        for i in 0..10 {
            let before = stats.uses;
            stats.register_use(i % 2 == 0, Some(0.7), now);
            assert_eq!(stats.uses, before + 1);
        }
        assert_eq!(stats.quality_n, 11);
    }

    #[test]
    fn test_reinforcement_bounds() {
        let now = Utc::now();
        let mut stats = PatternStats::initial(true, 1.0, now);
        for _ in 0..20 {
            stats.register_use(true, Some(1.0), now);
        }
        let r = stats.reinforcement(now);
        assert!(r <= 1.0 && r >= 0.0);
        // All components saturated: 0.4 + 0.3 + 0.2 + 0.1
        assert!((r - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_recency_half_life() {
        let now = Utc::now();
        let mut stats = PatternStats::initial(true, 1.0, now);
        stats.last_used_at = now - Duration::days(7);
        assert!((stats.recency(now) - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_better_stats_strictly_dominate() {
        // Property: strictly higher success rate and newer last_used_at
        // yields strictly higher reinforcement.
        let now = Utc::now();
        let strong = PatternStats {
            uses: 10,
            successes: 9,
            quality_sum: 8.0,
            quality_n: 10,
            last_used_at: now,
            confidence: 1.0 / 11.0,
        };
        let weak = PatternStats {
            uses: 10,
            successes: 4,
            quality_sum: 8.0,
            quality_n: 10,
            last_used_at: now - Duration::days(3),
            confidence: 1.0 / 11.0,
        };
        assert!(strong.reinforcement(now) > weak.reinforcement(now));
    }

    #[test]
    fn test_tie_break_prefers_newer_then_lower_id() {
        let now = Utc::now();
        let stats = |at| PatternStats {
            uses: 1,
            successes: 1,
            quality_sum: 0.9,
            quality_n: 1,
            last_used_at: at,
            confidence: 0.5,
        };
        let mk = |at| {
            PatternRecord::new(
                PatternKind::Prompt,
                vec![1.0],
                "p".to_string(),
                PatternMetadata::default(),
                stats(at),
            )
        };

        let newer = mk(now);
        let older = mk(now - Duration::hours(1));
        assert_eq!(newer.tie_break(&older), Ordering::Less);
        assert_eq!(older.tie_break(&newer), Ordering::Greater);

        let mut a = mk(now);
        let mut b = mk(now);
        b.stats.last_used_at = a.stats.last_used_at;
        if a.id > b.id {
            std::mem::swap(&mut a, &mut b);
        }
        assert_eq!(a.tie_break(&b), Ordering::Less);
    }

    #[test]
    fn test_collection_names() {
        assert_eq!(PatternKind::Prompt.collection_name(), "prompt_patterns");
        assert_eq!(
            PatternKind::CrossLink.collection_name(),
            "cross_component_links"
        );
    }
}
