//! Temporal decay
//!
//! A background task recomputes cached reinforcement with the recency
//! factor once a minute. Cleanup is optional and bounded: only records past
//! the absolute age ceiling AND below the minimum-uses floor are deleted;
//! high-use records are never removed automatically.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::task::JoinHandle;

use finsight_config::LearningConfig;
use finsight_core::PatternKind;

use crate::substrate::LearningSubstrate;
use crate::vector_store::VectorPoint;
use crate::LearningError;

/// Records touched by one decay sweep.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecayReport {
    pub refreshed: usize,
    pub deleted: usize,
}

/// Reinforcement drift below this is not worth a write.
const REFRESH_EPSILON: f64 = 1e-3;

/// Page size per collection per sweep.
const SWEEP_LIMIT: usize = 1024;

impl LearningSubstrate {
    /// One decay sweep over every collection.
    pub async fn decay_tick(&self, config: &LearningConfig) -> Result<DecayReport, LearningError> {
        let now = Utc::now();
        let mut report = DecayReport::default();

        for kind in PatternKind::all() {
            let collection = kind.collection_name();
            let hits = self.index().list(collection, SWEEP_LIMIT).await?;

            for hit in hits {
                let mut record: finsight_core::PatternRecord =
                    match serde_json::from_str(&hit.payload) {
                        Ok(r) => r,
                        Err(e) => {
                            tracing::warn!(id = %hit.id, error = %e, "Skipping unparseable pattern in decay sweep");
                            continue;
                        },
                    };

                let age = now - record.stats.last_used_at;
                let too_old = age > Duration::hours(config.cleanup_age_ceiling_hours);
                let low_use = record.stats.uses < config.cleanup_min_uses;

                if config.cleanup_enabled && too_old && low_use {
                    self.index().delete(collection, record.id).await?;
                    report.deleted += 1;
                    continue;
                }

                let fresh = record.stats.reinforcement(now);
                if (fresh - record.reinforcement).abs() > REFRESH_EPSILON {
                    record.reinforcement = fresh;
                    let point = VectorPoint {
                        id: record.id,
                        vector: record.signature_vector.clone(),
                        payload: serde_json::to_string(&record)
                            .map_err(|e| LearningError::InvalidData(e.to_string()))?,
                    };
                    self.index().upsert(collection, point).await?;
                    report.refreshed += 1;
                }
            }
        }

        Ok(report)
    }
}

/// Spawn the periodic decay task.
pub fn spawn_decay_task(
    substrate: Arc<LearningSubstrate>,
    config: LearningConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = std::time::Duration::from_secs(config.decay_tick_secs.max(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            match substrate.decay_tick(&config).await {
                Ok(report) if report.refreshed > 0 || report.deleted > 0 => {
                    tracing::debug!(
                        refreshed = report.refreshed,
                        deleted = report.deleted,
                        "Decay sweep complete"
                    );
                },
                Ok(_) => {},
                Err(e) => tracing::warn!(error = %e, "Decay sweep failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptive::AdaptiveHandle;
    use crate::embeddings::Embedder;
    use crate::substrate::{PatternSearch, SubstrateConfig};
    use crate::vector_store::MemoryIndex;
    use finsight_core::{PatternMetadata, PatternRecord, PatternStats};
    use crate::substrate::PatternWriter;

    async fn substrate() -> LearningSubstrate {
        LearningSubstrate::init(
            Arc::new(MemoryIndex::new()),
            Arc::new(Embedder::hash(8)),
            AdaptiveHandle::spawn(finsight_config::AdaptiveConfig::default()),
            SubstrateConfig {
                vector_dim: 8,
                query_top_k: 16,
            },
        )
        .await
        .unwrap()
    }

    fn aged_record(hours_old: i64, uses: u64) -> PatternRecord {
        let then = Utc::now() - Duration::hours(hours_old);
        let mut stats = PatternStats::initial(true, 0.9, then);
        stats.uses = uses;
        stats.last_used_at = then;
        let mut record = PatternRecord::new(
            PatternKind::Prompt,
            vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            "payload".to_string(),
            PatternMetadata::default(),
            stats,
        );
        // Cache a stale reinforcement as if computed at creation time.
        record.refresh_reinforcement(then);
        record
    }

    #[tokio::test]
    async fn test_decay_refreshes_stale_reinforcement() {
        let s = substrate().await;
        let record = aged_record(24 * 14, 10);
        let cached = record.reinforcement;
        s.append(record.clone()).await.unwrap();

        let config = LearningConfig::default();
        let report = s.decay_tick(&config).await.unwrap();
        assert_eq!(report.refreshed, 1);
        assert_eq!(report.deleted, 0);

        let after = s
            .best_of(PatternKind::Prompt, &record.signature_vector, 0.5)
            .await
            .unwrap()
            .unwrap();
        // Two weeks old: recency decayed, reinforcement dropped.
        assert!(after.record.reinforcement < cached);
    }

    #[tokio::test]
    async fn test_cleanup_spares_high_use_records() {
        let s = substrate().await;
        let old_low_use = aged_record(24 * 60, 1);
        let old_high_use = aged_record(24 * 60, 50);
        s.append(old_low_use.clone()).await.unwrap();
        s.append(old_high_use.clone()).await.unwrap();

        let config = LearningConfig {
            cleanup_enabled: true,
            ..Default::default()
        };
        let report = s.decay_tick(&config).await.unwrap();
        assert_eq!(report.deleted, 1);

        let survivors = s
            .similar(PatternKind::Prompt, &old_high_use.signature_vector, 10, 0.0)
            .await
            .unwrap();
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].record.id, old_high_use.id);
    }

    #[tokio::test]
    async fn test_cleanup_disabled_deletes_nothing() {
        let s = substrate().await;
        s.append(aged_record(24 * 60, 1)).await.unwrap();

        let config = LearningConfig::default();
        let report = s.decay_tick(&config).await.unwrap();
        assert_eq!(report.deleted, 0);
    }
}
