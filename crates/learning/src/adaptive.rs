//! Adaptive thresholds
//!
//! Three process-wide floats gating quality and similarity decisions. All
//! updates flow through one writer task consuming a feedback channel;
//! readers load atomically.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use finsight_config::constants::adaptive as tuning;
use finsight_config::AdaptiveConfig;

/// Events the writer task folds into the thresholds.
#[derive(Debug, Clone, Copy)]
pub enum FeedbackEvent {
    /// A validated interaction completed with this overall score.
    Interaction { overall_score: f64 },
    /// A stored pattern was reused at this similarity.
    Reuse { similarity: f32 },
}

/// Point-in-time view of the thresholds.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct AdaptiveSnapshot {
    pub quality_gate: f64,
    pub similarity_match: f64,
    pub reinforcement_cutoff: f64,
}

/// Atomically readable threshold cells. f64 values are stored as bits.
struct Cells {
    quality_gate: AtomicU64,
    similarity_match: AtomicU64,
    reinforcement_cutoff: AtomicU64,
}

impl Cells {
    fn new(config: &AdaptiveConfig) -> Self {
        Self {
            quality_gate: AtomicU64::new(config.quality_gate.to_bits()),
            similarity_match: AtomicU64::new(config.similarity_match.to_bits()),
            reinforcement_cutoff: AtomicU64::new(config.reinforcement_cutoff.to_bits()),
        }
    }

    fn load(&self, cell: &AtomicU64) -> f64 {
        f64::from_bits(cell.load(Ordering::Acquire))
    }

    fn store(&self, cell: &AtomicU64, value: f64) {
        cell.store(value.to_bits(), Ordering::Release);
    }
}

/// Writer-side rolling state. Kept out of the shared cells so only the
/// single writer task ever touches it.
struct WriterState {
    quality_window: VecDeque<f64>,
    similarity_window: VecDeque<f64>,
}

impl WriterState {
    fn new() -> Self {
        Self {
            quality_window: VecDeque::with_capacity(tuning::ROLLING_WINDOW),
            similarity_window: VecDeque::with_capacity(tuning::ROLLING_WINDOW),
        }
    }

    fn push(window: &mut VecDeque<f64>, value: f64) -> Option<f64> {
        if window.len() == tuning::ROLLING_WINDOW {
            window.pop_front();
        }
        window.push_back(value);
        if window.is_empty() {
            None
        } else {
            Some(window.iter().sum::<f64>() / window.len() as f64)
        }
    }

    /// Fold one event, returning updated threshold values when they moved.
    fn apply(&mut self, event: FeedbackEvent, cells: &Cells) {
        match event {
            FeedbackEvent::Interaction { overall_score } => {
                let Some(mean) = Self::push(&mut self.quality_window, overall_score) else {
                    return;
                };
                let gate = cells.load(&cells.quality_gate);
                if mean > gate + tuning::DRIFT_MARGIN {
                    let raised = (gate + tuning::STEP).min(tuning::QUALITY_GATE_MAX);
                    cells.store(&cells.quality_gate, raised);
                } else if mean < gate - tuning::DRIFT_MARGIN {
                    let lowered = (gate - tuning::STEP).max(tuning::QUALITY_GATE_MIN);
                    cells.store(&cells.quality_gate, lowered);
                }
            },
            FeedbackEvent::Reuse { similarity } => {
                let Some(mean) = Self::push(&mut self.similarity_window, similarity as f64)
                else {
                    return;
                };
                let gate = cells.load(&cells.similarity_match);
                if mean > gate + tuning::DRIFT_MARGIN {
                    let raised = (gate + tuning::STEP).min(tuning::QUALITY_GATE_MAX);
                    cells.store(&cells.similarity_match, raised);
                } else if mean < gate - tuning::DRIFT_MARGIN {
                    let lowered = (gate - tuning::STEP).max(tuning::QUALITY_GATE_MIN);
                    cells.store(&cells.similarity_match, lowered);
                }
            },
        }
    }
}

/// Shared handle: atomic reads plus a sender into the writer task.
#[derive(Clone)]
pub struct AdaptiveHandle {
    cells: Arc<Cells>,
    tx: mpsc::Sender<FeedbackEvent>,
}

impl AdaptiveHandle {
    /// Spawn the single-writer feedback task and return the handle.
    pub fn spawn(config: AdaptiveConfig) -> Self {
        let cells = Arc::new(Cells::new(&config));
        let (tx, mut rx) = mpsc::channel::<FeedbackEvent>(256);

        let writer_cells = cells.clone();
        tokio::spawn(async move {
            let mut state = WriterState::new();
            while let Some(event) = rx.recv().await {
                state.apply(event, &writer_cells);
            }
            tracing::debug!("Adaptive feedback channel closed");
        });

        Self { cells, tx }
    }

    pub fn quality_gate(&self) -> f64 {
        self.cells.load(&self.cells.quality_gate)
    }

    pub fn similarity_match(&self) -> f64 {
        self.cells.load(&self.cells.similarity_match)
    }

    pub fn reinforcement_cutoff(&self) -> f64 {
        self.cells.load(&self.cells.reinforcement_cutoff)
    }

    pub fn snapshot(&self) -> AdaptiveSnapshot {
        AdaptiveSnapshot {
            quality_gate: self.quality_gate(),
            similarity_match: self.similarity_match(),
            reinforcement_cutoff: self.reinforcement_cutoff(),
        }
    }

    /// Queue a feedback event for the writer task. Never blocks the
    /// request path; a full channel drops the event.
    pub fn feed(&self, event: FeedbackEvent) {
        if self.tx.try_send(event).is_err() {
            tracing::debug!("Adaptive feedback channel full, event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells() -> Cells {
        Cells::new(&AdaptiveConfig::default())
    }

    #[test]
    fn test_initial_values() {
        let c = cells();
        assert!((c.load(&c.quality_gate) - 0.70).abs() < 1e-9);
        assert!((c.load(&c.similarity_match) - 0.80).abs() < 1e-9);
        assert!((c.load(&c.reinforcement_cutoff) - 0.60).abs() < 1e-9);
    }

    #[test]
    fn test_sustained_high_scores_raise_gate() {
        let c = cells();
        let mut state = WriterState::new();
        for _ in 0..60 {
            state.apply(FeedbackEvent::Interaction { overall_score: 0.95 }, &c);
        }
        let gate = c.load(&c.quality_gate);
        assert!(gate > 0.70);
        assert!(gate <= tuning::QUALITY_GATE_MAX);
    }

    #[test]
    fn test_sustained_low_scores_lower_gate_bounded() {
        let c = cells();
        let mut state = WriterState::new();
        for _ in 0..10_000 {
            state.apply(FeedbackEvent::Interaction { overall_score: 0.1 }, &c);
        }
        let gate = c.load(&c.quality_gate);
        assert!((gate - tuning::QUALITY_GATE_MIN).abs() < 1e-9);
    }

    #[test]
    fn test_scores_near_gate_leave_it_alone() {
        let c = cells();
        let mut state = WriterState::new();
        for _ in 0..100 {
            state.apply(FeedbackEvent::Interaction { overall_score: 0.71 }, &c);
        }
        assert!((c.load(&c.quality_gate) - 0.70).abs() < 1e-9);
    }

    #[test]
    fn test_reuse_similarity_moves_similarity_gate() {
        let c = cells();
        let mut state = WriterState::new();
        for _ in 0..200 {
            state.apply(FeedbackEvent::Reuse { similarity: 0.99 }, &c);
        }
        assert!(c.load(&c.similarity_match) > 0.80);
        // Quality gate untouched by reuse events
        assert!((c.load(&c.quality_gate) - 0.70).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_handle_roundtrip_through_task() {
        let handle = AdaptiveHandle::spawn(AdaptiveConfig::default());
        for _ in 0..120 {
            handle.feed(FeedbackEvent::Interaction { overall_score: 1.0 });
        }
        // Give the writer task a moment to drain the channel.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(handle.quality_gate() > 0.70);

        let snapshot = handle.snapshot();
        assert!(snapshot.quality_gate > 0.70);
        assert!((snapshot.reinforcement_cutoff - 0.60).abs() < 1e-9);
    }
}
