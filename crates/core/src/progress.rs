//! Batch progress inference from polled queue counters.
//!
//! The queue service only exposes cumulative counters, so batch start and end
//! are inferred from level readings: a batch begins on the first reading with
//! active items and ends on the first reading with none. Progress is counted
//! against a baseline of processed items captured when the batch was first
//! seen.
//!
//! Known limitations, kept on purpose:
//! - a batch first observed mid-flight reports the active count at that
//!   moment as its total;
//! - back-to-back batches with no idle reading in between are one batch, so
//!   `processed` may exceed `total`;
//! - a counter reset on the server mid-batch pins `processed` at 0 until the
//!   queue drains.

use serde::{Deserialize, Serialize};

use crate::QueueSnapshot;

/// Tracking state carried between poll ticks.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum BatchState {
    #[default]
    Idle,
    Tracking {
        /// `completed + failed + canceled` when the batch was first seen.
        baseline: u64,
        /// Active item count when the batch was first seen. Always > 0.
        total: u64,
    },
}

impl BatchState {
    pub fn is_tracking(&self) -> bool {
        matches!(self, BatchState::Tracking { .. })
    }

    pub fn baseline(&self) -> Option<u64> {
        match self {
            BatchState::Idle => None,
            BatchState::Tracking { baseline, .. } => Some(*baseline),
        }
    }

    /// Batch size captured at start; 0 when idle.
    pub fn batch_total(&self) -> u64 {
        match self {
            BatchState::Idle => 0,
            BatchState::Tracking { total, .. } => *total,
        }
    }
}

/// What a display binding should show for the current tick.
///
/// `processed` and `total` carry meaning only while `visible` is set.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressView {
    pub visible: bool,
    pub processed: u64,
    pub total: u64,
}

impl ProgressView {
    pub const HIDDEN: ProgressView = ProgressView { visible: false, processed: 0, total: 0 };

    fn shown(processed: u64, total: u64) -> Self {
        Self { visible: true, processed, total }
    }

    /// `"{processed}/{total}"` while visible.
    pub fn label(&self) -> Option<String> {
        self.visible.then(|| format!("{}/{}", self.processed, self.total))
    }

    /// Completed share in `[0, ∞)`; `None` when hidden or when there is no total to divide by.
    pub fn fraction(&self) -> Option<f64> {
        if !self.visible || self.total == 0 {
            return None;
        }
        Some(self.processed as f64 / self.total as f64)
    }
}

/// Advance the tracking state by one reading.
///
/// `snapshot` is `None` when no queue data was available this tick, which
/// leaves the state untouched. `service_running == false` always resets.
pub fn step(state: BatchState, snapshot: Option<&QueueSnapshot>, service_running: bool) -> (BatchState, ProgressView) {
    if !service_running {
        return (BatchState::Idle, ProgressView::HIDDEN);
    }
    let Some(snap) = snapshot else {
        return (state, ProgressView::HIDDEN);
    };

    let active = snap.active();
    let state = match state {
        BatchState::Idle if active > 0 => BatchState::Tracking { baseline: snap.processed(), total: active },
        other => other,
    };

    match state {
        BatchState::Idle => (BatchState::Idle, ProgressView::HIDDEN),
        BatchState::Tracking { .. } if active == 0 => (BatchState::Idle, ProgressView::HIDDEN),
        BatchState::Tracking { baseline, total } => {
            // Counters only go backwards after a server-side reset.
            let processed = snap.processed().saturating_sub(baseline);
            (state, ProgressView::shown(processed, total))
        }
    }
}

/// Owns a [`BatchState`] for the lifetime of one polling session.
#[derive(Debug, Clone, Default)]
pub struct BatchTracker {
    state: BatchState,
}

impl BatchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn is_tracking(&self) -> bool {
        self.state.is_tracking()
    }

    pub fn update(&mut self, snapshot: Option<&QueueSnapshot>, service_running: bool) -> ProgressView {
        let (next, view) = step(self.state, snapshot, service_running);
        self.state = next;
        view
    }

    pub fn reset(&mut self) {
        self.state = BatchState::Idle;
    }
}
