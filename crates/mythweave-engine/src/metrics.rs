//! Per-turn performance accounting.

use std::sync::{Mutex, PoisonError};

use mythweave_core::phase::PhaseType;
use serde::{Deserialize, Serialize};

use crate::state::PhaseOutcome;

/// Accumulated metrics for one recorded phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseMetrics {
    /// The phase recorded.
    pub phase: PhaseType,
    /// Whether the phase succeeded.
    pub success: bool,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Events the phase generated.
    pub events_generated: usize,
    /// Events the phase consumed.
    pub events_consumed: usize,
    /// AI cost the phase incurred.
    pub ai_cost: f64,
}

/// Snapshot returned by [`PerformanceTracker::summarize`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Number of phases recorded so far.
    pub phases_recorded: usize,
    /// Total wall-clock duration across recorded phases.
    pub total_duration_ms: u64,
    /// Total events generated across recorded phases.
    pub total_events_generated: usize,
    /// Total events consumed across recorded phases.
    pub total_events_consumed: usize,
    /// Total AI spend across recorded phases.
    pub total_ai_cost: f64,
    /// Per-phase breakdown, in recording order.
    pub per_phase: Vec<PhaseMetrics>,
}

/// Additively accumulates timing, event counts, and AI cost per phase.
///
/// Thread-safe: `record_phase` may be called from within a phase's bounded
/// concurrency. `summarize` is a pure read of accumulated state and is
/// valid mid-turn.
#[derive(Debug, Default)]
pub struct PerformanceTracker {
    recorded: Mutex<Vec<PhaseMetrics>>,
}

impl PerformanceTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one phase outcome.
    pub fn record_phase(&self, outcome: &PhaseOutcome) {
        let metrics = PhaseMetrics {
            phase: outcome.phase,
            success: outcome.success,
            duration_ms: outcome.duration_ms,
            events_generated: outcome.events_generated.len(),
            events_consumed: outcome.events_consumed.len(),
            ai_cost: outcome.ai_cost,
        };
        // Recorded metrics are plain data; a poisoned guard still holds
        // every entry pushed so far, so recover it instead of panicking.
        self.recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(metrics);
    }

    /// Returns a snapshot of everything recorded so far.
    #[must_use]
    pub fn summarize(&self) -> PerformanceMetrics {
        let recorded = self.recorded.lock().unwrap_or_else(PoisonError::into_inner);
        let mut summary = PerformanceMetrics {
            phases_recorded: recorded.len(),
            per_phase: recorded.clone(),
            ..PerformanceMetrics::default()
        };
        for metrics in recorded.iter() {
            summary.total_duration_ms += metrics.duration_ms;
            summary.total_events_generated += metrics.events_generated;
            summary.total_events_consumed += metrics.events_consumed;
            summary.total_ai_cost += metrics.ai_cost;
        }
        summary
    }
}
