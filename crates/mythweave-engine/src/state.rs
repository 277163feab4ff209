//! Turn state, its read-only projection, and the final result.

use chrono::{DateTime, Utc};
use mythweave_core::error::{EngineError, ErrorDetail};
use mythweave_core::event::{Event, EventSequencer};
use mythweave_core::phase::PhaseType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::compensation::CompensationPlan;

/// The outcome record one phase produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseOutcome {
    /// Which phase this outcome belongs to.
    pub phase: PhaseType,
    /// Whether the phase succeeded.
    pub success: bool,
    /// Ids of prior-phase events this phase consumed.
    pub events_consumed: Vec<Uuid>,
    /// Events this phase generated, in sequence order.
    pub events_generated: Vec<Event>,
    /// AI cost incurred by this phase.
    pub ai_cost: f64,
    /// Wall-clock duration of the phase, stamped by the orchestrator.
    pub duration_ms: u64,
    /// Non-fatal observations (contradictions, fallbacks, skipped calls).
    pub warnings: Vec<String>,
    /// Error detail; set on failure, or on success when a non-fatal error
    /// (budget exhaustion) degraded the phase.
    pub error_detail: Option<ErrorDetail>,
}

impl PhaseOutcome {
    /// A successful outcome with no events yet.
    #[must_use]
    pub fn succeeded(phase: PhaseType) -> Self {
        Self {
            phase,
            success: true,
            events_consumed: Vec::new(),
            events_generated: Vec::new(),
            ai_cost: 0.0,
            duration_ms: 0,
            warnings: Vec::new(),
            error_detail: None,
        }
    }

    /// A failed outcome carrying the error that stopped the phase.
    #[must_use]
    pub fn failed(phase: PhaseType, error: &EngineError, duration_ms: u64) -> Self {
        Self {
            phase,
            success: false,
            events_consumed: Vec::new(),
            events_generated: Vec::new(),
            ai_cost: 0.0,
            duration_ms,
            warnings: Vec::new(),
            error_detail: Some(ErrorDetail::from(error)),
        }
    }
}

/// Read-only projection of turn state handed to a running phase.
///
/// A phase only ever observes the finalized event log of earlier phases,
/// never another phase's in-flight state. The sequencer is the one shared
/// handle: producers draw sequence numbers from it as their results land.
#[derive(Debug, Clone, Copy)]
pub struct TurnStateView<'a> {
    /// The turn identifier.
    pub turn_id: Uuid,
    /// The campaign-scoped turn number.
    pub turn_number: u64,
    /// Events committed by earlier phases, in sequence order.
    pub events: &'a [Event],
    /// Sequence-number allocator for events produced during this phase.
    pub sequencer: &'a EventSequencer,
}

impl TurnStateView<'_> {
    /// Iterates committed events whose kind starts with `prefix`.
    pub fn events_with_kind_prefix(
        &self,
        prefix: &str,
    ) -> impl Iterator<Item = &Event> {
        let prefix = prefix.to_owned();
        self.events.iter().filter(move |e| e.kind.starts_with(&prefix))
    }
}

/// Mutable turn state, owned exclusively by one orchestrator invocation.
///
/// Discarded when the turn finishes; everything a caller may keep is
/// copied into [`TurnResult`] first.
#[derive(Debug)]
pub struct TurnState {
    turn_id: Uuid,
    turn_number: u64,
    started_at: DateTime<Utc>,
    phases_completed: Vec<PhaseType>,
    outcomes: Vec<PhaseOutcome>,
    total_ai_cost: f64,
    events: Vec<Event>,
    sequencer: EventSequencer,
}

impl TurnState {
    /// Creates fresh state for one turn.
    #[must_use]
    pub fn new(turn_number: u64, started_at: DateTime<Utc>) -> Self {
        Self {
            turn_id: Uuid::new_v4(),
            turn_number,
            started_at,
            phases_completed: Vec::new(),
            outcomes: Vec::new(),
            total_ai_cost: 0.0,
            events: Vec::new(),
            sequencer: EventSequencer::new(),
        }
    }

    /// The turn identifier.
    #[must_use]
    pub fn turn_id(&self) -> Uuid {
        self.turn_id
    }

    /// When the turn started.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// The shared sequence-number allocator.
    #[must_use]
    pub fn sequencer(&self) -> &EventSequencer {
        &self.sequencer
    }

    /// AI spend accumulated by committed outcomes so far.
    #[must_use]
    pub fn total_ai_cost(&self) -> f64 {
        self.total_ai_cost
    }

    /// The read-only projection handed to the next phase.
    #[must_use]
    pub fn view(&self) -> TurnStateView<'_> {
        TurnStateView {
            turn_id: self.turn_id,
            turn_number: self.turn_number,
            events: &self.events,
            sequencer: &self.sequencer,
        }
    }

    /// Commits a phase outcome: appends its events to the log and, on
    /// success, marks the phase completed.
    pub fn commit(&mut self, outcome: PhaseOutcome) {
        if outcome.success {
            self.phases_completed.push(outcome.phase);
        }
        self.total_ai_cost += outcome.ai_cost;
        self.events.extend(outcome.events_generated.iter().cloned());
        self.outcomes.push(outcome);
    }

    /// Outcomes of phases that succeeded, in completion order.
    #[must_use]
    pub fn succeeded_outcomes(&self) -> Vec<&PhaseOutcome> {
        self.outcomes.iter().filter(|o| o.success).collect()
    }

    /// Appends the events of an executed compensation plan to the log.
    pub fn append_compensation(&mut self, plan: &CompensationPlan) {
        for reversal in &plan.reversals {
            self.events
                .extend(reversal.actions.iter().map(|a| a.event.clone()));
        }
    }

    /// Consumes the state into the immutable result handed to the caller.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn into_result(
        self,
        success: bool,
        total_duration_ms: u64,
        error_detail: Option<ErrorDetail>,
        compensation: Option<CompensationPlan>,
    ) -> TurnResult {
        let completion = self.phases_completed.len() as f64 / PhaseType::ORDERED.len() as f64;
        TurnResult {
            turn_id: self.turn_id,
            turn_number: self.turn_number,
            success,
            phases_completed: self.phases_completed,
            outcomes: self.outcomes,
            total_duration_ms,
            total_ai_cost: self.total_ai_cost,
            completion,
            error_detail,
            compensation,
        }
    }
}

/// The immutable, serializable record of one executed turn.
///
/// A partially completed turn is a legitimate outcome, distinguishable
/// from a successful one purely by `success` and `phases_completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResult {
    /// The turn identifier.
    pub turn_id: Uuid,
    /// The campaign-scoped turn number.
    pub turn_number: u64,
    /// Whether every phase completed.
    pub success: bool,
    /// Phases that succeeded, in pipeline order.
    pub phases_completed: Vec<PhaseType>,
    /// Per-phase outcomes, including a failed phase's outcome if any.
    pub outcomes: Vec<PhaseOutcome>,
    /// Wall-clock duration of the whole turn.
    pub total_duration_ms: u64,
    /// Total AI spend across all phases.
    pub total_ai_cost: f64,
    /// Fraction of the pipeline that completed, in `[0.0, 1.0]`.
    pub completion: f64,
    /// Top-level error detail when the turn did not fully succeed.
    pub error_detail: Option<ErrorDetail>,
    /// The executed compensation plan, when compensation ran.
    pub compensation: Option<CompensationPlan>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mythweave_core::clock::{Clock, SystemClock};

    fn outcome_with_event(state: &TurnState, phase: PhaseType) -> PhaseOutcome {
        let mut outcome = PhaseOutcome::succeeded(phase);
        outcome.events_generated.push(Event::record(
            state.turn_id(),
            "world.time_advanced",
            serde_json::json!({ "minutes": 60 }),
            state.sequencer(),
            &SystemClock,
        ));
        outcome
    }

    #[test]
    fn test_commit_appends_events_and_marks_phase_completed() {
        let mut state = TurnState::new(1, SystemClock.now());
        let outcome = outcome_with_event(&state, PhaseType::WorldUpdate);

        state.commit(outcome);

        assert_eq!(state.view().events.len(), 1);
        let result = state.into_result(true, 5, None, None);
        assert_eq!(result.phases_completed, vec![PhaseType::WorldUpdate]);
        assert!((result.completion - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_failed_outcome_does_not_mark_phase_completed() {
        let mut state = TurnState::new(1, SystemClock.now());
        let err = EngineError::PhaseExecution {
            phase: PhaseType::WorldUpdate,
            reason: "boom".to_owned(),
        };
        state.commit(PhaseOutcome::failed(PhaseType::WorldUpdate, &err, 3));

        let result = state.into_result(false, 3, Some(ErrorDetail::from(&err)), None);
        assert!(result.phases_completed.is_empty());
        assert_eq!(result.outcomes.len(), 1);
        assert!(!result.outcomes[0].success);
    }

    #[test]
    fn test_view_filters_by_kind_prefix() {
        let mut state = TurnState::new(1, SystemClock.now());
        state.commit(outcome_with_event(&state, PhaseType::WorldUpdate));

        let view = state.view();
        assert_eq!(view.events_with_kind_prefix("world.").count(), 1);
        assert_eq!(view.events_with_kind_prefix("interaction.").count(), 0);
    }
}
