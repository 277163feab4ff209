//! Saga compensation planning.
//!
//! When a phase fails after earlier phases have committed, the planner
//! builds an explicit, inspectable plan of inverse events — compensation is
//! data, not unwind logic, so it can be unit-tested without driving real
//! failures through the pipeline.

use mythweave_core::clock::Clock;
use mythweave_core::event::{Event, EventSequencer};
use mythweave_core::phase::PhaseType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::phases::PhaseRegistry;
use crate::state::PhaseOutcome;

/// One compensating action: an inverse event referencing the original.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompensationAction {
    /// Id of the original event this action reverses. The reference is
    /// non-owning; the original stays in the turn's event log.
    pub reverses: Uuid,
    /// The compensating event to append.
    pub event: Event,
}

/// The reversal entry for one succeeded phase.
///
/// Read-only phases legitimately produce an entry with no actions; the
/// entry still records that their reversal ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseReversal {
    /// The phase being reversed.
    pub phase: PhaseType,
    /// Compensating actions, in the order they must be appended.
    pub actions: Vec<CompensationAction>,
}

/// A reversal routine that itself failed. Fatal and non-retryable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompensationGap {
    /// The phase whose reversal failed.
    pub phase: PhaseType,
    /// Why the reversal could not complete.
    pub reason: String,
}

/// Ordered compensation plan for a partially completed turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompensationPlan {
    /// One entry per succeeded phase, in reverse phase order.
    pub reversals: Vec<PhaseReversal>,
    /// Reversal routines that failed. Non-empty gaps make the turn's
    /// failure non-retryable.
    pub gaps: Vec<CompensationGap>,
}

impl CompensationPlan {
    /// Total number of compensating events across all reversals.
    #[must_use]
    pub fn action_count(&self) -> usize {
        self.reversals.iter().map(|r| r.actions.len()).sum()
    }
}

/// Builds compensation plans by calling each succeeded phase's reversal
/// routine in reverse phase order.
pub struct CompensationPlanner<'a> {
    registry: &'a PhaseRegistry,
}

impl<'a> CompensationPlanner<'a> {
    /// Creates a planner over the given phase table.
    #[must_use]
    pub fn new(registry: &'a PhaseRegistry) -> Self {
        Self { registry }
    }

    /// Computes the plan for the given succeeded outcomes.
    ///
    /// Deterministic and total: the same outcome list always yields the
    /// same plan, and reversal failures are recorded as gaps instead of
    /// raised — partial compensation is never silently swallowed.
    #[must_use]
    pub fn plan(
        &self,
        succeeded: &[&PhaseOutcome],
        sequencer: &EventSequencer,
        clock: &dyn Clock,
    ) -> CompensationPlan {
        let mut plan = CompensationPlan {
            reversals: Vec::new(),
            gaps: Vec::new(),
        };

        for outcome in succeeded.iter().rev() {
            let Some(executor) = self.registry.get(outcome.phase) else {
                plan.gaps.push(CompensationGap {
                    phase: outcome.phase,
                    reason: "no executor registered for phase".to_owned(),
                });
                continue;
            };
            match executor.reverse(outcome, sequencer, clock) {
                Ok(events) => {
                    let actions = events
                        .into_iter()
                        .map(|event| CompensationAction {
                            reverses: event.compensates.unwrap_or_else(Uuid::nil),
                            event,
                        })
                        .collect();
                    plan.reversals.push(PhaseReversal {
                        phase: outcome.phase,
                        actions,
                    });
                }
                Err(err) => {
                    plan.gaps.push(CompensationGap {
                        phase: outcome.phase,
                        reason: err.to_string(),
                    });
                }
            }
        }

        plan
    }
}
