//! The five pipeline phases behind a shared executor interface.
//!
//! Dispatch is a data table keyed by [`PhaseType`]: adding or removing a
//! phase is a table edit plus one new implementation, not a class
//! hierarchy change.

mod event_integration;
mod interaction;
mod narrative;
mod subjective_brief;
mod world_update;

use std::sync::Arc;

use async_trait::async_trait;
use mythweave_core::clock::Clock;
use mythweave_core::error::EngineError;
use mythweave_core::event::{Event, EventSequencer};
use mythweave_core::participant::ParticipantId;
use mythweave_core::phase::PhaseType;
use mythweave_core::ports::{CostLedger, ParticipantGateway};
use mythweave_core::rng::DeterministicRng;

use crate::config::TurnConfiguration;
use crate::state::{PhaseOutcome, TurnStateView};

pub use event_integration::EventIntegrationPhase;
pub use interaction::InteractionOrchestrationPhase;
pub use narrative::NarrativeIntegrationPhase;
pub use subjective_brief::SubjectiveBriefPhase;
pub use world_update::WorldUpdatePhase;

/// Everything a phase needs to run: the read-only event projection plus
/// the turn-scoped configuration and cost accounting.
pub struct PhaseContext<'a> {
    /// Read-only projection of events committed by earlier phases.
    pub view: TurnStateView<'a>,
    /// The participant set for this turn.
    pub participants: &'a [ParticipantId],
    /// The immutable turn configuration.
    pub config: &'a TurnConfiguration,
    /// Turn-scoped AI spend ledger, shared across concurrent gateway calls.
    pub ledger: &'a Arc<CostLedger>,
}

/// Interface shared by the five phase variants.
#[async_trait]
pub trait PhaseExecutor: Send + Sync {
    /// Which phase this executor implements.
    fn phase(&self) -> PhaseType;

    /// Runs the phase against the committed event log.
    ///
    /// A phase never partially commits: every concurrent call inside it
    /// completes or is individually timed out before the outcome is
    /// assembled.
    ///
    /// # Errors
    ///
    /// Returns the error that stopped the phase; the orchestrator folds it
    /// into a failed outcome.
    async fn run(&self, ctx: PhaseContext<'_>) -> Result<PhaseOutcome, EngineError>;

    /// Produces compensating events with inverse semantic effect for this
    /// phase's own prior outcome. Read-only phases return an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error only when an event of this phase cannot be
    /// reversed; the planner records it as a compensation gap.
    fn reverse(
        &self,
        outcome: &PhaseOutcome,
        sequencer: &EventSequencer,
        clock: &dyn Clock,
    ) -> Result<Vec<Event>, EngineError>;
}

/// Ordered table of phase executors, one per [`PhaseType`].
pub struct PhaseRegistry {
    executors: Vec<Box<dyn PhaseExecutor>>,
}

impl PhaseRegistry {
    /// Builds the standard five-phase table.
    #[must_use]
    pub fn standard(
        gateway: Arc<dyn ParticipantGateway>,
        clock: Arc<dyn Clock>,
        rng: Box<dyn DeterministicRng>,
    ) -> Self {
        Self {
            executors: vec![
                Box::new(WorldUpdatePhase::new(Arc::clone(&clock), rng)),
                Box::new(SubjectiveBriefPhase::new(Arc::clone(&clock))),
                Box::new(InteractionOrchestrationPhase::new(
                    gateway,
                    Arc::clone(&clock),
                )),
                Box::new(EventIntegrationPhase::new(Arc::clone(&clock))),
                Box::new(NarrativeIntegrationPhase::new(clock)),
            ],
        }
    }

    /// The executor for `phase`, if registered.
    #[must_use]
    pub fn get(&self, phase: PhaseType) -> Option<&dyn PhaseExecutor> {
        self.executors
            .iter()
            .find(|e| e.phase() == phase)
            .map(|e| &**e)
    }

    /// Executors in pipeline order.
    pub fn ordered(&self) -> impl Iterator<Item = &dyn PhaseExecutor> {
        PhaseType::ORDERED
            .into_iter()
            .filter_map(|phase| self.get(phase))
    }

    /// Replaces the executor for `executor.phase()`. Used by hosts and
    /// tests to swap a single phase's behavior without touching the rest
    /// of the table.
    pub fn replace(&mut self, executor: Box<dyn PhaseExecutor>) {
        let phase = executor.phase();
        self.executors.retain(|e| e.phase() != phase);
        self.executors.push(executor);
    }
}
