//! Subjective Brief — per-participant fog-of-war views of the world.

use std::sync::Arc;

use async_trait::async_trait;
use mythweave_core::clock::Clock;
use mythweave_core::error::EngineError;
use mythweave_core::event::{Event, EventSequencer};
use mythweave_core::phase::PhaseType;

use crate::state::PhaseOutcome;

use super::{PhaseContext, PhaseExecutor};

/// The second phase: derives a personalized digest of the updated world
/// for each participant and emits one brief event per participant.
///
/// Read-only with respect to the world: its reversal is the empty list.
pub struct SubjectiveBriefPhase {
    clock: Arc<dyn Clock>,
}

impl SubjectiveBriefPhase {
    /// Creates the phase.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl PhaseExecutor for SubjectiveBriefPhase {
    fn phase(&self) -> PhaseType {
        PhaseType::SubjectiveBrief
    }

    async fn run(&self, ctx: PhaseContext<'_>) -> Result<PhaseOutcome, EngineError> {
        let mut outcome = PhaseOutcome::succeeded(self.phase());

        let world_events: Vec<&Event> = ctx.view.events_with_kind_prefix("world.").collect();
        outcome.events_consumed = world_events.iter().map(|e| e.event_id).collect();

        let world_time: i64 = world_events
            .iter()
            .filter(|e| e.kind == "world.time_advanced")
            .filter_map(|e| e.payload["minutes"].as_i64())
            .sum();

        // One brief per participant; the participant id salts the digest so
        // no two briefs are byte-identical even over the same world delta.
        for participant in ctx.participants {
            outcome.events_generated.push(Event::record(
                ctx.view.turn_id,
                "brief.issued",
                serde_json::json!({
                    "participant": participant,
                    "visible_events": world_events.len(),
                    "world_time_minutes": world_time,
                    "perspective": participant.as_uuid().simple().to_string(),
                }),
                ctx.view.sequencer,
                self.clock.as_ref(),
            ));
        }

        Ok(outcome)
    }

    fn reverse(
        &self,
        _outcome: &PhaseOutcome,
        _sequencer: &EventSequencer,
        _clock: &dyn Clock,
    ) -> Result<Vec<Event>, EngineError> {
        // Briefs have no observable external effect; nothing to undo.
        Ok(Vec::new())
    }
}
