//! Narrative Integration — structured guidance from the turn's events.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use mythweave_core::clock::Clock;
use mythweave_core::error::EngineError;
use mythweave_core::event::{Event, EventSequencer};
use mythweave_core::phase::PhaseType;

use crate::config::NarrativeDepth;
use crate::state::PhaseOutcome;

use super::{PhaseContext, PhaseExecutor};

/// The fifth phase: summarizes the turn's committed events into structured
/// narrative guidance metadata. Prose generation belongs to an external
/// collaborator; this phase only computes the guidance it would consume.
pub struct NarrativeIntegrationPhase {
    clock: Arc<dyn Clock>,
}

impl NarrativeIntegrationPhase {
    /// Creates the phase.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl PhaseExecutor for NarrativeIntegrationPhase {
    fn phase(&self) -> PhaseType {
        PhaseType::NarrativeIntegration
    }

    async fn run(&self, ctx: PhaseContext<'_>) -> Result<PhaseOutcome, EngineError> {
        let mut outcome = PhaseOutcome::succeeded(self.phase());
        outcome.events_consumed = ctx.view.events.iter().map(|e| e.event_id).collect();

        let committed: Vec<&Event> = ctx
            .view
            .events_with_kind_prefix("integration.action_committed")
            .collect();
        let world_shifts = ctx.view.events_with_kind_prefix("world.").count();

        // Dominant action: most frequent verb, ties broken alphabetically.
        let mut verb_counts: BTreeMap<String, usize> = BTreeMap::new();
        for event in &committed {
            if let Some(verb) = event.payload["action"].as_str() {
                *verb_counts.entry(verb.to_owned()).or_default() += 1;
            }
        }
        let dominant_action = verb_counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(verb, _)| verb.clone());

        let mut guidance = serde_json::json!({
            "beats": committed.len(),
            "world_shifts": world_shifts,
            "dominant_action": dominant_action,
            "turn_complete": true,
        });

        if ctx.config.narrative_depth == NarrativeDepth::Detailed {
            let mut activity: BTreeMap<String, usize> = BTreeMap::new();
            for event in &committed {
                let actor = event.payload["actor"].to_string();
                *activity.entry(actor).or_default() += 1;
            }
            guidance["participant_activity"] = serde_json::json!(activity);
        }

        outcome.events_generated.push(Event::record(
            ctx.view.turn_id,
            "narrative.guidance",
            guidance,
            ctx.view.sequencer,
            self.clock.as_ref(),
        ));

        Ok(outcome)
    }

    fn reverse(
        &self,
        outcome: &PhaseOutcome,
        sequencer: &EventSequencer,
        clock: &dyn Clock,
    ) -> Result<Vec<Event>, EngineError> {
        outcome
            .events_generated
            .iter()
            .map(|event| match event.kind.as_str() {
                "narrative.guidance" => Ok(Event::compensating(
                    event,
                    "narrative.guidance_withdrawn",
                    serde_json::Value::Null,
                    sequencer,
                    clock,
                )),
                other => Err(EngineError::CompensationGap {
                    phase: self.phase(),
                    reason: format!("no reversal for event kind {other}"),
                }),
            })
            .collect()
    }
}
