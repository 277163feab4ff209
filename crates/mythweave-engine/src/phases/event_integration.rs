//! Event Integration — merges action events into a consistent set.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use mythweave_core::clock::Clock;
use mythweave_core::error::EngineError;
use mythweave_core::event::{Event, EventSequencer};
use mythweave_core::phase::PhaseType;

use crate::state::PhaseOutcome;

use super::{PhaseContext, PhaseExecutor};

/// The fourth phase: deduplicates action events (the same logical effect
/// proposed twice collapses into one committed event) and flags
/// contradictions as warnings rather than failing.
pub struct EventIntegrationPhase {
    clock: Arc<dyn Clock>,
}

impl EventIntegrationPhase {
    /// Creates the phase.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// The logical identity of an action: actor, verb, target.
    fn logical_key(event: &Event) -> (String, String, String) {
        (
            event.payload["actor"].to_string(),
            event.payload["action"].to_string(),
            event.payload["target"].to_string(),
        )
    }
}

#[async_trait]
impl PhaseExecutor for EventIntegrationPhase {
    fn phase(&self) -> PhaseType {
        PhaseType::EventIntegration
    }

    async fn run(&self, ctx: PhaseContext<'_>) -> Result<PhaseOutcome, EngineError> {
        let mut outcome = PhaseOutcome::succeeded(self.phase());

        let actions: Vec<&Event> = ctx
            .view
            .events_with_kind_prefix("interaction.action")
            .collect();
        outcome.events_consumed = actions.iter().map(|e| e.event_id).collect();

        // Group by logical identity; BTreeMap keeps commit order
        // deterministic regardless of arrival order.
        let mut groups: BTreeMap<(String, String, String), Vec<&Event>> = BTreeMap::new();
        for action in actions {
            groups.entry(Self::logical_key(action)).or_default().push(action);
        }

        // Contradiction check: one actor/target pairing proposing more
        // than one verb.
        let mut verbs_by_pairing: BTreeMap<(String, String), Vec<String>> = BTreeMap::new();
        for (actor, verb, target) in groups.keys() {
            verbs_by_pairing
                .entry((actor.clone(), target.clone()))
                .or_default()
                .push(verb.clone());
        }
        for ((actor, target), verbs) in verbs_by_pairing {
            if verbs.len() > 1 {
                outcome.warnings.push(format!(
                    "contradictory actions from {actor} toward {target}: {}",
                    verbs.join(", ")
                ));
            }
        }

        for (_key, sources) in groups {
            let canonical = sources[0];
            let source_ids: Vec<_> = sources.iter().map(|e| e.event_id).collect();
            if sources.len() > 1 {
                outcome.warnings.push(format!(
                    "collapsed {} duplicate proposals of {}",
                    sources.len(),
                    canonical.payload["action"]
                ));
            }
            outcome.events_generated.push(Event::record(
                ctx.view.turn_id,
                "integration.action_committed",
                serde_json::json!({
                    "actor": canonical.payload["actor"],
                    "action": canonical.payload["action"],
                    "target": canonical.payload["target"],
                    "sources": source_ids,
                }),
                ctx.view.sequencer,
                self.clock.as_ref(),
            ));
        }

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
                "integration.action_committed" => Ok(Event::compensating(
                    event,
                    "integration.action_reverted",
                    serde_json::json!({
                        "actor": event.payload["actor"],
                        "action": event.payload["action"],
                        "target": event.payload["target"],
                    }),
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
