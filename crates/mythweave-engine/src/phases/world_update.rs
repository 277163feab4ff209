//! World Update — advances simulated time and applies ambient changes.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use mythweave_core::clock::Clock;
use mythweave_core::error::EngineError;
use mythweave_core::event::{Event, EventSequencer};
use mythweave_core::phase::PhaseType;
use mythweave_core::rng::DeterministicRng;

use crate::state::PhaseOutcome;

use super::{PhaseContext, PhaseExecutor};

/// Chance of an ambient world shift accompanying the time advance.
const AMBIENT_SHIFT_CHANCE: f64 = 0.35;

/// Ambient aspects the world may shift, indexed by RNG draw.
const AMBIENT_ASPECTS: [&str; 3] = ["weather", "omen", "wildlife"];

/// The first phase: advances world time by the configured amount and emits
/// world-delta events. Completes even with zero participants.
pub struct WorldUpdatePhase {
    clock: Arc<dyn Clock>,
    rng: Mutex<Box<dyn DeterministicRng>>,
}

impl WorldUpdatePhase {
    /// Creates the phase with its time source and ambient-change RNG.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, rng: Box<dyn DeterministicRng>) -> Self {
        Self {
            clock,
            rng: Mutex::new(rng),
        }
    }
}

#[async_trait]
impl PhaseExecutor for WorldUpdatePhase {
    fn phase(&self) -> PhaseType {
        PhaseType::WorldUpdate
    }

    async fn run(&self, ctx: PhaseContext<'_>) -> Result<PhaseOutcome, EngineError> {
        let mut outcome = PhaseOutcome::succeeded(self.phase());
        let turn_id = ctx.view.turn_id;

        outcome.events_generated.push(Event::record(
            turn_id,
            "world.time_advanced",
            serde_json::json!({ "minutes": ctx.config.world_time_advance_minutes }),
            ctx.view.sequencer,
            self.clock.as_ref(),
        ));

        let (shift_roll, aspect_index, flux_minutes) = {
            // The generator carries no invariant a panic could break;
            // recover a poisoned guard like the ledger and tracker do.
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            (
                rng.next_f64(),
                rng.next_u32_range(0, (AMBIENT_ASPECTS.len() - 1) as u32),
                rng.next_u32_range(1, 15),
            )
        };

        if shift_roll < AMBIENT_SHIFT_CHANCE {
            outcome.events_generated.push(Event::record(
                turn_id,
                "world.ambient_shift",
                serde_json::json!({
                    "aspect": AMBIENT_ASPECTS[aspect_index as usize],
                }),
                ctx.view.sequencer,
                self.clock.as_ref(),
            ));
        }

        if ctx.config.allow_time_manipulation {
            outcome.events_generated.push(Event::record(
                turn_id,
                "world.temporal_flux",
                serde_json::json!({ "drift_minutes": i64::from(flux_minutes) }),
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
        let mut reversals = Vec::with_capacity(outcome.events_generated.len());
        for event in &outcome.events_generated {
            let reversal = match event.kind.as_str() {
                "world.time_advanced" => {
                    let minutes = event.payload["minutes"].as_i64().unwrap_or(0);
                    Event::compensating(
                        event,
                        "world.time_reversed",
                        serde_json::json!({ "minutes": -minutes }),
                        sequencer,
                        clock,
                    )
                }
                "world.ambient_shift" => Event::compensating(
                    event,
                    "world.ambient_restored",
                    serde_json::json!({ "aspect": event.payload["aspect"] }),
                    sequencer,
                    clock,
                ),
                "world.temporal_flux" => {
                    let drift = event.payload["drift_minutes"].as_i64().unwrap_or(0);
                    Event::compensating(
                        event,
                        "world.temporal_flux_reversed",
                        serde_json::json!({ "drift_minutes": -drift }),
                        sequencer,
                        clock,
                    )
                }
                other => {
                    return Err(EngineError::CompensationGap {
                        phase: self.phase(),
                        reason: format!("no reversal for event kind {other}"),
                    });
                }
            };
            reversals.push(reversal);
        }
        Ok(reversals)
    }
}
