//! Per-turn configuration and precondition validation.

use mythweave_core::error::EngineError;
use mythweave_core::participant::ParticipantId;
use serde::{Deserialize, Serialize};

/// How much structure the Narrative Integration phase produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeDepth {
    /// Beat counts and the dominant action only.
    #[default]
    Basic,
    /// Adds a per-participant activity breakdown.
    Detailed,
}

/// Immutable configuration supplied for one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnConfiguration {
    /// Simulated minutes the World Update phase advances time by.
    pub world_time_advance_minutes: i64,
    /// Whether participant decisions go through the AI gateway at all.
    pub ai_integration_enabled: bool,
    /// Narrative analysis depth.
    pub narrative_depth: NarrativeDepth,
    /// Maximum AI spend for the whole turn, in currency units.
    pub max_ai_cost: f64,
    /// Declared worst-case cost of one gateway call, reserved against the
    /// budget before the call is issued and settled to the actual cost
    /// when it returns.
    pub estimated_call_cost: f64,
    /// Sampling temperature passed through to the gateway.
    pub ai_temperature: f64,
    /// Wall-clock budget for the whole turn, in milliseconds.
    pub max_execution_time_ms: u64,
    /// Abort without compensation on the first phase failure.
    pub fail_fast_on_phase_failure: bool,
    /// Maximum number of participants a turn may carry.
    pub max_participants: usize,
    /// Bound on concurrent gateway calls within a phase.
    pub max_concurrent_operations: usize,
    /// Whether the World Update phase may emit temporal-flux changes.
    pub allow_time_manipulation: bool,
    /// Deadline for a single gateway decision call, in milliseconds.
    pub negotiation_timeout_ms: u64,
}

impl Default for TurnConfiguration {
    fn default() -> Self {
        Self {
            world_time_advance_minutes: 60,
            ai_integration_enabled: false,
            narrative_depth: NarrativeDepth::Basic,
            max_ai_cost: 1.0,
            estimated_call_cost: 0.05,
            ai_temperature: 0.7,
            max_execution_time_ms: 30_000,
            fail_fast_on_phase_failure: false,
            max_participants: 5,
            max_concurrent_operations: 4,
            allow_time_manipulation: false,
            negotiation_timeout_ms: 5_000,
        }
    }
}

impl TurnConfiguration {
    /// Validates this configuration against the participant set.
    ///
    /// Checks every precondition and reports all violations at once, so a
    /// caller can correct its input in a single pass.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] listing every violated
    /// precondition.
    pub fn validate(&self, participants: &[ParticipantId]) -> Result<(), EngineError> {
        let mut violations = Vec::new();

        if participants.is_empty() {
            violations.push("participants must be non-empty".to_owned());
        }
        if participants.len() > self.max_participants {
            violations.push(format!(
                "{} participants exceed max_participants {}",
                participants.len(),
                self.max_participants
            ));
        }
        if self.world_time_advance_minutes < 0 {
            violations.push(format!(
                "world_time_advance_minutes must be non-negative, got {}",
                self.world_time_advance_minutes
            ));
        }
        if self.max_ai_cost < 0.0 {
            violations.push(format!(
                "max_ai_cost must be non-negative, got {}",
                self.max_ai_cost
            ));
        }
        if self.ai_integration_enabled && self.max_ai_cost <= 0.0 {
            violations.push(
                "max_ai_cost must be positive when ai_integration_enabled is set".to_owned(),
            );
        }
        if self.ai_integration_enabled && self.estimated_call_cost <= 0.0 {
            violations.push(
                "estimated_call_cost must be positive when ai_integration_enabled is set"
                    .to_owned(),
            );
        }
        if self.ai_temperature < 0.0 {
            violations.push(format!(
                "ai_temperature must be non-negative, got {}",
                self.ai_temperature
            ));
        }
        if self.max_concurrent_operations == 0 {
            violations.push("max_concurrent_operations must be at least 1".to_owned());
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Validation { violations })
        }
    }
}
