//! Pipeline phase identifiers.

use serde::{Deserialize, Serialize};

/// The five fixed phases of a turn, in execution order.
///
/// The engine drives these strictly sequentially; the discriminant order
/// here is the canonical pipeline order and `ORDERED` is the single source
/// of truth for the driving loop and for compensation (which walks it
/// backwards).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseType {
    /// Advances simulated time and applies ambient world changes.
    WorldUpdate,
    /// Derives a per-participant fog-of-war view of the world.
    SubjectiveBrief,
    /// Solicits and resolves participant decisions.
    InteractionOrchestration,
    /// Merges action events into a deduplicated, consistent set.
    EventIntegration,
    /// Summarizes the turn into structured narrative guidance.
    NarrativeIntegration,
}

impl PhaseType {
    /// Canonical pipeline order.
    pub const ORDERED: [PhaseType; 5] = [
        PhaseType::WorldUpdate,
        PhaseType::SubjectiveBrief,
        PhaseType::InteractionOrchestration,
        PhaseType::EventIntegration,
        PhaseType::NarrativeIntegration,
    ];

    /// Stable snake_case name used in logs, metrics, and event kinds.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            PhaseType::WorldUpdate => "world_update",
            PhaseType::SubjectiveBrief => "subjective_brief",
            PhaseType::InteractionOrchestration => "interaction_orchestration",
            PhaseType::EventIntegration => "event_integration",
            PhaseType::NarrativeIntegration => "narrative_integration",
        }
    }
}

impl std::fmt::Display for PhaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
