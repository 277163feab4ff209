//! Participant identity and decision types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier for one simulation participant.
///
/// Ordering is total and stable; the engine uses "lowest id wins" as its
/// deterministic tie-break when decisions conflict.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ParticipantId(Uuid);

impl ParticipantId {
    /// Creates a fresh random participant id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ParticipantId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A single participant's resolved intent for this turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// The participant this decision belongs to.
    pub participant: ParticipantId,
    /// Free-form action verb ("wait", "parley", "strike", ...). Opaque to
    /// the orchestrator; phases only compare verbs for equality.
    pub action: String,
    /// The participant this action is directed at, if any.
    pub target: Option<ParticipantId>,
}

impl Decision {
    /// The deterministic fallback decision used when a gateway call fails,
    /// times out, or is skipped for budget reasons.
    #[must_use]
    pub fn wait(participant: ParticipantId, target: Option<ParticipantId>) -> Self {
        Self {
            participant,
            action: "wait".to_owned(),
            target,
        }
    }

    /// Whether this is the passive fallback decision.
    #[must_use]
    pub fn is_wait(&self) -> bool {
        self.action == "wait"
    }
}

/// The fog-of-war context handed to a gateway for one decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Briefing {
    /// The participant being asked to decide.
    pub participant: ParticipantId,
    /// The counterpart in this interaction opportunity.
    pub counterpart: ParticipantId,
    /// Participant-specific digest of the committed world events.
    pub world_digest: serde_json::Value,
    /// Sampling temperature the backing model should use.
    pub temperature: f64,
}
