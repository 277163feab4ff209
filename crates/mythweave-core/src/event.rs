//! Append-only turn events.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;

/// An immutable record of something that happened during a turn.
///
/// Events are append-only: once committed to turn state they are never
/// mutated or deleted, only compensated by appending a new event whose
/// `compensates` field names the original. The kind string routes
/// interpretation ("world.time_advanced", "interaction.action", ...); the
/// payload is opaque to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// The turn this event belongs to.
    pub turn_id: Uuid,
    /// Dotted kind string routing interpretation to the producing phase.
    pub kind: String,
    /// Phase-interpreted payload, opaque to the orchestrator.
    pub payload: serde_json::Value,
    /// Monotonically increasing sequence number within the turn, assigned
    /// in the order the producing call returned.
    pub sequence: u64,
    /// Timestamp of event creation.
    pub occurred_at: DateTime<Utc>,
    /// For compensating events, the id of the event being reversed.
    pub compensates: Option<Uuid>,
}

impl Event {
    /// Records a new event, drawing the next sequence number from `seq`.
    #[must_use]
    pub fn record(
        turn_id: Uuid,
        kind: impl Into<String>,
        payload: serde_json::Value,
        seq: &EventSequencer,
        clock: &dyn Clock,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            turn_id,
            kind: kind.into(),
            payload,
            sequence: seq.next(),
            occurred_at: clock.now(),
            compensates: None,
        }
    }

    /// Records a compensating event that reverses `original`.
    #[must_use]
    pub fn compensating(
        original: &Event,
        kind: impl Into<String>,
        payload: serde_json::Value,
        seq: &EventSequencer,
        clock: &dyn Clock,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            turn_id: original.turn_id,
            kind: kind.into(),
            payload,
            sequence: seq.next(),
            occurred_at: clock.now(),
            compensates: Some(original.event_id),
        }
    }
}

/// Allocator for per-turn event sequence numbers.
///
/// Sequence numbers start at 1 and reflect completion order: concurrent
/// producers draw a number when their result lands, not when the call was
/// issued.
#[derive(Debug, Default)]
pub struct EventSequencer {
    next: AtomicU64,
}

impl EventSequencer {
    /// Creates a sequencer starting at 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(0),
        }
    }

    /// Returns the next sequence number.
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Returns how many sequence numbers have been handed out.
    #[must_use]
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}
