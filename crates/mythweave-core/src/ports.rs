//! Ports the engine consumes and exposes.
//!
//! The engine never talks to an LLM backend, a repository, or a metrics
//! exporter directly; it goes through the traits here, which hosts
//! implement at the process boundary.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;
use crate::participant::{Briefing, Decision, ParticipantId};
use crate::phase::PhaseType;

/// A decision returned by a gateway, with the AI cost it incurred.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayDecision {
    /// The participant's resolved decision.
    pub decision: Decision,
    /// Cost (currency units) incurred producing this decision.
    pub cost: f64,
}

/// Abstracts one participant's decision-making call.
///
/// Implementations may be AI-backed or purely local. Errors from this port
/// degrade to a default `wait` decision in the calling phase; the one
/// exception is [`EngineError::BudgetExceeded`], which is fatal to the
/// phase.
#[async_trait]
pub trait ParticipantGateway: Send + Sync {
    /// Solicits a decision for `participant` given its briefing.
    async fn decide(
        &self,
        participant: ParticipantId,
        briefing: &Briefing,
    ) -> Result<GatewayDecision, EngineError>;
}

/// Turn-scoped AI spend accounting.
///
/// Shared across the concurrent gateway calls of a single phase. A caller
/// reserves a declared per-call cost before issuing its gateway call and
/// settles to the actual cost when the call returns, so the cap check and
/// the reservation are one atomic step: recorded spend can overshoot the
/// cap by at most one call's declared cost.
#[derive(Debug, Default)]
pub struct CostLedger {
    inner: Mutex<Balances>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Balances {
    spent: f64,
    reserved: f64,
}

impl CostLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // The guarded data is a pair of plain counters; a poisoned guard still
    // holds usable balances, so recover it instead of panicking.
    fn lock(&self) -> MutexGuard<'_, Balances> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records `cost` against the ledger and returns the new total.
    pub fn charge(&self, cost: f64) -> f64 {
        let mut balances = self.lock();
        balances.spent += cost;
        balances.spent
    }

    /// Atomically checks `cap` and reserves `estimate` against it. Returns
    /// `false`, reserving nothing, once spend plus outstanding reservations
    /// has reached the cap.
    #[must_use]
    pub fn reserve(&self, estimate: f64, cap: f64) -> bool {
        let mut balances = self.lock();
        if balances.spent + balances.reserved >= cap {
            return false;
        }
        balances.reserved += estimate;
        true
    }

    /// Settles a reservation: releases `estimate` and records the call's
    /// `actual` cost (zero for calls that failed or timed out).
    pub fn settle(&self, estimate: f64, actual: f64) {
        let mut balances = self.lock();
        balances.reserved -= estimate;
        balances.spent += actual;
    }

    /// Returns the total spend recorded so far, excluding reservations.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.lock().spent
    }

    /// Whether spend plus outstanding reservations has reached `cap`.
    #[must_use]
    pub fn exhausted(&self, cap: f64) -> bool {
        let balances = self.lock();
        balances.spent + balances.reserved >= cap
    }
}

/// Lifecycle status carried on a phase-transition event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionStatus {
    /// The phase has started executing.
    Started,
    /// The phase completed successfully.
    Completed,
    /// The phase failed.
    Failed,
    /// Compensation was triggered after this phase's failure.
    CompensationTriggered,
    /// The turn finished; this transition carries the turn totals.
    TurnFinished,
}

/// Structured event emitted at every phase transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    /// The turn this transition belongs to.
    pub turn_id: Uuid,
    /// The phase transitioning, absent for the turn-summary transition.
    pub phase: Option<PhaseType>,
    /// What happened.
    pub status: TransitionStatus,
    /// Wall-clock duration attributed to this transition, in milliseconds.
    pub duration_ms: u64,
    /// AI cost attributed to this transition.
    pub ai_cost: f64,
    /// Number of events attributed to this transition.
    pub event_count: usize,
}

/// Sink for phase-transition events.
///
/// Export and storage of these signals belong to the host; the engine only
/// emits them.
pub trait ObservabilitySink: Send + Sync {
    /// Receives one transition event.
    fn emit(&self, transition: &PhaseTransition);
}

/// Sink that discards every transition. The default when a host wires no
/// observability.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ObservabilitySink for NullSink {
    fn emit(&self, _transition: &PhaseTransition) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_accumulates_additively() {
        let ledger = CostLedger::new();
        ledger.charge(0.03);
        let total = ledger.charge(0.02);
        assert!((total - 0.05).abs() < f64::EPSILON);
        assert!((ledger.total() - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn test_ledger_exhaustion_at_cap() {
        let ledger = CostLedger::new();
        assert!(!ledger.exhausted(0.01));
        ledger.charge(0.01);
        assert!(ledger.exhausted(0.01));
    }

    #[test]
    fn test_reserve_is_atomic_with_the_cap_check() {
        let ledger = CostLedger::new();
        assert!(ledger.reserve(0.05, 0.01));
        // The outstanding reservation blocks concurrent callers even
        // though nothing has been charged yet.
        assert!(!ledger.reserve(0.05, 0.01));
        assert!(ledger.exhausted(0.01));
        ledger.settle(0.05, 0.0);
        assert!(!ledger.exhausted(0.01));
    }

    #[test]
    fn test_settle_replaces_the_estimate_with_actual_cost() {
        let ledger = CostLedger::new();
        assert!(ledger.reserve(0.05, 1.0));
        ledger.settle(0.05, 0.02);
        assert!((ledger.total() - 0.02).abs() < f64::EPSILON);
        assert!(ledger.reserve(0.05, 1.0));
    }

    #[test]
    fn test_ledger_survives_a_poisoned_lock() {
        let ledger = std::sync::Arc::new(CostLedger::new());
        let poisoner = std::sync::Arc::clone(&ledger);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.inner.lock().unwrap();
            panic!("poison the ledger");
        })
        .join();

        ledger.charge(0.02);
        assert!((ledger.total() - 0.02).abs() < f64::EPSILON);
    }
}
