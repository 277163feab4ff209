//! Test gateways — deterministic `ParticipantGateway` doubles.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use mythweave_core::error::EngineError;
use mythweave_core::participant::{Briefing, Decision, ParticipantId};
use mythweave_core::ports::{GatewayDecision, ParticipantGateway};

/// A gateway that replays scripted responses per participant and falls
/// back to a zero-cost `wait` decision when a participant's script runs
/// out.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    scripts: Mutex<HashMap<ParticipantId, VecDeque<GatewayDecision>>>,
}

impl ScriptedGateway {
    /// Creates a gateway with no scripts; every decision is a free wait.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues one response for `participant`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn respond(
        &self,
        participant: ParticipantId,
        action: &str,
        target: Option<ParticipantId>,
        cost: f64,
    ) {
        self.scripts
            .lock()
            .unwrap()
            .entry(participant)
            .or_default()
            .push_back(GatewayDecision {
                decision: Decision {
                    participant,
                    action: action.to_owned(),
                    target,
                },
                cost,
            });
    }
}

#[async_trait]
impl ParticipantGateway for ScriptedGateway {
    async fn decide(
        &self,
        participant: ParticipantId,
        briefing: &Briefing,
    ) -> Result<GatewayDecision, EngineError> {
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&participant)
            .and_then(VecDeque::pop_front);
        Ok(scripted.unwrap_or_else(|| GatewayDecision {
            decision: Decision::wait(participant, Some(briefing.counterpart)),
            cost: 0.0,
        }))
    }
}

/// A gateway where every participant answers with the same action at the
/// same cost. Used for budget-exhaustion scenarios.
#[derive(Debug)]
pub struct FlatGateway {
    action: String,
    cost: f64,
}

impl FlatGateway {
    /// Creates the gateway.
    #[must_use]
    pub fn new(action: &str, cost: f64) -> Self {
        Self {
            action: action.to_owned(),
            cost,
        }
    }
}

#[async_trait]
impl ParticipantGateway for FlatGateway {
    async fn decide(
        &self,
        participant: ParticipantId,
        briefing: &Briefing,
    ) -> Result<GatewayDecision, EngineError> {
        Ok(GatewayDecision {
            decision: Decision {
                participant,
                action: self.action.clone(),
                target: Some(briefing.counterpart),
            },
            cost: self.cost,
        })
    }
}

#[derive(Debug, Clone)]
enum FailureMode {
    Unreachable,
    OverBudget { spent: f64, cap: f64 },
}

/// A gateway that always fails. `unreachable` yields an ordinary gateway
/// error (recovered by fallback); `over_budget` yields the one error that
/// is fatal to a phase.
#[derive(Debug)]
pub struct FailingGateway {
    mode: FailureMode,
}

impl FailingGateway {
    /// Always returns a transport-style gateway error.
    #[must_use]
    pub fn unreachable() -> Self {
        Self {
            mode: FailureMode::Unreachable,
        }
    }

    /// Always returns a budget-exceeded error.
    #[must_use]
    pub fn over_budget(spent: f64, cap: f64) -> Self {
        Self {
            mode: FailureMode::OverBudget { spent, cap },
        }
    }
}

#[async_trait]
impl ParticipantGateway for FailingGateway {
    async fn decide(
        &self,
        participant: ParticipantId,
        _briefing: &Briefing,
    ) -> Result<GatewayDecision, EngineError> {
        match self.mode {
            FailureMode::Unreachable => Err(EngineError::Gateway {
                participant,
                reason: "connection refused".to_owned(),
            }),
            FailureMode::OverBudget { spent, cap } => {
                Err(EngineError::BudgetExceeded { spent, cap })
            }
        }
    }
}

/// A gateway that sleeps before answering. Used to exercise negotiation
/// and turn deadlines.
#[derive(Debug)]
pub struct SlowGateway {
    delay: Duration,
    cost: f64,
}

impl SlowGateway {
    /// Creates a gateway that waits `delay_ms` before every answer.
    #[must_use]
    pub fn new(delay_ms: u64, cost: f64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            cost,
        }
    }
}

#[async_trait]
impl ParticipantGateway for SlowGateway {
    async fn decide(
        &self,
        participant: ParticipantId,
        briefing: &Briefing,
    ) -> Result<GatewayDecision, EngineError> {
        tokio::time::sleep(self.delay).await;
        Ok(GatewayDecision {
            decision: Decision {
                participant,
                action: "ponder".to_owned(),
                target: Some(briefing.counterpart),
            },
            cost: self.cost,
        })
    }
}
