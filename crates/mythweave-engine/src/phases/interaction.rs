//! Interaction Orchestration — solicits and resolves participant decisions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mythweave_core::clock::Clock;
use mythweave_core::error::{EngineError, ErrorDetail};
use mythweave_core::event::{Event, EventSequencer};
use mythweave_core::participant::{Briefing, Decision, ParticipantId};
use mythweave_core::phase::PhaseType;
use mythweave_core::ports::{CostLedger, ParticipantGateway};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::state::PhaseOutcome;

use super::{PhaseContext, PhaseExecutor};

/// Why a participant's decision fell back to the default.
#[derive(Debug, Clone)]
enum FallbackReason {
    BudgetExhausted { spent: f64, cap: f64 },
    Gateway(String),
    Timeout(u64),
}

/// One member's decision, with the fallback reason if the gateway call did
/// not produce it.
#[derive(Debug, Clone)]
struct MemberDecision {
    decision: Decision,
    fallback: Option<FallbackReason>,
}

/// Both members' decisions for one interaction opportunity.
#[derive(Debug)]
struct PairDecisions {
    lower: MemberDecision,
    higher: MemberDecision,
}

/// The third phase: forms participant pairs, obtains a decision from each
/// member (AI-backed or local fallback), resolves conflicts
/// deterministically, and emits one action event per pair.
///
/// Gateway calls run concurrently, bounded by
/// `max_concurrent_operations`; all calls complete or individually time
/// out before the outcome is assembled.
pub struct InteractionOrchestrationPhase {
    gateway: Arc<dyn ParticipantGateway>,
    clock: Arc<dyn Clock>,
}

impl InteractionOrchestrationPhase {
    /// Creates the phase over its decision gateway.
    #[must_use]
    pub fn new(gateway: Arc<dyn ParticipantGateway>, clock: Arc<dyn Clock>) -> Self {
        Self { gateway, clock }
    }

    /// All unordered participant pairs, each ordered lower id first.
    fn pairs(participants: &[ParticipantId]) -> Vec<(ParticipantId, ParticipantId)> {
        let mut sorted: Vec<ParticipantId> = participants.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        let mut pairs = Vec::new();
        for (i, &a) in sorted.iter().enumerate() {
            for &b in &sorted[i + 1..] {
                pairs.push((a, b));
            }
        }
        pairs
    }

    /// Resolves two decisions into the pair's action. A non-wait decision
    /// beats a wait decision; remaining conflicts go to the lowest
    /// participant id.
    fn resolve(pair: &PairDecisions) -> (Decision, ParticipantId) {
        let lower = &pair.lower.decision;
        let higher = &pair.higher.decision;
        if lower.is_wait() && !higher.is_wait() {
            (higher.clone(), lower.participant)
        } else {
            (lower.clone(), higher.participant)
        }
    }
}

/// Turn-level settings one gateway call runs under.
#[derive(Debug, Clone)]
struct CallSettings {
    phase: PhaseType,
    ai_enabled: bool,
    cap: f64,
    call_estimate: f64,
    temperature: f64,
    negotiation: Duration,
}

/// Obtains one member's decision, degrading to `wait` on gateway errors,
/// per-call timeouts, and budget exhaustion. A gateway-raised budget error
/// is the one fatal case.
async fn decide_member(
    gateway: &Arc<dyn ParticipantGateway>,
    ledger: &CostLedger,
    semaphore: &Semaphore,
    settings: &CallSettings,
    participant: ParticipantId,
    counterpart: ParticipantId,
    world_digest: serde_json::Value,
) -> Result<MemberDecision, EngineError> {
    let fallback = |reason: FallbackReason| MemberDecision {
        decision: Decision::wait(participant, Some(counterpart)),
        fallback: Some(reason),
    };

    if !settings.ai_enabled {
        return Ok(MemberDecision {
            decision: Decision::wait(participant, Some(counterpart)),
            fallback: None,
        });
    }
    if ledger.exhausted(settings.cap) {
        return Ok(fallback(FallbackReason::BudgetExhausted {
            spent: ledger.total(),
            cap: settings.cap,
        }));
    }

    let permit = semaphore
        .acquire()
        .await
        .map_err(|_| EngineError::PhaseExecution {
            phase: settings.phase,
            reason: "gateway semaphore closed".to_owned(),
        })?;
    // Check and reserve in one atomic step; spend may have moved while we
    // waited for a permit, and concurrent permit-holders must not all
    // slip past the cap before any charge lands.
    if !ledger.reserve(settings.call_estimate, settings.cap) {
        return Ok(fallback(FallbackReason::BudgetExhausted {
            spent: ledger.total(),
            cap: settings.cap,
        }));
    }

    let briefing = Briefing {
        participant,
        counterpart,
        world_digest,
        temperature: settings.temperature,
    };
    let result =
        tokio::time::timeout(settings.negotiation, gateway.decide(participant, &briefing)).await;
    drop(permit);

    match result {
        Err(_) => {
            ledger.settle(settings.call_estimate, 0.0);
            #[allow(clippy::cast_possible_truncation)]
            let elapsed_ms = settings.negotiation.as_millis() as u64;
            Ok(fallback(FallbackReason::Timeout(elapsed_ms)))
        }
        Ok(Err(err @ EngineError::BudgetExceeded { .. })) => {
            ledger.settle(settings.call_estimate, 0.0);
            Err(err)
        }
        Ok(Err(err)) => {
            ledger.settle(settings.call_estimate, 0.0);
            Ok(fallback(FallbackReason::Gateway(err.to_string())))
        }
        Ok(Ok(answer)) => {
            ledger.settle(settings.call_estimate, answer.cost);
            Ok(MemberDecision {
                decision: answer.decision,
                fallback: None,
            })
        }
    }
}

#[async_trait]
impl PhaseExecutor for InteractionOrchestrationPhase {
    fn phase(&self) -> PhaseType {
        PhaseType::InteractionOrchestration
    }

    async fn run(&self, ctx: PhaseContext<'_>) -> Result<PhaseOutcome, EngineError> {
        let phase = self.phase();
        let mut outcome = PhaseOutcome::succeeded(phase);
        outcome.events_consumed = ctx
            .view
            .events_with_kind_prefix("brief.")
            .map(|e| e.event_id)
            .collect();

        let pairs = Self::pairs(ctx.participants);
        if pairs.is_empty() {
            // Single participant or empty set: no interaction opportunity.
            return Ok(outcome);
        }

        let spend_before = ctx.ledger.total();
        let semaphore = Arc::new(Semaphore::new(ctx.config.max_concurrent_operations));
        let world_digest = serde_json::json!({
            "committed_events": ctx.view.events.len(),
            "turn_number": ctx.view.turn_number,
        });

        let mut join_set: JoinSet<Result<((ParticipantId, ParticipantId), PairDecisions), EngineError>> =
            JoinSet::new();
        let settings = CallSettings {
            phase,
            ai_enabled: ctx.config.ai_integration_enabled,
            cap: ctx.config.max_ai_cost,
            call_estimate: ctx.config.estimated_call_cost,
            temperature: ctx.config.ai_temperature,
            negotiation: Duration::from_millis(ctx.config.negotiation_timeout_ms),
        };
        for (lower_id, higher_id) in pairs {
            let gateway = Arc::clone(&self.gateway);
            let ledger = Arc::clone(ctx.ledger);
            let semaphore = Arc::clone(&semaphore);
            let digest = world_digest.clone();
            let settings = settings.clone();
            join_set.spawn(async move {
                let lower = decide_member(
                    &gateway,
                    &ledger,
                    &semaphore,
                    &settings,
                    lower_id,
                    higher_id,
                    digest.clone(),
                )
                .await?;
                let higher = decide_member(
                    &gateway,
                    &ledger,
                    &semaphore,
                    &settings,
                    higher_id,
                    lower_id,
                    digest,
                )
                .await?;
                Ok(((lower_id, higher_id), PairDecisions { lower, higher }))
            });
        }

        // Drain in completion order; sequence numbers follow the order
        // results land, not the order pairs were spawned. A fatal error
        // drops the set, aborting still-running siblings.
        while let Some(joined) = join_set.join_next().await {
            let (pair_ids, decisions) = match joined {
                Ok(Ok(resolved)) => resolved,
                Ok(Err(err)) => return Err(err),
                Err(join_err) => {
                    return Err(EngineError::PhaseExecution {
                        phase,
                        reason: format!("pair task failed: {join_err}"),
                    });
                }
            };

            for member in [&decisions.lower, &decisions.higher] {
                match &member.fallback {
                    None => {}
                    Some(FallbackReason::BudgetExhausted { spent, cap }) => {
                        outcome.warnings.push(format!(
                            "participant {} fell back to wait: budget exhausted",
                            member.decision.participant
                        ));
                        if outcome.error_detail.is_none() {
                            outcome.error_detail = Some(ErrorDetail::from(
                                &EngineError::BudgetExceeded {
                                    spent: *spent,
                                    cap: *cap,
                                },
                            ));
                        }
                    }
                    Some(FallbackReason::Gateway(reason)) => {
                        outcome.warnings.push(format!(
                            "participant {} fell back to wait: {reason}",
                            member.decision.participant
                        ));
                    }
                    Some(FallbackReason::Timeout(ms)) => {
                        outcome.warnings.push(format!(
                            "participant {} fell back to wait: no decision within {ms}ms",
                            member.decision.participant
                        ));
                    }
                }
            }

            let (winner, yielded_by) = Self::resolve(&decisions);
            let target = winner.target.unwrap_or(if winner.participant == pair_ids.0 {
                pair_ids.1
            } else {
                pair_ids.0
            });
            outcome.events_generated.push(Event::record(
                ctx.view.turn_id,
                "interaction.action",
                serde_json::json!({
                    "actor": winner.participant,
                    "action": winner.action,
                    "target": target,
                    "yielded_by": yielded_by,
                }),
                ctx.view.sequencer,
                self.clock.as_ref(),
            ));
        }

        outcome.ai_cost = ctx.ledger.total() - spend_before;
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
                "interaction.action" => Ok(Event::compensating(
                    event,
                    "interaction.action_retracted",
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
