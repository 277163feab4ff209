//! The top-level turn coordinator.

use std::sync::Arc;
use std::time::{Duration, Instant};

use mythweave_core::clock::{Clock, SystemClock};
use mythweave_core::error::{EngineError, ErrorDetail};
use mythweave_core::participant::ParticipantId;
use mythweave_core::phase::PhaseType;
use mythweave_core::ports::{
    CostLedger, NullSink, ObservabilitySink, ParticipantGateway, PhaseTransition,
    TransitionStatus,
};
use mythweave_core::rng::{DeterministicRng, SystemRng};

use crate::compensation::{CompensationPlan, CompensationPlanner};
use crate::config::TurnConfiguration;
use crate::metrics::PerformanceTracker;
use crate::phases::{PhaseContext, PhaseExecutor, PhaseRegistry};
use crate::state::{PhaseOutcome, TurnResult, TurnState};

#[allow(clippy::cast_possible_truncation)]
fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

/// Drives one turn through the five-phase pipeline.
///
/// Owns the phase dispatch table and the per-turn saga bookkeeping. Turn
/// numbering is injected by the caller (the campaign aggregate owns the
/// counter), so no mutable state survives between turns.
pub struct TurnOrchestrator {
    registry: PhaseRegistry,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn ObservabilitySink>,
    tracker: Arc<PerformanceTracker>,
}

impl TurnOrchestrator {
    /// Creates an orchestrator over the given decision gateway, with the
    /// system clock, production RNG, and no observability sink.
    #[must_use]
    pub fn new(gateway: Arc<dyn ParticipantGateway>) -> Self {
        Self::with_parts(gateway, Arc::new(SystemClock), Box::new(SystemRng))
    }

    /// Creates an orchestrator with explicit clock and RNG, for
    /// deterministic hosts and tests.
    #[must_use]
    pub fn with_parts(
        gateway: Arc<dyn ParticipantGateway>,
        clock: Arc<dyn Clock>,
        rng: Box<dyn DeterministicRng>,
    ) -> Self {
        Self {
            registry: PhaseRegistry::standard(gateway, Arc::clone(&clock), rng),
            clock,
            sink: Arc::new(NullSink),
            tracker: Arc::new(PerformanceTracker::new()),
        }
    }

    /// Wires an observability sink for phase-transition events.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ObservabilitySink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replaces a single phase's executor. Failure-injection hook for
    /// tests and specialty hosts.
    #[must_use]
    pub fn with_executor(mut self, executor: Box<dyn PhaseExecutor>) -> Self {
        self.registry.replace(executor);
        self
    }

    /// The tracker accumulating this orchestrator's phase metrics.
    /// Readable mid-turn.
    #[must_use]
    pub fn tracker(&self) -> Arc<PerformanceTracker> {
        Arc::clone(&self.tracker)
    }

    /// Executes one turn: validates preconditions, drives the five phases
    /// strictly in order, compensates on failure unless configured to
    /// fail fast, and assembles the result.
    ///
    /// # Errors
    ///
    /// Returns `Err` only for [`EngineError::Validation`] — no phase has
    /// run and no result exists. Every failure after validation yields
    /// `Ok` with `success = false` and `phases_completed` reflecting real
    /// progress.
    pub async fn execute_turn(
        &self,
        turn_number: u64,
        participants: &[ParticipantId],
        config: &TurnConfiguration,
    ) -> Result<TurnResult, EngineError> {
        config.validate(participants)?;

        let mut state = TurnState::new(turn_number, self.clock.now());
        let turn_id = state.turn_id();
        let ledger = Arc::new(CostLedger::new());
        let turn_started = Instant::now();
        let deadline = turn_started + Duration::from_millis(config.max_execution_time_ms);

        tracing::info!(%turn_id, turn_number, participants = participants.len(), "turn started");

        let mut failure: Option<EngineError> = None;
        for executor in self.registry.ordered() {
            let phase = executor.phase();
            self.emit(turn_id, Some(phase), TransitionStatus::Started, 0, 0.0, 0);
            tracing::info!(%turn_id, %phase, "phase started");

            let phase_started = Instant::now();
            let result = match deadline.checked_duration_since(Instant::now()) {
                None => Err(EngineError::Timeout {
                    scope: format!("phase {phase}"),
                    elapsed_ms: elapsed_ms(turn_started),
                }),
                Some(remaining) => {
                    let ctx = PhaseContext {
                        view: state.view(),
                        participants,
                        config,
                        ledger: &ledger,
                    };
                    // The timeout drops the phase future on expiry; tasks
                    // it spawned are aborted, their results discarded.
                    match tokio::time::timeout(remaining, executor.run(ctx)).await {
                        Ok(run_result) => run_result,
                        Err(_) => Err(EngineError::Timeout {
                            scope: format!("phase {phase}"),
                            elapsed_ms: elapsed_ms(turn_started),
                        }),
                    }
                }
            };
            let duration_ms = elapsed_ms(phase_started);

            match result {
                Ok(mut outcome) => {
                    outcome.duration_ms = duration_ms;
                    self.tracker.record_phase(&outcome);
                    self.emit(
                        turn_id,
                        Some(phase),
                        TransitionStatus::Completed,
                        duration_ms,
                        outcome.ai_cost,
                        outcome.events_generated.len(),
                    );
                    tracing::info!(
                        %turn_id,
                        %phase,
                        duration_ms,
                        events = outcome.events_generated.len(),
                        "phase completed"
                    );
                    state.commit(outcome);
                }
                Err(err) => {
                    let mut outcome = PhaseOutcome::failed(phase, &err, duration_ms);
                    // Spend settled by sibling calls before the failure is
                    // real; fold the ledger delta into the failed outcome
                    // so the result never under-reports it.
                    outcome.ai_cost = ledger.total() - state.total_ai_cost();
                    self.tracker.record_phase(&outcome);
                    self.emit(
                        turn_id,
                        Some(phase),
                        TransitionStatus::Failed,
                        duration_ms,
                        outcome.ai_cost,
                        0,
                    );
                    tracing::warn!(%turn_id, %phase, error = %err, "phase failed");
                    state.commit(outcome);
                    failure = Some(err);
                    break;
                }
            }
        }

        let (error_detail, compensation) = match &failure {
            None => (None, None),
            Some(err) if config.fail_fast_on_phase_failure => {
                (Some(ErrorDetail::from(err)), None)
            }
            Some(err) => {
                let plan = self.compensate(&mut state, turn_id, err);
                let detail = Self::failure_detail(err, &plan);
                (Some(detail), Some(plan))
            }
        };

        let total_duration_ms = elapsed_ms(turn_started);
        let result = state.into_result(
            failure.is_none(),
            total_duration_ms,
            error_detail,
            compensation,
        );
        self.emit(
            turn_id,
            None,
            TransitionStatus::TurnFinished,
            total_duration_ms,
            result.total_ai_cost,
            result.outcomes.iter().map(|o| o.events_generated.len()).sum(),
        );
        tracing::info!(
            %turn_id,
            success = result.success,
            phases = result.phases_completed.len(),
            total_duration_ms,
            total_ai_cost = result.total_ai_cost,
            "turn finished"
        );
        Ok(result)
    }

    /// Plans and applies compensation for the phases that succeeded
    /// before `trigger` stopped the turn.
    fn compensate(
        &self,
        state: &mut TurnState,
        turn_id: uuid::Uuid,
        trigger: &EngineError,
    ) -> CompensationPlan {
        let planner = CompensationPlanner::new(&self.registry);
        let plan = planner.plan(
            &state.succeeded_outcomes(),
            state.sequencer(),
            self.clock.as_ref(),
        );
        self.emit(
            turn_id,
            None,
            TransitionStatus::CompensationTriggered,
            0,
            0.0,
            plan.action_count(),
        );
        tracing::warn!(
            %turn_id,
            trigger = %trigger,
            reversals = plan.reversals.len(),
            gaps = plan.gaps.len(),
            "compensation triggered"
        );
        if plan.gaps.is_empty() {
            state.append_compensation(&plan);
        }
        plan
    }

    /// Names both the triggering failure and the compensation outcome in
    /// one top-level detail. Compensation gaps dominate: they are fatal
    /// and non-retryable and must never be silently dropped.
    fn failure_detail(trigger: &EngineError, plan: &CompensationPlan) -> ErrorDetail {
        if let Some(gap) = plan.gaps.first() {
            let gap_err = EngineError::CompensationGap {
                phase: gap.phase,
                reason: gap.reason.clone(),
            };
            ErrorDetail {
                kind: gap_err.kind().to_owned(),
                message: format!("{trigger}; unrecoverable: {gap_err}"),
            }
        } else {
            ErrorDetail {
                kind: trigger.kind().to_owned(),
                message: format!(
                    "{trigger}; compensated {} phase(s) with {} reversal event(s)",
                    plan.reversals.len(),
                    plan.action_count()
                ),
            }
        }
    }

    fn emit(
        &self,
        turn_id: uuid::Uuid,
        phase: Option<PhaseType>,
        status: TransitionStatus,
        duration_ms: u64,
        ai_cost: f64,
        event_count: usize,
    ) {
        self.sink.emit(&PhaseTransition {
            turn_id,
            phase,
            status,
            duration_ms,
            ai_cost,
            event_count,
        });
    }
}
