//! End-to-end scenarios for the five-phase turn pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use mythweave_core::clock::Clock;
use mythweave_core::error::EngineError;
use mythweave_core::event::{Event, EventSequencer};
use mythweave_core::participant::{Briefing, Decision, ParticipantId};
use mythweave_core::phase::PhaseType;
use mythweave_core::ports::{GatewayDecision, ParticipantGateway, TransitionStatus};
use mythweave_engine::config::TurnConfiguration;
use mythweave_engine::orchestrator::TurnOrchestrator;
use mythweave_engine::phases::{PhaseContext, PhaseExecutor};
use mythweave_engine::state::PhaseOutcome;
use mythweave_test_support::{
    FixedClock, FlatGateway, MockRng, RecordingSink, ScriptedGateway, SequenceRng, SlowGateway,
};
use uuid::Uuid;

/// Test executor that always fails its phase.
struct ExplodingPhase {
    phase: PhaseType,
}

#[async_trait]
impl PhaseExecutor for ExplodingPhase {
    fn phase(&self) -> PhaseType {
        self.phase
    }

    async fn run(&self, _ctx: PhaseContext<'_>) -> Result<PhaseOutcome, EngineError> {
        Err(EngineError::PhaseExecution {
            phase: self.phase,
            reason: "injected failure".to_owned(),
        })
    }

    fn reverse(
        &self,
        _outcome: &PhaseOutcome,
        _sequencer: &EventSequencer,
        _clock: &dyn Clock,
    ) -> Result<Vec<Event>, EngineError> {
        Ok(Vec::new())
    }
}

/// Test executor that succeeds but cannot be reversed.
struct IrreversiblePhase {
    phase: PhaseType,
}

#[async_trait]
impl PhaseExecutor for IrreversiblePhase {
    fn phase(&self) -> PhaseType {
        self.phase
    }

    async fn run(&self, ctx: PhaseContext<'_>) -> Result<PhaseOutcome, EngineError> {
        let mut outcome = PhaseOutcome::succeeded(self.phase);
        outcome.events_generated.push(Event::record(
            ctx.view.turn_id,
            "world.time_advanced",
            serde_json::json!({ "minutes": 60 }),
            ctx.view.sequencer,
            &mythweave_core::clock::SystemClock,
        ));
        Ok(outcome)
    }

    fn reverse(
        &self,
        _outcome: &PhaseOutcome,
        _sequencer: &EventSequencer,
        _clock: &dyn Clock,
    ) -> Result<Vec<Event>, EngineError> {
        Err(EngineError::PhaseExecution {
            phase: self.phase,
            reason: "reversal routine lost its ledger".to_owned(),
        })
    }
}

/// Gateway that answers its first call normally, then raises the fatal
/// budget error on every later one.
struct SpendThenFailGateway {
    calls: std::sync::Mutex<u32>,
    cost: f64,
}

#[async_trait]
impl ParticipantGateway for SpendThenFailGateway {
    async fn decide(
        &self,
        participant: ParticipantId,
        briefing: &Briefing,
    ) -> Result<GatewayDecision, EngineError> {
        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        if *calls == 1 {
            Ok(GatewayDecision {
                decision: Decision {
                    participant,
                    action: "strike".to_owned(),
                    target: Some(briefing.counterpart),
                },
                cost: self.cost,
            })
        } else {
            Err(EngineError::BudgetExceeded {
                spent: self.cost,
                cap: 0.01,
            })
        }
    }
}

fn orchestrator(gateway: Arc<dyn ParticipantGateway>) -> TurnOrchestrator {
    TurnOrchestrator::with_parts(
        gateway,
        Arc::new(mythweave_core::clock::SystemClock),
        Box::new(MockRng),
    )
}

fn participants(n: usize) -> Vec<ParticipantId> {
    (1..=n as u128)
        .map(|i| ParticipantId::from_uuid(Uuid::from_u128(i)))
        .collect()
}

#[tokio::test]
async fn test_happy_path_completes_all_five_phases() {
    let engine = orchestrator(Arc::new(ScriptedGateway::new()));
    let config = TurnConfiguration::default();

    let result = engine
        .execute_turn(1, &participants(2), &config)
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.phases_completed, PhaseType::ORDERED.to_vec());
    assert!((result.completion - 1.0).abs() < f64::EPSILON);
    assert!(result.total_ai_cost.abs() < f64::EPSILON);
    assert!(result.error_detail.is_none());
    assert!(result.compensation.is_none());
    assert_eq!(result.outcomes.len(), 5);
}

#[tokio::test]
async fn test_event_sequence_numbers_are_strictly_increasing() {
    let engine = orchestrator(Arc::new(ScriptedGateway::new()));
    let config = TurnConfiguration::default();

    let result = engine
        .execute_turn(1, &participants(3), &config)
        .await
        .unwrap();

    let sequences: Vec<u64> = result
        .outcomes
        .iter()
        .flat_map(|o| o.events_generated.iter().map(|e| e.sequence))
        .collect();
    assert!(!sequences.is_empty());
    for window in sequences.windows(2) {
        assert!(window[0] < window[1], "sequence regressed: {sequences:?}");
    }
}

#[tokio::test]
async fn test_single_participant_turn_completes_without_error() {
    let engine = orchestrator(Arc::new(ScriptedGateway::new()));
    let config = TurnConfiguration::default();

    let result = engine
        .execute_turn(1, &participants(1), &config)
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.phases_completed.len(), 5);
    // One brief, no interaction opportunities.
    let briefs = &result.outcomes[1];
    assert_eq!(briefs.events_generated.len(), 1);
    let actions = &result.outcomes[2];
    assert!(actions.events_generated.is_empty());
}

#[tokio::test]
async fn test_validation_failure_produces_no_result() {
    let engine = orchestrator(Arc::new(ScriptedGateway::new()));
    let config = TurnConfiguration {
        ai_integration_enabled: true,
        max_ai_cost: 0.0,
        ..TurnConfiguration::default()
    };

    let err = engine.execute_turn(1, &[], &config).await.unwrap_err();

    match err {
        EngineError::Validation { violations } => {
            assert_eq!(violations.len(), 2);
            assert!(violations[0].contains("non-empty"));
            assert!(violations[1].contains("max_ai_cost"));
        }
        other => panic!("expected Validation, got {other:?}"),
    }
}

#[tokio::test]
async fn test_fail_fast_aborts_without_compensation() {
    let engine = orchestrator(Arc::new(ScriptedGateway::new())).with_executor(Box::new(
        ExplodingPhase {
            phase: PhaseType::InteractionOrchestration,
        },
    ));
    let config = TurnConfiguration {
        fail_fast_on_phase_failure: true,
        ..TurnConfiguration::default()
    };

    let result = engine
        .execute_turn(1, &participants(3), &config)
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(
        result.phases_completed,
        vec![PhaseType::WorldUpdate, PhaseType::SubjectiveBrief]
    );
    assert!(result.compensation.is_none());
    let detail = result.error_detail.unwrap();
    assert_eq!(detail.kind, "phase_execution_error");
    // The failed phase's outcome is still reported.
    assert_eq!(result.outcomes.len(), 3);
    assert!(!result.outcomes[2].success);
}

#[tokio::test]
async fn test_compensated_failure_reverses_in_reverse_phase_order() {
    let engine = orchestrator(Arc::new(ScriptedGateway::new())).with_executor(Box::new(
        ExplodingPhase {
            phase: PhaseType::InteractionOrchestration,
        },
    ));
    let config = TurnConfiguration::default();

    let result = engine
        .execute_turn(1, &participants(3), &config)
        .await
        .unwrap();

    assert!(!result.success);
    let plan = result.compensation.unwrap();
    assert!(plan.gaps.is_empty());

    // One reversal entry per succeeded phase, most recent first.
    assert_eq!(plan.reversals.len(), 2);
    assert_eq!(plan.reversals[0].phase, PhaseType::SubjectiveBrief);
    assert!(plan.reversals[0].actions.is_empty());
    assert_eq!(plan.reversals[1].phase, PhaseType::WorldUpdate);
    assert!(!plan.reversals[1].actions.is_empty());

    // Every compensating event back-references an original world event.
    let world_event_ids: Vec<Uuid> = result.outcomes[0]
        .events_generated
        .iter()
        .map(|e| e.event_id)
        .collect();
    for action in &plan.reversals[1].actions {
        assert!(world_event_ids.contains(&action.reverses));
        assert_eq!(action.event.compensates, Some(action.reverses));
    }

    let detail = result.error_detail.unwrap();
    assert_eq!(detail.kind, "phase_execution_error");
    assert!(detail.message.contains("compensated 2 phase(s)"));
}

#[tokio::test]
async fn test_compensation_gap_is_fatal_and_named() {
    let engine = orchestrator(Arc::new(ScriptedGateway::new()))
        .with_executor(Box::new(IrreversiblePhase {
            phase: PhaseType::WorldUpdate,
        }))
        .with_executor(Box::new(ExplodingPhase {
            phase: PhaseType::InteractionOrchestration,
        }));
    let config = TurnConfiguration::default();

    let result = engine
        .execute_turn(1, &participants(2), &config)
        .await
        .unwrap();

    assert!(!result.success);
    let plan = result.compensation.unwrap();
    assert_eq!(plan.gaps.len(), 1);
    assert_eq!(plan.gaps[0].phase, PhaseType::WorldUpdate);

    let detail = result.error_detail.unwrap();
    assert_eq!(detail.kind, "compensation_gap_error");
    assert!(detail.message.contains("world_update"));
    assert!(detail.message.contains("injected failure"));
}

#[tokio::test]
async fn test_budget_exhaustion_degrades_to_default_decisions() {
    let engine = orchestrator(Arc::new(FlatGateway::new("strike", 0.05)));
    let config = TurnConfiguration {
        ai_integration_enabled: true,
        max_ai_cost: 0.01,
        ..TurnConfiguration::default()
    };

    let result = engine
        .execute_turn(1, &participants(2), &config)
        .await
        .unwrap();

    assert!(result.success);
    let interaction = &result.outcomes[2];
    let detail = interaction.error_detail.as_ref().unwrap();
    assert_eq!(detail.kind, "budget_exceeded_error");
    assert!(interaction.warnings.iter().any(|w| w.contains("budget")));

    // Cost never exceeds the cap plus one in-flight call's worst case.
    assert!(result.total_ai_cost <= 0.01 + 0.05 + 1e-9);
}

#[tokio::test]
async fn test_budget_cap_holds_under_concurrent_calls() {
    // A slow gateway puts a full wave of concurrent calls in flight
    // before the first charge lands; the cap must still hold to within
    // one call's worst case.
    let engine = orchestrator(Arc::new(SlowGateway::new(50, 0.05)));
    let config = TurnConfiguration {
        ai_integration_enabled: true,
        max_ai_cost: 0.01,
        max_concurrent_operations: 4,
        ..TurnConfiguration::default()
    };

    let result = engine
        .execute_turn(1, &participants(4), &config)
        .await
        .unwrap();

    assert!(result.success);
    assert!(
        result.total_ai_cost <= 0.01 + 0.05 + 1e-9,
        "overshoot: spent {} against cap 0.01",
        result.total_ai_cost
    );
}

#[tokio::test]
async fn test_fatal_phase_failure_keeps_settled_spend_in_the_result() {
    let engine = orchestrator(Arc::new(SpendThenFailGateway {
        calls: std::sync::Mutex::new(0),
        cost: 0.05,
    }));
    let config = TurnConfiguration {
        ai_integration_enabled: true,
        max_ai_cost: 1.0,
        ..TurnConfiguration::default()
    };

    let result = engine
        .execute_turn(1, &participants(2), &config)
        .await
        .unwrap();

    assert!(!result.success);
    let interaction = &result.outcomes[2];
    assert!(!interaction.success);
    // The first call's charge landed before the fatal error and must
    // survive into the failed outcome and the turn total.
    assert!((interaction.ai_cost - 0.05).abs() < 1e-9);
    assert!((result.total_ai_cost - 0.05).abs() < 1e-9);
    assert_eq!(result.error_detail.unwrap().kind, "budget_exceeded_error");
}

#[tokio::test]
async fn test_ai_cost_accumulates_monotonically_across_phases() {
    let gateway = ScriptedGateway::new();
    let ids = participants(2);
    gateway.respond(ids[0], "parley", Some(ids[1]), 0.02);
    gateway.respond(ids[1], "strike", Some(ids[0]), 0.03);
    let engine = orchestrator(Arc::new(gateway));
    let config = TurnConfiguration {
        ai_integration_enabled: true,
        max_ai_cost: 1.0,
        ..TurnConfiguration::default()
    };

    let result = engine.execute_turn(1, &ids, &config).await.unwrap();

    assert!(result.success);
    let mut running = 0.0;
    for outcome in &result.outcomes {
        assert!(outcome.ai_cost >= 0.0);
        running += outcome.ai_cost;
    }
    assert!((running - result.total_ai_cost).abs() < 1e-9);
    assert!((result.total_ai_cost - 0.05).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn test_global_deadline_fails_the_inflight_phase() {
    let engine = orchestrator(Arc::new(SlowGateway::new(60_000, 0.01)));
    let config = TurnConfiguration {
        ai_integration_enabled: true,
        max_ai_cost: 1.0,
        max_execution_time_ms: 250,
        negotiation_timeout_ms: 120_000,
        ..TurnConfiguration::default()
    };

    let result = engine
        .execute_turn(1, &participants(2), &config)
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(
        result.phases_completed,
        vec![PhaseType::WorldUpdate, PhaseType::SubjectiveBrief]
    );
    let detail = result.error_detail.unwrap();
    assert_eq!(detail.kind, "timeout_error");
    // The timed-out gateway call contributes no cost; its result was
    // discarded with the phase future.
    assert!(result.total_ai_cost.abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_pinned_clock_and_scripted_rng_reproduce_a_turn() {
    use chrono::TimeZone;

    let moment = chrono::Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
    // SequenceRng rolls 0.0 for the ambient chance, then draws the aspect
    // index and the (unused) flux drift from the scripted values.
    let engine = TurnOrchestrator::with_parts(
        Arc::new(ScriptedGateway::new()),
        Arc::new(FixedClock(moment)),
        Box::new(SequenceRng::new(vec![2, 5])),
    );
    let config = TurnConfiguration::default();

    let result = engine
        .execute_turn(1, &participants(2), &config)
        .await
        .unwrap();

    assert!(result.success);
    let world = &result.outcomes[0];
    assert_eq!(world.events_generated[1].kind, "world.ambient_shift");
    assert_eq!(world.events_generated[1].payload["aspect"], "wildlife");
    for outcome in &result.outcomes {
        for event in &outcome.events_generated {
            assert_eq!(event.occurred_at, moment);
        }
    }
}

#[tokio::test]
async fn test_sink_receives_every_phase_transition_and_a_summary() {
    let sink = Arc::new(RecordingSink::new());
    let engine =
        orchestrator(Arc::new(ScriptedGateway::new())).with_sink(Arc::clone(&sink) as Arc<dyn mythweave_core::ports::ObservabilitySink>);
    let config = TurnConfiguration::default();

    let result = engine
        .execute_turn(1, &participants(2), &config)
        .await
        .unwrap();

    let transitions = sink.transitions();
    // Started + Completed per phase, plus the turn summary.
    assert_eq!(transitions.len(), 11);
    for pair in transitions[..10].chunks(2) {
        assert_eq!(pair[0].status, TransitionStatus::Started);
        assert_eq!(pair[1].status, TransitionStatus::Completed);
        assert_eq!(pair[0].phase, pair[1].phase);
        assert_eq!(pair[0].turn_id, result.turn_id);
    }
    let summary = transitions.last().unwrap();
    assert_eq!(summary.status, TransitionStatus::TurnFinished);
    assert!(summary.phase.is_none());
    let events_emitted: usize = result
        .outcomes
        .iter()
        .map(|o| o.events_generated.len())
        .sum();
    assert_eq!(summary.event_count, events_emitted);
}

#[tokio::test]
async fn test_failed_turn_emits_compensation_transition() {
    let sink = Arc::new(RecordingSink::new());
    let engine = orchestrator(Arc::new(ScriptedGateway::new()))
        .with_executor(Box::new(ExplodingPhase {
            phase: PhaseType::EventIntegration,
        }))
        .with_sink(Arc::clone(&sink) as Arc<dyn mythweave_core::ports::ObservabilitySink>);
    let config = TurnConfiguration::default();

    let result = engine
        .execute_turn(1, &participants(2), &config)
        .await
        .unwrap();

    assert!(!result.success);
    let statuses: Vec<TransitionStatus> = sink.transitions().iter().map(|t| t.status).collect();
    assert!(statuses.contains(&TransitionStatus::Failed));
    assert!(statuses.contains(&TransitionStatus::CompensationTriggered));
    // Three phases succeeded before the injected failure.
    assert_eq!(result.compensation.unwrap().reversals.len(), 3);
}

#[tokio::test]
async fn test_tracker_supports_mid_run_and_post_run_reads() {
    let engine = orchestrator(Arc::new(ScriptedGateway::new()));
    let tracker = engine.tracker();
    let config = TurnConfiguration::default();

    assert_eq!(tracker.summarize().phases_recorded, 0);

    let result = engine
        .execute_turn(1, &participants(2), &config)
        .await
        .unwrap();

    let summary = tracker.summarize();
    assert_eq!(summary.phases_recorded, 5);
    let events_emitted: usize = result
        .outcomes
        .iter()
        .map(|o| o.events_generated.len())
        .sum();
    assert_eq!(summary.total_events_generated, events_emitted);
}
