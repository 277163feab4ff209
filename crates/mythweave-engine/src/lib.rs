//! Mythweave Engine — the turn orchestration pipeline.
//!
//! Drives one discrete turn of a multi-agent narrative simulation through a
//! fixed five-phase pipeline: World Update, Subjective Brief, Interaction
//! Orchestration, Event Integration, Narrative Integration. Phase failures
//! are compensated saga-style by appending inverse events, never by
//! deleting history.
//!
//! The single entry point is [`orchestrator::TurnOrchestrator::execute_turn`].

pub mod compensation;
pub mod config;
pub mod metrics;
pub mod orchestrator;
pub mod phases;
pub mod state;
