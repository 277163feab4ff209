//! Mythweave Core — shared domain abstractions.
//!
//! This crate defines the vocabulary that the turn engine and its hosts
//! share: participant identity, the append-only event record, the engine
//! error taxonomy, and the ports the engine consumes. It contains no
//! orchestration logic.

pub mod clock;
pub mod error;
pub mod event;
pub mod participant;
pub mod phase;
pub mod ports;
pub mod rng;
