//! Shared test mocks and utilities for the Mythweave turn engine.

mod clock;
mod gateway;
mod rng;
mod sink;

pub use clock::FixedClock;
pub use gateway::{FailingGateway, FlatGateway, ScriptedGateway, SlowGateway};
pub use rng::{MockRng, SequenceRng};
pub use sink::RecordingSink;
