//! Test sink — records every phase transition for assertions.

use std::sync::Mutex;

use mythweave_core::ports::{ObservabilitySink, PhaseTransition};

/// An observability sink that records all transitions it receives.
#[derive(Debug, Default)]
pub struct RecordingSink {
    transitions: Mutex<Vec<PhaseTransition>>,
}

impl RecordingSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all transitions received so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn transitions(&self) -> Vec<PhaseTransition> {
        self.transitions.lock().unwrap().clone()
    }
}

impl ObservabilitySink for RecordingSink {
    fn emit(&self, transition: &PhaseTransition) {
        self.transitions.lock().unwrap().push(transition.clone());
    }
}
