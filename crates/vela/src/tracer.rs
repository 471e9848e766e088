//! Evaluation tracing hooks.
//!
//! The engine reports coarse events through an [`EvalTracer`]; the default
//! [`NoopTracer`] makes the hooks free in production, while
//! [`RecordingTracer`] collects events for tests that assert on dispatch
//! decisions or trampoline behaviour.

use std::sync::Mutex;

/// One traced event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// The driver entered a node.
    Enter { node: &'static str, line: u32 },
    /// The dispatcher chose an implementation.
    Dispatch {
        trait_name: String,
        method: String,
        key: String,
        /// Which decision path won: `argument`, `context`, `dictionary`,
        /// `witness`, or `default`.
        path: &'static str,
    },
    /// The trampoline reused the current frame for a tail call.
    TailLoop { callee: String },
}

/// Receiver for evaluation events. Implementations use interior mutability;
/// the engine only ever holds a shared reference.
pub trait EvalTracer: Send + Sync {
    fn event(&self, event: TraceEvent);
}

/// Discards every event.
#[derive(Debug, Default)]
pub struct NoopTracer;

impl EvalTracer for NoopTracer {
    fn event(&self, _event: TraceEvent) {}
}

/// Collects events into a vector for inspection.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    events: Mutex<Vec<TraceEvent>>,
}

impl RecordingTracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().expect("tracer lock poisoned").clone()
    }

    /// The dispatch events only, in order.
    pub fn dispatches(&self) -> Vec<TraceEvent> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, TraceEvent::Dispatch { .. }))
            .collect()
    }
}

impl EvalTracer for RecordingTracer {
    fn event(&self, event: TraceEvent) {
        self.events.lock().expect("tracer lock poisoned").push(event);
    }
}
