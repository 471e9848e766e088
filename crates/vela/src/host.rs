//! The host bridge: configurable callbacks wiring the engine to its embedder.
//!
//! Foreign functions, VM closures, and foreign values never enter the engine
//! directly; the host installs handlers and the engine routes through them.
//! All handlers are shared, thread-safe callables so forked evaluators can
//! carry them across OS threads.

use std::{any::Any, sync::Arc};

use crate::{
    error::RunResult,
    value::{HostClosure, Value},
};

/// Invokes a reflected foreign callable with evaluated arguments.
pub type HostCallHandler = Arc<dyn Fn(&HostClosure, Vec<Value>) -> RunResult<Value> + Send + Sync>;

/// Converts a foreign value into an engine value.
pub type HostToValueHandler = Arc<dyn Fn(&(dyn Any + Send + Sync)) -> RunResult<Value> + Send + Sync>;

/// Invokes a VM closure from an evaluator context; used by builtins that
/// receive a callback configured in a mixed runtime.
pub type VmCallHandler = Arc<dyn Fn(&HostClosure, Vec<Value>) -> RunResult<Value> + Send + Sync>;

/// Prepares a closure value for asynchronous dispatch on another thread
/// (e.g. pinning its captured state). Identity when unset.
pub type CaptureHandler = Arc<dyn Fn(&Value) -> RunResult<Value> + Send + Sync>;

/// The installed handler set. Every slot is optional; an unset slot turns the
/// corresponding operation into a `HostCall` error.
#[derive(Clone, Default)]
pub struct HostBridge {
    pub host_call: Option<HostCallHandler>,
    pub host_to_value: Option<HostToValueHandler>,
    pub vm_call: Option<VmCallHandler>,
    pub capture: Option<CaptureHandler>,
}

impl std::fmt::Debug for HostBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostBridge")
            .field("host_call", &self.host_call.is_some())
            .field("host_to_value", &self.host_to_value.is_some())
            .field("vm_call", &self.vm_call.is_some())
            .field("capture", &self.capture.is_some())
            .finish()
    }
}
