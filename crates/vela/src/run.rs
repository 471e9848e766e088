//! Public interface for running Vela programs.

use std::sync::{
    Arc, RwLock,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

use crate::{
    ast::{InfixOp, NodeRef},
    env::Env,
    error::{RunError, RunResult, StackFrame},
    host::HostBridge,
    registry::Registry,
    tracer::{EvalTracer, NoopTracer},
    typesys::{AliasTable, DispatchStrategy, TypeMap},
    value::{ClassMethod, Constructor, Signal, Value},
    witness::WitnessStack,
};

/// Default bound on evaluator recursion depth.
pub const DEFAULT_MAX_RECURSION: usize = 10_000;

/// Resource limits consulted by the driver.
#[derive(Debug, Clone)]
pub struct Limits {
    /// Maximum `eval` nesting depth before `MaxRecursionExceeded`.
    pub max_recursion: usize,
    /// Optional wall-clock budget for one `run`/`eval_node` entry.
    pub time_budget: Option<Duration>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_recursion: DEFAULT_MAX_RECURSION,
            time_budget: None,
        }
    }
}

/// The evaluator.
///
/// One `Interp` evaluates one program at a time, single-threaded. Concurrent
/// request handlers each take a [`Interp::fork`]: forks share the frozen
/// registries, alias table, type map, dispatch strategy, and global
/// environment, and get fresh per-request state (call stack, witness stack,
/// context stacks, depth, cancellation).
pub struct Interp {
    // shared, frozen before serving
    pub(crate) registry: Arc<RwLock<Registry>>,
    pub(crate) aliases: Arc<RwLock<AliasTable>>,
    pub(crate) type_map: Arc<TypeMap>,
    pub(crate) strategy: Arc<DispatchStrategy>,
    pub(crate) bridge: HostBridge,
    pub(crate) tracer: Arc<dyn EvalTracer>,
    pub(crate) script_name: String,
    limits: Limits,

    // per-fork mutable state
    pub(crate) global_env: Env,
    pub(crate) witnesses: WitnessStack,
    /// Head-constructor names collected from enclosing explicit annotations.
    pub(crate) type_context: Vec<String>,
    /// Container context set by `>>=` and friends for nested dispatch.
    pub(crate) container_context: Option<String>,
    pub(crate) call_stack: Vec<StackFrame>,
    pub(crate) current_call_node: Option<NodeRef>,
    pub(crate) current_env: Option<Env>,
    pub(crate) depth: usize,
    /// Nesting depth of user-function applications; tail-call signals are
    /// only emitted above zero.
    pub(crate) fn_depth: usize,
    /// Whether the node currently being evaluated sits in tail position.
    pub(crate) in_tail: bool,
    cancel: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Interp {
    /// Creates an evaluator over the analyser's outputs, with built-in
    /// traits, constructors, and globals seeded.
    pub fn new(type_map: TypeMap, strategy: DispatchStrategy) -> Self {
        let interp = Self {
            registry: Arc::new(RwLock::new(Registry::with_builtins())),
            aliases: Arc::new(RwLock::new(AliasTable::new())),
            type_map: Arc::new(type_map),
            strategy: Arc::new(strategy),
            bridge: HostBridge::default(),
            tracer: Arc::new(NoopTracer),
            script_name: "main.vela".to_owned(),
            limits: Limits::default(),
            global_env: Env::new(),
            witnesses: WitnessStack::new(),
            type_context: Vec::new(),
            container_context: None,
            call_stack: Vec::new(),
            current_call_node: None,
            current_env: None,
            depth: 0,
            fn_depth: 0,
            in_tail: false,
            cancel: Arc::new(AtomicBool::new(false)),
            deadline: None,
        };
        interp.seed_globals();
        interp
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_script_name(mut self, name: impl Into<String>) -> Self {
        self.script_name = name.into();
        self
    }

    pub fn set_tracer(&mut self, tracer: Arc<dyn EvalTracer>) {
        self.tracer = tracer;
    }

    pub fn bridge_mut(&mut self) -> &mut HostBridge {
        &mut self.bridge
    }

    /// The shared cancellation flag; setting it makes the driver return a
    /// `Cancelled` error at its next entry.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Freezes the shared registries. Call before handing forks to
    /// concurrent request handlers; registration afterwards is rejected.
    pub fn freeze(&self) {
        self.registry.write().expect("registry lock poisoned").freeze();
    }

    /// Clones the evaluator for a concurrent request handler.
    ///
    /// Shared read-only state is shared by reference; mutable state is fresh,
    /// including the cancellation flag.
    pub fn fork(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            aliases: Arc::clone(&self.aliases),
            type_map: Arc::clone(&self.type_map),
            strategy: Arc::clone(&self.strategy),
            bridge: self.bridge.clone(),
            tracer: Arc::clone(&self.tracer),
            script_name: self.script_name.clone(),
            limits: self.limits.clone(),
            global_env: self.global_env.clone(),
            witnesses: WitnessStack::new(),
            type_context: Vec::new(),
            container_context: None,
            call_stack: Vec::new(),
            current_call_node: None,
            current_env: None,
            depth: 0,
            fn_depth: 0,
            in_tail: false,
            cancel: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    /// Evaluates a whole program node and returns its resulting value.
    pub fn run(&mut self, program: &NodeRef) -> RunResult<Value> {
        self.deadline = self.limits.time_budget.map(|budget| Instant::now() + budget);
        let env = self.global_env.clone();
        let result = self.eval(program, &env)?;
        // Unwrap signals addressed to the program root; loop signals escaping
        // this far are an inconsistency.
        match result {
            Value::Signal(signal) => match &*signal {
                Signal::Return(value) => Ok(value.clone()),
                Signal::Break(_) | Signal::Continue => {
                    Err(RunError::invalid("loop signal escaped its loop"))
                }
                Signal::TailCall(_) => Err(RunError::invalid("tail call escaped its function")),
            },
            value => Ok(value),
        }
    }

    /// Applies a callable value to arguments; the entry point builtins use to
    /// call back into the evaluator.
    pub fn apply_value(&mut self, callable: Value, args: Vec<Value>) -> RunResult<Value> {
        self.apply(callable, args)
    }

    /// Evaluates one node in the global environment.
    pub fn eval_node(&mut self, node: &NodeRef) -> RunResult<Value> {
        self.deadline = self.limits.time_budget.map(|budget| Instant::now() + budget);
        let env = self.global_env.clone();
        self.eval(node, &env)
    }

    /// The global environment, for hosts that pre-bind builtins or inputs.
    pub fn global_env(&self) -> &Env {
        &self.global_env
    }

    /// Runs a closure against the shared registry, e.g. to pre-register
    /// host-provided traits or instances before freezing.
    pub fn with_registry<R>(&self, f: impl FnOnce(&mut Registry) -> R) -> R {
        f(&mut self.registry.write().expect("registry lock poisoned"))
    }

    /// Runs a closure against the shared type-alias table.
    pub fn with_aliases<R>(&self, f: impl FnOnce(&mut crate::typesys::AliasTable) -> R) -> R {
        f(&mut self.aliases.write().expect("alias lock poisoned"))
    }

    /// Converts a foreign value through the installed host-to-value handler.
    pub fn host_to_value(&self, value: &(dyn std::any::Any + Send + Sync)) -> RunResult<Value> {
        match &self.bridge.host_to_value {
            Some(handler) => handler(value),
            None => Err(RunError::host_call("no host-to-value handler installed")),
        }
    }

    /// Invokes a VM closure through the installed VM-call handler; used by
    /// builtins that receive a callback configured in a mixed runtime.
    pub fn call_vm_closure(
        &mut self,
        closure: &crate::value::HostClosure,
        args: Vec<Value>,
    ) -> RunResult<Value> {
        match self.bridge.vm_call.clone() {
            Some(handler) => handler(closure, args),
            None => Err(RunError::host_call("no VM-call handler installed")),
        }
    }

    /// Prepares a closure value for asynchronous dispatch via the installed
    /// capture handler; identity when none is installed.
    pub fn capture_closure(&self, value: &Value) -> RunResult<Value> {
        match &self.bridge.capture {
            Some(handler) => handler(value),
            None => Ok(value.clone()),
        }
    }

    /// Binds a host builtin in the global environment.
    pub fn define_builtin(
        &self,
        name: &str,
        param_count: Option<usize>,
        defaults: Vec<Value>,
        func: crate::value::BuiltinFn,
    ) {
        self.global_env.define(
            name,
            Value::Builtin(Arc::new(crate::value::Builtin {
                name: name.to_owned(),
                param_count,
                defaults,
                func,
            })),
        );
    }

    pub(crate) fn max_recursion(&self) -> usize {
        self.limits.max_recursion
    }

    /// Cancellation check consulted at every `eval` entry.
    pub(crate) fn check_cancelled(&self) -> RunResult<()> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(RunError::cancelled());
        }
        if let Some(deadline) = self.deadline
            && Instant::now() > deadline
        {
            return Err(RunError::cancelled());
        }
        Ok(())
    }

    /// Seeds the global environment: built-in constructors, class-method
    /// values for every seeded trait method, and the handful of plain
    /// builtins.
    fn seed_globals(&self) {
        let env = &self.global_env;
        env.define(
            "Some",
            Value::Constructor(Arc::new(Constructor {
                name: "Some".to_owned(),
                type_name: "Option".to_owned(),
                arity: 1,
            })),
        );
        env.define("None", Value::none());
        env.define(
            "Ok",
            Value::Constructor(Arc::new(Constructor {
                name: "Ok".to_owned(),
                type_name: "Result".to_owned(),
                arity: 1,
            })),
        );
        env.define(
            "Fail",
            Value::Constructor(Arc::new(Constructor {
                name: "Fail".to_owned(),
                type_name: "Result".to_owned(),
                arity: 1,
            })),
        );
        let registry = self.registry.read().expect("registry lock poisoned");
        for trait_name in registry.trait_names() {
            let info = registry.trait_info(trait_name).expect("listed trait exists");
            for method in &info.methods {
                // Operator-backed methods are reached through the operator
                // engine; plain names become class-method globals.
                if method.operator.is_none() {
                    env.define(
                        method.name.clone(),
                        Value::ClassMethod(Arc::new(ClassMethod {
                            trait_name: trait_name.to_owned(),
                            method: method.name.clone(),
                            arity: method.arity,
                            hint: None,
                        })),
                    );
                }
            }
        }
    }

    /// Reifies an operator token as its arity-2 function value, for surface
    /// forms like `(+)`.
    pub(crate) fn operator_value(name: &str) -> Option<Value> {
        let token = name.strip_prefix('(')?.strip_suffix(')')?;
        token.parse::<InfixOp>().ok().map(Value::OperatorFn)
    }
}
