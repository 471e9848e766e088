#![doc = include_str!("../../../README.md")]
#![expect(clippy::must_use_candidate, reason = "value-returning APIs are pervasive")]
#![expect(clippy::missing_panics_doc, reason = "panics are lock poisoning only")]
#![expect(clippy::cast_possible_truncation, reason = "hash narrowing is intentional")]
#![expect(clippy::return_self_not_must_use, reason = "persistent updates read naturally unchained")]

mod apply;
mod ast;
mod dispatch;
mod env;
mod error;
mod eval;
mod host;
mod ops;
mod pattern;
mod registry;
mod run;
mod tracer;
mod types;
mod typesys;
mod value;
mod witness;

pub use crate::{
    ast::{
        CompClause, FuncLit, InfixOp, InstanceDecl, MatchArm, Node, NodeId, NodeKind, NodeRef,
        Param, Pattern, PostfixOp, PrefixOp, TraitDecl, TraitMethodDecl, TypeDecl, TypeDeclBody,
    },
    env::Env,
    error::{CodeLoc, ErrorKind, RunError, RunResult, StackFrame},
    host::{CaptureHandler, HostBridge, HostCallHandler, HostToValueHandler, VmCallHandler},
    registry::{MethodTable, Registry, TraitInfo, TraitMethod},
    run::{DEFAULT_MAX_RECURSION, Interp, Limits},
    tracer::{EvalTracer, NoopTracer, RecordingTracer, TraceEvent},
    types::{Bits, Bytes, List, Map, Rational, Record},
    typesys::{AliasTable, DispatchSource, DispatchStrategy, TypeMap, TypeTerm},
    value::{
        AdtInstance, BoundMethod, Builtin, BuiltinFn, ClassMethod, Composed, Constructor,
        Dictionary, Function, HostClosure, PartialApp, RangeValue, Signal, TailCall, TypeTag,
        Value,
    },
    witness::{WitnessFrame, WitnessStack},
};
