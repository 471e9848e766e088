//! Primary value type representing Vela values at runtime.
//!
//! Values are a closed tagged union. Scalars are stored inline; composite
//! payloads sit behind `Arc` so cloning a value is cheap and forked
//! evaluators can share them across threads. Persistent collections carry
//! their own structural sharing, so no value ever needs in-place mutation.
//!
//! Every value answers four questions the rest of the engine is built on:
//! - [`Value::type_tag`] — coarse kind for primitive switches,
//! - [`Value::type_name`] — the canonical runtime type name dispatch keys on,
//! - [`Value::runtime_type`] — the type-system term handed to the host,
//! - [`Value::hash32`] — the 32-bit hash map keys use.

use std::{
    borrow::Cow,
    hash::{BuildHasher, Hash, Hasher},
    sync::Arc,
};

use num_bigint::BigInt;
use num_traits::ToPrimitive;
use strum::{Display, IntoStaticStr};

use crate::{
    ast::{InfixOp, NodeRef, Param},
    env::Env,
    error::{CodeLoc, RunError, RunResult},
    typesys::TypeTerm,
    types::{Bits, Bytes, List, Map, Rational, Record},
    witness::{WitnessFrame, WitnessStack},
};

/// Coarse kind of a value, used for primitive switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum TypeTag {
    Nil,
    Bool,
    Int,
    Float,
    BigInt,
    Rational,
    Char,
    List,
    Map,
    Tuple,
    Record,
    Adt,
    Constructor,
    Function,
    Partial,
    Bound,
    ClassMethod,
    OperatorFn,
    Composed,
    Dictionary,
    TypeObject,
    Builtin,
    HostClosure,
    Bytes,
    Bits,
    Range,
    Error,
    Signal,
}

/// A user function value: parameters, body, and everything captured at
/// definition time.
#[derive(Debug)]
pub struct Function {
    pub name: Option<String>,
    pub params: Vec<Param>,
    /// Names the analyser allocated for leading dictionary parameters.
    pub witness_params: Vec<String>,
    pub return_type: Option<TypeTerm>,
    pub body: NodeRef,
    /// The environment at definition time.
    pub env: Env,
    /// Snapshot of the witness stack at capture. Functions built from
    /// literals always carry one; host-constructed functions may not.
    pub captured_witnesses: Option<WitnessStack>,
    pub loc: CodeLoc,
}

impl Function {
    /// Count of parameters without defaults (the required prefix).
    pub fn required_arity(&self) -> usize {
        self.params
            .iter()
            .filter(|p| p.default.is_none() && !p.variadic)
            .count()
    }

    pub fn is_variadic(&self) -> bool {
        self.params.last().is_some_and(|p| p.variadic)
    }

    pub fn describe(&self) -> &str {
        self.name.as_deref().unwrap_or("<lambda>")
    }
}

/// A partially-applied callable: the target plus the arguments consumed so
/// far. Further application appends and re-enters the applier.
#[derive(Debug)]
pub struct PartialApp {
    pub target: Value,
    pub applied: Vec<Value>,
    /// Arguments still missing; always at least one.
    pub remaining: usize,
}

/// A callable with a receiver pinned in front.
#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Value,
    pub callable: Value,
}

/// A trait method reference; resolves to a concrete implementation lazily at
/// each call through the dispatcher.
#[derive(Debug)]
pub struct ClassMethod {
    pub trait_name: String,
    pub method: String,
    pub arity: usize,
    /// Container-type hint attached by explicit type application; the
    /// dispatcher honours it like a trailing type-value argument.
    pub hint: Option<TypeTerm>,
}

/// A composed callable `f ,, g`: applies `inner`, then `outer`.
#[derive(Debug)]
pub struct Composed {
    pub outer: Value,
    pub inner: Value,
}

/// A runtime dictionary: the methods of one instance plus its super-trait
/// dictionaries.
///
/// The methods array has one slot per canonical method of the trait in
/// declared order; a missing implementation holds an error value in its slot.
#[derive(Debug)]
pub struct Dictionary {
    pub trait_name: String,
    pub methods: Vec<(String, Value)>,
    pub supers: Vec<Arc<Dictionary>>,
}

impl Dictionary {
    /// O(1) method lookup by canonical index.
    pub fn method_at(&self, index: usize) -> Option<&Value> {
        self.methods.get(index).map(|(_, v)| v)
    }

    /// Method lookup by name.
    pub fn method(&self, name: &str) -> Option<&Value> {
        self.methods.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// An ADT constructor, callable and partially applicable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constructor {
    pub name: String,
    pub type_name: String,
    pub arity: usize,
}

/// An instance of an algebraic data type.
#[derive(Debug)]
pub struct AdtInstance {
    pub constructor: String,
    pub type_name: String,
    pub fields: Vec<Value>,
    /// Reified type arguments, split off from leading type-value arguments
    /// at construction.
    pub type_args: Vec<TypeTerm>,
}

/// An integer range value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeValue {
    pub start: i64,
    pub end: i64,
    pub step: i64,
    pub inclusive: bool,
}

impl RangeValue {
    pub fn iter(&self) -> impl Iterator<Item = i64> + use<> {
        let (start, end, step, inclusive) = (self.start, self.end, self.step, self.inclusive);
        let mut current = start;
        std::iter::from_fn(move || {
            let in_bounds = if step >= 0 {
                if inclusive { current <= end } else { current < end }
            } else if inclusive {
                current >= end
            } else {
                current > end
            };
            if !in_bounds {
                return None;
            }
            let out = current;
            current += step;
            Some(out)
        })
    }
}

/// Host function signature: builtins receive the evaluator so they can call
/// back into it (e.g. to invoke a passed callback).
pub type BuiltinFn =
    Arc<dyn Fn(&mut crate::run::Interp, Vec<Value>) -> RunResult<Value> + Send + Sync>;

/// A builtin (host) function.
///
/// When `param_count` is known the applier applies defaults and produces
/// partials on under-application; otherwise the host function receives the
/// arguments as passed.
pub struct Builtin {
    pub name: String,
    pub param_count: Option<usize>,
    pub defaults: Vec<Value>,
    pub func: BuiltinFn,
}

impl std::fmt::Debug for Builtin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builtin")
            .field("name", &self.name)
            .field("param_count", &self.param_count)
            .finish_non_exhaustive()
    }
}

/// An opaque closure owned by the host (foreign function or VM closure);
/// application routes through the configured host-call handler.
pub struct HostClosure {
    pub name: String,
    pub payload: Arc<dyn std::any::Any + Send + Sync>,
}

impl std::fmt::Debug for HostClosure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostClosure").field("name", &self.name).finish_non_exhaustive()
    }
}

/// A pending tail call, returned from a body in tail position and consumed by
/// the applier's trampoline.
#[derive(Debug, Clone)]
pub struct TailCall {
    pub target: Value,
    pub args: Vec<Value>,
    /// Witness frame stashed at the call site, re-pushed after the trampoline
    /// resets the stack.
    pub witness: Option<WitnessFrame>,
    pub loc: CodeLoc,
}

/// Control-flow signals. Internal only: every boundary (applier, loops, the
/// driver root) unwraps the signals addressed to it, and a signal escaping
/// its boundary is a fatal inconsistency.
#[derive(Debug, Clone)]
pub enum Signal {
    Return(Value),
    Break(Value),
    Continue,
    TailCall(TailCall),
}

/// The value union.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    BigInt(Arc<BigInt>),
    Rational(Arc<Rational>),
    Char(char),
    List(List),
    Map(Map),
    Tuple(Arc<Vec<Value>>),
    Record(Record),
    Adt(Arc<AdtInstance>),
    Constructor(Arc<Constructor>),
    Function(Arc<Function>),
    Partial(Arc<PartialApp>),
    Bound(Arc<BoundMethod>),
    ClassMethod(Arc<ClassMethod>),
    /// An infix operator reified as a function of arity 2.
    OperatorFn(InfixOp),
    Composed(Arc<Composed>),
    Dictionary(Arc<Dictionary>),
    TypeObject(Arc<TypeTerm>),
    Builtin(Arc<Builtin>),
    HostClosure(Arc<HostClosure>),
    Bytes(Bytes),
    Bits(Bits),
    Range(Arc<RangeValue>),
    /// An error carried as a value, e.g. in an unimplemented dictionary slot.
    Error(Arc<RunError>),
    /// Control-flow signal; unwrapped at boundaries, never user-visible.
    Signal(Arc<Signal>),
}

impl Value {
    // --- constructors for the built-in ADT shapes ---

    pub fn some(value: Value) -> Self {
        Self::adt("Option", "Some", vec![value])
    }

    pub fn none() -> Self {
        Self::adt("Option", "None", vec![])
    }

    pub fn ok(value: Value) -> Self {
        Self::adt("Result", "Ok", vec![value])
    }

    pub fn fail(value: Value) -> Self {
        Self::adt("Result", "Fail", vec![value])
    }

    pub fn adt(type_name: &str, constructor: &str, fields: Vec<Value>) -> Self {
        Self::Adt(Arc::new(AdtInstance {
            constructor: constructor.to_owned(),
            type_name: type_name.to_owned(),
            fields,
            type_args: Vec::new(),
        }))
    }

    pub fn string(s: &str) -> Self {
        Self::List(List::from_str_value(s))
    }

    pub fn signal(signal: Signal) -> Self {
        Self::Signal(Arc::new(signal))
    }

    /// True for `Some(_)`/`Ok(_)`; false for `None`/`Fail(_)`; `None` for
    /// everything else.
    pub fn success_payload(&self) -> Option<(bool, Option<&Value>)> {
        let Self::Adt(adt) = self else { return None };
        match (adt.type_name.as_str(), adt.constructor.as_str()) {
            ("Option", "Some") | ("Result", "Ok") => Some((true, adt.fields.first())),
            ("Option", "None") => Some((false, None)),
            ("Result", "Fail") => Some((false, adt.fields.first())),
            _ => None,
        }
    }

    pub fn type_tag(&self) -> TypeTag {
        match self {
            Self::Nil => TypeTag::Nil,
            Self::Bool(_) => TypeTag::Bool,
            Self::Int(_) => TypeTag::Int,
            Self::Float(_) => TypeTag::Float,
            Self::BigInt(_) => TypeTag::BigInt,
            Self::Rational(_) => TypeTag::Rational,
            Self::Char(_) => TypeTag::Char,
            Self::List(_) => TypeTag::List,
            Self::Map(_) => TypeTag::Map,
            Self::Tuple(_) => TypeTag::Tuple,
            Self::Record(_) => TypeTag::Record,
            Self::Adt(_) => TypeTag::Adt,
            Self::Constructor(_) => TypeTag::Constructor,
            Self::Function(_) => TypeTag::Function,
            Self::Partial(_) => TypeTag::Partial,
            Self::Bound(_) => TypeTag::Bound,
            Self::ClassMethod(_) => TypeTag::ClassMethod,
            Self::OperatorFn(_) => TypeTag::OperatorFn,
            Self::Composed(_) => TypeTag::Composed,
            Self::Dictionary(_) => TypeTag::Dictionary,
            Self::TypeObject(_) => TypeTag::TypeObject,
            Self::Builtin(_) => TypeTag::Builtin,
            Self::HostClosure(_) => TypeTag::HostClosure,
            Self::Bytes(_) => TypeTag::Bytes,
            Self::Bits(_) => TypeTag::Bits,
            Self::Range(_) => TypeTag::Range,
            Self::Error(_) => TypeTag::Error,
            Self::Signal(_) => TypeTag::Signal,
        }
    }

    /// The canonical runtime type name the dispatcher keys on.
    ///
    /// A `Char`-shaped list is `String`; any other list is `List`. A nominal
    /// record answers its declared name, a row-extended or anonymous record
    /// answers `Record`. Every callable shape is `Function`.
    pub fn type_name(&self) -> Cow<'_, str> {
        match self {
            Self::Nil => Cow::Borrowed("Nil"),
            Self::Bool(_) => Cow::Borrowed("Bool"),
            Self::Int(_) => Cow::Borrowed("Int"),
            Self::Float(_) => Cow::Borrowed("Float"),
            Self::BigInt(_) => Cow::Borrowed("BigInt"),
            Self::Rational(_) => Cow::Borrowed("Rational"),
            Self::Char(_) => Cow::Borrowed("Char"),
            Self::List(list) => {
                if list.is_string() {
                    Cow::Borrowed("String")
                } else {
                    Cow::Borrowed("List")
                }
            }
            Self::Map(_) => Cow::Borrowed("Map"),
            Self::Tuple(_) => Cow::Borrowed("Tuple"),
            Self::Record(record) => match record.type_name() {
                Some(name) if !record.is_row_extended() => Cow::Owned(name.to_owned()),
                _ => Cow::Borrowed("Record"),
            },
            Self::Adt(adt) => Cow::Owned(adt.type_name.clone()),
            Self::Constructor(_)
            | Self::Function(_)
            | Self::Partial(_)
            | Self::Bound(_)
            | Self::ClassMethod(_)
            | Self::OperatorFn(_)
            | Self::Composed(_)
            | Self::Builtin(_)
            | Self::HostClosure(_) => Cow::Borrowed("Function"),
            Self::Dictionary(_) => Cow::Borrowed("Dictionary"),
            Self::TypeObject(_) => Cow::Borrowed("Type"),
            Self::Bytes(_) => Cow::Borrowed("Bytes"),
            Self::Bits(_) => Cow::Borrowed("Bits"),
            Self::Range(_) => Cow::Borrowed("Range"),
            Self::Error(_) => Cow::Borrowed("Error"),
            Self::Signal(_) => Cow::Borrowed("Signal"),
        }
    }

    /// The type-system term for this value, as dispatch and the host see it.
    pub fn runtime_type(&self) -> TypeTerm {
        match self {
            Self::List(list) => {
                if list.is_string() {
                    TypeTerm::con("String")
                } else {
                    match list.elem_tag() {
                        Some(tag) => TypeTerm::app("List", vec![TypeTerm::con(tag)]),
                        None => match list.get(0) {
                            Some(first) => TypeTerm::App(
                                Box::new(TypeTerm::con("List")),
                                vec![first.runtime_type()],
                            ),
                            None => TypeTerm::app("List", vec![TypeTerm::var("a")]),
                        },
                    }
                }
            }
            Self::Adt(adt) if !adt.type_args.is_empty() => TypeTerm::App(
                Box::new(TypeTerm::con(&adt.type_name)),
                adt.type_args.clone(),
            ),
            Self::TypeObject(term) => (**term).clone(),
            other => TypeTerm::con(other.type_name().into_owned()),
        }
    }

    /// 32-bit hash used for map keys.
    ///
    /// Int and BigInt hash identically for equal magnitudes (they compare
    /// equal); functions and host handles hash to pointer identity.
    pub fn hash32(&self) -> u32 {
        let mut hasher = fixed_state().build_hasher();
        self.feed_hash(&mut hasher);
        hasher.finish() as u32
    }

    fn feed_hash(&self, hasher: &mut impl Hasher) {
        match self {
            Self::Nil => 0u8.hash(hasher),
            Self::Bool(b) => (1u8, b).hash(hasher),
            Self::Int(i) => (2u8, i).hash(hasher),
            Self::BigInt(big) => match big.to_i64() {
                Some(i) => (2u8, i).hash(hasher),
                None => (3u8, big.to_string()).hash(hasher),
            },
            Self::Float(f) => (4u8, f.to_bits()).hash(hasher),
            Self::Rational(r) => {
                (5u8, r.numerator().to_string(), r.denominator().to_string()).hash(hasher);
            }
            Self::Char(c) => (6u8, c).hash(hasher),
            Self::List(list) => {
                7u8.hash(hasher);
                list.len().hash(hasher);
                for value in list.iter() {
                    value.feed_hash(hasher);
                }
            }
            Self::Map(map) => {
                // XOR of entry hashes keeps the map hash order-independent.
                let mut acc = 0u64;
                for (k, v) in map.iter() {
                    let mut entry = fixed_state().build_hasher();
                    k.feed_hash(&mut entry);
                    v.feed_hash(&mut entry);
                    acc ^= entry.finish();
                }
                (8u8, map.len(), acc).hash(hasher);
            }
            Self::Tuple(items) => {
                9u8.hash(hasher);
                items.len().hash(hasher);
                for value in items.iter() {
                    value.feed_hash(hasher);
                }
            }
            Self::Record(record) => {
                10u8.hash(hasher);
                for (key, value) in record.fields() {
                    key.hash(hasher);
                    value.feed_hash(hasher);
                }
            }
            Self::Adt(adt) => {
                (11u8, &adt.type_name, &adt.constructor).hash(hasher);
                for field in &adt.fields {
                    field.feed_hash(hasher);
                }
            }
            Self::Constructor(ctor) => (12u8, &ctor.type_name, &ctor.name).hash(hasher),
            Self::Bytes(bytes) => (13u8, bytes.as_slice()).hash(hasher),
            Self::Bits(bits) => (14u8, bits.len(), bits.as_bytes()).hash(hasher),
            Self::Range(range) => (15u8, range.start, range.end, range.step, range.inclusive).hash(hasher),
            Self::TypeObject(term) => (16u8, format!("{term:?}")).hash(hasher),
            Self::Error(err) => (17u8, &err.message).hash(hasher),
            // Identity hash for callables, dictionaries, and signals.
            Self::Function(f) => (18u8, Arc::as_ptr(f) as usize).hash(hasher),
            Self::Partial(p) => (18u8, Arc::as_ptr(p) as usize).hash(hasher),
            Self::Bound(b) => (18u8, Arc::as_ptr(b) as usize).hash(hasher),
            Self::ClassMethod(m) => (18u8, Arc::as_ptr(m) as usize).hash(hasher),
            Self::OperatorFn(op) => (19u8, *op as u8).hash(hasher),
            Self::Composed(c) => (18u8, Arc::as_ptr(c) as usize).hash(hasher),
            Self::Dictionary(d) => (18u8, Arc::as_ptr(d) as usize).hash(hasher),
            Self::Builtin(b) => (18u8, Arc::as_ptr(b) as usize).hash(hasher),
            Self::HostClosure(h) => (18u8, Arc::as_ptr(h) as usize).hash(hasher),
            Self::Signal(s) => (20u8, Arc::as_ptr(s) as usize).hash(hasher),
        }
    }

    /// Structural equality for data, identity for callables.
    ///
    /// Int and BigInt compare across representations; Int and Float do not
    /// (implicit coercion happens only at binary operators).
    pub fn value_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Int(a), Self::BigInt(b)) | (Self::BigInt(b), Self::Int(a)) => {
                b.to_i64() == Some(*a)
            }
            (Self::BigInt(a), Self::BigInt(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Rational(a), Self::Rational(b)) => a == b,
            (Self::Char(a), Self::Char(b)) => a == b,
            (Self::List(a), Self::List(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.value_eq(y))
            }
            (Self::Map(a), Self::Map(b)) => a.map_eq(b),
            (Self::Tuple(a), Self::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.value_eq(y))
            }
            (Self::Record(a), Self::Record(b)) => a.record_eq(b),
            (Self::Adt(a), Self::Adt(b)) => {
                a.type_name == b.type_name
                    && a.constructor == b.constructor
                    && a.fields.len() == b.fields.len()
                    && a.fields.iter().zip(b.fields.iter()).all(|(x, y)| x.value_eq(y))
            }
            (Self::Constructor(a), Self::Constructor(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Bits(a), Self::Bits(b)) => a == b,
            (Self::Range(a), Self::Range(b)) => a == b,
            (Self::TypeObject(a), Self::TypeObject(b)) => a == b,
            (Self::Error(a), Self::Error(b)) => a == b,
            (Self::Function(a), Self::Function(b)) => Arc::ptr_eq(a, b),
            (Self::Partial(a), Self::Partial(b)) => Arc::ptr_eq(a, b),
            (Self::Bound(a), Self::Bound(b)) => Arc::ptr_eq(a, b),
            (Self::ClassMethod(a), Self::ClassMethod(b)) => Arc::ptr_eq(a, b),
            (Self::OperatorFn(a), Self::OperatorFn(b)) => a == b,
            (Self::Composed(a), Self::Composed(b)) => Arc::ptr_eq(a, b),
            (Self::Dictionary(a), Self::Dictionary(b)) => Arc::ptr_eq(a, b),
            (Self::Builtin(a), Self::Builtin(b)) => Arc::ptr_eq(a, b),
            (Self::HostClosure(a), Self::HostClosure(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Boolean coercion for conditions: only `Bool` qualifies.
    pub fn as_bool(&self) -> RunResult<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            other => Err(RunError::type_mismatch(format!(
                "expected Bool in condition, found {}",
                other.type_name()
            ))),
        }
    }

    /// True for callable shapes the applier accepts.
    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Self::Function(_)
                | Self::Partial(_)
                | Self::Bound(_)
                | Self::ClassMethod(_)
                | Self::OperatorFn(_)
                | Self::Composed(_)
                | Self::Constructor(_)
                | Self::Builtin(_)
                | Self::HostClosure(_)
                | Self::TypeObject(_)
        )
    }

    /// Human-readable rendering.
    ///
    /// Strings (Char lists) render bare; floats use the shortest
    /// round-tripping decimal form.
    pub fn inspect(&self) -> String {
        match self {
            Self::Nil => "nil".to_owned(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::BigInt(big) => big.to_string(),
            Self::Float(f) => {
                let mut buffer = ryu::Buffer::new();
                buffer.format(*f).to_owned()
            }
            Self::Rational(r) => r.inspect(),
            Self::Char(c) => format!("'{c}'"),
            Self::List(list) => {
                if let Some(s) = list.is_string().then(|| list.as_string()).flatten() {
                    s
                } else {
                    let items: Vec<String> = list.iter().map(Value::inspect).collect();
                    format!("[{}]", items.join(", "))
                }
            }
            Self::Map(map) => {
                let items: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.inspect(), v.inspect()))
                    .collect();
                format!("{{{}}}", items.join(", "))
            }
            Self::Tuple(items) => {
                let items: Vec<String> = items.iter().map(Value::inspect).collect();
                format!("({})", items.join(", "))
            }
            Self::Record(record) => {
                let fields: Vec<String> = record
                    .fields()
                    .iter()
                    .map(|(k, v)| format!("{k}: {}", v.inspect()))
                    .collect();
                let name = record.type_name().unwrap_or("");
                format!("{name}{{{}}}", fields.join(", "))
            }
            Self::Adt(adt) => {
                if adt.fields.is_empty() {
                    adt.constructor.clone()
                } else {
                    let fields: Vec<String> = adt.fields.iter().map(Value::inspect).collect();
                    format!("{}({})", adt.constructor, fields.join(", "))
                }
            }
            Self::Constructor(ctor) => ctor.name.clone(),
            Self::Function(f) => format!("<fun {}>", f.describe()),
            Self::Partial(p) => format!("<partial {}>", p.target.inspect()),
            Self::Bound(b) => format!("<bound {}>", b.callable.inspect()),
            Self::ClassMethod(m) => format!("<method {}.{}>", m.trait_name, m.method),
            Self::OperatorFn(op) => format!("({op})"),
            Self::Composed(_) => "<composed>".to_owned(),
            Self::Dictionary(d) => format!("<dictionary {}>", d.trait_name),
            Self::TypeObject(term) => format!("{term:?}"),
            Self::Builtin(b) => format!("<builtin {}>", b.name),
            Self::HostClosure(h) => format!("<host {}>", h.name),
            Self::Bytes(bytes) => {
                let mut out = String::with_capacity(2 + bytes.len() * 2);
                out.push_str("0x");
                for byte in bytes.as_slice() {
                    out.push_str(&format!("{byte:02x}"));
                }
                out
            }
            Self::Bits(bits) => {
                let mut out = String::with_capacity(2 + bits.len());
                out.push_str("0b");
                for bit in bits.iter() {
                    out.push(if bit { '1' } else { '0' });
                }
                out
            }
            Self::Range(range) => {
                let op = if range.inclusive { "..=" } else { ".." };
                if range.step == 1 {
                    format!("{}{op}{}", range.start, range.end)
                } else {
                    format!("{}{op}{} by {}", range.start, range.end, range.step)
                }
            }
            Self::Error(err) => err.inspect(),
            Self::Signal(_) => "<signal>".to_owned(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.value_eq(other)
    }
}

/// Fixed-seed hasher state so value hashes are stable within a process and
/// across forked evaluators.
fn fixed_state() -> ahash::RandomState {
    ahash::RandomState::with_seeds(
        0x2436_a29f_c0e5_31cc,
        0x9e37_79b9_7f4a_7c15,
        0x1656_67b1_9e37_79f9,
        0x27d4_eb2f_1656_67c5,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_and_bigint_compare_and_hash_alike() {
        let small = Value::Int(42);
        let big = Value::BigInt(Arc::new(BigInt::from(42)));
        assert!(small.value_eq(&big));
        assert_eq!(small.hash32(), big.hash32());
    }

    #[test]
    fn int_and_float_are_not_value_equal() {
        assert!(!Value::Int(1).value_eq(&Value::Float(1.0)));
    }

    #[test]
    fn char_list_is_string_for_dispatch() {
        let s = Value::string("hi");
        assert_eq!(s.type_name(), "String");
        assert_eq!(s.inspect(), "hi");
        let ints = Value::List(List::from_values([Value::Int(1), Value::Int(2)]));
        assert_eq!(ints.type_name(), "List");
        assert_eq!(ints.inspect(), "[1, 2]");
    }

    #[test]
    fn row_extended_record_loses_nominal_type_name() {
        let rec = Record::new(vec![("x".to_owned(), Value::Int(1))], Some(Arc::from("Point")));
        assert_eq!(Value::Record(rec.clone()).type_name(), "Point");
        let extended = rec.set("y", Value::Int(2));
        assert_eq!(Value::Record(extended).type_name(), "Record");
    }

    #[test]
    fn float_inspect_uses_shortest_form() {
        assert_eq!(Value::Float(1.0).inspect(), "1.0");
        assert_eq!(Value::Float(0.1).inspect(), "0.1");
    }

    #[test]
    fn map_hash_is_order_independent() {
        let a = Map::new()
            .put(Value::Int(1), Value::Int(10))
            .put(Value::Int(2), Value::Int(20));
        let b = Map::new()
            .put(Value::Int(2), Value::Int(20))
            .put(Value::Int(1), Value::Int(10));
        assert_eq!(Value::Map(a).hash32(), Value::Map(b).hash32());
    }
}
