//! The typed AST contract with the upstream analyser.
//!
//! The engine does not lex, parse, or infer: programs arrive as trees of
//! [`Node`]s already scoped and annotated, alongside a
//! [`crate::typesys::TypeMap`] keyed by [`NodeId`]. Every node carries a
//! source position; call nodes additionally carry the analyser's witness
//! expressions and type-variable instantiations, which the applier and
//! dispatcher consume at run time.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::{error::CodeLoc, typesys::TypeTerm};

/// Stable node identity, assigned by the analyser.
///
/// Used as the key into the type map; two nodes with the same id share a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Shared handle to a node. The evaluator holds the tree through these and
/// closures keep their body subtree alive past program teardown.
pub type NodeRef = Arc<Node>;

/// One node of the typed AST.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub loc: CodeLoc,
    pub kind: NodeKind,
}

impl Node {
    pub fn new(id: NodeId, loc: CodeLoc, kind: NodeKind) -> NodeRef {
        Arc::new(Self { id, loc, kind })
    }
}

/// Infix operator tokens.
///
/// The strum serialization is the surface token, which is also the method
/// name user instances bind operators under (wrapped in parentheses).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum InfixOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "%")]
    Mod,
    #[strum(serialize = "++")]
    Concat,
    #[strum(serialize = "::")]
    Cons,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = "&&")]
    And,
    #[strum(serialize = "||")]
    Or,
    #[strum(serialize = "|>")]
    Pipe,
    #[strum(serialize = "|>>")]
    PipeUnwrap,
    #[strum(serialize = ",,")]
    Compose,
    #[strum(serialize = "$")]
    Apply,
    #[strum(serialize = "??")]
    Coalesce,
    #[strum(serialize = ">>=")]
    Bind,
    #[strum(serialize = "<*>")]
    Ap,
    #[strum(serialize = "<$>")]
    Fmap,
}

/// Prefix operator tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum PrefixOp {
    #[strum(serialize = "!")]
    Not,
    #[strum(serialize = "-")]
    Neg,
    #[strum(serialize = "~")]
    BitNot,
}

/// Postfix operator tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum PostfixOp {
    /// Early-return unwrap on `Result`/`Option`.
    #[strum(serialize = "?")]
    Try,
}

/// A function parameter: name, optional default expression, variadic flag.
///
/// At most one parameter may be variadic and it must be last; the analyser
/// guarantees both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub default: Option<NodeRef>,
    pub variadic: bool,
}

impl Param {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
            variadic: false,
        }
    }
}

/// A function literal: shared by named function statements, lambdas, trait
/// defaults, and instance methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuncLit {
    /// Present for named function statements and instance methods.
    pub name: Option<String>,
    pub params: Vec<Param>,
    /// Names the analyser allocated for leading dictionary parameters.
    pub witness_params: Vec<String>,
    /// Declared return type; its head constructor seeds a context witness.
    pub return_type: Option<TypeTerm>,
    pub body: NodeRef,
}

/// A destructuring pattern.
///
/// Tuple and list patterns are exact-arity. Binding is all-or-nothing: the
/// target environment is unchanged unless the whole pattern matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Pattern {
    Wildcard,
    Ident(String),
    Int(i64),
    Bool(bool),
    Str(String),
    Tuple(Vec<Pattern>),
    List(Vec<Pattern>),
}

/// One arm of a match expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub guard: Option<NodeRef>,
    pub body: NodeRef,
}

/// One clause of a comprehension: a generator or a filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CompClause {
    Generator { pattern: Pattern, iterable: NodeRef },
    Filter(NodeRef),
}

/// A trait method declaration: name, declared arity, the operator token it
/// backs (if any), and an optional default body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraitMethodDecl {
    pub name: String,
    pub arity: usize,
    pub operator: Option<String>,
    pub default: Option<FuncLit>,
}

/// A trait declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraitDecl {
    pub name: String,
    /// Type parameters; more than one makes this an MPTC.
    pub type_params: Vec<String>,
    pub supers: Vec<String>,
    pub methods: Vec<TraitMethodDecl>,
}

/// An instance declaration: the trait, the ordered type key (one name per
/// trait type parameter), and the method bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceDecl {
    pub trait_name: String,
    pub type_key: Vec<String>,
    pub methods: Vec<(String, FuncLit)>,
}

/// The body of a type declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TypeDeclBody {
    /// An algebraic data type with named constructors.
    Adt { constructors: Vec<(String, usize)> },
    /// A transparent alias.
    Alias(TypeTerm),
    /// A nominal record type.
    Record { fields: Vec<(String, TypeTerm)> },
}

/// A type declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: TypeDeclBody,
}

/// The node kinds the analyser may produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeKind {
    Program {
        decls: Vec<NodeRef>,
    },
    Import {
        module: String,
    },
    TypeDecl(TypeDecl),
    TraitDecl(TraitDecl),
    InstanceDecl(InstanceDecl),
    /// An extension-method declaration: methods grafted onto an existing type,
    /// registered under the synthetic per-type extension trait.
    ExtensionDecl {
        type_name: String,
        methods: Vec<(String, FuncLit)>,
    },
    ConstDecl {
        name: String,
        annotation: Option<TypeTerm>,
        value: NodeRef,
    },
    FuncStmt {
        name: String,
        func: FuncLit,
    },
    Block {
        stmts: Vec<NodeRef>,
    },

    // --- literals ---
    IntLit(i64),
    /// Integer literals exceeding i64, carried as a decimal string.
    BigIntLit(String),
    FloatLit(f64),
    BoolLit(bool),
    CharLit(char),
    StringLit(String),
    NilLit,

    Ident {
        name: String,
    },
    Call {
        target: NodeRef,
        args: Vec<NodeRef>,
        /// Witness expressions, evaluated to dictionaries and prepended to args.
        witnesses: Vec<NodeRef>,
        /// Type-variable instantiation `{var -> concrete}` for this call site.
        instantiation: Vec<(String, TypeTerm)>,
    },
    /// Explicit type application `f@<T, ...>`.
    TypeApply {
        target: NodeRef,
        args: Vec<TypeTerm>,
    },
    /// `e : T`
    Annotated {
        expr: NodeRef,
        ty: TypeTerm,
    },
    Prefix {
        op: PrefixOp,
        operand: NodeRef,
    },
    Infix {
        op: InfixOp,
        left: NodeRef,
        right: NodeRef,
    },
    Postfix {
        op: PostfixOp,
        operand: NodeRef,
    },
    If {
        cond: NodeRef,
        then: NodeRef,
        alt: Option<NodeRef>,
    },
    Match {
        subject: NodeRef,
        arms: Vec<MatchArm>,
    },
    For {
        pattern: Pattern,
        iterable: NodeRef,
        body: NodeRef,
    },
    Range {
        start: NodeRef,
        end: NodeRef,
        step: Option<NodeRef>,
        inclusive: bool,
    },
    Lambda(FuncLit),
    TupleLit {
        items: Vec<NodeRef>,
    },
    ListLit {
        items: Vec<NodeRef>,
    },
    ListComp {
        element: NodeRef,
        clauses: Vec<CompClause>,
    },
    MapLit {
        pairs: Vec<(NodeRef, NodeRef)>,
    },
    RecordLit {
        /// Nominal type name, absent for anonymous records.
        name: Option<String>,
        /// Record to spread (`{...base, k: v}`), evaluated first.
        spread: Option<NodeRef>,
        fields: Vec<(String, NodeRef)>,
    },
    Member {
        target: NodeRef,
        name: String,
    },
    Index {
        target: NodeRef,
        index: NodeRef,
    },
    /// `let`-style declaration: defines in the current frame.
    ///
    /// The annotation, when present, informs dispatch of `value` exactly like
    /// an annotated expression.
    Declare {
        name: String,
        annotation: Option<TypeTerm>,
        value: NodeRef,
    },
    /// Assignment expression: rebinds in the defining frame, or defines here.
    Assign {
        target: NodeRef,
        value: NodeRef,
    },
    /// Destructuring bind of a pattern against a value.
    PatternAssign {
        pattern: Pattern,
        value: NodeRef,
    },
    Return {
        value: Option<NodeRef>,
    },
    Break {
        value: Option<NodeRef>,
    },
    Continue,
}

impl NodeKind {
    /// Short human-readable name used in tracer output and error messages.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Program { .. } => "program",
            Self::Import { .. } => "import",
            Self::TypeDecl(_) => "type declaration",
            Self::TraitDecl(_) => "trait declaration",
            Self::InstanceDecl(_) => "instance declaration",
            Self::ExtensionDecl { .. } => "extension declaration",
            Self::ConstDecl { .. } => "constant declaration",
            Self::FuncStmt { .. } => "function statement",
            Self::Block { .. } => "block",
            Self::IntLit(_) | Self::BigIntLit(_) => "integer literal",
            Self::FloatLit(_) => "float literal",
            Self::BoolLit(_) => "bool literal",
            Self::CharLit(_) => "char literal",
            Self::StringLit(_) => "string literal",
            Self::NilLit => "nil literal",
            Self::Ident { .. } => "identifier",
            Self::Call { .. } => "call",
            Self::TypeApply { .. } => "type application",
            Self::Annotated { .. } => "annotated expression",
            Self::Prefix { .. } => "prefix expression",
            Self::Infix { .. } => "infix expression",
            Self::Postfix { .. } => "postfix expression",
            Self::If { .. } => "if expression",
            Self::Match { .. } => "match expression",
            Self::For { .. } => "for loop",
            Self::Range { .. } => "range expression",
            Self::Lambda(_) => "lambda",
            Self::TupleLit { .. } => "tuple literal",
            Self::ListLit { .. } => "list literal",
            Self::ListComp { .. } => "list comprehension",
            Self::MapLit { .. } => "map literal",
            Self::RecordLit { .. } => "record literal",
            Self::Member { .. } => "member access",
            Self::Index { .. } => "index access",
            Self::Declare { .. } => "declaration",
            Self::Assign { .. } => "assignment",
            Self::PatternAssign { .. } => "pattern assignment",
            Self::Return { .. } => "return",
            Self::Break { .. } => "break",
            Self::Continue => "continue",
        }
    }
}
