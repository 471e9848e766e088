use std::fmt::{self, Display, Write};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Result type alias for operations that can produce a runtime error.
pub type RunResult<T> = Result<T, RunError>;

/// Error kinds observable from inside the engine.
///
/// Uses strum derives for automatic `Display`, `FromStr`, and `Into<&'static str>`
/// implementations. The string representation matches the variant name exactly
/// (e.g., `ArityMismatch` -> "ArityMismatch").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum ErrorKind {
    /// A callable received more arguments than it can accept.
    ArityMismatch,
    /// An operand or argument had a runtime type the operation cannot handle.
    TypeMismatch,
    /// A name was looked up and found in no enclosing scope.
    UnknownIdentifier,
    /// An operator has no primitive rule and no trait instance for its operands.
    UnknownOperator,
    /// Integer or rational division (or modulo) by zero.
    DivisionByZero,
    /// A list, tuple, bytes, or bits index fell outside the sequence.
    IndexOutOfRange,
    /// A match expression exhausted its arms without a match.
    PatternMatchFailed,
    /// No trait implementation was found for a dispatched method.
    NoImplementation,
    /// The evaluator exceeded its recursion bound.
    MaxRecursionExceeded,
    /// The cancellation token was set (or the time budget ran out).
    Cancelled,
    /// A host callback reported a failure.
    HostCall,
    /// Any other inconsistency, e.g. a loop signal escaping its loop.
    Invalid,
}

/// A source position carried by errors and stack frames.
///
/// Columns are 1-based except where a primitive-operator error is re-homed to
/// its enclosing node, which reports column 0 for backend parity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CodeLoc {
    pub line: u32,
    pub column: u32,
}

impl CodeLoc {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl Display for CodeLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// One frame of a captured call stack.
///
/// Frames are stored innermost-first (reversed relative to call order), which
/// is the order `inspect()` renders them in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Name of the function executing in this frame.
    pub name: String,
    /// Source file the frame's call site lives in.
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl StackFrame {
    pub fn new(name: impl Into<String>, file: impl Into<String>, loc: CodeLoc) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
            line: loc.line,
            column: loc.column,
        }
    }
}

/// A structured runtime error.
///
/// Errors bubble along the normal return path as the `Err` arm of [`RunResult`];
/// any callable may short-circuit by returning one. The applier attaches the
/// current call stack the first time an error rises through it, and the driver
/// tags location-less operator errors with the enclosing node's position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunError {
    pub kind: ErrorKind,
    pub message: String,
    pub loc: Option<CodeLoc>,
    /// Captured call stack, innermost frame first. Empty until the error first
    /// rises through the applier.
    pub frames: Vec<StackFrame>,
}

impl RunError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            loc: None,
            frames: Vec::new(),
        }
    }

    pub fn with_loc(mut self, loc: CodeLoc) -> Self {
        self.loc = Some(loc);
        self
    }

    /// Tags the error with a position unless it already carries one.
    pub fn set_loc_if_missing(&mut self, loc: CodeLoc) {
        if self.loc.is_none() {
            self.loc = Some(loc);
        }
    }

    /// True once a call stack has been attached.
    pub fn has_trace(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Attaches a captured call stack (innermost first). Later attachments are
    /// ignored so the deepest capture wins.
    pub fn attach_frames(&mut self, frames: Vec<StackFrame>) {
        if self.frames.is_empty() {
            self.frames = frames;
        }
    }

    /// Rewrites the innermost frame's position to the given instruction site.
    pub fn retarget_top_frame(&mut self, loc: CodeLoc) {
        if let Some(frame) = self.frames.first_mut() {
            frame.line = loc.line;
            frame.column = loc.column;
        }
    }

    /// Human-readable rendering: the message, the position if known, then the
    /// stack innermost-to-outermost as `at <caller>:<line> (called <callee>)`.
    pub fn inspect(&self) -> String {
        let mut out = String::new();
        let _ = write!(out, "{}: {}", self.kind, self.message);
        if let Some(loc) = self.loc {
            let _ = write!(out, " at {loc}");
        }
        let mut callee: Option<&str> = None;
        for frame in &self.frames {
            let _ = write!(out, "\n  at {}:{}", frame.name, frame.line);
            if let Some(callee) = callee {
                let _ = write!(out, " (called {callee})");
            }
            callee = Some(&frame.name);
        }
        out
    }

    // --- constructor helpers, one per commonly-raised shape ---

    pub(crate) fn arity_mismatch(name: &str, expected: usize, got: usize) -> Self {
        Self::new(
            ErrorKind::ArityMismatch,
            format!("{name} takes {expected} argument(s) but {got} were given"),
        )
    }

    pub(crate) fn arity_at_least(name: &str, expected: usize, got: usize) -> Self {
        Self::new(
            ErrorKind::ArityMismatch,
            format!("{name} takes at least {expected} argument(s) but {got} were given"),
        )
    }

    pub fn type_mismatch(msg: impl Display) -> Self {
        Self::new(ErrorKind::TypeMismatch, msg.to_string())
    }

    pub(crate) fn not_callable(type_name: &str) -> Self {
        Self::new(ErrorKind::TypeMismatch, format!("value of type {type_name} is not callable"))
    }

    pub(crate) fn unknown_identifier(name: &str) -> Self {
        Self::new(ErrorKind::UnknownIdentifier, format!("unknown identifier {name}"))
    }

    pub(crate) fn unknown_operator(op: &str, type_name: &str) -> Self {
        Self::new(
            ErrorKind::UnknownOperator,
            format!("operator {op} is not defined for {type_name}"),
        )
    }

    pub(crate) fn division_by_zero() -> Self {
        Self::new(ErrorKind::DivisionByZero, "division by zero")
    }

    pub(crate) fn index_out_of_range(index: i64, len: usize) -> Self {
        Self::new(
            ErrorKind::IndexOutOfRange,
            format!("index {index} out of range for length {len}"),
        )
    }

    pub(crate) fn pattern_match_failed() -> Self {
        Self::new(ErrorKind::PatternMatchFailed, "no pattern matched the value")
    }

    pub(crate) fn no_implementation(trait_name: &str, type_name: &str, method: &str) -> Self {
        Self::new(
            ErrorKind::NoImplementation,
            format!("implementation of class {trait_name} for type {type_name} (method {method}) not found"),
        )
    }

    pub(crate) fn max_recursion(limit: usize) -> Self {
        Self::new(
            ErrorKind::MaxRecursionExceeded,
            format!("maximum recursion depth of {limit} exceeded"),
        )
    }

    pub(crate) fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "evaluation cancelled")
    }

    pub(crate) fn host_call(msg: impl Display) -> Self {
        Self::new(ErrorKind::HostCall, msg.to_string())
    }

    pub(crate) fn invalid(msg: impl Display) -> Self {
        Self::new(ErrorKind::Invalid, msg.to_string())
    }
}

impl Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inspect())
    }
}

impl std::error::Error for RunError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inspect_renders_frames_innermost_first() {
        let mut err = RunError::unknown_identifier("x").with_loc(CodeLoc::new(3, 7));
        err.attach_frames(vec![
            StackFrame::new("inner", "main.vela", CodeLoc::new(3, 7)),
            StackFrame::new("outer", "main.vela", CodeLoc::new(9, 1)),
        ]);
        let rendered = err.inspect();
        assert!(rendered.starts_with("UnknownIdentifier: unknown identifier x at 3:7"));
        assert!(rendered.contains("at inner:3"));
        assert!(rendered.contains("at outer:9 (called inner)"));
    }

    #[test]
    fn later_frame_attachment_is_ignored() {
        let mut err = RunError::division_by_zero();
        err.attach_frames(vec![StackFrame::new("f", "main.vela", CodeLoc::new(1, 1))]);
        err.attach_frames(vec![StackFrame::new("g", "main.vela", CodeLoc::new(2, 2))]);
        assert_eq!(err.frames.len(), 1);
        assert_eq!(err.frames[0].name, "f");
    }
}
