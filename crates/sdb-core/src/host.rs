//! The boundary between the debugger core and the program being debugged.
//!
//! The core never parses or evaluates program code itself. Everything it needs
//! to know about the suspended program comes through [`Host`].

use std::fmt;

use crate::error::EvalError;
use crate::source::{FileId, SourceBuffer};

/// Why an expression is being evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalContext {
    /// A breakpoint condition.
    Condition,
    /// A line action or a pre/post-prompt expression.
    Action,
    /// A watch expression, re-evaluated at every statement boundary.
    Watch,
    /// An expression typed at the prompt.
    Command,
}

impl EvalContext {
    /// Whether the expression is expected to have side effects on the program.
    pub fn allows_side_effects(self) -> bool {
        matches!(self, Self::Action | Self::Command)
    }
}

/// An expression to evaluate inside the suspended program's own scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalRequest {
    pub expression: String,
    pub namespace: String,
    pub context: EvalContext,
}

impl EvalRequest {
    pub fn new(expression: impl Into<String>, namespace: impl Into<String>, context: EvalContext) -> Self {
        Self {
            expression: expression.into(),
            namespace: namespace.into(),
            context,
        }
    }
}

/// The result of an evaluation, already rendered to text by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Undef,
    Scalar(String),
    List(Vec<String>),
}

impl Value {
    pub fn scalar(text: impl Into<String>) -> Self {
        Self::Scalar(text.into())
    }

    /// `undef`, the empty string, `"0"` and the empty list are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Undef => false,
            Self::Scalar(text) => !(text.is_empty() || text == "0"),
            Self::List(items) => !items.is_empty(),
        }
    }

    /// The single-line rendering used by `p` and by watch change detection.
    pub fn display(&self) -> String {
        match self {
            Self::Undef => "undef".to_owned(),
            Self::Scalar(text) => text.clone(),
            Self::List(items) => items.join(""),
        }
    }

    /// Indexed, one element per line. Used when a one-time dump was requested.
    pub fn dump(&self) -> String {
        match self {
            Self::Undef => "0  undef".to_owned(),
            Self::Scalar(text) => format!("0  '{text}'"),
            Self::List(items) if items.is_empty() => "  empty array".to_owned(),
            Self::List(items) => items
                .iter()
                .enumerate()
                .map(|(idx, item)| format!("{idx}  '{item}'"))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

/// Source range of a named subroutine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubroutineRange {
    pub file: FileId,
    pub start: u32,
    pub end: u32,
}

/// One frame of the debugged program's call stack, innermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    pub subroutine: String,
    pub args: Vec<String>,
    pub file: FileId,
    pub line: u32,
    /// `$` scalar, `@` list or `.` void context, when the host knows it.
    pub context: Option<char>,
}

/// Services the debugged program provides to the debugger.
///
/// Only [`Host::evaluate`] and [`Host::namespace`] are required; the remaining
/// methods back individual commands and default to "nothing known".
pub trait Host {
    /// Evaluate `request.expression` with the program's live bindings.
    fn evaluate(&mut self, request: &EvalRequest) -> Result<Value, EvalError>;

    /// Namespace (package) of the statement about to execute.
    fn namespace(&self) -> String;

    fn subroutines(&self) -> Vec<String> {
        Vec::new()
    }

    fn resolve_subroutine(&self, _name: &str) -> Option<SubroutineRange> {
        None
    }

    fn stack_frames(&self) -> Vec<FrameInfo> {
        Vec::new()
    }

    /// Package variables of `namespace` whose names match any of `patterns`
    /// (all of them when `patterns` is empty), as `(name, rendered value)`.
    fn variables(&mut self, _namespace: &str, _patterns: &[String]) -> Result<Vec<(String, String)>, EvalError> {
        Err(EvalError::unsupported("listing variables"))
    }

    /// Lexicals visible `level` frames up from the current statement.
    fn lexicals(&mut self, _level: usize, _patterns: &[String]) -> Result<Vec<(String, String)>, EvalError> {
        Err(EvalError::unsupported("listing lexical variables"))
    }

    /// Methods callable on the value of `expression`.
    fn methods(&mut self, _expression: &str, _namespace: &str) -> Result<Vec<String>, EvalError> {
        Err(EvalError::unsupported("listing methods"))
    }

    /// Source text and breakable-line flags of a file the debugger has not
    /// seen yet.
    fn load_source(&mut self, _file: &FileId) -> Option<SourceBuffer> {
        None
    }

    /// Files the program has loaded, for `f` lookups.
    fn loaded_files(&self) -> Vec<FileId> {
        Vec::new()
    }

    /// `Some` when the runtime is multi-threaded.
    fn thread_id(&self) -> Option<u64> {
        None
    }

    /// Last observed exit status of the program; what `q` exits with.
    fn exit_status(&self) -> i32 {
        0
    }
}
