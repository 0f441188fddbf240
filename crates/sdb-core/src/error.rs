use thiserror::Error;

pub type DebugResult<T> = Result<T, DebugError>;

/// Failure reported by the host while evaluating an expression.
///
/// The message is opaque to the debugger; it is shown to the operator as-is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct EvalError {
    pub message: String,
}

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn unsupported(what: &str) -> Self {
        Self::new(format!("{what} is not supported by this program"))
    }
}

#[derive(Error, Debug)]
pub enum DebugError {
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error("Line {line} not breakable.")]
    NotBreakable { line: u32 },
    #[error("Subroutine {0} not found.")]
    UnknownSubroutine(String),
    #[error("No file matching '{0}' is loaded.")]
    UnknownFile(String),
    #[error("Not stopped at a line of the current file.")]
    NoCurrentLine,
    #[error("No breakpoint at line {0}.")]
    NoBreakpoint(u32),
    #[error("No such watch expression: {0}")]
    UnknownWatch(String),
    #[error("{0}")]
    History(String),
    #[error("Cannot install alias `{name}`: {reason}")]
    InvalidAlias { name: String, reason: String },
    #[error("Invalid search pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
    #[error(transparent)]
    Config(#[from] sdb_config::ConfigError),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("restart failed: {0}")]
    RestartFailed(String),
}

impl DebugError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
