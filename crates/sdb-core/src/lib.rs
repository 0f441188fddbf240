//! Execution-control core of the sdb line debugger.
//!
//! A host runtime calls [`Debugger::on_statement_boundary`] before every
//! statement and [`Debugger::on_program_end`] once the program finishes. In
//! between, the debugger decides whether to halt, runs its interactive command
//! loop while the program is suspended, and tells the host how to carry on.
//!
//! Everything the debugger needs from the program (expression evaluation,
//! source text, stack frames) comes through the [`Host`] trait.

pub mod alias;
pub mod breakpoints;
pub mod commands;
pub mod debugger;
mod dispatcher;
pub mod error;
pub mod history;
pub mod host;
pub mod input;
pub mod registry;
pub mod restart;
pub mod router;
pub mod source;
pub mod state;
pub mod watch;

/// A scriptable host for tests and demos.
pub mod mock;

pub use crate::debugger::{Control, Debugger, DebuggerBuilder, Session, WatchFunction};
pub use crate::error::{DebugError, DebugResult, EvalError};
pub use crate::host::{EvalContext, EvalRequest, FrameInfo, Host, SubroutineRange, Value};
pub use crate::input::{LineReader, ScriptReader, StdinReader};
pub use crate::registry::{CommandHandler, Handled};
pub use crate::restart::{RestartState, RESTART_FAILED_STATUS, RESTART_STATE_ENV_VAR};
pub use crate::source::{FileId, SourceBuffer, SourcePosition};
pub use crate::state::{SignalFlag, StepMode};
pub use sdb_config::SessionConfig;
