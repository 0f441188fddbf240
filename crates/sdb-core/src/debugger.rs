//! The statement-boundary entry point and the session it drives.

use std::cell::RefCell;
use std::io::{self, Write};

use parking_lot::ReentrantMutex;
use sdb_config::SessionConfig;

use crate::alias::AliasTable;
use crate::breakpoints::{BreakpointTable, StopCondition};
use crate::error::DebugResult;
use crate::history::History;
use crate::host::{EvalContext, EvalRequest, Host};
use crate::input::{InputStack, LineReader, StdinReader};
use crate::registry::{CommandHandler, CommandRegistry};
use crate::restart::{RestartController, RestartState, SavedBreakpoint};
use crate::router::OutputRouter;
use crate::source::{FileId, SourceBuffer, SourcePosition, SourceView};
use crate::state::{ExecutionState, SignalFlag, StepMode};
use crate::watch::WatchSet;

/// What the host should do after a statement boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Execute the statement and carry on.
    Resume,
    /// End the program with `status`.
    Quit { status: i32 },
}

/// Per-statement hook consulted before breakpoints. Returning `true` lets the
/// statement run without halting unless the session is stepping, an interrupt
/// is pending or tracing is on.
pub trait WatchFunction: Send {
    fn on_statement(&mut self, namespace: &str, file: &FileId, line: u32) -> bool;
}

impl<F> WatchFunction for F
where
    F: FnMut(&str, &FileId, u32) -> bool + Send,
{
    fn on_statement(&mut self, namespace: &str, file: &FileId, line: u32) -> bool {
        self(namespace, file, line)
    }
}

/// Step command repeated by an empty input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LastStep {
    Into,
    Over,
}

impl LastStep {
    pub(crate) fn command(self) -> &'static str {
        match self {
            Self::Into => "s",
            Self::Over => "n",
        }
    }
}

/// All debugger state of one session.
pub struct Session {
    pub(crate) config: SessionConfig,
    pub(crate) sources: SourceView,
    pub(crate) breakpoints: BreakpointTable,
    pub(crate) watches: WatchSet,
    pub(crate) history: History,
    pub(crate) aliases: AliasTable,
    pub(crate) registry: CommandRegistry,
    pub(crate) state: ExecutionState,
    pub(crate) input: InputStack,
    pub(crate) out: OutputRouter,
    pub(crate) restart: RestartController,
    pub(crate) watch_fn: Option<Box<dyn WatchFunction>>,
    pub(crate) pre_prompt: Vec<String>,
    pub(crate) post_prompt: Vec<String>,
    pub(crate) last_step: Option<LastStep>,
    pub(crate) last_search: Option<String>,
    pub(crate) one_time_dump: bool,
    pub(crate) position: Option<SourcePosition>,
    pub(crate) exit_status: Option<i32>,
    pub(crate) halts: usize,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("position", &self.position)
            .field("step_mode", &self.state.step_mode())
            .field("depth", &self.state.depth())
            .field("breakpoints", &self.breakpoints.len())
            .field("watches", &self.watches.len())
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn sources(&self) -> &SourceView {
        &self.sources
    }

    pub fn breakpoints(&self) -> &BreakpointTable {
        &self.breakpoints
    }

    pub fn watches(&self) -> &WatchSet {
        &self.watches
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    pub fn step_mode(&self) -> StepMode {
        self.state.step_mode()
    }

    pub fn depth(&self) -> usize {
        self.state.depth()
    }

    pub fn is_tracing(&self) -> bool {
        self.state.trace
    }

    pub fn is_finished(&self) -> bool {
        self.state.finished
    }

    /// Whether session output is currently going through a pager.
    pub fn is_piped(&self) -> bool {
        self.out.is_piped()
    }

    /// Where the most recent halt happened.
    pub fn position(&self) -> Option<&SourcePosition> {
        self.position.as_ref()
    }

    /// Number of times the command loop has been entered.
    pub fn halt_count(&self) -> usize {
        self.halts
    }

    pub fn pre_prompt(&self) -> &[String] {
        &self.pre_prompt
    }

    pub fn post_prompt(&self) -> &[String] {
        &self.post_prompt
    }

    pub(crate) fn ensure_source(&mut self, host: &mut dyn Host, file: &FileId) {
        if self.sources.contains(file) {
            return;
        }
        if let Some(buffer) = host.load_source(file) {
            tracing::debug!(target: "sdb.core", file = %file, lines = buffer.len(), "source loaded");
            self.sources.insert(buffer);
        }
    }

    fn apply_restart_state(&mut self, restored: RestartState) {
        if let Some(options) = restored.options {
            self.config = options;
            self.state.set_non_stop(self.config.non_stop);
        }
        self.breakpoints.restore(
            restored
                .breakpoints
                .into_iter()
                .map(|saved| (saved.file, saved.line, saved.breakpoint)),
        );
        self.watches.restore(restored.watches);
        for alias in restored.aliases {
            if let Err(err) = self.aliases.define(&alias.name, &alias.value) {
                tracing::warn!(target: "sdb.core", alias = %alias.name, error = %err, "alias dropped on restart");
            }
        }
        self.pre_prompt = restored.pre_prompt;
        self.post_prompt = restored.post_prompt;
        if !restored.history.is_empty() {
            self.history = History::with_entries(restored.history);
        }
        self.input.queue_typeahead(restored.typeahead);
    }

    /// Everything `R` carries into the next process image.
    pub(crate) fn restart_state(&self) -> RestartState {
        RestartState {
            breakpoints: self
                .breakpoints
                .iter()
                .map(|(file, line, breakpoint)| SavedBreakpoint {
                    file: file.clone(),
                    line,
                    breakpoint: breakpoint.clone(),
                })
                .collect(),
            watches: self.watches.entries().to_vec(),
            aliases: self.aliases.definitions(),
            options: Some(self.config.clone()),
            pre_prompt: self.pre_prompt.clone(),
            post_prompt: self.post_prompt.clone(),
            history: self.history.true_log().to_vec(),
            typeahead: Vec::new(),
        }
    }

    /// `namespace::(file:line):\tsource`, plus the lines that continue the
    /// statement.
    pub(crate) fn write_position(&mut self, namespace: &str, position: &SourcePosition) {
        let buffer = self.sources.get(&position.file);
        let text = buffer.and_then(|buffer| buffer.line(position.line)).unwrap_or_default();
        let _ = writeln!(
            self.out,
            "{namespace}::({}:{}):\t{text}",
            position.file, position.line
        );
        if let Some(buffer) = buffer {
            for (line, text) in buffer.continuation_lines(position.line) {
                let _ = writeln!(self.out, "{line}:\t{text}");
            }
        }
    }

    fn evaluate_action(&mut self, host: &mut dyn Host, namespace: &str, expression: &str) {
        let request = EvalRequest::new(expression, namespace, EvalContext::Action);
        if let Err(err) = host.evaluate(&request) {
            tracing::warn!(target: "sdb.core", expression, error = %err, "action failed");
            let _ = writeln!(self.out, "{err}");
        }
    }

    /// One statement boundary.
    pub(crate) fn boundary(&mut self, host: &mut dyn Host, position: &SourcePosition, depth: usize) -> Control {
        self.state.sync_depth(depth);
        self.state.set_non_stop(self.config.non_stop);
        let signal = self.state.signal.is_raised();

        if self.config.non_stop && !signal {
            self.state.clear_steps();
            return Control::Resume;
        }

        self.ensure_source(host, &position.file);
        let namespace = host.namespace();

        if let Some(watch_fn) = self.watch_fn.as_mut() {
            let proceed = watch_fn.on_statement(&namespace, &position.file, position.line);
            if proceed && !self.state.stepping() && !signal && !self.state.trace {
                return Control::Resume;
            }
        }

        let mut forced = false;
        let mut action = None;
        if let Some(hit) = self.breakpoints.reach(&position.file, position.line) {
            action = hit.action;
            forced = hit.once;
            match hit.stop {
                None => {}
                Some(StopCondition::Always) => forced = true,
                Some(StopCondition::When(condition)) => {
                    let request = EvalRequest::new(condition.as_str(), namespace.as_str(), EvalContext::Condition);
                    match host.evaluate(&request) {
                        Ok(value) => forced |= value.is_truthy(),
                        Err(err) => {
                            tracing::warn!(
                                target: "sdb.core",
                                %position,
                                condition = %condition,
                                error = %err,
                                "breakpoint condition failed"
                            );
                            let _ = writeln!(
                                self.out,
                                "Error in breakpoint condition at {position}: {err}"
                            );
                        }
                    }
                }
            }
            if forced {
                tracing::debug!(target: "sdb.core", %position, "breakpoint hit");
            }
        }

        if !self.watches.is_empty() {
            let report = self.watches.observe(|expression| {
                host.evaluate(&EvalRequest::new(expression, namespace.as_str(), EvalContext::Watch))
            });
            for failure in &report.failures {
                tracing::warn!(
                    target: "sdb.core",
                    watch = %failure.expression,
                    error = %failure.error,
                    "watch expression failed"
                );
                let _ = writeln!(
                    self.out,
                    "Watch expression '{}' failed: {}",
                    failure.expression, failure.error
                );
            }
            for change in &report.changes {
                tracing::debug!(
                    target: "sdb.core",
                    watch = %change.expression,
                    old = %change.old_value,
                    new = %change.new_value,
                    "watch changed"
                );
                let _ = writeln!(
                    self.out,
                    "Watchpoint {}:\t{} changed:\n    old value:\t'{}'\n    new value:\t'{}'",
                    change.index, change.expression, change.old_value, change.new_value
                );
            }
            forced |= report.forces_halt();
        }

        let halt = self.state.stepping() || forced || signal;
        if halt || self.state.trace {
            self.write_position(&namespace, position);
        }
        if let Some(action) = action {
            self.evaluate_action(host, &namespace, &action);
        }
        if !halt {
            return Control::Resume;
        }

        tracing::debug!(
            target: "sdb.core",
            %position,
            depth,
            step_mode = ?self.state.step_mode(),
            signal,
            "halted"
        );
        self.state.last_signal = signal;
        self.state.signal.take();
        self.position = Some(position.clone());
        if self.sources.contains(&position.file) {
            // The operator looks at the halted file until they pick another one.
            let _ = self.sources.switch_to(&position.file, position.line);
        }

        let control = self.halt(host, &namespace);
        self.state.signal.take();
        control
    }

    /// Run the command loop with its pre- and post-prompt expressions.
    fn halt(&mut self, host: &mut dyn Host, namespace: &str) -> Control {
        self.halts += 1;
        for expression in self.pre_prompt.clone() {
            self.evaluate_action(host, namespace, &expression);
        }
        let control = self.command_loop(host);
        if control == Control::Resume {
            for expression in self.post_prompt.clone() {
                self.evaluate_action(host, namespace, &expression);
            }
        }
        let _ = self.out.flush();
        control
    }

    pub(crate) fn program_end(&mut self, host: &mut dyn Host, status: i32) -> Control {
        self.exit_status = Some(status);
        self.state.finished = true;
        tracing::debug!(target: "sdb.core", status, "program finished");
        if self.config.non_stop || !self.config.inhibit_exit {
            return Control::Quit { status };
        }
        let _ = writeln!(self.out, "Debugged program terminated.  Use q to quit or R to restart,");
        let _ = writeln!(self.out, "  use o inhibit_exit to avoid stopping after program termination,");
        let _ = writeln!(self.out, "  h q, h R or h o to get additional info.");
        let namespace = host.namespace();
        match self.halt(host, &namespace) {
            Control::Resume => Control::Quit { status },
            quit => quit,
        }
    }

    /// What `q` exits with.
    pub(crate) fn quit_status(&self, host: &dyn Host) -> i32 {
        self.exit_status.unwrap_or_else(|| host.exit_status())
    }
}

/// A debugging session shared by every thread of the program.
///
/// Only one thread at a time can be inside the command loop; the others wait
/// on the session lock. A statement boundary reached while the same thread is
/// already in the command loop (while evaluating an expression, say) resumes
/// without halting.
pub struct Debugger {
    session: ReentrantMutex<RefCell<Session>>,
    signal: SignalFlag,
}

impl std::fmt::Debug for Debugger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debugger").finish_non_exhaustive()
    }
}

impl Debugger {
    pub fn builder() -> DebuggerBuilder {
        DebuggerBuilder::default()
    }

    /// Called by the host before executing every statement.
    pub fn on_statement_boundary(&self, host: &mut dyn Host, position: &SourcePosition, depth: usize) -> Control {
        let guard = self.session.lock();
        let Ok(mut session) = guard.try_borrow_mut() else {
            return Control::Resume;
        };
        session.boundary(host, position, depth)
    }

    /// Called by the host once the program has finished with `status`.
    pub fn on_program_end(&self, host: &mut dyn Host, status: i32) -> Control {
        let guard = self.session.lock();
        let Ok(mut session) = guard.try_borrow_mut() else {
            return Control::Quit { status };
        };
        session.program_end(host, status)
    }

    pub fn register_command(&self, name: impl Into<String>, handler: Box<dyn CommandHandler>) {
        self.with_session_mut(|session| session.registry.register(name, handler));
    }

    pub fn set_watch_function(&self, watch_fn: Option<Box<dyn WatchFunction>>) {
        self.with_session_mut(|session| session.watch_fn = watch_fn);
    }

    pub fn add_source(&self, buffer: SourceBuffer) {
        self.with_session_mut(|session| session.sources.insert(buffer));
    }

    /// The pending-interrupt flag; raising it halts at the next statement.
    pub fn signal(&self) -> SignalFlag {
        self.signal.clone()
    }

    /// Route SIGINT into the pending-interrupt flag.
    pub fn install_interrupt_handler(&self) -> io::Result<()> {
        sdb_process::install_interrupt_flag(self.signal.as_atomic())
    }

    /// Inspect the session. Returns `None` when called from inside the
    /// command loop.
    pub fn with_session<R>(&self, f: impl FnOnce(&Session) -> R) -> Option<R> {
        let guard = self.session.lock();
        let session = guard.try_borrow().ok()?;
        Some(f(&session))
    }

    fn with_session_mut(&self, f: impl FnOnce(&mut Session)) {
        let guard = self.session.lock();
        let borrowed = guard.try_borrow_mut();
        match borrowed {
            Ok(mut session) => f(&mut session),
            Err(_) => tracing::warn!(target: "sdb.core", "session is busy; change ignored"),
        }
    }
}

pub struct DebuggerBuilder {
    config: SessionConfig,
    input: Option<Box<dyn LineReader>>,
    output: Option<Box<dyn Write + Send>>,
    argv: Option<Vec<String>>,
    restart_handover: bool,
    sources: Vec<SourceBuffer>,
}

impl Default for DebuggerBuilder {
    fn default() -> Self {
        Self {
            config: SessionConfig::default(),
            input: None,
            output: None,
            argv: None,
            restart_handover: true,
            sources: Vec::new(),
        }
    }
}

impl DebuggerBuilder {
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Interactive command source; standard input by default.
    pub fn input(mut self, input: Box<dyn LineReader>) -> Self {
        self.input = Some(input);
        self
    }

    /// Session output; standard error by default.
    pub fn output(mut self, output: Box<dyn Write + Send>) -> Self {
        self.output = Some(output);
        self
    }

    /// Command line `R` re-executes; this process' own arguments by default.
    pub fn argv(mut self, argv: Vec<String>) -> Self {
        self.argv = Some(argv);
        self
    }

    /// Whether to pick up state left by a restarting predecessor.
    pub fn restart_handover(mut self, enabled: bool) -> Self {
        self.restart_handover = enabled;
        self
    }

    pub fn source(mut self, buffer: SourceBuffer) -> Self {
        self.sources.push(buffer);
        self
    }

    pub fn build(self) -> DebugResult<Debugger> {
        let signal = SignalFlag::new();
        let state = ExecutionState::new(self.config.stop_at_start, self.config.non_stop, signal.clone());
        let output = self.output.unwrap_or_else(|| Box::new(io::stderr()));
        let input = self.input.unwrap_or_else(|| Box::new(StdinReader));
        let restart = match &self.argv {
            Some(argv) => RestartController::new(argv),
            None => RestartController::from_env(),
        };

        let mut sources = SourceView::new();
        for buffer in self.sources {
            sources.insert(buffer);
        }

        let mut session = Session {
            config: self.config,
            sources,
            breakpoints: BreakpointTable::new(),
            watches: WatchSet::new(),
            history: History::new(),
            aliases: AliasTable::new(),
            registry: CommandRegistry::new(),
            state,
            input: InputStack::new(input),
            out: OutputRouter::new(output, signal.clone()),
            restart,
            watch_fn: None,
            pre_prompt: Vec::new(),
            post_prompt: Vec::new(),
            last_step: None,
            last_search: None,
            one_time_dump: false,
            position: None,
            exit_status: None,
            halts: 0,
        };

        if self.restart_handover {
            match RestartState::take_handover() {
                Ok(Some(restored)) => session.apply_restart_state(restored),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(target: "sdb.core", error = %err, "ignoring restart state");
                    let _ = writeln!(session.out, "{err}");
                }
            }
        }

        tracing::debug!(
            target: "sdb.core",
            non_stop = session.config.non_stop,
            stop_at_start = session.config.stop_at_start,
            "session created"
        );
        Ok(Debugger {
            session: ReentrantMutex::new(RefCell::new(session)),
            signal,
        })
    }
}
