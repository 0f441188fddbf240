//! The read-eval loop that runs while the program is suspended.

use std::fmt::Display;
use std::io::Write;
use std::path::Path;

use regex::RegexBuilder;
use sdb_config::SessionConfig;
use sdb_process::CommandSpec;

use crate::breakpoints::StopCondition;
use crate::commands::{
    Command, HistoryRequest, LegacyCommand, LineTarget, ListRange, PromptOp, PromptSlot, RecallTarget, SubPattern,
};
use crate::debugger::{Control, LastStep, Session};
use crate::error::{DebugError, DebugResult, EvalError};
use crate::host::{EvalContext, EvalRequest, Host, Value};
use crate::registry::Handled;
use crate::restart::{RestartState, RESTART_FAILED_STATUS};
use crate::router::PipeMode;
use crate::source::{FileId, SourcePosition};
use crate::state::StepMode;

/// Outcome of one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    /// Read another command.
    Next,
    /// Leave the loop and let the program run.
    Resume,
    /// End the session.
    Quit(i32),
}

/// `(usage, summary)` per command, in the order `h` prints them.
const HELP: &[(&str, &str)] = &[
    ("l [ln|a-b|a+n|sub]", "List source lines"),
    ("-", "List the previous window"),
    (".", "Show the current line again"),
    ("v [line]", "View the window around a line"),
    ("f file", "Switch to another source file"),
    ("/pattern/", "Search forward"),
    ("?pattern?", "Search backward"),
    ("L [a|b|w]", "List actions, breakpoints and watches"),
    ("S [[!]pattern]", "List subroutine names"),
    ("T", "Stack trace"),
    ("s", "Single step, entering subroutines"),
    ("n", "Single step over subroutine calls"),
    ("<CR>", "Repeat the last n or s"),
    ("r", "Return from the current subroutine"),
    ("c [line|sub]", "Continue, optionally up to a line or subroutine"),
    ("t", "Toggle trace mode"),
    ("b [line|sub] [cond]", "Set a breakpoint"),
    ("B line|*", "Delete one or all breakpoints"),
    ("a [line] expr", "Run expr whenever the line is reached"),
    ("A line|*", "Delete one or all actions"),
    ("w expr", "Add a watch expression"),
    ("W expr|*", "Delete one or all watch expressions"),
    ("o [name[=value]|name?]", "Show or set session options"),
    ("< expr", "Run expr before each prompt (<< appends, < ? lists, < * clears)"),
    ("> expr", "Run expr after each prompt (>> appends, > ? lists, > * clears)"),
    ("! [n|-n|pattern]", "Redo a previous command"),
    ("!! [cmd]", "Run cmd in a subshell"),
    ("H [-n]", "List the last n commands"),
    ("H -c", "Clear the command history"),
    ("= [name [value]]", "Define or list aliases"),
    ("source file", "Read commands from a file"),
    ("save file", "Save the command history to a file"),
    ("R", "Restart the program, keeping debugger state"),
    ("rerun [n|-n]", "Restart and replay history up to command n"),
    ("| cmd", "Run a debugger command through the pager"),
    ("|| cmd", "Same, leaving the program's output alone"),
    ("p expr", "Print an expression"),
    ("x expr", "Dump an expression element by element"),
    ("V [ns [vars]]", "List variables in a namespace"),
    ("X [vars]", "List variables in the current namespace"),
    ("y [level [vars]]", "List lexicals level frames up"),
    ("m expr", "List methods callable on expr"),
    ("man [topic]", "Look up documentation"),
    ("h [cmd]", "Help on all or one command"),
    ("q", "Quit"),
];

macro_rules! say {
    ($session:expr, $($arg:tt)*) => {{
        let _ = writeln!($session.out, $($arg)*);
    }};
}

impl Session {
    fn report(&mut self, err: impl Display) {
        say!(self, "{err}");
    }

    fn prompt(&self, host: &dyn Host) -> String {
        let number = self.history.display_log().len() + 1;
        match host.thread_id() {
            Some(tid) => format!("[tid {tid}]  DB<{number}> "),
            None => format!("  DB<{number}> "),
        }
    }

    /// Read the next command, joining `\`-continued lines. `None` at end of
    /// input.
    fn read_command(&mut self, host: &dyn Host) -> Option<String> {
        let mut prompt = self.prompt(host);
        let mut command = String::new();
        loop {
            let _ = write!(self.out, "{prompt}");
            let _ = self.out.flush();
            let line = match self.input.next_line() {
                Ok(Some((line, origin))) => {
                    if origin.echoes() {
                        say!(self, "{line}");
                    }
                    line
                }
                Ok(None) => return None,
                Err(err) => {
                    tracing::warn!(target: "sdb.core", error = %err, "reading commands failed");
                    self.report(format_args!("Error reading command: {err}"));
                    return None;
                }
            };
            match line.strip_suffix('\\') {
                Some(head) => {
                    command.push_str(head);
                    command.push('\n');
                    prompt = "  cont: ".to_owned();
                }
                None => {
                    command.push_str(&line);
                    return Some(command);
                }
            }
        }
    }

    pub(crate) fn command_loop(&mut self, host: &mut dyn Host) -> Control {
        self.registry.initialize(&mut self.out);
        loop {
            let Some(command) = self.read_command(host) else {
                // End of input behaves like `q`.
                let status = self.quit_status(host);
                return Control::Quit { status };
            };
            let flow = self.execute(host, &command);
            self.out.restore();
            match flow {
                Flow::Next => {}
                Flow::Resume => return Control::Resume,
                Flow::Quit(status) => return Control::Quit { status },
            }
        }
    }

    /// Run a command line as typed, recording it in the history.
    fn execute(&mut self, host: &mut dyn Host, line: &str) -> Flow {
        let trimmed = line.trim();
        if trimmed.starts_with('#') {
            return Flow::Next;
        }
        if trimmed.is_empty() {
            return match self.last_step {
                Some(step) => self.run(host, step.command()),
                None => Flow::Next,
            };
        }
        self.history.push(trimmed);
        self.run(host, trimmed)
    }

    /// Run a command without touching the history.
    fn run(&mut self, host: &mut dyn Host, command: &str) -> Flow {
        let expanded = self.aliases.expand(command);
        let command = expanded.as_deref().unwrap_or(command).trim();

        match self.registry.dispatch(command, &mut self.out) {
            Handled::Continue => return Flow::Next,
            Handled::Stop => return Flow::Resume,
            Handled::NotConsumed => {}
        }

        let parsed = Command::parse(command);
        tracing::trace!(target: "sdb.core", ?parsed, "command");
        self.run_builtin(host, parsed)
    }

    fn run_builtin(&mut self, host: &mut dyn Host, command: Command) -> Flow {
        if command.resumes() && self.state.finished {
            say!(self, "Debugged program terminated.  Use q to quit or R to restart.");
            return Flow::Next;
        }
        match command {
            Command::Quit => return Flow::Quit(self.quit_status(host)),
            Command::ToggleTrace => {
                self.state.trace = !self.state.trace;
                say!(self, "Trace = {}", if self.state.trace { "on" } else { "off" });
            }
            Command::ListSubroutines(pattern) => self.list_subroutines(host, pattern),
            Command::ListVariables { namespace, patterns } => {
                let namespace = namespace.unwrap_or_else(|| host.namespace());
                let listed = host.variables(&namespace, &patterns);
                self.print_pairs(listed);
            }
            Command::Print(expression) => self.print_expression(host, &expression),
            Command::Methods(expression) => {
                let namespace = host.namespace();
                match host.methods(&expression, &namespace) {
                    Ok(methods) => {
                        for method in methods {
                            say!(self, "{method}");
                        }
                    }
                    Err(err) => self.report(err),
                }
            }
            Command::SwitchFile(name) => {
                if let Err(err) = self.switch_file(host, &name) {
                    self.report(err);
                }
            }
            Command::ReturnToLastLine => self.return_to_last_line(host),
            Command::ScrollBack => {
                let window = self.window();
                let start = self.sources.cursor().saturating_sub(window.saturating_mul(2)).max(1);
                self.list_window(start);
            }
            Command::Legacy(legacy) => return self.run_legacy(host, legacy),
            Command::Lexicals { level, patterns } => {
                let listed = host.lexicals(level, &patterns);
                self.print_pairs(listed);
            }
            Command::StepOver => return self.step(LastStep::Over),
            Command::StepInto => return self.step(LastStep::Into),
            Command::Continue(target) => return self.continue_to(host, target.as_deref()),
            Command::Return => {
                self.state.return_from_frame();
                return Flow::Resume;
            }
            Command::StackTrace => self.stack_trace(host),
            Command::Window(line) => {
                let center = line.unwrap_or_else(|| self.current_line_in_active_file().unwrap_or(self.sources.cursor()));
                let start = center.saturating_sub(self.window() / 2).max(1);
                self.list_window(start);
            }
            Command::Watch(Some(expression)) => {
                let namespace = host.namespace();
                let initial = host.evaluate(&EvalRequest::new(expression.as_str(), namespace, EvalContext::Watch));
                if let Err(err) = &initial {
                    say!(self, "Watch expression '{expression}' failed: {err}");
                }
                self.watches.add(&expression, &initial);
                tracing::debug!(target: "sdb.core", watch = %expression, "watch added");
            }
            Command::Watch(None) => self.list_watches(),
            Command::SearchForward(pattern) => self.search(&pattern, true),
            Command::SearchBackward(pattern) => self.search(&pattern, false),
            Command::Recall(target) => return self.recall(host, &target),
            Command::Shell(script) => self.shell(&script),
            Command::History(HistoryRequest::Clear) => {
                self.history.clear();
                say!(self, "History cleared.");
            }
            Command::History(HistoryRequest::List(count)) => {
                let count = count.or(self.config.history_limit);
                let lines: Vec<String> = self
                    .history
                    .listing(count)
                    .map(|entry| format!("{}: {}", entry.index, entry.text))
                    .collect();
                for line in lines {
                    say!(self, "{line}");
                }
            }
            Command::Doc(topic) => self.doc(topic.as_deref()),
            Command::PrintDefault => self.print_expression(host, "$_"),
            Command::Dump(expression) => {
                self.one_time_dump = true;
                self.evaluate_command(host, &expression);
            }
            Command::Alias { name, value } => self.alias(name, value),
            Command::Source(path) => {
                if let Err(err) = self.input.push_file(Path::new(&path)) {
                    self.report(format_args!("Can't open {path}: {err}"));
                }
            }
            Command::Save(path) => match std::fs::write(&path, self.history.to_file_text()) {
                Ok(()) => say!(self, "commands saved in {path}"),
                Err(err) => self.report(format_args!("Can't save history to {path}: {err}")),
            },
            Command::Restart => {
                let state = self.restart_state();
                return self.restart(&state);
            }
            Command::Rerun(upto) => match self.history.replay_prefix(upto) {
                Ok(typeahead) => {
                    let state = RestartState {
                        typeahead,
                        ..RestartState::default()
                    };
                    return self.restart(&state);
                }
                Err(err) => self.report(err),
            },
            Command::Pipe { mode, command } => return self.pipe(host, mode, &command),
            Command::Expression(expression) => self.evaluate_command(host, &expression),
        }
        Flow::Next
    }

    fn run_legacy(&mut self, host: &mut dyn Host, command: LegacyCommand) -> Flow {
        let result = match command {
            LegacyCommand::Break { target, condition } => self.set_breakpoint(host, target.as_deref(), &condition),
            LegacyCommand::DeleteBreak(LineTarget::All) => {
                self.breakpoints.clear_all_stops();
                say!(self, "Deleting all breakpoints...");
                Ok(())
            }
            LegacyCommand::DeleteBreak(target) => self
                .target_line(target)
                .and_then(|(file, line)| self.breakpoints.clear_stop(&file, line)),
            LegacyCommand::Action { line, expression } => self.set_action(line, &expression),
            LegacyCommand::DeleteAction(LineTarget::All) => {
                self.breakpoints.clear_all_actions();
                say!(self, "Deleting all actions...");
                Ok(())
            }
            LegacyCommand::DeleteAction(target) => self
                .target_line(target)
                .and_then(|(file, line)| self.breakpoints.clear_action(&file, line)),
            LegacyCommand::DeleteWatch(None) => {
                say!(self, "Usage: W expr|*");
                Ok(())
            }
            LegacyCommand::DeleteWatch(Some(expression)) if expression == "*" => {
                self.watches.clear();
                say!(self, "Deleting all watch expressions ...");
                Ok(())
            }
            LegacyCommand::DeleteWatch(Some(expression)) => match self.watches.remove(&expression) {
                0 => Err(DebugError::UnknownWatch(expression)),
                _ => Ok(()),
            },
            LegacyCommand::ListAll(which) => {
                self.list_all(which);
                Ok(())
            }
            LegacyCommand::List(range) => self.list(host, range),
            LegacyCommand::Help(topic) => {
                self.help(topic.as_deref());
                Ok(())
            }
            LegacyCommand::Options(args) => self.options(&args),
            LegacyCommand::Prompt(slot, op) => {
                self.prompt_expressions(slot, op);
                Ok(())
            }
        };
        if let Err(err) = result {
            self.report(err);
        }
        Flow::Next
    }

    fn step(&mut self, step: LastStep) -> Flow {
        let mode = match step {
            LastStep::Into => StepMode::StepInto,
            LastStep::Over => StepMode::StepOver,
        };
        self.state.set_step_mode(mode);
        self.last_step = Some(step);
        Flow::Resume
    }

    fn current_line_in_active_file(&self) -> Option<u32> {
        let position = self.position.as_ref()?;
        (self.sources.active() == Some(&position.file)).then_some(position.line)
    }

    fn active_file(&self) -> DebugResult<FileId> {
        self.sources
            .active()
            .or(self.position.as_ref().map(|position| &position.file))
            .cloned()
            .ok_or_else(|| DebugError::UnknownFile("(no file)".to_owned()))
    }

    fn target_line(&self, target: LineTarget) -> DebugResult<(FileId, u32)> {
        let file = self.active_file()?;
        match target {
            LineTarget::Line(line) => Ok((file, line)),
            LineTarget::Current | LineTarget::All => {
                let line = self
                    .current_line_in_active_file()
                    .ok_or(DebugError::NoCurrentLine)?;
                Ok((file, line))
            }
        }
    }

    /// Fully qualify `name` with the current namespace unless it already is.
    fn qualify(host: &dyn Host, name: &str) -> String {
        if name.contains("::") {
            name.to_owned()
        } else {
            format!("{}::{name}", host.namespace())
        }
    }

    /// Resolve a subroutine to its first breakable line.
    fn subroutine_line(&mut self, host: &mut dyn Host, name: &str) -> DebugResult<SourcePosition> {
        let qualified = Self::qualify(host, name);
        let range = host
            .resolve_subroutine(&qualified)
            .or_else(|| host.resolve_subroutine(name))
            .ok_or_else(|| DebugError::UnknownSubroutine(name.to_owned()))?;
        self.ensure_source(host, &range.file);
        let buffer = self
            .sources
            .get(&range.file)
            .ok_or_else(|| DebugError::UnknownFile(range.file.to_string()))?;
        let line = buffer
            .next_breakable(range.start, range.end)
            .ok_or(DebugError::NotBreakable { line: range.start })?;
        Ok(SourcePosition::new(range.file, line))
    }

    /// A line number in the active file, or a subroutine name.
    fn resolve_target(&mut self, host: &mut dyn Host, target: &str) -> DebugResult<SourcePosition> {
        match target.parse::<u32>() {
            Ok(line) => Ok(SourcePosition::new(self.active_file()?, line)),
            Err(_) => self.subroutine_line(host, target),
        }
    }

    fn continue_to(&mut self, host: &mut dyn Host, target: Option<&str>) -> Flow {
        if let Some(target) = target {
            let installed = self.resolve_target(host, target).and_then(|position| {
                self.breakpoints
                    .set_one_shot(&self.sources, &position.file, position.line)
                    .map(|()| position)
            });
            match installed {
                Ok(position) => tracing::debug!(target: "sdb.core", %position, "continuing to one-shot stop"),
                Err(err) => {
                    self.report(err);
                    return Flow::Next;
                }
            }
        }
        self.state.set_step_mode(StepMode::ContinueToBreakpoint);
        Flow::Resume
    }

    fn set_breakpoint(&mut self, host: &mut dyn Host, target: Option<&str>, condition: &str) -> DebugResult<()> {
        let position = match target {
            None => {
                let (file, line) = self.target_line(LineTarget::Current)?;
                SourcePosition::new(file, line)
            }
            Some(target) => self.resolve_target(host, target)?,
        };
        self.breakpoints.set_stop(
            &self.sources,
            &position.file,
            position.line,
            StopCondition::parse(condition),
        )?;
        tracing::debug!(target: "sdb.core", %position, condition, "breakpoint set");
        Ok(())
    }

    fn set_action(&mut self, line: Option<u32>, expression: &str) -> DebugResult<()> {
        let target = line.map_or(LineTarget::Current, LineTarget::Line);
        let (file, line) = self.target_line(target)?;
        if expression.trim().is_empty() {
            return self.breakpoints.clear_action(&file, line);
        }
        self.breakpoints.set_action(&self.sources, &file, line, expression.trim())
    }

    fn switch_file(&mut self, host: &mut dyn Host, name: &str) -> DebugResult<()> {
        let file = self
            .sources
            .find_file(name, &host.loaded_files())
            .ok_or_else(|| DebugError::UnknownFile(name.to_owned()))?;
        self.ensure_source(host, &file);
        self.sources.switch_to(&file, 1)?;
        self.list_window(1);
        Ok(())
    }

    fn return_to_last_line(&mut self, host: &dyn Host) {
        let Some(position) = self.position.clone() else {
            say!(self, "Not halted at a statement.");
            return;
        };
        if self.sources.switch_to(&position.file, position.line).is_ok() {
            self.sources.set_cursor(position.line + 1);
        }
        self.write_position(&host.namespace(), &position);
    }

    /// Print `start..=end` of the active file in listing format.
    fn list_lines(&mut self, start: u32, end: u32) {
        let Some(buffer) = self.sources.active_buffer() else {
            say!(self, "No source is available.");
            return;
        };
        let current = self
            .position
            .as_ref()
            .filter(|position| &position.file == buffer.file())
            .map(|position| position.line);
        let range = buffer.clamp(start..=end);
        let mut lines = Vec::new();
        for line in range.clone() {
            let Some(text) = buffer.line(line) else {
                continue;
            };
            let mut marker = if Some(line) == current {
                "==>".to_owned()
            } else if buffer.is_breakable(line) {
                ":".to_owned()
            } else {
                " ".to_owned()
            };
            if let Some(entry) = self.breakpoints.get(buffer.file(), line) {
                if entry.stop.is_some() || entry.one_shot {
                    marker.push('b');
                }
                if entry.action.is_some() {
                    marker.push('a');
                }
            }
            lines.push(format!("{line}{marker}\t{text}"));
        }
        let next = (*range.end()).max(*range.start()).saturating_add(1);
        for line in lines {
            say!(self, "{line}");
        }
        self.sources.set_cursor(next);
    }

    fn window(&self) -> u32 {
        self.config.window_size.max(1)
    }

    /// One window of lines starting at `start`.
    fn list_window(&mut self, start: u32) {
        let end = start.saturating_add(self.window() - 1);
        self.list_lines(start, end);
    }

    fn list(&mut self, host: &mut dyn Host, range: ListRange) -> DebugResult<()> {
        match range {
            ListRange::Next => {
                let start = self.sources.cursor();
                self.list_window(start);
            }
            ListRange::Line(line) => self.list_lines(line, line),
            ListRange::Span(start, end) => self.list_lines(start, end),
            ListRange::Subroutine(name) => {
                let qualified = Self::qualify(host, &name);
                let range = host
                    .resolve_subroutine(&qualified)
                    .or_else(|| host.resolve_subroutine(&name))
                    .ok_or(DebugError::UnknownSubroutine(name))?;
                self.ensure_source(host, &range.file);
                self.sources.switch_to(&range.file, range.start)?;
                let end = range
                    .end
                    .max(range.start)
                    .min(range.start.saturating_add(self.window() - 1));
                self.list_lines(range.start, end);
            }
        }
        Ok(())
    }

    fn search(&mut self, pattern: &str, forward: bool) {
        let pattern = if pattern.is_empty() {
            match self.last_search.clone() {
                Some(previous) => previous,
                None => {
                    say!(self, "No previous search pattern.");
                    return;
                }
            }
        } else {
            pattern.to_owned()
        };
        let regex = match RegexBuilder::new(&pattern).case_insensitive(true).build() {
            Ok(regex) => regex,
            Err(err) => {
                self.report(DebugError::InvalidPattern(err));
                return;
            }
        };
        self.last_search = Some(pattern.clone());

        let Some(buffer) = self.sources.active_buffer() else {
            say!(self, "No source is available.");
            return;
        };
        let len = buffer.len();
        let base = self.sources.search_line().max(1) - 1;
        // Wrap around the file once, ending on the line we started from.
        let found = (1..=len).find_map(|offset| {
            let line = if forward {
                (base + offset) % len + 1
            } else {
                (base % len + len - offset % len) % len + 1
            };
            buffer
                .line(line)
                .filter(|text| regex.is_match(text))
                .map(|text| (line, text.to_owned()))
        });
        match found {
            Some((line, text)) => {
                self.sources.set_search_line(line);
                self.sources.set_cursor(line + 1);
                say!(self, "{line}:\t{text}");
            }
            None if forward => say!(self, "/{pattern}/: not found"),
            None => say!(self, "?{pattern}?: not found"),
        }
    }

    fn recall(&mut self, host: &mut dyn Host, target: &RecallTarget) -> Flow {
        match self.history.recall(target.as_recall()) {
            Ok(command) => {
                say!(self, "{command}");
                self.execute(host, &command)
            }
            Err(err) => {
                self.report(err);
                Flow::Next
            }
        }
    }

    fn list_subroutines(&mut self, host: &dyn Host, pattern: Option<SubPattern>) {
        let regex = match pattern.as_ref().map(|pattern| regex::Regex::new(&pattern.pattern)).transpose() {
            Ok(regex) => regex,
            Err(err) => {
                self.report(DebugError::InvalidPattern(err));
                return;
            }
        };
        let negate = pattern.as_ref().is_some_and(|pattern| pattern.negate);
        let mut names: Vec<String> = host
            .subroutines()
            .into_iter()
            .filter(|name| regex.as_ref().map_or(true, |regex| regex.is_match(name) != negate))
            .collect();
        names.sort();
        for name in names {
            say!(self, "{name}");
        }
    }

    fn print_pairs(&mut self, listed: Result<Vec<(String, String)>, EvalError>) {
        match listed {
            Ok(pairs) => {
                for (name, value) in pairs {
                    say!(self, "{name} = {value}");
                }
            }
            Err(err) => self.report(err),
        }
    }

    fn stack_trace(&mut self, host: &dyn Host) {
        for frame in host.stack_frames() {
            let context = match frame.context {
                Some(sigil) => format!("{sigil} = "),
                None => String::new(),
            };
            let args = if frame.args.is_empty() {
                String::new()
            } else {
                format!("({})", frame.args.join(", "))
            };
            say!(
                self,
                "{context}{}{args} called from file '{}' line {}",
                frame.subroutine,
                frame.file,
                frame.line
            );
        }
    }

    fn evaluate(host: &mut dyn Host, expression: &str) -> Result<Value, EvalError> {
        let namespace = host.namespace();
        host.evaluate(&EvalRequest::new(expression, namespace, EvalContext::Command))
    }

    fn print_expression(&mut self, host: &mut dyn Host, expression: &str) {
        match Self::evaluate(host, expression) {
            Ok(value) => say!(self, "{value}"),
            Err(err) => self.report(err),
        }
    }

    /// A raw expression: its value is thrown away unless `x` asked for a dump.
    fn evaluate_command(&mut self, host: &mut dyn Host, expression: &str) {
        let dump = std::mem::take(&mut self.one_time_dump);
        match Self::evaluate(host, expression) {
            Ok(value) if dump => say!(self, "{}", value.dump()),
            Ok(_) => {}
            Err(err) => self.report(err),
        }
    }

    fn list_watches(&mut self) {
        if self.watches.is_empty() {
            say!(self, "No watch expressions.");
            return;
        }
        say!(self, "Watch-expressions:");
        let lines: Vec<String> = self
            .watches
            .entries()
            .iter()
            .map(|entry| format!(" {} = '{}'", entry.expression, entry.last_value))
            .collect();
        for line in lines {
            say!(self, "{line}");
        }
    }

    fn list_all(&mut self, which: Option<char>) {
        let show_breaks = matches!(which, None | Some('b'));
        let show_actions = matches!(which, None | Some('a'));
        let mut lines = Vec::new();
        let mut last_file: Option<&FileId> = None;
        for (file, line, entry) in self.breakpoints.iter() {
            let stop = entry.stop.as_ref().filter(|_| show_breaks);
            let once = entry.one_shot && show_breaks;
            let action = entry.action.as_ref().filter(|_| show_actions);
            if stop.is_none() && !once && action.is_none() {
                continue;
            }
            if last_file != Some(file) {
                lines.push(format!("{file}:"));
                last_file = Some(file);
            }
            let text = self
                .sources
                .get(file)
                .and_then(|buffer| buffer.line(line))
                .unwrap_or_default();
            lines.push(format!(" {line}:\t{text}"));
            if let Some(stop) = stop {
                let condition = stop.expression().unwrap_or("1");
                lines.push(format!("   break if ({condition})"));
            }
            if once {
                lines.push("   break once".to_owned());
            }
            if let Some(action) = action {
                lines.push(format!("   action:  {action}"));
            }
        }
        for line in lines {
            say!(self, "{line}");
        }
        if matches!(which, None | Some('w')) && !self.watches.is_empty() {
            self.list_watches();
        }
    }

    fn help(&mut self, topic: Option<&str>) {
        let entries: Vec<&(&str, &str)> = HELP
            .iter()
            .filter(|(usage, _)| {
                topic.map_or(true, |topic| usage.split_whitespace().next() == Some(topic))
            })
            .collect();
        if entries.is_empty() {
            say!(self, "No help for '{}'.", topic.unwrap_or_default());
        }
        for (usage, summary) in entries {
            say!(self, "  {usage:<24}{summary}");
        }
    }

    fn options(&mut self, args: &str) -> DebugResult<()> {
        let args = split_option_args(args);
        if args.is_empty() {
            say!(self, "{}", self.config);
            return Ok(());
        }
        for arg in args {
            let (name, value) = match arg.split_once('=') {
                Some((name, value)) => (name.trim(), Some(value)),
                None => (arg.as_str(), None),
            };
            if let Some(name) = name.strip_suffix('?') {
                let value = self.config.option(name)?;
                say!(self, "{name:>15} = '{value}'");
                continue;
            }
            let mut updated: SessionConfig = self.config.clone();
            updated.set_option(name, value)?;
            self.config = updated;
            self.state.set_non_stop(self.config.non_stop);
            let value = self.config.option(name)?;
            say!(self, "{name:>15} = '{value}'");
        }
        Ok(())
    }

    fn prompt_expressions(&mut self, slot: PromptSlot, op: PromptOp) {
        let (marker, label) = match slot {
            PromptSlot::Pre => ('<', "before"),
            PromptSlot::Post => ('>', "after"),
        };
        let list = match slot {
            PromptSlot::Pre => &mut self.pre_prompt,
            PromptSlot::Post => &mut self.post_prompt,
        };
        match op {
            PromptOp::List => {
                let lines = list.clone();
                if lines.is_empty() {
                    say!(self, "No expressions to run {label} the prompt.");
                } else {
                    say!(self, "Expressions run {label} each prompt:");
                    for line in lines {
                        say!(self, "\t{marker} -- {line}");
                    }
                }
            }
            PromptOp::Clear => list.clear(),
            PromptOp::Replace(expression) => *list = vec![expression],
            PromptOp::Append(expression) => list.push(expression),
        }
    }

    fn alias(&mut self, name: Option<String>, value: Option<String>) {
        match (name, value) {
            (None, _) => {
                let lines: Vec<String> = self
                    .aliases
                    .iter()
                    .map(|(name, rule)| format!("{name}\t= {}", rule.definition()))
                    .collect();
                for line in lines {
                    say!(self, "{line}");
                }
            }
            (Some(name), None) => match self.aliases.get(&name) {
                Some(rule) => {
                    let line = format!("{name}\t= {}", rule.definition());
                    say!(self, "{line}");
                }
                None => say!(self, "{name} is not an alias"),
            },
            (Some(name), Some(value)) => match self.aliases.define(&name, &value) {
                Ok(()) => say!(self, "{name}\t= {}", value.trim()),
                Err(err) => self.report(err),
            },
        }
    }

    fn shell(&mut self, script: &str) {
        let Some(command) = CommandSpec::shell(&self.config.shell, script) else {
            self.report("No shell is configured.");
            return;
        };
        let _ = self.out.flush();
        tracing::debug!(target: "sdb.core", command = %command, "shell escape");
        if let Err(err) = sdb_process::run_interactive_checked(&command) {
            self.report(err);
        }
    }

    fn doc(&mut self, topic: Option<&str>) {
        let Some(mut command) = CommandSpec::parse(&self.config.doc_command) else {
            self.report("No documentation command is configured.");
            return;
        };
        command.args.push(topic.unwrap_or("sdb").to_owned());
        let _ = self.out.flush();
        if let Err(err) = sdb_process::run_interactive_checked(&command) {
            self.report(err);
        }
    }

    fn pipe(&mut self, host: &mut dyn Host, mode: PipeMode, command: &str) -> Flow {
        let Some(pager) = CommandSpec::parse(&self.config.pager) else {
            self.report("No pager is configured.");
            return Flow::Next;
        };
        if let Err(err) = self.out.pipe(&pager, mode) {
            tracing::warn!(target: "sdb.core", pager = %pager, error = %err, "pager failed to start");
            self.report(err);
            return Flow::Next;
        }
        let flow = self.run(host, command);
        self.out.restore();
        flow
    }

    fn restart(&mut self, state: &RestartState) -> Flow {
        self.out.restore();
        let _ = self.out.flush();
        let err = self.restart.restart(state);
        self.report(err);
        Flow::Quit(RESTART_FAILED_STATUS)
    }
}

/// Split `o` arguments on whitespace, keeping quoted values together and
/// dropping the quotes.
fn split_option_args(args: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quote = None;
    for ch in args.chars() {
        match (quote, ch) {
            (Some(open), ch) if ch == open => quote = None,
            (Some(_), ch) => current.push(ch),
            (None, '"' | '\'') => quote = Some(ch),
            (None, ch) if ch.is_whitespace() => {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
            }
            (None, ch) => current.push(ch),
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}
