//! A scriptable [`Host`] for tests and demos.
//!
//! `MockHost` understands a deliberately tiny expression language:
//!
//! - `$name` / `@name` variable lookups (unset variables are `undef`),
//! - numbers, `'single'` and `"double"` quoted strings,
//! - `target = expr` assignment, returning the assigned value,
//! - binary `+ - == != < > <= >= eq ne`, evaluated left to right,
//! - `die message`, which fails with `message`.
//!
//! Anything else is a syntax error. Expressions can also be made to fail on
//! purpose with [`MockHost::fail_on`].
//!
//! [`MockProgram`] drives a debugger through a toy line-oriented program made
//! of such expressions plus `print`, `return`, `exit` and calls of
//! `sub name { ... }` blocks.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};

use crate::debugger::{Control, Debugger};
use crate::error::EvalError;
use crate::host::{EvalRequest, FrameInfo, Host, SubroutineRange, Value};
use crate::source::{FileId, SourceBuffer, SourcePosition};

/// Calls nested deeper than this end the program.
const MAX_CALL_DEPTH: usize = 100;

#[derive(Debug, Clone)]
pub struct MockHost {
    pub namespace: String,
    pub vars: BTreeMap<String, Value>,
    pub subroutines: BTreeMap<String, SubroutineRange>,
    pub frames: Vec<FrameInfo>,
    pub sources: BTreeMap<FileId, SourceBuffer>,
    pub lexicals: Vec<(String, String)>,
    pub methods: Vec<String>,
    pub thread_id: Option<u64>,
    pub exit_status: i32,
    /// Every evaluation request, in order.
    pub requests: Vec<EvalRequest>,
    failing: BTreeSet<String>,
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHost {
    pub fn new() -> Self {
        Self {
            namespace: "main".to_owned(),
            vars: BTreeMap::new(),
            subroutines: BTreeMap::new(),
            frames: Vec::new(),
            sources: BTreeMap::new(),
            lexicals: Vec::new(),
            methods: Vec::new(),
            thread_id: None,
            exit_status: 0,
            requests: Vec::new(),
            failing: BTreeSet::new(),
        }
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.vars.insert(name.to_owned(), value);
    }

    pub fn get(&self, name: &str) -> Value {
        self.vars.get(name).cloned().unwrap_or(Value::Undef)
    }

    /// Make `expression` fail with `message` from now on.
    pub fn fail_on(&mut self, expression: &str, message: &str) {
        self.failing.insert(format!("{expression}\u{0}{message}"));
    }

    pub fn add_source(&mut self, buffer: SourceBuffer) {
        self.sources.insert(buffer.file().clone(), buffer);
    }

    pub fn add_subroutine(&mut self, name: &str, file: &str, start: u32, end: u32) {
        self.subroutines.insert(
            name.to_owned(),
            SubroutineRange {
                file: FileId::new(file),
                start,
                end,
            },
        );
    }

    /// Evaluate `expression` with the mock's rules, outside any request log.
    pub fn eval(&mut self, expression: &str) -> Result<Value, EvalError> {
        let expression = expression.trim();
        if let Some(message) = self.scripted_failure(expression) {
            return Err(EvalError::new(message));
        }
        if let Some(message) = expression.strip_prefix("die") {
            if message.is_empty() || message.starts_with(char::is_whitespace) {
                let message = unquote(message.trim()).unwrap_or_else(|| message.trim().to_owned());
                return Err(EvalError::new(if message.is_empty() { "Died".to_owned() } else { message }));
            }
        }
        if let Some((target, value)) = split_assignment(expression) {
            if !is_variable(target) {
                return Err(syntax_error(target));
            }
            let value = self.eval_binary(value)?;
            self.vars.insert(target.to_owned(), value.clone());
            return Ok(value);
        }
        self.eval_binary(expression)
    }

    fn scripted_failure(&self, expression: &str) -> Option<String> {
        let prefix = format!("{expression}\u{0}");
        self.failing
            .iter()
            .find_map(|entry| entry.strip_prefix(&prefix).map(str::to_owned))
    }

    fn eval_binary(&self, expression: &str) -> Result<Value, EvalError> {
        let tokens: Vec<&str> = expression.split_whitespace().collect();
        let Some((first, rest)) = tokens.split_first() else {
            return Err(syntax_error(expression));
        };
        if rest.is_empty() {
            return self.eval_term(first);
        }
        if rest.len() % 2 != 0 {
            // A quoted term with spaces in it.
            return self.eval_term(expression);
        }
        let mut acc = self.eval_term(first)?;
        for pair in rest.chunks(2) {
            let rhs = self.eval_term(pair[1])?;
            acc = apply(pair[0], &acc, &rhs).ok_or_else(|| syntax_error(pair[0]))?;
        }
        Ok(acc)
    }

    fn eval_term(&self, term: &str) -> Result<Value, EvalError> {
        if is_variable(term) {
            return Ok(self.get(term));
        }
        if term.parse::<f64>().is_ok() {
            return Ok(Value::scalar(term));
        }
        unquote(term).map(Value::Scalar).ok_or_else(|| syntax_error(term))
    }
}

fn syntax_error(near: &str) -> EvalError {
    EvalError::new(format!("syntax error near \"{near}\""))
}

fn is_variable(term: &str) -> bool {
    let mut chars = term.chars();
    matches!(chars.next(), Some('$' | '@'))
        && term.len() > 1
        && chars.all(|ch| ch.is_alphanumeric() || ch == '_' || ch == ':')
}

fn unquote(term: &str) -> Option<String> {
    for quote in ['\'', '"'] {
        if let Some(inner) = term.strip_prefix(quote).and_then(|rest| rest.strip_suffix(quote)) {
            return Some(inner.to_owned());
        }
    }
    None
}

/// `$x = 1` but not `$x == 1`.
fn split_assignment(expression: &str) -> Option<(&str, &str)> {
    let bytes = expression.as_bytes();
    let idx = expression.find('=')?;
    let before = idx.checked_sub(1).map(|i| bytes[i]);
    let after = bytes.get(idx + 1).copied();
    if matches!(before, Some(b'=' | b'!' | b'<' | b'>')) || after == Some(b'=') {
        return None;
    }
    Some((expression[..idx].trim(), expression[idx + 1..].trim()))
}

/// String context: `undef` reads as the empty string.
fn string(value: &Value) -> String {
    match value {
        Value::Undef => String::new(),
        other => other.display(),
    }
}

fn number(value: &Value) -> f64 {
    string(value).trim().parse().unwrap_or(0.0)
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

fn truth(flag: bool) -> Value {
    Value::scalar(if flag { "1" } else { "" })
}

fn apply(op: &str, lhs: &Value, rhs: &Value) -> Option<Value> {
    let value = match op {
        "+" => Value::Scalar(format_number(number(lhs) + number(rhs))),
        "-" => Value::Scalar(format_number(number(lhs) - number(rhs))),
        "==" => truth(number(lhs) == number(rhs)),
        "!=" => truth(number(lhs) != number(rhs)),
        "<" => truth(number(lhs) < number(rhs)),
        ">" => truth(number(lhs) > number(rhs)),
        "<=" => truth(number(lhs) <= number(rhs)),
        ">=" => truth(number(lhs) >= number(rhs)),
        "eq" => truth(string(lhs) == string(rhs)),
        "ne" => truth(string(lhs) != string(rhs)),
        _ => return None,
    };
    Some(value)
}

impl Host for MockHost {
    fn evaluate(&mut self, request: &EvalRequest) -> Result<Value, EvalError> {
        self.requests.push(request.clone());
        self.eval(&request.expression)
    }

    fn namespace(&self) -> String {
        self.namespace.clone()
    }

    fn subroutines(&self) -> Vec<String> {
        self.subroutines.keys().cloned().collect()
    }

    fn resolve_subroutine(&self, name: &str) -> Option<SubroutineRange> {
        self.subroutines.get(name).cloned()
    }

    fn stack_frames(&self) -> Vec<FrameInfo> {
        self.frames.clone()
    }

    fn variables(&mut self, namespace: &str, patterns: &[String]) -> Result<Vec<(String, String)>, EvalError> {
        if namespace != self.namespace {
            return Ok(Vec::new());
        }
        Ok(self
            .vars
            .iter()
            .filter(|(name, _)| {
                let bare = name.trim_start_matches(['$', '@']);
                patterns.is_empty() || patterns.iter().any(|pattern| bare.contains(pattern.trim_start_matches(['$', '@'])))
            })
            .map(|(name, value)| (name.clone(), value.display()))
            .collect())
    }

    fn lexicals(&mut self, level: usize, patterns: &[String]) -> Result<Vec<(String, String)>, EvalError> {
        if level > self.frames.len() {
            return Err(EvalError::new(format!("Level {level} is deeper than the call stack")));
        }
        Ok(self
            .lexicals
            .iter()
            .filter(|(name, _)| patterns.is_empty() || patterns.iter().any(|pattern| name.contains(pattern.as_str())))
            .cloned()
            .collect())
    }

    fn methods(&mut self, expression: &str, _namespace: &str) -> Result<Vec<String>, EvalError> {
        self.eval(expression)?;
        Ok(self.methods.clone())
    }

    fn load_source(&mut self, file: &FileId) -> Option<SourceBuffer> {
        self.sources.get(file).cloned()
    }

    fn loaded_files(&self) -> Vec<FileId> {
        self.sources.keys().cloned().collect()
    }

    fn thread_id(&self) -> Option<u64> {
        self.thread_id
    }

    fn exit_status(&self) -> i32 {
        self.exit_status
    }
}

/// Whether a line of a toy program is a statement.
pub fn is_statement(line: &str) -> bool {
    let line = line.trim();
    !(line.is_empty() || line.starts_with('#') || line.starts_with('}') || line.starts_with("sub "))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SubBlock {
    header: u32,
    end: u32,
}

/// How a block of statements finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Returned,
    Exited(i32),
}

/// A toy program: statements run top to bottom, one per line, and every
/// statement is announced to the debugger first.
pub struct MockProgram {
    buffer: SourceBuffer,
    subs: BTreeMap<String, SubBlock>,
    out: Box<dyn Write + Send>,
}

impl std::fmt::Debug for MockProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockProgram")
            .field("file", self.buffer.file())
            .field("subs", &self.subs.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl MockProgram {
    pub fn parse(file: impl Into<FileId>, text: &str) -> Self {
        let buffer = SourceBuffer::from_text(file, text, is_statement);
        let mut subs = BTreeMap::new();
        let mut open: Option<(String, u32)> = None;
        for line in 1..=buffer.len() {
            let text = buffer.line(line).unwrap_or_default().trim();
            match &open {
                None => {
                    let header = text
                        .strip_prefix("sub ")
                        .and_then(|rest| rest.strip_suffix('{'))
                        .map(str::trim);
                    if let Some(name) = header {
                        open = Some((name.to_owned(), line));
                    }
                }
                Some((name, header)) if text == "}" => {
                    subs.insert(name.clone(), SubBlock { header: *header, end: line });
                    open = None;
                }
                Some(_) => {}
            }
        }
        if let Some((name, header)) = open {
            subs.insert(
                name,
                SubBlock {
                    header,
                    end: buffer.len(),
                },
            );
        }
        Self {
            buffer,
            subs,
            out: Box::new(io::stdout()),
        }
    }

    /// Where `print` writes; standard output by default.
    pub fn with_output(mut self, out: Box<dyn Write + Send>) -> Self {
        self.out = out;
        self
    }

    pub fn buffer(&self) -> &SourceBuffer {
        &self.buffer
    }

    /// Make the program's source and subroutines known to `host`.
    pub fn install(&self, host: &mut MockHost) {
        host.add_source(self.buffer.clone());
        for (name, block) in &self.subs {
            let qualified = format!("{}::{name}", host.namespace);
            host.add_subroutine(&qualified, self.buffer.file().as_str(), block.header, block.end);
        }
    }

    /// Run to completion and return the exit status the session ended with.
    pub fn run(&mut self, debugger: &Debugger, host: &mut MockHost) -> i32 {
        let main: Vec<u32> = (1..=self.buffer.len()).filter(|line| !self.in_sub(*line)).collect();
        match self.run_block(&main, 1, debugger, host) {
            Err(status) => status,
            Ok(outcome) => {
                if let Outcome::Exited(status) = outcome {
                    host.exit_status = status;
                }
                let status = host.exit_status;
                match debugger.on_program_end(host, status) {
                    Control::Quit { status } => status,
                    Control::Resume => status,
                }
            }
        }
    }

    fn in_sub(&self, line: u32) -> bool {
        self.subs
            .values()
            .any(|block| (block.header..=block.end).contains(&line))
    }

    /// `Err(status)` when the debugger ended the session.
    fn run_block(&mut self, lines: &[u32], depth: usize, debugger: &Debugger, host: &mut MockHost) -> Result<Outcome, i32> {
        for &line in lines {
            if !self.buffer.is_breakable(line) {
                continue;
            }
            let position = SourcePosition::new(self.buffer.file().clone(), line);
            if let Control::Quit { status } = debugger.on_statement_boundary(host, &position, depth) {
                return Err(status);
            }
            let statement = self.buffer.line(line).unwrap_or_default().trim().trim_end_matches(';').trim().to_owned();
            match self.execute(&statement, line, depth, debugger, host)? {
                Outcome::Completed => {}
                outcome => return Ok(outcome),
            }
        }
        Ok(Outcome::Completed)
    }

    fn execute(
        &mut self,
        statement: &str,
        line: u32,
        depth: usize,
        debugger: &Debugger,
        host: &mut MockHost,
    ) -> Result<Outcome, i32> {
        if let Some(name) = statement.strip_suffix("()") {
            if let Some(block) = self.subs.get(name.trim()).copied() {
                if depth >= MAX_CALL_DEPTH {
                    let _ = writeln!(self.out, "Deep recursion on subroutine \"{name}\"");
                    return Ok(Outcome::Exited(255));
                }
                host.frames.insert(
                    0,
                    FrameInfo {
                        subroutine: format!("{}::{}", host.namespace, name.trim()),
                        args: Vec::new(),
                        file: self.buffer.file().clone(),
                        line,
                        context: Some('.'),
                    },
                );
                let body: Vec<u32> = (block.header + 1..block.end).collect();
                let outcome = self.run_block(&body, depth + 1, debugger, host);
                host.frames.remove(0);
                return match outcome? {
                    Outcome::Exited(status) => Ok(Outcome::Exited(status)),
                    _ => Ok(Outcome::Completed),
                };
            }
        }
        if let Some(expression) = statement.strip_prefix("return") {
            if !expression.trim().is_empty() {
                self.report(host.eval(expression), line);
            }
            return Ok(Outcome::Returned);
        }
        if let Some(status) = statement.strip_prefix("exit") {
            let status = status.trim().parse().unwrap_or(0);
            return Ok(Outcome::Exited(status));
        }
        if let Some(expression) = statement.strip_prefix("print ") {
            if let Some(value) = self.report(host.eval(expression), line) {
                let _ = writeln!(self.out, "{value}");
            }
            return Ok(Outcome::Completed);
        }
        self.report(host.eval(statement), line);
        Ok(Outcome::Completed)
    }

    fn report(&mut self, result: Result<Value, EvalError>, line: u32) -> Option<Value> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                let _ = writeln!(self.out, "{err} at {} line {line}.", self.buffer.file());
                None
            }
        }
    }
}
