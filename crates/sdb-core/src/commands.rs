//! Typed built-in commands.
//!
//! [`Command::parse`] tries the matchers in a fixed priority order: quit,
//! trace, `S`, `V`/`X`, `p`, `m`, `f`, `.`, `-`, the letter-coded legacy group
//! (`a A b B h l L o W < >`), `y`, `n`, `s`, `c`, `r`, `T`, `v`, `w`, `/`, `?`,
//! history recall, shell escape, `H`, `man`/`doc`, the `p`/`x` shortcuts, `=`,
//! `source`, `save`, `R`/`rerun` and the pager pipes. Text no matcher accepts is
//! a raw expression.

use crate::history::Recall;
use crate::router::PipeMode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Quit,
    ToggleTrace,
    /// `S [[!]pattern]`
    ListSubroutines(Option<SubPattern>),
    /// `V [namespace [vars...]]`, or `X [vars...]` for the current namespace.
    ListVariables {
        namespace: Option<String>,
        patterns: Vec<String>,
    },
    /// `p expr`
    Print(String),
    /// `m expr`
    Methods(String),
    /// `f file`
    SwitchFile(String),
    /// `.`
    ReturnToLastLine,
    /// `-`
    ScrollBack,
    Legacy(LegacyCommand),
    /// `y [level [vars...]]`
    Lexicals { level: usize, patterns: Vec<String> },
    /// `n`
    StepOver,
    /// `s`
    StepInto,
    /// `c [line|subroutine]`
    Continue(Option<String>),
    /// `r`
    Return,
    /// `T`
    StackTrace,
    /// `v [line]`
    Window(Option<u32>),
    /// `w expr`; a bare `w` lists the watches.
    Watch(Option<String>),
    /// `/pattern/`; empty reuses the previous pattern.
    SearchForward(String),
    /// `?pattern?`
    SearchBackward(String),
    Recall(RecallTarget),
    /// `!!` or `!! cmd`
    Shell(String),
    History(HistoryRequest),
    /// `man [topic]` / `doc [topic]`
    Doc(Option<String>),
    /// Bare `p`: print the default variable.
    PrintDefault,
    /// `x expr`
    Dump(String),
    /// `=`, `= name`, `= name value`
    Alias {
        name: Option<String>,
        value: Option<String>,
    },
    Source(String),
    Save(String),
    Restart,
    /// `rerun [n|-n]`
    Rerun(Option<i64>),
    Pipe { mode: PipeMode, command: String },
    Expression(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubPattern {
    pub pattern: String,
    pub negate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecallTarget {
    Relative(usize),
    Absolute(usize),
    Prefix(String),
}

impl RecallTarget {
    pub fn as_recall(&self) -> Recall<'_> {
        match self {
            Self::Relative(back) => Recall::Relative(*back),
            Self::Absolute(idx) => Recall::Absolute(*idx),
            Self::Prefix(prefix) => Recall::Prefix(prefix),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryRequest {
    /// `H` or `H -n`
    List(Option<usize>),
    /// `H -c`
    Clear,
}

/// A line number, or `*` for every line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineTarget {
    Current,
    Line(u32),
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListRange {
    /// Bare `l`: the next window.
    Next,
    Line(u32),
    /// `a-b`, or `a+n` converted to `a-(a+n)`.
    Span(u32, u32),
    Subroutine(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptOp {
    /// `< ?`
    List,
    /// `< *`
    Clear,
    /// `< expr`
    Replace(String),
    /// `<< expr`
    Append(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptSlot {
    Pre,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyCommand {
    /// `b [line|subroutine] [condition]`
    Break {
        target: Option<String>,
        condition: String,
    },
    DeleteBreak(LineTarget),
    /// `a [line] expr`; an empty expression removes the action.
    Action { line: Option<u32>, expression: String },
    DeleteAction(LineTarget),
    /// `W expr` or `W *`
    DeleteWatch(Option<String>),
    /// `L [a|b|w]`
    ListAll(Option<char>),
    List(ListRange),
    Help(Option<String>),
    /// `o [name[=value]|name?]...`, raw.
    Options(String),
    Prompt(PromptSlot, PromptOp),
}

/// Split off the first whitespace-delimited word.
fn split_word(text: &str) -> (&str, &str) {
    let text = text.trim();
    match text.find(char::is_whitespace) {
        Some(idx) => (&text[..idx], text[idx..].trim_start()),
        None => (text, ""),
    }
}

fn words(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_owned).collect()
}

fn non_empty(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_owned())
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let (word, rest) = split_word(line);

        if let Some(command) = parse_main(line, word, rest) {
            return command;
        }
        if let Some(legacy) = parse_legacy(line, word, rest) {
            return Self::Legacy(legacy);
        }
        if let Some(command) = parse_tail(line, word, rest) {
            return command;
        }
        Self::Expression(line.to_owned())
    }

    /// Whether the command resumes the program when it succeeds.
    pub fn resumes(&self) -> bool {
        matches!(
            self,
            Self::StepOver | Self::StepInto | Self::Continue(_) | Self::Return
        )
    }
}

/// Everything ahead of the legacy group.
fn parse_main(line: &str, word: &str, rest: &str) -> Option<Command> {
    let command = match word {
        "q" | "quit" if rest.is_empty() => Command::Quit,
        "t" if rest.is_empty() => Command::ToggleTrace,
        "S" => Command::ListSubroutines(non_empty(rest).map(|pattern| match pattern.strip_prefix('!') {
            Some(negated) => SubPattern {
                pattern: negated.trim().to_owned(),
                negate: true,
            },
            None => SubPattern {
                pattern,
                negate: false,
            },
        })),
        "V" => {
            let (namespace, patterns) = split_word(rest);
            Command::ListVariables {
                namespace: non_empty(namespace),
                patterns: words(patterns),
            }
        }
        "X" => Command::ListVariables {
            namespace: None,
            patterns: words(rest),
        },
        "p" if !rest.is_empty() => Command::Print(rest.to_owned()),
        "m" if !rest.is_empty() => Command::Methods(rest.to_owned()),
        "f" if !rest.is_empty() => Command::SwitchFile(rest.to_owned()),
        _ => match line {
            "." => Command::ReturnToLastLine,
            "-" => Command::ScrollBack,
            _ => return None,
        },
    };
    Some(command)
}

fn parse_line_target(text: &str) -> Option<LineTarget> {
    match text.trim() {
        "" => Some(LineTarget::Current),
        "*" => Some(LineTarget::All),
        line => line.parse().ok().map(LineTarget::Line),
    }
}

fn parse_list_range(text: &str) -> ListRange {
    let text = text.trim();
    if text.is_empty() {
        return ListRange::Next;
    }
    if let Ok(line) = text.parse() {
        return ListRange::Line(line);
    }
    if let Some((start, end)) = text.split_once('-') {
        if let (Ok(start), Ok(end)) = (start.trim().parse(), end.trim().parse()) {
            return ListRange::Span(start, end);
        }
    }
    if let Some((start, count)) = text.split_once('+') {
        if let (Ok(start), Ok(count)) = (start.trim().parse::<u32>(), count.trim().parse::<u32>()) {
            return ListRange::Span(start, start.saturating_add(count));
        }
    }
    ListRange::Subroutine(text.to_owned())
}

fn parse_prompt(line: &str, marker: char) -> Option<LegacyCommand> {
    let slot = if marker == '<' {
        PromptSlot::Pre
    } else {
        PromptSlot::Post
    };
    let rest = line.strip_prefix(marker)?;
    let op = match rest.strip_prefix(marker) {
        Some(appended) => PromptOp::Append(non_empty(appended)?),
        None => match rest.trim() {
            "" | "?" => PromptOp::List,
            "*" => PromptOp::Clear,
            expr => PromptOp::Replace(expr.to_owned()),
        },
    };
    Some(LegacyCommand::Prompt(slot, op))
}

/// The letter-coded group: breakpoints, actions, watches, listing, help,
/// options and prompt expressions.
fn parse_legacy(line: &str, word: &str, rest: &str) -> Option<LegacyCommand> {
    let command = match word {
        "b" => {
            let (target, condition) = split_word(rest);
            LegacyCommand::Break {
                target: non_empty(target),
                condition: condition.to_owned(),
            }
        }
        "B" => LegacyCommand::DeleteBreak(parse_line_target(rest)?),
        "a" => {
            let (first, tail) = split_word(rest);
            match first.parse() {
                Ok(line) => LegacyCommand::Action {
                    line: Some(line),
                    expression: tail.to_owned(),
                },
                Err(_) => LegacyCommand::Action {
                    line: None,
                    expression: rest.to_owned(),
                },
            }
        }
        "A" => LegacyCommand::DeleteAction(parse_line_target(rest)?),
        "W" => LegacyCommand::DeleteWatch(non_empty(rest)),
        "L" => match rest {
            "" => LegacyCommand::ListAll(None),
            "a" | "b" | "w" => LegacyCommand::ListAll(rest.chars().next()),
            _ => return None,
        },
        "l" => LegacyCommand::List(parse_list_range(rest)),
        "h" => LegacyCommand::Help(non_empty(rest)),
        "o" => LegacyCommand::Options(rest.to_owned()),
        _ if line.starts_with('<') => parse_prompt(line, '<')?,
        _ if line.starts_with('>') => parse_prompt(line, '>')?,
        _ => return None,
    };
    Some(command)
}

fn parse_recall(line: &str) -> Option<Command> {
    let rest = line.strip_prefix('!')?;
    if rest.starts_with('!') {
        return Some(Command::Shell(rest[1..].trim().to_owned()));
    }
    let rest = rest.trim();
    let target = if rest.is_empty() {
        RecallTarget::Relative(0)
    } else if let Some(back) = rest.strip_prefix('-').and_then(|n| n.parse().ok()) {
        RecallTarget::Relative(back)
    } else if let Ok(idx) = rest.parse() {
        RecallTarget::Absolute(idx)
    } else {
        RecallTarget::Prefix(rest.to_owned())
    };
    Some(Command::Recall(target))
}

fn parse_search(line: &str, delim: char) -> Option<String> {
    let pattern = line.strip_prefix(delim)?;
    let pattern = pattern.strip_suffix(delim).unwrap_or(pattern);
    Some(pattern.to_owned())
}

/// Everything after the legacy group.
fn parse_tail(line: &str, word: &str, rest: &str) -> Option<Command> {
    let command = match word {
        "y" => {
            let (level, patterns) = split_word(rest);
            let (level, patterns) = match level.parse() {
                Ok(level) => (level, words(patterns)),
                Err(_) => (0, words(rest)),
            };
            Command::Lexicals { level, patterns }
        }
        "n" if rest.is_empty() => Command::StepOver,
        "s" if rest.is_empty() => Command::StepInto,
        "c" => Command::Continue(non_empty(rest)),
        "r" if rest.is_empty() => Command::Return,
        "T" if rest.is_empty() => Command::StackTrace,
        "v" => Command::Window(rest.trim().parse().ok()),
        "w" => Command::Watch(non_empty(rest)),
        "H" => Command::History(match rest {
            "-c" => HistoryRequest::Clear,
            "" => HistoryRequest::List(None),
            _ => HistoryRequest::List(rest.trim_start_matches('-').parse().ok()),
        }),
        "man" | "doc" => Command::Doc(non_empty(rest)),
        "p" => Command::PrintDefault,
        "x" if !rest.is_empty() => Command::Dump(rest.to_owned()),
        "=" => {
            let (name, value) = split_word(rest);
            Command::Alias {
                name: non_empty(name),
                value: non_empty(value),
            }
        }
        "source" if !rest.is_empty() => Command::Source(rest.to_owned()),
        "save" if !rest.is_empty() => Command::Save(rest.to_owned()),
        "R" if rest.is_empty() => Command::Restart,
        "rerun" => match rest {
            "" => Command::Rerun(None),
            n => Command::Rerun(Some(n.parse().ok()?)),
        },
        _ => {
            if let Some(pattern) = parse_search(line, '/') {
                Command::SearchForward(pattern)
            } else if let Some(pattern) = parse_search(line, '?') {
                Command::SearchBackward(pattern)
            } else if let Some(command) = parse_recall(line) {
                command
            } else if let Some(command) = line.strip_prefix("||") {
                Command::Pipe {
                    mode: PipeMode::SessionOnly,
                    command: command.trim().to_owned(),
                }
            } else if let Some(command) = line.strip_prefix('|') {
                Command::Pipe {
                    mode: PipeMode::SessionAndProgram,
                    command: command.trim().to_owned(),
                }
            } else if let Some(rest) = line.strip_prefix('=') {
                let (name, value) = split_word(rest);
                Command::Alias {
                    name: non_empty(name),
                    value: non_empty(value),
                }
            } else {
                return None;
            }
        }
    };
    Some(command)
}
