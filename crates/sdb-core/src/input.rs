//! Where command lines come from: queued typeahead, `source`d files stacked
//! above the interactive reader, and the interactive reader itself.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// A blocking source of command lines. `Ok(None)` is end of input.
pub trait LineReader: Send {
    fn read_line(&mut self) -> io::Result<Option<String>>;
}

/// Reads lines from any buffered reader, stripping the line terminator.
#[derive(Debug)]
pub struct BufLineReader<R> {
    inner: R,
}

impl<R: BufRead + Send> BufLineReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: BufRead + Send> LineReader for BufLineReader<R> {
    fn read_line(&mut self) -> io::Result<Option<String>> {
        read_trimmed(&mut self.inner)
    }
}

fn read_trimmed(reader: &mut impl BufRead) -> io::Result<Option<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    while line.ends_with(['\n', '\r']) {
        line.pop();
    }
    Ok(Some(line))
}

/// The process' standard input.
#[derive(Debug, Default)]
pub struct StdinReader;

impl LineReader for StdinReader {
    fn read_line(&mut self) -> io::Result<Option<String>> {
        read_trimmed(&mut io::stdin().lock())
    }
}

/// A fixed list of lines.
#[derive(Debug, Default, Clone)]
pub struct ScriptReader {
    lines: VecDeque<String>,
}

impl ScriptReader {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

impl LineReader for ScriptReader {
    fn read_line(&mut self) -> io::Result<Option<String>> {
        Ok(self.lines.pop_front())
    }
}

/// Which layer of the stack a line was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Typeahead,
    Script,
    Interactive,
}

impl Origin {
    /// Lines the operator did not type are echoed after the prompt.
    pub fn echoes(self) -> bool {
        !matches!(self, Self::Interactive)
    }
}

pub struct InputStack {
    typeahead: VecDeque<String>,
    scripts: Vec<Box<dyn LineReader>>,
    interactive: Box<dyn LineReader>,
}

impl std::fmt::Debug for InputStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputStack")
            .field("typeahead", &self.typeahead)
            .field("scripts", &self.scripts.len())
            .finish_non_exhaustive()
    }
}

impl InputStack {
    pub fn new(interactive: Box<dyn LineReader>) -> Self {
        Self {
            typeahead: VecDeque::new(),
            scripts: Vec::new(),
            interactive,
        }
    }

    /// Queue lines to be read before anything else, in order.
    pub fn queue_typeahead(&mut self, lines: impl IntoIterator<Item = String>) {
        self.typeahead.extend(lines);
    }

    pub fn typeahead_len(&self) -> usize {
        self.typeahead.len()
    }

    /// Read `path` line by line until it is exhausted, then fall back to
    /// whatever was underneath.
    pub fn push_file(&mut self, path: &Path) -> io::Result<()> {
        let file = File::open(path)?;
        tracing::debug!(target: "sdb.core", path = %path.display(), "sourcing command file");
        self.push_reader(Box::new(BufLineReader::new(BufReader::new(file))));
        Ok(())
    }

    pub fn push_reader(&mut self, reader: Box<dyn LineReader>) {
        self.scripts.push(reader);
    }

    pub fn next_line(&mut self) -> io::Result<Option<(String, Origin)>> {
        if let Some(line) = self.typeahead.pop_front() {
            return Ok(Some((line, Origin::Typeahead)));
        }
        while let Some(script) = self.scripts.last_mut() {
            match script.read_line() {
                Ok(Some(line)) => return Ok(Some((line, Origin::Script))),
                Ok(None) => {
                    self.scripts.pop();
                }
                Err(err) => {
                    self.scripts.pop();
                    return Err(err);
                }
            }
        }
        Ok(self
            .interactive
            .read_line()?
            .map(|line| (line, Origin::Interactive)))
    }
}
