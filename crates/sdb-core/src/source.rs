//! Source text and breakable-line flags, one buffer per file.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::{DebugError, DebugResult};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Where execution is suspended. Taken once per halt and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourcePosition {
    pub file: FileId,
    pub line: u32,
}

impl SourcePosition {
    pub fn new(file: impl Into<FileId>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Lines of one file plus a parallel "is executable" flag per line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceBuffer {
    file: FileId,
    lines: Vec<String>,
    breakable: Vec<bool>,
}

impl SourceBuffer {
    /// `breakable` is padded with `false` (or truncated) to match `lines`.
    pub fn new(file: impl Into<FileId>, lines: Vec<String>, mut breakable: Vec<bool>) -> Self {
        breakable.resize(lines.len(), false);
        Self {
            file: file.into(),
            lines,
            breakable,
        }
    }

    /// Build a buffer from text, asking `is_breakable` about every line.
    pub fn from_text(
        file: impl Into<FileId>,
        text: &str,
        is_breakable: impl Fn(&str) -> bool,
    ) -> Self {
        let lines: Vec<String> = text.lines().map(str::to_owned).collect();
        let breakable = lines.iter().map(|line| is_breakable(line)).collect();
        Self::new(file, lines, breakable)
    }

    pub fn file(&self) -> &FileId {
        &self.file
    }

    pub fn len(&self) -> u32 {
        self.lines.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// 1-based.
    pub fn line(&self, line: u32) -> Option<&str> {
        let idx = (line as usize).checked_sub(1)?;
        self.lines.get(idx).map(String::as_str)
    }

    pub fn is_breakable(&self, line: u32) -> bool {
        (line as usize)
            .checked_sub(1)
            .and_then(|idx| self.breakable.get(idx))
            .copied()
            .unwrap_or(false)
    }

    /// First breakable line in `from..=limit`.
    pub fn next_breakable(&self, from: u32, limit: u32) -> Option<u32> {
        let limit = limit.min(self.len());
        (from.max(1)..=limit).find(|line| self.is_breakable(*line))
    }

    /// The non-executable lines that continue the statement starting at `line`.
    ///
    /// Stops at the next breakable line, or at a line that starts with `;`, `}`
    /// or `#`, or is blank.
    pub fn continuation_lines(&self, line: u32) -> Vec<(u32, &str)> {
        let mut out = Vec::new();
        let mut next = line + 1;
        while next <= self.len() && !self.is_breakable(next) {
            let Some(text) = self.line(next) else {
                break;
            };
            let trimmed = text.trim_start();
            if trimmed.is_empty() || trimmed.starts_with([';', '}', '#']) {
                break;
            }
            out.push((next, text));
            next += 1;
        }
        out
    }

    /// Clamp `range` to the buffer's lines.
    pub fn clamp(&self, range: RangeInclusive<u32>) -> RangeInclusive<u32> {
        let start = (*range.start()).max(1);
        let end = (*range.end()).min(self.len());
        start..=end
    }
}

/// All source buffers known to the session. Exactly one is active; switching
/// is always explicit.
#[derive(Debug, Default)]
pub struct SourceView {
    buffers: BTreeMap<FileId, SourceBuffer>,
    active: Option<FileId>,
    /// Next line a bare `l` lists in the active file.
    cursor: u32,
    /// Line the last search matched, or where searching starts.
    search_line: u32,
}

impl SourceView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, buffer: SourceBuffer) {
        let file = buffer.file().clone();
        self.buffers.insert(file.clone(), buffer);
        if self.active.is_none() {
            self.set_active(file, 1);
        }
    }

    pub fn contains(&self, file: &FileId) -> bool {
        self.buffers.contains_key(file)
    }

    pub fn get(&self, file: &FileId) -> Option<&SourceBuffer> {
        self.buffers.get(file)
    }

    pub fn files(&self) -> impl Iterator<Item = &FileId> {
        self.buffers.keys()
    }

    pub fn active(&self) -> Option<&FileId> {
        self.active.as_ref()
    }

    pub fn active_buffer(&self) -> Option<&SourceBuffer> {
        self.active.as_ref().and_then(|file| self.buffers.get(file))
    }

    /// Make `file` active and move the listing cursor to `line`.
    pub fn switch_to(&mut self, file: &FileId, line: u32) -> DebugResult<()> {
        if !self.buffers.contains_key(file) {
            return Err(DebugError::UnknownFile(file.to_string()));
        }
        self.set_active(file.clone(), line);
        Ok(())
    }

    fn set_active(&mut self, file: FileId, line: u32) {
        self.active = Some(file);
        self.cursor = line.max(1);
        self.search_line = line.max(1);
    }

    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub fn set_cursor(&mut self, line: u32) {
        self.cursor = line.max(1);
    }

    pub fn search_line(&self) -> u32 {
        self.search_line
    }

    pub fn set_search_line(&mut self, line: u32) {
        self.search_line = line.max(1);
    }

    pub fn is_breakable(&self, file: &FileId, line: u32) -> bool {
        self.buffers
            .get(file)
            .is_some_and(|buffer| buffer.is_breakable(line))
    }

    /// Resolve a user-typed file name: exact match first, then a unique-ish
    /// suffix, then any substring. Among `candidates` (files the host knows
    /// about but the view has not loaded) the same rules apply.
    pub fn find_file(&self, name: &str, candidates: &[FileId]) -> Option<FileId> {
        let all: Vec<&FileId> = self.buffers.keys().chain(candidates.iter()).collect();
        if let Some(exact) = all.iter().find(|file| file.as_str() == name) {
            return Some((*exact).clone());
        }
        if let Some(suffix) = all.iter().find(|file| file.as_str().ends_with(name)) {
            return Some((*suffix).clone());
        }
        all.iter()
            .find(|file| file.as_str().contains(name))
            .map(|file| (*file).clone())
    }
}
