//! Per-line stop conditions and actions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{DebugError, DebugResult};
use crate::source::{FileId, SourceView};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopCondition {
    Always,
    When(String),
}

impl StopCondition {
    /// `""` and `"1"` both mean "always stop".
    pub fn parse(condition: &str) -> Self {
        match condition.trim() {
            "" | "1" => Self::Always,
            expr => Self::When(expr.to_owned()),
        }
    }

    pub fn expression(&self) -> Option<&str> {
        match self {
            Self::Always => None,
            Self::When(expr) => Some(expr),
        }
    }
}

/// Everything attached to one `(file, line)`.
///
/// A line may carry only an action (`stop == None`); such a line never halts
/// unless a one-shot halt is pending on it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Breakpoint {
    pub stop: Option<StopCondition>,
    pub action: Option<String>,
    /// Unconditional halt consumed the first time the line is reached.
    /// Independent of `stop`, which stays in place.
    #[serde(default)]
    pub one_shot: bool,
}

impl Breakpoint {
    pub fn condition(&self) -> Option<&str> {
        self.stop.as_ref().and_then(StopCondition::expression)
    }

    fn is_empty(&self) -> bool {
        self.stop.is_none() && self.action.is_none() && !self.one_shot
    }
}

/// What reaching a line asks of the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    pub stop: Option<StopCondition>,
    pub action: Option<String>,
    /// A pending one-shot halt fired on this reach.
    pub once: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BreakpointTable {
    entries: BTreeMap<(FileId, u32), Breakpoint>,
}

impl BreakpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, file: &FileId, line: u32) -> Option<&Breakpoint> {
        self.entries.get(&(file.clone(), line))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FileId, u32, &Breakpoint)> {
        self.entries
            .iter()
            .map(|((file, line), breakpoint)| (file, *line, breakpoint))
    }

    fn ensure_breakable(sources: &SourceView, file: &FileId, line: u32) -> DebugResult<()> {
        if sources.is_breakable(file, line) {
            Ok(())
        } else {
            Err(DebugError::NotBreakable { line })
        }
    }

    /// Install or replace the stop on a breakable line, keeping its action.
    pub fn set_stop(
        &mut self,
        sources: &SourceView,
        file: &FileId,
        line: u32,
        condition: StopCondition,
    ) -> DebugResult<()> {
        Self::ensure_breakable(sources, file, line)?;
        let entry = self.entries.entry((file.clone(), line)).or_default();
        entry.stop = Some(condition);
        Ok(())
    }

    /// Halt unconditionally the next time the line is reached.
    ///
    /// Any permanent stop on the line, conditional or not, is left untouched.
    pub fn set_one_shot(&mut self, sources: &SourceView, file: &FileId, line: u32) -> DebugResult<()> {
        Self::ensure_breakable(sources, file, line)?;
        self.entries.entry((file.clone(), line)).or_default().one_shot = true;
        Ok(())
    }

    pub fn set_action(
        &mut self,
        sources: &SourceView,
        file: &FileId,
        line: u32,
        action: &str,
    ) -> DebugResult<()> {
        Self::ensure_breakable(sources, file, line)?;
        self.entries.entry((file.clone(), line)).or_default().action = Some(action.to_owned());
        Ok(())
    }

    pub fn clear_stop(&mut self, file: &FileId, line: u32) -> DebugResult<()> {
        let key = (file.clone(), line);
        let Some(entry) = self.entries.get_mut(&key) else {
            return Err(DebugError::NoBreakpoint(line));
        };
        let had_stop = entry.stop.take().is_some();
        let had_once = std::mem::take(&mut entry.one_shot);
        if !had_stop && !had_once {
            return Err(DebugError::NoBreakpoint(line));
        }
        if entry.is_empty() {
            self.entries.remove(&key);
        }
        Ok(())
    }

    pub fn clear_action(&mut self, file: &FileId, line: u32) -> DebugResult<()> {
        let key = (file.clone(), line);
        let Some(entry) = self.entries.get_mut(&key) else {
            return Err(DebugError::NoBreakpoint(line));
        };
        entry.action = None;
        if entry.is_empty() {
            self.entries.remove(&key);
        }
        Ok(())
    }

    pub fn clear_all_stops(&mut self) {
        self.entries.retain(|_, entry| {
            entry.stop = None;
            entry.one_shot = false;
            !entry.is_empty()
        });
    }

    pub fn clear_all_actions(&mut self) {
        self.entries.retain(|_, entry| {
            entry.action = None;
            !entry.is_empty()
        });
    }

    /// Called once when execution reaches `(file, line)`.
    ///
    /// A pending one-shot halt is consumed here; the permanent stop is not.
    pub fn reach(&mut self, file: &FileId, line: u32) -> Option<Hit> {
        let key = (file.clone(), line);
        let entry = self.entries.get_mut(&key)?;
        let hit = Hit {
            stop: entry.stop.clone(),
            action: entry.action.clone(),
            once: std::mem::take(&mut entry.one_shot),
        };
        if entry.is_empty() {
            self.entries.remove(&key);
        }
        Some(hit)
    }

    /// Replace the whole table, e.g. after a restart.
    pub fn restore(&mut self, entries: impl IntoIterator<Item = (FileId, u32, Breakpoint)>) {
        self.entries = entries
            .into_iter()
            .filter(|(_, _, entry)| !entry.is_empty())
            .map(|(file, line, entry)| ((file, line), entry))
            .collect();
    }
}
