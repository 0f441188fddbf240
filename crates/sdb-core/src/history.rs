//! Command history: a compacted display log and a verbatim "true" log.

use crate::error::{DebugError, DebugResult};

/// One entry of the display log, numbered by its position in the true log so
/// that `!N` recalls what `H` printed as `N`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayEntry {
    pub index: usize,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recall<'a> {
    /// `!` (0) or `!-n`: counted back from the most recent command.
    Relative(usize),
    /// `!n`: position in the true log.
    Absolute(usize),
    /// `!text`: most recent command starting with `text`.
    Prefix(&'a str),
}

/// Commands that would recurse if a saved history file replayed them.
const NO_REPLAY: &[&str] = &["save", "source", "rerun", "R"];

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct History {
    true_log: Vec<String>,
    display: Vec<DisplayEntry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the true log, e.g. after a restart. The display log is rebuilt.
    pub fn with_entries(entries: impl IntoIterator<Item = String>) -> Self {
        let mut history = Self::new();
        for entry in entries {
            history.push(&entry);
        }
        history
    }

    /// Record a command as typed. Empty commands are ignored; one-character
    /// commands only reach the true log.
    pub fn push(&mut self, command: &str) {
        if command.trim().is_empty() {
            return;
        }
        let index = self.true_log.len();
        self.true_log.push(command.to_owned());
        if command.trim().chars().count() > 1 {
            self.display.push(DisplayEntry {
                index,
                text: command.to_owned(),
            });
        }
    }

    pub fn len(&self) -> usize {
        self.true_log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.true_log.is_empty()
    }

    pub fn true_log(&self) -> &[String] {
        &self.true_log
    }

    pub fn display_log(&self) -> &[DisplayEntry] {
        &self.display
    }

    /// Drop the most recent command from both logs.
    pub fn pop(&mut self) -> Option<String> {
        let popped = self.true_log.pop()?;
        if self
            .display
            .last()
            .is_some_and(|entry| entry.index == self.true_log.len())
        {
            self.display.pop();
        }
        Some(popped)
    }

    /// Resolve a `!` command.
    ///
    /// The recall command itself is the most recent entry; it is dropped before
    /// the target is resolved. A miss leaves the logs as they are after that.
    pub fn recall(&mut self, target: Recall<'_>) -> DebugResult<String> {
        self.pop();
        let found = match target {
            Recall::Relative(back) => back
                .checked_add(1)
                .and_then(|distance| self.true_log.len().checked_sub(distance))
                .and_then(|idx| self.true_log.get(idx)),
            Recall::Absolute(idx) => self.true_log.get(idx),
            Recall::Prefix(prefix) => self
                .true_log
                .iter()
                .rev()
                .find(|entry| entry.starts_with(prefix)),
        };
        match (found, target) {
            (Some(command), _) => Ok(command.clone()),
            (None, Recall::Prefix(prefix)) => {
                Err(DebugError::History(format!("No command starting with '{prefix}' found.")))
            }
            (None, _) => Err(DebugError::History("No such command in history.".to_owned())),
        }
    }

    /// Display entries to list, most recent first. `count` limits how many.
    pub fn listing(&self, count: Option<usize>) -> impl Iterator<Item = &DisplayEntry> {
        self.display
            .iter()
            .rev()
            .take(count.unwrap_or(usize::MAX))
    }

    /// Empty both logs.
    pub fn clear(&mut self) {
        self.true_log.clear();
        self.display.clear();
    }

    /// The true log rendered for a history file: one command per line, with
    /// commands that would replay themselves commented out.
    pub fn to_file_text(&self) -> String {
        let mut text = String::new();
        for command in &self.true_log {
            let first = command.split_whitespace().next().unwrap_or_default();
            if NO_REPLAY.contains(&first) {
                text.push_str("# ");
            }
            text.push_str(command);
            text.push('\n');
        }
        text
    }

    /// True-log commands to replay for `rerun`: `None` replays everything,
    /// `Some(n)` with `n >= 0` replays up to and including command `n`, and a
    /// negative `n` leaves out the last `-n` commands.
    pub fn replay_prefix(&self, upto: Option<i64>) -> DebugResult<Vec<String>> {
        let len = self.true_log.len() as i64;
        let end = match upto {
            None => Some(len),
            Some(n) if n >= 0 => n.checked_add(1),
            Some(n) => len.checked_add(n),
        };
        let Some(end) = end.filter(|end| (0..=len).contains(end)) else {
            return Err(DebugError::History(format!(
                "Cannot rerun to command {}: history has {len} commands.",
                upto.unwrap_or(len)
            )));
        };
        Ok(self.true_log[..end as usize]
            .iter()
            .filter(|command| {
                let first = command.split_whitespace().next().unwrap_or_default();
                !NO_REPLAY.contains(&first)
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(entries: &[&str]) -> History {
        History::with_entries(entries.iter().map(|entry| entry.to_string()))
    }

    #[test]
    fn single_characters_only_reach_the_true_log() {
        let history = history(&["s", "p $x", "", "n"]);
        assert_eq!(history.true_log(), &["s", "p $x", "n"]);
        assert_eq!(
            history.display_log(),
            &[DisplayEntry {
                index: 1,
                text: "p $x".into()
            }]
        );
    }

    #[test]
    fn relative_recall_discounts_the_recall_command() {
        let mut history = history(&["a", "b", "c", "!-1"]);
        assert_eq!(history.recall(Recall::Relative(1)).unwrap(), "b");
        assert_eq!(history.true_log(), &["a", "b", "c"]);
    }

    #[test]
    fn bare_recall_repeats_the_previous_command() {
        let mut history = history(&["p 1", "p 2", "!"]);
        assert_eq!(history.recall(Recall::Relative(0)).unwrap(), "p 2");
    }

    #[test]
    fn prefix_recall_finds_the_most_recent_match() {
        let mut history = history(&["a", "bx", "c", "by", "!b"]);
        assert_eq!(history.recall(Recall::Prefix("b")).unwrap(), "by");
    }

    #[test]
    fn misses_do_not_touch_the_logs_further() {
        let mut history = history(&["a", "b", "!zz"]);
        let err = history.recall(Recall::Prefix("zz")).unwrap_err();
        assert!(err.to_string().contains("zz"), "{err}");
        assert_eq!(history.true_log(), &["a", "b"]);

        history.push("!9");
        assert!(history.recall(Recall::Absolute(9)).is_err());
        assert_eq!(history.true_log(), &["a", "b"]);
    }

    #[test]
    fn huge_relative_recall_is_a_miss() {
        let mut history = history(&["a", "b", "!-x"]);
        let err = history.recall(Recall::Relative(usize::MAX)).unwrap_err();
        assert_eq!(err.to_string(), "No such command in history.");
        assert_eq!(history.true_log(), &["a", "b"]);
    }

    #[test]
    fn file_text_comments_out_self_replaying_commands() {
        let history = history(&["b 10", "save /tmp/x", "source y", "c"]);
        assert_eq!(
            history.to_file_text(),
            "b 10\n# save /tmp/x\n# source y\nc\n"
        );
    }

    #[test]
    fn replay_prefix_bounds() {
        let history = history(&["b 3", "c", "p $x", "n"]);
        assert_eq!(history.replay_prefix(None).unwrap().len(), 4);
        assert_eq!(history.replay_prefix(Some(1)).unwrap(), vec!["b 3", "c"]);
        assert_eq!(history.replay_prefix(Some(-1)).unwrap(), vec!["b 3", "c", "p $x"]);
        assert!(history.replay_prefix(Some(10)).is_err());
        assert!(history.replay_prefix(Some(-10)).is_err());
        let err = history.replay_prefix(Some(i64::MAX)).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Cannot rerun to command {}: history has 4 commands.", i64::MAX)
        );
        assert!(history.replay_prefix(Some(i64::MIN)).is_err());
    }

    #[test]
    fn clear_empties_both_logs() {
        let mut history = history(&["p 1", "s"]);
        history.clear();
        assert!(history.is_empty());
        assert!(history.display_log().is_empty());
    }
}
