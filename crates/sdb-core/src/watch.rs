//! Watch expressions and change detection.

use serde::{Deserialize, Serialize};

use crate::error::EvalError;
use crate::host::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEntry {
    pub expression: String,
    pub last_value: String,
    /// Last evaluation failure, so a persistently failing watch is reported
    /// once rather than at every statement.
    #[serde(skip)]
    last_error: Option<String>,
}

impl WatchEntry {
    pub fn new(expression: impl Into<String>, initial: String) -> Self {
        Self {
            expression: expression.into(),
            last_value: initial,
            last_error: None,
        }
    }
}

/// A value change observed during [`WatchSet::observe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchChange {
    pub index: usize,
    pub expression: String,
    pub old_value: String,
    pub new_value: String,
}

/// A watch whose expression newly started failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchFailure {
    pub index: usize,
    pub expression: String,
    pub error: EvalError,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WatchReport {
    pub changes: Vec<WatchChange>,
    pub failures: Vec<WatchFailure>,
}

impl WatchReport {
    pub fn forces_halt(&self) -> bool {
        !self.changes.is_empty()
    }
}

/// Ordered watch expressions.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WatchSet {
    entries: Vec<WatchEntry>,
}

impl WatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[WatchEntry] {
        &self.entries
    }

    /// Add a watch. A failed first evaluation counts as already reported.
    pub fn add(&mut self, expression: &str, initial: &Result<Value, EvalError>) {
        let entry = match initial {
            Ok(value) => WatchEntry::new(expression.trim(), value.display()),
            Err(err) => WatchEntry {
                last_error: Some(err.message.clone()),
                ..WatchEntry::new(expression.trim(), Value::Undef.display())
            },
        };
        self.entries.push(entry);
    }

    /// Remove every watch whose expression is `expression`. Returns how many
    /// were removed.
    pub fn remove(&mut self, expression: &str) -> usize {
        let expression = expression.trim();
        let before = self.entries.len();
        self.entries.retain(|entry| entry.expression != expression);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn restore(&mut self, entries: Vec<WatchEntry>) {
        self.entries = entries;
    }

    /// Re-evaluate every watch with `eval` and record the results.
    ///
    /// `last_value` is overwritten for every successful evaluation whether or
    /// not anything changed; a failed evaluation keeps the previous value.
    pub fn observe(&mut self, mut eval: impl FnMut(&str) -> Result<Value, EvalError>) -> WatchReport {
        let mut report = WatchReport::default();
        for (index, entry) in self.entries.iter_mut().enumerate() {
            match eval(&entry.expression) {
                Ok(value) => {
                    entry.last_error = None;
                    let new_value = value.display();
                    if new_value != entry.last_value {
                        report.changes.push(WatchChange {
                            index,
                            expression: entry.expression.clone(),
                            old_value: entry.last_value.clone(),
                            new_value: new_value.clone(),
                        });
                    }
                    entry.last_value = new_value;
                }
                Err(error) => {
                    if entry.last_error.as_deref() != Some(error.message.as_str()) {
                        entry.last_error = Some(error.message.clone());
                        report.failures.push(WatchFailure {
                            index,
                            expression: entry.expression.clone(),
                            error,
                        });
                    }
                }
            }
        }
        report
    }
}
