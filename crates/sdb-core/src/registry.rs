//! Extension commands registered by collaborators, consulted before the
//! built-in commands.

use std::io::Write;

/// What an extension handler did with a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// Consumed; read the next command.
    Continue,
    /// Consumed; leave the command loop and resume the program.
    Stop,
    /// Not for this handler; try the next matching entry.
    NotConsumed,
}

pub trait CommandHandler: Send {
    /// Called with the full command text (after alias expansion).
    fn handle(&mut self, command: &str, out: &mut dyn Write) -> Handled;

    /// Called once after session setup, before the first prompt.
    fn after_init(&mut self, _out: &mut dyn Write) {}
}

impl<F> CommandHandler for F
where
    F: FnMut(&str, &mut dyn Write) -> Handled + Send,
{
    fn handle(&mut self, command: &str, out: &mut dyn Write) -> Handled {
        self(command, out)
    }
}

struct Entry {
    name: String,
    handler: Box<dyn CommandHandler>,
}

/// Handlers keyed by command-name prefix, scanned in registration order.
#[derive(Default)]
pub struct CommandRegistry {
    entries: Vec<Entry>,
    initialized: bool,
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("names", &self.names().collect::<Vec<_>>())
            .field("initialized", &self.initialized)
            .finish()
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Box<dyn CommandHandler>) {
        let name = name.into();
        tracing::debug!(target: "sdb.core", command = %name, "extension command registered");
        self.entries.push(Entry { name, handler });
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run every `after_init` hook. Only the first call does anything.
    pub fn initialize(&mut self, out: &mut dyn Write) {
        if std::mem::replace(&mut self.initialized, true) {
            return;
        }
        for entry in &mut self.entries {
            entry.handler.after_init(out);
        }
    }

    /// Offer `command` to every entry whose name is a prefix of it, stopping at
    /// the first that consumes it.
    pub fn dispatch(&mut self, command: &str, out: &mut dyn Write) -> Handled {
        for entry in &mut self.entries {
            if !command.starts_with(entry.name.as_str()) {
                continue;
            }
            match entry.handler.handle(command, out) {
                Handled::NotConsumed => continue,
                handled => return handled,
            }
        }
        Handled::NotConsumed
    }
}
