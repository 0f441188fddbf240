//! Restarting the debugged process in place.
//!
//! The session hands its state to the next process image through a JSON file
//! whose path travels in [`RESTART_STATE_ENV_VAR`].

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use sdb_config::SessionConfig;
use sdb_process::{CommandSpec, FdSnapshot};
use serde::{Deserialize, Serialize};

use crate::alias::AliasDefinition;
use crate::breakpoints::Breakpoint;
use crate::error::{DebugError, DebugResult};
use crate::source::FileId;
use crate::watch::WatchEntry;

pub const RESTART_STATE_ENV_VAR: &str = "SDB_RESTART_STATE";

/// Exit status of a session whose restart could not re-execute the program.
pub const RESTART_FAILED_STATUS: i32 = 254;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedBreakpoint {
    pub file: FileId,
    pub line: u32,
    #[serde(flatten)]
    pub breakpoint: Breakpoint,
}

/// What survives a restart.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartState {
    pub breakpoints: Vec<SavedBreakpoint>,
    pub watches: Vec<WatchEntry>,
    pub aliases: Vec<AliasDefinition>,
    pub options: Option<SessionConfig>,
    pub pre_prompt: Vec<String>,
    pub post_prompt: Vec<String>,
    /// True history carried over as-is.
    pub history: Vec<String>,
    /// Commands to replay before reading interactive input.
    pub typeahead: Vec<String>,
}

impl RestartState {
    pub fn write_to(&self, path: &Path) -> DebugResult<()> {
        let file = File::create(path).map_err(|err| DebugError::io(format!("Can't write {}", path.display()), err))?;
        self.write(file, path)
    }

    fn write(&self, file: File, path: &Path) -> DebugResult<()> {
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .map_err(|err| DebugError::io(format!("Can't write {}", path.display()), err.into()))?;
        writer
            .flush()
            .map_err(|err| DebugError::io(format!("Can't write {}", path.display()), err))
    }

    pub fn read_from(path: &Path) -> DebugResult<Self> {
        let context = || format!("Can't read restart state {}", path.display());
        let file = File::open(path).map_err(|err| DebugError::io(context(), err))?;
        serde_json::from_reader(BufReader::new(file)).map_err(|err| DebugError::io(context(), err.into()))
    }

    /// Write the handover file to a fresh temporary path and return it.
    pub fn write_handover(&self) -> DebugResult<PathBuf> {
        let (file, path) = tempfile::Builder::new()
            .prefix("sdb-restart-")
            .suffix(".json")
            .tempfile()
            .and_then(|file| file.keep().map_err(|err| err.error))
            .map_err(|err| DebugError::io("Can't create restart state file", err))?;
        self.write(file, &path)?;
        Ok(path)
    }

    /// Consume the handover left by a restarting predecessor, if any. The file
    /// is deleted and the variable unset either way.
    pub fn take_handover() -> DebugResult<Option<Self>> {
        let Some(path) = std::env::var_os(RESTART_STATE_ENV_VAR) else {
            return Ok(None);
        };
        std::env::remove_var(RESTART_STATE_ENV_VAR);
        let path = PathBuf::from(path);
        let state = Self::read_from(&path);
        let _ = std::fs::remove_file(&path);
        tracing::debug!(target: "sdb.core", path = %path.display(), ok = state.is_ok(), "restart state consumed");
        state.map(Some)
    }
}

/// Knows how to re-execute the current process image.
#[derive(Debug, Clone)]
pub struct RestartController {
    command: Option<CommandSpec>,
    snapshot: FdSnapshot,
}

impl RestartController {
    /// `argv` is the full command line of the debugged process; the
    /// descriptors open right now are the ones a restart keeps.
    pub fn new(argv: &[String]) -> Self {
        let command = argv
            .split_first()
            .map(|(program, args)| CommandSpec::new(program, args));
        Self {
            command,
            snapshot: FdSnapshot::capture(),
        }
    }

    /// Restart with the arguments this process was started with.
    pub fn from_env() -> Self {
        Self::new(&std::env::args().collect::<Vec<_>>())
    }

    pub fn command(&self) -> Option<&CommandSpec> {
        self.command.as_ref()
    }

    /// Hand `state` over and replace the process image. Only returns on
    /// failure, after cleaning up the handover file.
    pub fn restart(&self, state: &RestartState) -> DebugError {
        let Some(command) = &self.command else {
            return DebugError::RestartFailed("the original command line is unknown".to_owned());
        };
        let path = match state.write_handover() {
            Ok(path) => path,
            Err(err) => return DebugError::RestartFailed(err.to_string()),
        };
        std::env::set_var(RESTART_STATE_ENV_VAR, &path);
        self.snapshot.mark_close_on_exec_since();
        tracing::info!(target: "sdb.core", command = %command, "restarting");

        let err = sdb_process::exec_replace(command);
        std::env::remove_var(RESTART_STATE_ENV_VAR);
        let _ = std::fs::remove_file(&path);
        tracing::warn!(target: "sdb.core", command = %command, error = %err, "restart failed");
        DebugError::RestartFailed(format!("exec of `{command}` failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breakpoints::StopCondition;

    fn sample() -> RestartState {
        RestartState {
            breakpoints: vec![SavedBreakpoint {
                file: FileId::new("main.pl"),
                line: 10,
                breakpoint: Breakpoint {
                    stop: Some(StopCondition::When("$x > 1".into())),
                    action: Some("print $x".into()),
                    one_shot: false,
                },
            }],
            aliases: vec![AliasDefinition {
                name: "ll".into(),
                value: "l 1-20".into(),
            }],
            history: vec!["b 10".into(), "c".into()],
            ..RestartState::default()
        }
    }

    #[test]
    fn state_survives_a_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let state = sample();
        state.write_to(&path).unwrap();
        assert_eq!(RestartState::read_from(&path).unwrap(), state);
    }

    #[test]
    fn missing_fields_default() {
        let state: RestartState = serde_json::from_str(r#"{"history": ["p 1"]}"#).unwrap();
        assert_eq!(state.history, vec!["p 1".to_owned()]);
        assert!(state.breakpoints.is_empty());
        assert_eq!(state.options, None);
    }

    #[test]
    fn exec_failure_is_reported_and_cleans_up() {
        let controller = RestartController::new(&["/nonexistent/sdb-program".to_owned()]);
        let err = controller.restart(&sample());
        assert!(matches!(err, DebugError::RestartFailed(_)), "{err}");
        assert!(err.to_string().contains("/nonexistent/sdb-program"), "{err}");
    }

    #[test]
    fn unknown_command_line_cannot_restart() {
        let controller = RestartController::new(&[]);
        assert!(controller.command().is_none());
        assert!(matches!(controller.restart(&RestartState::default()), DebugError::RestartFailed(_)));
    }
}
