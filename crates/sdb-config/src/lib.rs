//! Configuration for sdb sessions.
//!
//! Configuration is read from TOML and split into two sections:
//!
//! ```toml
//! [logging]
//! level = "debug"
//! file = "/tmp/sdb.log"
//!
//! [session]
//! pager = "less -R"
//! window_size = 12
//! ```
//!
//! Every field has a default, so an empty file (or no file at all) is valid.

use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Once, OnceLock};

use parking_lot::ReentrantMutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
    #[error("unknown option `{0}`")]
    UnknownOption(String),
    #[error("invalid value `{value}` for option `{name}`")]
    InvalidOption { name: String, value: String },
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // The default `Display` includes a source snippet; keep just the message.
        ConfigError::Toml(err.message().to_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Either a simple level (`info`, `debug`, ...) or an `EnvFilter`
    /// directive string.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Emit logs in JSON format.
    #[serde(default)]
    pub json: bool,

    /// Mirror logs to stderr.
    ///
    /// Off by default: stderr usually shares the terminal with the debugger
    /// prompt.
    #[serde(default)]
    pub stderr: bool,

    /// Append logs to the given file path.
    ///
    /// If the file cannot be opened, file logging is disabled while other sinks
    /// remain active.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_owned()
    }

    pub(crate) fn normalize_level_directives(input: &str) -> String {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Self::default_level();
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "trace" => "trace".to_owned(),
            "debug" => "debug".to_owned(),
            "info" => "info".to_owned(),
            "warn" | "warning" => "warn".to_owned(),
            "error" => "error".to_owned(),
            // Anything else is treated as an `EnvFilter` directive string.
            _ => trimmed.to_owned(),
        }
    }

    fn config_env_filter(&self) -> tracing_subscriber::EnvFilter {
        let directives = Self::normalize_level_directives(&self.level);
        tracing_subscriber::EnvFilter::try_new(directives).unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::default()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        })
    }

    /// Create the effective `EnvFilter`.
    ///
    /// If `RUST_LOG` is set, it is merged into the resulting filter.
    pub fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        let env_directives = std::env::var("RUST_LOG")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        let config_directives = Self::normalize_level_directives(&self.level);

        match env_directives {
            Some(env_directives) => {
                let combined = format!("{config_directives},{env_directives}");
                tracing_subscriber::EnvFilter::try_new(combined)
                    .or_else(|_| tracing_subscriber::EnvFilter::try_new(env_directives))
                    .unwrap_or_else(|_| self.config_env_filter())
            }
            None => self.config_env_filter(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            stderr: false,
            file: None,
        }
    }
}

/// Knobs of the interactive session. All of them can be changed at runtime
/// with the `o` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Command line of the pager used by `|` and `||`.
    #[serde(default = "SessionConfig::default_pager")]
    pub pager: String,

    /// Shell used by `!!`.
    #[serde(default = "SessionConfig::default_shell")]
    pub shell: String,

    /// Command used by `man`/`doc`, invoked with the topic as argument.
    #[serde(default = "SessionConfig::default_doc_command")]
    pub doc_command: String,

    /// Number of source lines shown by listing commands.
    #[serde(default = "SessionConfig::default_window_size")]
    pub window_size: u32,

    /// Never halt unless an interrupt is pending.
    #[serde(default)]
    pub non_stop: bool,

    /// Halt before the first statement.
    #[serde(default = "default_true")]
    pub stop_at_start: bool,

    /// Enter the command loop once more when the program finishes.
    #[serde(default = "default_true")]
    pub inhibit_exit: bool,

    /// Maximum number of entries shown by a bare `H`.
    #[serde(default)]
    pub history_limit: Option<usize>,
}

fn default_true() -> bool {
    true
}

impl SessionConfig {
    fn default_pager() -> String {
        std::env::var("PAGER")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "less".to_owned())
    }

    fn default_shell() -> String {
        std::env::var("SHELL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "/bin/sh".to_owned())
    }

    fn default_doc_command() -> String {
        "man".to_owned()
    }

    fn default_window_size() -> u32 {
        10
    }

    pub const OPTION_NAMES: &'static [&'static str] = &[
        "pager",
        "shell",
        "doc_command",
        "window_size",
        "non_stop",
        "stop_at_start",
        "inhibit_exit",
        "history_limit",
    ];

    /// Current value of an option, rendered the way `o` prints it.
    pub fn option(&self, name: &str) -> Result<String, ConfigError> {
        let value = match name {
            "pager" => self.pager.clone(),
            "shell" => self.shell.clone(),
            "doc_command" => self.doc_command.clone(),
            "window_size" => self.window_size.to_string(),
            "non_stop" => self.non_stop.to_string(),
            "stop_at_start" => self.stop_at_start.to_string(),
            "inhibit_exit" => self.inhibit_exit.to_string(),
            "history_limit" => match self.history_limit {
                Some(limit) => limit.to_string(),
                None => "none".to_owned(),
            },
            _ => return Err(ConfigError::UnknownOption(name.to_owned())),
        };
        Ok(value)
    }

    /// Set an option from its textual form.
    ///
    /// `value = None` means the option was named without `=`, which switches
    /// boolean options on.
    pub fn set_option(&mut self, name: &str, value: Option<&str>) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidOption {
            name: name.to_owned(),
            value: value.unwrap_or_default().to_owned(),
        };
        let text = value.map(str::trim);
        match name {
            "pager" | "shell" | "doc_command" => {
                let text = text.filter(|text| !text.is_empty()).ok_or_else(invalid)?;
                let slot = match name {
                    "pager" => &mut self.pager,
                    "shell" => &mut self.shell,
                    _ => &mut self.doc_command,
                };
                *slot = text.to_owned();
            }
            "window_size" => {
                let size: u32 = text.and_then(|text| text.parse().ok()).ok_or_else(invalid)?;
                if size == 0 {
                    return Err(invalid());
                }
                self.window_size = size;
            }
            "non_stop" | "stop_at_start" | "inhibit_exit" => {
                let flag = match text {
                    None => true,
                    Some(text) => parse_bool(text).ok_or_else(invalid)?,
                };
                match name {
                    "non_stop" => self.non_stop = flag,
                    "stop_at_start" => self.stop_at_start = flag,
                    _ => self.inhibit_exit = flag,
                }
            }
            "history_limit" => {
                self.history_limit = match text {
                    None | Some("none") | Some("") => None,
                    Some(text) => Some(text.parse().map_err(|_| invalid())?),
                };
            }
            _ => return Err(ConfigError::UnknownOption(name.to_owned())),
        }
        tracing::debug!(target: "sdb.config", option = name, value = ?value, "option changed");
        Ok(())
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pager: Self::default_pager(),
            shell: Self::default_shell(),
            doc_command: Self::default_doc_command(),
            window_size: Self::default_window_size(),
            non_stop: false,
            stop_at_start: true,
            inhibit_exit: true,
            history_limit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SdbConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl SdbConfig {
    /// Load a config file from TOML.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str(&text)
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        let config: SdbConfig = toml::from_str(text)?;
        if config.session.window_size == 0 {
            return Err(ConfigError::InvalidOption {
                name: "window_size".to_owned(),
                value: "0".to_owned(),
            });
        }
        Ok(config)
    }
}

impl fmt::Display for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for name in Self::OPTION_NAMES {
            if let Ok(value) = self.option(name) {
                writeln!(f, "{name:>15} = '{value}'")?;
            }
        }
        Ok(())
    }
}

pub const SDB_CONFIG_ENV_VAR: &str = "SDB_CONFIG_PATH";

static CONFIG_ENV_LOCK: OnceLock<ReentrantMutex<()>> = OnceLock::new();

fn config_env_lock() -> &'static ReentrantMutex<()> {
    CONFIG_ENV_LOCK.get_or_init(|| ReentrantMutex::new(()))
}

/// Run `f` while holding the config environment lock.
///
/// Tests that temporarily set [`SDB_CONFIG_ENV_VAR`] wrap the mutation and the
/// discovery in this helper so concurrent discovery never observes the
/// override.
pub fn with_config_env_lock<R>(f: impl FnOnce() -> R) -> R {
    let _guard = config_env_lock().lock();
    f()
}

/// Discover the configuration file for a working directory.
///
/// Search order:
/// 1) `SDB_CONFIG_PATH` (absolute or relative to `cwd`)
/// 2) `.sdb.toml` in `cwd`
/// 3) `sdb.toml` in `cwd`
pub fn discover_config_path(cwd: &Path) -> Option<PathBuf> {
    let _guard = config_env_lock().lock();
    if let Some(value) = std::env::var_os(SDB_CONFIG_ENV_VAR) {
        let candidate = PathBuf::from(value);
        let path = if candidate.is_absolute() {
            candidate
        } else {
            cwd.join(candidate)
        };
        return Some(path);
    }

    [".sdb.toml", "sdb.toml"]
        .into_iter()
        .map(|name| cwd.join(name))
        .find(|path| path.is_file())
}

/// Load the configuration for a working directory.
///
/// If no config is present, returns [`SdbConfig::default`] and `None`.
pub fn load_for_dir(cwd: &Path) -> Result<(SdbConfig, Option<PathBuf>), ConfigError> {
    let Some(path) = discover_config_path(cwd) else {
        return Ok((SdbConfig::default(), None));
    };

    let config = SdbConfig::load_from_path(&path)?;
    Ok((config, Some(path)))
}

struct MutexFileMakeWriter {
    file: Arc<Mutex<std::fs::File>>,
}

impl<'a> MakeWriter<'a> for MutexFileMakeWriter {
    type Writer = MutexFileWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        MutexFileWriter {
            // A poisoned lock only means another writer panicked mid-line.
            guard: self
                .file
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        }
    }
}

struct MutexFileWriter<'a> {
    guard: std::sync::MutexGuard<'a, std::fs::File>,
}

impl Write for MutexFileWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.guard.flush()
    }
}

static TRACING_INIT: Once = Once::new();

/// Initializes structured `tracing` logging.
///
/// This function is safe to call multiple times; only the first call installs a
/// global subscriber. With neither `stderr` nor `file` configured, events are
/// filtered but discarded.
pub fn init_tracing(logging: &LoggingConfig) {
    TRACING_INIT.call_once(|| {
        let filter = logging.env_filter();

        let file = logging.file.as_ref().and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });
        let file_open_failed = logging.file.is_some() && file.is_none();

        let mut make_writer = BoxMakeWriter::new(io::sink);
        if logging.stderr {
            // `cargo test` output capture only works for the stdlib's print macros.
            if cfg!(debug_assertions) {
                make_writer = BoxMakeWriter::new(
                    make_writer.and(tracing_subscriber::fmt::writer::TestWriter::with_stderr),
                );
            } else {
                make_writer = BoxMakeWriter::new(make_writer.and(io::stderr));
            }
        }
        if let Some(file) = file {
            let file = Arc::new(Mutex::new(file));
            make_writer = BoxMakeWriter::new(make_writer.and(MutexFileMakeWriter { file }));
        }

        let layer: Box<dyn tracing_subscriber::Layer<_> + Send + Sync> = if logging.json {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        };

        let subscriber = tracing_subscriber::registry().with(filter).with(layer);
        if tracing::subscriber::set_global_default(subscriber).is_ok() && file_open_failed {
            if let Some(path) = logging.file.as_ref() {
                tracing::warn!(
                    target: "sdb.config",
                    path = %path.display(),
                    "failed to open log file; file logging disabled"
                );
            }
        }
    });
}
