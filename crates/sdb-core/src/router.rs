//! The session's output stream, optionally routed through a pager.

use std::io::{self, Write};

use sdb_process::{CommandSpec, Pager, PagerWriter};

use crate::error::{DebugError, DebugResult};
use crate::state::SignalFlag;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeMode {
    /// `|`: the session output and the program's standard output.
    SessionAndProgram,
    /// `||`: only the session output.
    SessionOnly,
}

struct Piped {
    pager: Pager,
    writer: PagerWriter,
    mode: PipeMode,
    #[cfg(unix)]
    stdout: Option<sdb_process::StdoutRedirect>,
}

pub struct OutputRouter {
    session: Box<dyn Write + Send>,
    piped: Option<Piped>,
    signal: SignalFlag,
}

impl std::fmt::Debug for OutputRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputRouter")
            .field("piped", &self.piped.as_ref().map(|piped| piped.pager.command().to_string()))
            .finish_non_exhaustive()
    }
}

impl OutputRouter {
    pub fn new(session: Box<dyn Write + Send>, signal: SignalFlag) -> Self {
        Self {
            session,
            piped: None,
            signal,
        }
    }

    pub fn is_piped(&self) -> bool {
        self.piped.is_some()
    }

    /// Start `command` and send output through it until [`OutputRouter::restore`].
    ///
    /// If the pager cannot be started nothing is redirected.
    pub fn pipe(&mut self, command: &CommandSpec, mode: PipeMode) -> DebugResult<()> {
        self.restore();
        let _ = self.session.flush();

        let pager = Pager::spawn(command)
            .map_err(|err| DebugError::io(format!("Can't run pager `{command}`"), err))?;
        let writer = match pager.writer() {
            Ok(writer) => writer,
            Err(err) => {
                let _ = pager.finish();
                return Err(DebugError::io("Can't write to pager", err));
            }
        };

        #[cfg(unix)]
        let stdout = match mode {
            PipeMode::SessionOnly => None,
            PipeMode::SessionAndProgram => {
                let redirect = pager
                    .input_fd()
                    .map(sdb_process::StdoutRedirect::to_fd)
                    .transpose();
                match redirect {
                    Ok(redirect) => redirect,
                    Err(err) => {
                        drop(writer);
                        let _ = pager.finish();
                        return Err(DebugError::io("Can't redirect standard output", err));
                    }
                }
            }
        };

        tracing::debug!(target: "sdb.core", pager = %pager.command(), ?mode, "output piped");
        self.piped = Some(Piped {
            pager,
            writer,
            mode,
            #[cfg(unix)]
            stdout,
        });
        Ok(())
    }

    /// Put the original streams back and wait for the pager, if any.
    pub fn restore(&mut self) {
        let Some(piped) = self.piped.take() else {
            return;
        };
        let Piped {
            pager,
            mut writer,
            mode: _,
            #[cfg(unix)]
            stdout,
        } = piped;
        let _ = writer.flush();
        // Every handle on the pipe has to go before the pager sees end of input.
        #[cfg(unix)]
        drop(stdout);
        drop(writer);
        match pager.finish() {
            Ok(status) => tracing::debug!(target: "sdb.core", %status, "output restored"),
            Err(err) => tracing::warn!(target: "sdb.core", error = %err, "pager did not exit cleanly"),
        }
    }
}

impl Write for OutputRouter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let Some(piped) = self.piped.as_mut() else {
            return self.session.write(buf);
        };
        match piped.writer.write(buf) {
            Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
                // The operator quit the pager. With the program's output going
                // there too, that stops the program like an interrupt.
                let mode = piped.mode;
                tracing::debug!(target: "sdb.core", ?mode, "pager went away");
                if mode == PipeMode::SessionAndProgram {
                    self.signal.raise();
                }
                self.restore();
                Ok(buf.len())
            }
            other => other,
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.piped.as_mut() {
            Some(piped) => match piped.writer.flush() {
                Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                other => other,
            },
            None => self.session.flush(),
        }
    }
}

impl Drop for OutputRouter {
    fn drop(&mut self) {
        self.restore();
    }
}
