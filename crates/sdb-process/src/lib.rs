//! OS-facing helpers for the sdb debugger core.
//!
//! Everything that touches processes or raw file descriptors lives here so the
//! core can stay platform-neutral:
//!
//! - interactive subprocesses (shell escapes, documentation lookup),
//! - pager processes fed through a pipe,
//! - temporary redirection of the process' standard output,
//! - descriptor snapshots and in-place re-exec for session restarts,
//! - an interrupt hook that raises the debugger's pending-signal flag.

use std::{
    collections::BTreeSet,
    fmt,
    io::{self, Write},
    path::PathBuf,
    process::{Child, ChildStdin, Command, ExitStatus, Stdio},
    sync::{
        atomic::{AtomicBool, AtomicPtr, Ordering},
        Arc,
    },
};

/// A full command invocation (program + args).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>, args: &[String]) -> Self {
        Self {
            program: program.into(),
            args: args.to_vec(),
        }
    }

    /// Split a configured command line (`"less -R"`) on whitespace.
    ///
    /// No shell is involved, so a missing program is reported as a spawn error
    /// instead of a shell exiting with 127.
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut words = command_line.split_whitespace();
        let program = words.next()?;
        Some(Self {
            program: PathBuf::from(program),
            args: words.map(str::to_owned).collect(),
        })
    }

    /// `shell -c script`, or an interactive `shell` when `script` is empty.
    pub fn shell(shell: &str, script: &str) -> Option<Self> {
        let mut spec = Self::parse(shell)?;
        let script = script.trim();
        if !script.is_empty() {
            spec.args.push("-c".to_owned());
            spec.args.push(script.to_owned());
        }
        Some(spec)
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // We keep quoting simple; the goal is human-readable diagnostics,
        // not round-trippable shell snippets.
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.contains(' ') || arg.contains('\t') {
                write!(f, " \"{}\"", arg.replace('"', "\\\""))?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Error returned by [`run_interactive_checked`].
#[derive(Debug)]
pub enum RunCommandError {
    Io {
        command: CommandSpec,
        source: io::Error,
    },
    Failed {
        command: CommandSpec,
        status: ExitStatus,
    },
}

impl fmt::Display for RunCommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { command, source } => write!(f, "failed to run `{command}`: {source}"),
            Self::Failed { command, status } => write!(f, "`{command}` exited with {status}"),
        }
    }
}

impl std::error::Error for RunCommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Failed { .. } => None,
        }
    }
}

/// Run a command attached to the debugger's terminal and wait for it.
pub fn run_interactive(command: &CommandSpec) -> io::Result<ExitStatus> {
    tracing::debug!(target: "sdb.process", command = %command, "running interactive command");
    // Anything we buffered must reach the terminal before the child draws on it.
    io::stdout().flush()?;
    command
        .command()
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
}

/// Like [`run_interactive`] but treats non-zero exits as errors.
pub fn run_interactive_checked(command: &CommandSpec) -> Result<ExitStatus, RunCommandError> {
    let status = run_interactive(command).map_err(|source| RunCommandError::Io {
        command: command.clone(),
        source,
    })?;
    if !status.success() {
        return Err(RunCommandError::Failed {
            command: command.clone(),
            status,
        });
    }
    Ok(status)
}

/// A running pager whose standard input is fed by the debugger.
#[derive(Debug)]
pub struct Pager {
    command: CommandSpec,
    child: Child,
    stdin: Option<ChildStdin>,
}

impl Pager {
    /// Spawn `command` with a piped standard input. The pager inherits the
    /// debugger's standard output and error.
    pub fn spawn(command: &CommandSpec) -> io::Result<Self> {
        io::stdout().flush()?;
        let mut child = command
            .command()
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()?;
        let Some(stdin) = child.stdin.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(io::Error::other("pager stdin was not captured"));
        };
        tracing::debug!(target: "sdb.process", command = %command, pid = child.id(), "pager started");
        Ok(Self {
            command: command.clone(),
            child,
            stdin: Some(stdin),
        })
    }

    pub fn command(&self) -> &CommandSpec {
        &self.command
    }

    /// A cloned handle onto the pager's input pipe.
    pub fn writer(&self) -> io::Result<PagerWriter> {
        let Some(stdin) = self.stdin.as_ref() else {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pager input closed"));
        };
        Ok(PagerWriter {
            inner: clone_stdin(stdin)?,
        })
    }

    /// Raw descriptor of the pager's input pipe, used to redirect the process'
    /// own standard output into the pager.
    #[cfg(unix)]
    pub fn input_fd(&self) -> Option<std::os::unix::io::RawFd> {
        use std::os::unix::io::AsRawFd;
        self.stdin.as_ref().map(|stdin| stdin.as_raw_fd())
    }

    /// Close the input pipe and wait for the pager to exit.
    pub fn finish(mut self) -> io::Result<ExitStatus> {
        drop(self.stdin.take());
        let status = self.child.wait()?;
        tracing::debug!(target: "sdb.process", command = %self.command, %status, "pager exited");
        Ok(status)
    }
}

/// Writable end of a pager pipe.
#[derive(Debug)]
pub struct PagerWriter {
    inner: std::fs::File,
}

impl Write for PagerWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(unix)]
fn clone_stdin(stdin: &ChildStdin) -> io::Result<std::fs::File> {
    use std::os::unix::io::{AsFd, OwnedFd};
    let fd: OwnedFd = stdin.as_fd().try_clone_to_owned()?;
    Ok(std::fs::File::from(fd))
}

#[cfg(windows)]
fn clone_stdin(stdin: &ChildStdin) -> io::Result<std::fs::File> {
    use std::os::windows::io::{AsHandle, OwnedHandle};
    let handle: OwnedHandle = stdin.as_handle().try_clone_to_owned()?;
    Ok(std::fs::File::from(handle))
}

/// Points the process' standard output at another descriptor until dropped.
#[derive(Debug)]
pub struct StdoutRedirect {
    #[cfg(unix)]
    saved: libc::c_int,
}

impl StdoutRedirect {
    #[cfg(unix)]
    pub fn to_fd(fd: std::os::unix::io::RawFd) -> io::Result<Self> {
        io::stdout().flush()?;
        // SAFETY: plain descriptor syscalls; `saved` is owned by the guard and
        // closed exactly once in `Drop`.
        unsafe {
            let saved = libc::dup(libc::STDOUT_FILENO);
            if saved < 0 {
                return Err(io::Error::last_os_error());
            }
            if libc::dup2(fd, libc::STDOUT_FILENO) < 0 {
                let err = io::Error::last_os_error();
                libc::close(saved);
                return Err(err);
            }
            Ok(Self { saved })
        }
    }
}

#[cfg(unix)]
impl Drop for StdoutRedirect {
    fn drop(&mut self) {
        let _ = io::stdout().flush();
        // SAFETY: `saved` was produced by `dup` in `to_fd` and is still open.
        unsafe {
            libc::dup2(self.saved, libc::STDOUT_FILENO);
            libc::close(self.saved);
        }
    }
}

/// Descriptors open at the time of the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FdSnapshot {
    fds: BTreeSet<i32>,
}

impl FdSnapshot {
    pub fn capture() -> Self {
        Self {
            fds: open_fds().into_iter().collect(),
        }
    }

    pub fn contains(&self, fd: i32) -> bool {
        self.fds.contains(&fd)
    }

    /// Mark every descriptor above the standard streams that was opened after
    /// this snapshot close-on-exec. Returns the descriptors that were marked.
    ///
    /// The descriptors disappear when the process image is replaced, while a
    /// failed exec leaves the running session untouched.
    pub fn mark_close_on_exec_since(&self) -> Vec<i32> {
        let mut marked = Vec::new();
        for fd in open_fds() {
            if fd <= 2 || self.fds.contains(&fd) {
                continue;
            }
            if set_cloexec(fd) {
                marked.push(fd);
            }
        }
        if !marked.is_empty() {
            tracing::debug!(target: "sdb.process", ?marked, "stray descriptors marked close-on-exec");
        }
        marked
    }
}

#[cfg(unix)]
fn set_cloexec(fd: i32) -> bool {
    // SAFETY: F_GETFD/F_SETFD only touch the descriptor's flags.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFD);
        flags != -1 && libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) != -1
    }
}

#[cfg(not(unix))]
fn set_cloexec(_fd: i32) -> bool {
    false
}

#[cfg(target_os = "linux")]
fn open_fds() -> Vec<i32> {
    // Collect first: the directory handle itself shows up in the listing and is
    // closed again before we return.
    let Ok(entries) = std::fs::read_dir("/proc/self/fd") else {
        return probe_fds();
    };
    let listed: Vec<i32> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
        .collect();
    listed.into_iter().filter(|fd| fd_is_open(*fd)).collect()
}

#[cfg(all(unix, not(target_os = "linux")))]
fn open_fds() -> Vec<i32> {
    probe_fds()
}

#[cfg(not(unix))]
fn open_fds() -> Vec<i32> {
    Vec::new()
}

#[cfg(unix)]
fn probe_fds() -> Vec<i32> {
    // SAFETY: sysconf has no preconditions.
    let max = unsafe { libc::sysconf(libc::_SC_OPEN_MAX) };
    let max = if max <= 0 { 1024 } else { max.min(65_536) as i32 };
    (0..max).filter(|fd| fd_is_open(*fd)).collect()
}

#[cfg(unix)]
fn fd_is_open(fd: i32) -> bool {
    // SAFETY: F_GETFD only queries descriptor flags.
    unsafe { libc::fcntl(fd, libc::F_GETFD) != -1 }
}

/// Replace the current process image with `command`, keeping the process id.
///
/// Only returns on failure.
pub fn exec_replace(command: &CommandSpec) -> io::Error {
    tracing::info!(target: "sdb.process", command = %command, "re-executing process image");
    let _ = io::stdout().flush();
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.command().exec()
    }
    #[cfg(not(unix))]
    {
        io::Error::new(
            io::ErrorKind::Unsupported,
            format!("cannot re-execute `{command}` in place on this platform"),
        )
    }
}

static INTERRUPT_FLAG: AtomicPtr<AtomicBool> = AtomicPtr::new(std::ptr::null_mut());

/// Route SIGINT into `flag` instead of terminating the process.
///
/// Every installed flag is leaked, including ones replaced by a later call: a
/// handler already running may still hold the old pointer.
pub fn install_interrupt_flag(flag: Arc<AtomicBool>) -> io::Result<()> {
    let raw = Arc::into_raw(flag) as *mut AtomicBool;
    INTERRUPT_FLAG.store(raw, Ordering::SeqCst);

    #[cfg(unix)]
    {
        extern "C" fn on_interrupt(_signal: libc::c_int) {
            let flag = INTERRUPT_FLAG.load(Ordering::SeqCst);
            if !flag.is_null() {
                // SAFETY: non-null pointers stored in INTERRUPT_FLAG stay alive.
                unsafe { (*flag).store(true, Ordering::SeqCst) };
            }
        }

        let handler = on_interrupt as extern "C" fn(libc::c_int);
        // SAFETY: the handler only performs an atomic load and store.
        let previous = unsafe { libc::signal(libc::SIGINT, handler as libc::sighandler_t) };
        if previous == libc::SIG_ERR {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_command_lines_without_a_shell() {
        let spec = CommandSpec::parse("less -R  -F").unwrap();
        assert_eq!(spec.program, PathBuf::from("less"));
        assert_eq!(spec.args, vec!["-R".to_string(), "-F".to_string()]);
        assert!(CommandSpec::parse("   ").is_none());
    }

    #[test]
    fn shell_spec_only_adds_script_when_present() {
        let bare = CommandSpec::shell("/bin/sh", "").unwrap();
        assert!(bare.args.is_empty());

        let with_script = CommandSpec::shell("/bin/sh", "echo hi").unwrap();
        assert_eq!(with_script.args, vec!["-c".to_string(), "echo hi".to_string()]);
        assert_eq!(with_script.to_string(), "/bin/sh -c \"echo hi\"");
    }

    #[cfg(unix)]
    #[cfg(unix)]
    #[test]
    fn reinstalling_the_interrupt_flag_keeps_the_old_one_alive() {
        let first = Arc::new(AtomicBool::new(false));
        let second = Arc::new(AtomicBool::new(false));
        install_interrupt_flag(first.clone()).unwrap();
        install_interrupt_flag(second.clone()).unwrap();
        assert_eq!(Arc::strong_count(&first), 2);
        assert_eq!(Arc::strong_count(&second), 2);

        // SAFETY: the handler installed above only stores into `second`.
        assert_eq!(unsafe { libc::raise(libc::SIGINT) }, 0);
        assert!(second.load(Ordering::SeqCst));
        assert!(!first.load(Ordering::SeqCst));
    }

    #[test]
    fn snapshot_sees_standard_streams() {
        let snapshot = FdSnapshot::capture();
        assert!(snapshot.contains(0) || snapshot.contains(1) || snapshot.contains(2));
    }

    #[cfg(unix)]
    #[test]
    fn descriptors_opened_later_are_marked_close_on_exec() {
        use std::os::unix::io::AsRawFd;

        let snapshot = FdSnapshot::capture();
        let file = std::fs::File::open("/dev/null").unwrap();
        let fd = file.as_raw_fd();
        if snapshot.contains(fd) {
            // Another test closed and we reused a number from the snapshot.
            return;
        }
        // std opens files with O_CLOEXEC already; clear it to see it set again.
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFD);
            libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC);
        }

        let marked = snapshot.mark_close_on_exec_since();
        assert!(marked.contains(&fd), "{marked:?}");
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
        assert_ne!(flags & libc::FD_CLOEXEC, 0);
    }
}
