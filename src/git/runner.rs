//! git::runner
//!
//! External command execution.
//!
//! # Architecture
//!
//! [`CommandRunner`] is the port through which every backend process is
//! started; [`ProcessRunner`] is the adapter that spawns real OS processes.
//! Swapping the adapter (for an in-process binding or a scripted fake) does
//! not change anything above the [`Git`](super::Git) doorway.
//!
//! # Guarantees
//!
//! - One OS process per invocation, no reuse
//! - stdin is closed before the process starts (`Stdio::null()`), so a
//!   command can never block on an interactive prompt
//! - stdout is handed over line by line through a bounded channel; a reader
//!   thread produces, the caller consumes, and memory stays flat no matter
//!   how long the history is
//! - stderr is drained concurrently so a chatty process cannot deadlock on a
//!   full pipe
//! - every invocation has a deadline; on expiry the process is killed
//! - a non-zero exit status is an error
//!
//! Arguments are passed as an argv vector. No shell is involved, so names
//! and messages cannot inject commands; [`Invocation`]'s `Display` only
//! renders a shell-quoted form for logs.

use std::ffi::{OsStr, OsString};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use crate::core::paths::escape_for_shell;

/// Polling interval while waiting for a child to exit.
const REAP_POLL: Duration = Duration::from_millis(5);

/// Lines buffered between the reader thread and the consumer.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Errors from running external commands.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The process could not be started.
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    /// The process exited unsuccessfully.
    #[error("`{command}` failed ({}): {stderr}", describe_code(.code))]
    Failed {
        command: String,
        /// Exit code, `None` if killed by a signal
        code: Option<i32>,
        stderr: String,
    },

    /// The process did not finish before its deadline and was killed.
    #[error("`{command}` timed out after {timeout:?}")]
    TimedOut { command: String, timeout: Duration },

    /// Reading the process output failed.
    #[error("failed to read output of `{command}`: {source}")]
    Io {
        command: String,
        source: std::io::Error,
    },
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "killed by signal".to_string(),
    }
}

/// A command to run: program, argv, working directory, extra environment
/// and deadline.
///
/// # Example
///
/// ```
/// use pagevault::git::Invocation;
/// use std::time::Duration;
///
/// let inv = Invocation::new("git")
///     .args(["log", "--", "pages/My Page"])
///     .timeout(Duration::from_secs(5));
/// assert_eq!(inv.to_string(), "git log -- 'pages/My Page'");
/// ```
#[derive(Debug, Clone)]
pub struct Invocation {
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    env: Vec<(OsString, OsString)>,
    timeout: Duration,
}

impl Invocation {
    /// Default deadline when none is set.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Start building an invocation of `program`.
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Run in `dir`.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Set an environment variable for the child.
    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.env
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    /// Set the deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The argument vector (without the program).
    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// The deadline.
    pub fn get_timeout(&self) -> Duration {
        self.timeout
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }

    fn spawn(&self) -> Result<Child, RunnerError> {
        debug!(command = %self, "spawn");
        self.command().spawn().map_err(|source| RunnerError::Spawn {
            command: self.to_string(),
            source,
        })
    }
}

impl std::fmt::Display for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", escape_for_shell(&self.program.to_string_lossy()))?;
        for arg in &self.args {
            write!(f, " {}", escape_for_shell(&arg.to_string_lossy()))?;
        }
        Ok(())
    }
}

/// Collected result of a finished command.
#[derive(Debug, Clone, Default)]
pub struct Output {
    pub stdout: Vec<u8>,
    pub stderr: String,
    /// Exit code, `None` if killed by a signal
    pub code: Option<i32>,
}

impl Output {
    /// Whether the command exited with status 0.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turn a non-zero exit into [`RunnerError::Failed`].
    pub fn into_result(self, invocation: &Invocation) -> Result<Self, RunnerError> {
        if self.success() {
            Ok(self)
        } else {
            Err(RunnerError::Failed {
                command: invocation.to_string(),
                code: self.code,
                stderr: self.stderr,
            })
        }
    }

    /// stdout decoded as UTF-8, lossily.
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// A lazily produced sequence of output lines.
///
/// Line terminators are stripped. The last item is an error if the command
/// failed, timed out or its output could not be read.
pub type LineStream = Box<dyn Iterator<Item = Result<String, RunnerError>> + Send>;

/// Port for running external commands.
pub trait CommandRunner: Send + Sync + std::fmt::Debug {
    /// Run a command and stream its stdout line by line.
    fn lines(&self, invocation: &Invocation) -> Result<LineStream, RunnerError>;

    /// Run a command to completion and collect its raw output.
    ///
    /// A non-zero exit is reported in [`Output::code`], not as an error;
    /// callers decide what a failure means for them.
    fn output(&self, invocation: &Invocation) -> Result<Output, RunnerError>;
}

/// Runs commands as child processes.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    channel_capacity: usize,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner {
    /// Create a runner with the default channel capacity.
    pub fn new() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Create a runner that buffers at most `capacity` lines ahead of the
    /// consumer.
    pub fn with_channel_capacity(capacity: usize) -> Self {
        Self {
            channel_capacity: capacity.max(1),
        }
    }
}

impl CommandRunner for ProcessRunner {
    fn lines(&self, invocation: &Invocation) -> Result<LineStream, RunnerError> {
        let mut child = invocation.spawn()?;
        let command = invocation.to_string();

        let stdout = child.stdout.take().ok_or_else(|| RunnerError::Io {
            command: command.clone(),
            source: std::io::Error::other("stdout not captured"),
        })?;
        let stderr = child.stderr.take().map(drain_stderr);

        let (tx, rx) = mpsc::sync_channel(self.channel_capacity);
        thread::spawn(move || {
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => break,
                    Ok(_) => {
                        while matches!(buf.last(), Some(b'\n' | b'\r')) {
                            buf.pop();
                        }
                        let line = String::from_utf8_lossy(&buf).into_owned();
                        if tx.send(Ok(line)).is_err() {
                            // Consumer went away.
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
        });

        Ok(Box::new(ProcessLines {
            command,
            child,
            rx,
            stderr,
            deadline: Instant::now() + invocation.timeout,
            timeout: invocation.timeout,
            done: false,
        }))
    }

    fn output(&self, invocation: &Invocation) -> Result<Output, RunnerError> {
        let mut child = invocation.spawn()?;
        let command = invocation.to_string();
        let deadline = Instant::now() + invocation.timeout;

        let stdout = child.stdout.take().map(|mut out| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                out.read_to_end(&mut buf).map(|_| buf)
            })
        });
        let stderr = child.stderr.take().map(drain_stderr);

        let status = match wait_until(&mut child, deadline) {
            Ok(Some(status)) => status,
            Ok(None) => {
                kill(&mut child, &command);
                return Err(RunnerError::TimedOut {
                    command,
                    timeout: invocation.timeout,
                });
            }
            Err(source) => return Err(RunnerError::Io { command, source }),
        };

        let stdout = match stdout.map(|h| h.join()) {
            Some(Ok(Ok(buf))) => buf,
            Some(Ok(Err(source))) => return Err(RunnerError::Io { command, source }),
            Some(Err(_)) => {
                return Err(RunnerError::Io {
                    command,
                    source: std::io::Error::other("stdout reader panicked"),
                })
            }
            None => Vec::new(),
        };

        Ok(Output {
            stdout,
            stderr: join_stderr(stderr),
            code: status.code(),
        })
    }
}

/// Consumer side of a streaming invocation.
struct ProcessLines {
    command: String,
    child: Child,
    rx: Receiver<std::io::Result<String>>,
    stderr: Option<JoinHandle<String>>,
    deadline: Instant,
    timeout: Duration,
    done: bool,
}

impl ProcessLines {
    fn timed_out(&mut self) -> RunnerError {
        kill(&mut self.child, &self.command);
        RunnerError::TimedOut {
            command: self.command.clone(),
            timeout: self.timeout,
        }
    }

    /// stdout is exhausted: reap the child and report its status.
    fn finish(&mut self) -> Option<RunnerError> {
        match wait_until(&mut self.child, self.deadline) {
            Ok(Some(status)) if status.success() => None,
            Ok(Some(status)) => Some(RunnerError::Failed {
                command: self.command.clone(),
                code: status.code(),
                stderr: join_stderr(self.stderr.take()),
            }),
            Ok(None) => Some(self.timed_out()),
            Err(source) => Some(RunnerError::Io {
                command: self.command.clone(),
                source,
            }),
        }
    }
}

impl Iterator for ProcessLines {
    type Item = Result<String, RunnerError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        let item = match self.rx.recv_timeout(remaining) {
            Ok(Ok(line)) => return Some(Ok(line)),
            Ok(Err(source)) => {
                kill(&mut self.child, &self.command);
                Some(RunnerError::Io {
                    command: self.command.clone(),
                    source,
                })
            }
            Err(RecvTimeoutError::Timeout) => Some(self.timed_out()),
            Err(RecvTimeoutError::Disconnected) => self.finish(),
        };
        self.done = true;
        item.map(Err)
    }
}

impl Drop for ProcessLines {
    fn drop(&mut self) {
        // Consumer stopped early: do not leave the process running.
        if !self.done {
            kill(&mut self.child, &self.command);
        }
    }
}

/// Read stderr to completion on a background thread.
fn drain_stderr(mut stderr: ChildStderr) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stderr.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).trim().to_string()
    })
}

fn join_stderr(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// Wait for the child to exit, giving up at `deadline`.
///
/// Returns `Ok(None)` if the deadline passed first.
fn wait_until(child: &mut Child, deadline: Instant) -> std::io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        thread::sleep(REAP_POLL.min(deadline - now));
    }
}

/// Kill and reap a child, ignoring one that has already exited.
fn kill(child: &mut Child, command: &str) {
    if let Ok(None) = child.try_wait() {
        warn!(%command, "killing unfinished process");
        let _ = child.kill();
    }
    let _ = child.wait();
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Invocation {
        Invocation::new("sh").args(["-c", script])
    }

    #[test]
    fn streams_lines_in_order() {
        let runner = ProcessRunner::new();
        let lines: Vec<String> = runner
            .lines(&sh("printf 'one\\ntwo\\r\\nthree'"))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(lines, ["one", "two", "three"]);
    }

    #[test]
    fn nonzero_exit_is_final_error() {
        let runner = ProcessRunner::new();
        let items: Vec<_> = runner
            .lines(&sh("echo partial; echo oops >&2; exit 3"))
            .unwrap()
            .collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref().unwrap(), "partial");
        match &items[1] {
            Err(RunnerError::Failed { code, stderr, .. }) => {
                assert_eq!(*code, Some(3));
                assert_eq!(stderr, "oops");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn stdin_is_closed() {
        let runner = ProcessRunner::new();
        // `cat` with a closed stdin exits immediately with no output.
        let out = runner
            .output(&Invocation::new("cat").timeout(Duration::from_secs(5)))
            .unwrap();
        assert!(out.success());
        assert!(out.stdout.is_empty());
    }

    #[test]
    fn stream_times_out() {
        let runner = ProcessRunner::new();
        let items: Vec<_> = runner
            .lines(&sh("echo first; sleep 5").timeout(Duration::from_millis(200)))
            .unwrap()
            .collect();
        assert!(matches!(items.last(), Some(Err(RunnerError::TimedOut { .. }))));
    }

    #[test]
    fn output_times_out() {
        let runner = ProcessRunner::new();
        let err = runner
            .output(&sh("sleep 5").timeout(Duration::from_millis(200)))
            .unwrap_err();
        assert!(matches!(err, RunnerError::TimedOut { .. }));
    }

    #[test]
    fn output_keeps_binary_stdout() {
        let runner = ProcessRunner::new();
        let out = runner.output(&sh("printf '\\000\\377'")).unwrap();
        assert_eq!(out.stdout, vec![0u8, 0xff]);
    }

    #[test]
    fn output_reports_failure_code() {
        let runner = ProcessRunner::new();
        let inv = sh("exit 1");
        let out = runner.output(&inv).unwrap();
        assert_eq!(out.code, Some(1));
        assert!(matches!(
            out.into_result(&inv),
            Err(RunnerError::Failed { code: Some(1), .. })
        ));
    }

    #[test]
    fn spawn_failure() {
        let runner = ProcessRunner::new();
        let err = runner
            .output(&Invocation::new("/nonexistent/definitely-not-here"))
            .unwrap_err();
        assert!(matches!(err, RunnerError::Spawn { .. }));
    }

    #[test]
    fn small_channel_still_delivers_everything() {
        let runner = ProcessRunner::with_channel_capacity(1);
        let count = runner
            .lines(&sh("seq 1 2000"))
            .unwrap()
            .filter(|l| l.is_ok())
            .count();
        assert_eq!(count, 2000);
    }

    #[test]
    fn dropping_stream_early_kills_process() {
        let runner = ProcessRunner::new();
        let mut stream = runner.lines(&sh("yes")).unwrap();
        assert_eq!(stream.next().unwrap().unwrap(), "y");
        drop(stream);
    }

    #[test]
    fn display_quotes_arguments() {
        let inv = Invocation::new("git").args(["commit", "-m", "it's done"]);
        assert_eq!(inv.to_string(), r"git commit -m 'it'\''s done'");
    }
}
