//! ripgrep process spawning and control.
//!
//! [`SearchCommand`] turns [`SearchParameters`] into an argument vector;
//! [`SearchProcess`] wraps the running child.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdout, Command};

use crate::search::SearchParameters;

/// Binary used when no other is configured.
pub const DEFAULT_BINARY: &str = "rg";

/// Flags passed on every invocation, before the per-search options.
pub const BASE_ARGS: [&str; 10] = [
    "-a",
    "-n",
    "--threads",
    "0",
    "--mmap",
    "--column",
    "--byte-offset",
    "--stats",
    "--heading",
    "--json",
];

/// Error type for process spawning operations.
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    /// The binary was not found.
    #[error("Search tool not found: {0}")]
    NotFound(String),
    /// Permission denied when spawning.
    #[error("Permission denied running {0}")]
    PermissionDenied(String),
    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpawnError {
    fn from_io(binary: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(binary.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(binary.to_string()),
            _ => Self::Io(err),
        }
    }
}

/// Builder for one ripgrep invocation.
#[derive(Debug, Clone)]
pub struct SearchCommand {
    binary: PathBuf,
    params: SearchParameters,
}

impl SearchCommand {
    /// Create a command for `params` using the default binary.
    #[must_use]
    pub fn new(params: SearchParameters) -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_BINARY),
            params,
        }
    }

    /// Use a different binary.
    #[must_use]
    pub fn binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    #[must_use]
    pub fn get_binary(&self) -> &PathBuf {
        &self.binary
    }

    #[must_use]
    pub fn params(&self) -> &SearchParameters {
        &self.params
    }

    /// Everything but the search path.
    fn option_args(&self) -> Vec<String> {
        let mut args: Vec<String> = BASE_ARGS.iter().map(|s| (*s).to_string()).collect();

        if self.params.fixed_string {
            args.push("-F".to_string());
        }

        if let Some(flag) = self.params.case_mode.flag() {
            args.push(flag.to_string());
        }

        for rule in self.params.glob_rules() {
            args.push("-g".to_string());
            args.push(rule.to_arg());
        }

        // `-e` keeps patterns that start with '-' from being read as flags.
        args.push("-e".to_string());
        args.push(self.params.combined_pattern());

        args
    }

    /// Build the command-line arguments, search path last.
    #[must_use]
    pub fn build_args(&self) -> Vec<String> {
        let mut args = self.option_args();
        args.push(self.params.path.to_string_lossy().into_owned());
        args
    }

    /// Shell-quoted command line, for logs and display.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.binary.to_string_lossy().into_owned())
            .chain(self.build_args())
            .map(|arg| shell_escape::escape(arg.into()).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(self.option_args())
            .arg(&self.params.path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// A running ripgrep process.
#[derive(Debug)]
pub struct SearchProcess {
    child: Child,
}

impl SearchProcess {
    /// Spawn the process described by `command`.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the process fails to spawn.
    pub fn spawn(command: &SearchCommand) -> Result<Self, SpawnError> {
        let binary = command.binary.to_string_lossy();
        tracing::debug!(command = %command.command_line(), "Spawning search tool");

        let child = command
            .to_command()
            .spawn()
            .map_err(|e| SpawnError::from_io(&binary, e))?;

        Ok(Self { child })
    }

    /// Take ownership of the stdout handle.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Take ownership of the stderr handle.
    ///
    /// This can only be called once; subsequent calls return `None`.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Get the process ID, if still running.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Check if the process has exited without blocking.
    ///
    /// # Errors
    ///
    /// Returns an error if the process state cannot be queried.
    pub fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Wait for the process to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting fails.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Forcefully kill the process.
    ///
    /// # Errors
    ///
    /// Returns an error if the kill signal cannot be sent.
    pub async fn kill(&mut self) -> std::io::Result<()> {
        self.child.kill().await
    }

    /// Ask the process to stop, then kill it if it is still running after
    /// `timeout`.
    ///
    /// On Unix this sends SIGTERM and polls for exit every `poll_interval`.
    /// Other platforms kill immediately. Returns the exit status when one
    /// was observed.
    ///
    /// # Errors
    ///
    /// Returns an error if termination fails.
    pub async fn graceful_terminate(
        &mut self,
        timeout: Duration,
        poll_interval: Duration,
    ) -> std::io::Result<Option<ExitStatus>> {
        #[cfg(unix)]
        {
            self.graceful_terminate_unix(timeout, poll_interval).await
        }

        #[cfg(not(unix))]
        {
            let _ = (timeout, poll_interval);
            self.kill().await?;
            self.try_wait()
        }
    }

    #[cfg(unix)]
    async fn graceful_terminate_unix(
        &mut self,
        timeout: Duration,
        poll_interval: Duration,
    ) -> std::io::Result<Option<ExitStatus>> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(status) = self.try_wait()? {
            return Ok(Some(status));
        }

        let Some(pid) = self.id() else {
            return Ok(None);
        };

        let nix_pid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
        let _ = kill(nix_pid, Signal::SIGTERM);

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(status) = self.try_wait()? {
                tracing::debug!(pid, ?status, "Search tool exited after SIGTERM");
                return Ok(Some(status));
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(poll_interval).await;
        }

        tracing::warn!(pid, ?timeout, "Search tool ignored SIGTERM, killing");
        self.child.kill().await?;
        self.try_wait()
    }
}
