//! Runs search processes, one at a time.
//!
//! [`ProcessDriver::run`] terminates whatever is still running before it
//! spawns, so at most one search process is alive per driver. Output is
//! collected in memory and delivered through a [`SearchTicket`].

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::process::{SearchCommand, SearchProcess, SpawnError, DEFAULT_BINARY};
use crate::search::SearchParameters;

/// Default timeout for graceful process termination.
pub const DEFAULT_TERMINATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default interval between exit checks while terminating.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Identifies one search run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchId(Uuid);

impl SearchId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SearchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SearchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Error type for driver operations.
#[derive(thiserror::Error, Debug)]
pub enum ProcessError {
    /// The process could not be started.
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    /// Waiting on or terminating the process failed.
    #[error("Failed to supervise search process: {0}")]
    Io(#[from] std::io::Error),
    /// The run task ended without reporting.
    #[error("Search run was aborted")]
    Aborted,
}

/// Everything the process wrote, plus how it ended.
#[derive(Debug, Clone, Default)]
pub struct RawOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` when the exit status could not be observed.
    pub status: Option<ExitStatus>,
    /// The run was terminated on request.
    pub cancelled: bool,
}

impl RawOutput {
    /// Stdout as text; invalid UTF-8 is replaced.
    #[must_use]
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    /// Stderr as text, trimmed.
    #[must_use]
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }

    /// ripgrep exits with 1 when nothing matched; that is not a failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status
            .and_then(|s| s.code())
            .is_some_and(|code| code > 1)
    }
}

/// Driver settings.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub binary: PathBuf,
    pub terminate_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_BINARY),
            terminate_timeout: DEFAULT_TERMINATE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Handle to a started run; resolves to the collected output.
#[derive(Debug)]
pub struct SearchTicket {
    id: SearchId,
    rx: oneshot::Receiver<Result<RawOutput, ProcessError>>,
}

impl SearchTicket {
    #[must_use]
    pub fn id(&self) -> SearchId {
        self.id
    }

    /// Wait for the process to finish.
    ///
    /// # Errors
    ///
    /// Returns the run's `ProcessError`, or `Aborted` if the run task
    /// disappeared.
    pub async fn completion(self) -> Result<RawOutput, ProcessError> {
        self.rx.await.unwrap_or(Err(ProcessError::Aborted))
    }
}

#[derive(Debug)]
struct RunEntry {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

type Registry = Arc<Mutex<HashMap<SearchId, RunEntry>>>;

/// Spawns search processes and keeps track of the live one.
#[derive(Debug)]
pub struct ProcessDriver {
    config: DriverConfig,
    runs: Registry,
    spawn_lock: tokio::sync::Mutex<()>,
}

impl Default for ProcessDriver {
    fn default() -> Self {
        Self::new(DriverConfig::default())
    }
}

impl ProcessDriver {
    #[must_use]
    pub fn new(config: DriverConfig) -> Self {
        Self {
            config,
            runs: Arc::new(Mutex::new(HashMap::new())),
            spawn_lock: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// The command that [`ProcessDriver::run`] would execute for `params`.
    #[must_use]
    pub fn command(&self, params: &SearchParameters) -> SearchCommand {
        SearchCommand::new(params.clone()).binary(self.config.binary.clone())
    }

    /// Start search `id` for `params`.
    ///
    /// Any previous run is terminated and awaited first. Cancelling
    /// `cancel` terminates this run; its ticket then resolves with
    /// `cancelled` set.
    ///
    /// # Errors
    ///
    /// Returns `ProcessError::Spawn` if the process cannot be started.
    pub async fn run(
        &self,
        id: SearchId,
        params: &SearchParameters,
        cancel: CancellationToken,
    ) -> Result<SearchTicket, ProcessError> {
        let _spawning = self.spawn_lock.lock().await;

        let previous: Vec<(SearchId, RunEntry)> = self.lock_runs().drain().collect();
        for (old_id, entry) in previous {
            tracing::debug!(search_id = %old_id, "Terminating previous search");
            entry.cancel.cancel();
            if let Err(e) = entry.task.await {
                tracing::warn!(search_id = %old_id, error = %e, "Previous search task failed");
            }
        }

        let command = self.command(params);
        let mut process = SearchProcess::spawn(&command)?;
        tracing::info!(
            search_id = %id,
            pid = ?process.id(),
            command = %command.command_line(),
            "Search started"
        );

        let (tx, rx) = oneshot::channel();
        let runs = Arc::clone(&self.runs);
        let config = self.config.clone();
        let run_cancel = cancel.clone();

        // Registered before the task can deregister itself.
        let mut registry = self.lock_runs();
        let task = tokio::spawn(async move {
            let result = collect(&mut process, &run_cancel, &config).await;
            runs.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
            let _ = tx.send(result);
        });
        registry.insert(id, RunEntry { cancel, task });
        drop(registry);

        Ok(SearchTicket { id, rx })
    }

    /// Terminate the run `id` and wait for it. Unknown or finished runs are
    /// ignored.
    pub async fn kill(&self, id: SearchId) {
        let entry = self.lock_runs().remove(&id);
        if let Some(entry) = entry {
            entry.cancel.cancel();
            if let Err(e) = entry.task.await {
                tracing::warn!(search_id = %id, error = %e, "Search task failed");
            }
        }
    }

    /// Whether run `id` is still alive.
    #[must_use]
    pub fn is_running(&self, id: SearchId) -> bool {
        self.lock_runs().contains_key(&id)
    }

    /// Number of runs that have not finished.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.lock_runs().len()
    }

    fn lock_runs(&self) -> std::sync::MutexGuard<'_, HashMap<SearchId, RunEntry>> {
        self.runs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Read both pipes to the end while waiting for exit or cancellation.
async fn collect(
    process: &mut SearchProcess,
    cancel: &CancellationToken,
    config: &DriverConfig,
) -> Result<RawOutput, ProcessError> {
    let stdout = tokio::spawn(read_all(process.take_stdout()));
    let stderr = tokio::spawn(read_all(process.take_stderr()));

    let exited = tokio::select! {
        biased;

        () = cancel.cancelled() => None,
        status = process.wait() => Some(status?),
    };

    let (status, cancelled) = match exited {
        Some(status) => (Some(status), false),
        None => {
            let status = process
                .graceful_terminate(config.terminate_timeout, config.poll_interval)
                .await?;
            (status, true)
        }
    };

    let mut output = RawOutput {
        status,
        cancelled,
        ..RawOutput::default()
    };

    if cancelled {
        // Cancelled output is discarded; don't wait long for the pipes.
        for handle in [stdout, stderr] {
            handle.abort();
        }
        tracing::info!(?status, "Search cancelled");
        return Ok(output);
    }

    output.stdout = stdout.await.map_err(|_| ProcessError::Aborted)??;
    output.stderr = stderr.await.map_err(|_| ProcessError::Aborted)??;

    if output.is_failure() {
        tracing::warn!(
            ?status,
            stderr = %output.stderr_text(),
            "Search tool exited with an error"
        );
    } else {
        tracing::debug!(?status, bytes = output.stdout.len(), "Search finished");
    }

    Ok(output)
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}
