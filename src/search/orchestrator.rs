//! Sequences search, parse and aggregation, and owns the phase.
//!
//! Each accepted submission becomes one pipeline task:
//!
//! 1. [`ProcessDriver::run`] spawns the tool and collects its output.
//! 2. If the run was not stopped meanwhile, the phase moves to
//!    `ParsingResults` and the output goes to the [`ParserWorker`].
//! 3. The task drains parser events into the [`ResultAggregator`].
//!
//! A new submission cancels and awaits the previous task before it starts,
//! so the result tree only ever has one writer.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::error::{PipelineError, ValidationError};
use super::history::{SearchHistory, DEFAULT_HISTORY_SIZE};
use super::params::SearchParameters;
use super::state::{global_phase, Phase, PhaseCell, PhaseGuard};
use crate::parser::{ParseJob, ParserWorker, WorkerError, DEFAULT_EVENT_BUFFER};
use crate::results::{
    AggregateOutcome, DrainOutcome, NoopObserver, ResultAggregator, ResultObserver, ResultTree,
    SharedTree, DEFAULT_BATCH_SIZE,
};
use crate::rg::{DriverConfig, ProcessDriver, SearchId};

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub driver: DriverConfig,
    /// Capacity of the parser event channel.
    pub event_buffer: usize,
    /// Events applied per tree write lock.
    pub batch_size: usize,
    pub history_size: usize,
    /// Initial persistent search options.
    pub defaults: SearchParameters,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            driver: DriverConfig::default(),
            event_buffer: DEFAULT_EVENT_BUFFER,
            batch_size: DEFAULT_BATCH_SIZE,
            history_size: DEFAULT_HISTORY_SIZE,
            defaults: SearchParameters::default(),
        }
    }
}

/// Check a submission and normalise its pattern.
///
/// # Errors
///
/// Returns `ValidationError` for an empty pattern, a missing or
/// non-directory path, or (unless fixed-string) a pattern that does not
/// compile.
pub fn validate(params: SearchParameters) -> Result<SearchParameters, ValidationError> {
    let pattern = params.pattern.trim();
    if pattern.is_empty() {
        return Err(ValidationError::EmptyPattern);
    }
    let params = SearchParameters {
        pattern: pattern.to_string(),
        ..params
    };

    match std::fs::metadata(&params.path) {
        Err(_) => return Err(ValidationError::PathNotFound(params.path)),
        Ok(meta) if !meta.is_dir() => return Err(ValidationError::NotADirectory(params.path)),
        Ok(_) => {}
    }

    if !params.fixed_string {
        let combined = params.combined_pattern();
        if let Err(e) = regex::Regex::new(&combined) {
            return Err(ValidationError::InvalidPattern {
                pattern: combined,
                reason: e.to_string(),
            });
        }
    }

    Ok(params)
}

/// Builder for [`Orchestrator`].
#[derive(Default)]
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    observer: Option<Arc<dyn ResultObserver>>,
    phase: Option<PhaseCell>,
}

impl OrchestratorBuilder {
    #[must_use]
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn ResultObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Publish phases on `phase` instead of the process-wide cell.
    #[must_use]
    pub fn phase_cell(mut self, phase: PhaseCell) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Start the parser thread and assemble the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns `WorkerError` if the parser thread cannot be started.
    pub fn build(self) -> Result<Orchestrator, WorkerError> {
        let config = self.config;
        let inner = Inner {
            phase: self.phase.unwrap_or_else(|| global_phase().clone()),
            driver: ProcessDriver::new(config.driver),
            parser: ParserWorker::spawn()?,
            tree: ResultTree::shared(),
            observer: self.observer.unwrap_or_else(|| Arc::new(NoopObserver)),
            event_buffer: config.event_buffer.max(1),
            batch_size: config.batch_size.max(1),
            current: Mutex::new(config.defaults),
            history: Mutex::new(SearchHistory::new(config.history_size)),
            cached_files: Mutex::new(Vec::new()),
            run_cancel: Mutex::new(None),
            active: tokio::sync::Mutex::new(None),
        };
        Ok(Orchestrator {
            inner: Arc::new(inner),
        })
    }
}

struct ActiveRun {
    id: SearchId,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ActiveRun {
    /// Await the pipeline task. Dropping this future leaves the run in
    /// place, so a later caller can still cancel and await it.
    async fn settle(&mut self) {
        if let Err(e) = (&mut self.task).await {
            tracing::warn!(search_id = %self.id, error = %e, "Search pipeline task failed");
        }
    }
}

/// Await the run held in `slot`, then clear it.
async fn settle_slot(slot: &mut Option<ActiveRun>) {
    if let Some(run) = slot.as_mut() {
        run.settle().await;
    }
    *slot = None;
}

struct Inner {
    phase: PhaseCell,
    driver: ProcessDriver,
    parser: ParserWorker,
    tree: SharedTree,
    observer: Arc<dyn ResultObserver>,
    event_buffer: usize,
    batch_size: usize,
    current: Mutex<SearchParameters>,
    history: Mutex<SearchHistory>,
    cached_files: Mutex<Vec<PathBuf>>,
    run_cancel: Mutex<Option<CancellationToken>>,
    active: tokio::sync::Mutex<Option<ActiveRun>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Entry point for running searches. Cheap to clone.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    #[must_use]
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    /// Orchestrator with default settings and no observer.
    ///
    /// # Errors
    ///
    /// Returns `WorkerError` if the parser thread cannot be started.
    pub fn new(config: OrchestratorConfig) -> Result<Self, WorkerError> {
        Self::builder().config(config).build()
    }

    /// Start a search.
    ///
    /// Invalid input is rejected without touching the phase. Otherwise a
    /// stale `Error` is cleared, the previous run is cancelled and awaited,
    /// and the new run starts in `Searching`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the parameters are rejected.
    pub async fn submit(&self, params: SearchParameters) -> Result<SearchId, ValidationError> {
        let params = validate(params).inspect_err(|e| {
            tracing::info!(error = %e, "Search rejected");
        })?;
        let inner = &self.inner;

        let mut active = inner.active.lock().await;

        if inner.phase.transition_from(Phase::Error, Phase::Idle) {
            tracing::debug!("Cleared previous error");
        }

        if let Some(previous) = active.as_ref() {
            tracing::debug!(search_id = %previous.id, "Superseding running search");
            previous.cancel.cancel();
        }
        settle_slot(&mut active).await;

        let id = SearchId::new();
        let cancel = CancellationToken::new();
        *lock(&inner.run_cancel) = Some(cancel.clone());

        inner.phase.transition(Phase::Searching);
        if cancel.is_cancelled() {
            // A cancel landed between publishing the token and the phase.
            inner.phase.transition(Phase::Stopped);
        }
        lock(&inner.cached_files).clear();
        lock(&inner.history).record(&params.pattern, &params.path);
        *lock(&inner.current) = params.clone();

        tracing::info!(
            search_id = %id,
            pattern = %params.combined_pattern(),
            path = %params.path.display(),
            "Search submitted"
        );

        let task = tokio::spawn(run_pipeline(Arc::clone(inner), id, params, cancel.clone()));
        *active = Some(ActiveRun { id, cancel, task });

        Ok(id)
    }

    /// Search for `pattern` in `path` with the current persistent options.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the parameters are rejected.
    pub async fn submit_pattern(
        &self,
        pattern: &str,
        path: impl Into<PathBuf>,
    ) -> Result<SearchId, ValidationError> {
        let params = self
            .current_parameters()
            .with_target(&SearchParameters::new(pattern, path));
        self.submit(params).await
    }

    /// Stop the running search.
    ///
    /// The phase becomes `Stopped` at once; the process and parser wind
    /// down afterwards.
    pub fn cancel(&self) {
        let previous = self.inner.phase.transition(Phase::Stopped);
        tracing::info!(from = ?previous, "Search stopped");
        if let Some(token) = lock(&self.inner.run_cancel).as_ref() {
            token.cancel();
        }
    }

    /// Wait for the current run, if any, to finish. Returns the phase it
    /// left behind.
    ///
    /// Cancel safe: if this future is dropped early the run stays
    /// registered, and the next submission still stops and awaits it.
    pub async fn wait_idle(&self) -> Phase {
        let mut active = self.inner.active.lock().await;
        settle_slot(&mut active).await;
        self.phase()
    }

    /// Enter `NavigatingFiles` for opening `path` at `line`.
    ///
    /// Refused unless the phase is `Idle`. The phase returns to `Idle`
    /// when the guard is dropped.
    #[must_use]
    pub fn navigate(&self, path: &Path, line: u64) -> Option<PhaseGuard> {
        let guard = self.enter(Phase::NavigatingFiles)?;
        tracing::info!(path = %path.display(), line, "Navigating to match");
        if lock(&self.inner.current).keep_files_in_cache {
            let mut cached = lock(&self.inner.cached_files);
            if !cached.iter().any(|p| p == path) {
                cached.push(path.to_path_buf());
            }
        }
        Some(guard)
    }

    /// Enter `MappingInBackground`. Refused unless the phase is `Idle`.
    #[must_use]
    pub fn background_mapping(&self) -> Option<PhaseGuard> {
        self.enter(Phase::MappingInBackground)
    }

    fn enter(&self, phase: Phase) -> Option<PhaseGuard> {
        if self.inner.phase.transition_from(Phase::Idle, phase) {
            Some(PhaseGuard::new(self.inner.phase.clone(), phase))
        } else {
            tracing::debug!(current = ?self.phase(), requested = ?phase, "Phase change refused");
            None
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.inner.phase.get()
    }

    #[must_use]
    pub fn phase_cell(&self) -> &PhaseCell {
        &self.inner.phase
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.inner.phase.subscribe()
    }

    #[must_use]
    pub fn tree(&self) -> SharedTree {
        Arc::clone(&self.inner.tree)
    }

    #[must_use]
    pub fn history(&self) -> SearchHistory {
        lock(&self.inner.history).clone()
    }

    #[must_use]
    pub fn current_parameters(&self) -> SearchParameters {
        lock(&self.inner.current).clone()
    }

    /// Replace the persistent options used by [`Orchestrator::submit_pattern`].
    pub fn set_current_parameters(&self, params: SearchParameters) {
        *lock(&self.inner.current) = params;
    }

    /// Files kept open since the last submission.
    #[must_use]
    pub fn cached_files(&self) -> Vec<PathBuf> {
        lock(&self.inner.cached_files).clone()
    }

    /// Shell-quoted command line the search tool would be run with.
    #[must_use]
    pub fn command_line(&self, params: &SearchParameters) -> String {
        self.inner.driver.command(params).command_line()
    }

    /// Number of search processes still running.
    #[must_use]
    pub fn live_processes(&self) -> usize {
        self.inner.driver.live_count()
    }
}

async fn run_pipeline(
    inner: Arc<Inner>,
    id: SearchId,
    params: SearchParameters,
    cancel: CancellationToken,
) {
    match inner.execute(id, &params, &cancel).await {
        Ok(true) => {
            if inner
                .phase
                .transition_from(Phase::ParsingResults, Phase::Idle)
            {
                tracing::info!(search_id = %id, "Search complete");
            }
        }
        Ok(false) => tracing::debug!(search_id = %id, "Search abandoned"),
        Err(e) => inner.fail(id, &e, &cancel),
    }
}

impl Inner {
    /// Returns `Ok(false)` when the run was stopped or superseded.
    async fn execute(
        &self,
        id: SearchId,
        params: &SearchParameters,
        cancel: &CancellationToken,
    ) -> Result<bool, PipelineError> {
        let ticket = self.driver.run(id, params, cancel.child_token()).await?;
        let output = ticket.completion().await?;

        if output.cancelled || cancel.is_cancelled() {
            return Ok(false);
        }
        if !self
            .phase
            .transition_from(Phase::Searching, Phase::ParsingResults)
        {
            tracing::debug!(search_id = %id, phase = ?self.phase.get(), "Output discarded");
            return Ok(false);
        }

        let stderr = output.stderr_text();
        if !stderr.is_empty() {
            tracing::warn!(search_id = %id, stderr = %stderr, "Search tool reported errors");
        }

        let aggregator = ResultAggregator::new(Arc::clone(&self.tree), Arc::clone(&self.observer));
        aggregator.begin();

        let (tx, mut rx) = mpsc::channel(self.event_buffer);
        self.parser.submit(ParseJob {
            id,
            output,
            cancel: cancel.child_token(),
            events: tx,
        })?;

        match aggregator.drain(&mut rx, cancel, self.batch_size).await {
            DrainOutcome::Finished(AggregateOutcome::Completed { .. }) => Ok(true),
            DrainOutcome::Finished(AggregateOutcome::Failed(reason)) => {
                Err(PipelineError::Parse(reason))
            }
            DrainOutcome::Cancelled => Ok(false),
            DrainOutcome::Closed => Err(PipelineError::ParserStopped),
        }
    }

    fn fail(&self, id: SearchId, error: &PipelineError, cancel: &CancellationToken) {
        if cancel.is_cancelled() {
            tracing::debug!(search_id = %id, error = %error, "Error after stop ignored");
            return;
        }

        tracing::error!(search_id = %id, error = %error, "Search pipeline failed");
        if !error.is_reported() {
            let message = error.to_string();
            self.tree
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .set_header(format!("❌ {message}"));
            self.observer.parsing_error(&message);
        }

        if !self
            .phase
            .transition_from(Phase::ParsingResults, Phase::Error)
        {
            self.phase.transition_from(Phase::Searching, Phase::Error);
        }
    }
}
