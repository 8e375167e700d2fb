//! Long-lived parser thread.
//!
//! Parsing a large run can take a while, so it happens on a dedicated OS
//! thread that is reused across searches. Jobs arrive over a std channel;
//! events leave over a bounded tokio channel.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc as std_mpsc;
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::events::{EventSink, ResultEvent};
use super::parse::{ParseOutcome, ResultParser};
use crate::rg::{RawOutput, SearchId};

/// Name of the parser thread.
pub const WORKER_THREAD_NAME: &str = "rgscope-parser";

/// Default capacity of the event channel.
pub const DEFAULT_EVENT_BUFFER: usize = 1024;

/// Error type for worker operations.
#[derive(thiserror::Error, Debug)]
pub enum WorkerError {
    /// The thread could not be started.
    #[error("Failed to start parser thread: {0}")]
    Spawn(#[from] std::io::Error),
    /// The thread is gone.
    #[error("Parser thread is not running")]
    Closed,
}

/// One unit of work for the parser thread.
#[derive(Debug)]
pub struct ParseJob {
    pub id: SearchId,
    pub output: RawOutput,
    /// Checked once per line.
    pub cancel: CancellationToken,
    pub events: mpsc::Sender<ResultEvent>,
}

/// Handle to the parser thread. Dropping it closes the job queue and joins
/// the thread.
#[derive(Debug)]
pub struct ParserWorker {
    jobs: Option<std_mpsc::Sender<ParseJob>>,
    handle: Option<JoinHandle<()>>,
}

impl ParserWorker {
    /// Start the parser thread.
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::Spawn` if the OS refuses to create the thread.
    pub fn spawn() -> Result<Self, WorkerError> {
        let (tx, rx) = std_mpsc::channel::<ParseJob>();
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                tracing::debug!("Parser thread started");
                for job in rx {
                    run_job(job);
                }
                tracing::debug!("Parser thread exiting");
            })?;

        Ok(Self {
            jobs: Some(tx),
            handle: Some(handle),
        })
    }

    /// Queue a job.
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::Closed` if the thread has exited.
    pub fn submit(&self, job: ParseJob) -> Result<(), WorkerError> {
        let jobs = self.jobs.as_ref().ok_or(WorkerError::Closed)?;
        jobs.send(job).map_err(|_| WorkerError::Closed)
    }
}

impl Drop for ParserWorker {
    fn drop(&mut self) {
        drop(self.jobs.take());
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                tracing::warn!("Parser thread panicked");
            }
        }
    }
}

fn run_job(job: ParseJob) {
    let ParseJob {
        id,
        output,
        cancel,
        events,
    } = job;
    tracing::info!(search_id = %id, bytes = output.stdout.len(), "Parsing search output");

    let mut sink = events.clone();
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let text = output.text();
        ResultParser::new().parse(&text, &cancel, &mut sink)
    }));
    drop(output);

    match result {
        Ok(ParseOutcome::Completed { .. }) => {}
        Ok(outcome) => tracing::debug!(search_id = %id, ?outcome, "Parsing stopped early"),
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            tracing::error!(search_id = %id, reason = %reason, "Parser panicked");
            let mut events = events;
            events.emit(ResultEvent::Failed { reason });
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "parser panicked".to_string())
}
