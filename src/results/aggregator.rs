//! Applies parser events to the result tree.
//!
//! The aggregator is the tree's only writer. Events are applied in order,
//! in batches, each batch under a single write-lock acquisition. Observers
//! are notified after the lock is released.

use std::sync::{Arc, PoisonError, RwLockWriteGuard};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::tree::{FileId, MatchNode, ResultTree, SharedTree, SummaryEntry, PROCESSING_HEADER};
use crate::parser::ResultEvent;

/// Maximum number of events applied per write-lock acquisition.
pub const DEFAULT_BATCH_SIZE: usize = 256;

/// Receives upward notifications from the aggregator.
///
/// All methods default to no-ops. Callbacks run outside the tree lock, so
/// implementations may read the tree.
pub trait ResultObserver: Send + Sync {
    fn parsing_started(&self) {}

    fn parsing_progress(&self, _percent: u8, _file_count: usize) {}

    fn parsing_completed(&self, _total_matches: u64, _total_files: usize) {}

    fn parsing_error(&self, _message: &str) {}

    /// Whether `file_item_created`/`match_item_created` should be called.
    /// They are per-item and off by default.
    fn wants_item_events(&self) -> bool {
        false
    }

    fn file_item_created(&self, _path: &str, _display_text: &str) {}

    fn match_item_created(&self, _path: &str, _line_number: u64, _text: &str) {}

    fn suspend_redraw(&self) {}

    fn resume_redraw(&self) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ResultObserver for NoopObserver {}

/// How a stream of events ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateOutcome {
    Completed { total_matches: u64, total_files: usize },
    Failed(String),
}

/// Result of draining an event channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// A terminal event was applied.
    Finished(AggregateOutcome),
    /// The cancellation token was raised.
    Cancelled,
    /// The channel closed without a terminal event.
    Closed,
}

enum Notice {
    File { path: String, display_text: String },
    Match { path: String, line_number: u64, text: String },
}

/// Builds the result tree from parser events.
#[derive(Clone)]
pub struct ResultAggregator {
    tree: SharedTree,
    observer: Arc<dyn ResultObserver>,
}

impl std::fmt::Debug for ResultAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultAggregator").finish_non_exhaustive()
    }
}

impl ResultAggregator {
    #[must_use]
    pub fn new(tree: SharedTree, observer: Arc<dyn ResultObserver>) -> Self {
        Self { tree, observer }
    }

    #[must_use]
    pub fn tree(&self) -> &SharedTree {
        &self.tree
    }

    fn write(&self) -> RwLockWriteGuard<'_, ResultTree> {
        self.tree.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clear the tree for a new run.
    pub fn begin(&self) {
        self.write().clear(PROCESSING_HEADER);
        self.observer.parsing_started();
    }

    pub fn on_file_begun(&self, path: &str, elapsed: f64) -> FileId {
        let (id, notice) = file_begun(&mut self.write(), path, elapsed, self.wants_items());
        self.dispatch(notice);
        id
    }

    pub fn on_match_found(&self, path: &str, line_number: u64, text: &str) {
        let notice = match_found(
            &mut self.write(),
            path,
            line_number,
            text.to_string(),
            self.wants_items(),
        );
        self.dispatch(notice);
    }

    pub fn on_file_ended(&self, path: &str, elapsed_total: &str, matched_lines: u64) {
        file_ended(&mut self.write(), path, elapsed_total, matched_lines);
    }

    /// Use the summary text as header; empty text falls back to the
    /// processing header.
    pub fn on_summary_parsed(&self, text: &str) {
        let header = if text.is_empty() {
            PROCESSING_HEADER
        } else {
            text
        };
        self.write().set_header(header);
    }

    pub fn on_progress(&self, percent: u8, file_count: usize) {
        self.observer.parsing_progress(percent, file_count);
    }

    pub fn on_completed(&self, total_matches: u64, total_files: usize) {
        self.observer.suspend_redraw();
        let stats = {
            let mut tree = self.write();
            if total_matches > 0 {
                tree.set_summary(SummaryEntry {
                    total_matches,
                    total_files,
                });
            }
            tree.expand_all();
            tree.recompute_stats()
        };
        self.observer.resume_redraw();

        tracing::info!(
            total_matches,
            total_files,
            tree_files = stats.files,
            tree_matches = stats.matches,
            "Results complete"
        );
        self.observer.parsing_completed(total_matches, total_files);
    }

    /// Show the error in the header. Partial results stay.
    pub fn on_failed(&self, reason: &str) {
        self.write().set_header(format!("❌ Parsing error: {reason}"));
        self.observer.parsing_error(reason);
    }

    /// Apply one event.
    pub fn apply(&self, event: ResultEvent) -> Option<AggregateOutcome> {
        self.apply_batch(std::iter::once(event))
    }

    /// Apply events in order. Consecutive structural events share one
    /// write lock. Stops at the first terminal event and returns its
    /// outcome.
    pub fn apply_batch(
        &self,
        events: impl IntoIterator<Item = ResultEvent>,
    ) -> Option<AggregateOutcome> {
        let mut pending = Vec::new();
        for event in events {
            if event.is_structural() {
                pending.push(event);
                continue;
            }
            self.flush(&mut pending);
            if let Some(outcome) = self.apply_control(event) {
                return Some(outcome);
            }
        }
        self.flush(&mut pending);
        None
    }

    /// Receive and apply events until a terminal event, cancellation or
    /// channel close.
    pub async fn drain(
        &self,
        events: &mut mpsc::Receiver<ResultEvent>,
        cancel: &CancellationToken,
        batch_size: usize,
    ) -> DrainOutcome {
        let batch_size = batch_size.max(1);
        let mut batch = Vec::with_capacity(batch_size);
        loop {
            let received = tokio::select! {
                biased;

                () = cancel.cancelled() => return DrainOutcome::Cancelled,
                n = events.recv_many(&mut batch, batch_size) => n,
            };
            if received == 0 {
                return if cancel.is_cancelled() {
                    DrainOutcome::Cancelled
                } else {
                    DrainOutcome::Closed
                };
            }
            if let Some(outcome) = self.apply_batch(batch.drain(..)) {
                return DrainOutcome::Finished(outcome);
            }
        }
    }

    fn apply_control(&self, event: ResultEvent) -> Option<AggregateOutcome> {
        match event {
            ResultEvent::SummaryParsed { text, .. } => self.on_summary_parsed(&text),
            ResultEvent::Progress {
                percent,
                file_count,
            } => self.on_progress(percent, file_count),
            ResultEvent::Completed {
                total_matches,
                total_files,
            } => {
                self.on_completed(total_matches, total_files);
                return Some(AggregateOutcome::Completed {
                    total_matches,
                    total_files,
                });
            }
            ResultEvent::Failed { reason } => {
                self.on_failed(&reason);
                return Some(AggregateOutcome::Failed(reason));
            }
            ResultEvent::FileBegun { .. }
            | ResultEvent::MatchFound { .. }
            | ResultEvent::FileEnded { .. } => {}
        }
        None
    }

    fn flush(&self, pending: &mut Vec<ResultEvent>) {
        if pending.is_empty() {
            return;
        }
        let wants = self.wants_items();
        let mut notices = Vec::new();
        {
            let mut tree = self.write();
            for event in pending.drain(..) {
                match event {
                    ResultEvent::FileBegun { path, elapsed } => {
                        notices.extend(file_begun(&mut tree, &path, elapsed, wants).1);
                    }
                    ResultEvent::MatchFound { path, line, text } => {
                        notices.extend(match_found(&mut tree, &path, line, text, wants));
                    }
                    ResultEvent::FileEnded {
                        path,
                        elapsed_total,
                        matched_lines,
                    } => file_ended(&mut tree, &path, &elapsed_total, matched_lines),
                    _ => {}
                }
            }
        }
        for notice in notices {
            self.dispatch(Some(notice));
        }
    }

    fn wants_items(&self) -> bool {
        self.observer.wants_item_events()
    }

    fn dispatch(&self, notice: Option<Notice>) {
        match notice {
            Some(Notice::File { path, display_text }) => {
                self.observer.file_item_created(&path, &display_text);
            }
            Some(Notice::Match {
                path,
                line_number,
                text,
            }) => self.observer.match_item_created(&path, line_number, &text),
            None => {}
        }
    }
}

fn file_begun(
    tree: &mut ResultTree,
    path: &str,
    elapsed: f64,
    notify: bool,
) -> (FileId, Option<Notice>) {
    let (id, created) = tree.get_or_insert_file(path);
    if created {
        tracing::trace!(path, elapsed, "File node created");
    }
    let notice = (created && notify)
        .then(|| tree.file_mut(id))
        .flatten()
        .map(|file| Notice::File {
            path: file.path.clone(),
            display_text: file.display_text.clone(),
        });
    (id, notice)
}

fn match_found(
    tree: &mut ResultTree,
    path: &str,
    line_number: u64,
    text: String,
    notify: bool,
) -> Option<Notice> {
    // A match without a preceding begin still gets a file node.
    let (id, _) = tree.get_or_insert_file(path);
    let file = tree.file_mut(id)?;
    let notice = notify.then(|| Notice::Match {
        path: path.to_string(),
        line_number,
        text: text.clone(),
    });
    file.matches.push(MatchNode { line_number, text });
    notice
}

fn file_ended(tree: &mut ResultTree, path: &str, elapsed_total: &str, matched_lines: u64) {
    let Some(id) = tree.file_id(path) else {
        tracing::debug!(path, "End record for unknown file");
        return;
    };
    if let Some(file) = tree.file_mut(id) {
        file.display_text = format!("📁 {path} ({elapsed_total}, {matched_lines} lines)");
    }
}
