//! Events produced while parsing search output.

use serde::Serialize;
use tokio::sync::mpsc;

/// One step of parsing progress, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ResultEvent {
    /// Matches for a new file follow.
    FileBegun {
        path: String,
        /// Seconds into the search, as reported by the tool.
        elapsed: f64,
    },
    /// One matching line.
    MatchFound {
        path: String,
        line: u64,
        /// The line, trimmed.
        text: String,
    },
    /// The file's matches are complete.
    FileEnded {
        path: String,
        /// Human readable search time for the file.
        elapsed_total: String,
        matched_lines: u64,
    },
    /// Totals from the tool's summary record.
    SummaryParsed {
        text: String,
        total_matched_lines: u64,
        files_with_match: u64,
    },
    /// Parsing progress over matching lines.
    Progress {
        /// Multiple of 5, never decreasing.
        percent: u8,
        /// Files begun so far.
        file_count: usize,
    },
    /// Parsing finished.
    Completed {
        total_matches: u64,
        total_files: usize,
    },
    /// Parsing could not finish.
    Failed { reason: String },
}

impl ResultEvent {
    /// Events after which no more events follow for the run.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }

    /// Events that add to or change the file/match structure of the tree.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::FileBegun { .. } | Self::MatchFound { .. } | Self::FileEnded { .. }
        )
    }
}

/// Destination for parser events.
pub trait EventSink {
    /// Deliver one event. Returns false once the receiver is gone.
    fn emit(&mut self, event: ResultEvent) -> bool;
}

impl EventSink for Vec<ResultEvent> {
    fn emit(&mut self, event: ResultEvent) -> bool {
        self.push(event);
        true
    }
}

/// Blocks the calling thread while the channel is full. Must not be used
/// from within an async context.
impl EventSink for mpsc::Sender<ResultEvent> {
    fn emit(&mut self, event: ResultEvent) -> bool {
        self.blocking_send(event).is_ok()
    }
}
