//! Error types for submitting and running searches.

use std::path::PathBuf;

use crate::parser::WorkerError;
use crate::rg::ProcessError;

/// Reasons a search is refused before anything runs.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Pattern is empty after trimming.
    #[error("Search pattern is empty")]
    EmptyPattern,
    /// Search path does not exist.
    #[error("Search path does not exist: {}", .0.display())]
    PathNotFound(PathBuf),
    /// Search path is not a directory.
    #[error("Search path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    /// Pattern does not compile as a regular expression.
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The combined pattern.
        pattern: String,
        /// Compiler message.
        reason: String,
    },
}

/// Failure of a running search after it was accepted.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// Running the search tool failed.
    #[error("Search failed: {0}")]
    Process(#[from] ProcessError),
    /// The parser thread could not take the job.
    #[error(transparent)]
    Worker(#[from] WorkerError),
    /// The parser reported a failure.
    #[error("Parsing failed: {0}")]
    Parse(String),
    /// The parser stopped without reporting completion.
    #[error("Parser stopped before completing")]
    ParserStopped,
}

impl PipelineError {
    /// Whether the aggregator already showed this error.
    #[must_use]
    pub fn is_reported(&self) -> bool {
        matches!(self, Self::Parse(_))
    }
}
