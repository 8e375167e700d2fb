//! Bounded pattern and path history.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default number of entries kept per list.
pub const DEFAULT_HISTORY_SIZE: usize = 20;

/// Most-recent-first, de-duplicated history of submitted searches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHistory {
    max_entries: usize,
    patterns: VecDeque<String>,
    paths: VecDeque<PathBuf>,
}

impl Default for SearchHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}

impl SearchHistory {
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            patterns: VecDeque::new(),
            paths: VecDeque::new(),
        }
    }

    /// Record a submitted pattern and path.
    pub fn record(&mut self, pattern: &str, path: &Path) {
        push_front_bounded(&mut self.patterns, pattern.to_string(), self.max_entries);
        push_front_bounded(&mut self.paths, path.to_path_buf(), self.max_entries);
        tracing::debug!(
            patterns = self.patterns.len(),
            paths = self.paths.len(),
            "Search history updated"
        );
    }

    /// Patterns, most recent first.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(String::as_str)
    }

    /// Paths, most recent first.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }

    #[must_use]
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty() && self.paths.is_empty()
    }
}

/// Known entries move back to the front instead of being duplicated.
fn push_front_bounded<T: PartialEq>(list: &mut VecDeque<T>, value: T, max: usize) {
    if let Some(pos) = list.iter().position(|v| *v == value) {
        list.remove(pos);
    }
    list.push_front(value);
    list.truncate(max);
}
