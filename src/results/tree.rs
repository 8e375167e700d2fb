//! Hierarchical result model: files, each with its matching lines.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;

/// Header shown while results are being processed.
pub const PROCESSING_HEADER: &str = "⚙️ Processing search results...";

/// Result tree shared between the pipeline (writer) and readers.
pub type SharedTree = Arc<RwLock<ResultTree>>;

/// Index of a file node in discovery order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FileId(pub usize);

/// One matching line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchNode {
    pub line_number: u64,
    pub text: String,
}

impl MatchNode {
    #[must_use]
    pub fn display_text(&self) -> String {
        format!("Line {}: {}", self.line_number, self.text)
    }
}

/// A file with matches.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileNode {
    pub id: FileId,
    pub path: String,
    pub display_text: String,
    pub matches: Vec<MatchNode>,
    pub expanded: bool,
}

impl FileNode {
    fn new(id: FileId, path: String) -> Self {
        Self {
            id,
            display_text: format!("📁 {path}"),
            path,
            matches: Vec::new(),
            expanded: false,
        }
    }
}

/// Synthetic entry appended once a search with matches completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryEntry {
    pub total_matches: u64,
    pub total_files: usize,
}

impl SummaryEntry {
    #[must_use]
    pub fn display_text(&self) -> String {
        format!(
            "✅ Found {} matches in {} files",
            self.total_matches, self.total_files
        )
    }
}

/// Counts recomputed once per completed search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TreeStats {
    pub files: usize,
    pub matches: usize,
}

/// A selected match, ready for navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub path: String,
    pub line_number: u64,
}

/// Files in discovery order, with a path index.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultTree {
    header: String,
    files: Vec<FileNode>,
    #[serde(skip)]
    index: HashMap<String, FileId>,
    summary: Option<SummaryEntry>,
    stats: TreeStats,
}

impl ResultTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// New empty tree behind a lock.
    #[must_use]
    pub fn shared() -> SharedTree {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Drop all nodes and set a new header.
    pub fn clear(&mut self, header: impl Into<String>) {
        self.header = header.into();
        self.files.clear();
        self.index.clear();
        self.summary = None;
        self.stats = TreeStats::default();
    }

    #[must_use]
    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn set_header(&mut self, header: impl Into<String>) {
        self.header = header.into();
    }

    #[must_use]
    pub fn files(&self) -> &[FileNode] {
        &self.files
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Look up a file node by path.
    #[must_use]
    pub fn file(&self, path: &str) -> Option<&FileNode> {
        self.index.get(path).and_then(|id| self.files.get(id.0))
    }

    pub(crate) fn file_mut(&mut self, id: FileId) -> Option<&mut FileNode> {
        self.files.get_mut(id.0)
    }

    #[must_use]
    pub fn file_id(&self, path: &str) -> Option<FileId> {
        self.index.get(path).copied()
    }

    /// Fetch the node for `path`, creating it if needed. The flag is true
    /// when the node was created.
    pub(crate) fn get_or_insert_file(&mut self, path: &str) -> (FileId, bool) {
        if let Some(id) = self.index.get(path) {
            return (*id, false);
        }
        let id = FileId(self.files.len());
        self.files.push(FileNode::new(id, path.to_string()));
        self.index.insert(path.to_string(), id);
        (id, true)
    }

    #[must_use]
    pub fn summary(&self) -> Option<&SummaryEntry> {
        self.summary.as_ref()
    }

    pub(crate) fn set_summary(&mut self, summary: SummaryEntry) {
        self.summary = Some(summary);
    }

    /// Last computed statistics.
    #[must_use]
    pub fn stats(&self) -> TreeStats {
        self.stats
    }

    /// Recount files and matches. O(files).
    pub fn recompute_stats(&mut self) -> TreeStats {
        self.stats = TreeStats {
            files: self.files.len(),
            matches: self.files.iter().map(|f| f.matches.len()).sum(),
        };
        self.stats
    }

    pub fn expand_all(&mut self) {
        self.set_all_expanded(true);
    }

    pub fn collapse_all(&mut self) {
        self.set_all_expanded(false);
    }

    fn set_all_expanded(&mut self, expanded: bool) {
        for file in &mut self.files {
            file.expanded = expanded;
        }
    }

    /// Flip one file node. Returns the new state, or `None` for an unknown
    /// index.
    pub fn toggle_expanded(&mut self, file_index: usize) -> Option<bool> {
        let file = self.files.get_mut(file_index)?;
        file.expanded = !file.expanded;
        Some(file.expanded)
    }

    /// The match at the given position, as a navigation target.
    #[must_use]
    pub fn match_at(&self, file_index: usize, match_index: usize) -> Option<Selection> {
        let file = self.files.get(file_index)?;
        let node = file.matches.get(match_index)?;
        Some(Selection {
            path: file.path.clone(),
            line_number: node.line_number,
        })
    }
}
