//! Record types from ripgrep's `--json` output.
//!
//! ripgrep writes one JSON object per line. Each object carries a `type`
//! discriminator and a `data` payload whose shape depends on the type.

use serde::{Deserialize, Serialize};

/// Text that ripgrep may emit either as UTF-8 or as base64 bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArbitraryData {
    /// Valid UTF-8 text.
    Text {
        /// The text.
        text: String,
    },
    /// Non UTF-8 data, base64 encoded.
    Bytes {
        /// Base64 payload.
        bytes: String,
    },
}

impl Default for ArbitraryData {
    fn default() -> Self {
        Self::Text {
            text: String::new(),
        }
    }
}

impl ArbitraryData {
    /// Displayable form; base64 payloads are returned as-is.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text { text } => text,
            Self::Bytes { bytes } => bytes,
        }
    }

    /// Consume into the displayable string.
    #[must_use]
    pub fn into_string(self) -> String {
        match self {
            Self::Text { text } => text,
            Self::Bytes { bytes } => bytes,
        }
    }
}

/// Elapsed time as reported by ripgrep.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Elapsed {
    pub secs: u64,
    pub nanos: u32,
    /// Human readable form, e.g. `"0.000123s"`.
    pub human: String,
}

/// Start of matches for one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeginData {
    pub path: ArbitraryData,
    /// Seconds since the search started, when the tool reports it.
    pub elapsed_total_s: f64,
}

/// A matching (or context) line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineData {
    pub path: ArbitraryData,
    pub lines: ArbitraryData,
    pub line_number: Option<u64>,
    pub absolute_offset: u64,
}

/// Per-file statistics carried by `end` records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileStats {
    pub elapsed: Elapsed,
    pub searches: u64,
    pub searches_with_match: u64,
    pub bytes_searched: u64,
    pub bytes_printed: u64,
    pub matched_lines: u64,
    pub matches: u64,
}

/// End of matches for one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndData {
    pub path: ArbitraryData,
    pub binary_offset: Option<u64>,
    pub stats: FileStats,
}

/// Aggregate statistics for the whole invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryData {
    pub elapsed_total: Elapsed,
    pub stats: FileStats,
}

/// One line of ripgrep `--json` output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RgMessage {
    /// A file with matches starts.
    Begin {
        /// Payload.
        data: BeginData,
    },
    /// A matching line.
    Match {
        /// Payload.
        data: LineData,
    },
    /// A context line (only with `-A`/`-B`/`-C`).
    Context {
        /// Payload.
        data: LineData,
    },
    /// A file with matches ends.
    End {
        /// Payload.
        data: EndData,
    },
    /// Terminal statistics for the invocation.
    Summary {
        /// Payload.
        data: SummaryData,
    },
    /// Catch-all for record types this crate does not use.
    #[serde(other)]
    Unknown,
}

impl RgMessage {
    /// Returns true for the terminal summary record.
    #[must_use]
    pub fn is_summary(&self) -> bool {
        matches!(self, Self::Summary { .. })
    }

    /// The file path, for record types that carry one.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Begin { data } => Some(data.path.as_str()),
            Self::Match { data } | Self::Context { data } => Some(data.path.as_str()),
            Self::End { data } => Some(data.path.as_str()),
            Self::Summary { .. } | Self::Unknown => None,
        }
    }
}
