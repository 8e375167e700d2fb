//! Search parameters shared by every stage of a search.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How the search tool treats letter case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseMode {
    /// Leave the decision to the tool.
    #[default]
    Default,
    /// `-s`: always case sensitive.
    Sensitive,
    /// `-i`: always ignore case.
    Insensitive,
    /// `-S`: ignore case unless the pattern has an uppercase letter.
    Smart,
}

impl CaseMode {
    /// The tool flag for this mode, if any.
    #[must_use]
    pub fn flag(self) -> Option<&'static str> {
        match self {
            Self::Default => None,
            Self::Sensitive => Some("-s"),
            Self::Insensitive => Some("-i"),
            Self::Smart => Some("-S"),
        }
    }
}

/// A single include or exclude glob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobRule {
    Include(String),
    Exclude(String),
}

impl GlobRule {
    /// The value passed after `-g`.
    #[must_use]
    pub fn to_arg(&self) -> String {
        match self {
            Self::Include(glob) => glob.clone(),
            Self::Exclude(glob) => format!("!{glob}"),
        }
    }
}

/// Split a comma separated glob list into rules.
///
/// Entries are trimmed; empty entries are dropped. A leading `!` marks an
/// exclusion.
#[must_use]
pub fn parse_globs(globs: &str) -> Vec<GlobRule> {
    globs
        .split(',')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .filter_map(|g| match g.strip_prefix('!') {
            Some(rest) => {
                let rest = rest.trim();
                (!rest.is_empty()).then(|| GlobRule::Exclude(rest.to_string()))
            }
            None => Some(GlobRule::Include(g.to_string())),
        })
        .collect()
}

/// Everything needed to run one search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParameters {
    /// Main pattern.
    pub pattern: String,
    /// Extra pattern, OR-combined with the main one.
    pub add_pattern: String,
    /// Directory to search.
    pub path: PathBuf,
    /// Treat patterns as literal text.
    pub fixed_string: bool,
    pub case_mode: CaseMode,
    /// Comma separated include/exclude globs.
    pub globs: String,
    /// Keep opened files in memory after navigation.
    pub keep_files_in_cache: bool,
    /// Color used by viewers to highlight matches, as `#rrggbb`.
    pub highlight_color: String,
}

impl Default for SearchParameters {
    fn default() -> Self {
        Self {
            pattern: String::new(),
            add_pattern: String::new(),
            path: PathBuf::new(),
            fixed_string: false,
            case_mode: CaseMode::Default,
            globs: String::new(),
            keep_files_in_cache: false,
            highlight_color: "#828282".to_string(),
        }
    }
}

impl SearchParameters {
    #[must_use]
    pub fn new(pattern: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            pattern: pattern.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn add_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.add_pattern = pattern.into();
        self
    }

    #[must_use]
    pub fn fixed_string(mut self, fixed: bool) -> Self {
        self.fixed_string = fixed;
        self
    }

    #[must_use]
    pub fn case_mode(mut self, mode: CaseMode) -> Self {
        self.case_mode = mode;
        self
    }

    #[must_use]
    pub fn globs(mut self, globs: impl Into<String>) -> Self {
        self.globs = globs.into();
        self
    }

    /// The pattern handed to the tool: main and additional pattern joined
    /// into a single alternation.
    #[must_use]
    pub fn combined_pattern(&self) -> String {
        if self.add_pattern.is_empty() {
            self.pattern.clone()
        } else {
            format!("{}|{}", self.pattern, self.add_pattern)
        }
    }

    /// Parsed glob rules.
    #[must_use]
    pub fn glob_rules(&self) -> Vec<GlobRule> {
        parse_globs(&self.globs)
    }

    /// Take the persistent options from `self` and the per-search pattern and
    /// path from `submitted`.
    #[must_use]
    pub fn with_target(&self, submitted: &SearchParameters) -> Self {
        Self {
            pattern: submitted.pattern.trim().to_string(),
            path: submitted.path.clone(),
            ..self.clone()
        }
    }
}
