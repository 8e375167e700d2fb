//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::parser::DEFAULT_EVENT_BUFFER;
use crate::results::DEFAULT_BATCH_SIZE;
use crate::rg::{DriverConfig, DEFAULT_BINARY};
use crate::search::{CaseMode, OrchestratorConfig, SearchParameters, DEFAULT_HISTORY_SIZE};

/// How the search tool is run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Binary name or path.
    #[serde(default = "default_binary")]
    pub binary: PathBuf,
    /// Time allowed between SIGTERM and a forced kill.
    #[serde(default = "default_terminate_timeout_ms")]
    pub terminate_timeout_ms: u64,
    /// Exit check interval while terminating.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Capacity of the parser event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_binary() -> PathBuf {
    PathBuf::from(DEFAULT_BINARY)
}

fn default_terminate_timeout_ms() -> u64 {
    5000
}

fn default_poll_interval_ms() -> u64 {
    10
}

fn default_event_buffer() -> usize {
    DEFAULT_EVENT_BUFFER
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            terminate_timeout_ms: default_terminate_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl ToolConfig {
    #[must_use]
    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            binary: self.binary.clone(),
            terminate_timeout: Duration::from_millis(self.terminate_timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
        }
    }
}

/// Default search options applied to every search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchDefaults {
    #[serde(default)]
    pub fixed_string: bool,
    #[serde(default)]
    pub add_pattern: String,
    #[serde(default)]
    pub case_mode: CaseMode,
    #[serde(default)]
    pub globs: String,
    #[serde(default)]
    pub keep_files_in_cache: bool,
    #[serde(default = "default_highlight_color")]
    pub highlight_color: String,
}

fn default_highlight_color() -> String {
    "#828282".to_string()
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            fixed_string: false,
            add_pattern: String::new(),
            case_mode: CaseMode::Default,
            globs: String::new(),
            keep_files_in_cache: false,
            highlight_color: default_highlight_color(),
        }
    }
}

impl SearchDefaults {
    /// Parameters with these options and no pattern or path.
    #[must_use]
    pub fn to_parameters(&self) -> SearchParameters {
        SearchParameters {
            add_pattern: self.add_pattern.clone(),
            fixed_string: self.fixed_string,
            case_mode: self.case_mode,
            globs: self.globs.clone(),
            keep_files_in_cache: self.keep_files_in_cache,
            highlight_color: self.highlight_color.clone(),
            ..SearchParameters::default()
        }
    }
}

/// Search history settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_max_entries() -> usize {
    DEFAULT_HISTORY_SIZE
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub tool: ToolConfig,
    #[serde(default)]
    pub search: SearchDefaults,
    #[serde(default)]
    pub history: HistoryConfig,
}

impl AppConfig {
    #[must_use]
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            driver: self.tool.driver_config(),
            event_buffer: self.tool.event_buffer,
            batch_size: DEFAULT_BATCH_SIZE,
            history_size: self.history.max_entries,
            defaults: self.search.to_parameters(),
        }
    }
}
