//! Turns captured ripgrep JSON output into [`ResultEvent`]s.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use super::events::{EventSink, ResultEvent};
use crate::rg::{RgMessage, SummaryData};

/// How a parse run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    /// Every line was processed and `Completed` was emitted.
    Completed { total_matches: u64, total_files: usize },
    /// The stop token was raised.
    Cancelled,
    /// The event receiver went away.
    Disconnected,
}

/// Totals taken from the terminal summary record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryInfo {
    pub matched_lines: u64,
    pub files_with_match: u64,
    pub elapsed: String,
}

impl SummaryInfo {
    fn from_data(data: &SummaryData) -> Self {
        Self {
            matched_lines: data.stats.matched_lines,
            files_with_match: data.stats.searches_with_match,
            elapsed: data.elapsed_total.human.clone(),
        }
    }

    /// Header text shown above the results.
    #[must_use]
    pub fn text(&self) -> String {
        format!(
            "Found {} matches (files: {}, duration: {})",
            self.matched_lines, self.files_with_match, self.elapsed
        )
    }
}

/// Emits one `Progress` per newly crossed multiple of 5 percent.
#[derive(Debug)]
struct ProgressTracker {
    total: u64,
    seen: u64,
    last_step: u8,
}

impl ProgressTracker {
    fn new(total: u64) -> Self {
        Self {
            total,
            seen: 0,
            last_step: 0,
        }
    }

    /// Count one match; returns the new step if one was crossed.
    fn record(&mut self) -> Option<u8> {
        self.seen += 1;
        if self.total == 0 {
            return None;
        }
        let percent = (self.seen.saturating_mul(100) / self.total).min(100);
        let step = u8::try_from(percent / 5 * 5).unwrap_or(100);
        (step > self.last_step).then(|| {
            self.last_step = step;
            step
        })
    }
}

/// Stateless parser for one run's output.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResultParser;

impl ResultParser {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Find the summary record, scanning from the end.
    #[must_use]
    pub fn find_summary(lines: &[&str]) -> Option<SummaryInfo> {
        lines.iter().rev().find_map(|line| {
            // Cheap check before a full parse; most lines are matches.
            if !line.contains("\"summary\"") {
                return None;
            }
            match serde_json::from_str::<RgMessage>(line) {
                Ok(RgMessage::Summary { data }) => Some(SummaryInfo::from_data(&data)),
                _ => None,
            }
        })
    }

    /// Parse `raw` and send events to `sink`.
    ///
    /// `cancel` is checked once per line. Malformed lines are logged and
    /// skipped.
    pub fn parse(
        &self,
        raw: &str,
        cancel: &CancellationToken,
        sink: &mut impl EventSink,
    ) -> ParseOutcome {
        let lines: Vec<&str> = raw.lines().collect();
        let summary = Self::find_summary(&lines);

        let total = summary.as_ref().map_or(0, |s| s.matched_lines);
        if let Some(summary) = &summary {
            tracing::debug!(
                matched_lines = summary.matched_lines,
                files = summary.files_with_match,
                "Summary located"
            );
            let event = ResultEvent::SummaryParsed {
                text: summary.text(),
                total_matched_lines: summary.matched_lines,
                files_with_match: summary.files_with_match,
            };
            if !sink.emit(event) {
                return ParseOutcome::Disconnected;
            }
        } else {
            tracing::debug!(lines = lines.len(), "No summary record in output");
        }

        let mut progress = ProgressTracker::new(total);
        let mut per_file: HashMap<String, u64> = HashMap::new();
        let mut total_matches: u64 = 0;
        let mut total_files: usize = 0;

        for (index, line) in lines.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::debug!(line = index, "Parsing cancelled");
                return ParseOutcome::Cancelled;
            }
            if line.trim().is_empty() {
                continue;
            }

            let message = match serde_json::from_str::<RgMessage>(line) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(line = index, error = %e, "Skipping malformed output line");
                    continue;
                }
            };

            let mut events = Vec::with_capacity(2);
            match message {
                RgMessage::Begin { data } => {
                    let path = data.path.into_string();
                    total_files += 1;
                    per_file.insert(path.clone(), 0);
                    events.push(ResultEvent::FileBegun {
                        path,
                        elapsed: data.elapsed_total_s,
                    });
                }
                RgMessage::Match { data } => {
                    let path = data.path.into_string();
                    *per_file.entry(path.clone()).or_default() += 1;
                    total_matches += 1;
                    events.push(ResultEvent::MatchFound {
                        path,
                        line: data.line_number.unwrap_or_default(),
                        text: data.lines.as_str().trim().to_string(),
                    });
                    if let Some(percent) = progress.record() {
                        events.push(ResultEvent::Progress {
                            percent,
                            file_count: total_files,
                        });
                    }
                }
                RgMessage::End { data } => {
                    let path = data.path.into_string();
                    let counted = per_file.remove(&path).unwrap_or_default();
                    if counted != data.stats.matched_lines {
                        tracing::debug!(
                            path = %path,
                            counted,
                            reported = data.stats.matched_lines,
                            "Match count differs from file stats"
                        );
                    }
                    events.push(ResultEvent::FileEnded {
                        path,
                        elapsed_total: data.stats.elapsed.human,
                        matched_lines: data.stats.matched_lines,
                    });
                }
                RgMessage::Context { .. } | RgMessage::Summary { .. } | RgMessage::Unknown => {}
            }

            for event in events {
                if !sink.emit(event) {
                    tracing::debug!(line = index, "Event receiver closed");
                    return ParseOutcome::Disconnected;
                }
            }
        }

        if !sink.emit(ResultEvent::Completed {
            total_matches,
            total_files,
        }) {
            return ParseOutcome::Disconnected;
        }

        tracing::info!(total_matches, total_files, "Parsing complete");
        ParseOutcome::Completed {
            total_matches,
            total_files,
        }
    }
}
