//! Colored terminal output for search progress and results.

use std::io::{self, Write};

use chrono::Utc;
use owo_colors::OwoColorize;
use regex::{Regex, RegexBuilder};

use crate::results::{ResultObserver, ResultTree};
use crate::search::{CaseMode, Phase, SearchParameters};

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Maximum length of a match line in the tree output.
pub const DEFAULT_MAX_LEN: usize = 120;

/// Truncate a string to a maximum number of characters, adding an ellipsis
/// if truncated.
#[must_use]
pub fn truncate(s: &str, max_len: usize, raw_mode: bool) -> String {
    if raw_mode || s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return "...".to_string();
    }
    let kept: String = s.chars().take(max_len - 3).collect();
    format!("{kept}...")
}

/// Print a phase change.
pub fn print_phase(phase: Phase) {
    let label = match phase {
        Phase::Error => phase.label().red().bold().to_string(),
        Phase::Stopped => phase.label().yellow().bold().to_string(),
        Phase::Idle => phase.label().green().to_string(),
        _ => phase.label().cyan().to_string(),
    };
    eprintln!("{} {} {}", timestamp().dimmed(), "[PHASE]".blue().bold(), label);
}

/// Print the tool command line.
pub fn print_command(command_line: &str) {
    println!("{} {}", "[CMD]".magenta().bold(), command_line);
    let _ = io::stdout().flush();
}

/// Overwrite the current stderr line with a progress indicator.
pub fn print_progress(percent: u8, file_count: usize) {
    eprint!(
        "\r{} {:>3}% ({} files)",
        "[PARSE]".cyan().bold(),
        percent,
        file_count
    );
    let _ = io::stderr().flush();
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!(
        "{} {} {}",
        timestamp().dimmed(),
        "[ERROR]".red().bold(),
        message.red()
    );
}

/// Parse a `#rrggbb` color.
#[must_use]
pub fn parse_hex_color(s: &str) -> Option<(u8, u8, u8)> {
    let hex = s.trim().strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some((channel(0)?, channel(2)?, channel(4)?))
}

/// Colors the parts of a match line that the search pattern matched.
#[derive(Debug, Clone)]
pub struct Highlighter {
    regex: Regex,
    color: (u8, u8, u8),
}

impl Highlighter {
    /// Build from the pattern, case mode and highlight color of `params`.
    ///
    /// Returns `None` when the color is not `#rrggbb` or the pattern does
    /// not compile.
    #[must_use]
    pub fn new(params: &SearchParameters) -> Option<Self> {
        let color = parse_hex_color(&params.highlight_color)?;

        let pattern = if params.fixed_string {
            [params.pattern.as_str(), params.add_pattern.as_str()]
                .iter()
                .filter(|p| !p.is_empty())
                .map(|p| regex::escape(p))
                .collect::<Vec<_>>()
                .join("|")
        } else {
            params.combined_pattern()
        };
        if pattern.is_empty() {
            return None;
        }

        let ignore_case = match params.case_mode {
            CaseMode::Insensitive => true,
            CaseMode::Smart => !pattern.chars().any(char::is_uppercase),
            CaseMode::Default | CaseMode::Sensitive => false,
        };

        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(ignore_case)
            .build()
            .inspect_err(|e| tracing::debug!(error = %e, "Highlighting disabled"))
            .ok()?;
        Some(Self { regex, color })
    }

    /// Return `text` with every non-empty match colored.
    #[must_use]
    pub fn apply(&self, text: &str) -> String {
        let (r, g, b) = self.color;
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for m in self.regex.find_iter(text).filter(|m| !m.is_empty()) {
            out.push_str(&text[last..m.start()]);
            out.push_str(&m.as_str().truecolor(r, g, b).to_string());
            last = m.end();
        }
        out.push_str(&text[last..]);
        out
    }
}

/// Print the result tree. Collapsed files show only their header line.
pub fn print_tree(tree: &ResultTree, raw_mode: bool, highlighter: Option<&Highlighter>) {
    let mut out = io::stdout().lock();
    let _ = writeln!(out, "{}", tree.header().bold());

    for file in tree.files() {
        let marker = if file.expanded { "▾" } else { "▸" };
        let _ = writeln!(out, "{} {}", marker.dimmed(), file.display_text.blue());
        if !file.expanded {
            continue;
        }
        for node in &file.matches {
            let prefix = format!("Line {}: ", node.line_number);
            let max_len = DEFAULT_MAX_LEN.saturating_sub(prefix.len());
            let text = truncate(&node.text, max_len, raw_mode);
            let text = match highlighter {
                Some(h) => h.apply(&text),
                None => text,
            };
            let _ = writeln!(out, "    {}{}", prefix.dimmed(), text);
        }
    }

    if let Some(summary) = tree.summary() {
        let _ = writeln!(out, "{}", summary.display_text().green().bold());
    }
    let _ = out.flush();
}

/// Reports parsing progress and errors on stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalObserver;

impl ResultObserver for TerminalObserver {
    fn parsing_progress(&self, percent: u8, file_count: usize) {
        print_progress(percent, file_count);
    }

    fn parsing_completed(&self, total_matches: u64, total_files: usize) {
        eprintln!();
        tracing::debug!(total_matches, total_files, "Parsing finished");
    }

    fn parsing_error(&self, message: &str) {
        print_error(message);
    }
}
