//! Tests for turning tool output into result events.

use rgscope::parser::{ParseOutcome, ResultEvent, ResultParser};
use tokio_util::sync::CancellationToken;

use crate::common::rg_json;

fn parse(raw: &str) -> (ParseOutcome, Vec<ResultEvent>) {
    let mut events = Vec::new();
    let outcome = ResultParser::new().parse(raw, &CancellationToken::new(), &mut events);
    (outcome, events)
}

fn progress(events: &[ResultEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e {
            ResultEvent::Progress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect()
}

#[test]
fn begin_match_end_summary_round_trip() {
    let raw = rg_json(&[("src/lib.rs", &[(7, "let needle = 1;")])]);
    let (outcome, events) = parse(&raw);

    assert_eq!(
        outcome,
        ParseOutcome::Completed {
            total_matches: 1,
            total_files: 1
        }
    );
    assert!(events.contains(&ResultEvent::FileBegun {
        path: "src/lib.rs".into(),
        elapsed: 0.0
    }));
    assert!(events.contains(&ResultEvent::MatchFound {
        path: "src/lib.rs".into(),
        line: 7,
        text: "let needle = 1;".into()
    }));
    assert!(events.contains(&ResultEvent::FileEnded {
        path: "src/lib.rs".into(),
        elapsed_total: "0.000001s".into(),
        matched_lines: 1
    }));
    assert_eq!(
        events.last(),
        Some(&ResultEvent::Completed {
            total_matches: 1,
            total_files: 1
        })
    );
}

#[test]
fn progress_denominator_is_the_summary_total() {
    let many: Vec<(u64, &str)> = (1..=100).map(|i| (i, "hit")).collect();
    let raw = rg_json(&[("a", &many[..50]), ("b", &many[50..])]);
    let (_, events) = parse(&raw);

    let steps = progress(&events);
    assert_eq!(steps.len(), 20);
    assert!(steps.windows(2).all(|w| w[0] < w[1]));
    assert!(steps.iter().all(|p| p % 5 == 0));
    assert_eq!(steps.last(), Some(&100));
}

#[test]
fn progress_reports_files_seen_so_far() {
    let raw = rg_json(&[("a", &[(1, "x")]), ("b", &[(1, "y")])]);
    let (_, events) = parse(&raw);
    let file_counts: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            ResultEvent::Progress { file_count, .. } => Some(*file_count),
            _ => None,
        })
        .collect();
    assert_eq!(file_counts, vec![1, 2]);
}

#[test]
fn parsing_twice_gives_identical_events() {
    let raw = rg_json(&[("a", &[(1, "x"), (2, "y")]), ("b", &[(3, "z")])]);
    assert_eq!(parse(&raw), parse(&raw));
}

#[test]
fn malformed_line_between_matches_is_skipped() {
    let good = rg_json(&[("a", &[(1, "first"), (2, "second")])]);
    let mut lines: Vec<&str> = good.lines().collect();
    // begin, match, match, end, summary
    lines.insert(2, "{not json");
    let (outcome, events) = parse(&lines.join("\n"));

    assert_eq!(
        outcome,
        ParseOutcome::Completed {
            total_matches: 2,
            total_files: 1
        }
    );
    let found: Vec<(u64, &str)> = events
        .iter()
        .filter_map(|e| match e {
            ResultEvent::MatchFound { line, text, .. } => Some((*line, text.as_str())),
            _ => None,
        })
        .collect();
    assert_eq!(found, vec![(1, "first"), (2, "second")]);
}

#[test]
fn malformed_lines_do_not_stop_parsing() {
    let good = rg_json(&[("a", &[(1, "x")]), ("b", &[(2, "y")])]);
    let mut lines: Vec<&str> = good.lines().collect();
    lines.insert(2, "this is not json");
    lines.insert(4, r#"{"type":"match","data":{"path":"#);
    let (outcome, events) = parse(&lines.join("\n"));

    assert_eq!(
        outcome,
        ParseOutcome::Completed {
            total_matches: 2,
            total_files: 2
        }
    );
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, ResultEvent::FileEnded { .. }))
            .count(),
        2
    );
}

#[test]
fn non_utf8_paths_appear_as_base64_text() {
    let raw = [
        r#"{"type":"begin","data":{"path":{"bytes":"Zm9v/w=="}}}"#,
        r#"{"type":"match","data":{"path":{"bytes":"Zm9v/w=="},"lines":{"text":"x"},"line_number":1}}"#,
    ]
    .join("\n");
    let (_, events) = parse(&raw);
    assert!(events.contains(&ResultEvent::FileBegun {
        path: "Zm9v/w==".into(),
        elapsed: 0.0
    }));
}
