//! Tests for the parser thread.

use rgscope::parser::{ParseJob, ParserWorker, ResultEvent};
use rgscope::rg::{RawOutput, SearchId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::common::rg_json;

fn job(raw: &str, buffer: usize) -> (ParseJob, mpsc::Receiver<ResultEvent>) {
    let (tx, rx) = mpsc::channel(buffer);
    let job = ParseJob {
        id: SearchId::new(),
        output: RawOutput {
            stdout: raw.as_bytes().to_vec(),
            ..RawOutput::default()
        },
        cancel: CancellationToken::new(),
        events: tx,
    };
    (job, rx)
}

#[tokio::test]
async fn small_buffer_applies_backpressure_without_loss() {
    let matches: Vec<(u64, &str)> = (1..=500).map(|i| (i, "hit")).collect();
    let raw = rg_json(&[("big.txt", &matches)]);
    let worker = ParserWorker::spawn().unwrap();

    let (job, mut rx) = job(&raw, 2);
    worker.submit(job).unwrap();

    let mut found = 0;
    let mut last = None;
    while let Some(event) = rx.recv().await {
        if matches!(event, ResultEvent::MatchFound { .. }) {
            found += 1;
        }
        last = Some(event);
    }
    assert_eq!(found, 500);
    assert_eq!(
        last,
        Some(ResultEvent::Completed {
            total_matches: 500,
            total_files: 1
        })
    );
}

#[tokio::test]
async fn dropped_receiver_releases_the_worker() {
    let matches: Vec<(u64, &str)> = (1..=200).map(|i| (i, "hit")).collect();
    let raw = rg_json(&[("a", &matches)]);
    let worker = ParserWorker::spawn().unwrap();

    let (first, rx) = job(&raw, 1);
    worker.submit(first).unwrap();
    drop(rx);

    let (second, mut rx) = job(&rg_json(&[]), 4);
    worker.submit(second).unwrap();
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert_eq!(
        events.last(),
        Some(&ResultEvent::Completed {
            total_matches: 0,
            total_files: 0
        })
    );
}

#[tokio::test]
async fn cancelled_job_stops_midway() {
    let matches: Vec<(u64, &str)> = (1..=1000).map(|i| (i, "hit")).collect();
    let raw = rg_json(&[("a", &matches)]);
    let worker = ParserWorker::spawn().unwrap();

    let (job, mut rx) = job(&raw, 1);
    let cancel = job.cancel.clone();
    worker.submit(job).unwrap();

    // Take a few events, then stop.
    for _ in 0..3 {
        rx.recv().await.unwrap();
    }
    cancel.cancel();

    let mut terminal = false;
    while let Some(event) = rx.recv().await {
        terminal |= event.is_terminal();
    }
    assert!(!terminal);
}
