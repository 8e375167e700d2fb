//! End-to-end tests of the search pipeline against fake tools.

#![cfg(unix)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rgscope::results::ResultObserver;
use rgscope::rg::DriverConfig;
use rgscope::search::{
    Orchestrator, OrchestratorConfig, Phase, PhaseCell, SearchParameters, ValidationError,
};

use crate::common::{fake_rg, keyed_rg, recording_rg, rg_json, selective_rg, sleeping_rg};

#[derive(Default)]
struct Recorder {
    progress: Mutex<Vec<u8>>,
    errors: Mutex<Vec<String>>,
    completed: Mutex<Option<(u64, usize)>>,
}

impl ResultObserver for Recorder {
    fn parsing_progress(&self, percent: u8, _file_count: usize) {
        self.progress.lock().unwrap().push(percent);
    }

    fn parsing_completed(&self, total_matches: u64, total_files: usize) {
        *self.completed.lock().unwrap() = Some((total_matches, total_files));
    }

    fn parsing_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }
}

fn orchestrator(binary: PathBuf, observer: Arc<Recorder>) -> Orchestrator {
    Orchestrator::builder()
        .phase_cell(PhaseCell::new())
        .observer(observer)
        .config(OrchestratorConfig {
            driver: DriverConfig {
                binary,
                terminate_timeout: Duration::from_secs(2),
                ..DriverConfig::default()
            },
            ..OrchestratorConfig::default()
        })
        .build()
        .unwrap()
}

/// Record every phase published until the cell reaches `until`.
fn record_phases(orch: &Orchestrator, until: Phase) -> tokio::task::JoinHandle<Vec<Phase>> {
    let mut rx = orch.subscribe();
    let initial = *rx.borrow_and_update();
    tokio::spawn(async move {
        let mut seen = vec![initial];
        while rx.changed().await.is_ok() {
            let phase = *rx.borrow_and_update();
            seen.push(phase);
            if phase == until {
                break;
            }
        }
        seen
    })
}

#[tokio::test]
async fn search_populates_tree_and_returns_to_idle() {
    let dir = tempfile::tempdir().unwrap();
    let output = rg_json(&[
        ("a.txt", &[(7, "the needle")]),
        ("b.txt", &[(1, "needle one"), (9, "  needle two  ")]),
    ]);
    let observer = Arc::new(Recorder::default());
    let orch = orchestrator(fake_rg(dir.path(), &output), Arc::clone(&observer));

    orch.submit(SearchParameters::new("needle", dir.path()))
        .await
        .unwrap();
    assert_eq!(orch.wait_idle().await, Phase::Idle);

    let tree = orch.tree();
    let tree = tree.read().unwrap();
    assert_eq!(tree.header(), "Found 3 matches (files: 2, duration: 0.000002s)");
    assert_eq!(tree.len(), 2);

    let a = tree.file("a.txt").unwrap();
    assert_eq!(a.matches[0].line_number, 7);
    assert_eq!(a.matches[0].text, "the needle");
    assert_eq!(a.display_text, "📁 a.txt (0.000001s, 1 lines)");
    assert!(a.expanded);

    let b = tree.file("b.txt").unwrap();
    assert_eq!(b.matches[1].text, "needle two");

    let summary = tree.summary().unwrap();
    assert_eq!((summary.total_matches, summary.total_files), (3, 2));
    assert_eq!(tree.stats().matches, 3);

    assert_eq!(*observer.completed.lock().unwrap(), Some((3, 2)));
    assert!(observer.errors.lock().unwrap().is_empty());
    assert_eq!(orch.live_processes(), 0);
}

#[tokio::test]
async fn phases_follow_search_parse_idle() {
    let dir = tempfile::tempdir().unwrap();
    let output = rg_json(&[("a.txt", &[(1, "x")])]);
    let orch = orchestrator(fake_rg(dir.path(), &output), Arc::default());
    let phases = record_phases(&orch, Phase::Idle);

    orch.submit(SearchParameters::new("x", dir.path()))
        .await
        .unwrap();
    orch.wait_idle().await;

    let seen = phases.await.unwrap();
    assert_eq!(seen.first(), Some(&Phase::Idle));
    assert_eq!(seen.last(), Some(&Phase::Idle));
    assert!(seen.contains(&Phase::Searching));
}

#[tokio::test]
async fn progress_is_monotonic() {
    let dir = tempfile::tempdir().unwrap();
    let matches: Vec<(u64, &str)> = (1..=60).map(|i| (i, "hit")).collect();
    let output = rg_json(&[("a", &matches[..20]), ("b", &matches[20..])]);
    let observer = Arc::new(Recorder::default());
    let orch = orchestrator(fake_rg(dir.path(), &output), Arc::clone(&observer));

    orch.submit(SearchParameters::new("hit", dir.path()))
        .await
        .unwrap();
    orch.wait_idle().await;

    let progress = observer.progress.lock().unwrap().clone();
    assert!(!progress.is_empty());
    assert!(progress.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(progress.last(), Some(&100));
}

#[tokio::test]
async fn cancel_during_search_never_parses() {
    let dir = tempfile::tempdir().unwrap();
    let orch = orchestrator(sleeping_rg(dir.path()), Arc::default());
    let phases = record_phases(&orch, Phase::Stopped);

    orch.submit(SearchParameters::new("needle", dir.path()))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    orch.cancel();
    assert_eq!(orch.phase(), Phase::Stopped);

    assert_eq!(orch.wait_idle().await, Phase::Stopped);
    let seen = phases.await.unwrap();
    assert!(!seen.contains(&Phase::ParsingResults), "{seen:?}");
    assert!(orch.tree().read().unwrap().is_empty());
    assert_eq!(orch.live_processes(), 0);
}

#[tokio::test]
async fn new_submit_supersedes_running_search() {
    let dir = tempfile::tempdir().unwrap();
    let output = rg_json(&[("fast.txt", &[(3, "needle")])]);
    let orch = orchestrator(selective_rg(dir.path(), &output), Arc::default());

    orch.submit(SearchParameters::new("slow", dir.path()))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    orch.submit(SearchParameters::new("needle", dir.path()))
        .await
        .unwrap();
    assert!(orch.live_processes() <= 1);

    assert_eq!(orch.wait_idle().await, Phase::Idle);
    let tree = orch.tree();
    let tree = tree.read().unwrap();
    assert_eq!(tree.len(), 1);
    assert!(tree.file("fast.txt").is_some());

    let history = orch.history();
    assert_eq!(history.patterns().collect::<Vec<_>>(), vec!["needle", "slow"]);
}

#[tokio::test]
async fn additional_pattern_is_sent_as_alternation() {
    let dir = tempfile::tempdir().unwrap();
    let orch = orchestrator(recording_rg(dir.path(), &rg_json(&[])), Arc::default());

    orch.submit(SearchParameters::new("foo", dir.path()).add_pattern("bar"))
        .await
        .unwrap();
    orch.wait_idle().await;

    let args = std::fs::read_to_string(dir.path().join("args.txt")).unwrap();
    let args: Vec<&str> = args.lines().collect();
    let pos = args.iter().position(|a| *a == "-e").unwrap();
    assert_eq!(args[pos + 1], "foo|bar");
    assert_eq!(args.last().copied(), dir.path().to_str());
}

#[tokio::test]
async fn no_matches_leaves_empty_tree() {
    let dir = tempfile::tempdir().unwrap();
    let orch = orchestrator(fake_rg(dir.path(), &rg_json(&[])), Arc::default());

    orch.submit(SearchParameters::new("absent", dir.path()))
        .await
        .unwrap();
    assert_eq!(orch.wait_idle().await, Phase::Idle);

    let tree = orch.tree();
    let tree = tree.read().unwrap();
    assert!(tree.is_empty());
    assert!(tree.summary().is_none());
}

#[tokio::test]
async fn missing_tool_ends_in_error_until_next_submit() {
    let dir = tempfile::tempdir().unwrap();
    let observer = Arc::new(Recorder::default());
    let orch = orchestrator(dir.path().join("no-such-rg"), Arc::clone(&observer));

    orch.submit(SearchParameters::new("x", dir.path()))
        .await
        .unwrap();
    assert_eq!(orch.wait_idle().await, Phase::Error);
    assert_eq!(observer.errors.lock().unwrap().len(), 1);
    assert!(orch.tree().read().unwrap().header().starts_with('❌'));

    // Rejected input does not clear the error.
    let err = orch
        .submit(SearchParameters::new(" ", dir.path()))
        .await
        .unwrap_err();
    assert_eq!(err, ValidationError::EmptyPattern);
    assert_eq!(orch.phase(), Phase::Error);

    // Once the tool exists, the next valid submit clears the error.
    fake_rg(dir.path(), &rg_json(&[("a.txt", &[(1, "x")])]));
    std::fs::rename(dir.path().join("fake-rg"), dir.path().join("no-such-rg")).unwrap();
    let phases = record_phases(&orch, Phase::Idle);

    orch.submit(SearchParameters::new("x", dir.path()))
        .await
        .unwrap();
    assert_eq!(orch.wait_idle().await, Phase::Idle);

    let seen = phases.await.unwrap();
    assert_eq!(seen.first(), Some(&Phase::Error));
    assert!(seen.contains(&Phase::Searching), "{seen:?}");
    assert!(!seen[1..].contains(&Phase::Error), "{seen:?}");
    assert!(orch.tree().read().unwrap().file("a.txt").is_some());
    assert_eq!(observer.errors.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn submit_pattern_keeps_persistent_options() {
    let dir = tempfile::tempdir().unwrap();
    let orch = orchestrator(recording_rg(dir.path(), &rg_json(&[])), Arc::default());
    orch.set_current_parameters(SearchParameters::default().fixed_string(true));

    orch.submit_pattern("a.b", dir.path()).await.unwrap();
    orch.wait_idle().await;

    let args = std::fs::read_to_string(dir.path().join("args.txt")).unwrap();
    assert!(args.lines().any(|a| a == "-F"));
    assert_eq!(orch.current_parameters().pattern, "a.b");
    assert!(orch.current_parameters().fixed_string);
}

#[tokio::test]
async fn dropped_wait_idle_keeps_run_registered() {
    let dir = tempfile::tempdir().unwrap();
    let matches: Vec<(u64, &str)> = (1..=100_000).map(|i| (i, "old hit")).collect();
    let old = rg_json(&[("old.txt", &matches[..])]);
    let new = rg_json(&[("new.txt", &[(1, "new hit")])]);
    let orch = orchestrator(keyed_rg(dir.path(), "stalerun", &old, &new), Arc::default());

    orch.submit(SearchParameters::new("stalerun", dir.path()))
        .await
        .unwrap();
    orch.phase_cell()
        .wait_for(|p| *p != Phase::Searching)
        .await;

    // Give up waiting almost at once; the run must stay registered.
    let _ = tokio::time::timeout(Duration::from_millis(1), orch.wait_idle()).await;

    orch.submit(SearchParameters::new("new", dir.path()))
        .await
        .unwrap();
    assert_eq!(orch.wait_idle().await, Phase::Idle);

    let tree = orch.tree();
    let tree = tree.read().unwrap();
    assert_eq!(tree.len(), 1);
    assert!(tree.file("old.txt").is_none());
    assert_eq!(tree.file("new.txt").unwrap().matches.len(), 1);
}

#[tokio::test]
async fn cancel_right_after_searching_stops_the_new_run() {
    let dir = tempfile::tempdir().unwrap();
    let orch = orchestrator(sleeping_rg(dir.path()), Arc::default());

    let canceller = {
        let orch = orch.clone();
        let mut rx = orch.subscribe();
        tokio::spawn(async move {
            let _ = rx.wait_for(|p| *p == Phase::Searching).await;
            orch.cancel();
        })
    };

    orch.submit(SearchParameters::new("needle", dir.path()))
        .await
        .unwrap();
    canceller.await.unwrap();

    // The tool sleeps for 30 s; only a delivered cancel ends the run sooner.
    let phase = tokio::time::timeout(Duration::from_secs(10), orch.wait_idle())
        .await
        .expect("run was not cancelled");
    assert_eq!(phase, Phase::Stopped);
    assert_eq!(orch.live_processes(), 0);
}
