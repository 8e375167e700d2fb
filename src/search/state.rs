//! Search phase state machine.

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// Current phase of the search pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Idle,
    Searching,
    ParsingResults,
    MappingInBackground,
    NavigatingFiles,
    Error,
    Stopped,
}

impl Phase {
    /// Whether a search run is still producing work in this phase.
    #[must_use]
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Searching | Self::ParsingResults)
    }

    /// Whether moving from `self` to `next` follows the pipeline's state
    /// machine.
    ///
    /// `Stopped` is reachable from anywhere and `Error` from any working
    /// phase. A new search may start from anything but `Error`, which has
    /// to be cleared to `Idle` first. Everything else follows
    /// `Idle -> Searching -> ParsingResults -> Idle`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use Phase::{
            Error, Idle, MappingInBackground, NavigatingFiles, ParsingResults, Searching, Stopped,
        };
        match (self, next) {
            (_, Stopped) => true,
            (Searching | ParsingResults | MappingInBackground | NavigatingFiles, Error) => true,
            (Error, Searching) => false,
            (_, Searching) => true,
            (Searching, ParsingResults | Idle) => true,
            (ParsingResults | Error | MappingInBackground | NavigatingFiles, Idle) => true,
            (Idle, MappingInBackground | NavigatingFiles) => true,
            _ => false,
        }
    }

    /// Short label for status displays.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "Ready",
            Self::Searching => "Searching...",
            Self::ParsingResults => "Parsing search results...",
            Self::MappingInBackground => "Mapping in background...",
            Self::NavigatingFiles => "Navigating files...",
            Self::Error => "Error",
            Self::Stopped => "Stopped",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Shared holder of the current phase with publish/subscribe semantics.
///
/// Cloning is cheap; all clones observe the same value. Only the
/// orchestrator calls [`PhaseCell::transition`].
#[derive(Debug, Clone)]
pub struct PhaseCell {
    tx: Arc<watch::Sender<Phase>>,
}

impl Default for PhaseCell {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseCell {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Phase::Idle);
        Self { tx: Arc::new(tx) }
    }

    #[must_use]
    pub fn get(&self) -> Phase {
        *self.tx.borrow()
    }

    /// Publish a new phase and return the previous one.
    pub(crate) fn transition(&self, next: Phase) -> Phase {
        let previous = self.tx.send_replace(next);
        if previous.can_transition_to(next) {
            tracing::debug!(from = ?previous, to = ?next, "Phase transition");
        } else if previous != next {
            tracing::warn!(from = ?previous, to = ?next, "Unexpected phase transition");
        }
        previous
    }

    /// Publish `next` only if the current phase is `expected`.
    pub(crate) fn transition_from(&self, expected: Phase, next: Phase) -> bool {
        let mut changed = false;
        self.tx.send_if_modified(|phase| {
            if *phase == expected {
                tracing::debug!(from = ?expected, to = ?next, "Phase transition");
                *phase = next;
                changed = true;
            }
            changed
        });
        changed
    }

    /// Subscribe to phase changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.tx.subscribe()
    }

    /// Phase changes as a stream, starting with the current value.
    #[must_use]
    pub fn stream(&self) -> WatchStream<Phase> {
        WatchStream::new(self.subscribe())
    }

    /// Wait until `predicate` holds for the current phase.
    pub async fn wait_for(&self, predicate: impl FnMut(&Phase) -> bool) -> Phase {
        let mut rx = self.subscribe();
        let phase = match rx.wait_for(predicate).await {
            Ok(phase) => *phase,
            // The sender lives in `self`, so the channel cannot close here.
            Err(_) => self.get(),
        };
        phase
    }
}

/// Process-wide phase holder for collaborators without an orchestrator
/// reference.
pub fn global_phase() -> &'static PhaseCell {
    static GLOBAL: OnceLock<PhaseCell> = OnceLock::new();
    GLOBAL.get_or_init(PhaseCell::new)
}

/// Restores the orchestrator's phase to `Idle` when dropped.
///
/// Returned by the orchestrator for the auxiliary `NavigatingFiles` and
/// `MappingInBackground` phases.
#[derive(Debug)]
pub struct PhaseGuard {
    cell: PhaseCell,
    held: Phase,
}

impl PhaseGuard {
    pub(crate) fn new(cell: PhaseCell, held: Phase) -> Self {
        Self { cell, held }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.held
    }
}

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        // A stop or a new search may have taken over in the meantime.
        self.cell.transition_from(self.held, Phase::Idle);
    }
}
