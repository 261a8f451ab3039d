//! Ordered record of everything observed during one run.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

/// Kind of an [`OutputEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputKind {
    Stdout,
    Stderr,
    /// Input the caller sent, echoed locally (the server never echoes it).
    StdinEcho,
    /// Explanation of a non-clean termination.
    SystemError,
}

impl std::fmt::Display for OutputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputKind::Stdout => write!(f, "stdout"),
            OutputKind::Stderr => write!(f, "stderr"),
            OutputKind::StdinEcho => write!(f, "stdin-echo"),
            OutputKind::SystemError => write!(f, "system-error"),
        }
    }
}

/// One unit of observable activity. `data` is the chunk exactly as received;
/// no line reassembly happens anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputEvent {
    pub kind: OutputKind,
    pub data: String,
}

impl OutputEvent {
    pub fn new(kind: OutputKind, data: impl Into<String>) -> Self {
        Self {
            kind,
            data: data.into(),
        }
    }
}

/// Append-only output log.
///
/// Clones share one backing store and each sees the prefix that existed when
/// it was cloned, so publishing a snapshot never copies events. Only
/// [`OutputLog::clear`] shrinks a log; it detaches from the shared store
/// instead of truncating it, which leaves earlier clones intact.
#[derive(Clone, Default)]
pub struct OutputLog {
    store: Arc<RwLock<Vec<OutputEvent>>>,
    len: usize,
}

impl OutputLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: OutputEvent) {
        let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
        if store.len() == self.len {
            store.push(event);
            self.len += 1;
            return;
        }
        // Another clone appended past our view: continue on a private copy.
        let mut forked: Vec<OutputEvent> = store.iter().take(self.len).cloned().collect();
        drop(store);
        forked.push(event);
        self.len = forked.len();
        self.store = Arc::new(RwLock::new(forked));
    }

    pub fn clear(&mut self) {
        self.store = Arc::default();
        self.len = 0;
    }

    fn with_events<R>(&self, f: impl FnOnce(&[OutputEvent]) -> R) -> R {
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        f(store.get(..self.len).unwrap_or_default())
    }

    /// Copy of every event in this view.
    pub fn events(&self) -> Vec<OutputEvent> {
        self.events_from(0)
    }

    /// Copy of the events from index `start` on.
    pub fn events_from(&self, start: usize) -> Vec<OutputEvent> {
        self.with_events(|events| events.iter().skip(start).cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Concatenation of every chunk of the given kinds, in log order.
    pub fn collect_text(&self, kinds: &[OutputKind]) -> String {
        self.with_events(|events| {
            events
                .iter()
                .filter(|e| kinds.contains(&e.kind))
                .map(|e| e.data.as_str())
                .collect()
        })
    }
}

impl PartialEq for OutputLog {
    fn eq(&self, other: &Self) -> bool {
        if self.len != other.len {
            return false;
        }
        if Arc::ptr_eq(&self.store, &other.store) {
            return true;
        }
        let ours = self.events();
        other.with_events(|theirs| ours.as_slice() == theirs)
    }
}

impl Eq for OutputLog {}

impl std::fmt::Debug for OutputLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.with_events(|events| f.debug_list().entries(events).finish())
    }
}

/// Result summary handed to the persisted-state collaborator once a run is
/// over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl RunSummary {
    /// Builds a summary from a finished run's log and exit code.
    ///
    /// System errors are folded into `stderr` so a consumer that only
    /// displays the two streams still shows why the run failed.
    pub fn from_log(log: &OutputLog, exit_code: Option<i32>) -> Self {
        Self {
            success: exit_code == Some(0),
            stdout: log.collect_text(&[OutputKind::Stdout]),
            stderr: log.collect_text(&[OutputKind::Stderr, OutputKind::SystemError]),
            exit_code,
        }
    }
}
