//! Read-only snapshot of session state for observers.
//!
//! Observers NEVER mutate this; they receive new snapshots via watch channel.

use super::{RunId, SessionState, SessionStatus};
use crate::output_log::{OutputEvent, OutputLog, RunSummary};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionSnapshot {
    /// Run the state belongs to (`RunId(0)` before the first run)
    pub run: RunId,
    pub state: SessionState,
    pub output: OutputLog,
}

impl SessionSnapshot {
    /// The output log is shared with the machine, not copied.
    pub fn new(run: RunId, state: &SessionState, output: &OutputLog) -> Self {
        Self {
            run,
            state: state.clone(),
            output: output.clone(),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.state.exit_code()
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn output_log(&self) -> Vec<OutputEvent> {
        self.output.events()
    }

    /// Summary for result display. `None` until the run is terminal.
    pub fn summary(&self) -> Option<RunSummary> {
        self.is_terminal()
            .then(|| RunSummary::from_log(&self.output, self.exit_code()))
    }
}
