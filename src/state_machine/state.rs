//! Session state as a single tagged enum.
//!
//! Each variant carries only the fields that are valid for it, so an exit
//! code can never coexist with an error, and a connected flag can never be
//! set on a finished session.

use serde::{Deserialize, Serialize};

/// Identifies one run request. Every transport notification carries the run
/// it belongs to so that events from a replaced connection can be dropped.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct RunId(pub u64);

impl RunId {
    pub fn next(self) -> Self {
        RunId(self.0 + 1)
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

/// Coarse status exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Connecting,
    Running,
    Exited,
    Errored,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Exited | SessionStatus::Errored)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "idle"),
            SessionStatus::Connecting => write!(f, "connecting"),
            SessionStatus::Running => write!(f, "running"),
            SessionStatus::Exited => write!(f, "exited"),
            SessionStatus::Errored => write!(f, "errored"),
        }
    }
}

/// Full session state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    /// Connection requested; `init` not yet transmitted.
    Connecting { transport_open: bool },
    /// `init` transmitted; output may arrive.
    Running,
    /// Finished. `code` is only present when the service sent `exit`;
    /// a kill or an unexplained disconnect leaves it empty.
    Exited { code: Option<i32> },
    /// Finished with a failure. Never carries an exit code.
    Errored { message: String },
}

impl SessionState {
    pub fn status(&self) -> SessionStatus {
        match self {
            SessionState::Idle => SessionStatus::Idle,
            SessionState::Connecting { .. } => SessionStatus::Connecting,
            SessionState::Running => SessionStatus::Running,
            SessionState::Exited { .. } => SessionStatus::Exited,
            SessionState::Errored { .. } => SessionStatus::Errored,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            SessionState::Exited { code } => *code,
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// Whether the session currently owns a connection that must be closed
    /// before it can be replaced.
    pub fn has_live_connection(&self) -> bool {
        matches!(
            self,
            SessionState::Connecting { .. } | SessionState::Running
        )
    }

    /// Whether the transport is open and frames can be written to it.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            SessionState::Connecting {
                transport_open: true
            } | SessionState::Running
        )
    }
}
