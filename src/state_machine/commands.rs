//! Commands that can mutate session state.
//!
//! All state changes MUST go through the state machine's `apply()` method.
//! Caller requests and transport notifications are both commands, so one
//! code path decides every transition.

use super::RunId;
use serde::Serialize;

/// Which part of the connection failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureStage {
    /// The transport never became ready: connect failed or `init` could
    /// not be written.
    Establish,
    /// The transport failed after `init` was transmitted.
    Runtime,
}

/// Commands that can mutate session state.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum SessionCommand {
    // Caller requests
    /// Start a new run, replacing any previous one.
    RunRequested { language: String, code: String },
    /// Relay interactive input to the running process.
    InputSubmitted { data: String },
    /// Abort the current run.
    KillRequested,

    // Transport notifications, tagged with the run they belong to
    /// The transport finished its handshake.
    TransportOpened { run: RunId },
    /// The `init` frame was written to the transport.
    InitSent { run: RunId },
    /// A text frame arrived. Decoding happens inside the state machine.
    FrameReceived { run: RunId, frame: String },
    /// The transport closed, cleanly or not.
    TransportClosed { run: RunId },
    /// The transport reported an error.
    TransportFailed {
        run: RunId,
        stage: FailureStage,
        reason: String,
    },
}
