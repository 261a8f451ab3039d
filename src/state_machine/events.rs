//! Events emitted by the state machine after processing commands.
//!
//! Most events are for logging only. The `Connection*` and `FrameSend*`
//! events are instructions for the session driver, which owns the transport.

use super::{RunId, SessionStatus};
use crate::output_log::OutputKind;
use crate::protocol::ClientMessage;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// Status changed from one value to another
    StatusChanged {
        from: SessionStatus,
        to: SessionStatus,
    },
    /// A new run was assigned
    RunStarted { run: RunId },
    /// The output log was cleared for a new run
    LogReset { discarded: usize },
    /// An event was appended to the output log
    OutputAppended { kind: OutputKind, len: usize },
    /// An inbound frame could not be decoded and was dropped
    FrameDiscarded { reason: String },
    /// Driver: open a connection for `run` and send `init` first
    ConnectionOpenRequested {
        run: RunId,
        language: String,
        code: String,
    },
    /// The connection for `run` finished its handshake
    ConnectionOpened { run: RunId },
    /// Driver: write a frame on the connection for `run`
    FrameSendRequested { run: RunId, message: ClientMessage },
    /// Driver: close the connection for `run`
    ConnectionCloseRequested { run: RunId },
}
