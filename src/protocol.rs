//! Wire messages for the interactive execution stream.
//!
//! Every frame is a single JSON object tagged by its `type` field.
//! There is no protocol version: unknown server kinds decode to
//! [`ServerMessage::Unknown`] and are ignored by the session.

use serde::{Deserialize, Serialize};

/// Messages sent from the client to the execution service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Starts a run. Always the first frame on a fresh connection.
    Init { language: String, code: String },
    /// Interactive input for the running process.
    Stdin { data: String },
    /// Asks the service to terminate the remote process.
    Kill,
}

impl ClientMessage {
    /// Wire name of this message kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Init { .. } => "init",
            ClientMessage::Stdin { .. } => "stdin",
            ClientMessage::Kill => "kill",
        }
    }

    /// Serializes the message into a text frame.
    pub fn to_frame(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Messages sent from the execution service to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Stdout { data: String },
    Stderr { data: String },
    /// Termination of the remote process. A missing or `null` code, or one
    /// that does not fit an `i32`, still ends the run, just without a code.
    Exit {
        #[serde(default)]
        code: Option<i64>,
    },
    /// Session-level failure reported by the service.
    Error { error: String },
    /// Any kind this client does not know about.
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    /// Exit code as a process status, when the frame carries a usable one.
    pub fn exit_status(code: Option<i64>) -> Option<i32> {
        code.and_then(|c| i32::try_from(c).ok())
    }

    /// Whether this message ends the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServerMessage::Exit { .. } | ServerMessage::Error { .. })
    }
}

/// Decodes one inbound text frame.
///
/// Frames are decoded independently of each other; a failure here says
/// nothing about the frames before or after it.
pub fn decode_server_frame(frame: &str) -> serde_json::Result<ServerMessage> {
    serde_json::from_str(frame)
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
