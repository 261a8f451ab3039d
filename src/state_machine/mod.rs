//! Centralized state machine for execution sessions.
//!
//! This module provides the ONLY place where session transitions happen.
//! The state machine owns the state and the output log, applies commands,
//! emits events, and broadcasts snapshots to subscribers via a watch channel.
//! It performs no I/O: connection work is requested through events and
//! carried out by the session driver.

mod commands;
mod events;
mod snapshot;
mod state;

pub use commands::{FailureStage, SessionCommand};
pub use events::SessionEvent;
pub use snapshot::SessionSnapshot;
pub use state::{RunId, SessionState, SessionStatus};

use crate::output_log::{OutputEvent, OutputKind, OutputLog};
use crate::protocol::{self, ClientMessage, ServerMessage};
use crate::structured_logger::StructuredLogger;
use std::sync::Arc;
use tokio::sync::watch;

/// The ONLY place session transitions happen.
pub struct SessionStateMachine {
    run: RunId,
    state: SessionState,
    output: OutputLog,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    logger: Arc<StructuredLogger>,
    seq: u64,
}

impl SessionStateMachine {
    /// Creates an idle state machine.
    ///
    /// Returns the state machine and a watch receiver for state snapshots.
    pub fn new(logger: Arc<StructuredLogger>) -> (Self, watch::Receiver<SessionSnapshot>) {
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());

        let machine = Self {
            run: RunId::default(),
            state: SessionState::Idle,
            output: OutputLog::new(),
            snapshot_tx,
            logger,
            seq: 0,
        };

        (machine, snapshot_rx)
    }

    /// All mutations go through this single method.
    /// Returns events for the driver and the log; broadcasts a snapshot
    /// when anything happened.
    pub fn apply(&mut self, command: SessionCommand) -> Vec<SessionEvent> {
        self.seq += 1;
        self.logger.log_command(self.seq, &command);

        let events = self.apply_internal(command);

        for event in &events {
            self.logger.log_event(self.seq, event);
        }

        if !events.is_empty() {
            self.broadcast_snapshot();
        }

        events
    }

    fn apply_internal(&mut self, command: SessionCommand) -> Vec<SessionEvent> {
        use SessionCommand::*;

        match command {
            RunRequested { language, code } => self.start_run(language, code),

            InputSubmitted { data } => {
                if self.state != SessionState::Running {
                    return vec![];
                }
                let mut events = vec![SessionEvent::FrameSendRequested {
                    run: self.run,
                    message: ClientMessage::Stdin { data: data.clone() },
                }];
                events.push(self.append(OutputKind::StdinEcho, data));
                events
            }

            KillRequested => {
                if !self.state.has_live_connection() {
                    return vec![];
                }
                let mut events = Vec::new();
                if self.state.is_connected() {
                    events.push(SessionEvent::FrameSendRequested {
                        run: self.run,
                        message: ClientMessage::Kill,
                    });
                }
                events.extend(self.finish(SessionState::Exited { code: None }));
                events
            }

            TransportOpened { run } => {
                if run != self.run {
                    return vec![];
                }
                match self.state {
                    SessionState::Connecting {
                        transport_open: false,
                    } => {
                        self.state = SessionState::Connecting {
                            transport_open: true,
                        };
                        vec![SessionEvent::ConnectionOpened { run }]
                    }
                    _ => vec![],
                }
            }

            InitSent { run } => {
                if run != self.run || !matches!(self.state, SessionState::Connecting { .. }) {
                    return vec![];
                }
                self.transition(SessionState::Running)
            }

            FrameReceived { run, frame } => {
                if run != self.run || self.state != SessionState::Running {
                    tracing::debug!(%run, current = %self.run, "dropping frame outside a running session");
                    return vec![];
                }
                self.handle_frame(&frame)
            }

            TransportClosed { run } => {
                if run != self.run || !self.state.has_live_connection() {
                    return vec![];
                }
                // Outcome unknown: treated as an exit without a code.
                self.finish(SessionState::Exited { code: None })
            }

            TransportFailed { run, stage, reason } => {
                if run != self.run || !self.state.has_live_connection() {
                    return vec![];
                }
                let text = match stage {
                    FailureStage::Establish => format!("Failed to start: {}\n", reason),
                    FailureStage::Runtime => format!("Connection error occurred: {}\n", reason),
                };
                let mut events = vec![self.append(OutputKind::SystemError, text)];
                events.extend(self.finish(SessionState::Errored { message: reason }));
                events
            }
        }
    }

    fn start_run(&mut self, language: String, code: String) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        if self.state.has_live_connection() {
            events.push(SessionEvent::ConnectionCloseRequested { run: self.run });
        }

        let discarded = self.output.len();
        self.output.clear();
        events.push(SessionEvent::LogReset { discarded });

        self.run = self.run.next();
        self.logger.begin_run(self.run.0);
        events.push(SessionEvent::RunStarted { run: self.run });

        events.extend(self.transition(SessionState::Connecting {
            transport_open: false,
        }));
        events.push(SessionEvent::ConnectionOpenRequested {
            run: self.run,
            language,
            code,
        });
        events
    }

    fn handle_frame(&mut self, frame: &str) -> Vec<SessionEvent> {
        let message = match protocol::decode_server_frame(frame) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(run = %self.run, error = %e, "discarding malformed frame");
                self.logger.log_malformed_frame(frame, &e.to_string());
                return vec![SessionEvent::FrameDiscarded {
                    reason: e.to_string(),
                }];
            }
        };

        match message {
            ServerMessage::Stdout { data } => vec![self.append(OutputKind::Stdout, data)],
            ServerMessage::Stderr { data } => vec![self.append(OutputKind::Stderr, data)],
            ServerMessage::Exit { code } => self.finish(SessionState::Exited {
                code: ServerMessage::exit_status(code),
            }),
            ServerMessage::Error { error } => {
                let mut events =
                    vec![self.append(OutputKind::SystemError, format!("Error: {}\n", error))];
                events.extend(self.finish(SessionState::Errored { message: error }));
                events
            }
            ServerMessage::Unknown => {
                tracing::debug!(run = %self.run, "ignoring frame of unknown kind");
                vec![]
            }
        }
    }

    fn append(&mut self, kind: OutputKind, data: String) -> SessionEvent {
        let len = data.len();
        self.output.push(OutputEvent::new(kind, data));
        SessionEvent::OutputAppended { kind, len }
    }

    /// Moves to a terminal state and releases the connection.
    fn finish(&mut self, terminal: SessionState) -> Vec<SessionEvent> {
        let run = self.run;
        let mut events = self.transition(terminal);
        events.push(SessionEvent::ConnectionCloseRequested { run });
        events
    }

    fn transition(&mut self, to: SessionState) -> Vec<SessionEvent> {
        let from = self.state.status();
        self.state = to;
        let to = self.state.status();
        if from == to {
            vec![]
        } else {
            vec![SessionEvent::StatusChanged { from, to }]
        }
    }

    /// Returns immutable reference to current state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn output(&self) -> &OutputLog {
        &self.output
    }

    /// Run the current state belongs to.
    pub fn run(&self) -> RunId {
        self.run
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::new(self.run, &self.state, &self.output)
    }

    /// Broadcasts the current state snapshot to all watchers.
    pub fn broadcast_snapshot(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }
}
