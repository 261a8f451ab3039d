//! Public session API and the driver task behind it.
//!
//! A [`CompileSession`] is a cheap handle. The driver task it spawns owns
//! the [`SessionStateMachine`] and at most one [`ConnectionHandle`]; caller
//! requests and transport notices are both funneled into the machine from
//! that one task, so there is a single writer of session state. Callers
//! observe progress through snapshots, never through return values.

pub mod connection;
pub mod endpoint;

pub use connection::ConnectionHandle;
pub use endpoint::{session_endpoint, EndpointError, SESSION_PATH};

use crate::output_log::{OutputEvent, RunSummary};
use crate::protocol::ClientMessage;
use crate::state_machine::{
    FailureStage, RunId, SessionCommand, SessionEvent, SessionSnapshot, SessionStateMachine,
    SessionStatus,
};
use crate::structured_logger::StructuredLogger;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use url::Url;

/// Handle to an interactive execution session.
///
/// None of the methods fail or block. Dropping the handle stops the driver
/// and closes any live connection.
pub struct CompileSession {
    commands: mpsc::UnboundedSender<SessionCommand>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    requested_runs: AtomicU64,
}

impl CompileSession {
    /// Spawns the session driver for the service at `server_url`.
    ///
    /// Must be called inside a tokio runtime. An unusable URL is not an
    /// error here; every run started on it ends `errored` instead.
    pub fn spawn(server_url: &str, logger: Arc<StructuredLogger>) -> Self {
        let endpoint = session_endpoint(server_url);
        if let Err(e) = &endpoint {
            tracing::warn!(error = %e, "session endpoint unavailable");
        }

        let (machine, snapshot_rx) = SessionStateMachine::new(logger);
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();

        let driver = SessionDriver {
            machine,
            endpoint,
            connection: None,
            notice_tx,
        };
        tokio::spawn(driver.run(command_rx, notice_rx));

        Self {
            commands,
            snapshot_rx,
            requested_runs: AtomicU64::new(0),
        }
    }

    /// Starts a new run, replacing the current one if it is still live.
    ///
    /// Returns the id the run will carry in snapshots.
    pub fn start(&self, language: impl Into<String>, code: impl Into<String>) -> RunId {
        let run = RunId(self.requested_runs.fetch_add(1, Ordering::SeqCst) + 1);
        self.submit(SessionCommand::RunRequested {
            language: language.into(),
            code: code.into(),
        });
        run
    }

    /// Relays input to the running process. A no-op unless running.
    pub fn send_input(&self, text: impl Into<String>) {
        self.submit(SessionCommand::InputSubmitted { data: text.into() });
    }

    /// Stops observing the current run and asks the service to kill it.
    pub fn kill(&self) {
        self.submit(SessionCommand::KillRequested);
    }

    fn submit(&self, command: SessionCommand) {
        if self.commands.send(command).is_err() {
            tracing::debug!("session driver stopped, request dropped");
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.snapshot_rx.borrow().status()
    }

    pub fn output_log(&self) -> Vec<OutputEvent> {
        self.snapshot_rx.borrow().output_log()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.snapshot_rx.borrow().exit_code()
    }

    pub fn is_connected(&self) -> bool {
        self.snapshot_rx.borrow().is_connected()
    }

    /// Result summary of the latest run, once it is terminal.
    pub fn summary(&self) -> Option<RunSummary> {
        self.snapshot_rx.borrow().summary()
    }

    /// Receiver of every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Waits until the most recently started run is terminal.
    pub async fn wait_for_terminal(&self) -> SessionSnapshot {
        let run = RunId(self.requested_runs.load(Ordering::SeqCst));
        self.wait_for_run(run).await
    }

    /// Waits until `run` is terminal or has been replaced by a later run.
    pub async fn wait_for_run(&self, run: RunId) -> SessionSnapshot {
        if run == RunId::default() {
            return self.snapshot();
        }
        let mut rx = self.snapshot_rx.clone();
        let result = rx
            .wait_for(|s| s.run > run || (s.run == run && s.is_terminal()))
            .await
            .map(|s| s.clone());
        result.unwrap_or_else(|_| self.snapshot())
    }
}

/// Single owner of the state machine and the live connection.
struct SessionDriver {
    machine: SessionStateMachine,
    endpoint: Result<Url, EndpointError>,
    connection: Option<ConnectionHandle>,
    notice_tx: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionDriver {
    async fn run(
        mut self,
        mut command_rx: mpsc::UnboundedReceiver<SessionCommand>,
        mut notice_rx: mpsc::UnboundedReceiver<SessionCommand>,
    ) {
        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(command) => self.dispatch(command),
                    None => break,
                },
                Some(notice) = notice_rx.recv() => self.dispatch(notice),
            }
        }

        if let Some(connection) = self.connection.take() {
            connection.close();
        }
        tracing::debug!("session driver stopped");
    }

    /// Applies a command and carries out the connection work it asks for.
    /// Work can fail synchronously (no usable endpoint); such failures are
    /// fed back as commands in order.
    fn dispatch(&mut self, command: SessionCommand) {
        let mut pending = VecDeque::from([command]);
        while let Some(command) = pending.pop_front() {
            for event in self.machine.apply(command) {
                if let Some(follow_up) = self.perform(event) {
                    pending.push_back(follow_up);
                }
            }
        }
    }

    fn perform(&mut self, event: SessionEvent) -> Option<SessionCommand> {
        match event {
            SessionEvent::ConnectionOpenRequested {
                run,
                language,
                code,
            } => {
                if let Some(previous) = self.connection.take() {
                    previous.close();
                }
                let endpoint = match &self.endpoint {
                    Ok(endpoint) => endpoint.clone(),
                    Err(e) => {
                        return Some(SessionCommand::TransportFailed {
                            run,
                            stage: FailureStage::Establish,
                            reason: e.to_string(),
                        });
                    }
                };
                self.connection = Some(ConnectionHandle::open(
                    run,
                    endpoint,
                    ClientMessage::Init { language, code },
                    self.notice_tx.clone(),
                ));
                None
            }
            SessionEvent::FrameSendRequested { run, message } => {
                match &self.connection {
                    Some(connection) if connection.run() == run => connection.send(message),
                    _ => tracing::debug!(%run, kind = message.kind(), "no connection, frame dropped"),
                }
                None
            }
            SessionEvent::ConnectionCloseRequested { run } => {
                match self.connection.take() {
                    Some(connection) if connection.run() == run => connection.close(),
                    other => self.connection = other,
                }
                None
            }
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
