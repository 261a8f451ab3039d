//! One streaming connection per run.
//!
//! A [`ConnectionHandle`] owns a background task that connects to the
//! execution endpoint, writes `init` as its first frame, and then relays
//! frames in both directions. Everything the task observes is reported back
//! to the session driver as a [`SessionCommand`] tagged with the run.
//! Dropping or closing the handle closes the socket.

use crate::protocol::ClientMessage;
use crate::state_machine::{FailureStage, RunId, SessionCommand};
use futures::{SinkExt, StreamExt};
use std::io::ErrorKind;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::error::{Error as WsError, ProtocolError};
use tokio_tungstenite::tungstenite::Message;
use url::Url;

/// Exclusive handle to the connection of a single run.
pub struct ConnectionHandle {
    run: RunId,
    outbound_tx: mpsc::UnboundedSender<ClientMessage>,
    close_tx: oneshot::Sender<()>,
}

impl ConnectionHandle {
    /// Spawns the connection task. Must be called inside a tokio runtime.
    pub fn open(
        run: RunId,
        endpoint: Url,
        init: ClientMessage,
        notices: mpsc::UnboundedSender<SessionCommand>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = oneshot::channel();

        tokio::spawn(run_connection(
            run,
            endpoint,
            init,
            outbound_rx,
            close_rx,
            notices,
        ));

        Self {
            run,
            outbound_tx,
            close_tx,
        }
    }

    pub fn run(&self) -> RunId {
        self.run
    }

    /// Queues a frame. Frames queued before the handshake finishes are
    /// written after `init`. Dropped silently once the connection is gone.
    pub fn send(&self, message: ClientMessage) {
        let kind = message.kind();
        if self.outbound_tx.send(message).is_err() {
            tracing::debug!(run = %self.run, kind, "connection gone, frame dropped");
        }
    }

    /// Closes the connection. Frames queued before this call are written
    /// first.
    pub fn close(self) {
        tracing::debug!(run = %self.run, "closing connection");
        let _ = self.close_tx.send(());
    }
}

async fn run_connection(
    run: RunId,
    endpoint: Url,
    init: ClientMessage,
    mut outbound_rx: mpsc::UnboundedReceiver<ClientMessage>,
    mut close_rx: oneshot::Receiver<()>,
    notices: mpsc::UnboundedSender<SessionCommand>,
) {
    let notify = |command: SessionCommand| {
        let _ = notices.send(command);
    };

    tracing::debug!(%run, %endpoint, "connecting");
    let mut socket = tokio::select! {
        result = tokio_tungstenite::connect_async(endpoint.as_str()) => match result {
            Ok((socket, _response)) => socket,
            Err(e) => {
                tracing::warn!(%run, error = %e, "connection failed");
                notify(SessionCommand::TransportFailed {
                    run,
                    stage: FailureStage::Establish,
                    reason: e.to_string(),
                });
                return;
            }
        },
        _ = &mut close_rx => {
            tracing::debug!(%run, "closed before the handshake finished");
            return;
        }
    };
    notify(SessionCommand::TransportOpened { run });

    let sent = match init.to_frame() {
        Ok(frame) => socket
            .send(Message::Text(frame))
            .await
            .map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };
    if let Err(reason) = sent {
        tracing::warn!(%run, error = %reason, "could not send init");
        notify(SessionCommand::TransportFailed {
            run,
            stage: FailureStage::Establish,
            reason: format!("could not send init: {}", reason),
        });
        return;
    }
    notify(SessionCommand::InitSent { run });

    loop {
        tokio::select! {
            biased;

            outbound = outbound_rx.recv() => {
                let Some(message) = outbound else {
                    let _ = socket.close(None).await;
                    return;
                };
                let frame = match message.to_frame() {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!(%run, error = %e, "could not encode frame");
                        continue;
                    }
                };
                if let Err(e) = socket.send(Message::Text(frame)).await {
                    report_failure(run, e, &notify);
                    return;
                }
            }

            _ = &mut close_rx => {
                let _ = socket.close(None).await;
                return;
            }

            incoming = socket.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    notify(SessionCommand::FrameReceived { run, frame: text });
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => notify(SessionCommand::FrameReceived { run, frame: text }),
                    Err(_) => tracing::warn!(%run, "discarding non-UTF-8 binary frame"),
                },
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    report_failure(run, e, &notify);
                    return;
                }
                None => {
                    tracing::debug!(%run, "connection closed by peer");
                    notify(SessionCommand::TransportClosed { run });
                    return;
                }
            }
        }
    }
}

fn report_failure(run: RunId, error: WsError, notify: &impl Fn(SessionCommand)) {
    if is_abrupt_close(&error) {
        tracing::debug!(%run, error = %error, "connection dropped");
        notify(SessionCommand::TransportClosed { run });
    } else {
        tracing::warn!(%run, error = %error, "connection error");
        notify(SessionCommand::TransportFailed {
            run,
            stage: FailureStage::Runtime,
            reason: error.to_string(),
        });
    }
}

/// Whether an error means the peer simply went away, as opposed to the
/// transport failing. A vanished peer is reported as a close.
pub fn is_abrupt_close(error: &WsError) -> bool {
    match error {
        WsError::ConnectionClosed | WsError::AlreadyClosed => true,
        WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => true,
        WsError::Io(io) => matches!(
            io.kind(),
            ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::BrokenPipe
                | ErrorKind::UnexpectedEof
        ),
        _ => false,
    }
}
