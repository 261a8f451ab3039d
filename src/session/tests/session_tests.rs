//! End-to-end tests against an in-process WebSocket execution server.

use super::*;
use crate::output_log::OutputKind;
use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type Ws = WebSocketStream<TcpStream>;
type Reports = mpsc::UnboundedSender<String>;

const WAIT: Duration = Duration::from_secs(5);

/// Starts a server that runs `handler` for every accepted connection and
/// returns its base URL plus the receiving end of the handler reports.
async fn spawn_server<F, Fut>(handler: F) -> (String, mpsc::UnboundedReceiver<String>)
where
    F: Fn(Ws, Reports) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (report_tx, report_rx) = mpsc::unbounded_channel();
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let handler = handler.clone();
            let reports = report_tx.clone();
            tokio::spawn(async move {
                let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                handler(ws, reports).await;
            });
        }
    });

    (format!("http://{}", addr), report_rx)
}

async fn next_text(ws: &mut Ws) -> Option<String> {
    while let Some(message) = ws.next().await {
        match message {
            Ok(Message::Text(text)) => return Some(text),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
    None
}

async fn send_json(ws: &mut Ws, value: serde_json::Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

fn test_session(url: &str) -> CompileSession {
    CompileSession::spawn(url, Arc::new(StructuredLogger::disabled("test")))
}

async fn wait_terminal(session: &CompileSession) -> SessionSnapshot {
    tokio::time::timeout(WAIT, session.wait_for_terminal())
        .await
        .expect("session did not finish")
}

async fn wait_until(
    session: &CompileSession,
    predicate: impl FnMut(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    let mut rx = session.subscribe();
    tokio::time::timeout(WAIT, rx.wait_for(predicate))
        .await
        .expect("condition not reached")
        .map(|s| s.clone())
        .expect("driver stopped")
}

async fn next_report(reports: &mut mpsc::UnboundedReceiver<String>) -> String {
    tokio::time::timeout(WAIT, reports.recv())
        .await
        .expect("no report from server")
        .expect("server gone")
}

#[tokio::test]
async fn test_stdout_then_exit() {
    let (url, mut reports) = spawn_server(|mut ws, reports| async move {
        if let Some(init) = next_text(&mut ws).await {
            let _ = reports.send(init);
        }
        send_json(&mut ws, serde_json::json!({"type": "stdout", "data": "ok\n"})).await;
        send_json(&mut ws, serde_json::json!({"type": "exit", "code": 0})).await;
        while next_text(&mut ws).await.is_some() {}
    })
    .await;

    let session = test_session(&url);
    session.start("rust", "fn main(){}");
    let snapshot = wait_terminal(&session).await;

    let init: serde_json::Value = serde_json::from_str(&next_report(&mut reports).await).unwrap();
    assert_eq!(
        init,
        serde_json::json!({"type": "init", "language": "rust", "code": "fn main(){}"})
    );

    assert_eq!(snapshot.status(), SessionStatus::Exited);
    assert_eq!(snapshot.exit_code(), Some(0));
    assert_eq!(
        snapshot.output_log(),
        &[OutputEvent::new(OutputKind::Stdout, "ok\n")]
    );
    assert!(!snapshot.is_connected());

    let summary = session.summary().expect("summary after exit");
    assert!(summary.success);
    assert_eq!(summary.stdout, "ok\n");
}

#[tokio::test]
async fn test_abrupt_disconnect_is_codeless_exit() {
    let (url, _reports) = spawn_server(|mut ws, _reports| async move {
        next_text(&mut ws).await;
        send_json(&mut ws, serde_json::json!({"type": "stderr", "data": "panic\n"})).await;
        drop(ws);
    })
    .await;

    let session = test_session(&url);
    session.start("rust", "fn main(){ panic!() }");
    let snapshot = wait_terminal(&session).await;

    assert_eq!(snapshot.status(), SessionStatus::Exited);
    assert_eq!(snapshot.exit_code(), None);
    assert_eq!(
        snapshot.output_log(),
        &[OutputEvent::new(OutputKind::Stderr, "panic\n")]
    );
}

#[tokio::test]
async fn test_server_error_frame() {
    let (url, _reports) = spawn_server(|mut ws, _reports| async move {
        next_text(&mut ws).await;
        send_json(
            &mut ws,
            serde_json::json!({"type": "error", "error": "compile failed"}),
        )
        .await;
        while next_text(&mut ws).await.is_some() {}
    })
    .await;

    let session = test_session(&url);
    session.start("rust", "fn main() {");
    let snapshot = wait_terminal(&session).await;

    assert_eq!(snapshot.status(), SessionStatus::Errored);
    assert_eq!(snapshot.exit_code(), None);
    assert_eq!(
        snapshot.output_log(),
        &[OutputEvent::new(
            OutputKind::SystemError,
            "Error: compile failed\n"
        )]
    );
}

#[tokio::test]
async fn test_stdin_is_relayed_and_echoed() {
    let (url, _reports) = spawn_server(|mut ws, _reports| async move {
        next_text(&mut ws).await;
        send_json(&mut ws, serde_json::json!({"type": "stdout", "data": "name? "})).await;
        let Some(frame) = next_text(&mut ws).await else {
            return;
        };
        let input: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(input["type"], "stdin");
        let name = input["data"].as_str().unwrap_or_default().trim().to_string();
        send_json(
            &mut ws,
            serde_json::json!({"type": "stdout", "data": format!("hi {}\n", name)}),
        )
        .await;
        send_json(&mut ws, serde_json::json!({"type": "exit", "code": 0})).await;
        while next_text(&mut ws).await.is_some() {}
    })
    .await;

    let session = test_session(&url);
    session.start("python", "print('hi ' + input('name? '))");
    wait_until(&session, |s| s.output.len() == 1).await;
    session.send_input("bob\n");
    let snapshot = wait_terminal(&session).await;

    assert_eq!(
        snapshot.output_log(),
        &[
            OutputEvent::new(OutputKind::Stdout, "name? "),
            OutputEvent::new(OutputKind::StdinEcho, "bob\n"),
            OutputEvent::new(OutputKind::Stdout, "hi bob\n"),
        ]
    );
    assert_eq!(snapshot.exit_code(), Some(0));
}

#[tokio::test]
async fn test_kill_sends_frame_and_closes() {
    let (url, mut reports) = spawn_server(|mut ws, reports| async move {
        next_text(&mut ws).await;
        send_json(&mut ws, serde_json::json!({"type": "stdout", "data": "tick\n"})).await;
        while let Some(frame) = next_text(&mut ws).await {
            let _ = reports.send(frame);
            // Keep talking; the client must ignore it.
            let _ = ws
                .send(Message::Text(
                    serde_json::json!({"type": "stdout", "data": "tock\n"}).to_string(),
                ))
                .await;
        }
        let _ = reports.send("closed".to_string());
    })
    .await;

    let session = test_session(&url);
    session.start("rust", "loop {}");
    wait_until(&session, |s| s.output.len() == 1).await;

    session.kill();
    let snapshot = wait_terminal(&session).await;
    assert_eq!(snapshot.status(), SessionStatus::Exited);
    assert_eq!(snapshot.exit_code(), None);

    assert_eq!(next_report(&mut reports).await, r#"{"type":"kill"}"#);
    assert_eq!(next_report(&mut reports).await, "closed");

    // A second kill changes nothing.
    session.kill();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let after = session.snapshot();
    assert_eq!(after.status(), SessionStatus::Exited);
    assert_eq!(
        after.output_log(),
        &[OutputEvent::new(OutputKind::Stdout, "tick\n")]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_kill_during_fast_stream() {
    const CHUNKS: usize = 20_000;
    let (url, mut reports) = spawn_server(|mut ws, reports| async move {
        next_text(&mut ws).await;
        let mut sent = 0;
        for i in 0..CHUNKS {
            let chunk = serde_json::json!({"type": "stdout", "data": format!("line {}\n", i)});
            if ws.send(Message::Text(chunk.to_string())).await.is_err() {
                break;
            }
            sent += 1;
            if i % 100 == 0 {
                tokio::task::yield_now().await;
            }
        }
        let _ = reports.send(format!("sent {}", sent));
    })
    .await;

    let session = test_session(&url);
    let run = session.start("python", "while True: print('line')");
    wait_until(&session, |s| s.output.len() >= 100).await;

    session.kill();
    let snapshot = tokio::time::timeout(Duration::from_secs(2), session.wait_for_terminal())
        .await
        .expect("kill did not end the run promptly");
    assert_eq!(snapshot.run, run);
    assert_eq!(snapshot.status(), SessionStatus::Exited);
    assert_eq!(snapshot.exit_code(), None);

    // Chunks still in flight after the kill are not recorded.
    let recorded = snapshot.output.len();
    let _ = next_report(&mut reports).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(session.snapshot().output.len(), recorded);
}

#[tokio::test]
async fn test_restart_replaces_live_connection() {
    let (url, mut reports) = spawn_server(|mut ws, reports| async move {
        let Some(init) = next_text(&mut ws).await else {
            return;
        };
        let init: serde_json::Value = serde_json::from_str(&init).unwrap();
        if init["code"] == "first" {
            send_json(&mut ws, serde_json::json!({"type": "stdout", "data": "first\n"})).await;
            while next_text(&mut ws).await.is_some() {}
            let _ = reports.send("first closed".to_string());
        } else {
            send_json(&mut ws, serde_json::json!({"type": "stdout", "data": "second\n"})).await;
            send_json(&mut ws, serde_json::json!({"type": "exit", "code": 3})).await;
            while next_text(&mut ws).await.is_some() {}
        }
    })
    .await;

    let session = test_session(&url);
    let first = session.start("rust", "first");
    wait_until(&session, |s| s.output.len() == 1).await;

    let second = session.start("rust", "second");
    assert_eq!(second, first.next());
    let snapshot = wait_terminal(&session).await;

    assert_eq!(snapshot.run, second);
    assert_eq!(snapshot.exit_code(), Some(3));
    assert_eq!(
        snapshot.output_log(),
        &[OutputEvent::new(OutputKind::Stdout, "second\n")]
    );
    assert_eq!(next_report(&mut reports).await, "first closed");
}

#[tokio::test]
async fn test_connect_path_is_session_endpoint() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (path_tx, mut path_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            let _ = path_tx.send(request.uri().path().to_string());
            Ok(response)
        };
        let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
            .unwrap();
        next_text(&mut ws).await;
        send_json(&mut ws, serde_json::json!({"type": "exit", "code": 0})).await;
        while next_text(&mut ws).await.is_some() {}
    });

    let session = test_session(&format!("http://{}/ignored/path", addr));
    session.start("rust", "fn main(){}");
    wait_terminal(&session).await;

    assert_eq!(next_report(&mut path_rx).await, SESSION_PATH);
}

#[tokio::test]
async fn test_connection_refused_is_errored() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let session = test_session(&format!("http://{}", addr));
    session.start("rust", "fn main(){}");
    let snapshot = wait_terminal(&session).await;

    assert_eq!(snapshot.status(), SessionStatus::Errored);
    assert_eq!(snapshot.output_log().len(), 1);
    assert_eq!(snapshot.output_log()[0].kind, OutputKind::SystemError);
    assert!(snapshot.output_log()[0].data.starts_with("Failed to start: "));
}

#[tokio::test]
async fn test_invalid_server_url_is_errored_per_run() {
    let session = test_session("not a url");
    session.start("rust", "fn main(){}");
    let snapshot = wait_terminal(&session).await;

    assert_eq!(snapshot.status(), SessionStatus::Errored);
    assert!(snapshot.output_log()[0]
        .data
        .starts_with("Failed to start: invalid service URL"));

    let summary = session.summary().expect("summary after error");
    assert!(!summary.success);
    assert_eq!(summary.exit_code, None);
}

#[tokio::test]
async fn test_input_before_start_is_dropped() {
    let session = test_session("http://127.0.0.1:9");
    session.send_input("ignored\n");
    session.kill();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(session.status(), SessionStatus::Idle);
    assert!(session.output_log().is_empty());
    assert!(session.summary().is_none());
    assert!(!session.is_connected());
    assert_eq!(session.wait_for_terminal().await.status(), SessionStatus::Idle);
}
