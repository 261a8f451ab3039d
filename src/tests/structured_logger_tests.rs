use super::*;
use crate::state_machine::RunId;
use tempfile::TempDir;

fn create_test_logger() -> (StructuredLogger, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let logger =
        StructuredLogger::new("test-session", temp_dir.path()).expect("Failed to create logger");
    (logger, temp_dir)
}

fn read_entries(temp_dir: &TempDir) -> Vec<LogEntry> {
    let content = std::fs::read_to_string(temp_dir.path().join("test-session.jsonl"))
        .expect("Failed to read log file");
    content
        .lines()
        .map(|line| serde_json::from_str(line).expect("Failed to parse log entry"))
        .collect()
}

#[test]
fn test_log_entries_are_valid_json() {
    let (logger, temp_dir) = create_test_logger();

    logger.log("TestComponent", serde_json::json!({"key": "value1"}));
    logger.log("TestComponent", serde_json::json!({"key": "value2"}));
    logger.log("TestComponent", serde_json::json!({"key": "value3"}));

    let entries = read_entries(&temp_dir);
    assert_eq!(entries.len(), 3);
    for entry in entries {
        assert_eq!(entry.session_id, "test-session");
        assert_eq!(entry.component, "TestComponent");
    }
}

#[test]
fn test_sequence_numbers_monotonic() {
    let (logger, temp_dir) = create_test_logger();

    for i in 0..10 {
        logger.log("Test", serde_json::json!({"iteration": i}));
    }

    let mut prev_seq = 0u64;
    for entry in read_entries(&temp_dir) {
        assert!(
            entry.seq > prev_seq,
            "Sequence numbers should be monotonically increasing"
        );
        prev_seq = entry.seq;
    }
}

#[test]
fn test_begin_run_tags_entries() {
    let (logger, temp_dir) = create_test_logger();

    logger.log("Test", serde_json::json!({"msg": "before any run"}));
    logger.begin_run(1);
    logger.log("Test", serde_json::json!({"msg": "first run"}));
    logger.begin_run(2);
    logger.log("Test", serde_json::json!({"msg": "second run"}));

    let entries = read_entries(&temp_dir);
    let run_ids: Vec<u64> = entries.iter().map(|e| e.run_id).collect();
    assert_eq!(run_ids, vec![0, 1, 2]);
}

#[test]
fn test_command_and_event_entries() {
    let (logger, temp_dir) = create_test_logger();

    logger.log_command(
        1,
        &SessionCommand::RunRequested {
            language: "rust".to_string(),
            code: "fn main(){}".to_string(),
        },
    );
    logger.log_event(
        1,
        &SessionEvent::ConnectionOpenRequested {
            run: RunId(1),
            language: "rust".to_string(),
            code: "fn main(){}".to_string(),
        },
    );

    let entries = read_entries(&temp_dir);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].event["type"], "Command");
    assert_eq!(entries[0].event["command"]["type"], "RunRequested");
    assert_eq!(entries[1].event["type"], "Event");
    assert_eq!(entries[1].event["event"]["type"], "ConnectionOpenRequested");
}

#[test]
fn test_malformed_frame_preview_is_truncated() {
    let (logger, temp_dir) = create_test_logger();

    let frame = "x".repeat(1000);
    logger.log_malformed_frame(&frame, "expected value");

    let entries = read_entries(&temp_dir);
    let logged = entries[0].event["frame"].as_str().unwrap();
    assert_eq!(logged.len(), 200);
    assert_eq!(entries[0].component, "Connection");
}

#[test]
fn test_disabled_logger_writes_nothing() {
    let logger = StructuredLogger::disabled("quiet");
    logger.log("Test", serde_json::json!({"msg": "dropped"}));
    assert!(logger.path().is_none());
    assert_eq!(logger.session_id(), "quiet");
}

#[test]
fn test_concurrent_logging() {
    use std::sync::Arc;
    use std::thread;

    let (logger, temp_dir) = create_test_logger();
    let logger = Arc::new(logger);

    let mut handles = vec![];

    for t in 0..5 {
        let logger_clone = Arc::clone(&logger);
        let handle = thread::spawn(move || {
            for i in 0..20 {
                logger_clone.log("Thread", serde_json::json!({"thread": t, "iteration": i}));
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    assert_eq!(read_entries(&temp_dir).len(), 100);
}

#[test]
fn test_timestamp_format() {
    let (logger, temp_dir) = create_test_logger();

    logger.log("Test", serde_json::json!({"msg": "test"}));

    let entry = read_entries(&temp_dir).remove(0);

    // YYYY-MM-DDTHH:MM:SS.ffffffZ
    assert!(entry.ts.contains('T'));
    assert!(entry.ts.ends_with('Z'));
    let micros_part = entry.ts.split('.').nth(1).unwrap();
    assert_eq!(micros_part.len(), 7);
}
