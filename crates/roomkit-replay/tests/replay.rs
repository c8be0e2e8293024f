//! End-to-end replay of transcript files.

use std::{io::Write, path::Path};

use roomkit_app::DataSourceConfig;
use roomkit_replay::{ReplayError, ReplayOptions, replay_file};

const TRANSCRIPT: &str = r#"{
    "local_user": "@me",
    "room_id": "!room",
    "members": [{ "user_id": "@alice", "display_name": "Alice" }],
    "history": [
        { "event_id": "$1", "sender": "@alice", "room_id": "!room", "origin_server_ts": 1,
          "kind": { "type": "message", "msgtype": "text", "body": "one" } },
        { "event_id": "$2", "sender": "@alice", "room_id": "!room", "origin_server_ts": 2,
          "kind": { "type": "message", "msgtype": "text", "body": "two" } },
        { "event_id": "$3", "sender": "@alice", "room_id": "!room", "origin_server_ts": 3,
          "kind": { "type": "message", "msgtype": "text", "body": "three" } }
    ],
    "live": [
        { "event_id": "$4", "sender": "@alice", "room_id": "!room", "origin_server_ts": 4,
          "kind": { "type": "redaction", "redacts": "$3" } }
    ],
    "send": ["reply"]
}"#;

fn transcript_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(TRANSCRIPT.as_bytes()).unwrap();
    file
}

fn options(initial_page_size: usize) -> ReplayOptions {
    ReplayOptions {
        config: DataSourceConfig { initial_page_size, fill_page_size: 1, ..Default::default() },
        full_history: false,
        check_invariants: true,
    }
}

#[tokio::test]
async fn replays_history_live_and_sends() {
    let file = transcript_file();

    let rendered = replay_file(file.path(), &options(20)).await.unwrap();

    assert_eq!(rendered, "[0] Alice <\n    one\n    two\n[1] @me >\n    reply\n");
}

#[tokio::test]
async fn full_history_pages_past_initial_backfill() {
    let file = transcript_file();

    let partial = replay_file(file.path(), &options(1)).await.unwrap();
    let full = replay_file(file.path(), &ReplayOptions { full_history: true, ..options(1) })
        .await
        .unwrap();

    assert!(!partial.contains("one"));
    assert!(full.contains("    one\n    two\n"));
}

#[tokio::test]
async fn missing_file_is_reported() {
    let err = replay_file(Path::new("/nonexistent/room.json"), &options(20)).await.unwrap_err();

    assert!(matches!(err, ReplayError::Read { .. }));
}

#[tokio::test]
async fn malformed_transcript_is_reported() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"{ \"room_id\": 7 }").unwrap();

    let err = replay_file(file.path(), &options(20)).await.unwrap_err();

    assert!(matches!(err, ReplayError::Parse(_)));
}
