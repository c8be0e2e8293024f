//! Rendered timelines for recorded transcripts.

use std::sync::Arc;

use roomkit_app::{DataSourceConfig, RoomDataSource};
use roomkit_harness::{InvariantRegistry, SimEnv, Transcript, render_timeline};

const TRANSCRIPT: &str = r#"{
    "local_user": "@me",
    "room_id": "!room",
    "members": [
        { "user_id": "@alice", "display_name": "Alice" },
        { "user_id": "@bob", "display_name": "Bob" }
    ],
    "history": [
        { "event_id": "$1", "sender": "@alice", "room_id": "!room", "origin_server_ts": 1,
          "kind": { "type": "message", "msgtype": "text", "body": "hi" } },
        { "event_id": "$2", "sender": "@alice", "room_id": "!room", "origin_server_ts": 2,
          "kind": { "type": "message", "msgtype": "text", "body": "how are you?" } },
        { "event_id": "$3", "sender": "@bob", "room_id": "!room", "origin_server_ts": 3,
          "kind": { "type": "message", "msgtype": "emote", "body": "waves" } },
        { "event_id": "$4", "sender": "@bob", "room_id": "!room", "origin_server_ts": 4,
          "kind": { "type": "message", "msgtype": "image", "body": "cat.png", "url": "mxc://cat" } }
    ],
    "live": [
        { "event_id": "$5", "sender": "@alice", "room_id": "!room", "origin_server_ts": 5,
          "kind": { "type": "message", "msgtype": "text", "body": "anyone?" } }
    ],
    "send": ["hello"]
}"#;

async fn replay(transcript: &Transcript) -> String {
    let session = Arc::new(transcript.session());
    let ds = RoomDataSource::new(
        Arc::clone(&session),
        transcript.room_id.clone(),
        SimEnv::at(10),
        DataSourceConfig::default(),
    );
    ds.prepare().await.unwrap();
    for event in &transcript.live {
        session.deliver(event.clone());
    }
    ds.flush().await.unwrap();
    for body in &transcript.send {
        ds.send_text_message(body.clone()).await.unwrap();
    }

    let timeline = ds.snapshot().unwrap();
    InvariantRegistry::standard().assert_all(&timeline, "after replay");
    render_timeline(&timeline)
}

#[tokio::test]
async fn transcript_renders_grouped_bubbles() {
    let transcript = Transcript::from_json(TRANSCRIPT).unwrap();

    let rendered = replay(&transcript).await;

    insta::assert_snapshot!(rendered.trim_end(), @r"
    [0] Alice <
        hi
        how are you?
    [1] Bob <
        * Bob waves
    [2] Bob < (attachment, continued)
        image attachment
    [3] Alice <
        anyone?
    [4] @me >
        hello
    ");
}

#[tokio::test]
async fn failed_send_renders_flag() {
    let mut transcript = Transcript::from_json(TRANSCRIPT).unwrap();
    transcript.live.clear();
    transcript.send.clear();
    let session = Arc::new(transcript.session());
    session.fail_next_send(roomkit_app::SessionError::Timeout);
    let ds = RoomDataSource::new(
        Arc::clone(&session),
        transcript.room_id.clone(),
        SimEnv::at(10),
        DataSourceConfig::default(),
    );
    ds.prepare().await.unwrap();

    assert!(ds.send_text_message("lost").await.is_err());

    let rendered = render_timeline(&ds.snapshot().unwrap());
    assert_eq!(rendered.lines().last(), Some("    lost"));
    assert!(rendered.contains("[3] @me > (failed)"));
}
