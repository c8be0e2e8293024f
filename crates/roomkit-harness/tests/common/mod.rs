//! Shared fixtures for data source tests.

#![allow(dead_code)]

use std::sync::Arc;

use roomkit_app::{DataSourceConfig, RoomDataSource, Timeline};
use roomkit_core::{Event, MessageContent, RoomId, RoomStateSnapshot};
use roomkit_harness::{SimEnv, SimSession};

pub const ROOM: &str = "!room";
pub const ME: &str = "@me";

pub type DataSource = RoomDataSource<SimSession, SimEnv>;

pub fn text(id: &str, sender: &str, body: &str, ts: u64) -> Event {
    Event::message(id, sender, ROOM, MessageContent::text(body), ts)
}

pub fn image(id: &str, sender: &str, ts: u64) -> Event {
    Event::message(id, sender, ROOM, MessageContent::image("pic.png", "mxc://pic"), ts)
}

/// `count` text events, senders alternating between `@alice` and `@bob`.
pub fn alternating_history(count: usize) -> Vec<Event> {
    (0..count)
        .map(|i| {
            let sender = if i % 2 == 0 { "@alice" } else { "@bob" };
            text(&format!("$h{i}"), sender, &format!("history {i}"), i as u64)
        })
        .collect()
}

pub fn session(history: Vec<Event>) -> Arc<SimSession> {
    let session = SimSession::new(ME);
    let state = RoomStateSnapshot::new(RoomId::new(ROOM))
        .with_member("@alice".into(), Some("Alice"))
        .with_member("@bob".into(), Some("Bob"));
    session.add_room(state, history);
    Arc::new(session)
}

pub fn data_source(session: &Arc<SimSession>, config: DataSourceConfig) -> DataSource {
    RoomDataSource::new(Arc::clone(session), RoomId::new(ROOM), SimEnv::at(1_000), config)
}

pub async fn ready(session: &Arc<SimSession>, config: DataSourceConfig) -> DataSource {
    let ds = data_source(session, config);
    ds.prepare().await.unwrap();
    ds
}

/// Event identifiers per bubble.
pub fn layout(timeline: &Timeline) -> Vec<Vec<String>> {
    timeline
        .bubbles
        .iter()
        .map(|bubble| bubble.events().map(|e| e.event_id.to_string()).collect())
        .collect()
}

pub fn snapshot(ds: &DataSource) -> Arc<Timeline> {
    ds.snapshot().expect("data source is alive")
}
