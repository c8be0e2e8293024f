//! Live updates: ordering, typing, redactions, filtering, metadata.

mod common;

use std::{collections::HashSet, sync::Arc};

use common::{ROOM, image, layout, ready, session, snapshot, text};
use roomkit_app::{
    CellAction, CellActionKind, CellIdentifier, ChangeSet, DataSourceConfig, DataSourceEvent,
};
use roomkit_core::{Event, EventFilter, EventKind, EventType, Membership, RoomId, UserId};
use roomkit_harness::InvariantRegistry;

fn redaction(id: &str, target: &str) -> Event {
    Event { kind: EventKind::Redaction { redacts: target.into() }, ..text(id, "@alice", "", 50) }
}

#[tokio::test]
async fn live_events_append_in_delivery_order() {
    let session = session(Vec::new());
    let ds = ready(&session, DataSourceConfig::default()).await;
    let mut rx = ds.subscribe().unwrap();

    session.deliver(text("$e1", "@alice", "hi", 1));
    session.deliver(text("$e2", "@alice", "there", 2));
    session.deliver(text("$e3", "@bob", "hey", 3));
    ds.flush().await.unwrap();

    assert_eq!(layout(&snapshot(&ds)), [vec!["$e1", "$e2"], vec!["$e3"]]);
    assert_eq!(ds.cell_data_at(0).map(|b| b.event_count()), Some(2));
    assert_eq!(
        rx.try_recv().ok(),
        Some(DataSourceEvent::BubblesChanged(ChangeSet::Range(0..1)))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_producers_keep_their_own_order() {
    const PER_PRODUCER: usize = 50;
    let session = session(Vec::new());
    let ds = ready(&session, DataSourceConfig::default()).await;

    std::thread::scope(|scope| {
        for producer in ["p", "q"] {
            let session = Arc::clone(&session);
            scope.spawn(move || {
                for i in 0..PER_PRODUCER {
                    let sender = format!("@{producer}");
                    let id = format!("${producer}{i}");
                    session.deliver(text(&id, &sender, "x", i as u64));
                }
            });
        }
    });
    ds.flush().await.unwrap();

    let timeline = snapshot(&ds);
    let ids: Vec<String> = layout(&timeline).into_iter().flatten().collect();
    assert_eq!(ids.len(), 2 * PER_PRODUCER);
    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 2 * PER_PRODUCER);
    for producer in ["p", "q"] {
        let own: Vec<_> = ids.iter().filter(|id| id.starts_with(&format!("${producer}"))).collect();
        let expected: Vec<_> = (0..PER_PRODUCER).map(|i| format!("${producer}{i}")).collect();
        assert_eq!(own, expected.iter().collect::<Vec<_>>());
    }
    InvariantRegistry::standard().assert_all(&timeline, "after concurrent delivery");
}

#[tokio::test]
async fn typing_flags_latest_bubble_per_user() {
    let session = session(vec![
        text("$1", "@bob", "a", 1),
        text("$2", "@alice", "b", 2),
        text("$3", "@bob", "c", 3),
    ]);
    let ds = ready(&session, DataSourceConfig::default()).await;
    let room = RoomId::new(ROOM);

    session.deliver_typing(&room, vec![UserId::new("@bob")]);
    ds.flush().await.unwrap();
    let typing: Vec<_> = snapshot(&ds).bubbles.iter().map(|b| b.is_typing()).collect();
    assert_eq!(typing, [false, false, true]);

    session.deliver_typing(&room, Vec::new());
    ds.flush().await.unwrap();
    assert!(snapshot(&ds).bubbles.iter().all(|b| !b.is_typing()));
}

#[tokio::test]
async fn redaction_removes_event_by_default() {
    let session = session(vec![
        text("$1", "@alice", "keep", 1),
        text("$2", "@alice", "oops", 2),
    ]);
    let ds = ready(&session, DataSourceConfig::default()).await;

    session.deliver(redaction("$r", "$2"));
    ds.flush().await.unwrap();

    let timeline = snapshot(&ds);
    assert_eq!(layout(&timeline), [vec!["$1"]]);
    assert_eq!(timeline.bubble(0).map(|b| b.text().to_owned()), Some("keep".into()));
    assert_eq!(ds.last_message().map(|e| e.event_id.to_string()), Some("$1".into()));
}

#[tokio::test]
async fn redaction_strips_in_place_when_shown() {
    let session = session(vec![
        text("$1", "@alice", "keep", 1),
        text("$2", "@alice", "oops", 2),
    ]);
    let config = DataSourceConfig { show_redactions: true, ..DataSourceConfig::default() };
    let ds = ready(&session, config).await;

    session.deliver(redaction("$r", "$2"));
    ds.flush().await.unwrap();

    let timeline = snapshot(&ds);
    assert_eq!(layout(&timeline), [vec!["$1", "$2"]]);
    assert_eq!(timeline.bubble(0).map(|b| b.text().to_owned()), Some("keep\n<redacted>".into()));
}

#[tokio::test]
async fn removal_merges_neighbours_when_configured() {
    let history = vec![
        text("$1", "@alice", "a", 1),
        image("$2", "@bob", 2),
        text("$3", "@alice", "b", 3),
    ];

    let split = ready(&session(history.clone()), DataSourceConfig::default()).await;
    let merging_session = session(history);
    let config =
        DataSourceConfig { merge_adjacent_after_removal: true, ..DataSourceConfig::default() };
    let merged = ready(&merging_session, config).await;

    merging_session.deliver(redaction("$r", "$2"));
    merged.flush().await.unwrap();

    assert_eq!(layout(&snapshot(&merged)), [vec!["$1", "$3"]]);
    assert_eq!(layout(&snapshot(&split)), [vec!["$1"], vec!["$2"], vec!["$3"]]);
}

#[tokio::test]
async fn filter_change_applies_to_later_events_only() {
    let session = session(Vec::new());
    let ds = ready(&session, DataSourceConfig::default()).await;
    session.deliver(text("$1", "@alice", "before", 1));

    let mut filter = EventFilter::default();
    filter.deny(&EventType::Text);
    ds.set_event_filter(filter).await.unwrap();
    session.deliver(text("$2", "@alice", "hidden", 2));
    session.deliver(image("$3", "@alice", 3));
    ds.flush().await.unwrap();

    assert_eq!(layout(&snapshot(&ds)), [vec!["$1"], vec!["$3"]]);
    assert!(!ds.event_filter().allowed().contains(&EventType::Text));
}

#[tokio::test]
async fn hidden_state_events_still_update_names() {
    let session = session(Vec::new());
    let ds = ready(&session, DataSourceConfig::default()).await;

    let mut filter = EventFilter::default();
    filter.deny(&EventType::Membership);
    ds.set_event_filter(filter).await.unwrap();

    let join = Event {
        kind: EventKind::Membership {
            target: "@carol".into(),
            membership: Membership::Join,
            display_name: Some("Carol".into()),
            avatar_url: None,
        },
        ..text("$j", "@carol", "", 1)
    };
    session.deliver(join);
    session.deliver(text("$m", "@carol", "hello", 2));
    ds.flush().await.unwrap();

    let timeline = snapshot(&ds);
    assert_eq!(layout(&timeline), [vec!["$m"]]);
    assert_eq!(timeline.bubble(0).map(|b| b.sender_display_name().to_owned()), Some("Carol".into()));
}

#[tokio::test]
async fn malformed_event_degrades_without_stalling() {
    let session = session(Vec::new());
    let ds = ready(&session, DataSourceConfig::default()).await;

    session.deliver(Event { sender: None, ..text("$bad", "@alice", "?", 1) });
    session.deliver(text("$ok", "@alice", "fine", 2));
    ds.flush().await.unwrap();

    let timeline = snapshot(&ds);
    assert_eq!(layout(&timeline), [vec!["$bad"], vec!["$ok"]]);
    assert!(timeline.bubble(0).unwrap().is_placeholder());
    assert_eq!(timeline.bubble(1).map(|b| b.text().to_owned()), Some("fine".into()));
}

#[tokio::test]
async fn unread_count_tracks_incoming_live_messages() {
    let session = session(vec![text("$h", "@alice", "old", 1)]);
    let ds = ready(&session, DataSourceConfig::default()).await;

    session.deliver(text("$1", "@alice", "one", 2));
    session.deliver(text("$2", "@bob", "two", 3));
    ds.send_text_message("mine").await.unwrap();
    ds.flush().await.unwrap();
    assert_eq!(ds.unread_count(), 2);

    let mut rx = ds.subscribe().unwrap();
    ds.mark_all_as_read().await.unwrap();

    assert_eq!(ds.unread_count(), 0);
    assert_eq!(rx.try_recv().ok(), Some(DataSourceEvent::MetadataChanged));
}

#[tokio::test]
async fn cell_actions_reach_the_delegate() {
    let session = session(vec![text("$1", "@alice", "hi", 1)]);
    let ds = ready(&session, DataSourceConfig::default()).await;
    let mut rx = ds.subscribe().unwrap();

    let action = CellAction {
        kind: CellActionKind::TapOnAvatar,
        cell: CellIdentifier::IncomingText,
        bubble_index: 0,
        user_id: Some(UserId::new("@alice")),
        event_id: None,
    };
    ds.report_cell_action(action.clone()).unwrap();

    assert_eq!(rx.try_recv().ok(), Some(DataSourceEvent::CellAction(action)));
}
