//! Property-based tests for bubble aggregation.
//!
//! These verify structural properties of [`BubbleList`] under arbitrary event
//! sequences rather than hand-picked scenarios.

use std::sync::Arc;

use proptest::prelude::*;
use roomkit_core::{
    AggregationContext, BubbleDataKind, BubbleList, DefaultFormatter, Event, MessageContent,
    RoomStateSnapshot, UserId,
};

const SENDERS: [&str; 3] = ["@a", "@b", "@c"];

fn state() -> Arc<RoomStateSnapshot> {
    Arc::new(RoomStateSnapshot::new("!room".into()))
}

fn text_event(index: usize, sender: &str) -> Event {
    Event::message(
        format!("e{index}").as_str(),
        sender,
        "!room",
        MessageContent::text(format!("message {index}")),
        index as u64,
    )
}

fn image_event(index: usize, sender: &str) -> Event {
    Event::message(
        format!("e{index}").as_str(),
        sender,
        "!room",
        MessageContent::image("pic.png", "mxc://pic"),
        index as u64,
    )
}

fn build(events: &[Event]) -> BubbleList {
    let me = UserId::new("@me");
    let ctx = AggregationContext {
        local_user: &me,
        formatter: &DefaultFormatter,
        kind: BubbleDataKind::standard(),
    };
    let mut list = BubbleList::new();
    for event in events {
        list.push_event(event.clone(), &state(), &ctx);
    }
    list
}

/// Sender index plus attachment flag per event.
fn event_strategy() -> impl Strategy<Value = Vec<(usize, bool)>> {
    prop::collection::vec((0..SENDERS.len(), prop::bool::weighted(0.2)), 0..40)
}

fn materialize(shape: &[(usize, bool)]) -> Vec<Event> {
    shape.iter()
        .enumerate()
        .map(|(i, (sender, attachment))| {
            if *attachment {
                image_event(i, SENDERS[*sender])
            } else {
                text_event(i, SENDERS[*sender])
            }
        })
        .collect()
}

proptest! {
    #[test]
    fn prop_same_sender_text_forms_one_bubble(count in 1usize..50) {
        let events: Vec<_> = (0..count).map(|i| text_event(i, "@a")).collect();
        let list = build(&events);

        prop_assert_eq!(list.len(), 1);
        let ids: Vec<_> = list.get(0).map(|b| b.events().map(|e| e.event_id.clone()).collect()).unwrap_or_default();
        let expected: Vec<_> = events.iter().map(|e| e.event_id.clone()).collect();
        prop_assert_eq!(ids, expected);
    }

    #[test]
    fn prop_alternating_senders_never_merge(count in 1usize..50) {
        let events: Vec<_> = (0..count).map(|i| text_event(i, SENDERS[i % 2])).collect();
        let list = build(&events);

        prop_assert_eq!(list.len(), count);
        prop_assert!(list.iter().all(|b| b.event_count() == 1));
    }

    #[test]
    fn prop_no_event_lost_or_duplicated(shape in event_strategy()) {
        let events = materialize(&shape);
        let list = build(&events);

        let flattened: Vec<_> = list.iter().flat_map(|b| b.events().map(|e| e.event_id.clone()).collect::<Vec<_>>()).collect();
        let expected: Vec<_> = events.iter().map(|e| e.event_id.clone()).collect();
        prop_assert_eq!(flattened, expected);
        prop_assert!(list.iter().all(|b| b.event_count() > 0));
        prop_assert!(list.iter().filter(|b| b.is_attachment()).all(|b| b.event_count() == 1));
    }

    #[test]
    fn prop_same_sender_flag_matches_neighbour(shape in event_strategy()) {
        let list = build(&materialize(&shape));
        let bubbles: Vec<_> = list.iter().collect();
        for window in bubbles.windows(2) {
            prop_assert_eq!(window[1].is_same_sender_as_previous(), window[0].has_same_sender_as(window[1]));
        }
        if let Some(first) = bubbles.first() {
            prop_assert!(!first.is_same_sender_as_previous());
        }
    }

    #[test]
    fn prop_identical_update_is_idempotent(shape in event_strategy(), pick in any::<prop::sample::Index>()) {
        let events = materialize(&shape);
        prop_assume!(!events.is_empty());
        let mut list = build(&events);
        let before: Vec<_> = list.iter().map(|b| b.event_count()).collect();

        let target = pick.get(&events).clone();
        let result = list.update_event(&target.event_id, target.clone(), &DefaultFormatter);

        prop_assert!(result.is_some());
        let after: Vec<_> = list.iter().map(|b| b.event_count()).collect();
        prop_assert_eq!(before, after);
        prop_assert!(list.index_of(&target.event_id).is_some());
    }

    #[test]
    fn prop_removing_everything_empties_list(
        shape in event_strategy(),
        seed in any::<u64>(),
        merge in any::<bool>(),
    ) {
        let events = materialize(&shape);
        let mut list = build(&events);

        let mut ids: Vec<_> = events.iter().map(|e| e.event_id.clone()).collect();
        // Fisher-Yates driven by an LCG over the generated seed.
        let mut rng = seed;
        for i in (1..ids.len()).rev() {
            rng = rng.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
            let j = ((rng >> 33) % (i as u64 + 1)) as usize;
            ids.swap(i, j);
        }

        for id in &ids {
            prop_assert!(list.remove_event(id, merge).is_some());
            prop_assert!(list.iter().all(|b| b.event_count() > 0));
        }
        prop_assert!(list.is_empty());
    }
}
