//! Fuzz target for BubbleList aggregation
//!
//! Ensure the list stays structurally valid under any mix of append,
//! prepend, update, removal and typing.
//!
//! # Strategy
//!
//! - Few senders (including the local user and a missing sender) so runs
//!   of same-sender events are common
//! - Attachments interleaved with text
//! - Identifiers drawn from a small pool so updates and removals hit
//!
//! # Invariants
//!
//! - No bubble is empty
//! - Attachment and placeholder bubbles hold exactly one event
//! - No event identifier appears twice
//! - `is_same_sender_as_previous` matches the actual neighbour

#![no_main]

use std::{collections::HashSet, sync::Arc};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use roomkit_core::{
    AggregationContext, BubbleDataKind, BubbleList, DefaultFormatter, Event, EventId,
    MessageContent, RoomStateSnapshot, UserId,
};

#[derive(Debug, Clone, Arbitrary)]
enum ListOp {
    Push { id: u8, sender: SenderChoice, attachment: bool, ts: u16 },
    Prepend { id: u8, sender: SenderChoice, attachment: bool, ts: u16 },
    Update { id: u8, redact: bool },
    Remove { id: u8, merge: bool },
    Typing { senders: Vec<SenderChoice> },
}

#[derive(Debug, Clone, Copy, Arbitrary)]
enum SenderChoice {
    Local,
    Alice,
    Bob,
    Missing,
}

#[derive(Debug, Clone, Copy, Arbitrary)]
enum KindChoice {
    Standard,
    Gap(u8),
    OnePerEvent,
}

fn sender(choice: SenderChoice) -> Option<UserId> {
    match choice {
        SenderChoice::Local => Some(UserId::new("@me")),
        SenderChoice::Alice => Some(UserId::new("@alice")),
        SenderChoice::Bob => Some(UserId::new("@bob")),
        SenderChoice::Missing => None,
    }
}

fn event(id: u8, choice: SenderChoice, attachment: bool, ts: u16) -> Event {
    let content = if attachment {
        MessageContent::image("pic.png", "mxc://pic")
    } else {
        MessageContent::text(format!("body {id}"))
    };
    let mut event = Event::message(format!("$e{id}"), "@placeholder", "!room", content, ts.into());
    event.sender = sender(choice);
    event
}

fn kind(choice: KindChoice) -> BubbleDataKind {
    match choice {
        KindChoice::Standard => BubbleDataKind::standard(),
        KindChoice::Gap(gap) => BubbleDataKind::Standard { max_gap_ms: Some(gap.into()) },
        KindChoice::OnePerEvent => BubbleDataKind::OnePerEvent,
    }
}

fn check(list: &BubbleList) {
    let mut seen = HashSet::new();
    let mut previous: Option<&Arc<roomkit_core::Bubble>> = None;

    for (index, bubble) in list.iter().enumerate() {
        assert!(bubble.event_count() > 0, "bubble {index} is empty");
        if bubble.is_attachment() || bubble.is_placeholder() {
            assert_eq!(bubble.event_count(), 1, "bubble {index} must stand alone");
        }
        for event in bubble.events() {
            assert!(seen.insert(event.event_id.clone()), "{} appears twice", event.event_id);
        }
        let expected = previous.is_some_and(|prev| prev.has_same_sender_as(bubble));
        assert_eq!(bubble.is_same_sender_as_previous(), expected, "bubble {index} flag");
        previous = Some(bubble);
    }
}

fuzz_target!(|input: (KindChoice, Vec<ListOp>)| {
    let (kind_choice, ops) = input;
    let local_user = UserId::new("@me");
    let formatter = DefaultFormatter;
    let state = Arc::new(
        RoomStateSnapshot::new("!room".into())
            .with_member("@alice".into(), Some("Alice"))
            .with_member("@bob".into(), Some("Bob")),
    );
    let ctx = AggregationContext { local_user: &local_user, formatter: &formatter, kind: kind(kind_choice) };
    let mut list = BubbleList::new();

    for op in ops {
        match op {
            ListOp::Push { id, sender, attachment, ts } => {
                let event = event(id, sender, attachment, ts);
                if list.event(&event.event_id).is_none() {
                    let index = list.push_event(event, &state, &ctx);
                    assert_eq!(index, list.len() - 1);
                }
            }
            ListOp::Prepend { id, sender, attachment, ts } => {
                let event = event(id, sender, attachment, ts);
                if list.event(&event.event_id).is_none() {
                    assert_eq!(list.prepend_event(event, &state, &ctx), 0);
                }
            }
            ListOp::Update { id, redact } => {
                let event_id = EventId::new(format!("$e{id}"));
                if let Some(current) = list.event(&event_id).cloned() {
                    let replacement = if redact { current.redact() } else { current };
                    let before = list.event_count();
                    assert!(list.update_event(&event_id, replacement, &formatter).is_some());
                    assert_eq!(list.event_count(), before);
                }
            }
            ListOp::Remove { id, merge } => {
                let event_id = EventId::new(format!("$e{id}"));
                let before = list.event_count();
                if list.remove_event(&event_id, merge).is_some() {
                    assert_eq!(list.event_count(), before - 1);
                    assert!(list.event(&event_id).is_none());
                }
            }
            ListOp::Typing { senders } => {
                let typing: HashSet<UserId> = senders.into_iter().filter_map(sender).collect();
                list.set_typing(&typing);
                let flagged = list.iter().filter(|b| b.is_typing()).count();
                assert!(flagged <= typing.len());
            }
        }

        check(&list);
    }
});
