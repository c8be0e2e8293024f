//! Fuzz target for event decoding and formatting
//!
//! Arbitrary bytes are decoded as a JSON event. Whatever decodes must
//! format and seed a bubble without panicking, and must survive a
//! serialize/decode cycle unchanged.

#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use roomkit_core::{
    Bubble, BubbleDataKind, DefaultFormatter, Event, EventFormatter, RoomStateSnapshot, UserId,
};

fuzz_target!(|data: &[u8]| {
    let Ok(event) = serde_json::from_slice::<Event>(data) else {
        return;
    };

    let mut state = RoomStateSnapshot::new(event.room_id.clone());
    state.apply(&event);
    let _ = DefaultFormatter.format(&event, &state);

    let bubble = Bubble::new(
        event.clone(),
        Arc::new(state),
        &DefaultFormatter,
        &UserId::new("@me"),
        BubbleDataKind::standard(),
    );
    assert_eq!(bubble.event_count(), 1);

    let encoded = serde_json::to_vec(&event).expect("event serializes");
    let decoded: Event = serde_json::from_slice(&encoded).expect("encoded event decodes");
    assert_eq!(decoded, event);
});
