//! Bubble record.
//!
//! A [`Bubble`] is a contiguous run of events from one sender, displayed as a
//! single cell. Sender metadata is copied from the room state snapshot taken
//! when the first event was aggregated.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    AggregationError, Event, EventFormatter, EventId, RoomId, RoomStateSnapshot, UserId,
};

/// Text shown for events that could not be aggregated normally.
const PLACEHOLDER_TEXT: &str = "<unable to display event>";

/// Merge policy of a bubble, chosen through the cell registry.
///
/// This is the accept/reject hook of the aggregation path: the aggregator
/// asks the bubble's kind whether a same-sender event may be concatenated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BubbleDataKind {
    /// Concatenate same-sender events. With `max_gap_ms`, events further
    /// apart than the gap start a new bubble.
    Standard {
        /// Largest timestamp gap accepted for concatenation.
        max_gap_ms: Option<u64>,
    },
    /// One bubble per event (console-style display).
    OnePerEvent,
}

impl Default for BubbleDataKind {
    fn default() -> Self {
        Self::standard()
    }
}

impl BubbleDataKind {
    /// Same-sender concatenation without a time limit.
    pub const fn standard() -> Self {
        Self::Standard { max_gap_ms: None }
    }

    /// Whether an event at `event_ts` may join a bubble whose adjacent
    /// event is at `neighbour_ts`.
    pub fn accepts(self, neighbour_ts: u64, event_ts: u64) -> bool {
        match self {
            Self::Standard { max_gap_ms: None } => true,
            Self::Standard { max_gap_ms: Some(gap) } => neighbour_ts.abs_diff(event_ts) <= gap,
            Self::OnePerEvent => false,
        }
    }
}

/// One event inside a bubble with its rendered line.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    event: Event,
    text: String,
}

/// Display grouping of one or more contiguous same-sender events.
///
/// # Invariants
///
/// - The event list is never empty while the bubble is part of a list.
/// - Attachment and placeholder bubbles hold exactly one event.
#[derive(Debug, Clone, PartialEq)]
pub struct Bubble {
    sender_id: Option<UserId>,
    sender_display_name: String,
    sender_avatar_url: Option<String>,
    room_id: RoomId,
    state: Arc<RoomStateSnapshot>,
    entries: Vec<Entry>,
    kind: BubbleDataKind,
    text: String,
    is_incoming: bool,
    is_attachment: bool,
    is_placeholder: bool,
    starts_with_sender_name: bool,
    is_same_sender_as_previous: bool,
    is_typing: bool,
    show_date_time: bool,
}

impl Bubble {
    /// Create a bubble seeded with `event`.
    ///
    /// Events without a sender, or that the formatter rejects, degrade to a
    /// placeholder bubble that never concatenates with its neighbours.
    pub fn new(
        event: Event,
        state: Arc<RoomStateSnapshot>,
        formatter: &dyn EventFormatter,
        local_user: &UserId,
        kind: BubbleDataKind,
    ) -> Self {
        match Self::seed_text(&event, &state, formatter) {
            Ok(text) => {
                let mut bubble = Self::blank(event, text, &state, local_user, kind);
                bubble.refresh();
                bubble
            },
            Err(err) => {
                tracing::warn!(event_id = %event.event_id, %err, "event degraded to placeholder");
                let mut bubble = Self::blank(
                    event,
                    PLACEHOLDER_TEXT.to_owned(),
                    &state,
                    local_user,
                    BubbleDataKind::OnePerEvent,
                );
                bubble.is_placeholder = true;
                bubble.refresh();
                bubble
            },
        }
    }

    fn seed_text(
        event: &Event,
        state: &RoomStateSnapshot,
        formatter: &dyn EventFormatter,
    ) -> Result<String, AggregationError> {
        if event.sender.is_none() {
            return Err(AggregationError::MissingSender(event.event_id.clone()));
        }
        Ok(formatter.format(event, state)?)
    }

    fn blank(
        event: Event,
        text: String,
        state: &Arc<RoomStateSnapshot>,
        local_user: &UserId,
        kind: BubbleDataKind,
    ) -> Self {
        let sender_display_name = event
            .sender
            .as_ref()
            .map_or_else(|| "unknown".to_owned(), |s| state.display_name(s));
        Self {
            is_incoming: event.sender.as_ref() != Some(local_user),
            sender_avatar_url: event.sender.as_ref().and_then(|s| state.avatar_url(s)),
            sender_id: event.sender.clone(),
            sender_display_name,
            room_id: event.room_id.clone(),
            state: Arc::clone(state),
            entries: vec![Entry { event, text }],
            kind,
            text: String::new(),
            is_attachment: false,
            is_placeholder: false,
            starts_with_sender_name: false,
            is_same_sender_as_previous: false,
            is_typing: false,
            show_date_time: false,
        }
    }

    /// Append `event` if the bubble accepts it.
    ///
    /// A rejected event is handed back so the caller can seed a new bubble.
    pub fn add_event(&mut self, event: Event, formatter: &dyn EventFormatter) -> Result<(), Event> {
        let Some(last_ts) = self.entries.last().map(|e| e.event.origin_server_ts) else {
            return Err(event);
        };
        if !self.accepts(&event, last_ts) {
            return Err(event);
        }
        let Ok(text) = formatter.format(&event, &self.state) else { return Err(event) };
        self.entries.push(Entry { event, text });
        self.refresh();
        Ok(())
    }

    /// Prepend an older `event` if the bubble accepts it.
    pub fn prepend_event(
        &mut self,
        event: Event,
        formatter: &dyn EventFormatter,
    ) -> Result<(), Event> {
        let Some(first_ts) = self.entries.first().map(|e| e.event.origin_server_ts) else {
            return Err(event);
        };
        if !self.accepts(&event, first_ts) {
            return Err(event);
        }
        let Ok(text) = formatter.format(&event, &self.state) else { return Err(event) };
        self.entries.insert(0, Entry { event, text });
        self.refresh();
        Ok(())
    }

    /// Replace the event `event_id` in place. Returns the number of events
    /// left in the bubble (unchanged if the event is not hosted here).
    pub fn update_event(
        &mut self,
        event_id: &EventId,
        event: Event,
        formatter: &dyn EventFormatter,
    ) -> usize {
        if let Some(entry) = self.entries.iter_mut().find(|e| &e.event.event_id == event_id) {
            entry.text = formatter.format(&event, &self.state).unwrap_or_else(|err| {
                tracing::warn!(%event_id, %err, "replacement event cannot be formatted");
                PLACEHOLDER_TEXT.to_owned()
            });
            entry.event = event;
            self.refresh();
        }
        self.entries.len()
    }

    /// Split the bubble so that `event_id` stands alone.
    ///
    /// Returns the non-empty runs before the event, the event itself and
    /// after it, in display order. A bubble that does not host `event_id`
    /// comes back whole.
    pub fn isolate(mut self, event_id: &EventId) -> Vec<Bubble> {
        let Some(at) = self.entries.iter().position(|e| &e.event.event_id == event_id) else {
            return vec![self];
        };
        let mut before = std::mem::take(&mut self.entries);
        let after = before.split_off(at + 1);
        let target = before.split_off(at);
        let is_typing = self.is_typing;
        self.is_typing = false;

        let mut parts: Vec<Bubble> = Vec::with_capacity(3);
        for run in [before, target, after] {
            if run.is_empty() {
                continue;
            }
            let mut part = self.clone();
            part.entries = run;
            if !parts.is_empty() {
                part.is_same_sender_as_previous = part.sender_id.is_some();
            }
            part.refresh();
            parts.push(part);
        }
        if let Some(last) = parts.last_mut() {
            last.is_typing = is_typing;
        }
        parts
    }

    /// Remove the event `event_id`. Returns the number of events left.
    pub fn remove_event(&mut self, event_id: &EventId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| &e.event.event_id != event_id);
        if self.entries.len() != before && !self.entries.is_empty() {
            self.refresh();
        }
        self.entries.len()
    }

    /// True if both bubbles were sent by the same user.
    pub fn has_same_sender_as(&self, other: &Bubble) -> bool {
        self.sender_id.is_some() && self.sender_id == other.sender_id
    }

    /// Append every event of the following bubble `other` to this one.
    ///
    /// Both bubbles must have the same sender and accept concatenation.
    /// Returns `other` unchanged when the merge is refused.
    pub fn merge_with(&mut self, other: Bubble) -> Result<(), Bubble> {
        let Some(last_ts) = self.entries.last().map(|e| e.event.origin_server_ts) else {
            return Err(other);
        };
        let refused = match other.entries.first() {
            Some(first) => {
                !self.has_same_sender_as(&other)
                    || other.is_placeholder
                    || other.is_attachment
                    || !self.accepts(&first.event, last_ts)
            },
            None => true,
        };
        if refused {
            return Err(other);
        }
        self.entries.extend(other.entries);
        self.refresh();
        Ok(())
    }

    /// True if `event_id` is hosted by this bubble.
    pub fn contains(&self, event_id: &EventId) -> bool {
        self.entries.iter().any(|e| &e.event.event_id == event_id)
    }

    /// Hosted events in display order.
    pub fn events(&self) -> impl ExactSizeIterator<Item = &Event> + DoubleEndedIterator {
        self.entries.iter().map(|e| &e.event)
    }

    /// Hosted event `event_id`.
    pub fn event(&self, event_id: &EventId) -> Option<&Event> {
        self.events().find(|e| &e.event_id == event_id)
    }

    /// Number of hosted events.
    pub fn event_count(&self) -> usize {
        self.entries.len()
    }

    /// Sender. `None` only for placeholders of sender-less events.
    pub fn sender_id(&self) -> Option<&UserId> {
        self.sender_id.as_ref()
    }

    /// Sender display name when the bubble was created.
    pub fn sender_display_name(&self) -> &str {
        &self.sender_display_name
    }

    /// Sender avatar URL when the bubble was created.
    pub fn sender_avatar_url(&self) -> Option<&str> {
        self.sender_avatar_url.as_deref()
    }

    /// Room of the bubble.
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Timestamp of the earliest event.
    pub fn date(&self) -> u64 {
        self.entries.iter().map(|e| e.event.origin_server_ts).min().unwrap_or_default()
    }

    /// Composed display text, one line per event.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Merge policy.
    pub fn kind(&self) -> BubbleDataKind {
        self.kind
    }

    /// Sent by someone other than the local user.
    pub fn is_incoming(&self) -> bool {
        self.is_incoming
    }

    /// Holds an attachment (image, video, audio, location, file).
    pub fn is_attachment(&self) -> bool {
        self.is_attachment
    }

    /// Stands in for an event that could not be aggregated.
    pub fn is_placeholder(&self) -> bool {
        self.is_placeholder
    }

    /// The text begins with the sender name (emotes, membership lines).
    pub fn starts_with_sender_name(&self) -> bool {
        self.starts_with_sender_name
    }

    /// The previous bubble has the same sender; the header is not drawn.
    pub fn is_same_sender_as_previous(&self) -> bool {
        self.is_same_sender_as_previous
    }

    /// Set by the list after structural changes.
    pub fn set_same_sender_as_previous(&mut self, value: bool) {
        self.is_same_sender_as_previous = value;
    }

    /// The sender is currently typing.
    pub fn is_typing(&self) -> bool {
        self.is_typing
    }

    /// Set from typing notifications.
    pub fn set_typing(&mut self, value: bool) {
        self.is_typing = value;
    }

    /// Whether the cell shows its date/time label.
    pub fn show_date_time(&self) -> bool {
        self.show_date_time
    }

    /// Toggle the date/time label.
    pub fn set_show_date_time(&mut self, value: bool) {
        self.show_date_time = value;
    }

    fn accepts(&self, event: &Event, neighbour_ts: u64) -> bool {
        !self.is_placeholder
            && !self.is_attachment
            && !event.is_attachment()
            && event.sender.is_some()
            && event.sender == self.sender_id
            && self.kind.accepts(neighbour_ts, event.origin_server_ts)
    }

    fn refresh(&mut self) {
        self.text = self.entries.iter().map(|e| e.text.as_str()).collect::<Vec<_>>().join("\n");
        self.is_attachment = self.entries.iter().any(|e| e.event.is_attachment());
        self.starts_with_sender_name = self.text.starts_with(&self.sender_display_name)
            || self.text.starts_with(&format!("* {}", self.sender_display_name));
    }
}
