//! Displayable-event predicate.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{Event, EventType};

/// Allow-list of event types displayed as messages.
///
/// The data source evaluates the filter once per event when the event is
/// processed. Changing the allow-list never re-filters bubbles that already
/// exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    allowed: HashSet<EventType>,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::new([
            EventType::Text,
            EventType::Emote,
            EventType::Membership,
            EventType::Image,
            EventType::Video,
            EventType::Location,
        ])
    }
}

impl EventFilter {
    /// Filter accepting exactly `allowed`.
    pub fn new(allowed: impl IntoIterator<Item = EventType>) -> Self {
        Self { allowed: allowed.into_iter().collect() }
    }

    /// True if `event` should be displayed.
    pub fn is_displayable(&self, event: &Event) -> bool {
        self.allowed.contains(&event.event_type())
    }

    /// Allow an additional event type.
    pub fn allow(&mut self, event_type: EventType) {
        self.allowed.insert(event_type);
    }

    /// Stop displaying an event type.
    pub fn deny(&mut self, event_type: &EventType) {
        self.allowed.remove(event_type);
    }

    /// Replace the whole allow-list.
    pub fn set_allowed(&mut self, allowed: impl IntoIterator<Item = EventType>) {
        self.allowed = allowed.into_iter().collect();
    }

    /// Currently allowed event types.
    pub fn allowed(&self) -> &HashSet<EventType> {
        &self.allowed
    }
}
