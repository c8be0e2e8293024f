//! Observable data source state.
//!
//! [`Timeline`] is the view model handed to the list view: a complete,
//! immutable snapshot of the bubble list plus room metadata. The worker
//! publishes a new one after each mutation; readers never see a list
//! mid-update.

use std::sync::Arc;

use roomkit_core::{Bubble, BubbleList, Event, EventId};

/// Lifecycle state of a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataSourceState {
    /// Not initialized yet, or disposed. A disposed data source cannot be
    /// used anymore.
    Unknown,
    /// Subscribing to the session and loading the first screen.
    Preparing,
    /// Initialization failed. Terminal; recreate the data source.
    Failed,
    /// Serving the list.
    Ready,
}

/// Published snapshot of a room's timeline.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    /// Bubbles in chronological order.
    pub bubbles: BubbleList,
    /// Most recent displayable event.
    pub last_message: Option<Event>,
    /// Incoming live messages since the last `mark_all_as_read`.
    pub unread_count: usize,
}

impl Timeline {
    /// Bubble at `index`.
    pub fn bubble(&self, index: usize) -> Option<Arc<Bubble>> {
        self.bubbles.get(index).cloned()
    }

    /// Bubble hosting `event_id`.
    pub fn bubble_of(&self, event_id: &EventId) -> Option<Arc<Bubble>> {
        self.bubbles.bubble_of(event_id).cloned()
    }

    /// Number of bubbles.
    pub fn len(&self) -> usize {
        self.bubbles.len()
    }

    /// True if there are no bubbles.
    pub fn is_empty(&self) -> bool {
        self.bubbles.is_empty()
    }
}
