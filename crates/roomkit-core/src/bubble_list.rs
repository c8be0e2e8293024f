//! Ordered bubble list and the aggregation paths.
//!
//! The list is copy-on-write: bubbles are shared behind [`Arc`] so cloning the
//! list for publication copies pointers only, and mutating a bubble that a
//! published snapshot still references clones just that bubble.
//!
//! # Paths
//!
//! - Forward aggregation ([`BubbleList::push_event`]) for live events and
//!   local echoes: merge into the last bubble or append a new one.
//! - Backward aggregation ([`BubbleList::prepend_event`]) for history pages:
//!   merge into the first bubble or insert a new one at the head.
//! - Update ([`BubbleList::update_event`]) for echo confirmation and
//!   redaction: replace in place, scanning from the tail.
//! - Removal ([`BubbleList::remove_event`]): drop the event and, if its bubble
//!   empties, the bubble itself.

use std::{collections::HashSet, sync::Arc};

use crate::{Bubble, BubbleDataKind, Event, EventFormatter, EventId, RoomStateSnapshot, UserId};

/// Collaborators needed to aggregate one event.
#[derive(Clone, Copy)]
pub struct AggregationContext<'a> {
    /// User the data source runs for; decides bubble direction.
    pub local_user: &'a UserId,
    /// Event to text conversion.
    pub formatter: &'a dyn EventFormatter,
    /// Merge policy for a bubble seeded by this event.
    pub kind: BubbleDataKind,
}

/// Chronologically ordered bubbles backing a list view.
#[derive(Debug, Clone, Default)]
pub struct BubbleList {
    bubbles: Vec<Arc<Bubble>>,
}

impl BubbleList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregate a newer event at the tail. Returns the index of the bubble
    /// that now hosts it.
    pub fn push_event(
        &mut self,
        event: Event,
        state: &Arc<RoomStateSnapshot>,
        ctx: &AggregationContext<'_>,
    ) -> usize {
        let event = match self.bubbles.last_mut() {
            Some(last) => match Arc::make_mut(last).add_event(event, ctx.formatter) {
                Ok(()) => return self.bubbles.len() - 1,
                Err(event) => event,
            },
            None => event,
        };

        let mut bubble =
            Bubble::new(event, Arc::clone(state), ctx.formatter, ctx.local_user, ctx.kind);
        let same_sender = self.bubbles.last().is_some_and(|prev| prev.has_same_sender_as(&bubble));
        bubble.set_same_sender_as_previous(same_sender);
        self.bubbles.push(Arc::new(bubble));
        self.bubbles.len() - 1
    }

    /// Aggregate an older event at the head. Returns the index of the bubble
    /// that now hosts it (always `0`).
    pub fn prepend_event(
        &mut self,
        event: Event,
        state: &Arc<RoomStateSnapshot>,
        ctx: &AggregationContext<'_>,
    ) -> usize {
        let event = match self.bubbles.first_mut() {
            Some(first) => match Arc::make_mut(first).prepend_event(event, ctx.formatter) {
                Ok(()) => return 0,
                Err(event) => event,
            },
            None => event,
        };

        let bubble = Bubble::new(event, Arc::clone(state), ctx.formatter, ctx.local_user, ctx.kind);
        self.bubbles.insert(0, Arc::new(bubble));
        self.refresh_same_sender(1);
        0
    }

    /// Replace event `event_id` with `replacement`, keeping its position.
    ///
    /// Returns the number of events left in the owning bubble, or `None` if
    /// no bubble hosts `event_id`. When `replacement` carries a new
    /// identifier that is already displayed elsewhere (the server echo
    /// arrived before the send response), the stale event is removed rather
    /// than duplicated. A replacement that turns into an attachment is split
    /// out of a multi-event bubble into its own.
    pub fn update_event(
        &mut self,
        event_id: &EventId,
        replacement: Event,
        formatter: &dyn EventFormatter,
    ) -> Option<usize> {
        let pos = self.position_of(event_id)?;

        if &replacement.event_id != event_id && self.position_of(&replacement.event_id).is_some() {
            tracing::debug!(%event_id, replacement = %replacement.event_id, "dropping duplicate echo");
            return self.remove_event(event_id, false);
        }

        let new_id = replacement.event_id.clone();
        let bubble = Arc::make_mut(&mut self.bubbles[pos]);
        let remaining = bubble.update_event(event_id, replacement, formatter);
        if remaining < 2 || !bubble.is_attachment() {
            return Some(remaining);
        }

        tracing::debug!(event_id = %new_id, "attachment split out of its bubble");
        let parts = Arc::unwrap_or_clone(self.bubbles.remove(pos)).isolate(&new_id);
        let next = pos + parts.len();
        self.bubbles.splice(pos..pos, parts.into_iter().map(Arc::new));
        self.refresh_same_sender(next);
        Some(1)
    }

    /// Remove event `event_id`.
    ///
    /// Returns the number of events left in its bubble (`0` means the bubble
    /// was removed), or `None` if no bubble hosts `event_id`. With
    /// `merge_adjacent`, two same-sender bubbles made adjacent by the removal
    /// are concatenated when their merge policy accepts it.
    pub fn remove_event(&mut self, event_id: &EventId, merge_adjacent: bool) -> Option<usize> {
        let pos = self.position_of(event_id)?;
        let remaining = Arc::make_mut(&mut self.bubbles[pos]).remove_event(event_id);
        if remaining > 0 {
            return Some(remaining);
        }

        self.bubbles.remove(pos);
        if merge_adjacent && pos > 0 && pos < self.bubbles.len() {
            let next = Arc::unwrap_or_clone(self.bubbles.remove(pos));
            if let Err(next) = Arc::make_mut(&mut self.bubbles[pos - 1]).merge_with(next) {
                self.bubbles.insert(pos, Arc::new(next));
            }
        }
        self.refresh_same_sender(pos);
        Some(0)
    }

    /// Flag the most recent bubble of every user in `typing`; clear the rest.
    ///
    /// Returns `true` if any flag changed.
    pub fn set_typing(&mut self, typing: &HashSet<UserId>) -> bool {
        let mut seen = HashSet::new();
        let mut changed = false;
        for bubble in self.bubbles.iter_mut().rev() {
            let flag = bubble
                .sender_id()
                .is_some_and(|s| typing.contains(s) && seen.insert(s.clone()));
            if bubble.is_typing() != flag {
                Arc::make_mut(bubble).set_typing(flag);
                changed = true;
            }
        }
        changed
    }

    /// Bubble at `index`.
    pub fn get(&self, index: usize) -> Option<&Arc<Bubble>> {
        self.bubbles.get(index)
    }

    /// Index of the bubble hosting `event_id`, scanning from the tail.
    pub fn index_of(&self, event_id: &EventId) -> Option<usize> {
        self.position_of(event_id)
    }

    /// Bubble hosting `event_id`.
    pub fn bubble_of(&self, event_id: &EventId) -> Option<&Arc<Bubble>> {
        self.position_of(event_id).and_then(|i| self.bubbles.get(i))
    }

    /// Hosted event `event_id`.
    pub fn event(&self, event_id: &EventId) -> Option<&Event> {
        self.bubble_of(event_id).and_then(|b| b.event(event_id))
    }

    /// Number of bubbles.
    pub fn len(&self) -> usize {
        self.bubbles.len()
    }

    /// True if there are no bubbles.
    pub fn is_empty(&self) -> bool {
        self.bubbles.is_empty()
    }

    /// Total number of hosted events.
    pub fn event_count(&self) -> usize {
        self.bubbles.iter().map(|b| b.event_count()).sum()
    }

    /// Bubbles in display order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Arc<Bubble>> + DoubleEndedIterator {
        self.bubbles.iter()
    }

    /// Most recent bubble.
    pub fn last(&self) -> Option<&Arc<Bubble>> {
        self.bubbles.last()
    }

    /// Drop every bubble.
    pub fn clear(&mut self) {
        self.bubbles.clear();
    }

    fn position_of(&self, event_id: &EventId) -> Option<usize> {
        self.bubbles.iter().rposition(|b| b.contains(event_id))
    }

    /// Recompute `is_same_sender_as_previous` for the bubble at `index`.
    fn refresh_same_sender(&mut self, index: usize) {
        let flag = match (index.checked_sub(1).and_then(|i| self.bubbles.get(i)), self.bubbles.get(index)) {
            (Some(prev), Some(current)) => prev.has_same_sender_as(current),
            _ => false,
        };
        if let Some(current) = self.bubbles.get_mut(index)
            && current.is_same_sender_as_previous() != flag
        {
            Arc::make_mut(current).set_same_sender_as_previous(flag);
        }
    }
}
