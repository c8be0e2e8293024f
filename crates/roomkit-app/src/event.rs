//! Delegate notifications.
//!
//! The data source broadcasts [`DataSourceEvent`]s to every subscribed UI
//! component. The channel closes when the data source is destroyed, so no
//! listener outlives it.

use std::ops::Range;

use roomkit_core::{EventId, UserId};

use crate::{CellIdentifier, DataSourceState};

/// Bubbles affected by a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeSet {
    /// Structure changed; reload everything.
    Reload,
    /// Only bubbles in this index range changed (or were appended).
    Range(Range<usize>),
}

/// User interaction recognized inside a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellActionKind {
    /// Tap on the sender avatar.
    TapOnAvatar,
    /// Tap on the date/time container.
    TapOnDateTime,
    /// Tap on an attachment.
    TapOnAttachment,
    /// The unsent button of a failed echo was pressed.
    UnsentButtonPressed,
    /// Long press on a displayed event.
    LongPressOnEvent,
    /// Long press on the upload progress view.
    LongPressOnProgressView,
}

/// A cell interaction forwarded to the delegate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellAction {
    /// Kind of interaction.
    pub kind: CellActionKind,
    /// Identifier of the originating cell.
    pub cell: CellIdentifier,
    /// Index of the bubble rendered by the cell.
    pub bubble_index: usize,
    /// User concerned (avatar taps).
    pub user_id: Option<UserId>,
    /// Event concerned (unsent button, long press).
    pub event_id: Option<EventId>,
}

/// Notifications emitted by a data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSourceEvent {
    /// The bubble list changed.
    BubblesChanged(ChangeSet),
    /// The lifecycle state changed.
    StateChanged(DataSourceState),
    /// A session was attached.
    SessionAdded(UserId),
    /// The session was detached.
    SessionRemoved(UserId),
    /// A cell reported a user interaction.
    CellAction(CellAction),
    /// Last message or unread count changed.
    MetadataChanged,
}
