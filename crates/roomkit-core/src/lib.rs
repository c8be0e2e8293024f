//! Timeline core for roomkit
//!
//! Sans-IO building blocks that turn protocol events delivered by an external
//! messaging session into display-ready bubbles. Nothing in this crate
//! performs I/O or owns a runtime: the data source in `roomkit-app` drives it
//! from a single worker task.
//!
//! # Components
//!
//! - [`Event`]: immutable-by-identity protocol event (with local echo support)
//! - [`EventFilter`]: allow-list predicate deciding what is displayed
//! - [`EventFormatter`]: event to display text conversion
//! - [`Bubble`]: contiguous run of same-sender events
//! - [`BubbleList`]: ordered bubbles plus the aggregation, update and removal
//!   paths
//! - [`Environment`]: clock abstraction for deterministic testing

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod bubble;
mod bubble_list;
pub mod env;
mod error;
mod event;
mod filter;
mod formatter;
mod room_state;

pub use bubble::{Bubble, BubbleDataKind};
pub use bubble_list::{AggregationContext, BubbleList};
pub use env::Environment;
pub use error::{AggregationError, FormatError};
pub use event::{
    Event, EventId, EventKind, EventType, Membership, MessageContent, MessageType, RoomId,
    SendState, UserId,
};
pub use filter::EventFilter;
pub use formatter::{DefaultFormatter, EventFormatter};
pub use room_state::{MemberProfile, RoomStateSnapshot};
