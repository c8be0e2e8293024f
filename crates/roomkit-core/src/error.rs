//! Error types for the timeline core.
//!
//! None of these errors abort the processing pipeline. A malformed event
//! degrades to a placeholder bubble; the error only feeds logging.

use thiserror::Error;

use crate::EventId;

/// Errors produced while converting an event into display text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// Text-bearing message without a body.
    #[error("message {0} has no body")]
    MissingBody(EventId),

    /// Event kind the formatter cannot express as text.
    #[error("event {event_id} of type {event_type} cannot be formatted")]
    Unsupported {
        /// Offending event.
        event_id: EventId,
        /// Its type tag.
        event_type: String,
    },
}

/// Errors detected while aggregating an event into a bubble.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregationError {
    /// Event carries no sender.
    #[error("event {0} has no sender")]
    MissingSender(EventId),

    /// Formatting the event failed.
    #[error(transparent)]
    Format(#[from] FormatError),
}
