//! Event to display text conversion.

use crate::{Event, EventKind, FormatError, Membership, MessageType, RoomStateSnapshot};

/// Converts an event into the text shown in its bubble.
///
/// Called on the processing worker every time a bubble's derived fields are
/// recomputed. Implementations must be pure.
pub trait EventFormatter: Send + Sync {
    /// Display text for `event` given the room state at aggregation time.
    fn format(&self, event: &Event, state: &RoomStateSnapshot) -> Result<String, FormatError>;
}

/// Plain-text formatter used when the UI layer supplies none.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFormatter;

impl DefaultFormatter {
    fn sender_name(event: &Event, state: &RoomStateSnapshot) -> String {
        event.sender.as_ref().map_or_else(|| "unknown".to_owned(), |s| state.display_name(s))
    }
}

impl EventFormatter for DefaultFormatter {
    fn format(&self, event: &Event, state: &RoomStateSnapshot) -> Result<String, FormatError> {
        if event.redacted {
            return Ok("<redacted>".to_owned());
        }

        match &event.kind {
            EventKind::Message(content) => {
                let body = || {
                    content.body.clone().ok_or_else(|| FormatError::MissingBody(event.event_id.clone()))
                };
                match content.msgtype {
                    MessageType::Text | MessageType::Notice => body(),
                    MessageType::Emote => {
                        Ok(format!("* {} {}", Self::sender_name(event, state), body()?))
                    },
                    MessageType::Image => Ok("image attachment".to_owned()),
                    MessageType::Video => Ok("video attachment".to_owned()),
                    MessageType::Audio => Ok("audio attachment".to_owned()),
                    MessageType::Location => Ok("location attachment".to_owned()),
                    MessageType::File => Ok("file attachment".to_owned()),
                }
            },
            EventKind::Membership { target, membership, display_name, .. } => {
                let name = display_name.clone().unwrap_or_else(|| state.display_name(target));
                let verb = match membership {
                    Membership::Join => "joined",
                    Membership::Leave => "left",
                    Membership::Invite => "was invited",
                    Membership::Ban => "was banned",
                };
                Ok(format!("{name} {verb}"))
            },
            EventKind::RoomName { name } => Ok(format!(
                "{} changed the room name to {name}",
                Self::sender_name(event, state)
            )),
            EventKind::Topic { topic } => {
                Ok(format!("{} changed the topic to {topic}", Self::sender_name(event, state)))
            },
            EventKind::Redaction { .. } | EventKind::Custom { .. } => {
                Err(FormatError::Unsupported {
                    event_id: event.event_id.clone(),
                    event_type: event.event_type().to_string(),
                })
            },
        }
    }
}
