//! Protocol events as seen by the timeline.
//!
//! The external session owns event storage and decoding. The timeline only
//! needs identity, sender, kind, timestamp and send state. Events are
//! immutable by identity: a local echo keeps its slot in the bubble list and
//! is replaced wholesale once the server confirms it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix of client-synthesized event identifiers.
const LOCAL_ECHO_PREFIX: &str = "local-";

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Event identifier, server-assigned or `local-<n>` for local echoes.
    EventId
);
string_id!(
    /// User identifier.
    UserId
);
string_id!(
    /// Room identifier.
    RoomId
);

impl EventId {
    /// Identifier for the `n`th local echo of a data source.
    pub fn local(n: u64) -> Self {
        Self(format!("{LOCAL_ECHO_PREFIX}{n}"))
    }

    /// True for client-synthesized identifiers.
    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_ECHO_PREFIX)
    }
}

/// Delivery state of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendState {
    /// Local echo awaiting server confirmation.
    Pending,
    /// Confirmed by the server (or received from it).
    #[default]
    Sent,
    /// Sending failed; stays visible until retried or removed.
    Failed,
}

/// Message sub-type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Plain text.
    Text,
    /// Third-person action (`/me`).
    Emote,
    /// Bot-style notice.
    Notice,
    /// Image attachment.
    Image,
    /// Video attachment.
    Video,
    /// Audio attachment.
    Audio,
    /// Shared location.
    Location,
    /// Generic file attachment.
    File,
}

impl MessageType {
    /// True for message types rendered as attachments.
    pub fn is_attachment(self) -> bool {
        matches!(self, Self::Image | Self::Video | Self::Audio | Self::Location | Self::File)
    }
}

/// Content of a room message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    /// Message sub-type.
    pub msgtype: MessageType,
    /// Text body or attachment description.
    #[serde(default)]
    pub body: Option<String>,
    /// Media URL for attachments.
    #[serde(default)]
    pub url: Option<String>,
}

impl MessageContent {
    /// Plain text message.
    pub fn text(body: impl Into<String>) -> Self {
        Self { msgtype: MessageType::Text, body: Some(body.into()), url: None }
    }

    /// Emote message.
    pub fn emote(body: impl Into<String>) -> Self {
        Self { msgtype: MessageType::Emote, body: Some(body.into()), url: None }
    }

    /// Image attachment.
    pub fn image(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self { msgtype: MessageType::Image, body: Some(name.into()), url: Some(url.into()) }
    }
}

/// Membership transition carried by a membership event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Membership {
    /// User joined (or updated their profile while joined).
    Join,
    /// User left or was kicked.
    Leave,
    /// User was invited.
    Invite,
    /// User was banned.
    Ban,
}

/// Kind and payload of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// Room message.
    Message(MessageContent),
    /// Membership change of `target`.
    Membership {
        /// Member whose membership changed.
        target: UserId,
        /// New membership.
        membership: Membership,
        /// Display name after the change.
        #[serde(default)]
        display_name: Option<String>,
        /// Avatar URL after the change.
        #[serde(default)]
        avatar_url: Option<String>,
    },
    /// Room name change.
    RoomName {
        /// New name.
        name: String,
    },
    /// Room topic change.
    Topic {
        /// New topic.
        topic: String,
    },
    /// Redaction of an earlier event.
    Redaction {
        /// Redacted event.
        redacts: EventId,
    },
    /// Any other event type.
    Custom {
        /// Protocol type string.
        event_type: String,
    },
}

/// Filter key derived from an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// [`MessageType::Text`] message.
    Text,
    /// [`MessageType::Emote`] message.
    Emote,
    /// [`MessageType::Notice`] message.
    Notice,
    /// [`MessageType::Image`] message.
    Image,
    /// [`MessageType::Video`] message.
    Video,
    /// [`MessageType::Audio`] message.
    Audio,
    /// [`MessageType::Location`] message.
    Location,
    /// [`MessageType::File`] message.
    File,
    /// Membership change.
    Membership,
    /// Room name change.
    RoomName,
    /// Topic change.
    Topic,
    /// Redaction.
    Redaction,
    /// Custom protocol type.
    Custom(String),
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Emote => f.write_str("emote"),
            Self::Notice => f.write_str("notice"),
            Self::Image => f.write_str("image"),
            Self::Video => f.write_str("video"),
            Self::Audio => f.write_str("audio"),
            Self::Location => f.write_str("location"),
            Self::File => f.write_str("file"),
            Self::Membership => f.write_str("membership"),
            Self::RoomName => f.write_str("room_name"),
            Self::Topic => f.write_str("topic"),
            Self::Redaction => f.write_str("redaction"),
            Self::Custom(t) => f.write_str(t),
        }
    }
}

/// A protocol event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event identifier.
    pub event_id: EventId,
    /// Sender. `None` marks a malformed event.
    #[serde(default)]
    pub sender: Option<UserId>,
    /// Room the event belongs to.
    pub room_id: RoomId,
    /// Kind and payload.
    pub kind: EventKind,
    /// Server timestamp in milliseconds (local clock for echoes).
    #[serde(default)]
    pub origin_server_ts: u64,
    /// Delivery state.
    #[serde(default)]
    pub send_state: SendState,
    /// Content was stripped by a redaction.
    #[serde(default)]
    pub redacted: bool,
}

impl Event {
    /// Build a sent room message.
    pub fn message(
        event_id: impl Into<EventId>,
        sender: impl Into<UserId>,
        room_id: impl Into<RoomId>,
        content: MessageContent,
        origin_server_ts: u64,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            sender: Some(sender.into()),
            room_id: room_id.into(),
            kind: EventKind::Message(content),
            origin_server_ts,
            send_state: SendState::Sent,
            redacted: false,
        }
    }

    /// Build a pending local echo for a message about to be sent.
    pub fn local_echo(
        event_id: EventId,
        sender: UserId,
        room_id: RoomId,
        content: MessageContent,
        now_millis: u64,
    ) -> Self {
        Self {
            event_id,
            sender: Some(sender),
            room_id,
            kind: EventKind::Message(content),
            origin_server_ts: now_millis,
            send_state: SendState::Pending,
            redacted: false,
        }
    }

    /// Filter key of this event.
    pub fn event_type(&self) -> EventType {
        match &self.kind {
            EventKind::Message(content) => match content.msgtype {
                MessageType::Text => EventType::Text,
                MessageType::Emote => EventType::Emote,
                MessageType::Notice => EventType::Notice,
                MessageType::Image => EventType::Image,
                MessageType::Video => EventType::Video,
                MessageType::Audio => EventType::Audio,
                MessageType::Location => EventType::Location,
                MessageType::File => EventType::File,
            },
            EventKind::Membership { .. } => EventType::Membership,
            EventKind::RoomName { .. } => EventType::RoomName,
            EventKind::Topic { .. } => EventType::Topic,
            EventKind::Redaction { .. } => EventType::Redaction,
            EventKind::Custom { event_type } => EventType::Custom(event_type.clone()),
        }
    }

    /// True when the event renders as an attachment.
    pub fn is_attachment(&self) -> bool {
        !self.redacted
            && matches!(&self.kind, EventKind::Message(content) if content.msgtype.is_attachment())
    }

    /// Message content, if this is a room message.
    pub fn message_content(&self) -> Option<&MessageContent> {
        match &self.kind {
            EventKind::Message(content) => Some(content),
            _ => None,
        }
    }

    /// Redacted copy: identity and kind tag are kept, content is stripped.
    pub fn redact(&self) -> Self {
        let kind = match &self.kind {
            EventKind::Message(content) => {
                EventKind::Message(MessageContent { msgtype: content.msgtype, body: None, url: None })
            },
            other => other.clone(),
        };
        Self { kind, redacted: true, ..self.clone() }
    }

    /// Copy of this event with a new delivery state.
    pub fn with_send_state(&self, send_state: SendState) -> Self {
        Self { send_state, ..self.clone() }
    }
}
