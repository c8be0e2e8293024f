//! JSON room transcripts and plain-text timeline rendering.
//!
//! A transcript describes a room (members, stored history, events delivered
//! live after the data source is ready, messages to send). The replay tool
//! and snapshot tests load one into a [`SimSession`] and render the
//! resulting [`Timeline`] with [`render_timeline`].

use std::fmt::Write as _;

use roomkit_app::Timeline;
use roomkit_core::{Event, RoomId, RoomStateSnapshot, SendState, UserId};
use serde::{Deserialize, Serialize};

use crate::SimSession;

/// A room member listed in a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptMember {
    /// Member identifier.
    pub user_id: UserId,
    /// Display name, if set.
    #[serde(default)]
    pub display_name: Option<String>,
}

/// A recorded room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    /// User the session belongs to.
    pub local_user: UserId,
    /// Room identifier.
    pub room_id: RoomId,
    /// Members known before any event.
    #[serde(default)]
    pub members: Vec<TranscriptMember>,
    /// Stored history, chronological.
    #[serde(default)]
    pub history: Vec<Event>,
    /// Events delivered live once the data source is ready.
    #[serde(default)]
    pub live: Vec<Event>,
    /// Text messages sent by the local user after the live events.
    #[serde(default)]
    pub send: Vec<String>,
}

impl Transcript {
    /// Parse a transcript from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Room state before any history event.
    pub fn room_state(&self) -> RoomStateSnapshot {
        self.members.iter().fold(RoomStateSnapshot::new(self.room_id.clone()), |state, member| {
            state.with_member(member.user_id.clone(), member.display_name.as_deref())
        })
    }

    /// Session serving this room. Live and send entries are not applied.
    pub fn session(&self) -> SimSession {
        let session = SimSession::new(self.local_user.clone());
        let mut state = self.room_state();
        for event in &self.history {
            state.apply(event);
        }
        session.add_room(state, self.history.clone());
        session
    }
}

/// Render `timeline` one bubble per block.
///
/// ```text
/// [0] Alice <
///     hello
///     how are you?
/// [1] me > (pending)
///     fine
/// ```
///
/// `<` marks incoming and `>` outgoing bubbles. Flags follow in
/// parentheses.
pub fn render_timeline(timeline: &Timeline) -> String {
    let mut out = String::new();
    for (index, bubble) in timeline.bubbles.iter().enumerate() {
        let direction = if bubble.is_incoming() { '<' } else { '>' };
        let _ = write!(out, "[{index}] {} {direction}", bubble.sender_display_name());

        let mut flags = Vec::new();
        if bubble.is_attachment() {
            flags.push("attachment");
        }
        if bubble.is_placeholder() {
            flags.push("placeholder");
        }
        if bubble.is_same_sender_as_previous() {
            flags.push("continued");
        }
        if bubble.is_typing() {
            flags.push("typing");
        }
        if bubble.events().any(|e| e.send_state == SendState::Pending) {
            flags.push("pending");
        }
        if bubble.events().any(|e| e.send_state == SendState::Failed) {
            flags.push("failed");
        }
        if !flags.is_empty() {
            let _ = write!(out, " ({})", flags.join(", "));
        }
        out.push('\n');

        for line in bubble.text().lines() {
            let _ = writeln!(out, "    {line}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON: &str = r#"{
        "local_user": "@me",
        "room_id": "!room",
        "members": [{ "user_id": "@alice", "display_name": "Alice" }],
        "history": [
            {
                "event_id": "$1",
                "sender": "@alice",
                "room_id": "!room",
                "kind": { "type": "message", "msgtype": "text", "body": "hi" },
                "origin_server_ts": 1
            }
        ],
        "send": ["hello back"]
    }"#;

    #[test]
    fn parses_minimal_transcript() {
        let transcript = Transcript::from_json(JSON).unwrap();

        assert_eq!(transcript.local_user, UserId::new("@me"));
        assert_eq!(transcript.history.len(), 1);
        assert_eq!(transcript.history[0].send_state, SendState::Sent);
        assert!(transcript.live.is_empty());
        assert_eq!(transcript.send, ["hello back"]);
        assert_eq!(transcript.room_state().display_name(&UserId::new("@alice")), "Alice");
    }

    #[test]
    fn rejects_unknown_event_kind() {
        let bad = JSON.replace(r#""type": "message""#, r#""type": "poll""#);
        assert!(Transcript::from_json(&bad).is_err());
    }
}
