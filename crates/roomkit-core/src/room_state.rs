//! Point-in-time room membership data.
//!
//! Bubbles copy the sender's display name and avatar from the snapshot that
//! was current when their first event was aggregated. Later profile changes
//! only affect bubbles created afterwards.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{Event, EventKind, Membership, RoomId, UserId};

/// Profile of one room member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberProfile {
    /// Display name, if set.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Avatar URL, if set.
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// Current membership.
    pub membership: Membership,
}

/// Read-only view of a room's membership at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomStateSnapshot {
    /// Room this snapshot describes.
    pub room_id: RoomId,
    /// Known members.
    #[serde(default)]
    pub members: HashMap<UserId, MemberProfile>,
}

impl RoomStateSnapshot {
    /// Create a snapshot with no members.
    pub fn new(room_id: RoomId) -> Self {
        Self { room_id, members: HashMap::new() }
    }

    /// Add or replace a joined member.
    #[must_use]
    pub fn with_member(mut self, user_id: UserId, display_name: Option<&str>) -> Self {
        self.members.insert(user_id, MemberProfile {
            display_name: display_name.map(str::to_owned),
            avatar_url: None,
            membership: Membership::Join,
        });
        self
    }

    /// Display name of `user_id`, falling back to the raw identifier.
    pub fn display_name(&self, user_id: &UserId) -> String {
        self.members
            .get(user_id)
            .and_then(|m| m.display_name.clone())
            .unwrap_or_else(|| user_id.to_string())
    }

    /// Avatar URL of `user_id`.
    pub fn avatar_url(&self, user_id: &UserId) -> Option<String> {
        self.members.get(user_id).and_then(|m| m.avatar_url.clone())
    }

    /// Fold a membership event into the snapshot.
    ///
    /// Non-membership events are ignored.
    pub fn apply(&mut self, event: &Event) {
        if let EventKind::Membership { target, membership, display_name, avatar_url } = &event.kind
        {
            self.members.insert(target.clone(), MemberProfile {
                display_name: display_name.clone(),
                avatar_url: avatar_url.clone(),
                membership: *membership,
            });
        }
    }
}
