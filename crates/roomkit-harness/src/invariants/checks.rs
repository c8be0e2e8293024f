//! Standard timeline invariants.

use std::collections::HashSet;

use roomkit_app::Timeline;

use super::{Invariant, InvariantResult, Violation};

/// A bubble in the list never has an empty event list.
pub struct NonEmptyBubbles;

impl Invariant for NonEmptyBubbles {
    fn name(&self) -> &'static str {
        "non_empty_bubbles"
    }

    fn check(&self, timeline: &Timeline) -> InvariantResult {
        match timeline.bubbles.iter().position(|b| b.event_count() == 0) {
            Some(index) => Err(Violation {
                invariant: self.name(),
                message: format!("bubble {index} has no events"),
            }),
            None => Ok(()),
        }
    }
}

/// Each event identifier appears in exactly one slot.
pub struct NoDuplicateEvents;

impl Invariant for NoDuplicateEvents {
    fn name(&self) -> &'static str {
        "no_duplicate_events"
    }

    fn check(&self, timeline: &Timeline) -> InvariantResult {
        let mut seen = HashSet::new();
        for (index, bubble) in timeline.bubbles.iter().enumerate() {
            for event in bubble.events() {
                if !seen.insert(event.event_id.clone()) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!("event {} repeated in bubble {index}", event.event_id),
                    });
                }
            }
        }
        Ok(())
    }
}

/// `is_same_sender_as_previous` agrees with the actual predecessor.
pub struct SameSenderFlagConsistent;

impl Invariant for SameSenderFlagConsistent {
    fn name(&self) -> &'static str {
        "same_sender_flag_consistent"
    }

    fn check(&self, timeline: &Timeline) -> InvariantResult {
        let mut previous = None;
        for (index, bubble) in timeline.bubbles.iter().enumerate() {
            let expected = previous.is_some_and(|prev| bubble.has_same_sender_as(prev));
            if bubble.is_same_sender_as_previous() != expected {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "bubble {index}: flag {} but predecessor says {expected}",
                        bubble.is_same_sender_as_previous()
                    ),
                });
            }
            previous = Some(bubble.as_ref());
        }
        Ok(())
    }
}

/// Attachment bubbles hold exactly one event.
pub struct AttachmentsStandAlone;

impl Invariant for AttachmentsStandAlone {
    fn name(&self) -> &'static str {
        "attachments_stand_alone"
    }

    fn check(&self, timeline: &Timeline) -> InvariantResult {
        for (index, bubble) in timeline.bubbles.iter().enumerate() {
            if bubble.is_attachment() && bubble.event_count() != 1 {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "attachment bubble {index} holds {} events",
                        bubble.event_count()
                    ),
                });
            }
        }
        Ok(())
    }
}

/// The last message, when set, is displayed.
pub struct LastMessageDisplayed;

impl Invariant for LastMessageDisplayed {
    fn name(&self) -> &'static str {
        "last_message_displayed"
    }

    fn check(&self, timeline: &Timeline) -> InvariantResult {
        match &timeline.last_message {
            Some(last) if timeline.bubbles.event(&last.event_id).is_none() => Err(Violation {
                invariant: self.name(),
                message: format!("last message {} is not in any bubble", last.event_id),
            }),
            _ => Ok(()),
        }
    }
}
