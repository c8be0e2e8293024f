//! Invariant checking for published timelines.
//!
//! Invariants are properties every [`Timeline`] the worker publishes must
//! satisfy, whatever sequence of live events, pages, sends and removals
//! produced it. Property tests run the registry after each step.
//!
//! # Usage
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! registry.assert_all(&data_source.snapshot().unwrap(), "after page");
//! ```

mod checks;

pub use checks::{
    AttachmentsStandAlone, LastMessageDisplayed, NoDuplicateEvents, NonEmptyBubbles,
    SameSenderFlagConsistent,
};
use roomkit_app::Timeline;

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property checked against a published timeline.
pub trait Invariant: Send + Sync {
    /// Invariant name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant against `timeline`.
    fn check(&self, timeline: &Timeline) -> InvariantResult;
}

/// Registry of invariants to check.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Registry with every standard timeline invariant.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(NonEmptyBubbles);
        registry.add(NoDuplicateEvents);
        registry.add(SameSenderFlagConsistent);
        registry.add(AttachmentsStandAlone);
        registry.add(LastMessageDisplayed);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants. Returns every violation found.
    pub fn check_all(&self, timeline: &Timeline) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(timeline).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Check all invariants, panicking with `context` on violation.
    #[allow(clippy::panic)]
    pub fn assert_all(&self, timeline: &Timeline, context: &str) {
        if let Err(violations) = self.check_all(timeline) {
            let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("invariant violation {context}:\n  {}", messages.join("\n  "));
        }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_has_invariants() {
        assert_eq!(InvariantRegistry::standard().len(), 5);
    }

    #[test]
    fn empty_timeline_passes() {
        assert!(InvariantRegistry::standard().check_all(&Timeline::default()).is_ok());
    }
}
