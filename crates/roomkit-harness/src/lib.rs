//! Simulation harness for roomkit.
//!
//! In-memory implementations of the [`roomkit_app::Session`] and
//! [`roomkit_core::Environment`] traits for deterministic tests of the room
//! data source: gated requests, queued failures, a manual clock.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks structural properties of every published
//! timeline. Use [`InvariantRegistry::standard()`] after each step of a
//! scenario or property test.
//!
//! # Transcripts
//!
//! [`Transcript`] loads a recorded room from JSON; [`render_timeline`]
//! renders a timeline as plain text for snapshot tests and the replay tool.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod sim_env;
pub mod sim_session;
pub mod transcript;

pub use invariants::{
    AttachmentsStandAlone, Invariant, InvariantRegistry, InvariantResult, LastMessageDisplayed,
    NoDuplicateEvents, NonEmptyBubbles, SameSenderFlagConsistent, Violation,
};
pub use sim_env::SimEnv;
pub use sim_session::{GateKind, SimCalls, SimSession};
pub use transcript::{Transcript, TranscriptMember, render_timeline};
