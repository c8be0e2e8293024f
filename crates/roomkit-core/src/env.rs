//! Environment abstraction for deterministic testing.
//!
//! Decouples timeline logic from the system clock. Local echoes are stamped
//! with [`Environment::now_millis`], so simulation can use a manual clock
//! while production reads wall-clock time.

/// Abstract environment providing time.
///
/// # Invariants
///
/// - `now_millis()` never goes backwards within one execution context.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Current time in milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}
