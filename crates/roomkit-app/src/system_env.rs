//! Production environment backed by the wall clock.
//!
//! Local echoes are timestamped with [`SystemEnv::now_millis`], so a pending
//! message sorts with server events that carry real origin timestamps.

use roomkit_core::Environment;

/// Environment reading `SystemTime`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    #[allow(clippy::disallowed_methods)]
    fn now_millis(&self) -> u64 {
        // A clock before the Unix epoch reads as zero.
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or_default()
    }
}
