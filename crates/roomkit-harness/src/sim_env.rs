//! Simulated environment with a manually advanced clock.
//!
//! Clones share one clock, so a test can hold a handle and move time while
//! the data source stamps local echoes with it.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use roomkit_core::Environment;

/// Environment whose clock only moves when told to.
#[derive(Clone, Debug, Default)]
pub struct SimEnv {
    now: Arc<AtomicU64>,
}

impl SimEnv {
    /// Clock starting at `millis`.
    pub fn at(millis: u64) -> Self {
        Self { now: Arc::new(AtomicU64::new(millis)) }
    }

    /// Move the clock forward by `millis`.
    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::Relaxed);
    }

    /// Set the clock to `millis`.
    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::Relaxed);
    }
}

impl Environment for SimEnv {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_clock() {
        let env = SimEnv::at(1_000);
        let handle = env.clone();

        handle.advance(250);
        assert_eq!(env.now_millis(), 1_250);

        env.set(5);
        assert_eq!(handle.now_millis(), 5);
    }
}
