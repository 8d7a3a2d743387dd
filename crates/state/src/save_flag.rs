//! The process-wide save flag: a single boolean gating the persistence
//! pipeline, mutated only by an inbound client control message.

use std::sync::atomic::{AtomicBool, Ordering};

/// A process-wide toggle. Reads and writes use relaxed ordering: the
/// specification only requires eventual consistency across workers, not a
/// synchronization point.
#[derive(Debug)]
pub struct SaveFlag(AtomicBool);

impl SaveFlag {
    /// Creates a new save flag with the given initial value.
    pub fn new(initial: bool) -> Self {
        Self(AtomicBool::new(initial))
    }

    /// Returns the current value.
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Sets the flag to `value`.
    pub fn set(&self, value: bool) {
        self.0.store(value, Ordering::Relaxed);
        tracing::info!(save = value, "save flag changed");
    }
}

impl Default for SaveFlag {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_to_false() {
        assert!(!SaveFlag::default().is_set());
    }

    #[test]
    fn toggles() {
        let flag = SaveFlag::new(false);
        flag.set(true);
        assert!(flag.is_set());
        flag.set(false);
        assert!(!flag.is_set());
    }
}
