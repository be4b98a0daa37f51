//! Build sequence sanity tracking.
//!
//! The reader's build sequence must only move forward. A stalled or
//! rewound sequence usually means the collector's cycle management broke;
//! the guard turns that into exactly one warning per incident instead of
//! one per cycle.

/// Tracks the reader's build sequence across planning cycles.
#[derive(Debug, Default)]
pub struct SeqGuard {
    last: u64,
    broken: bool,
}

/// The observable state change of one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqTransition {
    /// Nothing noteworthy.
    None,
    /// The sequence stopped advancing; reported once per incident.
    Broken,
    /// The sequence advanced again after an incident.
    Recovered,
}

impl SeqGuard {
    /// Creates a guard that accepts any first sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one observed sequence number.
    pub fn observe(&mut self, seq: u64) -> SeqTransition {
        if seq > self.last {
            self.last = seq;
            if self.broken {
                self.broken = false;
                return SeqTransition::Recovered;
            }
            return SeqTransition::None;
        }

        if self.broken {
            SeqTransition::None
        } else {
            self.broken = true;
            SeqTransition::Broken
        }
    }
}
