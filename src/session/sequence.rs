//! Per-channel sequence numbers.

use std::collections::HashMap;

/// One wrapping 8-bit counter per buffer id.
///
/// Counters start at 0 the first time a buffer id is used.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    counters: HashMap<u8, u8>,
}

impl SequenceTracker {
    /// Creates a tracker with no counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next sequence number for `buffer_id` and advances it.
    pub fn next(&mut self, buffer_id: u8) -> u8 {
        let counter = self.counters.entry(buffer_id).or_insert(0);
        let current = *counter;
        *counter = counter.wrapping_add(1);
        current
    }

    /// Returns the number the next call to [`next`](Self::next) would yield.
    #[must_use]
    pub fn peek(&self, buffer_id: u8) -> u8 {
        self.counters.get(&buffer_id).copied().unwrap_or(0)
    }

    /// Forgets every counter.
    pub fn reset(&mut self) {
        self.counters.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wraparound() {
        let mut tracker = SequenceTracker::new();
        for expected in 0..=255u8 {
            assert_eq!(tracker.next(0x0b), expected);
        }
        assert_eq!(tracker.next(0x0b), 0);
        assert_eq!(tracker.peek(0x0b), 1);
    }

    #[test]
    fn test_independent_counters() {
        let mut tracker = SequenceTracker::new();
        assert_eq!(tracker.next(0x0a), 0);
        assert_eq!(tracker.next(0x0a), 1);
        assert_eq!(tracker.next(0x0b), 0);
        assert_eq!(tracker.next(0x0a), 2);
        assert_eq!(tracker.peek(0x0c), 0);

        tracker.reset();
        assert_eq!(tracker.next(0x0a), 0);
    }
}
