//! Timestamp resynchronization
//!
//! Readings carry no time of their own. The receiver reconstructs each
//! reading's time from the nearest preceding anchor plus its offset within the
//! epoch divided by the sampling rate, so an anchor is re-emitted every
//! `RESYNC_PERIOD` samples to bound oscillator drift.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Samples between consecutive timestamp anchors
pub const RESYNC_PERIOD: u64 = 1000;

/// True iff the sample at `sample_index` opens a new epoch.
///
/// Index 0 qualifies, so every session opens with an anchor.
pub fn should_emit_anchor(sample_index: u64) -> bool {
    sample_index % RESYNC_PERIOD == 0
}

/// Number of samples processed since the logging epoch began.
///
/// Only ever advances; pausing and flushing leave it untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleCounter(u64);

impl SampleCounter {
    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn advance(&mut self, samples: usize) {
        self.0 = self.0.saturating_add(samples as u64);
    }
}

/// Decides once per batch whether an anchor precedes it
#[derive(Debug, Clone)]
pub struct TimestampSynchronizer {
    period: u64,
    counter: SampleCounter,
}

impl Default for TimestampSynchronizer {
    fn default() -> Self {
        Self::new(RESYNC_PERIOD)
    }
}

impl TimestampSynchronizer {
    /// Create a synchronizer with a custom period (must be non-zero)
    pub fn new(period: u64) -> Self {
        Self {
            period: period.max(1),
            counter: SampleCounter::default(),
        }
    }

    pub fn period(&self) -> u64 {
        self.period
    }

    pub fn counter(&self) -> SampleCounter {
        self.counter
    }

    /// Whether an anchor must precede a batch of `batch_len` samples starting
    /// at the current counter.
    ///
    /// Checked once per batch on the batch's first sample index only. A short
    /// batch that shifts alignment delays the next anchor to the next batch
    /// that starts on a multiple of the period.
    pub fn anchor_due(&self, batch_len: usize) -> bool {
        if batch_len == 0 {
            return false;
        }
        let first = self.counter.value();
        let due = first % self.period == 0;
        debug!(sample_index = first, batch_len, due, "anchor decision");
        due
    }

    /// Whether a batch of `batch_len` samples leaves the next batch off the
    /// period grid for batches of `expected_len`
    pub fn breaks_alignment(&self, batch_len: usize, expected_len: usize) -> bool {
        let next = self.counter.value().saturating_add(batch_len as u64);
        expected_len > 0 && next % expected_len as u64 != 0
    }

    /// Account for a processed batch
    pub fn advance(&mut self, batch_len: usize) {
        self.counter.advance(batch_len);
    }

    /// Start a new logging epoch
    pub fn reset(&mut self) {
        self.counter = SampleCounter::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_first_sample_emits_anchor() {
        assert!(should_emit_anchor(0));
        assert!(!should_emit_anchor(1));
        assert!(!should_emit_anchor(999));
        assert!(should_emit_anchor(1000));
        assert!(should_emit_anchor(2000));
    }

    #[test]
    fn test_aligned_batches_match_index_rule() {
        let mut sync = TimestampSynchronizer::default();
        let mut anchored = Vec::new();
        for _ in 0..100 {
            if sync.anchor_due(25) {
                anchored.push(sync.counter().value());
            }
            sync.advance(25);
        }
        assert_eq!(anchored, vec![0, 1000, 2000]);
        assert_eq!(sync.counter().value(), 2500);
    }

    #[test]
    fn test_batch_crossing_boundary_gets_no_anchor() {
        let mut sync = TimestampSynchronizer::default();
        for _ in 0..39 {
            sync.advance(25);
        }
        assert!(sync.breaks_alignment(15, 25));
        sync.advance(15);

        assert_eq!(sync.counter().value(), 990);
        assert!(!should_emit_anchor(990));
        assert!(!sync.anchor_due(25));
        assert!(!sync.anchor_due(10));
        assert!(!sync.anchor_due(0));
        assert!(!sync.breaks_alignment(10, 25));
    }

    #[test]
    fn test_anchor_due_matches_index_rule_for_any_batch() {
        let mut sync = TimestampSynchronizer::default();
        for len in [25, 25, 7, 25, 13, 900, 5, 25] {
            assert_eq!(sync.anchor_due(len), should_emit_anchor(sync.counter().value()));
            sync.advance(len);
        }
    }

    #[test]
    fn test_reset_starts_new_epoch() {
        let mut sync = TimestampSynchronizer::new(50);
        sync.advance(75);
        assert!(!sync.anchor_due(25));
        sync.reset();
        assert_eq!(sync.counter().value(), 0);
        assert!(sync.anchor_due(25));
    }

    proptest! {
        #[test]
        fn prop_anchor_iff_multiple_of_period(i in any::<u64>()) {
            prop_assert_eq!(should_emit_anchor(i), i % 1000 == 0);
        }

        #[test]
        fn prop_counter_non_decreasing(steps in proptest::collection::vec(0usize..50, 0..64)) {
            let mut counter = SampleCounter::default();
            let mut previous = counter.value();
            for step in steps {
                counter.advance(step);
                prop_assert!(counter.value() >= previous);
                previous = counter.value();
            }
        }
    }
}
