//! Accelerometer feed
//!
//! The device's accelerometer service is a bounded producer of sample
//! batches. Subscribing yields a `Subscription` capability; the controller
//! keeps it only while recording and hands it back to unsubscribe.

use crate::types::{Sample, SamplingRate};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Proof of an active accelerometer subscription. Not `Clone`.
#[must_use = "dropping a subscription without unsubscribing leaks the feed"]
#[derive(Debug, PartialEq, Eq)]
pub struct Subscription {
    batch_size: usize,
}

impl Subscription {
    /// Issued by feed implementations when a subscription is granted
    pub fn grant(batch_size: usize) -> Self {
        Self { batch_size }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

/// Device accelerometer service
pub trait AccelFeed {
    /// Request a sampling rate; returns the rate the platform actually applied
    fn set_sampling_rate(&mut self, requested: SamplingRate) -> SamplingRate;

    /// Start batch delivery of `batch_size` samples per batch
    fn subscribe(&mut self, batch_size: usize) -> Subscription;

    /// Stop batch delivery
    fn unsubscribe(&mut self, subscription: Subscription);

    /// Next pending batch, for pull-driven event loops.
    ///
    /// Feeds that push batches through `SamplingController::on_batch` can keep
    /// the default.
    fn next_batch(&mut self, _subscription: &Subscription) -> Option<Vec<Sample>> {
        None
    }
}

#[derive(Debug, Default)]
struct ReplayState {
    pending: VecDeque<Sample>,
    forced_rate: Option<SamplingRate>,
    applied_rate: Option<SamplingRate>,
    subscribed: bool,
    subscriptions: usize,
}

/// Feed that replays recorded samples. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct ReplayFeed {
    inner: Rc<RefCell<ReplayState>>,
}

impl ReplayFeed {
    pub fn new(samples: impl IntoIterator<Item = Sample>) -> Self {
        let feed = Self::default();
        feed.inner.borrow_mut().pending.extend(samples);
        feed
    }

    /// Ignore requested rates and always apply `rate`, like a platform that
    /// silently overrides the configuration
    pub fn with_forced_rate(self, rate: SamplingRate) -> Self {
        self.inner.borrow_mut().forced_rate = Some(rate);
        self
    }

    /// Queue more samples
    pub fn push(&self, samples: impl IntoIterator<Item = Sample>) {
        self.inner.borrow_mut().pending.extend(samples);
    }

    pub fn is_subscribed(&self) -> bool {
        self.inner.borrow().subscribed
    }

    /// Number of subscribe calls so far
    pub fn subscriptions(&self) -> usize {
        self.inner.borrow().subscriptions
    }

    pub fn remaining(&self) -> usize {
        self.inner.borrow().pending.len()
    }

    pub fn applied_rate(&self) -> Option<SamplingRate> {
        self.inner.borrow().applied_rate
    }
}

impl AccelFeed for ReplayFeed {
    fn set_sampling_rate(&mut self, requested: SamplingRate) -> SamplingRate {
        let mut state = self.inner.borrow_mut();
        let applied = state.forced_rate.unwrap_or(requested);
        state.applied_rate = Some(applied);
        applied
    }

    fn subscribe(&mut self, batch_size: usize) -> Subscription {
        let mut state = self.inner.borrow_mut();
        state.subscribed = true;
        state.subscriptions += 1;
        Subscription::grant(batch_size)
    }

    fn unsubscribe(&mut self, _subscription: Subscription) {
        self.inner.borrow_mut().subscribed = false;
    }

    fn next_batch(&mut self, subscription: &Subscription) -> Option<Vec<Sample>> {
        let mut state = self.inner.borrow_mut();
        if !state.subscribed || state.pending.is_empty() {
            return None;
        }
        let take = subscription.batch_size().min(state.pending.len());
        Some(state.pending.drain(..take).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn samples(n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| Sample::new(i as i16, 0, 0, i as i64 * 100))
            .collect()
    }

    #[test]
    fn test_replay_batches_in_order() {
        let mut feed = ReplayFeed::new(samples(60));
        let subscription = feed.subscribe(25);

        let sizes: Vec<usize> = std::iter::from_fn(|| feed.next_batch(&subscription))
            .map(|batch| batch.len())
            .collect();
        assert_eq!(sizes, vec![25, 25, 10]);
        feed.unsubscribe(subscription);
    }

    #[test]
    fn test_no_batches_after_unsubscribe() {
        let mut feed = ReplayFeed::new(samples(10));
        let subscription = feed.subscribe(5);
        let probe = Subscription::grant(5);
        feed.unsubscribe(subscription);

        assert!(!feed.is_subscribed());
        assert_eq!(feed.next_batch(&probe), None);
        assert_eq!(feed.remaining(), 10);
    }

    #[test]
    fn test_forced_rate_overrides_request() {
        let mut feed = ReplayFeed::new(Vec::new()).with_forced_rate(SamplingRate::Hz25);
        assert_eq!(feed.set_sampling_rate(SamplingRate::Hz10), SamplingRate::Hz25);
        assert_eq!(feed.applied_rate(), Some(SamplingRate::Hz25));

        let mut plain = ReplayFeed::default();
        assert_eq!(plain.set_sampling_rate(SamplingRate::Hz50), SamplingRate::Hz50);
    }
}
