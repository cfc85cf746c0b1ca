use std::{collections::VecDeque, time::Duration};

use quanta::Instant;

const DEFAULT_SAMPLE_CAPACITY: usize = 1024;

/// Estimates how long the host's event loop takes to get around to deferred work.
///
/// At the start of every loop iteration the host marks the monitor and enqueues a deferred callback. When that
/// callback finally runs, the time elapsed since the mark is recorded as one sample. The mean of all samples in the
/// current flush window approximates how contended the loop is.
///
/// Samples are held in a bounded buffer: when it is full, the oldest sample is discarded. This keeps memory flat while
/// no flushes are happening (for example, while disconnected), and the next flush still sees the most recent samples.
#[derive(Debug)]
pub struct LoopLagMonitor {
    last_mark: Option<Instant>,
    samples: VecDeque<Duration>,
    capacity: usize,
}

impl LoopLagMonitor {
    /// Creates a new `LoopLagMonitor` with the default sample capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SAMPLE_CAPACITY)
    }

    /// Creates a new `LoopLagMonitor` that holds at most `capacity` samples.
    ///
    /// A capacity of zero is treated as one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { last_mark: None, samples: VecDeque::new(), capacity }
    }

    /// Marks the start of a loop iteration.
    ///
    /// The mark only ever moves forward: a timestamp earlier than the current mark is ignored.
    pub fn mark_iteration_start(&mut self, now: Instant) {
        match self.last_mark {
            Some(last) if now < last => {}
            _ => self.last_mark = Some(now),
        }
    }

    /// Records the delay between the most recent mark and `now`.
    ///
    /// Does nothing if no mark has been taken yet.
    pub fn record_sample(&mut self, now: Instant) {
        let Some(last_mark) = self.last_mark else {
            return;
        };

        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(now.saturating_duration_since(last_mark));
    }

    /// Returns the mean of the current samples, or zero if there are none.
    pub fn average(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }

        let total: Duration = self.samples.iter().sum();
        total / self.samples.len() as u32
    }

    /// Returns the mean of the current samples and starts a new window.
    ///
    /// The sample buffer is cleared, but the iteration mark is kept.
    pub fn average_and_reset(&mut self) -> Duration {
        let average = self.average();
        self.samples.clear();
        average
    }

    /// Clears both the samples and the iteration mark.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.last_mark = None;
    }

    /// Returns the number of samples in the current window.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if the current window has no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl Default for LoopLagMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use quanta::Clock;

    use super::LoopLagMonitor;

    #[test]
    fn empty_average_is_zero() {
        let mut monitor = LoopLagMonitor::new();
        assert_eq!(monitor.average_and_reset(), Duration::ZERO);
    }

    #[test]
    fn record_without_mark_is_ignored() {
        let (clock, _mock) = Clock::mock();
        let mut monitor = LoopLagMonitor::new();

        monitor.record_sample(clock.now());
        assert!(monitor.is_empty());
    }

    #[test]
    fn averages_samples_in_window() {
        let (clock, mock) = Clock::mock();
        let mut monitor = LoopLagMonitor::new();

        monitor.mark_iteration_start(clock.now());
        mock.increment(Duration::from_millis(10));
        monitor.record_sample(clock.now());

        monitor.mark_iteration_start(clock.now());
        mock.increment(Duration::from_millis(15));
        monitor.record_sample(clock.now());

        assert_eq!(monitor.len(), 2);
        assert_eq!(monitor.average_and_reset(), Duration::from_micros(12_500));
        assert!(monitor.is_empty());
        assert_eq!(monitor.average_and_reset(), Duration::ZERO);
    }

    #[test]
    fn reset_keeps_mark() {
        let (clock, mock) = Clock::mock();
        let mut monitor = LoopLagMonitor::new();

        monitor.mark_iteration_start(clock.now());
        mock.increment(Duration::from_millis(3));
        monitor.record_sample(clock.now());
        assert_eq!(monitor.average_and_reset(), Duration::from_millis(3));

        mock.increment(Duration::from_millis(4));
        monitor.record_sample(clock.now());
        assert_eq!(monitor.average_and_reset(), Duration::from_millis(7));
    }

    #[test]
    fn mark_never_moves_backwards() {
        let (clock, mock) = Clock::mock();
        let mut monitor = LoopLagMonitor::new();

        let earlier = clock.now();
        mock.increment(Duration::from_millis(5));
        let later = clock.now();

        monitor.mark_iteration_start(later);
        monitor.mark_iteration_start(earlier);

        mock.increment(Duration::from_millis(2));
        monitor.record_sample(clock.now());
        assert_eq!(monitor.average(), Duration::from_millis(2));
    }

    #[test]
    fn clear_drops_mark() {
        let (clock, mock) = Clock::mock();
        let mut monitor = LoopLagMonitor::new();

        monitor.mark_iteration_start(clock.now());
        monitor.clear();
        mock.increment(Duration::from_millis(1));
        monitor.record_sample(clock.now());

        assert!(monitor.is_empty());
    }

    #[test]
    fn oldest_samples_are_dropped_at_capacity() {
        let (clock, mock) = Clock::mock();
        let mut monitor = LoopLagMonitor::with_capacity(2);

        for delay in [100, 2, 4] {
            monitor.mark_iteration_start(clock.now());
            mock.increment(Duration::from_millis(delay));
            monitor.record_sample(clock.now());
        }

        assert_eq!(monitor.len(), 2);
        assert_eq!(monitor.average(), Duration::from_millis(3));
    }
}
