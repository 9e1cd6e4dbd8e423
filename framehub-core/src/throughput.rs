//! Producer-side send rate over a sliding window, plus a smoothed
//! request/reply round-trip time.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Weight of a new round-trip sample in the moving average.
const RTT_ALPHA: f64 = 0.125;

pub struct ThroughputMeter {
    /// `(sent at, payload bytes)`, oldest first.
    window: VecDeque<(Instant, u64)>,
    span: Duration,
    window_bytes: u64,
    round_trip: Option<Duration>,
}

impl ThroughputMeter {
    /// A meter averaging over the last second.
    pub fn new() -> Self {
        Self::with_span(Duration::from_secs(1))
    }

    pub fn with_span(span: Duration) -> Self {
        Self {
            window: VecDeque::with_capacity(128),
            span,
            window_bytes: 0,
            round_trip: None,
        }
    }

    /// Note one frame of `bytes` leaving now.
    pub fn record(&mut self, bytes: u64) {
        self.record_at(Instant::now(), bytes);
    }

    pub fn record_at(&mut self, when: Instant, bytes: u64) {
        self.window.push_back((when, bytes));
        self.window_bytes += bytes;
        while let Some(&(oldest, size)) = self.window.front() {
            if when.duration_since(oldest) <= self.span {
                break;
            }
            self.window.pop_front();
            self.window_bytes = self.window_bytes.saturating_sub(size);
        }
    }

    /// Fold one acknowledgment delay into the smoothed round trip.
    pub fn record_round_trip(&mut self, sample: Duration) {
        self.round_trip = Some(match self.round_trip {
            None => sample,
            Some(current) => current.mul_f64(1.0 - RTT_ALPHA) + sample.mul_f64(RTT_ALPHA),
        });
    }

    /// Bytes per second across the window. Zero with fewer than two samples.
    ///
    /// The oldest sample only opens the window, so its bytes are not counted.
    pub fn bytes_per_sec(&self) -> f64 {
        let opening = self.window.front().map_or(0, |&(_, size)| size);
        self.per_sec(self.window_bytes.saturating_sub(opening) as f64)
    }

    /// Frames per second across the window: intervals over time spanned.
    pub fn frames_per_sec(&self) -> f64 {
        self.per_sec(self.window.len().saturating_sub(1) as f64)
    }

    pub fn round_trip(&self) -> Option<Duration> {
        self.round_trip
    }

    pub fn sample_count(&self) -> usize {
        self.window.len()
    }

    fn per_sec(&self, amount: f64) -> f64 {
        match (self.window.front(), self.window.back()) {
            (Some((first, _)), Some((last, _))) if last > first => {
                amount / last.duration_since(*first).as_secs_f64()
            }
            _ => 0.0,
        }
    }
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new()
    }
}
