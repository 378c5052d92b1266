//! Rolling time window
//!
//! Holds the samples of one metric that fall inside a fixed horizon. Eviction
//! runs against a watermark (the latest time seen from either a sample or a
//! tick), so a late sample can never move the window backwards.

use crate::types::{Millis, Sample};
use log::debug;
use std::collections::VecDeque;

/// Horizon used for steps-last-hour and calories-last-hour
pub const HOUR_HORIZON_MS: Millis = 3_600_000;

/// Horizon used for the BPM variability window
pub const VARIABILITY_HORIZON_MS: Millis = 60_000;

/// Time-bounded buffer of samples ordered by timestamp
#[derive(Debug, Clone)]
pub struct RollingWindow {
    samples: VecDeque<Sample>,
    horizon_ms: Millis,
    watermark: Option<Millis>,
}

impl RollingWindow {
    pub fn new(horizon_ms: Millis) -> Self {
        Self {
            samples: VecDeque::new(),
            horizon_ms: horizon_ms.max(0),
            watermark: None,
        }
    }

    pub fn horizon_ms(&self) -> Millis {
        self.horizon_ms
    }

    /// Latest time observed by this window
    pub fn watermark(&self) -> Option<Millis> {
        self.watermark
    }

    /// Add a sample and evict with its timestamp as "now".
    ///
    /// Returns `false` when the sample was dropped: non-finite values and
    /// samples already outside the horizon relative to the watermark.
    pub fn add(&mut self, timestamp_ms: Millis, value: f64) -> bool {
        if !value.is_finite() {
            debug!("Dropping non-finite sample at {timestamp_ms}");
            return false;
        }

        let now = self.advance(timestamp_ms);
        if self.is_expired(now, timestamp_ms) {
            debug!("Dropping stale sample at {timestamp_ms} (watermark {now})");
            return false;
        }

        let sample = Sample::new(timestamp_ms, value);
        match self.samples.back() {
            Some(last) if last.timestamp_ms > timestamp_ms => {
                // Late arrival: keep the deque time-ordered
                let position = self
                    .samples
                    .iter()
                    .rposition(|s| s.timestamp_ms <= timestamp_ms)
                    .map_or(0, |i| i + 1);
                self.samples.insert(position, sample);
            }
            _ => self.samples.push_back(sample),
        }

        self.evict_front(now);
        true
    }

    /// Remove every sample older than the horizon relative to `now`
    pub fn evict(&mut self, now: Millis) {
        let now = self.advance(now);
        self.evict_front(now);
    }

    fn advance(&mut self, now: Millis) -> Millis {
        let now = self.watermark.map_or(now, |w| w.max(now));
        self.watermark = Some(now);
        now
    }

    fn is_expired(&self, now: Millis, timestamp_ms: Millis) -> bool {
        now.saturating_sub(timestamp_ms) > self.horizon_ms
    }

    fn evict_front(&mut self, now: Millis) {
        while let Some(front) = self.samples.front() {
            if !self.is_expired(now, front.timestamp_ms) {
                break;
            }
            self.samples.pop_front();
        }
    }

    pub fn sum(&self) -> f64 {
        self.samples.iter().fold(0.0, |acc, s| acc + s.value)
    }

    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.value).collect()
    }

    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.watermark = None;
    }
}
