//! Delta extraction from cumulative counters
//!
//! Step counters report steps since boot and exercise sensors report calories
//! since exercise start. Only the positive increase between two readings is
//! activity; the first reading is just a baseline.

use log::debug;

#[derive(Debug, Clone, Default)]
pub struct DeltaExtractor {
    previous: Option<f64>,
    resets: u64,
}

impl DeltaExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next cumulative total.
    ///
    /// Returns the positive increase since the previous reading, or `None` for
    /// the first reading, a stall, or a decrease. A decrease is treated as a
    /// counter reset: the baseline moves down to the new total so later
    /// increases are measured from there.
    pub fn observe(&mut self, total: f64) -> Option<f64> {
        if !total.is_finite() {
            return None;
        }

        let Some(previous) = self.previous else {
            self.previous = Some(total);
            return None;
        };

        let delta = total - previous;
        if delta > 0.0 {
            self.previous = Some(total);
            Some(delta)
        } else {
            if delta < 0.0 {
                debug!("Counter reset: {previous} -> {total}");
                self.resets += 1;
                self.previous = Some(total);
            }
            None
        }
    }

    pub fn baseline(&self) -> Option<f64> {
        self.previous
    }

    /// Number of decreases seen so far
    pub fn resets(&self) -> u64 {
        self.resets
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}
