//! BPM variability estimator
//!
//! Population standard deviation of heart-rate samples over a short window.
//! This is a proxy for heart-rate variability: true HRV needs inter-beat
//! intervals, which the BPM sensor path does not provide. It is not a clinical
//! measure.

use serde::{Deserialize, Serialize};

/// Minimum samples before a statistic is produced
pub const MIN_VARIABILITY_SAMPLES: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VariabilityStats {
    pub mean: f64,
    pub std_dev: f64,
    pub sample_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum VariabilityEstimate {
    /// Not enough samples for a meaningful statistic
    Insufficient {
        sample_count: usize,
        min_required: usize,
    },
    Stats(VariabilityStats),
}

impl VariabilityEstimate {
    pub fn stats(&self) -> Option<&VariabilityStats> {
        match self {
            VariabilityEstimate::Stats(stats) => Some(stats),
            VariabilityEstimate::Insufficient { .. } => None,
        }
    }
}

/// Mean and population standard deviation with the default minimum of 12 samples
pub fn compute_stats(samples: &[f64]) -> VariabilityEstimate {
    compute_stats_with_min(samples, MIN_VARIABILITY_SAMPLES)
}

pub fn compute_stats_with_min(samples: &[f64], min_required: usize) -> VariabilityEstimate {
    let n = samples.len();
    if n == 0 || n < min_required {
        return VariabilityEstimate::Insufficient {
            sample_count: n,
            min_required,
        };
    }

    let count = n as f64;
    let mean = samples.iter().sum::<f64>() / count;
    let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / count;

    VariabilityEstimate::Stats(VariabilityStats {
        mean,
        std_dev: variance.sqrt(),
        sample_count: n,
    })
}
