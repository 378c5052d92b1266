//! Health services adapter
//!
//! Handles measure callbacks (batches of heart-rate data points) and exercise
//! updates (cumulative calories since exercise start). The calories value
//! arrives in several shapes depending on the platform version; they are
//! modelled as [`CumulativeShape`] and resolved to one number here.

use crate::error::DecodeError;
use crate::types::{Millis, SensorEvent};
use log::{debug, warn};
use serde::Deserialize;

use super::ReadingAdapter;

/// Health services payload adapter
pub struct HealthServicesAdapter;

impl ReadingAdapter for HealthServicesAdapter {
    fn parse(&self, raw_json: &str, received_at: Millis) -> Result<Vec<SensorEvent>, DecodeError> {
        let update: HealthUpdate = serde_json::from_str(raw_json)?;
        Ok(update.into_events(received_at))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HealthUpdate {
    /// Measure callback carrying heart-rate samples
    Measure {
        #[serde(default)]
        heart_rate_bpm: Vec<SampleDataPoint>,
    },
    /// Exercise update carrying the latest cumulative metrics
    Exercise {
        state: ExerciseState,
        #[serde(default)]
        calories_total: Option<CumulativeShape>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SampleDataPoint {
    pub value: f64,
    #[serde(default)]
    pub timestamp_ms: Option<Millis>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseState {
    Active,
    Paused,
    Ended,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ValuePoint {
    pub value: f64,
}

/// The shapes a cumulative calories reading takes across platform versions
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CumulativeShape {
    /// A cumulative data point with a running total
    Cumulative { total: f64 },
    /// A list of data points; the last one is current
    Points(Vec<ValuePoint>),
    /// A single data point
    Point(ValuePoint),
    /// A bare number
    Scalar(f64),
}

impl CumulativeShape {
    pub fn resolve(&self) -> Option<f64> {
        let total = match self {
            CumulativeShape::Cumulative { total } => *total,
            CumulativeShape::Points(points) => points.last()?.value,
            CumulativeShape::Point(point) => point.value,
            CumulativeShape::Scalar(value) => *value,
        };
        total.is_finite().then_some(total)
    }
}

impl HealthUpdate {
    pub fn into_events(self, received_at: Millis) -> Vec<SensorEvent> {
        match self {
            HealthUpdate::Measure { heart_rate_bpm } => heart_rate_bpm
                .into_iter()
                .map(|point| SensorEvent::HeartRate {
                    bpm: point.value,
                    timestamp_ms: point.timestamp_ms.unwrap_or(received_at),
                })
                .collect(),
            HealthUpdate::Exercise { state, .. } if state == ExerciseState::Ended => {
                warn!("Exercise ended; calories will stop updating");
                Vec::new()
            }
            HealthUpdate::Exercise { calories_total, .. } => {
                match calories_total.as_ref().and_then(CumulativeShape::resolve) {
                    Some(total) => vec![SensorEvent::CaloriesTotal {
                        total,
                        timestamp_ms: received_at,
                    }],
                    None => {
                        debug!("Exercise update without a usable calories total");
                        Vec::new()
                    }
                }
            }
        }
    }
}
