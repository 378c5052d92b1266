//! Hardware sensor adapter
//!
//! Maps raw hardware sensor callbacks (`values` arrays) to sensor events.

use crate::error::DecodeError;
use crate::types::{Millis, SensorEvent};
use log::debug;
use serde::Deserialize;

use super::ReadingAdapter;

/// Hardware sensor payload adapter
pub struct HardwareSensorAdapter;

impl ReadingAdapter for HardwareSensorAdapter {
    fn parse(&self, raw_json: &str, received_at: Millis) -> Result<Vec<SensorEvent>, DecodeError> {
        let reading: HardwareSensorReading = serde_json::from_str(raw_json)?;
        Ok(reading.to_event(received_at).into_iter().collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardwareSensorType {
    /// Steps since boot
    StepCounter,
    /// One callback per step
    StepDetector,
    HeartRate,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HardwareSensorReading {
    pub sensor: HardwareSensorType,
    #[serde(default)]
    pub values: Vec<f64>,
    #[serde(default)]
    pub timestamp_ms: Option<Millis>,
}

impl HardwareSensorReading {
    pub fn to_event(&self, received_at: Millis) -> Option<SensorEvent> {
        let timestamp_ms = self.timestamp_ms.unwrap_or(received_at);
        let first = self.values.first().copied();

        let event = match self.sensor {
            HardwareSensorType::StepDetector => SensorEvent::StepDetected { timestamp_ms },
            HardwareSensorType::StepCounter => SensorEvent::StepCounter {
                total: first?,
                timestamp_ms,
            },
            HardwareSensorType::HeartRate => SensorEvent::HeartRate {
                bpm: first?,
                timestamp_ms,
            },
        };
        debug!("{:?} reading -> {event:?}", self.sensor);
        Some(event)
    }
}
