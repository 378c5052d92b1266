//! Platform reading adapters
//!
//! This module parses raw sensor payloads forwarded by the host application
//! and resolves them into [`SensorEvent`]s. Shape differences between platform
//! versions are settled here so the processors only ever see typed events.

mod hardware;
mod health;

pub use hardware::{HardwareSensorAdapter, HardwareSensorReading, HardwareSensorType};
pub use health::{
    CumulativeShape, ExerciseState, HealthServicesAdapter, HealthUpdate, SampleDataPoint,
    ValuePoint,
};

use crate::error::DecodeError;
use crate::types::{Millis, SensorEvent};

/// Trait for platform payload adapters
pub trait ReadingAdapter {
    /// Parse a raw JSON payload received at `received_at` into sensor events
    fn parse(&self, raw_json: &str, received_at: Millis) -> Result<Vec<SensorEvent>, DecodeError>;
}

/// Where a raw payload came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingSource {
    HealthServices,
    HardwareSensor,
}

impl ReadingSource {
    /// Parse a source name as passed across the FFI (`health_services` or `hardware`)
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "health_services" | "health" => Some(ReadingSource::HealthServices),
            "hardware" | "hardware_sensor" => Some(ReadingSource::HardwareSensor),
            _ => None,
        }
    }

    pub fn adapter(&self) -> &'static dyn ReadingAdapter {
        match self {
            ReadingSource::HealthServices => &HealthServicesAdapter,
            ReadingSource::HardwareSensor => &HardwareSensorAdapter,
        }
    }
}
