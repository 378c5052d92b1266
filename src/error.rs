//! Error types for the haptic alert engine

use thiserror::Error;

/// Errors raised while decoding wire messages and catalog records
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("Waveform length mismatch: {durations} durations vs {amplitudes} amplitudes")]
    LengthMismatch { durations: usize, amplitudes: usize },

    #[error("Amplitude {value} at index {index} is outside 0-255")]
    AmplitudeOutOfRange { index: usize, value: i64 },

    #[error("Repeat index {repeat} is invalid for a waveform of {len} segments")]
    InvalidRepeat { repeat: i32, len: usize },

    #[error("Unknown alert channel without explicit direction: {0}")]
    UnknownChannel(String),
}

/// Errors raised while reading or writing monitor settings
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings file: {0}")]
    ReadFailed(#[source] std::io::Error),

    #[error("Failed to write settings file: {0}")]
    WriteFailed(#[source] std::io::Error),

    #[error("Failed to parse settings file: {0}")]
    ParseFailed(#[from] toml::de::Error),

    #[error("Failed to serialize settings: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
}

/// Errors surfaced by the alert engine
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Sensor unavailable for {metric}: {reason}")]
    SensorUnavailable { metric: String, reason: String },

    #[error("Unknown metric: {0}")]
    UnknownMetric(String),
}
