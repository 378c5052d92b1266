//! Vibration waveform codec
//!
//! Serializes vibration waveforms and alert-channel configurations to the JSON
//! wire format exchanged between phone and watch, and validates them on the way
//! back in. Two message shapes share one waveform encoding:
//!
//! - waveform-only: `{"timings": [...], "amplitudes": [...], "repeat": -1}`
//! - alert configuration: `{"channelId", "enabled", "threshold", "direction",
//!   "cooldownMillis", "waveform"}`
//!
//! Callers that must not lose other records on a malformed one (the message
//! router, the catalog loader) skip the bad record and count it in
//! [`DecodeDiagnostics`].

use crate::error::{AlertError, DecodeError};
use crate::types::{
    AlertChannelConfig, ChannelSpec, Direction, NotificationFrequency, DEFAULT_COOLDOWN_MILLIS,
};
use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Repeat index meaning "play once"
pub const NO_REPEAT: i32 = -1;

/// Maximum amplitude accepted by vibration actuators
pub const MAX_AMPLITUDE: i64 = 255;

/// A vibration pattern: parallel segment durations (ms) and amplitudes.
///
/// The first duration is conventionally an initial delay and may be 0.
/// Construction validates that both sequences have the same length, that
/// amplitudes fit in 0-255 and that the repeat index points inside the pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WaveformFields")]
pub struct VibrationWaveform {
    #[serde(rename = "timings")]
    durations: Vec<u64>,
    amplitudes: Vec<u8>,
    repeat: i32,
}

impl Default for VibrationWaveform {
    fn default() -> Self {
        Self {
            durations: Vec::new(),
            amplitudes: Vec::new(),
            repeat: NO_REPEAT,
        }
    }
}

impl VibrationWaveform {
    /// Build a validated waveform
    pub fn new(durations: Vec<u64>, amplitudes: Vec<u8>, repeat: i32) -> Result<Self, DecodeError> {
        validate_shape(durations.len(), amplitudes.len(), repeat)?;
        Ok(Self {
            durations,
            amplitudes,
            repeat,
        })
    }

    /// Build a waveform from raw integers as they arrive on the wire
    pub fn from_raw(durations: Vec<u64>, amplitudes: Vec<i64>, repeat: i32) -> Result<Self, DecodeError> {
        validate_shape(durations.len(), amplitudes.len(), repeat)?;

        let amplitudes = amplitudes
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                u8::try_from(value).map_err(|_| DecodeError::AmplitudeOutOfRange { index, value })
            })
            .collect::<Result<Vec<u8>, _>>()?;

        Ok(Self {
            durations,
            amplitudes,
            repeat,
        })
    }

    pub fn durations(&self) -> &[u64] {
        &self.durations
    }

    pub fn amplitudes(&self) -> &[u8] {
        &self.amplitudes
    }

    pub fn repeat(&self) -> i32 {
        self.repeat
    }

    pub fn len(&self) -> usize {
        self.durations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.durations.is_empty()
    }

    /// Length of one pass through the pattern
    pub fn total_duration_ms(&self) -> u64 {
        self.durations.iter().sum()
    }

    /// Serialize to the waveform-only wire message
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse and validate a waveform-only wire message
    pub fn from_json(json: &str) -> Result<Self, DecodeError> {
        let fields: WaveformFields = serde_json::from_str(json)?;
        Self::try_from(fields)
    }
}

fn validate_shape(durations: usize, amplitudes: usize, repeat: i32) -> Result<(), DecodeError> {
    if durations != amplitudes {
        return Err(DecodeError::LengthMismatch {
            durations,
            amplitudes,
        });
    }
    let repeat_ok = repeat == NO_REPEAT || (repeat >= 0 && (repeat as usize) < durations);
    if !repeat_ok {
        return Err(DecodeError::InvalidRepeat {
            repeat,
            len: durations,
        });
    }
    Ok(())
}

/// Unvalidated waveform as it appears on the wire
#[derive(Debug, Deserialize)]
pub struct WaveformFields {
    #[serde(alias = "durations")]
    timings: Vec<u64>,
    amplitudes: Vec<i64>,
    #[serde(default = "default_repeat")]
    repeat: i32,
}

fn default_repeat() -> i32 {
    NO_REPEAT
}

impl TryFrom<WaveformFields> for VibrationWaveform {
    type Error = DecodeError;

    fn try_from(fields: WaveformFields) -> Result<Self, Self::Error> {
        VibrationWaveform::from_raw(fields.timings, fields.amplitudes, fields.repeat)
    }
}

/// Alert configuration as encoded for the phone→watch channel
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AlertConfigWire<'a> {
    channel_id: &'a str,
    enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    threshold: Option<f64>,
    direction: Direction,
    cooldown_millis: u64,
    waveform: &'a VibrationWaveform,
}

/// Alert configuration as accepted from the wire, including legacy field names
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlertConfigFields {
    #[serde(alias = "subEventId")]
    channel_id: String,
    enabled: bool,
    #[serde(default)]
    threshold: Option<f64>,
    #[serde(default)]
    direction: Option<Direction>,
    #[serde(default, alias = "frequencyMillis")]
    cooldown_millis: Option<u64>,
    #[serde(default)]
    notification_frequency: Option<String>,
    #[serde(alias = "vibration")]
    waveform: WaveformFields,
}

impl TryFrom<AlertConfigFields> for AlertChannelConfig {
    type Error = DecodeError;

    fn try_from(fields: AlertConfigFields) -> Result<Self, Self::Error> {
        let direction = match fields.direction {
            Some(direction) => direction,
            None => ChannelSpec::lookup(&fields.channel_id)
                .map(|spec| spec.direction)
                .ok_or_else(|| DecodeError::UnknownChannel(fields.channel_id.clone()))?,
        };

        let cooldown_millis = match (fields.cooldown_millis, fields.notification_frequency) {
            (Some(millis), _) => millis,
            (None, Some(preset)) => match NotificationFrequency::parse(&preset) {
                Some(frequency) => frequency.millis(),
                None => {
                    warn!(
                        "Unknown notification frequency {preset:?} for {}, using default",
                        fields.channel_id
                    );
                    DEFAULT_COOLDOWN_MILLIS
                }
            },
            (None, None) => DEFAULT_COOLDOWN_MILLIS,
        };

        // Negative thresholds are the sender's "unset" marker
        let threshold = fields.threshold.filter(|t| t.is_finite() && *t >= 0.0);

        Ok(AlertChannelConfig {
            id: fields.channel_id,
            enabled: fields.enabled,
            threshold,
            direction,
            cooldown_millis,
            waveform: VibrationWaveform::try_from(fields.waveform)?,
        })
    }
}

/// Encode a waveform-only message
pub fn encode_waveform(waveform: &VibrationWaveform) -> Result<Vec<u8>, AlertError> {
    serde_json::to_vec(waveform).map_err(|e| AlertError::Encoding(e.to_string()))
}

/// Decode a waveform-only message
pub fn decode_waveform(payload: &[u8]) -> Result<VibrationWaveform, DecodeError> {
    VibrationWaveform::from_json(payload_str(payload)?)
}

/// Encode an alert-configuration message
pub fn encode_alert_config(config: &AlertChannelConfig) -> Result<Vec<u8>, AlertError> {
    let wire = AlertConfigWire {
        channel_id: &config.id,
        enabled: config.enabled,
        threshold: config.threshold,
        direction: config.direction,
        cooldown_millis: config.cooldown_millis,
        waveform: &config.waveform,
    };
    serde_json::to_vec(&wire).map_err(|e| AlertError::Encoding(e.to_string()))
}

/// Decode an alert-configuration message
pub fn decode_alert_config(payload: &[u8]) -> Result<AlertChannelConfig, DecodeError> {
    let fields: AlertConfigFields = serde_json::from_str(payload_str(payload)?)?;
    AlertChannelConfig::try_from(fields)
}

/// Decode a JSON array of alert-configuration messages, skipping malformed entries.
///
/// Returns the decoded configurations and the index and error of every skipped entry.
pub fn decode_alert_config_list(
    json: &str,
) -> Result<(Vec<AlertChannelConfig>, Vec<(usize, DecodeError)>), DecodeError> {
    let entries: Vec<serde_json::Value> = serde_json::from_str(json)?;
    let mut configs = Vec::with_capacity(entries.len());
    let mut skipped = Vec::new();

    for (index, entry) in entries.into_iter().enumerate() {
        let decoded = serde_json::from_value::<AlertConfigFields>(entry)
            .map_err(DecodeError::from)
            .and_then(AlertChannelConfig::try_from);
        match decoded {
            Ok(config) => configs.push(config),
            Err(e) => {
                warn!("Skipping alert configuration at index {index}: {e}");
                skipped.push((index, e));
            }
        }
    }

    Ok((configs, skipped))
}

fn payload_str(payload: &[u8]) -> Result<&str, DecodeError> {
    std::str::from_utf8(payload).map_err(|_| DecodeError::InvalidUtf8)
}

/// Counters for records dropped by skip-invalid decode paths
#[derive(Debug, Default)]
pub struct DecodeDiagnostics {
    skipped_waveforms: AtomicU64,
    skipped_configs: AtomicU64,
}

/// Point-in-time copy of [`DecodeDiagnostics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticsSnapshot {
    pub skipped_waveforms: u64,
    pub skipped_configs: u64,
}

impl DecodeDiagnostics {
    pub fn record_skipped_waveform(&self) {
        self.skipped_waveforms.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_config(&self) {
        self.skipped_configs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            skipped_waveforms: self.skipped_waveforms.load(Ordering::Relaxed),
            skipped_configs: self.skipped_configs.load(Ordering::Relaxed),
        }
    }
}
