//! Core types for the haptic alert engine
//!
//! This module defines the data that flows between the sensor adapters, the
//! per-metric processors, the evaluator and the dispatch layer: samples,
//! sensor events, channel configuration, evaluation results and fired alerts.

use crate::codec::VibrationWaveform;
use crate::error::AlertError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Milliseconds since the Unix epoch
pub type Millis = i64;

/// Default cooldown applied when a configuration carries none (5 minutes)
pub const DEFAULT_COOLDOWN_MILLIS: u64 = 300_000;

/// A single timestamped reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp_ms: Millis,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp_ms: Millis, value: f64) -> Self {
        Self {
            timestamp_ms,
            value,
        }
    }
}

/// Which side of the threshold triggers a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Above,
    Below,
}

impl Direction {
    /// Strict comparison: a value equal to the threshold never crosses it
    pub fn crossed(&self, observed: f64, threshold: f64) -> bool {
        match self {
            Direction::Above => observed > threshold,
            Direction::Below => observed < threshold,
        }
    }
}

/// Monitored physiological metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    HeartRate,
    Activity,
    Calories,
    Stress,
}

impl MetricKind {
    pub const ALL: [MetricKind; 4] = [
        MetricKind::HeartRate,
        MetricKind::Activity,
        MetricKind::Calories,
        MetricKind::Stress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::HeartRate => "heart_rate",
            MetricKind::Activity => "activity",
            MetricKind::Calories => "calories",
            MetricKind::Stress => "stress",
        }
    }

    /// The two channels evaluated against this metric
    pub fn channels(&self) -> [&'static ChannelSpec; 2] {
        let index = match self {
            MetricKind::HeartRate => 0,
            MetricKind::Activity => 2,
            MetricKind::Calories => 4,
            MetricKind::Stress => 6,
        };
        [&CHANNELS[index], &CHANNELS[index + 1]]
    }

    /// Whether a sensor event feeds this metric
    pub fn accepts(&self, event: &SensorEvent) -> bool {
        matches!(
            (self, event),
            (MetricKind::HeartRate, SensorEvent::HeartRate { .. })
                | (MetricKind::Stress, SensorEvent::HeartRate { .. })
                | (MetricKind::Activity, SensorEvent::StepCounter { .. })
                | (MetricKind::Activity, SensorEvent::StepDetected { .. })
                | (MetricKind::Calories, SensorEvent::CaloriesTotal { .. })
        )
    }

    fn format_value(&self, value: f64) -> String {
        match self {
            MetricKind::HeartRate | MetricKind::Activity => format!("{value:.0}"),
            MetricKind::Calories | MetricKind::Stress => format!("{value:.2}"),
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "heart_rate" => Ok(MetricKind::HeartRate),
            "activity" | "steps" => Ok(MetricKind::Activity),
            "calories" => Ok(MetricKind::Calories),
            "stress" | "hrv" => Ok(MetricKind::Stress),
            other => Err(AlertError::UnknownMetric(other.to_string())),
        }
    }
}

/// Static description of one alert channel
#[derive(Debug, PartialEq, Eq)]
pub struct ChannelSpec {
    pub id: &'static str,
    pub metric: MetricKind,
    pub direction: Direction,
    pub title: &'static str,
    label: &'static str,
}

/// Known channels, two per metric in `MetricKind::channels` order.
///
/// Stress channels invert the usual naming: low BPM variability is the
/// stress signal, so `high_stress` fires below its threshold.
pub static CHANNELS: [ChannelSpec; 8] = [
    ChannelSpec {
        id: "high_heart_rate",
        metric: MetricKind::HeartRate,
        direction: Direction::Above,
        title: "High Heart Rate Alert!",
        label: "BPM",
    },
    ChannelSpec {
        id: "low_heart_rate",
        metric: MetricKind::HeartRate,
        direction: Direction::Below,
        title: "Low Heart Rate Alert!",
        label: "BPM",
    },
    ChannelSpec {
        id: "high_activity",
        metric: MetricKind::Activity,
        direction: Direction::Above,
        title: "High Activity Alert!",
        label: "Steps last hour",
    },
    ChannelSpec {
        id: "low_activity",
        metric: MetricKind::Activity,
        direction: Direction::Below,
        title: "Low Activity Alert!",
        label: "Steps last hour",
    },
    ChannelSpec {
        id: "high_calories",
        metric: MetricKind::Calories,
        direction: Direction::Above,
        title: "High Calorie Burn",
        label: "Calories last hour",
    },
    ChannelSpec {
        id: "low_calories",
        metric: MetricKind::Calories,
        direction: Direction::Below,
        title: "Low Calorie Burn",
        label: "Calories last hour",
    },
    ChannelSpec {
        id: "high_stress",
        metric: MetricKind::Stress,
        direction: Direction::Below,
        title: "Possible Stress",
        label: "Low variability",
    },
    ChannelSpec {
        id: "low_stress",
        metric: MetricKind::Stress,
        direction: Direction::Above,
        title: "High HRV (Relaxed)",
        label: "Variability",
    },
];

impl ChannelSpec {
    /// Look up a known channel by wire id
    pub fn lookup(id: &str) -> Option<&'static ChannelSpec> {
        CHANNELS.iter().find(|spec| spec.id == id)
    }

    /// Human-readable alert body for an observed value
    pub fn describe(&self, observed: f64) -> String {
        format!("{}: {}", self.label, self.metric.format_value(observed))
    }
}

/// A sensor reading after platform-specific shapes have been resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SensorEvent {
    /// Instantaneous heart rate
    HeartRate { bpm: f64, timestamp_ms: Millis },
    /// Cumulative step count since boot
    StepCounter { total: f64, timestamp_ms: Millis },
    /// One pulse per detected step
    StepDetected { timestamp_ms: Millis },
    /// Cumulative calories since exercise start
    CaloriesTotal { total: f64, timestamp_ms: Millis },
}

impl SensorEvent {
    pub fn timestamp_ms(&self) -> Millis {
        match self {
            SensorEvent::HeartRate { timestamp_ms, .. }
            | SensorEvent::StepCounter { timestamp_ms, .. }
            | SensorEvent::StepDetected { timestamp_ms }
            | SensorEvent::CaloriesTotal { timestamp_ms, .. } => *timestamp_ms,
        }
    }
}

/// Cooldown presets offered by the settings UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationFrequency {
    #[serde(rename = "EVERY_30_SEC")]
    Every30Sec,
    #[serde(rename = "EVERY_1_MIN")]
    Every1Min,
    #[serde(rename = "EVERY_5_MIN")]
    Every5Min,
    #[serde(rename = "EVERY_15_MIN")]
    Every15Min,
    #[serde(rename = "EVERY_30_MIN")]
    Every30Min,
}

impl NotificationFrequency {
    pub const ALL: [NotificationFrequency; 5] = [
        NotificationFrequency::Every30Sec,
        NotificationFrequency::Every1Min,
        NotificationFrequency::Every5Min,
        NotificationFrequency::Every15Min,
        NotificationFrequency::Every30Min,
    ];

    pub fn millis(&self) -> u64 {
        match self {
            NotificationFrequency::Every30Sec => 30_000,
            NotificationFrequency::Every1Min => 60_000,
            NotificationFrequency::Every5Min => 300_000,
            NotificationFrequency::Every15Min => 900_000,
            NotificationFrequency::Every30Min => 1_800_000,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            NotificationFrequency::Every30Sec => "Every 30 sec",
            NotificationFrequency::Every1Min => "Every 1 min",
            NotificationFrequency::Every5Min => "Every 5 min",
            NotificationFrequency::Every15Min => "Every 15 min",
            NotificationFrequency::Every30Min => "Every 30 min",
        }
    }

    fn name(&self) -> &'static str {
        match self {
            NotificationFrequency::Every30Sec => "EVERY_30_SEC",
            NotificationFrequency::Every1Min => "EVERY_1_MIN",
            NotificationFrequency::Every5Min => "EVERY_5_MIN",
            NotificationFrequency::Every15Min => "EVERY_15_MIN",
            NotificationFrequency::Every30Min => "EVERY_30_MIN",
        }
    }

    /// Parse either the enum name (`EVERY_5_MIN`) or the UI label (`Every 5 min`)
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|f| f.name() == value || f.label().eq_ignore_ascii_case(value))
    }
}

/// One configurable alert channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertChannelConfig {
    pub id: String,
    pub enabled: bool,
    pub threshold: Option<f64>,
    pub direction: Direction,
    pub cooldown_millis: u64,
    pub waveform: VibrationWaveform,
}

impl AlertChannelConfig {
    /// Enabled configuration with the default cooldown and vibration pattern
    pub fn new(id: impl Into<String>, direction: Direction, threshold: f64) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            threshold: Some(threshold),
            direction,
            cooldown_millis: DEFAULT_COOLDOWN_MILLIS,
            waveform: crate::catalog::default_waveform(),
        }
    }

    /// Enabled configuration for a known channel id, direction taken from the catalogue
    pub fn for_channel(id: &str, threshold: f64) -> Option<Self> {
        ChannelSpec::lookup(id).map(|spec| Self::new(spec.id, spec.direction, threshold))
    }

    pub fn with_cooldown(mut self, cooldown_millis: u64) -> Self {
        self.cooldown_millis = cooldown_millis;
        self
    }

    pub fn with_waveform(mut self, waveform: VibrationWaveform) -> Self {
        self.waveform = waveform;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Threshold to evaluate against; `None` means the channel must not fire
    pub fn active_threshold(&self) -> Option<f64> {
        if self.enabled {
            self.threshold.filter(|t| t.is_finite())
        } else {
            None
        }
    }
}

/// Consistent per-evaluation view of channel configurations, keyed by channel id
pub type ConfigSnapshot = HashMap<String, AlertChannelConfig>;

/// Outcome of evaluating one channel on one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEvaluationResult {
    pub channel_id: String,
    pub fired: bool,
    pub observed_value: f64,
    /// The threshold that was crossed, when it was
    pub threshold_crossed: Option<f64>,
    /// Crossed but held back by the channel cooldown
    pub suppressed: bool,
}

impl MetricEvaluationResult {
    pub fn idle(channel_id: impl Into<String>, observed_value: f64) -> Self {
        Self {
            channel_id: channel_id.into(),
            fired: false,
            observed_value,
            threshold_crossed: None,
            suppressed: false,
        }
    }
}

/// Event handed to the notification layer when a channel fires
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertFired {
    pub alert_id: String,
    pub channel_id: String,
    pub title: String,
    pub message: String,
    pub observed_value: f64,
    pub timestamp: DateTime<Utc>,
}

impl AlertFired {
    pub fn new(result: &MetricEvaluationResult, at: Millis) -> Self {
        let (title, message) = match ChannelSpec::lookup(&result.channel_id) {
            Some(spec) => (spec.title.to_string(), spec.describe(result.observed_value)),
            None => (
                result.channel_id.clone(),
                format!("Value: {:.2}", result.observed_value),
            ),
        };

        Self {
            alert_id: uuid::Uuid::new_v4().to_string(),
            channel_id: result.channel_id.clone(),
            title,
            message,
            observed_value: result.observed_value,
            timestamp: DateTime::<Utc>::from_timestamp_millis(at).unwrap_or_default(),
        }
    }
}
