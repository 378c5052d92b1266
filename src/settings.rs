//! Monitor settings
//!
//! Tunables for the monitoring tasks, stored as TOML. Every key is optional;
//! anything left out falls back to the per-metric defaults:
//!
//! | metric     | window  | tick | min samples |
//! |------------|---------|------|-------------|
//! | heart_rate | -       | -    | -           |
//! | activity   | 1 h     | 30 s | -           |
//! | calories   | 1 h     | 30 s | -           |
//! | stress     | 60 s    | 30 s | 12          |
//!
//! ```toml
//! cooldown_floor_millis = 1000
//! event_buffer = 256
//!
//! [stress]
//! window_millis = 90000
//! min_samples = 20
//! ```

use crate::error::SettingsError;
use crate::evaluator::MIN_COOLDOWN_MILLIS;
use crate::types::{MetricKind, Millis};
use crate::variability::MIN_VARIABILITY_SAMPLES;
use crate::window::{HOUR_HORIZON_MS, VARIABILITY_HORIZON_MS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Periodic re-evaluation interval for windowed metrics
pub const DEFAULT_TICK_MILLIS: u64 = 30_000;

/// Longest accepted tick interval; larger settings are clamped to it
pub const MAX_TICK_MILLIS: u64 = 86_400_000;

/// Capacity of each monitor's sensor-event queue
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Per-metric overrides as written in the settings file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricSettings {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_millis: Option<u64>,
    /// `0` disables the periodic tick
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tick_millis: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_samples: Option<usize>,
}

impl Default for MetricSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            window_millis: None,
            tick_millis: None,
            min_samples: None,
        }
    }
}

/// Resolved options for one metric
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricOptions {
    pub enabled: bool,
    pub window_millis: Millis,
    /// `None` means event-driven evaluation only
    pub tick_millis: Option<u64>,
    pub min_samples: usize,
}

impl MetricOptions {
    pub fn defaults(kind: MetricKind) -> Self {
        let (window_millis, tick_millis, min_samples) = match kind {
            MetricKind::HeartRate => (0, None, 1),
            MetricKind::Activity | MetricKind::Calories => {
                (HOUR_HORIZON_MS, Some(DEFAULT_TICK_MILLIS), 1)
            }
            MetricKind::Stress => (
                VARIABILITY_HORIZON_MS,
                Some(DEFAULT_TICK_MILLIS),
                MIN_VARIABILITY_SAMPLES,
            ),
        };
        Self {
            enabled: true,
            window_millis,
            tick_millis,
            min_samples,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Lower bound on every channel cooldown; never below 1000 ms
    pub cooldown_floor_millis: u64,
    pub event_buffer: usize,
    pub heart_rate: MetricSettings,
    pub activity: MetricSettings,
    pub calories: MetricSettings,
    pub stress: MetricSettings,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            cooldown_floor_millis: MIN_COOLDOWN_MILLIS,
            event_buffer: DEFAULT_EVENT_BUFFER,
            heart_rate: MetricSettings::default(),
            activity: MetricSettings::default(),
            calories: MetricSettings::default(),
            stress: MetricSettings::default(),
        }
    }
}

impl MonitorSettings {
    /// Load settings from a TOML file, or defaults if it doesn't exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        match fs::read_to_string(path.as_ref()) {
            Ok(contents) => Self::from_toml_str(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(SettingsError::ReadFailed(e)),
        }
    }

    /// Save settings to a TOML file, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(SettingsError::WriteFailed)?;
        }

        let toml_string = toml::to_string_pretty(self)?;
        fs::write(path, toml_string).map_err(SettingsError::WriteFailed)?;
        Ok(())
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn cooldown_floor_millis(&self) -> u64 {
        self.cooldown_floor_millis.max(MIN_COOLDOWN_MILLIS)
    }

    pub fn event_buffer(&self) -> usize {
        self.event_buffer.max(1)
    }

    pub fn metric(&self, kind: MetricKind) -> &MetricSettings {
        match kind {
            MetricKind::HeartRate => &self.heart_rate,
            MetricKind::Activity => &self.activity,
            MetricKind::Calories => &self.calories,
            MetricKind::Stress => &self.stress,
        }
    }

    /// Resolve the options for one metric, applying overrides to its defaults.
    ///
    /// Heart rate is always event-driven, so its tick setting is ignored.
    pub fn for_kind(&self, kind: MetricKind) -> MetricOptions {
        let overrides = self.metric(kind);
        let defaults = MetricOptions::defaults(kind);

        let tick_millis = match (kind, overrides.tick_millis) {
            (MetricKind::HeartRate, _) => None,
            (_, Some(0)) => None,
            (_, Some(tick)) => Some(tick.min(MAX_TICK_MILLIS)),
            (_, None) => defaults.tick_millis,
        };

        MetricOptions {
            enabled: overrides.enabled,
            window_millis: overrides
                .window_millis
                .map_or(defaults.window_millis, |w| {
                    Millis::try_from(w).unwrap_or(Millis::MAX)
                }),
            tick_millis,
            min_samples: overrides.min_samples.unwrap_or(defaults.min_samples),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_options() {
        let settings = MonitorSettings::default();
        assert_eq!(
            settings.for_kind(MetricKind::Stress),
            MetricOptions {
                enabled: true,
                window_millis: 60_000,
                tick_millis: Some(30_000),
                min_samples: 12,
            }
        );
        assert_eq!(settings.for_kind(MetricKind::HeartRate).tick_millis, None);
        assert_eq!(
            settings.for_kind(MetricKind::Activity).window_millis,
            3_600_000
        );
    }

    #[test]
    fn test_partial_overrides() {
        let settings = MonitorSettings::from_toml_str(
            r#"
            cooldown_floor_millis = 10

            [calories]
            enabled = false

            [stress]
            window_millis = 90000
            min_samples = 20
            tick_millis = 0

            [heart_rate]
            tick_millis = 5000
            "#,
        )
        .unwrap();

        assert_eq!(settings.cooldown_floor_millis(), 1_000);
        assert_eq!(settings.event_buffer(), DEFAULT_EVENT_BUFFER);
        assert!(!settings.for_kind(MetricKind::Calories).enabled);
        assert_eq!(
            settings.for_kind(MetricKind::Calories).window_millis,
            3_600_000
        );

        let stress = settings.for_kind(MetricKind::Stress);
        assert_eq!(stress.window_millis, 90_000);
        assert_eq!(stress.min_samples, 20);
        assert_eq!(stress.tick_millis, None);
        assert_eq!(settings.for_kind(MetricKind::HeartRate).tick_millis, None);
    }

    #[test]
    fn test_huge_values_are_clamped() {
        let settings = MonitorSettings::from_toml_str(
            r#"
            [activity]
            window_millis = 18446744073709551615
            tick_millis = 18446744073709551615
            "#,
        )
        .unwrap();

        let activity = settings.for_kind(MetricKind::Activity);
        assert_eq!(activity.window_millis, Millis::MAX);
        assert_eq!(activity.tick_millis, Some(MAX_TICK_MILLIS));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = MonitorSettings::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings, MonitorSettings::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("monitor.toml");

        let mut settings = MonitorSettings::default();
        settings.event_buffer = 64;
        settings.activity.tick_millis = Some(10_000);
        settings.save(&path).unwrap();

        assert_eq!(MonitorSettings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_invalid_toml() {
        let err = MonitorSettings::from_toml_str("event_buffer = \"lots\"").unwrap_err();
        assert!(matches!(err, SettingsError::ParseFailed(_)));
    }
}
