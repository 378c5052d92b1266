//! Per-metric processing
//!
//! A [`MetricProcessor`] owns everything one metric needs between sensor
//! events: its signal state (latest value, summed window or variability
//! window), the channel cooldown state, and the last evaluation time. It is
//! synchronous and clock-free; the async monitor, the FFI and the replay CLI
//! all drive it with explicit timestamps.

use crate::delta::DeltaExtractor;
use crate::evaluator::{ThresholdEvaluator, MIN_COOLDOWN_MILLIS};
use crate::settings::MetricOptions;
use crate::types::{
    AlertFired, ConfigSnapshot, MetricEvaluationResult, MetricKind, Millis, SensorEvent,
};
use crate::variability::compute_stats_with_min;
use crate::window::RollingWindow;
use log::{debug, info};

#[derive(Debug, Clone)]
enum SignalState {
    /// Latest reading is the observed value
    Instant { latest: Option<f64> },
    /// Positive counter deltas summed over the window
    Summed {
        window: RollingWindow,
        counter: DeltaExtractor,
    },
    /// Standard deviation of readings over the window
    Variability {
        window: RollingWindow,
        min_samples: usize,
    },
}

impl SignalState {
    fn for_kind(kind: MetricKind, options: &MetricOptions) -> Self {
        match kind {
            MetricKind::HeartRate => SignalState::Instant { latest: None },
            MetricKind::Activity | MetricKind::Calories => SignalState::Summed {
                window: RollingWindow::new(options.window_millis),
                counter: DeltaExtractor::new(),
            },
            MetricKind::Stress => SignalState::Variability {
                window: RollingWindow::new(options.window_millis),
                min_samples: options.min_samples,
            },
        }
    }

    /// Apply one event; returns whether the observed value may have changed
    fn apply(&mut self, event: &SensorEvent) -> bool {
        match (self, event) {
            (SignalState::Instant { latest }, SensorEvent::HeartRate { bpm, .. }) => {
                if !is_valid_bpm(*bpm) {
                    return false;
                }
                *latest = Some(*bpm);
                true
            }
            (
                SignalState::Variability { window, .. },
                SensorEvent::HeartRate { bpm, timestamp_ms },
            ) => is_valid_bpm(*bpm) && window.add(*timestamp_ms, *bpm),
            (SignalState::Summed { window, .. }, SensorEvent::StepDetected { timestamp_ms }) => {
                window.add(*timestamp_ms, 1.0)
            }
            (
                SignalState::Summed { window, counter },
                SensorEvent::StepCounter {
                    total,
                    timestamp_ms,
                }
                | SensorEvent::CaloriesTotal {
                    total,
                    timestamp_ms,
                },
            ) => match counter.observe(*total) {
                Some(delta) => window.add(*timestamp_ms, delta),
                None => false,
            },
            _ => false,
        }
    }

    fn evict(&mut self, now: Millis) {
        match self {
            SignalState::Instant { .. } => {}
            SignalState::Summed { window, .. } | SignalState::Variability { window, .. } => {
                window.evict(now)
            }
        }
    }

    fn observed(&self) -> Option<f64> {
        match self {
            SignalState::Instant { latest } => *latest,
            SignalState::Summed { window, .. } => Some(window.sum()),
            SignalState::Variability {
                window,
                min_samples,
            } => compute_stats_with_min(&window.values(), *min_samples)
                .stats()
                .map(|stats| stats.std_dev),
        }
    }
}

/// Sensor warm-up readings come through as zero or negative BPM
fn is_valid_bpm(bpm: f64) -> bool {
    bpm.is_finite() && bpm > 0.0
}

/// Stateful processor for one metric and its two channels
#[derive(Debug, Clone)]
pub struct MetricProcessor {
    kind: MetricKind,
    signal: SignalState,
    evaluator: ThresholdEvaluator,
    last_evaluated_at: Option<Millis>,
}

impl MetricProcessor {
    /// Create a processor with the metric's default window and sample minimum
    pub fn new(kind: MetricKind) -> Self {
        Self::with_options(kind, &MetricOptions::defaults(kind), MIN_COOLDOWN_MILLIS)
    }

    pub fn with_options(kind: MetricKind, options: &MetricOptions, cooldown_floor_millis: u64) -> Self {
        Self {
            kind,
            signal: SignalState::for_kind(kind, options),
            evaluator: ThresholdEvaluator::new(cooldown_floor_millis),
            last_evaluated_at: None,
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn last_evaluated_at(&self) -> Option<Millis> {
        self.last_evaluated_at
    }

    /// Current observed value, `None` before enough data has arrived
    pub fn observed_value(&self) -> Option<f64> {
        self.signal.observed()
    }

    pub fn evaluator(&self) -> &ThresholdEvaluator {
        &self.evaluator
    }

    /// Feed one sensor event and evaluate if it changed the signal.
    ///
    /// Events for other metrics and readings that leave the signal unchanged
    /// (first counter reading, stale sample, invalid BPM) produce no results.
    pub fn on_event(
        &mut self,
        event: &SensorEvent,
        configs: &ConfigSnapshot,
    ) -> Vec<MetricEvaluationResult> {
        if !self.kind.accepts(event) || !self.signal.apply(event) {
            return Vec::new();
        }
        debug!(
            "{} updated at {}: {:?}",
            self.kind,
            event.timestamp_ms(),
            self.signal.observed()
        );
        self.evaluate(event.timestamp_ms(), configs)
    }

    /// Periodic re-evaluation against the current window contents.
    ///
    /// Heart rate is event-driven only and never evaluates on a tick.
    pub fn on_tick(&mut self, now: Millis, configs: &ConfigSnapshot) -> Vec<MetricEvaluationResult> {
        if self.kind == MetricKind::HeartRate {
            return Vec::new();
        }
        self.signal.evict(now);
        self.evaluate(now, configs)
    }

    fn evaluate(&mut self, now: Millis, configs: &ConfigSnapshot) -> Vec<MetricEvaluationResult> {
        // Never evaluate at a time earlier than one already evaluated
        let at = self.last_evaluated_at.map_or(now, |last| last.max(now));
        self.last_evaluated_at = Some(at);

        let Some(observed) = self.signal.observed() else {
            return Vec::new();
        };

        self.kind
            .channels()
            .into_iter()
            .map(|spec| match configs.get(spec.id) {
                Some(config) => self.evaluator.evaluate(config, observed, at),
                None => MetricEvaluationResult::idle(spec.id, observed),
            })
            .collect()
    }

    /// Drop signal and cooldown state, as after a service restart
    pub fn reset(&mut self, options: &MetricOptions) {
        self.signal = SignalState::for_kind(self.kind, options);
        self.evaluator.reset();
        self.last_evaluated_at = None;
    }
}

/// Turn the fired results of one evaluation into alert events
pub fn fired_alerts(results: &[MetricEvaluationResult], at: Millis) -> Vec<AlertFired> {
    results
        .iter()
        .filter(|result| result.fired)
        .map(|result| {
            let alert = AlertFired::new(result, at);
            info!(
                "Alert {} fired: {} ({})",
                alert.channel_id, alert.title, alert.message
            );
            alert
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AlertChannelConfig;
    use pretty_assertions::assert_eq;

    fn configs(entries: &[(&str, f64, u64)]) -> ConfigSnapshot {
        entries
            .iter()
            .map(|(id, threshold, cooldown)| {
                let config = AlertChannelConfig::for_channel(id, *threshold)
                    .unwrap()
                    .with_cooldown(*cooldown);
                (id.to_string(), config)
            })
            .collect()
    }

    fn hr(bpm: f64, timestamp_ms: Millis) -> SensorEvent {
        SensorEvent::HeartRate { bpm, timestamp_ms }
    }

    #[test]
    fn test_heart_rate_fires_once_then_cools_down() {
        let configs = configs(&[("high_heart_rate", 150.0, 30_000)]);
        let mut processor = MetricProcessor::new(MetricKind::HeartRate);

        let mut fired_at = Vec::new();
        let mut suppressed_at = Vec::new();
        for (bpm, t) in [(120.0, 0), (145.0, 1_000), (155.0, 2_000), (160.0, 3_000), (130.0, 4_000)] {
            for result in processor.on_event(&hr(bpm, t), &configs) {
                if result.channel_id != "high_heart_rate" {
                    continue;
                }
                if result.fired {
                    fired_at.push(t);
                }
                if result.suppressed {
                    suppressed_at.push(t);
                }
            }
        }

        assert_eq!(fired_at, vec![2_000]);
        assert_eq!(suppressed_at, vec![3_000]);
    }

    #[test]
    fn test_heart_rate_ignores_ticks_and_invalid_bpm() {
        let configs = configs(&[("low_heart_rate", 50.0, 0)]);
        let mut processor = MetricProcessor::new(MetricKind::HeartRate);
        assert!(processor.on_event(&hr(0.0, 0), &configs).is_empty());
        assert!(processor.on_event(&hr(-3.0, 0), &configs).is_empty());
        assert!(processor.on_tick(60_000, &configs).is_empty());
        assert_eq!(processor.observed_value(), None);
    }

    #[test]
    fn test_missing_config_is_idle() {
        let mut processor = MetricProcessor::new(MetricKind::HeartRate);
        let results = processor.on_event(&hr(200.0, 0), &ConfigSnapshot::new());
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.fired && r.threshold_crossed.is_none()));
    }

    #[test]
    fn test_step_counter_sums_deltas_in_hour() {
        let configs = configs(&[("high_activity", 1_000.0, 60_000)]);
        let mut processor = MetricProcessor::new(MetricKind::Activity);

        let counter = |total: f64, timestamp_ms| SensorEvent::StepCounter {
            total,
            timestamp_ms,
        };
        // First reading only sets the baseline
        assert!(processor.on_event(&counter(10_000.0, 0), &configs).is_empty());
        processor.on_event(&counter(10_100.0, 0), &configs);
        processor.on_event(&counter(10_150.0, 1_800_000), &configs);
        let results = processor.on_event(&counter(10_230.0, 3_700_000), &configs);

        assert_eq!(processor.observed_value(), Some(130.0));
        assert_eq!(results[0].observed_value, 130.0);
        assert!(!results[0].fired);
    }

    #[test]
    fn test_step_detector_pulses_count_one() {
        let mut processor = MetricProcessor::new(MetricKind::Activity);
        for t in 0..25 {
            processor.on_event(&SensorEvent::StepDetected { timestamp_ms: t * 10 }, &ConfigSnapshot::new());
        }
        assert_eq!(processor.observed_value(), Some(25.0));
    }

    #[test]
    fn test_low_activity_fires_on_tick() {
        let configs = configs(&[("low_activity", 100.0, 300_000)]);
        let mut processor = MetricProcessor::new(MetricKind::Activity);

        let results = processor.on_tick(30_000, &configs);
        let low = results.iter().find(|r| r.channel_id == "low_activity").unwrap();
        assert!(low.fired);
        assert_eq!(low.observed_value, 0.0);

        assert!(!processor.on_tick(60_000, &configs)[1].fired);
        assert!(processor.on_tick(330_000, &configs)[1].fired);
    }

    #[test]
    fn test_calories_counter_reset() {
        let mut processor = MetricProcessor::new(MetricKind::Calories);
        let total = |total: f64, timestamp_ms| SensorEvent::CaloriesTotal {
            total,
            timestamp_ms,
        };
        let none = ConfigSnapshot::new();
        processor.on_event(&total(50.0, 0), &none);
        processor.on_event(&total(62.5, 1_000), &none);
        // New exercise session restarts the total
        processor.on_event(&total(1.0, 2_000), &none);
        processor.on_event(&total(4.0, 3_000), &none);
        assert_eq!(processor.observed_value(), Some(15.5));
    }

    #[test]
    fn test_stress_needs_minimum_samples() {
        let configs = configs(&[("high_stress", 3.0, 60_000), ("low_stress", 10.0, 60_000)]);
        let mut processor = MetricProcessor::new(MetricKind::Stress);

        for i in 0..11 {
            assert!(processor.on_event(&hr(70.0, i * 1_000), &configs).is_empty());
        }
        let results = processor.on_event(&hr(71.0, 11_000), &configs);
        let high = results.iter().find(|r| r.channel_id == "high_stress").unwrap();
        assert!(high.fired);
        assert!(high.observed_value < 3.0);
        assert!(!results.iter().any(|r| r.channel_id == "low_stress" && r.fired));
    }

    #[test]
    fn test_stress_window_expires_on_tick() {
        let mut processor = MetricProcessor::new(MetricKind::Stress);
        let none = ConfigSnapshot::new();
        for i in 0..12 {
            processor.on_event(&hr(60.0 + i as f64, i * 1_000), &none);
        }
        assert!(processor.observed_value().is_some());
        assert!(processor.on_tick(200_000, &none).is_empty());
        assert_eq!(processor.observed_value(), None);
    }

    #[test]
    fn test_evaluation_time_never_goes_back() {
        let mut processor = MetricProcessor::new(MetricKind::Activity);
        let none = ConfigSnapshot::new();
        processor.on_tick(90_000, &none);
        processor.on_event(&SensorEvent::StepDetected { timestamp_ms: 80_000 }, &none);
        assert_eq!(processor.last_evaluated_at(), Some(90_000));
    }

    #[test]
    fn test_fired_alerts_carry_message() {
        let configs = configs(&[("high_heart_rate", 150.0, 30_000)]);
        let mut processor = MetricProcessor::new(MetricKind::HeartRate);
        let results = processor.on_event(&hr(155.0, 2_000), &configs);
        let alerts = fired_alerts(&results, 2_000);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].title, "High Heart Rate Alert!");
        assert_eq!(alerts[0].message, "BPM: 155");
    }
}
