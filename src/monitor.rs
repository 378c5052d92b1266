//! Background monitoring
//!
//! One tokio task per enabled metric. Each task owns a [`MetricProcessor`],
//! drains its own sensor-event queue, re-evaluates on a periodic tick where
//! the metric has one, and plays the channel waveform and emits an
//! [`AlertFired`] whenever a channel fires. Configuration comes from `watch`
//! receivers, read once per evaluation so every channel is seen as a whole
//! record.
//!
//! The sensor registration and wake lock are acquired before the task is
//! spawned; a metric whose sensor is unavailable is reported as a
//! [`CapabilityGap`] and not started. The lease is dropped with the task, so
//! resources are released on every exit path.

use crate::platform::{Clock, PlatformResources, ResourceLease, VibrationActuator};
use crate::processor::{fired_alerts, MetricProcessor};
use crate::settings::{MonitorSettings, MAX_TICK_MILLIS};
use crate::store::ConfigStore;
use crate::types::{
    AlertChannelConfig, AlertFired, ConfigSnapshot, MetricEvaluationResult, MetricKind,
    SensorEvent,
};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Host collaborators shared by every monitor
#[derive(Clone)]
pub struct MonitorContext {
    pub store: Arc<dyn ConfigStore>,
    pub actuator: Arc<dyn VibrationActuator>,
    pub resources: Arc<dyn PlatformResources>,
    pub clock: Arc<dyn Clock>,
}

/// A metric that could not start; surfaced to the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityGap {
    pub kind: MetricKind,
    pub reason: String,
}

type ConfigReceiver = watch::Receiver<Option<AlertChannelConfig>>;

struct MetricMonitor {
    processor: MetricProcessor,
    configs: Vec<(&'static str, ConfigReceiver)>,
    actuator: Arc<dyn VibrationActuator>,
    clock: Arc<dyn Clock>,
    alerts: mpsc::Sender<AlertFired>,
    _lease: ResourceLease,
}

impl MetricMonitor {
    /// Current configuration of this metric's channels
    fn snapshot(&mut self) -> ConfigSnapshot {
        let mut snapshot = ConfigSnapshot::new();
        for (id, rx) in self.configs.iter_mut() {
            let changed = rx.has_changed().unwrap_or(false);
            if let Some(config) = rx.borrow_and_update().clone() {
                if changed {
                    debug!("Using updated configuration for {id}");
                }
                snapshot.insert(id.to_string(), config);
            }
        }
        snapshot
    }

    fn handle_event(&mut self, event: SensorEvent) {
        let configs = self.snapshot();
        let results = self.processor.on_event(&event, &configs);
        self.dispatch(results, &configs);
    }

    fn handle_tick(&mut self) {
        let now = self.clock.now_millis();
        let configs = self.snapshot();
        let results = self.processor.on_tick(now, &configs);
        self.dispatch(results, &configs);
    }

    fn dispatch(&self, results: Vec<MetricEvaluationResult>, configs: &ConfigSnapshot) {
        let at = self.processor.last_evaluated_at().unwrap_or_default();
        for alert in fired_alerts(&results, at) {
            if let Some(config) = configs.get(&alert.channel_id) {
                if !config.waveform.is_empty() {
                    self.actuator.play(&config.waveform);
                }
            }
            if let Err(e) = self.alerts.try_send(alert) {
                warn!("Alert for {} not delivered: {e}", self.processor.kind());
            }
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn run_monitor(
    mut monitor: MetricMonitor,
    mut events: mpsc::Receiver<SensorEvent>,
    tick_millis: Option<u64>,
    mut shutdown: watch::Receiver<bool>,
) {
    let kind = monitor.processor.kind();
    let mut ticker = tick_millis.map(|millis| {
        let period = Duration::from_millis(millis.min(MAX_TICK_MILLIS));
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval
    });
    info!("Monitoring {kind} (tick: {tick_millis:?} ms)");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            event = events.recv() => match event {
                Some(event) => monitor.handle_event(event),
                None => break,
            },
            _ = next_tick(&mut ticker) => monitor.handle_tick(),
        }
    }

    info!("Stopped monitoring {kind}");
}

/// Handle to one running monitor
pub struct MonitorHandle {
    kind: MetricKind,
    events: mpsc::Sender<SensorEvent>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Supervisor for the per-metric monitors
pub struct AlertService {
    monitors: Vec<MonitorHandle>,
    shutdown: watch::Sender<bool>,
}

impl AlertService {
    /// Start a monitor for every enabled metric.
    ///
    /// Must be called from within a tokio runtime. Fired alerts go to
    /// `alerts`; metrics whose sensors are unavailable are returned as gaps.
    pub fn start(
        settings: &MonitorSettings,
        context: MonitorContext,
        alerts: mpsc::Sender<AlertFired>,
    ) -> (Self, Vec<CapabilityGap>) {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut monitors = Vec::new();
        let mut gaps = Vec::new();

        for kind in MetricKind::ALL {
            let options = settings.for_kind(kind);
            if !options.enabled {
                debug!("{kind} monitoring disabled in settings");
                continue;
            }

            let lease = match ResourceLease::acquire(Arc::clone(&context.resources), kind) {
                Ok(lease) => lease,
                Err(e) => {
                    warn!("Cannot monitor {kind}: {e}");
                    gaps.push(CapabilityGap {
                        kind,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let configs = kind
                .channels()
                .into_iter()
                .map(|spec| (spec.id, context.store.observe(spec.id)))
                .collect();

            let monitor = MetricMonitor {
                processor: MetricProcessor::with_options(
                    kind,
                    &options,
                    settings.cooldown_floor_millis(),
                ),
                configs,
                actuator: Arc::clone(&context.actuator),
                clock: Arc::clone(&context.clock),
                alerts: alerts.clone(),
                _lease: lease,
            };

            let (events, events_rx) = mpsc::channel(settings.event_buffer());
            let task = tokio::spawn(run_monitor(
                monitor,
                events_rx,
                options.tick_millis,
                shutdown_rx.clone(),
            ));
            monitors.push(MonitorHandle { kind, events, task });
        }

        (Self { monitors, shutdown }, gaps)
    }

    pub fn monitors(&self) -> impl Iterator<Item = &MonitorHandle> {
        self.monitors.iter()
    }

    /// Queue a sensor event for every monitor that consumes it.
    ///
    /// Never blocks; an event for a full queue is dropped. Returns the number of
    /// monitors the event was queued for.
    pub fn dispatch(&self, event: SensorEvent) -> usize {
        let mut queued = 0;
        for monitor in self.monitors.iter().filter(|m| m.kind.accepts(&event)) {
            match monitor.events.try_send(event.clone()) {
                Ok(()) => queued += 1,
                Err(e) => warn!("Dropping {} event: {e}", monitor.kind),
            }
        }
        queued
    }

    /// Stop every monitor and wait for its resources to be released
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        for monitor in self.monitors {
            let MonitorHandle { kind, events, task } = monitor;
            drop(events);
            if let Err(e) = task.await {
                warn!("{kind} monitor ended abnormally: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::testing::RecordingPlatform;
    use crate::platform::ManualClock;
    use crate::store::InMemoryConfigStore;
    use crate::types::Millis;
    use pretty_assertions::assert_eq;
    use tokio::time::timeout;

    struct Harness {
        service: AlertService,
        gaps: Vec<CapabilityGap>,
        alerts: mpsc::Receiver<AlertFired>,
        platform: Arc<RecordingPlatform>,
        clock: Arc<ManualClock>,
    }

    fn start(configs: Vec<AlertChannelConfig>, platform: RecordingPlatform, now: Millis) -> Harness {
        let platform = Arc::new(platform);
        let clock = Arc::new(ManualClock::new(now));
        let context = MonitorContext {
            store: Arc::new(InMemoryConfigStore::with_configs(configs)),
            actuator: platform.clone(),
            resources: platform.clone(),
            clock: clock.clone(),
        };
        let (tx, alerts) = mpsc::channel(16);
        let (service, gaps) = AlertService::start(&MonitorSettings::default(), context, tx);
        Harness {
            service,
            gaps,
            alerts,
            platform,
            clock,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_activity_fires_on_tick_then_cools_down() {
        let config = AlertChannelConfig::for_channel("low_activity", 100.0)
            .unwrap()
            .with_cooldown(300_000);
        let mut h = start(vec![config], RecordingPlatform::default(), 30_000);

        let alert = h.alerts.recv().await.unwrap();
        assert_eq!(alert.channel_id, "low_activity");
        assert_eq!(alert.message, "Steps last hour: 0");
        assert_eq!(h.platform.played_count(), 1);

        // Next tick is still inside the cooldown
        assert!(timeout(Duration::from_secs(31), h.alerts.recv()).await.is_err());

        h.clock.set(330_000);
        let again = h.alerts.recv().await.unwrap();
        assert_eq!(again.channel_id, "low_activity");
        assert_eq!(h.platform.played_count(), 2);

        h.service.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_heart_rate_sequence_fires_once() {
        let config = AlertChannelConfig::for_channel("high_heart_rate", 150.0)
            .unwrap()
            .with_cooldown(30_000);
        let mut h = start(vec![config], RecordingPlatform::default(), 0);

        for (bpm, t) in [(120.0, 0), (145.0, 1_000), (155.0, 2_000), (160.0, 3_000), (130.0, 4_000)] {
            let queued = h.service.dispatch(SensorEvent::HeartRate {
                bpm,
                timestamp_ms: t,
            });
            assert_eq!(queued, 2);
        }

        let alert = h.alerts.recv().await.unwrap();
        assert_eq!(alert.channel_id, "high_heart_rate");
        assert_eq!(alert.observed_value, 155.0);
        assert_eq!(alert.timestamp.timestamp_millis(), 2_000);
        assert!(timeout(Duration::from_secs(5), h.alerts.recv()).await.is_err());

        h.service.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_update_applies_to_running_monitor() {
        let store = Arc::new(InMemoryConfigStore::new());
        let platform = Arc::new(RecordingPlatform::default());
        let context = MonitorContext {
            store: store.clone(),
            actuator: platform.clone(),
            resources: platform.clone(),
            clock: Arc::new(ManualClock::new(0)),
        };
        let (tx, mut alerts) = mpsc::channel(16);
        let (service, _) = AlertService::start(&MonitorSettings::default(), context, tx);

        service.dispatch(SensorEvent::HeartRate {
            bpm: 45.0,
            timestamp_ms: 0,
        });
        assert!(timeout(Duration::from_secs(1), alerts.recv()).await.is_err());

        store.save(AlertChannelConfig::for_channel("low_heart_rate", 50.0).unwrap());
        service.dispatch(SensorEvent::HeartRate {
            bpm: 44.0,
            timestamp_ms: 1_000,
        });
        let alert = alerts.recv().await.unwrap();
        assert_eq!(alert.channel_id, "low_heart_rate");
        assert_eq!(alert.title, "Low Heart Rate Alert!");

        service.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_sensor_is_reported() {
        let h = start(Vec::new(), RecordingPlatform::without(&[MetricKind::Stress]), 0);
        assert_eq!(
            h.gaps,
            vec![CapabilityGap {
                kind: MetricKind::Stress,
                reason: "Sensor unavailable for stress: permission not granted".to_string(),
            }]
        );
        let kinds: Vec<_> = h.service.monitors().map(|m| m.kind()).collect();
        assert_eq!(
            kinds,
            vec![MetricKind::HeartRate, MetricKind::Activity, MetricKind::Calories]
        );
        assert_eq!(
            h.service.dispatch(SensorEvent::HeartRate {
                bpm: 70.0,
                timestamp_ms: 0
            }),
            1
        );
        h.service.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_releases_resources() {
        let h = start(Vec::new(), RecordingPlatform::default(), 0);
        assert_eq!(h.platform.registered.lock().unwrap().len(), 4);
        assert_eq!(h.platform.wake_locks.lock().unwrap().len(), 4);

        h.service.shutdown().await;
        assert!(h.platform.registered.lock().unwrap().is_empty());
        assert!(h.platform.wake_locks.lock().unwrap().is_empty());
    }
}
