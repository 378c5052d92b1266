//! Platform collaborators
//!
//! The host application owns the vibration motor, sensor registration, wake
//! locks and the wall clock. The engine reaches them only through the traits
//! here.

use crate::codec::VibrationWaveform;
use crate::error::AlertError;
use crate::types::{MetricKind, Millis};
use chrono::Utc;
use log::{debug, info};
use std::sync::atomic::{AtomicI64, Ordering};
use std::fmt;
use std::sync::Arc;

/// Vibration hardware; playback is fire-and-forget
pub trait VibrationActuator: Send + Sync {
    fn play(&self, waveform: &VibrationWaveform);
}

/// Actuator that only logs the pattern it would play
#[derive(Debug, Default)]
pub struct LoggingActuator;

impl VibrationActuator for LoggingActuator {
    fn play(&self, waveform: &VibrationWaveform) {
        info!(
            "Vibrate: {} segments, {} ms, repeat {}",
            waveform.len(),
            waveform.total_duration_ms(),
            waveform.repeat()
        );
    }
}

/// Sensor registration and wake-lock control
pub trait PlatformResources: Send + Sync {
    /// Register the sensors a metric needs; fails when the sensor is missing or
    /// permission has not been granted
    fn register_sensor(&self, kind: MetricKind) -> Result<(), AlertError>;

    fn unregister_sensor(&self, kind: MetricKind);

    fn acquire_wake_lock(&self, tag: &str);

    fn release_wake_lock(&self, tag: &str);
}

/// Sensor registration plus wake lock, held for the lifetime of one monitor.
///
/// Both are released when the lease is dropped.
pub struct ResourceLease {
    resources: Arc<dyn PlatformResources>,
    kind: MetricKind,
    tag: String,
}

impl ResourceLease {
    pub fn acquire(
        resources: Arc<dyn PlatformResources>,
        kind: MetricKind,
    ) -> Result<Self, AlertError> {
        resources.register_sensor(kind)?;
        let tag = format!("haptic-alerts:{kind}");
        resources.acquire_wake_lock(&tag);
        debug!("Acquired sensor and wake lock for {kind}");
        Ok(Self {
            resources,
            kind,
            tag,
        })
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }
}

impl fmt::Debug for ResourceLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceLease")
            .field("kind", &self.kind)
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

impl Drop for ResourceLease {
    fn drop(&mut self) {
        self.resources.release_wake_lock(&self.tag);
        self.resources.unregister_sensor(self.kind);
        debug!("Released sensor and wake lock for {}", self.kind);
    }
}

/// Source of "now" in milliseconds since the Unix epoch
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> Millis;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> Millis {
        Utc::now().timestamp_millis()
    }
}

/// Clock moved by hand, for tests and replay
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: Millis) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    pub fn set(&self, now: Millis) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: Millis) -> Millis {
        self.now.fetch_add(millis, Ordering::SeqCst) + millis
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> Millis {
        self.now.load(Ordering::SeqCst)
    }
}
