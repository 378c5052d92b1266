//! Haptic Alerts - watch-side physiological alert engine
//!
//! Raw sensor readings are resolved into typed events, aggregated over rolling
//! time windows, and evaluated against per-channel thresholds with cooldowns.
//! A channel that fires plays its vibration waveform and emits an
//! [`AlertFired`] for the notification layer. Channel configurations and
//! waveforms travel between phone and watch in a small JSON protocol.
//!
//! ## Modules
//!
//! - **Signal processing**: [`window`], [`delta`], [`variability`], [`evaluator`], [`processor`]
//! - **Protocol**: [`codec`], [`catalog`], [`messaging`], [`store`]
//! - **Runtime**: [`monitor`] runs one tokio task per metric against the [`platform`] traits

pub mod adapters;
pub mod catalog;
pub mod codec;
pub mod delta;
pub mod error;
pub mod evaluator;
pub mod messaging;
pub mod monitor;
pub mod platform;
pub mod processor;
pub mod settings;
pub mod store;
pub mod types;
pub mod variability;
pub mod window;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use catalog::PatternCatalog;
pub use codec::VibrationWaveform;
pub use error::{AlertError, DecodeError, SettingsError};
pub use monitor::{AlertService, CapabilityGap, MonitorContext};
pub use processor::MetricProcessor;
pub use settings::MonitorSettings;
pub use types::{AlertChannelConfig, AlertFired, Direction, MetricKind, SensorEvent};

/// Library version reported by the CLI and FFI
pub const HAPTIC_VERSION: &str = env!("CARGO_PKG_VERSION");
