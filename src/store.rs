//! Alert configuration store
//!
//! The watch keeps one record per channel id; the latest write wins. Readers
//! get a `watch` receiver per channel, so a monitoring task always sees a
//! whole record and never a partially applied update.

use crate::codec::{decode_alert_config_list, encode_alert_config};
use crate::error::{AlertError, DecodeError};
use crate::types::AlertChannelConfig;
use log::{info, warn};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::watch;

/// Key-value persistence for alert channel configurations
pub trait ConfigStore: Send + Sync {
    /// Current configuration for a channel, if any
    fn load(&self, channel_id: &str) -> Option<AlertChannelConfig>;

    /// Change stream for a channel; the receiver starts at the current value
    fn observe(&self, channel_id: &str) -> watch::Receiver<Option<AlertChannelConfig>>;

    /// Replace a channel's configuration
    fn save(&self, config: AlertChannelConfig);
}

/// Process-local store backed by one `watch` channel per channel id
#[derive(Debug, Default)]
pub struct InMemoryConfigStore {
    channels: Mutex<HashMap<String, watch::Sender<Option<AlertChannelConfig>>>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with configurations
    pub fn with_configs(configs: impl IntoIterator<Item = AlertChannelConfig>) -> Self {
        let store = Self::new();
        for config in configs {
            store.save(config);
        }
        store
    }

    fn with_sender<R>(
        &self,
        channel_id: &str,
        f: impl FnOnce(&watch::Sender<Option<AlertChannelConfig>>) -> R,
    ) -> R {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let sender = channels
            .entry(channel_id.to_string())
            .or_insert_with(|| watch::channel(None).0);
        f(sender)
    }

    /// Every stored configuration, sorted by channel id
    pub fn snapshot(&self) -> Vec<AlertChannelConfig> {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let mut configs: Vec<AlertChannelConfig> = channels
            .values()
            .filter_map(|sender| sender.borrow().clone())
            .collect();
        configs.sort_by(|a, b| a.id.cmp(&b.id));
        configs
    }

    /// Serialize every stored configuration as a JSON array of alert messages
    pub fn to_json(&self) -> Result<String, AlertError> {
        let messages = self
            .snapshot()
            .iter()
            .map(|config| {
                let bytes = encode_alert_config(config)?;
                serde_json::from_slice::<serde_json::Value>(&bytes)
                    .map_err(|e| AlertError::Encoding(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        serde_json::to_string_pretty(&messages).map_err(|e| AlertError::Encoding(e.to_string()))
    }

    /// Load a JSON array of alert messages, skipping malformed entries.
    ///
    /// Returns the number of entries skipped.
    pub fn load_json(&self, json: &str) -> Result<usize, DecodeError> {
        let (configs, skipped) = decode_alert_config_list(json)?;
        for config in configs {
            self.save(config);
        }
        Ok(skipped.len())
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn load(&self, channel_id: &str) -> Option<AlertChannelConfig> {
        self.with_sender(channel_id, |sender| sender.borrow().clone())
    }

    fn observe(&self, channel_id: &str) -> watch::Receiver<Option<AlertChannelConfig>> {
        self.with_sender(channel_id, |sender| sender.subscribe())
    }

    fn save(&self, config: AlertChannelConfig) {
        if !config.enabled {
            info!("Alert {} saved as disabled", config.id);
        } else if config.threshold.is_none() {
            warn!("Alert {} saved without a threshold; it will not fire", config.id);
        } else {
            info!("Alert {} updated", config.id);
        }
        let id = config.id.clone();
        self.with_sender(&id, |sender| {
            sender.send_replace(Some(config));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Direction;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_load_missing_is_none() {
        let store = InMemoryConfigStore::new();
        assert_eq!(store.load("high_heart_rate"), None);
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_latest_write_wins() {
        let store = InMemoryConfigStore::new();
        store.save(AlertChannelConfig::for_channel("high_heart_rate", 150.0).unwrap());
        store.save(AlertChannelConfig::for_channel("high_heart_rate", 140.0).unwrap());
        assert_eq!(store.load("high_heart_rate").unwrap().threshold, Some(140.0));
    }

    #[test]
    fn test_observer_sees_updates() {
        let store = InMemoryConfigStore::new();
        let mut rx = store.observe("low_activity");
        assert_eq!(*rx.borrow(), None);

        store.save(AlertChannelConfig::for_channel("low_activity", 200.0).unwrap());
        assert!(rx.has_changed().unwrap());
        let seen = rx.borrow_and_update().clone().unwrap();
        assert_eq!(seen.direction, Direction::Below);
        assert_eq!(seen.threshold, Some(200.0));
    }

    #[test]
    fn test_json_snapshot_reloads() {
        let store = InMemoryConfigStore::with_configs([
            AlertChannelConfig::for_channel("high_stress", 2.5).unwrap(),
            AlertChannelConfig::for_channel("high_heart_rate", 150.0)
                .unwrap()
                .with_cooldown(60_000),
        ]);
        let json = store.to_json().unwrap();

        let restored = InMemoryConfigStore::new();
        assert_eq!(restored.load_json(&json).unwrap(), 0);
        assert_eq!(restored.snapshot(), store.snapshot());
    }

    #[test]
    fn test_json_snapshot_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.json");

        let store = InMemoryConfigStore::with_configs([AlertChannelConfig::for_channel(
            "low_calories",
            30.0,
        )
        .unwrap()]);
        std::fs::write(&path, store.to_json().unwrap()).unwrap();

        let restored = InMemoryConfigStore::new();
        let json = std::fs::read_to_string(&path).unwrap();
        assert_eq!(restored.load_json(&json).unwrap(), 0);
        assert_eq!(restored.load("low_calories").unwrap().threshold, Some(30.0));
    }
}
