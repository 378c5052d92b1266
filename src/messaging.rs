//! Phone↔watch messaging
//!
//! Delivery is at-most-once and unacknowledged. The phone side encodes and
//! broadcasts to every connected node; the watch side decodes on receipt and
//! either plays the waveform or stores the configuration. A message that
//! fails to decode is dropped and counted; the watch keeps its last-known
//! configuration.

use crate::codec::{
    decode_alert_config, decode_waveform, encode_alert_config, encode_waveform, DecodeDiagnostics,
    VibrationWaveform,
};
use crate::error::AlertError;
use crate::platform::VibrationActuator;
use crate::store::ConfigStore;
use crate::types::AlertChannelConfig;
use log::{debug, info, warn};
use std::sync::Arc;

/// Waveform-only messages, played immediately on receipt
pub const VIBRATE_PATTERN_PATH: &str = "/vibrate_pattern";

/// Alert-configuration messages, persisted on receipt
pub const ALERT_INFO_PATH: &str = "/alert_info";

/// Point-to-point transport between paired devices
pub trait MessageTransport: Send + Sync {
    /// Ids of the currently reachable nodes
    fn connected_nodes(&self) -> Vec<String>;

    /// Fire-and-forget send; failures are not reported
    fn send(&self, node_id: &str, path: &str, payload: Vec<u8>);
}

/// Phone-side sender of configurations and waveform previews
pub struct ConfigPublisher {
    transport: Arc<dyn MessageTransport>,
    store: Arc<dyn ConfigStore>,
}

impl ConfigPublisher {
    pub fn new(transport: Arc<dyn MessageTransport>, store: Arc<dyn ConfigStore>) -> Self {
        Self { transport, store }
    }

    /// Save a configuration locally and push it to every connected node.
    ///
    /// Returns the number of nodes the message was handed to.
    pub fn save_and_publish(&self, config: AlertChannelConfig) -> Result<usize, AlertError> {
        let payload = encode_alert_config(&config)?;
        let id = config.id.clone();
        self.store.save(config);
        let sent = self.broadcast(ALERT_INFO_PATH, payload);
        info!("Published alert {id} to {sent} node(s)");
        Ok(sent)
    }

    /// Ask every connected node to play a waveform now
    pub fn send_waveform(&self, waveform: &VibrationWaveform) -> Result<usize, AlertError> {
        let payload = encode_waveform(waveform)?;
        Ok(self.broadcast(VIBRATE_PATTERN_PATH, payload))
    }

    fn broadcast(&self, path: &str, payload: Vec<u8>) -> usize {
        let nodes = self.transport.connected_nodes();
        if nodes.is_empty() {
            warn!("No connected nodes for {path}; message dropped");
        }
        for node in &nodes {
            debug!("Sending {} bytes to {node} on {path}", payload.len());
            self.transport.send(node, path, payload.clone());
        }
        nodes.len()
    }
}

/// What the watch did with a received message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    Vibrated,
    ConfigStored(String),
    Skipped { reason: String },
    UnknownPath,
}

/// Watch-side dispatcher for received messages
pub struct MessageRouter {
    store: Arc<dyn ConfigStore>,
    actuator: Arc<dyn VibrationActuator>,
    diagnostics: Arc<DecodeDiagnostics>,
}

impl MessageRouter {
    pub fn new(store: Arc<dyn ConfigStore>, actuator: Arc<dyn VibrationActuator>) -> Self {
        Self {
            store,
            actuator,
            diagnostics: Arc::new(DecodeDiagnostics::default()),
        }
    }

    pub fn diagnostics(&self) -> Arc<DecodeDiagnostics> {
        Arc::clone(&self.diagnostics)
    }

    /// Handle one received message; never fails
    pub fn on_receive(&self, path: &str, payload: &[u8]) -> ReceiveOutcome {
        match path {
            VIBRATE_PATTERN_PATH => match decode_waveform(payload) {
                Ok(waveform) if waveform.is_empty() => {
                    debug!("Ignoring empty waveform");
                    ReceiveOutcome::Skipped {
                        reason: "empty waveform".to_string(),
                    }
                }
                Ok(waveform) => {
                    self.actuator.play(&waveform);
                    ReceiveOutcome::Vibrated
                }
                Err(e) => {
                    warn!("Dropping waveform message: {e}");
                    self.diagnostics.record_skipped_waveform();
                    ReceiveOutcome::Skipped {
                        reason: e.to_string(),
                    }
                }
            },
            ALERT_INFO_PATH => match decode_alert_config(payload) {
                Ok(config) => {
                    let id = config.id.clone();
                    self.store.save(config);
                    ReceiveOutcome::ConfigStored(id)
                }
                Err(e) => {
                    warn!("Dropping alert configuration message: {e}");
                    self.diagnostics.record_skipped_config();
                    ReceiveOutcome::Skipped {
                        reason: e.to_string(),
                    }
                }
            },
            other => {
                debug!("Ignoring message on unknown path {other}");
                ReceiveOutcome::UnknownPath
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::testing::RecordingPlatform;
    use crate::store::InMemoryConfigStore;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Transport that queues messages for later delivery
    #[derive(Default)]
    struct QueueTransport {
        nodes: Vec<String>,
        sent: Mutex<Vec<(String, String, Vec<u8>)>>,
    }

    impl MessageTransport for QueueTransport {
        fn connected_nodes(&self) -> Vec<String> {
            self.nodes.clone()
        }

        fn send(&self, node_id: &str, path: &str, payload: Vec<u8>) {
            self.sent
                .lock()
                .unwrap()
                .push((node_id.to_string(), path.to_string(), payload));
        }
    }

    fn watch_side() -> (Arc<InMemoryConfigStore>, Arc<RecordingPlatform>, MessageRouter) {
        let store = Arc::new(InMemoryConfigStore::new());
        let platform = Arc::new(RecordingPlatform::default());
        let router = MessageRouter::new(store.clone(), platform.clone());
        (store, platform, router)
    }

    #[test]
    fn test_config_reaches_watch_store() {
        let transport = Arc::new(QueueTransport {
            nodes: vec!["watch-1".to_string()],
            ..Default::default()
        });
        let phone_store = Arc::new(InMemoryConfigStore::new());
        let publisher = ConfigPublisher::new(transport.clone(), phone_store.clone());

        let config = AlertChannelConfig::for_channel("high_heart_rate", 150.0)
            .unwrap()
            .with_cooldown(30_000);
        assert_eq!(publisher.save_and_publish(config.clone()).unwrap(), 1);
        assert_eq!(phone_store.load("high_heart_rate"), Some(config.clone()));

        let (watch_store, _, router) = watch_side();
        for (_, path, payload) in transport.sent.lock().unwrap().iter() {
            assert_eq!(
                router.on_receive(path, payload),
                ReceiveOutcome::ConfigStored("high_heart_rate".to_string())
            );
        }
        assert_eq!(watch_store.load("high_heart_rate"), Some(config));
    }

    #[test]
    fn test_no_nodes_still_saves_locally() {
        let transport = Arc::new(QueueTransport::default());
        let store = Arc::new(InMemoryConfigStore::new());
        let publisher = ConfigPublisher::new(transport, store.clone());
        let config = AlertChannelConfig::for_channel("low_activity", 100.0).unwrap();
        assert_eq!(publisher.save_and_publish(config).unwrap(), 0);
        assert!(store.load("low_activity").is_some());
    }

    #[test]
    fn test_waveform_message_vibrates() {
        let transport = Arc::new(QueueTransport {
            nodes: vec!["watch-1".to_string(), "watch-2".to_string()],
            ..Default::default()
        });
        let publisher = ConfigPublisher::new(transport.clone(), Arc::new(InMemoryConfigStore::new()));
        let waveform = VibrationWaveform::new(vec![0, 100], vec![0, 255], -1).unwrap();
        assert_eq!(publisher.send_waveform(&waveform).unwrap(), 2);

        let (_, platform, router) = watch_side();
        let (_, path, payload) = transport.sent.lock().unwrap()[0].clone();
        assert_eq!(path, VIBRATE_PATTERN_PATH);
        assert_eq!(router.on_receive(&path, &payload), ReceiveOutcome::Vibrated);
        assert_eq!(platform.played.lock().unwrap()[0], waveform);
    }

    #[test]
    fn test_malformed_messages_are_counted() {
        let (store, platform, router) = watch_side();
        let existing = AlertChannelConfig::for_channel("high_heart_rate", 150.0).unwrap();
        store.save(existing.clone());

        let bad_config = br#"{"channelId":"high_heart_rate","enabled":true,"threshold":90,
            "waveform":{"timings":[10,10],"amplitudes":[5]}}"#;
        assert!(matches!(
            router.on_receive(ALERT_INFO_PATH, bad_config),
            ReceiveOutcome::Skipped { .. }
        ));
        assert!(matches!(
            router.on_receive(VIBRATE_PATTERN_PATH, b"{}"),
            ReceiveOutcome::Skipped { .. }
        ));

        // Last-known configuration stays in place
        assert_eq!(store.load("high_heart_rate"), Some(existing));
        assert_eq!(platform.played_count(), 0);

        let snapshot = router.diagnostics().snapshot();
        assert_eq!(snapshot.skipped_configs, 1);
        assert_eq!(snapshot.skipped_waveforms, 1);
    }

    #[test]
    fn test_unknown_path_and_empty_waveform() {
        let (_, platform, router) = watch_side();
        assert_eq!(router.on_receive("/survey", b"{}"), ReceiveOutcome::UnknownPath);
        assert!(matches!(
            router.on_receive(VIBRATE_PATTERN_PATH, br#"{"timings":[],"amplitudes":[]}"#),
            ReceiveOutcome::Skipped { .. }
        ));
        assert_eq!(platform.played_count(), 0);
        assert_eq!(router.diagnostics().snapshot().skipped_waveforms, 0);
    }
}
