//! Authoritative device set maintained by polling the bridge.
//!
//! The poll loop is the only mutator of the device map; every other
//! component reads snapshots or subscribes to the event stream. Removal
//! is debounced so a transient USB enumeration glitch never surfaces as
//! a disconnect.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mircast_protocol::{Device, DeviceState};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{Notify, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::bridge::Bridge;

/// Change events emitted in poll order.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RegistryEvent {
    DeviceAdded(Device),
    DeviceRemoved {
        serial: String,
    },
    DeviceStateChanged {
        serial: String,
        old: DeviceState,
        new: DeviceState,
    },
}

/// Tunables for the poll loop.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub poll_interval: Duration,
    /// Consecutive polls a device must be absent before it is removed
    pub miss_threshold: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            miss_threshold: 2,
        }
    }
}

struct Shared {
    devices: RwLock<HashMap<String, Device>>,
    events: broadcast::Sender<RegistryEvent>,
    shutdown: Notify,
}

/// Handle to the polling registry. Dropping the handle does not stop
/// the poll loop; call [`DeviceRegistry::shutdown`].
pub struct DeviceRegistry {
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl DeviceRegistry {
    /// Starts the poll loop against the given bridge.
    pub fn spawn(bridge: Arc<dyn Bridge>, config: RegistryConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        let shared = Arc::new(Shared {
            devices: RwLock::new(HashMap::new()),
            events,
            shutdown: Notify::new(),
        });

        let task = tokio::spawn(poll_loop(bridge, Arc::clone(&shared), config));
        Self { shared, task }
    }

    /// Snapshot of the current device set, sorted by serial.
    pub fn devices(&self) -> Vec<Device> {
        let mut devices: Vec<Device> = self.shared.devices.read().values().cloned().collect();
        devices.sort_by(|a, b| a.serial.cmp(&b.serial));
        devices
    }

    pub fn get(&self, serial: &str) -> Option<Device> {
        self.shared.devices.read().get(serial).cloned()
    }

    /// Subscribes to change events. Events are delivered in poll order;
    /// a lagging receiver loses the oldest events.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.shared.events.subscribe()
    }

    /// Waits until the serial shows up in the given state, bounded by
    /// `timeout`. Used by pairing verification.
    pub async fn wait_for_state(
        &self,
        serial: &str,
        state: DeviceState,
        timeout: Duration,
    ) -> Option<Device> {
        let mut events = self.subscribe();
        let wait = async {
            loop {
                if let Some(device) = self.get(serial) {
                    if device.state == state {
                        return device;
                    }
                }
                match events.recv().await {
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => {
                        std::future::pending::<()>().await;
                    }
                }
            }
        };
        tokio::time::timeout(timeout, wait).await.ok()
    }

    /// Stops the poll loop and waits for it to finish.
    pub async fn shutdown(self) {
        self.shared.shutdown.notify_one();
        let _ = self.task.await;
    }
}

async fn poll_loop(bridge: Arc<dyn Bridge>, shared: Arc<Shared>, config: RegistryConfig) {
    // Miss counters are private to the loop: nothing else mutates state.
    let mut misses: HashMap<String, u32> = HashMap::new();

    loop {
        match bridge.list_devices().await {
            Ok(observed) => {
                let events = {
                    let mut devices = shared.devices.write();
                    apply_poll(&mut devices, &mut misses, observed, config.miss_threshold)
                };
                for event in events {
                    debug!(target = "mircast.registry", ?event, "registry change");
                    let _ = shared.events.send(event);
                }
            }
            Err(err) => {
                // A failed poll is neither presence nor absence.
                warn!(target = "mircast.registry", error = %err, "device poll failed");
            }
        }

        tokio::select! {
            _ = shared.shutdown.notified() => break,
            _ = tokio::time::sleep(config.poll_interval) => {}
        }
    }
}

/// Applies one observed snapshot to the device map, returning the
/// change events in deterministic order: adds and state changes in
/// observation order, debounced removals last.
pub(crate) fn apply_poll(
    devices: &mut HashMap<String, Device>,
    misses: &mut HashMap<String, u32>,
    observed: Vec<Device>,
    miss_threshold: u32,
) -> Vec<RegistryEvent> {
    let mut events = Vec::new();
    let mut seen: Vec<String> = Vec::with_capacity(observed.len());

    for device in observed {
        misses.remove(&device.serial);
        seen.push(device.serial.clone());
        match devices.get_mut(&device.serial) {
            None => {
                devices.insert(device.serial.clone(), device.clone());
                events.push(RegistryEvent::DeviceAdded(device));
            }
            Some(existing) => {
                if existing.state != device.state {
                    events.push(RegistryEvent::DeviceStateChanged {
                        serial: device.serial.clone(),
                        old: existing.state,
                        new: device.state,
                    });
                }
                // Keep probed capability data; refresh what the bridge reports.
                existing.state = device.state;
                existing.transport = device.transport;
                if device.model.is_some() {
                    existing.model = device.model;
                }
                if device.ip_address.is_some() {
                    existing.ip_address = device.ip_address;
                }
            }
        }
    }

    let absent: Vec<String> = devices
        .keys()
        .filter(|serial| !seen.contains(serial))
        .cloned()
        .collect();
    for serial in absent {
        let count = misses.entry(serial.clone()).or_insert(0);
        *count += 1;
        if *count >= miss_threshold {
            misses.remove(&serial);
            devices.remove(&serial);
            events.push(RegistryEvent::DeviceRemoved { serial });
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeBridge;
    use mircast_protocol::DeviceState;

    fn ready(serial: &str) -> Device {
        Device::usb(serial, DeviceState::Ready)
    }

    #[test]
    fn add_and_remove_with_debounce() {
        let mut devices = HashMap::new();
        let mut misses = HashMap::new();

        let events = apply_poll(&mut devices, &mut misses, vec![ready("a")], 2);
        assert!(matches!(&events[..], [RegistryEvent::DeviceAdded(d)] if d.serial == "a"));

        // First absent poll: debounced, not removed.
        let events = apply_poll(&mut devices, &mut misses, vec![], 2);
        assert!(events.is_empty());
        assert!(devices.contains_key("a"));

        // Second consecutive absence crosses the threshold.
        let events = apply_poll(&mut devices, &mut misses, vec![], 2);
        assert!(matches!(&events[..], [RegistryEvent::DeviceRemoved { serial }] if serial == "a"));
        assert!(devices.is_empty());
    }

    #[test]
    fn flicker_resets_miss_counter() {
        let mut devices = HashMap::new();
        let mut misses = HashMap::new();

        apply_poll(&mut devices, &mut misses, vec![ready("a")], 2);
        apply_poll(&mut devices, &mut misses, vec![], 2);
        // Device reappears: the counter must reset.
        let events = apply_poll(&mut devices, &mut misses, vec![ready("a")], 2);
        assert!(events.is_empty());
        let events = apply_poll(&mut devices, &mut misses, vec![], 2);
        assert!(events.is_empty());
        assert!(devices.contains_key("a"));
    }

    #[test]
    fn state_change_emits_event_and_keeps_probed_data() {
        let mut devices = HashMap::new();
        let mut misses = HashMap::new();

        apply_poll(
            &mut devices,
            &mut misses,
            vec![Device::usb("a", DeviceState::Unauthorized)],
            2,
        );
        devices.get_mut("a").unwrap().physical_resolution = Some((1080, 2400));

        let events = apply_poll(&mut devices, &mut misses, vec![ready("a")], 2);
        assert!(matches!(
            &events[..],
            [RegistryEvent::DeviceStateChanged {
                old: DeviceState::Unauthorized,
                new: DeviceState::Ready,
                ..
            }]
        ));
        assert_eq!(
            devices["a"].physical_resolution,
            Some((1080, 2400)),
            "poll refresh must not clobber probed capabilities"
        );
    }

    #[tokio::test]
    async fn poll_loop_publishes_events_in_order() {
        let bridge = Arc::new(FakeBridge::new(vec![ready("a")]));
        let registry = DeviceRegistry::spawn(
            bridge.clone(),
            RegistryConfig {
                poll_interval: Duration::from_millis(10),
                miss_threshold: 2,
            },
        );
        let mut events = registry.subscribe();

        let added = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("poll loop should emit")
            .unwrap();
        assert!(matches!(added, RegistryEvent::DeviceAdded(d) if d.serial == "a"));
        assert_eq!(registry.devices().len(), 1);

        bridge.set_devices(vec![]);
        let removed = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("removal should be emitted after debounce")
            .unwrap();
        assert!(matches!(removed, RegistryEvent::DeviceRemoved { serial } if serial == "a"));
        assert!(registry.devices().is_empty());

        registry.shutdown().await;
    }
}
