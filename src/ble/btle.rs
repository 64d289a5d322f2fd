//! btleplug-backed host stack.
//!
//! [`BtleplugHost`] implements [`BleHost`] over the system Bluetooth stack.
//! Every command returns promptly: the long-running work happens in spawned
//! tasks that report back through the host event queue. A persistent task
//! watches adapter events for advertisements and link loss; per-operation
//! tasks handle connect, service resolution, the notification pump, writes,
//! and tear-down.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use bytes::Bytes;
use futures::stream::StreamExt;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::ble::advertising::{Advertisement, PeripheralHandle};
use crate::ble::host::{BleHost, CharacteristicRefs, DisconnectReason, HostEvent, ResolveFailure};
use crate::config::{ScanParams, TargetService};
use crate::error::{Error, Result};

/// The peripheral a connect attempt selected, tracked until tear-down.
struct ActiveLink {
    id: PeripheralId,
    peripheral: Peripheral,
}

/// Production [`BleHost`] over btleplug.
pub struct BtleplugHost {
    /// The BLE adapter all operations go through.
    adapter: Adapter,
    /// Producer side of the host event queue.
    events_tx: mpsc::UnboundedSender<HostEvent>,
    /// Consumer side, drained by `poll_event`.
    events_rx: mpsc::UnboundedReceiver<HostEvent>,
    /// Peripherals seen in the current scan, by identifier.
    discovered: Arc<RwLock<HashMap<String, Peripheral>>>,
    /// Whether scanning is currently active.
    is_scanning: Arc<RwLock<bool>>,
    /// Whether the notification pump should keep running.
    is_streaming: Arc<RwLock<bool>>,
    /// The link (or pending attempt) currently held.
    active: Arc<RwLock<Option<ActiveLink>>>,
    /// Handle to the persistent adapter event task.
    central_task: tokio::task::JoinHandle<()>,
    /// Handle to the scan refresh task.
    refresh_task: Option<tokio::task::JoinHandle<()>>,
    /// Handle to the notification pump task.
    notify_task: Option<tokio::task::JoinHandle<()>>,
}

impl BtleplugHost {
    /// Create a host on the first available Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self::with_adapter(adapter))
    }

    /// Create a host on a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let discovered = Arc::new(RwLock::new(HashMap::new()));
        let is_scanning = Arc::new(RwLock::new(false));
        let is_streaming = Arc::new(RwLock::new(false));
        let active: Arc<RwLock<Option<ActiveLink>>> = Arc::new(RwLock::new(None));

        let central_task = tokio::spawn(Self::central_event_loop(
            adapter.clone(),
            events_tx.clone(),
            discovered.clone(),
            is_scanning.clone(),
            is_streaming.clone(),
            active.clone(),
        ));

        Self {
            adapter,
            events_tx,
            events_rx,
            discovered,
            is_scanning,
            is_streaming,
            active,
            central_task,
            refresh_task: None,
            notify_task: None,
        }
    }

    /// Persistent adapter event loop: forwards advertisements while a scan
    /// is active and reports loss of the active link.
    async fn central_event_loop(
        adapter: Adapter,
        events_tx: mpsc::UnboundedSender<HostEvent>,
        discovered: Arc<RwLock<HashMap<String, Peripheral>>>,
        is_scanning: Arc<RwLock<bool>>,
        is_streaming: Arc<RwLock<bool>>,
        active: Arc<RwLock<Option<ActiveLink>>>,
    ) {
        let mut events = match adapter.events().await {
            Ok(events) => events,
            Err(e) => {
                error!("Failed to get adapter events: {}", e);
                return;
            }
        };

        while let Some(event) = events.next().await {
            match event {
                CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                    if !*is_scanning.read() {
                        continue;
                    }
                    Self::report_advertisement(&adapter, id, &discovered, &events_tx).await;
                }
                CentralEvent::DeviceConnected(id) => {
                    debug!("Device connected: {:?}", id);
                }
                CentralEvent::DeviceDisconnected(id) => {
                    let was_active = active
                        .read()
                        .as_ref()
                        .map(|link| link.id == id)
                        .unwrap_or(false);
                    if was_active {
                        debug!("Active peripheral disconnected: {:?}", id);
                        active.write().take();
                        *is_streaming.write() = false;
                        let _ = events_tx.send(HostEvent::Disconnected(DisconnectReason::LinkLost));
                    } else {
                        trace!("Device disconnected: {:?}", id);
                    }
                }
                _ => {}
            }
        }

        debug!("Central event loop ended");
    }

    /// Turn a discovery/update event into an advertisement report.
    async fn report_advertisement(
        adapter: &Adapter,
        id: PeripheralId,
        discovered: &Arc<RwLock<HashMap<String, Peripheral>>>,
        events_tx: &mpsc::UnboundedSender<HostEvent>,
    ) {
        let peripheral = match adapter.peripheral(&id).await {
            Ok(p) => p,
            Err(e) => {
                trace!("Failed to get peripheral: {}", e);
                return;
            }
        };

        let properties = match peripheral.properties().await {
            Ok(Some(p)) => p,
            _ => return,
        };

        let identifier = id.to_string();
        discovered.write().insert(identifier.clone(), peripheral);

        let advertisement = Advertisement {
            identifier,
            local_name: properties.local_name,
            services: properties.services,
            rssi: properties.rssi,
        };

        trace!(
            "Advertisement from {} ({} service uuids)",
            advertisement.display_name(),
            advertisement.services.len()
        );

        let _ = events_tx.send(HostEvent::Advertisement(advertisement));
    }

    /// Hunt for the target triplet on a connected peripheral.
    async fn resolve_target(peripheral: &Peripheral, target: &TargetService) -> HostEvent {
        debug!("Discovering services (target {})", target.service);

        if let Err(e) = peripheral.discover_services().await {
            warn!("Failed to discover services: {}", e);
            return HostEvent::ResolveFailed(ResolveFailure::ServiceMissing);
        }

        let service = peripheral
            .services()
            .into_iter()
            .find(|service| service.uuid == target.service);

        let service = match service {
            Some(service) => service,
            None => return HostEvent::ResolveFailed(ResolveFailure::ServiceMissing),
        };

        let mut tx_char = None;
        let mut rx_char = None;
        for characteristic in service.characteristics {
            trace!(
                "Found characteristic {} ({:?})",
                characteristic.uuid,
                characteristic.properties
            );
            if characteristic.uuid == target.tx {
                tx_char = Some(characteristic);
            } else if characteristic.uuid == target.rx {
                rx_char = Some(characteristic);
            }
        }

        let tx_char = match tx_char {
            Some(c) => c,
            None => return HostEvent::ResolveFailed(ResolveFailure::TxCharacteristicMissing),
        };
        let rx_char = match rx_char {
            Some(c) => c,
            None => return HostEvent::ResolveFailed(ResolveFailure::RxCharacteristicMissing),
        };

        // Diagnostic only: log the initial TX value when the peripheral
        // allows reads
        if tx_char.properties.contains(CharPropFlags::READ) {
            match peripheral.read(&tx_char).await {
                Ok(value) => debug!(
                    "Initial TX value: {} bytes, data: {:02X?}",
                    value.len(),
                    &value[..std::cmp::min(value.len(), 20)]
                ),
                Err(e) => debug!("Diagnostic TX read failed: {}", e),
            }
        }

        HostEvent::ServicesResolved(CharacteristicRefs {
            tx: tx_char,
            rx: rx_char,
        })
    }

    fn active_peripheral(&self) -> Option<Peripheral> {
        self.active.read().as_ref().map(|link| link.peripheral.clone())
    }
}

impl BleHost for BtleplugHost {
    fn start_scan(&mut self, params: &ScanParams) -> Result<()> {
        if *self.is_scanning.read() {
            debug!("Already scanning, ignoring start request");
            return Ok(());
        }

        *self.is_scanning.write() = true;
        // A fresh scan starts from a clean slate; peers seen earlier must
        // advertise again to become candidates
        self.discovered.write().clear();

        info!(
            "Starting BLE scan ({}, interval {} ms, window {} ms; timing is advisory)",
            if params.active { "active" } else { "passive" },
            params.interval_ms,
            params.window_ms
        );

        let adapter = self.adapter.clone();
        let is_scanning = self.is_scanning.clone();
        let refresh = params.refresh;

        let handle = tokio::spawn(async move {
            // The stop issued at candidate selection is also a spawned task
            // and may still be in flight; stop-then-start keeps the radio on
            // whichever order the two land in
            if let Err(e) = adapter.stop_scan().await {
                trace!("Stop before start failed: {}", e);
            }
            // Unfiltered platform scan; candidate selection happens in one
            // place upstream
            if let Err(e) = adapter.start_scan(ScanFilter::default()).await {
                warn!("Failed to start scan: {}", e);
            }

            let period = match refresh {
                Some(period) => period,
                None => return,
            };

            while *is_scanning.read() {
                tokio::time::sleep(period).await;
                if !*is_scanning.read() {
                    break;
                }
                trace!("Refreshing platform scan");
                if let Err(e) = adapter.stop_scan().await {
                    trace!("Stop before refresh failed: {}", e);
                }
                if let Err(e) = adapter.start_scan(ScanFilter::default()).await {
                    warn!("Scan refresh failed: {}", e);
                }
            }
        });
        self.refresh_task = Some(handle);

        Ok(())
    }

    fn stop_scan(&mut self) {
        if !*self.is_scanning.read() {
            return;
        }
        debug!("Stopping BLE scan");
        *self.is_scanning.write() = false;

        if let Some(handle) = self.refresh_task.take() {
            handle.abort();
        }

        let adapter = self.adapter.clone();
        tokio::spawn(async move {
            if let Err(e) = adapter.stop_scan().await {
                debug!("Failed to stop scan: {}", e);
            }
        });
    }

    fn connect(&mut self, peer: &PeripheralHandle) {
        let peripheral = self.discovered.read().get(&peer.identifier).cloned();
        let peripheral = match peripheral {
            Some(p) => p,
            None => {
                warn!("Peripheral {} vanished before connect", peer);
                let _ = self.events_tx.send(HostEvent::ConnectFailed);
                return;
            }
        };

        *self.active.write() = Some(ActiveLink {
            id: peripheral.id(),
            peripheral: peripheral.clone(),
        });

        let events_tx = self.events_tx.clone();
        let active = self.active.clone();
        let peer_display = peer.to_string();

        tokio::spawn(async move {
            let id = peripheral.id();

            debug!("Connecting to {}", peer_display);
            match peripheral.connect().await {
                Ok(()) => {
                    // A stop may have raced the attempt; a link nobody is
                    // waiting for must not be left up
                    let wanted = active
                        .read()
                        .as_ref()
                        .map(|link| link.id == id)
                        .unwrap_or(false);
                    if !wanted {
                        debug!("Attempt to {} was abandoned, dropping the link", peer_display);
                        let _ = peripheral.disconnect().await;
                        return;
                    }
                    info!("Connected to {}", peer_display);
                    let _ = events_tx.send(HostEvent::Connected);
                }
                Err(e) => {
                    warn!("Failed to connect to {}: {}", peer_display, e);
                    // Clear the slot only if this attempt still owns it; a
                    // newer attempt must not lose its link to a stale failure
                    let mut slot = active.write();
                    let ours = slot.as_ref().map(|link| link.id == id).unwrap_or(false);
                    if ours {
                        slot.take();
                        drop(slot);
                        let _ = events_tx.send(HostEvent::ConnectFailed);
                    }
                }
            }
        });
    }

    fn resolve(&mut self, target: &TargetService) {
        let peripheral = match self.active_peripheral() {
            Some(p) => p,
            None => {
                warn!("Resolve requested with no active link");
                let _ = self
                    .events_tx
                    .send(HostEvent::ResolveFailed(ResolveFailure::ServiceMissing));
                return;
            }
        };

        let events_tx = self.events_tx.clone();
        let target = *target;

        tokio::spawn(async move {
            let event = Self::resolve_target(&peripheral, &target).await;
            let _ = events_tx.send(event);
        });
    }

    fn subscribe(&mut self, refs: &CharacteristicRefs) {
        let peripheral = match self.active_peripheral() {
            Some(p) => p,
            None => {
                warn!("Subscribe requested with no active link");
                let _ = self.events_tx.send(HostEvent::SubscribeFailed);
                return;
            }
        };

        *self.is_streaming.write() = true;

        let events_tx = self.events_tx.clone();
        let is_streaming = self.is_streaming.clone();
        let tx_char = refs.tx.clone();

        let handle = tokio::spawn(async move {
            debug!("Subscribing to notifications from {}", tx_char.uuid);
            if let Err(e) = peripheral.subscribe(&tx_char).await {
                warn!("Failed to subscribe to {}: {}", tx_char.uuid, e);
                *is_streaming.write() = false;
                let _ = events_tx.send(HostEvent::SubscribeFailed);
                return;
            }

            let mut notifications = match peripheral.notifications().await {
                Ok(n) => n,
                Err(e) => {
                    error!("Failed to get notifications stream: {}", e);
                    *is_streaming.write() = false;
                    let _ = events_tx.send(HostEvent::SubscribeFailed);
                    return;
                }
            };

            // Reported only once the pump is ready; no notification can
            // slip past between Subscribed and the first poll of the stream
            let _ = events_tx.send(HostEvent::Subscribed);

            while *is_streaming.read() {
                tokio::select! {
                    maybe = notifications.next() => match maybe {
                        Some(notification) if notification.uuid == tx_char.uuid => {
                            trace!(
                                "Notification: {} bytes, data: {:02X?}",
                                notification.value.len(),
                                &notification.value[..std::cmp::min(notification.value.len(), 20)]
                            );
                            let _ = events_tx
                                .send(HostEvent::Notification(Bytes::from(notification.value)));
                        }
                        Some(notification) => {
                            trace!("Ignoring notification from {}", notification.uuid);
                        }
                        None => break,
                    },
                    _ = tokio::time::sleep(Duration::from_millis(50)) => {
                        // Loop condition re-checks the streaming flag
                    }
                }
            }

            debug!("Notification pump stopped");
        });
        self.notify_task = Some(handle);
    }

    fn write(&mut self, refs: &CharacteristicRefs, payload: &[u8]) -> Result<()> {
        let peripheral = match self.active_peripheral() {
            Some(p) => p,
            None => return Err(Error::Internal("write with no active link".to_string())),
        };

        let rx_char = refs.rx.clone();
        let payload = payload.to_vec();

        tokio::spawn(async move {
            match peripheral
                .write(&rx_char, &payload, WriteType::WithoutResponse)
                .await
            {
                Ok(()) => trace!("Wrote {} bytes to {}", payload.len(), rx_char.uuid),
                Err(e) => warn!(
                    "Failed to write {} bytes to {}: {}",
                    payload.len(),
                    rx_char.uuid,
                    e
                ),
            }
        });

        Ok(())
    }

    fn disconnect(&mut self) {
        *self.is_streaming.write() = false;
        if let Some(handle) = self.notify_task.take() {
            handle.abort();
        }

        // Clearing the active slot first keeps the central loop from
        // reporting this tear-down as a link loss
        let link = self.active.write().take();
        let link = match link {
            Some(link) => link,
            None => return,
        };

        tokio::spawn(async move {
            match link.peripheral.disconnect().await {
                Ok(()) => info!("Disconnected from {:?}", link.id),
                Err(e) => debug!("Disconnect failed (link may already be down): {}", e),
            }
        });
    }

    fn poll_event(&mut self) -> Option<HostEvent> {
        self.events_rx.try_recv().ok()
    }
}

impl Drop for BtleplugHost {
    fn drop(&mut self) {
        *self.is_scanning.write() = false;
        *self.is_streaming.write() = false;
        if let Some(handle) = self.refresh_task.take() {
            handle.abort();
        }
        if let Some(handle) = self.notify_task.take() {
            handle.abort();
        }
        self.central_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_is_send() {
        // The host moves into the driver task on some call sites
        fn assert_send<T: Send>() {}
        assert_send::<BtleplugHost>();
    }
}
