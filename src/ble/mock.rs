//! Scripted host-stack double for tests.
//!
//! [`MockHost`] implements [`BleHost`] without touching a radio. Tests hold
//! the paired [`MockScript`], queue the events the "hardware" should produce,
//! and afterwards inspect the commands the state machine issued. Always
//! compiled so downstream crates can drive the relay in their own tests.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use btleplug::api::{CharPropFlags, Characteristic};
use parking_lot::Mutex;

use crate::ble::advertising::PeripheralHandle;
use crate::ble::host::{BleHost, CharacteristicRefs, HostEvent};
use crate::ble::uuids::{NUS_RX_CHAR_UUID, NUS_SERVICE_UUID, NUS_TX_CHAR_UUID};
use crate::config::{ScanParams, TargetService};
use crate::error::{Error, Result};

/// A command the state machine issued to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    /// Scanning was started.
    StartScan,
    /// Scanning was stopped.
    StopScan,
    /// A connect was requested for the peer with this identifier.
    Connect(String),
    /// Service resolution was requested for this service UUID.
    Resolve(uuid::Uuid),
    /// A subscription was requested on this TX characteristic UUID.
    Subscribe(uuid::Uuid),
    /// This payload was written to the RX characteristic.
    Write(Vec<u8>),
    /// The link or pending attempt was torn down.
    Disconnect,
}

#[derive(Default)]
struct MockInner {
    events: VecDeque<HostEvent>,
    commands: Vec<HostCommand>,
    fail_next_scan: bool,
}

/// Scripting handle paired with a [`MockHost`].
///
/// Cloneable; keeps working after the host has been moved into a
/// [`ConnectionManager`](crate::ble::connection::ConnectionManager).
#[derive(Clone)]
pub struct MockScript {
    inner: Arc<Mutex<MockInner>>,
}

impl MockScript {
    /// Queue an event for the state machine to observe.
    pub fn push_event(&self, event: HostEvent) {
        self.inner.lock().events.push_back(event);
    }

    /// Number of events still queued.
    pub fn pending_events(&self) -> usize {
        self.inner.lock().events.len()
    }

    /// Drain and return every command issued so far.
    pub fn take_commands(&self) -> Vec<HostCommand> {
        std::mem::take(&mut self.inner.lock().commands)
    }

    /// Make the next `start_scan` call fail once.
    pub fn fail_next_scan(&self) {
        self.inner.lock().fail_next_scan = true;
    }
}

/// Scripted [`BleHost`] implementation.
pub struct MockHost {
    inner: Arc<Mutex<MockInner>>,
}

impl MockHost {
    /// Create a host and its scripting handle.
    pub fn new() -> (Self, MockScript) {
        let inner = Arc::new(Mutex::new(MockInner::default()));
        (
            Self {
                inner: inner.clone(),
            },
            MockScript { inner },
        )
    }
}

impl BleHost for MockHost {
    fn start_scan(&mut self, _params: &ScanParams) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.fail_next_scan {
            inner.fail_next_scan = false;
            return Err(Error::Internal("scripted scan failure".to_string()));
        }
        inner.commands.push(HostCommand::StartScan);
        Ok(())
    }

    fn stop_scan(&mut self) {
        self.inner.lock().commands.push(HostCommand::StopScan);
    }

    fn connect(&mut self, peer: &PeripheralHandle) {
        self.inner
            .lock()
            .commands
            .push(HostCommand::Connect(peer.identifier.clone()));
    }

    fn resolve(&mut self, target: &TargetService) {
        self.inner
            .lock()
            .commands
            .push(HostCommand::Resolve(target.service));
    }

    fn subscribe(&mut self, refs: &CharacteristicRefs) {
        self.inner
            .lock()
            .commands
            .push(HostCommand::Subscribe(refs.tx.uuid));
    }

    fn write(&mut self, _refs: &CharacteristicRefs, payload: &[u8]) -> Result<()> {
        self.inner
            .lock()
            .commands
            .push(HostCommand::Write(payload.to_vec()));
        Ok(())
    }

    fn disconnect(&mut self) {
        self.inner.lock().commands.push(HostCommand::Disconnect);
    }

    fn poll_event(&mut self) -> Option<HostEvent> {
        self.inner.lock().events.pop_front()
    }
}

/// Characteristic refs for the stock NUS triplet, for scripting
/// [`HostEvent::ServicesResolved`].
pub fn nus_characteristics() -> CharacteristicRefs {
    CharacteristicRefs {
        tx: Characteristic {
            uuid: NUS_TX_CHAR_UUID,
            service_uuid: NUS_SERVICE_UUID,
            properties: CharPropFlags::NOTIFY,
            descriptors: BTreeSet::new(),
        },
        rx: Characteristic {
            uuid: NUS_RX_CHAR_UUID,
            service_uuid: NUS_SERVICE_UUID,
            properties: CharPropFlags::WRITE_WITHOUT_RESPONSE | CharPropFlags::WRITE,
            descriptors: BTreeSet::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    #[test]
    fn events_replay_in_order() {
        let (mut host, script) = MockHost::new();
        script.push_event(HostEvent::Connected);
        script.push_event(HostEvent::Notification(Bytes::from_static(b"one")));
        assert_eq!(script.pending_events(), 2);

        assert_eq!(host.poll_event(), Some(HostEvent::Connected));
        assert_eq!(
            host.poll_event(),
            Some(HostEvent::Notification(Bytes::from_static(b"one")))
        );
        assert_eq!(host.poll_event(), None);
    }

    #[test]
    fn commands_are_recorded() {
        let (mut host, script) = MockHost::new();
        host.start_scan(&ScanParams::default()).unwrap();
        host.stop_scan();
        host.disconnect();

        assert_eq!(
            script.take_commands(),
            vec![
                HostCommand::StartScan,
                HostCommand::StopScan,
                HostCommand::Disconnect
            ]
        );
        assert!(script.take_commands().is_empty());
    }

    #[test]
    fn scripted_scan_failure_fires_once() {
        let (mut host, script) = MockHost::new();
        script.fail_next_scan();
        assert!(host.start_scan(&ScanParams::default()).is_err());
        assert!(host.start_scan(&ScanParams::default()).is_ok());
    }

    #[test]
    fn nus_refs_use_the_stock_triplet() {
        let refs = nus_characteristics();
        assert_eq!(refs.tx.uuid, NUS_TX_CHAR_UUID);
        assert_eq!(refs.rx.uuid, NUS_RX_CHAR_UUID);
        assert_eq!(refs.tx.service_uuid, refs.rx.service_uuid);
        assert!(refs.tx.properties.contains(CharPropFlags::NOTIFY));
    }
}
