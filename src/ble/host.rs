//! Host-stack boundary.
//!
//! The connection state machine talks to Bluetooth through [`BleHost`], a
//! synchronous command/event seam. Commands are fire-and-forget: the host
//! acknowledges nothing inline and instead reports completions, failures,
//! advertisements, and inbound data as [`HostEvent`]s on a single-consumer
//! queue drained by [`BleHost::poll_event`].
//!
//! [`BtleplugHost`](crate::ble::btle::BtleplugHost) is the production
//! implementation; [`MockHost`](crate::ble::mock::MockHost) is a scripted
//! double for tests.

use bytes::Bytes;

use crate::ble::advertising::{Advertisement, PeripheralHandle};
use crate::config::{ScanParams, TargetService};
use crate::error::Result;

/// The TX/RX characteristic pair resolved on a connected peripheral.
///
/// Only exists while a subscription is being set up or streaming; torn down
/// with the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicRefs {
    /// Characteristic the peripheral notifies on.
    pub tx: btleplug::api::Characteristic,
    /// Characteristic the peripheral accepts writes on.
    pub rx: btleplug::api::Characteristic,
}

/// Why the GATT triplet could not be resolved on a connected peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResolveFailure {
    /// The target service is absent from the peripheral's GATT table.
    ServiceMissing,
    /// The service exists but its TX characteristic is missing.
    TxCharacteristicMissing,
    /// The service exists but its RX characteristic is missing.
    RxCharacteristicMissing,
}

impl std::fmt::Display for ResolveFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Self::ServiceMissing => "service not found",
            Self::TxCharacteristicMissing => "TX characteristic not found",
            Self::RxCharacteristicMissing => "RX characteristic not found",
        };
        write!(f, "{reason}")
    }
}

/// Why a peripheral link ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DisconnectReason {
    /// The relay asked for the disconnect.
    Requested,
    /// The link dropped without a local request (out of range, peer reset).
    LinkLost,
    /// The host stack gave no usable reason.
    Unknown,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Self::Requested => "requested",
            Self::LinkLost => "link lost",
            Self::Unknown => "unknown",
        };
        write!(f, "{reason}")
    }
}

/// Completion and data events reported by a [`BleHost`].
///
/// Events referring to an operation the state machine is no longer waiting
/// for (a late `Connected` after a stop, an advertisement outside a scan)
/// are logged and dropped by the consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// An advertisement was heard while scanning.
    Advertisement(Advertisement),
    /// The pending connect attempt succeeded.
    Connected,
    /// The pending connect attempt failed.
    ConnectFailed,
    /// Service discovery finished and the target triplet was found.
    ServicesResolved(CharacteristicRefs),
    /// Service discovery finished but the target triplet was incomplete.
    ResolveFailed(ResolveFailure),
    /// The notification subscription was accepted.
    Subscribed,
    /// The notification subscription was rejected.
    SubscribeFailed,
    /// The peripheral notified a payload on the TX characteristic.
    Notification(Bytes),
    /// The peripheral link ended.
    Disconnected(DisconnectReason),
}

/// Synchronous command surface over an asynchronous host stack.
///
/// All calls return promptly; long-running work completes via
/// [`HostEvent`]s. Implementations own the ordering of their own queue and
/// must deliver events for one logical link in the order they occurred.
pub trait BleHost {
    /// Begin scanning for advertisements.
    ///
    /// Returns an error only when the host can tell immediately that
    /// scanning is impossible; anything later is reported via events
    /// (or by silence, which the scan refresh cycle recovers from).
    fn start_scan(&mut self, params: &ScanParams) -> Result<()>;

    /// Stop an active scan. Idempotent.
    fn stop_scan(&mut self);

    /// Begin connecting to the peripheral behind `peer`.
    ///
    /// Completion arrives as [`HostEvent::Connected`] or
    /// [`HostEvent::ConnectFailed`].
    fn connect(&mut self, peer: &PeripheralHandle);

    /// Begin service discovery on the connected peripheral, hunting for
    /// `target`. Completion arrives as [`HostEvent::ServicesResolved`] or
    /// [`HostEvent::ResolveFailed`].
    fn resolve(&mut self, target: &TargetService);

    /// Begin subscribing to notifications on the resolved TX characteristic.
    /// Completion arrives as [`HostEvent::Subscribed`] or
    /// [`HostEvent::SubscribeFailed`].
    fn subscribe(&mut self, refs: &CharacteristicRefs);

    /// Write `payload` to the resolved RX characteristic without response.
    ///
    /// Delivery is best-effort, matching the write-without-response GATT
    /// semantics; failures are logged by the implementation.
    fn write(&mut self, refs: &CharacteristicRefs, payload: &[u8]) -> Result<()>;

    /// Tear down the active connection attempt or link. Idempotent.
    ///
    /// Host-reported disconnects for a link the relay tore down itself must
    /// not surface as [`HostEvent::Disconnected`].
    fn disconnect(&mut self);

    /// Take the next pending event, if any. Never blocks.
    fn poll_event(&mut self) -> Option<HostEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_failure_display() {
        assert_eq!(ResolveFailure::ServiceMissing.to_string(), "service not found");
        assert_eq!(
            ResolveFailure::TxCharacteristicMissing.to_string(),
            "TX characteristic not found"
        );
        assert_eq!(
            ResolveFailure::RxCharacteristicMissing.to_string(),
            "RX characteristic not found"
        );
    }

    #[test]
    fn disconnect_reason_display() {
        assert_eq!(DisconnectReason::Requested.to_string(), "requested");
        assert_eq!(DisconnectReason::LinkLost.to_string(), "link lost");
        assert_eq!(DisconnectReason::Unknown.to_string(), "unknown");
    }

    #[test]
    fn notification_event_carries_payload() {
        let event = HostEvent::Notification(Bytes::from_static(b"hello"));
        match event {
            HostEvent::Notification(payload) => assert_eq!(&payload[..], b"hello"),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
