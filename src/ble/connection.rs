//! Connection lifecycle state machine.
//!
//! [`ConnectionManager`] owns the full central-role lifecycle for a single
//! peripheral: scan, select a candidate, connect, resolve the target GATT
//! triplet, subscribe, stream, and recover. The machine is single-threaded;
//! the driver pumps it by calling [`ConnectionManager::advance`] at a steady
//! cadence and every transition happens inside that call.
//!
//! Failure handling is uniform: any transient link failure lands in
//! [`ConnectionState::Failed`] or [`ConnectionState::Disconnecting`], both of
//! which roll back into a fresh scan on the next pump. The relay never gives
//! up and never needs external intervention to resume hunting.

use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crate::ble::advertising::{PeripheralHandle, ServiceFilter};
use crate::ble::host::{BleHost, CharacteristicRefs, HostEvent};
use crate::config::{RelayConfig, ScanParams, TargetService};
use crate::error::{Error, Result};
use crate::sink::NotificationSink;

/// Lifecycle state of the relay's single peripheral link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionState {
    /// Not started, or stopped. The radio is quiet.
    #[default]
    Idle,
    /// Hunting for advertisements that carry the target service.
    Scanning,
    /// A matching advertisement was seen and a peer selected.
    CandidateFound,
    /// A connect attempt is in flight.
    Connecting,
    /// Connected; hunting for the target service and characteristics.
    ResolvingServices,
    /// Triplet resolved; the TX notification subscription is in flight.
    Subscribing,
    /// Subscribed; inbound notifications flow to the sink.
    Streaming,
    /// A streaming link ended; tear-down before the next scan.
    Disconnecting,
    /// A setup step failed; rescan on the next pump.
    Failed,
}

impl ConnectionState {
    /// Check if the link is fully up and streaming.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Streaming)
    }

    /// States in which the machine holds a selected peripheral handle.
    pub fn holds_peripheral(&self) -> bool {
        matches!(
            self,
            Self::CandidateFound
                | Self::Connecting
                | Self::ResolvingServices
                | Self::Subscribing
                | Self::Streaming
                | Self::Disconnecting
        )
    }

    /// States in which the machine holds resolved characteristic refs.
    pub fn holds_characteristics(&self) -> bool {
        matches!(self, Self::Subscribing | Self::Streaming)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::Scanning => "Scanning",
            Self::CandidateFound => "CandidateFound",
            Self::Connecting => "Connecting",
            Self::ResolvingServices => "ResolvingServices",
            Self::Subscribing => "Subscribing",
            Self::Streaming => "Streaming",
            Self::Disconnecting => "Disconnecting",
            Self::Failed => "Failed",
        };
        write!(f, "{name}")
    }
}

/// Event emitted on every state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    /// The state the machine left.
    pub from: ConnectionState,
    /// The state the machine entered.
    pub to: ConnectionState,
}

/// Drives the connect/stream/recover lifecycle over a [`BleHost`].
///
/// Generic over the host (production btleplug binding or a scripted test
/// double) and the sink that receives streamed payloads. All methods take
/// `&mut self`; callers serialize access by construction rather than locks.
pub struct ConnectionManager<H: BleHost, S: NotificationSink> {
    /// GATT triplet to resolve on the connected peripheral.
    target: TargetService,
    /// Scan timing handed to the host on every (re)scan.
    scan: ScanParams,
    /// Candidate selection predicate.
    filter: ServiceFilter,
    /// Host stack the machine issues commands to.
    host: H,
    /// Destination for streamed notification payloads.
    sink: S,
    /// Current lifecycle state.
    state: ConnectionState,
    /// Selected peer; `Some` exactly while `state.holds_peripheral()`.
    candidate: Option<PeripheralHandle>,
    /// Resolved triplet; `Some` exactly while `state.holds_characteristics()`.
    characteristics: Option<CharacteristicRefs>,
    /// Channel for state transition events.
    transition_tx: broadcast::Sender<StateChange>,
}

impl<H: BleHost, S: NotificationSink> ConnectionManager<H, S> {
    /// Create a new manager from a validated configuration.
    ///
    /// Returns [`Error::InvalidConfig`] when the config cannot be used; a
    /// bad config never reaches the radio.
    pub fn new(config: &RelayConfig, host: H, sink: S) -> Result<Self> {
        config.validate()?;
        let (transition_tx, _) = broadcast::channel(32);

        Ok(Self {
            target: config.target,
            scan: config.scan,
            filter: ServiceFilter::new(config.target.service),
            host,
            sink,
            state: ConnectionState::Idle,
            candidate: None,
            characteristics: None,
            transition_tx,
        })
    }

    /// Get the current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Check if a peripheral link is up and streaming.
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Subscribe to state transition events.
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<StateChange> {
        self.transition_tx.subscribe()
    }

    /// Leave [`ConnectionState::Idle`] and begin scanning.
    ///
    /// A no-op when the lifecycle is already running. Returns an error only
    /// when the host rejects the initial scan outright.
    pub fn start(&mut self) -> Result<()> {
        if self.state != ConnectionState::Idle {
            debug!("start() ignored in state {}", self.state);
            return Ok(());
        }
        info!(
            "Starting scan for service {} (interval {} ms, window {} ms)",
            self.filter.service(),
            self.scan.interval_ms,
            self.scan.window_ms
        );
        self.host.start_scan(&self.scan)?;
        self.set_state(ConnectionState::Scanning);
        Ok(())
    }

    /// Return the lifecycle to [`ConnectionState::Idle`], stopping the scan
    /// or tearing down the link as appropriate. Idempotent.
    pub fn stop(&mut self) {
        if self.state == ConnectionState::Idle {
            return;
        }
        info!("Stopping relay (state {})", self.state);
        match self.state {
            ConnectionState::Scanning | ConnectionState::Failed => self.host.stop_scan(),
            _ => self.host.disconnect(),
        }
        self.candidate = None;
        self.characteristics = None;
        // Drain leftovers so a later start() begins with a clean queue
        while self.host.poll_event().is_some() {}
        self.set_state(ConnectionState::Idle);
    }

    /// Pump the state machine once. Never blocks.
    ///
    /// Each call performs at most one event-driven transition. Recovery
    /// states roll back into a scan at the top of the call, before any
    /// event is taken; notification payloads are drained to the sink
    /// without counting as transitions.
    pub fn advance(&mut self) {
        match self.state {
            ConnectionState::Idle => return,
            ConnectionState::Failed => {
                self.restart_scan();
                return;
            }
            ConnectionState::Disconnecting => {
                self.candidate = None;
                self.restart_scan();
                return;
            }
            _ => {}
        }

        while let Some(event) = self.host.poll_event() {
            if self.process_event(event) {
                break;
            }
        }
    }

    /// Deliver an inbound notification payload to the sink.
    ///
    /// Payloads arriving outside [`ConnectionState::Streaming`] are dropped;
    /// a notification that raced a disconnect must not leak through.
    pub fn notify_received(&mut self, payload: &[u8]) {
        if self.state != ConnectionState::Streaming {
            trace!(
                "Dropping {} notification bytes in state {}",
                payload.len(),
                self.state
            );
            return;
        }
        self.sink.emit(payload);
    }

    /// Write `payload` to the peripheral's RX characteristic.
    ///
    /// Only valid while streaming; returns [`Error::NotStreaming`] otherwise.
    /// Delivery is write-without-response, so success means the write was
    /// handed to the host stack, not that the peripheral processed it.
    pub fn send_payload(&mut self, payload: &[u8]) -> Result<()> {
        if self.state != ConnectionState::Streaming {
            return Err(Error::NotStreaming { state: self.state });
        }
        match &self.characteristics {
            Some(refs) => self.host.write(refs, payload),
            None => Err(Error::Internal(
                "streaming without resolved characteristics".to_string(),
            )),
        }
    }

    /// Restart scanning from a recovery state.
    fn restart_scan(&mut self) {
        match self.host.start_scan(&self.scan) {
            Ok(()) => {
                info!("Rescanning for service {}", self.filter.service());
                self.set_state(ConnectionState::Scanning);
            }
            Err(e) => {
                // Stay in Failed; the next pump retries. The relay never
                // gives up on its own.
                warn!("Scan restart failed: {e}; retrying on next pump");
                self.set_state(ConnectionState::Failed);
            }
        }
    }

    /// Apply one host event. Returns `true` when it caused a transition.
    fn process_event(&mut self, event: HostEvent) -> bool {
        match event {
            HostEvent::Advertisement(adv) => {
                if self.state != ConnectionState::Scanning {
                    trace!("Ignoring advertisement in state {}", self.state);
                    return false;
                }
                if !self.filter.matches(&adv) {
                    trace!(
                        "Ignoring {} (target service not advertised)",
                        adv.display_name()
                    );
                    return false;
                }
                let peer = PeripheralHandle::from(adv);
                info!("Candidate found: {}", peer);
                self.host.stop_scan();
                self.candidate = Some(peer.clone());
                self.set_state(ConnectionState::CandidateFound);
                // Promote to Connecting in the same pump step; a second
                // queued advertisement must never race the pending attempt.
                self.host.connect(&peer);
                self.set_state(ConnectionState::Connecting);
                true
            }
            HostEvent::Connected => {
                if self.state != ConnectionState::Connecting {
                    debug!("Ignoring stale Connected in state {}", self.state);
                    return false;
                }
                debug!("Link established, resolving target service");
                self.host.resolve(&self.target);
                self.set_state(ConnectionState::ResolvingServices);
                true
            }
            HostEvent::ConnectFailed => {
                if self.state != ConnectionState::Connecting {
                    debug!("Ignoring stale ConnectFailed in state {}", self.state);
                    return false;
                }
                warn!("Connect attempt failed, will rescan");
                self.candidate = None;
                self.set_state(ConnectionState::Failed);
                true
            }
            HostEvent::ServicesResolved(refs) => {
                if self.state != ConnectionState::ResolvingServices {
                    debug!("Ignoring stale ServicesResolved in state {}", self.state);
                    return false;
                }
                debug!("Target triplet resolved, subscribing to TX notifications");
                self.host.subscribe(&refs);
                self.characteristics = Some(refs);
                self.set_state(ConnectionState::Subscribing);
                true
            }
            HostEvent::ResolveFailed(failure) => {
                if self.state != ConnectionState::ResolvingServices {
                    debug!("Ignoring stale ResolveFailed in state {}", self.state);
                    return false;
                }
                warn!("Service resolution failed ({failure}), dropping peer");
                self.host.disconnect();
                self.candidate = None;
                self.set_state(ConnectionState::Failed);
                true
            }
            HostEvent::Subscribed => {
                if self.state != ConnectionState::Subscribing {
                    debug!("Ignoring stale Subscribed in state {}", self.state);
                    return false;
                }
                if let Some(peer) = &self.candidate {
                    info!("Streaming from {}", peer);
                }
                self.set_state(ConnectionState::Streaming);
                true
            }
            HostEvent::SubscribeFailed => {
                if self.state != ConnectionState::Subscribing {
                    debug!("Ignoring stale SubscribeFailed in state {}", self.state);
                    return false;
                }
                warn!("Subscription rejected, dropping peer");
                self.host.disconnect();
                self.candidate = None;
                self.characteristics = None;
                self.set_state(ConnectionState::Failed);
                true
            }
            HostEvent::Notification(payload) => {
                self.notify_received(&payload);
                false
            }
            HostEvent::Disconnected(reason) => match self.state {
                ConnectionState::Streaming => {
                    info!("Link ended ({reason}), will rescan");
                    self.characteristics = None;
                    self.set_state(ConnectionState::Disconnecting);
                    true
                }
                ConnectionState::Connecting
                | ConnectionState::ResolvingServices
                | ConnectionState::Subscribing => {
                    warn!("Link dropped during setup ({reason}), will rescan");
                    self.candidate = None;
                    self.characteristics = None;
                    self.set_state(ConnectionState::Failed);
                    true
                }
                _ => {
                    debug!("Ignoring stale Disconnected in state {}", self.state);
                    false
                }
            },
        }
    }

    /// Update the lifecycle state and emit a transition event.
    fn set_state(&mut self, new_state: ConnectionState) {
        let old_state = self.state;
        if old_state == new_state {
            return;
        }
        self.state = new_state;
        debug!("Connection state changed: {} -> {}", old_state, new_state);
        let _ = self.transition_tx.send(StateChange {
            from: old_state,
            to: new_state,
        });
    }
}
