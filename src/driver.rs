//! Relay driver loop.
//!
//! [`Driver`] owns a [`ConnectionManager`] and pumps it at a fixed cadence,
//! layering the optional outbound heartbeat on top. All lifecycle work
//! happens inside the pump; the loop itself never blocks on the radio.

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{info, trace, warn};

use crate::ble::connection::ConnectionManager;
use crate::ble::host::BleHost;
use crate::config::{HeartbeatConfig, RelayConfig};
use crate::error::Result;
use crate::sink::NotificationSink;

/// Pumps the connection lifecycle and schedules heartbeat writes.
pub struct Driver<H: BleHost, S: NotificationSink> {
    /// The state machine being driven.
    manager: ConnectionManager<H, S>,
    /// Time between pump steps.
    advance_interval: Duration,
    /// Optional periodic outbound write.
    heartbeat: Option<HeartbeatConfig>,
    /// When the heartbeat schedule last advanced.
    last_heartbeat: Instant,
}

impl<H: BleHost, S: NotificationSink> Driver<H, S> {
    /// Create a driver around an existing manager.
    pub fn new(manager: ConnectionManager<H, S>, config: &RelayConfig) -> Self {
        Self {
            manager,
            advance_interval: config.advance_interval,
            heartbeat: config.heartbeat.clone(),
            last_heartbeat: Instant::now(),
        }
    }

    /// The managed connection lifecycle.
    pub fn manager(&self) -> &ConnectionManager<H, S> {
        &self.manager
    }

    /// Mutable access, e.g. for ad-hoc [`ConnectionManager::send_payload`]
    /// calls between pump steps.
    pub fn manager_mut(&mut self) -> &mut ConnectionManager<H, S> {
        &mut self.manager
    }

    /// Start the lifecycle and pump it until `shutdown` resolves, then stop
    /// cleanly.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.manager.start()?;

        let mut ticker = tokio::time::interval(self.advance_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.step_at(Instant::now()),
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    self.manager.stop();
                    return Ok(());
                }
            }
        }
    }

    /// One pump step at `now`: advance the machine, then fire the heartbeat
    /// if one is due.
    ///
    /// The heartbeat schedule advances whether or not a write happens, so a
    /// beat that falls while disconnected is skipped outright; reconnecting
    /// never releases a backlog of stale writes.
    fn step_at(&mut self, now: Instant) {
        self.manager.advance();

        let heartbeat = match &self.heartbeat {
            Some(heartbeat) => heartbeat,
            None => return,
        };

        if now.duration_since(self.last_heartbeat) < heartbeat.period {
            return;
        }
        self.last_heartbeat = now;

        if !self.manager.is_connected() {
            trace!("Heartbeat due but no link is streaming, skipping");
            return;
        }

        if let Err(e) = self.manager.send_payload(&heartbeat.payload) {
            warn!("Heartbeat write failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::connection::ConnectionState;
    use crate::ble::host::HostEvent;
    use crate::ble::mock::{nus_characteristics, HostCommand, MockHost, MockScript};
    use crate::ble::uuids::NUS_SERVICE_UUID;
    use crate::sink::MockNotificationSink;
    use crate::Advertisement;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    fn nus_advertisement() -> HostEvent {
        HostEvent::Advertisement(Advertisement {
            identifier: "peer-1".to_string(),
            local_name: Some("uart-peer".to_string()),
            services: vec![NUS_SERVICE_UUID],
            rssi: Some(-47),
        })
    }

    fn heartbeat_config() -> RelayConfig {
        RelayConfig {
            heartbeat: Some(HeartbeatConfig {
                period: Duration::from_secs(5),
                payload: b"ping".to_vec(),
            }),
            ..RelayConfig::default()
        }
    }

    fn driver_with_sink(
        config: &RelayConfig,
        sink: MockNotificationSink,
    ) -> (Driver<MockHost, MockNotificationSink>, MockScript) {
        let (host, script) = MockHost::new();
        let manager = ConnectionManager::new(config, host, sink).expect("valid config");
        (Driver::new(manager, config), script)
    }

    /// Scripted walk from Idle to Streaming, one pump per step.
    fn bring_up(
        driver: &mut Driver<MockHost, MockNotificationSink>,
        script: &MockScript,
        base: Instant,
    ) {
        driver.manager_mut().start().unwrap();
        script.push_event(nus_advertisement());
        driver.step_at(base);
        script.push_event(HostEvent::Connected);
        driver.step_at(base);
        script.push_event(HostEvent::ServicesResolved(nus_characteristics()));
        driver.step_at(base);
        script.push_event(HostEvent::Subscribed);
        driver.step_at(base);
        assert_eq!(driver.manager().state(), ConnectionState::Streaming);
    }

    #[tokio::test]
    async fn run_starts_and_stops_cleanly() {
        let mut sink = MockNotificationSink::new();
        sink.expect_emit().times(0);
        let config = RelayConfig::default();
        let (mut driver, script) = driver_with_sink(&config, sink);

        driver.run(async {}).await.unwrap();

        assert_eq!(driver.manager().state(), ConnectionState::Idle);
        let commands = script.take_commands();
        assert_eq!(commands.first(), Some(&HostCommand::StartScan));
        assert!(commands.contains(&HostCommand::StopScan));
    }

    #[test]
    fn heartbeat_fires_on_schedule_while_streaming() {
        let mut sink = MockNotificationSink::new();
        sink.expect_emit().times(0);
        let config = heartbeat_config();
        let (mut driver, script) = driver_with_sink(&config, sink);

        let base = driver.last_heartbeat;
        bring_up(&mut driver, &script, base);
        script.take_commands();

        // Not yet due
        driver.step_at(base + Duration::from_secs(4));
        assert!(script.take_commands().is_empty());

        driver.step_at(base + Duration::from_secs(5));
        assert_eq!(
            script.take_commands(),
            vec![HostCommand::Write(b"ping".to_vec())]
        );

        // Schedule restarts from the fire time
        driver.step_at(base + Duration::from_secs(9));
        assert!(script.take_commands().is_empty());
        driver.step_at(base + Duration::from_secs(10));
        assert_eq!(
            script.take_commands(),
            vec![HostCommand::Write(b"ping".to_vec())]
        );
    }

    #[test]
    fn heartbeat_skipped_while_disconnected_is_not_queued() {
        let mut sink = MockNotificationSink::new();
        sink.expect_emit().times(0);
        let config = heartbeat_config();
        let (mut driver, script) = driver_with_sink(&config, sink);

        driver.manager_mut().start().unwrap();
        let base = driver.last_heartbeat;

        // A beat falls due while still scanning: skipped, schedule advances
        driver.step_at(base + Duration::from_secs(6));
        assert!(!script
            .take_commands()
            .contains(&HostCommand::Write(b"ping".to_vec())));

        // Link comes up shortly after; the skipped beat must not fire late
        script.push_event(nus_advertisement());
        driver.step_at(base + Duration::from_secs(7));
        script.push_event(HostEvent::Connected);
        driver.step_at(base + Duration::from_secs(7));
        script.push_event(HostEvent::ServicesResolved(nus_characteristics()));
        driver.step_at(base + Duration::from_secs(7));
        script.push_event(HostEvent::Subscribed);
        driver.step_at(base + Duration::from_secs(7));
        assert_eq!(driver.manager().state(), ConnectionState::Streaming);
        assert!(!script
            .take_commands()
            .contains(&HostCommand::Write(b"ping".to_vec())));

        // The next beat fires on the regular schedule
        driver.step_at(base + Duration::from_secs(11));
        assert!(script
            .take_commands()
            .contains(&HostCommand::Write(b"ping".to_vec())));
    }

    #[test]
    fn pump_forwards_notifications_to_the_sink() {
        let mut sink = MockNotificationSink::new();
        sink.expect_emit()
            .withf(|payload: &[u8]| payload == b"data")
            .times(1)
            .returning(|_| ());
        let config = RelayConfig::default();
        let (mut driver, script) = driver_with_sink(&config, sink);

        let base = driver.last_heartbeat;
        bring_up(&mut driver, &script, base);

        script.push_event(HostEvent::Notification(Bytes::from_static(b"data")));
        driver.step_at(base);
    }

    #[test]
    fn no_heartbeat_configured_means_no_writes() {
        let mut sink = MockNotificationSink::new();
        sink.expect_emit().times(0);
        let config = RelayConfig::default();
        let (mut driver, script) = driver_with_sink(&config, sink);

        let base = driver.last_heartbeat;
        bring_up(&mut driver, &script, base);
        script.take_commands();

        driver.step_at(base + Duration::from_secs(3600));
        assert!(script.take_commands().is_empty());
    }
}
