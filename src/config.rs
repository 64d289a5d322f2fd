//! Relay configuration.
//!
//! All tunables live here: the GATT triplet to hunt for, scan timing, the
//! optional outbound heartbeat, and the pump cadence. [`RelayConfig::default`]
//! matches a stock Nordic UART Service peripheral, so most callers only need
//! to override what their firmware changes.
//!
//! Configuration is validated once, up front. A config that fails
//! [`RelayConfig::validate`] never reaches the radio.

use std::time::Duration;

use uuid::Uuid;

use crate::ble::uuids::{NUS_RX_CHAR_UUID, NUS_SERVICE_UUID, NUS_TX_CHAR_UUID};
use crate::error::{Error, Result};

/// Default pump cadence for the driver loop in milliseconds.
pub const DEFAULT_ADVANCE_INTERVAL_MS: u64 = 20;

/// Default scan interval in milliseconds (advisory; the OS has final say).
pub const DEFAULT_SCAN_INTERVAL_MS: u16 = 2000;

/// Default scan window in milliseconds (advisory; the OS has final say).
pub const DEFAULT_SCAN_WINDOW_MS: u16 = 1500;

/// Default scan refresh period in seconds. Long-running platform scans can go
/// quiet; stopping and restarting the scan keeps advertisements flowing.
pub const DEFAULT_SCAN_REFRESH_SECS: u64 = 30;

/// The GATT service/characteristic triplet the relay resolves on a peer.
///
/// Defaults to the Nordic UART Service. Direction names follow the
/// peripheral: it notifies on `tx` and accepts writes on `rx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TargetService {
    /// Service UUID advertised by the peripheral.
    pub service: Uuid,
    /// Characteristic the peripheral notifies on (central subscribes).
    pub tx: Uuid,
    /// Characteristic the peripheral accepts writes on (central writes).
    pub rx: Uuid,
}

impl TargetService {
    /// The Nordic UART Service triplet.
    pub const fn nus() -> Self {
        Self {
            service: NUS_SERVICE_UUID,
            tx: NUS_TX_CHAR_UUID,
            rx: NUS_RX_CHAR_UUID,
        }
    }

    /// Validate that the triplet is internally consistent.
    pub fn validate(&self) -> Result<()> {
        if self.tx == self.rx {
            return Err(Error::InvalidConfig {
                reason: format!("TX and RX characteristics are both {}", self.tx),
            });
        }
        if self.tx == self.service || self.rx == self.service {
            return Err(Error::InvalidConfig {
                reason: "characteristic UUID equals the service UUID".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for TargetService {
    fn default() -> Self {
        Self::nus()
    }
}

/// Scan timing parameters.
///
/// Interval and window are advisory: btleplug exposes no portable way to set
/// radio timing, so these are logged for operators and otherwise left to the
/// platform. The refresh period is honored everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanParams {
    /// Active scanning requests scan responses from advertisers.
    pub active: bool,
    /// Desired scan interval in milliseconds.
    pub interval_ms: u16,
    /// Desired scan window in milliseconds. Must not exceed the interval.
    pub window_ms: u16,
    /// Stop and restart the platform scan this often; `None` disables.
    pub refresh: Option<Duration>,
}

impl ScanParams {
    fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 || self.window_ms == 0 {
            return Err(Error::InvalidConfig {
                reason: "scan interval and window must be non-zero".to_string(),
            });
        }
        if self.window_ms > self.interval_ms {
            return Err(Error::InvalidConfig {
                reason: format!(
                    "scan window ({} ms) exceeds scan interval ({} ms)",
                    self.window_ms, self.interval_ms
                ),
            });
        }
        if let Some(refresh) = self.refresh {
            if refresh.is_zero() {
                return Err(Error::InvalidConfig {
                    reason: "scan refresh period must be non-zero".to_string(),
                });
            }
        }
        Ok(())
    }
}

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            active: true,
            interval_ms: DEFAULT_SCAN_INTERVAL_MS,
            window_ms: DEFAULT_SCAN_WINDOW_MS,
            refresh: Some(Duration::from_secs(DEFAULT_SCAN_REFRESH_SECS)),
        }
    }
}

/// Periodic outbound write to the peripheral's RX characteristic.
///
/// Heartbeats are skipped while no link is streaming; they are never queued
/// for later delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HeartbeatConfig {
    /// Time between heartbeat writes.
    pub period: Duration,
    /// Payload written on each heartbeat.
    pub payload: Vec<u8>,
}

impl HeartbeatConfig {
    fn validate(&self) -> Result<()> {
        if self.period.is_zero() {
            return Err(Error::InvalidConfig {
                reason: "heartbeat period must be non-zero".to_string(),
            });
        }
        if self.payload.is_empty() {
            return Err(Error::InvalidConfig {
                reason: "heartbeat payload must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Top-level relay configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RelayConfig {
    /// GATT triplet to resolve on the connected peripheral.
    pub target: TargetService,
    /// Scan timing.
    pub scan: ScanParams,
    /// Name this relay identifies itself as in logs.
    pub local_name: String,
    /// Optional periodic outbound write.
    pub heartbeat: Option<HeartbeatConfig>,
    /// Cadence at which the driver pumps the state machine.
    pub advance_interval: Duration,
}

impl RelayConfig {
    /// Validate the whole configuration. Called before any scanning starts;
    /// an invalid config is fatal at startup rather than a runtime surprise.
    pub fn validate(&self) -> Result<()> {
        self.target.validate()?;
        self.scan.validate()?;
        if self.local_name.is_empty() {
            return Err(Error::InvalidConfig {
                reason: "local name must not be empty".to_string(),
            });
        }
        if let Some(heartbeat) = &self.heartbeat {
            heartbeat.validate()?;
        }
        if self.advance_interval.is_zero() {
            return Err(Error::InvalidConfig {
                reason: "advance interval must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            target: TargetService::nus(),
            scan: ScanParams::default(),
            local_name: "nus-relay".to_string(),
            heartbeat: None,
            advance_interval: Duration::from_millis(DEFAULT_ADVANCE_INTERVAL_MS),
        }
    }
}
