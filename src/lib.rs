// Allow holding locks across await points - we use parking_lot which is designed for this
#![allow(clippy::await_holding_lock)]
// Allow derivable impls for clarity
#![allow(clippy::derivable_impls)]
// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # nus-relay
//!
//! A cross-platform Rust library for bridging a Bluetooth Low Energy
//! peripheral that speaks the Nordic UART Service (NUS) to a local byte
//! stream.
//!
//! The relay plays the central role: it scans for a peripheral advertising
//! the target service, connects, resolves the TX/RX characteristic pair,
//! subscribes to notifications, and streams every payload to a sink. When
//! the link drops it goes straight back to scanning, forever.
//!
//! ## Features
//!
//! - **Single-peer lifecycle**: scan, connect, resolve, subscribe, stream
//! - **Self-healing**: any failure or link loss rolls back into a fresh scan
//! - **Deterministic core**: a synchronous state machine pumped at a fixed
//!   cadence, fully testable without a radio
//! - **Outbound writes**: ad-hoc payloads and an optional periodic heartbeat
//!   to the peripheral's RX characteristic
//! - **Custom services**: any service/TX/RX UUID triplet, not just stock NUS
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nus_relay::{BtleplugHost, ConnectionManager, Driver, RelayConfig, Result, StdoutSink};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = RelayConfig::default();
//!     let host = BtleplugHost::new().await?;
//!     let manager = ConnectionManager::new(&config, host, StdoutSink::new())?;
//!     let mut driver = Driver::new(manager, &config);
//!
//!     // Relay until Ctrl-C
//!     driver
//!         .run(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for config and data types

// Public modules
pub mod ble;
pub mod config;
pub mod driver;
pub mod error;
pub mod sink;

// Re-exports for convenience
pub use config::{HeartbeatConfig, RelayConfig, ScanParams, TargetService};
pub use driver::Driver;
pub use error::{Error, Result};
pub use sink::{NotificationSink, StdoutSink};

// Re-export commonly used types from submodules
pub use ble::advertising::{Advertisement, PeripheralHandle, ServiceFilter};
pub use ble::btle::BtleplugHost;
pub use ble::connection::{ConnectionManager, ConnectionState, StateChange};
pub use ble::host::{BleHost, CharacteristicRefs, DisconnectReason, HostEvent, ResolveFailure};
pub use ble::mock::{HostCommand, MockHost, MockScript};
pub use ble::uuids::{NUS_RX_CHAR_UUID, NUS_SERVICE_UUID, NUS_TX_CHAR_UUID};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify that key types are exported
        let _ = std::any::TypeId::of::<RelayConfig>();
        let _ = std::any::TypeId::of::<ConnectionState>();
        let _ = std::any::TypeId::of::<Advertisement>();
        let _ = std::any::TypeId::of::<HostEvent>();
        let _ = std::any::TypeId::of::<Error>();
        let _ = std::any::TypeId::of::<StdoutSink>();
    }

    #[test]
    fn test_default_target_is_nus() {
        let config = RelayConfig::default();
        assert_eq!(config.target.service, NUS_SERVICE_UUID);
        assert_eq!(config.target.tx, NUS_TX_CHAR_UUID);
        assert_eq!(config.target.rx, NUS_RX_CHAR_UUID);
    }
}
