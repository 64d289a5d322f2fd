//! Error types for the nus-relay crate.
//!
//! Transient link failures (a dropped connection, a failed connect attempt, a
//! vanished peripheral) are not surfaced here; the connection state machine
//! absorbs them and recovers by rescanning. This enum covers the conditions a
//! caller can actually act on.

use thiserror::Error;

use crate::ble::connection::ConnectionState;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// The relay configuration is unusable and scanning was not started.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of what was invalid.
        reason: String,
    },

    /// An outbound write was requested while no peripheral link is streaming.
    #[error("Not streaming (current state: {state})")]
    NotStreaming {
        /// The state the connection was in when the write was rejected.
        state: ConnectionState,
    },

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
