//! BLE communication module.
//!
//! Everything radio-facing lives here: advertisement filtering, the
//! host-stack boundary, the btleplug binding, the scripted test double, and
//! the connection lifecycle state machine that ties them together.

pub mod advertising;
pub mod btle;
pub mod connection;
pub mod host;
pub mod mock;
pub mod uuids;

pub use advertising::{Advertisement, PeripheralHandle, ServiceFilter};
pub use btle::BtleplugHost;
pub use connection::{ConnectionManager, ConnectionState, StateChange};
pub use host::{BleHost, CharacteristicRefs, DisconnectReason, HostEvent, ResolveFailure};
pub use mock::{HostCommand, MockHost, MockScript};
pub use uuids::*;
