//! Advertisement reports and candidate selection.
//!
//! The host stack reports every advertisement it hears; [`ServiceFilter`]
//! decides which of them belong to the peripheral the relay is hunting for.
//! A matching advertisement is promoted to a [`PeripheralHandle`], the opaque
//! token the relay holds while a connection attempt is in flight.

use uuid::Uuid;

/// A single advertisement report from the host stack.
///
/// Snapshot of what the radio heard; never retained across scans.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Advertisement {
    /// Stable identifier for the advertising peripheral. Platform-specific
    /// (a MAC address on Linux, an opaque UUID on macOS).
    pub identifier: String,
    /// Advertised local name, if the advertisement carried one.
    pub local_name: Option<String>,
    /// Service UUIDs carried in the advertisement.
    pub services: Vec<Uuid>,
    /// Received signal strength in dBm, if reported.
    pub rssi: Option<i16>,
}

impl Advertisement {
    /// Check whether the advertisement lists the given service UUID.
    pub fn advertises_service(&self, service: &Uuid) -> bool {
        self.services.contains(service)
    }

    /// Human-readable peer label for logs: the local name when known,
    /// otherwise the identifier.
    pub fn display_name(&self) -> &str {
        self.local_name.as_deref().unwrap_or(&self.identifier)
    }
}

/// Handle to a peripheral selected from an advertisement.
///
/// Held by the connection state machine from candidate selection until the
/// connection attempt resolves or the link is torn down. At most one exists
/// at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeripheralHandle {
    /// Identifier of the peripheral, as reported in its advertisement.
    pub identifier: String,
    /// Local name captured at selection time, for logging.
    pub local_name: Option<String>,
    /// Service UUIDs the peripheral advertised when it was selected.
    pub services: Vec<Uuid>,
}

impl PeripheralHandle {
    /// Human-readable peer label for logs.
    pub fn display_name(&self) -> &str {
        self.local_name.as_deref().unwrap_or(&self.identifier)
    }
}

impl From<Advertisement> for PeripheralHandle {
    fn from(adv: Advertisement) -> Self {
        Self {
            identifier: adv.identifier,
            local_name: adv.local_name,
            services: adv.services,
        }
    }
}

impl std::fmt::Display for PeripheralHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.local_name {
            Some(name) => write!(f, "{} ({})", name, self.identifier),
            None => write!(f, "{}", self.identifier),
        }
    }
}

/// Predicate selecting candidate peripherals by advertised service UUID.
///
/// The platform scan itself runs unfiltered; filtering in one place here
/// keeps candidate selection identical across OS backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceFilter {
    service: Uuid,
}

impl ServiceFilter {
    /// Create a filter matching advertisements that list `service`.
    pub fn new(service: Uuid) -> Self {
        Self { service }
    }

    /// The service UUID this filter selects on.
    pub fn service(&self) -> Uuid {
        self.service
    }

    /// Whether the advertisement belongs to a candidate peripheral.
    pub fn matches(&self, adv: &Advertisement) -> bool {
        adv.advertises_service(&self.service)
    }
}
