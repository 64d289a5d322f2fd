//! BLE Service and Characteristic UUIDs.
//!
//! Contains the Nordic UART Service (NUS) UUID constants the relay targets by
//! default. Direction names follow the peripheral's perspective: the
//! peripheral transmits on TX and receives on RX.

use uuid::Uuid;

// UART Service (Nordic NUS - Nordic UART Service)
/// Nordic UART Service UUID.
pub const NUS_SERVICE_UUID: Uuid = Uuid::from_u128(0x6e40_0001_b5a3_f393_e0a9_e50e24dcca9e);
/// NUS RX characteristic UUID (central writes to the peripheral here).
pub const NUS_RX_CHAR_UUID: Uuid = Uuid::from_u128(0x6e40_0002_b5a3_f393_e0a9_e50e24dcca9e);
/// NUS TX characteristic UUID (the peripheral notifies the central here).
pub const NUS_TX_CHAR_UUID: Uuid = Uuid::from_u128(0x6e40_0003_b5a3_f393_e0a9_e50e24dcca9e);

/// Check if a service UUID is the Nordic UART Service.
pub fn is_nus_service(uuid: &Uuid) -> bool {
    *uuid == NUS_SERVICE_UUID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_format() {
        // Verify UUIDs are properly formatted
        let service = NUS_SERVICE_UUID.to_string();
        assert!(service.starts_with("6e400001"));

        let rx = NUS_RX_CHAR_UUID.to_string();
        assert!(rx.starts_with("6e400002"));

        let tx = NUS_TX_CHAR_UUID.to_string();
        assert!(tx.starts_with("6e400003"));
    }

    #[test]
    fn test_shared_base_uuid() {
        // Service and characteristics differ only in the short-id word
        let service = NUS_SERVICE_UUID.as_u128() & !(0xffff << 96);
        let rx = NUS_RX_CHAR_UUID.as_u128() & !(0xffff << 96);
        let tx = NUS_TX_CHAR_UUID.as_u128() & !(0xffff << 96);
        assert_eq!(service, rx);
        assert_eq!(service, tx);
    }

    #[test]
    fn test_is_nus_service() {
        assert!(is_nus_service(&NUS_SERVICE_UUID));
        assert!(!is_nus_service(&NUS_TX_CHAR_UUID));
        assert!(!is_nus_service(&NUS_RX_CHAR_UUID));
    }
}
