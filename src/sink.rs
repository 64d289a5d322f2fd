//! Notification sinks.
//!
//! Streamed payloads leave the relay through a [`NotificationSink`]. The
//! sink sees exactly the bytes the peripheral notified, in notification
//! order, with no framing added or removed.

use std::io::{self, Write};

use tracing::warn;

/// Destination for payloads streamed from the peripheral.
///
/// `emit` is called from the pump at most once per notification and must not
/// block for long; a slow sink stalls the whole relay.
#[cfg_attr(test, mockall::automock)]
pub trait NotificationSink {
    /// Consume one notification payload.
    fn emit(&mut self, payload: &[u8]);
}

/// Sink that writes payloads to stdout.
///
/// Raw mode forwards the bytes untouched, preserving the peripheral's own
/// framing (a line-oriented peripheral yields line-oriented output). Hex
/// mode prints one summary line per notification instead.
pub struct StdoutSink {
    hex: bool,
}

impl StdoutSink {
    /// Raw byte pass-through.
    pub fn new() -> Self {
        Self { hex: false }
    }

    /// One hex summary line per notification.
    pub fn hex() -> Self {
        Self { hex: true }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSink for StdoutSink {
    fn emit(&mut self, payload: &[u8]) {
        if self.hex {
            println!("{}", hex_line(payload));
            return;
        }

        let mut stdout = io::stdout().lock();
        if let Err(e) = stdout.write_all(payload).and_then(|_| stdout.flush()) {
            warn!("Failed to write {} bytes to stdout: {}", payload.len(), e);
        }
    }
}

/// Format a payload as `(N bytes) XX XX ..`.
fn hex_line(payload: &[u8]) -> String {
    use std::fmt::Write as _;

    let mut line = String::with_capacity(12 + payload.len() * 3);
    let _ = write!(line, "({} bytes)", payload.len());
    for byte in payload {
        let _ = write!(line, " {byte:02X}");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn hex_line_formats_payload() {
        assert_eq!(hex_line(b"Hi!"), "(3 bytes) 48 69 21");
        assert_eq!(hex_line(&[0x00, 0xff]), "(2 bytes) 00 FF");
    }

    #[test]
    fn hex_line_handles_empty_payload() {
        assert_eq!(hex_line(&[]), "(0 bytes)");
    }

    #[test]
    fn mock_sink_records_expectations() {
        let mut sink = MockNotificationSink::new();
        sink.expect_emit()
            .withf(|payload: &[u8]| payload == b"abc")
            .times(1)
            .returning(|_| ());
        sink.emit(b"abc");
    }
}
