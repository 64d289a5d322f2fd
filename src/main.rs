//! nus-relay CLI.
//!
//! Bridges a Nordic UART Service peripheral to stdout: notification payloads
//! are streamed raw (or as hex summary lines), and an optional heartbeat is
//! written back on a fixed schedule. Runs until Ctrl-C.

use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use nus_relay::config::{
    DEFAULT_ADVANCE_INTERVAL_MS, DEFAULT_SCAN_INTERVAL_MS, DEFAULT_SCAN_REFRESH_SECS,
    DEFAULT_SCAN_WINDOW_MS,
};
use nus_relay::{
    BtleplugHost, ConnectionManager, Driver, HeartbeatConfig, RelayConfig, Result, StdoutSink,
};

/// Bridge a BLE UART peripheral to a local byte stream.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Target service UUID (defaults to the Nordic UART Service).
    #[arg(long)]
    service: Option<Uuid>,

    /// TX characteristic UUID (the peripheral notifies here).
    #[arg(long)]
    tx: Option<Uuid>,

    /// RX characteristic UUID (the peripheral accepts writes here).
    #[arg(long)]
    rx: Option<Uuid>,

    /// Desired scan interval in milliseconds (advisory).
    #[arg(long, default_value_t = DEFAULT_SCAN_INTERVAL_MS)]
    scan_interval_ms: u16,

    /// Desired scan window in milliseconds (advisory).
    #[arg(long, default_value_t = DEFAULT_SCAN_WINDOW_MS)]
    scan_window_ms: u16,

    /// Restart the platform scan this often, in seconds; 0 disables.
    #[arg(long, default_value_t = DEFAULT_SCAN_REFRESH_SECS)]
    scan_refresh_secs: u64,

    /// Passive scanning (no scan responses requested).
    #[arg(long)]
    passive: bool,

    /// Name this relay identifies itself as in logs.
    #[arg(short = 'n', long, default_value = "nus-relay")]
    local_name: String,

    /// Write a heartbeat to the peripheral this often, in milliseconds; 0 disables.
    #[arg(long, default_value_t = 0)]
    heartbeat_ms: u64,

    /// Heartbeat payload (UTF-8).
    #[arg(long, default_value = "Hello Remote Server")]
    heartbeat_payload: String,

    /// Pump cadence in milliseconds.
    #[arg(long, default_value_t = DEFAULT_ADVANCE_INTERVAL_MS)]
    advance_ms: u64,

    /// Print notifications as hex summary lines instead of raw bytes.
    #[arg(long)]
    hex: bool,
}

impl Args {
    fn into_config(self) -> RelayConfig {
        let mut config = RelayConfig::default();
        if let Some(service) = self.service {
            config.target.service = service;
        }
        if let Some(tx) = self.tx {
            config.target.tx = tx;
        }
        if let Some(rx) = self.rx {
            config.target.rx = rx;
        }
        config.scan.active = !self.passive;
        config.scan.interval_ms = self.scan_interval_ms;
        config.scan.window_ms = self.scan_window_ms;
        config.scan.refresh = match self.scan_refresh_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        config.local_name = self.local_name;
        config.heartbeat = match self.heartbeat_ms {
            0 => None,
            ms => Some(HeartbeatConfig {
                period: Duration::from_millis(ms),
                payload: self.heartbeat_payload.into_bytes(),
            }),
        };
        config.advance_interval = Duration::from_millis(self.advance_ms);
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let hex = args.hex;
    let config = args.into_config();
    // Fail on a bad config before touching the adapter
    config.validate()?;

    info!(
        "{} starting (service {}, TX {}, RX {})",
        config.local_name, config.target.service, config.target.tx, config.target.rx
    );

    let host = BtleplugHost::new().await?;
    let sink = if hex {
        StdoutSink::hex()
    } else {
        StdoutSink::new()
    };
    let manager = ConnectionManager::new(&config, host, sink)?;
    let mut driver = Driver::new(manager, &config);

    driver
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("{} stopped", config.local_name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build_a_valid_config() {
        let args = Args::parse_from(["nus-relay"]);
        let config = args.into_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.target, nus_relay::TargetService::nus());
        assert!(config.heartbeat.is_none());
    }

    #[test]
    fn heartbeat_flags_enable_the_heartbeat() {
        let args = Args::parse_from([
            "nus-relay",
            "--heartbeat-ms",
            "2000",
            "--heartbeat-payload",
            "ping",
        ]);
        let config = args.into_config();
        let heartbeat = config.heartbeat.expect("heartbeat enabled");
        assert_eq!(heartbeat.period, Duration::from_secs(2));
        assert_eq!(heartbeat.payload, b"ping".to_vec());
    }

    #[test]
    fn refresh_zero_disables_scan_refresh() {
        let args = Args::parse_from(["nus-relay", "--scan-refresh-secs", "0"]);
        let config = args.into_config();
        assert!(config.scan.refresh.is_none());
    }

    #[test]
    fn custom_triplet_overrides_nus_defaults() {
        let args = Args::parse_from([
            "nus-relay",
            "--service",
            "0000fff0-0000-1000-8000-00805f9b34fb",
            "--tx",
            "0000fff1-0000-1000-8000-00805f9b34fb",
            "--rx",
            "0000fff2-0000-1000-8000-00805f9b34fb",
        ]);
        let config = args.into_config();
        assert_ne!(config.target.service, nus_relay::NUS_SERVICE_UUID);
        assert!(config.validate().is_ok());
    }
}
