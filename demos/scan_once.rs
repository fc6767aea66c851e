//! Scan once example
//!
//! Scans for the Celsian sensor until it is found or the scan times out,
//! then reports the outcome.
//!
//! Run with: cargo run --example scan_once
//!
//! To scan for a different duration (in seconds):
//!   cargo run --example scan_once -- --timeout 20

use celsian_ble::{DriverConfig, DriverEvent, Result, SensorDriver};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("warn,celsian_ble=debug")
        .init();

    let args: Vec<String> = std::env::args().collect();
    let timeout = args
        .iter()
        .position(|arg| arg == "--timeout")
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(10);

    let config = DriverConfig::default().with_scan_timeout(Duration::from_secs(timeout));
    let driver = SensorDriver::with_btleplug(config).await?;

    let _handle = driver.on_event(|event| match event {
        DriverEvent::Connected => println!("Sensor ready"),
        DriverEvent::ConnectionTimeout => println!("No sensor found"),
        DriverEvent::ConnectFailed => println!("Connection failed"),
        _ => {}
    });

    println!("Scanning for {} seconds...", timeout);
    driver.connect();

    // Give the outcome time to arrive
    tokio::time::sleep(Duration::from_secs(timeout + 5)).await;

    match driver.peripheral_address() {
        Some(address) => println!("Sensor address: {}", address),
        None => println!("Sensor address unknown"),
    }

    driver.disconnect();
    Ok(())
}
