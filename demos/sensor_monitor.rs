//! Sensor monitor example
//!
//! Connects to the Celsian sensor and reads every channel at a fixed
//! interval, printing temperatures, humidity, pressure and the UV index.
//!
//! Run with: cargo run --example sensor_monitor
//!
//! To change the polling interval (in seconds):
//!   cargo run --example sensor_monitor -- --interval 5

use celsian_ble::{
    celsius_to_fahrenheit, pascals_to_millibars, ConnectionState, DriverConfig, DriverEvent,
    Error, Result, SensorDriver, SensorReadings,
};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,celsian_ble=info".into()),
        )
        .init();

    println!("Celsian Sensor Monitor");
    println!("======================\n");

    let args: Vec<String> = std::env::args().collect();
    let interval = args
        .iter()
        .position(|arg| arg == "--interval")
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(2);

    let driver = SensorDriver::with_btleplug(DriverConfig::default()).await?;
    let mut events = driver.subscribe();

    println!("Looking for the sensor...\n");
    driver.connect();

    // Wait for the connection outcome
    loop {
        match events.recv().await {
            Ok(DriverEvent::Connected) => break,
            Ok(DriverEvent::ConnectionTimeout) => {
                println!("No sensor found.");
                return Ok(());
            }
            Ok(DriverEvent::ConnectFailed) => {
                return Err(Error::ConnectionFailed {
                    reason: "sensor refused the connection".to_string(),
                });
            }
            Ok(_) => {}
            Err(e) => return Err(Error::Internal(e.to_string())),
        }
    }

    if let Some(address) = driver.peripheral_address() {
        println!("Connected to {}\n", address);
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(interval));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if driver.state() != ConnectionState::Ready {
                    println!("Reconnecting...");
                    driver.connect();
                    continue;
                }
                if let Err(e) = driver.read_all() {
                    println!("Read request failed: {}", e);
                }
                print_readings(&driver.readings());
            }
            event = events.recv() => {
                match event {
                    Ok(DriverEvent::Disconnected) => println!("Sensor disconnected"),
                    Ok(DriverEvent::ReadFailed { role, reason }) => {
                        println!("Read of {} failed: {}", role, reason);
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                    Err(e) => return Err(Error::Internal(e.to_string())),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                break;
            }
        }
    }

    driver.disconnect();
    Ok(())
}

fn print_readings(readings: &SensorReadings) {
    let fmt = |value: Option<String>| value.unwrap_or_else(|| "--".to_string());

    println!(
        "Temperature: {} ({})",
        fmt(readings
            .average_temperature()
            .map(|c| format!("{:.1}°C", c))),
        fmt(readings
            .average_temperature()
            .map(|c| format!("{:.1}°F", celsius_to_fahrenheit(c)))),
    );
    println!(
        "Humidity:    {}",
        fmt(readings.relative_humidity().map(|rh| format!("{}%", rh)))
    );
    println!(
        "Pressure:    {}",
        fmt(readings
            .pressure()
            .map(|pa| format!("{:.2} mb", pascals_to_millibars(f64::from(pa))))),
    );
    println!(
        "UV index:    {}\n",
        fmt(readings.uv_index().map(|uvi| format!("{:.1}", uvi)))
    );
}
