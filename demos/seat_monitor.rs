//! Seat monitor example
//!
//! Run with: cargo run --example seat_monitor [config.toml]
//!
//! Press Enter to scan, `d` then Enter to disconnect, Ctrl+C to exit.

use seat_monitor_ble::{
    BleAdapter, HttpUploader, MonitorConfig, Result, SeatMonitor, StaticAuthorization,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("warn,seat_monitor_ble=debug")
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => MonitorConfig::load(path)?,
        None => MonitorConfig::default(),
    };

    println!("Seat Monitor");
    println!("============\n");
    println!("Collector: {}", config.backend_url);
    println!(
        "Press Enter to scan for {}, 'd' to disconnect, Ctrl+C to exit.\n",
        config.device_name
    );

    let (radio, radio_events) = BleAdapter::new().await?;
    let uploader = HttpUploader::with_timeout(&config.backend_url, config.request_timeout())?;

    let (monitor, handle) = SeatMonitor::new(
        config,
        Arc::new(radio),
        Arc::new(StaticAuthorization::granted()),
        Arc::new(uploader),
        radio_events,
    );
    let task = tokio::spawn(monitor.run());

    let mut status = handle.status();
    let mut uploads = handle.subscribe_uploads();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{}", *status.borrow_and_update());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nExiting...");
                break;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("{}", *status.borrow_and_update());
            }
            Ok(outcome) = uploads.recv() => {
                let result = if outcome.success { "uploaded" } else { "upload failed" };
                println!(
                    "  {} {}: {}",
                    outcome.state,
                    result,
                    outcome.message.unwrap_or_default()
                );
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim() == "d" => handle.disconnect(),
                Ok(Some(_)) => handle.start_scan(),
                _ => break,
            },
        }
    }

    handle.shutdown();
    let _ = task.await;

    Ok(())
}
