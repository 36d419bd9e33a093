/// Transaction monitor example: watch one signature on the live server.
///
/// Demonstrates: closure callbacks, connection initialization, monitoring
/// confirmation, and a clean close.
///
/// Run with:
///   SOR_API_KEY=... TEST_SIGNATURE=... cargo run --example monitor_tx
use std::time::Duration;

use sor_sdk::{Callbacks, MonitorConfig, TransactionMonitor};

const DEFAULT_SIGNATURE: &str =
    "4zbKahoyXddoxPFqhU71iYTPJfrJQqKoCVFP7iUWfeNSPp2mBpgZQKoEDEh4GKFjb5Zij11WR2FZe7STX57nfSgv";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = MonitorConfig::from_env();
    if config.api_key.is_none() {
        config.api_key = Some("sk_test_limited456".into());
    }
    let signature = std::env::var("TEST_SIGNATURE").unwrap_or_else(|_| DEFAULT_SIGNATURE.into());

    println!("Endpoint:  {}", config.base_url);
    println!("Signature: {signature}");

    let callbacks = Callbacks::new()
        .with_open(|| println!("Connected"))
        .with_close(|| println!("Disconnected"))
        .with_error(|err| eprintln!("Error: {err}"))
        .with_update(|update| {
            println!(
                "Update: slot={:?} status={:?} result={:?} maker_fee={:?} taker_fee={:?}",
                update.slot, update.status, update.result, update.maker_fee, update.taker_fee
            )
        })
        .with_monitoring(|sig| println!("Server is monitoring {sig}"))
        .with_timeout(|sig| println!("Monitoring timed out for {sig}"));

    let monitor = TransactionMonitor::new(config, callbacks);
    monitor.monitor(&signature).await?;

    // Give the server time to push a few updates.
    tokio::time::sleep(Duration::from_secs(20)).await;

    println!("Active subscriptions: {:?}", monitor.active_subscriptions().await);
    monitor.close().await;
    Ok(())
}
