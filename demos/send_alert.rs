//! Example: Sending a passive check result
//!
//! Loads `nsca.toml` when present (otherwise defaults plus `NSCA_*`
//! environment overrides), sends the startup alert and one alert built from
//! the command line, then waits for delivery.
//!
//! Run with: `cargo run --example send_alert -- critical "disk full on /var"`

#![allow(clippy::uninlined_format_args)]

use nsca_protocol::utils::logging::init_logging;
use nsca_protocol::{Dispatcher, NscaClient, NscaConfig, Severity};
use std::path::Path;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = if Path::new("nsca.toml").exists() {
        NscaConfig::from_file("nsca.toml")?
    } else {
        NscaConfig::default()
    };
    config.apply_env()?;

    for problem in config.validate() {
        eprintln!("config: {}", problem);
    }
    init_logging(&config.logging)?;

    let mut args = std::env::args().skip(1);
    let severity: Severity = args.next().as_deref().unwrap_or("ok").parse()?;
    let message = args.collect::<Vec<_>>().join(" ");
    let message = if message.is_empty() {
        String::from("Everything is peachy-keen")
    } else {
        message
    };

    let dispatcher = Dispatcher::new(config.pool.clone())?;
    let client = NscaClient::from_config_async(&config, dispatcher.clone()).await?;

    println!(
        "Sending {} alert for '{}' to {}",
        severity,
        client.channel().service_name(),
        client.channel().address()
    );

    client.start();
    let outcome = client.send(severity, message);
    println!("Submission: {:?}", outcome);

    dispatcher.shutdown().await;

    let snapshot = dispatcher.metrics().snapshot();
    println!(
        "Delivered: {}, abandoned: {}, rejected: {}",
        snapshot.delivered,
        snapshot.abandoned(),
        snapshot.rejected
    );
    Ok(())
}
