// Tannoy announcement bot
// Main entry point for the tannoy binary

use clap::Parser;
use tannoy::cli::{Cli, Command};
use tannoy::config::Config;
use tannoy::daemon::Daemon;
use tannoy::store::{DurableStore, JsonFileStore};
use tannoy::telemetry::{init_telemetry, init_telemetry_with_level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize basic telemetry first (before config is loaded)
    init_telemetry();

    tracing::info!("Tannoy v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // Re-initialize telemetry with config-driven log level
    // (only takes effect if RUST_LOG env var is not set)
    init_telemetry_with_level(&config.core.log_level);

    match cli.command {
        Command::Run => {
            let daemon = Daemon::new(&config)?;
            daemon.startup().await;
            daemon.run().await
        }

        Command::Status => {
            let store = JsonFileStore::in_dir(&config.data_dir());
            match store.read().await? {
                Some(records) if !records.is_empty() => {
                    println!("{} announcement(s) configured:", records.len());
                    let mut keys: Vec<_> = records.keys().copied().collect();
                    keys.sort_by_key(|k| (k.chat_id, k.topic_id));
                    for key in keys {
                        let settings = &records[&key];
                        let state = if settings.active { "active" } else { "stopped" };
                        println!(
                            "  {}  every {} min  {}  {:?}",
                            key, settings.interval_minutes, state, settings.text
                        );
                    }
                }
                _ => println!("No announcements configured."),
            }
            Ok(())
        }

        Command::ConfigPath => {
            let path = cli
                .config
                .map(Ok)
                .unwrap_or_else(Config::default_path)?;
            println!("{}", path.display());
            Ok(())
        }
    }
}
