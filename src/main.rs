//! replikv - replicated in-memory key-value store
//!
//! Runs a single node: a line-protocol TCP front end over an in-memory
//! store, optionally joined to a master/slave replication cluster.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use replikv::config::Config;
use replikv::server::ConnectionServer;
use replikv::store;

/// replikv - replicated in-memory key-value store
#[derive(Parser)]
#[command(name = "replikv")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "replikv.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the node
    Start,

    /// Validate the configuration file
    Validate,

    /// Initialize a new configuration file
    Init {
        /// Output path for the configuration file
        #[arg(short, long, default_value = "replikv.toml")]
        output: PathBuf,

        /// Node ID
        #[arg(long, default_value = "node-1")]
        node_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(&cli.log_level);

    match cli.command {
        Commands::Start => run_start(cli.config).await,
        Commands::Validate => run_validate(cli.config),
        Commands::Init { output, node_id } => run_init(output, node_id),
    }
}

/// Initialize logging
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Run the node until interrupted
async fn run_start(config_path: PathBuf) -> anyhow::Result<()> {
    let config = match Config::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load configuration from {:?}: {}", config_path, e);
            tracing::error!("Please check that the config file exists and is valid TOML");
            return Err(e.into());
        }
    };
    tracing::info!("Starting node {} as {}", config.node.id, config.node.role);

    match config.replication_config() {
        Some(replication) => {
            let kv = store::replicated(replication)
                .await
                .context("Failed to start replication")?;
            let server = ConnectionServer::new(config.node.client_listen.clone(), Arc::clone(&kv));
            server
                .start()
                .await
                .context("Failed to start connection server")?;

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for shutdown signal")?;
            tracing::info!("Received shutdown signal");

            server.stop().await;
            kv.shutdown().await.context("Failed to stop replication")?;
        }
        None => {
            tracing::info!("No replication configured; running standalone");
            let kv = store::standalone();
            let server = ConnectionServer::new(config.node.client_listen.clone(), kv);
            server
                .start()
                .await
                .context("Failed to start connection server")?;

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for shutdown signal")?;
            tracing::info!("Received shutdown signal");

            server.stop().await;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Validate configuration
fn run_validate(config_path: PathBuf) -> anyhow::Result<()> {
    match Config::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Node ID: {}", config.node.id);
            println!("  Role: {}", config.node.role);
            println!("  Client Listen: {}", config.node.client_listen);
            match &config.replication {
                Some(replication) => {
                    println!("  Replication Port: {}", replication.port);
                    println!("  Strategy: {}", replication.strategy);
                    println!(
                        "  Mode: {}",
                        if replication.async_replication {
                            "asynchronous"
                        } else {
                            "synchronous"
                        }
                    );
                    println!("  Peers: {}", replication.nodes.len());
                }
                None => println!("  Replication: disabled (standalone)"),
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e.into())
        }
    }
}

/// Initialize configuration file
fn run_init(output: PathBuf, node_id: String) -> anyhow::Result<()> {
    let config_content = format!(
        r#"# replikv configuration
# Generated configuration file

[node]
id = "{node_id}"
role = "master"
client_listen = "127.0.0.1:7000"

[replication]
port = 9090
strategy = "master-slave"
sync_interval_ms = 1000
connection_timeout_ms = 5000
max_retries = 3
async = true

# [[replication.nodes]]
# id = "node-2"
# host = "node-2.example.com"
# port = 9090
# role = "slave"

[logging]
level = "info"
"#
    );

    std::fs::write(&output, config_content)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Configuration file created: {}", output.display());
    println!("\nEdit the file to configure peers and roles.");
    println!("Then start with: replikv start --config {}", output.display());

    Ok(())
}
