use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use busy_airports::config::{Config, config_path};
use busy_airports::log_format::TargetFirstFormat;

mod commands;

#[derive(Parser)]
#[command(name = "busy-airports")]
#[command(about = "Count the pilots departing a set of airports right now")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Path to the TOML config file (defaults to BUSY_AIRPORTS_CONFIG or ./busy-airports.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve departure counts over HTTP
    Serve {
        /// Interface to bind to (overrides server.interface)
        #[arg(long)]
        interface: Option<String>,

        /// Port to listen on (overrides server.port)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run a single cycle and print the departure counts
    Count {
        /// Print the report as JSON instead of one line per airport
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Fetch reference data for every watched airport again and rewrite the store
    RefreshAirports,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .event_format(TargetFirstFormat::new(std::io::IsTerminal::is_terminal(
                    &std::io::stderr(),
                )))
                .with_writer(std::io::stderr),
        )
        .init();

    let path = cli.config.unwrap_or_else(config_path);
    let config = Config::load_or_default(&path)
        .with_context(|| format!("Failed to load configuration from {:?}", path))?;
    info!(
        "Watching {} airports: {}",
        config.watch_list.len(),
        config.watch_list.join(", ")
    );

    match cli.command {
        Commands::Serve { interface, port } => {
            commands::handle_serve(config, interface, port).await
        }
        Commands::Count { json } => commands::handle_count(config, json).await,
        Commands::RefreshAirports => commands::handle_refresh_airports(config).await,
    }
}
