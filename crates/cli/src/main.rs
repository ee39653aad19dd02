//! Atacado CLI - operator tools for a storefront install.
//!
//! # Usage
//!
//! ```bash
//! # Show the persisted cart, grouped, with the minimum-order gate
//! atacado cart
//!
//! # Show the analytics session and abandonment state
//! atacado session
//!
//! # Show the last 10 webhook deliveries as JSON
//! atacado deliveries --limit 10 --json
//!
//! # Run one abandonment check against the live backend and webhooks
//! atacado sweep
//!
//! # Show how each webhook event is routed right now
//! atacado settings
//! ```
//!
//! # Commands
//!
//! - `cart`, `session`, `deliveries` - Read the state directory, no network
//! - `sweep` - Abandonment catch-up, for cron when the server is down
//! - `settings` - Fetch remote webhook settings and resolve routes

#![cfg_attr(not(test), forbid(unsafe_code))]
// Commands report to the terminal
#![allow(clippy::print_stdout)]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "atacado")]
#[command(author, version, about = "Atacado storefront operator tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the persisted cart
    Cart {
        #[command(flatten)]
        state: StateArgs,

        /// Minimum units per order
        #[arg(long, env = "MIN_ORDER_UNITS", default_value_t = 30)]
        min_order_units: u32,
    },
    /// Show the analytics session
    Session {
        #[command(flatten)]
        state: StateArgs,
    },
    /// Show the webhook delivery log
    Deliveries {
        #[command(flatten)]
        state: StateArgs,

        /// Only the most recent N entries
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Run one abandonment check with the full storefront configuration
    Sweep,
    /// Resolve webhook routing from the backend settings
    Settings,
}

#[derive(clap::Args)]
struct StateArgs {
    /// Storefront state directory
    #[arg(long, env = "STOREFRONT_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Print raw JSON instead of a summary
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    // Load .env before clap reads env-backed arguments
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Cart {
            state,
            min_order_units,
        } => commands::inspect::cart(&state.data_dir, min_order_units, state.json).await?,
        Commands::Session { state } => commands::inspect::session(&state.data_dir, state.json).await?,
        Commands::Deliveries { state, limit } => {
            commands::inspect::deliveries(&state.data_dir, limit, state.json).await?;
        }
        Commands::Sweep => commands::sweep::run().await?,
        Commands::Settings => commands::settings::run().await?,
    }
    Ok(())
}
