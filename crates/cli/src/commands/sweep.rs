//! One-shot abandonment sweep.
//!
//! Starts a storefront context over the configured state directory, which
//! evaluates abandonment on startup, waits for that check to deliver,
//! reports what happened and shuts down.
//! Meant for cron while the server is not running.
//!
//! # Environment Variables
//!
//! Same as the storefront server (`BACKEND_API_URL`, `WEBHOOK_*_BASE_URL`,
//! `STOREFRONT_DATA_DIR`, ...).

use std::sync::Arc;

use atacado_core::{AbandonmentState, WebhookEventType};
use atacado_storefront::Storefront;
use atacado_storefront::clock::{Clock, SystemClock};
use atacado_storefront::config::{ConfigError, StorefrontConfig};
use atacado_storefront::context::InitError;
use atacado_storefront::storage::{FileStore, StorageError};
use thiserror::Error;

/// Errors that can occur during a sweep.
#[derive(Debug, Error)]
pub enum SweepError {
    /// Configuration is incomplete.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// State directory could not be opened.
    #[error("State directory error: {0}")]
    Storage(#[from] StorageError),

    /// Storefront context failed to start.
    #[error("Startup error: {0}")]
    Init(#[from] InitError),
}

/// Evaluate abandonment once and print the result.
pub async fn run() -> Result<(), SweepError> {
    let config = StorefrontConfig::from_env()?;
    let store = FileStore::open(&config.data_dir)?;
    let clock = SystemClock;
    let started = clock.now();

    tracing::info!(data_dir = %config.data_dir.display(), "Running abandonment sweep");
    let storefront = Storefront::init(&config, Arc::new(store), Arc::new(clock)).await?;
    let check = storefront.catch_up().await;
    tracing::debug!(?check, "Startup abandonment check finished");

    let fired: Vec<_> = storefront
        .deliveries()
        .await
        .into_iter()
        .filter(|r| r.event == WebhookEventType::CartAbandoned && r.timestamp >= started)
        .collect();
    let state = storefront.abandonment_state().await;
    storefront.dispose();

    if fired.is_empty() {
        match state {
            AbandonmentState::Idle => println!("Nothing to do: no cart activity being watched"),
            AbandonmentState::Watching => {
                println!("Cart still within the abandonment threshold");
            }
        }
    } else {
        for record in fired {
            println!(
                "cartAbandoned sent to {} ({})",
                record.environment,
                if record.outcome.is_delivered() {
                    "delivered"
                } else {
                    "not delivered"
                }
            );
        }
    }
    Ok(())
}
