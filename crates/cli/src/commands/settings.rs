//! Webhook routing check.
//!
//! Fetches the remote webhook settings and prints, for every event type,
//! whether it is sent and to which endpoint. When the backend cannot be
//! reached the deployment defaults are shown, as the storefront would use.

use atacado_core::{WebhookEventType, WebhookRoute, WebhookSettings};
use atacado_storefront::config::{ConfigError, StorefrontConfig};
use atacado_storefront::services::{BackendClient, BackendError, RetryPolicy};
use thiserror::Error;

/// Errors that can occur while checking settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Configuration is incomplete.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Backend client could not be built.
    #[error("Backend client error: {0}")]
    Backend(#[from] BackendError),
}

/// Print the resolved route of every webhook event.
pub async fn run() -> Result<(), SettingsError> {
    let config = StorefrontConfig::from_env()?;
    let backend = BackendClient::new(
        config.backend_url.clone(),
        config.webhooks.timeout,
        RetryPolicy::once(),
    )?;

    let settings = match backend.webhook_settings().await {
        Ok(settings) => Some(settings),
        Err(e) => {
            tracing::warn!(error = %e, "Webhook settings unavailable, showing defaults");
            None
        }
    };

    println!("Deployment: {}", config.environment);
    for (event, route) in resolve(settings.as_ref(), &config) {
        let target = if route.enabled {
            config
                .webhooks
                .base_url(route.environment)
                .join(event.as_str())
                .map_or_else(|e| format!("invalid endpoint: {e}"), |url| url.to_string())
        } else {
            "disabled".to_string()
        };
        println!("  {:<20} {:<10} {}", event.as_str(), route.environment.to_string(), target);
    }
    Ok(())
}

fn resolve(
    settings: Option<&WebhookSettings>,
    config: &StorefrontConfig,
) -> Vec<(WebhookEventType, WebhookRoute)> {
    WebhookEventType::ALL
        .into_iter()
        .map(|event| {
            let route = settings.map_or_else(
                || WebhookRoute::default_for(config.environment),
                |s| s.route_for(event, config.environment),
            );
            (event, route)
        })
        .collect()
}
