//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::StorefrontConfig;
use crate::context::Storefront;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and gives handlers the
/// configuration and the single storefront context of this install.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    storefront: Storefront,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(config: StorefrontConfig, storefront: Storefront) -> Self {
        Self {
            inner: Arc::new(AppStateInner { config, storefront }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the storefront context.
    #[must_use]
    pub fn storefront(&self) -> &Storefront {
        &self.inner.storefront
    }
}
