//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `BACKEND_API_URL` - Root of the backend API (`/cart-sync`, `/orders`, ...)
//! - `WEBHOOK_TEST_BASE_URL` - Automation endpoint root for test deliveries
//! - `WEBHOOK_PRODUCTION_BASE_URL` - Automation endpoint root for production deliveries
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `STOREFRONT_ENVIRONMENT` - `local` or `production` (default: local)
//! - `STOREFRONT_DATA_DIR` - Directory for persisted state (default: ./data)
//! - `WEBHOOK_SIGNING_SECRET` - HMAC-SHA256 key for `X-Webhook-Signature`
//! - `WEBHOOK_TIMEOUT_SECS` - Per-attempt timeout (default: 8)
//! - `WEBHOOK_MAX_ATTEMPTS` - Attempts per delivery (default: 3)
//! - `WEBHOOK_RETRY_DELAY_MS` - Fixed delay between attempts (default: 2000)
//! - `WEBHOOK_SETTINGS_TTL_SECS` - Remote settings cache TTL (default: 300)
//! - `ABANDONMENT_THRESHOLD_SECS` - Cart inactivity before abandonment (default: 1800)
//! - `ABANDONMENT_SWEEP_SECS` - Fallback sweep interval (default: 60)
//! - `ANALYTICS_HEARTBEAT_SECS` - Enables the analytics heartbeat at this interval
//! - `MIN_ORDER_UNITS` - Minimum units per order (default: 30)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use atacado_core::{DeploymentEnvironment, WebhookEnvironment};
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "insert",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Deployment this instance runs in
    pub environment: DeploymentEnvironment,
    /// Directory holding persisted cart, analytics and delivery log
    pub data_dir: PathBuf,
    /// Backend API root
    pub backend_url: Url,
    /// Webhook delivery configuration
    pub webhooks: WebhookConfig,
    /// Abandonment detection timing
    pub abandonment: AbandonmentConfig,
    /// Analytics heartbeat interval, disabled when `None`
    pub heartbeat_interval: Option<Duration>,
    /// Minimum units per order
    pub min_order_units: u32,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// Webhook delivery configuration.
///
/// Implements `Debug` manually to redact the signing secret.
#[derive(Clone)]
pub struct WebhookConfig {
    /// Endpoint root for test deliveries
    pub test_base_url: Url,
    /// Endpoint root for production deliveries
    pub production_base_url: Url,
    /// HMAC key for request signatures
    pub signing_secret: Option<SecretString>,
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Total attempts per delivery
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub retry_delay: Duration,
    /// How long remote settings are cached
    pub settings_ttl: Duration,
}

impl std::fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("test_base_url", &self.test_base_url.as_str())
            .field("production_base_url", &self.production_base_url.as_str())
            .field(
                "signing_secret",
                &self.signing_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("timeout", &self.timeout)
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay", &self.retry_delay)
            .field("settings_ttl", &self.settings_ttl)
            .finish()
    }
}

impl WebhookConfig {
    /// Endpoint root for `environment`.
    #[must_use]
    pub const fn base_url(&self, environment: WebhookEnvironment) -> &Url {
        match environment {
            WebhookEnvironment::Test => &self.test_base_url,
            WebhookEnvironment::Production => &self.production_base_url,
        }
    }
}

/// Abandonment detection timing.
#[derive(Debug, Clone, Copy)]
pub struct AbandonmentConfig {
    /// Cart inactivity before a cart counts as abandoned
    pub threshold: Duration,
    /// Interval of the fallback sweep
    pub sweep_interval: Duration,
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid, or
    /// if the signing secret looks like a placeholder.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = parse_env_or_default("STOREFRONT_HOST", "127.0.0.1")?;
        let port = parse_env_or_default("STOREFRONT_PORT", "3000")?;
        let environment = parse_env_or_default("STOREFRONT_ENVIRONMENT", "local")?;
        let data_dir = PathBuf::from(get_env_or_default("STOREFRONT_DATA_DIR", "./data"));
        let backend_url = get_base_url("BACKEND_API_URL")?;

        let webhooks = WebhookConfig::from_env()?;
        let abandonment = AbandonmentConfig {
            threshold: Duration::from_secs(parse_env_or_default(
                "ABANDONMENT_THRESHOLD_SECS",
                "1800",
            )?),
            sweep_interval: Duration::from_secs(non_zero(
                "ABANDONMENT_SWEEP_SECS",
                parse_env_or_default("ABANDONMENT_SWEEP_SECS", "60")?,
            )?),
        };
        let heartbeat_interval = get_optional_env("ANALYTICS_HEARTBEAT_SECS")
            .map(|raw| {
                parse_value::<u64>("ANALYTICS_HEARTBEAT_SECS", &raw)
                    .and_then(|secs| non_zero("ANALYTICS_HEARTBEAT_SECS", secs))
                    .map(Duration::from_secs)
            })
            .transpose()?;
        let min_order_units = parse_env_or_default("MIN_ORDER_UNITS", "30")?;
        let sentry_dsn = get_optional_env("SENTRY_DSN");

        Ok(Self {
            host,
            port,
            environment,
            data_dir,
            backend_url,
            webhooks,
            abandonment,
            heartbeat_interval,
            min_order_units,
            sentry_dsn,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl WebhookConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let signing_secret = get_optional_env("WEBHOOK_SIGNING_SECRET")
            .map(|value| {
                validate_secret_strength(&value, "WEBHOOK_SIGNING_SECRET")?;
                Ok::<_, ConfigError>(SecretString::from(value))
            })
            .transpose()?;

        Ok(Self {
            test_base_url: get_base_url("WEBHOOK_TEST_BASE_URL")?,
            production_base_url: get_base_url("WEBHOOK_PRODUCTION_BASE_URL")?,
            signing_secret,
            timeout: Duration::from_secs(non_zero(
                "WEBHOOK_TIMEOUT_SECS",
                parse_env_or_default("WEBHOOK_TIMEOUT_SECS", "8")?,
            )?),
            max_attempts: non_zero(
                "WEBHOOK_MAX_ATTEMPTS",
                parse_env_or_default("WEBHOOK_MAX_ATTEMPTS", "3")?,
            )?,
            retry_delay: Duration::from_millis(parse_env_or_default(
                "WEBHOOK_RETRY_DELAY_MS",
                "2000",
            )?),
            settings_ttl: Duration::from_secs(parse_env_or_default(
                "WEBHOOK_SETTINGS_TTL_SECS",
                "300",
            )?),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable. Blank values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset.
fn parse_env_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_value(key, &get_env_or_default(key, default))
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

fn non_zero<T: Default + PartialEq>(key: &str, value: T) -> Result<T, ConfigError> {
    if value == T::default() {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(value)
}

/// Read a required URL and normalize it to end with `/` so that relative
/// paths join under it.
fn get_base_url(key: &str) -> Result<Url, ConfigError> {
    normalize_base_url(key, &get_required_env(key)?)
}

fn normalize_base_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be an absolute http(s) URL".to_string(),
        ));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn webhook_config() -> WebhookConfig {
        WebhookConfig {
            test_base_url: Url::parse("https://hooks.example.com/webhook-test/").unwrap(),
            production_base_url: Url::parse("https://hooks.example.com/webhook/").unwrap(),
            signing_secret: Some(SecretString::from("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6")),
            timeout: Duration::from_secs(8),
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
            settings_ttl: Duration::from_secs(300),
        }
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-signing-key-here", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        assert!(validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR").is_ok());
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let url = normalize_base_url("X", "https://hooks.example.com/webhook").unwrap();
        assert_eq!(url.as_str(), "https://hooks.example.com/webhook/");
        assert_eq!(
            url.join("cartAbandoned").unwrap().as_str(),
            "https://hooks.example.com/webhook/cartAbandoned"
        );
    }

    #[test]
    fn test_base_url_rejects_garbage() {
        assert!(matches!(
            normalize_base_url("X", "not a url"),
            Err(ConfigError::InvalidEnvVar(_, _))
        ));
        assert!(normalize_base_url("X", "mailto:ops@example.com").is_err());
    }

    #[test]
    fn test_parse_value_reports_variable() {
        let err = parse_value::<u32>("MIN_ORDER_UNITS", "thirty").unwrap_err();
        assert!(err.to_string().contains("MIN_ORDER_UNITS"));
    }

    #[test]
    fn test_non_zero() {
        assert!(non_zero("WEBHOOK_MAX_ATTEMPTS", 0_u32).is_err());
        assert_eq!(non_zero("WEBHOOK_MAX_ATTEMPTS", 3_u32).unwrap(), 3);
    }

    #[test]
    fn test_base_url_by_environment() {
        let config = webhook_config();
        assert!(config.base_url(WebhookEnvironment::Test).as_str().contains("webhook-test"));
        assert!(!config.base_url(WebhookEnvironment::Production).as_str().contains("test"));
    }

    #[test]
    fn test_webhook_config_debug_redacts_secret() {
        let debug_output = format!("{:?}", webhook_config());
        assert!(debug_output.contains("hooks.example.com"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("aB3$xY9"));
    }
}
