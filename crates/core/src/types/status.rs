//! Status and mode enums shared across components.

use serde::{Deserialize, Serialize};

/// Where this storefront instance runs.
///
/// Resolved once from configuration at startup; it decides the fallback
/// webhook settings when the remote settings cannot be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentEnvironment {
    /// Developer machine or preview build.
    #[default]
    Local,
    /// Customer-facing deployment.
    Production,
}

impl std::fmt::Display for DeploymentEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Production => write!(f, "production"),
        }
    }
}

impl std::str::FromStr for DeploymentEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "development" | "dev" => Ok(Self::Local),
            "production" | "prod" => Ok(Self::Production),
            _ => Err(format!("invalid deployment environment: {s}")),
        }
    }
}

/// Which automation endpoint root a webhook goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WebhookEnvironment {
    /// Test endpoint root.
    #[default]
    Test,
    /// Production endpoint root.
    Production,
}

impl std::fmt::Display for WebhookEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Test => write!(f, "test"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Kind of cart mutation recorded in the analytics log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CartEventKind {
    /// A row was created or its quantity incremented.
    Add,
    /// A row's quantity was replaced.
    Update,
    /// A row was deleted.
    Remove,
}

impl std::fmt::Display for CartEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Update => write!(f, "update"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_deployment_environment_from_str() {
        assert_eq!(
            "production".parse::<DeploymentEnvironment>().unwrap(),
            DeploymentEnvironment::Production
        );
        assert_eq!(
            " Local ".parse::<DeploymentEnvironment>().unwrap(),
            DeploymentEnvironment::Local
        );
        assert!("staging".parse::<DeploymentEnvironment>().is_err());
    }

    #[test]
    fn test_webhook_environment_serde() {
        let json = serde_json::to_string(&WebhookEnvironment::Production).unwrap();
        assert_eq!(json, "\"production\"");
        let env: WebhookEnvironment = serde_json::from_str("\"test\"").unwrap();
        assert_eq!(env, WebhookEnvironment::Test);
    }

    #[test]
    fn test_cart_event_kind_display() {
        assert_eq!(CartEventKind::Remove.to_string(), "remove");
    }
}
