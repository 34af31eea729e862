pub mod cloud_init;
pub mod digitalocean;
pub mod self_hosted;
pub mod types;
pub mod unsupported;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use types::{InstanceId, InstanceInfo, ProvisionOutcome, ServerConfig};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("digitalocean provider error: {0}")]
    DigitalOcean(#[from] digitalocean_api::Error),

    #[error("invalid instance id: {0}")]
    InvalidId(String),

    #[error("missing env var: {0}")]
    MissingEnv(String),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),
}

impl Error {
    /// Classify the failure so callers can tell retryable errors apart.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::DigitalOcean(e) if e.is_transient() => FailureKind::Transient,
            _ => FailureKind::Permanent,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why a provider call did not do what was asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The provider deliberately does not support the operation.
    NotImplemented,
    /// Network trouble, rate limiting or a provider-side 5xx.
    Transient,
    Permanent,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotImplemented => "not_implemented",
            Self::Transient => "transient",
            Self::Permanent => "permanent",
        })
    }
}

/// Known hosting provider backends. The set is closed: anything else is
/// rejected when parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderName {
    Aws,
    Gcp,
    Azure,
    DigitalOcean,
    Linode,
    Vultr,
    #[serde(rename = "self_hosted")]
    SelfHosted,
}

impl ProviderName {
    pub const ALL: [ProviderName; 7] = [
        Self::Aws,
        Self::Gcp,
        Self::Azure,
        Self::DigitalOcean,
        Self::Linode,
        Self::Vultr,
        Self::SelfHosted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::Gcp => "gcp",
            Self::Azure => "azure",
            Self::DigitalOcean => "digitalocean",
            Self::Linode => "linode",
            Self::Vultr => "vultr",
            Self::SelfHosted => "self_hosted",
        }
    }

    /// Human-facing name, used in messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Aws => "AWS",
            Self::Gcp => "GCP",
            Self::Azure => "Azure",
            Self::DigitalOcean => "DigitalOcean",
            Self::Linode => "Linode",
            Self::Vultr => "Vultr",
            Self::SelfHosted => "Self-hosted",
        }
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| Error::UnknownProvider(s.to_string()))
    }
}

/// Backend-agnostic interface for managing game-server instances.
///
/// Each provider implements this trait and owns its own configuration.
/// A provider that does not support an operation answers with a
/// "not implemented" result instead of an error: a failed
/// [`ProvisionOutcome`] from `provision`, `false` from `terminate` and
/// [`types::InstanceState::Unknown`] from `fetch_status`.
#[async_trait]
pub trait GameServerProvider: Send + Sync + 'static {
    /// Request a new instance for `config`.
    async fn provision(&self, config: &ServerConfig) -> Result<ProvisionOutcome>;

    /// Tear an instance down. Returns `false` when the provider cannot.
    async fn terminate(&self, id: &InstanceId) -> Result<bool>;

    /// Get current instance status and metadata.
    async fn fetch_status(&self, id: &InstanceId) -> Result<InstanceInfo>;

    /// Provider identifier.
    fn name(&self) -> ProviderName;

    /// Whether this backend actually talks to a provider.
    fn is_implemented(&self) -> bool {
        true
    }
}

/// One provider implementation per [`ProviderName`].
///
/// Every name always resolves: variants without a real backend are filled
/// with [`unsupported::UnsupportedProvider`].
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderName, Arc<dyn GameServerProvider>>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    /// Registry with the self-hosted backend and every cloud unsupported.
    pub fn new() -> Self {
        let mut providers: HashMap<ProviderName, Arc<dyn GameServerProvider>> = ProviderName::ALL
            .into_iter()
            .map(|name| {
                let provider: Arc<dyn GameServerProvider> =
                    Arc::new(unsupported::UnsupportedProvider::new(name));
                (name, provider)
            })
            .collect();
        providers.insert(
            ProviderName::SelfHosted,
            Arc::new(self_hosted::SelfHostedProvider),
        );
        Self { providers }
    }

    /// Replace the backend registered under `provider.name()`.
    pub fn with_provider(mut self, provider: Arc<dyn GameServerProvider>) -> Self {
        self.providers.insert(provider.name(), provider);
        self
    }

    /// Look up a provider by name.
    pub fn get(&self, name: ProviderName) -> Arc<dyn GameServerProvider> {
        self.providers
            .get(&name)
            .cloned()
            .unwrap_or_else(|| Arc::new(unsupported::UnsupportedProvider::new(name)))
    }

    /// Names of providers backed by a real implementation.
    pub fn available(&self) -> Vec<ProviderName> {
        ProviderName::ALL
            .into_iter()
            .filter(|name| {
                self.providers
                    .get(name)
                    .is_some_and(|provider| provider.is_implemented())
            })
            .collect()
    }
}

/// Build the registry from environment variables.
///
/// Providers with missing configuration stay registered as unsupported,
/// with a message saying why.
pub fn build_providers() -> ProviderRegistry {
    dotenvy::dotenv().ok();

    let mut registry = ProviderRegistry::new();

    match digitalocean::DigitalOceanProvider::from_env() {
        Ok(p) => {
            tracing::info!("registered DigitalOcean provider");
            registry = registry.with_provider(Arc::new(p));
        }
        Err(e) => {
            tracing::debug!("skipping DigitalOcean provider: {e}");
            registry = registry.with_provider(Arc::new(unsupported::UnsupportedProvider::unconfigured(
                ProviderName::DigitalOcean,
            )));
        }
    }

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names_parse_from_their_wire_form() {
        for name in ProviderName::ALL {
            assert_eq!(name.as_str().parse::<ProviderName>().unwrap(), name);
            let json = serde_json::to_value(name).unwrap();
            assert_eq!(json, name.as_str());
        }
    }

    #[test]
    fn unknown_provider_is_rejected() {
        assert!(matches!(
            "hetzner".parse::<ProviderName>(),
            Err(Error::UnknownProvider(p)) if p == "hetzner"
        ));
        assert!("AWS".parse::<ProviderName>().is_err());
        assert!(serde_json::from_str::<ProviderName>("\"selfhosted\"").is_err());
    }

    #[test]
    fn default_registry_only_implements_self_hosted() {
        let registry = ProviderRegistry::new();
        assert_eq!(registry.available(), vec![ProviderName::SelfHosted]);

        for name in ProviderName::ALL {
            assert_eq!(registry.get(name).name(), name);
        }
    }
}
