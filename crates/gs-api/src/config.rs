use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use gs_infra::ProviderName;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub database_url: Option<String>,
    pub control_plane_api_key: String,
    pub github: GithubAppConfig,
    pub webhook: WebhookConfig,
    pub deploy_timeout: Duration,
    pub monitor_interval_secs: u64,
    pub token_refresh_skew_secs: i64,
}

/// GitHub App identity and the repository that receives deployment intents.
#[derive(Clone)]
pub struct GithubAppConfig {
    pub api_url: String,
    pub app_id: u64,
    pub installation_id: u64,
    pub private_key_pem: String,
    pub deploy_repo: String,
    pub deploy_ref: String,
}

impl fmt::Debug for GithubAppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubAppConfig")
            .field("api_url", &self.api_url)
            .field("app_id", &self.app_id)
            .field("installation_id", &self.installation_id)
            .field("private_key_pem", &"<redacted>")
            .field("deploy_repo", &self.deploy_repo)
            .field("deploy_ref", &self.deploy_ref)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Shared secret for `X-Hub-Signature-256`. Unsigned deliveries are
    /// accepted when unset.
    pub secret: Option<String>,
    pub trigger_repository: String,
    pub marker_prefix: String,
    pub auto_deploy_provider: ProviderName,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            listen_addr: parsed_or("LISTEN_ADDR", "0.0.0.0:8080")?,
            database_url: optional("DATABASE_URL"),
            control_plane_api_key: required("CONTROL_PLANE_API_KEY")?,
            github: GithubAppConfig {
                api_url: optional("GITHUB_API_URL")
                    .unwrap_or_else(|| github_api::DEFAULT_BASE_URL.into()),
                app_id: parsed("GITHUB_APP_ID")?,
                installation_id: parsed("GITHUB_INSTALLATION_ID")?,
                private_key_pem: private_key()?,
                deploy_repo: required("GITHUB_DEPLOY_REPO")?,
                deploy_ref: optional("GITHUB_DEPLOY_REF").unwrap_or_else(|| "main".into()),
            },
            webhook: WebhookConfig {
                secret: optional("GITHUB_WEBHOOK_SECRET"),
                trigger_repository: required("TRIGGER_REPOSITORY")?,
                marker_prefix: optional("ISSUE_MARKER_PREFIX")
                    .unwrap_or_else(|| "[Deploy]".into()),
                auto_deploy_provider: parsed_or("AUTO_DEPLOY_PROVIDER", "digitalocean")?,
            },
            deploy_timeout: Duration::from_secs(parsed_or("DEPLOY_TIMEOUT_SECS", "600")?),
            monitor_interval_secs: parsed_or("MONITOR_INTERVAL_SECS", "60")?,
            token_refresh_skew_secs: parsed_or("TOKEN_REFRESH_SKEW_SECS", "60")?,
        })
    }
}

fn optional(name: &'static str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

fn parse_value<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}

fn parsed<T>(name: &'static str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    parse_value(name, &required(name)?)
}

fn parsed_or<T>(name: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    parse_value(name, optional(name).as_deref().unwrap_or(default))
}

/// The App's RSA key, either as PEM (literal `\n` sequences allowed, as
/// most env files can't hold multi-line values) or base64-encoded PEM.
fn private_key() -> Result<String, ConfigError> {
    if let Some(pem) = optional("GITHUB_PRIVATE_KEY") {
        return Ok(pem.replace("\\n", "\n"));
    }

    let encoded = optional("GITHUB_PRIVATE_KEY_BASE64").ok_or(ConfigError::Missing(
        "GITHUB_PRIVATE_KEY or GITHUB_PRIVATE_KEY_BASE64",
    ))?;
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| ConfigError::Invalid {
            name: "GITHUB_PRIVATE_KEY_BASE64",
            reason: e.to_string(),
        })?;
    String::from_utf8(bytes).map_err(|e| ConfigError::Invalid {
        name: "GITHUB_PRIVATE_KEY_BASE64",
        reason: e.to_string(),
    })
}

#[cfg(test)]
impl AppConfig {
    pub fn for_tests() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            database_url: None,
            control_plane_api_key: "test-key".into(),
            github: GithubAppConfig {
                api_url: "http://github.invalid".into(),
                app_id: 1,
                installation_id: 2,
                private_key_pem: String::new(),
                deploy_repo: "acme/deployments".into(),
                deploy_ref: "main".into(),
            },
            webhook: WebhookConfig {
                secret: Some("webhook-secret".into()),
                trigger_repository: "game-servers".into(),
                marker_prefix: "[Deploy]".into(),
                auto_deploy_provider: ProviderName::DigitalOcean,
            },
            deploy_timeout: Duration::from_secs(5),
            monitor_interval_secs: 60,
            token_refresh_skew_secs: 60,
        }
    }
}
