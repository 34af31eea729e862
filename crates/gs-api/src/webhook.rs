//! Webhook event dispatch.
//!
//! Events are classified synchronously; any deploy they trigger is handed
//! to a background task, so dispatch never waits on a provider.

use std::sync::Arc;

use gs_infra::ProviderName;
use gs_infra::types::{ServerConfig, ValidationError};
use serde::Serialize;
use serde_json::Value;

use crate::config::WebhookConfig;
use crate::credentials::CredentialBroker;
use crate::orchestrator::{DeployError, DeployReport, Deployer};
use crate::platform::IntegrationPlatform;

/// Owner recorded for servers created by repository pushes.
pub const AUTOMATION_OWNER: &str = "github-automation";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Queued { owner: String, server: String },
    Ignored { reason: String },
    Rejected { reason: String },
}

impl DispatchOutcome {
    fn ignored(reason: impl Into<String>) -> Self {
        Self::Ignored {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum PayloadError {
    #[error("payload is missing {0}")]
    Missing(&'static str),

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

fn str_at<'a>(payload: &'a Value, pointer: &str, field: &'static str) -> Result<&'a str, PayloadError> {
    payload
        .pointer(pointer)
        .and_then(Value::as_str)
        .ok_or(PayloadError::Missing(field))
}

struct IssueRequest {
    owner: String,
    repo: String,
    number: u64,
    config: ServerConfig,
}

pub struct WebhookRouter {
    deployer: Arc<dyn Deployer>,
    broker: Arc<CredentialBroker>,
    platform: Arc<dyn IntegrationPlatform>,
    settings: WebhookConfig,
}

impl WebhookRouter {
    pub fn new(
        deployer: Arc<dyn Deployer>,
        broker: Arc<CredentialBroker>,
        platform: Arc<dyn IntegrationPlatform>,
        settings: WebhookConfig,
    ) -> Self {
        Self {
            deployer,
            broker,
            platform,
            settings,
        }
    }

    pub fn settings(&self) -> &WebhookConfig {
        &self.settings
    }

    /// Classify one delivery and start whatever it asks for.
    ///
    /// Must be called from within a tokio runtime.
    pub fn dispatch(&self, event_type: &str, payload: &Value) -> DispatchOutcome {
        let outcome = match event_type {
            "push" => self.on_push(payload),
            "issues" => self.on_issue(payload),
            "deployment" => Ok(on_deployment(payload)),
            "ping" => Ok(DispatchOutcome::ignored("ping")),
            other => Ok(DispatchOutcome::ignored(format!("unhandled event {other:?}"))),
        }
        .unwrap_or_else(|e| DispatchOutcome::Rejected {
            reason: e.to_string(),
        });

        match &outcome {
            DispatchOutcome::Queued { owner, server } => {
                tracing::info!(event = event_type, owner = %owner, server = %server, "webhook deploy queued")
            }
            DispatchOutcome::Ignored { reason } => {
                tracing::debug!(event = event_type, reason = %reason, "webhook ignored")
            }
            DispatchOutcome::Rejected { reason } => {
                tracing::warn!(event = event_type, reason = %reason, "webhook rejected")
            }
        }
        outcome
    }

    fn on_push(&self, payload: &Value) -> Result<DispatchOutcome, PayloadError> {
        let repo = str_at(payload, "/repository/name", "repository.name")?;
        if repo != self.settings.trigger_repository {
            return Ok(DispatchOutcome::ignored(format!(
                "push to {repo} is not the trigger repository"
            )));
        }

        let config = auto_deploy_config(repo, self.settings.auto_deploy_provider);
        config.validate()?;
        let outcome = DispatchOutcome::Queued {
            owner: AUTOMATION_OWNER.into(),
            server: config.name.clone(),
        };

        let deployer = self.deployer.clone();
        tokio::spawn(async move {
            let server = config.name.clone();
            match deployer.submit(AUTOMATION_OWNER, config).await {
                Ok(report) => tracing::info!(
                    server = %server,
                    record_id = %report.record_id,
                    success = report.result.success,
                    "push deploy finished"
                ),
                Err(e) => tracing::error!(server = %server, error = %e, "push deploy failed"),
            }
        });
        Ok(outcome)
    }

    fn on_issue(&self, payload: &Value) -> Result<DispatchOutcome, PayloadError> {
        let action = str_at(payload, "/action", "action")?;
        if action != "opened" {
            return Ok(DispatchOutcome::ignored(format!("issue {action}")));
        }
        let title = str_at(payload, "/issue/title", "issue.title")?;
        if !title.trim_start().starts_with(&self.settings.marker_prefix) {
            return Ok(DispatchOutcome::ignored("issue title has no deploy marker"));
        }
        // GitHub sends `null` for an issue opened without a description.
        let body = payload
            .pointer("/issue/body")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let request = IssueRequest {
            owner: payload
                .pointer("/issue/user/login")
                .and_then(Value::as_str)
                .unwrap_or(AUTOMATION_OWNER)
                .to_string(),
            repo: str_at(payload, "/repository/full_name", "repository.full_name")?.to_string(),
            number: payload
                .pointer("/issue/number")
                .and_then(Value::as_u64)
                .ok_or(PayloadError::Missing("issue.number"))?,
            config: parse_issue_body(body)?,
        };
        let outcome = DispatchOutcome::Queued {
            owner: request.owner.clone(),
            server: request.config.name.clone(),
        };

        let deployer = self.deployer.clone();
        let broker = self.broker.clone();
        let platform = self.platform.clone();
        tokio::spawn(async move {
            let IssueRequest {
                owner,
                repo,
                number,
                config,
            } = request;
            let server = config.name.clone();
            let result = deployer.submit(&owner, config).await;
            if let Err(e) = &result {
                tracing::error!(server = %server, issue = number, error = %e, "issue deploy failed");
            }

            let comment = render_comment(&server, &result);
            let posted = match broker.get_token().await {
                Ok(credential) => platform
                    .post_issue_comment(&credential, &repo, number, &comment)
                    .await
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            if let Err(e) = posted {
                tracing::warn!(repo = %repo, issue = number, error = %e, "failed to comment on issue");
            }
        });
        Ok(outcome)
    }
}

fn on_deployment(payload: &Value) -> DispatchOutcome {
    let id = payload.pointer("/deployment/id").and_then(Value::as_i64);
    let environment = payload
        .pointer("/deployment/environment")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    tracing::info!(deployment_id = ?id, environment, "deployment event received");
    DispatchOutcome::ignored("deployment events are acknowledged only")
}

/// Fixed config deployed on pushes to the trigger repository.
pub fn auto_deploy_config(repo: &str, provider: ProviderName) -> ServerConfig {
    ServerConfig {
        name: format!("auto-{repo}"),
        game_type: "minecraft".into(),
        max_players: 100,
        provider,
        cpu_cores: 4,
        ram_gb: 8,
        storage_gb: 100,
        ..ServerConfig::default()
    }
}

fn parse_number<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, ValidationError> {
    value.parse().map_err(|_| ValidationError::Malformed {
        field: field.to_string(),
        value: value.to_string(),
    })
}

fn parse_flag(field: &str, value: &str) -> Result<bool, ValidationError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(ValidationError::Malformed {
            field: field.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Read `key: value` lines from an issue body over the default config.
///
/// Keys are case-insensitive and may use spaces or dashes (`Max Players`);
/// list bullets and backticks around values are tolerated. Unknown keys are
/// skipped, but a known key with an unusable value fails the whole body.
pub fn parse_issue_body(body: &str) -> Result<ServerConfig, ValidationError> {
    let mut config = ServerConfig::default();

    for line in body.lines() {
        let line = line.trim().trim_start_matches(['-', '*']).trim();
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key
            .trim()
            .trim_matches('*')
            .to_ascii_lowercase()
            .replace([' ', '-'], "_");
        let value = value.trim().trim_matches('`').trim();
        if value.is_empty() {
            continue;
        }

        match key.as_str() {
            "name" => config.name = value.into(),
            "game_type" | "game" => config.game_type = value.to_ascii_lowercase(),
            "max_players" | "players" => config.max_players = parse_number(&key, value)?,
            "region" => config.region = value.into(),
            "provider" => {
                config.provider = value
                    .to_ascii_lowercase()
                    .parse()
                    .map_err(|_| ValidationError::UnknownProvider(value.to_string()))?
            }
            "cpu_cores" | "cpu" => config.cpu_cores = parse_number(&key, value)?,
            "ram_gb" | "ram" => config.ram_gb = parse_number(&key, value)?,
            "storage_gb" | "storage" => config.storage_gb = parse_number(&key, value)?,
            "port" => config.port = parse_number(&key, value)?,
            "world_seed" | "seed" => config.world_seed = Some(value.into()),
            "game_mode" | "mode" => config.game_mode = value.into(),
            "difficulty" => config.difficulty = value.into(),
            "enable_https" | "https" => config.enable_https = parse_flag(&key, value)?,
            "domain" => config.domain = Some(value.into()),
            _ => {}
        }
    }

    config.validate()?;
    Ok(config)
}

fn render_comment(server: &str, result: &Result<DeployReport, DeployError>) -> String {
    let report = match result {
        Ok(report) => report,
        Err(e) => return format!("**Deployment failed** for `{server}`\n\n{e}\n"),
    };
    let result = &report.result;
    if !result.success {
        return format!(
            "**Deployment failed** for `{server}`\n\n{}\n",
            result.error_message.as_deref().unwrap_or("unknown error")
        );
    }

    let mut comment = format!(
        "**Deployment started** for `{server}`\n\n\
         - Status: `{}`\n\
         - Server ID: `{}`\n\
         - Address: `{}:{}`\n\
         - Record: `{}`\n",
        result.status.as_str(),
        result.server_id,
        result.ip_address,
        result.port,
        report.record_id,
    );
    if let Some(domain) = &result.domain {
        comment.push_str(&format!("- Domain: `{domain}`\n"));
    }
    if let Some(script) = &result.setup_script {
        comment.push_str("\nRun this setup script on your host:\n\n```yaml\n");
        comment.push_str(script);
        comment.push_str("\n```\n");
    }
    comment
}
