//! Deployment-intent records and issue comments on the integration platform.

use async_trait::async_trait;
use github_api::{
    CreateDeploymentRequest, CreateDeploymentStatusRequest, DeploymentState, GithubClient,
};
use gs_infra::types::ServerConfig;

use crate::credentials::Credential;

/// GitHub caps status descriptions at 140 characters.
const MAX_DESCRIPTION_CHARS: usize = 140;

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error(transparent)]
    Github(#[from] github_api::Error),
}

/// Status mirrored onto a deployment-intent record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentStatus {
    Success,
    Failure,
    Inactive,
}

impl From<IntentStatus> for DeploymentState {
    fn from(status: IntentStatus) -> Self {
        match status {
            IntentStatus::Success => DeploymentState::Success,
            IntentStatus::Failure => DeploymentState::Failure,
            IntentStatus::Inactive => DeploymentState::Inactive,
        }
    }
}

#[async_trait]
pub trait IntegrationPlatform: Send + Sync + 'static {
    /// Open an intent record for a deploy and return its id.
    async fn create_deployment(
        &self,
        credential: &Credential,
        owner: &str,
        config: &ServerConfig,
    ) -> Result<i64, PlatformError>;

    async fn set_deployment_status(
        &self,
        credential: &Credential,
        deployment_id: i64,
        status: IntentStatus,
        description: &str,
    ) -> Result<(), PlatformError>;

    async fn post_issue_comment(
        &self,
        credential: &Credential,
        repo: &str,
        issue_number: u64,
        body: &str,
    ) -> Result<(), PlatformError>;
}

/// GitHub Deployments API against one repository and ref.
pub struct GithubPlatform {
    client: GithubClient,
    repo: String,
    git_ref: String,
}

impl GithubPlatform {
    pub fn new(client: GithubClient, repo: impl Into<String>, git_ref: impl Into<String>) -> Self {
        Self {
            client,
            repo: repo.into(),
            git_ref: git_ref.into(),
        }
    }
}

/// One environment per `(owner, name)`. GitHub marks earlier deployments to
/// the same environment inactive, which must only ever hit the same server.
pub fn environment_name(owner: &str, config: &ServerConfig) -> String {
    format!("gameserver/{owner}/{}", config.name)
}

pub fn truncate_description(description: &str) -> String {
    description.chars().take(MAX_DESCRIPTION_CHARS).collect()
}

#[async_trait]
impl IntegrationPlatform for GithubPlatform {
    async fn create_deployment(
        &self,
        credential: &Credential,
        owner: &str,
        config: &ServerConfig,
    ) -> Result<i64, PlatformError> {
        let req = CreateDeploymentRequest {
            git_ref: self.git_ref.clone(),
            environment: environment_name(owner, config),
            description: truncate_description(&format!(
                "{} server {:?} on {} for {owner}",
                config.game_type,
                config.name,
                config.provider.display_name()
            )),
            auto_merge: false,
            required_contexts: Vec::new(),
            transient_environment: false,
            payload: serde_json::json!({ "owner": owner, "config": config }),
        };
        let deployment = self
            .client
            .create_deployment(&credential.token, &self.repo, &req)
            .await?;
        tracing::debug!(deployment_id = deployment.id, repo = %self.repo, "deployment intent created");
        Ok(deployment.id)
    }

    async fn set_deployment_status(
        &self,
        credential: &Credential,
        deployment_id: i64,
        status: IntentStatus,
        description: &str,
    ) -> Result<(), PlatformError> {
        let req = CreateDeploymentStatusRequest {
            state: status.into(),
            description: Some(truncate_description(description)),
            environment_url: None,
        };
        self.client
            .create_deployment_status(&credential.token, &self.repo, deployment_id, &req)
            .await?;
        Ok(())
    }

    async fn post_issue_comment(
        &self,
        credential: &Credential,
        repo: &str,
        issue_number: u64,
        body: &str,
    ) -> Result<(), PlatformError> {
        self.client
            .create_issue_comment(&credential.token, repo, issue_number, body)
            .await?;
        Ok(())
    }
}
