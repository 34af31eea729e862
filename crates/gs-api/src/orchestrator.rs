//! Deployment orchestration.
//!
//! A deploy runs through authentication, the platform intent record, the
//! server record and the provider call, recording every outcome. At most one
//! deploy or stop is in flight per `(owner, name)`; unrelated identities
//! never wait on each other.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use gs_db::ServerRegistry;
use gs_db::models::{DeploymentUpdate, ServerRecord, ServerStatus};
use gs_infra::types::{
    DeploymentResult, DeploymentStatus, InstanceId, ServerConfig, ValidationError,
};
use gs_infra::{FailureKind, GameServerProvider, ProviderName, ProviderRegistry};
use serde::Serialize;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::credentials::{AuthError, CredentialBroker};
use crate::platform::{IntegrationPlatform, IntentStatus, PlatformError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployPhase {
    Requested,
    Authenticating,
    RecordCreated,
    Provisioning,
    Running,
    ManualSetup,
    Failed,
    /// Not a deploy phase: a stop or delete holds the identity.
    Stopping,
}

impl DeployPhase {
    fn after(result: &DeploymentResult) -> Self {
        match result.status {
            DeploymentStatus::Provisioning | DeploymentStatus::Running => Self::Running,
            DeploymentStatus::ManualSetupRequired => Self::ManualSetup,
            DeploymentStatus::Error => Self::Failed,
        }
    }
}

impl fmt::Display for DeployPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Requested => "requested",
            Self::Authenticating => "authenticating",
            Self::RecordCreated => "record_created",
            Self::Provisioning => "provisioning",
            Self::Running => "running",
            Self::ManualSetup => "manual_setup",
            Self::Failed => "failed",
            Self::Stopping => "stopping",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("invalid server config: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{provider} provider failed ({kind}): {message}")]
    Provider {
        provider: ProviderName,
        kind: FailureKind,
        message: String,
    },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("server {0} not found")]
    NotFound(Uuid),

    #[error("deployment did not finish within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("integration platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("registry error: {0}")]
    Registry(gs_db::Error),

    #[error("deploy task interrupted: {0}")]
    Interrupted(String),
}

impl From<gs_db::Error> for DeployError {
    fn from(e: gs_db::Error) -> Self {
        match e {
            gs_db::Error::NotFound(id) => Self::NotFound(id),
            other => Self::Registry(other),
        }
    }
}

impl DeployError {
    /// Stable machine-readable label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Auth(_) => "auth",
            Self::Provider { .. } => "provider",
            Self::Conflict(_) => "conflict",
            Self::NotFound(_) => "not_found",
            Self::Timeout(_) => "timeout",
            Self::Platform(_) => "platform",
            Self::Registry(_) => "registry",
            Self::Interrupted(_) => "interrupted",
        }
    }

    fn provider(provider: ProviderName, e: &gs_infra::Error) -> Self {
        Self::Provider {
            provider,
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// Outcome of a deploy that reached the provider.
#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    pub record_id: Uuid,
    #[serde(flatten)]
    pub result: DeploymentResult,
}

/// Anything that can accept a deploy request. Webhook handling depends on
/// this rather than on the orchestrator itself.
#[async_trait]
pub trait Deployer: Send + Sync + 'static {
    async fn submit(&self, owner: &str, config: ServerConfig) -> Result<DeployReport, DeployError>;
}

type Identity = (String, String);
type InFlight = Arc<Mutex<HashMap<Identity, DeployPhase>>>;

/// Holds an identity for the duration of one operation.
struct IdentityGuard {
    in_flight: InFlight,
    key: Identity,
}

impl IdentityGuard {
    fn acquire(in_flight: &InFlight, owner: &str, name: &str, phase: DeployPhase) -> Result<Self, DeployError> {
        let key = (owner.to_string(), name.to_string());
        let mut map = in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = map.get(&key) {
            return Err(DeployError::Conflict(format!(
                "{name:?} for {owner} is already {current}"
            )));
        }
        map.insert(key.clone(), phase);
        Ok(Self {
            in_flight: in_flight.clone(),
            key,
        })
    }

    fn advance(&self, phase: DeployPhase) {
        let mut map = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        map.insert(self.key.clone(), phase);
    }
}

impl Drop for IdentityGuard {
    fn drop(&mut self) {
        let mut map = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        map.remove(&self.key);
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    broker: Arc<CredentialBroker>,
    platform: Arc<dyn IntegrationPlatform>,
    providers: ProviderRegistry,
    registry: Arc<dyn ServerRegistry>,
    deploy_timeout: Duration,
    in_flight: InFlight,
}

impl Orchestrator {
    pub fn new(
        broker: Arc<CredentialBroker>,
        platform: Arc<dyn IntegrationPlatform>,
        providers: ProviderRegistry,
        registry: Arc<dyn ServerRegistry>,
        deploy_timeout: Duration,
    ) -> Self {
        Self {
            broker,
            platform,
            providers,
            registry,
            deploy_timeout,
            in_flight: Arc::default(),
        }
    }

    /// Current phase of the in-flight operation for an identity, if any.
    pub fn phase_of(&self, owner: &str, name: &str) -> Option<DeployPhase> {
        let map = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        map.get(&(owner.to_string(), name.to_string())).copied()
    }

    /// Deploy `config` for `owner`.
    ///
    /// A provider that reports "not implemented" is a normal, unsuccessful
    /// result; only transport and API failures surface as `Provider` errors.
    /// `timeout` defaults to the configured deploy timeout.
    ///
    /// Once the identity is claimed the deploy runs on its own task. Dropping
    /// the returned future detaches from it; the deploy still runs to a
    /// recorded outcome.
    pub async fn deploy(
        &self,
        owner: &str,
        mut config: ServerConfig,
        timeout: Option<Duration>,
    ) -> Result<DeployReport, DeployError> {
        config.name = config.name.trim().to_string();
        config.validate()?;
        let guard =
            IdentityGuard::acquire(&self.in_flight, owner, &config.name, DeployPhase::Requested)?;
        tracing::info!(owner, server = %config.name, provider = %config.provider, "deploy requested");

        let this = self.clone();
        let owner = owner.to_string();
        let timeout = timeout.unwrap_or(self.deploy_timeout);
        let run = tokio::spawn(async move { this.run_deploy(guard, &owner, config, timeout).await });

        match run.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(DeployError::Interrupted(e.to_string())),
        }
    }

    async fn run_deploy(
        &self,
        guard: IdentityGuard,
        owner: &str,
        config: ServerConfig,
        timeout: Duration,
    ) -> Result<DeployReport, DeployError> {
        let existing = self.registry.find_by_name(owner, &config.name).await?;
        if let Some(record) = &existing
            && record.status.is_active()
        {
            return Err(DeployError::Conflict(format!(
                "{:?} for {owner} is already {}",
                config.name, record.status
            )));
        }

        guard.advance(DeployPhase::Authenticating);
        let credential = self.broker.get_token().await.inspect_err(|e| {
            tracing::warn!(owner, server = %config.name, error = %e, "deploy authentication failed");
        })?;
        let deployment_id = self
            .platform
            .create_deployment(&credential, owner, &config)
            .await?;

        let record_id = match self.store_record(owner, &config, existing, deployment_id).await {
            Ok(id) => id,
            Err(e) => {
                guard.advance(DeployPhase::Failed);
                self.mirror_intent(deployment_id, IntentStatus::Failure, &e.to_string())
                    .await;
                return Err(e);
            }
        };
        guard.advance(DeployPhase::RecordCreated);

        let outcome = self.provision(&guard, &config, timeout).await;
        self.finish(&guard, record_id, deployment_id, &outcome).await;

        let result = outcome?;
        tracing::info!(
            record_id = %record_id,
            success = result.success,
            status = result.status.as_str(),
            "deploy finished"
        );
        Ok(DeployReport { record_id, result })
    }

    async fn store_record(
        &self,
        owner: &str,
        config: &ServerConfig,
        existing: Option<ServerRecord>,
        deployment_id: i64,
    ) -> Result<Uuid, DeployError> {
        match existing {
            Some(record) => {
                self.registry
                    .reset(record.id, config, Some(deployment_id))
                    .await?;
                Ok(record.id)
            }
            None => {
                let record = ServerRecord::new(owner, config.clone(), Some(deployment_id));
                self.registry.create(&record).await?;
                Ok(record.id)
            }
        }
    }

    async fn provision(
        &self,
        guard: &IdentityGuard,
        config: &ServerConfig,
        timeout: Duration,
    ) -> Result<DeploymentResult, DeployError> {
        guard.advance(DeployPhase::Provisioning);
        let provider = self.providers.get(config.provider);

        let task_provider = provider.clone();
        let task_config = config.clone();
        let mut call = tokio::spawn(async move { task_provider.provision(&task_config).await });

        match tokio::time::timeout(timeout, &mut call).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(e))) => {
                tracing::error!(server = %config.name, provider = %config.provider, error = %e, "provisioning failed");
                Err(DeployError::provider(config.provider, &e))
            }
            Ok(Err(e)) => Err(DeployError::Provider {
                provider: config.provider,
                kind: FailureKind::Permanent,
                message: format!("provider task aborted: {e}"),
            }),
            Err(_) => {
                tracing::warn!(server = %config.name, timeout_secs = timeout.as_secs(), "provisioning timed out");
                reap_late_instance(provider, call, config.name.clone());
                Err(DeployError::Timeout(timeout))
            }
        }
    }

    /// Record the terminal outcome and mirror it onto the intent record.
    async fn finish(
        &self,
        guard: &IdentityGuard,
        record_id: Uuid,
        deployment_id: i64,
        outcome: &Result<DeploymentResult, DeployError>,
    ) {
        let (update, phase, intent, description) = match outcome {
            Ok(result) => {
                let status = record_status(result.status);
                let description = result
                    .error_message
                    .clone()
                    .unwrap_or_else(|| format!("server is {}", result.status.as_str()));
                let intent = if result.success {
                    IntentStatus::Success
                } else {
                    IntentStatus::Failure
                };
                let update = DeploymentUpdate {
                    status,
                    instance_id: non_empty(&result.server_id),
                    ip_address: non_empty(&result.ip_address),
                };
                (update, DeployPhase::after(result), intent, description)
            }
            Err(e) => {
                let update = DeploymentUpdate {
                    status: ServerStatus::Error,
                    instance_id: None,
                    ip_address: None,
                };
                (update, DeployPhase::Failed, IntentStatus::Failure, e.to_string())
            }
        };

        guard.advance(phase);
        if let Err(e) = self.registry.record_deployment(record_id, &update).await {
            tracing::error!(record_id = %record_id, error = %e, "failed to record deploy outcome");
        }
        self.mirror_intent(deployment_id, intent, &description).await;
    }

    /// Best effort: failures are logged and never change the deploy outcome.
    async fn mirror_intent(&self, deployment_id: i64, status: IntentStatus, description: &str) {
        let credential = match self.broker.get_token().await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(deployment_id, error = %e, "cannot update deployment intent");
                return;
            }
        };
        if let Err(e) = self
            .platform
            .set_deployment_status(&credential, deployment_id, status, description)
            .await
        {
            tracing::warn!(deployment_id, error = %e, "failed to update deployment intent");
        }
    }

    pub async fn get_server(&self, id: Uuid) -> Result<ServerRecord, DeployError> {
        Ok(self.registry.get(id).await?)
    }

    pub async fn list_servers(&self, owner: &str) -> Result<Vec<ServerRecord>, DeployError> {
        Ok(self.registry.list_by_owner(owner).await?)
    }

    /// Terminate the server's instance and mark it stopped.
    ///
    /// On any failure the record keeps its current status.
    pub async fn stop_server(&self, id: Uuid) -> Result<ServerRecord, DeployError> {
        let record = self.registry.get(id).await?;
        if record.status == ServerStatus::Stopped {
            return Ok(record);
        }
        let _guard =
            IdentityGuard::acquire(&self.in_flight, &record.owner, &record.name, DeployPhase::Stopping)?;

        let provider_name = record.config.provider;
        let provider = self.providers.get(provider_name);
        let terminated = match &record.instance_id {
            Some(instance) => provider
                .terminate(&InstanceId(instance.clone()))
                .await
                .map_err(|e| {
                    tracing::error!(server_id = %id, error = %e, "terminate failed");
                    DeployError::provider(provider_name, &e)
                })?,
            // Nothing was ever provisioned.
            None => true,
        };
        if !terminated {
            return Err(DeployError::Provider {
                provider: provider_name,
                kind: FailureKind::NotImplemented,
                message: format!("{} cannot terminate instances", provider_name.display_name()),
            });
        }

        self.registry.update_status(id, ServerStatus::Stopped).await?;
        tracing::info!(server_id = %id, provider = %provider_name, "server stopped");
        if let Some(deployment_id) = record.deployment_id {
            self.mirror_intent(deployment_id, IntentStatus::Inactive, "server stopped")
                .await;
        }
        Ok(self.registry.get(id).await?)
    }

    /// Remove a stopped or failed server's record.
    pub async fn delete_server(&self, id: Uuid) -> Result<(), DeployError> {
        let record = self.registry.get(id).await?;
        let _guard =
            IdentityGuard::acquire(&self.in_flight, &record.owner, &record.name, DeployPhase::Stopping)?;
        if record.status.is_active() {
            return Err(DeployError::Conflict(format!(
                "server {id} is {}; stop it first",
                record.status
            )));
        }
        self.registry.delete(id).await?;
        tracing::info!(server_id = %id, "server deleted");
        Ok(())
    }
}

#[async_trait]
impl Deployer for Orchestrator {
    async fn submit(&self, owner: &str, config: ServerConfig) -> Result<DeployReport, DeployError> {
        self.deploy(owner, config, None).await
    }
}

fn record_status(status: DeploymentStatus) -> ServerStatus {
    match status {
        DeploymentStatus::Provisioning => ServerStatus::Starting,
        DeploymentStatus::Running => ServerStatus::Running,
        DeploymentStatus::ManualSetupRequired => ServerStatus::ManualSetup,
        DeploymentStatus::Error => ServerStatus::Error,
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Wait out a provision call that outlived its deadline and terminate
/// whatever it created.
fn reap_late_instance(
    provider: Arc<dyn GameServerProvider>,
    call: JoinHandle<gs_infra::Result<DeploymentResult>>,
    server: String,
) {
    tokio::spawn(async move {
        let result = match call.await {
            Ok(Ok(result)) if result.success && !result.server_id.is_empty() => result,
            _ => {
                tracing::debug!(server = %server, "late provision left nothing behind");
                return;
            }
        };

        tracing::warn!(server = %server, instance_id = %result.server_id, "terminating instance created after timeout");
        match provider.terminate(&InstanceId(result.server_id.clone())).await {
            Ok(true) => tracing::info!(server = %server, instance_id = %result.server_id, "orphaned instance terminated"),
            Ok(false) => tracing::warn!(server = %server, "provider cannot terminate orphaned instance"),
            Err(e) => tracing::error!(server = %server, error = %e, "failed to terminate orphaned instance"),
        }
    });
}
