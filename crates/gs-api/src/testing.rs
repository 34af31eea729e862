//! Hand-written fakes shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gs_db::MemoryRegistry;
use gs_infra::types::{
    DeploymentResult, DeploymentStatus, InstanceId, InstanceInfo, InstanceState, ProvisionOutcome,
    ServerConfig,
};
use gs_infra::{GameServerProvider, ProviderName, ProviderRegistry};
use tokio::sync::{Semaphore, mpsc};

use crate::credentials::{AssertionSigner, Credential, CredentialBroker, TokenExchanger};
use crate::orchestrator::{DeployError, DeployReport, Deployer, Orchestrator};
use crate::platform::{IntegrationPlatform, IntentStatus, PlatformError};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub fn server_config(name: &str, provider: ProviderName) -> ServerConfig {
    ServerConfig {
        name: name.into(),
        provider,
        ..ServerConfig::default()
    }
}

// ── Credentials ─────────────────────────────────────────────────────

pub struct StaticSigner;

impl AssertionSigner for StaticSigner {
    fn sign(&self, now: DateTime<Utc>) -> Result<String, BoxError> {
        Ok(format!("assertion-{}", now.timestamp()))
    }
}

pub struct CountingExchanger {
    calls: AtomicUsize,
    valid_for: chrono::Duration,
    delay: Option<Duration>,
    failures_left: AtomicUsize,
}

impl CountingExchanger {
    pub fn valid_for(valid_for: chrono::Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            valid_for,
            delay: None,
            failures_left: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the first `n` exchanges.
    pub fn failing_first(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenExchanger for CountingExchanger {
    async fn exchange(&self, _assertion: &str) -> Result<Credential, BoxError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err("installation suspended".into());
        }
        let now = Utc::now();
        Ok(Credential {
            token: format!("ghs_{call}"),
            issued_at: now,
            expires_at: now + self.valid_for,
        })
    }
}

// ── Platform ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingPlatform {
    deployments: Mutex<Vec<(String, String)>>,
    statuses: Mutex<Vec<IntentStatus>>,
    comments: Mutex<Vec<(String, u64, String)>>,
    fail_deployments: Mutex<bool>,
}

impl RecordingPlatform {
    pub fn fail_deployments(&self) {
        *self.fail_deployments.lock().unwrap() = true;
    }

    /// `(owner, server name)` per created intent.
    pub fn deployments(&self) -> Vec<(String, String)> {
        self.deployments.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<IntentStatus> {
        self.statuses.lock().unwrap().clone()
    }

    /// `(repo, issue number, body)` per posted comment.
    pub fn comments(&self) -> Vec<(String, u64, String)> {
        self.comments.lock().unwrap().clone()
    }
}

#[async_trait]
impl IntegrationPlatform for RecordingPlatform {
    async fn create_deployment(
        &self,
        _credential: &Credential,
        owner: &str,
        config: &ServerConfig,
    ) -> Result<i64, PlatformError> {
        if *self.fail_deployments.lock().unwrap() {
            return Err(github_api::Error::Api {
                endpoint: "create deployment",
                status: reqwest::StatusCode::UNPROCESSABLE_ENTITY,
                body: "repository archived".into(),
            }
            .into());
        }
        let mut deployments = self.deployments.lock().unwrap();
        deployments.push((owner.to_string(), config.name.clone()));
        Ok(deployments.len() as i64)
    }

    async fn set_deployment_status(
        &self,
        _credential: &Credential,
        _deployment_id: i64,
        status: IntentStatus,
        _description: &str,
    ) -> Result<(), PlatformError> {
        self.statuses.lock().unwrap().push(status);
        Ok(())
    }

    async fn post_issue_comment(
        &self,
        _credential: &Credential,
        repo: &str,
        issue_number: u64,
        body: &str,
    ) -> Result<(), PlatformError> {
        self.comments
            .lock()
            .unwrap()
            .push((repo.to_string(), issue_number, body.to_string()));
        Ok(())
    }
}

// ── Providers ───────────────────────────────────────────────────────

enum Script {
    Launch(String),
    TransientFailure,
}

pub struct ScriptedProvider {
    name: ProviderName,
    script: Script,
    gate: Option<Arc<Semaphore>>,
    status_gate: Option<Arc<Semaphore>>,
    delay: Option<Duration>,
    pub provisions: AtomicUsize,
    status_checks: AtomicUsize,
    terminated: Mutex<Vec<String>>,
    status: Mutex<(InstanceState, Option<String>)>,
}

impl ScriptedProvider {
    fn scripted(name: ProviderName, script: Script) -> Self {
        Self {
            name,
            script,
            gate: None,
            status_gate: None,
            delay: None,
            provisions: AtomicUsize::new(0),
            status_checks: AtomicUsize::new(0),
            terminated: Mutex::new(Vec::new()),
            status: Mutex::new((InstanceState::Unknown, None)),
        }
    }

    /// Provision succeeds with `instance_id` and no address yet.
    pub fn launching(name: ProviderName, instance_id: &str) -> Self {
        Self::scripted(name, Script::Launch(instance_id.into()))
    }

    /// Provision fails with a 503 from the provider API.
    pub fn transient_failure(name: ProviderName) -> Self {
        Self::scripted(name, Script::TransientFailure)
    }

    /// Provision waits for a permit on `gate` before answering.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// `fetch_status` waits for a permit on `gate` before answering.
    pub fn gated_status(mut self, gate: Arc<Semaphore>) -> Self {
        self.status_gate = Some(gate);
        self
    }

    pub fn status_checks(&self) -> usize {
        self.status_checks.load(Ordering::SeqCst)
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// What `fetch_status` reports from now on.
    pub fn report_status(&self, state: InstanceState, address: Option<&str>) {
        *self.status.lock().unwrap() = (state, address.map(str::to_string));
    }

    pub fn terminated(&self) -> Vec<String> {
        self.terminated.lock().unwrap().clone()
    }
}

#[async_trait]
impl GameServerProvider for ScriptedProvider {
    async fn provision(&self, config: &ServerConfig) -> gs_infra::Result<ProvisionOutcome> {
        self.provisions.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.script {
            Script::Launch(id) => Ok(DeploymentResult::launched(
                id.clone(),
                "pending",
                config,
                DeploymentStatus::Provisioning,
            )),
            Script::TransientFailure => Err(digitalocean_api::Error::Api {
                endpoint: "create droplet",
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                body: "try again later".into(),
            }
            .into()),
        }
    }

    async fn terminate(&self, id: &InstanceId) -> gs_infra::Result<bool> {
        self.terminated.lock().unwrap().push(id.0.clone());
        Ok(true)
    }

    async fn fetch_status(&self, id: &InstanceId) -> gs_infra::Result<InstanceInfo> {
        self.status_checks.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.status_gate {
            let _permit = gate.acquire().await;
        }
        let (state, address) = self.status.lock().unwrap().clone();
        Ok(InstanceInfo {
            id: id.clone(),
            state,
            address,
        })
    }

    fn name(&self) -> ProviderName {
        self.name
    }
}

// ── Deployer ────────────────────────────────────────────────────────

/// Forwards every submission to a channel and answers with a canned report.
pub struct RecordingDeployer {
    tx: mpsc::UnboundedSender<(String, ServerConfig)>,
}

impl RecordingDeployer {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(String, ServerConfig)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Deployer for RecordingDeployer {
    async fn submit(&self, owner: &str, config: ServerConfig) -> Result<DeployReport, DeployError> {
        let result = DeploymentResult::launched("4242", "203.0.113.9", &config, DeploymentStatus::Provisioning);
        let _ = self.tx.send((owner.to_string(), config));
        Ok(DeployReport {
            record_id: uuid::Uuid::new_v4(),
            result,
        })
    }
}

// ── Harness ─────────────────────────────────────────────────────────

pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub registry: Arc<MemoryRegistry>,
    pub platform: Arc<RecordingPlatform>,
    pub exchanger: Arc<CountingExchanger>,
    pub broker: Arc<CredentialBroker>,
}

impl Harness {
    pub fn new(providers: ProviderRegistry) -> Self {
        Self::build(providers, CountingExchanger::valid_for(chrono::Duration::hours(1)))
    }

    /// Every credential exchange fails.
    pub fn with_failing_exchange(providers: ProviderRegistry) -> Self {
        Self::build(
            providers,
            CountingExchanger::valid_for(chrono::Duration::hours(1)).failing_first(usize::MAX),
        )
    }

    fn build(providers: ProviderRegistry, exchanger: CountingExchanger) -> Self {
        let registry = Arc::new(MemoryRegistry::new());
        let platform = Arc::new(RecordingPlatform::default());
        let exchanger = Arc::new(exchanger);
        let broker = Arc::new(CredentialBroker::new(
            Arc::new(StaticSigner),
            exchanger.clone(),
            chrono::Duration::seconds(60),
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            broker.clone(),
            platform.clone(),
            providers,
            registry.clone(),
            Duration::from_secs(5),
        ));
        Self {
            orchestrator,
            registry,
            platform,
            exchanger,
            broker,
        }
    }
}
