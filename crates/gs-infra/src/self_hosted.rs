use async_trait::async_trait;
use tracing::info;

use crate::cloud_init;
use crate::types::{DeploymentResult, InstanceId, InstanceInfo, InstanceState, ProvisionOutcome, ServerConfig};
use crate::{GameServerProvider, ProviderName, Result};

/// Server id reported for every self-hosted deployment.
pub const SELF_HOSTED_SERVER_ID: &str = "self-hosted";

/// Address reported until the operator tells us where the server runs.
pub const PLACEHOLDER_IP: &str = "0.0.0.0";

/// Operator-run servers: no remote calls, just a setup script.
pub struct SelfHostedProvider;

#[async_trait]
impl GameServerProvider for SelfHostedProvider {
    async fn provision(&self, config: &ServerConfig) -> Result<ProvisionOutcome> {
        let script = cloud_init::render(config);
        info!(server = %config.name, port = config.port, "self-hosted: setup script generated");

        Ok(DeploymentResult::manual_setup(
            SELF_HOSTED_SERVER_ID,
            PLACEHOLDER_IP,
            config,
            script,
        ))
    }

    /// Nothing remote to stop; the operator owns the machine.
    async fn terminate(&self, _id: &InstanceId) -> Result<bool> {
        Ok(true)
    }

    async fn fetch_status(&self, id: &InstanceId) -> Result<InstanceInfo> {
        Ok(InstanceInfo {
            id: id.clone(),
            state: InstanceState::Unknown,
            address: None,
        })
    }

    fn name(&self) -> ProviderName {
        ProviderName::SelfHosted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeploymentStatus;

    #[tokio::test]
    async fn always_succeeds_with_manual_setup() {
        let config = ServerConfig {
            name: "S1".into(),
            game_type: "rpg".into(),
            max_players: 10,
            region: "us-east-1".into(),
            provider: ProviderName::SelfHosted,
            ..ServerConfig::default()
        };

        let outcome = SelfHostedProvider.provision(&config).await.unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.server_id, "self-hosted");
        assert_eq!(outcome.ip_address, PLACEHOLDER_IP);
        assert_eq!(outcome.port, 25565);
        assert_eq!(outcome.status, DeploymentStatus::ManualSetupRequired);
        assert_eq!(outcome.error_message, None);
        assert!(outcome.setup_script.unwrap().contains("ufw allow 25565/tcp"));
    }

    #[tokio::test]
    async fn echoes_custom_port() {
        let config = ServerConfig {
            port: 7777,
            provider: ProviderName::SelfHosted,
            ..ServerConfig::default()
        };
        let outcome = SelfHostedProvider.provision(&config).await.unwrap();
        assert_eq!(outcome.port, 7777);
    }
}
