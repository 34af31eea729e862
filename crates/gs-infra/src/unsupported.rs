use async_trait::async_trait;
use tracing::debug;

use crate::types::{DeploymentResult, InstanceId, InstanceInfo, InstanceState, ProvisionOutcome, ServerConfig};
use crate::{GameServerProvider, ProviderName, Result};

/// Stand-in for a provider with no working backend.
///
/// Every call succeeds at the transport level and reports that nothing
/// was done.
pub struct UnsupportedProvider {
    name: ProviderName,
    message: String,
}

impl UnsupportedProvider {
    pub fn new(name: ProviderName) -> Self {
        Self {
            name,
            message: format!("{} deployment not implemented yet", name.display_name()),
        }
    }

    /// A provider that is implemented but has no credentials configured.
    pub fn unconfigured(name: ProviderName) -> Self {
        Self {
            name,
            message: format!("{} provider is not configured", name.display_name()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[async_trait]
impl GameServerProvider for UnsupportedProvider {
    async fn provision(&self, config: &ServerConfig) -> Result<ProvisionOutcome> {
        debug!(provider = %self.name, server = %config.name, "provision requested on unsupported provider");
        Ok(DeploymentResult::failed(self.message.clone()))
    }

    async fn terminate(&self, id: &InstanceId) -> Result<bool> {
        debug!(provider = %self.name, instance_id = %id.0, "terminate requested on unsupported provider");
        Ok(false)
    }

    async fn fetch_status(&self, id: &InstanceId) -> Result<InstanceInfo> {
        Ok(InstanceInfo {
            id: id.clone(),
            state: InstanceState::Unknown,
            address: None,
        })
    }

    fn name(&self) -> ProviderName {
        self.name
    }

    fn is_implemented(&self) -> bool {
        false
    }
}
