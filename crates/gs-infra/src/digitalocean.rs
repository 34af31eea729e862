use async_trait::async_trait;
use digitalocean_api::{CreateDropletRequest, DigitalOceanClient, Droplet};
use tracing::info;

use crate::cloud_init;
use crate::types::{
    DeploymentResult, DeploymentStatus, InstanceId, InstanceInfo, InstanceState, ProvisionOutcome,
    ServerConfig,
};
use crate::{Error, GameServerProvider, ProviderName, Result};

/// Reported until DigitalOcean assigns the droplet a public address.
pub const PENDING_IP: &str = "pending";

/// DigitalOcean droplets provider.
///
/// All configuration is loaded from environment variables via `from_env()`.
pub struct DigitalOceanProvider {
    client: DigitalOceanClient,
    image: String,
    ssh_keys: Vec<String>,
}

impl DigitalOceanProvider {
    /// Create from env vars:
    ///
    /// - `DIGITALOCEAN_TOKEN` (required)
    /// - `DIGITALOCEAN_IMAGE` (default: `"ubuntu-24-04-x64"`)
    /// - `DIGITALOCEAN_SSH_KEYS` (comma-separated fingerprints or ids, optional)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let token = std::env::var("DIGITALOCEAN_TOKEN")
            .map_err(|_| Error::MissingEnv("DIGITALOCEAN_TOKEN".into()))?;

        let image = std::env::var("DIGITALOCEAN_IMAGE").unwrap_or_else(|_| "ubuntu-24-04-x64".into());

        let ssh_keys: Vec<String> = std::env::var("DIGITALOCEAN_SSH_KEYS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self::new(DigitalOceanClient::new(token), image, ssh_keys))
    }

    pub fn new(client: DigitalOceanClient, image: impl Into<String>, ssh_keys: Vec<String>) -> Self {
        Self {
            client,
            image: image.into(),
            ssh_keys,
        }
    }

    fn parse_state(status: &str) -> InstanceState {
        match status {
            "active" => InstanceState::Running,
            "new" => InstanceState::Starting,
            "off" => InstanceState::Stopped,
            "archive" => InstanceState::Destroyed,
            _ => InstanceState::Unknown,
        }
    }

    /// Map requested CPU cores and RAM to a droplet size slug.
    ///
    /// | cores | RAM (GB) | slug          |
    /// |-------|----------|---------------|
    /// | 1     | ≤ 1      | s-1vcpu-1gb   |
    /// | 1     | ≤ 2      | s-1vcpu-2gb   |
    /// | ≤ 2   | ≤ 2      | s-2vcpu-2gb   |
    /// | ≤ 2   | ≤ 4      | s-2vcpu-4gb   |
    /// | ≤ 4   | ≤ 8      | s-4vcpu-8gb   |
    /// | ≤ 8   | ≤ 16     | s-8vcpu-16gb  |
    /// | more  |          | s-8vcpu-32gb  |
    fn size_slug(cpu_cores: u32, ram_gb: u32) -> &'static str {
        match (cpu_cores, ram_gb) {
            (0..=1, 0..=1) => "s-1vcpu-1gb",
            (0..=1, 0..=2) => "s-1vcpu-2gb",
            (0..=2, 0..=2) => "s-2vcpu-2gb",
            (0..=2, 0..=4) => "s-2vcpu-4gb",
            (0..=4, 0..=8) => "s-4vcpu-8gb",
            (0..=8, 0..=16) => "s-8vcpu-16gb",
            _ => "s-8vcpu-32gb",
        }
    }

    /// Droplet names must be valid hostnames.
    fn droplet_name(name: &str) -> String {
        let slug: String = name
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '-' })
            .collect();
        slug.trim_matches('-').to_string()
    }

    fn address(droplet: &Droplet) -> Option<String> {
        droplet.public_ipv4().map(str::to_string)
    }

    fn parse_id(raw: &str) -> Result<u64> {
        raw.parse::<u64>()
            .map_err(|_| Error::InvalidId(raw.to_string()))
    }
}

#[async_trait]
impl GameServerProvider for DigitalOceanProvider {
    async fn provision(&self, config: &ServerConfig) -> Result<ProvisionOutcome> {
        let size = Self::size_slug(config.cpu_cores, config.ram_gb);
        let user_data = cloud_init::render(config);

        let droplet = self
            .client
            .create_droplet(&CreateDropletRequest {
                name: Self::droplet_name(&config.name),
                region: config.region.clone(),
                size: size.into(),
                image: self.image.clone(),
                ssh_keys: self.ssh_keys.clone(),
                user_data: Some(user_data),
                tags: vec!["gameserver".into(), format!("game-{}", Self::droplet_name(&config.game_type))],
                monitoring: true,
            })
            .await?;

        info!(droplet_id = droplet.id, size, region = %config.region, "digitalocean: droplet created");

        let status = match Self::parse_state(&droplet.status) {
            InstanceState::Running => DeploymentStatus::Running,
            _ => DeploymentStatus::Provisioning,
        };
        let address = Self::address(&droplet).unwrap_or_else(|| PENDING_IP.into());

        Ok(DeploymentResult::launched(
            droplet.id.to_string(),
            address,
            config,
            status,
        ))
    }

    async fn terminate(&self, id: &InstanceId) -> Result<bool> {
        let droplet_id = Self::parse_id(&id.0)?;
        self.client.delete_droplet(droplet_id).await?;
        info!(droplet_id, "digitalocean: droplet destroyed");
        Ok(true)
    }

    async fn fetch_status(&self, id: &InstanceId) -> Result<InstanceInfo> {
        let droplet_id = Self::parse_id(&id.0)?;
        let droplet = self.client.get_droplet(droplet_id).await?;

        Ok(InstanceInfo {
            id: InstanceId(droplet.id.to_string()),
            state: Self::parse_state(&droplet.status),
            address: Self::address(&droplet),
        })
    }

    fn name(&self) -> ProviderName {
        ProviderName::DigitalOcean
    }
}
