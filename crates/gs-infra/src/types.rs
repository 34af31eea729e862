use serde::{Deserialize, Serialize};

use crate::ProviderName;

pub const DEFAULT_GAME_PORT: u16 = 25565;
pub const MAX_PLAYERS_LIMIT: u32 = 1000;
const MAX_NAME_LEN: usize = 64;

/// Everything needed to stand up one game server.
///
/// Embedded verbatim in the server record, so it must stay serializable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    pub game_type: String,
    pub max_players: u32,
    pub region: String,
    pub provider: ProviderName,
    pub cpu_cores: u32,
    pub ram_gb: u32,
    pub storage_gb: u32,
    pub world_seed: Option<String>,
    pub game_mode: String,
    pub difficulty: String,
    pub port: u16,
    pub enable_https: bool,
    pub domain: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "game-server".into(),
            game_type: "minecraft".into(),
            max_players: 20,
            region: "nyc1".into(),
            provider: ProviderName::DigitalOcean,
            cpu_cores: 2,
            ram_gb: 4,
            storage_gb: 50,
            world_seed: None,
            game_mode: "survival".into(),
            difficulty: "normal".into(),
            port: DEFAULT_GAME_PORT,
            enable_https: false,
            domain: None,
        }
    }
}

/// A config rejected before any remote call is made.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("invalid server name {0:?}: use letters, digits, spaces, '-', '_' or '.' (max 64)")]
    InvalidName(String),

    #[error("invalid value for {field}: {value:?}")]
    Malformed { field: String, value: String },
}

fn check_range(field: &'static str, value: u64, min: u64, max: u64) -> Result<(), ValidationError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationError::Empty("name"));
        }
        if name.len() > MAX_NAME_LEN
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.'))
        {
            return Err(ValidationError::InvalidName(self.name.clone()));
        }
        if self.game_type.trim().is_empty() {
            return Err(ValidationError::Empty("game_type"));
        }
        if self.region.trim().is_empty() {
            return Err(ValidationError::Empty("region"));
        }
        if let Some(domain) = &self.domain
            && domain.trim().is_empty()
        {
            return Err(ValidationError::Empty("domain"));
        }

        check_range("max_players", self.max_players.into(), 1, MAX_PLAYERS_LIMIT.into())?;
        check_range("port", self.port.into(), 1, u16::MAX.into())?;
        check_range("cpu_cores", self.cpu_cores.into(), 1, 64)?;
        check_range("ram_gb", self.ram_gb.into(), 1, 256)?;
        check_range("storage_gb", self.storage_gb.into(), 1, 4096)?;
        Ok(())
    }
}

/// Opaque provider-side instance identifier (e.g. a DigitalOcean droplet id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub String);

/// Instance status and metadata returned from the provider.
#[derive(Debug, Clone)]
pub struct InstanceInfo {
    pub id: InstanceId,
    pub state: InstanceState,
    pub address: Option<String>,
}

/// Provider-reported instance state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Starting,
    Running,
    Stopped,
    Destroyed,
    Unknown,
}

/// Outcome vocabulary shared by providers and API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentStatus {
    Provisioning,
    Running,
    ManualSetupRequired,
    Error,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provisioning => "provisioning",
            Self::Running => "running",
            Self::ManualSetupRequired => "manual-setup-required",
            Self::Error => "error",
        }
    }
}

/// Result of one deployment attempt, as reported back to callers.
///
/// `success == false` always comes with `status == Error` and an
/// `error_message`; the constructors below are the only way this crate
/// builds one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub success: bool,
    pub server_id: String,
    pub ip_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub port: u16,
    pub status: DeploymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_script: Option<String>,
}

/// What a provider hands back from `provision`.
pub type ProvisionOutcome = DeploymentResult;

impl DeploymentResult {
    /// A remote instance was created (or is being created).
    pub fn launched(
        server_id: impl Into<String>,
        ip_address: impl Into<String>,
        config: &ServerConfig,
        status: DeploymentStatus,
    ) -> Self {
        Self {
            success: true,
            server_id: server_id.into(),
            ip_address: ip_address.into(),
            domain: config.domain.clone(),
            port: config.port,
            status,
            error_message: None,
            setup_script: None,
        }
    }

    /// Nothing was provisioned remotely; the operator runs `script` themselves.
    pub fn manual_setup(
        server_id: impl Into<String>,
        ip_address: impl Into<String>,
        config: &ServerConfig,
        script: String,
    ) -> Self {
        Self {
            setup_script: Some(script),
            ..Self::launched(server_id, ip_address, config, DeploymentStatus::ManualSetupRequired)
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            server_id: String::new(),
            ip_address: String::new(),
            domain: None,
            port: 0,
            status: DeploymentStatus::Error,
            error_message: Some(message.into()),
            setup_script: None,
        }
    }
}
