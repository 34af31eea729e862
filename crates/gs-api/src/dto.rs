use chrono::{DateTime, Utc};
use gs_db::models::{ServerRecord, ServerStatus};
use gs_infra::ProviderName;
use gs_infra::types::{ServerConfig, ValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::orchestrator::DeployPhase;

// ── Requests ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DeployRequest {
    pub owner: String,
    pub config: ServerConfigRequest,
}

/// Wire form of a server config. The provider is taken as a plain string so
/// an unknown name becomes a validation error rather than a body parse
/// failure.
#[derive(Debug, Deserialize)]
pub struct ServerConfigRequest {
    pub name: String,
    pub game_type: String,
    pub max_players: u32,
    pub region: String,
    pub provider: String,
    pub cpu_cores: Option<u32>,
    pub ram_gb: Option<u32>,
    pub storage_gb: Option<u32>,
    pub port: Option<u32>,
    pub domain: Option<String>,
    pub world_seed: Option<String>,
    pub game_mode: Option<String>,
    pub difficulty: Option<String>,
    pub enable_https: Option<bool>,
}

impl ServerConfigRequest {
    pub fn into_config(self) -> Result<ServerConfig, ValidationError> {
        let provider: ProviderName = self
            .provider
            .parse()
            .map_err(|_| ValidationError::UnknownProvider(self.provider.clone()))?;
        let defaults = ServerConfig::default();

        let port = match self.port {
            Some(port) => u16::try_from(port).map_err(|_| ValidationError::OutOfRange {
                field: "port",
                value: port.into(),
                min: 1,
                max: u16::MAX.into(),
            })?,
            None => defaults.port,
        };

        let config = ServerConfig {
            name: self.name.trim().to_string(),
            game_type: self.game_type,
            max_players: self.max_players,
            region: self.region,
            provider,
            cpu_cores: self.cpu_cores.unwrap_or(defaults.cpu_cores),
            ram_gb: self.ram_gb.unwrap_or(defaults.ram_gb),
            storage_gb: self.storage_gb.unwrap_or(defaults.storage_gb),
            world_seed: self.world_seed,
            game_mode: self.game_mode.unwrap_or(defaults.game_mode),
            difficulty: self.difficulty.unwrap_or(defaults.difficulty),
            port,
            enable_https: self.enable_https.unwrap_or(defaults.enable_https),
            domain: self.domain,
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Deserialize)]
pub struct ListServersQuery {
    pub owner: String,
}

// ── Responses ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ServerResponse {
    pub id: Uuid,
    pub owner: String,
    pub name: String,
    pub status: ServerStatus,
    pub provider: ProviderName,
    pub game_type: String,
    pub region: String,
    pub max_players: u32,
    pub port: u16,
    pub domain: Option<String>,
    pub instance_id: Option<String>,
    pub ip_address: Option<String>,
    pub usage: UsageResponse,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    /// Operation currently holding this server's identity, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<DeployPhase>,
}

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub cpu_usage: f64,
    pub ram_usage: f64,
    pub network_in: i64,
    pub network_out: i64,
    pub current_players: i32,
    pub total_sessions: i64,
    pub uptime_hours: f64,
}

impl From<ServerRecord> for ServerResponse {
    fn from(r: ServerRecord) -> Self {
        Self {
            id: r.id,
            owner: r.owner,
            name: r.name,
            status: r.status,
            provider: r.config.provider,
            game_type: r.config.game_type,
            region: r.config.region,
            max_players: r.config.max_players,
            port: r.config.port,
            domain: r.config.domain,
            instance_id: r.instance_id,
            ip_address: r.ip_address,
            usage: UsageResponse {
                cpu_usage: r.cpu_usage,
                ram_usage: r.ram_usage,
                network_in: r.network_in,
                network_out: r.network_out,
                current_players: r.current_players,
                total_sessions: r.total_sessions,
                uptime_hours: r.uptime_hours,
            },
            created_at: r.created_at,
            last_active: r.last_active,
            phase: None,
        }
    }
}
