use chrono::{DateTime, Utc};
use gs_infra::types::ServerConfig;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ── ServerStatus ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "server_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    Starting,
    Running,
    ManualSetup,
    Stopped,
    Error,
}

impl ServerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::ManualSetup => "manual_setup",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }

    /// A server in this state may hold provider resources.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::ManualSetup)
    }
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── ServerRecord ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ServerRecord {
    pub id: Uuid,
    pub owner: String,
    pub name: String,
    pub status: ServerStatus,
    #[sqlx(json)]
    pub config: ServerConfig,
    pub instance_id: Option<String>,
    pub ip_address: Option<String>,
    /// Deployment-intent record on the integration platform.
    pub deployment_id: Option<i64>,
    pub cpu_usage: f64,
    pub ram_usage: f64,
    pub network_in: i64,
    pub network_out: i64,
    pub current_players: i32,
    pub total_sessions: i64,
    pub uptime_hours: f64,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl ServerRecord {
    /// A fresh record in `Starting` state with zeroed counters.
    pub fn new(owner: impl Into<String>, config: ServerConfig, deployment_id: Option<i64>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner: owner.into(),
            name: config.name.clone(),
            status: ServerStatus::Starting,
            config,
            instance_id: None,
            ip_address: None,
            deployment_id,
            cpu_usage: 0.0,
            ram_usage: 0.0,
            network_in: 0,
            network_out: 0,
            current_players: 0,
            total_sessions: 0,
            uptime_hours: 0.0,
            created_at: now,
            last_active: now,
        }
    }
}

/// Provider references written when a deployment reaches a terminal state.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentUpdate {
    pub status: ServerStatus,
    pub instance_id: Option<String>,
    pub ip_address: Option<String>,
}

/// Usage counters reported by the telemetry updater.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerUsage {
    pub cpu_usage: f64,
    pub ram_usage: f64,
    pub network_in: i64,
    pub network_out: i64,
    pub current_players: i32,
    pub total_sessions: i64,
    pub uptime_hours: f64,
}
