//! Server record storage.
//!
//! [`ServerRegistry`] is the contract the control plane codes against.
//! [`PgRegistry`] persists to PostgreSQL; [`MemoryRegistry`] keeps records
//! in process memory for development and tests.

pub mod memory;
pub mod models;
pub mod postgres;

pub use memory::MemoryRegistry;
pub use postgres::PgRegistry;

use async_trait::async_trait;
use gs_infra::types::ServerConfig;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use models::{DeploymentUpdate, ServerRecord, ServerStatus, ServerUsage};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("server {0} not found")]
    NotFound(Uuid),

    #[error("duplicate server: {0}")]
    Duplicate(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Durable store of server records.
///
/// Each method touches a single record and is applied atomically, so a
/// status write and a usage write racing on the same record never undo
/// each other.
#[async_trait]
pub trait ServerRegistry: Send + Sync + 'static {
    /// Insert a new record. Fails with `Duplicate` if the id, or the
    /// owner/name pair, already exists.
    async fn create(&self, record: &ServerRecord) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<ServerRecord>;

    async fn find_by_name(&self, owner: &str, name: &str) -> Result<Option<ServerRecord>>;

    async fn update_status(&self, id: Uuid, status: ServerStatus) -> Result<()>;

    async fn record_deployment(&self, id: Uuid, update: &DeploymentUpdate) -> Result<()>;

    /// Apply `update` only if the record still has `expected_status` and
    /// `expected_instance`. Returns `false` when the record changed since it
    /// was read, or is gone.
    async fn transition(
        &self,
        id: Uuid,
        expected_status: ServerStatus,
        expected_instance: Option<&str>,
        update: &DeploymentUpdate,
    ) -> Result<bool>;

    /// Put a stopped or failed record back to `Starting` with a new config.
    async fn reset(&self, id: Uuid, config: &ServerConfig, deployment_id: Option<i64>) -> Result<()>;

    /// Records for `owner`, oldest first.
    async fn list_by_owner(&self, owner: &str) -> Result<Vec<ServerRecord>>;

    async fn list_by_status(&self, status: ServerStatus) -> Result<Vec<ServerRecord>>;

    async fn update_usage(&self, id: Uuid, usage: &ServerUsage) -> Result<()>;

    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// Create a connection pool to PostgreSQL.
pub async fn create_pool(database_url: &str) -> std::result::Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Run embedded migrations.
pub async fn run_migrations(pool: &PgPool) -> std::result::Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
