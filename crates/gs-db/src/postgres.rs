use async_trait::async_trait;
use gs_infra::types::ServerConfig;
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use crate::models::{DeploymentUpdate, ServerRecord, ServerStatus, ServerUsage};
use crate::{Error, Result, ServerRegistry};

const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL-backed registry.
#[derive(Clone)]
pub struct PgRegistry {
    pool: PgPool,
}

impl PgRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn ensure_found(id: Uuid, rows_affected: u64) -> Result<()> {
        if rows_affected == 0 {
            return Err(Error::NotFound(id));
        }
        Ok(())
    }
}

#[async_trait]
impl ServerRegistry for PgRegistry {
    async fn create(&self, record: &ServerRecord) -> Result<()> {
        let result = sqlx::query(
            r#"INSERT INTO servers (id, owner, name, status, config, instance_id, ip_address, deployment_id,
                                    cpu_usage, ram_usage, network_in, network_out, current_players,
                                    total_sessions, uptime_hours, created_at, last_active)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)"#,
        )
        .bind(record.id)
        .bind(&record.owner)
        .bind(&record.name)
        .bind(record.status)
        .bind(Json(&record.config))
        .bind(&record.instance_id)
        .bind(&record.ip_address)
        .bind(record.deployment_id)
        .bind(record.cpu_usage)
        .bind(record.ram_usage)
        .bind(record.network_in)
        .bind(record.network_out)
        .bind(record.current_players)
        .bind(record.total_sessions)
        .bind(record.uptime_hours)
        .bind(record.created_at)
        .bind(record.last_active)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => Err(
                Error::Duplicate(format!("{} / {} ({})", record.owner, record.name, record.id)),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: Uuid) -> Result<ServerRecord> {
        sqlx::query_as("SELECT * FROM servers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(Error::NotFound(id))
    }

    async fn find_by_name(&self, owner: &str, name: &str) -> Result<Option<ServerRecord>> {
        let record = sqlx::query_as("SELECT * FROM servers WHERE owner = $1 AND name = $2")
            .bind(owner)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn update_status(&self, id: Uuid, status: ServerStatus) -> Result<()> {
        let result = sqlx::query("UPDATE servers SET status = $1, last_active = now() WHERE id = $2")
            .bind(status)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Self::ensure_found(id, result.rows_affected())
    }

    async fn record_deployment(&self, id: Uuid, update: &DeploymentUpdate) -> Result<()> {
        let result = sqlx::query(
            r#"UPDATE servers
               SET status      = $1,
                   instance_id = $2,
                   ip_address  = $3,
                   last_active = now()
               WHERE id = $4"#,
        )
        .bind(update.status)
        .bind(&update.instance_id)
        .bind(&update.ip_address)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Self::ensure_found(id, result.rows_affected())
    }

    async fn transition(
        &self,
        id: Uuid,
        expected_status: ServerStatus,
        expected_instance: Option<&str>,
        update: &DeploymentUpdate,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"UPDATE servers
               SET status      = $1,
                   instance_id = $2,
                   ip_address  = $3,
                   last_active = now()
               WHERE id = $4
                 AND status = $5
                 AND instance_id IS NOT DISTINCT FROM $6"#,
        )
        .bind(update.status)
        .bind(&update.instance_id)
        .bind(&update.ip_address)
        .bind(id)
        .bind(expected_status)
        .bind(expected_instance)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn reset(&self, id: Uuid, config: &ServerConfig, deployment_id: Option<i64>) -> Result<()> {
        let result = sqlx::query(
            r#"UPDATE servers
               SET config        = $1,
                   status        = 'starting',
                   instance_id   = NULL,
                   ip_address    = NULL,
                   deployment_id = $2,
                   last_active   = now()
               WHERE id = $3"#,
        )
        .bind(Json(config))
        .bind(deployment_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Self::ensure_found(id, result.rows_affected())
    }

    async fn list_by_owner(&self, owner: &str) -> Result<Vec<ServerRecord>> {
        let records = sqlx::query_as("SELECT * FROM servers WHERE owner = $1 ORDER BY created_at, id")
            .bind(owner)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    async fn list_by_status(&self, status: ServerStatus) -> Result<Vec<ServerRecord>> {
        let records = sqlx::query_as("SELECT * FROM servers WHERE status = $1 ORDER BY created_at")
            .bind(status)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    async fn update_usage(&self, id: Uuid, usage: &ServerUsage) -> Result<()> {
        let result = sqlx::query(
            r#"UPDATE servers
               SET cpu_usage       = $1,
                   ram_usage       = $2,
                   network_in      = $3,
                   network_out     = $4,
                   current_players = $5,
                   total_sessions  = $6,
                   uptime_hours    = $7,
                   last_active     = now()
               WHERE id = $8"#,
        )
        .bind(usage.cpu_usage)
        .bind(usage.ram_usage)
        .bind(usage.network_in)
        .bind(usage.network_out)
        .bind(usage.current_players)
        .bind(usage.total_sessions)
        .bind(usage.uptime_hours)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Self::ensure_found(id, result.rows_affected())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM servers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Self::ensure_found(id, result.rows_affected())
    }
}
