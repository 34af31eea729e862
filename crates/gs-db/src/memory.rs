use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use gs_infra::types::ServerConfig;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{DeploymentUpdate, ServerRecord, ServerStatus, ServerUsage};
use crate::{Error, Result, ServerRegistry};

/// In-memory registry.
///
/// Data is lost when the process exits. All writes go through one lock.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    servers: RwLock<HashMap<Uuid, ServerRecord>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.servers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.servers.read().await.is_empty()
    }

    async fn modify(&self, id: Uuid, apply: impl FnOnce(&mut ServerRecord) + Send) -> Result<()> {
        let mut servers = self.servers.write().await;
        let record = servers.get_mut(&id).ok_or(Error::NotFound(id))?;
        apply(record);
        record.last_active = Utc::now();
        Ok(())
    }

    fn sorted(mut records: Vec<ServerRecord>) -> Vec<ServerRecord> {
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        records
    }
}

#[async_trait]
impl ServerRegistry for MemoryRegistry {
    async fn create(&self, record: &ServerRecord) -> Result<()> {
        let mut servers = self.servers.write().await;

        if servers.contains_key(&record.id) {
            return Err(Error::Duplicate(record.id.to_string()));
        }
        if servers
            .values()
            .any(|r| r.owner == record.owner && r.name == record.name)
        {
            return Err(Error::Duplicate(format!("{} / {}", record.owner, record.name)));
        }

        servers.insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<ServerRecord> {
        self.servers
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound(id))
    }

    async fn find_by_name(&self, owner: &str, name: &str) -> Result<Option<ServerRecord>> {
        Ok(self
            .servers
            .read()
            .await
            .values()
            .find(|r| r.owner == owner && r.name == name)
            .cloned())
    }

    async fn update_status(&self, id: Uuid, status: ServerStatus) -> Result<()> {
        self.modify(id, |r| r.status = status).await
    }

    async fn record_deployment(&self, id: Uuid, update: &DeploymentUpdate) -> Result<()> {
        let update = update.clone();
        self.modify(id, move |r| {
            r.status = update.status;
            r.instance_id = update.instance_id;
            r.ip_address = update.ip_address;
        })
        .await
    }

    async fn transition(
        &self,
        id: Uuid,
        expected_status: ServerStatus,
        expected_instance: Option<&str>,
        update: &DeploymentUpdate,
    ) -> Result<bool> {
        let mut servers = self.servers.write().await;
        let Some(record) = servers.get_mut(&id) else {
            return Ok(false);
        };
        if record.status != expected_status || record.instance_id.as_deref() != expected_instance {
            return Ok(false);
        }
        record.status = update.status;
        record.instance_id = update.instance_id.clone();
        record.ip_address = update.ip_address.clone();
        record.last_active = Utc::now();
        Ok(true)
    }

    async fn reset(&self, id: Uuid, config: &ServerConfig, deployment_id: Option<i64>) -> Result<()> {
        let config = config.clone();
        self.modify(id, move |r| {
            r.config = config;
            r.status = ServerStatus::Starting;
            r.instance_id = None;
            r.ip_address = None;
            r.deployment_id = deployment_id;
        })
        .await
    }

    async fn list_by_owner(&self, owner: &str) -> Result<Vec<ServerRecord>> {
        let servers = self.servers.read().await;
        Ok(Self::sorted(
            servers.values().filter(|r| r.owner == owner).cloned().collect(),
        ))
    }

    async fn list_by_status(&self, status: ServerStatus) -> Result<Vec<ServerRecord>> {
        let servers = self.servers.read().await;
        Ok(Self::sorted(
            servers.values().filter(|r| r.status == status).cloned().collect(),
        ))
    }

    async fn update_usage(&self, id: Uuid, usage: &ServerUsage) -> Result<()> {
        let usage = usage.clone();
        self.modify(id, move |r| {
            r.cpu_usage = usage.cpu_usage;
            r.ram_usage = usage.ram_usage;
            r.network_in = usage.network_in;
            r.network_out = usage.network_out;
            r.current_players = usage.current_players;
            r.total_sessions = usage.total_sessions;
            r.uptime_hours = usage.uptime_hours;
        })
        .await
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.servers
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(Error::NotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(owner: &str, name: &str) -> ServerRecord {
        let config = ServerConfig {
            name: name.into(),
            ..ServerConfig::default()
        };
        ServerRecord::new(owner, config, None)
    }

    #[tokio::test]
    async fn create_and_get() {
        let registry = MemoryRegistry::new();
        let rec = record("u1", "survival");
        registry.create(&rec).await.unwrap();

        let fetched = registry.get(rec.id).await.unwrap();
        assert_eq!(fetched.name, "survival");
        assert_eq!(fetched.status, ServerStatus::Starting);
    }

    #[tokio::test]
    async fn rejects_duplicate_id_and_duplicate_name() {
        let registry = MemoryRegistry::new();
        let rec = record("u1", "survival");
        registry.create(&rec).await.unwrap();

        assert!(matches!(registry.create(&rec).await, Err(Error::Duplicate(_))));
        assert!(matches!(
            registry.create(&record("u1", "survival")).await,
            Err(Error::Duplicate(_))
        ));
        registry.create(&record("u2", "survival")).await.unwrap();
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let registry = MemoryRegistry::new();
        let id = Uuid::new_v4();
        assert!(matches!(registry.get(id).await, Err(Error::NotFound(x)) if x == id));
        assert!(matches!(
            registry.update_status(id, ServerStatus::Stopped).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(registry.delete(id).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn list_by_owner_is_oldest_first() {
        let registry = MemoryRegistry::new();
        let mut first = record("u1", "a");
        let mut second = record("u1", "b");
        first.created_at = Utc::now() - chrono::Duration::minutes(5);
        second.created_at = Utc::now();
        registry.create(&second).await.unwrap();
        registry.create(&first).await.unwrap();
        registry.create(&record("u2", "c")).await.unwrap();

        let names: Vec<_> = registry
            .list_by_owner("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn status_and_usage_writes_do_not_clobber_each_other() {
        let registry = MemoryRegistry::new();
        let rec = record("u1", "survival");
        registry.create(&rec).await.unwrap();

        let usage = ServerUsage {
            current_players: 12,
            network_in: 4096,
            ..ServerUsage::default()
        };
        let (a, b) = tokio::join!(
            registry.update_status(rec.id, ServerStatus::Running),
            registry.update_usage(rec.id, &usage),
        );
        a.unwrap();
        b.unwrap();

        let stored = registry.get(rec.id).await.unwrap();
        assert_eq!(stored.status, ServerStatus::Running);
        assert_eq!(stored.current_players, 12);
        assert_eq!(stored.network_in, 4096);
    }

    #[tokio::test]
    async fn reset_clears_provider_refs() {
        let registry = MemoryRegistry::new();
        let rec = record("u1", "survival");
        registry.create(&rec).await.unwrap();
        registry
            .record_deployment(
                rec.id,
                &DeploymentUpdate {
                    status: ServerStatus::Error,
                    instance_id: Some("123".into()),
                    ip_address: Some("203.0.113.1".into()),
                },
            )
            .await
            .unwrap();

        let config = ServerConfig {
            name: "survival".into(),
            max_players: 50,
            ..ServerConfig::default()
        };
        registry.reset(rec.id, &config, Some(7)).await.unwrap();

        let stored = registry.get(rec.id).await.unwrap();
        assert_eq!(stored.status, ServerStatus::Starting);
        assert_eq!(stored.instance_id, None);
        assert_eq!(stored.ip_address, None);
        assert_eq!(stored.deployment_id, Some(7));
        assert_eq!(stored.config.max_players, 50);
    }

    #[tokio::test]
    async fn transition_only_applies_to_the_expected_state() {
        let registry = MemoryRegistry::new();
        let mut rec = record("u1", "survival");
        rec.status = ServerStatus::Starting;
        rec.instance_id = Some("101".into());
        registry.create(&rec).await.unwrap();
        let running = DeploymentUpdate {
            status: ServerStatus::Running,
            instance_id: Some("101".into()),
            ip_address: Some("203.0.113.1".into()),
        };

        // Stale instance id.
        assert!(!registry.transition(rec.id, ServerStatus::Starting, Some("99"), &running).await.unwrap());
        // Stale status.
        assert!(!registry.transition(rec.id, ServerStatus::Running, Some("101"), &running).await.unwrap());
        assert_eq!(registry.get(rec.id).await.unwrap().status, ServerStatus::Starting);

        assert!(registry.transition(rec.id, ServerStatus::Starting, Some("101"), &running).await.unwrap());
        let stored = registry.get(rec.id).await.unwrap();
        assert_eq!(stored.status, ServerStatus::Running);
        assert_eq!(stored.ip_address.as_deref(), Some("203.0.113.1"));

        assert!(!registry.transition(Uuid::new_v4(), ServerStatus::Running, None, &running).await.unwrap());
    }
}
