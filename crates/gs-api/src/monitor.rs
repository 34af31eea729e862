use std::sync::Arc;
use std::time::Duration;

use gs_db::ServerRegistry;
use gs_db::models::{DeploymentUpdate, ServerRecord, ServerStatus};
use gs_infra::ProviderRegistry;
use gs_infra::types::{InstanceId, InstanceState};

/// Spawn the background status reconciler.
pub fn spawn_monitor(
    registry: Arc<dyn ServerRegistry>,
    providers: ProviderRegistry,
    interval_secs: u64,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            interval.tick().await;
            match reconcile(&*registry, &providers).await {
                Ok(0) => {}
                Ok(changed) => tracing::info!(changed, "server statuses reconciled"),
                Err(e) => tracing::error!(error = %e, "status reconciliation failed"),
            }
        }
    });
}

/// Bring `starting` and `running` records in line with what their provider
/// reports. Returns how many records changed.
///
/// Per-server failures are logged and skipped; only a failure to list
/// records aborts the pass.
pub async fn reconcile(
    registry: &dyn ServerRegistry,
    providers: &ProviderRegistry,
) -> gs_db::Result<usize> {
    let mut candidates = registry.list_by_status(ServerStatus::Starting).await?;
    candidates.extend(registry.list_by_status(ServerStatus::Running).await?);

    let mut changed = 0;
    for record in &candidates {
        match reconcile_one(registry, providers, record).await {
            Ok(true) => changed += 1,
            Ok(false) => {}
            Err(e) => tracing::warn!(server_id = %record.id, error = %e, "failed to reconcile server"),
        }
    }
    Ok(changed)
}

async fn reconcile_one(
    registry: &dyn ServerRegistry,
    providers: &ProviderRegistry,
    record: &ServerRecord,
) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
    let Some(instance_id) = &record.instance_id else {
        return Ok(false);
    };
    let provider = providers.get(record.config.provider);
    if !provider.is_implemented() {
        return Ok(false);
    }

    let info = provider.fetch_status(&InstanceId(instance_id.clone())).await?;
    // The record may have been stopped or redeployed while we were asking,
    // so every write is conditional on what was read.
    let update = match info.state {
        InstanceState::Running => {
            let ip_address = info.address.or_else(|| record.ip_address.clone());
            if record.status == ServerStatus::Running && ip_address == record.ip_address {
                return Ok(false);
            }
            DeploymentUpdate {
                status: ServerStatus::Running,
                instance_id: record.instance_id.clone(),
                ip_address,
            }
        }
        InstanceState::Stopped | InstanceState::Destroyed => DeploymentUpdate {
            status: ServerStatus::Stopped,
            instance_id: record.instance_id.clone(),
            ip_address: record.ip_address.clone(),
        },
        InstanceState::Starting | InstanceState::Unknown => return Ok(false),
    };

    let applied = registry
        .transition(record.id, record.status, Some(instance_id.as_str()), &update)
        .await?;
    if !applied {
        tracing::debug!(server_id = %record.id, "record changed during status check, skipping");
        return Ok(false);
    }
    if update.status == ServerStatus::Running {
        tracing::info!(server_id = %record.id, ip = ?update.ip_address, "server is running");
    } else {
        tracing::warn!(server_id = %record.id, state = ?info.state, "server stopped outside the control plane");
    }
    Ok(true)
}
