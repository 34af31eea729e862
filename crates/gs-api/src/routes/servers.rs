use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use uuid::Uuid;

use crate::dto::{DeployRequest, ListServersQuery, ServerResponse};
use crate::error::ApiError;
use crate::orchestrator::{DeployError, DeployReport};
use crate::state::AppState;

pub async fn deploy_server(
    State(state): State<AppState>,
    Json(req): Json<DeployRequest>,
) -> Result<(StatusCode, Json<DeployReport>), ApiError> {
    if req.owner.trim().is_empty() {
        return Err(ApiError::BadRequest("owner must not be empty".into()));
    }
    let config = req.config.into_config().map_err(DeployError::from)?;

    let report = state.orchestrator.deploy(&req.owner, config, None).await?;

    // A provider that could not act is still a well-formed answer.
    let status = if report.result.success {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(report)))
}

pub async fn list_servers(
    State(state): State<AppState>,
    Query(query): Query<ListServersQuery>,
) -> Result<Json<Vec<ServerResponse>>, ApiError> {
    let servers = state.orchestrator.list_servers(&query.owner).await?;
    Ok(Json(servers.into_iter().map(ServerResponse::from).collect()))
}

pub async fn get_server(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ServerResponse>, ApiError> {
    let record = state.orchestrator.get_server(id).await?;
    let phase = state.orchestrator.phase_of(&record.owner, &record.name);
    Ok(Json(ServerResponse {
        phase,
        ..ServerResponse::from(record)
    }))
}

pub async fn stop_server(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ServerResponse>, ApiError> {
    let record = state.orchestrator.stop_server(id).await?;
    Ok(Json(record.into()))
}

pub async fn delete_server(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.orchestrator.delete_server(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
