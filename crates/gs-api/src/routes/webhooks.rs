use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use serde_json::Value;

use crate::auth::verify_signature;
use crate::error::ApiError;
use crate::state::AppState;
use crate::webhook::DispatchOutcome;

/// GitHub webhook receiver. Every delivery that passes the signature check
/// is acknowledged with 202, whatever dispatch makes of it.
pub async fn github_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<DispatchOutcome>), ApiError> {
    if let Some(secret) = &state.webhooks.settings().secret {
        let signature = headers
            .get("x-hub-signature-256")
            .and_then(|v| v.to_str().ok());
        if !verify_signature(secret, signature, &body) {
            tracing::warn!("webhook signature mismatch");
            return Err(ApiError::Unauthorized);
        }
    }

    let event = headers
        .get("x-github-event")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let outcome = match serde_json::from_slice::<Value>(&body) {
        Ok(payload) => state.webhooks.dispatch(event, &payload),
        Err(e) => {
            tracing::warn!(event, error = %e, "webhook body is not JSON");
            DispatchOutcome::Rejected {
                reason: format!("invalid JSON: {e}"),
            }
        }
    };
    Ok((StatusCode::ACCEPTED, Json(outcome)))
}
