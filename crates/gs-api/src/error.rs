use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::orchestrator::DeployError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Deploy(#[from] DeployError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Deploy(e) => match e {
                DeployError::Validation(_) => StatusCode::BAD_REQUEST,
                DeployError::Conflict(_) => StatusCode::CONFLICT,
                DeployError::NotFound(_) => StatusCode::NOT_FOUND,
                DeployError::Auth(_) | DeployError::Platform(_) | DeployError::Provider { .. } => {
                    StatusCode::BAD_GATEWAY
                }
                DeployError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                DeployError::Registry(_) => StatusCode::INTERNAL_SERVER_ERROR,
                DeployError::Interrupted(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "unauthorized",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Deploy(e) => e.kind(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let mut body = serde_json::json!({ "error": self.to_string(), "kind": self.kind() });
        if let ApiError::Deploy(DeployError::Provider { kind, .. }) = &self {
            body["failure"] = serde_json::json!(kind);
        }
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use gs_infra::{FailureKind, ProviderName};
    use uuid::Uuid;

    use super::*;

    #[test]
    fn deploy_errors_map_to_http_statuses() {
        let cases = [
            (DeployError::Conflict("busy".into()), StatusCode::CONFLICT),
            (DeployError::NotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (DeployError::Timeout(Duration::from_secs(1)), StatusCode::GATEWAY_TIMEOUT),
            (
                DeployError::Provider {
                    provider: ProviderName::DigitalOcean,
                    kind: FailureKind::Transient,
                    message: "503".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(ApiError::from(error).status(), expected);
        }
    }
}
