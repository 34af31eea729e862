use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Installation tokens ─────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct InstallationToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

// ── Deployments ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct CreateDeploymentRequest {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub environment: String,
    pub description: String,
    pub auto_merge: bool,
    pub required_contexts: Vec<String>,
    pub transient_environment: bool,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Deployment {
    pub id: i64,
    pub environment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    Error,
    Failure,
    Inactive,
    InProgress,
    Queued,
    Pending,
    Success,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateDeploymentStatusRequest {
    pub state: DeploymentState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentStatus {
    pub id: i64,
    pub state: DeploymentState,
}

// ── Issues ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CreateCommentRequest<'a> {
    pub body: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueComment {
    pub id: i64,
    pub html_url: String,
}
