//! Typed Rust client for the GitHub REST API, as used by a GitHub App.
//!
//! Covers installation access tokens, deployments, deployment statuses
//! and issue comments. Signing the app JWT is left to the caller; this
//! crate only moves bytes.

mod types;

pub use types::*;

pub const DEFAULT_BASE_URL: &str = "https://api.github.com";

const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = "gameserver-control-plane";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("github api request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("github api {endpoint} returned {status}: {body}")]
    Api {
        endpoint: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Client for the GitHub REST API.
///
/// Stateless with respect to credentials: every call takes the bearer
/// token it should authenticate with (an app JWT or an installation token).
#[derive(Clone)]
pub struct GithubClient {
    base_url: String,
    http: reqwest::Client,
}

impl Default for GithubClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl GithubClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn request(&self, method: reqwest::Method, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .header("User-Agent", USER_AGENT)
    }

    async fn check(resp: reqwest::Response, endpoint: &'static str) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api {
                endpoint,
                status,
                body,
            });
        }
        Ok(resp)
    }

    // ── Apps ────────────────────────────────────────────────────────

    /// Exchange an app JWT for an installation access token.
    pub async fn create_installation_token(
        &self,
        app_jwt: &str,
        installation_id: u64,
    ) -> Result<InstallationToken> {
        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/app/installations/{installation_id}/access_tokens"),
                app_jwt,
            )
            .send()
            .await?;

        Self::check(resp, "create installation token")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    // ── Deployments ─────────────────────────────────────────────────

    /// `repo` is `owner/name`.
    pub async fn create_deployment(
        &self,
        token: &str,
        repo: &str,
        req: &CreateDeploymentRequest,
    ) -> Result<Deployment> {
        let resp = self
            .request(reqwest::Method::POST, &format!("/repos/{repo}/deployments"), token)
            .json(req)
            .send()
            .await?;

        Self::check(resp, "create deployment")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    pub async fn create_deployment_status(
        &self,
        token: &str,
        repo: &str,
        deployment_id: i64,
        req: &CreateDeploymentStatusRequest,
    ) -> Result<DeploymentStatus> {
        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/repos/{repo}/deployments/{deployment_id}/statuses"),
                token,
            )
            .json(req)
            .send()
            .await?;

        Self::check(resp, "create deployment status")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    // ── Issues ──────────────────────────────────────────────────────

    pub async fn create_issue_comment(
        &self,
        token: &str,
        repo: &str,
        issue_number: u64,
        body: &str,
    ) -> Result<IssueComment> {
        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/repos/{repo}/issues/{issue_number}/comments"),
                token,
            )
            .json(&CreateCommentRequest { body })
            .send()
            .await?;

        Self::check(resp, "create issue comment")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = GithubClient::new("https://github.example.com/api/v3/");
        assert_eq!(
            client.url("/app/installations/1/access_tokens"),
            "https://github.example.com/api/v3/app/installations/1/access_tokens"
        );
    }

    #[test]
    fn deployment_request_serializes_ref_field() {
        let req = CreateDeploymentRequest {
            git_ref: "main".into(),
            environment: "game-servers".into(),
            description: "deploy survival".into(),
            auto_merge: false,
            required_contexts: vec![],
            transient_environment: false,
            payload: serde_json::json!({ "server": "survival" }),
        };

        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["ref"], "main");
        assert!(value.get("git_ref").is_none());
    }

    #[test]
    fn deployment_state_uses_snake_case() {
        let value = serde_json::to_value(DeploymentState::InProgress).unwrap();
        assert_eq!(value, "in_progress");
    }
}
