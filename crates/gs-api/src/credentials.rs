//! Installation credentials for the GitHub App.
//!
//! A short-lived signed assertion (the App JWT) is exchanged for an
//! installation token, which is cached and shared by every caller until it
//! gets within `skew` of its expiry.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use github_api::GithubClient;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// GitHub rejects App JWTs that live longer than ten minutes.
const ASSERTION_LIFETIME_MINUTES: i64 = 9;
/// Backdated to tolerate clock drift between us and GitHub.
const ASSERTION_BACKDATE_SECONDS: i64 = 60;

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl Credential {
    pub fn is_fresh(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        now < self.expires_at - skew
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStage {
    Assertion,
    Exchange,
}

impl fmt::Display for AuthStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Assertion => "assertion",
            Self::Exchange => "exchange",
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("credential {stage} failed: {cause}")]
pub struct AuthError {
    pub stage: AuthStage,
    pub cause: String,
}

impl AuthError {
    fn new(stage: AuthStage, cause: impl fmt::Display) -> Self {
        Self {
            stage,
            cause: cause.to_string(),
        }
    }
}

/// Produces the signed assertion that proves the App's identity.
pub trait AssertionSigner: Send + Sync + 'static {
    fn sign(&self, now: DateTime<Utc>) -> Result<String, BoxError>;
}

/// Trades an assertion for an installation credential.
#[async_trait]
pub trait TokenExchanger: Send + Sync + 'static {
    async fn exchange(&self, assertion: &str) -> Result<Credential, BoxError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct AppClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

pub struct AppJwtSigner {
    app_id: String,
    key: EncodingKey,
    algorithm: Algorithm,
}

impl fmt::Debug for AppJwtSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppJwtSigner")
            .field("app_id", &self.app_id)
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

impl AppJwtSigner {
    /// RS256 signer from the App's PEM-encoded private key.
    pub fn from_rsa_pem(app_id: u64, pem: &[u8]) -> Result<Self, jsonwebtoken::errors::Error> {
        Ok(Self::with_key(app_id, EncodingKey::from_rsa_pem(pem)?, Algorithm::RS256))
    }

    pub fn with_key(app_id: u64, key: EncodingKey, algorithm: Algorithm) -> Self {
        Self {
            app_id: app_id.to_string(),
            key,
            algorithm,
        }
    }
}

impl AssertionSigner for AppJwtSigner {
    fn sign(&self, now: DateTime<Utc>) -> Result<String, BoxError> {
        let claims = AppClaims {
            iat: (now - Duration::seconds(ASSERTION_BACKDATE_SECONDS)).timestamp(),
            exp: (now + Duration::minutes(ASSERTION_LIFETIME_MINUTES)).timestamp(),
            iss: self.app_id.clone(),
        };
        Ok(encode(&Header::new(self.algorithm), &claims, &self.key)?)
    }
}

pub struct GithubTokenExchanger {
    client: GithubClient,
    installation_id: u64,
}

impl GithubTokenExchanger {
    pub fn new(client: GithubClient, installation_id: u64) -> Self {
        Self {
            client,
            installation_id,
        }
    }
}

#[async_trait]
impl TokenExchanger for GithubTokenExchanger {
    async fn exchange(&self, assertion: &str) -> Result<Credential, BoxError> {
        let token = self
            .client
            .create_installation_token(assertion, self.installation_id)
            .await?;
        Ok(Credential {
            token: token.token,
            issued_at: Utc::now(),
            expires_at: token.expires_at,
        })
    }
}

/// Process-wide credential cache with single-flight refresh.
pub struct CredentialBroker {
    signer: Arc<dyn AssertionSigner>,
    exchanger: Arc<dyn TokenExchanger>,
    skew: Duration,
    cached: Mutex<Option<Credential>>,
}

impl CredentialBroker {
    pub fn new(
        signer: Arc<dyn AssertionSigner>,
        exchanger: Arc<dyn TokenExchanger>,
        skew: Duration,
    ) -> Self {
        Self {
            signer,
            exchanger,
            skew,
            cached: Mutex::new(None),
        }
    }

    /// Return a credential valid for at least `skew`, refreshing if needed.
    ///
    /// The lock is held across the exchange, so concurrent callers wait for
    /// the one in-progress refresh and then read its result. A failed
    /// refresh leaves the cache as it was.
    pub async fn get_token(&self) -> Result<Credential, AuthError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();

        if let Some(credential) = cached.as_ref()
            && credential.is_fresh(now, self.skew)
        {
            return Ok(credential.clone());
        }

        tracing::debug!("refreshing installation credential");
        let assertion = self
            .signer
            .sign(now)
            .map_err(|e| AuthError::new(AuthStage::Assertion, e))?;
        let credential = self
            .exchanger
            .exchange(&assertion)
            .await
            .map_err(|e| AuthError::new(AuthStage::Exchange, e))?;

        tracing::info!(expires_at = %credential.expires_at, "installation credential refreshed");
        *cached = Some(credential.clone());
        Ok(credential)
    }
}
