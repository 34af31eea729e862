mod auth;
mod config;
mod credentials;
mod dto;
mod error;
mod monitor;
mod orchestrator;
mod platform;
mod routes;
mod state;
mod webhook;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use github_api::GithubClient;
use gs_db::{MemoryRegistry, PgRegistry, ServerRegistry};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::credentials::{AppJwtSigner, CredentialBroker, GithubTokenExchanger};
use crate::monitor::spawn_monitor;
use crate::orchestrator::Orchestrator;
use crate::platform::GithubPlatform;
use crate::routes::api_router;
use crate::state::AppState;
use crate::webhook::WebhookRouter;

#[tokio::main]
async fn main() {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env().expect("invalid configuration");

    // Server records
    let registry: Arc<dyn ServerRegistry> = match &config.database_url {
        Some(url) => {
            let pool = gs_db::create_pool(url)
                .await
                .expect("failed to connect to database");
            gs_db::run_migrations(&pool)
                .await
                .expect("failed to run migrations");
            Arc::new(PgRegistry::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, server records are kept in memory only");
            Arc::new(MemoryRegistry::new())
        }
    };

    // Game server providers
    let providers = gs_infra::build_providers();
    tracing::info!(providers = ?providers.available(), "game server providers ready");

    // GitHub App credentials and deployment intents
    let github = GithubClient::new(&config.github.api_url);
    let signer = AppJwtSigner::from_rsa_pem(config.github.app_id, config.github.private_key_pem.as_bytes())
        .expect("GitHub App private key is not a valid RSA PEM");
    let broker = Arc::new(CredentialBroker::new(
        Arc::new(signer),
        Arc::new(GithubTokenExchanger::new(github.clone(), config.github.installation_id)),
        chrono::Duration::seconds(config.token_refresh_skew_secs),
    ));
    let platform = Arc::new(GithubPlatform::new(
        github,
        &config.github.deploy_repo,
        &config.github.deploy_ref,
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        broker.clone(),
        platform.clone(),
        providers.clone(),
        registry.clone(),
        config.deploy_timeout,
    ));
    let webhooks = Arc::new(WebhookRouter::new(
        orchestrator.clone(),
        broker,
        platform,
        config.webhook.clone(),
    ));

    // Background status monitor
    spawn_monitor(registry, providers, config.monitor_interval_secs);

    let state = AppState {
        orchestrator,
        webhooks,
        config: config.clone(),
    };

    let app = api_router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .expect("failed to bind listener");

    tracing::info!(addr = %config.listen_addr, "starting game server control plane");

    axum::serve(listener, app).await.expect("server error");
}
