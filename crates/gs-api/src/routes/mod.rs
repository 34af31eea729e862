pub mod servers;
pub mod webhooks;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};

use crate::auth::auth_middleware;
use crate::state::AppState;

pub fn api_router(state: AppState) -> Router {
    let authed = Router::new()
        .route(
            "/servers",
            post(servers::deploy_server).get(servers::list_servers),
        )
        .route(
            "/servers/{id}",
            get(servers::get_server).delete(servers::delete_server),
        )
        .route("/servers/{id}/stop", post(servers::stop_server))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Webhooks authenticate by signature, health not at all.
    let public = Router::new()
        .route("/webhooks/github", post(webhooks::github_webhook))
        .route("/health", get(|| async { "ok" }));

    Router::new()
        .merge(authed)
        .merge(public)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use gs_db::ServerRegistry;
    use gs_infra::{ProviderName, ProviderRegistry};
    use tokio::sync::Semaphore;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::auth::sign_body;
    use crate::config::AppConfig;
    use crate::testing::{Harness, ScriptedProvider, server_config};
    use crate::webhook::WebhookRouter;

    fn app() -> (Router, Harness) {
        app_with(ProviderRegistry::new())
    }

    fn app_with(providers: ProviderRegistry) -> (Router, Harness) {
        let harness = Harness::new(providers);
        let config = AppConfig::for_tests();
        let webhooks = Arc::new(WebhookRouter::new(
            harness.orchestrator.clone(),
            harness.broker.clone(),
            harness.platform.clone(),
            config.webhook.clone(),
        ));
        let state = AppState {
            orchestrator: harness.orchestrator.clone(),
            webhooks,
            config,
        };
        (api_router(state), harness)
    }

    fn authed(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, "Bearer test-key");
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    fn deploy_body(name: &str, provider: &str) -> Value {
        json!({
            "owner": "u1",
            "config": {
                "name": name,
                "game_type": "minecraft",
                "max_players": 20,
                "region": "nyc1",
                "provider": provider
            }
        })
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn self_hosted_deploy_returns_the_manual_setup_result() {
        let (app, _harness) = app();

        let response = app
            .oneshot(authed("POST", "/servers", Some(deploy_body("survival", "self_hosted"))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["server_id"], "self-hosted");
        assert_eq!(body["ip_address"], "0.0.0.0");
        assert_eq!(body["port"], 25565);
        assert_eq!(body["status"], "manual-setup-required");
        assert!(body["record_id"].is_string());
    }

    #[tokio::test]
    async fn aws_deploy_returns_the_not_implemented_result() {
        let (app, _harness) = app();

        let response = app
            .oneshot(authed("POST", "/servers", Some(deploy_body("survival", "aws"))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["server_id"], "");
        assert_eq!(body["ip_address"], "");
        assert_eq!(body["port"], 0);
        assert_eq!(body["status"], "error");
        assert_eq!(body["error_message"], "AWS deployment not implemented yet");
    }

    #[tokio::test]
    async fn unknown_provider_is_a_bad_request() {
        let (app, harness) = app();

        let response = app
            .oneshot(authed("POST", "/servers", Some(deploy_body("survival", "mainframe"))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["kind"], "validation");
        assert!(harness.registry.is_empty().await);
    }

    #[tokio::test]
    async fn server_routes_require_the_api_key() {
        let (app, _harness) = app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/servers?owner=u1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn deployed_servers_can_be_listed_stopped_and_deleted() {
        let (app, _harness) = app();

        let response = app
            .clone()
            .oneshot(authed("POST", "/servers", Some(deploy_body("survival", "self_hosted"))))
            .await
            .unwrap();
        let id = json_body(response).await["record_id"]
            .as_str()
            .unwrap()
            .to_string();

        let listed = json_body(
            app.clone()
                .oneshot(authed("GET", "/servers?owner=u1", None))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["status"], "manual_setup");

        let response = app
            .clone()
            .oneshot(authed("DELETE", &format!("/servers/{id}"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .clone()
            .oneshot(authed("POST", &format!("/servers/{id}/stop"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "stopped");

        let response = app
            .clone()
            .oneshot(authed("DELETE", &format!("/servers/{id}"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn get_server_reports_the_in_flight_phase() {
        let gate = Arc::new(Semaphore::new(0));
        let provider = Arc::new(ScriptedProvider::launching(ProviderName::DigitalOcean, "101").gated(gate.clone()));
        let (app, harness) = app_with(ProviderRegistry::new().with_provider(provider));

        let deploy = tokio::spawn({
            let orchestrator = harness.orchestrator.clone();
            async move {
                orchestrator
                    .deploy("u1", server_config("survival", ProviderName::DigitalOcean), None)
                    .await
            }
        });
        let id = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            loop {
                if harness.orchestrator.phase_of("u1", "survival")
                    == Some(crate::orchestrator::DeployPhase::Provisioning)
                    && let Some(record) = harness.registry.find_by_name("u1", "survival").await.unwrap()
                {
                    return record.id;
                }
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let body = json_body(
            app.clone()
                .oneshot(authed("GET", &format!("/servers/{id}"), None))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(body["status"], "starting");
        assert_eq!(body["phase"], "provisioning");

        gate.add_permits(1);
        deploy.await.unwrap().unwrap();
        let body = json_body(
            app.oneshot(authed("GET", &format!("/servers/{id}"), None))
                .await
                .unwrap(),
        )
        .await;
        assert!(body.get("phase").is_none());
    }

    #[tokio::test]
    async fn stopping_an_unknown_server_is_not_found() {
        let (app, _harness) = app();

        let response = app
            .oneshot(authed(
                "POST",
                &format!("/servers/{}/stop", uuid::Uuid::new_v4()),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["kind"], "not_found");
    }

    fn webhook(event: &str, body: &Value, signature: Option<String>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/webhooks/github")
            .header("x-github-event", event)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(signature) = signature {
            builder = builder.header("x-hub-signature-256", signature);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn webhook_with_a_bad_signature_is_unauthorized() {
        let (app, _harness) = app();
        let body = json!({ "repository": { "name": "game-servers" } });

        let response = app
            .oneshot(webhook("push", &body, Some("sha256=00".into())))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn signed_webhook_is_accepted_and_dispatched() {
        let (app, _harness) = app();
        let body = json!({ "repository": { "name": "website" } });
        let signature = sign_body("webhook-secret", body.to_string().as_bytes());

        let response = app
            .oneshot(webhook("push", &body, Some(signature)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(json_body(response).await["outcome"], "ignored");
    }

    #[tokio::test]
    async fn health_needs_no_auth() {
        let (app, _harness) = app();

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
