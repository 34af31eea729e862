use std::sync::Arc;

use crate::config::AppConfig;
use crate::orchestrator::Orchestrator;
use crate::webhook::WebhookRouter;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub webhooks: Arc<WebhookRouter>,
    pub config: AppConfig,
}
