use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::{config::Config, services::ai::AiClient};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    /// Remote completion backend; `None` means generation and insights run locally.
    pub ai: Option<Arc<dyn AiClient>>,
}

impl AppState {
    pub fn ai(&self) -> Option<&dyn AiClient> {
        self.ai.as_deref()
    }
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
