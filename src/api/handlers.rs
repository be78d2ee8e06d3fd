use axum::{extract::State, Json};
use std::collections::HashMap;

use crate::core::state::AppState;
use crate::schemas::{HealthResponse, RootResponse};

pub(crate) async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    let response = RootResponse {
        message: state.settings().api().project_name.clone(),
        version: state.settings().api().version.clone(),
        docs_url: format!("{}/docs", state.settings().api().api_v1_str),
    };

    Json(response)
}

pub(crate) async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut status = "healthy".to_string();
    let mut components = HashMap::new();
    components
        .insert("storage".to_string(), state.settings().storage().backend.as_str().to_string());

    if let Some(pool) = state.db() {
        match sqlx::query("SELECT 1").execute(pool).await {
            Ok(_) => {
                components.insert("database".to_string(), "healthy".to_string());
            }
            Err(err) => {
                components.insert("database".to_string(), format!("unhealthy: {err}"));
                status = "unhealthy".to_string();
            }
        }
    }

    Json(HealthResponse { service: "quizforge-api".to_string(), status, components })
}
