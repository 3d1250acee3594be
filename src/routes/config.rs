use axum::{extract::State, response::Json as ResponseJson, routing::get, Json, Router};

use crate::models::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/config", get(get_config))
        .with_state(state)
}

async fn root() -> ResponseJson<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Deep Research Agent API",
        "status": "running"
    }))
}

/// Configuration read: which models power each role and what the default
/// loop limits are. Stateless.
async fn get_config(State(state): State<AppState>) -> ResponseJson<serde_json::Value> {
    Json(serde_json::json!({
        "models": {
            "query_generator": state.config.llm.query_generator_model,
            "reflection": state.config.llm.reflection_model,
            "answer": state.config.llm.answer_model,
        },
        "limits": {
            "max_research_loops": state.config.research.default_max_loops,
            "initial_queries": state.config.research.default_initial_queries,
        }
    }))
}
