// Deep Research - iterative web research agent service

pub mod agents;
pub mod config;
pub mod engine;
pub mod llm;
pub mod models;
pub mod routes;
pub mod search;
pub mod types;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use engine::ResearchEngine;
pub use models::AppState;

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
