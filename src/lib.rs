//! Playlist transfer core: `Matcher`, `TaskRuntime` (`TaskStore` +
//! `WorkerPool` + `RecoverySweeper`), `ProviderPort`, and `CacheLayer`,
//! fronted by a thin task-management HTTP surface.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod providers;
pub mod services;
pub mod similarity;
pub mod text;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use services::task_store::TaskStore;

/// Shared state handed to every `axum` handler. The worker pool and
/// recovery sweeper are owned by `main.rs` and run independently of this
/// state — the HTTP surface only needs to read and write through the same
/// `TaskStore`.
#[derive(Clone)]
pub struct AppState {
    pub task_store: Arc<TaskStore>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::health::metrics_handler))
        .route("/api/v1/tasks/transfer", post(handlers::tasks::create_transfer_task))
        .route(
            "/api/v1/tasks/:task_id",
            get(handlers::tasks::get_task).delete(handlers::tasks::cancel_task),
        )
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
        .with_state(state)
}
