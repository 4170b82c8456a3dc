//! Axum server wiring for the control surface.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use wamark_core::config::BulkConfig;
use wamark_core::traits::Gateway;
use wamark_engine::{BulkRunner, EngineState, Reconciler, Scheduler};
use wamark_store::{JsonStore, StateTracker};

/// Shared state for the control-surface server. Built once at startup.
pub struct AppState {
    pub gateway: Arc<dyn Gateway>,
    pub scheduler: Scheduler,
    pub reconciler: Reconciler,
    pub bulk: BulkRunner,
    pub engine: Arc<EngineState>,
    pub tracker: StateTracker,
    /// Settings, roster, and group selection.
    pub app_store: Arc<JsonStore>,
    /// Bulk checkpoint, draft, and bulk settings.
    pub bulk_store: Arc<JsonStore>,
    pub bulk_defaults: BulkConfig,
}

/// Build the Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(super::routes::health_check))
        .route("/api/status", get(super::routes::status))
        .route(
            "/api/settings",
            get(super::routes::get_settings).post(super::routes::update_settings),
        )
        .route(
            "/api/clients",
            get(super::routes::get_clients).post(super::routes::update_clients),
        )
        .route("/api/groups", get(super::routes::list_groups))
        .route("/api/groups/save", post(super::routes::save_groups))
        .route("/api/groups/saved", get(super::routes::saved_groups))
        .route("/api/start", post(super::routes::start))
        .route("/api/stop", post(super::routes::stop))
        .route("/api/last-checked", get(super::routes::last_checked))
        .route("/api/backlog/process", post(super::routes::backlog_process))
        .route("/api/backlog/check", post(super::routes::backlog_check))
        .route("/api/bulk/start", post(super::routes::bulk_start))
        .route("/api/bulk/pause", post(super::routes::bulk_pause))
        .route("/api/bulk/resume", post(super::routes::bulk_resume))
        .route("/api/bulk/cancel", post(super::routes::bulk_cancel))
        .route("/api/bulk/status", get(super::routes::bulk_status))
        .route(
            "/api/bulk/draft",
            get(super::routes::get_bulk_draft).post(super::routes::save_bulk_draft),
        )
        .route(
            "/api/bulk/settings",
            get(super::routes::get_bulk_settings).post(super::routes::save_bulk_settings),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server and block until it exits.
pub async fn serve(host: &str, port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = build_router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("🌐 control server listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
