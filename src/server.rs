//! # Server Configuration
//!
//! Axum router and state wiring for the admin command interface.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use sea_orm::DatabaseConnection;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::editorial::EditorialHandler;
use crate::handlers;
use crate::pipeline::PipelineOrchestrator;
use crate::search::ProjectionSynchronizer;

/// Application state containing shared resources.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub editorial: Arc<EditorialHandler>,
    pub search: Arc<ProjectionSynchronizer>,
}

/// Creates and configures the Axum application router.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/runs", post(handlers::trigger_run))
        .route("/import", post(handlers::import))
        .route("/review", get(handlers::review_queue))
        .route("/events/{id}/verify", post(handlers::verify))
        .route("/events/{id}/pin", post(handlers::pin))
        .route("/events/{id}/significance", post(handlers::set_significance))
        .route("/events/{id}/status", post(handlers::update_status))
        .route("/events/{id}/archive", post(handlers::archive))
        .route("/events/{keep_id}/merge/{lose_id}", post(handlers::merge))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the admin server with the given state.
pub async fn run_server(state: AppState) -> Result<(), Box<dyn std::error::Error>> {
    let addr = state
        .config
        .bind_addr()
        .map_err(|e| format!("invalid server address: {e}"))?;

    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "admin interface listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// OpenAPI documentation for the admin surface.
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::health,
        crate::handlers::trigger_run,
        crate::handlers::import,
        crate::handlers::review_queue,
        crate::handlers::verify,
        crate::handlers::pin,
        crate::handlers::set_significance,
        crate::handlers::update_status,
        crate::handlers::merge,
        crate::handlers::archive,
    ),
    components(schemas(
        crate::handlers::ServiceInfo,
        crate::handlers::HealthResponse,
        crate::handlers::RunAccepted,
        crate::handlers::VerifyRequest,
        crate::handlers::PinRequest,
        crate::handlers::SignificanceRequest,
        crate::handlers::StatusRequest,
        crate::handlers::ArchiveRequest,
        crate::import::ManualImportPayload,
        crate::import::ManualSourceSpec,
        crate::import::ImportOutcome,
        crate::import::RejectedRecord,
    )),
    info(
        title = "Moussem Admin API",
        description = "Editorial command interface for the event catalog",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
