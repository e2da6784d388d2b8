//! HTTP application assembly

pub mod response;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use sqlx::PgPool;
use tower::ServiceBuilder;

use crate::config::CorsConfig;
use crate::db;
use crate::features::{self, FeatureState};
use crate::middleware;

/// Build the full router: `/health` plus the feature routes under `/api/v1`
pub fn create_router(state: FeatureState, db: PgPool, cors: &CorsConfig) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .with_state(db)
        .nest("/api/v1", features::router(state))
        .layer(
            ServiceBuilder::new()
                .layer(middleware::tracing_layer())
                .layer(middleware::cors_layer(cors)),
        )
}

async fn health_check(State(db): State<PgPool>) -> Response {
    match db::health_check(&db).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "database": "connected"
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Database health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "database": "unreachable"
                })),
            )
                .into_response()
        }
    }
}
