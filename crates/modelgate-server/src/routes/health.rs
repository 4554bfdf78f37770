use axum::{routing::get, Json, Router};

use super::dto::HealthStatus;
use super::HEALTH_PATH;

/// GET /health
async fn health_check() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub fn routes() -> Router {
    Router::new().route(HEALTH_PATH, get(health_check))
}
