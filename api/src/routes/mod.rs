pub mod assessments;
pub mod auth;
pub mod books;
pub mod chapters;
pub mod classes;

use axum::{Router, extract::State, http::StatusCode, routing::get};
use std::sync::Arc;

use crate::AppState;

/// GET /health - Liveness, including a database round trip
async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, &'static str) {
    match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => (StatusCode::OK, "ok"),
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "database unavailable")
        }
    }
}

/// Build all routes for the API
pub fn build_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .merge(auth::routes())
        .merge(classes::routes())
        .merge(books::routes())
        .merge(chapters::routes())
        .merge(assessments::routes())
}
