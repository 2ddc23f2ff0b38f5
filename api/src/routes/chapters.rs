//! Chapter study-aid endpoints (/chapter/*)

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use std::sync::Arc;
use uuid::Uuid;

use super::auth::AuthUser;
use crate::AppState;
use crate::models::Chapter;
use crate::services::chapters::{PodcastResponse, PresentationResponse};
use crate::services::error::{AppError, AppResult};
use crate::services::rate_limit::GENERATION_RATE_LIMITER;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/chapter/{id}/summary", post(summary))
        .route("/chapter/{id}/podcast", post(podcast))
        .route("/chapter/{id}/presentation", post(presentation))
}

/// Generation calls are billed upstream; cap them per user.
pub(crate) fn check_generation_limit(user_id: Uuid) -> AppResult<()> {
    if GENERATION_RATE_LIMITER.check(user_id) {
        Ok(())
    } else {
        tracing::warn!(%user_id, "Generation rate limit exceeded");
        Err(AppError::RateLimited)
    }
}

/// POST /chapter/:id/summary
async fn summary(
    State(state): State<Arc<AppState>>,
    AuthUser(session): AuthUser,
    Path(chapter_id): Path<Uuid>,
) -> AppResult<Json<Chapter>> {
    check_generation_limit(session.user_id)?;
    Ok(Json(state.chapters.summary(chapter_id, session.user_id).await?))
}

/// POST /chapter/:id/podcast
async fn podcast(
    State(state): State<Arc<AppState>>,
    AuthUser(session): AuthUser,
    Path(chapter_id): Path<Uuid>,
) -> AppResult<Json<PodcastResponse>> {
    check_generation_limit(session.user_id)?;
    Ok(Json(state.chapters.podcast(chapter_id, session.user_id).await?))
}

/// POST /chapter/:id/presentation - Blocks while the deck renders
async fn presentation(
    State(state): State<Arc<AppState>>,
    AuthUser(session): AuthUser,
    Path(chapter_id): Path<Uuid>,
) -> AppResult<Json<PresentationResponse>> {
    check_generation_limit(session.user_id)?;
    Ok(Json(
        state.chapters.presentation(chapter_id, session.user_id).await?,
    ))
}
