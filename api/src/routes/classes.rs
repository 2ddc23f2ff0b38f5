//! Class endpoints (/classes/*)

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use std::sync::Arc;
use uuid::Uuid;

use super::auth::AuthUser;
use crate::AppState;
use crate::models::ClassRecord;
use crate::services::auth::AuthResponse;
use crate::services::classes::{ClassDetails, CreateClassRequest, JoinClassRequest, MyClasses};
use crate::services::error::AppResult;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/classes", post(create_class))
        .route("/classes/join", post(join_class))
        .route("/classes/my-classes", get(my_classes))
        .route("/classes/{id}", get(class_details))
}

/// POST /classes - Teacher creates a class with a fresh join code
async fn create_class(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateClassRequest>,
) -> AppResult<(StatusCode, Json<ClassRecord>)> {
    let session = user.teacher()?;
    let class = state.classes.create(session.user_id, req).await?;
    Ok((StatusCode::CREATED, Json(class)))
}

/// POST /classes/join - Student registration with a class code
async fn join_class(
    State(state): State<Arc<AppState>>,
    Json(req): Json<JoinClassRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let response = state.classes.join(&state.auth, req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /classes/my-classes
async fn my_classes(
    State(state): State<Arc<AppState>>,
    AuthUser(session): AuthUser,
) -> AppResult<Json<MyClasses>> {
    Ok(Json(state.classes.my_classes(session.user_id).await?))
}

/// GET /classes/:id - Class with its students and books
async fn class_details(
    State(state): State<Arc<AppState>>,
    AuthUser(session): AuthUser,
    Path(class_id): Path<Uuid>,
) -> AppResult<Json<ClassDetails>> {
    Ok(Json(state.classes.details(class_id, session.user_id).await?))
}
