//! Authentication and profile endpoints (/auth/*)

use axum::{
    Json, Router,
    extract::{FromRequestParts, State},
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    routing::{get, patch, post},
};
use serde::Deserialize;
use std::sync::Arc;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};

use crate::AppState;
use crate::models::{Role, User, Voice};
use crate::services::auth::{AuthResponse, LoginRequest, RegisterRequest};
use crate::services::error::{AppError, AppResult};
use crate::services::session::SessionUser;

pub fn routes() -> Router<Arc<AppState>> {
    // Brute-force protection for credential endpoints
    let rate_limit_config = GovernorConfigBuilder::default()
        .per_second(6) // one token every 6 seconds
        .burst_size(10)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .expect("Failed to build rate limit config");

    let rate_limit_layer = GovernorLayer {
        config: rate_limit_config.into(),
    };

    let credentials = Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .layer(rate_limit_layer);

    Router::new()
        .merge(credentials)
        .route("/auth/me", get(get_me))
        .route("/auth/me/voice", patch(update_voice))
}

// ============================================================================
// Auth Extractor - validates the bearer JWT
// ============================================================================

/// Extractor that validates `Authorization: Bearer <jwt>` and returns the session
pub struct AuthUser(pub SessionUser);

impl AuthUser {
    /// Reject students before reading a request body. Services still check
    /// the stored role.
    pub fn teacher(&self) -> AppResult<SessionUser> {
        match self.0.role {
            Role::Teacher => Ok(self.0),
            Role::Student => Err(AppError::Forbidden("Only teachers can do this".into())),
        }
    }
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Missing bearer token".into()))?;

        state.auth.authenticate(token).map(AuthUser)
    }
}

// ============================================================================
// Account endpoints
// ============================================================================

/// POST /auth/register - Create a teacher account
async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let response = state.auth.register(req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /auth/login
async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    Ok(Json(state.auth.login(req).await?))
}

/// GET /auth/me - Current user (validates session)
async fn get_me(
    State(state): State<Arc<AppState>>,
    AuthUser(session): AuthUser,
) -> AppResult<Json<User>> {
    // A valid JWT for a deleted user is still unauthorized
    let user = state.auth.me(session.user_id).await.map_err(|e| match e {
        AppError::NotFound(_) => AppError::Unauthorized("Account no longer exists".into()),
        other => other,
    })?;
    Ok(Json(user))
}

#[derive(Deserialize)]
struct VoiceRequest {
    voice: Voice,
}

/// PATCH /auth/me/voice - Narrator voice for generated podcasts
async fn update_voice(
    State(state): State<Arc<AppState>>,
    AuthUser(session): AuthUser,
    Json(req): Json<VoiceRequest>,
) -> AppResult<Json<User>> {
    Ok(Json(state.auth.update_voice(session.user_id, req.voice).await?))
}
