//! Chapter test endpoints (/test/chapters/*)

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    routing::post,
};
use std::sync::Arc;
use uuid::Uuid;

use super::auth::AuthUser;
use super::chapters::check_generation_limit;
use crate::AppState;
use crate::models::ChapterTest;
use crate::services::assessments::TestOptions;
use crate::services::error::{AppError, AppResult};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/test/chapters/{id}", post(generate_test).get(get_test))
}

/// The body is optional; an empty one means default options.
fn parse_options(body: &[u8]) -> AppResult<TestOptions> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(TestOptions::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::Validation(format!("Invalid test options: {e}")))
}

/// POST /test/chapters/:id - Generate (or return) the chapter's test
async fn generate_test(
    State(state): State<Arc<AppState>>,
    AuthUser(session): AuthUser,
    Path(chapter_id): Path<Uuid>,
    body: Bytes,
) -> AppResult<Json<ChapterTest>> {
    let options = parse_options(&body)?;
    check_generation_limit(session.user_id)?;
    Ok(Json(
        state
            .tests
            .generate(chapter_id, session.user_id, options)
            .await?,
    ))
}

/// GET /test/chapters/:id - Existing test, generated with defaults if missing
async fn get_test(
    State(state): State<Arc<AppState>>,
    AuthUser(session): AuthUser,
    Path(chapter_id): Path<Uuid>,
) -> AppResult<Json<ChapterTest>> {
    // May generate, so it spends a token like the POST
    check_generation_limit(session.user_id)?;
    Ok(Json(state.tests.get(chapter_id, session.user_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::services::rate_limit::GENERATION_RATE_LIMITER;
    use crate::services::session::SessionUser;
    use crate::testing::{FakeModel, MemoryCatalog, MemoryStore, app_state};
    use assert_matches::assert_matches;

    #[test]
    fn test_empty_body_means_defaults() {
        let options = parse_options(b"  \n").unwrap();
        assert!(options.title.is_none());
        assert!(options.number_of_questions.is_none());
    }

    #[test]
    fn test_camel_case_options() {
        let options = parse_options(br#"{"title": "Quiz", "numberOfQuestions": 3}"#).unwrap();
        assert_eq!(options.title.as_deref(), Some("Quiz"));
        assert_eq!(options.number_of_questions, Some(3));
    }

    #[test]
    fn test_malformed_body_rejected() {
        assert_matches!(parse_options(b"{not json"), Err(AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_get_is_rate_limited_before_generating() {
        let model = Arc::new(FakeModel::new(["unused"]));
        let state = app_state(
            Arc::new(MemoryCatalog::new()),
            Arc::new(MemoryStore::new()),
            model.clone(),
        );
        let session = SessionUser {
            user_id: Uuid::new_v4(),
            role: Role::Student,
        };
        while GENERATION_RATE_LIMITER.check(session.user_id) {}

        let result = get_test(State(state), AuthUser(session), Path(Uuid::new_v4())).await;

        assert_matches!(result, Err(AppError::RateLimited));
        assert!(model.prompts().is_empty());
    }
}
