//! Book endpoints (/books/*)

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::{get, post},
};
use std::sync::Arc;
use uuid::Uuid;

use super::auth::AuthUser;
use crate::AppState;
use crate::constants::{MAX_BOOK_UPLOAD_SIZE, PDF_MIME};
use crate::services::books::{BookChapters, BookWithChapters, UploadedFile};
use crate::services::error::{AppError, AppResult};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/books/upload",
            post(upload_book).layer(DefaultBodyLimit::max(MAX_BOOK_UPLOAD_SIZE)),
        )
        .route("/books/{id}", get(get_book))
        .route("/books/{id}/chapters", get(get_chapters))
}

fn bad_multipart(e: impl std::fmt::Display) -> AppError {
    AppError::Validation(format!("Invalid multipart body: {e}"))
}

/// POST /books/upload - multipart `file`, `title`, `classId`
async fn upload_book(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<BookWithChapters>)> {
    let session = user.teacher()?;
    let mut file = None;
    let mut title = None;
    let mut class_id = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("book.pdf").to_string();
                let content_type = field.content_type().unwrap_or(PDF_MIME).to_string();
                let data = field.bytes().await.map_err(bad_multipart)?;
                file = Some(UploadedFile {
                    file_name,
                    content_type,
                    data,
                });
            }
            "title" => title = Some(field.text().await.map_err(bad_multipart)?),
            "classId" => {
                let raw = field.text().await.map_err(bad_multipart)?;
                let id = raw
                    .trim()
                    .parse::<Uuid>()
                    .map_err(|_| AppError::Validation("classId must be a UUID".into()))?;
                class_id = Some(id);
            }
            other => tracing::debug!(field = other, "Ignoring unknown upload field"),
        }
    }

    let file = file.ok_or_else(|| AppError::Validation("A PDF file is required".into()))?;
    let title = title.ok_or_else(|| AppError::Validation("Book title is required".into()))?;
    let class_id = class_id.ok_or_else(|| AppError::Validation("classId is required".into()))?;

    let book = state
        .books
        .upload(session.user_id, class_id, &title, file)
        .await?;
    Ok((StatusCode::CREATED, Json(book)))
}

/// GET /books/:id - Book with its chapters
async fn get_book(
    State(state): State<Arc<AppState>>,
    AuthUser(session): AuthUser,
    Path(book_id): Path<Uuid>,
) -> AppResult<Json<BookWithChapters>> {
    Ok(Json(state.books.get(book_id, session.user_id).await?))
}

/// GET /books/:id/chapters - Chapters ordered by start page
async fn get_chapters(
    State(state): State<Arc<AppState>>,
    AuthUser(session): AuthUser,
    Path(book_id): Path<Uuid>,
) -> AppResult<Json<BookChapters>> {
    Ok(Json(state.books.chapters(book_id, session.user_id).await?))
}
