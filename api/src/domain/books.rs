//! Book domain - DB queries for books
//!
//! All functions use the generic Executor pattern, allowing them to work with
//! both `&PgPool` (for standalone queries) and `&mut PgConnection` (for transactions).

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::models::{Book, NewBook};

/// Book row with its chapter count, for class listings
#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BookSummary {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub chapter_count: i64,
}

pub async fn create_book<'e, E>(executor: E, book: &NewBook) -> Result<Book, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        INSERT INTO books (id, title, file_uri, content_hash, class_id, uploader_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, title, file_uri, content_hash, class_id, uploader_id, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&book.title)
    .bind(&book.file_uri)
    .bind(&book.content_hash)
    .bind(book.class_id)
    .bind(book.uploader_id)
    .fetch_one(executor)
    .await
}

pub async fn find_by_id<'e, E>(executor: E, book_id: Uuid) -> Result<Option<Book>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT id, title, file_uri, content_hash, class_id, uploader_id, created_at
        FROM books WHERE id = $1
        "#,
    )
    .bind(book_id)
    .fetch_optional(executor)
    .await
}

/// Same bytes already uploaded to this class
pub async fn find_by_hash<'e, E>(
    executor: E,
    class_id: Uuid,
    content_hash: &str,
) -> Result<Option<Book>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT id, title, file_uri, content_hash, class_id, uploader_id, created_at
        FROM books WHERE class_id = $1 AND content_hash = $2
        "#,
    )
    .bind(class_id)
    .bind(content_hash)
    .fetch_optional(executor)
    .await
}

/// Books of a class, newest first
pub async fn list_for_class<'e, E>(executor: E, class_id: Uuid) -> Result<Vec<BookSummary>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT
            b.id, b.title, b.created_at,
            (SELECT COUNT(*) FROM chapters ch WHERE ch.book_id = b.id) AS chapter_count
        FROM books b
        WHERE b.class_id = $1
        ORDER BY b.created_at DESC
        "#,
    )
    .bind(class_id)
    .fetch_all(executor)
    .await
}
