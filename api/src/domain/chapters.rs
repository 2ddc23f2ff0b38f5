//! Chapter domain - DB queries for chapters
//!
//! Every derived artifact is a single-column update, so each mutation here is
//! atomic on its own.

use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::models::{Chapter, NewChapter};

const CHAPTER_COLUMNS: &str = "id, book_id, title, start_page, end_page, file_uri, summary, podcast_url, presentation_url, created_at";

pub async fn insert_chapter<'e, E>(
    executor: E,
    book_id: Uuid,
    chapter: &NewChapter,
) -> Result<Chapter, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(&format!(
        r#"
        INSERT INTO chapters (id, book_id, title, start_page, end_page)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {CHAPTER_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(book_id)
    .bind(&chapter.title)
    .bind(chapter.start_page)
    .bind(chapter.end_page)
    .fetch_one(executor)
    .await
}

pub async fn find_by_id<'e, E>(executor: E, chapter_id: Uuid) -> Result<Option<Chapter>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(&format!("SELECT {CHAPTER_COLUMNS} FROM chapters WHERE id = $1"))
        .bind(chapter_id)
        .fetch_optional(executor)
        .await
}

/// Chapters of a book in reading order
pub async fn list_for_book<'e, E>(executor: E, book_id: Uuid) -> Result<Vec<Chapter>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(&format!(
        "SELECT {CHAPTER_COLUMNS} FROM chapters WHERE book_id = $1 ORDER BY start_page ASC, created_at ASC"
    ))
    .bind(book_id)
    .fetch_all(executor)
    .await
}

/// Set one nullable artifact column and return the updated row.
///
/// `column` is always one of the fixed names below, never user input.
async fn set_column<'e, E>(
    executor: E,
    chapter_id: Uuid,
    column: &'static str,
    value: &str,
) -> Result<Option<Chapter>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(&format!(
        "UPDATE chapters SET {column} = $2 WHERE id = $1 RETURNING {CHAPTER_COLUMNS}"
    ))
    .bind(chapter_id)
    .bind(value)
    .fetch_optional(executor)
    .await
}

pub async fn set_file_uri<'e, E>(executor: E, chapter_id: Uuid, uri: &str) -> Result<Option<Chapter>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    set_column(executor, chapter_id, "file_uri", uri).await
}

pub async fn set_summary<'e, E>(executor: E, chapter_id: Uuid, summary: &str) -> Result<Option<Chapter>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    set_column(executor, chapter_id, "summary", summary).await
}

pub async fn set_podcast_url<'e, E>(executor: E, chapter_id: Uuid, url: &str) -> Result<Option<Chapter>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    set_column(executor, chapter_id, "podcast_url", url).await
}

pub async fn set_presentation_url<'e, E>(
    executor: E,
    chapter_id: Uuid,
    url: &str,
) -> Result<Option<Chapter>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    set_column(executor, chapter_id, "presentation_url", url).await
}
