//! Class domain - DB queries for classes
//!
//! All functions use the generic Executor pattern, allowing them to work with
//! both `&PgPool` (for standalone queries) and `&mut PgConnection` (for transactions).

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::models::ClassRecord;

/// Class row with roster and library sizes, for the teacher dashboard
#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ClassSummary {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub student_count: i64,
    pub book_count: i64,
}

pub async fn create_class<'e, E>(
    executor: E,
    name: &str,
    description: Option<&str>,
    code: &str,
    teacher_id: Uuid,
) -> Result<ClassRecord, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        INSERT INTO classes (id, name, description, code, teacher_id)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, name, description, code, teacher_id, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(description)
    .bind(code)
    .bind(teacher_id)
    .fetch_one(executor)
    .await
}

pub async fn find_by_id<'e, E>(executor: E, class_id: Uuid) -> Result<Option<ClassRecord>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        "SELECT id, name, description, code, teacher_id, created_at FROM classes WHERE id = $1",
    )
    .bind(class_id)
    .fetch_optional(executor)
    .await
}

pub async fn find_by_code<'e, E>(executor: E, code: &str) -> Result<Option<ClassRecord>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        "SELECT id, name, description, code, teacher_id, created_at FROM classes WHERE code = $1",
    )
    .bind(code)
    .fetch_optional(executor)
    .await
}

pub async fn code_exists<'e, E>(executor: E, code: &str) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let (exists,): (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM classes WHERE code = $1)")
        .bind(code)
        .fetch_one(executor)
        .await?;
    Ok(exists)
}

/// A teacher's classes, newest first
pub async fn list_for_teacher<'e, E>(executor: E, teacher_id: Uuid) -> Result<Vec<ClassSummary>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT
            c.id, c.name, c.description, c.code, c.created_at,
            (SELECT COUNT(*) FROM users u WHERE u.class_id = c.id AND u.role = 'STUDENT') AS student_count,
            (SELECT COUNT(*) FROM books b WHERE b.class_id = c.id) AS book_count
        FROM classes c
        WHERE c.teacher_id = $1
        ORDER BY c.created_at DESC
        "#,
    )
    .bind(teacher_id)
    .fetch_all(executor)
    .await
}
