//! Shared data models used across modules

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Teacher => "TEACHER",
            Role::Student => "STUDENT",
        }
    }
}

impl TryFrom<String> for Role {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "TEACHER" => Ok(Role::Teacher),
            "STUDENT" => Ok(Role::Student),
            _ => Err(UnknownVariant { kind: "role", value }),
        }
    }
}

/// Narrator voice used for chapter podcasts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    #[default]
    Bella,
    Santa,
    Sarah,
    Michael,
}

impl Voice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Voice::Bella => "bella",
            Voice::Santa => "santa",
            Voice::Sarah => "sarah",
            Voice::Michael => "michael",
        }
    }
}

impl TryFrom<String> for Voice {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_ascii_lowercase().as_str() {
            "bella" => Ok(Voice::Bella),
            "santa" => Ok(Voice::Santa),
            "sarah" => Ok(Voice::Sarah),
            "michael" => Ok(Voice::Michael),
            _ => Err(UnknownVariant { kind: "voice", value }),
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub class_id: Option<Uuid>,
    #[sqlx(try_from = "String")]
    pub voice_preference: Voice,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ClassRecord {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub code: String,
    pub teacher_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub file_uri: String,
    pub content_hash: String,
    pub class_id: Uuid,
    pub uploader_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A titled page range of a book; every derived artifact hangs off it.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: Uuid,
    pub book_id: Uuid,
    pub title: String,
    pub start_page: i32,
    pub end_page: i32,
    pub file_uri: Option<String>,
    pub summary: Option<String>,
    pub podcast_url: Option<String>,
    pub presentation_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub file_uri: String,
    pub content_hash: String,
    pub class_id: Uuid,
    pub uploader_id: Uuid,
}

/// One table-of-contents entry as returned by the model
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewChapter {
    pub title: String,
    pub start_page: i32,
    pub end_page: i32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOption {
    pub id: Uuid,
    pub option_text: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: Uuid,
    pub question_text: String,
    pub options: Vec<AnswerOption>,
}

/// Multiple-choice test attached to a chapter (at most one per chapter)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterTest {
    pub id: Uuid,
    pub chapter_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub questions: Vec<Question>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOption {
    pub option_text: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQuestion {
    pub question_text: String,
    pub options: Vec<NewOption>,
}

#[derive(Debug, Clone)]
pub struct NewTest {
    pub title: String,
    pub description: Option<String>,
    pub questions: Vec<NewQuestion>,
}
