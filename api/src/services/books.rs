//! Book upload and chapter segmentation

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::constants::{MAX_BOOK_FILE_SIZE, PDF_MIME};
use crate::models::{Book, Chapter, NewBook, NewChapter};
use crate::services::access::{check_class_access, require_teacher};
use crate::services::auth::is_unique_violation;
use crate::services::catalog::Catalog;
use crate::services::content::{ContentGenerator, Document};
use crate::services::error::{AppError, AppResult, During, FailedTo};
use crate::services::pdf;
use crate::storage::{ObjectStore, UploadOptions};

const TOC_INSTRUCTION: &str = r#"Build the table of contents of this book: list every chapter or section with the page it starts on and the page it ends on, using the PDF's page numbers (the first page of the file is page 1).

Answer with a single ```json fenced block containing an array shaped like:
[{"title": "string", "startPage": 1, "endPage": 12}]

Return nothing else."#;

/// A file received from a multipart upload
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookWithChapters {
    #[serde(flatten)]
    pub book: Book,
    pub chapters: Vec<Chapter>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookHeader {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct BookChapters {
    pub book: BookHeader,
    pub chapters: Vec<Chapter>,
}

pub struct BookService {
    catalog: Arc<dyn Catalog>,
    store: Arc<dyn ObjectStore>,
    content: Arc<ContentGenerator>,
}

impl BookService {
    pub fn new(catalog: Arc<dyn Catalog>, store: Arc<dyn ObjectStore>, content: Arc<ContentGenerator>) -> Self {
        Self {
            catalog,
            store,
            content,
        }
    }

    /// Store a teacher's book and split it into chapters.
    ///
    /// Uploading the same bytes to the same class again returns the existing book.
    pub async fn upload(
        &self,
        teacher_id: Uuid,
        class_id: Uuid,
        title: &str,
        file: UploadedFile,
    ) -> AppResult<BookWithChapters> {
        let teacher = self
            .catalog
            .find_user(teacher_id)
            .await?
            .ok_or(AppError::NotFound("Teacher"))?;
        require_teacher(&teacher)?;
        let class = self
            .catalog
            .find_class(class_id)
            .await?
            .ok_or(AppError::NotFound("Class"))?;
        check_class_access(&teacher, &class)?;

        self.store_and_segment(teacher_id, class_id, title.trim(), file)
            .await
            .during("upload book")
    }

    async fn store_and_segment(
        &self,
        teacher_id: Uuid,
        class_id: Uuid,
        title: &str,
        file: UploadedFile,
    ) -> AppResult<BookWithChapters> {
        if title.is_empty() {
            return Err(AppError::Validation("Book title is required".into()));
        }
        if !file.data.starts_with(b"%PDF-") {
            return Err(AppError::Validation("Only PDF books are supported".into()));
        }
        if file.data.len() > MAX_BOOK_FILE_SIZE {
            return Err(AppError::Validation(format!(
                "Book is too large: {} MB, the limit is {} MB",
                file.data.len() / (1024 * 1024),
                MAX_BOOK_FILE_SIZE / (1024 * 1024)
            )));
        }

        let content_hash = format!("{:x}", Sha256::digest(&file.data));
        if let Some(existing) = self.catalog.find_book_by_hash(class_id, &content_hash).await? {
            tracing::info!(book_id = %existing.id, %class_id, "Book already uploaded to this class");
            let chapters = self.catalog.list_chapters(existing.id).await?;
            return Ok(BookWithChapters {
                book: existing,
                chapters,
            });
        }

        let data = file.data.clone();
        let page_count = tokio::task::spawn_blocking(move || pdf::page_count(&data))
            .await
            .failed_to("read book")?
            .map_err(|e| AppError::Validation(format!("Book is not a readable PDF: {e}")))?;

        let extension = file
            .file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or_else(|| "pdf".to_string());
        let name = format!("books/{}.{}", Uuid::new_v4(), extension);

        let object = self
            .store
            .upload(
                &name,
                file.data.clone(),
                UploadOptions::content_type(PDF_MIME)
                    .tag("originalName", &file.file_name)
                    .tag("uploadedBy", teacher_id),
            )
            .await
            .failed_to("store book file")?;

        let chapters: Vec<NewChapter> = self
            .content
            .generate_json(
                &[Document::Inline {
                    data: file.data,
                    mime_type: PDF_MIME.to_string(),
                }],
                TOC_INSTRUCTION,
            )
            .await?;
        let chapters = validate_toc(chapters, page_count)?;

        let created = self
            .catalog
            .create_book(
                NewBook {
                    title: title.to_string(),
                    file_uri: object.uri(),
                    content_hash: content_hash.clone(),
                    class_id,
                    uploader_id: teacher_id,
                },
                chapters,
            )
            .await;
        let (book, chapters) = match created {
            Ok(created) => created,
            Err(e) if is_unique_violation(&e) => {
                // A concurrent upload of the same bytes inserted first
                let existing = self
                    .catalog
                    .find_book_by_hash(class_id, &content_hash)
                    .await?
                    .ok_or_else(|| AppError::Conflict("Book is already being uploaded".into()))?;
                tracing::info!(
                    book_id = %existing.id,
                    orphan = %object.uri(),
                    "Concurrent upload lost the insert; returning the existing book"
                );
                let chapters = self.catalog.list_chapters(existing.id).await?;
                return Ok(BookWithChapters {
                    book: existing,
                    chapters,
                });
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            book_id = %book.id,
            %class_id,
            pages = page_count,
            chapters = chapters.len(),
            content_type = %file.content_type,
            "Uploaded book"
        );
        Ok(BookWithChapters { book, chapters })
    }

    async fn accessible_book(&self, book_id: Uuid, user_id: Uuid) -> AppResult<Book> {
        let user = self
            .catalog
            .find_user(user_id)
            .await?
            .ok_or(AppError::NotFound("User"))?;
        let book = self
            .catalog
            .find_book(book_id)
            .await?
            .ok_or(AppError::NotFound("Book"))?;
        let class = self
            .catalog
            .find_class(book.class_id)
            .await?
            .ok_or(AppError::NotFound("Class"))?;
        check_class_access(&user, &class)?;
        Ok(book)
    }

    pub async fn get(&self, book_id: Uuid, user_id: Uuid) -> AppResult<BookWithChapters> {
        let book = self.accessible_book(book_id, user_id).await?;
        let chapters = self.catalog.list_chapters(book.id).await?;
        Ok(BookWithChapters { book, chapters })
    }

    pub async fn chapters(&self, book_id: Uuid, user_id: Uuid) -> AppResult<BookChapters> {
        let book = self.accessible_book(book_id, user_id).await?;
        let chapters = self.catalog.list_chapters(book.id).await?;
        Ok(BookChapters {
            book: BookHeader {
                id: book.id,
                title: book.title,
                created_at: book.created_at,
            },
            chapters,
        })
    }
}

/// Every entry needs a title and a page range inside the book.
fn validate_toc(chapters: Vec<NewChapter>, page_count: usize) -> AppResult<Vec<NewChapter>> {
    if chapters.is_empty() {
        return Err(AppError::Validation("Model found no chapters in the book".into()));
    }

    chapters
        .into_iter()
        .enumerate()
        .map(|(i, chapter)| {
            let title = chapter.title.trim().to_string();
            if title.is_empty() {
                return Err(AppError::Validation(format!("Chapter {} has no title", i + 1)));
            }
            if chapter.start_page < 1
                || chapter.start_page > chapter.end_page
                || chapter.end_page as usize > page_count
            {
                return Err(AppError::Validation(format!(
                    "Chapter \"{title}\" has invalid pages {}-{} for a {page_count}-page book",
                    chapter.start_page, chapter.end_page
                )));
            }
            Ok(NewChapter { title, ..chapter })
        })
        .collect()
}
