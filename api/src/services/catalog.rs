//! Record access used by the book, chapter and test services

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{books, chapter_tests, chapters, classes, users};
use crate::models::{Book, Chapter, ChapterTest, ClassRecord, NewBook, NewChapter, NewTest, User};

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error>;
    async fn find_class(&self, class_id: Uuid) -> Result<Option<ClassRecord>, sqlx::Error>;

    async fn find_book(&self, book_id: Uuid) -> Result<Option<Book>, sqlx::Error>;
    async fn find_book_by_hash(&self, class_id: Uuid, content_hash: &str) -> Result<Option<Book>, sqlx::Error>;
    /// Create a book and its chapters atomically.
    async fn create_book(&self, book: NewBook, chapters: Vec<NewChapter>) -> Result<(Book, Vec<Chapter>), sqlx::Error>;

    async fn list_chapters(&self, book_id: Uuid) -> Result<Vec<Chapter>, sqlx::Error>;
    async fn find_chapter(&self, chapter_id: Uuid) -> Result<Option<Chapter>, sqlx::Error>;
    async fn set_chapter_file(&self, chapter_id: Uuid, uri: &str) -> Result<Option<Chapter>, sqlx::Error>;
    async fn set_chapter_summary(&self, chapter_id: Uuid, summary: &str) -> Result<Option<Chapter>, sqlx::Error>;
    async fn set_chapter_podcast(&self, chapter_id: Uuid, url: &str) -> Result<Option<Chapter>, sqlx::Error>;
    async fn set_chapter_presentation(&self, chapter_id: Uuid, url: &str) -> Result<Option<Chapter>, sqlx::Error>;

    async fn find_test(&self, chapter_id: Uuid) -> Result<Option<ChapterTest>, sqlx::Error>;
    async fn create_test(&self, chapter_id: Uuid, test: NewTest) -> Result<ChapterTest, sqlx::Error>;
}

pub struct PgCatalog {
    db: PgPool,
}

impl PgCatalog {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        users::find_by_id(&self.db, user_id).await
    }

    async fn find_class(&self, class_id: Uuid) -> Result<Option<ClassRecord>, sqlx::Error> {
        classes::find_by_id(&self.db, class_id).await
    }

    async fn find_book(&self, book_id: Uuid) -> Result<Option<Book>, sqlx::Error> {
        books::find_by_id(&self.db, book_id).await
    }

    async fn find_book_by_hash(&self, class_id: Uuid, content_hash: &str) -> Result<Option<Book>, sqlx::Error> {
        books::find_by_hash(&self.db, class_id, content_hash).await
    }

    async fn create_book(&self, book: NewBook, new_chapters: Vec<NewChapter>) -> Result<(Book, Vec<Chapter>), sqlx::Error> {
        let mut tx = self.db.begin().await?;

        let book = books::create_book(&mut *tx, &book).await?;
        let mut created = Vec::with_capacity(new_chapters.len());
        for chapter in &new_chapters {
            created.push(chapters::insert_chapter(&mut *tx, book.id, chapter).await?);
        }

        tx.commit().await?;
        Ok((book, created))
    }

    async fn list_chapters(&self, book_id: Uuid) -> Result<Vec<Chapter>, sqlx::Error> {
        chapters::list_for_book(&self.db, book_id).await
    }

    async fn find_chapter(&self, chapter_id: Uuid) -> Result<Option<Chapter>, sqlx::Error> {
        chapters::find_by_id(&self.db, chapter_id).await
    }

    async fn set_chapter_file(&self, chapter_id: Uuid, uri: &str) -> Result<Option<Chapter>, sqlx::Error> {
        chapters::set_file_uri(&self.db, chapter_id, uri).await
    }

    async fn set_chapter_summary(&self, chapter_id: Uuid, summary: &str) -> Result<Option<Chapter>, sqlx::Error> {
        chapters::set_summary(&self.db, chapter_id, summary).await
    }

    async fn set_chapter_podcast(&self, chapter_id: Uuid, url: &str) -> Result<Option<Chapter>, sqlx::Error> {
        chapters::set_podcast_url(&self.db, chapter_id, url).await
    }

    async fn set_chapter_presentation(&self, chapter_id: Uuid, url: &str) -> Result<Option<Chapter>, sqlx::Error> {
        chapters::set_presentation_url(&self.db, chapter_id, url).await
    }

    async fn find_test(&self, chapter_id: Uuid) -> Result<Option<ChapterTest>, sqlx::Error> {
        let mut conn = self.db.acquire().await?;
        chapter_tests::find_for_chapter(&mut conn, chapter_id).await
    }

    async fn create_test(&self, chapter_id: Uuid, test: NewTest) -> Result<ChapterTest, sqlx::Error> {
        let mut tx = self.db.begin().await?;
        let created = chapter_tests::insert_test(&mut tx, chapter_id, &test).await?;
        tx.commit().await?;
        Ok(created)
    }
}
