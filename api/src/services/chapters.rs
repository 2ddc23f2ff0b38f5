//! Per-chapter study aids: source extraction, summaries, podcasts and slide decks.
//!
//! Every artifact is memoized in its chapter column. A request that finds the
//! column set returns it unchanged; otherwise it takes the in-flight guard for
//! that artifact, re-reads the chapter, makes exactly one generation call and
//! persists the result. Nothing is rolled back when a later step fails.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::constants::{PDF_MIME, WAV_MIME};
use crate::models::{Book, Chapter, User};
use crate::services::access::check_class_access;
use crate::services::catalog::Catalog;
use crate::services::content::{ContentGenerator, Document};
use crate::services::error::{AppError, AppResult, During, FailedTo};
use crate::services::in_flight::{Artifact, InFlight};
use crate::services::pdf::{self, PdfError};
use crate::services::poller::{PollConfig, Poller};
use crate::services::speech_text::markdown_to_speech;
use crate::slides::SlideRenderer;
use crate::speech::SpeechSynthesizer;
use crate::storage::{ObjectRef, ObjectStore, UploadOptions};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodcastResponse {
    pub podcast_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentationResponse {
    pub presentation_url: String,
}

/// A chapter the requesting user is allowed to see
pub struct ChapterContext {
    pub user: User,
    pub chapter: Chapter,
    pub book: Book,
}

pub struct ChapterService {
    catalog: Arc<dyn Catalog>,
    store: Arc<dyn ObjectStore>,
    content: Arc<ContentGenerator>,
    speech: Arc<dyn SpeechSynthesizer>,
    renderer: Arc<dyn SlideRenderer>,
    poller: Poller,
    in_flight: Arc<InFlight>,
    summary_template: Option<ObjectRef>,
}

impl ChapterService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Arc<dyn Catalog>,
        store: Arc<dyn ObjectStore>,
        content: Arc<ContentGenerator>,
        speech: Arc<dyn SpeechSynthesizer>,
        renderer: Arc<dyn SlideRenderer>,
        poll: PollConfig,
        in_flight: Arc<InFlight>,
        summary_template: Option<ObjectRef>,
    ) -> Self {
        Self {
            poller: Poller::new(renderer.clone(), poll),
            catalog,
            store,
            content,
            speech,
            renderer,
            in_flight,
            summary_template,
        }
    }

    /// Load a chapter with its book, checking the user belongs to the book's class.
    pub async fn authorize(&self, chapter_id: Uuid, user_id: Uuid) -> AppResult<ChapterContext> {
        let user = self
            .catalog
            .find_user(user_id)
            .await?
            .ok_or(AppError::NotFound("User"))?;
        let chapter = self
            .catalog
            .find_chapter(chapter_id)
            .await?
            .ok_or(AppError::NotFound("Chapter"))?;
        let book = self
            .catalog
            .find_book(chapter.book_id)
            .await?
            .ok_or(AppError::NotFound("Book"))?;
        let class = self
            .catalog
            .find_class(book.class_id)
            .await?
            .ok_or(AppError::NotFound("Class"))?;

        check_class_access(&user, &class)?;
        Ok(ChapterContext {
            user,
            chapter,
            book,
        })
    }

    async fn reload(&self, chapter_id: Uuid) -> AppResult<Chapter> {
        self.catalog
            .find_chapter(chapter_id)
            .await?
            .ok_or(AppError::NotFound("Chapter"))
    }

    /// Standalone PDF of the chapter's page range, extracted on first use.
    pub async fn resolve_source(&self, chapter: &Chapter, book: &Book) -> AppResult<ObjectRef> {
        if let Some(uri) = &chapter.file_uri {
            return ObjectRef::parse(uri).failed_to("read chapter file reference");
        }

        let _guard = self.in_flight.acquire(chapter.id, Artifact::Source).await;
        let chapter = self.reload(chapter.id).await?;
        if let Some(uri) = &chapter.file_uri {
            return ObjectRef::parse(uri).failed_to("read chapter file reference");
        }

        let book_object = ObjectRef::parse(&book.file_uri).failed_to("read book file reference")?;
        let source = self.store.download(&book_object).await.failed_to("download book")?;

        let (start, end) = (chapter.start_page, chapter.end_page);
        let pages = tokio::task::spawn_blocking(move || pdf::extract_pages(&source, start, end))
            .await
            .failed_to("extract chapter pages")?
            .map_err(|e| match e {
                PdfError::PageRange { .. } => AppError::Validation(e.to_string()),
                other => AppError::Validation(format!("Book is not a readable PDF: {other}")),
            })?;

        let name = format!("books/{}/chapters/{}.pdf", book.id, chapter.id);
        let object = self
            .store
            .upload(
                &name,
                pages.into(),
                UploadOptions::content_type(PDF_MIME)
                    .tag("chapterId", chapter.id)
                    .tag("bookId", book.id),
            )
            .await
            .failed_to("upload chapter file")?;

        self.catalog
            .set_chapter_file(chapter.id, &object.uri())
            .await?
            .ok_or(AppError::NotFound("Chapter"))?;

        tracing::info!(chapter_id = %chapter.id, start, end, object = %object, "Extracted chapter source");
        Ok(object)
    }

    /// Summary is generated from the chapter PDF (plus the optional template).
    pub async fn ensure_summary(&self, chapter: Chapter, book: &Book) -> AppResult<Chapter> {
        if chapter.summary.is_some() {
            return Ok(chapter);
        }

        let _guard = self.in_flight.acquire(chapter.id, Artifact::Summary).await;
        let chapter = self.reload(chapter.id).await?;
        if chapter.summary.is_some() {
            return Ok(chapter);
        }

        let source = self.resolve_source(&chapter, book).await?;
        let mut documents = vec![Document::stored(source, PDF_MIME)];
        if let Some(template) = &self.summary_template {
            documents.push(Document::stored(template.clone(), "text/plain"));
        }

        let summary = self
            .content
            .generate_text(&documents, &summary_instruction(&chapter.title))
            .await?;
        if summary.trim().is_empty() {
            return Err(AppError::Validation("Model returned an empty summary".into()));
        }

        let updated = self
            .catalog
            .set_chapter_summary(chapter.id, summary.trim())
            .await?
            .ok_or(AppError::NotFound("Chapter"))?;

        tracing::info!(chapter_id = %chapter.id, chars = summary.len(), "Generated chapter summary");
        Ok(updated)
    }

    pub async fn summary(&self, chapter_id: Uuid, user_id: Uuid) -> AppResult<Chapter> {
        let ChapterContext { chapter, book, .. } = self.authorize(chapter_id, user_id).await?;
        self.ensure_summary(chapter, &book)
            .await
            .during("generate chapter summary")
    }

    pub async fn podcast(&self, chapter_id: Uuid, user_id: Uuid) -> AppResult<PodcastResponse> {
        let ctx = self.authorize(chapter_id, user_id).await?;
        self.generate_podcast(ctx)
            .await
            .during("generate chapter podcast")
    }

    async fn generate_podcast(&self, ctx: ChapterContext) -> AppResult<PodcastResponse> {
        let ChapterContext {
            user,
            chapter,
            book,
        } = ctx;
        if let Some(podcast_url) = chapter.podcast_url {
            return Ok(PodcastResponse { podcast_url });
        }

        let _guard = self.in_flight.acquire(chapter.id, Artifact::Podcast).await;
        let chapter = self.reload(chapter.id).await?;
        if let Some(podcast_url) = chapter.podcast_url {
            return Ok(PodcastResponse { podcast_url });
        }

        let chapter = self.ensure_summary(chapter, &book).await?;
        let script = podcast_script(&chapter.title, chapter.summary.as_deref().unwrap_or_default());

        let voice = user.voice_preference;
        let audio = self
            .speech
            .synthesize(&script, voice)
            .await
            .failed_to("synthesize podcast audio")?;

        let name = format!(
            "podcasts/{}/{}-{}-podcast.wav",
            book.id,
            chapter.id,
            voice.as_str()
        );
        let object = self
            .store
            .upload(
                &name,
                audio,
                UploadOptions::content_type(WAV_MIME)
                    .tag("chapterId", chapter.id)
                    .tag("bookId", book.id)
                    .tag("type", "podcast"),
            )
            .await
            .failed_to("upload podcast")?;

        let podcast_url = self.store.public_url(&object);
        self.catalog
            .set_chapter_podcast(chapter.id, &podcast_url)
            .await?
            .ok_or(AppError::NotFound("Chapter"))?;

        tracing::info!(chapter_id = %chapter.id, voice = voice.as_str(), "Generated chapter podcast");
        Ok(PodcastResponse { podcast_url })
    }

    pub async fn presentation(&self, chapter_id: Uuid, user_id: Uuid) -> AppResult<PresentationResponse> {
        let ChapterContext { chapter, book, .. } = self.authorize(chapter_id, user_id).await?;
        self.generate_presentation(chapter, &book)
            .await
            .during("generate chapter presentation")
    }

    async fn generate_presentation(&self, chapter: Chapter, book: &Book) -> AppResult<PresentationResponse> {
        if let Some(presentation_url) = chapter.presentation_url {
            return Ok(PresentationResponse { presentation_url });
        }

        let _guard = self.in_flight.acquire(chapter.id, Artifact::Presentation).await;
        let chapter = self.reload(chapter.id).await?;
        if let Some(presentation_url) = chapter.presentation_url {
            return Ok(PresentationResponse { presentation_url });
        }

        let source = self.resolve_source(&chapter, book).await?;
        let slides = self
            .content
            .generate_slides(
                &[Document::stored(source, PDF_MIME)],
                &presentation_instruction(&chapter.title),
            )
            .await?;

        let job_id = self
            .renderer
            .submit(&slides)
            .await
            .failed_to("submit presentation")?;
        let presentation_url = self
            .poller
            .wait(&job_id)
            .await
            .failed_to("render presentation")?;

        self.catalog
            .set_chapter_presentation(chapter.id, &presentation_url)
            .await?
            .ok_or(AppError::NotFound("Chapter"))?;

        tracing::info!(chapter_id = %chapter.id, %job_id, slides = slides.len(), "Generated chapter presentation");
        Ok(PresentationResponse { presentation_url })
    }
}

fn summary_instruction(title: &str) -> String {
    format!(
        r#"Write a detailed, structured summary of this chapter in Markdown.

Chapter title: {title}

The summary should help students understand and remember the chapter's key ideas.

Requirements:
1. Present the main ideas clearly
2. Highlight key points and concepts
3. Organize the text with subheadings
4. Three to five informative paragraphs, more if the material needs it
5. Write in English
6. Use Markdown headers (##, ###), lists (-, 1.), emphasis (**bold**, _italic_), and tables or quotes where they help

Suggested structure:
## Chapter title
### Main Ideas
### Key Concepts
### Examples (if any)
### Conclusion

If a template document is attached, follow its layout."#
    )
}

fn presentation_instruction(title: &str) -> String {
    format!(
        r#"Plan a slide deck that teaches the attached chapter "{title}" to students.

Return a JSON array only, one element per slide, each with these fields:
- "title": slide title
- "layout": one of "items", "timeline", "comparison", "big-number", "table"
- "item_amount": number of items on the slide
- "content_description": what the slide should say

Use between 6 and 12 slides."#
    )
}

fn podcast_script(title: &str, summary_markdown: &str) -> String {
    format!(
        "Welcome to the podcast for chapter \"{title}\".\n\n{}\n\nThat's all for today. Thank you for listening!",
        markdown_to_speech(summary_markdown)
    )
}
