//! In-memory fakes of the external collaborators, for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use sqlx::error::{DatabaseError, ErrorKind};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use crate::AppState;
use crate::gemini::{GeminiError, GenerativeModel, PromptPart};
use crate::models::{
    AnswerOption, Book, Chapter, ChapterTest, ClassRecord, NewBook, NewChapter, NewTest, Question,
    Role, User, Voice,
};
use crate::services::assessments::TestService;
use crate::services::auth::AuthService;
use crate::services::books::BookService;
use crate::services::catalog::Catalog;
use crate::services::chapters::ChapterService;
use crate::services::classes::ClassService;
use crate::services::content::ContentGenerator;
use crate::services::in_flight::InFlight;
use crate::services::poller::PollConfig;
use crate::slides::{JobStatusReport, SlideDescriptor, SlideRenderer, SlidesError};
use crate::speech::{SpeechError, SpeechSynthesizer};
use crate::storage::{ObjectRef, ObjectStore, StorageError, UploadOptions};

pub const TEST_BUCKET: &str = "test";

/// Model answering from a fixed script, one response per call
pub struct FakeModel {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<Vec<PromptPart>>>,
    pub calls: AtomicUsize,
}

impl FakeModel {
    pub fn new<'a>(responses: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn prompts(&self) -> Vec<Vec<PromptPart>> {
        self.prompts.lock().unwrap().clone()
    }

    /// Text parts of the most recent prompt, joined.
    pub fn last_instruction(&self) -> String {
        self.prompts
            .lock()
            .unwrap()
            .last()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| match p {
                        PromptPart::Text(t) => Some(t.as_str()),
                        PromptPart::Inline { .. } => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl GenerativeModel for FakeModel {
    async fn generate(&self, parts: Vec<PromptPart>) -> Result<String, GeminiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(parts);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(GeminiError::EmptyResponse)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, (Bytes, UploadOptions)>>,
    pub uploads: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, name: &str, data: &[u8]) -> ObjectRef {
        self.objects.lock().unwrap().insert(
            name.to_string(),
            (Bytes::copy_from_slice(data), UploadOptions::default()),
        );
        ObjectRef::new(TEST_BUCKET, name)
    }

    pub fn get(&self, name: &str) -> Option<(Bytes, UploadOptions)> {
        self.objects.lock().unwrap().get(name).cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn upload(
        &self,
        name: &str,
        data: Bytes,
        options: UploadOptions,
    ) -> Result<ObjectRef, StorageError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.objects
            .lock()
            .unwrap()
            .insert(name.to_string(), (data, options));
        Ok(ObjectRef::new(TEST_BUCKET, name))
    }

    async fn download(&self, object: &ObjectRef) -> Result<Bytes, StorageError> {
        self.objects
            .lock()
            .unwrap()
            .get(&object.name)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| StorageError::NotFound(object.to_string()))
    }

    fn public_url(&self, object: &ObjectRef) -> String {
        format!("https://storage.test/{}/{}", object.bucket, object.name)
    }
}

#[derive(Default)]
pub struct FakeSpeech {
    voices: Mutex<Vec<Voice>>,
    scripts: Mutex<Vec<String>>,
    pub calls: AtomicUsize,
}

impl FakeSpeech {
    pub fn voices(&self) -> Vec<Voice> {
        self.voices.lock().unwrap().clone()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.scripts.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSpeech {
    async fn synthesize(&self, text: &str, voice: Voice) -> Result<Bytes, SpeechError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.voices.lock().unwrap().push(voice);
        self.scripts.lock().unwrap().push(text.to_string());
        Ok(Bytes::from_static(b"RIFF\0\0\0\0WAVE"))
    }
}

/// Renderer replaying a scripted sequence of status answers.
///
/// `Err` entries become transient query failures. Once the script runs out
/// every status query answers `PENDING`.
pub struct ScriptedRenderer {
    script: Mutex<VecDeque<Result<JobStatusReport, String>>>,
    submitted: Mutex<Vec<Vec<SlideDescriptor>>>,
    pub submits: AtomicUsize,
    pub queries: AtomicUsize,
}

impl ScriptedRenderer {
    pub fn new(script: Vec<Result<JobStatusReport, String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            submitted: Mutex::new(Vec::new()),
            submits: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn submitted(&self) -> Vec<Vec<SlideDescriptor>> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl SlideRenderer for ScriptedRenderer {
    async fn submit(&self, slides: &[SlideDescriptor]) -> Result<String, SlidesError> {
        let n = self.submits.fetch_add(1, Ordering::SeqCst) + 1;
        self.submitted.lock().unwrap().push(slides.to_vec());
        Ok(format!("job-{n}"))
    }

    async fn status(&self, _job_id: &str) -> Result<JobStatusReport, SlidesError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(report)) => Ok(report),
            Some(Err(body)) => Err(SlidesError::Api { status: 503, body }),
            None => Ok(JobStatusReport::pending()),
        }
    }
}

/// What Postgres reports for a duplicate key
#[derive(Debug)]
struct UniqueViolation;

impl std::fmt::Display for UniqueViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("duplicate key value violates unique constraint")
    }
}

impl std::error::Error for UniqueViolation {}

impl DatabaseError for UniqueViolation {
    fn message(&self) -> &str {
        "duplicate key value violates unique constraint"
    }

    fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self
    }

    fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
        self
    }

    fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
        self
    }

    fn kind(&self) -> ErrorKind {
        ErrorKind::UniqueViolation
    }
}

#[derive(Default)]
struct CatalogState {
    users: HashMap<Uuid, User>,
    classes: HashMap<Uuid, ClassRecord>,
    books: HashMap<Uuid, Book>,
    chapters: HashMap<Uuid, Chapter>,
    tests: HashMap<Uuid, ChapterTest>,
}

/// In-memory records, counting every chapter or test write
#[derive(Default)]
pub struct MemoryCatalog {
    state: Mutex<CatalogState>,
    pub writes: AtomicUsize,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, role: Role, class_id: Option<Uuid>) -> User {
        let id = Uuid::new_v4();
        let user = User {
            id,
            email: format!("{id}@school.test"),
            password_hash: String::new(),
            first_name: Some("Ada".into()),
            last_name: Some("Lovelace".into()),
            role,
            class_id,
            voice_preference: Voice::default(),
            created_at: Utc::now(),
        };
        self.state.lock().unwrap().users.insert(id, user.clone());
        user
    }

    pub fn set_voice(&self, user_id: Uuid, voice: Voice) {
        if let Some(user) = self.state.lock().unwrap().users.get_mut(&user_id) {
            user.voice_preference = voice;
        }
    }

    pub fn add_class(&self, teacher_id: Uuid) -> ClassRecord {
        let class = ClassRecord {
            id: Uuid::new_v4(),
            name: "Biology".into(),
            description: None,
            code: "ABCDEFGHIJKLMNOPQRST".into(),
            teacher_id,
            created_at: Utc::now(),
        };
        self.state.lock().unwrap().classes.insert(class.id, class.clone());
        class
    }

    pub fn add_book(&self, class_id: Uuid, uploader_id: Uuid, file_uri: &str) -> Book {
        let book = Book {
            id: Uuid::new_v4(),
            title: "Life Science".into(),
            file_uri: file_uri.to_string(),
            content_hash: String::new(),
            class_id,
            uploader_id,
            created_at: Utc::now(),
        };
        self.state.lock().unwrap().books.insert(book.id, book.clone());
        book
    }

    pub fn add_chapter(&self, book_id: Uuid, start_page: i32, end_page: i32) -> Chapter {
        let chapter = new_chapter_row(
            book_id,
            &NewChapter {
                title: "Cells".into(),
                start_page,
                end_page,
            },
        );
        self.state.lock().unwrap().chapters.insert(chapter.id, chapter.clone());
        chapter
    }

    pub fn update_chapter(&self, chapter_id: Uuid, update: impl FnOnce(&mut Chapter)) {
        if let Some(chapter) = self.state.lock().unwrap().chapters.get_mut(&chapter_id) {
            update(chapter);
        }
    }

    pub fn book_count(&self) -> usize {
        self.state.lock().unwrap().books.len()
    }

    pub fn chapter(&self, chapter_id: Uuid) -> Chapter {
        self.state.lock().unwrap().chapters[&chapter_id].clone()
    }

    fn set_field(&self, chapter_id: Uuid, set: impl FnOnce(&mut Chapter)) -> Option<Chapter> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let chapter = state.chapters.get_mut(&chapter_id)?;
        set(chapter);
        Some(chapter.clone())
    }
}

fn new_chapter_row(book_id: Uuid, chapter: &NewChapter) -> Chapter {
    Chapter {
        id: Uuid::new_v4(),
        book_id,
        title: chapter.title.clone(),
        start_page: chapter.start_page,
        end_page: chapter.end_page,
        file_uri: None,
        summary: None,
        podcast_url: None,
        presentation_url: None,
        created_at: Utc::now(),
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        Ok(self.state.lock().unwrap().users.get(&user_id).cloned())
    }

    async fn find_class(&self, class_id: Uuid) -> Result<Option<ClassRecord>, sqlx::Error> {
        Ok(self.state.lock().unwrap().classes.get(&class_id).cloned())
    }

    async fn find_book(&self, book_id: Uuid) -> Result<Option<Book>, sqlx::Error> {
        Ok(self.state.lock().unwrap().books.get(&book_id).cloned())
    }

    async fn find_book_by_hash(&self, class_id: Uuid, content_hash: &str) -> Result<Option<Book>, sqlx::Error> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .books
            .values()
            .find(|b| b.class_id == class_id && b.content_hash == content_hash)
            .cloned())
    }

    async fn create_book(&self, book: NewBook, chapters: Vec<NewChapter>) -> Result<(Book, Vec<Chapter>), sqlx::Error> {
        let book = Book {
            id: Uuid::new_v4(),
            title: book.title,
            file_uri: book.file_uri,
            content_hash: book.content_hash,
            class_id: book.class_id,
            uploader_id: book.uploader_id,
            created_at: Utc::now(),
        };
        let chapters: Vec<Chapter> = chapters.iter().map(|c| new_chapter_row(book.id, c)).collect();

        let mut state = self.state.lock().unwrap();
        if state
            .books
            .values()
            .any(|b| b.class_id == book.class_id && b.content_hash == book.content_hash)
        {
            return Err(sqlx::Error::Database(Box::new(UniqueViolation)));
        }
        state.books.insert(book.id, book.clone());
        for chapter in &chapters {
            state.chapters.insert(chapter.id, chapter.clone());
        }
        Ok((book, chapters))
    }

    async fn list_chapters(&self, book_id: Uuid) -> Result<Vec<Chapter>, sqlx::Error> {
        let mut chapters: Vec<Chapter> = self
            .state
            .lock()
            .unwrap()
            .chapters
            .values()
            .filter(|c| c.book_id == book_id)
            .cloned()
            .collect();
        chapters.sort_by_key(|c| c.start_page);
        Ok(chapters)
    }

    async fn find_chapter(&self, chapter_id: Uuid) -> Result<Option<Chapter>, sqlx::Error> {
        Ok(self.state.lock().unwrap().chapters.get(&chapter_id).cloned())
    }

    async fn set_chapter_file(&self, chapter_id: Uuid, uri: &str) -> Result<Option<Chapter>, sqlx::Error> {
        Ok(self.set_field(chapter_id, |c| c.file_uri = Some(uri.to_string())))
    }

    async fn set_chapter_summary(&self, chapter_id: Uuid, summary: &str) -> Result<Option<Chapter>, sqlx::Error> {
        Ok(self.set_field(chapter_id, |c| c.summary = Some(summary.to_string())))
    }

    async fn set_chapter_podcast(&self, chapter_id: Uuid, url: &str) -> Result<Option<Chapter>, sqlx::Error> {
        Ok(self.set_field(chapter_id, |c| c.podcast_url = Some(url.to_string())))
    }

    async fn set_chapter_presentation(&self, chapter_id: Uuid, url: &str) -> Result<Option<Chapter>, sqlx::Error> {
        Ok(self.set_field(chapter_id, |c| c.presentation_url = Some(url.to_string())))
    }

    async fn find_test(&self, chapter_id: Uuid) -> Result<Option<ChapterTest>, sqlx::Error> {
        Ok(self.state.lock().unwrap().tests.get(&chapter_id).cloned())
    }

    async fn create_test(&self, chapter_id: Uuid, test: NewTest) -> Result<ChapterTest, sqlx::Error> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let created = ChapterTest {
            id: Uuid::new_v4(),
            chapter_id,
            title: test.title,
            description: test.description,
            questions: test
                .questions
                .into_iter()
                .map(|q| Question {
                    id: Uuid::new_v4(),
                    question_text: q.question_text,
                    options: q
                        .options
                        .into_iter()
                        .map(|o| AnswerOption {
                            id: Uuid::new_v4(),
                            option_text: o.option_text,
                            is_correct: o.is_correct,
                        })
                        .collect(),
                })
                .collect(),
            created_at: Utc::now(),
        };
        self.state.lock().unwrap().tests.insert(chapter_id, created.clone());
        Ok(created)
    }
}

/// Application state over the in-memory fakes. The pool never connects, so
/// only handlers that stay on the catalog can be exercised with it.
pub fn app_state(
    catalog: Arc<MemoryCatalog>,
    store: Arc<MemoryStore>,
    model: Arc<FakeModel>,
) -> Arc<AppState> {
    let db = PgPoolOptions::new()
        .connect_lazy("postgres://localhost/unused")
        .expect("lazy pool");
    let content = Arc::new(ContentGenerator::new(model, store.clone()));
    let in_flight = Arc::new(InFlight::new());
    let chapters = Arc::new(ChapterService::new(
        catalog.clone(),
        store.clone(),
        content.clone(),
        Arc::new(FakeSpeech::default()),
        Arc::new(ScriptedRenderer::new(Vec::new())),
        PollConfig::default(),
        in_flight.clone(),
        None,
    ));

    Arc::new(AppState {
        auth: AuthService::new(db.clone(), b"test-secret".to_vec()),
        classes: ClassService::new(db.clone()),
        books: BookService::new(catalog.clone(), store, content.clone()),
        tests: TestService::new(catalog, chapters.clone(), content, in_flight),
        chapters,
        db,
    })
}
