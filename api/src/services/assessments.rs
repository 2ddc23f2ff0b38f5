//! Multiple-choice tests generated from a chapter's summary

use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use crate::constants::{DEFAULT_QUESTION_COUNT, MAX_QUESTION_COUNT};
use crate::models::{Book, Chapter, ChapterTest, NewQuestion, NewTest};
use crate::services::catalog::Catalog;
use crate::services::chapters::{ChapterContext, ChapterService};
use crate::services::content::ContentGenerator;
use crate::services::error::{AppError, AppResult, During};
use crate::services::in_flight::{Artifact, InFlight};
use crate::services::speech_text::markdown_to_speech;

/// Optional overrides for a generated test
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestOptions {
    pub title: Option<String>,
    pub description: Option<String>,
    pub number_of_questions: Option<u32>,
}

#[derive(Deserialize)]
struct GeneratedTest {
    questions: Vec<NewQuestion>,
}

pub struct TestService {
    catalog: Arc<dyn Catalog>,
    chapters: Arc<ChapterService>,
    content: Arc<ContentGenerator>,
    in_flight: Arc<InFlight>,
}

impl TestService {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        chapters: Arc<ChapterService>,
        content: Arc<ContentGenerator>,
        in_flight: Arc<InFlight>,
    ) -> Self {
        Self {
            catalog,
            chapters,
            content,
            in_flight,
        }
    }

    /// Return the chapter's test, generating it on first request.
    pub async fn generate(&self, chapter_id: Uuid, user_id: Uuid, options: TestOptions) -> AppResult<ChapterTest> {
        let ChapterContext { chapter, book, .. } = self.chapters.authorize(chapter_id, user_id).await?;
        self.generate_for(chapter, &book, options)
            .await
            .during("generate chapter test")
    }

    pub async fn get(&self, chapter_id: Uuid, user_id: Uuid) -> AppResult<ChapterTest> {
        self.generate(chapter_id, user_id, TestOptions::default()).await
    }

    async fn generate_for(&self, chapter: Chapter, book: &Book, options: TestOptions) -> AppResult<ChapterTest> {
        if let Some(test) = self.catalog.find_test(chapter.id).await? {
            return Ok(test);
        }

        let count = options.number_of_questions.unwrap_or(DEFAULT_QUESTION_COUNT);
        if count == 0 || count > MAX_QUESTION_COUNT {
            return Err(AppError::Validation(format!(
                "numberOfQuestions must be between 1 and {MAX_QUESTION_COUNT}"
            )));
        }

        let _guard = self.in_flight.acquire(chapter.id, Artifact::Test).await;
        if let Some(test) = self.catalog.find_test(chapter.id).await? {
            return Ok(test);
        }

        let chapter = self.chapters.ensure_summary(chapter, book).await?;
        let content = markdown_to_speech(chapter.summary.as_deref().unwrap_or_default());

        let generated: GeneratedTest = self
            .content
            .generate_json(&[], &test_instruction(&chapter.title, &content, count))
            .await?;
        validate_questions(&generated.questions)?;

        let test = NewTest {
            title: options
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| format!("Test for Chapter: {}", chapter.title)),
            description: Some(
                options
                    .description
                    .unwrap_or_else(|| "Multiple choice test based on chapter content".to_string()),
            ),
            questions: generated.questions,
        };

        let created = self.catalog.create_test(chapter.id, test).await?;
        tracing::info!(chapter_id = %chapter.id, questions = created.questions.len(), "Generated chapter test");
        Ok(created)
    }
}

fn validate_questions(questions: &[NewQuestion]) -> AppResult<()> {
    if questions.is_empty() {
        return Err(AppError::Validation("Model returned no questions".into()));
    }
    for (i, question) in questions.iter().enumerate() {
        let n = i + 1;
        if question.question_text.trim().is_empty() {
            return Err(AppError::Validation(format!("Question {n} has no text")));
        }
        if question.options.len() < 2 {
            return Err(AppError::Validation(format!("Question {n} has fewer than 2 options")));
        }
        if question.options.iter().any(|o| o.option_text.trim().is_empty()) {
            return Err(AppError::Validation(format!("Question {n} has an empty option")));
        }
        let correct = question.options.iter().filter(|o| o.is_correct).count();
        if correct != 1 {
            return Err(AppError::Validation(format!(
                "Question {n} must have exactly one correct option, found {correct}"
            )));
        }
    }
    Ok(())
}

fn test_instruction(title: &str, content: &str, count: u32) -> String {
    format!(
        r#"Write a multiple choice test based on this chapter.

Chapter title: {title}
Chapter content: {content}

Requirements:
1. Exactly {count} questions
2. Exactly 4 options per question
3. Exactly one correct option per question
4. Questions should check understanding of the key concepts
5. Write in English

Answer with a single ```json fenced block shaped like:
{{
  "questions": [
    {{
      "questionText": "Question text?",
      "options": [
        {{"optionText": "Option A", "isCorrect": true}},
        {{"optionText": "Option B", "isCorrect": false}},
        {{"optionText": "Option C", "isCorrect": false}},
        {{"optionText": "Option D", "isCorrect": false}}
      ]
    }}
  ]
}}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Role, User};
    use crate::services::pdf::tests::sample_pdf;
    use crate::services::poller::PollConfig;
    use crate::testing::{FakeModel, FakeSpeech, MemoryCatalog, MemoryStore, ScriptedRenderer};
    use assert_matches::assert_matches;
    use std::sync::atomic::Ordering;

    const TEST_JSON: &str = r#"Here you go:
```json
{
  "questions": [
    {
      "questionText": "What is the basic unit of life?",
      "options": [
        {"optionText": "Cell", "isCorrect": true},
        {"optionText": "Atom", "isCorrect": false},
        {"optionText": "Organ", "isCorrect": false},
        {"optionText": "Tissue", "isCorrect": false}
      ]
    }
  ]
}
```"#;

    struct Fixture {
        catalog: Arc<MemoryCatalog>,
        model: Arc<FakeModel>,
        service: TestService,
        student: User,
        chapter: Chapter,
    }

    fn fixture(responses: &[&str]) -> Fixture {
        let catalog = Arc::new(MemoryCatalog::new());
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(FakeModel::new(responses.iter().copied()));
        let content = Arc::new(ContentGenerator::new(model.clone(), store.clone()));
        let in_flight = Arc::new(InFlight::new());

        let teacher = catalog.add_user(Role::Teacher, None);
        let class = catalog.add_class(teacher.id);
        let student = catalog.add_user(Role::Student, Some(class.id));
        let book_object = store.put("books/source.pdf", &sample_pdf(4));
        let book = catalog.add_book(class.id, teacher.id, &book_object.uri());
        let chapter = catalog.add_chapter(book.id, 1, 2);

        let chapters = Arc::new(ChapterService::new(
            catalog.clone(),
            store,
            content.clone(),
            Arc::new(FakeSpeech::default()),
            Arc::new(ScriptedRenderer::new(Vec::new())),
            PollConfig::default(),
            in_flight.clone(),
            None,
        ));

        Fixture {
            service: TestService::new(catalog.clone(), chapters, content, in_flight),
            catalog,
            model,
            student,
            chapter,
        }
    }

    #[tokio::test]
    async fn test_generates_summary_first_then_test_once() {
        let f = fixture(&["## Cells\nThe **cell** is the unit of life.", TEST_JSON]);

        let options = TestOptions {
            number_of_questions: Some(1),
            ..Default::default()
        };
        let test = f.service.generate(f.chapter.id, f.student.id, options).await.unwrap();

        assert_eq!(test.title, "Test for Chapter: Cells");
        assert_eq!(test.questions.len(), 1);
        assert_eq!(test.questions[0].options.len(), 4);
        assert!(test.questions[0].options[0].is_correct);

        let instruction = f.model.last_instruction();
        assert!(instruction.contains("Exactly 1 questions"));
        assert!(instruction.contains("Chapter content: Cells.\nThe cell is the unit of life."));
        assert!(f.catalog.chapter(f.chapter.id).summary.is_some());

        let again = f.service.get(f.chapter.id, f.student.id).await.unwrap();
        assert_eq!(again.id, test.id);
        assert_eq!(f.model.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_custom_title_is_kept() {
        let f = fixture(&[TEST_JSON]);
        f.catalog
            .update_chapter(f.chapter.id, |c| c.summary = Some("Cells.".into()));

        let options = TestOptions {
            title: Some("Unit 1 quiz".into()),
            ..Default::default()
        };
        let test = f.service.generate(f.chapter.id, f.student.id, options).await.unwrap();
        assert_eq!(test.title, "Unit 1 quiz");
        assert_eq!(f.model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_two_correct_options_rejected_and_nothing_persisted() {
        let broken = TEST_JSON.replace(r#""Atom", "isCorrect": false"#, r#""Atom", "isCorrect": true"#);
        let f = fixture(&[broken.as_str()]);
        f.catalog
            .update_chapter(f.chapter.id, |c| c.summary = Some("Cells.".into()));

        let err = f.service.get(f.chapter.id, f.student.id).await.unwrap_err();
        assert_matches!(err, AppError::Validation(ref m) if m.contains("exactly one correct option"));
        assert!(f.catalog.find_test(f.chapter.id).await.unwrap().is_none());
        assert_eq!(f.catalog.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_question_count_bounds() {
        let f = fixture(&[]);
        let options = TestOptions {
            number_of_questions: Some(0),
            ..Default::default()
        };
        assert_matches!(
            f.service.generate(f.chapter.id, f.student.id, options).await,
            Err(AppError::Validation(_))
        );
        assert_eq!(f.model.calls.load(Ordering::SeqCst), 0);
    }
}
