//! Prompts the generative model over stored documents.

use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::constants::MAX_INLINE_DOCUMENT_SIZE;
use crate::gemini::{GenerativeModel, PromptPart};
use crate::services::error::{AppError, AppResult, FailedTo};
use crate::services::json_extract::{extract_json_block, parse_slide_descriptors};
use crate::slides::SlideDescriptor;
use crate::storage::{ObjectRef, ObjectStore};

/// A document attached to a prompt
#[derive(Debug, Clone)]
pub enum Document {
    Stored { object: ObjectRef, mime_type: String },
    Inline { data: Bytes, mime_type: String },
}

impl Document {
    pub fn stored(object: ObjectRef, mime_type: &str) -> Self {
        Document::Stored {
            object,
            mime_type: mime_type.to_string(),
        }
    }
}

pub struct ContentGenerator {
    model: Arc<dyn GenerativeModel>,
    store: Arc<dyn ObjectStore>,
}

impl ContentGenerator {
    pub fn new(model: Arc<dyn GenerativeModel>, store: Arc<dyn ObjectStore>) -> Self {
        Self { model, store }
    }

    async fn prompt(&self, documents: &[Document], instruction: &str) -> AppResult<Vec<PromptPart>> {
        let mut parts = Vec::with_capacity(documents.len() + 1);
        let mut inline_bytes = 0;
        for document in documents {
            let (mime_type, data) = match document {
                Document::Stored { object, mime_type } => (
                    mime_type.clone(),
                    self.store.download(object).await.failed_to("download document")?,
                ),
                Document::Inline { data, mime_type } => (mime_type.clone(), data.clone()),
            };
            inline_bytes += data.len();
            if inline_bytes > MAX_INLINE_DOCUMENT_SIZE {
                return Err(AppError::Validation(format!(
                    "Documents are too large to send to the model ({inline_bytes} bytes)"
                )));
            }
            parts.push(PromptPart::Inline { mime_type, data });
        }
        parts.push(PromptPart::Text(instruction.to_string()));
        Ok(parts)
    }

    /// One model call, returning its raw text.
    pub async fn generate_text(&self, documents: &[Document], instruction: &str) -> AppResult<String> {
        let parts = self.prompt(documents, instruction).await?;
        self.model.generate(parts).await.failed_to("generate content")
    }

    /// One model call whose answer carries a fenced `json` block.
    pub async fn generate_json<T: DeserializeOwned>(
        &self,
        documents: &[Document],
        instruction: &str,
    ) -> AppResult<T> {
        let text = self.generate_text(documents, instruction).await?;
        extract_json_block(&text)
    }

    /// One model call answered with a (possibly fenced) array of slides.
    pub async fn generate_slides(
        &self,
        documents: &[Document],
        instruction: &str,
    ) -> AppResult<Vec<SlideDescriptor>> {
        let text = self.generate_text(documents, instruction).await?;
        parse_slide_descriptors(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeModel, MemoryStore};
    use assert_matches::assert_matches;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_stored_documents_are_sent_inline_before_instruction() {
        let store = Arc::new(MemoryStore::new());
        let object = store.put("books/1.pdf", b"%PDF-1.5 book");
        let model = Arc::new(FakeModel::new(["A summary"]));
        let generator = ContentGenerator::new(model.clone(), store);

        let text = generator
            .generate_text(&[Document::stored(object, "application/pdf")], "Summarize")
            .await
            .unwrap();

        assert_eq!(text, "A summary");
        let prompts = model.prompts();
        assert_eq!(prompts.len(), 1);
        assert_matches!(
            &prompts[0][..],
            [PromptPart::Inline { mime_type, data }, PromptPart::Text(instruction)]
                if mime_type == "application/pdf" && &data[..] == b"%PDF-1.5 book" && instruction == "Summarize"
        );
    }

    #[tokio::test]
    async fn test_missing_document_fails_without_model_call() {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(FakeModel::new(["unused"]));
        let generator = ContentGenerator::new(model.clone(), store);

        let err = generator
            .generate_text(
                &[Document::stored(ObjectRef::new("test", "missing.pdf"), "application/pdf")],
                "Summarize",
            )
            .await
            .unwrap_err();

        assert_matches!(err, AppError::Upstream(ref m) if m.starts_with("Failed to download document"));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_json_without_block_is_validation_error() {
        let model = Arc::new(FakeModel::new(["I could not find a table of contents."]));
        let generator = ContentGenerator::new(model, Arc::new(MemoryStore::new()));

        let result: AppResult<Vec<crate::models::NewChapter>> =
            generator.generate_json(&[], "Find the chapters").await;
        assert_matches!(result, Err(AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_documents_over_inline_limit_never_reach_model() {
        let store = Arc::new(MemoryStore::new());
        let half = vec![b' '; MAX_INLINE_DOCUMENT_SIZE / 2 + 1];
        let object = store.put("books/1/chapters/a.pdf", &half);
        let model = Arc::new(FakeModel::new(["unused"]));
        let generator = ContentGenerator::new(model.clone(), store);

        let err = generator
            .generate_text(
                &[
                    Document::stored(object, "application/pdf"),
                    Document::Inline {
                        data: Bytes::from(half),
                        mime_type: "application/pdf".into(),
                    },
                ],
                "Summarize",
            )
            .await
            .unwrap_err();

        assert_matches!(err, AppError::Validation(ref m) if m.contains("too large"));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }
}
