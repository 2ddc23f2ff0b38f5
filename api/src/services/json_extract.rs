//! Pulling structured JSON out of free-form model output

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::services::error::{AppError, AppResult};
use crate::slides::SlideDescriptor;

static JSON_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").expect("valid regex"));

static OUTER_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^```[A-Za-z]*\s*\n?(.*?)\s*```$").expect("valid regex"));

/// Decode the first fenced block tagged `json`.
pub fn extract_json_block<T: DeserializeOwned>(text: &str) -> AppResult<T> {
    let block = JSON_BLOCK
        .captures(text)
        .and_then(|c| c.get(1))
        .ok_or_else(|| AppError::Validation("Model response contained no JSON block".into()))?;

    serde_json::from_str(block.as_str())
        .map_err(|e| AppError::Validation(format!("Model returned malformed JSON: {e}")))
}

/// Remove one outer triple-backtick fence, with or without a language tag.
pub fn strip_outer_fence(text: &str) -> &str {
    let trimmed = text.trim();
    match OUTER_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => trimmed,
    }
}

#[derive(Deserialize)]
struct RawSlide {
    title: Option<Value>,
    layout: Option<Value>,
    item_amount: Option<Value>,
    content_description: Option<Value>,
}

fn required_text(value: Option<Value>, field: &str, index: usize) -> AppResult<String> {
    let text = match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    if text.is_empty() {
        return Err(AppError::Validation(format!(
            "Slide {} is missing required field {field}",
            index + 1
        )));
    }
    Ok(text)
}

/// Parse the model's slide list. Every element must carry all four fields.
pub fn parse_slide_descriptors(text: &str) -> AppResult<Vec<SlideDescriptor>> {
    let raw: Vec<RawSlide> = serde_json::from_str(strip_outer_fence(text))
        .map_err(|e| AppError::Validation(format!("Slide outline is not a JSON array: {e}")))?;

    if raw.is_empty() {
        return Err(AppError::Validation("Slide outline is empty".into()));
    }

    raw.into_iter()
        .enumerate()
        .map(|(i, slide)| {
            Ok(SlideDescriptor {
                title: required_text(slide.title, "title", i)?,
                layout: required_text(slide.layout, "layout", i)?,
                item_amount: required_text(slide.item_amount, "item_amount", i)?,
                content_description: required_text(
                    slide.content_description,
                    "content_description",
                    i,
                )?,
            })
        })
        .collect()
}
