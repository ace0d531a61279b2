//! Seam to the external text-classification service.
//!
//! The pipeline only ever sees raw response text through [`Classifier`]; decoding
//! and schema validation live here so every implementation gets the same strict
//! checks.

mod http;
pub mod prompts;
pub mod schema;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ClassifyError;

pub use http::HttpClassifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    Classify,
    Filter,
    Theme,
    Sentiment,
}

impl Task {
    pub fn as_str(self) -> &'static str {
        match self {
            Task::Classify => "classify",
            Task::Filter => "filter",
            Task::Theme => "theme",
            Task::Sentiment => "sentiment",
        }
    }
}

/// One call to the service: a task designator, its instructions and the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationRequest {
    pub task: Task,
    pub prompt: String,
    pub payload: Value,
}

impl ClassificationRequest {
    pub fn new(task: Task, payload: Value) -> Self {
        ClassificationRequest {
            task,
            prompt: prompts::for_task(task),
            payload,
        }
    }
}

/// The external classification capability. Implementations return the raw
/// response text; a failed call is [`ClassifyError::Transport`].
#[allow(async_fn_in_trait)]
pub trait Classifier {
    async fn classify(&self, request: &ClassificationRequest) -> Result<String, ClassifyError>;
}

/// Fails every call, so the pipeline runs entirely on its fallbacks.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineClassifier;

impl Classifier for OfflineClassifier {
    async fn classify(&self, request: &ClassificationRequest) -> Result<String, ClassifyError> {
        Err(ClassifyError::Transport(format!(
            "offline mode, {} request not sent",
            request.task.as_str()
        )))
    }
}

/// Strip markdown code fences some services wrap JSON in.
pub fn strip_markdown_json(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let after_open = match trimmed.find('\n') {
        Some(pos) => &trimmed[pos + 1..],
        None => trimmed.trim_start_matches('`'),
    };
    after_open.trim_end().trim_end_matches("```").trim()
}

/// Decodes raw response text into a JSON object.
///
/// Text that is not JSON at all is `MalformedPayload`; valid JSON that is not an
/// object is `InvalidShape`.
pub fn decode_response(raw: &str) -> Result<Map<String, Value>, ClassifyError> {
    let body = strip_markdown_json(raw);
    let value: Value = serde_json::from_str(body).map_err(|e| {
        ClassifyError::MalformedPayload(format!("{e} (first 200 chars: {})", prefix(body, 200)))
    })?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ClassifyError::InvalidShape(format!(
            "expected a JSON object at the top level, got {}",
            json_kind(&other)
        ))),
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub(crate) fn prefix(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
