use log::{debug, error};
use reqwest::Client;
use serde_json::{Value, json};

use super::{ClassificationRequest, Classifier, prefix};
use crate::config::ClassifierConfig;
use crate::error::{ClassifyError, FeedbackError};

const SYSTEM_PROMPT: &str = "You are a survey feedback analysis assistant. \
Always respond with valid JSON only, no markdown formatting or code blocks.";

/// Classifier backed by an OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct HttpClassifier {
    client: Client,
    config: ClassifierConfig,
}

impl HttpClassifier {
    pub fn new(config: ClassifierConfig) -> Result<Self, FeedbackError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FeedbackError::HttpClient(e.to_string()))?;
        Ok(HttpClassifier { client, config })
    }

    fn request_body(&self, request: &ClassificationRequest) -> Value {
        let user = format!("{}\n\nINPUT:\n{}", request.prompt, request.payload);
        json!({
            "model": self.config.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": user}
            ],
            "response_format": {"type": "json_object"}
        })
    }
}

/// Pulls `choices[0].message.content` out of a chat-completions response.
fn extract_content(body: &str) -> Result<String, ClassifyError> {
    let wrapper: Value = serde_json::from_str(body).map_err(|e| {
        ClassifyError::Transport(format!("service response wrapper unreadable: {e}"))
    })?;
    wrapper["choices"][0]["message"]["content"]
        .as_str()
        .map(String::from)
        .ok_or_else(|| ClassifyError::Transport("no content in service response".to_string()))
}

impl Classifier for HttpClassifier {
    async fn classify(&self, request: &ClassificationRequest) -> Result<String, ClassifyError> {
        let task = request.task.as_str();
        debug!("sending {} request to {}", task, self.config.endpoint);

        let mut builder = self
            .client
            .post(&self.config.endpoint)
            .json(&self.request_body(request));
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            let msg = if e.is_timeout() {
                format!("{task} request timed out after {:?}", self.config.timeout)
            } else {
                format!("{task} request failed: {e}")
            };
            error!("{}", msg);
            ClassifyError::Transport(msg)
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ClassifyError::Transport(format!("{task} response body unreadable: {e}")))?;
        if !status.is_success() {
            let msg = format!("{task} request returned {status}: {}", prefix(&body, 512));
            error!("{}", msg);
            return Err(ClassifyError::Transport(msg));
        }

        extract_content(&body)
    }
}
