use std::collections::HashSet;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TOP_N: usize = 30;

/// Anchor header names, matched case-insensitively against normalised headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub identifier: String,
    pub timing: String,
    pub feedback: String,
}

impl Default for ColumnSpec {
    fn default() -> Self {
        ColumnSpec {
            identifier: "ID".to_string(),
            timing: "Timing".to_string(),
            feedback: "Feedback".to_string(),
        }
    }
}

/// Connection settings for the HTTP classification service.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Size of the frequency table sent for sentiment labelling.
    pub top_n: usize,
    /// Stop words merged with the built-in list.
    pub extra_stopwords: HashSet<String>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            top_n: DEFAULT_TOP_N,
            extra_stopwords: HashSet::new(),
        }
    }
}
