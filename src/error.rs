use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::GroupKey;

/// Conditions that abort a run.
#[derive(Error, Debug)]
pub enum FeedbackError {
    #[error("no usable data: every file was ingested but no comments, timing counts or outcome responses were found")]
    NoUsableData,

    #[error("precondition violated: {0}")]
    PreconditionViolation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP client build failed: {0}")]
    HttpClient(String),
}

pub type Result<T, E = FeedbackError> = std::result::Result<T, E>;

/// Per-file ingestion problems. These never abort a run; they become warnings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestIssue {
    #[error("file unreadable: {0}")]
    FileUnreadable(String),

    #[error("file could not be parsed: {0}")]
    Unparseable(String),

    #[error("missing '{header}' column; {skipped} skipped")]
    HeaderMissing {
        header: String,
        skipped: &'static str,
    },

    #[error("'{header}' column appears {count} times; {skipped} skipped")]
    DuplicateHeader {
        header: String,
        count: usize,
        skipped: &'static str,
    },
}

/// Failure kinds of a call to the classification capability. All three are
/// resolved into fallbacks by the pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    /// Parsed as structured data but did not match the stage schema.
    #[error("invalid response shape: {0}")]
    InvalidShape(String),

    /// The call itself failed (timeout, non-success status, offline).
    #[error("transport or service failure: {0}")]
    Transport(String),

    /// The response body could not be parsed as structured data at all.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Ingest,
    Classify,
    Sentiment,
    Filter,
    Theme,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::Classify => "classify",
            Stage::Sentiment => "sentiment",
            Stage::Filter => "filter",
            Stage::Theme => "theme",
        }
    }
}

/// Human-readable, non-fatal problem recorded during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub stage: Stage,
    pub group: Option<GroupKey>,
    pub message: String,
}

impl Warning {
    pub fn new(stage: Stage, group: Option<GroupKey>, message: impl Into<String>) -> Self {
        let warning = Warning {
            stage,
            group,
            message: message.into(),
        };
        log::warn!("{}", warning);
        warning
    }

    pub fn ingest(source: &str, issue: &IngestIssue) -> Self {
        Warning::new(Stage::Ingest, None, format!("{source}: {issue}"))
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.group {
            Some(group) => write!(f, "[{}] {}: {}", self.stage.as_str(), group, self.message),
            None => write!(f, "[{}] {}", self.stage.as_str(), self.message),
        }
    }
}
