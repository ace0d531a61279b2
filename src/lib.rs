//! Survey feedback analysis.
//!
//! Tabular survey exports are ingested into per-group records, merged, summarised
//! lexically, and then run through a staged classification pipeline
//! (`Initial -> Refined / Themed`) backed by an external text-classification
//! service. Every stage has a deterministic fallback, so a run always yields a
//! report.

pub mod aggregate;
pub mod classify;
pub mod config;
pub mod error;
pub mod export;
pub mod ingest;
pub mod lexical;
pub mod model;
pub mod pipeline;

pub use aggregate::{aggregate, aggregate_outcomes, all_comments, ensure_usable};
pub use classify::{
    ClassificationRequest, Classifier, HttpClassifier, OfflineClassifier, Task, decode_response,
    strip_markdown_json,
};
pub use config::{ClassifierConfig, ColumnSpec, PipelineOptions};
pub use error::{ClassifyError, FeedbackError, IngestIssue, Result, Stage, Warning};
pub use export::{
    ExportFormat, ReportDocument, csv_safe_cell, export, export_session, render, save_report,
};
pub use ingest::{
    IngestOutcome, collect_files, group_key_from_name, ingest_file, ingest_files, ingest_str,
};
pub use lexical::{load_stopwords, summarize, tokenize};
pub use model::{
    AnalysisState, CommentView, FrequencyEntry, GroupKey, GroupMap, GroupRecord, OutcomeRow,
    Partition, Sentiment, Theme, ThemeMap, ViewMode,
};
pub use pipeline::{AnalysisOrchestrator, AnalysisSession};

/// Prints warnings to stderr, one per line.
pub fn print_warnings(warnings: &[Warning]) {
    if warnings.is_empty() {
        return;
    }
    eprintln!("\nWarnings:");
    for w in warnings {
        eprintln!("  {w}");
    }
}
