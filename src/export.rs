use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::SecondsFormat;
use chrono::prelude::*;
use clap::ValueEnum;
use csv::WriterBuilder;
use serde::Serialize;

use crate::error::{FeedbackError, Result};
use crate::model::{
    AnalysisState, CommentView, FrequencyEntry, GroupKey, GroupMap, MISCELLANEOUS, OutcomeRow,
    TIMING_CATEGORIES, Theme, ViewMode,
};
use crate::pipeline::AnalysisSession;

pub const NONE_PLACEHOLDER: &str = "(none)";
pub const NO_THEMES_PLACEHOLDER: &str = "No comments survived filtering.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Txt,
    Csv,
    Tsv,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Txt => "txt",
            ExportFormat::Csv => "csv",
            ExportFormat::Tsv => "tsv",
            ExportFormat::Json => "json",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountLine {
    pub label: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum SectionComments {
    Partition {
        positive: Vec<String>,
        critical: Vec<String>,
    },
    Themes {
        themes: Vec<Theme>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSection {
    pub group: GroupKey,
    pub timing: Vec<CountLine>,
    pub outcomes: Vec<OutcomeRow>,
    pub summary: Option<String>,
    pub comments: SectionComments,
}

/// Export document for one view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDocument {
    pub view: ViewMode,
    pub generated_at: String,
    pub sections: Vec<GroupSection>,
    pub frequency: Vec<FrequencyEntry>,
    pub warnings: Vec<String>,
}

fn timing_lines(state: &AnalysisState) -> Vec<CountLine> {
    let counts = &state.categorical_counts;
    let known = TIMING_CATEGORIES.iter().map(|c| c.to_string());
    let others = counts
        .keys()
        .filter(|k| !TIMING_CATEGORIES.contains(&k.as_str()))
        .cloned();
    let lines: Vec<CountLine> = known
        .chain(others)
        .map(|label| CountLine {
            count: counts.get(&label).copied().unwrap_or(0),
            label,
        })
        .collect();
    if lines.iter().all(|l| l.count == 0) {
        return Vec::new();
    }
    lines
}

fn outcome_rows(state: &AnalysisState) -> Vec<OutcomeRow> {
    state
        .outcome_table
        .iter()
        .filter(|r| r.total() > 0)
        .map(|r| OutcomeRow {
            outcome_label: r.outcome_label.clone(),
            response_counts: r
                .response_counts
                .iter()
                .filter(|(_, c)| **c > 0)
                .map(|(k, c)| (k.clone(), *c))
                .collect(),
        })
        .collect()
}

fn section_comments(view: &CommentView) -> SectionComments {
    match view {
        CommentView::Initial(p) | CommentView::Refined(p) => SectionComments::Partition {
            positive: p.positive_comments.clone(),
            critical: p.critical_comments.clone(),
        },
        CommentView::Themed { themes } => {
            let mut themes: Vec<Theme> = themes.themes().to_vec();
            themes.sort_by_key(|t| (t.title == MISCELLANEOUS, t.title.to_lowercase()));
            SectionComments::Themes { themes }
        }
    }
}

/// Builds the export document: one section per group in report order (numbered
/// groups ascending, others alphabetically after), then the frequency table.
/// Every state must have the shape of `view`; inputs are only read.
pub fn export(
    states: &GroupMap<AnalysisState>,
    view: ViewMode,
    frequency: &[FrequencyEntry],
) -> Result<ReportDocument> {
    if let Some((key, state)) = states.iter().find(|(_, s)| s.comments.mode() != view) {
        return Err(FeedbackError::PreconditionViolation(format!(
            "cannot export the {view} view: {key} holds {} comments",
            state.comments.mode()
        )));
    }
    let mut keys: Vec<&GroupKey> = states.keys().collect();
    keys.sort();

    let sections = keys
        .into_iter()
        .map(|key| {
            let state = &states[key];
            GroupSection {
                group: key.clone(),
                timing: timing_lines(state),
                outcomes: outcome_rows(state),
                summary: state.summary.clone(),
                comments: section_comments(&state.comments),
            }
        })
        .collect();

    Ok(ReportDocument {
        view,
        generated_at: Local::now().to_rfc3339_opts(SecondsFormat::Secs, false),
        sections,
        frequency: frequency.to_vec(),
        warnings: Vec::new(),
    })
}

/// Exports the session's current view, with the session's warnings attached.
pub fn export_session(session: &AnalysisSession) -> Result<ReportDocument> {
    let (view, states) = session.current().ok_or_else(|| {
        FeedbackError::PreconditionViolation("no analysis view has been computed".to_string())
    })?;
    let mut doc = export(states, view, session.frequency())?;
    doc.warnings = session.warnings().iter().map(|w| w.to_string()).collect();
    Ok(doc)
}

fn push_list(out: &mut String, items: &[String], placeholder: &str) {
    if items.is_empty() {
        out.push_str(&format!("- {placeholder}\n"));
    }
    for item in items {
        out.push_str(&format!("- {item}\n"));
    }
}

///Renders the document as markdown-style text.
pub fn render_text(doc: &ReportDocument) -> String {
    let mut out = format!("# Feedback report ({} view)\n\nGenerated: {}\n", doc.view, doc.generated_at);

    for section in &doc.sections {
        out.push_str(&format!("\n## {}\n", section.group));

        if !section.timing.is_empty() {
            out.push_str("\n### Timing\n");
            for line in &section.timing {
                out.push_str(&format!("- {}: {}\n", line.label, line.count));
            }
        }

        if !section.outcomes.is_empty() {
            out.push_str("\n### Outcomes\n");
            for row in &section.outcomes {
                out.push_str(&format!("\n#### {}\n", row.outcome_label));
                for (response, count) in &row.response_counts {
                    out.push_str(&format!("- {response}: {count}\n"));
                }
            }
        }

        if let Some(summary) = &section.summary {
            out.push_str(&format!("\n### Summary\n{summary}\n"));
        }

        match &section.comments {
            SectionComments::Partition { positive, critical } => {
                out.push_str("\n### Positive\n");
                push_list(&mut out, positive, NONE_PLACEHOLDER);
                out.push_str("\n### Critical\n");
                push_list(&mut out, critical, NONE_PLACEHOLDER);
            }
            SectionComments::Themes { themes } if themes.is_empty() => {
                out.push_str(&format!("\n{NO_THEMES_PLACEHOLDER}\n"));
            }
            SectionComments::Themes { themes } => {
                for theme in themes {
                    out.push_str(&format!("\n### {}\n", theme.title));
                    push_list(&mut out, &theme.comments, NONE_PLACEHOLDER);
                }
            }
        }
    }

    if !doc.frequency.is_empty() {
        out.push_str("\n## Word frequency\n");
        for entry in &doc.frequency {
            let sentiment = entry.sentiment.map(|s| s.as_str()).unwrap_or("unlabelled");
            out.push_str(&format!("- {}: {} ({})\n", entry.word, entry.count, sentiment));
        }
    }

    if !doc.warnings.is_empty() {
        out.push_str("\n## Warnings\n");
        for w in &doc.warnings {
            out.push_str(&format!("- {w}\n"));
        }
    }
    out
}

///Neutralises spreadsheet formula injection: a cell starting with `=`, `+`, `-`,
///`@`, tab or carriage return gets a leading `'`. Cells already starting with `'`
///are returned unchanged.
/// # Example
/// ```
/// use feedback_analysis::csv_safe_cell;
/// assert_eq!(csv_safe_cell("=SUM(A1)".to_string()), "'=SUM(A1)");
/// assert_eq!(csv_safe_cell("plain".to_string()), "plain");
/// ```
pub fn csv_safe_cell(cell: String) -> String {
    match cell.chars().next() {
        Some('=' | '+' | '-' | '@' | '\t' | '\r') => format!("'{cell}"),
        _ => cell,
    }
}

fn delimited_rows(doc: &ReportDocument) -> Vec<[String; 5]> {
    let row = |group: &str, section: &str, label: &str, value: &str, count: String| {
        [group.to_string(), section.to_string(), label.to_string(), value.to_string(), count]
    };
    let mut rows = Vec::new();
    for s in &doc.sections {
        let g = s.group.as_str();
        for line in &s.timing {
            rows.push(row(g, "timing", &line.label, "", line.count.to_string()));
        }
        for o in &s.outcomes {
            for (response, count) in &o.response_counts {
                rows.push(row(g, "outcome", &o.outcome_label, response, count.to_string()));
            }
        }
        if let Some(summary) = &s.summary {
            rows.push(row(g, "summary", "", summary, String::new()));
        }
        match &s.comments {
            SectionComments::Partition { positive, critical } => {
                for (name, list) in [("positive", positive), ("critical", critical)] {
                    if list.is_empty() {
                        rows.push(row(g, name, "", NONE_PLACEHOLDER, String::new()));
                    }
                    for c in list {
                        rows.push(row(g, name, "", c, String::new()));
                    }
                }
            }
            SectionComments::Themes { themes } if themes.is_empty() => {
                rows.push(row(g, "theme", "", NO_THEMES_PLACEHOLDER, String::new()));
            }
            SectionComments::Themes { themes } => {
                for t in themes {
                    for c in &t.comments {
                        rows.push(row(g, "theme", &t.title, c, String::new()));
                    }
                }
            }
        }
    }
    for e in &doc.frequency {
        let sentiment = e.sentiment.map(|s| s.as_str()).unwrap_or("");
        rows.push(row("", "frequency", &e.word, sentiment, e.count.to_string()));
    }
    for w in &doc.warnings {
        rows.push(row("", "warning", "", w, String::new()));
    }
    rows
}

/// Renders the document as CSV (`b','`) or TSV (`b'\t'`).
pub fn render_delimited(doc: &ReportDocument, delimiter: u8) -> Result<String> {
    let mut buf = Vec::new();
    {
        let mut wtr = WriterBuilder::new().delimiter(delimiter).from_writer(&mut buf);
        wtr.write_record(["group", "section", "label", "value", "count"])?;
        for r in delimited_rows(doc) {
            wtr.write_record(r.map(csv_safe_cell))?;
        }
        wtr.flush()?;
    }
    String::from_utf8(buf).map_err(|e| FeedbackError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
}

pub fn render(doc: &ReportDocument, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Txt => Ok(render_text(doc)),
        ExportFormat::Json => Ok(serde_json::to_string_pretty(doc)?),
        ExportFormat::Csv => render_delimited(doc, b','),
        ExportFormat::Tsv => render_delimited(doc, b'\t'),
    }
}

/// `<stem>_<YYYYMMDD_HHMMSS>_<suffix>.<ext>` inside `dir`.
pub fn timestamped_path(dir: &Path, stem: &str, suffix: &str, ext: &str) -> PathBuf {
    let local: DateTime<Local> = Local::now();
    dir.join(format!("{stem}_{}_{suffix}.{ext}", local.format("%Y%m%d_%H%M%S")))
}

/// Writes `content` to `path`, creating or truncating the file.
pub fn save_file(content: &str, path: &Path) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

/// Renders and saves the document; returns the written path.
pub fn save_report(doc: &ReportDocument, format: ExportFormat, dir: &Path, stem: &str) -> Result<PathBuf> {
    let path = timestamped_path(dir, stem, doc.view.as_str(), format.extension());
    save_file(&render(doc, format)?, &path)?;
    Ok(path)
}
