use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use csv::ReaderBuilder;
use log::{debug, info};
use rayon::prelude::*;
use regex::Regex;
use walkdir::WalkDir;

use crate::config::ColumnSpec;
use crate::error::{IngestIssue, Warning};
use crate::model::{GroupKey, GroupRecord, OutcomeRow, TIMING_CATEGORIES};

/// Feedback entries that carry no content, matched case-insensitively.
pub const TRIVIAL_COMMENTS: [&str; 3] = ["none", "n/a", "-"];

/// Result of ingesting one file. `fragment` is `None` when the file could not be
/// read or parsed at all.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub source: String,
    pub group: GroupKey,
    pub fragment: Option<GroupRecord>,
    pub warnings: Vec<Warning>,
}

pub fn is_trivial_comment(text: &str) -> bool {
    let t = text.trim();
    TRIVIAL_COMMENTS.iter().any(|w| t.eq_ignore_ascii_case(w))
}

fn session_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)session[\s_\-]*0*(\d+)").expect("static regex"))
}

///Derives the group from a file name: "session_03.csv" becomes "Session 3".
///Names without a session marker map to "Unknown Group".
/// # Example
/// ```
/// use feedback_analysis::group_key_from_name;
/// assert_eq!(group_key_from_name("Feedback - Session 2 (copy).csv").as_str(), "Session 2");
/// assert_eq!(group_key_from_name("export.csv").as_str(), "Unknown Group");
/// ```
pub fn group_key_from_name(name: &str) -> GroupKey {
    match session_regex().captures(name).and_then(|c| c.get(1)) {
        Some(m) => GroupKey::new(format!("Session {}", m.as_str())),
        None => GroupKey::unknown(),
    }
}

/// Trims a header and strips stray quote, escape and byte-order-mark artifacts.
pub fn normalize_header(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != '\u{feff}' && *c != '\\')
        .collect();
    let cleaned = cleaned
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

enum Column {
    Found(usize),
    Missing,
    Duplicate(usize),
}

fn locate(headers: &[String], wanted: &str) -> Column {
    let hits: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| h.eq_ignore_ascii_case(wanted))
        .map(|(i, _)| i)
        .collect();
    match hits.as_slice() {
        [] => Column::Missing,
        [i] => Column::Found(*i),
        many => Column::Duplicate(many.len()),
    }
}

fn resolve(
    source: &str,
    headers: &[String],
    wanted: &str,
    skipped: &'static str,
    warnings: &mut Vec<Warning>,
) -> Option<usize> {
    match locate(headers, wanted) {
        Column::Found(i) => Some(i),
        Column::Missing => {
            let issue = IngestIssue::HeaderMissing {
                header: wanted.to_string(),
                skipped,
            };
            warnings.push(Warning::ingest(source, &issue));
            None
        }
        Column::Duplicate(count) => {
            let issue = IngestIssue::DuplicateHeader {
                header: wanted.to_string(),
                count,
                skipped,
            };
            warnings.push(Warning::ingest(source, &issue));
            None
        }
    }
}

fn canonical_timing(value: &str) -> Option<&'static str> {
    let v = value.trim();
    TIMING_CATEGORIES
        .iter()
        .copied()
        .find(|c| v.eq_ignore_ascii_case(c))
}

fn failed(source: &str, group: GroupKey, mut warnings: Vec<Warning>, issue: IngestIssue) -> IngestOutcome {
    warnings.push(Warning::ingest(source, &issue));
    IngestOutcome {
        source: source.to_string(),
        group,
        fragment: None,
        warnings,
    }
}

/// Parses one delimited text blob into a group fragment.
///
/// Missing or duplicated anchor headers skip only the sub-feature that needs them:
/// the feedback column feeds comments, the timing column feeds timing counts, and
/// the outcome table needs both the identifier and the timing column because every
/// column strictly between them is one outcome question.
pub fn ingest_str(source: &str, content: &str, delimiter: u8, columns: &ColumnSpec) -> IngestOutcome {
    let group = group_key_from_name(source);
    let mut warnings = Vec::new();

    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .has_headers(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = match rdr.headers() {
        Ok(h) => h.iter().map(normalize_header).collect(),
        Err(e) => return failed(source, group, warnings, IngestIssue::Unparseable(e.to_string())),
    };
    if headers.iter().all(|h| h.is_empty()) {
        return failed(
            source,
            group,
            warnings,
            IngestIssue::Unparseable("no header row".to_string()),
        );
    }

    let feedback_col = resolve(source, &headers, &columns.feedback, "comments", &mut warnings);
    let timing_col = resolve(
        source,
        &headers,
        &columns.timing,
        "timing counts and outcome table",
        &mut warnings,
    );
    let id_col = resolve(source, &headers, &columns.identifier, "outcome table", &mut warnings);

    let outcome_cols: Vec<usize> = match (id_col, timing_col) {
        (Some(a), Some(b)) => (a.min(b) + 1..a.max(b)).collect(),
        _ => Vec::new(),
    };
    let mut outcomes: Vec<OutcomeRow> = outcome_cols
        .iter()
        .map(|&i| OutcomeRow::new(headers[i].clone()))
        .collect();

    let mut record = GroupRecord::default();
    for (row_no, result) in rdr.records().enumerate() {
        let row = match result {
            Ok(r) => r,
            Err(e) => {
                return failed(
                    source,
                    group,
                    warnings,
                    IngestIssue::Unparseable(format!("row {}: {e}", row_no + 1)),
                );
            }
        };

        if let Some(text) = feedback_col.and_then(|i| row.get(i)).map(str::trim) {
            if !text.is_empty() && !is_trivial_comment(text) {
                record.comments.push(text.to_string());
            }
        }

        if let Some(label) = timing_col.and_then(|i| row.get(i)).and_then(canonical_timing) {
            *record.categorical_counts.entry(label.to_string()).or_insert(0) += 1;
        }

        for (slot, &col) in outcomes.iter_mut().zip(&outcome_cols) {
            if let Some(value) = row.get(col).map(str::trim).filter(|v| !v.is_empty()) {
                *slot.response_counts.entry(value.to_string()).or_insert(0) += 1;
            }
        }
    }

    for row in outcomes {
        record.add_outcome_counts(row);
    }

    debug!(
        "{}: group '{}', {} comments, {} outcome columns",
        source,
        group,
        record.comments.len(),
        record.outcome_table.len()
    );

    IngestOutcome {
        source: source.to_string(),
        group,
        fragment: Some(record),
        warnings,
    }
}

fn delimiter_for(path: &Path) -> u8 {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => b'\t',
        _ => b',',
    }
}

/// Reads and ingests one file. Never fails: read errors become a warning and a
/// `None` fragment.
pub fn ingest_file(path: &Path, columns: &ColumnSpec) -> IngestOutcome {
    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            let group = group_key_from_name(&source);
            return failed(&source, group, Vec::new(), IngestIssue::FileUnreadable(e.to_string()));
        }
    };
    let content = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            let group = group_key_from_name(&source);
            return failed(
                &source,
                group,
                Vec::new(),
                IngestIssue::FileUnreadable(format!("not valid UTF-8: {e}")),
            );
        }
    };

    ingest_str(&source, &content, delimiter_for(path), columns)
}

/// Ingests files in parallel; outcomes come back in input order.
pub fn ingest_files(paths: &[PathBuf], columns: &ColumnSpec) -> Vec<IngestOutcome> {
    info!("ingesting {} file(s)", paths.len());
    paths
        .par_iter()
        .map(|p| ingest_file(p, columns))
        .collect()
}

fn is_table_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()).as_deref(),
        Some("csv") | Some("tsv")
    )
}

/// A file path is returned as-is; a directory is walked for `.csv`/`.tsv` files
/// in sorted order.
pub fn collect_files(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }
    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_table_file(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}
