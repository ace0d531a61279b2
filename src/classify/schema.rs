//! Strict validators for the four response schemas.
//!
//! Each validator takes one group's entry from the response object together with
//! the input that was submitted for that group, and either returns the validated
//! value or a reason string describing the deviation.

use std::collections::HashMap;

use serde_json::{Map, Value};

use super::json_kind;
use crate::ingest::is_trivial_comment;
use crate::model::{Partition, Sentiment};

fn field<'a>(entry: &'a Value, name: &str) -> Result<&'a Value, String> {
    let obj = entry
        .as_object()
        .ok_or_else(|| format!("group entry is {}, not an object", json_kind(entry)))?;
    obj.get(name).ok_or_else(|| format!("missing '{name}'"))
}

/// Reads a JSON array whose items are all strings.
pub fn string_list(value: &Value, name: &str) -> Result<Vec<String>, String> {
    let items = value
        .as_array()
        .ok_or_else(|| format!("'{name}' is {}, not an array", json_kind(value)))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(String::from)
                .ok_or_else(|| format!("'{name}' contains {}, not a string", json_kind(item)))
        })
        .collect()
}

fn multiset(items: &[String]) -> HashMap<&str, usize> {
    let mut counts = HashMap::new();
    for item in items {
        *counts.entry(item.as_str()).or_insert(0) += 1;
    }
    counts
}

/// Every output string must be byte-identical to an input string, counted with
/// multiplicity.
pub fn check_verbatim(output: &[String], input: &[String]) -> Result<(), String> {
    let mut available = multiset(input);
    for text in output {
        match available.get_mut(text.as_str()) {
            Some(n) if *n > 0 => *n -= 1,
            _ => {
                return Err(format!(
                    "'{}' is not one of the submitted comments",
                    super::prefix(text, 80)
                ));
            }
        }
    }
    Ok(())
}

/// Every non-trivial input string must appear in the output, counted with
/// multiplicity.
pub fn check_complete(output: &[String], input: &[String]) -> Result<(), String> {
    let mut remaining = multiset(input);
    for text in output {
        if let Some(n) = remaining.get_mut(text.as_str()) {
            *n = n.saturating_sub(1);
        }
    }
    let missing: usize = remaining
        .iter()
        .filter(|(text, _)| !is_trivial_comment(text))
        .map(|(_, n)| *n)
        .sum();
    if missing > 0 {
        return Err(format!("{missing} submitted comment(s) missing from the response"));
    }
    Ok(())
}

/// Classification schema: `{summary, positiveComments, criticalComments}`; must
/// account for every submitted comment exactly once.
pub fn classification_entry(entry: &Value, input: &[String]) -> Result<(Option<String>, Partition), String> {
    let positive = string_list(field(entry, "positiveComments")?, "positiveComments")?;
    let critical = string_list(field(entry, "criticalComments")?, "criticalComments")?;
    let summary = match entry.get("summary") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(other) => return Err(format!("'summary' is {}, not a string", json_kind(other))),
    };

    let partition = Partition {
        positive_comments: positive,
        critical_comments: critical,
    };
    let all = partition.flatten();
    check_verbatim(&all, input)?;
    check_complete(&all, input)?;
    Ok((summary, partition))
}

/// Filter schema: `{positiveComments, criticalComments}`; each output list must be
/// drawn from the matching input list.
pub fn filter_entry(entry: &Value, input: &Partition) -> Result<Partition, String> {
    let positive = string_list(field(entry, "positiveComments")?, "positiveComments")?;
    let critical = string_list(field(entry, "criticalComments")?, "criticalComments")?;
    check_verbatim(&positive, &input.positive_comments).map_err(|e| format!("positiveComments: {e}"))?;
    check_verbatim(&critical, &input.critical_comments).map_err(|e| format!("criticalComments: {e}"))?;
    Ok(Partition {
        positive_comments: positive,
        critical_comments: critical,
    })
}

/// Theme schema: `{themes: {title: [comment]}}`; the union of all theme lists must
/// equal the submitted comments.
pub fn theme_entry(entry: &Value, input: &[String]) -> Result<Vec<(String, Vec<String>)>, String> {
    let themes = field(entry, "themes")?;
    let themes = themes
        .as_object()
        .ok_or_else(|| format!("'themes' is {}, not an object", json_kind(themes)))?;

    let mut pairs = Vec::with_capacity(themes.len());
    for (title, comments) in themes {
        pairs.push((title.clone(), string_list(comments, title)?));
    }
    let all: Vec<String> = pairs.iter().flat_map(|(_, c)| c.iter().cloned()).collect();
    check_verbatim(&all, input)?;
    check_complete(&all, input)?;
    Ok(pairs)
}

/// Sentiment schema: `{word: label}`. Returns the label per submitted word (`None`
/// when absent or not one of the three labels).
pub fn sentiment_labels(response: &Map<String, Value>, words: &[String]) -> Vec<Option<Sentiment>> {
    words
        .iter()
        .map(|w| response.get(w).and_then(Value::as_str).and_then(Sentiment::parse))
        .collect()
}
