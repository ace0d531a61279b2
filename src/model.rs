use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Sentinel group for files whose name carries no session marker.
pub const UNKNOWN_GROUP: &str = "Unknown Group";

/// Reserved theme bucket for comments that share no topic with any other comment.
pub const MISCELLANEOUS: &str = "Miscellaneous";

/// Literal phrases recognised in the timing column, in report order.
pub const TIMING_CATEGORIES: [&str; 3] = ["Too early", "Just right", "Too late"];

///Logical session/group a source file maps into.
///
///Ordering is numeric-aware: keys carrying a number sort by that number
///(ascending), keys without one sort after them alphabetically.
/// # Example
/// ```
/// use feedback_analysis::GroupKey;
/// let mut keys = vec![
///     GroupKey::from("Unknown Group"),
///     GroupKey::from("Session 10"),
///     GroupKey::from("Session 2"),
/// ];
/// keys.sort();
/// let names: Vec<&str> = keys.iter().map(|k| k.as_str()).collect();
/// assert_eq!(names, ["Session 2", "Session 10", "Unknown Group"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupKey(String);

impl GroupKey {
    pub fn new(name: impl Into<String>) -> Self {
        GroupKey(name.into())
    }

    pub fn unknown() -> Self {
        GroupKey(UNKNOWN_GROUP.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First run of ASCII digits in the key, if any.
    pub fn number(&self) -> Option<u64> {
        let digits: String = self
            .0
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(|c| c.is_ascii_digit())
            .collect();
        digits.parse().ok()
    }
}

impl From<&str> for GroupKey {
    fn from(s: &str) -> Self {
        GroupKey(s.to_string())
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Ord for GroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.number(), other.number()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for GroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Response distribution for one outcome question.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeRow {
    pub outcome_label: String,
    pub response_counts: BTreeMap<String, u64>,
}

impl OutcomeRow {
    pub fn new(label: impl Into<String>) -> Self {
        OutcomeRow {
            outcome_label: label.into(),
            response_counts: BTreeMap::new(),
        }
    }

    pub fn total(&self) -> u64 {
        self.response_counts.values().sum()
    }
}

/// Aggregated unit per group: comments, timing distribution and outcome table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRecord {
    pub comments: Vec<String>,
    pub categorical_counts: BTreeMap<String, u64>,
    pub outcome_table: Vec<OutcomeRow>,
}

impl GroupRecord {
    /// Folds `other` into `self`: comments appended, counters summed,
    /// outcomes merged by label and then by response label.
    pub fn merge(&mut self, other: GroupRecord) {
        self.comments.extend(other.comments);
        for (label, count) in other.categorical_counts {
            *self.categorical_counts.entry(label).or_insert(0) += count;
        }
        for row in other.outcome_table {
            self.add_outcome_counts(row);
        }
    }

    pub(crate) fn add_outcome_counts(&mut self, row: OutcomeRow) {
        let target = match self
            .outcome_table
            .iter()
            .position(|r| r.outcome_label == row.outcome_label)
        {
            Some(i) => &mut self.outcome_table[i],
            None => {
                self.outcome_table.push(OutcomeRow::new(row.outcome_label.clone()));
                let last = self.outcome_table.len() - 1;
                &mut self.outcome_table[last]
            }
        };
        for (response, count) in row.response_counts {
            *target.response_counts.entry(response).or_insert(0) += count;
        }
    }

    /// True when there are no comments and every counter is zero.
    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
            && self.categorical_counts.values().all(|&c| c == 0)
            && self.outcome_table.iter().all(|r| r.total() == 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "positive" => Some(Sentiment::Positive),
            "negative" => Some(Sentiment::Negative),
            "neutral" => Some(Sentiment::Neutral),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyEntry {
    pub word: String,
    pub count: u64,
    pub sentiment: Option<Sentiment>,
}

/// Exhaustive split of a group's comments into positive and critical lists.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partition {
    pub positive_comments: Vec<String>,
    pub critical_comments: Vec<String>,
}

impl Partition {
    /// Everything lands in the critical list.
    pub fn all_critical(comments: &[String]) -> Self {
        Partition {
            positive_comments: Vec::new(),
            critical_comments: comments.to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.positive_comments.len() + self.critical_comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Positive then critical, flattened.
    pub fn flatten(&self) -> Vec<String> {
        self.positive_comments
            .iter()
            .chain(self.critical_comments.iter())
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    pub title: String,
    pub comments: Vec<String>,
}

///Named comment clusters. Named themes are kept in alphabetical order
///(case-insensitive) with `Miscellaneous` always last; a named theme holds at
///least two comments.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThemeMap(Vec<Theme>);

impl ThemeMap {
    /// Builds an ordered map from raw `(title, comments)` pairs. Titles with fewer
    /// than two comments, blank titles and any spelling of "miscellaneous" are
    /// folded into the reserved bucket. Repeated titles are merged.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, Vec<String>)>) -> Self {
        let mut named: BTreeMap<(String, String), Vec<String>> = BTreeMap::new();
        let mut misc: Vec<String> = Vec::new();
        for (title, comments) in pairs {
            let title = title.trim().to_string();
            if title.is_empty() || title.eq_ignore_ascii_case(MISCELLANEOUS) {
                misc.extend(comments);
            } else {
                named
                    .entry((title.to_lowercase(), title))
                    .or_default()
                    .extend(comments);
            }
        }

        let mut themes = Vec::new();
        for ((_, title), comments) in named {
            if comments.len() >= 2 {
                themes.push(Theme { title, comments });
            } else {
                misc.extend(comments);
            }
        }
        if !misc.is_empty() {
            themes.push(Theme {
                title: MISCELLANEOUS.to_string(),
                comments: misc,
            });
        }
        ThemeMap(themes)
    }

    pub fn themes(&self) -> &[Theme] {
        &self.0
    }

    pub fn get(&self, title: &str) -> Option<&[String]> {
        self.0
            .iter()
            .find(|t| t.title == title)
            .map(|t| t.comments.as_slice())
    }

    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|t| t.title.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// All comments across every theme, in map order.
    pub fn flatten(&self) -> Vec<String> {
        self.0.iter().flat_map(|t| t.comments.iter().cloned()).collect()
    }
}

/// Comment section of an analysis state; the variant is the view shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum CommentView {
    Initial(Partition),
    Refined(Partition),
    Themed { themes: ThemeMap },
}

impl CommentView {
    pub fn mode(&self) -> ViewMode {
        match self {
            CommentView::Initial(_) => ViewMode::Initial,
            CommentView::Refined(_) => ViewMode::Refined,
            CommentView::Themed { .. } => ViewMode::Themed,
        }
    }

    pub fn partition(&self) -> Option<&Partition> {
        match self {
            CommentView::Initial(p) | CommentView::Refined(p) => Some(p),
            CommentView::Themed { .. } => None,
        }
    }

    pub fn themes(&self) -> Option<&ThemeMap> {
        match self {
            CommentView::Themed { themes } => Some(themes),
            _ => None,
        }
    }
}

/// Per-group analysis result. Summary, timing counts and outcome table are carried
/// through every stage unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisState {
    pub summary: Option<String>,
    pub categorical_counts: BTreeMap<String, u64>,
    pub outcome_table: Vec<OutcomeRow>,
    pub comments: CommentView,
}

impl AnalysisState {
    pub fn with_comments(&self, comments: CommentView) -> Self {
        AnalysisState {
            summary: self.summary.clone(),
            categorical_counts: self.categorical_counts.clone(),
            outcome_table: self.outcome_table.clone(),
            comments,
        }
    }
}

pub type GroupMap<T> = BTreeMap<GroupKey, T>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    Initial,
    Refined,
    Themed,
}

impl ViewMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ViewMode::Initial => "initial",
            ViewMode::Refined => "refined",
            ViewMode::Themed => "themed",
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
