use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use crate::model::FrequencyEntry;

/// Articles, pronouns and feedback filler that carry no topic.
pub const STOPWORDS: &[&str] = &[
    "the", "and", "but", "for", "nor", "yet", "with", "from", "into", "onto", "upon", "about",
    "above", "after", "again", "against", "all", "any", "are", "aren't", "because", "been",
    "before", "being", "below", "between", "both", "can", "can't", "cannot", "could", "couldn't",
    "did", "didn't", "does", "doesn't", "doing", "don't", "down", "during", "each", "few",
    "further", "had", "hadn't", "has", "hasn't", "have", "haven't", "having", "her", "here",
    "hers", "herself", "him", "himself", "his", "how", "i'm", "i've", "i'd", "i'll", "isn't",
    "it's", "its", "itself", "just", "let's", "more", "most", "mustn't", "myself", "not", "off",
    "once", "only", "other", "ought", "our", "ours", "ourselves", "out", "over", "own", "same",
    "she", "should", "shouldn't", "some", "such", "than", "that", "that's", "their", "theirs",
    "them", "themselves", "then", "there", "there's", "these", "they", "they're", "this",
    "those", "through", "too", "under", "until", "very", "was", "wasn't", "were", "weren't",
    "what", "when", "where", "which", "while", "who", "whom", "why", "will", "would",
    "wouldn't", "you", "you're", "you've", "your", "yours", "yourself", "yourselves", "also",
    "really", "much", "many", "lot", "lots", "bit", "thing", "things", "get", "got", "well",
    "even", "still", "maybe", "etc", "one", "way", "think", "feel", "felt", "like", "overall",
];

///Lowercases a comment and splits it into candidate tokens. Characters other than
///letters, apostrophes, hyphens and whitespace are removed.
/// # Example
/// ```
/// use feedback_analysis::tokenize;
/// let tokens = tokenize("Hands-on labs (2x) were GREAT!");
/// assert_eq!(tokens, vec!["hands-on", "labs", "x", "were", "great"]);
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_alphabetic() || *c == '\'' || *c == '-' || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .map(String::from)
        .collect()
}

fn keep_token(token: &str, stopwords: &HashSet<String>) -> bool {
    token.chars().count() > 2
        && token.chars().any(char::is_alphabetic)
        && !STOPWORDS.contains(&token)
        && !stopwords.contains(token)
}

///Counts kept tokens of all comments and returns the `top_n` most frequent words.
///Ties keep first-seen order. Sentiment is left unset.
/// # Example
/// ```
/// use std::collections::HashSet;
/// use feedback_analysis::summarize;
/// let comments = vec!["Pacing was fast".to_string(), "fast examples, good pacing".to_string()];
/// let table = summarize(&comments, 2, &HashSet::new());
/// assert_eq!(table[0].word, "pacing");
/// assert_eq!(table[0].count, 2);
/// assert_eq!(table[1].word, "fast");
/// ```
pub fn summarize(comments: &[String], top_n: usize, extra_stopwords: &HashSet<String>) -> Vec<FrequencyEntry> {
    let mut frequency: HashMap<String, (u64, usize)> = HashMap::new();
    let mut seen = 0usize;
    for comment in comments {
        for token in tokenize(comment) {
            if !keep_token(&token, extra_stopwords) {
                continue;
            }
            let entry = frequency.entry(token).or_insert_with(|| {
                seen += 1;
                (0, seen)
            });
            entry.0 += 1;
        }
    }

    let mut vec_sorted: Vec<(String, (u64, usize))> = frequency.into_iter().collect();
    vec_sorted.sort_by(|a, b| b.1.0.cmp(&a.1.0).then(a.1.1.cmp(&b.1.1)));
    vec_sorted
        .into_iter()
        .take(top_n)
        .map(|(word, (count, _))| FrequencyEntry {
            word,
            count,
            sentiment: None,
        })
        .collect()
}

///Loads an additional stopword file, one word per line. Blank lines and lines
///starting with `#` are ignored.
pub fn load_stopwords(path: &Path) -> std::io::Result<HashSet<String>> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .collect())
}
