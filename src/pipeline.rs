//! Three-stage analysis state machine.
//!
//! `NoAnalysis -> Initial -> {Refined, Themed}`. Refined and Themed are siblings
//! built from the Initial comments; neither is derived from the other's state.
//! Every stage resolves each external call exactly once into either validated
//! results or its fallback, and only then writes into the session, so a dropped
//! future never leaves a half-built state selectable.

use log::info;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::aggregate::{all_comments, ensure_usable};
use crate::classify::{ClassificationRequest, Classifier, Task, decode_response, schema};
use crate::config::PipelineOptions;
use crate::error::{ClassifyError, FeedbackError, Result, Stage, Warning};
use crate::lexical::summarize;
use crate::model::{
    AnalysisState, CommentView, FrequencyEntry, GroupMap, GroupRecord, Partition,
    Sentiment, ThemeMap, ViewMode,
};

/// Everything one analysis run has produced so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSession {
    groups: GroupMap<GroupRecord>,
    frequency: Vec<FrequencyEntry>,
    initial: Option<GroupMap<AnalysisState>>,
    refined: Option<GroupMap<AnalysisState>>,
    themed: Option<GroupMap<AnalysisState>>,
    current_view: Option<ViewMode>,
    warnings: Vec<Warning>,
}

impl AnalysisSession {
    pub fn groups(&self) -> &GroupMap<GroupRecord> {
        &self.groups
    }

    pub fn frequency(&self) -> &[FrequencyEntry] {
        &self.frequency
    }

    /// All warnings from every stage, in the order they were recorded.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn state(&self, mode: ViewMode) -> Option<&GroupMap<AnalysisState>> {
        match mode {
            ViewMode::Initial => self.initial.as_ref(),
            ViewMode::Refined => self.refined.as_ref(),
            ViewMode::Themed => self.themed.as_ref(),
        }
    }

    pub fn available_views(&self) -> Vec<ViewMode> {
        [ViewMode::Initial, ViewMode::Refined, ViewMode::Themed]
            .into_iter()
            .filter(|m| self.state(*m).is_some())
            .collect()
    }

    pub fn current_view(&self) -> Option<ViewMode> {
        self.current_view
    }

    /// The selected view and its states.
    pub fn current(&self) -> Option<(ViewMode, &GroupMap<AnalysisState>)> {
        let mode = self.current_view?;
        self.state(mode).map(|s| (mode, s))
    }

    /// Switches the current view. Only views that have been computed can be chosen;
    /// the states themselves are never touched.
    pub fn select_view(&mut self, mode: ViewMode) -> Result<()> {
        if self.state(mode).is_none() {
            return Err(FeedbackError::PreconditionViolation(format!(
                "the {mode} view has not been computed"
            )));
        }
        self.current_view = Some(mode);
        Ok(())
    }

    /// Snapshot of the whole session, for re-exporting later without recomputing.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Restores a snapshot. Each view slot must only hold states of its own
    /// shape, and a current view that was never computed is refused.
    pub fn from_json(text: &str) -> Result<Self> {
        let session: AnalysisSession = serde_json::from_str(text)?;
        for mode in [ViewMode::Initial, ViewMode::Refined, ViewMode::Themed] {
            let Some(states) = session.state(mode) else {
                continue;
            };
            if let Some((key, state)) = states.iter().find(|(_, s)| s.comments.mode() != mode) {
                return Err(FeedbackError::PreconditionViolation(format!(
                    "snapshot {mode} view holds {} comments for {key}",
                    state.comments.mode()
                )));
            }
        }
        if let Some(mode) = session.current_view {
            if session.state(mode).is_none() {
                return Err(FeedbackError::PreconditionViolation(format!(
                    "snapshot selects the {mode} view but does not contain it"
                )));
            }
        }
        Ok(session)
    }

    fn require_initial(&self) -> Result<&GroupMap<AnalysisState>> {
        self.initial.as_ref().ok_or_else(|| {
            FeedbackError::PreconditionViolation(
                "refine and theme stages need an initial analysis first".to_string(),
            )
        })
    }
}

/// Drives the stages against a [`Classifier`] and owns the resulting session.
pub struct AnalysisOrchestrator<C> {
    classifier: C,
    options: PipelineOptions,
    session: AnalysisSession,
}

impl<C: Classifier> AnalysisOrchestrator<C> {
    pub fn new(classifier: C, options: PipelineOptions) -> Self {
        AnalysisOrchestrator {
            classifier,
            options,
            session: AnalysisSession::default(),
        }
    }

    /// Resumes from a previously saved session.
    pub fn with_session(classifier: C, options: PipelineOptions, session: AnalysisSession) -> Self {
        AnalysisOrchestrator {
            classifier,
            options,
            session,
        }
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    pub fn session(&self) -> &AnalysisSession {
        &self.session
    }

    pub fn into_session(self) -> AnalysisSession {
        self.session
    }

    pub fn select_view(&mut self, mode: ViewMode) -> Result<()> {
        self.session.select_view(mode)
    }

    /// Appends warnings raised outside the orchestrator (ingestion).
    pub fn record_warnings(&mut self, warnings: impl IntoIterator<Item = Warning>) {
        self.session.warnings.extend(warnings);
    }

    /// Starts a new analysis run: classifies every group's comments into
    /// positive/critical lists and, concurrently, labels the frequency table's
    /// words with sentiment. Any previous Refined/Themed states are discarded.
    ///
    /// Returns the warnings recorded by this stage. Fails only with
    /// `NoUsableData` when `groups` is empty.
    pub async fn run_initial_analysis(&mut self, groups: GroupMap<GroupRecord>) -> Result<Vec<Warning>> {
        ensure_usable(&groups)?;
        let table = summarize(&all_comments(&groups), self.options.top_n, &self.options.extra_stopwords);

        info!("initial analysis: {} group(s), {} frequency word(s)", groups.len(), table.len());
        let (classified, labelled) = tokio::join!(self.classify_stage(&groups), self.sentiment_stage(&table));

        let (partitions, mut warnings) = classified;
        let (frequency, sentiment_warnings) = labelled;
        warnings.extend(sentiment_warnings);

        let initial: GroupMap<AnalysisState> = groups
            .iter()
            .map(|(key, record)| {
                let (summary, partition) = partitions
                    .get(key)
                    .cloned()
                    .unwrap_or_else(|| (None, Partition::default()));
                let state = AnalysisState {
                    summary,
                    categorical_counts: record.categorical_counts.clone(),
                    outcome_table: record.outcome_table.clone(),
                    comments: CommentView::Initial(partition),
                };
                (key.clone(), state)
            })
            .collect();

        self.session.groups = groups;
        self.session.frequency = frequency;
        self.session.initial = Some(initial);
        self.session.refined = None;
        self.session.themed = None;
        self.session.current_view = Some(ViewMode::Initial);
        self.session.warnings.extend(warnings.iter().cloned());
        Ok(warnings)
    }

    /// Filters low-information comments out of the Initial lists.
    pub async fn run_refine(&mut self) -> Result<Vec<Warning>> {
        let initial = self.session.require_initial()?.clone();
        let (filtered, warnings) = self.filter_stage(&initial).await;
        self.session.refined = Some(refined_states(&initial, &filtered));
        self.session.warnings.extend(warnings.iter().cloned());
        Ok(warnings)
    }

    /// Themes the Initial comments after a fresh filter pass. The filter output
    /// only feeds the theme call; the Refined state is left as it is.
    pub async fn run_theme(&mut self) -> Result<Vec<Warning>> {
        let initial = self.session.require_initial()?.clone();
        let (filtered, mut warnings) = self.filter_stage(&initial).await;
        let (themes, theme_warnings) = self.theme_stage(&filtered).await;
        warnings.extend(theme_warnings);

        self.session.themed = Some(themed_states(&initial, themes));
        self.session.warnings.extend(warnings.iter().cloned());
        Ok(warnings)
    }

    /// Recomputes both siblings: filter, then theme the filter's output.
    pub async fn run_refine_and_theme(&mut self) -> Result<Vec<Warning>> {
        let initial = self.session.require_initial()?.clone();
        let (filtered, mut warnings) = self.filter_stage(&initial).await;
        let (themes, theme_warnings) = self.theme_stage(&filtered).await;
        warnings.extend(theme_warnings);

        self.session.refined = Some(refined_states(&initial, &filtered));
        self.session.themed = Some(themed_states(&initial, themes));
        self.session.warnings.extend(warnings.iter().cloned());
        Ok(warnings)
    }

    async fn call(&self, task: Task, payload: Value) -> std::result::Result<Map<String, Value>, ClassifyError> {
        let request = ClassificationRequest::new(task, payload);
        let raw = self.classifier.classify(&request).await?;
        decode_response(&raw)
    }

    async fn classify_stage(
        &self,
        groups: &GroupMap<GroupRecord>,
    ) -> (GroupMap<(Option<String>, Partition)>, Vec<Warning>) {
        let inputs: GroupMap<Vec<String>> = groups
            .iter()
            .filter(|(_, r)| !r.comments.is_empty())
            .map(|(k, r)| (k.clone(), r.comments.clone()))
            .collect();
        if inputs.is_empty() {
            return (GroupMap::new(), Vec::new());
        }

        let response = self.call(Task::Classify, group_payload(&inputs, |c| json!(c))).await;
        let mut warnings = Vec::new();
        let resolved = resolve_groups(
            Stage::Classify,
            response,
            &inputs,
            |entry, comments| schema::classification_entry(entry, comments),
            |comments| (None, Partition::all_critical(comments)),
            "all comments listed as critical",
            &mut warnings,
        );
        (resolved, warnings)
    }

    async fn sentiment_stage(&self, table: &[FrequencyEntry]) -> (Vec<FrequencyEntry>, Vec<Warning>) {
        if table.is_empty() {
            return (Vec::new(), Vec::new());
        }
        let words: Vec<String> = table.iter().map(|e| e.word.clone()).collect();
        let response = self.call(Task::Sentiment, json!(words)).await;

        let mut warnings = Vec::new();
        let labels = match response {
            Ok(map) => {
                let labels = schema::sentiment_labels(&map, &words);
                let unresolved: Vec<&str> = words
                    .iter()
                    .zip(&labels)
                    .filter(|(_, l)| l.is_none())
                    .map(|(w, _)| w.as_str())
                    .collect();
                if !unresolved.is_empty() {
                    warnings.push(Warning::new(
                        Stage::Sentiment,
                        None,
                        format!(
                            "no valid label for {} word(s), defaulted to neutral: {}",
                            unresolved.len(),
                            unresolved.join(", ")
                        ),
                    ));
                }
                labels
            }
            Err(e) => {
                warnings.push(Warning::new(
                    Stage::Sentiment,
                    None,
                    format!("{e}; every word defaulted to neutral"),
                ));
                vec![None; words.len()]
            }
        };

        let frequency = table
            .iter()
            .zip(labels)
            .map(|(entry, label)| FrequencyEntry {
                word: entry.word.clone(),
                count: entry.count,
                sentiment: Some(label.unwrap_or(Sentiment::Neutral)),
            })
            .collect();
        (frequency, warnings)
    }

    async fn filter_stage(&self, initial: &GroupMap<AnalysisState>) -> (GroupMap<Partition>, Vec<Warning>) {
        let all: GroupMap<Partition> = partitions_of(initial);
        let inputs: GroupMap<Partition> = all
            .iter()
            .filter(|(_, p)| !p.is_empty())
            .map(|(k, p)| (k.clone(), p.clone()))
            .collect();
        if inputs.is_empty() {
            return (all, Vec::new());
        }

        let payload = group_payload(&inputs, |p| {
            json!({
                "positiveComments": p.positive_comments,
                "criticalComments": p.critical_comments,
            })
        });
        let response = self.call(Task::Filter, payload).await;
        let mut warnings = Vec::new();
        let mut resolved = resolve_groups(
            Stage::Filter,
            response,
            &inputs,
            schema::filter_entry,
            Partition::clone,
            "original lists kept unfiltered",
            &mut warnings,
        );
        for (key, partition) in all {
            resolved.entry(key).or_insert(partition);
        }
        (resolved, warnings)
    }

    async fn theme_stage(&self, filtered: &GroupMap<Partition>) -> (GroupMap<ThemeMap>, Vec<Warning>) {
        let inputs: GroupMap<Vec<String>> = filtered
            .iter()
            .filter(|(_, p)| !p.is_empty())
            .map(|(k, p)| (k.clone(), p.flatten()))
            .collect();

        let mut warnings = Vec::new();
        let mut resolved = if inputs.is_empty() {
            GroupMap::new()
        } else {
            let response = self.call(Task::Theme, group_payload(&inputs, |c| json!(c))).await;
            resolve_groups(
                Stage::Theme,
                response,
                &inputs,
                |entry, input| schema::theme_entry(entry, input).map(ThemeMap::from_pairs),
                |_| ThemeMap::default(),
                "no themes produced",
                &mut warnings,
            )
        };
        for key in filtered.keys() {
            resolved.entry(key.clone()).or_default();
        }
        (resolved, warnings)
    }
}

fn group_payload<T>(inputs: &GroupMap<T>, encode: impl Fn(&T) -> Value) -> Value {
    let map: Map<String, Value> = inputs
        .iter()
        .map(|(k, v)| (k.as_str().to_string(), encode(v)))
        .collect();
    Value::Object(map)
}

/// Validate-or-fallback for one stage call, applied uniformly to every group.
///
/// A failed call (transport failure, malformed payload, or a top-level shape
/// error) voids the whole response: one stage warning plus the fallback for every
/// group. Otherwise each group is validated on its own, so one bad entry never
/// affects another group.
fn resolve_groups<I, T>(
    stage: Stage,
    response: std::result::Result<Map<String, Value>, ClassifyError>,
    inputs: &GroupMap<I>,
    validate: impl Fn(&Value, &I) -> std::result::Result<T, String>,
    fallback: impl Fn(&I) -> T,
    fallback_note: &str,
    warnings: &mut Vec<Warning>,
) -> GroupMap<T> {
    let response = match response {
        Ok(map) => map,
        Err(e) => {
            warnings.push(Warning::new(stage, None, format!("{e}; stage fell back for every group")));
            return inputs
                .iter()
                .map(|(key, input)| {
                    warnings.push(Warning::new(stage, Some(key.clone()), format!("fallback used, {fallback_note}")));
                    (key.clone(), fallback(input))
                })
                .collect();
        }
    };

    inputs
        .iter()
        .map(|(key, input)| {
            let outcome = match response.get(key.as_str()) {
                Some(entry) => validate(entry, input),
                None => Err("group missing from response".to_string()),
            };
            let value = match outcome {
                Ok(value) => value,
                Err(reason) => {
                    let e = ClassifyError::InvalidShape(reason);
                    warnings.push(Warning::new(stage, Some(key.clone()), format!("{e}; fallback used, {fallback_note}")));
                    fallback(input)
                }
            };
            (key.clone(), value)
        })
        .collect()
}

fn partitions_of(states: &GroupMap<AnalysisState>) -> GroupMap<Partition> {
    states
        .iter()
        .map(|(k, s)| (k.clone(), s.comments.partition().cloned().unwrap_or_default()))
        .collect()
}

fn refined_states(initial: &GroupMap<AnalysisState>, filtered: &GroupMap<Partition>) -> GroupMap<AnalysisState> {
    initial
        .iter()
        .map(|(key, state)| {
            let partition = filtered.get(key).cloned().unwrap_or_default();
            (key.clone(), state.with_comments(CommentView::Refined(partition)))
        })
        .collect()
}

fn themed_states(initial: &GroupMap<AnalysisState>, mut themes: GroupMap<ThemeMap>) -> GroupMap<AnalysisState> {
    initial
        .iter()
        .map(|(key, state)| {
            let themes = themes.remove(key).unwrap_or_default();
            (key.clone(), state.with_comments(CommentView::Themed { themes }))
        })
        .collect()
}
