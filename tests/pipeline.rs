//! Orchestrator tests driven by a scripted classifier.
//
// Each test scripts the raw response text per task and then checks the states,
// the warnings and the requests that were actually sent.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

use serde_json::{Value, json};

use feedback_analysis::model::MISCELLANEOUS;
use feedback_analysis::{
    AnalysisOrchestrator, AnalysisState, ClassificationRequest, Classifier, ClassifyError,
    ExportFormat, FeedbackError, GroupKey, GroupMap, GroupRecord, Partition, PipelineOptions, Sentiment, Stage,
    Task, ViewMode, export, export_session, render,
};

// --------------------- helpers ---------------------

#[derive(Default)]
struct ScriptedClassifier {
    responses: RefCell<HashMap<Task, VecDeque<Result<String, ClassifyError>>>>,
    log: RefCell<Vec<ClassificationRequest>>,
}

impl ScriptedClassifier {
    fn reply(self, task: Task, body: Value) -> Self {
        self.push(task, Ok(body.to_string()))
    }

    fn push(self, task: Task, response: Result<String, ClassifyError>) -> Self {
        self.responses.borrow_mut().entry(task).or_default().push_back(response);
        self
    }

    fn requests(&self, task: Task) -> Vec<ClassificationRequest> {
        self.log.borrow().iter().filter(|r| r.task == task).cloned().collect()
    }
}

impl Classifier for ScriptedClassifier {
    async fn classify(&self, request: &ClassificationRequest) -> Result<String, ClassifyError> {
        self.log.borrow_mut().push(request.clone());
        self.responses
            .borrow_mut()
            .get_mut(&request.task)
            .and_then(|q| q.pop_front())
            .unwrap_or_else(|| Err(ClassifyError::Transport("nothing scripted".to_string())))
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn groups() -> GroupMap<GroupRecord> {
    let mut groups = GroupMap::new();
    let mut s1 = GroupRecord {
        comments: strings(&["Loved the group work", "Pacing was too fast", "Good"]),
        ..Default::default()
    };
    s1.categorical_counts.insert("Just right".to_string(), 2);
    groups.insert(GroupKey::from("Session 1"), s1);
    groups.insert(
        GroupKey::from("Session 2"),
        GroupRecord {
            comments: strings(&["The slides were clear"]),
            ..Default::default()
        },
    );
    groups
}

fn classify_ok() -> Value {
    json!({
        "Session 1": {
            "summary": "Mixed.",
            "positiveComments": ["Loved the group work", "Good"],
            "criticalComments": ["Pacing was too fast"]
        },
        "Session 2": {
            "summary": "Positive.",
            "positiveComments": ["The slides were clear"],
            "criticalComments": []
        }
    })
}

fn filter_ok() -> Value {
    json!({
        "Session 1": {"positiveComments": ["Loved the group work"], "criticalComments": ["Pacing was too fast"]},
        "Session 2": {"positiveComments": ["The slides were clear"], "criticalComments": []}
    })
}

fn theme_ok() -> Value {
    json!({
        "Session 1": {"themes": {"Miscellaneous": ["Loved the group work", "Pacing was too fast"]}},
        "Session 2": {"themes": {"Miscellaneous": ["The slides were clear"]}}
    })
}

fn state<'a>(states: &'a GroupMap<AnalysisState>, group: &str) -> &'a AnalysisState {
    &states[&GroupKey::from(group)]
}

fn partition(orch: &AnalysisOrchestrator<ScriptedClassifier>, mode: ViewMode, group: &str) -> Partition {
    let states = orch.session().state(mode).expect("view computed");
    state(states, group).comments.partition().cloned().expect("partition view")
}

fn new_orchestrator(classifier: ScriptedClassifier) -> AnalysisOrchestrator<ScriptedClassifier> {
    AnalysisOrchestrator::new(classifier, PipelineOptions::default())
}

// --------------------- initial stage ---------------------

#[tokio::test]
async fn initial_stage_classifies_and_labels_words() {
    let classifier = ScriptedClassifier::default()
        .reply(Task::Classify, classify_ok())
        .reply(Task::Sentiment, json!({"loved": "positive", "fast": "negative"}));
    let mut orch = new_orchestrator(classifier);

    let warnings = orch.run_initial_analysis(groups()).await.unwrap();

    let p = partition(&orch, ViewMode::Initial, "Session 1");
    assert_eq!(p.positive_comments, strings(&["Loved the group work", "Good"]));
    assert_eq!(p.critical_comments, strings(&["Pacing was too fast"]));
    let initial = orch.session().state(ViewMode::Initial).unwrap();
    assert_eq!(state(initial, "Session 1").summary.as_deref(), Some("Mixed."));
    assert_eq!(state(initial, "Session 1").categorical_counts["Just right"], 2);
    assert_eq!(orch.session().current_view(), Some(ViewMode::Initial));

    let freq = orch.session().frequency();
    let label = |w: &str| freq.iter().find(|e| e.word == w).and_then(|e| e.sentiment);
    assert_eq!(label("loved"), Some(Sentiment::Positive));
    assert_eq!(label("fast"), Some(Sentiment::Negative));
    assert_eq!(label("slides"), Some(Sentiment::Neutral));

    // Only the unlabelled words are reported.
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].stage, Stage::Sentiment);
    assert!(warnings[0].message.contains("defaulted to neutral"));

    let sent = orch.classifier().requests(Task::Classify);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].payload["Session 2"], json!(["The slides were clear"]));
    assert_eq!(orch.classifier().requests(Task::Sentiment).len(), 1);
}

#[tokio::test]
async fn group_missing_from_response_falls_back_alone() {
    let body = json!({
        "Session 2": {"summary": "", "positiveComments": ["The slides were clear"], "criticalComments": []}
    });
    let classifier = ScriptedClassifier::default().reply(Task::Classify, body);
    let mut orch = new_orchestrator(classifier);

    let warnings = orch.run_initial_analysis(groups()).await.unwrap();

    let s1 = partition(&orch, ViewMode::Initial, "Session 1");
    assert!(s1.positive_comments.is_empty());
    assert_eq!(s1.critical_comments, strings(&["Loved the group work", "Pacing was too fast", "Good"]));
    let s2 = partition(&orch, ViewMode::Initial, "Session 2");
    assert_eq!(s2.positive_comments, strings(&["The slides were clear"]));
    let initial = orch.session().state(ViewMode::Initial).unwrap();
    assert_eq!(state(initial, "Session 2").summary, None);

    let classify: Vec<_> = warnings.iter().filter(|w| w.stage == Stage::Classify).collect();
    assert_eq!(classify.len(), 1);
    assert_eq!(classify[0].group, Some(GroupKey::from("Session 1")));
    assert!(classify[0].message.contains("invalid response shape"));
}

#[tokio::test]
async fn malformed_payload_falls_back_for_every_group() {
    let classifier = ScriptedClassifier::default().push(Task::Classify, Ok("Sure! Here you go: {".to_string()));
    let mut orch = new_orchestrator(classifier);

    let warnings = orch.run_initial_analysis(groups()).await.unwrap();

    for group in ["Session 1", "Session 2"] {
        let p = partition(&orch, ViewMode::Initial, group);
        assert!(p.positive_comments.is_empty());
        assert_eq!(p.critical_comments, orch.session().groups()[&GroupKey::from(group)].comments);
    }
    let classify: Vec<_> = warnings.iter().filter(|w| w.stage == Stage::Classify).collect();
    assert_eq!(classify.len(), 3);
    assert_eq!(classify[0].group, None);
    assert!(classify[0].message.contains("malformed payload"));
}

#[tokio::test]
async fn paraphrased_comment_is_rejected() {
    let mut body = classify_ok();
    body["Session 1"]["criticalComments"] = json!(["The pacing was too fast"]);
    let classifier = ScriptedClassifier::default().reply(Task::Classify, body);
    let mut orch = new_orchestrator(classifier);

    let warnings = orch.run_initial_analysis(groups()).await.unwrap();

    let s1 = partition(&orch, ViewMode::Initial, "Session 1");
    assert!(s1.critical_comments.contains(&"Pacing was too fast".to_string()));
    assert!(!s1.critical_comments.contains(&"The pacing was too fast".to_string()));
    assert!(
        warnings
            .iter()
            .any(|w| w.stage == Stage::Classify && w.group == Some(GroupKey::from("Session 1")))
    );
    // Session 2 was valid and is kept as classified.
    assert_eq!(
        partition(&orch, ViewMode::Initial, "Session 2").positive_comments,
        strings(&["The slides were clear"])
    );
}

#[tokio::test]
async fn transport_failure_still_yields_every_state() {
    let mut orch = new_orchestrator(ScriptedClassifier::default());

    let warnings = orch.run_initial_analysis(groups()).await.unwrap();
    orch.run_refine_and_theme().await.unwrap();

    let session = orch.session();
    assert_eq!(session.available_views(), [ViewMode::Initial, ViewMode::Refined, ViewMode::Themed]);
    assert!(session.frequency().iter().all(|e| e.sentiment == Some(Sentiment::Neutral)));
    assert!(warnings.iter().any(|w| w.message.contains("transport or service failure")));

    // Filter fallback keeps the Initial lists; theme fallback is an empty map.
    assert_eq!(
        partition(&orch, ViewMode::Refined, "Session 1"),
        partition(&orch, ViewMode::Initial, "Session 1")
    );
    let themed = session.state(ViewMode::Themed).unwrap();
    assert!(state(themed, "Session 1").comments.themes().unwrap().is_empty());

    let text = render(&export(themed, ViewMode::Themed, session.frequency()).unwrap(), ExportFormat::Txt).unwrap();
    assert!(text.contains("No comments survived filtering."));
}

#[tokio::test]
async fn groups_without_comments_are_not_sent() {
    let mut only_counts = GroupMap::new();
    let mut record = GroupRecord::default();
    record.categorical_counts.insert("Too early".to_string(), 1);
    only_counts.insert(GroupKey::from("Session 3"), record);
    let mut orch = new_orchestrator(ScriptedClassifier::default());

    let warnings = orch.run_initial_analysis(only_counts).await.unwrap();

    assert!(warnings.is_empty());
    assert!(orch.classifier().log.borrow().is_empty());
    assert!(partition(&orch, ViewMode::Initial, "Session 3").is_empty());
}

#[tokio::test]
async fn empty_groups_are_no_usable_data() {
    let mut orch = new_orchestrator(ScriptedClassifier::default());
    let err = orch.run_initial_analysis(GroupMap::new()).await.unwrap_err();
    assert!(matches!(err, FeedbackError::NoUsableData));
    assert!(orch.classifier().log.borrow().is_empty());
    assert_eq!(orch.session().current_view(), None);
}

// --------------------- refine / theme ---------------------

#[tokio::test]
async fn theme_filters_again_from_initial_lists() {
    let classifier = ScriptedClassifier::default()
        .reply(Task::Classify, classify_ok())
        .reply(Task::Filter, filter_ok())
        .reply(Task::Filter, filter_ok())
        .reply(Task::Theme, theme_ok());
    let mut orch = new_orchestrator(classifier);
    orch.run_initial_analysis(groups()).await.unwrap();

    let warnings = orch.run_refine().await.unwrap();
    assert!(warnings.is_empty());
    let refined = partition(&orch, ViewMode::Refined, "Session 1");
    assert_eq!(refined.positive_comments, strings(&["Loved the group work"]));

    let warnings = orch.run_theme().await.unwrap();
    assert!(warnings.is_empty());

    // Both filter calls start from the Initial lists.
    let filters = orch.classifier().requests(Task::Filter);
    assert_eq!(filters.len(), 2);
    assert_eq!(filters[0].payload, filters[1].payload);
    assert_eq!(
        filters[1].payload["Session 1"]["positiveComments"],
        json!(["Loved the group work", "Good"])
    );

    let theme_req = &orch.classifier().requests(Task::Theme)[0];
    assert_eq!(
        theme_req.payload["Session 1"],
        json!(["Loved the group work", "Pacing was too fast"])
    );

    let themed = orch.session().state(ViewMode::Themed).unwrap();
    let themes = state(themed, "Session 1").comments.themes().unwrap();
    assert_eq!(themes.titles().collect::<Vec<_>>(), [MISCELLANEOUS]);

    // Current view only moves on request.
    assert_eq!(orch.session().current_view(), Some(ViewMode::Initial));
    let initial = partition(&orch, ViewMode::Initial, "Session 1");
    assert_eq!(initial.positive_comments, strings(&["Loved the group work", "Good"]));
}

#[tokio::test]
async fn theme_alone_leaves_refined_uncomputed() {
    let classifier = ScriptedClassifier::default()
        .reply(Task::Classify, classify_ok())
        .reply(Task::Filter, filter_ok())
        .reply(Task::Theme, theme_ok());
    let mut orch = new_orchestrator(classifier);
    orch.run_initial_analysis(groups()).await.unwrap();

    orch.run_theme().await.unwrap();

    assert_eq!(orch.classifier().requests(Task::Filter).len(), 1);
    assert_eq!(orch.session().available_views(), [ViewMode::Initial, ViewMode::Themed]);
    assert!(matches!(
        orch.select_view(ViewMode::Refined),
        Err(FeedbackError::PreconditionViolation(_))
    ));
}

#[tokio::test]
async fn named_theme_and_miscellaneous_reach_the_report() {
    let classifier = ScriptedClassifier::default()
        .reply(Task::Classify, classify_ok())
        .reply(
            Task::Filter,
            json!({
                "Session 1": {
                    "positiveComments": ["Loved the group work", "Good"],
                    "criticalComments": ["Pacing was too fast"]
                },
                "Session 2": {"positiveComments": ["The slides were clear"], "criticalComments": []}
            }),
        )
        .reply(
            Task::Theme,
            json!({
                "Session 1": {"themes": {
                    "Miscellaneous": ["Pacing was too fast"],
                    "Group work": ["Loved the group work", "Good"]
                }},
                "Session 2": {"themes": {"Miscellaneous": ["The slides were clear"]}}
            }),
        );
    let mut orch = new_orchestrator(classifier);
    orch.run_initial_analysis(groups()).await.unwrap();

    let warnings = orch.run_theme().await.unwrap();
    assert!(warnings.is_empty());

    let themed = orch.session().state(ViewMode::Themed).unwrap();
    let themes = state(themed, "Session 1").comments.themes().unwrap();
    assert_eq!(themes.titles().collect::<Vec<_>>(), ["Group work", MISCELLANEOUS]);
    assert_eq!(themes.get("Group work").unwrap(), ["Loved the group work", "Good"]);
    assert_eq!(themes.get(MISCELLANEOUS).unwrap(), ["Pacing was too fast"]);

    orch.select_view(ViewMode::Themed).unwrap();
    let text = render(&export_session(orch.session()).unwrap(), ExportFormat::Txt).unwrap();
    assert!(text.starts_with("# Feedback report (themed view)"));
    let named = text.find("### Group work\n- Loved the group work\n- Good\n").unwrap();
    let misc = text.find("### Miscellaneous\n- Pacing was too fast\n").unwrap();
    assert!(named < misc);
}

#[tokio::test]
async fn bad_entries_only_affect_their_group_in_refine_and_theme() {
    let mut input = groups();
    input.get_mut(&GroupKey::from("Session 2")).unwrap().comments = strings(&["The slides were clear", "Nice"]);
    let mut classified = classify_ok();
    classified["Session 2"]["positiveComments"] = json!(["The slides were clear", "Nice"]);

    let classifier = ScriptedClassifier::default()
        .reply(Task::Classify, classified)
        .reply(
            Task::Filter,
            json!({
                "Session 1": {"positiveComments": ["Pacing was too fast"], "criticalComments": []},
                "Session 2": {"positiveComments": ["The slides were clear"], "criticalComments": []}
            }),
        )
        .reply(
            Task::Theme,
            json!({
                "Session 1": {"themes": {"Invented": ["Made up one", "Made up two"]}},
                "Session 2": {"themes": {"Miscellaneous": ["The slides were clear"]}}
            }),
        );
    let mut orch = new_orchestrator(classifier);
    orch.run_initial_analysis(input).await.unwrap();

    let warnings = orch.run_refine_and_theme().await.unwrap();

    // Session 1 falls back in both stages; Session 2 keeps its real results.
    assert_eq!(
        partition(&orch, ViewMode::Refined, "Session 1"),
        partition(&orch, ViewMode::Initial, "Session 1")
    );
    let refined_s2 = partition(&orch, ViewMode::Refined, "Session 2");
    assert_eq!(refined_s2.positive_comments, strings(&["The slides were clear"]));
    assert_ne!(refined_s2, partition(&orch, ViewMode::Initial, "Session 2"));

    let themed = orch.session().state(ViewMode::Themed).unwrap();
    assert!(state(themed, "Session 1").comments.themes().unwrap().is_empty());
    let s2_themes = state(themed, "Session 2").comments.themes().unwrap();
    assert_eq!(s2_themes.get(MISCELLANEOUS).unwrap(), ["The slides were clear"]);

    // The fallback lists are what got themed for Session 1.
    let theme_req = &orch.classifier().requests(Task::Theme)[0];
    assert_eq!(
        theme_req.payload["Session 1"],
        json!(["Loved the group work", "Good", "Pacing was too fast"])
    );

    let s1 = Some(GroupKey::from("Session 1"));
    assert_eq!(warnings.len(), 2);
    assert!(warnings.iter().all(|w| w.group == s1));
    assert_eq!(warnings[0].stage, Stage::Filter);
    assert_eq!(warnings[1].stage, Stage::Theme);
}

#[tokio::test]
async fn single_comment_themes_fold_into_miscellaneous() {
    let classifier = ScriptedClassifier::default()
        .reply(Task::Classify, classify_ok())
        .reply(Task::Filter, filter_ok())
        .reply(
            Task::Theme,
            json!({
                "Session 1": {"themes": {"Group work": ["Loved the group work"], "Pace": ["Pacing was too fast"]}},
                "Session 2": {"themes": {"Slides": ["The slides were clear"]}}
            }),
        );
    let mut orch = new_orchestrator(classifier);
    orch.run_initial_analysis(groups()).await.unwrap();
    orch.run_refine_and_theme().await.unwrap();

    let themed = orch.session().state(ViewMode::Themed).unwrap();
    let themes = state(themed, "Session 1").comments.themes().unwrap();
    assert_eq!(themes.titles().collect::<Vec<_>>(), [MISCELLANEOUS]);
    assert_eq!(themes.flatten().len(), 2);
}

#[tokio::test]
async fn filter_may_not_move_comments_between_lists() {
    let body = json!({
        "Session 1": {"positiveComments": ["Pacing was too fast"], "criticalComments": []},
        "Session 2": {"positiveComments": ["The slides were clear"], "criticalComments": []}
    });
    let classifier = ScriptedClassifier::default()
        .reply(Task::Classify, classify_ok())
        .reply(Task::Filter, body);
    let mut orch = new_orchestrator(classifier);
    orch.run_initial_analysis(groups()).await.unwrap();

    let warnings = orch.run_refine().await.unwrap();

    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].stage, Stage::Filter);
    assert_eq!(warnings[0].group, Some(GroupKey::from("Session 1")));
    assert_eq!(
        partition(&orch, ViewMode::Refined, "Session 1"),
        partition(&orch, ViewMode::Initial, "Session 1")
    );
}

// --------------------- view selection ---------------------

#[tokio::test]
async fn stages_and_views_need_their_predecessors() {
    let mut orch = new_orchestrator(ScriptedClassifier::default());
    assert!(matches!(orch.run_refine().await, Err(FeedbackError::PreconditionViolation(_))));
    assert!(matches!(orch.run_theme().await, Err(FeedbackError::PreconditionViolation(_))));
    assert!(matches!(
        orch.select_view(ViewMode::Initial),
        Err(FeedbackError::PreconditionViolation(_))
    ));

    orch.run_initial_analysis(groups()).await.unwrap();
    assert!(matches!(
        orch.select_view(ViewMode::Themed),
        Err(FeedbackError::PreconditionViolation(_))
    ));
    assert_eq!(orch.session().current_view(), Some(ViewMode::Initial));
}

#[tokio::test]
async fn switching_views_leaves_states_untouched() {
    let classifier = ScriptedClassifier::default()
        .reply(Task::Classify, classify_ok())
        .reply(Task::Filter, filter_ok())
        .reply(Task::Theme, theme_ok());
    let mut orch = new_orchestrator(classifier);
    orch.run_initial_analysis(groups()).await.unwrap();
    orch.run_refine_and_theme().await.unwrap();
    let before = orch.session().clone();

    orch.select_view(ViewMode::Themed).unwrap();
    orch.select_view(ViewMode::Refined).unwrap();
    orch.select_view(ViewMode::Initial).unwrap();

    assert_eq!(orch.session(), &before);
    assert_eq!(orch.classifier().log.borrow().len(), 4);
}

#[tokio::test]
async fn new_initial_run_discards_siblings() {
    let classifier = ScriptedClassifier::default()
        .reply(Task::Classify, classify_ok())
        .reply(Task::Filter, filter_ok())
        .reply(Task::Classify, classify_ok());
    let mut orch = new_orchestrator(classifier);
    orch.run_initial_analysis(groups()).await.unwrap();
    orch.run_refine().await.unwrap();
    orch.select_view(ViewMode::Refined).unwrap();

    orch.run_initial_analysis(groups()).await.unwrap();

    assert_eq!(orch.session().available_views(), [ViewMode::Initial]);
    assert_eq!(orch.session().current_view(), Some(ViewMode::Initial));
}

#[tokio::test]
async fn snapshot_restores_the_session() {
    let classifier = ScriptedClassifier::default()
        .reply(Task::Classify, classify_ok())
        .reply(Task::Filter, filter_ok());
    let mut orch = new_orchestrator(classifier);
    orch.run_initial_analysis(groups()).await.unwrap();
    orch.run_refine().await.unwrap();
    orch.select_view(ViewMode::Refined).unwrap();

    let json = orch.session().to_json().unwrap();
    let restored = feedback_analysis::AnalysisSession::from_json(&json).unwrap();
    assert_eq!(&restored, orch.session());
    assert_eq!(restored.current_view(), Some(ViewMode::Refined));
}

#[tokio::test]
async fn snapshot_with_misplaced_view_is_refused() {
    let mut orch = new_orchestrator(ScriptedClassifier::default());
    orch.run_initial_analysis(groups()).await.unwrap();
    orch.run_refine_and_theme().await.unwrap();

    let mut snapshot: Value = serde_json::from_str(&orch.session().to_json().unwrap()).unwrap();
    snapshot["refined"] = snapshot["themed"].clone();

    let err = feedback_analysis::AnalysisSession::from_json(&snapshot.to_string()).unwrap_err();
    assert!(matches!(err, FeedbackError::PreconditionViolation(_)));
    assert!(err.to_string().contains("refined view holds themed comments"));
}
