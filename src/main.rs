#![forbid(unsafe_code)]
//! # Feedback Analysis CLI
//!
//! Command-line front end for the `feedback_analysis` crate. It ingests survey
//! exports (`.csv` / `.tsv`, a single file or a directory), runs the staged
//! classification pipeline and writes a timestamped report.
//!
//! ## Example
//! ```bash
//! FEEDBACK_API_KEY=... cargo run --release -- analyze path/to/exports --view themed --export-format csv
//! cargo run --release -- analyze path/to/exports --offline --snapshot run.json
//! cargo run --release -- report --snapshot run.json --view initial --export-format json
//! ```
//!
//! See `--help` for all available options.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use log::{error, info};

use feedback_analysis::config::{DEFAULT_ENDPOINT, DEFAULT_MODEL, DEFAULT_TOP_N};
use feedback_analysis::{
    AnalysisOrchestrator, AnalysisSession, Classifier, ClassifierConfig, ColumnSpec,
    ExportFormat, FeedbackError, GroupMap, GroupRecord, HttpClassifier, OfflineClassifier,
    PipelineOptions, Result, ViewMode, Warning, aggregate_outcomes, all_comments, collect_files,
    ensure_usable, export_session, ingest_files, load_stopwords, print_warnings, save_report,
    summarize,
};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest and print per-group counts and the word frequency table (no network)
    Summary {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Run the classification pipeline and export a report
    Analyze {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        classifier: ClassifierArgs,

        #[command(flatten)]
        output: OutputArgs,

        /// View to export; refined and themed are computed on demand
        #[arg(long, default_value = "initial")]
        view: ViewMode,

        /// Compute the refined view even when exporting another one
        #[arg(long, default_value_t = false)]
        refine: bool,

        /// Compute the themed view even when exporting another one
        #[arg(long, default_value_t = false)]
        theme: bool,

        /// Also write the complete session to this JSON file
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
    /// Export a view from a saved session snapshot without recomputing
    Report {
        /// Snapshot written by `analyze --snapshot`
        #[arg(long)]
        snapshot: PathBuf,

        /// View to export (must be present in the snapshot); defaults to the saved current view
        #[arg(long)]
        view: Option<ViewMode>,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args)]
struct InputArgs {
    /// File or directory to analyze
    path: PathBuf,

    /// Header of the identifier column
    #[arg(long, default_value = "ID")]
    id_column: String,

    /// Header of the timing column
    #[arg(long, default_value = "Timing")]
    timing_column: String,

    /// Header of the free-text feedback column
    #[arg(long, default_value = "Feedback")]
    feedback_column: String,

    /// Optional path to additional stopword file (.txt, one word per line)
    #[arg(long)]
    stopwords: Option<PathBuf>,

    /// Number of words in the frequency table
    #[arg(long, default_value_t = DEFAULT_TOP_N)]
    top: usize,
}

impl InputArgs {
    fn columns(&self) -> ColumnSpec {
        ColumnSpec {
            identifier: self.id_column.clone(),
            timing: self.timing_column.clone(),
            feedback: self.feedback_column.clone(),
        }
    }

    fn options(&self) -> Result<PipelineOptions> {
        let extra_stopwords = match &self.stopwords {
            Some(path) => load_stopwords(path)?,
            None => Default::default(),
        };
        Ok(PipelineOptions {
            top_n: self.top,
            extra_stopwords,
        })
    }
}

#[derive(Args)]
struct ClassifierArgs {
    /// API key for the classification service
    #[arg(long, env = "FEEDBACK_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// OpenAI-compatible chat-completions endpoint
    #[arg(long, env = "FEEDBACK_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Model name sent with every request
    #[arg(long, env = "FEEDBACK_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    /// Do not contact the service; every stage uses its fallback
    #[arg(long, default_value_t = false)]
    offline: bool,
}

impl ClassifierArgs {
    fn config(&self) -> ClassifierConfig {
        ClassifierConfig {
            endpoint: self.endpoint.clone(),
            model: self.model.clone(),
            api_key: self.api_key.clone(),
            timeout: Duration::from_secs(self.timeout),
        }
    }
}

#[derive(Args)]
struct OutputArgs {
    /// Output format for export (txt, csv, tsv, json)
    #[arg(long, default_value = "txt")]
    export_format: ExportFormat,

    /// Directory the report is written into
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// File name stem of the report
    #[arg(long, default_value = "feedback_report")]
    stem: String,
}

/// Ingests every table under `path` and merges the fragments.
fn load_groups(input: &InputArgs) -> Result<(GroupMap<GroupRecord>, Vec<Warning>)> {
    if !input.path.exists() {
        return Err(FeedbackError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} does not exist", input.path.display()),
        )));
    }
    let files = collect_files(&input.path);
    let outcomes = ingest_files(&files, &input.columns());
    let warnings: Vec<Warning> = outcomes.iter().flat_map(|o| o.warnings.iter().cloned()).collect();
    let groups = aggregate_outcomes(&outcomes);
    Ok((groups, warnings))
}

fn run_summary(input: &InputArgs) -> Result<()> {
    let (groups, warnings) = load_groups(input)?;
    print_warnings(&warnings);
    ensure_usable(&groups)?;
    let options = input.options()?;

    println!("Groups: {}", groups.len());
    for (key, record) in &groups {
        let counted: u64 = record.categorical_counts.values().sum();
        println!(
            "  {}: {} comment(s), {} timing response(s), {} outcome(s)",
            key,
            record.comments.len(),
            counted,
            record.outcome_table.len()
        );
    }
    let table = summarize(&all_comments(&groups), options.top_n, &options.extra_stopwords);
    println!("\nWord frequency:");
    for entry in &table {
        println!("  {}: {}", entry.word, entry.count);
    }
    Ok(())
}

async fn run_pipeline<C: Classifier>(
    classifier: C,
    options: PipelineOptions,
    groups: GroupMap<GroupRecord>,
    ingest_warnings: Vec<Warning>,
    view: ViewMode,
    refine: bool,
    theme: bool,
) -> Result<AnalysisSession> {
    let mut orchestrator = AnalysisOrchestrator::new(classifier, options);
    orchestrator.record_warnings(ingest_warnings);
    orchestrator.run_initial_analysis(groups).await?;

    let refine = refine || view == ViewMode::Refined;
    let theme = theme || view == ViewMode::Themed;
    match (refine, theme) {
        (true, true) => {
            orchestrator.run_refine_and_theme().await?;
        }
        (true, false) => {
            orchestrator.run_refine().await?;
        }
        (false, true) => {
            orchestrator.run_theme().await?;
        }
        (false, false) => {}
    }
    orchestrator.select_view(view)?;
    Ok(orchestrator.into_session())
}

fn write_report(session: &AnalysisSession, output: &OutputArgs) -> Result<PathBuf> {
    let doc = export_session(session)?;
    fs::create_dir_all(&output.out_dir)?;
    save_report(&doc, output.export_format, &output.out_dir, &output.stem)
}

fn save_snapshot(session: &AnalysisSession, path: &Path) -> Result<()> {
    fs::write(path, session.to_json()?)?;
    info!("session snapshot written to {}", path.display());
    Ok(())
}

async fn run_analyze(
    input: &InputArgs,
    classifier: &ClassifierArgs,
    output: &OutputArgs,
    view: ViewMode,
    refine: bool,
    theme: bool,
    snapshot: Option<&Path>,
) -> Result<()> {
    let options = input.options()?;
    let (groups, warnings) = load_groups(input)?;

    let outcome = if classifier.offline {
        run_pipeline(OfflineClassifier, options, groups, warnings.clone(), view, refine, theme).await
    } else {
        match HttpClassifier::new(classifier.config()) {
            Ok(http) => run_pipeline(http, options, groups, warnings.clone(), view, refine, theme).await,
            Err(e) => Err(e),
        }
    };
    // ingestion warnings are still printed when the run fails
    let session = match outcome {
        Ok(session) => session,
        Err(e) => {
            print_warnings(&warnings);
            return Err(e);
        }
    };

    let path = write_report(&session, output)?;
    println!("Report written to {}", path.display());
    if let Some(snapshot) = snapshot {
        save_snapshot(&session, snapshot)?;
        println!("Snapshot written to {}", snapshot.display());
    }
    print_warnings(session.warnings());
    Ok(())
}

fn run_report(snapshot: &Path, view: Option<ViewMode>, output: &OutputArgs) -> Result<()> {
    let mut session = AnalysisSession::from_json(&fs::read_to_string(snapshot)?)?;
    if let Some(view) = view {
        session.select_view(view)?;
    }
    let path = write_report(&session, output)?;
    println!("Report written to {}", path.display());
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match &cli.command {
        Command::Summary { input } => run_summary(input),
        Command::Analyze {
            input,
            classifier,
            output,
            view,
            refine,
            theme,
            snapshot,
        } => run_analyze(input, classifier, output, *view, *refine, *theme, snapshot.as_deref()).await,
        Command::Report {
            snapshot,
            view,
            output,
        } => run_report(snapshot, *view, output),
    };

    if let Err(e) = result {
        error!("Error: {}", e);
        process::exit(1);
    }
}
