//! CLI command definitions for agent-eval.
//!
//! Subcommands cover the whole loop: turning captured agent events into a
//! trajectory, judging a trajectory, delivering a remote evaluation, running
//! a benchmark locally, and inspecting saved reports.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::EvalConfig;
use crate::converter::convert_events;
use crate::delivery::{DeliveryPath, DeliveryPipeline, EvaluationRequest, ProgressUpdate};
use crate::evaluation::{
    AgentEvaluator, Benchmark, BenchmarkReport, BenchmarkRunner, CancellationFlag,
    HttpAgentTransport,
};
use crate::events::RawEvent;
use crate::judge::{
    ExpectedBehavior, HttpJudgeBackend, JudgeBackend, JudgeClient, JudgeRequest, LlmJudgeBackend,
    Verdict,
};
use crate::llm::{LiteLlmClient, LlmProvider};
use crate::metrics::{export_metrics, init_metrics};
use crate::storage::{FileReportStore, ReportStore};
use crate::trajectory::TrajectoryStep;

/// Evaluate AG-UI agents by their trajectories.
#[derive(Parser)]
#[command(name = "agent-eval")]
#[command(about = "Stream agent runs into trajectories and score them with a judge")]
#[command(version)]
#[command(
    long_about = "agent-eval drives AG-UI agents, converts their event streams into ordered trajectories and scores them with an LLM judge.\n\nExample usage:\n  agent-eval run --agent weather --benchmark ./benchmarks/weather.yaml\n  agent-eval convert --input events.jsonl"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// YAML configuration file.
    #[arg(short, long, global = true, env = "AGENT_EVAL_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Convert a captured event log (JSONL or JSON array) into a trajectory.
    Convert(ConvertArgs),

    /// Judge a saved trajectory against expected outcomes.
    Judge(JudgeArgs),

    /// Run an evaluation on the evaluation server, streaming progress.
    #[command(alias = "eval")]
    Evaluate(EvaluateArgs),

    /// Run a benchmark file against a configured agent locally.
    Run(RunArgs),

    /// Inspect saved benchmark reports.
    Reports(ReportsArgs),

    /// Print Prometheus metrics in text format.
    Metrics,
}

#[derive(Parser, Debug)]
pub struct ConvertArgs {
    /// Event log to convert.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Write the trajectory here instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct JudgeArgs {
    /// Trajectory JSON file (as written by `convert`).
    #[arg(short, long)]
    pub trajectory: PathBuf,

    /// Expected outcome; repeat for several.
    #[arg(short, long = "expected", required = true)]
    pub expected: Vec<String>,

    /// Judge model id or name. Defaults to the configured judge model.
    #[arg(short, long)]
    pub model: Option<String>,

    /// Output the verdict as JSON.
    #[arg(short, long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct EvaluateArgs {
    /// Agent id known to the evaluation server.
    #[arg(short, long)]
    pub agent: String,

    /// Benchmark id known to the evaluation server.
    #[arg(short, long)]
    pub benchmark: String,

    /// Restrict to these test cases; repeat for several.
    #[arg(short, long = "test-case")]
    pub test_cases: Vec<String>,

    /// Judge model id or name.
    #[arg(short, long)]
    pub model: Option<String>,

    /// Capture trajectories only, skip judging.
    #[arg(long)]
    pub trace: bool,

    /// Save the final state as a report.
    #[arg(long)]
    pub save: bool,

    /// Output the final run state as JSON.
    #[arg(short, long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Agent id from the configuration.
    #[arg(short, long)]
    pub agent: String,

    /// Benchmark file (YAML or JSON).
    #[arg(short, long)]
    pub benchmark: PathBuf,

    /// Judge model id or name.
    #[arg(short, long)]
    pub model: Option<String>,

    /// Capture trajectories only, skip judging.
    #[arg(long)]
    pub trace: bool,

    /// Output the report as JSON.
    #[arg(short, long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct ReportsArgs {
    #[command(subcommand)]
    pub command: ReportsSubcommand,
}

#[derive(clap::Subcommand, Debug)]
pub enum ReportsSubcommand {
    /// List saved reports, oldest first.
    List,

    /// Print one report as JSON.
    Show {
        /// Report id.
        id: String,
    },

    /// Delete a report.
    Delete {
        /// Report id.
        id: String,
    },
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    if let Err(e) = init_metrics() {
        warn!(error = %e, "Failed to register metrics");
    }

    match cli.command {
        Commands::Convert(args) => run_convert_command(args),
        Commands::Metrics => {
            print!("{}", export_metrics());
            Ok(())
        }
        command => {
            let config = EvalConfig::resolve(cli.config.as_deref())?;
            match command {
                Commands::Judge(args) => run_judge_command(&config, args).await,
                Commands::Evaluate(args) => run_evaluate_command(&config, args).await,
                Commands::Run(args) => run_benchmark_command(&config, args).await,
                Commands::Reports(args) => run_reports_command(&config, args).await,
                Commands::Convert(_) | Commands::Metrics => Ok(()),
            }
        }
    }
}

// ============================================================================
// Convert
// ============================================================================

fn run_convert_command(args: ConvertArgs) -> anyhow::Result<()> {
    let contents = fs::read_to_string(&args.input)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", args.input.display(), e))?;
    let events = parse_event_log(&contents)?;
    info!(events = events.len(), "Loaded event log");

    let trajectory = convert_events(&events);
    let json = serde_json::to_string_pretty(&trajectory)?;

    match args.output {
        Some(path) => {
            fs::write(&path, json)?;
            info!(steps = trajectory.len(), path = %path.display(), "Wrote trajectory");
        }
        None => println!("{}", json),
    }
    Ok(())
}

/// Accepts either a JSON array of events or one event per line.
///
/// Malformed lines are skipped; unknown event types are kept and later
/// ignored by the converter.
fn parse_event_log(contents: &str) -> anyhow::Result<Vec<RawEvent>> {
    let trimmed = contents.trim_start();
    let values: Vec<Value> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed)?
    } else {
        let mut values = Vec::new();
        for (index, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(value) => values.push(value),
                Err(e) => warn!(line = index + 1, error = %e, "Skipping malformed event line"),
            }
        }
        values
    };

    Ok(values.into_iter().filter_map(RawEvent::from_value).collect())
}

// ============================================================================
// Judge
// ============================================================================

async fn run_judge_command(config: &EvalConfig, args: JudgeArgs) -> anyhow::Result<()> {
    let contents = fs::read_to_string(&args.trajectory).map_err(|e| {
        anyhow::anyhow!("Failed to read {}: {}", args.trajectory.display(), e)
    })?;
    let trajectory: Vec<TrajectoryStep> = serde_json::from_str(&contents)?;

    let judge = build_judge_client(config)?;
    let model = resolve_judge_model(config, args.model.as_deref());
    let request = JudgeRequest::new(
        trajectory,
        ExpectedBehavior {
            expected_outcomes: args.expected,
            expected_trajectory: Vec::new(),
        },
    )
    .with_model(model);

    let verdict = judge
        .judge_with_progress(&request, Some(|_: &str| info!("Judge returned a verdict")))
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
    } else {
        print_verdict(&verdict);
    }
    Ok(())
}

fn print_verdict(verdict: &Verdict) {
    let status = if verdict.passed() { "PASSED" } else { "FAILED" };
    println!("{} (accuracy {:.2})", status, verdict.metrics.accuracy);
    if !verdict.reasoning.is_empty() {
        println!("  {}", verdict.reasoning);
    }
}

/// Judge backed by the HTTP judge service when one is configured, otherwise
/// by an LLM behind a LiteLLM-compatible proxy.
fn build_judge_client(config: &EvalConfig) -> anyhow::Result<JudgeClient> {
    let backend: Arc<dyn JudgeBackend> = match &config.judge.url {
        Some(url) => {
            info!(url = %url, "Using HTTP judge service");
            Arc::new(HttpJudgeBackend::new(url.clone()))
        }
        None => {
            let provider = build_llm_provider(config)?;
            info!(model = %config.judge_model(), "Using LLM judge");
            Arc::new(LlmJudgeBackend::new(provider, config.judge_model()))
        }
    };
    Ok(JudgeClient::new(backend).with_retry_policy(config.retry_policy()))
}

fn build_llm_provider(config: &EvalConfig) -> anyhow::Result<Arc<dyn LlmProvider>> {
    let client = match &config.llm.api_base {
        Some(base) => LiteLlmClient::new(
            base.clone(),
            config.llm.api_key.clone(),
            config
                .llm
                .default_model
                .clone()
                .unwrap_or_else(|| config.judge_model().to_string()),
        ),
        None => LiteLlmClient::from_env().map_err(|e| {
            anyhow::anyhow!(
                "Failed to initialize LLM client: {}. Set judge.url, llm.api_base or LITELLM_API_BASE.",
                e
            )
        })?,
    };
    Ok(Arc::new(client))
}

fn resolve_judge_model(config: &EvalConfig, requested: Option<&str>) -> String {
    match requested {
        Some(model) => config.resolve_model(model).to_string(),
        None => config.judge_model().to_string(),
    }
}

// ============================================================================
// Evaluate (remote)
// ============================================================================

async fn run_evaluate_command(config: &EvalConfig, args: EvaluateArgs) -> anyhow::Result<()> {
    let mut pipeline =
        DeliveryPipeline::http(&config.delivery.server).with_config(config.delivery_config());
    if !args.trace {
        match build_judge_client(config) {
            Ok(judge) => pipeline = pipeline.with_judge(judge),
            Err(e) => warn!(error = %e, "No local judge; relying on server verdicts"),
        }
    }

    let request = EvaluationRequest {
        agent_id: args.agent.clone(),
        benchmark_id: args.benchmark.clone(),
        test_case_ids: args.test_cases,
        judge_model: Some(resolve_judge_model(config, args.model.as_deref())),
        trace_mode: args.trace,
    };

    let quiet = args.json;
    let outcome = pipeline
        .evaluate(&request, |update| print_progress(&update, quiet))
        .await?;

    if outcome.path == DeliveryPath::Polling {
        warn!("Live stream dropped; final state came from polling");
    }
    if outcome.timed_out {
        warn!(
            run_id = %outcome.state.run_id,
            status = %outcome.state.status,
            "Run did not finish before the poll timeout"
        );
    }

    if args.save {
        let mut report = BenchmarkReport::start(&args.benchmark, &args.agent);
        report.trace_mode = args.trace || config.delivery.trace_mode;
        report.results = outcome.state.results.clone();
        report.finish(outcome.state.status);
        save_report(config, &report).await?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome.state)?);
    } else {
        println!(
            "Run {} {}: {} of {} test cases",
            outcome.state.run_id,
            outcome.state.status,
            outcome.state.completed_count(),
            outcome.state.total()
        );
        if let Some(error) = &outcome.state.error {
            println!("  error: {}", error);
        }
    }
    Ok(())
}

fn print_progress(update: &ProgressUpdate, quiet: bool) {
    if quiet || update.message.is_empty() {
        return;
    }
    match &update.test_case_id {
        Some(id) => println!("[{}] {}", id, update.message),
        None => println!("{}", update.message),
    }
}

// ============================================================================
// Run (local)
// ============================================================================

async fn run_benchmark_command(config: &EvalConfig, args: RunArgs) -> anyhow::Result<()> {
    let agent = config.agent(&args.agent)?;
    let benchmark = load_benchmark(&args.benchmark)?;
    if benchmark.test_cases.is_empty() {
        return Err(anyhow::anyhow!(
            "Benchmark has no test cases: {}",
            args.benchmark.display()
        ));
    }

    let trace_mode = args.trace || config.delivery.trace_mode;
    let mut evaluator = AgentEvaluator::new(
        agent.id.clone(),
        Arc::new(HttpAgentTransport::new(agent.url.clone())),
    )
    .with_trace_mode(trace_mode)
    .with_judge_model(resolve_judge_model(config, args.model.as_deref()));
    if !trace_mode {
        evaluator = evaluator.with_judge(build_judge_client(config)?);
    }

    let cancel = CancellationFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after the current test case");
            on_interrupt.cancel();
        }
    });

    info!(
        agent = %agent.display_name(),
        benchmark = %benchmark.id,
        test_cases = benchmark.test_cases.len(),
        "Running benchmark"
    );

    let quiet = args.json;
    let runner = BenchmarkRunner::new(evaluator);
    let report = runner
        .run(&benchmark, &cancel, |update| {
            // Per-step updates are noisy on a terminal.
            if update.step.is_none() {
                print_progress(&update, quiet);
            }
        })
        .await;

    save_report(config, &report).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn load_benchmark(path: &Path) -> anyhow::Result<Benchmark> {
    let contents = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    // YAML is a superset of JSON, so one parser covers both.
    let benchmark: Benchmark = serde_yaml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Invalid benchmark {}: {}", path.display(), e))?;
    Ok(benchmark)
}

async fn save_report(config: &EvalConfig, report: &BenchmarkReport) -> anyhow::Result<()> {
    let store = FileReportStore::new(&config.reports_dir);
    store.save(report).await?;
    info!(report = %report.id, dir = %config.reports_dir.display(), "Saved report");
    Ok(())
}

fn print_report(report: &BenchmarkReport) {
    println!("\n=== Benchmark {} ({}) ===", report.benchmark_id, report.status);
    println!("Report:     {}", report.id);
    println!("Agent:      {}", report.agent_id);
    println!("Total:      {}", report.summary.total);
    println!("Passed:     {}", report.summary.passed);
    println!("Failed:     {}", report.summary.failed);
    println!("Cancelled:  {}", report.summary.cancelled);
    if !report.trace_mode {
        println!("Pass rate:  {:.1}%", report.summary.pass_rate * 100.0);
    }
    println!();
    for result in &report.results {
        let verdict = match &result.verdict {
            Some(v) if v.passed() => "passed",
            Some(_) => "failed",
            None => "-",
        };
        println!(
            "  {:<24} {:<10} {:<7} {} steps",
            result.test_case_id,
            result.status,
            verdict,
            result.trajectory.len()
        );
        if let Some(err) = &result.error {
            println!("    error: {}", err);
        }
    }
}

// ============================================================================
// Reports
// ============================================================================

async fn run_reports_command(config: &EvalConfig, args: ReportsArgs) -> anyhow::Result<()> {
    let store = FileReportStore::new(&config.reports_dir);
    match args.command {
        ReportsSubcommand::List => {
            let reports = store.list().await?;
            if reports.is_empty() {
                println!("No reports in {}", config.reports_dir.display());
            }
            for report in reports {
                println!(
                    "{}  {}  {:<16} {:<16} {}/{} passed",
                    report.id,
                    report.started_at.format("%Y-%m-%d %H:%M:%S"),
                    report.benchmark_id,
                    report.agent_id,
                    report.summary.passed,
                    report.summary.total
                );
            }
        }
        ReportsSubcommand::Show { id } => {
            let report = store.get(&id).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        ReportsSubcommand::Delete { id } => {
            store.delete(&id).await?;
            println!("Deleted report {}", id);
        }
    }
    Ok(())
}
