//! Run adaptation over a dataset or a single query/feedback pair and print
//! the evolved lesson pool.
//!
//! Reads the API key from the `OPENROUTER_KEY` environment variable.
//!
//! # Examples
//!
//! ```sh
//! # Offline adaptation over a JSONL dataset, three epochs
//! hone --dataset tasks.jsonl --epochs 3 --max-lessons 100
//!
//! # One-shot cycle with explicit feedback
//! hone --query "How should I cache results?" \
//!   --feedback "The answer ignored cache invalidation." \
//!   --seed lessons.json
//!
//! # Export the evolved context to a run directory
//! hone --dataset tasks.jsonl --output-dir runs/
//! ```
//!
//! Dataset records are JSONL objects `{"query": "...", "feedback": "..."}`;
//! records missing either field are skipped. Seed files are JSON arrays of
//! lesson entries (`[{"content": "..."}]`).

use clap::Parser;
use hone_rs::prelude::*;
use hone_rs::{DEFAULT_EMBEDDING_MODEL, DEFAULT_MODEL};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

/// Evolve a lesson pool from query/feedback pairs.
///
/// Reads the API key from the OPENROUTER_KEY environment variable.
#[derive(Parser)]
#[command(name = "hone")]
struct Cli {
    // ── Input selection ────────────────────────────────────────
    /// JSONL dataset of {"query", "feedback"} records (offline mode)
    #[arg(long, conflicts_with = "query")]
    dataset: Option<PathBuf>,

    /// Number of passes over the dataset
    #[arg(long, env = "HONE_EPOCHS", default_value_t = 1)]
    epochs: usize,

    /// Single query to adapt on (one-shot mode)
    #[arg(long)]
    query: Option<String>,

    /// Feedback for the one-shot query (defaults to empty feedback)
    #[arg(long)]
    feedback: Option<String>,

    /// JSON file with the initial lesson entries
    #[arg(long)]
    seed: Option<PathBuf>,

    // ── Model selection ────────────────────────────────────────
    /// Model for trajectory generation
    #[arg(long, env = "HONE_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Model for reflection and distillation (defaults to --model)
    #[arg(long, env = "HONE_REFLECTOR_MODEL")]
    reflector_model: Option<String>,

    /// Embedding model for lesson retrieval
    #[arg(long, env = "HONE_EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    // ── Generation parameters ──────────────────────────────────
    /// Sampling temperature
    #[arg(long, env = "HONE_TEMPERATURE", default_value_t = 0.7)]
    temperature: f32,

    /// Maximum tokens per completion response
    #[arg(long, env = "HONE_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: u32,

    /// Retries for transient API errors
    #[arg(long, default_value_t = 2)]
    retries: u32,

    // ── Curation ───────────────────────────────────────────────
    /// Lessons retrieved per cycle
    #[arg(long, env = "HONE_TOP_K", default_value_t = 5)]
    top_k: usize,

    /// Bound the pool to the newest N lessons (unbounded without this)
    #[arg(long)]
    max_lessons: Option<usize>,

    // ── Output ─────────────────────────────────────────────────
    /// Directory for a timestamped JSON export of the final context
    #[arg(long, env = "HONE_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,
}

/// Load a JSONL dataset. Blank lines are skipped; a malformed line is a
/// startup error, reported with its line number.
fn load_dataset(path: &Path) -> Result<Vec<TaskRecord>, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read dataset {}: {e}", path.display()))?;

    let mut records = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: TaskRecord = serde_json::from_str(line)
            .map_err(|e| format!("{}:{}: invalid record: {e}", path.display(), idx + 1))?;
        records.push(record);
    }
    Ok(records)
}

/// Load a JSON array of lesson entries to seed the context with.
fn load_seed(path: &Path) -> Result<Vec<LessonEntry>, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read seed {}: {e}", path.display()))?;
    serde_json::from_str(&text)
        .map_err(|e| format!("invalid seed file {}: {e}", path.display()))
}

/// Write the final context to `<dir>/context-<timestamp>.json`.
fn export_context(dir: &Path, context: &[LessonEntry]) -> Result<PathBuf, String> {
    std::fs::create_dir_all(dir)
        .map_err(|e| format!("failed to create {}: {e}", dir.display()))?;

    let stamp = chrono::Local::now().format("%Y%m%dT%H%M%S");
    let path = dir.join(format!("context-{stamp}.json"));
    let json = serde_json::to_string_pretty(context)
        .map_err(|e| format!("failed to serialize context: {e}"))?;
    std::fs::write(&path, json).map_err(|e| format!("failed to write {}: {e}", path.display()))?;
    Ok(path)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.dataset.is_none() && cli.query.is_none() {
        eprintln!("Error: provide --dataset for offline adaptation or --query for a one-shot cycle");
        process::exit(1);
    }

    let api_key = match std::env::var("OPENROUTER_KEY") {
        Ok(key) => key,
        Err(_) => {
            eprintln!("Error: OPENROUTER_KEY environment variable is not set");
            process::exit(1);
        }
    };

    // Startup configuration errors are fatal here; per-cycle errors degrade
    // inside the loop instead.
    let result = run(cli, api_key).await;
    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run(cli: Cli, api_key: String) -> Result<(), String> {
    let client = OpenRouterClient::new(api_key.clone())?
        .with_retry(RetryConfig::with_retries(cli.retries))
        .with_max_tokens(cli.max_tokens)
        .with_temperature(cli.temperature);
    let embedder = EmbeddingsClient::new(api_key, &cli.embedding_model)?
        .with_retry(RetryConfig::with_retries(cli.retries));

    let mut config = AdaptConfig::new(&cli.model)?;
    if let Some(ref reflector_model) = cli.reflector_model {
        config = config.with_reflector_model(reflector_model);
    }

    let seed = match cli.seed {
        Some(ref path) => load_seed(path)?,
        None => Vec::new(),
    };

    let mut orchestrator =
        Orchestrator::new(&client, &embedder, config).with_observer(&LoggingObserver);
    if let Some(max_lessons) = cli.max_lessons {
        orchestrator = orchestrator.with_prune_policy(Box::new(RecencyBound::new(max_lessons)));
    }

    let final_context = if let Some(ref dataset_path) = cli.dataset {
        let dataset = load_dataset(dataset_path)?;
        orchestrator
            .run_offline_adaptation(&dataset, seed, cli.epochs, cli.top_k)
            .await
    } else {
        // One-shot mode: seed, embed, run a single online cycle.
        let mut orchestrator = orchestrator.with_context(seed);
        orchestrator.materialize_embeddings().await;

        let query = cli.query.as_deref().unwrap_or_default();
        let feedback = cli.feedback.as_deref().unwrap_or_default();
        let report = orchestrator
            .run_cycle(query, feedback, CycleMode::Online, cli.top_k)
            .await;

        println!("{}\n", report.trajectory.text());
        report.context
    };

    println!("Evolved context ({} lessons):", final_context.len());
    for lesson in &final_context {
        println!("- {}", lesson.content);
    }

    if let Some(ref dir) = cli.output_dir {
        let path = export_context(dir, &final_context)?;
        println!("Context exported to {}", path.display());
    }

    Ok(())
}
