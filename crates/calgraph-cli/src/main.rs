//! Calgraph CLI
//!
//! Command-line interface for asking natural-language questions about
//! academic-calendar events stored in a `Term`/`Event` graph:
//! - `calgraph ask "..."` runs the full pipeline (plan, validate, compile,
//!   execute, summarize, optionally rewrite)
//! - `calgraph plan "..."` stops after compilation and prints the plan and
//!   Cypher without touching the store

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod ask;

#[derive(Parser)]
#[command(name = "calgraph")]
#[command(
    author,
    version,
    about = "Ask natural-language questions about calendar events in a graph store"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question end to end against the graph store.
    Ask(AskArgs),

    /// Print the hints, normalized plan, and compiled Cypher for a question
    /// without executing it. Always uses the deterministic rule planner.
    Plan(PlanArgs),
}

#[derive(Args)]
struct AskArgs {
    /// The question, as free text (quoting is optional).
    #[arg(required = true)]
    question: Vec<String>,

    /// Print the plan, compiled Cypher, parameters, and row count before the
    /// answer.
    #[arg(long)]
    debug: bool,

    /// Which planner produces the query plan.
    #[arg(long, value_enum, default_value = "rules")]
    planner: PlannerKind,

    /// Model name for LLM planners (falls back to the backend's env var).
    #[arg(long)]
    model: Option<String>,

    /// Print the factual summary instead of asking the model to rephrase it.
    #[arg(long)]
    no_rewrite: bool,

    /// Year assumed when the question names a month without a year.
    #[arg(long)]
    fallback_year: Option<i32>,

    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Args)]
struct PlanArgs {
    /// The question, as free text (quoting is optional).
    #[arg(required = true)]
    question: Vec<String>,

    /// Year assumed when the question names a month without a year.
    #[arg(long)]
    fallback_year: Option<i32>,

    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Args)]
struct ConfigArgs {
    /// Allow-list config (schema.json). Defaults to the built-in registry.
    #[arg(long)]
    schema_config: Option<PathBuf>,

    /// Anchor synonym config (synonyms.json). Required with --schema-config.
    #[arg(long)]
    synonyms_config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum PlannerKind {
    /// Deterministic keyword rules; no network.
    Rules,
    #[cfg(feature = "llm-ollama")]
    Ollama,
    #[cfg(feature = "llm-openai")]
    Openai,
    #[cfg(feature = "llm-anthropic")]
    Anthropic,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Ask(args) => ask::run_ask(args),
        Commands::Plan(args) => ask::run_plan(args),
    }
}
