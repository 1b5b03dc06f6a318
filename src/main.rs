//! # StackIndex CLI
//!
//! ```bash
//! stackindex --config ./config/stackindex.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `stackindex serve` | Start the HTTP API server |
//! | `stackindex analyze "<input>"` | Run a one-shot analysis and print JSON |
//! | `stackindex prefetch [tools...]` | Warm the cache for common tools |
//! | `stackindex cache flush` | Administrative flush of both cache tiers |
//!
//! The `ANTHROPIC_API_KEY` environment variable is required for every
//! command that reaches the summarizer; `GITHUB_TOKEN` and
//! `STACKEXCHANGE_KEY` are optional and raise the respective rate limits.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use stackindex::app::AppContext;
use stackindex::cache::TieredCache;
use stackindex::config::{self, Config, Credentials};
use stackindex::models::AnalysisKind;
use stackindex::orchestrator::{self, AnalyzeOptions};
use stackindex::server;

/// StackIndex — aggregates public developer-tool data and produces
/// AI-assisted comparisons and deep dives.
#[derive(Parser)]
#[command(
    name = "stackindex",
    about = "Developer-tool intelligence backend",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Every setting has a default, so
    /// the file is optional.
    #[arg(long, global = true, default_value = "./config/stackindex.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server.
    Serve,

    /// Run a one-shot analysis and print the result as JSON.
    Analyze {
        /// The query, e.g. "React vs Vue" or "Next.js".
        input: String,

        /// Analysis kind: `comparison` or `deepdive`. Auto-detected from
        /// the input when omitted.
        #[arg(long)]
        kind: Option<String>,

        /// Bypass the whole-response cache read.
        #[arg(long)]
        skip_cache: bool,
    },

    /// Warm the cache for the given tools (defaults to a built-in list).
    Prefetch {
        /// Tool names to prefetch.
        tools: Vec<String>,
    },

    /// Cache administration.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Delete every entry from both cache tiers.
    Flush,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        Config::minimal()
    };

    match cli.command {
        Commands::Serve => {
            let context = boot(cfg).await?;
            server::run_server(context).await?;
        }
        Commands::Analyze {
            input,
            kind,
            skip_cache,
        } => {
            let context = boot(cfg).await?;
            let kind = match kind {
                Some(raw) => raw.parse::<AnalysisKind>().map_err(anyhow::Error::msg)?,
                None => orchestrator::detect_analysis_kind(&input),
            };
            let options = AnalyzeOptions {
                skip_cache,
                include_metrics: true,
            };
            let result = context.orchestrator.analyze(&input, kind, &options).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Prefetch { tools } => {
            let context = boot(cfg).await?;
            let tools = if tools.is_empty() {
                orchestrator::default_prefetch_tools()
            } else {
                tools
            };
            context.orchestrator.prefetch(&tools).await;
        }
        Commands::Cache { action } => match action {
            CacheAction::Flush => {
                let cache = TieredCache::connect(&cfg.cache).await;
                cache.flush().await;
                println!("Cache flushed.");
            }
        },
    }

    Ok(())
}

/// Build the process context. Fails fast when the summarizer credential is
/// missing — nothing useful can run without it.
async fn boot(config: Config) -> anyhow::Result<Arc<AppContext>> {
    let credentials = Credentials::from_env()?;
    Ok(Arc::new(AppContext::init(config, credentials).await))
}
