//! # commitlens CLI
//!
//! ## Usage
//!
//! ```bash
//! commitlens --config ./config/commitlens.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `commitlens serve` | Run the webhook server (and the relay) |
//! | `commitlens tools` | Serve the GitHub tools over stdio |
//! | `commitlens index` | Build or open the requirements index |
//! | `commitlens search "<query>"` | Search the requirements index |
//! | `commitlens inspect <file>` | Show language, features and query for a file |
//! | `commitlens match <file>` | Match a local file against the requirements |
//! | `commitlens fetch <repo> <sha>` | Fetch one commit through the configured source |
//!
//! Command output is JSON on stdout; logs go to stderr (`RUST_LOG`).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commitlens::app::{build_index, build_matcher, build_pipeline, build_source};
use commitlens::config::{load_config, Config};
use commitlens::features::extract_features;
use commitlens::github::GithubClient;
use commitlens::language::detect_language;
use commitlens::query::build_query;
use commitlens::relay::RelayManager;
use commitlens::server::{serve, shutdown_signal, ServerContext};
use commitlens::tool_server::run_stdio;

const DEFAULT_CONFIG: &str = "./config/commitlens.toml";

/// commitlens: push webhooks in, requirement verdicts out.
#[derive(Parser)]
#[command(name = "commitlens", version)]
struct Cli {
    /// Path to the configuration file (TOML).
    ///
    /// Defaults to `./config/commitlens.toml`; when that default file does
    /// not exist the built-in defaults are used.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook server.
    ///
    /// Starts the relay subprocess (unless disabled), connects the commit
    /// source and the requirements matcher, and serves until Ctrl-C/SIGTERM.
    Serve {
        /// Do not start the webhook relay.
        #[arg(long)]
        no_relay: bool,
    },

    /// Serve the GitHub tools over stdin/stdout.
    Tools,

    /// Build the requirements index, or open it when it already exists.
    Index {
        /// Delete the existing index directory first.
        #[arg(long)]
        rebuild: bool,
    },

    /// Similarity search against the requirements index.
    Search {
        query: String,

        /// Number of candidates.
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Language, features and search query of a local file.
    Inspect { file: PathBuf },

    /// Match a local file against the requirements.
    Match { file: PathBuf },

    /// Fetch one commit through the configured commit source.
    Fetch {
        /// Repository full name (`owner/name`).
        repo: String,
        sha: String,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn read_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load_config(path, false),
        None => load_config(Path::new(DEFAULT_CONFIG), true),
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_source_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_logging();

    let cli = Cli::parse();
    let config = read_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { no_relay } => run_serve(config, cli.config.as_deref(), no_relay).await?,
        Commands::Tools => {
            let github = GithubClient::new(&config.github)?;
            if !github.has_token() {
                tracing::warn!("GITHUB_TOKEN is not set, GitHub rate limits will be low");
            }
            run_stdio(github).await?;
        }
        Commands::Index { rebuild } => {
            let index = build_index(&config, rebuild).await?;
            print_json(&json!({
                "collection": index.collection(),
                "chunks": index.len().await?,
                "index_dir": config.requirements.index_dir,
            }))?;
        }
        Commands::Search { query, k } => {
            let index = build_index(&config, false).await?;
            let k = k.unwrap_or(config.requirements.top_k);
            let candidates = index.search(&query, k).await?;
            print_json(&candidates)?;
        }
        Commands::Inspect { file } => {
            let text = read_source_file(&file)?;
            let path = file.display().to_string();
            let features = extract_features(&path, &text);
            let query = build_query(&features);
            print_json(&json!({
                "path": path,
                "language": detect_language(&path),
                "features": features,
                "query": query,
            }))?;
        }
        Commands::Match { file } => {
            let text = read_source_file(&file)?;
            let matcher = build_matcher(&config).await?;
            let report = matcher
                .match_file(&file.display().to_string(), &text)
                .await?;
            print_json(&report)?;
        }
        Commands::Fetch { repo, sha } => {
            let parts = build_source(&config, cli.config.as_deref()).await?;
            let fetched = parts.source.fetch_commit(&repo, &sha).await;
            if let Some(tools) = &parts.tools {
                tools.close().await;
            }
            match fetched? {
                Some(snapshot) => print_json(&snapshot)?,
                None => anyhow::bail!("No data returned for {}@{}", repo, sha),
            }
        }
    }

    Ok(())
}

async fn run_serve(config: Config, config_path: Option<&Path>, no_relay: bool) -> Result<()> {
    let relay_wanted = !no_relay && config.relay.required;
    if relay_wanted && config.relay.url.is_none() {
        anyhow::bail!(
            "SMEE_URL is not set. Set it (or relay.url), or run with --no-relay."
        );
    }
    if config.github.token.is_none() {
        tracing::warn!("GITHUB_TOKEN is not set, GitHub rate limits will be low");
    }

    let (pipeline, tools) = build_pipeline(&config, config_path).await?;

    let relay = if no_relay || config.relay.url.is_none() {
        None
    } else {
        let relay = Arc::new(RelayManager::new(config.relay.clone()));
        if !relay.start() {
            tracing::warn!("Webhook relay did not start, only direct deliveries will arrive");
        }
        Some(relay)
    };

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;

    let ctx = ServerContext {
        config: Arc::new(config),
        pipeline,
        relay,
        tools,
    };
    serve(ctx, listener, shutdown_signal()).await
}
