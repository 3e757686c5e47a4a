//! gatherline CLI: the main entry point.
//!
//! Commands:
//! - `ask`      Run one retrieval turn and print what was gathered
//! - `key`      Print the cache key a query would use
//! - `inspect`  Read-only look at a stored cache entry
//! - `doctor`   Probe the configured cache backend and sources
//! - `config`   Show, validate, or initialize configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "gatherline",
    about = "gatherline: request-scoped retrieval orchestration",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit log lines as JSON
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Gather context for one query
    Ask {
        /// The user's question
        query: String,

        /// Allow deep research for this turn
        #[arg(short, long)]
        research: bool,

        /// Index a directory of .md/.txt files as the knowledge base
        #[arg(long)]
        docs: Option<PathBuf>,

        /// Check a drafted answer for source attribution
        #[arg(long)]
        answer: Option<String>,

        /// Skip cache reads for this turn
        #[arg(long)]
        no_cache: bool,

        /// Print the turn outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the cache key for a query
    Key {
        /// Namespace: rag, scrape, deepsearch, ops
        namespace: String,

        /// Free-text query (or URL for scrape)
        query: String,

        /// Extra options as name=value, hashed with the query
        #[arg(short, long = "param", value_name = "NAME=VALUE")]
        params: Vec<String>,
    },

    /// Inspect a stored cache entry without modifying it
    Inspect {
        /// Fully-qualified key, e.g. `rag:4525a018453d5765`
        key: String,

        /// Print the inspection as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose cache and source configuration
    Doctor,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (secrets redacted)
    Show,
    /// Validate the configuration file and environment
    Validate,
    /// Print the configuration file path
    Path,
    /// Write a default config file if none exists
    Init,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so `--json` output stays clean on stdout.
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    match cli.command {
        Commands::Ask {
            query,
            research,
            docs,
            answer,
            no_cache,
            json,
        } => {
            commands::ask::run(commands::ask::AskArgs {
                query,
                research,
                docs,
                answer,
                no_cache,
                json,
            })
            .await?
        }
        Commands::Key {
            namespace,
            query,
            params,
        } => commands::key::run(&namespace, &query, &params)?,
        Commands::Inspect { key, json } => commands::inspect::run(&key, json).await?,
        Commands::Doctor => commands::doctor::run().await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show()?,
            ConfigAction::Validate => commands::config_cmd::validate()?,
            ConfigAction::Path => commands::config_cmd::path(),
            ConfigAction::Init => commands::config_cmd::init()?,
        },
    }

    Ok(())
}
