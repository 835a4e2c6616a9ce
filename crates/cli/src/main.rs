//! ctxengine CLI — the main entry point.
//!
//! Commands:
//! - `assemble`  — Build a context package from JSON files
//! - `validate`  — Check a package against an archetype contract
//! - `classify`  — Show the trust class and tier of a source type
//! - `ground`    — Score generated text against provenance tags
//! - `config`    — Show, validate, or locate the configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod adapters;
mod commands;

#[derive(Parser)]
#[command(
    name = "ctxengine",
    about = "ctxengine — provenance-aware context assembly",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ~/.ctxengine/config.toml)
    #[arg(short, long, global = true, env = "CTXENGINE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble a context package for one agent call
    Assemble {
        /// Request JSON (query, entity ids, system prompt, sources, ...)
        #[arg(long)]
        request: PathBuf,

        /// Agent archetype: orchestrator, worker, or reviewer
        #[arg(short, long)]
        archetype: String,

        /// Domain the request belongs to
        #[arg(short, long)]
        domain: String,

        /// Caller identity JSON (role, jurisdiction, ...)
        #[arg(long)]
        user: Option<PathBuf>,

        /// JSON list served as entity data
        #[arg(long)]
        entities: Option<PathBuf>,

        /// JSON list served as knowledge-base chunks
        #[arg(long)]
        kb: Option<PathBuf>,

        /// JSON list served as cross-agent context
        #[arg(long)]
        cross_agent: Option<PathBuf>,

        /// JSON list served as RAG search results
        #[arg(long)]
        search: Option<PathBuf>,
    },

    /// Validate a context package against its contract
    Validate {
        /// Package JSON, bare or as printed by `assemble`
        #[arg(long)]
        package: PathBuf,

        #[arg(short, long)]
        archetype: String,
    },

    /// Classify a source type
    Classify {
        source_type: String,
    },

    /// Score generated text for grounding
    Ground {
        /// Text file to check
        #[arg(long)]
        text: PathBuf,

        /// Provenance tags JSON, a list or the output of `assemble`
        #[arg(long)]
        tags: PathBuf,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the built-in default configuration
    Default,
    /// Print the effective configuration
    Show,
    /// Load and validate the configuration
    Validate,
    /// Print the default configuration file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Assemble {
            request,
            archetype,
            domain,
            user,
            entities,
            kb,
            cross_agent,
            search,
        } => {
            let files = commands::assemble::AdapterFiles {
                entities,
                kb,
                cross_agent,
                search,
            };
            commands::assemble::run(config, &request, &archetype, &domain, user.as_deref(), files)
                .await?
        }
        Commands::Validate { package, archetype } => {
            commands::validate::run(config, &package, &archetype).await?
        }
        Commands::Classify { source_type } => commands::classify::run(config, &source_type).await?,
        Commands::Ground { text, tags } => commands::ground::run(config, &text, &tags).await?,
        Commands::Config { action } => match action.unwrap_or(ConfigAction::Default) {
            ConfigAction::Default => commands::config_cmd::default().await?,
            ConfigAction::Show => commands::config_cmd::show(config).await?,
            ConfigAction::Validate => commands::config_cmd::validate(config).await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
        },
    }

    Ok(())
}
