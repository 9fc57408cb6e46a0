//! # Research Assistant CLI (`ra`)
//!
//! Build a document index and ask questions against it.
//!
//! ## Usage
//!
//! ```bash
//! ra --config ./config/ra.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ra build [PATHS...] [--topic T]` | Load files and/or a Wikipedia topic into the index |
//! | `ra ask "<question>"` | Answer one question and list its sources |
//! | `ra chat` | Interactive conversation (`/clear`, `/history`, `/quit`) |
//! | `ra status` | Show whether the index is present and how large it is |
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use research_assistant::config::{self, Config};
use research_assistant::engine::Session;
use research_assistant::error::RagError;
use research_assistant::index::{BuildReport, IndexHandle};
use research_assistant::ingest;
use research_assistant::models::{QueryResult, Role};

/// Research Assistant: retrieval-augmented answers from your documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means built-in defaults.
#[derive(Parser)]
#[command(
    name = "ra",
    about = "Research Assistant: ask questions about your documents and Wikipedia topics",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ra.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index, or append to an existing one.
    ///
    /// Directories are searched recursively for .pdf, .docx, .txt and .md files.
    Build {
        /// Files or directories to load.
        paths: Vec<PathBuf>,

        /// Also load this Wikipedia topic.
        #[arg(long, conflicts_with = "default_topic")]
        topic: Option<String>,

        /// Also load the configured default Wikipedia topic.
        #[arg(long)]
        default_topic: bool,
    },

    /// Answer a single question.
    Ask {
        /// The question to ask.
        question: String,
    },

    /// Start an interactive conversation.
    Chat,

    /// Show index status.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,research_assistant=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Build {
            paths,
            topic,
            default_topic,
        } => {
            let topic = match (topic, default_topic) {
                (Some(t), _) => Some(t),
                (None, true) => Some(cfg.wikipedia.default_topic.clone()),
                (None, false) => None,
            };
            if paths.is_empty() && topic.is_none() {
                bail!("Upload files or enter a Wikipedia topic.");
            }
            let report = ingest::build_index(
                &cfg,
                &paths,
                topic.is_some(),
                topic.as_deref().unwrap_or_default(),
            )
            .await
            .map_err(with_hint)?;
            print_report(&cfg, &report);
        }
        Commands::Ask { question } => {
            let mut session = Session::from_config(cfg).map_err(with_hint)?;
            let result = session.ask(&question).await;
            print_result(&result);
        }
        Commands::Chat => {
            let session = Session::from_config(cfg).map_err(with_hint)?;
            run_chat(session).await?;
        }
        Commands::Status => {
            print_status(&cfg);
        }
    }

    Ok(())
}

fn with_hint(err: RagError) -> anyhow::Error {
    match err.user_hint() {
        Some(hint) => anyhow::anyhow!("{}\n{}", err, hint),
        None => err.into(),
    }
}

fn print_report(cfg: &Config, report: &BuildReport) {
    let verb = if report.created { "Created" } else { "Updated" };
    println!("{} index at {}", verb, cfg.index.path.display());
    println!("  documents: {}", report.documents);
    println!("  chunks:    {}", report.chunks);
    println!("  appended:  {}", report.appended);
    println!("  total:     {}", report.total_entries);
    if !report.skipped.is_empty() {
        println!("Skipped {} source(s):", report.skipped.len());
        for skipped in &report.skipped {
            println!("  {}: {}", skipped.source, skipped.reason);
        }
    }
}

fn print_result(result: &QueryResult) {
    println!("{}", result.answer);
    println!();
    if result.sources.is_empty() {
        println!("No sources found for this query.");
    } else {
        println!("Sources:");
        for (i, source) in result.sources.iter().enumerate() {
            println!("  {}. {}", i + 1, source);
        }
    }
}

fn print_status(cfg: &Config) {
    let path = &cfg.index.path;
    println!("Index: {}", path.display());
    match IndexHandle::load(path) {
        Ok(index) => {
            println!("Status: ready");
            println!("  entries: {}", index.len());
            println!("  dims:    {}", index.dims());
            println!("  model:   {}", index.model());
        }
        Err(RagError::IndexNotFound { reason, .. }) => {
            println!("Status: not built ({})", reason);
        }
        Err(e) => {
            println!("Status: unavailable ({})", e);
        }
    }
}

async fn run_chat(mut session: Session) -> Result<()> {
    if let Err(e) = session.initialize() {
        eprintln!("Warning: {}", e);
        eprintln!("Questions will be answered once an index is built (`ra build`).");
    }
    println!("Ask a question. Commands: /clear, /history, /quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                session.clear_memory();
                println!("Conversation cleared.");
            }
            "/history" => {
                if session.memory().is_empty() {
                    println!("No conversation yet.");
                }
                for turn in session.memory().turns() {
                    let speaker = match turn.role {
                        Role::User => "You",
                        Role::Assistant => "Assistant",
                    };
                    println!("{}: {}", speaker, turn.content);
                }
            }
            question => {
                let result = session.ask(question).await;
                print_result(&result);
            }
        }
    }
    Ok(())
}
