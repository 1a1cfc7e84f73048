//! # Ragmill CLI
//!
//! The `ragmill` binary wires the configured embedder, rerank policy,
//! and answering backends into an [`Engine`](ragmill::engine::Engine)
//! and exposes it three ways.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragmill serve` | Start the HTTP server |
//! | `ragmill repl` | Interactive question loop on stdin |
//! | `ragmill ask "<question>"` | One-shot question |
//!
//! All commands accept `--config` pointing to a TOML configuration file.
//!
//! ```bash
//! ragmill --config ./config/ragmill.toml serve
//! ragmill --config ./config/ragmill.toml ask "What is the capital of France?"
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::EnvFilter;

use ragmill::config::{load_config, Config};
use ragmill::embedding::create_embedder;
use ragmill::engine::{Engine, EngineOptions};
use ragmill::loader::load_documents;
use ragmill::rerank::{KeywordOverlapReranker, Reranker, SimilarityReranker};
use ragmill::router::create_router;
use ragmill::server::run_server;

/// Ragmill — retrieval-augmented question answering with per-session
/// corpora and switchable model backends.
#[derive(Parser)]
#[command(
    name = "ragmill",
    about = "Retrieval-augmented question answering engine",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragmill.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    Serve,

    /// Interactive question loop on stdin.
    ///
    /// Type a question per line; `/new` starts a new conversation,
    /// `exit` quits.
    Repl,

    /// Ask a single question and print the answer with its sources.
    Ask {
        question: String,

        /// Backend to answer with (defaults to the configured default).
        #[arg(long)]
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            let engine = build_engine(&config).await?;
            run_server(engine, config.backends.clone(), &config.server.bind).await
        }
        Commands::Repl => {
            let engine = build_engine(&config).await?;
            run_repl(engine).await
        }
        Commands::Ask { question, model } => {
            let engine = build_engine(&config).await?;
            let session_id = uuid::Uuid::new_v4().to_string();
            if let Some(model) = model {
                engine.switch_model(&session_id, &model)?;
            }
            let result = engine.query(&session_id, &question).await?;
            println!("{}", result.answer);
            if !result.sources.is_empty() {
                println!("\nSources:");
                for (i, source) in result.sources.iter().enumerate() {
                    println!("  {}. {}", i + 1, source);
                }
            }
            Ok(())
        }
    }
}

/// Assemble the engine from configuration. Any failure here — an
/// unreadable document, a missing API key, a failing first embedding —
/// aborts startup.
async fn build_engine(config: &Config) -> Result<Arc<Engine>> {
    let embedder = create_embedder(&config.embedding)?;
    let reranker: Arc<dyn Reranker> = match config.retrieval.reranker.as_str() {
        "keyword-overlap" => Arc::new(KeywordOverlapReranker::default()),
        _ => Arc::new(SimilarityReranker),
    };
    let router = create_router(&config.backends)?;

    let documents = load_documents(&config.documents.paths)
        .await
        .context("Failed to load startup documents")?;
    tracing::info!(count = documents.len(), "loaded startup documents");

    let options = EngineOptions {
        top_k: config.retrieval.top_k,
        generate_timeout: std::time::Duration::from_secs(config.backends.generate_timeout_secs),
    };

    let engine = Engine::initialize(embedder, reranker, router, documents, options)
        .await
        .context("Engine initialization failed; refusing to serve queries")?;
    Ok(Arc::new(engine))
}

async fn run_repl(engine: Arc<Engine>) -> Result<()> {
    let session_id = uuid::Uuid::new_v4().to_string();
    println!("Ragmill ready. Type your questions, \"/new\" for a new conversation, or \"exit\" to quit.");

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("exit") {
            println!("Goodbye!");
            break;
        }
        if input == "/new" {
            match engine.new_conversation(&session_id) {
                Ok(()) => println!("New conversation started. Ask your question:"),
                Err(e) => println!("Nothing to reset yet: {}", e),
            }
            continue;
        }

        match engine.query(&session_id, input).await {
            Ok(result) => {
                println!("\nAnswer: {}", result.answer);
                if result.sources.is_empty() {
                    println!("\n(no supporting documents)");
                } else {
                    println!("\nSources used:");
                    for (i, source) in result.sources.iter().enumerate() {
                        println!("  {}. {}", i + 1, source);
                    }
                }
            }
            Err(e) => println!("Error: {}", e),
        }
        println!("\nAsk another question or type \"exit\" to quit:");
    }

    Ok(())
}
