//! RAG CLI - Command-line interface for the RAG knowledge base.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use rag_chunk::FileParser;
use rag_core::{Parser as _, RagConfig, RagError};
use rag_service::{HealthReport, RagService};

/// RAG - Hybrid retrieval and question answering over local documents
#[derive(Parser)]
#[command(name = "rag")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: ~/.config/rag/config.toml, then ./rag.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest files into the knowledge base
    Ingest {
        /// Files or directories to ingest
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Recursively process directories
        #[arg(short, long)]
        recursive: bool,
    },

    /// Answer a question from the ingested documents
    Query {
        /// Question text
        text: String,
    },

    /// Retrieve matching chunks without generating an answer
    Search {
        /// Search query
        text: String,

        /// Maximum number of results (default: search.top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Weight of the vector ranking in fusion (default: search.hybrid_alpha)
        #[arg(long)]
        alpha: Option<f32>,
    },

    /// Check storage and configuration readiness
    Health,

    /// Print the effective configuration
    Config,
}

fn setup_logging(verbose: bool, level: &str) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match RagConfig::load_from(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => fail(&e),
    };

    setup_logging(cli.verbose, &config.logging.level);

    match cli.command {
        Commands::Ingest { files, recursive } => {
            let paths = expand_paths(&files, recursive)?;
            let service = open_service(&config).await;
            print_json(&service.ingest(&paths).await)?;
        }
        Commands::Query { text } => {
            let service = open_service(&config).await;
            match service.query(&text).await {
                Ok(response) => print_json(&response)?,
                Err(e) => fail(&e),
            }
        }
        Commands::Search {
            text,
            top_k,
            alpha,
        } => {
            let service = open_service(&config).await;
            let k = top_k.unwrap_or(config.search.top_k);
            let alpha = alpha.unwrap_or(config.search.hybrid_alpha);
            match service.search(&text, k, alpha).await {
                Ok(results) => print_json(&results)?,
                Err(e) => fail(&e),
            }
        }
        Commands::Health => {
            let report = HealthReport::check(&config).await;
            print_json(&report)?;
            if !report.is_ready() {
                std::process::exit(1);
            }
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config.redacted())?);
        }
    }

    Ok(())
}

async fn open_service(config: &RagConfig) -> RagService {
    match RagService::open(config).await {
        Ok(service) => service,
        Err(e) => fail(&e),
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

fn fail(err: &RagError) -> ! {
    tracing::debug!("{}", err);
    let body = ErrorBody {
        error: err.error_code(),
        message: err.user_message(),
    };
    match serde_json::to_string_pretty(&body) {
        Ok(json) => eprintln!("{}", json),
        Err(_) => eprintln!("Error: {}", err),
    }
    std::process::exit(1);
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Files are passed through as given so unsupported ones show up in the
/// report; directories contribute only files the parser supports.
fn expand_paths(inputs: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>, std::io::Error> {
    let parser = FileParser::new();
    let mut files = Vec::new();

    for input in inputs {
        if input.is_dir() {
            collect_files(&parser, input, recursive, &mut files)?;
        } else {
            files.push(input.clone());
        }
    }

    Ok(files)
}

fn collect_files(
    parser: &FileParser,
    dir: &Path,
    recursive: bool,
    files: &mut Vec<PathBuf>,
) -> Result<(), std::io::Error> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<_, _>>()?;
    entries.sort();

    for path in entries {
        if path.is_file() && parser.supports(&path) {
            files.push(path);
        } else if path.is_dir() && recursive {
            collect_files(parser, &path, recursive, files)?;
        }
    }

    Ok(())
}
