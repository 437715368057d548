//! ptsearch CLI - load documentation chunks and search them from the terminal

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ptsearch::indexer::{IndexProgress, RecordStatus};
use ptsearch::mcp::CallResult;
use ptsearch::{CallHandler, ChunkLoader, Config, ContentKind, IndexStats, SharedStore, Store};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "ptsearch")]
#[command(
    author,
    version,
    about = "ptsearch - PyTorch documentation search with intent-aware ranking"
)]
#[command(propagate_version = true)]
struct Cli {
    /// Database path (default: ~/.cache/ptsearch/index.sqlite)
    #[arg(long, short = 'd', env = "PTSEARCH_DB_PATH", global = true)]
    db_path: Option<PathBuf>,

    /// YAML configuration file
    #[arg(long, short = 'c', env = "PTSEARCH_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a JSON array of pre-chunked records into the store
    Index {
        /// Chunk file
        #[arg(long, short = 'i')]
        input_file: PathBuf,

        /// Keep existing chunks instead of clearing the store first
        #[arg(long)]
        no_reset: bool,

        /// Records per embedding request
        #[arg(long, default_value_t = ptsearch::indexer::EMBED_BATCH_SIZE)]
        batch_size: usize,
    },

    /// Search the store through the same handler the server uses
    Search {
        /// Search query
        query: String,

        /// Number of results
        #[arg(long, short = 'n')]
        num_results: Option<u32>,

        /// Restrict to one content kind
        #[arg(long, short = 'f', value_enum)]
        filter: Option<KindArg>,

        /// Output format
        #[arg(long, short = 'o', value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Show store statistics
    Stats {
        /// Output format
        #[arg(long, short = 'o', value_enum, default_value_t = Format::Text)]
        format: Format,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum KindArg {
    Code,
    Text,
}

impl From<KindArg> for ContentKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Code => ContentKind::Code,
            KindArg::Text => ContentKind::Text,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mut config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(ref path) = cli.db_path {
        config.database.path = Some(path.clone());
    }
    config.validate().context("invalid configuration")?;

    match cli.command {
        Commands::Index {
            input_file,
            no_reset,
            batch_size,
        } => cmd_index(&config, &input_file, !no_reset, batch_size).await,
        Commands::Search {
            query,
            num_results,
            filter,
            format,
        } => cmd_search(&config, &query, num_results, filter, format).await,
        Commands::Stats { format } => cmd_stats(&config, format),
    }
}

/// Prints one line per skipped record
struct ErrorReporter {
    skipped: usize,
}

impl IndexProgress for ErrorReporter {
    fn on_record(&mut self, id: &str, status: RecordStatus) {
        if let RecordStatus::Error(reason) = status {
            self.skipped += 1;
            eprintln!("  skipped {}: {}", id, reason);
        }
    }

    fn on_complete(&mut self, stats: &IndexStats) {
        tracing::debug!(skipped = self.skipped, "Index run finished in {:?}", stats.duration);
    }
}

async fn cmd_index(config: &Config, input: &Path, reset: bool, batch_size: usize) -> Result<()> {
    let db_path = config.db_path();
    let store = Store::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;

    // records that carry their own embedding load without a provider
    let embedder = match ptsearch_embed::from_config(&config.embedding) {
        Ok(embedder) => Some(embedder),
        Err(e) => {
            tracing::warn!(
                "Embedding provider unavailable, records without embeddings will be skipped: {}",
                e
            );
            None
        }
    };

    let mut loader = ChunkLoader::new(&store)
        .with_reset(reset)
        .with_batch_size(batch_size);
    if let Some(ref embedder) = embedder {
        loader = loader.with_embedder(embedder.as_ref());
    }

    println!("Indexing {} into {}", input.display(), db_path.display());
    let mut progress = ErrorReporter { skipped: 0 };
    let stats = loader.load_file_with_progress(input, &mut progress).await?;

    println!(
        "Indexed {} of {} records ({} embedded, {} errors) in {:.2}s",
        stats.records_indexed,
        stats.records_read,
        stats.records_embedded,
        stats.errors,
        stats.duration.as_secs_f64()
    );
    Ok(())
}

async fn cmd_search(
    config: &Config,
    query: &str,
    num_results: Option<u32>,
    filter: Option<KindArg>,
    format: Format,
) -> Result<()> {
    let db_path = config.db_path();
    if !db_path.exists() {
        anyhow::bail!(
            "No index at {}. Run 'ptsearch index' first.",
            db_path.display()
        );
    }

    let store = Store::open(&db_path)?;
    let embedder =
        ptsearch_embed::from_config(&config.embedding).context("failed to set up embeddings")?;
    let handler = CallHandler::from_config(config, embedder, Arc::new(SharedStore::new(store)));

    let mut arguments = json!({ "query": query });
    if let Some(n) = num_results {
        arguments["num_results"] = json!(n);
    }
    if let Some(kind) = filter {
        arguments["filter"] = json!(ContentKind::from(kind).as_str());
    }
    let params = json!({ "name": handler.descriptor().name, "arguments": arguments });

    let result = handler.call(&params).await?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_results(&result),
    }
    Ok(())
}

fn print_results(result: &CallResult) {
    if result.results.is_empty() {
        println!("No results found for '{}'", result.query);
        return;
    }

    println!(
        "Found {} results for '{}' (intent: {}):\n",
        result.count,
        result.query,
        result.intent.as_str()
    );
    for (i, item) in result.results.iter().enumerate() {
        let kind = match item.language {
            Some(ref lang) => format!("{}/{}", item.content_kind, lang),
            None => item.content_kind.to_string(),
        };
        println!("{}. {} [{}] (score: {:.3})", i + 1, item.title, kind, item.score);
        println!("   {}", item.source_locator);
        println!("   {}", item.snippet.replace('\n', "\n   "));
        println!();
    }
}

fn cmd_stats(config: &Config, format: Format) -> Result<()> {
    let db_path = config.db_path();
    if !db_path.exists() {
        println!("No index at {}. Run 'ptsearch index' first.", db_path.display());
        return Ok(());
    }

    let stats = Store::open(&db_path)?.stats()?;

    if format == Format::Json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("ptsearch Status");
    println!("===============");
    println!("Database: {}", db_path.display());
    println!("Size: {}", format_bytes(stats.database_size_bytes));
    println!("Total chunks: {}", stats.total_chunks);
    println!("  code: {}", stats.code_chunks);
    println!("  text: {}", stats.text_chunks);
    if !stats.models.is_empty() {
        println!("Embedding models: {}", stats.models.join(", "));
    }
    if let Some(ref at) = stats.last_indexed_at {
        println!("Last indexed: {}", format_time(at));
    }
    Ok(())
}

/// Format bytes as human-readable size
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes < KB {
        format!("{} B", bytes)
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else if bytes < GB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    }
}

/// RFC 3339 timestamp in local time, or the raw string if it does not parse
fn format_time(timestamp: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(timestamp)
        .map(|dt| {
            dt.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|_| timestamp.to_string())
}
