//! Command-line driver for pagemark.
//!
//! Usage: pagemark [--config pagemark.toml] [--store qa.json] <COMMAND>

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use pagemark_embeddings::{ResilientApiClient, codec};
use pagemark_retrieval::{Config, JsonFileStore, RankingConfig, SearchResults, SemanticSearch};
use serde_json::json;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_STORE: &str = "pagemark-qa.json";

#[derive(Debug, Parser)]
#[command(name = "pagemark")]
#[command(about = "Index page content as question/answer pairs and search it by meaning", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// JSON file holding indexed items
    #[arg(short, long, global = true, default_value = DEFAULT_STORE)]
    store: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Embed texts and print their encoded form
    Embed {
        #[arg(required = true)]
        texts: Vec<String>,
    },

    /// Generate question/answer pairs for content (stdin when no file)
    Qa {
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Index content under an owner id (stdin when no file)
    Index {
        owner_id: String,

        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Search indexed content
    Search {
        query: String,

        /// Override ranking.top_k
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete every item of an owner
    Remove { owner_id: String },

    /// Show store statistics
    Stats,

    /// Show codec compression for the embedding of a text
    CodecStats { text: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let client = Arc::new(ResilientApiClient::new(config.api.clone()).with_cancellation(cancel));

    match cli.command {
        Command::Embed { texts } => {
            let embeddings = client.generate_embeddings(&texts).await?;
            let output: Vec<_> = texts
                .iter()
                .zip(&embeddings)
                .map(|(text, embedding)| {
                    json!({
                        "text": text,
                        "dimensions": embedding.len(),
                        "encoded": codec::encode(embedding),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Qa { file } => {
            let content = read_content(file.as_deref()).await?;
            let pairs = client.generate_qa_pairs(&content).await?;
            println!("{}", serde_json::to_string_pretty(&pairs)?);
        }
        Command::Index { owner_id, file } => {
            let content = read_content(file.as_deref()).await?;
            let engine = open_engine(client, &cli.store, config.ranking).await?;
            let count = engine.index_content(&owner_id, &content).await?;
            println!("Indexed {count} items for {owner_id}");
        }
        Command::Search { query, top_k, json } => {
            let mut ranking = config.ranking;
            if let Some(top_k) = top_k {
                if top_k == 0 {
                    bail!("--top-k must be greater than 0");
                }
                ranking.top_k = top_k;
            }

            let engine = open_engine(client, &cli.store, ranking).await?;
            let results = engine.search(&query).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                print_results(&results);
            }
        }
        Command::Remove { owner_id } => {
            let engine = open_engine(client, &cli.store, config.ranking).await?;
            let removed = engine.remove(&owner_id).await?;
            println!("Removed {removed} items of {owner_id}");
        }
        Command::Stats => {
            let engine = open_engine(client, &cli.store, config.ranking).await?;
            let stats = engine.stats().await?;
            println!("Store:  {}", cli.store.display());
            println!("Items:  {}", stats.items);
            println!("Owners: {}", stats.owners);
        }
        Command::CodecStats { text } => {
            let embedding = client.generate_embeddings(&[text]).await?;
            let Some(embedding) = embedding.first() else {
                bail!("API returned no embedding");
            };
            let stats = codec::compression_ratio(embedding);
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "dimensions": embedding.len(),
                    "raw_size": stats.raw_size,
                    "encoded_size": stats.encoded_size,
                    "ratio": stats.ratio,
                    "max_quantization_error": codec::max_quantization_error(),
                }))?
            );
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => {
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}

fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupted; cancelling in-flight requests");
                cancel.cancel();
            }
            Err(e) => debug!("Ctrl-C handler unavailable: {e}"),
        }
    });
}

async fn open_engine(
    client: Arc<ResilientApiClient>,
    store_path: &Path,
    ranking: RankingConfig,
) -> Result<SemanticSearch> {
    let store = JsonFileStore::open(store_path)
        .await
        .with_context(|| format!("failed to open store {}", store_path.display()))?;
    Ok(SemanticSearch::with_client(client, Arc::new(store), ranking))
}

async fn read_content(file: Option<&Path>) -> Result<String> {
    let content = match file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut content = String::new();
            tokio::io::stdin().read_to_string(&mut content).await?;
            content
        }
    };

    if content.trim().is_empty() {
        bail!("no content to process");
    }
    Ok(content)
}

fn print_results(results: &SearchResults) {
    if results.groups.is_empty() {
        println!("No matches for {:?}", results.query);
        return;
    }

    for group in &results.groups {
        println!(
            "{:>6.3}  {:<9}  {}  {}",
            group.best_score,
            group.quality.as_str(),
            group.owner_id,
            group.representative_item.question
        );
    }
}
