use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use hwrag::backend::RetryPolicy;
use hwrag::chunker::Chunker;
use hwrag::composer::AnswerComposer;
use hwrag::config::Config;
use hwrag::db::{Db, MetadataFilter, OpenMode, VectorIndex};
use hwrag::embedder::{self, Embedder, download};
use hwrag::generator::{self, Generator};
use hwrag::ingest::Ingestor;
use hwrag::loaders;
use hwrag::mcp::{McpContext, McpServer};
use hwrag::retriever::Retriever;
use tokio::sync::Mutex as TokioMutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hwrag", version, about = "Retrieval-augmented answers over hardware documents")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = "config.json")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load, chunk, embed and index documents
    Ingest {
        /// Files or directories (defaults to document_patterns)
        paths: Vec<PathBuf>,
        /// Empty the collection first and re-record the embedder
        #[arg(long)]
        rebuild: bool,
    },
    /// Show the chunks retrieved for a query
    Query {
        query: String,
        #[arg(short, long)]
        k: Option<usize>,
        /// Metadata filter as JSON, e.g. '{"gte":{"key":"cores","value":8}}'
        #[arg(long)]
        filter: Option<String>,
    },
    /// Answer a question from the indexed documents
    Ask {
        question: String,
        #[arg(long)]
        filter: Option<String>,
    },
    /// List collections in the store
    Collections,
    /// Serve the MCP tools on stdio
    Serve,
    /// Download the local ONNX embedding model
    DownloadModel {
        /// Target directory (defaults to embedding.model_dir)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    // stdout belongs to command output and the MCP transport.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config).context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    match cli.command {
        Command::Collections => {
            let db = Db::open(&config.db_path).context("failed to open vector store")?;
            let collections = db.list_collections()?;
            println!("{}", serde_json::to_string_pretty(&collections)?);
            Ok(())
        }
        Command::DownloadModel { dir } => {
            let dir = dir.unwrap_or_else(|| PathBuf::from(&config.embedding.model_dir));
            download::download_model_files(&dir)
        }
        command => {
            // Blocking HTTP clients are built and dropped outside the runtime.
            let timeout = config.backend.timeout();
            let embedder = embedder::from_config(&config.embedding, timeout)
                .context("failed to initialise embedder")?;
            let generator = match command {
                Command::Ask { .. } | Command::Serve => Some(
                    generator::from_config(&config.generation, timeout)
                        .context("failed to initialise generator")?,
                ),
                _ => None,
            };

            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(run(command, &config, Arc::clone(&embedder), generator.clone()))
        }
    }
}

async fn run(
    command: Command,
    config: &Config,
    embedder: Arc<dyn Embedder>,
    generator: Option<Arc<dyn Generator>>,
) -> Result<()> {
    let policy = RetryPolicy::from(config.backend);

    match command {
        Command::Ingest { paths, rebuild } => {
            let paths = if paths.is_empty() {
                config.get_document_files()
            } else {
                paths
            };
            let loaded = loaders::load_paths(&paths);
            for (path, err) in &loaded.failures {
                warn!(file = %path.display(), error = %err, "skipped file");
            }
            info!(
                documents = loaded.documents.len(),
                failed_files = loaded.failures.len(),
                "loaded documents"
            );

            let mode = if rebuild { OpenMode::Rebuild } else { OpenMode::Ingest };
            let index = Arc::new(TokioMutex::new(open_index(config, mode, embedder.as_ref())?));
            let chunker = Chunker::new(config.chunking)?;
            let ingestor =
                Ingestor::new(index, embedder, chunker, policy, config.embedding.batch_size)?;

            let cancel = cancel_on_ctrl_c();
            let report = ingestor.ingest_with_cancel(&loaded.documents, &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            match report.aborted {
                Some(reason) => bail!("ingestion stopped early: {reason}"),
                None => Ok(()),
            }
        }
        Command::Query { query, k, filter } => {
            let filter = parse_filter(filter.as_deref())?;
            let index = open_index(config, OpenMode::Query, embedder.as_ref())?;
            let retriever = Retriever::new(Arc::new(TokioMutex::new(index)), embedder, policy);

            let k = k.unwrap_or(config.retrieval.top_k);
            let result = retriever
                .retrieve(&query, k, filter.as_ref(), &cancel_on_ctrl_c())
                .await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Command::Ask { question, filter } => {
            let filter = parse_filter(filter.as_deref())?;
            let composer = composer(config, embedder, generator, policy)?;
            let answer = composer
                .answer_with(&question, filter.as_ref(), &cancel_on_ctrl_c())
                .await?;
            println!("{}", serde_json::to_string_pretty(&answer)?);
            Ok(())
        }
        Command::Serve => {
            let composer = composer(config, embedder, generator, policy)?;
            let ctx = McpContext {
                composer: Arc::new(composer),
                config: Arc::new(config.clone()),
            };
            McpServer::new(ctx).start().await
        }
        Command::Collections | Command::DownloadModel { .. } => {
            bail!("command does not need the async runtime")
        }
    }
}

fn open_index(config: &Config, mode: OpenMode, embedder: &dyn Embedder) -> Result<VectorIndex> {
    let db = Db::open(&config.db_path).context("failed to open vector store")?;
    let index = VectorIndex::open(
        db,
        &config.collection,
        mode,
        embedder.dimensions(),
        embedder.model_name(),
    )?;
    Ok(index)
}

fn composer(
    config: &Config,
    embedder: Arc<dyn Embedder>,
    generator: Option<Arc<dyn Generator>>,
    policy: RetryPolicy,
) -> Result<AnswerComposer> {
    let Some(generator) = generator else {
        bail!("no generator configured");
    };
    let index = open_index(config, OpenMode::Query, embedder.as_ref())?;
    let retriever = Retriever::new(Arc::new(TokioMutex::new(index)), embedder, policy);
    Ok(AnswerComposer::new(
        retriever,
        generator,
        config.retrieval.top_k,
        config.answer.max_context_chars,
        policy,
    )?)
}

fn parse_filter(raw: Option<&str>) -> Result<Option<MetadataFilter>> {
    raw.map(|s| serde_json::from_str(s).context("invalid --filter JSON"))
        .transpose()
}

/// Token cancelled on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling");
            child.cancel();
        }
    });
    token
}
