use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use code_index_core::{
    collection_name_for_root, discover_files, load_indexed_files, native_dimension_for,
    CharacterNgramEmbedder, ChunkDispatcher, CodebaseIndexer, Embedder, EmbeddingDimensionPolicy,
    HttpEmbedder, IndexingOptions, ProgressCallback, QdrantStore, VectorStore,
    FALLBACK_NATIVE_DIMENSION,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "code-index", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Qdrant API key
    #[arg(long, env = "QDRANT_API_KEY")]
    qdrant_api_key: Option<String>,

    /// Qdrant request timeout in seconds
    #[arg(long, env = "QDRANT_TIMEOUT_SECS", default_value = "30")]
    qdrant_timeout_secs: u64,

    /// Embedding backend
    #[arg(long, env = "EMBEDDER", value_enum, default_value_t = EmbedderKind::Ngram)]
    embedder: EmbedderKind,

    /// Base URL of an OpenAI-compatible embeddings API
    #[arg(long, env = "EMBEDDING_URL", default_value = "http://localhost:11434/v1")]
    embedding_url: String,

    /// Embedding model name
    #[arg(long, env = "EMBEDDING_MODEL", default_value = "nomic-embed-text")]
    embedding_model: String,

    /// Embedding API key
    #[arg(long, env = "EMBEDDING_API_KEY")]
    embedding_api_key: Option<String>,

    /// Native vector size of the embedding model when it is not a known model
    #[arg(long, env = "EMBEDDING_NATIVE_DIM")]
    embedding_native_dim: Option<usize>,

    /// Vector size of the local n-gram embedder
    #[arg(long, default_value = "128")]
    ngram_dimensions: usize,
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbedderKind {
    Ngram,
    Http,
}

#[derive(Args)]
struct ChunkingArgs {
    /// Target chunk size in characters
    #[arg(long)]
    chunk_size: Option<usize>,
    /// Minimum useful overlap in characters
    #[arg(long)]
    chunk_overlap: Option<usize>,
    /// Quality score needed to accept unit boundaries
    #[arg(long)]
    accept_threshold: Option<f64>,
}

#[derive(Subcommand)]
enum Command {
    /// Index a source tree into its collection.
    Index {
        /// Project root to walk.
        #[arg(long)]
        root: PathBuf,
        /// Collection name; derived from the root when omitted.
        #[arg(long)]
        collection: Option<String>,
        /// Prefix for derived collection names.
        #[arg(long, default_value = "code")]
        collection_prefix: String,
        /// Delete and rebuild the collection before indexing.
        #[arg(long, default_value_t = false)]
        force_recreate: bool,
        /// Requested embedding dimension.
        #[arg(long)]
        dimension: Option<usize>,
        /// Files indexed at once.
        #[arg(long)]
        concurrency: Option<usize>,
        #[command(flatten)]
        chunking: ChunkingArgs,
    },
    /// Show how one file would be chunked without touching any store.
    Chunk {
        #[arg(long)]
        file: PathBuf,
        /// Print each chunk's content.
        #[arg(long, default_value_t = false)]
        show_content: bool,
        #[command(flatten)]
        chunking: ChunkingArgs,
    },
    /// Show the collection state and how many files it holds.
    Status {
        #[arg(long)]
        root: PathBuf,
        #[arg(long)]
        collection: Option<String>,
        #[arg(long, default_value = "code")]
        collection_prefix: String,
    },
}

fn options_with(chunking: &ChunkingArgs) -> anyhow::Result<IndexingOptions> {
    let mut options = IndexingOptions::from_env()?;
    if let Some(size) = chunking.chunk_size {
        options.chunk_target_size = size;
    }
    if let Some(overlap) = chunking.chunk_overlap {
        options.min_overlap = overlap;
    }
    if let Some(threshold) = chunking.accept_threshold {
        options.accept_threshold = threshold;
    }
    options.validate()?;
    Ok(options)
}

fn build_embedder(cli: &Cli) -> anyhow::Result<Arc<dyn Embedder>> {
    match cli.embedder {
        EmbedderKind::Ngram => Ok(Arc::new(CharacterNgramEmbedder {
            dimensions: cli.ngram_dimensions,
        })),
        EmbedderKind::Http => {
            let native = cli
                .embedding_native_dim
                .or_else(|| native_dimension_for(&cli.embedding_model))
                .unwrap_or(FALLBACK_NATIVE_DIMENSION);
            let embedder = HttpEmbedder::new(&cli.embedding_url, &cli.embedding_model, native)?
                .with_api_key(cli.embedding_api_key.clone());
            Ok(Arc::new(embedder))
        }
    }
}

fn build_store(cli: &Cli) -> anyhow::Result<Arc<dyn VectorStore>> {
    let store = QdrantStore::new(
        &cli.qdrant_url,
        cli.qdrant_api_key.clone(),
        Duration::from_secs(cli.qdrant_timeout_secs),
    )?;
    Ok(Arc::new(store))
}

fn resolve_collection(root: &Path, collection: Option<String>, prefix: &str) -> anyhow::Result<(PathBuf, String)> {
    let root = std::fs::canonicalize(root)
        .with_context(|| format!("project root {} is not readable", root.display()))?;
    let name = collection.unwrap_or_else(|| collection_name_for_root(prefix, &root));
    Ok((root, name))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "code-index boot"
    );

    match &cli.command {
        Command::Index {
            root,
            collection,
            collection_prefix,
            force_recreate,
            dimension,
            concurrency,
            chunking,
        } => {
            let mut options = options_with(chunking)?;
            if let Some(concurrency) = concurrency {
                options.max_concurrency = *concurrency;
            }
            options.force_recreate |= *force_recreate;
            options.validate()?;

            let (root, collection) = resolve_collection(root, collection.clone(), collection_prefix)?;
            let files = discover_files(&root);
            info!(root = %root.display(), collection = %collection, files = files.len(), "discovered files");

            let indexer = CodebaseIndexer::new(
                build_store(&cli)?,
                build_embedder(&cli)?,
                ChunkDispatcher::new(options)?,
                collection,
                *dimension,
            )
            .await?;

            let progress: ProgressCallback = Arc::new(|done: usize, total: usize, path: &str| {
                info!(done, total, path, "indexed");
            });
            let report = indexer.index(files, Some(progress)).await;

            if let Some(reason) = &report.disabled_reason {
                bail!("indexing disabled for {}: {reason}", report.collection);
            }

            println!("collection: {}", report.collection);
            println!(
                "updated={} skipped={} failed={} removed={} elapsed_ms={}",
                report.stats.updated,
                report.stats.skipped,
                report.stats.failed,
                report.removed,
                report.elapsed_ms()
            );
            for error in &report.stats.errors {
                println!("  error: {error}");
            }
            println!("finished at {}", report.finished_at.to_rfc3339());
        }
        Command::Chunk {
            file,
            show_content,
            chunking,
        } => {
            let options = options_with(chunking)?;
            let dispatcher = ChunkDispatcher::new(options)?;
            let text = std::fs::read_to_string(file)
                .with_context(|| format!("{} is not readable utf-8 text", file.display()))?;
            let path = file.to_string_lossy();
            let outcome = dispatcher.chunk(&text, &path);

            println!("file: {path}");
            println!("kind: {:?}", dispatcher.classify(&path));
            println!("route: {}", outcome.route.as_str());
            if let Some(score) = outcome.score {
                println!(
                    "score: {:.3} (integrity={:.2} size={:.2} boundary={:.2} overlap={:.2})",
                    score.total(),
                    score.integrity,
                    score.size_balance,
                    score.boundary_quality,
                    score.overlap_adequacy
                );
            }
            println!("reasoning: {}", outcome.strategy.reasoning);
            for (index, chunk) in outcome.strategy.chunks.iter().enumerate() {
                println!(
                    "[{index}] lines {}-{} chars={} label={}",
                    chunk.start_line,
                    chunk.end_line,
                    chunk.char_len(),
                    chunk.label
                );
                if *show_content {
                    println!("{}", chunk.content);
                }
            }
        }
        Command::Status {
            root,
            collection,
            collection_prefix,
        } => {
            let (root, collection) = resolve_collection(root, collection.clone(), collection_prefix)?;
            let store = build_store(&cli)?;
            let embedder = build_embedder(&cli)?;
            let options = IndexingOptions::from_env()?;
            let policy = EmbeddingDimensionPolicy::resolve(
                embedder.model_name(),
                embedder.native_dimension(),
                None,
                options.dimension_override,
            );

            println!("root: {}", root.display());
            println!("collection: {collection}");
            println!("embedding: {} -> {} dims", policy.model_name, policy.target_dimension);

            if !store.collection_exists(&collection).await? {
                println!("state: missing (created on first index run)");
                return Ok(());
            }
            match store.collection_vector_size(&collection).await? {
                Some(size) if size == policy.target_dimension => println!("state: ready ({size} dims)"),
                Some(size) => println!(
                    "state: dimension mismatch (stored {size}, expected {}); run index --force-recreate",
                    policy.target_dimension
                ),
                None => println!("state: unreadable vector schema"),
            }

            let indexed = load_indexed_files(store.as_ref(), &collection).await;
            let on_disk = discover_files(&root).len();
            println!("indexed files: {} (on disk: {on_disk})", indexed.len());
        }
    }

    Ok(())
}
