pub mod chunking;
pub mod config;
pub mod dimensions;
pub mod discovery;
pub mod dispatcher;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod indexer;
pub mod markdown;
pub mod models;
pub mod orchestrator;
pub mod parallel;
pub mod scoring;
pub mod stores;
pub mod structured_data;
pub mod syntax;
pub mod traits;

pub use chunking::{chunk_by_paragraph, generate_boundaries, sliding_window, ChunkingConfig};
pub use config::IndexingOptions;
pub use dimensions::{
    native_dimension_for, reconcile_collection, truncate_embedding, CollectionState,
    DimensionSource, DimensionedEmbedder, EmbeddingDimensionPolicy, FALLBACK_NATIVE_DIMENSION,
};
pub use discovery::{collection_name_for_root, discover_files};
pub use dispatcher::{ChunkDispatcher, ChunkOutcome, ChunkRoute, StrategyRefiner};
pub use embeddings::{CharacterNgramEmbedder, Embedder, HttpEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{IndexError, Result, StoreError};
pub use extractor::{HeuristicExtractor, SourceExtractor, StructureExtractor};
pub use indexer::{load_indexed_files, point_id, FileIndexer};
pub use markdown::chunk_by_sections;
pub use models::{
    ChunkBoundary, ChunkingStrategy, FileEntry, FileKind, IndexPoint, IndexStats, PointPayload,
    QualityScore, StructuralUnit, UnitKind,
};
pub use orchestrator::{CodebaseIndexer, IndexRunReport};
pub use parallel::{ParallelIndexer, ProgressCallback};
pub use scoring::score_strategy;
pub use stores::{MemoryStore, QdrantStore};
pub use structured_data::chunk_json;
pub use syntax::{Grammar, SyntaxTreeExtractor};
pub use traits::{PointFilter, ScrollPage, StoredPoint, VectorStore};
