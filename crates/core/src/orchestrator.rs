use crate::dimensions::{reconcile_collection, CollectionState, DimensionedEmbedder, EmbeddingDimensionPolicy};
use crate::dispatcher::ChunkDispatcher;
use crate::embeddings::Embedder;
use crate::error::IndexError;
use crate::indexer::{load_indexed_files, FileIndexer};
use crate::models::{FileEntry, IndexStats};
use crate::parallel::{ParallelIndexer, ProgressCallback};
use crate::traits::VectorStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct IndexRunReport {
    pub collection: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stats: IndexStats,
    pub removed: usize,
    pub disabled_reason: Option<String>,
}

impl IndexRunReport {
    pub fn elapsed_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

pub struct CodebaseIndexer {
    store: Arc<dyn VectorStore>,
    file_indexer: Arc<FileIndexer>,
    parallel: ParallelIndexer,
    collection: String,
    policy: EmbeddingDimensionPolicy,
    state: CollectionState,
}

pub fn validate_collection_name(collection: &str) -> Result<(), IndexError> {
    if collection.contains('_') || collection.contains('-') {
        return Ok(());
    }
    Err(IndexError::InvalidConfig(format!(
        "collection name {collection:?} needs a `_` or `-` separated suffix to avoid collisions"
    )))
}

impl CodebaseIndexer {
    pub async fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        dispatcher: ChunkDispatcher,
        collection: impl Into<String>,
        explicit_dimension: Option<usize>,
    ) -> Result<Self, IndexError> {
        let collection = collection.into();
        let options = dispatcher.options().clone();
        options.validate()?;
        validate_collection_name(&collection)?;
        if explicit_dimension == Some(0) {
            return Err(IndexError::InvalidConfig(
                "embedding dimension must be positive".to_string(),
            ));
        }

        let policy = EmbeddingDimensionPolicy::resolve(
            embedder.model_name(),
            embedder.native_dimension(),
            explicit_dimension,
            options.dimension_override,
        );
        info!(
            collection = %collection,
            model = %policy.model_name,
            native = policy.native_dimension,
            target = policy.target_dimension,
            "resolved embedding dimension"
        );

        let state = reconcile_collection(
            store.as_ref(),
            &collection,
            policy.target_dimension,
            options.force_recreate,
        )
        .await;

        let embedder: Arc<dyn Embedder> = Arc::new(DimensionedEmbedder::new(embedder, policy.clone()));
        let file_indexer = Arc::new(FileIndexer::new(
            store.clone(),
            embedder,
            dispatcher,
            collection.clone(),
        ));
        let parallel = ParallelIndexer::new(file_indexer.clone(), options.max_concurrency);

        Ok(Self {
            store,
            file_indexer,
            parallel,
            collection,
            policy,
            state,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn policy(&self) -> &EmbeddingDimensionPolicy {
        &self.policy
    }

    pub fn state(&self) -> &CollectionState {
        &self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.state.indexing_enabled()
    }

    /// Deletes and recreates the collection at the target dimension. This is
    /// the only path that discards stored vectors.
    pub async fn force_recreate(&mut self) -> &CollectionState {
        self.state = reconcile_collection(
            self.store.as_ref(),
            &self.collection,
            self.policy.target_dimension,
            true,
        )
        .await;
        &self.state
    }

    pub async fn indexed_files(&self) -> HashMap<String, f64> {
        load_indexed_files(self.store.as_ref(), &self.collection).await
    }

    pub async fn index(&self, files: Vec<FileEntry>, progress: Option<ProgressCallback>) -> IndexRunReport {
        let started_at = Utc::now();

        if let Some(reason) = self.state.disabled_reason() {
            warn!(collection = %self.collection, %reason, "indexing disabled");
            return IndexRunReport {
                collection: self.collection.clone(),
                started_at,
                finished_at: Utc::now(),
                stats: IndexStats::default(),
                removed: 0,
                disabled_reason: Some(reason),
            };
        }

        let known = self.indexed_files().await;
        let current: HashSet<&str> = files.iter().map(|entry| entry.relative_path.as_str()).collect();
        let mut vanished: Vec<&String> = known
            .keys()
            .filter(|path| !current.contains(path.as_str()))
            .collect();
        vanished.sort();

        let mut removed = 0;
        for path in vanished {
            match self.file_indexer.remove_file(path).await {
                Ok(()) => removed += 1,
                Err(err) => warn!(path = %path, error = %err, "failed to remove vanished file"),
            }
        }

        info!(
            collection = %self.collection,
            files = files.len(),
            known = known.len(),
            removed,
            "indexing started"
        );

        let stats = self.parallel.index_all(files, Arc::new(known), progress).await;
        let finished_at = Utc::now();

        info!(
            collection = %self.collection,
            updated = stats.updated,
            skipped = stats.skipped,
            failed = stats.failed,
            elapsed_ms = (finished_at - started_at).num_milliseconds(),
            "indexing finished"
        );

        IndexRunReport {
            collection: self.collection.clone(),
            started_at,
            finished_at,
            stats,
            removed,
            disabled_reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexingOptions;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::stores::MemoryStore;
    use std::error::Error;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    const COLLECTION: &str = "code_demo";

    async fn indexer(store: Arc<MemoryStore>, options: IndexingOptions) -> Result<CodebaseIndexer, IndexError> {
        CodebaseIndexer::new(
            store,
            Arc::new(CharacterNgramEmbedder { dimensions: 16 }),
            ChunkDispatcher::new(options)?,
            COLLECTION,
            None,
        )
        .await
    }

    fn write(root: &Path, name: &str, body: &str) -> Result<FileEntry, std::io::Error> {
        let full = root.join(name);
        fs::write(&full, body)?;
        Ok(FileEntry::new(name, full))
    }

    #[tokio::test]
    async fn collection_name_needs_a_suffix() -> Result<(), Box<dyn Error>> {
        let result = CodebaseIndexer::new(
            Arc::new(MemoryStore::new()),
            Arc::new(CharacterNgramEmbedder::default()),
            ChunkDispatcher::new(IndexingOptions::default())?,
            "code",
            None,
        )
        .await;
        assert!(matches!(result, Err(IndexError::InvalidConfig(_))));
        Ok(())
    }

    #[tokio::test]
    async fn inconsistent_options_are_rejected() -> Result<(), Box<dyn Error>> {
        let options = IndexingOptions {
            chunk_target_size: 100,
            min_overlap: 100,
            ..IndexingOptions::default()
        };
        let result = indexer(Arc::new(MemoryStore::new()), options).await;
        assert!(matches!(result, Err(IndexError::InvalidConfig(_))));
        Ok(())
    }

    #[tokio::test]
    async fn incremental_runs_skip_unchanged_and_prune_vanished() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let a = write(dir.path(), "a.py", "def alpha():\n    return 1\n")?;
        let b = write(dir.path(), "b.py", "def beta():\n    return 2\n")?;
        let store = Arc::new(MemoryStore::new());
        let indexer = indexer(store.clone(), IndexingOptions::default()).await?;
        assert_eq!(indexer.state(), &CollectionState::Created { dimension: 16 });

        let first = indexer.index(vec![a.clone(), b], None).await;
        assert_eq!(first.stats.updated, 2);
        assert_eq!(first.removed, 0);
        assert!(first.disabled_reason.is_none());

        let second = indexer.index(vec![a], None).await;
        assert_eq!(second.stats.skipped, 1);
        assert_eq!(second.stats.updated, 0);
        assert_eq!(second.removed, 1);
        assert!(store.point_ids_for_path(COLLECTION, "b.py").is_empty());
        assert_eq!(indexer.indexed_files().await.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn mismatch_disables_until_forced() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let a = write(dir.path(), "a.py", "def alpha():\n    return 1\n")?;
        let store = Arc::new(MemoryStore::new());
        store.create_collection(COLLECTION, 4096).await?;

        let mut indexer = indexer(store.clone(), IndexingOptions::default()).await?;
        assert!(!indexer.is_enabled());

        let report = indexer.index(vec![a.clone()], None).await;
        assert!(report.disabled_reason.is_some());
        assert_eq!(report.stats.processed(), 0);
        assert_eq!(store.collection_vector_size(COLLECTION).await?, Some(4096));

        let state = indexer.force_recreate().await.clone();
        assert_eq!(
            state,
            CollectionState::Recreated {
                previous: Some(4096),
                dimension: 16
            }
        );
        let report = indexer.index(vec![a], None).await;
        assert_eq!(report.stats.updated, 1);
        Ok(())
    }

    #[tokio::test]
    async fn unsupported_dimension_request_uses_native() -> Result<(), Box<dyn Error>> {
        let indexer = CodebaseIndexer::new(
            Arc::new(MemoryStore::new()),
            Arc::new(CharacterNgramEmbedder { dimensions: 16 }),
            ChunkDispatcher::new(IndexingOptions::default())?,
            COLLECTION,
            Some(8),
        )
        .await?;
        assert_eq!(indexer.policy().target_dimension, 16);
        Ok(())
    }

    #[tokio::test]
    async fn unavailable_store_disables_runs() -> Result<(), Box<dyn Error>> {
        let store = Arc::new(MemoryStore::new());
        store.set_available(false);
        let indexer = indexer(store, IndexingOptions::default()).await?;
        assert!(matches!(indexer.state(), CollectionState::Unavailable { .. }));
        let report = indexer.index(Vec::new(), None).await;
        assert!(report.disabled_reason.is_some());
        Ok(())
    }
}
