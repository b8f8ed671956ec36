use crate::indexer::FileIndexer;
use crate::models::{FileEntry, IndexStats};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};
use tracing::{debug, warn};

/// Called after each file finishes with `(completed, total, path)`.
pub type ProgressCallback = Arc<dyn Fn(usize, usize, &str) + Send + Sync>;

pub struct ParallelIndexer {
    file_indexer: Arc<FileIndexer>,
    max_concurrency: usize,
}

impl ParallelIndexer {
    pub fn new(file_indexer: Arc<FileIndexer>, max_concurrency: usize) -> Self {
        Self {
            file_indexer,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub async fn index_all(
        &self,
        files: Vec<FileEntry>,
        known: Arc<HashMap<String, f64>>,
        progress: Option<ProgressCallback>,
    ) -> IndexStats {
        let total = files.len();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks: JoinSet<Result<bool, String>> = JoinSet::new();
        let mut paths: HashMap<Id, String> = HashMap::with_capacity(total);

        for entry in files {
            let semaphore = semaphore.clone();
            let indexer = self.file_indexer.clone();
            let known_mtime = known.get(&entry.relative_path).copied();
            let path = entry.relative_path.clone();

            let handle = tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                indexer
                    .index_file(&entry.relative_path, &entry.full_path, known_mtime)
                    .await
                    .map_err(|err| err.to_string())
            });
            paths.insert(handle.id(), path);
        }

        let mut stats = IndexStats::default();
        let mut completed = 0;

        while let Some(joined) = tasks.join_next_with_id().await {
            completed += 1;
            // Panics and cancellations surface here and still name their file.
            let (id, result) = match joined {
                Ok((id, outcome)) => (id, outcome),
                Err(join_error) => (
                    join_error.id(),
                    Err(format!("indexing task failed: {join_error}")),
                ),
            };
            let path = paths.remove(&id).unwrap_or_default();

            match result {
                Ok(true) => stats.updated += 1,
                Ok(false) => stats.skipped += 1,
                Err(message) => {
                    warn!(path = %path, error = %message, "failed to index file");
                    stats.failed += 1;
                    stats.errors.push(format!("{path}: {message}"));
                }
            }

            if let Some(callback) = &progress {
                callback(completed, total, &path);
            }
        }

        debug!(
            updated = stats.updated,
            skipped = stats.skipped,
            failed = stats.failed,
            "parallel indexing finished"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexingOptions;
    use crate::dispatcher::ChunkDispatcher;
    use crate::embeddings::{CharacterNgramEmbedder, Embedder};
    use crate::error::IndexError;
    use crate::stores::MemoryStore;
    use crate::traits::VectorStore;
    use async_trait::async_trait;
    use std::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::tempdir;

    const COLLECTION: &str = "code_test";

    struct SlowEmbedder {
        inner: CharacterNgramEmbedder,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for SlowEmbedder {
        fn model_name(&self) -> &str {
            "slow"
        }

        fn native_dimension(&self) -> usize {
            self.inner.dimensions
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.inner.embed_batch(texts).await
        }
    }

    struct PanickingEmbedder;

    #[async_trait]
    impl Embedder for PanickingEmbedder {
        fn model_name(&self) -> &str {
            "panicking"
        }

        fn native_dimension(&self) -> usize {
            16
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexError> {
            if texts.iter().any(|text| text.contains("boom")) {
                panic!("embedder blew up");
            }
            CharacterNgramEmbedder { dimensions: 16 }.embed_batch(texts).await
        }
    }

    async fn parallel_indexer(
        embedder: Arc<dyn Embedder>,
        max_concurrency: usize,
    ) -> Result<(Arc<MemoryStore>, ParallelIndexer), Box<dyn Error>> {
        let store = Arc::new(MemoryStore::new());
        store.create_collection(COLLECTION, 16).await?;
        let file_indexer = FileIndexer::new(
            store.clone(),
            embedder,
            ChunkDispatcher::new(IndexingOptions::default())?,
            COLLECTION,
        );
        Ok((store, ParallelIndexer::new(Arc::new(file_indexer), max_concurrency)))
    }

    fn write_files(dir: &std::path::Path, count: usize) -> Result<Vec<FileEntry>, std::io::Error> {
        (0..count)
            .map(|n| {
                let name = format!("module_{n}.py");
                let full = dir.join(&name);
                std::fs::write(&full, format!("def handler_{n}(event):\n    return event * {n}\n"))?;
                Ok(FileEntry::new(name, full))
            })
            .collect()
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_rest() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let mut files = write_files(dir.path(), 4)?;
        files.push(FileEntry::new("missing.py", dir.path().join("missing.py")));
        let (store, parallel) =
            parallel_indexer(Arc::new(CharacterNgramEmbedder { dimensions: 16 }), 3).await?;

        let stats = parallel.index_all(files, Arc::new(HashMap::new()), None).await;

        assert_eq!(stats.updated, 4);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.errors.len(), 1);
        assert!(stats.errors[0].starts_with("missing.py"));
        assert_eq!(store.point_count(COLLECTION), 4);
        Ok(())
    }

    #[tokio::test]
    async fn panic_is_reported_against_its_file() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let mut files = write_files(dir.path(), 2)?;
        let full = dir.path().join("explode.py");
        std::fs::write(&full, "def boom():\n    raise SystemExit\n")?;
        files.push(FileEntry::new("explode.py", full));
        let (_, parallel) = parallel_indexer(Arc::new(PanickingEmbedder), 2).await?;

        let stats = parallel.index_all(files, Arc::new(HashMap::new()), None).await;

        assert_eq!(stats.updated, 2);
        assert_eq!(stats.failed, 1);
        assert!(stats.errors[0].starts_with("explode.py: indexing task failed"));
        Ok(())
    }

    #[tokio::test]
    async fn panicked_file_still_reports_progress() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let full = dir.path().join("explode.py");
        std::fs::write(&full, "def boom():\n    raise SystemExit\n")?;
        let files = vec![FileEntry::new("explode.py", full)];
        let (_, parallel) = parallel_indexer(Arc::new(PanickingEmbedder), 1).await?;

        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ProgressCallback = Arc::new(move |_done: usize, _total: usize, path: &str| {
            if let Ok(mut calls) = sink.lock() {
                calls.push(path.to_string());
            }
        });

        let stats = parallel.index_all(files, Arc::new(HashMap::new()), Some(callback)).await;

        assert_eq!(stats.failed, 1);
        let calls = seen.lock().map(|calls| calls.clone()).unwrap_or_default();
        assert_eq!(calls, vec!["explode.py".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn progress_reports_every_file() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let files = write_files(dir.path(), 5)?;
        let (_, parallel) =
            parallel_indexer(Arc::new(CharacterNgramEmbedder { dimensions: 16 }), 2).await?;

        let seen: Arc<Mutex<Vec<(usize, usize, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ProgressCallback = Arc::new(move |done: usize, total: usize, path: &str| {
            if let Ok(mut calls) = sink.lock() {
                calls.push((done, total, path.to_string()));
            }
        });

        let stats = parallel.index_all(files, Arc::new(HashMap::new()), Some(callback)).await;
        assert_eq!(stats.processed(), 5);

        let calls = seen.lock().map(|calls| calls.clone()).unwrap_or_default();
        assert_eq!(calls.len(), 5);
        let counts: Vec<usize> = calls.iter().map(|(done, _, _)| *done).collect();
        assert_eq!(counts, vec![1, 2, 3, 4, 5]);
        assert!(calls.iter().all(|(_, total, _)| *total == 5));
        Ok(())
    }

    #[tokio::test]
    async fn concurrency_is_bounded() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let files = write_files(dir.path(), 8)?;
        let embedder = Arc::new(SlowEmbedder {
            inner: CharacterNgramEmbedder { dimensions: 16 },
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let (_, parallel) = parallel_indexer(embedder.clone(), 2).await?;

        let stats = parallel.index_all(files, Arc::new(HashMap::new()), None).await;

        assert_eq!(stats.updated, 8);
        assert!(embedder.peak.load(Ordering::SeqCst) <= 2);
        Ok(())
    }

    #[tokio::test]
    async fn known_files_are_skipped() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let files = write_files(dir.path(), 3)?;
        let (_, parallel) =
            parallel_indexer(Arc::new(CharacterNgramEmbedder { dimensions: 16 }), 4).await?;

        let known: HashMap<String, f64> = files
            .iter()
            .map(|entry| (entry.relative_path.clone(), f64::MAX))
            .collect();
        let stats = parallel.index_all(files, Arc::new(known), None).await;

        assert_eq!(stats.skipped, 3);
        assert_eq!(stats.updated, 0);
        Ok(())
    }
}
