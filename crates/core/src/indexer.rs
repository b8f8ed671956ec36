use crate::dispatcher::ChunkDispatcher;
use crate::embeddings::Embedder;
use crate::error::IndexError;
use crate::models::{IndexPoint, PointPayload, CODE_FILE_POINT_TYPE};
use crate::traits::{PointFilter, VectorStore};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};
use uuid::Uuid;

pub const SCROLL_PAGE_SIZE: usize = 10_000;

pub fn point_id(path: &str, chunk_index: usize) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, format!("{path}::{chunk_index}").as_bytes()).to_string()
}

pub struct FileIndexer {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    dispatcher: ChunkDispatcher,
    collection: String,
}

impl FileIndexer {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        dispatcher: ChunkDispatcher,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            store,
            embedder,
            dispatcher,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Returns `Ok(true)` when points were written, `Ok(false)` for benign
    /// skips (unchanged, undecodable, nothing to chunk). Points left over
    /// from a longer previous version are removed after the upsert.
    pub async fn index_file(
        &self,
        path: &str,
        full_path: &Path,
        known_mtime: Option<f64>,
    ) -> Result<bool, IndexError> {
        let mtime = modified_seconds(full_path).await?;
        if known_mtime.is_some_and(|known| known >= mtime) {
            debug!(path, "unchanged since last index");
            return Ok(false);
        }

        let bytes = tokio::fs::read(full_path).await?;
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(_) => {
                debug!(path, "not valid utf-8; skipping");
                return Ok(false);
            }
        };

        let dispatcher = self.dispatcher.clone();
        let owned_path = path.to_string();
        let outcome = tokio::task::spawn_blocking(move || dispatcher.chunk(&text, &owned_path))
            .await
            .map_err(|err| IndexError::Chunking(format!("{path}: {err}")))?;

        debug!(
            path,
            route = outcome.route.as_str(),
            score = outcome.score.map(|score| score.total()),
            chunks = outcome.strategy.len(),
            "chunked"
        );

        let contents = outcome.strategy.into_contents();
        if contents.is_empty() {
            return Ok(false);
        }

        let vectors = self.embedder.embed_batch(&contents).await?;
        if vectors.len() != contents.len() {
            return Err(IndexError::Embedding(format!(
                "{path}: {} vectors for {} chunks",
                vectors.len(),
                contents.len()
            )));
        }

        let total_chunks = contents.len() as u64;
        let points: Vec<IndexPoint> = contents
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(index, (content, vector))| IndexPoint {
                id: point_id(path, index),
                vector,
                payload: PointPayload {
                    path: path.to_string(),
                    content,
                    chunk_index: index as u64,
                    total_chunks,
                    last_modified: mtime,
                    kind: CODE_FILE_POINT_TYPE.to_string(),
                },
            })
            .collect();

        self.store.upsert(&self.collection, &points).await?;
        self.store
            .delete(&self.collection, &PointFilter::stale_chunks(path, total_chunks))
            .await?;

        Ok(true)
    }

    pub async fn remove_file(&self, path: &str) -> Result<(), IndexError> {
        self.store
            .delete(&self.collection, &PointFilter::for_path(path))
            .await?;
        Ok(())
    }
}

async fn modified_seconds(path: &Path) -> Result<f64, IndexError> {
    let modified = tokio::fs::metadata(path).await?.modified()?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or(0.0))
}

/// Latest recorded modification time per indexed path. Any store error
/// yields an empty map, which makes the next run re-index everything.
pub async fn load_indexed_files(store: &dyn VectorStore, collection: &str) -> HashMap<String, f64> {
    let mut indexed: HashMap<String, f64> = HashMap::new();
    let mut offset = None;

    loop {
        let page = match store.scroll(collection, offset, SCROLL_PAGE_SIZE).await {
            Ok(page) => page,
            Err(err) => {
                warn!(collection, error = %err, "could not list indexed files; treating all as new");
                return HashMap::new();
            }
        };

        for point in &page.points {
            let path = point.payload.get("path").and_then(Value::as_str);
            let mtime = point.payload.get("last_modified").and_then(Value::as_f64);
            if let (Some(path), Some(mtime)) = (path, mtime) {
                indexed
                    .entry(path.to_string())
                    .and_modify(|known| *known = known.max(mtime))
                    .or_insert(mtime);
            }
        }

        match page.next_offset {
            Some(next) => offset = Some(next),
            None => break,
        }
    }

    indexed
}
