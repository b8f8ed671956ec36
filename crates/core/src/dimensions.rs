use crate::embeddings::Embedder;
use crate::error::{IndexError, StoreError};
use crate::traits::VectorStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

pub const FALLBACK_NATIVE_DIMENSION: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatryoshkaModel {
    pub name: &'static str,
    pub native_dimension: usize,
    pub supported_dimensions: &'static [usize],
}

impl MatryoshkaModel {
    pub fn supports(&self, dimension: usize) -> bool {
        self.supported_dimensions.contains(&dimension)
    }

    pub fn closest_supported(&self, requested: usize) -> usize {
        self.supported_dimensions
            .iter()
            .copied()
            .min_by_key(|candidate| candidate.abs_diff(requested))
            .unwrap_or(self.native_dimension)
    }
}

pub const MATRYOSHKA_MODELS: &[MatryoshkaModel] = &[
    MatryoshkaModel {
        name: "qwen3-embedding:8b",
        native_dimension: 4096,
        supported_dimensions: &[128, 256, 512, 1024, 2048, 4096],
    },
    MatryoshkaModel {
        name: "qwen3-embedding:4b",
        native_dimension: 2560,
        supported_dimensions: &[128, 256, 512, 1024, 2560],
    },
    MatryoshkaModel {
        name: "qwen3-embedding:0.6b",
        native_dimension: 1024,
        supported_dimensions: &[128, 256, 512, 768, 1024],
    },
    MatryoshkaModel {
        name: "nomic-embed-text",
        native_dimension: 768,
        supported_dimensions: &[128, 256, 384, 512, 768],
    },
];

pub const KNOWN_NATIVE_DIMENSIONS: &[(&str, usize)] = &[
    ("text-embedding-3-small", 1536),
    ("text-embedding-3-large", 3072),
    ("text-embedding-ada-002", 1536),
    ("mxbai-embed-large", 1024),
    ("nomic-embed-text", 768),
    ("all-minilm", 384),
    ("bge-small-en", 384),
    ("bge-base-en", 768),
    ("bge-large-en", 1024),
    ("snowflake-arctic-embed:s", 384),
    ("snowflake-arctic-embed:m", 768),
    ("snowflake-arctic-embed:l", 1024),
    ("qwen3-embedding:8b", 4096),
    ("qwen3-embedding:4b", 2560),
    ("qwen3-embedding:0.6b", 1024),
];

pub fn normalize_model_name(model: &str) -> &str {
    let base = model.rsplit('/').next().unwrap_or(model);
    base.strip_suffix(":latest").unwrap_or(base)
}

pub fn matryoshka_model(model: &str) -> Option<&'static MatryoshkaModel> {
    let name = normalize_model_name(model);
    MATRYOSHKA_MODELS.iter().find(|entry| entry.name == name)
}

pub fn native_dimension_for(model: &str) -> Option<usize> {
    let name = normalize_model_name(model);
    KNOWN_NATIVE_DIMENSIONS
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, dimension)| *dimension)
}

pub fn truncate_embedding(mut vector: Vec<f32>, dimension: usize) -> Vec<f32> {
    vector.truncate(dimension);
    vector
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionSource {
    Explicit,
    Environment,
    Native,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingDimensionPolicy {
    pub model_name: String,
    pub native_dimension: usize,
    pub target_dimension: usize,
    pub supports_truncation: bool,
    pub source: DimensionSource,
}

impl EmbeddingDimensionPolicy {
    /// Picks the target dimension: explicit request, then environment
    /// override, then the model's native size. A request the model cannot
    /// honor is logged and replaced by the native size.
    pub fn resolve(
        model_name: &str,
        native_dimension: usize,
        explicit: Option<usize>,
        env_override: Option<usize>,
    ) -> Self {
        let model = matryoshka_model(model_name);
        let requested = explicit
            .map(|dimension| (dimension, DimensionSource::Explicit))
            .or_else(|| env_override.map(|dimension| (dimension, DimensionSource::Environment)));

        let (target_dimension, source) = match requested {
            None => (native_dimension, DimensionSource::Native),
            Some((dimension, source)) if dimension == native_dimension => (dimension, source),
            Some((dimension, source)) => match model {
                Some(entry) if entry.supports(dimension) && dimension < native_dimension => {
                    (dimension, source)
                }
                Some(entry) => {
                    warn!(
                        model = model_name,
                        requested = dimension,
                        supported = ?entry.supported_dimensions,
                        closest = entry.closest_supported(dimension),
                        "requested embedding dimension is not supported; using native dimension"
                    );
                    (native_dimension, DimensionSource::Native)
                }
                None => {
                    warn!(
                        model = model_name,
                        requested = dimension,
                        native = native_dimension,
                        "model does not support truncation; using native dimension"
                    );
                    (native_dimension, DimensionSource::Native)
                }
            },
        };

        Self {
            model_name: model_name.to_string(),
            native_dimension,
            target_dimension,
            supports_truncation: model.is_some(),
            source,
        }
    }

    pub fn needs_truncation(&self) -> bool {
        self.target_dimension < self.native_dimension
    }

    pub fn apply(&self, vector: Vec<f32>) -> Result<Vec<f32>, IndexError> {
        let vector = if self.needs_truncation() {
            truncate_embedding(vector, self.target_dimension)
        } else {
            vector
        };
        if vector.len() != self.target_dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.target_dimension,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }
}

pub struct DimensionedEmbedder {
    inner: Arc<dyn Embedder>,
    policy: EmbeddingDimensionPolicy,
}

impl DimensionedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, policy: EmbeddingDimensionPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &EmbeddingDimensionPolicy {
        &self.policy
    }

    pub fn dimension(&self) -> usize {
        self.policy.target_dimension
    }
}

#[async_trait]
impl Embedder for DimensionedEmbedder {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn native_dimension(&self) -> usize {
        self.inner.native_dimension()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexError> {
        self.inner
            .embed_batch(texts)
            .await?
            .into_iter()
            .map(|vector| self.policy.apply(vector))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionState {
    Created { dimension: usize },
    Ready { dimension: usize },
    Recreated { previous: Option<usize>, dimension: usize },
    DimensionMismatch { stored: usize, expected: usize },
    Unavailable { reason: String },
}

impl CollectionState {
    pub fn indexing_enabled(&self) -> bool {
        matches!(
            self,
            Self::Created { .. } | Self::Ready { .. } | Self::Recreated { .. }
        )
    }

    pub fn disabled_reason(&self) -> Option<String> {
        match self {
            Self::DimensionMismatch { stored, expected } => Some(format!(
                "collection stores {stored}-dimensional vectors but the embedder produces {expected}; \
                 re-run with force recreate to rebuild it"
            )),
            Self::Unavailable { reason } => Some(format!("vector store unavailable: {reason}")),
            _ => None,
        }
    }
}

/// Makes the collection safe to write `dimension`-sized vectors into.
/// A mismatched collection is left untouched unless `force_recreate` is set;
/// store failures disable indexing instead of failing the caller.
pub async fn reconcile_collection(
    store: &dyn VectorStore,
    collection: &str,
    dimension: usize,
    force_recreate: bool,
) -> CollectionState {
    match try_reconcile(store, collection, dimension, force_recreate).await {
        Ok(state) => state,
        Err(err) => {
            error!(collection, error = %err, "vector store unavailable; indexing disabled");
            CollectionState::Unavailable {
                reason: err.to_string(),
            }
        }
    }
}

async fn try_reconcile(
    store: &dyn VectorStore,
    collection: &str,
    dimension: usize,
    force_recreate: bool,
) -> Result<CollectionState, StoreError> {
    if !store.collection_exists(collection).await? {
        store.create_collection(collection, dimension).await?;
        info!(collection, dimension, "created collection");
        return Ok(CollectionState::Created { dimension });
    }

    let stored = store.collection_vector_size(collection).await?;

    if force_recreate {
        warn!(collection, ?stored, dimension, "force recreating collection");
        store.delete_collection(collection).await?;
        store.create_collection(collection, dimension).await?;
        return Ok(CollectionState::Recreated {
            previous: stored,
            dimension,
        });
    }

    Ok(match stored {
        Some(size) if size == dimension => CollectionState::Ready { dimension },
        Some(size) => {
            error!(
                collection,
                stored = size,
                expected = dimension,
                "collection dimension mismatch; indexing disabled and existing data kept"
            );
            CollectionState::DimensionMismatch {
                stored: size,
                expected: dimension,
            }
        }
        None => CollectionState::Unavailable {
            reason: format!("could not read the vector size of {collection}"),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::stores::MemoryStore;

    #[test]
    fn truncation_keeps_prefix() {
        let vector: Vec<f32> = (0..8).map(|n| n as f32).collect();
        assert_eq!(truncate_embedding(vector.clone(), 3), vec![0.0, 1.0, 2.0]);
        assert_eq!(truncate_embedding(vector.clone(), 8), vector);
        assert_eq!(truncate_embedding(vector.clone(), 20), vector);
    }

    #[test]
    fn model_names_are_normalized() {
        assert_eq!(normalize_model_name("ollama/nomic-embed-text:latest"), "nomic-embed-text");
        assert_eq!(native_dimension_for("openai/text-embedding-3-small"), Some(1536));
        assert!(matryoshka_model("ollama/qwen3-embedding:4b").is_some());
        assert!(matryoshka_model("text-embedding-3-small").is_none());
    }

    #[test]
    fn explicit_request_beats_environment() {
        let policy =
            EmbeddingDimensionPolicy::resolve("qwen3-embedding:8b", 4096, Some(1024), Some(2048));
        assert_eq!(policy.target_dimension, 1024);
        assert_eq!(policy.source, DimensionSource::Explicit);
        assert!(policy.needs_truncation());

        let policy = EmbeddingDimensionPolicy::resolve("qwen3-embedding:8b", 4096, None, Some(2048));
        assert_eq!(policy.target_dimension, 2048);
        assert_eq!(policy.source, DimensionSource::Environment);

        let policy = EmbeddingDimensionPolicy::resolve("qwen3-embedding:8b", 4096, None, None);
        assert_eq!(policy.target_dimension, 4096);
        assert!(!policy.needs_truncation());
    }

    #[test]
    fn unsupported_request_falls_back_to_native() {
        let policy = EmbeddingDimensionPolicy::resolve("qwen3-embedding:8b", 4096, Some(1000), None);
        assert_eq!(policy.target_dimension, 4096);
        assert_eq!(policy.source, DimensionSource::Native);

        let policy = EmbeddingDimensionPolicy::resolve("text-embedding-3-small", 1536, Some(512), None);
        assert_eq!(policy.target_dimension, 1536);
        assert!(!policy.supports_truncation);
    }

    #[test]
    fn closest_supported_dimension() {
        let entry = matryoshka_model("qwen3-embedding:8b");
        assert_eq!(entry.map(|model| model.closest_supported(1000)), Some(1024));
    }

    #[tokio::test]
    async fn dimensioned_embedder_truncates() -> Result<(), IndexError> {
        let inner = Arc::new(CharacterNgramEmbedder { dimensions: 768 });
        let policy = EmbeddingDimensionPolicy::resolve("nomic-embed-text", 768, Some(256), None);
        let embedder = DimensionedEmbedder::new(inner, policy);

        let vectors = embedder.embed_batch(&["fn main() {}".to_string()]).await?;
        assert_eq!(vectors[0].len(), 256);
        assert_eq!(embedder.dimension(), 256);
        Ok(())
    }

    #[tokio::test]
    async fn short_vectors_are_rejected() {
        let inner = Arc::new(CharacterNgramEmbedder { dimensions: 64 });
        let policy = EmbeddingDimensionPolicy {
            model_name: "local".to_string(),
            native_dimension: 128,
            target_dimension: 128,
            supports_truncation: false,
            source: DimensionSource::Native,
        };
        let embedder = DimensionedEmbedder::new(inner, policy);
        let result = embedder.embed_batch(&["text".to_string()]).await;
        assert!(matches!(
            result,
            Err(IndexError::DimensionMismatch { expected: 128, actual: 64 })
        ));
    }

    #[tokio::test]
    async fn missing_collection_is_created() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        let state = reconcile_collection(&store, "code_demo", 128, false).await;
        assert_eq!(state, CollectionState::Created { dimension: 128 });
        assert_eq!(store.collection_vector_size("code_demo").await?, Some(128));
        Ok(())
    }

    #[tokio::test]
    async fn matching_collection_is_ready() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        store.create_collection("code_demo", 128).await?;
        let state = reconcile_collection(&store, "code_demo", 128, false).await;
        assert_eq!(state, CollectionState::Ready { dimension: 128 });
        assert!(state.indexing_enabled());
        Ok(())
    }

    #[tokio::test]
    async fn mismatch_disables_without_deleting() -> Result<(), Box<dyn std::error::Error>> {
        let store = MemoryStore::new();
        store.create_collection("code_demo", 4096).await?;
        let embedder = CharacterNgramEmbedder { dimensions: 4096 };
        let points = vec![crate::models::IndexPoint {
            id: "kept".to_string(),
            vector: embedder.embed("existing"),
            payload: crate::models::PointPayload {
                path: "a.rs".to_string(),
                content: "existing".to_string(),
                chunk_index: 0,
                total_chunks: 1,
                last_modified: 1.0,
                kind: crate::models::CODE_FILE_POINT_TYPE.to_string(),
            },
        }];
        store.upsert("code_demo", &points).await?;

        let state = reconcile_collection(&store, "code_demo", 1024, false).await;
        assert_eq!(
            state,
            CollectionState::DimensionMismatch {
                stored: 4096,
                expected: 1024
            }
        );
        assert!(!state.indexing_enabled());
        assert!(state.disabled_reason().is_some());
        assert_eq!(store.point_count("code_demo"), 1);
        assert_eq!(store.collection_vector_size("code_demo").await?, Some(4096));
        Ok(())
    }

    #[tokio::test]
    async fn force_recreate_rebuilds_with_new_dimension() -> Result<(), StoreError> {
        let store = MemoryStore::new();
        store.create_collection("code_demo", 4096).await?;
        let state = reconcile_collection(&store, "code_demo", 1024, true).await;
        assert_eq!(
            state,
            CollectionState::Recreated {
                previous: Some(4096),
                dimension: 1024
            }
        );
        assert_eq!(store.collection_vector_size("code_demo").await?, Some(1024));
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_store_disables_indexing() {
        let store = MemoryStore::new();
        store.set_available(false);
        let state = reconcile_collection(&store, "code_demo", 128, false).await;
        assert!(matches!(state, CollectionState::Unavailable { .. }));
        assert!(!state.indexing_enabled());
    }
}
