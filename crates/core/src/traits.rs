use crate::error::StoreError;
use crate::models::IndexPoint;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Selects points by payload. Conditions are combined with AND; an empty
/// filter matches every point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointFilter {
    pub path: Option<String>,
    pub min_chunk_index: Option<u64>,
}

impl PointFilter {
    pub fn for_path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            min_chunk_index: None,
        }
    }

    pub fn stale_chunks(path: impl Into<String>, first_stale_index: u64) -> Self {
        Self {
            path: Some(path.into()),
            min_chunk_index: Some(first_stale_index),
        }
    }

    pub fn matches(&self, payload: &Value) -> bool {
        let path_ok = self.path.as_deref().map_or(true, |expected| {
            payload.get("path").and_then(Value::as_str) == Some(expected)
        });
        let index_ok = self.min_chunk_index.map_or(true, |min| {
            payload
                .get("chunk_index")
                .and_then(Value::as_u64)
                .is_some_and(|index| index >= min)
        });
        path_ok && index_ok
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredPoint {
    pub id: String,
    pub payload: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrollPage {
    pub points: Vec<StoredPoint>,
    pub next_offset: Option<String>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn collection_exists(&self, collection: &str) -> Result<bool, StoreError>;

    async fn collection_vector_size(&self, collection: &str) -> Result<Option<usize>, StoreError>;

    async fn create_collection(&self, collection: &str, vector_size: usize) -> Result<(), StoreError>;

    async fn delete_collection(&self, collection: &str) -> Result<(), StoreError>;

    async fn upsert(&self, collection: &str, points: &[IndexPoint]) -> Result<(), StoreError>;

    async fn delete(&self, collection: &str, filter: &PointFilter) -> Result<(), StoreError>;

    async fn scroll(
        &self,
        collection: &str,
        offset: Option<String>,
        limit: usize,
    ) -> Result<ScrollPage, StoreError>;
}
