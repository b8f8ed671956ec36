use crate::error::StoreError;
use crate::models::IndexPoint;
use crate::traits::{PointFilter, ScrollPage, StoredPoint, VectorStore};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

const BACKEND: &str = "qdrant";

pub struct QdrantStore {
    endpoint: String,
    api_key: Option<String>,
    client: Client,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Serialize)]
struct ScrollRequest {
    limit: usize,
    offset: Option<String>,
    with_payload: bool,
    with_vector: bool,
}

impl QdrantStore {
    pub fn new(endpoint: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, StoreError> {
        let parsed = Url::parse(endpoint)?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: parsed.as_str().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|key| !key.is_empty()),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("api-key", key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        Ok(self.authorized(request).send().await?)
    }

    async fn expect_success(response: Response) -> Result<Value, StoreError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::BackendResponse {
                backend: BACKEND.to_string(),
                details: format!("{status}: {}", body.chars().take(300).collect::<String>()),
            });
        }
        Ok(response.json().await?)
    }
}

pub(crate) fn filter_body(filter: &PointFilter) -> Value {
    let mut must = Vec::new();
    if let Some(path) = &filter.path {
        must.push(json!({ "key": "path", "match": { "value": path } }));
    }
    if let Some(min) = filter.min_chunk_index {
        must.push(json!({ "key": "chunk_index", "range": { "gte": min } }));
    }
    json!({ "filter": { "must": must } })
}

pub(crate) fn vector_size_from_info(info: &Value) -> Option<usize> {
    let vectors = info.pointer("/result/config/params/vectors")?;
    if let Some(size) = vectors.get("size").and_then(Value::as_u64) {
        return Some(size as usize);
    }
    let named = vectors.as_object()?;
    let entry = match named.get("") {
        Some(entry) => entry,
        None if named.len() == 1 => named.values().next()?,
        None => return None,
    };
    entry.get("size").and_then(Value::as_u64).map(|size| size as usize)
}

fn point_id_text(id: &Value) -> Option<String> {
    match id {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn collection_exists(&self, collection: &str) -> Result<bool, StoreError> {
        let response = self
            .send(self.client.get(self.url(&format!("/collections/{collection}/exists"))))
            .await?;
        let body = Self::expect_success(response).await?;
        body.pointer("/result/exists")
            .and_then(Value::as_bool)
            .ok_or_else(|| StoreError::BackendResponse {
                backend: BACKEND.to_string(),
                details: "exists response without result.exists".to_string(),
            })
    }

    async fn collection_vector_size(&self, collection: &str) -> Result<Option<usize>, StoreError> {
        let response = self
            .send(self.client.get(self.url(&format!("/collections/{collection}"))))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::MissingCollection(collection.to_string()));
        }
        let body = Self::expect_success(response).await?;
        Ok(vector_size_from_info(&body))
    }

    async fn create_collection(&self, collection: &str, vector_size: usize) -> Result<(), StoreError> {
        let response = self
            .send(
                self.client
                    .put(self.url(&format!("/collections/{collection}")))
                    .json(&json!({ "vectors": { "size": vector_size, "distance": "Cosine" } })),
            )
            .await?;

        // Another process may have created it between the exists check and now.
        if response.status() == StatusCode::CONFLICT {
            tracing::debug!(collection, "collection already exists");
            return Ok(());
        }
        Self::expect_success(response).await.map(|_| ())
    }

    async fn delete_collection(&self, collection: &str) -> Result<(), StoreError> {
        let response = self
            .send(self.client.delete(self.url(&format!("/collections/{collection}"))))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::expect_success(response).await.map(|_| ())
    }

    async fn upsert(&self, collection: &str, points: &[IndexPoint]) -> Result<(), StoreError> {
        if points.is_empty() {
            return Ok(());
        }

        let body = points
            .iter()
            .map(|point| {
                Ok(json!({
                    "id": point.id,
                    "vector": point.vector,
                    "payload": serde_json::to_value(&point.payload)?,
                }))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let response = self
            .send(
                self.client
                    .put(self.url(&format!("/collections/{collection}/points?wait=true")))
                    .json(&json!({ "points": body })),
            )
            .await?;
        Self::expect_success(response).await.map(|_| ())
    }

    async fn delete(&self, collection: &str, filter: &PointFilter) -> Result<(), StoreError> {
        let response = self
            .send(
                self.client
                    .post(self.url(&format!("/collections/{collection}/points/delete?wait=true")))
                    .json(&filter_body(filter)),
            )
            .await?;
        Self::expect_success(response).await.map(|_| ())
    }

    async fn scroll(
        &self,
        collection: &str,
        offset: Option<String>,
        limit: usize,
    ) -> Result<ScrollPage, StoreError> {
        let request = ScrollRequest {
            limit,
            offset,
            with_payload: true,
            with_vector: false,
        };
        let response = self
            .send(
                self.client
                    .post(self.url(&format!("/collections/{collection}/points/scroll")))
                    .json(&request),
            )
            .await?;
        let body = Self::expect_success(response).await?;

        let points = body
            .pointer("/result/points")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|hit| {
                let id = hit.get("id").and_then(point_id_text)?;
                let payload = hit.get("payload").cloned().unwrap_or(Value::Null);
                Some(StoredPoint { id, payload })
            })
            .collect();

        let next_offset = body
            .pointer("/result/next_page_offset")
            .and_then(point_id_text);

        Ok(ScrollPage { points, next_offset })
    }
}
