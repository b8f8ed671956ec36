use crate::error::StoreError;
use crate::models::IndexPoint;
use crate::traits::{PointFilter, ScrollPage, StoredPoint, VectorStore};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct MemoryPoint {
    vector: Vec<f32>,
    payload: Value,
}

#[derive(Debug, Default)]
struct MemoryCollection {
    vector_size: usize,
    points: BTreeMap<String, MemoryPoint>,
}

#[derive(Debug)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, MemoryCollection>>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn point_count(&self, collection: &str) -> usize {
        self.lock()
            .ok()
            .and_then(|collections| collections.get(collection).map(|c| c.points.len()))
            .unwrap_or(0)
    }

    pub fn point_ids_for_path(&self, collection: &str, path: &str) -> Vec<String> {
        let Ok(collections) = self.lock() else {
            return Vec::new();
        };
        let Some(stored) = collections.get(collection) else {
            return Vec::new();
        };
        let filter = PointFilter::for_path(path);
        let mut matching: Vec<(u64, String)> = stored
            .points
            .iter()
            .filter(|(_, point)| filter.matches(&point.payload))
            .map(|(id, point)| {
                let index = point.payload.get("chunk_index").and_then(Value::as_u64).unwrap_or(0);
                (index, id.clone())
            })
            .collect();
        matching.sort();
        matching.into_iter().map(|(_, id)| id).collect()
    }

    pub fn vector(&self, collection: &str, id: &str) -> Option<Vec<f32>> {
        self.lock()
            .ok()?
            .get(collection)?
            .points
            .get(id)
            .map(|point| point.vector.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, MemoryCollection>>, StoreError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Request("memory store unavailable".to_string()));
        }
        self.collections
            .lock()
            .map_err(|_| StoreError::Request("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn collection_exists(&self, collection: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.contains_key(collection))
    }

    async fn collection_vector_size(&self, collection: &str) -> Result<Option<usize>, StoreError> {
        self.lock()?
            .get(collection)
            .map(|stored| Some(stored.vector_size))
            .ok_or_else(|| StoreError::MissingCollection(collection.to_string()))
    }

    async fn create_collection(&self, collection: &str, vector_size: usize) -> Result<(), StoreError> {
        self.lock()?
            .entry(collection.to_string())
            .or_insert_with(|| MemoryCollection {
                vector_size,
                points: BTreeMap::new(),
            });
        Ok(())
    }

    async fn delete_collection(&self, collection: &str) -> Result<(), StoreError> {
        self.lock()?.remove(collection);
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: &[IndexPoint]) -> Result<(), StoreError> {
        let mut collections = self.lock()?;
        let stored = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::MissingCollection(collection.to_string()))?;

        for point in points {
            if point.vector.len() != stored.vector_size {
                return Err(StoreError::Request(format!(
                    "vector dimension {} != {}",
                    point.vector.len(),
                    stored.vector_size
                )));
            }
        }

        for point in points {
            stored.points.insert(
                point.id.clone(),
                MemoryPoint {
                    vector: point.vector.clone(),
                    payload: serde_json::to_value(&point.payload)?,
                },
            );
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, filter: &PointFilter) -> Result<(), StoreError> {
        let mut collections = self.lock()?;
        let stored = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::MissingCollection(collection.to_string()))?;
        stored.points.retain(|_, point| !filter.matches(&point.payload));
        Ok(())
    }

    async fn scroll(
        &self,
        collection: &str,
        offset: Option<String>,
        limit: usize,
    ) -> Result<ScrollPage, StoreError> {
        let collections = self.lock()?;
        let stored = collections
            .get(collection)
            .ok_or_else(|| StoreError::MissingCollection(collection.to_string()))?;

        let start = offset.unwrap_or_default();
        let mut page: Vec<StoredPoint> = stored
            .points
            .range(start..)
            .take(limit.max(1) + 1)
            .map(|(id, point)| StoredPoint {
                id: id.clone(),
                payload: point.payload.clone(),
            })
            .collect();

        let next_offset = if page.len() > limit.max(1) {
            page.pop().map(|point| point.id)
        } else {
            None
        };

        Ok(ScrollPage {
            points: page,
            next_offset,
        })
    }
}
