//! In-memory object store for development and testing

use crate::{ObjectStore, ObjectUpload, Result, StorageError, StoredObject};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;

/// An in-memory object store
#[derive(Clone)]
pub struct MemoryObjectStore {
    bucket: String,
    objects: Arc<DashMap<String, Bytes>>,
}

impl MemoryObjectStore {
    /// Create a new empty store for the given bucket name
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Arc::new(DashMap::new()),
        }
    }

    /// Get the number of objects stored
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Fetch a stored object
    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.objects.get(key).map(|entry| entry.value().clone())
    }

    /// List all keys
    pub fn keys(&self) -> Vec<String> {
        self.objects.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new("memory")
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(&self, upload: ObjectUpload) -> Result<StoredObject> {
        if upload.data.is_empty() {
            return Err(StorageError::EmptyObject(upload.key));
        }

        let size = upload.size();
        let locator = format!("memory://{}/{}", self.bucket, upload.key);
        self.objects.insert(upload.key.clone(), upload.data);

        Ok(StoredObject {
            key: upload.key,
            locator,
            size,
            stored_at: chrono::Utc::now(),
        })
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.objects.remove(key);
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        false
    }
}
