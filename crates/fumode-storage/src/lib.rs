//! # Fumode Storage
//!
//! Object storage layer for product images.
//!
//! This crate provides:
//! - **ObjectStore trait**: put and delete opaque objects, returning a public locator
//! - **Backends**: in-memory (development, tests) and HTTP PUT against an
//!   S3-compatible endpoint
//! - **Naming**: collision-resistant object keys derived from the upload's
//!   content type or file name
//!
//! ## Example
//!
//! ```rust,ignore
//! use fumode_storage::{MemoryObjectStore, ObjectStore, ObjectUpload};
//!
//! let store = MemoryObjectStore::new("images");
//! let stored = store.put_object(ObjectUpload::new(key, Some("image/png".into()), data)).await?;
//! println!("{}", stored.locator);
//! ```

pub mod error;
pub mod http;
pub mod memory;
pub mod naming;

pub use error::{Result, StorageError};
pub use http::{HttpObjectStore, HttpStoreConfig};
pub use memory::MemoryObjectStore;
pub use naming::{file_extension, object_key};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A single object to be written to a store
#[derive(Clone, Debug)]
pub struct ObjectUpload {
    /// Destination key inside the bucket
    pub key: String,
    /// MIME type sent along with the payload
    pub content_type: Option<String>,
    /// Object payload
    pub data: Bytes,
}

impl ObjectUpload {
    /// Create a new upload
    pub fn new(key: impl Into<String>, content_type: Option<String>, data: Bytes) -> Self {
        Self {
            key: key.into(),
            content_type,
            data,
        }
    }

    /// Payload size in bytes
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// An object that has been written to a store
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct StoredObject {
    /// Key inside the bucket
    pub key: String,
    /// Publicly resolvable location of the object
    pub locator: String,
    /// Size in bytes
    pub size: u64,
    /// When the store acknowledged the write
    pub stored_at: DateTime<Utc>,
}

/// Trait for object storage backends
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store an object and return where it can be fetched from
    async fn put_object(&self, upload: ObjectUpload) -> Result<StoredObject>;

    /// Remove an object. Removing a missing key is not an error.
    async fn delete_object(&self, key: &str) -> Result<()>;

    /// Whether written objects survive a process restart
    fn is_persistent(&self) -> bool;
}
