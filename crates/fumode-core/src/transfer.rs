//! Parallel transfer of independent payloads to object storage
//!
//! `transfer_all` starts one task per item, optionally capped by a
//! semaphore, and joins every one of them before it returns. Per-item
//! successes and failures land in one mutex-guarded ledger. If anything
//! failed the call reports every failure; writes that did succeed are left
//! in place and handed back inside the error for the caller to clean up.
//!
//! There is no deadline on the join itself. Callers wrap `transfer_all` in
//! their own timeout; individual writes are bounded by `item_timeout`.

use crate::error::{AggregateTransferFailure, ItemFailure, TransferError};
use bytes::Bytes;
use fumode_storage::{object_key, ObjectStore, ObjectUpload, StoredObject};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Default deadline for a single item
pub const DEFAULT_ITEM_TIMEOUT: Duration = Duration::from_secs(10);

/// One payload to transfer
#[derive(Clone, Debug)]
pub struct TransferItem {
    /// Original file name
    pub name: String,
    /// Declared MIME type
    pub content_type: Option<String>,
    /// Payload
    pub data: Bytes,
}

impl TransferItem {
    pub fn new(name: impl Into<String>, content_type: Option<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content_type,
            data: data.into(),
        }
    }
}

/// A successfully transferred item
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferResult {
    /// Position of the item in the submitted batch
    pub index: usize,
    /// Item name as submitted
    pub name: String,
    /// Where the payload ended up
    pub object: StoredObject,
}

impl TransferResult {
    pub fn locator(&self) -> &str {
        &self.object.locator
    }
}

/// Coordinator settings
#[derive(Clone, Copy, Debug)]
pub struct TransferConfig {
    /// Deadline applied to every single write
    pub item_timeout: Duration,
    /// Maximum writes in flight per `transfer_all` call; `None` is unbounded
    pub max_concurrency: Option<usize>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            item_timeout: DEFAULT_ITEM_TIMEOUT,
            max_concurrency: None,
        }
    }
}

#[derive(Default)]
struct TransferLedger {
    succeeded: Vec<TransferResult>,
    failed: Vec<ItemFailure>,
}

impl TransferLedger {
    fn fail(&mut self, index: usize, name: String, error: TransferError) {
        self.failed.push(ItemFailure { index, name, error });
    }
}

/// Moves payloads to an [`ObjectStore`]
#[derive(Clone)]
pub struct BulkTransferCoordinator {
    store: Arc<dyn ObjectStore>,
    config: TransferConfig,
}

impl BulkTransferCoordinator {
    pub fn new(store: Arc<dyn ObjectStore>, config: TransferConfig) -> Self {
        Self { store, config }
    }

    /// Coordinator settings
    pub fn config(&self) -> TransferConfig {
        self.config
    }

    /// Transfer a single item, bounded by `item_timeout`.
    pub async fn transfer_one(&self, item: TransferItem) -> Result<StoredObject, TransferError> {
        let TransferItem {
            name,
            content_type,
            data,
        } = item;

        let key = object_key(&name, content_type.as_deref()).map_err(|source| TransferError::Storage {
            name: name.clone(),
            source,
        })?;
        let upload = ObjectUpload::new(key, content_type, data);

        match tokio::time::timeout(self.config.item_timeout, self.store.put_object(upload)).await {
            Ok(Ok(object)) => {
                debug!(item = %name, locator = %object.locator, size = object.size, "transferred item");
                Ok(object)
            }
            Ok(Err(source)) => Err(TransferError::Storage { name, source }),
            Err(_) => Err(TransferError::Timeout {
                name,
                timeout: self.config.item_timeout,
            }),
        }
    }

    /// Transfer every item concurrently and wait for all of them.
    ///
    /// Returns the results ordered by input position, or an aggregate error
    /// listing each failed item if at least one failed.
    pub async fn transfer_all(&self, items: Vec<TransferItem>) -> Result<Vec<TransferResult>, TransferError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let total = items.len();
        let ledger = Arc::new(Mutex::new(TransferLedger::default()));
        let permits = self
            .config
            .max_concurrency
            .map(|limit| Arc::new(Semaphore::new(limit.max(1))));

        let mut workers = Vec::with_capacity(total);
        for (index, item) in items.into_iter().enumerate() {
            let name = item.name.clone();
            let coordinator = self.clone();
            let ledger = Arc::clone(&ledger);
            let permits = permits.clone();

            let worker = tokio::spawn(async move {
                let _permit = match permits {
                    Some(permits) => match permits.acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(_) => {
                            ledger.lock().fail(
                                index,
                                item.name.clone(),
                                TransferError::Aborted {
                                    name: item.name,
                                    reason: "worker pool closed".into(),
                                },
                            );
                            return;
                        }
                    },
                    None => None,
                };

                let name = item.name.clone();
                match coordinator.transfer_one(item).await {
                    Ok(object) => ledger.lock().succeeded.push(TransferResult { index, name, object }),
                    Err(error) => ledger.lock().fail(index, name, error),
                }
            });
            workers.push((index, name, worker));
        }

        // Barrier: every worker reports before we look at the ledger.
        for (index, name, worker) in workers {
            if let Err(join_error) = worker.await {
                ledger.lock().fail(
                    index,
                    name.clone(),
                    TransferError::Aborted {
                        name,
                        reason: join_error.to_string(),
                    },
                );
            }
        }

        let TransferLedger {
            mut succeeded,
            mut failed,
        } = std::mem::take(&mut *ledger.lock());
        succeeded.sort_by_key(|result| result.index);
        failed.sort_by_key(|failure| failure.index);

        if failed.is_empty() {
            info!(items = total, "bulk transfer complete");
            return Ok(succeeded);
        }

        warn!(
            items = total,
            failed = failed.len(),
            succeeded = succeeded.len(),
            "bulk transfer failed"
        );
        Err(AggregateTransferFailure {
            total,
            failures: failed,
            succeeded,
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fumode_storage::{MemoryObjectStore, StorageError};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn items(n: usize) -> Vec<TransferItem> {
        (0..n)
            .map(|i| TransferItem::new(format!("image-{i}.png"), Some("image/png".into()), format!("payload-{i}")))
            .collect()
    }

    /// Delegates to memory but fails any item whose payload matches `poison`
    struct FlakyStore {
        inner: MemoryObjectStore,
        poison: &'static [u8],
    }

    #[async_trait]
    impl ObjectStore for FlakyStore {
        async fn put_object(&self, upload: ObjectUpload) -> fumode_storage::Result<StoredObject> {
            if upload.data.as_ref() == self.poison {
                return Err(StorageError::Rejected {
                    key: upload.key,
                    status: 500,
                });
            }
            self.inner.put_object(upload).await
        }

        async fn delete_object(&self, key: &str) -> fumode_storage::Result<()> {
            self.inner.delete_object(key).await
        }

        fn is_persistent(&self) -> bool {
            false
        }
    }

    /// Sleeps inside every write and records the peak number of writers
    struct SlowStore {
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SlowStore {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ObjectStore for SlowStore {
        async fn put_object(&self, upload: ObjectUpload) -> fumode_storage::Result<StoredObject> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(StoredObject {
                locator: format!("slow://{}", upload.key),
                size: upload.size(),
                key: upload.key,
                stored_at: chrono::Utc::now(),
            })
        }

        async fn delete_object(&self, _key: &str) -> fumode_storage::Result<()> {
            Ok(())
        }

        fn is_persistent(&self) -> bool {
            false
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_all_items_succeed() {
        let store = MemoryObjectStore::new("images");
        let coordinator = BulkTransferCoordinator::new(Arc::new(store.clone()), TransferConfig::default());

        let results = coordinator.transfer_all(items(5)).await.unwrap();

        assert_eq!(results.len(), 5);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.index, i);
            assert_eq!(result.name, format!("image-{i}.png"));
            let stored = store.get(&result.object.key).unwrap();
            assert_eq!(stored, Bytes::from(format!("payload-{i}")));
        }
        let locators: HashSet<_> = results.iter().map(|r| r.locator()).collect();
        assert_eq!(locators.len(), 5);
    }

    #[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
    async fn test_partial_failure_reports_every_failed_item() {
        let inner = MemoryObjectStore::new("images");
        let store = FlakyStore {
            inner: inner.clone(),
            poison: b"payload-3",
        };
        let coordinator = BulkTransferCoordinator::new(Arc::new(store), TransferConfig::default());

        let err = tokio::time::timeout(Duration::from_secs(5), coordinator.transfer_all(items(5)))
            .await
            .expect("bulk transfer must not hang")
            .unwrap_err();

        let TransferError::Aggregate(aggregate) = err else {
            panic!("expected aggregate failure, got {err:?}");
        };
        assert_eq!(aggregate.total, 5);
        assert_eq!(aggregate.failures.len(), 1);
        assert_eq!(aggregate.failures[0].index, 3);
        assert_eq!(aggregate.failures[0].name, "image-3.png");
        assert!(aggregate.to_string().contains("#3 image-3.png"));

        // Writes that succeeded are not rolled back.
        assert_eq!(aggregate.succeeded.len(), 4);
        assert_eq!(inner.len(), 4);
    }

    #[tokio::test]
    async fn test_multiple_failures_are_all_listed() {
        let coordinator = BulkTransferCoordinator::new(
            Arc::new(MemoryObjectStore::default()),
            TransferConfig::default(),
        );
        let batch = vec![
            TransferItem::new("ok.png", None, "x"),
            TransferItem::new("no-extension", None, "x"),
            TransferItem::new("empty.png", None, Bytes::new()),
        ];

        let err = coordinator.transfer_all(batch).await.unwrap_err();
        let TransferError::Aggregate(aggregate) = err else {
            panic!("expected aggregate failure");
        };
        let failed: Vec<_> = aggregate.failures.iter().map(|f| f.index).collect();
        assert_eq!(failed, vec![1, 2]);
        assert!(matches!(
            aggregate.failures[0].error,
            TransferError::Storage {
                source: StorageError::UnknownExtension(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let coordinator = BulkTransferCoordinator::new(
            Arc::new(MemoryObjectStore::default()),
            TransferConfig::default(),
        );
        let results = coordinator.transfer_all(Vec::new()).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let store = Arc::new(SlowStore::new(Duration::from_millis(100)));
        let config = TransferConfig {
            max_concurrency: Some(2),
            ..Default::default()
        };
        let coordinator = BulkTransferCoordinator::new(store.clone(), config);

        let results = coordinator.transfer_all(items(7)).await.unwrap();

        assert_eq!(results.len(), 7);
        assert_eq!(store.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_fan_out() {
        let store = Arc::new(SlowStore::new(Duration::from_millis(100)));
        let coordinator = BulkTransferCoordinator::new(store.clone(), TransferConfig::default());

        coordinator.transfer_all(items(6)).await.unwrap();

        assert_eq!(store.peak.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_item_timeout() {
        let store = Arc::new(SlowStore::new(Duration::from_secs(60)));
        let config = TransferConfig {
            item_timeout: Duration::from_secs(1),
            ..Default::default()
        };
        let coordinator = BulkTransferCoordinator::new(store, config);

        let err = coordinator
            .transfer_one(TransferItem::new("banner.png", None, "x"))
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::Timeout { ref name, .. } if name == "banner.png"));
    }

    #[tokio::test]
    async fn test_transfer_one() {
        let store = MemoryObjectStore::new("images");
        let coordinator = BulkTransferCoordinator::new(Arc::new(store.clone()), TransferConfig::default());

        let object = coordinator
            .transfer_one(TransferItem::new("banner.jpg", Some("image/png".into()), "banner"))
            .await
            .unwrap();

        assert!(object.key.ends_with(".png"));
        assert!(object.locator.starts_with("memory://images/"));
        assert_eq!(store.len(), 1);
    }
}
