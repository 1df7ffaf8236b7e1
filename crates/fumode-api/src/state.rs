//! Application state

use crate::config::ApiConfig;
use crate::accounts::{AdminDirectory, CustomerDirectory, PasswordHash};
use crate::notify::{LogNotifier, Notifier};
use chrono::{DateTime, Utc};
use fumode_core::{AdmissionController, BackgroundTaskRunner, BulkTransferCoordinator, ShutdownState};
use fumode_storage::{HttpObjectStore, MemoryObjectStore, ObjectStore};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Application state shared across handlers
pub struct AppState {
    /// Server configuration
    pub config: ApiConfig,
    /// Per-client rate limiting
    pub admission: AdmissionController,
    /// Fire-and-forget work, drained on shutdown
    pub runner: BackgroundTaskRunner,
    /// Image storage
    pub store: Arc<dyn ObjectStore>,
    /// Uploads to `store`
    pub transfers: BulkTransferCoordinator,
    /// Registered customers
    pub customers: CustomerDirectory,
    /// Store administrators
    pub admins: AdminDirectory,
    /// Customer notifications
    pub notifier: Arc<dyn Notifier>,
    /// Process lifecycle
    pub lifecycle: watch::Receiver<ShutdownState>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create a new application state
    pub fn new(
        config: ApiConfig,
        runner: BackgroundTaskRunner,
        lifecycle: watch::Receiver<ShutdownState>,
    ) -> anyhow::Result<Self> {
        config.validate()?;

        let admission = AdmissionController::from_config(&config.limiter, config.registry_config())?;
        if !admission.is_enabled() {
            warn!("rate limiting is disabled");
        }

        let store: Arc<dyn ObjectStore> = match config.storage.http_config() {
            Some(http) => {
                info!(endpoint = %http.endpoint, bucket = %http.bucket, "using HTTP object store");
                Arc::new(HttpObjectStore::new(http)?)
            }
            None => {
                warn!("using in-memory object store, uploads will not persist");
                Arc::new(MemoryObjectStore::new(config.storage.bucket()))
            }
        };

        let transfers = BulkTransferCoordinator::new(Arc::clone(&store), config.transfer_config());

        let admins = AdminDirectory::new();
        if let Some(seed) = &config.admin {
            let password = PasswordHash::new(&seed.password)?;
            let admin = admins.insert(&seed.name, &seed.email, password)?;
            info!(admin_id = admin.admin_id, email = %admin.email, "admin account created");
        }

        Ok(Self {
            config,
            admission,
            runner,
            store,
            transfers,
            customers: CustomerDirectory::new(),
            admins,
            notifier: Arc::new(LogNotifier),
            lifecycle,
            started_at: Utc::now(),
        })
    }

    /// Replace the object store
    pub fn with_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.transfers = BulkTransferCoordinator::new(Arc::clone(&store), self.config.transfer_config());
        self.store = store;
        self
    }

    /// Replace the notifier
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Current lifecycle state
    pub fn lifecycle_state(&self) -> ShutdownState {
        *self.lifecycle.borrow()
    }
}
