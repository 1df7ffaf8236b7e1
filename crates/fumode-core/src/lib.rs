//! # Fumode Core
//!
//! Concurrency runtime shared by the Fumode API server.
//!
//! This crate provides:
//! - **Client registry**: one token-bucket limiter per client identity, with
//!   periodic eviction of idle clients
//! - **Admission control**: per-request allow/deny against the registry
//! - **Background tasks**: fire-and-forget work with panic isolation and drain
//! - **Bulk transfers**: concurrent uploads joined by a barrier, with
//!   per-item failure reporting
//! - **Shutdown supervision**: signal-driven `Running → Draining → Stopped`
//!   state machine with a hard deadline
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 HTTP layer                   │
//! ├──────────────────┬───────────────────────────┤
//! │ AdmissionControl │ handlers                  │
//! │        │         │   │            │          │
//! │ ClientRegistry   │ Background  BulkTransfer  │
//! │   (sweeper)      │  TaskRunner  Coordinator  │
//! ├──────────────────┴───────────────────────────┤
//! │             ShutdownSupervisor               │
//! └──────────────────────────────────────────────┘
//! ```

pub mod admission;
pub mod background;
pub mod error;
pub mod registry;
pub mod shutdown;
pub mod transfer;

pub use admission::{client_identity, Admission, AdmissionController, LimiterConfig};
pub use background::BackgroundTaskRunner;
pub use error::{AdmissionError, AggregateTransferFailure, BoxError, ItemFailure, ShutdownError, TransferError};
pub use registry::{ClientRegistry, RegistryConfig, RegistryStats};
pub use shutdown::{termination_signal, ShutdownConfig, ShutdownState, ShutdownSupervisor};
pub use transfer::{BulkTransferCoordinator, TransferConfig, TransferItem, TransferResult};
