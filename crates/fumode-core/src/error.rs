//! Error types for the fumode-core crate

use crate::transfer::TransferResult;
use fumode_storage::StorageError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Boxed error used where the source type belongs to the caller
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by the admission layer
#[derive(Error, Debug)]
pub enum AdmissionError {
    /// The peer address could not be turned into a client identity
    #[error("invalid peer address {addr:?}: {reason}")]
    InvalidPeerAddress { addr: String, reason: String },

    /// Limiter settings are out of range
    #[error("invalid limiter configuration: {0}")]
    InvalidConfig(String),
}

/// Errors raised while moving payloads to object storage
#[derive(Error, Debug)]
pub enum TransferError {
    /// The store rejected or failed the write
    #[error("transfer of {name:?} failed: {source}")]
    Storage {
        name: String,
        #[source]
        source: StorageError,
    },

    /// The write did not finish within the per-item deadline
    #[error("transfer of {name:?} timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    /// The worker carrying the transfer died before reporting
    #[error("transfer of {name:?} aborted: {reason}")]
    Aborted { name: String, reason: String },

    /// One or more items of a bulk transfer failed
    #[error(transparent)]
    Aggregate(#[from] AggregateTransferFailure),
}

/// A failed item of a bulk transfer
#[derive(Debug)]
pub struct ItemFailure {
    /// Position of the item in the submitted batch
    pub index: usize,
    /// Item name as submitted
    pub name: String,
    /// Why it failed
    pub error: TransferError,
}

/// Every failure of a bulk transfer, plus the items that did make it.
///
/// Successful writes are not rolled back; `succeeded` lists them so the
/// caller can compensate.
#[derive(Debug)]
pub struct AggregateTransferFailure {
    /// Number of items submitted
    pub total: usize,
    /// Failed items, ordered by index
    pub failures: Vec<ItemFailure>,
    /// Items that were stored, ordered by index
    pub succeeded: Vec<TransferResult>,
}

impl fmt::Display for AggregateTransferFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} transfers failed: ", self.failures.len(), self.total)?;
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "#{} {}: {}", failure.index, failure.name, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateTransferFailure {}

/// Errors that end the serving phase of the process
#[derive(Error, Debug)]
pub enum ShutdownError {
    /// The server stopped on its own before shutdown was requested
    #[error("server on {addr} failed: {source}")]
    Serve {
        addr: String,
        #[source]
        source: BoxError,
    },

    /// The listener reported an error while closing
    #[error("listener on {addr} failed while closing: {source}")]
    Listener {
        addr: String,
        #[source]
        source: BoxError,
    },

    /// The listener did not close before the deadline
    #[error("listener on {addr} did not close within {deadline:?}")]
    ListenerTimeout { addr: String, deadline: Duration },

    /// Background work was still running at the deadline
    #[error("{pending} background task(s) still running after {deadline:?}")]
    DrainTimeout { pending: usize, deadline: Duration },
}
