//! # Fumode API
//!
//! HTTP server for the Fumode furniture store.
//!
//! This crate provides:
//! - **Accounts**: customer registration with a background welcome notification,
//!   customer and admin login, admin-only admin registration
//! - **Furniture images**: banner and gallery uploads to object storage
//! - **Rate limiting**: per-client token buckets in front of every route
//! - **Authentication**: HS256 JWT bearer tokens with role checks
//! - **Graceful shutdown**: listener close and background drain on SIGINT/SIGTERM
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    HTTP Clients                      │
//! └─────────────────────────┬───────────────────────────┘
//!                           │
//! ┌─────────────────────────▼───────────────────────────┐
//! │ Request ID │ Logging │ Panic Recovery │ Rate Limiter │
//! ├─────────────────────────────────────────────────────┤
//! │    Handlers (customers, admins, furniture images)    │
//! ├─────────────────────────────────────────────────────┤
//! │                     fumode-core                      │
//! │   (admission, background tasks, transfers, shutdown) │
//! ├─────────────────────────────────────────────────────┤
//! │                   fumode-storage                     │
//! │               (memory, HTTP object store)            │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod accounts;
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod notify;
pub mod routes;
pub mod server;
pub mod state;
pub mod validation;

pub use config::{AdminSeed, ApiConfig, StorageBackend};
pub use error::ApiError;
pub use server::{run_server, Server};
pub use state::AppState;
