//! Request handlers

pub mod admins;
mod credentials;
pub mod customers;
pub mod furniture;
pub mod health;

pub use admins::*;
pub use credentials::{LoginRequest, RegisterRequest};
pub use customers::*;
pub use furniture::*;
pub use health::*;
