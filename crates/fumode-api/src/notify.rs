//! Outbound customer notifications

use crate::accounts::Customer;
use async_trait::async_trait;
use tracing::info;

/// Delivers notifications to customers
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send the welcome message after registration
    async fn send_welcome(&self, customer: &Customer) -> anyhow::Result<()>;
}

/// Writes notifications to the log instead of delivering them
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_welcome(&self, customer: &Customer) -> anyhow::Result<()> {
        info!(
            recipient = %customer.email,
            customer_id = customer.customer_id,
            template = "user_welcome",
            "welcome notification sent"
        );
        Ok(())
    }
}
