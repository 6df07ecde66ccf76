//! Order receipts.
//!
//! Email delivery lives outside this service. The storefront hands a paid
//! order to a [`Notifier`]; the default implementation logs the receipt.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Order, OrderProduct};

/// Errors sending a receipt.
#[derive(Debug, Error)]
#[error("receipt delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Delivers receipts for paid orders.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send the receipt for `order`, whose lines are `products`.
    async fn send_receipt(&self, order: &Order, products: &[OrderProduct])
    -> Result<(), NotifyError>;
}

/// Writes receipts to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_receipt(
        &self,
        order: &Order,
        products: &[OrderProduct],
    ) -> Result<(), NotifyError> {
        tracing::info!(
            order_number = %order.order_number,
            email = %order.contact.email,
            lines = products.len(),
            total = %order.order_total,
            "Order receipt sent"
        );
        Ok(())
    }
}
