//! Order maintenance commands.
//!
//! # Usage
//!
//! ```bash
//! # Give up on an order the shopper never paid for
//! tb-cli orders abandon 2026101642
//! ```

use std::sync::Arc;

use thiserror::Error;

use techbazaar_core::{OrderNumber, ShippingPolicy};
use techbazaar_storefront::db::{PgStore, Store};
use techbazaar_storefront::services::orders::{OrderError, OrderService};
use techbazaar_storefront::services::{Catalog, LogNotifier};

use super::CommandError;

/// Errors from order maintenance.
#[derive(Debug, Error)]
pub enum OrdersError {
    #[error(transparent)]
    Connect(#[from] CommandError),

    #[error(transparent)]
    Order(#[from] OrderError),
}

/// Mark an unpaid order as abandoned.
///
/// # Errors
///
/// Returns `OrdersError::Order` if the order does not exist or has already
/// been paid or abandoned.
pub async fn abandon(number: &OrderNumber) -> Result<(), OrdersError> {
    let store: Arc<dyn Store> = Arc::new(PgStore::new(super::connect().await?));
    let catalog = Catalog::new(Arc::clone(&store));
    let shipping = ShippingPolicy::default();
    let notifier = LogNotifier;

    let orders = OrderService::new(store.as_ref(), &catalog, &shipping, &notifier);
    let order = orders.abandon(number).await?;

    tracing::info!(
        order_number = %order.order_number,
        status = %order.status,
        "Order abandoned"
    );
    Ok(())
}
