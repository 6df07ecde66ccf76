//! Stock ledger: availability checks and the conditional decrement.
//!
//! The product's `stock` column is the only inventory counter. Checks made
//! before payment are advisory; the decrement at finalization is the one
//! that counts, and it refuses rather than going below zero.

use thiserror::Error;
use tracing::instrument;

use techbazaar_core::ProductId;

use crate::db::{RepositoryError, StockChange, StoreTx};
use crate::models::CartLine;

/// Errors from stock checks.
#[derive(Debug, Error)]
pub enum StockError {
    /// Not enough units on hand.
    #[error("only {remaining} of {product} left in stock")]
    InsufficientStock { product: String, remaining: u32 },

    /// The product no longer exists.
    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Check that a cart line can still be supplied at its current quantity.
///
/// A product marked unavailable reports zero remaining.
///
/// # Errors
///
/// Returns `StockError::InsufficientStock` if the line asks for more than is
/// on hand.
pub fn check_availability(line: &CartLine) -> Result<(), StockError> {
    if line.is_available && line.stock >= line.item.quantity {
        return Ok(());
    }
    Err(StockError::InsufficientStock {
        product: line.product_name.clone(),
        remaining: if line.is_available { line.stock } else { 0 },
    })
}

/// Take `quantity` units of a product in one conditional update.
///
/// Returns the units left afterwards. The decrement only applies if at least
/// `quantity` units are on hand at the moment it runs, so concurrent callers
/// can never drive stock negative.
///
/// # Errors
///
/// - `StockError::InsufficientStock` if stock has dropped below `quantity`
/// - `StockError::ProductNotFound` if the product was deleted
/// - `StockError::Repository` if the store fails
#[instrument(skip(tx, product_name), fields(product_id = %product))]
pub async fn reserve_and_decrement(
    tx: &mut dyn StoreTx,
    product: ProductId,
    product_name: &str,
    quantity: u32,
) -> Result<u32, StockError> {
    match tx.decrement_stock(product, quantity).await? {
        StockChange::Decremented { remaining } => {
            tracing::debug!(quantity, remaining, "Stock decremented");
            Ok(remaining)
        }
        StockChange::Insufficient { remaining } => {
            tracing::warn!(quantity, remaining, "Stock decrement refused");
            Err(StockError::InsufficientStock {
                product: product_name.to_owned(),
                remaining,
            })
        }
        StockChange::Missing => Err(StockError::ProductNotFound(product)),
    }
}
