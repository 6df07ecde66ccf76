//! Catalog reads for the cart and wishlist.
//!
//! Variation lists change rarely and are read on every add-to-cart, so they
//! are cached using `moka` (5-minute TTL). Products are always read fresh:
//! price and stock must be current.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::Serialize;
use tracing::instrument;

use techbazaar_core::{ProductId, Variation, VariationSet};

use crate::db::{RepositoryError, Store};
use crate::models::Product;

/// Read access to products and their declared variations.
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn Store>,
    variations: Cache<ProductId, Arc<Vec<Variation>>>,
}

impl Catalog {
    /// Create a catalog reading from `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        let variations = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        Self { store, variations }
    }

    /// Get a product with its live price and stock.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the store query fails.
    pub async fn product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        self.store.product(id).await
    }

    /// Get every variation `product` declares.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the store query fails. Failures are not
    /// cached.
    #[instrument(skip(self), fields(product_id = %product))]
    pub async fn variations(
        &self,
        product: ProductId,
    ) -> Result<Arc<Vec<Variation>>, RepositoryError> {
        if let Some(cached) = self.variations.get(&product).await {
            tracing::debug!("Cache hit for variations");
            return Ok(cached);
        }

        let loaded = Arc::new(self.store.variations(product).await?);
        self.variations.insert(product, Arc::clone(&loaded)).await;
        Ok(loaded)
    }

    /// Human-readable `category: value` labels for a resolved selection.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the variations cannot be loaded.
    pub async fn describe(
        &self,
        product: ProductId,
        selection: &VariationSet,
    ) -> Result<Vec<VariationLabel>, RepositoryError> {
        if selection.is_empty() {
            return Ok(Vec::new());
        }
        let declared = self.variations(product).await?;
        Ok(selection
            .describe(&declared)
            .into_iter()
            .map(|(category, value)| VariationLabel { category, value })
            .collect())
    }
}

/// A selected option as shown to the shopper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariationLabel {
    pub category: String,
    pub value: String,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("cached_products", &self.variations.entry_count())
            .finish_non_exhaustive()
    }
}
