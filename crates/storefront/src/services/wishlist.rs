//! Wishlist operations.
//!
//! Wishlist items are product selections saved without a quantity. The same
//! selection is never saved twice for one owner.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use techbazaar_core::{
    CartOwner, ProductId, VariationError, WishlistItemId, variation,
};

use super::cart::MAX_LINE_QUANTITY;
use super::catalog::{Catalog, VariationLabel};
use crate::db::{RepositoryError, Store};
use crate::models::{CartItem, NewCartItem, NewWishlistItem, WishlistItem};

/// Errors from wishlist operations.
#[derive(Debug, Error)]
pub enum WishlistError {
    /// The variation selection is incomplete or invalid.
    #[error(transparent)]
    Variation(#[from] VariationError),

    /// Product does not exist or is not for sale.
    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    /// Wishlist item does not exist or belongs to someone else.
    #[error("wishlist item {0} not found")]
    ItemNotFound(WishlistItemId),

    /// The matching cart line is already full.
    #[error("cart already holds the maximum quantity of this item")]
    CartLineFull,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Result of adding to the wishlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WishlistAdd {
    /// A new item was saved.
    Added(WishlistItem),
    /// The same selection was already saved.
    AlreadyPresent(WishlistItem),
}

/// A wishlist item as shown to the shopper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WishlistItemView {
    pub item_id: WishlistItemId,
    pub product_id: ProductId,
    pub product_name: String,
    pub variations: Vec<VariationLabel>,
    pub in_stock: bool,
    pub added_at: DateTime<Utc>,
}

/// Wishlist operations for one request.
pub struct WishlistService<'a> {
    store: &'a dyn Store,
    catalog: &'a Catalog,
}

impl<'a> WishlistService<'a> {
    /// Create a wishlist service.
    #[must_use]
    pub const fn new(store: &'a dyn Store, catalog: &'a Catalog) -> Self {
        Self { store, catalog }
    }

    /// Save a product selection.
    ///
    /// # Errors
    ///
    /// - `WishlistError::ProductNotFound` if the product is unknown or unavailable
    /// - `WishlistError::Variation` if the selection does not resolve
    #[instrument(skip(self, selection), fields(owner = %owner, product_id = %product_id))]
    pub async fn add(
        &self,
        owner: &CartOwner,
        product_id: ProductId,
        selection: &[(String, String)],
    ) -> Result<WishlistAdd, WishlistError> {
        let product = self
            .catalog
            .product(product_id)
            .await?
            .filter(|p| p.is_available)
            .ok_or(WishlistError::ProductNotFound(product_id))?;
        let declared = self.catalog.variations(product.id).await?;
        let variations = variation::resolve(selection, &declared)?;

        let mut tx = self.store.begin().await?;
        if let Some(existing) = tx
            .wishlist_items_for_product(owner, product.id)
            .await?
            .into_iter()
            .find(|item| item.variations == variations)
        {
            return Ok(WishlistAdd::AlreadyPresent(existing));
        }

        let item = tx
            .insert_wishlist_item(NewWishlistItem {
                owner: owner.clone(),
                product_id: product.id,
                variations,
            })
            .await?;
        tx.commit().await?;
        Ok(WishlistAdd::Added(item))
    }

    /// Delete a saved item.
    ///
    /// # Errors
    ///
    /// Returns `WishlistError::ItemNotFound` if the owner has no such item.
    #[instrument(skip(self), fields(owner = %owner, wishlist_item_id = %item_id))]
    pub async fn remove(&self, owner: &CartOwner, item_id: WishlistItemId) -> Result<(), WishlistError> {
        let mut tx = self.store.begin().await?;
        tx.wishlist_item(owner, item_id)
            .await?
            .ok_or(WishlistError::ItemNotFound(item_id))?;
        tx.delete_wishlist_item(item_id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Move a saved item into the cart.
    ///
    /// An identical cart line gains one unit; otherwise a new line of one
    /// unit is created. The wishlist item is deleted in the same
    /// transaction.
    ///
    /// # Errors
    ///
    /// - `WishlistError::ItemNotFound` if the owner has no such item
    /// - `WishlistError::ProductNotFound` if the product is no longer for sale
    #[instrument(skip(self), fields(owner = %owner, wishlist_item_id = %item_id))]
    pub async fn move_to_cart(
        &self,
        owner: &CartOwner,
        item_id: WishlistItemId,
    ) -> Result<CartItem, WishlistError> {
        let mut tx = self.store.begin().await?;
        let saved = tx
            .wishlist_item(owner, item_id)
            .await?
            .ok_or(WishlistError::ItemNotFound(item_id))?;
        tx.product(saved.product_id)
            .await?
            .filter(|p| p.is_available)
            .ok_or(WishlistError::ProductNotFound(saved.product_id))?;

        let existing = tx
            .cart_items_for_product(owner, saved.product_id)
            .await?
            .into_iter()
            .find(|item| item.variations == saved.variations);

        let cart_item = match existing {
            Some(mut item) => {
                if item.quantity >= MAX_LINE_QUANTITY {
                    return Err(WishlistError::CartLineFull);
                }
                item.quantity += 1;
                tx.set_cart_item_quantity(item.id, item.quantity).await?;
                item
            }
            None => {
                tx.insert_cart_item(NewCartItem {
                    owner: owner.clone(),
                    product_id: saved.product_id,
                    variations: saved.variations.clone(),
                    quantity: 1,
                })
                .await?
            }
        };
        tx.delete_wishlist_item(saved.id).await?;
        tx.commit().await?;

        Ok(cart_item)
    }

    /// The owner's saved items, oldest first. Items whose product has been
    /// deleted are skipped.
    ///
    /// # Errors
    ///
    /// Returns `WishlistError::Repository` if the store fails.
    pub async fn view(&self, owner: &CartOwner) -> Result<Vec<WishlistItemView>, WishlistError> {
        let items = self.store.wishlist_items(owner).await?;
        let mut views = Vec::with_capacity(items.len());
        for item in items {
            let Some(product) = self.catalog.product(item.product_id).await? else {
                continue;
            };
            views.push(WishlistItemView {
                item_id: item.id,
                product_id: item.product_id,
                variations: self
                    .catalog
                    .describe(item.product_id, &item.variations)
                    .await?,
                in_stock: product.can_supply(1),
                product_name: product.name,
                added_at: item.added_at,
            });
        }
        Ok(views)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use techbazaar_core::{GuestToken, Money};

    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{NewProduct, NewVariation, Product};

    async fn setup() -> (MemoryStore, Catalog, Product) {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let headset = tx
            .insert_product(NewProduct {
                name: "Headset".to_string(),
                slug: "headset".to_string(),
                price: Money::from_units(2500),
                stock: 4,
                is_available: true,
                variations: vec![
                    NewVariation {
                        category: "color".to_string(),
                        value: "black".to_string(),
                    },
                    NewVariation {
                        category: "color".to_string(),
                        value: "white".to_string(),
                    },
                ],
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        let catalog = Catalog::new(Arc::new(store.clone()));
        (store, catalog, headset)
    }

    fn owner() -> CartOwner {
        CartOwner::Guest(GuestToken::from_string("w1".to_string()))
    }

    fn black() -> Vec<(String, String)> {
        vec![("color".to_string(), "black".to_string())]
    }

    #[tokio::test]
    async fn test_add_twice_is_already_present() {
        let (store, catalog, headset) = setup().await;
        let wishlist = WishlistService::new(&store, &catalog);

        let first = wishlist.add(&owner(), headset.id, &black()).await.unwrap();
        let WishlistAdd::Added(item) = first else {
            panic!("expected a new item");
        };
        let second = wishlist.add(&owner(), headset.id, &black()).await.unwrap();
        assert_eq!(second, WishlistAdd::AlreadyPresent(item));
        assert_eq!(wishlist.view(&owner()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_move_to_cart_merges_with_identical_line() {
        let (store, catalog, headset) = setup().await;
        let wishlist = WishlistService::new(&store, &catalog);
        let owner = owner();

        let WishlistAdd::Added(saved) = wishlist.add(&owner, headset.id, &black()).await.unwrap()
        else {
            panic!("expected a new item");
        };
        let first = wishlist.move_to_cart(&owner, saved.id).await.unwrap();
        assert_eq!(first.quantity, 1);
        assert!(wishlist.view(&owner).await.unwrap().is_empty());

        let WishlistAdd::Added(again) = wishlist.add(&owner, headset.id, &black()).await.unwrap()
        else {
            panic!("expected a new item");
        };
        let second = wishlist.move_to_cart(&owner, again.id).await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.quantity, 2);
    }

    #[tokio::test]
    async fn test_remove_scoped_to_owner() {
        let (store, catalog, headset) = setup().await;
        let wishlist = WishlistService::new(&store, &catalog);
        let WishlistAdd::Added(saved) = wishlist.add(&owner(), headset.id, &black()).await.unwrap()
        else {
            panic!("expected a new item");
        };

        let stranger = CartOwner::Guest(GuestToken::from_string("w2".to_string()));
        assert!(matches!(
            wishlist.remove(&stranger, saved.id).await,
            Err(WishlistError::ItemNotFound(_))
        ));
        wishlist.remove(&owner(), saved.id).await.unwrap();
        assert!(wishlist.view(&owner()).await.unwrap().is_empty());
    }
}
