//! Cart operations.
//!
//! A cart is the set of cart items belonging to one [`CartOwner`]. Two items
//! for the same product are the same line exactly when their resolved
//! variation sets are equal; adding a matching selection bumps the existing
//! line instead of creating a new one.

use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use techbazaar_core::{
    AccountId, CartItemId, CartOwner, CartTotals, GuestToken, Money, ProductId, ShippingPolicy,
    VariationError, compute_totals, variation,
};

use super::catalog::{Catalog, VariationLabel};
use crate::db::{RepositoryError, Store};
use crate::models::{CartItem, NewCartItem};

/// Largest quantity a single cart line may hold.
pub const MAX_LINE_QUANTITY: u32 = 10_000;

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// The variation selection is incomplete or invalid.
    #[error(transparent)]
    Variation(#[from] VariationError),

    /// Quantity out of range.
    #[error("quantity must be between 1 and {MAX_LINE_QUANTITY}, got {0:?}")]
    InvalidQuantity(String),

    /// Product does not exist or is not for sale.
    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    /// Cart item does not exist or belongs to someone else.
    #[error("cart item {0} not found")]
    ItemNotFound(CartItemId),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// How an add-to-cart request changes the quantity of a matching line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityUpdate {
    /// Add this many units (a new line starts at this many).
    Add(u32),
    /// Overwrite the quantity.
    Set(u32),
}

impl QuantityUpdate {
    /// Interpret the optional `quantity` field of an add-to-cart form: absent
    /// means add one, present means set exactly.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InvalidQuantity` if the value is not in
    /// `1..=MAX_LINE_QUANTITY`.
    pub fn from_request(quantity: Option<i64>) -> Result<Self, CartError> {
        match quantity {
            None => Ok(Self::Add(1)),
            Some(q) => Ok(Self::Set(validate_quantity(q)?)),
        }
    }

    /// Quantity for a line created by this update.
    #[must_use]
    pub const fn initial(self) -> u32 {
        match self {
            Self::Add(q) | Self::Set(q) => q,
        }
    }

    /// Quantity after applying this update to a line holding `current`.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InvalidQuantity` if the result would exceed
    /// `MAX_LINE_QUANTITY`.
    pub fn apply(self, current: u32) -> Result<u32, CartError> {
        match self {
            Self::Set(q) => Ok(q),
            Self::Add(q) => validate_quantity(i64::from(current) + i64::from(q)),
        }
    }
}

fn validate_quantity(quantity: i64) -> Result<u32, CartError> {
    u32::try_from(quantity)
        .ok()
        .filter(|q| (1..=MAX_LINE_QUANTITY).contains(q))
        .ok_or_else(|| CartError::InvalidQuantity(quantity.to_string()))
}

/// What a guest-to-account merge did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    /// Guest lines folded into an identical account line.
    pub merged: usize,
    /// Guest lines handed over to the account unchanged.
    pub reassigned: usize,
}

/// A cart line as shown to the shopper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLineView {
    pub item_id: CartItemId,
    pub product_id: ProductId,
    pub product_name: String,
    pub variations: Vec<VariationLabel>,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
}

/// The cart with live prices and totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartView {
    pub lines: Vec<CartLineView>,
    pub totals: CartTotals,
}

/// Cart operations for one request.
pub struct CartService<'a> {
    store: &'a dyn Store,
    catalog: &'a Catalog,
    shipping: &'a ShippingPolicy,
}

impl<'a> CartService<'a> {
    /// Create a cart service.
    #[must_use]
    pub const fn new(store: &'a dyn Store, catalog: &'a Catalog, shipping: &'a ShippingPolicy) -> Self {
        Self {
            store,
            catalog,
            shipping,
        }
    }

    /// Add a product selection to the cart.
    ///
    /// If the owner already has a line for this product with the same
    /// resolved variations, its quantity is updated; otherwise a new line is
    /// created.
    ///
    /// # Errors
    ///
    /// - `CartError::ProductNotFound` if the product is unknown or unavailable
    /// - `CartError::Variation` if the selection does not resolve
    /// - `CartError::InvalidQuantity` if the resulting quantity is out of range
    #[instrument(skip(self, selection), fields(owner = %owner, product_id = %product_id))]
    pub async fn add_item(
        &self,
        owner: &CartOwner,
        product_id: ProductId,
        selection: &[(String, String)],
        update: QuantityUpdate,
    ) -> Result<CartItem, CartError> {
        let product = self
            .catalog
            .product(product_id)
            .await?
            .filter(|p| p.is_available)
            .ok_or(CartError::ProductNotFound(product_id))?;
        let declared = self.catalog.variations(product.id).await?;
        let variations = variation::resolve(selection, &declared)?;

        let mut tx = self.store.begin().await?;
        let existing = tx
            .cart_items_for_product(owner, product.id)
            .await?
            .into_iter()
            .find(|item| item.variations == variations);

        let item = match existing {
            Some(mut item) => {
                let quantity = update.apply(item.quantity)?;
                tx.set_cart_item_quantity(item.id, quantity).await?;
                item.quantity = quantity;
                item
            }
            None => {
                tx.insert_cart_item(NewCartItem {
                    owner: owner.clone(),
                    product_id: product.id,
                    variations,
                    quantity: update.initial(),
                })
                .await?
            }
        };
        tx.commit().await?;

        tracing::info!(cart_item_id = %item.id, quantity = item.quantity, "Cart updated");
        Ok(item)
    }

    /// Take one unit off a line, deleting it when it reaches zero.
    ///
    /// Returns the updated line, or `None` if it was deleted.
    ///
    /// # Errors
    ///
    /// Returns `CartError::ItemNotFound` if the owner has no such line.
    #[instrument(skip(self), fields(owner = %owner, cart_item_id = %item_id))]
    pub async fn decrement_or_remove(
        &self,
        owner: &CartOwner,
        item_id: CartItemId,
    ) -> Result<Option<CartItem>, CartError> {
        let mut tx = self.store.begin().await?;
        let mut item = tx
            .cart_item(owner, item_id)
            .await?
            .ok_or(CartError::ItemNotFound(item_id))?;

        let result = if item.quantity > 1 {
            item.quantity -= 1;
            tx.set_cart_item_quantity(item.id, item.quantity).await?;
            Some(item)
        } else {
            tx.delete_cart_item(item.id).await?;
            None
        };
        tx.commit().await?;
        Ok(result)
    }

    /// Delete a line regardless of its quantity.
    ///
    /// # Errors
    ///
    /// Returns `CartError::ItemNotFound` if the owner has no such line.
    #[instrument(skip(self), fields(owner = %owner, cart_item_id = %item_id))]
    pub async fn remove_item(&self, owner: &CartOwner, item_id: CartItemId) -> Result<(), CartError> {
        let mut tx = self.store.begin().await?;
        tx.cart_item(owner, item_id)
            .await?
            .ok_or(CartError::ItemNotFound(item_id))?;
        tx.delete_cart_item(item_id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Fold a guest cart into an account's cart.
    ///
    /// Each guest line either adds its quantity onto the account's identical
    /// line (same product, equal variation set) or is handed to the account
    /// as-is. Everything happens in one transaction: on failure the guest
    /// cart is left untouched and the merge can be retried.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the store fails; nothing is
    /// committed in that case.
    #[instrument(skip(self, guest), fields(account_id = %account))]
    pub async fn merge_guest_into_account(
        &self,
        guest: &GuestToken,
        account: AccountId,
    ) -> Result<MergeSummary, CartError> {
        let guest_owner = CartOwner::Guest(guest.clone());
        let account_owner = CartOwner::Account(account);

        let mut tx = self.store.begin().await?;
        let guest_items = tx.cart_items(&guest_owner).await?;
        if guest_items.is_empty() {
            return Ok(MergeSummary::default());
        }
        let mut account_items = tx.cart_items(&account_owner).await?;

        let mut summary = MergeSummary::default();
        for guest_item in guest_items {
            let matching = account_items.iter_mut().find(|item| {
                item.product_id == guest_item.product_id && item.variations == guest_item.variations
            });

            if let Some(target) = matching {
                let quantity = target.quantity.saturating_add(guest_item.quantity);
                tx.set_cart_item_quantity(target.id, quantity).await?;
                tx.delete_cart_item(guest_item.id).await?;
                target.quantity = quantity;
                summary.merged += 1;
            } else {
                tx.reassign_cart_item(guest_item.id, &account_owner).await?;
                account_items.push(CartItem {
                    owner: account_owner.clone(),
                    ..guest_item
                });
                summary.reassigned += 1;
            }
        }
        tx.commit().await?;

        tracing::info!(
            merged = summary.merged,
            reassigned = summary.reassigned,
            "Guest cart merged"
        );
        Ok(summary)
    }

    /// The owner's active lines with live prices, and their totals.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the store fails.
    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn view(&self, owner: &CartOwner) -> Result<CartView, CartError> {
        let lines = self.store.cart_lines(owner).await?;
        let totals = compute_totals(lines.iter().map(|line| line.priced()), self.shipping);

        let mut views = Vec::with_capacity(lines.len());
        for line in lines {
            views.push(CartLineView {
                item_id: line.item.id,
                product_id: line.item.product_id,
                variations: self
                    .catalog
                    .describe(line.item.product_id, &line.item.variations)
                    .await?,
                line_total: line.line_total(),
                product_name: line.product_name,
                quantity: line.item.quantity,
                unit_price: line.unit_price,
            });
        }

        Ok(CartView {
            lines: views,
            totals,
        })
    }

    /// Total units across the owner's active lines.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the store fails.
    pub async fn count(&self, owner: &CartOwner) -> Result<u32, CartError> {
        Ok(self
            .store
            .cart_lines(owner)
            .await?
            .iter()
            .map(|line| line.item.quantity)
            .fold(0_u32, u32::saturating_add))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;
    use techbazaar_core::Money;

    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{NewProduct, NewVariation, Product};

    struct Fixture {
        store: MemoryStore,
        catalog: Catalog,
        shipping: ShippingPolicy,
        shirt: Product,
        cable: Product,
    }

    impl Fixture {
        async fn new() -> Self {
            let store = MemoryStore::new();
            let mut tx = store.begin().await.unwrap();
            let shirt = tx
                .insert_product(NewProduct {
                    name: "Shirt".to_string(),
                    slug: "shirt".to_string(),
                    price: Money::from_units(100),
                    stock: 10,
                    is_available: true,
                    variations: ["red", "blue"]
                        .into_iter()
                        .map(|value| NewVariation {
                            category: "color".to_string(),
                            value: value.to_string(),
                        })
                        .collect(),
                })
                .await
                .unwrap();
            let cable = tx
                .insert_product(NewProduct {
                    name: "Cable".to_string(),
                    slug: "cable".to_string(),
                    price: Money::from_units(40),
                    stock: 10,
                    is_available: true,
                    variations: Vec::new(),
                })
                .await
                .unwrap();
            tx.commit().await.unwrap();

            Self {
                catalog: Catalog::new(Arc::new(store.clone())),
                store,
                shipping: ShippingPolicy::default(),
                shirt,
                cable,
            }
        }

        fn service(&self) -> CartService<'_> {
            CartService::new(&self.store, &self.catalog, &self.shipping)
        }
    }

    fn color(value: &str) -> Vec<(String, String)> {
        vec![("color".to_string(), value.to_string())]
    }

    fn guest(token: &str) -> CartOwner {
        CartOwner::Guest(GuestToken::from_string(token.to_string()))
    }

    #[test]
    fn test_quantity_update_from_request() {
        assert_eq!(QuantityUpdate::from_request(None).unwrap(), QuantityUpdate::Add(1));
        assert_eq!(QuantityUpdate::from_request(Some(3)).unwrap(), QuantityUpdate::Set(3));
        assert!(matches!(
            QuantityUpdate::from_request(Some(0)),
            Err(CartError::InvalidQuantity(ref q)) if q == "0"
        ));
        assert!(matches!(
            QuantityUpdate::from_request(Some(-2)),
            Err(CartError::InvalidQuantity(ref q)) if q == "-2"
        ));
        assert_eq!(QuantityUpdate::Add(2).apply(3).unwrap(), 5);
        assert_eq!(QuantityUpdate::Set(2).apply(3).unwrap(), 2);
        assert!(QuantityUpdate::Add(1).apply(MAX_LINE_QUANTITY).is_err());
    }

    #[tokio::test]
    async fn test_same_selection_increments_existing_line() {
        let fx = Fixture::new().await;
        let owner = guest("g1");
        let cart = fx.service();

        let first = cart
            .add_item(&owner, fx.shirt.id, &color("red"), QuantityUpdate::Add(1))
            .await
            .unwrap();
        let second = cart
            .add_item(&owner, fx.shirt.id, &color("RED"), QuantityUpdate::Add(1))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.quantity, 2);
        assert_eq!(cart.count(&owner).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_different_selection_is_a_new_line() {
        let fx = Fixture::new().await;
        let owner = guest("g1");
        let cart = fx.service();

        let red = cart
            .add_item(&owner, fx.shirt.id, &color("red"), QuantityUpdate::Add(1))
            .await
            .unwrap();
        let blue = cart
            .add_item(&owner, fx.shirt.id, &color("blue"), QuantityUpdate::Add(1))
            .await
            .unwrap();
        assert_ne!(red.id, blue.id);
        assert_eq!(cart.view(&owner).await.unwrap().lines.len(), 2);
    }

    #[tokio::test]
    async fn test_set_overwrites_quantity() {
        let fx = Fixture::new().await;
        let owner = guest("g1");
        let cart = fx.service();

        cart.add_item(&owner, fx.cable.id, &[], QuantityUpdate::Add(1))
            .await
            .unwrap();
        let item = cart
            .add_item(&owner, fx.cable.id, &[], QuantityUpdate::Set(4))
            .await
            .unwrap();
        assert_eq!(item.quantity, 4);
    }

    #[tokio::test]
    async fn test_incomplete_selection_is_rejected() {
        let fx = Fixture::new().await;
        let err = fx
            .service()
            .add_item(&guest("g1"), fx.shirt.id, &[], QuantityUpdate::Add(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CartError::Variation(VariationError::SelectionIncomplete { .. })
        ));
    }

    #[tokio::test]
    async fn test_unavailable_product_is_not_found() {
        let fx = Fixture::new().await;
        let err = fx
            .service()
            .add_item(&guest("g1"), ProductId::new(999), &[], QuantityUpdate::Add(1))
            .await
            .unwrap_err();
        assert!(matches!(err, CartError::ProductNotFound(_)));
    }

    #[tokio::test]
    async fn test_decrement_then_remove() {
        let fx = Fixture::new().await;
        let owner = guest("g1");
        let cart = fx.service();
        let item = cart
            .add_item(&owner, fx.cable.id, &[], QuantityUpdate::Set(2))
            .await
            .unwrap();

        let after = cart.decrement_or_remove(&owner, item.id).await.unwrap();
        assert_eq!(after.map(|i| i.quantity), Some(1));
        assert!(cart.decrement_or_remove(&owner, item.id).await.unwrap().is_none());
        assert!(matches!(
            cart.decrement_or_remove(&owner, item.id).await,
            Err(CartError::ItemNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_other_owners_items_are_invisible() {
        let fx = Fixture::new().await;
        let cart = fx.service();
        let item = cart
            .add_item(&guest("g1"), fx.cable.id, &[], QuantityUpdate::Add(1))
            .await
            .unwrap();
        assert!(matches!(
            cart.remove_item(&guest("g2"), item.id).await,
            Err(CartError::ItemNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_view_totals() {
        let fx = Fixture::new().await;
        let owner = guest("g1");
        let cart = fx.service();
        cart.add_item(&owner, fx.shirt.id, &color("blue"), QuantityUpdate::Set(2))
            .await
            .unwrap();
        cart.add_item(&owner, fx.cable.id, &[], QuantityUpdate::Add(1))
            .await
            .unwrap();

        let view = cart.view(&owner).await.unwrap();
        assert_eq!(view.totals.subtotal, Money::from_units(240));
        assert_eq!(view.totals.shipping_charge, Money::from_units(150));
        assert_eq!(view.totals.grand_total, Money::from_units(390));
        let shirt_line = view
            .lines
            .iter()
            .find(|l| l.product_id == fx.shirt.id)
            .unwrap();
        assert_eq!(shirt_line.line_total, Money::from_units(200));
        assert_eq!(
            shirt_line.variations,
            vec![VariationLabel {
                category: "color".to_string(),
                value: "blue".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_merge_folds_identical_lines_and_reassigns_the_rest() {
        let fx = Fixture::new().await;
        let cart = fx.service();
        let token = GuestToken::from_string("g1".to_string());
        let visitor = CartOwner::Guest(token.clone());
        let account = AccountId::new(7);
        let member = CartOwner::Account(account);

        cart.add_item(&member, fx.shirt.id, &color("red"), QuantityUpdate::Set(1))
            .await
            .unwrap();
        cart.add_item(&visitor, fx.shirt.id, &color("red"), QuantityUpdate::Set(2))
            .await
            .unwrap();
        cart.add_item(&visitor, fx.shirt.id, &color("blue"), QuantityUpdate::Set(1))
            .await
            .unwrap();
        cart.add_item(&visitor, fx.cable.id, &[], QuantityUpdate::Set(3))
            .await
            .unwrap();

        let summary = cart.merge_guest_into_account(&token, account).await.unwrap();
        assert_eq!(summary, MergeSummary { merged: 1, reassigned: 2 });

        assert!(fx.store.cart_items(&visitor).await.is_empty());
        let items = fx.store.cart_items(&member).await;
        assert_eq!(items.len(), 3);
        assert_eq!(items.iter().map(|i| i.quantity).sum::<u32>(), 7);
    }

    #[tokio::test]
    async fn test_failed_merge_leaves_guest_cart_intact() {
        let fx = Fixture::new().await;
        let cart = fx.service();
        let token = GuestToken::from_string("g1".to_string());
        let visitor = CartOwner::Guest(token.clone());
        cart.add_item(&visitor, fx.cable.id, &[], QuantityUpdate::Set(3))
            .await
            .unwrap();

        fx.store.set_fail_commits(true);
        assert!(
            cart.merge_guest_into_account(&token, AccountId::new(7))
                .await
                .is_err()
        );
        fx.store.set_fail_commits(false);

        assert_eq!(fx.store.cart_items(&visitor).await.len(), 1);
        let retried = cart.merge_guest_into_account(&token, AccountId::new(7)).await.unwrap();
        assert_eq!(retried.reassigned, 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_merge_conserves_quantity(
            guest_lines in proptest::collection::vec((0usize..3, 1u32..5), 0..6),
            account_lines in proptest::collection::vec((0usize..3, 1u32..5), 0..6),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(async {
                let fx = Fixture::new().await;
                let cart = fx.service();
                let token = GuestToken::from_string("prop".to_string());
                let visitor = CartOwner::Guest(token.clone());
                let account = AccountId::new(1);
                let member = CartOwner::Account(account);

                let choices: [(ProductId, Vec<(String, String)>); 3] = [
                    (fx.shirt.id, color("red")),
                    (fx.shirt.id, color("blue")),
                    (fx.cable.id, Vec::new()),
                ];
                for (owner, lines) in [(&visitor, &guest_lines), (&member, &account_lines)] {
                    for &(choice, qty) in lines {
                        let (product, selection) = &choices[choice];
                        cart.add_item(owner, *product, selection, QuantityUpdate::Add(qty))
                            .await
                            .unwrap();
                    }
                }

                let before: u32 = guest_lines.iter().chain(&account_lines).map(|&(_, q)| q).sum();
                cart.merge_guest_into_account(&token, account).await.unwrap();

                assert!(fx.store.cart_items(&visitor).await.is_empty());
                let after: u32 = fx.store.cart_items(&member).await.iter().map(|i| i.quantity).sum();
                assert_eq!(before, after);
            });
        }
    }
}
