//! Cart and wishlist records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use techbazaar_core::{CartItemId, CartOwner, Money, ProductId, VariationSet, WishlistItemId};

/// One line of a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub owner: CartOwner,
    pub product_id: ProductId,
    pub variations: VariationSet,
    /// Always at least 1; a line reaching zero is deleted instead.
    pub quantity: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A cart item to insert.
#[derive(Debug, Clone)]
pub struct NewCartItem {
    pub owner: CartOwner,
    pub product_id: ProductId,
    pub variations: VariationSet,
    pub quantity: u32,
}

/// A cart item joined with its product's live name, price and stock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    pub item: CartItem,
    pub product_name: String,
    pub unit_price: Money,
    pub stock: u32,
    pub is_available: bool,
}

impl CartLine {
    /// `unit_price × quantity`.
    #[must_use]
    pub fn line_total(&self) -> Money {
        self.unit_price.times(self.item.quantity)
    }

    /// `(unit_price, quantity)` as consumed by
    /// [`compute_totals`](techbazaar_core::compute_totals).
    #[must_use]
    pub const fn priced(&self) -> (Money, u32) {
        (self.unit_price, self.item.quantity)
    }
}

/// A saved-for-later product selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WishlistItem {
    pub id: WishlistItemId,
    pub owner: CartOwner,
    pub product_id: ProductId,
    pub variations: VariationSet,
    pub added_at: DateTime<Utc>,
}

/// A wishlist item to insert.
#[derive(Debug, Clone)]
pub struct NewWishlistItem {
    pub owner: CartOwner,
    pub product_id: ProductId,
    pub variations: VariationSet,
}
