//! Persistence for the storefront.
//!
//! # Database: `techbazaar_storefront`
//!
//! ## Tables (schema `storefront`)
//!
//! - `product`, `variation` - Catalog and live stock counters
//! - `cart_item`, `cart_item_variation` - Carts, owned by an account or a guest token
//! - `wishlist_item`, `wishlist_item_variation` - Saved selections
//! - `customer_order` - Orders and their contact snapshot
//! - `order_product`, `order_product_variation` - Priced line snapshots taken at payment
//! - `payment` - Completed payments, unique per gateway payment id
//!
//! Sessions live in `tower_sessions.session`.
//!
//! # Store seam
//!
//! Services talk to a [`Store`] rather than a pool. [`PgStore`] is the
//! production implementation; [`MemoryStore`] keeps everything in process
//! for tests and local runs. Multi-step writes go through a [`StoreTx`],
//! which either commits every write or none.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p techbazaar-cli -- migrate
//! ```

pub mod memory;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use techbazaar_core::{
    AccountId, CartItemId, CartOwner, OrderId, OrderNumber, OrderStatus, PaymentId, ProductId,
    Variation, WishlistItemId,
};

use crate::models::{
    CartItem, CartLine, NewCartItem, NewOrder, NewOrderProduct, NewPayment, NewProduct,
    NewWishlistItem, Order, OrderProduct, Payment, Product, WishlistItem,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors that can occur during persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Database query failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in database is invalid or corrupted.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested record was not found.
    #[error("not found")]
    NotFound,

    /// A uniqueness constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Outcome of a conditional stock decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockChange {
    /// Stock was reduced; `remaining` units are left.
    Decremented { remaining: u32 },
    /// Fewer than the requested units were on hand; nothing changed.
    Insufficient { remaining: u32 },
    /// No such product.
    Missing,
}

/// Read access to the storefront data, plus a way to start a transaction.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Start a transaction. Dropping it without [`StoreTx::commit`] discards
    /// every write made through it.
    async fn begin(&self) -> Result<Box<dyn StoreTx>, RepositoryError>;

    /// Check the backing store is reachable.
    async fn ping(&self) -> Result<(), RepositoryError>;

    async fn product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    /// Every variation declared by `product`, active or not.
    async fn variations(&self, product: ProductId) -> Result<Vec<Variation>, RepositoryError>;

    /// Active cart items of `owner` joined with live product data, oldest first.
    async fn cart_lines(&self, owner: &CartOwner) -> Result<Vec<CartLine>, RepositoryError>;

    /// Wishlist items of `owner`, oldest first.
    async fn wishlist_items(&self, owner: &CartOwner)
    -> Result<Vec<WishlistItem>, RepositoryError>;

    async fn order_by_number(
        &self,
        number: &OrderNumber,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Orders of `account` in `status`, newest first.
    async fn orders_for_account(
        &self,
        account: AccountId,
        status: OrderStatus,
    ) -> Result<Vec<Order>, RepositoryError>;

    async fn order_products(&self, order: OrderId) -> Result<Vec<OrderProduct>, RepositoryError>;

    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>, RepositoryError>;
}

/// A unit of work against the store.
#[async_trait]
pub trait StoreTx: Send {
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    /// Insert a product and its variations (catalog seeding).
    async fn insert_product(&mut self, product: NewProduct) -> Result<Product, RepositoryError>;

    async fn cart_lines(&mut self, owner: &CartOwner) -> Result<Vec<CartLine>, RepositoryError>;

    /// Every cart item of `owner` for `product`, whatever its variations.
    async fn cart_items_for_product(
        &mut self,
        owner: &CartOwner,
        product: ProductId,
    ) -> Result<Vec<CartItem>, RepositoryError>;

    /// Every cart item of `owner`, active or not.
    async fn cart_items(&mut self, owner: &CartOwner) -> Result<Vec<CartItem>, RepositoryError>;

    /// The cart item `id`, only if it belongs to `owner`.
    async fn cart_item(
        &mut self,
        owner: &CartOwner,
        id: CartItemId,
    ) -> Result<Option<CartItem>, RepositoryError>;

    async fn insert_cart_item(&mut self, item: NewCartItem) -> Result<CartItem, RepositoryError>;

    async fn set_cart_item_quantity(
        &mut self,
        id: CartItemId,
        quantity: u32,
    ) -> Result<(), RepositoryError>;

    /// Move a cart item to another owner.
    async fn reassign_cart_item(
        &mut self,
        id: CartItemId,
        owner: &CartOwner,
    ) -> Result<(), RepositoryError>;

    async fn delete_cart_item(&mut self, id: CartItemId) -> Result<(), RepositoryError>;

    /// Delete every cart item of `owner`; returns how many were removed.
    async fn clear_cart(&mut self, owner: &CartOwner) -> Result<u64, RepositoryError>;

    async fn wishlist_items_for_product(
        &mut self,
        owner: &CartOwner,
        product: ProductId,
    ) -> Result<Vec<WishlistItem>, RepositoryError>;

    /// The wishlist item `id`, only if it belongs to `owner`.
    async fn wishlist_item(
        &mut self,
        owner: &CartOwner,
        id: WishlistItemId,
    ) -> Result<Option<WishlistItem>, RepositoryError>;

    async fn insert_wishlist_item(
        &mut self,
        item: NewWishlistItem,
    ) -> Result<WishlistItem, RepositoryError>;

    async fn delete_wishlist_item(&mut self, id: WishlistItemId) -> Result<(), RepositoryError>;

    /// Atomically take `quantity` units of `product` if at least that many
    /// are on hand.
    async fn decrement_stock(
        &mut self,
        product: ProductId,
        quantity: u32,
    ) -> Result<StockChange, RepositoryError>;

    /// Insert an `unordered` order, assigning its id and order number.
    async fn insert_order(&mut self, order: NewOrder) -> Result<Order, RepositoryError>;

    /// Fetch an order and hold it against concurrent transitions until this
    /// transaction ends.
    async fn lock_order(&mut self, number: &OrderNumber) -> Result<Option<Order>, RepositoryError>;

    /// Move order `id` to `to` if its status is one of `from`, recording
    /// `payment` when given. Returns `None` when the status did not match.
    async fn transition_order(
        &mut self,
        id: OrderId,
        from: &[OrderStatus],
        to: OrderStatus,
        payment: Option<PaymentId>,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Record a payment. A second payment with the same gateway payment id,
    /// or for the same order, is a [`RepositoryError::Conflict`].
    async fn insert_payment(&mut self, payment: NewPayment) -> Result<Payment, RepositoryError>;

    async fn insert_order_product(
        &mut self,
        line: NewOrderProduct,
    ) -> Result<OrderProduct, RepositoryError>;

    /// Make every write in this transaction permanent.
    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
