//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `catalog` - Product and variation reads (variations cached)
//! - `cart` - Cart lines, totals and the guest-to-account merge
//! - `wishlist` - Saved selections and move-to-cart
//! - `stock` - Availability checks and the conditional decrement
//! - `orders` - Order lifecycle from placement to payment
//! - `payment` - SSLCommerz session initialization
//! - `reconcile` - Gateway callback handling
//! - `accounts` - Session identity and the sign-in hook
//! - `notifier` - Order receipts
//!
//! Services borrow the store and catalog for the length of a request; build
//! them from [`crate::state::AppState`] in the handler.

pub mod accounts;
pub mod cart;
pub mod catalog;
pub mod notifier;
pub mod orders;
pub mod payment;
pub mod reconcile;
pub mod stock;
pub mod wishlist;

pub use catalog::Catalog;
pub use notifier::{LogNotifier, Notifier};
pub use payment::{PaymentGateway, SslCommerzClient};
