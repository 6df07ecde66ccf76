//! Domain models for storefront.
//!
//! These are validated records handed out by the [`Store`](crate::db::Store)
//! implementations. Database row types stay private to `db::postgres`.

pub mod cart;
pub mod catalog;
pub mod order;
pub mod session;

pub use cart::{CartItem, CartLine, NewCartItem, NewWishlistItem, WishlistItem};
pub use catalog::{NewProduct, NewVariation, Product};
pub use order::{NewOrder, NewOrderProduct, NewPayment, Order, OrderProduct, Payment};
pub use session::{CurrentUser, keys as session_keys};
