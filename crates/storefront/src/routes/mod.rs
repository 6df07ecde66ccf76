//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                          - Liveness
//! GET  /health/ready                    - Readiness (store reachable)
//!
//! # Cart
//! GET  /cart                            - Cart lines and totals
//! GET  /cart/count                      - Badge count
//! POST /cart/add/{product_id}           - Add a selection (category=value pairs, optional quantity)
//! POST /cart/decrement/{item_id}        - Remove one unit
//! POST /cart/remove/{item_id}           - Remove the line
//!
//! # Wishlist
//! GET  /wishlist                        - Saved items
//! POST /wishlist/add/{product_id}       - Save a selection
//! POST /wishlist/remove/{item_id}       - Delete a saved item
//! POST /wishlist/move/{item_id}         - Move into the cart
//!
//! # Checkout (requires auth, except gateway callbacks)
//! GET  /checkout                        - Preview and callback notice
//! POST /orders/place                    - Place an order
//! POST /orders/pay                      - Redirect to the gateway
//! POST /orders/payment/success          - Gateway callback
//! POST /orders/payment/fail             - Gateway callback
//! POST /orders/payment/cancel           - Gateway callback
//! GET  /orders/complete                 - Receipt
//!
//! # Account (requires auth)
//! GET  /account/orders                  - Order history
//! GET  /account/orders/{order_number}   - Order detail
//! ```

pub mod account;
pub mod cart;
pub mod checkout;
pub mod health;
pub mod wishlist;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/count", get(cart::count))
        .route("/add/{product_id}", post(cart::add))
        .route("/decrement/{item_id}", post(cart::decrement))
        .route("/remove/{item_id}", post(cart::remove))
}

/// Create the wishlist routes router.
pub fn wishlist_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(wishlist::show))
        .route("/add/{product_id}", post(wishlist::add))
        .route("/remove/{item_id}", post(wishlist::remove))
        .route("/move/{item_id}", post(wishlist::move_to_cart))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/place", post(checkout::place_order))
        .route("/pay", post(checkout::pay))
        .route("/payment/success", post(checkout::payment_success))
        .route("/payment/fail", post(checkout::payment_fail))
        .route("/payment/cancel", post(checkout::payment_cancel))
        .route("/complete", get(checkout::complete))
}

/// Create the account routes router.
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(account::orders))
        .route("/orders/{order_number}", get(account::order_detail))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .route("/checkout", get(checkout::preview))
        .nest("/cart", cart_routes())
        .nest("/wishlist", wishlist_routes())
        .nest("/orders", order_routes())
        .nest("/account", account_routes())
}
