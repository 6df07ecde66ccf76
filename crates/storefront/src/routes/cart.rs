//! Cart route handlers.
//!
//! The cart belongs to the signed-in account, or to a guest token kept in
//! the session and issued on the first add.

use axum::{
    Form, Json,
    extract::{Path, State},
};
use serde::Serialize;
use tower_sessions::Session;
use tracing::instrument;

use techbazaar_core::{CartItemId, CartTotals, ProductId, compute_totals};

use crate::error::{AppError, Result, add_breadcrumb};
use crate::models::CartItem;
use crate::services::accounts;
use crate::services::cart::{CartError, CartView, QuantityUpdate};
use crate::state::AppState;

/// Response after a cart change.
#[derive(Debug, Serialize)]
pub struct CartChange {
    /// The line as it now stands; `None` once deleted.
    pub item: Option<CartItem>,
    /// Total units now in the cart.
    pub count: u32,
}

/// Badge count.
#[derive(Debug, Serialize)]
pub struct CartCount {
    pub count: u32,
}

/// Split an add-to-cart form into variation pairs and the optional
/// `quantity` field. A blank `quantity` counts as 1.
///
/// # Errors
///
/// Returns `CartError::InvalidQuantity` if `quantity` is not an integer.
pub fn split_selection(
    fields: Vec<(String, String)>,
) -> Result<(Vec<(String, String)>, Option<i64>)> {
    let mut selection = Vec::with_capacity(fields.len());
    let mut quantity = None;
    for (key, value) in fields {
        if key == "quantity" {
            let trimmed = value.trim();
            let parsed = if trimmed.is_empty() {
                1
            } else {
                trimmed
                    .parse::<i64>()
                    .map_err(|_| CartError::InvalidQuantity(value.clone()))?
            };
            quantity = Some(parsed);
        } else {
            selection.push((key, value));
        }
    }
    Ok((selection, quantity))
}

/// Display the cart.
#[instrument(skip(state, session))]
pub async fn show(State(state): State<AppState>, session: Session) -> Result<Json<CartView>> {
    let Some(owner) = accounts::peek_owner(&session).await else {
        return Ok(Json(CartView {
            lines: Vec::new(),
            totals: empty_totals(&state),
        }));
    };
    Ok(Json(state.cart().view(&owner).await?))
}

fn empty_totals(state: &AppState) -> CartTotals {
    compute_totals(std::iter::empty(), state.shipping())
}

/// Cart badge count.
pub async fn count(State(state): State<AppState>, session: Session) -> Result<Json<CartCount>> {
    let count = match accounts::peek_owner(&session).await {
        Some(owner) => state.cart().count(&owner).await?,
        None => 0,
    };
    Ok(Json(CartCount { count }))
}

/// Add a product selection to the cart.
#[instrument(skip(state, session, fields), fields(product_id = %product_id))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    Path(product_id): Path<ProductId>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Json<CartChange>> {
    let (selection, quantity) = split_selection(fields)?;
    let update = QuantityUpdate::from_request(quantity)?;
    let owner = accounts::cart_owner(&session).await?;

    let cart = state.cart();
    let item = cart.add_item(&owner, product_id, &selection, update).await?;
    add_breadcrumb(
        "cart",
        "Added to cart",
        Some(&[("product_id", &product_id.to_string())]),
    );

    Ok(Json(CartChange {
        item: Some(item),
        count: cart.count(&owner).await?,
    }))
}

/// Take one unit off a line.
#[instrument(skip(state, session), fields(cart_item_id = %item_id))]
pub async fn decrement(
    State(state): State<AppState>,
    session: Session,
    Path(item_id): Path<CartItemId>,
) -> Result<Json<CartChange>> {
    let owner = accounts::peek_owner(&session)
        .await
        .ok_or_else(|| AppError::NotFound(format!("cart item {item_id}")))?;

    let cart = state.cart();
    let item = cart.decrement_or_remove(&owner, item_id).await?;
    Ok(Json(CartChange {
        item,
        count: cart.count(&owner).await?,
    }))
}

/// Delete a line.
#[instrument(skip(state, session), fields(cart_item_id = %item_id))]
pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    Path(item_id): Path<CartItemId>,
) -> Result<Json<CartChange>> {
    let owner = accounts::peek_owner(&session)
        .await
        .ok_or_else(|| AppError::NotFound(format!("cart item {item_id}")))?;

    let cart = state.cart();
    cart.remove_item(&owner, item_id).await?;
    Ok(Json(CartChange {
        item: None,
        count: cart.count(&owner).await?,
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn pair(k: &str, v: &str) -> (String, String) {
        (k.to_string(), v.to_string())
    }

    #[test]
    fn test_split_selection() {
        let (selection, quantity) =
            split_selection(vec![pair("color", "red"), pair("quantity", "3"), pair("size", "L")])
                .unwrap();
        assert_eq!(selection, vec![pair("color", "red"), pair("size", "L")]);
        assert_eq!(quantity, Some(3));

        let (_, quantity) = split_selection(vec![pair("color", "red")]).unwrap();
        assert_eq!(quantity, None);

        let (_, quantity) = split_selection(vec![pair("quantity", "  ")]).unwrap();
        assert_eq!(quantity, Some(1));

        let err = split_selection(vec![pair("quantity", "lots")]).unwrap_err();
        assert!(matches!(
            err,
            AppError::Cart(CartError::InvalidQuantity(ref q)) if q == "lots"
        ));
        assert_eq!(err.status(), axum::http::StatusCode::UNPROCESSABLE_ENTITY);
    }
}
