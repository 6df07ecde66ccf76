//! Wishlist route handlers.

use axum::{
    Form, Json,
    extract::{Path, State},
};
use serde::Serialize;
use tower_sessions::Session;
use tracing::instrument;

use techbazaar_core::{ProductId, WishlistItemId};

use crate::error::{AppError, Result};
use crate::models::{CartItem, WishlistItem};
use crate::services::accounts;
use crate::services::wishlist::{WishlistAdd, WishlistItemView};
use crate::state::AppState;

/// Response after adding to the wishlist.
#[derive(Debug, Serialize)]
pub struct WishlistAdded {
    pub item: WishlistItem,
    /// `false` when the same selection was already saved.
    pub created: bool,
}

/// Display the wishlist.
pub async fn show(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Vec<WishlistItemView>>> {
    let items = match accounts::peek_owner(&session).await {
        Some(owner) => state.wishlist().view(&owner).await?,
        None => Vec::new(),
    };
    Ok(Json(items))
}

/// Save a product selection.
#[instrument(skip(state, session, selection), fields(product_id = %product_id))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    Path(product_id): Path<ProductId>,
    Form(selection): Form<Vec<(String, String)>>,
) -> Result<Json<WishlistAdded>> {
    let owner = accounts::cart_owner(&session).await?;
    let added = match state.wishlist().add(&owner, product_id, &selection).await? {
        WishlistAdd::Added(item) => WishlistAdded {
            item,
            created: true,
        },
        WishlistAdd::AlreadyPresent(item) => WishlistAdded {
            item,
            created: false,
        },
    };
    Ok(Json(added))
}

/// Delete a saved item.
#[instrument(skip(state, session), fields(wishlist_item_id = %item_id))]
pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    Path(item_id): Path<WishlistItemId>,
) -> Result<Json<Vec<WishlistItemView>>> {
    let owner = accounts::peek_owner(&session)
        .await
        .ok_or_else(|| AppError::NotFound(format!("wishlist item {item_id}")))?;

    let wishlist = state.wishlist();
    wishlist.remove(&owner, item_id).await?;
    Ok(Json(wishlist.view(&owner).await?))
}

/// Move a saved item into the cart.
#[instrument(skip(state, session), fields(wishlist_item_id = %item_id))]
pub async fn move_to_cart(
    State(state): State<AppState>,
    session: Session,
    Path(item_id): Path<WishlistItemId>,
) -> Result<Json<CartItem>> {
    let owner = accounts::peek_owner(&session)
        .await
        .ok_or_else(|| AppError::NotFound(format!("wishlist item {item_id}")))?;
    Ok(Json(state.wishlist().move_to_cart(&owner, item_id).await?))
}
