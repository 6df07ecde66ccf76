//! Account route handlers (require sign-in).

use axum::{
    Json,
    extract::{Path, State},
};

use techbazaar_core::OrderNumber;

use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::Order;
use crate::services::orders::OrderDetail;
use crate::state::AppState;

/// Paid orders, newest first.
pub async fn orders(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<Order>>> {
    Ok(Json(state.orders().history(user.id).await?))
}

/// One order with its lines and payment.
pub async fn order_detail(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(order_number): Path<String>,
) -> Result<Json<OrderDetail>> {
    let number = OrderNumber::parse(&order_number)
        .map_err(|_| AppError::NotFound(format!("order {order_number}")))?;
    Ok(Json(state.orders().detail(user.id, &number).await?))
}
