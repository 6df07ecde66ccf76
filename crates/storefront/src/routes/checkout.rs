//! Checkout, payment and gateway callback handlers.
//!
//! ```text
//! GET  /checkout                 - Cart preview and any callback notice
//! POST /orders/place             - Contact form -> Unordered order
//! POST /orders/pay               - Redirect to the gateway's payment page
//! POST /orders/payment/{kind}    - Gateway callbacks (no session needed)
//! GET  /orders/complete          - Receipt for a paid order
//! ```

use axum::{
    Form, Json,
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    response::Redirect,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use techbazaar_core::{CallbackKind, CartOwner, ContactForm, OrderNumber};

use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::RequireAuth;
use crate::models::Order;
use crate::services::cart::CartView;
use crate::services::orders::OrderDetail;
use crate::services::payment;
use crate::services::reconcile::{CallbackPayload, Notice, Reconciler};
use crate::state::AppState;

/// Query string of the checkout page.
#[derive(Debug, Default, Deserialize)]
pub struct CheckoutQuery {
    #[serde(default)]
    pub notice: Option<String>,
}

/// Checkout page data.
#[derive(Debug, Serialize)]
pub struct CheckoutPreview {
    pub cart: CartView,
    /// Message left by a payment callback.
    pub notice: Option<&'static str>,
}

/// Pay form.
#[derive(Debug, Deserialize)]
pub struct PayForm {
    pub order_number: String,
}

/// Query string of the completed-order page.
#[derive(Debug, Deserialize)]
pub struct CompleteQuery {
    pub order_number: String,
    pub payment_id: String,
}

fn parse_order_number(raw: &str) -> Result<OrderNumber> {
    OrderNumber::parse(raw).map_err(|e| AppError::BadRequest(e.to_string()))
}

/// Client address as reported by the proxy in front of the storefront.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(String::from)
}

/// Checkout preview.
#[instrument(skip(state, user, query), fields(account_id = %user.id))]
pub async fn preview(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Query(query): Query<CheckoutQuery>,
) -> Result<Json<CheckoutPreview>> {
    let cart = state
        .orders()
        .checkout_preview(&CartOwner::Account(user.id))
        .await?;
    let notice = query
        .notice
        .and_then(|n| n.parse::<Notice>().ok())
        .map(Notice::message);
    Ok(Json(CheckoutPreview { cart, notice }))
}

/// Place an order from the cart.
#[instrument(skip(state, user, headers, form), fields(account_id = %user.id))]
pub async fn place_order(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    headers: HeaderMap,
    Form(form): Form<ContactForm>,
) -> Result<Json<Order>> {
    let contact = form
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let order = state
        .orders()
        .create_order(&CartOwner::Account(user.id), contact, client_ip(&headers))
        .await?;
    add_breadcrumb(
        "checkout",
        "Order placed",
        Some(&[("order_number", order.order_number.as_str())]),
    );
    Ok(Json(order))
}

/// Open a gateway session and send the shopper there.
#[instrument(skip(state, user, form), fields(account_id = %user.id))]
pub async fn pay(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Form(form): Form<PayForm>,
) -> Result<Redirect> {
    let number = parse_order_number(&form.order_number)?;
    let page = payment::start_payment(&state.orders(), state.gateway(), user.id, &number).await?;
    Ok(Redirect::to(page.as_str()))
}

// Every callback ends in a redirect, so the body is decoded here rather
// than through `Form`, which rejects on content type.
async fn callback(state: &AppState, kind: CallbackKind, body: &[u8]) -> Redirect {
    let payload = CallbackPayload::from_body(body);
    let orders = state.orders();
    let outcome = Reconciler::new(&orders, state.gateway().method_name())
        .on_callback(kind, payload)
        .await;
    Redirect::to(&outcome.location())
}

/// Gateway success callback.
pub async fn payment_success(State(state): State<AppState>, body: Bytes) -> Redirect {
    callback(&state, CallbackKind::Success, &body).await
}

/// Gateway failure callback.
pub async fn payment_fail(State(state): State<AppState>, body: Bytes) -> Redirect {
    callback(&state, CallbackKind::Fail, &body).await
}

/// Gateway cancellation callback.
pub async fn payment_cancel(State(state): State<AppState>, body: Bytes) -> Redirect {
    callback(&state, CallbackKind::Cancel, &body).await
}

/// Receipt for a paid order.
#[instrument(skip(state, user, query), fields(account_id = %user.id))]
pub async fn complete(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Query(query): Query<CompleteQuery>,
) -> Result<Json<OrderDetail>> {
    let number = parse_order_number(&query.order_number)?;
    Ok(Json(
        state
            .orders()
            .receipt(user.id, &number, &query.payment_id)
            .await?,
    ))
}
