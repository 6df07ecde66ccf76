//! SSLCommerz payment gateway client.
//!
//! Opens a hosted payment session for an order. The gateway answers with a
//! `GatewayPageURL` the shopper is redirected to; the outcome comes back
//! later as a browser POST to one of the callback URLs (see
//! [`super::reconcile`]).

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;
use url::Url;

use techbazaar_core::{AccountId, CurrencyCode, OrderNumber};

use super::orders::{OrderError, OrderService};
use crate::config::SslCommerzConfig;
use crate::models::Order;

/// Payment method recorded on SSLCommerz payments.
pub const SSLCOMMERZ_METHOD: &str = "SSLCOMMERZ";

/// Errors talking to the payment gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The gateway could not be reached or did not answer in time.
    #[error("payment gateway unreachable: {0}")]
    Unreachable(String),

    /// The gateway answered but did not open a session.
    #[error("payment gateway rejected the request: {0}")]
    Rejected(String),
}

/// Opens payment sessions for orders.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Name recorded as the payment method.
    fn method_name(&self) -> &str;

    /// Open a payment session for `order` and return the page to send the
    /// shopper to.
    async fn init_session(&self, order: &Order) -> Result<Url, GatewayError>;
}

/// Where the gateway sends the shopper back to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackUrls {
    pub success: Url,
    pub fail: Url,
    pub cancel: Url,
}

impl CallbackUrls {
    /// Callback URLs under the storefront's public base URL.
    ///
    /// # Errors
    ///
    /// Returns `url::ParseError` if `base_url` cannot be joined.
    pub fn from_base(base_url: &Url) -> Result<Self, url::ParseError> {
        Ok(Self {
            success: base_url.join("/orders/payment/success")?,
            fail: base_url.join("/orders/payment/fail")?,
            cancel: base_url.join("/orders/payment/cancel")?,
        })
    }
}

/// Session-init response. Only the fields we act on.
#[derive(Debug, Deserialize)]
struct SessionResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(rename = "GatewayPageURL", default)]
    gateway_page_url: Option<String>,
    #[serde(default)]
    failedreason: Option<String>,
}

/// SSLCommerz API client.
#[derive(Clone)]
pub struct SslCommerzClient {
    client: reqwest::Client,
    store_id: String,
    store_password: SecretString,
    api_url: Url,
    callbacks: CallbackUrls,
}

impl SslCommerzClient {
    /// Create a new SSLCommerz client.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Rejected` if the HTTP client fails to build.
    pub fn new(config: &SslCommerzConfig, callbacks: CallbackUrls) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Rejected(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            store_id: config.store_id.clone(),
            store_password: config.store_password.clone(),
            api_url: config.api_url.clone(),
            callbacks,
        })
    }

    /// Form fields sent to open a session for `order`.
    fn session_form(&self, order: &Order) -> Vec<(&'static str, String)> {
        let contact = &order.contact;
        vec![
            ("store_id", self.store_id.clone()),
            ("store_passwd", self.store_password.expose_secret().to_string()),
            ("total_amount", order.order_total.to_wire()),
            ("currency", CurrencyCode::default().to_string()),
            ("tran_id", order.order_number.to_string()),
            ("success_url", self.callbacks.success.to_string()),
            ("fail_url", self.callbacks.fail.to_string()),
            ("cancel_url", self.callbacks.cancel.to_string()),
            ("cus_name", contact.full_name()),
            ("cus_email", contact.email.to_string()),
            ("cus_add1", contact.address_line_1.clone()),
            ("cus_add2", contact.address_line_2.clone().unwrap_or_default()),
            ("cus_city", contact.city.clone()),
            ("cus_state", contact.state.clone()),
            ("cus_postcode", "1000".to_string()),
            ("cus_country", contact.country.clone()),
            ("cus_phone", contact.phone.clone()),
            ("shipping_method", "NO".to_string()),
            ("product_name", "TechBazaar order".to_string()),
            ("product_category", "Electronics".to_string()),
            ("product_profile", "general".to_string()),
        ]
    }
}

#[async_trait]
impl PaymentGateway for SslCommerzClient {
    fn method_name(&self) -> &str {
        SSLCOMMERZ_METHOD
    }

    #[instrument(skip(self, order), fields(order_number = %order.order_number))]
    async fn init_session(&self, order: &Order) -> Result<Url, GatewayError> {
        let response = self
            .client
            .post(self.api_url.clone())
            .form(&self.session_form(order))
            .send()
            .await
            .map_err(|e| GatewayError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Rejected(format!("HTTP {}", status.as_u16())));
        }

        let body: SessionResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Rejected(format!("unreadable response: {e}")))?;

        let Some(page) = body.gateway_page_url.filter(|u| !u.is_empty()) else {
            let reason = body
                .failedreason
                .or(body.status)
                .unwrap_or_else(|| "no GatewayPageURL in response".to_string());
            tracing::warn!(reason = %reason, "Gateway refused to open a session");
            return Err(GatewayError::Rejected(reason));
        };

        let url = Url::parse(&page)
            .map_err(|e| GatewayError::Rejected(format!("invalid GatewayPageURL: {e}")))?;
        tracing::info!("Payment session opened");
        Ok(url)
    }
}

impl std::fmt::Debug for SslCommerzClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SslCommerzClient")
            .field("store_id", &self.store_id)
            .field("store_password", &"[REDACTED]")
            .field("api_url", &self.api_url.as_str())
            .finish_non_exhaustive()
    }
}

/// Errors starting a payment.
#[derive(Debug, Error)]
pub enum StartPaymentError {
    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Send one of `account`'s unpaid orders to the gateway.
///
/// The order moves to `Ordered` only once the gateway has opened a session;
/// a gateway failure leaves it as it was.
///
/// # Errors
///
/// - `StartPaymentError::Order` if the order is unknown, someone else's, or
///   no longer payable
/// - `StartPaymentError::Gateway` if the gateway is unreachable or refuses
#[instrument(skip(orders, gateway), fields(account_id = %account, order_number = %number))]
pub async fn start_payment(
    orders: &OrderService<'_>,
    gateway: &dyn PaymentGateway,
    account: AccountId,
    number: &OrderNumber,
) -> Result<Url, StartPaymentError> {
    let order = orders.payable_order(account, number).await?;
    let page = gateway.init_session(&order).await?;
    orders.mark_awaiting_payment(number).await?;
    Ok(page)
}
