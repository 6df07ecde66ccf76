//! Applies payment gateway callbacks to orders.
//!
//! Callbacks are browser POSTs relayed by the gateway and are untrusted. A
//! success callback only ever finalizes an order we already know to be
//! unpaid, and the amount recorded is the order's own total. Every callback
//! ends in a redirect; nothing here surfaces as a server error, since the
//! gateway treats anything but an acknowledgement as a failed delivery.

use std::str::FromStr;

use rust_decimal::Decimal;
use tracing::instrument;
use url::form_urlencoded;

use techbazaar_core::{CallbackKind, OrderNumber};

use super::orders::{FinalizeOutcome, OrderError, OrderService, PaymentReceipt};

/// Fields the gateway posts back. Everything else is ignored.
#[derive(Debug, Clone, Default)]
pub struct CallbackPayload {
    /// Our order number, echoed back.
    pub tran_id: Option<String>,
    /// The gateway's payment id.
    pub val_id: Option<String>,
    /// Amount the gateway says it charged.
    pub amount: Option<String>,
}

impl CallbackPayload {
    /// Read the callback fields from a url-encoded body, whatever content
    /// type it arrived with. The first occurrence of a field wins; a body
    /// that is not url-encoded yields an empty payload.
    #[must_use]
    pub fn from_body(body: &[u8]) -> Self {
        let mut payload = Self::default();
        for (key, value) in form_urlencoded::parse(body) {
            let field = match key.as_ref() {
                "tran_id" => &mut payload.tran_id,
                "val_id" => &mut payload.val_id,
                "amount" => &mut payload.amount,
                _ => continue,
            };
            field.get_or_insert_with(|| value.into_owned());
        }
        payload
    }
}

/// Transient message shown on the checkout page after a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    PaymentFailed,
    PaymentCancelled,
    FinalizationFailed,
}

impl Notice {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PaymentFailed => "payment_failed",
            Self::PaymentCancelled => "payment_cancelled",
            Self::FinalizationFailed => "finalization_failed",
        }
    }

    /// Message for the shopper.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::PaymentFailed => "Payment failed. Please try again.",
            Self::PaymentCancelled => "Payment was cancelled.",
            Self::FinalizationFailed => {
                "Your payment was received but the order could not be completed. \
                 Please review your cart."
            }
        }
    }
}

impl FromStr for Notice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "payment_failed" => Ok(Self::PaymentFailed),
            "payment_cancelled" => Ok(Self::PaymentCancelled),
            "finalization_failed" => Ok(Self::FinalizationFailed),
            _ => Err(format!("unknown notice: {s}")),
        }
    }
}

/// What a callback did, and where to send the shopper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// The order is paid (now or earlier).
    Completed {
        order_number: OrderNumber,
        gateway_payment_id: String,
    },
    /// Back to checkout with a notice; nothing was paid.
    ReturnToCheckout(Notice),
    /// Nothing to act on; acknowledged and ignored.
    Ignored,
}

impl CallbackOutcome {
    /// Path to redirect the shopper to.
    #[must_use]
    pub fn location(&self) -> String {
        match self {
            Self::Completed {
                order_number,
                gateway_payment_id,
            } => {
                let query = form_urlencoded::Serializer::new(String::new())
                    .append_pair("order_number", order_number.as_str())
                    .append_pair("payment_id", gateway_payment_id)
                    .finish();
                format!("/orders/complete?{query}")
            }
            Self::ReturnToCheckout(notice) => format!("/checkout?notice={}", notice.as_str()),
            Self::Ignored => "/".to_string(),
        }
    }
}

/// Applies gateway callbacks through the order lifecycle.
pub struct Reconciler<'a> {
    orders: &'a OrderService<'a>,
    method: &'a str,
}

impl<'a> Reconciler<'a> {
    /// `method` is recorded on payments created by success callbacks.
    #[must_use]
    pub const fn new(orders: &'a OrderService<'a>, method: &'a str) -> Self {
        Self { orders, method }
    }

    /// Apply one callback.
    #[instrument(skip(self, payload), fields(kind = %kind, tran_id = ?payload.tran_id))]
    pub async fn on_callback(&self, kind: CallbackKind, payload: CallbackPayload) -> CallbackOutcome {
        match kind {
            CallbackKind::Success => self.on_success(payload).await,
            CallbackKind::Fail => {
                tracing::info!("Payment failed at gateway");
                CallbackOutcome::ReturnToCheckout(Notice::PaymentFailed)
            }
            CallbackKind::Cancel => {
                tracing::info!("Payment cancelled by shopper");
                CallbackOutcome::ReturnToCheckout(Notice::PaymentCancelled)
            }
        }
    }

    async fn on_success(&self, payload: CallbackPayload) -> CallbackOutcome {
        let (Some(tran_id), Some(val_id)) = (payload.tran_id, payload.val_id) else {
            tracing::warn!("Success callback without tran_id or val_id");
            return CallbackOutcome::Ignored;
        };
        let val_id = val_id.trim().to_string();
        if val_id.is_empty() {
            tracing::warn!("Success callback with empty val_id");
            return CallbackOutcome::Ignored;
        }
        let Ok(number) = OrderNumber::parse(&tran_id) else {
            tracing::warn!(tran_id = %tran_id, "Success callback for malformed order number");
            return CallbackOutcome::Ignored;
        };

        let receipt = PaymentReceipt {
            gateway_payment_id: val_id.clone(),
            method: self.method.to_string(),
        };
        match self.orders.finalize(&number, receipt).await {
            Ok(outcome) => {
                check_echoed_amount(&outcome, payload.amount.as_deref());
                if let FinalizeOutcome::AlreadyPaid { .. } = outcome {
                    tracing::info!("Duplicate success callback acknowledged");
                }
                CallbackOutcome::Completed {
                    order_number: number,
                    gateway_payment_id: val_id,
                }
            }
            Err(OrderError::NotFound(_)) => {
                tracing::warn!("Success callback for unknown order");
                CallbackOutcome::Ignored
            }
            Err(OrderError::NotPayable { status, .. }) => {
                tracing::warn!(status = %status, "Success callback for order that cannot be paid");
                CallbackOutcome::Ignored
            }
            Err(OrderError::DuplicatePayment(id)) => {
                tracing::warn!(gateway_payment_id = %id, "Payment id already used by another order");
                CallbackOutcome::Ignored
            }
            Err(OrderError::FinalizationConflict(_)) => {
                CallbackOutcome::ReturnToCheckout(Notice::FinalizationFailed)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to apply success callback");
                CallbackOutcome::ReturnToCheckout(Notice::FinalizationFailed)
            }
        }
    }
}

/// Log when the gateway reports a different amount than the order total.
/// The order total is what gets recorded either way.
fn check_echoed_amount(outcome: &FinalizeOutcome, echoed: Option<&str>) {
    let Some(echoed) = echoed else {
        return;
    };
    let expected = outcome.order().order_total;
    match Decimal::from_str(echoed.trim()) {
        Ok(amount) if amount == expected.amount() => {}
        Ok(amount) => tracing::warn!(
            echoed = %amount,
            expected = %expected,
            "Gateway amount differs from order total"
        ),
        Err(_) => tracing::warn!(echoed = %echoed, "Gateway amount is not a number"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use techbazaar_core::{
        AccountId, CartOwner, ContactForm, Money, OrderStatus, ShippingPolicy,
    };

    use super::*;
    use crate::db::{MemoryStore, Store};
    use crate::models::{NewProduct, Order, Product};
    use crate::services::cart::{CartService, QuantityUpdate};
    use crate::services::catalog::Catalog;
    use crate::services::notifier::LogNotifier;

    #[test]
    fn test_payload_from_body() {
        let payload = CallbackPayload::from_body(b"tran_id=2026101601&val_id=VAL%2D1&status=VALID");
        assert_eq!(payload.tran_id.as_deref(), Some("2026101601"));
        assert_eq!(payload.val_id.as_deref(), Some("VAL-1"));
        assert_eq!(payload.amount, None);

        let payload = CallbackPayload::from_body(br#"{"tran_id":"2026101601"}"#);
        assert_eq!(payload.tran_id, None);
        assert_eq!(payload.val_id, None);
    }

    struct Fixture {
        store: MemoryStore,
        catalog: Catalog,
        shipping: ShippingPolicy,
        notifier: LogNotifier,
        keyboard: Product,
    }

    impl Fixture {
        async fn new() -> Self {
            let store = MemoryStore::new();
            let mut tx = store.begin().await.unwrap();
            let keyboard = tx
                .insert_product(NewProduct {
                    name: "Keyboard".to_string(),
                    slug: "keyboard".to_string(),
                    price: Money::from_units(1200),
                    stock: 4,
                    is_available: true,
                    variations: Vec::new(),
                })
                .await
                .unwrap();
            tx.commit().await.unwrap();
            Self {
                catalog: Catalog::new(Arc::new(store.clone())),
                store,
                shipping: ShippingPolicy::default(),
                notifier: LogNotifier,
                keyboard,
            }
        }

        fn orders(&self) -> OrderService<'_> {
            OrderService::new(&self.store, &self.catalog, &self.shipping, &self.notifier)
        }

        async fn placed_order(&self) -> Order {
            let owner = CartOwner::Account(AccountId::new(9));
            CartService::new(&self.store, &self.catalog, &self.shipping)
                .add_item(&owner, self.keyboard.id, &[], QuantityUpdate::Set(2))
                .await
                .unwrap();
            let contact = ContactForm {
                first_name: "Rafi".to_string(),
                last_name: "Ahmed".to_string(),
                phone: "01800000000".to_string(),
                email: "rafi@example.com".to_string(),
                address_line_1: "7 Station Road".to_string(),
                city: "Sylhet".to_string(),
                state: "Sylhet".to_string(),
                country: "Bangladesh".to_string(),
                ..ContactForm::default()
            }
            .validate()
            .unwrap();
            self.orders().create_order(&owner, contact, None).await.unwrap()
        }
    }

    fn success(order: &Order, val_id: &str) -> CallbackPayload {
        CallbackPayload {
            tran_id: Some(order.order_number.to_string()),
            val_id: Some(val_id.to_string()),
            amount: Some(order.order_total.to_wire()),
        }
    }

    #[test]
    fn test_locations() {
        let completed = CallbackOutcome::Completed {
            order_number: OrderNumber::parse("2026101612").unwrap(),
            gateway_payment_id: "VAL 1&2".to_string(),
        };
        assert_eq!(
            completed.location(),
            "/orders/complete?order_number=2026101612&payment_id=VAL+1%262"
        );
        assert_eq!(
            CallbackOutcome::ReturnToCheckout(Notice::PaymentCancelled).location(),
            "/checkout?notice=payment_cancelled"
        );
        assert_eq!(CallbackOutcome::Ignored.location(), "/");
        assert_eq!("payment_failed".parse::<Notice>().unwrap(), Notice::PaymentFailed);
    }

    #[tokio::test]
    async fn test_success_twice_pays_once() {
        let fx = Fixture::new().await;
        let order = fx.placed_order().await;
        let orders = fx.orders();
        let reconciler = Reconciler::new(&orders, "SSLCOMMERZ");

        let first = reconciler
            .on_callback(CallbackKind::Success, success(&order, "VAL-77"))
            .await;
        let second = reconciler
            .on_callback(CallbackKind::Success, success(&order, "VAL-77"))
            .await;

        assert_eq!(first, second);
        assert!(matches!(first, CallbackOutcome::Completed { .. }));
        assert_eq!(fx.store.payments().await.len(), 1);
        assert_eq!(fx.store.product(fx.keyboard.id).await.unwrap().unwrap().stock, 2);
    }

    #[tokio::test]
    async fn test_fail_and_cancel_change_nothing() {
        let fx = Fixture::new().await;
        let order = fx.placed_order().await;
        let orders = fx.orders();
        let reconciler = Reconciler::new(&orders, "SSLCOMMERZ");

        let fail = reconciler
            .on_callback(CallbackKind::Fail, success(&order, "VAL-1"))
            .await;
        let cancel = reconciler
            .on_callback(CallbackKind::Cancel, success(&order, "VAL-1"))
            .await;
        assert_eq!(fail, CallbackOutcome::ReturnToCheckout(Notice::PaymentFailed));
        assert_eq!(cancel, CallbackOutcome::ReturnToCheckout(Notice::PaymentCancelled));

        let stored = fx.store.order_by_number(&order.order_number).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Unordered);
        assert!(fx.store.payments().await.is_empty());
    }

    #[tokio::test]
    async fn test_untrusted_payloads_are_ignored() {
        let fx = Fixture::new().await;
        let orders = fx.orders();
        let reconciler = Reconciler::new(&orders, "SSLCOMMERZ");

        for payload in [
            CallbackPayload::default(),
            CallbackPayload {
                tran_id: Some("not-an-order".to_string()),
                val_id: Some("VAL-1".to_string()),
                amount: None,
            },
            CallbackPayload {
                tran_id: Some("2026101699".to_string()),
                val_id: Some("VAL-1".to_string()),
                amount: None,
            },
        ] {
            assert_eq!(
                reconciler.on_callback(CallbackKind::Success, payload).await,
                CallbackOutcome::Ignored
            );
        }
        assert!(fx.store.payments().await.is_empty());
    }

    #[tokio::test]
    async fn test_echoed_amount_is_not_recorded() {
        let fx = Fixture::new().await;
        let order = fx.placed_order().await;
        let orders = fx.orders();
        let reconciler = Reconciler::new(&orders, "SSLCOMMERZ");

        let mut payload = success(&order, "VAL-5");
        payload.amount = Some("1.00".to_string());
        reconciler.on_callback(CallbackKind::Success, payload).await;

        let payments = fx.store.payments().await;
        assert_eq!(payments[0].amount_paid, order.order_total);
        assert_eq!(payments[0].method, "SSLCOMMERZ");
    }

    #[tokio::test]
    async fn test_conflict_returns_to_checkout() {
        let fx = Fixture::new().await;
        let order = fx.placed_order().await;
        fx.store.set_stock(fx.keyboard.id, 1).await.unwrap();
        let orders = fx.orders();
        let reconciler = Reconciler::new(&orders, "SSLCOMMERZ");

        let outcome = reconciler
            .on_callback(CallbackKind::Success, success(&order, "VAL-3"))
            .await;
        assert_eq!(
            outcome,
            CallbackOutcome::ReturnToCheckout(Notice::FinalizationFailed)
        );
        assert!(fx.store.payments().await.is_empty());
    }
}
