//! Order, order line snapshot and payment records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use techbazaar_core::{
    AccountId, ContactInfo, Money, OrderId, OrderNumber, OrderProductId, OrderStatus, PaymentId,
    PaymentStatus, ProductId, VariationSet,
};

/// A customer order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub account_id: AccountId,
    /// Shipping and contact details copied from the checkout form.
    pub contact: ContactInfo,
    /// Σ line totals when the order was placed.
    pub subtotal: Money,
    pub shipping_charge: Money,
    /// `subtotal + shipping_charge`; the amount charged at the gateway.
    pub order_total: Money,
    pub status: OrderStatus,
    /// Set once, when the order is paid.
    pub payment_id: Option<PaymentId>,
    pub ip: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An order to insert. The store assigns the id and order number.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub account_id: AccountId,
    pub contact: ContactInfo,
    pub subtotal: Money,
    pub shipping_charge: Money,
    pub order_total: Money,
    pub ip: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Immutable snapshot of a cart line taken when its order was paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderProduct {
    pub id: OrderProductId,
    pub order_id: OrderId,
    pub payment_id: PaymentId,
    pub account_id: AccountId,
    pub product_id: ProductId,
    pub product_name: String,
    pub variations: VariationSet,
    pub quantity: u32,
    pub unit_price: Money,
    pub created_at: DateTime<Utc>,
}

impl OrderProduct {
    /// `unit_price × quantity`.
    #[must_use]
    pub fn line_total(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

/// An order line snapshot to insert.
#[derive(Debug, Clone)]
pub struct NewOrderProduct {
    pub order_id: OrderId,
    pub payment_id: PaymentId,
    pub account_id: AccountId,
    pub product_id: ProductId,
    pub product_name: String,
    pub variations: VariationSet,
    pub quantity: u32,
    pub unit_price: Money,
}

/// A completed payment, keyed by the gateway's payment id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    /// The gateway's id for this payment (`val_id`). Unique.
    pub gateway_payment_id: String,
    pub order_id: OrderId,
    pub account_id: AccountId,
    /// Gateway name, e.g. `SSLCOMMERZ`.
    pub method: String,
    pub amount_paid: Money,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

/// A payment to insert.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub gateway_payment_id: String,
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub method: String,
    pub amount_paid: Money,
}
