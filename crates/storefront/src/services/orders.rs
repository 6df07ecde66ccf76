//! Order lifecycle.
//!
//! ```text
//! cart ──create_order──► Unordered ──mark_awaiting_payment──► Ordered
//!                            │                                   │
//!                            └─────────────finalize──────────────┴──► Paid
//! ```
//!
//! `abandon` moves an unpaid order to `Abandoned`. Finalization is the only
//! step that touches stock: it records the payment, decrements stock for
//! every cart line, snapshots the lines and clears the cart in a single
//! transaction, so either all of it happens or none of it does.

use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use techbazaar_core::{
    AccountId, CartOwner, ContactInfo, Money, OrderNumber, OrderStatus, ProductId,
    ShippingPolicy, compute_totals,
};

use super::cart::{CartError, CartService, CartView};
use super::catalog::{Catalog, VariationLabel};
use super::notifier::Notifier;
use super::stock::{self, StockError};
use crate::db::{RepositoryError, Store, StoreTx};
use crate::models::{NewOrder, NewOrderProduct, NewPayment, Order, OrderProduct, Payment};

/// Why a paid order could not be finalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ConflictReason {
    /// Stock dropped below a line's quantity after the order was placed.
    OutOfStock { product: String, remaining: u32 },
    /// The cart no longer adds up to the amount the order was placed for.
    CartChanged { expected: Money, found: Money },
    /// A product in the cart was taken off sale.
    Unavailable { product: String },
    /// A product in the cart was deleted.
    ProductMissing(ProductId),
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfStock { product, remaining } => {
                write!(f, "only {remaining} of {product} left in stock")
            }
            Self::CartChanged { expected, found } => {
                write!(f, "cart now totals {found}, order was placed for {expected}")
            }
            Self::Unavailable { product } => write!(f, "{product} is no longer for sale"),
            Self::ProductMissing(id) => write!(f, "product {id} no longer exists"),
        }
    }
}

/// Errors from order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Checkout was attempted with nothing in the cart.
    #[error("cart is empty")]
    EmptyCart,

    /// Checkout needs a signed-in account.
    #[error("sign in to check out")]
    LoginRequired,

    /// A cart line asks for more than is in stock.
    #[error("only {remaining} of {product} left in stock")]
    OutOfStock { product: String, remaining: u32 },

    /// No such order for this caller.
    #[error("order {0} not found")]
    NotFound(OrderNumber),

    /// The order has already left the payable states.
    #[error("order {number} is {status} and cannot be paid")]
    NotPayable {
        number: OrderNumber,
        status: OrderStatus,
    },

    /// The gateway payment id was already recorded against another order.
    #[error("payment {0} has already been recorded")]
    DuplicatePayment(String),

    /// Finalization was rolled back.
    #[error("order could not be finalized: {0}")]
    FinalizationConflict(ConflictReason),

    /// Reading the cart failed.
    #[error(transparent)]
    Cart(#[from] CartError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<StockError> for OrderError {
    fn from(err: StockError) -> Self {
        match err {
            StockError::InsufficientStock { product, remaining } => {
                Self::OutOfStock { product, remaining }
            }
            StockError::ProductNotFound(id) => {
                Self::FinalizationConflict(ConflictReason::ProductMissing(id))
            }
            StockError::Repository(e) => Self::Repository(e),
        }
    }
}

/// What the gateway told us about a completed payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReceipt {
    /// The gateway's id for the payment (`val_id`).
    pub gateway_payment_id: String,
    /// Gateway name recorded on the payment.
    pub method: String,
}

/// Result of [`OrderService::finalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// The order was paid by this call.
    Finalized {
        order: Order,
        payment: Payment,
        products: Vec<OrderProduct>,
    },
    /// The order had already been paid; nothing changed.
    AlreadyPaid { order: Order },
}

impl FinalizeOutcome {
    #[must_use]
    pub const fn order(&self) -> &Order {
        match self {
            Self::Finalized { order, .. } | Self::AlreadyPaid { order } => order,
        }
    }
}

/// One line of a placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderLineView {
    pub product_id: ProductId,
    pub product_name: String,
    pub variations: Vec<VariationLabel>,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
}

/// An order with its line snapshots and payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderDetail {
    pub order: Order,
    pub lines: Vec<OrderLineView>,
    pub payment: Option<Payment>,
    /// Σ line totals of the snapshots.
    pub subtotal: Money,
}

/// Order operations for one request.
pub struct OrderService<'a> {
    store: &'a dyn Store,
    catalog: &'a Catalog,
    shipping: &'a ShippingPolicy,
    notifier: &'a dyn Notifier,
}

impl<'a> OrderService<'a> {
    /// Create an order service.
    #[must_use]
    pub const fn new(
        store: &'a dyn Store,
        catalog: &'a Catalog,
        shipping: &'a ShippingPolicy,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self {
            store,
            catalog,
            shipping,
            notifier,
        }
    }

    /// The cart and its totals as they would be ordered.
    ///
    /// # Errors
    ///
    /// - `OrderError::LoginRequired` for guest owners
    /// - `OrderError::EmptyCart` if there is nothing to order
    pub async fn checkout_preview(&self, owner: &CartOwner) -> Result<CartView, OrderError> {
        if owner.account().is_none() {
            return Err(OrderError::LoginRequired);
        }
        let view = CartService::new(self.store, self.catalog, self.shipping)
            .view(owner)
            .await?;
        if view.lines.is_empty() {
            return Err(OrderError::EmptyCart);
        }
        Ok(view)
    }

    /// Turn the owner's cart into an `Unordered` order.
    ///
    /// Totals are computed from live prices and copied onto the order along
    /// with `contact`. The cart itself is left alone until the order is
    /// paid.
    ///
    /// # Errors
    ///
    /// - `OrderError::LoginRequired` for guest owners
    /// - `OrderError::EmptyCart` if there is nothing to order
    /// - `OrderError::OutOfStock` naming the first line that cannot be supplied
    #[instrument(skip(self, contact, ip), fields(owner = %owner))]
    pub async fn create_order(
        &self,
        owner: &CartOwner,
        contact: ContactInfo,
        ip: Option<String>,
    ) -> Result<Order, OrderError> {
        let account_id = owner.account().ok_or(OrderError::LoginRequired)?;

        let mut tx = self.store.begin().await?;
        let lines = tx.cart_lines(owner).await?;
        if lines.is_empty() {
            return Err(OrderError::EmptyCart);
        }
        for line in &lines {
            stock::check_availability(line)?;
        }

        let totals = compute_totals(lines.iter().map(|line| line.priced()), self.shipping);
        let order = tx
            .insert_order(NewOrder {
                account_id,
                contact,
                subtotal: totals.subtotal,
                shipping_charge: totals.shipping_charge,
                order_total: totals.grand_total,
                ip,
                created_at: chrono::Utc::now(),
            })
            .await?;
        tx.commit().await?;

        tracing::info!(
            order_number = %order.order_number,
            total = %order.order_total,
            lines = lines.len(),
            "Order placed"
        );
        Ok(order)
    }

    /// An order of `account` that can still be sent to the gateway.
    ///
    /// # Errors
    ///
    /// - `OrderError::NotFound` if the order does not exist or is someone else's
    /// - `OrderError::NotPayable` if it is paid or abandoned
    pub async fn payable_order(
        &self,
        account: AccountId,
        number: &OrderNumber,
    ) -> Result<Order, OrderError> {
        let order = self.owned_order(account, number).await?;
        if !order.status.is_payable() {
            return Err(OrderError::NotPayable {
                number: order.order_number,
                status: order.status,
            });
        }
        Ok(order)
    }

    /// Record that a gateway session was opened for the order.
    ///
    /// An order already `Ordered` is returned unchanged.
    ///
    /// # Errors
    ///
    /// - `OrderError::NotFound` if the order does not exist
    /// - `OrderError::NotPayable` if it is paid or abandoned
    #[instrument(skip(self), fields(order_number = %number))]
    pub async fn mark_awaiting_payment(&self, number: &OrderNumber) -> Result<Order, OrderError> {
        let mut tx = self.store.begin().await?;
        let order = tx
            .lock_order(number)
            .await?
            .ok_or_else(|| OrderError::NotFound(number.clone()))?;
        if order.status == OrderStatus::Ordered {
            return Ok(order);
        }

        let updated = transition(
            tx.as_mut(),
            &order,
            &[OrderStatus::Unordered],
            OrderStatus::Ordered,
        )
        .await?;
        tx.commit().await?;
        Ok(updated)
    }

    /// Pay the order: record the payment, take stock for every cart line,
    /// snapshot the lines and clear the cart.
    ///
    /// Calling this again for an order that is already paid changes nothing
    /// and returns [`FinalizeOutcome::AlreadyPaid`].
    ///
    /// # Errors
    ///
    /// - `OrderError::NotFound` if no order has this number
    /// - `OrderError::NotPayable` if the order was abandoned
    /// - `OrderError::DuplicatePayment` if the gateway payment id is already recorded
    /// - `OrderError::FinalizationConflict` if stock or the cart moved since the
    ///   order was placed; nothing is written in that case
    #[instrument(
        skip(self, receipt),
        fields(order_number = %number, gateway_payment_id = %receipt.gateway_payment_id)
    )]
    pub async fn finalize(
        &self,
        number: &OrderNumber,
        receipt: PaymentReceipt,
    ) -> Result<FinalizeOutcome, OrderError> {
        let mut tx = self.store.begin().await?;
        let order = tx
            .lock_order(number)
            .await?
            .ok_or_else(|| OrderError::NotFound(number.clone()))?;

        if order.status == OrderStatus::Paid {
            tracing::info!("Order already paid, ignoring repeat finalization");
            return Ok(FinalizeOutcome::AlreadyPaid { order });
        }
        if !order.status.is_payable() {
            return Err(OrderError::NotPayable {
                number: order.order_number,
                status: order.status,
            });
        }

        let payment = tx
            .insert_payment(NewPayment {
                gateway_payment_id: receipt.gateway_payment_id.clone(),
                order_id: order.id,
                account_id: order.account_id,
                method: receipt.method,
                amount_paid: order.order_total,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => {
                    OrderError::DuplicatePayment(receipt.gateway_payment_id.clone())
                }
                other => OrderError::Repository(other),
            })?;

        let paid = tx
            .transition_order(order.id, &OrderStatus::PAYABLE, OrderStatus::Paid, Some(payment.id))
            .await?
            .ok_or_else(|| OrderError::NotPayable {
                number: order.order_number.clone(),
                status: order.status,
            })?;

        let owner = CartOwner::Account(order.account_id);
        let lines = tx.cart_lines(&owner).await?;
        let found: Money = lines.iter().map(crate::models::CartLine::line_total).sum();
        if lines.is_empty() || found != order.subtotal {
            return Err(conflict(
                &order,
                ConflictReason::CartChanged {
                    expected: order.subtotal,
                    found,
                },
            ));
        }

        let mut products = Vec::with_capacity(lines.len());
        for line in lines {
            if !line.is_available {
                return Err(conflict(
                    &order,
                    ConflictReason::Unavailable {
                        product: line.product_name,
                    },
                ));
            }
            match stock::reserve_and_decrement(
                tx.as_mut(),
                line.item.product_id,
                &line.product_name,
                line.item.quantity,
            )
            .await
            {
                Ok(_) => {}
                Err(StockError::InsufficientStock { product, remaining }) => {
                    return Err(conflict(
                        &order,
                        ConflictReason::OutOfStock { product, remaining },
                    ));
                }
                Err(StockError::ProductNotFound(id)) => {
                    return Err(conflict(&order, ConflictReason::ProductMissing(id)));
                }
                Err(StockError::Repository(e)) => return Err(e.into()),
            }

            products.push(
                tx.insert_order_product(NewOrderProduct {
                    order_id: order.id,
                    payment_id: payment.id,
                    account_id: order.account_id,
                    product_id: line.item.product_id,
                    product_name: line.product_name,
                    variations: line.item.variations,
                    quantity: line.item.quantity,
                    unit_price: line.unit_price,
                })
                .await?,
            );
        }

        let cleared = tx.clear_cart(&owner).await?;
        tx.commit().await?;

        tracing::info!(
            payment_id = %payment.id,
            lines = products.len(),
            cleared,
            "Order paid"
        );

        if let Err(e) = self.notifier.send_receipt(&paid, &products).await {
            tracing::warn!(error = %e, "Failed to send order receipt");
        }

        Ok(FinalizeOutcome::Finalized {
            order: paid,
            payment,
            products,
        })
    }

    /// Give up on an unpaid order.
    ///
    /// # Errors
    ///
    /// - `OrderError::NotFound` if no order has this number
    /// - `OrderError::NotPayable` if it is already paid or abandoned
    #[instrument(skip(self), fields(order_number = %number))]
    pub async fn abandon(&self, number: &OrderNumber) -> Result<Order, OrderError> {
        let mut tx = self.store.begin().await?;
        let order = tx
            .lock_order(number)
            .await?
            .ok_or_else(|| OrderError::NotFound(number.clone()))?;
        let abandoned =
            transition(tx.as_mut(), &order, &OrderStatus::PAYABLE, OrderStatus::Abandoned).await?;
        tx.commit().await?;

        tracing::info!(previous = %order.status, "Order abandoned");
        Ok(abandoned)
    }

    /// Paid orders of `account`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the store fails.
    pub async fn history(&self, account: AccountId) -> Result<Vec<Order>, OrderError> {
        Ok(self
            .store
            .orders_for_account(account, OrderStatus::Paid)
            .await?)
    }

    /// An order of `account` with its line snapshots and payment.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if the order does not exist or belongs
    /// to another account.
    #[instrument(skip(self), fields(account_id = %account, order_number = %number))]
    pub async fn detail(
        &self,
        account: AccountId,
        number: &OrderNumber,
    ) -> Result<OrderDetail, OrderError> {
        let order = self.owned_order(account, number).await?;
        let products = self.store.order_products(order.id).await?;
        let payment = match order.payment_id {
            Some(id) => self.store.payment(id).await?,
            None => None,
        };

        let mut lines = Vec::with_capacity(products.len());
        for product in products {
            lines.push(OrderLineView {
                product_id: product.product_id,
                variations: self
                    .catalog
                    .describe(product.product_id, &product.variations)
                    .await?,
                line_total: product.line_total(),
                product_name: product.product_name,
                quantity: product.quantity,
                unit_price: product.unit_price,
            });
        }
        let subtotal = lines.iter().map(|line| line.line_total).sum();

        Ok(OrderDetail {
            order,
            lines,
            payment,
            subtotal,
        })
    }

    /// The completed-order page: a paid order of `account` whose payment
    /// carries `gateway_payment_id`.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` unless the order is paid, belongs to
    /// `account` and was paid with that gateway payment id.
    pub async fn receipt(
        &self,
        account: AccountId,
        number: &OrderNumber,
        gateway_payment_id: &str,
    ) -> Result<OrderDetail, OrderError> {
        let detail = self.detail(account, number).await?;
        let matches = detail.order.status == OrderStatus::Paid
            && detail
                .payment
                .as_ref()
                .is_some_and(|p| p.gateway_payment_id == gateway_payment_id);
        if !matches {
            return Err(OrderError::NotFound(number.clone()));
        }
        Ok(detail)
    }

    async fn owned_order(
        &self,
        account: AccountId,
        number: &OrderNumber,
    ) -> Result<Order, OrderError> {
        self.store
            .order_by_number(number)
            .await?
            .filter(|order| order.account_id == account)
            .ok_or_else(|| OrderError::NotFound(number.clone()))
    }
}

async fn transition(
    tx: &mut dyn StoreTx,
    order: &Order,
    from: &[OrderStatus],
    to: OrderStatus,
) -> Result<Order, OrderError> {
    tx.transition_order(order.id, from, to, None)
        .await?
        .ok_or_else(|| OrderError::NotPayable {
            number: order.order_number.clone(),
            status: order.status,
        })
}

fn conflict(order: &Order, reason: ConflictReason) -> OrderError {
    tracing::warn!(
        order_number = %order.order_number,
        reason = %reason,
        "Finalization rolled back"
    );
    OrderError::FinalizationConflict(reason)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use techbazaar_core::{ContactForm, GuestToken};

    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{NewProduct, NewVariation, Product};
    use crate::services::cart::QuantityUpdate;
    use crate::services::notifier::NotifyError;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<OrderNumber>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_receipt(
            &self,
            order: &Order,
            _products: &[OrderProduct],
        ) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(order.order_number.clone());
            Ok(())
        }
    }

    struct Fixture {
        store: MemoryStore,
        catalog: Catalog,
        shipping: ShippingPolicy,
        notifier: RecordingNotifier,
        adapter: Product,
        monitor: Product,
    }

    impl Fixture {
        async fn new() -> Self {
            let store = MemoryStore::new();
            let mut tx = store.begin().await.unwrap();
            let adapter = tx
                .insert_product(NewProduct {
                    name: "USB-C Adapter".to_string(),
                    slug: "usb-c-adapter".to_string(),
                    price: Money::from_units(100),
                    stock: 5,
                    is_available: true,
                    variations: Vec::new(),
                })
                .await
                .unwrap();
            let monitor = tx
                .insert_product(NewProduct {
                    name: "Monitor".to_string(),
                    slug: "monitor".to_string(),
                    price: Money::from_units(5000),
                    stock: 3,
                    is_available: true,
                    variations: vec![NewVariation {
                        category: "color".to_string(),
                        value: "red".to_string(),
                    }],
                })
                .await
                .unwrap();
            tx.commit().await.unwrap();

            Self {
                catalog: Catalog::new(Arc::new(store.clone())),
                store,
                shipping: ShippingPolicy::default(),
                notifier: RecordingNotifier::default(),
                adapter,
                monitor,
            }
        }

        fn orders(&self) -> OrderService<'_> {
            OrderService::new(&self.store, &self.catalog, &self.shipping, &self.notifier)
        }

        fn cart(&self) -> CartService<'_> {
            CartService::new(&self.store, &self.catalog, &self.shipping)
        }

        async fn fill_cart(&self, owner: &CartOwner) {
            self.cart()
                .add_item(owner, self.adapter.id, &[], QuantityUpdate::Set(2))
                .await
                .unwrap();
            self.cart()
                .add_item(
                    owner,
                    self.monitor.id,
                    &[("color".to_string(), "red".to_string())],
                    QuantityUpdate::Set(1),
                )
                .await
                .unwrap();
        }
    }

    fn contact() -> ContactInfo {
        ContactForm {
            first_name: "Nadia".to_string(),
            last_name: "Rahman".to_string(),
            phone: "+880 1711 000000".to_string(),
            email: "nadia@example.com".to_string(),
            address_line_1: "12 Lake Road".to_string(),
            city: "Dhaka".to_string(),
            state: "Dhaka".to_string(),
            country: "Bangladesh".to_string(),
            ..ContactForm::default()
        }
        .validate()
        .unwrap()
    }

    fn receipt(id: &str) -> PaymentReceipt {
        PaymentReceipt {
            gateway_payment_id: id.to_string(),
            method: "SSLCOMMERZ".to_string(),
        }
    }

    fn member() -> CartOwner {
        CartOwner::Account(AccountId::new(42))
    }

    #[tokio::test]
    async fn test_place_and_finalize_order() {
        let fx = Fixture::new().await;
        let owner = member();
        fx.fill_cart(&owner).await;

        let order = fx.orders().create_order(&owner, contact(), None).await.unwrap();
        assert_eq!(order.status, OrderStatus::Unordered);
        assert_eq!(order.subtotal, Money::from_units(5200));
        assert_eq!(order.shipping_charge, Money::ZERO);
        assert_eq!(order.order_total, Money::from_units(5200));

        let outcome = fx
            .orders()
            .finalize(&order.order_number, receipt("VAL-1"))
            .await
            .unwrap();
        let FinalizeOutcome::Finalized {
            order: paid,
            payment,
            products,
        } = outcome
        else {
            panic!("expected finalization");
        };
        assert_eq!(paid.status, OrderStatus::Paid);
        assert_eq!(paid.payment_id, Some(payment.id));
        assert_eq!(payment.amount_paid, Money::from_units(5200));
        let snapshot_total: Money = products.iter().map(OrderProduct::line_total).sum();
        assert_eq!(snapshot_total + paid.shipping_charge, paid.order_total);

        assert_eq!(fx.store.product(fx.adapter.id).await.unwrap().unwrap().stock, 3);
        assert_eq!(fx.store.product(fx.monitor.id).await.unwrap().unwrap().stock, 2);
        assert!(fx.store.cart_items(&owner).await.is_empty());
        assert_eq!(*fx.notifier.sent.lock().unwrap(), vec![order.order_number]);
    }

    #[tokio::test]
    async fn test_repeat_finalize_is_a_no_op() {
        let fx = Fixture::new().await;
        let owner = member();
        fx.fill_cart(&owner).await;
        let order = fx.orders().create_order(&owner, contact(), None).await.unwrap();

        fx.orders()
            .finalize(&order.order_number, receipt("VAL-1"))
            .await
            .unwrap();
        let again = fx
            .orders()
            .finalize(&order.order_number, receipt("VAL-1"))
            .await
            .unwrap();

        assert!(matches!(again, FinalizeOutcome::AlreadyPaid { .. }));
        assert_eq!(fx.store.payments().await.len(), 1);
        assert_eq!(fx.store.product(fx.adapter.id).await.unwrap().unwrap().stock, 3);
        assert_eq!(fx.notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stock_drop_rolls_back_finalization() {
        let fx = Fixture::new().await;
        let owner = member();
        fx.fill_cart(&owner).await;
        let order = fx.orders().create_order(&owner, contact(), None).await.unwrap();

        fx.store.set_stock(fx.adapter.id, 1).await.unwrap();
        let err = fx
            .orders()
            .finalize(&order.order_number, receipt("VAL-1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::FinalizationConflict(ConflictReason::OutOfStock { remaining: 1, .. })
        ));

        let unchanged = fx.store.order_by_number(&order.order_number).await.unwrap().unwrap();
        assert_eq!(unchanged.status, OrderStatus::Unordered);
        assert!(fx.store.order_products(order.id).await.unwrap().is_empty());
        assert!(fx.store.payments().await.is_empty());
        assert_eq!(fx.store.cart_items(&owner).await.len(), 2);
        assert_eq!(fx.store.product(fx.monitor.id).await.unwrap().unwrap().stock, 3);
    }

    #[tokio::test]
    async fn test_product_taken_off_sale_blocks_finalization() {
        let fx = Fixture::new().await;
        let owner = member();
        fx.fill_cart(&owner).await;
        let order = fx.orders().create_order(&owner, contact(), None).await.unwrap();

        fx.store.set_available(fx.monitor.id, false).await.unwrap();
        let err = fx
            .orders()
            .finalize(&order.order_number, receipt("VAL-1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::FinalizationConflict(ConflictReason::Unavailable { ref product })
                if product == &fx.monitor.name
        ));

        let unchanged = fx.store.order_by_number(&order.order_number).await.unwrap().unwrap();
        assert_eq!(unchanged.status, OrderStatus::Unordered);
        assert!(fx.store.payments().await.is_empty());
        assert_eq!(fx.store.product(fx.adapter.id).await.unwrap().unwrap().stock, 5);
        assert_eq!(fx.store.product(fx.monitor.id).await.unwrap().unwrap().stock, 3);
        assert_eq!(fx.store.cart_items(&owner).await.len(), 2);
    }

    #[tokio::test]
    async fn test_cart_edited_after_placing_is_a_conflict() {
        let fx = Fixture::new().await;
        let owner = member();
        fx.fill_cart(&owner).await;
        let order = fx.orders().create_order(&owner, contact(), None).await.unwrap();

        fx.cart()
            .add_item(&owner, fx.adapter.id, &[], QuantityUpdate::Set(3))
            .await
            .unwrap();
        let err = fx
            .orders()
            .finalize(&order.order_number, receipt("VAL-1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::FinalizationConflict(ConflictReason::CartChanged { .. })
        ));
    }

    #[tokio::test]
    async fn test_payment_id_reused_for_another_order() {
        let fx = Fixture::new().await;
        let first_owner = member();
        let second_owner = CartOwner::Account(AccountId::new(43));
        fx.fill_cart(&first_owner).await;
        fx.fill_cart(&second_owner).await;
        let first = fx.orders().create_order(&first_owner, contact(), None).await.unwrap();
        let second = fx.orders().create_order(&second_owner, contact(), None).await.unwrap();

        fx.orders()
            .finalize(&first.order_number, receipt("VAL-1"))
            .await
            .unwrap();
        let err = fx
            .orders()
            .finalize(&second.order_number, receipt("VAL-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::DuplicatePayment(ref id) if id == "VAL-1"));
        assert_eq!(fx.store.cart_items(&second_owner).await.len(), 2);
    }

    #[tokio::test]
    async fn test_create_order_preconditions() {
        let fx = Fixture::new().await;
        let guest = CartOwner::Guest(GuestToken::from_string("g".to_string()));
        assert!(matches!(
            fx.orders().create_order(&guest, contact(), None).await,
            Err(OrderError::LoginRequired)
        ));
        assert!(matches!(
            fx.orders().create_order(&member(), contact(), None).await,
            Err(OrderError::EmptyCart)
        ));

        fx.cart()
            .add_item(&member(), fx.adapter.id, &[], QuantityUpdate::Set(6))
            .await
            .unwrap();
        let err = fx
            .orders()
            .create_order(&member(), contact(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::OutOfStock { remaining: 5, .. }));
        assert!(fx.store.orders_for_account(AccountId::new(42), OrderStatus::Unordered).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_awaiting_payment_then_abandon() {
        let fx = Fixture::new().await;
        let owner = member();
        fx.fill_cart(&owner).await;
        let order = fx.orders().create_order(&owner, contact(), None).await.unwrap();

        let ordered = fx.orders().mark_awaiting_payment(&order.order_number).await.unwrap();
        assert_eq!(ordered.status, OrderStatus::Ordered);
        let again = fx.orders().mark_awaiting_payment(&order.order_number).await.unwrap();
        assert_eq!(again.status, OrderStatus::Ordered);

        let abandoned = fx.orders().abandon(&order.order_number).await.unwrap();
        assert_eq!(abandoned.status, OrderStatus::Abandoned);
        assert!(matches!(
            fx.orders().finalize(&order.order_number, receipt("VAL-9")).await,
            Err(OrderError::NotPayable { status: OrderStatus::Abandoned, .. })
        ));
    }

    #[tokio::test]
    async fn test_detail_is_scoped_to_account() {
        let fx = Fixture::new().await;
        let owner = member();
        fx.fill_cart(&owner).await;
        let order = fx.orders().create_order(&owner, contact(), None).await.unwrap();
        fx.orders()
            .finalize(&order.order_number, receipt("VAL-1"))
            .await
            .unwrap();

        let detail = fx
            .orders()
            .detail(AccountId::new(42), &order.order_number)
            .await
            .unwrap();
        assert_eq!(detail.lines.len(), 2);
        assert_eq!(detail.subtotal, Money::from_units(5200));
        assert_eq!(
            detail.payment.map(|p| p.gateway_payment_id),
            Some("VAL-1".to_string())
        );

        assert!(matches!(
            fx.orders().detail(AccountId::new(7), &order.order_number).await,
            Err(OrderError::NotFound(_))
        ));
        assert!(
            fx.orders()
                .receipt(AccountId::new(42), &order.order_number, "VAL-2")
                .await
                .is_err()
        );
        assert_eq!(fx.orders().history(AccountId::new(42)).await.unwrap().len(), 1);
    }
}
