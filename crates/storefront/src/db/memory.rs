//! In-process [`Store`] for tests and local runs.
//!
//! All data sits behind one tokio mutex. A transaction holds the lock for
//! its whole lifetime and works on a staged copy of the data, which replaces
//! the live copy on commit; dropping the transaction discards the copy.
//! Transactions therefore run one at a time.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use techbazaar_core::{
    AccountId, CartItemId, CartOwner, OrderId, OrderNumber, OrderProductId, OrderStatus,
    PaymentId, PaymentStatus, ProductId, Variation, VariationId, WishlistItemId,
};

use super::{RepositoryError, StockChange, Store, StoreTx};
use crate::models::{
    CartItem, CartLine, NewCartItem, NewOrder, NewOrderProduct, NewPayment, NewProduct,
    NewWishlistItem, Order, OrderProduct, Payment, Product, WishlistItem,
};

#[derive(Debug, Clone, Default)]
struct State {
    last_id: i64,
    products: BTreeMap<ProductId, Product>,
    variations: Vec<Variation>,
    cart_items: BTreeMap<CartItemId, CartItem>,
    wishlist_items: BTreeMap<WishlistItemId, WishlistItem>,
    orders: BTreeMap<OrderId, Order>,
    order_products: Vec<OrderProduct>,
    payments: BTreeMap<PaymentId, Payment>,
}

impl State {
    const fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn cart_lines(&self, owner: &CartOwner) -> Vec<CartLine> {
        self.cart_items
            .values()
            .filter(|item| &item.owner == owner && item.is_active)
            .filter_map(|item| {
                self.products.get(&item.product_id).map(|product| CartLine {
                    item: item.clone(),
                    product_name: product.name.clone(),
                    unit_price: product.price,
                    stock: product.stock,
                    is_available: product.is_available,
                })
            })
            .collect()
    }

    fn order_by_number(&self, number: &OrderNumber) -> Option<Order> {
        self.orders
            .values()
            .find(|order| &order.order_number == number)
            .cloned()
    }
}

/// A [`Store`] that keeps everything in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    fail_commits: Arc<AtomicBool>,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a product's stock counter.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::NotFound`] if the product does not exist.
    pub async fn set_stock(&self, product: ProductId, stock: u32) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let product = state
            .products
            .get_mut(&product)
            .ok_or(RepositoryError::NotFound)?;
        product.stock = stock;
        Ok(())
    }

    /// Take a product off sale, or put it back.
    pub async fn set_available(
        &self,
        product: ProductId,
        is_available: bool,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let product = state
            .products
            .get_mut(&product)
            .ok_or(RepositoryError::NotFound)?;
        product.is_available = is_available;
        Ok(())
    }

    /// Make every subsequent commit fail until switched back off.
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Every payment recorded, in insertion order.
    pub async fn payments(&self) -> Vec<Payment> {
        self.state.lock().await.payments.values().cloned().collect()
    }

    /// Every cart item of `owner`, active or not.
    pub async fn cart_items(&self, owner: &CartOwner) -> Vec<CartItem> {
        self.state
            .lock()
            .await
            .cart_items
            .values()
            .filter(|item| &item.owner == owner)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, RepositoryError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            staged,
            fail_commit: self.fail_commits.load(Ordering::SeqCst),
        }))
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }

    async fn product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.state.lock().await.products.get(&id).cloned())
    }

    async fn variations(&self, product: ProductId) -> Result<Vec<Variation>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .await
            .variations
            .iter()
            .filter(|v| v.product_id == product)
            .cloned()
            .collect())
    }

    async fn cart_lines(&self, owner: &CartOwner) -> Result<Vec<CartLine>, RepositoryError> {
        Ok(self.state.lock().await.cart_lines(owner))
    }

    async fn wishlist_items(
        &self,
        owner: &CartOwner,
    ) -> Result<Vec<WishlistItem>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .await
            .wishlist_items
            .values()
            .filter(|item| &item.owner == owner)
            .cloned()
            .collect())
    }

    async fn order_by_number(
        &self,
        number: &OrderNumber,
    ) -> Result<Option<Order>, RepositoryError> {
        Ok(self.state.lock().await.order_by_number(number))
    }

    async fn orders_for_account(
        &self,
        account: AccountId,
        status: OrderStatus,
    ) -> Result<Vec<Order>, RepositoryError> {
        let mut orders: Vec<Order> = self
            .state
            .lock()
            .await
            .orders
            .values()
            .filter(|order| order.account_id == account && order.status == status)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders)
    }

    async fn order_products(&self, order: OrderId) -> Result<Vec<OrderProduct>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .await
            .order_products
            .iter()
            .filter(|line| line.order_id == order)
            .cloned()
            .collect())
    }

    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>, RepositoryError> {
        Ok(self.state.lock().await.payments.get(&id).cloned())
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<State>,
    staged: State,
    fail_commit: bool,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.staged.products.get(&id).cloned())
    }

    async fn insert_product(&mut self, new: NewProduct) -> Result<Product, RepositoryError> {
        if self.staged.products.values().any(|p| p.slug == new.slug) {
            return Err(RepositoryError::Conflict(format!(
                "product slug {} already exists",
                new.slug
            )));
        }
        let product = Product {
            id: ProductId::new(self.staged.next_id()),
            name: new.name,
            slug: new.slug,
            price: new.price,
            stock: new.stock,
            is_available: new.is_available,
        };
        for variation in new.variations {
            let id = VariationId::new(self.staged.next_id());
            self.staged.variations.push(Variation {
                id,
                product_id: product.id,
                category: variation.category,
                value: variation.value,
                is_active: true,
            });
        }
        self.staged.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn cart_lines(&mut self, owner: &CartOwner) -> Result<Vec<CartLine>, RepositoryError> {
        Ok(self.staged.cart_lines(owner))
    }

    async fn cart_items_for_product(
        &mut self,
        owner: &CartOwner,
        product: ProductId,
    ) -> Result<Vec<CartItem>, RepositoryError> {
        Ok(self
            .staged
            .cart_items
            .values()
            .filter(|item| &item.owner == owner && item.product_id == product)
            .cloned()
            .collect())
    }

    async fn cart_items(&mut self, owner: &CartOwner) -> Result<Vec<CartItem>, RepositoryError> {
        Ok(self
            .staged
            .cart_items
            .values()
            .filter(|item| &item.owner == owner)
            .cloned()
            .collect())
    }

    async fn cart_item(
        &mut self,
        owner: &CartOwner,
        id: CartItemId,
    ) -> Result<Option<CartItem>, RepositoryError> {
        Ok(self
            .staged
            .cart_items
            .get(&id)
            .filter(|item| &item.owner == owner)
            .cloned())
    }

    async fn insert_cart_item(&mut self, new: NewCartItem) -> Result<CartItem, RepositoryError> {
        if !self.staged.products.contains_key(&new.product_id) {
            return Err(RepositoryError::NotFound);
        }
        let item = CartItem {
            id: CartItemId::new(self.staged.next_id()),
            owner: new.owner,
            product_id: new.product_id,
            variations: new.variations,
            quantity: new.quantity,
            is_active: true,
            created_at: Utc::now(),
        };
        self.staged.cart_items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn set_cart_item_quantity(
        &mut self,
        id: CartItemId,
        quantity: u32,
    ) -> Result<(), RepositoryError> {
        let item = self
            .staged
            .cart_items
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        item.quantity = quantity;
        Ok(())
    }

    async fn reassign_cart_item(
        &mut self,
        id: CartItemId,
        owner: &CartOwner,
    ) -> Result<(), RepositoryError> {
        let item = self
            .staged
            .cart_items
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        item.owner = owner.clone();
        Ok(())
    }

    async fn delete_cart_item(&mut self, id: CartItemId) -> Result<(), RepositoryError> {
        self.staged
            .cart_items
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    async fn clear_cart(&mut self, owner: &CartOwner) -> Result<u64, RepositoryError> {
        let before = self.staged.cart_items.len();
        self.staged.cart_items.retain(|_, item| &item.owner != owner);
        Ok((before - self.staged.cart_items.len()) as u64)
    }

    async fn wishlist_items_for_product(
        &mut self,
        owner: &CartOwner,
        product: ProductId,
    ) -> Result<Vec<WishlistItem>, RepositoryError> {
        Ok(self
            .staged
            .wishlist_items
            .values()
            .filter(|item| &item.owner == owner && item.product_id == product)
            .cloned()
            .collect())
    }

    async fn wishlist_item(
        &mut self,
        owner: &CartOwner,
        id: WishlistItemId,
    ) -> Result<Option<WishlistItem>, RepositoryError> {
        Ok(self
            .staged
            .wishlist_items
            .get(&id)
            .filter(|item| &item.owner == owner)
            .cloned())
    }

    async fn insert_wishlist_item(
        &mut self,
        new: NewWishlistItem,
    ) -> Result<WishlistItem, RepositoryError> {
        if !self.staged.products.contains_key(&new.product_id) {
            return Err(RepositoryError::NotFound);
        }
        let item = WishlistItem {
            id: WishlistItemId::new(self.staged.next_id()),
            owner: new.owner,
            product_id: new.product_id,
            variations: new.variations,
            added_at: Utc::now(),
        };
        self.staged.wishlist_items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn delete_wishlist_item(&mut self, id: WishlistItemId) -> Result<(), RepositoryError> {
        self.staged
            .wishlist_items
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    async fn decrement_stock(
        &mut self,
        product: ProductId,
        quantity: u32,
    ) -> Result<StockChange, RepositoryError> {
        let Some(product) = self.staged.products.get_mut(&product) else {
            return Ok(StockChange::Missing);
        };
        if product.stock < quantity {
            return Ok(StockChange::Insufficient {
                remaining: product.stock,
            });
        }
        product.stock -= quantity;
        Ok(StockChange::Decremented {
            remaining: product.stock,
        })
    }

    async fn insert_order(&mut self, new: NewOrder) -> Result<Order, RepositoryError> {
        let id = OrderId::new(self.staged.next_id());
        let order = Order {
            id,
            order_number: OrderNumber::from_parts(new.created_at.date_naive(), id),
            account_id: new.account_id,
            contact: new.contact,
            subtotal: new.subtotal,
            shipping_charge: new.shipping_charge,
            order_total: new.order_total,
            status: OrderStatus::Unordered,
            payment_id: None,
            ip: new.ip,
            created_at: new.created_at,
            updated_at: new.created_at,
        };
        self.staged.orders.insert(id, order.clone());
        Ok(order)
    }

    async fn lock_order(&mut self, number: &OrderNumber) -> Result<Option<Order>, RepositoryError> {
        Ok(self.staged.order_by_number(number))
    }

    async fn transition_order(
        &mut self,
        id: OrderId,
        from: &[OrderStatus],
        to: OrderStatus,
        payment: Option<PaymentId>,
    ) -> Result<Option<Order>, RepositoryError> {
        let Some(order) = self.staged.orders.get_mut(&id) else {
            return Ok(None);
        };
        if !from.contains(&order.status) {
            return Ok(None);
        }
        order.status = to;
        if payment.is_some() {
            order.payment_id = payment;
        }
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }

    async fn insert_payment(&mut self, new: NewPayment) -> Result<Payment, RepositoryError> {
        if self
            .staged
            .payments
            .values()
            .any(|p| p.gateway_payment_id == new.gateway_payment_id || p.order_id == new.order_id)
        {
            return Err(RepositoryError::Conflict(format!(
                "payment {} already recorded",
                new.gateway_payment_id
            )));
        }
        let payment = Payment {
            id: PaymentId::new(self.staged.next_id()),
            gateway_payment_id: new.gateway_payment_id,
            order_id: new.order_id,
            account_id: new.account_id,
            method: new.method,
            amount_paid: new.amount_paid,
            status: PaymentStatus::Completed,
            created_at: Utc::now(),
        };
        self.staged.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn insert_order_product(
        &mut self,
        new: NewOrderProduct,
    ) -> Result<OrderProduct, RepositoryError> {
        let line = OrderProduct {
            id: OrderProductId::new(self.staged.next_id()),
            order_id: new.order_id,
            payment_id: new.payment_id,
            account_id: new.account_id,
            product_id: new.product_id,
            product_name: new.product_name,
            variations: new.variations,
            quantity: new.quantity,
            unit_price: new.unit_price,
            created_at: Utc::now(),
        };
        self.staged.order_products.push(line.clone());
        Ok(line)
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        if self.fail_commit {
            return Err(RepositoryError::Conflict("commit refused".to_owned()));
        }
        let Self {
            mut guard, staged, ..
        } = *self;
        *guard = staged;
        Ok(())
    }
}
