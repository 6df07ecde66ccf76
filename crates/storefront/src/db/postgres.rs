//! `PostgreSQL` implementation of [`Store`].
//!
//! Queries are checked at runtime (`sqlx::query_as`) so the crate builds
//! without a live database. Enum columns are read and written as text and
//! parsed on the Rust side.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool, Postgres, Transaction};

use techbazaar_core::{
    AccountId, CartItemId, CartOwner, ContactInfo, Email, GuestToken, Money, OrderId, OrderNumber,
    OrderProductId, OrderStatus, PaymentId, PaymentStatus, ProductId, Variation, VariationId,
    VariationSet, WishlistItemId,
};

use super::{RepositoryError, StockChange, Store, StoreTx};
use crate::models::{
    CartItem, CartLine, NewCartItem, NewOrder, NewOrderProduct, NewPayment, NewProduct,
    NewWishlistItem, Order, OrderProduct, Payment, Product, WishlistItem,
};

/// A [`Store`] backed by a `PostgreSQL` pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool (shared with the session store).
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, RepositoryError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        fetch_product(&self.pool, id).await
    }

    async fn variations(&self, product: ProductId) -> Result<Vec<Variation>, RepositoryError> {
        let rows = sqlx::query_as::<_, VariationRow>(
            r"
            SELECT id, product_id, category, value, is_active
            FROM storefront.variation
            WHERE product_id = $1
            ORDER BY id
            ",
        )
        .bind(product.as_i64())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Variation::from).collect())
    }

    async fn cart_lines(&self, owner: &CartOwner) -> Result<Vec<CartLine>, RepositoryError> {
        fetch_cart_lines(&self.pool, owner).await
    }

    async fn wishlist_items(
        &self,
        owner: &CartOwner,
    ) -> Result<Vec<WishlistItem>, RepositoryError> {
        fetch_wishlist_items(&self.pool, owner, None, None).await
    }

    async fn order_by_number(
        &self,
        number: &OrderNumber,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.customer_order WHERE order_number = $1"
        ))
        .bind(number.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    async fn orders_for_account(
        &self,
        account: AccountId,
        status: OrderStatus,
    ) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.customer_order
             WHERE account_id = $1 AND status::text = $2
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(account.as_i64())
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    async fn order_products(&self, order: OrderId) -> Result<Vec<OrderProduct>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderProductRow>(
            r"
            SELECT op.id, op.order_id, op.payment_id, op.account_id, op.product_id,
                   op.product_name, op.quantity, op.unit_price, op.created_at,
                   COALESCE(array_agg(opv.variation_id ORDER BY opv.variation_id)
                            FILTER (WHERE opv.variation_id IS NOT NULL), '{}') AS variation_ids
            FROM storefront.order_product op
            LEFT JOIN storefront.order_product_variation opv ON opv.order_product_id = op.id
            WHERE op.order_id = $1
            GROUP BY op.id
            ORDER BY op.id
            ",
        )
        .bind(order.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OrderProduct::try_from).collect()
    }

    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>, RepositoryError> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r"
            SELECT id, gateway_payment_id, order_id, account_id, method, amount_paid,
                   status::text AS status, created_at
            FROM storefront.payment
            WHERE id = $1
            ",
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Payment::try_from).transpose()
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        fetch_product(&mut *self.tx, id).await
    }

    async fn insert_product(&mut self, new: NewProduct) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r"
            INSERT INTO storefront.product (name, slug, price, stock, is_available)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, slug, price, stock, is_available
            ",
        )
        .bind(&new.name)
        .bind(&new.slug)
        .bind(new.price)
        .bind(to_db_int(new.stock)?)
        .bind(new.is_available)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| unique_violation(e, format!("product slug {} already exists", new.slug)))?;

        let product = Product::try_from(row)?;

        for variation in &new.variations {
            sqlx::query(
                r"
                INSERT INTO storefront.variation (product_id, category, value)
                VALUES ($1, $2, $3)
                ",
            )
            .bind(product.id.as_i64())
            .bind(&variation.category)
            .bind(&variation.value)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                unique_violation(
                    e,
                    format!(
                        "variation {}={} declared twice",
                        variation.category, variation.value
                    ),
                )
            })?;
        }

        Ok(product)
    }

    async fn cart_lines(&mut self, owner: &CartOwner) -> Result<Vec<CartLine>, RepositoryError> {
        fetch_cart_lines(&mut *self.tx, owner).await
    }

    async fn cart_items_for_product(
        &mut self,
        owner: &CartOwner,
        product: ProductId,
    ) -> Result<Vec<CartItem>, RepositoryError> {
        fetch_cart_items(&mut *self.tx, owner, Some(product), None).await
    }

    async fn cart_items(&mut self, owner: &CartOwner) -> Result<Vec<CartItem>, RepositoryError> {
        fetch_cart_items(&mut *self.tx, owner, None, None).await
    }

    async fn cart_item(
        &mut self,
        owner: &CartOwner,
        id: CartItemId,
    ) -> Result<Option<CartItem>, RepositoryError> {
        Ok(fetch_cart_items(&mut *self.tx, owner, None, Some(id))
            .await?
            .into_iter()
            .next())
    }

    async fn insert_cart_item(&mut self, new: NewCartItem) -> Result<CartItem, RepositoryError> {
        let (account_id, guest_token) = owner_columns(&new.owner);
        let (id, created_at): (i64, DateTime<Utc>) = sqlx::query_as(
            r"
            INSERT INTO storefront.cart_item (account_id, guest_token, product_id, quantity)
            VALUES ($1, $2, $3, $4)
            RETURNING id, created_at
            ",
        )
        .bind(account_id)
        .bind(guest_token)
        .bind(new.product_id.as_i64())
        .bind(to_db_int(new.quantity)?)
        .fetch_one(&mut *self.tx)
        .await?;

        sqlx::query(
            r"
            INSERT INTO storefront.cart_item_variation (cart_item_id, variation_id)
            SELECT $1, unnest($2::bigint[])
            ",
        )
        .bind(id)
        .bind(variation_ids(&new.variations))
        .execute(&mut *self.tx)
        .await?;

        Ok(CartItem {
            id: CartItemId::new(id),
            owner: new.owner,
            product_id: new.product_id,
            variations: new.variations,
            quantity: new.quantity,
            is_active: true,
            created_at,
        })
    }

    async fn set_cart_item_quantity(
        &mut self,
        id: CartItemId,
        quantity: u32,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE storefront.cart_item SET quantity = $2 WHERE id = $1")
            .bind(id.as_i64())
            .bind(to_db_int(quantity)?)
            .execute(&mut *self.tx)
            .await?;
        expect_one_row(result.rows_affected())
    }

    async fn reassign_cart_item(
        &mut self,
        id: CartItemId,
        owner: &CartOwner,
    ) -> Result<(), RepositoryError> {
        let (account_id, guest_token) = owner_columns(owner);
        let result = sqlx::query(
            "UPDATE storefront.cart_item SET account_id = $2, guest_token = $3 WHERE id = $1",
        )
        .bind(id.as_i64())
        .bind(account_id)
        .bind(guest_token)
        .execute(&mut *self.tx)
        .await?;
        expect_one_row(result.rows_affected())
    }

    async fn delete_cart_item(&mut self, id: CartItemId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM storefront.cart_item WHERE id = $1")
            .bind(id.as_i64())
            .execute(&mut *self.tx)
            .await?;
        expect_one_row(result.rows_affected())
    }

    async fn clear_cart(&mut self, owner: &CartOwner) -> Result<u64, RepositoryError> {
        let (account_id, guest_token) = owner_columns(owner);
        let result = sqlx::query(
            "DELETE FROM storefront.cart_item WHERE (account_id = $1 OR guest_token = $2)",
        )
        .bind(account_id)
        .bind(guest_token)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn wishlist_items_for_product(
        &mut self,
        owner: &CartOwner,
        product: ProductId,
    ) -> Result<Vec<WishlistItem>, RepositoryError> {
        fetch_wishlist_items(&mut *self.tx, owner, Some(product), None).await
    }

    async fn wishlist_item(
        &mut self,
        owner: &CartOwner,
        id: WishlistItemId,
    ) -> Result<Option<WishlistItem>, RepositoryError> {
        Ok(fetch_wishlist_items(&mut *self.tx, owner, None, Some(id))
            .await?
            .into_iter()
            .next())
    }

    async fn insert_wishlist_item(
        &mut self,
        new: NewWishlistItem,
    ) -> Result<WishlistItem, RepositoryError> {
        let (account_id, guest_token) = owner_columns(&new.owner);
        let (id, added_at): (i64, DateTime<Utc>) = sqlx::query_as(
            r"
            INSERT INTO storefront.wishlist_item (account_id, guest_token, product_id)
            VALUES ($1, $2, $3)
            RETURNING id, added_at
            ",
        )
        .bind(account_id)
        .bind(guest_token)
        .bind(new.product_id.as_i64())
        .fetch_one(&mut *self.tx)
        .await?;

        sqlx::query(
            r"
            INSERT INTO storefront.wishlist_item_variation (wishlist_item_id, variation_id)
            SELECT $1, unnest($2::bigint[])
            ",
        )
        .bind(id)
        .bind(variation_ids(&new.variations))
        .execute(&mut *self.tx)
        .await?;

        Ok(WishlistItem {
            id: WishlistItemId::new(id),
            owner: new.owner,
            product_id: new.product_id,
            variations: new.variations,
            added_at,
        })
    }

    async fn delete_wishlist_item(&mut self, id: WishlistItemId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM storefront.wishlist_item WHERE id = $1")
            .bind(id.as_i64())
            .execute(&mut *self.tx)
            .await?;
        expect_one_row(result.rows_affected())
    }

    async fn decrement_stock(
        &mut self,
        product: ProductId,
        quantity: u32,
    ) -> Result<StockChange, RepositoryError> {
        let quantity = to_db_int(quantity)?;
        let remaining: Option<i32> = sqlx::query_scalar(
            r"
            UPDATE storefront.product
            SET stock = stock - $2, updated_at = now()
            WHERE id = $1 AND stock >= $2
            RETURNING stock
            ",
        )
        .bind(product.as_i64())
        .bind(quantity)
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(remaining) = remaining {
            return Ok(StockChange::Decremented {
                remaining: from_db_int(remaining, "product.stock")?,
            });
        }

        let current: Option<i32> =
            sqlx::query_scalar("SELECT stock FROM storefront.product WHERE id = $1")
                .bind(product.as_i64())
                .fetch_optional(&mut *self.tx)
                .await?;

        match current {
            Some(stock) => Ok(StockChange::Insufficient {
                remaining: from_db_int(stock, "product.stock")?,
            }),
            None => Ok(StockChange::Missing),
        }
    }

    async fn insert_order(&mut self, new: NewOrder) -> Result<Order, RepositoryError> {
        let id: i64 = sqlx::query_scalar(
            "SELECT nextval(pg_get_serial_sequence('storefront.customer_order', 'id'))",
        )
        .fetch_one(&mut *self.tx)
        .await?;
        let id = OrderId::new(id);
        let order_number = OrderNumber::from_parts(new.created_at.date_naive(), id);
        let contact = &new.contact;

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            INSERT INTO storefront.customer_order (
                id, order_number, account_id,
                first_name, last_name, phone, email,
                address_line_1, address_line_2, city, state, country, order_note,
                subtotal, shipping_charge, order_total, ip, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $18)
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(id.as_i64())
        .bind(order_number.as_str())
        .bind(new.account_id.as_i64())
        .bind(&contact.first_name)
        .bind(&contact.last_name)
        .bind(&contact.phone)
        .bind(contact.email.as_str())
        .bind(&contact.address_line_1)
        .bind(contact.address_line_2.as_deref())
        .bind(&contact.city)
        .bind(&contact.state)
        .bind(&contact.country)
        .bind(contact.order_note.as_deref())
        .bind(new.subtotal)
        .bind(new.shipping_charge)
        .bind(new.order_total)
        .bind(new.ip.as_deref())
        .bind(new.created_at)
        .fetch_one(&mut *self.tx)
        .await?;

        Order::try_from(row)
    }

    async fn lock_order(&mut self, number: &OrderNumber) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.customer_order
             WHERE order_number = $1
             FOR UPDATE"
        ))
        .bind(number.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(Order::try_from).transpose()
    }

    async fn transition_order(
        &mut self,
        id: OrderId,
        from: &[OrderStatus],
        to: OrderStatus,
        payment: Option<PaymentId>,
    ) -> Result<Option<Order>, RepositoryError> {
        let from: Vec<&str> = from.iter().map(|s| s.as_str()).collect();
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            UPDATE storefront.customer_order
            SET status = $3::storefront.order_status,
                payment_id = COALESCE($4, payment_id),
                updated_at = now()
            WHERE id = $1 AND status::text = ANY($2)
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(id.as_i64())
        .bind(from)
        .bind(to.as_str())
        .bind(payment.map(|p| p.as_i64()))
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(Order::try_from).transpose()
    }

    async fn insert_payment(&mut self, new: NewPayment) -> Result<Payment, RepositoryError> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r"
            INSERT INTO storefront.payment (gateway_payment_id, order_id, account_id, method, amount_paid)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, gateway_payment_id, order_id, account_id, method, amount_paid,
                      status::text AS status, created_at
            ",
        )
        .bind(&new.gateway_payment_id)
        .bind(new.order_id.as_i64())
        .bind(new.account_id.as_i64())
        .bind(&new.method)
        .bind(new.amount_paid)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            unique_violation(
                e,
                format!("payment {} already recorded", new.gateway_payment_id),
            )
        })?;

        Payment::try_from(row)
    }

    async fn insert_order_product(
        &mut self,
        new: NewOrderProduct,
    ) -> Result<OrderProduct, RepositoryError> {
        let (id, created_at): (i64, DateTime<Utc>) = sqlx::query_as(
            r"
            INSERT INTO storefront.order_product
                (order_id, payment_id, account_id, product_id, product_name, quantity, unit_price)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, created_at
            ",
        )
        .bind(new.order_id.as_i64())
        .bind(new.payment_id.as_i64())
        .bind(new.account_id.as_i64())
        .bind(new.product_id.as_i64())
        .bind(&new.product_name)
        .bind(to_db_int(new.quantity)?)
        .bind(new.unit_price)
        .fetch_one(&mut *self.tx)
        .await?;

        sqlx::query(
            r"
            INSERT INTO storefront.order_product_variation (order_product_id, variation_id)
            SELECT $1, unnest($2::bigint[])
            ",
        )
        .bind(id)
        .bind(variation_ids(&new.variations))
        .execute(&mut *self.tx)
        .await?;

        Ok(OrderProduct {
            id: OrderProductId::new(id),
            order_id: new.order_id,
            payment_id: new.payment_id,
            account_id: new.account_id,
            product_id: new.product_id,
            product_name: new.product_name,
            variations: new.variations,
            quantity: new.quantity,
            unit_price: new.unit_price,
            created_at,
        })
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        self.tx.commit().await?;
        Ok(())
    }
}

// =============================================================================
// Shared queries
// =============================================================================

const ORDER_COLUMNS: &str = "id, order_number, account_id, first_name, last_name, phone, email, \
     address_line_1, address_line_2, city, state, country, order_note, \
     subtotal, shipping_charge, order_total, status::text AS status, payment_id, ip, \
     created_at, updated_at";

async fn fetch_product<'e>(
    executor: impl PgExecutor<'e>,
    id: ProductId,
) -> Result<Option<Product>, RepositoryError> {
    let row = sqlx::query_as::<_, ProductRow>(
        r"
        SELECT id, name, slug, price, stock, is_available
        FROM storefront.product
        WHERE id = $1
        ",
    )
    .bind(id.as_i64())
    .fetch_optional(executor)
    .await?;

    row.map(Product::try_from).transpose()
}

async fn fetch_cart_lines<'e>(
    executor: impl PgExecutor<'e>,
    owner: &CartOwner,
) -> Result<Vec<CartLine>, RepositoryError> {
    let (account_id, guest_token) = owner_columns(owner);
    let rows = sqlx::query_as::<_, CartLineRow>(
        r"
        SELECT ci.id, ci.account_id, ci.guest_token, ci.product_id, ci.quantity,
               ci.is_active, ci.created_at,
               COALESCE(array_agg(civ.variation_id ORDER BY civ.variation_id)
                        FILTER (WHERE civ.variation_id IS NOT NULL), '{}') AS variation_ids,
               p.name AS product_name, p.price AS unit_price, p.stock, p.is_available
        FROM storefront.cart_item ci
        JOIN storefront.product p ON p.id = ci.product_id
        LEFT JOIN storefront.cart_item_variation civ ON civ.cart_item_id = ci.id
        WHERE (ci.account_id = $1 OR ci.guest_token = $2) AND ci.is_active
        GROUP BY ci.id, p.id
        ORDER BY ci.id
        ",
    )
    .bind(account_id)
    .bind(guest_token)
    .fetch_all(executor)
    .await?;

    rows.into_iter().map(CartLine::try_from).collect()
}

async fn fetch_cart_items<'e>(
    executor: impl PgExecutor<'e>,
    owner: &CartOwner,
    product: Option<ProductId>,
    id: Option<CartItemId>,
) -> Result<Vec<CartItem>, RepositoryError> {
    let (account_id, guest_token) = owner_columns(owner);
    let rows = sqlx::query_as::<_, CartItemRow>(
        r"
        SELECT ci.id, ci.account_id, ci.guest_token, ci.product_id, ci.quantity,
               ci.is_active, ci.created_at,
               COALESCE(array_agg(civ.variation_id ORDER BY civ.variation_id)
                        FILTER (WHERE civ.variation_id IS NOT NULL), '{}') AS variation_ids
        FROM storefront.cart_item ci
        LEFT JOIN storefront.cart_item_variation civ ON civ.cart_item_id = ci.id
        WHERE (ci.account_id = $1 OR ci.guest_token = $2)
          AND ($3::bigint IS NULL OR ci.product_id = $3)
          AND ($4::bigint IS NULL OR ci.id = $4)
        GROUP BY ci.id
        ORDER BY ci.id
        ",
    )
    .bind(account_id)
    .bind(guest_token)
    .bind(product.map(|p| p.as_i64()))
    .bind(id.map(|i| i.as_i64()))
    .fetch_all(executor)
    .await?;

    rows.into_iter().map(CartItem::try_from).collect()
}

async fn fetch_wishlist_items<'e>(
    executor: impl PgExecutor<'e>,
    owner: &CartOwner,
    product: Option<ProductId>,
    id: Option<WishlistItemId>,
) -> Result<Vec<WishlistItem>, RepositoryError> {
    let (account_id, guest_token) = owner_columns(owner);
    let rows = sqlx::query_as::<_, WishlistItemRow>(
        r"
        SELECT wi.id, wi.account_id, wi.guest_token, wi.product_id, wi.added_at,
               COALESCE(array_agg(wiv.variation_id ORDER BY wiv.variation_id)
                        FILTER (WHERE wiv.variation_id IS NOT NULL), '{}') AS variation_ids
        FROM storefront.wishlist_item wi
        LEFT JOIN storefront.wishlist_item_variation wiv ON wiv.wishlist_item_id = wi.id
        WHERE (wi.account_id = $1 OR wi.guest_token = $2)
          AND ($3::bigint IS NULL OR wi.product_id = $3)
          AND ($4::bigint IS NULL OR wi.id = $4)
        GROUP BY wi.id
        ORDER BY wi.id
        ",
    )
    .bind(account_id)
    .bind(guest_token)
    .bind(product.map(|p| p.as_i64()))
    .bind(id.map(|i| i.as_i64()))
    .fetch_all(executor)
    .await?;

    rows.into_iter().map(WishlistItem::try_from).collect()
}

// =============================================================================
// Column helpers
// =============================================================================

/// `(account_id, guest_token)` column values; exactly one is set.
fn owner_columns(owner: &CartOwner) -> (Option<i64>, Option<String>) {
    match owner {
        CartOwner::Account(id) => (Some(id.as_i64()), None),
        CartOwner::Guest(token) => (None, Some(token.as_str().to_owned())),
    }
}

fn owner_from_columns(
    account_id: Option<i64>,
    guest_token: Option<String>,
) -> Result<CartOwner, RepositoryError> {
    match (account_id, guest_token) {
        (Some(id), None) => Ok(CartOwner::Account(AccountId::new(id))),
        (None, Some(token)) => Ok(CartOwner::Guest(GuestToken::from_string(token))),
        _ => Err(RepositoryError::DataCorruption(
            "row must have exactly one of account_id and guest_token".to_owned(),
        )),
    }
}

fn variation_ids(set: &VariationSet) -> Vec<i64> {
    set.ids().map(|id| id.as_i64()).collect()
}

fn variation_set(ids: Vec<i64>) -> VariationSet {
    ids.into_iter().map(VariationId::new).collect()
}

fn to_db_int(value: u32) -> Result<i32, RepositoryError> {
    i32::try_from(value)
        .map_err(|_| RepositoryError::Conflict(format!("{value} is too large to store")))
}

fn from_db_int(value: i32, column: &str) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::DataCorruption(format!("negative {column}: {value}")))
}

const fn expect_one_row(rows_affected: u64) -> Result<(), RepositoryError> {
    if rows_affected == 0 {
        Err(RepositoryError::NotFound)
    } else {
        Ok(())
    }
}

fn unique_violation(e: sqlx::Error, message: String) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(message);
    }
    RepositoryError::Database(e)
}

// =============================================================================
// Row types
// =============================================================================

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: i64,
    name: String,
    slug: String,
    price: Money,
    stock: i32,
    is_available: bool,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ProductId::new(row.id),
            name: row.name,
            slug: row.slug,
            price: row.price,
            stock: from_db_int(row.stock, "product.stock")?,
            is_available: row.is_available,
        })
    }
}

#[derive(sqlx::FromRow)]
struct VariationRow {
    id: i64,
    product_id: i64,
    category: String,
    value: String,
    is_active: bool,
}

impl From<VariationRow> for Variation {
    fn from(row: VariationRow) -> Self {
        Self {
            id: VariationId::new(row.id),
            product_id: ProductId::new(row.product_id),
            category: row.category,
            value: row.value,
            is_active: row.is_active,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CartItemRow {
    id: i64,
    account_id: Option<i64>,
    guest_token: Option<String>,
    product_id: i64,
    quantity: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
    variation_ids: Vec<i64>,
}

impl TryFrom<CartItemRow> for CartItem {
    type Error = RepositoryError;

    fn try_from(row: CartItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: CartItemId::new(row.id),
            owner: owner_from_columns(row.account_id, row.guest_token)?,
            product_id: ProductId::new(row.product_id),
            variations: variation_set(row.variation_ids),
            quantity: from_db_int(row.quantity, "cart_item.quantity")?,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CartLineRow {
    #[sqlx(flatten)]
    item: CartItemRow,
    product_name: String,
    unit_price: Money,
    stock: i32,
    is_available: bool,
}

impl TryFrom<CartLineRow> for CartLine {
    type Error = RepositoryError;

    fn try_from(row: CartLineRow) -> Result<Self, Self::Error> {
        Ok(Self {
            item: CartItem::try_from(row.item)?,
            product_name: row.product_name,
            unit_price: row.unit_price,
            stock: from_db_int(row.stock, "product.stock")?,
            is_available: row.is_available,
        })
    }
}

#[derive(sqlx::FromRow)]
struct WishlistItemRow {
    id: i64,
    account_id: Option<i64>,
    guest_token: Option<String>,
    product_id: i64,
    added_at: DateTime<Utc>,
    variation_ids: Vec<i64>,
}

impl TryFrom<WishlistItemRow> for WishlistItem {
    type Error = RepositoryError;

    fn try_from(row: WishlistItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: WishlistItemId::new(row.id),
            owner: owner_from_columns(row.account_id, row.guest_token)?,
            product_id: ProductId::new(row.product_id),
            variations: variation_set(row.variation_ids),
            added_at: row.added_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    order_number: String,
    account_id: i64,
    first_name: String,
    last_name: String,
    phone: String,
    email: String,
    address_line_1: String,
    address_line_2: Option<String>,
    city: String,
    state: String,
    country: String,
    order_note: Option<String>,
    subtotal: Money,
    shipping_charge: Money,
    order_total: Money,
    status: String,
    payment_id: Option<i64>,
    ip: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let order_number = OrderNumber::parse(&row.order_number).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid order number in database: {e}"))
        })?;
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;
        let status = row
            .status
            .parse::<OrderStatus>()
            .map_err(RepositoryError::DataCorruption)?;

        Ok(Self {
            id: OrderId::new(row.id),
            order_number,
            account_id: AccountId::new(row.account_id),
            contact: ContactInfo {
                first_name: row.first_name,
                last_name: row.last_name,
                phone: row.phone,
                email,
                address_line_1: row.address_line_1,
                address_line_2: row.address_line_2,
                city: row.city,
                state: row.state,
                country: row.country,
                order_note: row.order_note,
            },
            subtotal: row.subtotal,
            shipping_charge: row.shipping_charge,
            order_total: row.order_total,
            status,
            payment_id: row.payment_id.map(PaymentId::new),
            ip: row.ip,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderProductRow {
    id: i64,
    order_id: i64,
    payment_id: i64,
    account_id: i64,
    product_id: i64,
    product_name: String,
    quantity: i32,
    unit_price: Money,
    created_at: DateTime<Utc>,
    variation_ids: Vec<i64>,
}

impl TryFrom<OrderProductRow> for OrderProduct {
    type Error = RepositoryError;

    fn try_from(row: OrderProductRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: OrderProductId::new(row.id),
            order_id: OrderId::new(row.order_id),
            payment_id: PaymentId::new(row.payment_id),
            account_id: AccountId::new(row.account_id),
            product_id: ProductId::new(row.product_id),
            product_name: row.product_name,
            variations: variation_set(row.variation_ids),
            quantity: from_db_int(row.quantity, "order_product.quantity")?,
            unit_price: row.unit_price,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: i64,
    gateway_payment_id: String,
    order_id: i64,
    account_id: i64,
    method: String,
    amount_paid: Money,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = RepositoryError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let status = match row.status.as_str() {
            "completed" => PaymentStatus::Completed,
            other => {
                return Err(RepositoryError::DataCorruption(format!(
                    "invalid payment status: {other}"
                )));
            }
        };

        Ok(Self {
            id: PaymentId::new(row.id),
            gateway_payment_id: row.gateway_payment_id,
            order_id: OrderId::new(row.order_id),
            account_id: AccountId::new(row.account_id),
            method: row.method,
            amount_paid: row.amount_paid,
            status,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_columns_roundtrip() {
        let account = CartOwner::Account(AccountId::new(3));
        let (a, g) = owner_columns(&account);
        assert_eq!(owner_from_columns(a, g).unwrap(), account);

        let guest = CartOwner::Guest(GuestToken::from_string("tok".to_string()));
        let (a, g) = owner_columns(&guest);
        assert_eq!(owner_from_columns(a, g).unwrap(), guest);
    }

    #[test]
    fn test_owner_columns_reject_ambiguous_rows() {
        assert!(matches!(
            owner_from_columns(Some(1), Some("tok".to_string())),
            Err(RepositoryError::DataCorruption(_))
        ));
        assert!(matches!(
            owner_from_columns(None, None),
            Err(RepositoryError::DataCorruption(_))
        ));
    }

    #[test]
    fn test_db_int_conversions() {
        assert_eq!(to_db_int(5).unwrap(), 5);
        assert!(to_db_int(u32::MAX).is_err());
        assert_eq!(from_db_int(7, "stock").unwrap(), 7);
        assert!(matches!(
            from_db_int(-1, "stock"),
            Err(RepositoryError::DataCorruption(_))
        ));
    }

    #[test]
    fn test_expect_one_row() {
        assert!(expect_one_row(1).is_ok());
        assert!(matches!(expect_one_row(0), Err(RepositoryError::NotFound)));
    }
}
