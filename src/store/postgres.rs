//! Postgres adapters over a shared `sqlx::PgPool`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{CartStore, OrderRepository, ProductCatalog, StorageContext, StoreError, StoreResult};
use crate::domain::aggregates::{Cart, CartItem, LineItem, Order, PaymentResult, Product, ShippingAddress};
use crate::domain::value_objects::Money;

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(db.message().to_string()),
            _ => StoreError::Backend(e.to_string()),
        }
    }
}

fn corrupt(what: &str, e: impl std::fmt::Display) -> StoreError { StoreError::Backend(format!("corrupt {what} row: {e}")) }

#[derive(Clone)]
pub struct PgStore { db: PgPool }

impl PgStore {
    pub fn new(db: PgPool) -> Self { Self { db } }

    pub fn context(&self) -> StorageContext {
        StorageContext::new(Arc::new(self.clone()), Arc::new(self.clone()), Arc::new(self.clone()))
    }
}

#[derive(sqlx::FromRow)]
struct CartRow { id: Uuid, user_id: Uuid, items: Json<Vec<CartItem>>, created_at: DateTime<Utc>, updated_at: DateTime<Utc> }

impl From<CartRow> for Cart {
    fn from(r: CartRow) -> Self { Cart { id: r.id, user_id: r.user_id, items: r.items.0, created_at: r.created_at, updated_at: r.updated_at } }
}

#[derive(sqlx::FromRow)]
struct ProductRow { id: Uuid, name: String, price: Decimal, images: Vec<String>, stock: i32, status: String, created_at: DateTime<Utc>, updated_at: DateTime<Utc> }

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;
    fn try_from(r: ProductRow) -> Result<Self, Self::Error> {
        Ok(Product {
            id: r.id, name: r.name, price: Money::new(r.price), images: r.images,
            stock: u32::try_from(r.stock).map_err(|e| corrupt("product", e))?,
            status: r.status.parse().map_err(|e| corrupt("product", e))?,
            created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid, order_number: String, user_id: Uuid, items: Json<Vec<LineItem>>, shipping_address: Json<ShippingAddress>,
    payment_method: String, payment_result: Option<Json<PaymentResult>>, payment_status: String, order_status: String,
    subtotal: Decimal, shipping_cost: Decimal, tax: Decimal, discount: Decimal, total_amount: Decimal,
    delivered_at: Option<DateTime<Utc>>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;
    fn try_from(r: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: r.id, order_number: r.order_number, user_id: r.user_id, items: r.items.0, shipping_address: r.shipping_address.0,
            payment_method: r.payment_method.parse().map_err(|e| corrupt("order", e))?,
            payment_result: r.payment_result.map(|j| j.0),
            payment_status: r.payment_status.parse().map_err(|e| corrupt("order", e))?,
            order_status: r.order_status.parse().map_err(|e| corrupt("order", e))?,
            subtotal: Money::new(r.subtotal), shipping_cost: Money::new(r.shipping_cost), tax: Money::new(r.tax),
            discount: Money::new(r.discount), total_amount: Money::new(r.total_amount),
            delivered_at: r.delivered_at, created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

fn to_orders(rows: Vec<OrderRow>) -> StoreResult<Vec<Order>> { rows.into_iter().map(Order::try_from).collect() }

#[async_trait]
impl CartStore for PgStore {
    async fn get(&self, user_id: Uuid) -> StoreResult<Option<Cart>> {
        let row = sqlx::query_as::<_, CartRow>("SELECT * FROM carts WHERE user_id = $1").bind(user_id).fetch_optional(&self.db).await?;
        Ok(row.map(Cart::from))
    }

    async fn save(&self, cart: &Cart) -> StoreResult<()> {
        sqlx::query("INSERT INTO carts (id, user_id, items, created_at, updated_at) VALUES ($1, $2, $3, $4, $5) ON CONFLICT (user_id) DO UPDATE SET items = EXCLUDED.items, updated_at = EXCLUDED.updated_at")
            .bind(cart.id).bind(cart.user_id).bind(Json(&cart.items)).bind(cart.created_at).bind(cart.updated_at)
            .execute(&self.db).await?;
        Ok(())
    }

    async fn set_items(&self, user_id: Uuid, items: &[CartItem]) -> StoreResult<()> {
        let done = sqlx::query("UPDATE carts SET items = $2, updated_at = NOW() WHERE user_id = $1").bind(user_id).bind(Json(items)).execute(&self.db).await?;
        if done.rows_affected() == 0 { return Err(StoreError::NotFound); }
        Ok(())
    }
}

#[async_trait]
impl ProductCatalog for PgStore {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Product>> {
        sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1").bind(id).fetch_optional(&self.db).await?.map(Product::try_from).transpose()
    }

    async fn decrement_stock(&self, id: Uuid, amount: u32) -> StoreResult<()> {
        let requested = i32::try_from(amount).map_err(|_| StoreError::InsufficientStock { available: 0, requested: amount })?;
        let taken: Option<(Uuid,)> = sqlx::query_as("UPDATE products SET stock = stock - $2, updated_at = NOW() WHERE id = $1 AND stock >= $2 RETURNING id")
            .bind(id).bind(requested).fetch_optional(&self.db).await?;
        if taken.is_some() { return Ok(()); }
        let stock: Option<(i32,)> = sqlx::query_as("SELECT stock FROM products WHERE id = $1").bind(id).fetch_optional(&self.db).await?;
        match stock {
            None => Err(StoreError::NotFound),
            Some((available,)) => Err(StoreError::InsufficientStock { available: u32::try_from(available).unwrap_or(0), requested: amount }),
        }
    }

    async fn restore_stock(&self, id: Uuid, amount: u32) -> StoreResult<()> {
        let amount = i32::try_from(amount).map_err(|e| StoreError::Backend(e.to_string()))?;
        let done = sqlx::query("UPDATE products SET stock = stock + $2, updated_at = NOW() WHERE id = $1").bind(id).bind(amount).execute(&self.db).await?;
        if done.rows_affected() == 0 { return Err(StoreError::NotFound); }
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn insert(&self, o: &Order) -> StoreResult<()> {
        sqlx::query("INSERT INTO orders (id, order_number, user_id, items, shipping_address, payment_method, payment_result, payment_status, order_status, subtotal, shipping_cost, tax, discount, total_amount, delivered_at, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)")
            .bind(o.id).bind(&o.order_number).bind(o.user_id).bind(Json(&o.items)).bind(Json(&o.shipping_address))
            .bind(o.payment_method.as_str()).bind(o.payment_result.as_ref().map(Json)).bind(o.payment_status.as_str()).bind(o.order_status.as_str())
            .bind(o.subtotal.amount()).bind(o.shipping_cost.amount()).bind(o.tax.amount()).bind(o.discount.amount()).bind(o.total_amount.amount())
            .bind(o.delivered_at).bind(o.created_at).bind(o.updated_at)
            .execute(&self.db).await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let done = sqlx::query("DELETE FROM orders WHERE id = $1").bind(id).execute(&self.db).await?;
        if done.rows_affected() == 0 { return Err(StoreError::NotFound); }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Order>> {
        sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(&self.db).await?.map(Order::try_from).transpose()
    }

    async fn list_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Order>> {
        to_orders(sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC").bind(user_id).fetch_all(&self.db).await?)
    }

    async fn list_all(&self) -> StoreResult<Vec<Order>> {
        to_orders(sqlx::query_as::<_, OrderRow>("SELECT * FROM orders ORDER BY created_at DESC, id DESC").fetch_all(&self.db).await?)
    }

    async fn update(&self, o: &Order) -> StoreResult<()> {
        let done = sqlx::query("UPDATE orders SET order_status = $2, payment_status = $3, delivered_at = $4, updated_at = $5 WHERE id = $1")
            .bind(o.id).bind(o.order_status.as_str()).bind(o.payment_status.as_str()).bind(o.delivered_at).bind(o.updated_at)
            .execute(&self.db).await?;
        if done.rows_affected() == 0 { return Err(StoreError::NotFound); }
        Ok(())
    }
}
