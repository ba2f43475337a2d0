//! In-memory adapters, used by tests and when no database is configured.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CartStore, OrderRepository, ProductCatalog, StorageContext, StoreError, StoreResult};
use crate::domain::aggregates::{Cart, CartItem, Order, Product};

#[derive(Clone, Default)]
pub struct InMemoryCarts {
    // keyed by user id
    carts: Arc<RwLock<HashMap<Uuid, Cart>>>,
}

#[async_trait]
impl CartStore for InMemoryCarts {
    async fn get(&self, user_id: Uuid) -> StoreResult<Option<Cart>> {
        Ok(self.carts.read().await.get(&user_id).cloned())
    }

    async fn save(&self, cart: &Cart) -> StoreResult<()> {
        self.carts.write().await.insert(cart.user_id, cart.clone());
        Ok(())
    }

    async fn set_items(&self, user_id: Uuid, items: &[CartItem]) -> StoreResult<()> {
        let mut carts = self.carts.write().await;
        let cart = carts.get_mut(&user_id).ok_or(StoreError::NotFound)?;
        cart.items = items.to_vec();
        cart.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryCatalog {
    products: Arc<RwLock<HashMap<Uuid, Product>>>,
}

impl InMemoryCatalog {
    pub async fn insert(&self, product: Product) {
        self.products.write().await.insert(product.id, product);
    }

    pub async fn remove(&self, id: Uuid) -> Option<Product> {
        self.products.write().await.remove(&id)
    }

    pub async fn stock_of(&self, id: Uuid) -> Option<u32> {
        self.products.read().await.get(&id).map(|p| p.stock)
    }
}

#[async_trait]
impl ProductCatalog for InMemoryCatalog {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Product>> {
        Ok(self.products.read().await.get(&id).cloned())
    }

    async fn decrement_stock(&self, id: Uuid, amount: u32) -> StoreResult<()> {
        let mut products = self.products.write().await;
        let product = products.get_mut(&id).ok_or(StoreError::NotFound)?;
        let available = product.stock;
        product.remove_stock(amount).map_err(|_| StoreError::InsufficientStock { available, requested: amount })
    }

    async fn restore_stock(&self, id: Uuid, amount: u32) -> StoreResult<()> {
        let mut products = self.products.write().await;
        products.get_mut(&id).ok_or(StoreError::NotFound)?.add_stock(amount);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryOrders {
    orders: Arc<RwLock<HashMap<Uuid, Order>>>,
}

impl InMemoryOrders {
    pub async fn len(&self) -> usize { self.orders.read().await.len() }
    pub async fn is_empty(&self) -> bool { self.orders.read().await.is_empty() }

    fn newest_first(mut orders: Vec<Order>) -> Vec<Order> {
        orders.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        orders
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrders {
    async fn insert(&self, order: &Order) -> StoreResult<()> {
        let mut orders = self.orders.write().await;
        if orders.values().any(|o| o.order_number == order.order_number) {
            return Err(StoreError::Conflict(format!("order number {} already exists", order.order_number)));
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        self.orders.write().await.remove(&id).map(|_| ()).ok_or(StoreError::NotFound)
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn list_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Order>> {
        let orders = self.orders.read().await.values().filter(|o| o.user_id == user_id).cloned().collect();
        Ok(Self::newest_first(orders))
    }

    async fn list_all(&self) -> StoreResult<Vec<Order>> {
        let orders = self.orders.read().await.values().cloned().collect();
        Ok(Self::newest_first(orders))
    }

    async fn update(&self, order: &Order) -> StoreResult<()> {
        let mut orders = self.orders.write().await;
        let slot = orders.get_mut(&order.id).ok_or(StoreError::NotFound)?;
        *slot = order.clone();
        Ok(())
    }
}

/// All three in-memory adapters, sharing nothing but the process.
#[derive(Clone, Default)]
pub struct MemoryStore {
    pub carts: InMemoryCarts,
    pub products: InMemoryCatalog,
    pub orders: InMemoryOrders,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub fn context(&self) -> StorageContext {
        StorageContext::new(Arc::new(self.carts.clone()), Arc::new(self.products.clone()), Arc::new(self.orders.clone()))
    }
}
