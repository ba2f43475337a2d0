//! Storage ports used by checkout, and their adapters.
//!
//! The ledger never touches a connection directly; it is handed a
//! [`StorageContext`] holding one handle per collaborator, so tests can swap
//! any of them for a double.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{Cart, CartItem, Order, Product};

pub mod memory;
pub mod postgres;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Record not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { available: u32, requested: u32 },

    #[error("Storage error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// One active cart per user.
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn get(&self, user_id: Uuid) -> StoreResult<Option<Cart>>;
    /// Inserts or replaces the user's cart.
    async fn save(&self, cart: &Cart) -> StoreResult<()>;
    /// Replaces the line items of an existing cart.
    async fn set_items(&self, user_id: Uuid, items: &[CartItem]) -> StoreResult<()>;
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Product>>;
    /// Atomically takes `amount` units. Fails with `NotFound` for unknown
    /// products and `InsufficientStock` instead of going negative.
    async fn decrement_stock(&self, id: Uuid, amount: u32) -> StoreResult<()>;
    /// Gives back units taken by `decrement_stock`.
    async fn restore_stock(&self, id: Uuid, amount: u32) -> StoreResult<()>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Fails with `Conflict` when the order number is already taken.
    async fn insert(&self, order: &Order) -> StoreResult<()>;
    async fn delete(&self, id: Uuid) -> StoreResult<()>;
    async fn get(&self, id: Uuid) -> StoreResult<Option<Order>>;
    /// Newest first.
    async fn list_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Order>>;
    /// Newest first.
    async fn list_all(&self) -> StoreResult<Vec<Order>>;
    async fn update(&self, order: &Order) -> StoreResult<()>;
}

#[derive(Clone)]
pub struct StorageContext {
    pub carts: Arc<dyn CartStore>,
    pub products: Arc<dyn ProductCatalog>,
    pub orders: Arc<dyn OrderRepository>,
}

impl StorageContext {
    pub fn new(carts: Arc<dyn CartStore>, products: Arc<dyn ProductCatalog>, orders: Arc<dyn OrderRepository>) -> Self {
        Self { carts, products, orders }
    }
}
