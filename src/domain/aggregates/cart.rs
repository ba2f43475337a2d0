//! Cart Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::Money;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<CartItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One cart line. `name` and `image` are captured when the line is added.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub image: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
    pub color: Option<String>,
}

impl CartItem {
    pub fn new(product_id: Uuid, name: impl Into<String>, image: Option<String>, quantity: u32, unit_price: Money, color: Option<String>) -> Self {
        Self { id: Uuid::now_v7(), product_id, name: name.into(), image, quantity, unit_price, color }
    }

    pub fn line_total(&self) -> Money { self.unit_price.multiply(self.quantity) }
}

impl Cart {
    pub fn for_user(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self { id: Uuid::now_v7(), user_id, items: vec![], created_at: now, updated_at: now }
    }

    pub fn item_count(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn total_price(&self) -> Money { self.items.iter().map(CartItem::line_total).sum() }

    /// Line holding the same product in the same color, if any.
    pub fn find_line(&self, product_id: Uuid, color: Option<&str>) -> Option<&CartItem> {
        self.items.iter().find(|i| i.product_id == product_id && i.color.as_deref() == color)
    }

    /// Adds a line, merging quantities into an existing product+color line.
    pub fn add_item(&mut self, item: CartItem) {
        if let Some(existing) = self.items.iter_mut().find(|i| i.product_id == item.product_id && i.color == item.color) {
            existing.quantity = existing.quantity.saturating_add(item.quantity);
        } else {
            self.items.push(item);
        }
        self.touch();
    }

    pub fn set_quantity(&mut self, item_id: Uuid, quantity: u32) -> Result<(), CartError> {
        let item = self.items.iter_mut().find(|i| i.id == item_id).ok_or(CartError::ItemNotFound)?;
        item.quantity = quantity;
        self.touch();
        Ok(())
    }

    /// Removing an unknown line is a no-op.
    pub fn remove_item(&mut self, item_id: Uuid) {
        self.items.retain(|i| i.id != item_id);
        self.touch();
    }

    pub fn clear(&mut self) { self.items.clear(); self.touch(); }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CartError { ItemNotFound }
impl std::error::Error for CartError {}
impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "Item not found in cart") }
}
