//! Product Aggregate
//!
//! The catalog is owned elsewhere; checkout only needs a product's display
//! snapshot and its stock counter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::Money;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub price: Money,
    pub images: Vec<String>,
    pub stock: u32,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus { #[default] Active, Inactive }

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Active => "active", Self::Inactive => "inactive" }
    }
}

impl std::str::FromStr for ProductStatus {
    type Err = ProductError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            other => Err(ProductError::UnknownStatus(other.to_string())),
        }
    }
}

impl Product {
    pub fn create(name: impl Into<String>, price: Money, stock: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), name: name.into(), price, images: vec![], stock,
            status: ProductStatus::Active, created_at: now, updated_at: now,
        }
    }

    pub fn with_images(mut self, images: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.images = images.into_iter().map(Into::into).collect();
        self
    }

    pub fn first_image(&self) -> Option<&str> { self.images.first().map(String::as_str) }
    /// Inactive products stay in the catalog but cannot be added to a cart.
    pub fn is_available(&self) -> bool { self.status == ProductStatus::Active }

    pub fn remove_stock(&mut self, qty: u32) -> Result<(), ProductError> {
        self.stock = self.stock.checked_sub(qty).ok_or(ProductError::InsufficientStock { available: self.stock, requested: qty })?;
        self.touch();
        Ok(())
    }

    pub fn add_stock(&mut self, qty: u32) {
        self.stock = self.stock.saturating_add(qty);
        self.touch();
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum ProductError { InsufficientStock { available: u32, requested: u32 }, UnknownStatus(String) }
impl std::error::Error for ProductError {}
impl std::fmt::Display for ProductError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientStock { available, requested } => write!(f, "Insufficient stock: requested {requested}, available {available}"),
            Self::UnknownStatus(s) => write!(f, "Unknown product status: {s}"),
        }
    }
}
