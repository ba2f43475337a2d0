//! Order Aggregate
//!
//! An order is an immutable snapshot of a cart at checkout. After creation
//! only its statuses (and `delivered_at`) change, through
//! [`Order::apply_status_update`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};
use crate::domain::value_objects::Money;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub(crate) id: Uuid,
    pub(crate) order_number: String,
    pub(crate) user_id: Uuid,
    pub(crate) items: Vec<LineItem>,
    pub(crate) shipping_address: ShippingAddress,
    pub(crate) payment_method: PaymentMethod,
    pub(crate) payment_result: Option<PaymentResult>,
    pub(crate) payment_status: PaymentStatus,
    pub(crate) order_status: OrderStatus,
    pub(crate) subtotal: Money,
    pub(crate) shipping_cost: Money,
    pub(crate) tax: Money,
    pub(crate) discount: Money,
    pub(crate) total_amount: Money,
    pub(crate) delivered_at: Option<DateTime<Utc>>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem { pub product_id: Uuid, pub name: String, pub image: Option<String>, pub quantity: u32, pub unit_price: Money, pub color: Option<String> }

impl LineItem {
    pub fn line_total(&self) -> Money { self.unit_price.multiply(self.quantity) }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    #[validate(custom = "non_blank")] pub name: String,
    #[validate(custom = "non_blank")] pub phone: String,
    #[validate(custom = "non_blank")] pub street: String,
    #[validate(custom = "non_blank")] pub city: String,
    #[validate(custom = "non_blank")] pub state: String,
    #[validate(custom = "non_blank")] pub zip_code: String,
    #[validate(custom = "non_blank")] pub country: String,
}

fn non_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() { return Err(ValidationError::new("required")); }
    Ok(())
}

/// Gateway confirmation echoed back by the client; stored verbatim.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentResult { pub id: Option<String>, pub status: Option<String>, pub update_time: Option<String> }

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod { Card, Paypal, Cod }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus { #[default] Pending, Paid, Failed }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus { #[default] Processing, Shipped, Delivered, Cancelled }

impl PaymentMethod {
    /// Cash on delivery is collected later; every other method is settled at checkout.
    pub fn initial_payment_status(&self) -> PaymentStatus {
        match self { Self::Cod => PaymentStatus::Pending, Self::Card | Self::Paypal => PaymentStatus::Paid }
    }
}

macro_rules! text_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str { match self { $(Self::$variant => $text),+ } }
        }
        impl std::str::FromStr for $ty {
            type Err = OrderError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s { $($text => Ok(Self::$variant),)+ other => Err(OrderError::UnknownValue { field: stringify!($ty), value: other.to_string() }) }
            }
        }
        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
        }
    };
}

text_enum!(PaymentMethod { Card => "card", Paypal => "paypal", Cod => "cod" });
text_enum!(PaymentStatus { Pending => "pending", Paid => "paid", Failed => "failed" });
text_enum!(OrderStatus { Processing => "processing", Shipped => "shipped", Delivered => "delivered", Cancelled => "cancelled" });

/// Shipping and tax rules applied once, when an order is placed.
#[derive(Clone, Debug, PartialEq)]
pub struct PricingPolicy {
    /// Orders with a subtotal strictly above this ship free.
    pub free_shipping_threshold: Money,
    pub flat_shipping_cost: Money,
    pub tax_rate: Decimal,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self { free_shipping_threshold: Money::new(dec!(100)), flat_shipping_cost: Money::new(dec!(10)), tax_rate: dec!(0.10) }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderTotals { pub subtotal: Money, pub shipping_cost: Money, pub tax: Money, pub discount: Money, pub total_amount: Money }

impl PricingPolicy {
    pub fn totals(&self, subtotal: Money) -> OrderTotals {
        let shipping_cost = if subtotal > self.free_shipping_threshold { Money::zero() } else { self.flat_shipping_cost };
        let tax = subtotal.apply_rate(self.tax_rate);
        OrderTotals { subtotal, shipping_cost, tax, discount: Money::zero(), total_amount: subtotal + shipping_cost + tax }
    }
}

/// Everything an order is built from, gathered at checkout.
#[derive(Clone, Debug)]
pub struct NewOrder {
    pub user_id: Uuid,
    pub items: Vec<LineItem>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub payment_result: Option<PaymentResult>,
    pub totals: OrderTotals,
}

impl Order {
    pub fn create(order_number: impl Into<String>, new: NewOrder) -> Result<Self, OrderError> {
        if new.items.is_empty() { return Err(OrderError::NoItems); }
        if new.items.iter().any(|i| i.quantity == 0 || i.unit_price.is_negative()) { return Err(OrderError::InvalidLineItem); }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7(), order_number: order_number.into(), user_id: new.user_id, items: new.items,
            shipping_address: new.shipping_address, payment_method: new.payment_method, payment_result: new.payment_result,
            payment_status: new.payment_method.initial_payment_status(), order_status: OrderStatus::Processing,
            subtotal: new.totals.subtotal, shipping_cost: new.totals.shipping_cost, tax: new.totals.tax,
            discount: new.totals.discount, total_amount: new.totals.total_amount,
            delivered_at: None, created_at: now, updated_at: now,
        })
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn order_number(&self) -> &str { &self.order_number }
    pub fn user_id(&self) -> Uuid { self.user_id }
    pub fn items(&self) -> &[LineItem] { &self.items }
    pub fn shipping_address(&self) -> &ShippingAddress { &self.shipping_address }
    pub fn payment_method(&self) -> PaymentMethod { self.payment_method }
    pub fn payment_result(&self) -> Option<&PaymentResult> { self.payment_result.as_ref() }
    pub fn payment_status(&self) -> PaymentStatus { self.payment_status }
    pub fn order_status(&self) -> OrderStatus { self.order_status }
    pub fn subtotal(&self) -> Money { self.subtotal }
    pub fn shipping_cost(&self) -> Money { self.shipping_cost }
    pub fn tax(&self) -> Money { self.tax }
    pub fn discount(&self) -> Money { self.discount }
    pub fn total_amount(&self) -> Money { self.total_amount }
    pub fn delivered_at(&self) -> Option<DateTime<Utc>> { self.delivered_at }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    /// Replaces the order number. Only valid before the order is first stored.
    pub(crate) fn reassign_number(&mut self, order_number: String) { self.order_number = order_number; }

    /// Admin status change. Any status may be set to any other; totals are untouched.
    /// Moving to `delivered` stamps `delivered_at` once and it is never cleared.
    pub fn apply_status_update(&mut self, order_status: Option<OrderStatus>, payment_status: Option<PaymentStatus>, now: DateTime<Utc>) {
        if let Some(status) = order_status {
            self.order_status = status;
            if status == OrderStatus::Delivered && self.delivered_at.is_none() { self.delivered_at = Some(now); }
        }
        if let Some(status) = payment_status { self.payment_status = status; }
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum OrderError { NoItems, InvalidLineItem, UnknownValue { field: &'static str, value: String } }
impl std::error::Error for OrderError {}
impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoItems => write!(f, "No items"),
            Self::InvalidLineItem => write!(f, "Line items need a positive quantity and a non-negative price"),
            Self::UnknownValue { field, value } => write!(f, "Unknown {field}: {value}"),
        }
    }
}
