//! Tech PK Checkout
//!
//! Order placement for the Tech PK storefront.
//!
//! ## Features
//! - Per-user carts with stock-aware add/merge
//! - Checkout that snapshots the cart into an immutable order
//! - Stock decrement with full rollback when any line fails
//! - Admin order status updates and revenue reporting
//! - Postgres or in-memory storage, optional NATS order events

pub mod api;
pub mod cart;
pub mod checkout;
pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod requester;
pub mod store;

pub use checkout::{OrderLedger, OrdersReport, PlaceOrder, StatusUpdate};
pub use error::{CheckoutError, Result};
pub use requester::{Requester, Role};
pub use store::StorageContext;
