//! Checkout domain model
pub mod aggregates;
pub mod events;
pub mod order_number;
pub mod value_objects;
