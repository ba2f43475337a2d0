//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;

pub use product::{Product, ProductError, ProductStatus};
pub use order::{
    LineItem, NewOrder, Order, OrderError, OrderStatus, OrderTotals, PaymentMethod, PaymentResult, PaymentStatus,
    PricingPolicy, ShippingAddress,
};
pub use cart::{Cart, CartError, CartItem};
