//! Domain events
use crate::domain::aggregates::{OrderStatus, PaymentStatus};
use crate::domain::value_objects::Money;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, order_number: String, user_id: Uuid, total_amount: Money },
    RolledBack { order_number: String, user_id: Uuid, reason: String },
    StatusUpdated { order_id: Uuid, order_status: OrderStatus, payment_status: PaymentStatus },
}

impl OrderEvent {
    /// Subject the event is published on.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Placed { .. } => "orders.placed",
            Self::RolledBack { .. } => "orders.rolled_back",
            Self::StatusUpdated { .. } => "orders.status_updated",
        }
    }
}
