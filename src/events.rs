//! Best-effort publication of order events to NATS.

use tracing::{debug, warn};

use crate::domain::events::OrderEvent;

#[derive(Clone, Default)]
pub struct EventBus { nats: Option<async_nats::Client> }

impl EventBus {
    /// Events are dropped.
    pub fn disabled() -> Self { Self { nats: None } }
    pub fn nats(client: async_nats::Client) -> Self { Self { nats: Some(client) } }

    /// Publishing never fails the caller; errors are logged.
    pub async fn publish(&self, event: OrderEvent) {
        let Some(client) = &self.nats else { return; };
        let payload = match serde_json::to_vec(&event) {
            Ok(p) => p,
            Err(e) => { warn!(error = %e, subject = event.subject(), "failed to encode order event"); return; }
        };
        match client.publish(event.subject().to_string(), payload.into()).await {
            Ok(()) => debug!(subject = event.subject(), "published order event"),
            Err(e) => warn!(error = %e, subject = event.subject(), "failed to publish order event"),
        }
    }
}
