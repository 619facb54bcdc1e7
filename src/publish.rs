//! Event sinks for reconciliation events

use std::sync::Mutex;
use crate::domain::events::ReconcileEvent;

pub const SUBJECT_PREFIX: &str = "storefront.reconcile";

/// Receives reconciliation events. Publishing must not block the caller.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: ReconcileEvent);
}

/// Drops every event after logging it at debug level.
#[derive(Clone, Debug, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn publish(&self, event: ReconcileEvent) {
        tracing::debug!(session = %event.session_id, cart = %event.cart_id, kind = event.kind.subject(), "reconcile event");
    }
}

/// Publishes events as JSON on `storefront.reconcile.<kind>`.
#[derive(Clone)]
pub struct NatsEventSink { client: async_nats::Client }

impl NatsEventSink {
    pub fn new(client: async_nats::Client) -> Self { Self { client } }
}

impl EventSink for NatsEventSink {
    fn publish(&self, event: ReconcileEvent) {
        let subject = format!("{}.{}", SUBJECT_PREFIX, event.kind.subject());
        let payload = match serde_json::to_vec(&event) {
            Ok(payload) => payload,
            Err(e) => { tracing::warn!("Failed to encode reconcile event: {}", e); return; }
        };
        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(e) = client.publish(subject, payload.into()).await {
                tracing::warn!("Failed to publish reconcile event: {}", e);
            }
        });
    }
}

/// Keeps events in memory; used by tests and for inspection.
#[derive(Debug, Default)]
pub struct RecordingEventSink { events: Mutex<Vec<ReconcileEvent>> }

impl RecordingEventSink {
    pub fn events(&self) -> Vec<ReconcileEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl EventSink for RecordingEventSink {
    fn publish(&self, event: ReconcileEvent) {
        if let Ok(mut events) = self.events.lock() { events.push(event); }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::ReconcileEventKind;

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingEventSink::default();
        sink.publish(ReconcileEvent::new("s", "c", ReconcileEventKind::BundleSyncFailed { reason: "timeout".into() }));
        sink.publish(ReconcileEvent::new("s", "c", ReconcileEventKind::VipDiscountRejected { code: "VIP10".into() }));
        let kinds: Vec<_> = sink.events().iter().map(|e| e.kind.subject()).collect();
        assert_eq!(kinds, vec!["bundle_sync_failed", "vip_discount_rejected"]);
    }
}
