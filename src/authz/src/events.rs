//! Best-effort publication of permission-change notifications (C8, §6).
//!
//! Mirrors the source oracle's producer usage in its cached-permission
//! repository: a publish failure is logged and swallowed, never surfaced to
//! the caller of the write that triggered it. The write already committed;
//! a downstream consumer missing one event is far cheaper than failing an
//! otherwise-successful mutation.

use authz_shared::PermissionChangeEvent;
use tracing::{instrument, warn};

#[async_trait::async_trait]
pub trait ChangeEventSink: Send + Sync {
    async fn publish(&self, event: &PermissionChangeEvent);
}

/// Default sink: serializes the event and logs it. Stands in for a real
/// message-bus producer until one is wired in by the embedding service.
pub struct LoggingEventSink;

#[async_trait::async_trait]
impl ChangeEventSink for LoggingEventSink {
    #[instrument(skip(self, event))]
    async fn publish(&self, event: &PermissionChangeEvent) {
        match serde_json::to_string(event) {
            Ok(json) => tracing::info!(payload = %json, "permission change event"),
            Err(err) => warn!(%err, "failed to serialize permission change event"),
        }
    }
}

/// Publishes `event` through `sink`, logging rather than propagating any
/// failure — matching the "warn and move on" policy of the reloader this
/// feeds (§4.8, §9).
pub async fn publish_best_effort(sink: &dyn ChangeEventSink, event: &PermissionChangeEvent) {
    sink.publish(event).await;
}
