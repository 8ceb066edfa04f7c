//! Event router: client envelopes in, broker publishes and broadcasts out.

use std::sync::Arc;

use crate::broker::Broker;
use crate::config::Topics;
use crate::domain::{ClientEvent, Envelope, EventKind, WireFormat};
use crate::ws::{BroadcastReport, Broadcaster};

/// What [`EventRouter::route`] did with one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The event was handled: published (unless the broker refused) and broadcast.
    Routed {
        /// The broker text that was published and broadcast.
        payload: String,
        /// `false` if the broker rejected the publish.
        published: bool,
        /// Outcome of the broadcast.
        broadcast: BroadcastReport,
    },
    /// The envelope carried a type this router does not handle.
    Ignored,
    /// The frame or its fields failed to parse.
    Dropped,
}

/// Parses inbound client frames and dispatches them by event type.
///
/// Every recognized event is encoded once as a broker message; that exact
/// text is published to the event kind's topic and then broadcast to all
/// connections. Publish happens before broadcast. Failures are logged and
/// never reach the caller.
#[derive(Debug)]
pub struct EventRouter {
    broker: Arc<dyn Broker>,
    broadcaster: Broadcaster,
    topics: Topics,
    wire_format: WireFormat,
}

impl EventRouter {
    /// Creates a router publishing through `broker` and broadcasting through
    /// `broadcaster`.
    #[must_use]
    pub fn new(
        broker: Arc<dyn Broker>,
        broadcaster: Broadcaster,
        topics: Topics,
        wire_format: WireFormat,
    ) -> Self {
        Self {
            broker,
            broadcaster,
            topics,
            wire_format,
        }
    }

    /// Returns the topic exchange for `kind`.
    #[must_use]
    pub fn topic_for(&self, kind: EventKind) -> &str {
        match kind {
            EventKind::Logout => &self.topics.logout,
            EventKind::Message => &self.topics.message,
            EventKind::StatusUpdate => &self.topics.status,
        }
    }

    /// Handles one raw inbound frame.
    pub async fn route(&self, raw: &[u8]) -> RouteOutcome {
        let envelope = match Envelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!(error_kind = e.kind(), error = %e, "failed to parse websocket message");
                return RouteOutcome::Dropped;
            }
        };

        tracing::info!(event_type = %envelope.event_type, "received websocket event");

        let Some(kind) = envelope.kind() else {
            tracing::warn!(event_type = %envelope.event_type, "unknown event type");
            return RouteOutcome::Ignored;
        };

        match ClientEvent::parse(kind, &envelope.data) {
            Ok(event) => self.dispatch(&event).await,
            Err(e) => {
                tracing::error!(
                    event_type = kind.as_str(),
                    error_kind = e.kind(),
                    error = %e,
                    "failed to parse event data"
                );
                RouteOutcome::Dropped
            }
        }
    }

    /// Publishes and broadcasts an already validated event.
    pub async fn dispatch(&self, event: &ClientEvent) -> RouteOutcome {
        let kind = event.kind();
        let payload = match event.to_broker_message().encode(self.wire_format) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(
                    event_type = kind.as_str(),
                    user_id = event.user_id(),
                    error_kind = e.kind(),
                    error = %e,
                    "failed to encode broker message"
                );
                return RouteOutcome::Dropped;
            }
        };

        tracing::info!(event_type = kind.as_str(), user_id = event.user_id(), "processing event");

        let topic = self.topic_for(kind);
        let published = match self.broker.publish(topic, &payload).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    topic,
                    error_kind = e.kind(),
                    error = %e,
                    "failed to publish event to broker"
                );
                false
            }
        };

        let broadcast = self.broadcaster.broadcast(&payload);
        RouteOutcome::Routed {
            payload,
            published,
            broadcast,
        }
    }
}
