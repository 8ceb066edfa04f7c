//! Broker consumption: deliveries from the bound queue are logged per type
//! and forwarded unchanged to every connected client.

use std::sync::Arc;

use async_trait::async_trait;

use crate::broker::DeliveryHandler;
use crate::domain::BrokerMessage;
use crate::ws::{BroadcastReport, Broadcaster};

/// Extension point for side effects on broker events (for example keeping a
/// user directory in sync). Runs before the broadcast.
#[async_trait]
pub trait DeliveryHook: Send + Sync + std::fmt::Debug {
    /// Called once per well-formed broker message.
    async fn on_message(&self, message: &BrokerMessage);
}

/// Hook that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHook;

#[async_trait]
impl DeliveryHook for NoopHook {
    async fn on_message(&self, _message: &BrokerMessage) {}
}

/// [`DeliveryHandler`] that bridges the consumed queue to the connections.
#[derive(Debug)]
pub struct BrokerConsumer {
    broadcaster: Broadcaster,
    hook: Arc<dyn DeliveryHook>,
}

impl BrokerConsumer {
    /// Creates a consumer with no side-effect hook.
    #[must_use]
    pub fn new(broadcaster: Broadcaster) -> Self {
        Self::with_hook(broadcaster, Arc::new(NoopHook))
    }

    /// Creates a consumer that runs `hook` for every well-formed message.
    #[must_use]
    pub fn with_hook(broadcaster: Broadcaster, hook: Arc<dyn DeliveryHook>) -> Self {
        Self { broadcaster, hook }
    }

    /// Handles one delivery. Returns `None` if the body has fewer than two
    /// colon-delimited parts and was dropped, otherwise the broadcast outcome.
    /// Bodies of unrecognized shape, JSON included, are broadcast unchanged.
    pub async fn handle(&self, body: &str) -> Option<BroadcastReport> {
        tracing::info!(message = body, "received event from broker");

        let message = match BrokerMessage::decode(body) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(
                    message = body,
                    error_kind = e.kind(),
                    error = %e,
                    "invalid broker message format"
                );
                return None;
            }
        };

        match &message {
            BrokerMessage::Logout { user_id, email } => {
                tracing::info!(user_id, email = email.as_deref(), "user logged out");
            }
            BrokerMessage::Message { user_id, content } => {
                tracing::info!(user_id, content, "user message received");
            }
            BrokerMessage::Status { user_id, status } => {
                tracing::info!(user_id, status, "user status changed");
            }
            BrokerMessage::Other { kind, .. } => {
                tracing::warn!(event_type = %kind, "unknown broker event type");
            }
        }

        self.hook.on_message(&message).await;
        Some(self.broadcaster.broadcast(body))
    }
}

#[async_trait]
impl DeliveryHandler for BrokerConsumer {
    async fn on_delivery(&self, body: String) {
        self.handle(&body).await;
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::ws::{ConnectionHandle, ConnectionRegistry, Outbound};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    #[derive(Debug, Default)]
    struct RecordingHook {
        seen: Mutex<Vec<BrokerMessage>>,
    }

    #[async_trait]
    impl DeliveryHook for RecordingHook {
        async fn on_message(&self, message: &BrokerMessage) {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(message.clone());
            }
        }
    }

    fn setup() -> (Broadcaster, mpsc::Receiver<Outbound>, Arc<ConnectionRegistry>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let (handle, rx) = ConnectionHandle::new(16);
        registry.add(Arc::new(handle));
        (Broadcaster::new(Arc::clone(&registry)), rx, registry)
    }

    #[tokio::test]
    async fn status_message_is_broadcast_unchanged() {
        let (broadcaster, mut rx, _registry) = setup();
        let consumer = BrokerConsumer::new(broadcaster);

        let report = consumer.handle("status:u1:away").await;
        assert_eq!(report.map(|r| r.delivered), Some(1));
        let Ok(Outbound::Text(text)) = rx.try_recv() else {
            panic!("broadcast frame");
        };
        assert_eq!(&*text, "status:u1:away");
    }

    #[tokio::test]
    async fn unknown_kind_is_still_broadcast() {
        let (broadcaster, mut rx, _registry) = setup();
        let consumer = BrokerConsumer::new(broadcaster);

        assert!(consumer.handle("User logged in: a@b.c").await.is_some());
        let Ok(Outbound::Text(text)) = rx.try_recv() else {
            panic!("broadcast frame");
        };
        assert_eq!(&*text, "User logged in: a@b.c");
    }

    #[tokio::test]
    async fn malformed_message_is_dropped() {
        let (broadcaster, mut rx, _registry) = setup();
        let consumer = BrokerConsumer::new(broadcaster);

        assert!(consumer.handle("logout").await.is_none());
        assert!(consumer.handle("{}").await.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn foreign_json_is_broadcast_unchanged() {
        let (broadcaster, mut rx, _registry) = setup();
        let consumer = BrokerConsumer::new(broadcaster);

        for body in [
            r#"{"event":"order_created","id":"42"}"#,
            r#"{"v":9,"type":"logout"}"#,
        ] {
            let report = consumer.handle(body).await;
            assert_eq!(report.map(|r| r.delivered), Some(1));
            let Ok(Outbound::Text(text)) = rx.try_recv() else {
                panic!("broadcast frame for {body}");
            };
            assert_eq!(&*text, body);
        }
    }

    #[tokio::test]
    async fn hook_sees_decoded_message() {
        let (broadcaster, _rx, _registry) = setup();
        let hook = Arc::new(RecordingHook::default());
        let consumer =
            BrokerConsumer::with_hook(broadcaster, Arc::clone(&hook) as Arc<dyn DeliveryHook>);

        consumer.on_delivery("logout:u1:u1@example.com".to_string()).await;

        let seen = hook.seen.lock().map(|s| s.clone()).unwrap_or_default();
        assert_eq!(
            seen,
            vec![BrokerMessage::Logout {
                user_id: "u1".into(),
                email: Some("u1@example.com".into()),
            }]
        );
    }
}
