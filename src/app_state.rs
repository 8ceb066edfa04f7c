//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::broker::Broker;
use crate::config::{GatewayConfig, SessionConfig};
use crate::error::GatewayResult;
use crate::service::{BrokerConsumer, EventRouter};
use crate::ws::{Broadcaster, ConnectionRegistry};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Every open WebSocket connection.
    pub registry: Arc<ConnectionRegistry>,
    /// Client → broker event routing.
    pub router: Arc<EventRouter>,
    /// Per-connection settings.
    pub session: SessionConfig,
}

impl AppState {
    /// Wires a fresh registry and router over `broker`.
    #[must_use]
    pub fn new(broker: Arc<dyn Broker>, config: &GatewayConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = EventRouter::new(
            broker,
            Broadcaster::new(Arc::clone(&registry)),
            config.topics.clone(),
            config.wire_format,
        );
        Self {
            registry,
            router: Arc::new(router),
            session: config.session,
        }
    }

    /// Returns a broadcaster over this state's registry.
    #[must_use]
    pub fn broadcaster(&self) -> Broadcaster {
        Broadcaster::new(Arc::clone(&self.registry))
    }

    /// Subscribes a [`BrokerConsumer`] to `queue` so broker deliveries reach
    /// every connection.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::GatewayError::Consume`] if the broker refused
    /// the consumer.
    pub async fn start_consumer(&self, broker: &dyn Broker, queue: &str) -> GatewayResult<()> {
        let consumer = Arc::new(BrokerConsumer::new(self.broadcaster()));
        broker.subscribe(queue, consumer).await
    }
}
