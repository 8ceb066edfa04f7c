//! Broker adapter: the seam between the bridge and the message broker.
//!
//! [`Broker`] is implemented by [`AmqpBroker`] for a real AMQP 0.9.1 broker
//! and by [`MemoryBroker`] for in-process use (tests, `RABBITMQ_URL=memory`).
//!
//! Consumption is at-most-once: deliveries are acknowledged on receipt, so a
//! crash between receipt and broadcast loses the message.

pub mod amqp;
pub mod memory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

pub use amqp::AmqpBroker;
pub use memory::MemoryBroker;

use crate::error::GatewayResult;

/// Callback invoked once per message delivered to a subscribed queue.
#[async_trait]
pub trait DeliveryHandler: Send + Sync + fmt::Debug {
    /// Handles one message body. The ambient tracing span carries the queue
    /// and body.
    async fn on_delivery(&self, body: String);
}

/// A single logical broker connection.
#[async_trait]
pub trait Broker: Send + Sync + fmt::Debug {
    /// Ensures `exchange` (direct, durable), the durable `queue`, and a binding
    /// between them with an empty routing key exist.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::GatewayError::Topology`] if any declaration fails.
    async fn declare_topology(&self, exchange: &str, queue: &str) -> GatewayResult<()>;

    /// Ensures a publish-only exchange exists, without binding it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::GatewayError::Topology`] if the declaration fails.
    async fn declare_exchange(&self, exchange: &str) -> GatewayResult<()>;

    /// Publishes `message` as text to `exchange` with an empty routing key.
    /// Never retries.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::GatewayError::Publish`] if the broker rejects it.
    async fn publish(&self, exchange: &str, message: &str) -> GatewayResult<()>;

    /// Starts a background consumer on `queue` and returns once it is
    /// registered. Failures during consumption are only logged.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::GatewayError::Consume`] if the consumer could
    /// not be registered.
    async fn subscribe(&self, queue: &str, handler: Arc<dyn DeliveryHandler>) -> GatewayResult<()>;

    /// Releases the channel and the underlying connection. The owner calls
    /// this exactly once, at shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::GatewayError::Connection`] if the broker did
    /// not acknowledge the close.
    async fn close(&self) -> GatewayResult<()>;
}
