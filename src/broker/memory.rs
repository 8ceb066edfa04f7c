//! In-memory broker for single-process runs and tests.
//!
//! Emulates the subset of AMQP the bridge relies on: exchanges bound to
//! queues with an empty routing key, one consumer per queue, auto-ack.
//! Every publish is also recorded so tests can assert on it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::Instrument;

use super::{Broker, DeliveryHandler};
use crate::error::{GatewayError, GatewayResult};

/// One recorded publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    /// Target exchange.
    pub exchange: String,
    /// Message text.
    pub message: String,
}

#[derive(Debug, Default)]
struct State {
    /// Exchange name → bound queue names.
    bindings: HashMap<String, Vec<String>>,
    /// Queue name → consumer.
    consumers: HashMap<String, Arc<dyn DeliveryHandler>>,
    published: Vec<Published>,
}

/// In-process [`Broker`] implementation.
#[derive(Debug, Default)]
pub struct MemoryBroker {
    state: Mutex<State>,
    fail_publishes: AtomicBool,
    refuse_consumers: AtomicBool,
}

impl MemoryBroker {
    /// Creates an empty broker with no topology.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent publish fail with [`GatewayError::Publish`].
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent subscribe fail with [`GatewayError::Consume`].
    pub fn refuse_consumers(&self, refuse: bool) {
        self.refuse_consumers.store(refuse, Ordering::SeqCst);
    }

    /// Returns every successful publish so far, oldest first.
    #[must_use]
    pub fn published(&self) -> Vec<Published> {
        self.lock().published.clone()
    }

    /// Returns `true` if a consumer is registered on `queue`.
    #[must_use]
    pub fn has_consumer(&self, queue: &str) -> bool {
        self.lock().consumers.contains_key(queue)
    }

    /// Delivers `body` directly to the consumer of `queue`, as if another
    /// service had published it. Returns `false` if nobody consumes `queue`.
    pub async fn deliver(&self, queue: &str, body: &str) -> bool {
        let handler = self.lock().consumers.get(queue).map(Arc::clone);
        let Some(handler) = handler else {
            return false;
        };
        let span = tracing::info_span!("broker.consume", queue, body);
        handler.on_delivery(body.to_string()).instrument(span).await;
        true
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn declare_topology(&self, exchange: &str, queue: &str) -> GatewayResult<()> {
        let mut state = self.lock();
        let bound = state.bindings.entry(exchange.to_string()).or_default();
        if !bound.iter().any(|q| q == queue) {
            bound.push(queue.to_string());
        }
        tracing::info!(exchange, queue, "broker topology declared");
        Ok(())
    }

    async fn declare_exchange(&self, exchange: &str) -> GatewayResult<()> {
        self.lock().bindings.entry(exchange.to_string()).or_default();
        Ok(())
    }

    async fn publish(&self, exchange: &str, message: &str) -> GatewayResult<()> {
        let span = tracing::info_span!("broker.publish", exchange, message);
        let targets = span.in_scope(|| {
            if self.fail_publishes.load(Ordering::SeqCst) {
                tracing::error!("failed to publish message");
                return Err(GatewayError::Publish {
                    exchange: exchange.to_string(),
                    reason: "publishing disabled".to_string(),
                });
            }

            let mut state = self.lock();
            state.published.push(Published {
                exchange: exchange.to_string(),
                message: message.to_string(),
            });
            tracing::info!("message published");
            Ok(state
                .bindings
                .get(exchange)
                .into_iter()
                .flatten()
                .filter_map(|queue| state.consumers.get(queue).map(Arc::clone))
                .collect::<Vec<_>>())
        })?;

        for handler in targets {
            let consume_span = tracing::info_span!("broker.consume", exchange, body = message);
            handler
                .on_delivery(message.to_string())
                .instrument(consume_span)
                .await;
        }
        Ok(())
    }

    async fn subscribe(&self, queue: &str, handler: Arc<dyn DeliveryHandler>) -> GatewayResult<()> {
        if self.refuse_consumers.load(Ordering::SeqCst) {
            tracing::error!(queue, "failed to start consumer");
            return Err(GatewayError::Consume {
                queue: queue.to_string(),
                reason: "consumers refused".to_string(),
            });
        }
        self.lock().consumers.insert(queue.to_string(), handler);
        tracing::info!(queue, "started consuming messages");
        Ok(())
    }

    async fn close(&self) -> GatewayResult<()> {
        self.lock().consumers.clear();
        tracing::info!("in-memory broker closed");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[derive(Debug, Default)]
    struct Recorder {
        bodies: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DeliveryHandler for Recorder {
        async fn on_delivery(&self, body: String) {
            self.bodies
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(body);
        }
    }

    impl Recorder {
        fn bodies(&self) -> Vec<String> {
            self.bodies
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }
    }

    #[tokio::test]
    async fn publish_is_recorded() {
        let broker = MemoryBroker::new();
        assert_ok!(broker.publish("message_notifications", "message:u1:hi").await);
        assert_eq!(
            broker.published(),
            vec![Published {
                exchange: "message_notifications".into(),
                message: "message:u1:hi".into(),
            }]
        );
    }

    #[tokio::test]
    async fn bound_exchange_routes_to_consumer() {
        let broker = MemoryBroker::new();
        let recorder = Arc::new(Recorder::default());
        assert_ok!(broker.declare_topology("user_exchange", "user_tasks").await);
        assert_ok!(
            broker
                .subscribe("user_tasks", Arc::clone(&recorder) as Arc<dyn DeliveryHandler>)
                .await
        );

        assert_ok!(broker.publish("user_exchange", "logout:u1").await);
        assert_ok!(broker.publish("other_exchange", "logout:u2").await);

        assert_eq!(recorder.bodies(), vec!["logout:u1".to_string()]);
    }

    #[tokio::test]
    async fn declare_topology_is_idempotent() {
        let broker = MemoryBroker::new();
        let recorder = Arc::new(Recorder::default());
        assert_ok!(broker.declare_topology("x", "q").await);
        assert_ok!(broker.declare_topology("x", "q").await);
        assert_ok!(
            broker
                .subscribe("q", Arc::clone(&recorder) as Arc<dyn DeliveryHandler>)
                .await
        );
        assert_ok!(broker.publish("x", "status:u1:away").await);
        assert_eq!(recorder.bodies().len(), 1);
    }

    #[tokio::test]
    async fn failing_publish_is_not_recorded() {
        let broker = MemoryBroker::new();
        broker.fail_publishes(true);
        let result = broker.publish("x", "logout:u1").await;
        assert!(matches!(result, Err(GatewayError::Publish { .. })));
        assert!(broker.published().is_empty());
    }

    #[tokio::test]
    async fn deliver_without_consumer_returns_false() {
        let broker = MemoryBroker::new();
        assert!(!broker.deliver("user_tasks", "logout:u1").await);

        broker.refuse_consumers(true);
        let recorder: Arc<dyn DeliveryHandler> = Arc::new(Recorder::default());
        assert_err!(broker.subscribe("user_tasks", recorder).await);
        assert!(!broker.has_consumer("user_tasks"));
    }
}
