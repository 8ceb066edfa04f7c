//! AMQP 0.9.1 broker adapter built on `lapin`.

use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::{FieldTable, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer, ExchangeKind};
use tracing::Instrument;

use super::{Broker, DeliveryHandler};
use crate::error::{GatewayError, GatewayResult};

/// Reply code sent with a normal channel/connection close.
const REPLY_SUCCESS: u16 = 200;

/// One transport connection plus one channel over it.
#[derive(Debug)]
pub struct AmqpBroker {
    connection: Connection,
    channel: Channel,
}

impl AmqpBroker {
    /// Connects to the broker at `url` and opens a channel.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Connection`] if the broker is unreachable or
    /// the channel cannot be opened.
    pub async fn connect(url: &str) -> GatewayResult<Self> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to connect to broker");
                GatewayError::Connection(e.to_string())
            })?;

        let channel = match connection.create_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                tracing::error!(error = %e, "failed to open broker channel");
                let _ = connection.close(REPLY_SUCCESS, "channel open failed").await;
                return Err(GatewayError::Connection(e.to_string()));
            }
        };

        tracing::info!("connected to broker");
        Ok(Self {
            connection,
            channel,
        })
    }

    fn exchange_options() -> ExchangeDeclareOptions {
        ExchangeDeclareOptions {
            durable: true,
            ..ExchangeDeclareOptions::default()
        }
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn declare_topology(&self, exchange: &str, queue: &str) -> GatewayResult<()> {
        self.declare_exchange(exchange).await?;

        let declared = self
            .channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                tracing::error!(queue, error = %e, "failed to declare queue");
                GatewayError::Topology(format!("queue {queue}: {e}"))
            })?;

        self.channel
            .queue_bind(
                declared.name().as_str(),
                exchange,
                "",
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                tracing::error!(queue, exchange, error = %e, "failed to bind queue");
                GatewayError::Topology(format!("binding {queue} -> {exchange}: {e}"))
            })?;

        tracing::info!(exchange, queue, "broker topology declared");
        Ok(())
    }

    async fn declare_exchange(&self, exchange: &str) -> GatewayResult<()> {
        self.channel
            .exchange_declare(
                exchange,
                ExchangeKind::Direct,
                Self::exchange_options(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                tracing::error!(exchange, error = %e, "failed to declare exchange");
                GatewayError::Topology(format!("exchange {exchange}: {e}"))
            })
    }

    async fn publish(&self, exchange: &str, message: &str) -> GatewayResult<()> {
        let span = tracing::info_span!("broker.publish", exchange, message);
        async {
            let properties =
                BasicProperties::default().with_content_type(ShortString::from("text/plain"));
            let result = async {
                self.channel
                    .basic_publish(
                        exchange,
                        "",
                        BasicPublishOptions::default(),
                        message.as_bytes(),
                        properties,
                    )
                    .await?
                    .await
            }
            .await;

            match result {
                Ok(_) => {
                    tracing::info!("message published");
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to publish message");
                    Err(GatewayError::Publish {
                        exchange: exchange.to_string(),
                        reason: e.to_string(),
                    })
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn subscribe(&self, queue: &str, handler: Arc<dyn DeliveryHandler>) -> GatewayResult<()> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                "",
                BasicConsumeOptions {
                    no_ack: true,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                tracing::error!(queue, error = %e, "failed to start consumer");
                GatewayError::Consume {
                    queue: queue.to_string(),
                    reason: e.to_string(),
                }
            })?;

        tokio::spawn(consume_loop(consumer, queue.to_string(), handler));
        tracing::info!(queue, "started consuming messages");
        Ok(())
    }

    async fn close(&self) -> GatewayResult<()> {
        if let Err(e) = self.channel.close(REPLY_SUCCESS, "gateway shutdown").await {
            tracing::warn!(error = %e, "failed to close broker channel");
        }
        self.connection
            .close(REPLY_SUCCESS, "gateway shutdown")
            .await
            .map_err(|e| GatewayError::Connection(e.to_string()))?;
        tracing::info!("broker connection closed");
        Ok(())
    }
}

/// Drains `consumer` until the delivery stream ends, invoking `handler` once
/// per message. Deliveries are already acknowledged (`no_ack`).
async fn consume_loop(mut consumer: Consumer, queue: String, handler: Arc<dyn DeliveryHandler>) {
    while let Some(delivery) = consumer.next().await {
        match delivery {
            Ok(delivery) => {
                let (body, lossy) = body_text(&delivery.data);
                if lossy {
                    tracing::warn!(
                        queue = %queue,
                        bytes = delivery.data.len(),
                        "broker delivery is not valid UTF-8, invalid bytes replaced"
                    );
                }
                let span = tracing::info_span!("broker.consume", queue = %queue, body = %body);
                handler.on_delivery(body).instrument(span).await;
            }
            Err(e) => {
                tracing::error!(queue = %queue, error = %e, "broker delivery stream failed");
                break;
            }
        }
    }
    tracing::warn!(queue = %queue, "broker consumer stopped");
}

/// Converts a delivery body to text. The flag is `true` when invalid UTF-8
/// had to be replaced.
fn body_text(data: &[u8]) -> (String, bool) {
    match String::from_utf8_lossy(data) {
        Cow::Borrowed(text) => (text.to_string(), false),
        Cow::Owned(text) => (text, true),
    }
}
