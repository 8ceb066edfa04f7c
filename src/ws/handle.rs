//! Handle to a single registered WebSocket connection.
//!
//! The handle is what the registry stores and what broadcasts write to. It
//! never touches the socket directly: payloads go into a bounded outbound
//! queue that the connection's writer drains, so a delivery attempt never
//! waits on a slow client.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::ConnectionId;
use crate::error::{GatewayError, GatewayResult};

/// A frame queued for a connection's writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A text frame. Shared so one broadcast payload is allocated once.
    Text(Arc<str>),
    /// A keepalive ping.
    Ping,
}

/// Registry-side view of one open connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: mpsc::Sender<Outbound>,
    cancel: CancellationToken,
}

impl ConnectionHandle {
    /// Creates a handle with an outbound queue of `capacity` frames and
    /// returns the receiving end for the connection's writer.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let handle = Self {
            id: ConnectionId::new(),
            sender,
            cancel: CancellationToken::new(),
        };
        (handle, receiver)
    }

    /// Returns the connection's identity.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues a frame without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Delivery`] if the connection is closed or its
    /// outbound queue is full.
    pub fn try_deliver(&self, frame: Outbound) -> GatewayResult<()> {
        if self.is_closed() {
            return Err(self.delivery_error("connection closed"));
        }
        self.sender.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => self.delivery_error("outbound queue full"),
            mpsc::error::TrySendError::Closed(_) => self.delivery_error("writer gone"),
        })
    }

    /// Signals the connection task to shut down. Safe to call repeatedly.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once [`Self::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the connection has been closed.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }

    fn delivery_error(&self, reason: &'static str) -> GatewayError {
        GatewayError::Delivery {
            conn_id: self.id,
            reason,
        }
    }
}
