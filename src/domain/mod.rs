//! Domain layer: connection identity, client events, and broker messages.
//!
//! This module contains the data model shared by the router, the broadcast
//! engine, and the broker adapter. Nothing here performs I/O.

pub mod broker_message;
pub mod connection_id;
pub mod event;

pub use broker_message::{BrokerMessage, WireFormat};
pub use connection_id::ConnectionId;
pub use event::{ClientEvent, Envelope, EventKind};
