//! # shopper-gateway
//!
//! Real-time event bridge between WebSocket clients and an AMQP message
//! broker.
//!
//! Clients send typed JSON envelopes (`logout`, `message`, `status_update`).
//! Each recognized event is encoded as a broker message, published to the
//! topic exchange for its kind and broadcast to every connected client.
//! Messages consumed from the bound broker queue are broadcast to every
//! client unchanged.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket /ws, HTTP /health)
//!     │
//!     ├── WS Handler + per-connection loops (ws/)
//!     │
//!     ├── EventRouter ──────► Broker::publish (topic exchanges)
//!     │        │
//!     │        ▼
//!     ├── Broadcaster ◄────── BrokerConsumer ◄── Broker::subscribe (queue)
//!     │        │
//!     │        ▼
//!     └── ConnectionRegistry (ws/)
//!
//! Broker = AmqpBroker (lapin) | MemoryBroker (in-process)
//! ```

pub mod api;
pub mod app_state;
pub mod broker;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod ws;
