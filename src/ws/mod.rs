//! WebSocket layer: upgrade handling, per-connection loops, the connection
//! registry, and broadcast.
//!
//! The endpoint at `/ws` accepts client envelopes and pushes every broadcast
//! (client-originated or broker-sourced) to all connected clients.

pub mod broadcast;
pub mod connection;
pub mod handle;
pub mod handler;
pub mod heartbeat;
pub mod registry;

pub use broadcast::{BroadcastReport, Broadcaster};
pub use handle::{ConnectionHandle, Outbound};
pub use registry::{ConnectionRegistry, Registration};
