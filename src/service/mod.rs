//! Service layer: the two directions of the bridge.
//!
//! [`EventRouter`] handles client → broker traffic, [`BrokerConsumer`]
//! handles broker → client traffic. Both deliver through the shared
//! [`crate::ws::Broadcaster`].

pub mod consumer;
pub mod event_router;

pub use consumer::{BrokerConsumer, DeliveryHook, NoopHook};
pub use event_router::{EventRouter, RouteOutcome};
