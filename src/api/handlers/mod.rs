//! HTTP endpoint handlers.

pub mod system;

pub use system::HealthResponse;
