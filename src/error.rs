//! Gateway error taxonomy.
//!
//! [`GatewayError`] covers every failure the bridge can observe. Only the
//! startup variants ([`GatewayError::Connection`], [`GatewayError::Topology`],
//! [`GatewayError::Config`]) are fatal; the runtime variants are logged and
//! recovered where they occur.
//!
//! | Variant      | Raised by                          | Policy                          |
//! |--------------|------------------------------------|---------------------------------|
//! | `Connection` | broker connect                     | fatal, process exits            |
//! | `Topology`   | exchange/queue/binding declaration | fatal, process exits            |
//! | `Config`     | environment parsing                | fatal, process exits            |
//! | `Publish`    | broker publish                     | logged, event still broadcast   |
//! | `Parse`      | envelope / broker message decoding | logged, single event dropped    |
//! | `Delivery`   | per-connection outbound queue      | connection closed and removed   |
//! | `Consume`    | starting a broker consumer         | logged, no live broker events   |

/// Convenience alias used throughout the crate.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Server-side error enum for the event bridge.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The broker could not be reached or a channel could not be opened.
    #[error("broker connection failed: {0}")]
    Connection(String),

    /// Declaring the exchange, queue, or binding failed.
    #[error("topology declaration failed: {0}")]
    Topology(String),

    /// The broker rejected a publish.
    #[error("publish to {exchange} failed: {reason}")]
    Publish {
        /// Target exchange.
        exchange: String,
        /// Broker-reported reason.
        reason: String,
    },

    /// A client envelope or broker message could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),

    /// A payload could not be handed to a connection.
    #[error("delivery to connection {conn_id} failed: {reason}")]
    Delivery {
        /// Connection that refused the payload.
        conn_id: crate::domain::ConnectionId,
        /// Why the outbound queue refused it.
        reason: &'static str,
    },

    /// A broker consumer could not be started.
    #[error("consume from {queue} failed: {reason}")]
    Consume {
        /// Queue the consumer was registered on.
        queue: String,
        /// Broker-reported reason.
        reason: String,
    },

    /// Invalid process configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl GatewayError {
    /// Short machine-readable label, recorded as the `error_kind` log field.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Topology(_) => "topology",
            Self::Publish { .. } => "publish",
            Self::Parse(_) => "parse",
            Self::Delivery { .. } => "delivery",
            Self::Consume { .. } => "consume",
            Self::Config(_) => "config",
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::ConnectionId;

    #[test]
    fn kind_labels_each_variant() {
        assert_eq!(GatewayError::Connection("refused".into()).kind(), "connection");
        assert_eq!(GatewayError::Topology("denied".into()).kind(), "topology");
        assert_eq!(GatewayError::Config("bad addr".into()).kind(), "config");
        let publish = GatewayError::Publish {
            exchange: "logout_notifications".into(),
            reason: "channel closed".into(),
        };
        assert_eq!(publish.kind(), "publish");
        let delivery = GatewayError::Delivery {
            conn_id: ConnectionId::new(),
            reason: "closed",
        };
        assert_eq!(delivery.kind(), "delivery");
    }

    #[test]
    fn json_errors_become_parse_errors() {
        let err = serde_json::from_str::<serde_json::Value>("{").err();
        let Some(err) = err else {
            panic!("expected a json error");
        };
        let converted = GatewayError::from(err);
        assert_eq!(converted.kind(), "parse");
    }

    #[test]
    fn display_includes_context() {
        let err = GatewayError::Consume {
            queue: "user_tasks".into(),
            reason: "access refused".into(),
        };
        assert_eq!(err.to_string(), "consume from user_tasks failed: access refused");
    }
}
