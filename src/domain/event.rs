//! Inbound client envelopes and the typed events carried inside them.
//!
//! Clients send JSON of the shape `{"type": "...", "data": {...}}`. The
//! envelope is parsed first; the type tag then selects which payload shape
//! `data` must have. Unknown tags are structurally valid envelopes that the
//! router ignores.

use serde::{Deserialize, Serialize};

use super::BrokerMessage;
use crate::error::{GatewayError, GatewayResult};

/// Structured inbound client message: a type tag plus type-specific data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event type discriminator. Never empty once parsed.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Type-specific payload, left unparsed until dispatch.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Envelope {
    /// Parses raw frame bytes into an envelope.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Parse`] if the bytes are not a JSON object with
    /// a string `type`, or if `type` is empty.
    pub fn parse(raw: &[u8]) -> GatewayResult<Self> {
        let envelope: Self = serde_json::from_slice(raw)?;
        if envelope.event_type.is_empty() {
            return Err(GatewayError::Parse("envelope type is empty".to_string()));
        }
        Ok(envelope)
    }

    /// Returns the recognized kind of this envelope, if any.
    #[must_use]
    pub fn kind(&self) -> Option<EventKind> {
        EventKind::from_tag(&self.event_type)
    }
}

/// The event types the router knows how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `logout`
    Logout,
    /// `message`
    Message,
    /// `status_update`
    StatusUpdate,
}

impl EventKind {
    /// Maps an envelope type tag to a kind.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "logout" => Some(Self::Logout),
            "message" => Some(Self::Message),
            "status_update" => Some(Self::StatusUpdate),
            _ => None,
        }
    }

    /// Returns the envelope type tag for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Logout => "logout",
            Self::Message => "message",
            Self::StatusUpdate => "status_update",
        }
    }
}

#[derive(Debug, Deserialize)]
struct LogoutData {
    user_id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageData {
    user_id: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct StatusData {
    user_id: String,
    status: String,
}

/// A validated client-originated event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The user logged out. `email` is present in the extended variant.
    Logout {
        /// Opaque user identifier.
        user_id: String,
        /// Optional email of the user.
        email: Option<String>,
    },
    /// A chat-style message from the user.
    Message {
        /// Opaque user identifier.
        user_id: String,
        /// Message text.
        content: String,
    },
    /// The user's presence status changed.
    StatusUpdate {
        /// Opaque user identifier.
        user_id: String,
        /// New status label (e.g. `"away"`).
        status: String,
    },
}

impl ClientEvent {
    /// Parses the envelope's `data` according to `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Parse`] if a required field is missing, has the
    /// wrong JSON type, or if `user_id` is empty.
    pub fn parse(kind: EventKind, data: &serde_json::Value) -> GatewayResult<Self> {
        let event = match kind {
            EventKind::Logout => {
                let d = LogoutData::deserialize(data)?;
                Self::Logout {
                    user_id: d.user_id,
                    email: d.email.filter(|e| !e.is_empty()),
                }
            }
            EventKind::Message => {
                let d = MessageData::deserialize(data)?;
                Self::Message {
                    user_id: d.user_id,
                    content: d.content,
                }
            }
            EventKind::StatusUpdate => {
                let d = StatusData::deserialize(data)?;
                Self::StatusUpdate {
                    user_id: d.user_id,
                    status: d.status,
                }
            }
        };
        if event.user_id().is_empty() {
            return Err(GatewayError::Parse(format!(
                "{} event has an empty user_id",
                kind.as_str()
            )));
        }
        Ok(event)
    }

    /// Returns the kind of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Logout { .. } => EventKind::Logout,
            Self::Message { .. } => EventKind::Message,
            Self::StatusUpdate { .. } => EventKind::StatusUpdate,
        }
    }

    /// Returns the user the event belongs to.
    #[must_use]
    pub fn user_id(&self) -> &str {
        match self {
            Self::Logout { user_id, .. }
            | Self::Message { user_id, .. }
            | Self::StatusUpdate { user_id, .. } => user_id,
        }
    }

    /// Converts the event into the message published on the broker.
    #[must_use]
    pub fn to_broker_message(&self) -> BrokerMessage {
        match self {
            Self::Logout { user_id, email } => BrokerMessage::Logout {
                user_id: user_id.clone(),
                email: email.clone(),
            },
            Self::Message { user_id, content } => BrokerMessage::Message {
                user_id: user_id.clone(),
                content: content.clone(),
            },
            Self::StatusUpdate { user_id, status } => BrokerMessage::Status {
                user_id: user_id.clone(),
                status: status.clone(),
            },
        }
    }
}
