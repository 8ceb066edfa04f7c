//! Messages exchanged with the broker and their wire encodings.
//!
//! Two encodings are supported:
//!
//! - [`WireFormat::Colon`]: the legacy `"<type>:<field1>[:<field2>]"` text.
//!   Decoding splits on the first two colons, so only `<field2>` may contain
//!   `:`. The type and `<field1>` (the user id) never may, even when
//!   `<field2>` is absent.
//! - [`WireFormat::Tagged`]: a versioned JSON object
//!   `{"v":1,"type":"message","user_id":"u1","content":"hi"}`.
//!
//! [`BrokerMessage::decode`] accepts either form: text starting with `{` is
//! tried as tagged first, and everything else (including JSON that is not a
//! tagged frame) is read as colon-delimited.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

/// Current version of the tagged encoding.
pub const TAGGED_WIRE_VERSION: u8 = 1;

const DELIMITER: char = ':';

/// Encoding used when publishing to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    /// Colon-delimited legacy text.
    #[default]
    Colon,
    /// Versioned JSON object.
    Tagged,
}

impl FromStr for WireFormat {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "colon" => Ok(Self::Colon),
            "tagged" | "json" => Ok(Self::Tagged),
            other => Err(GatewayError::Config(format!("unknown wire format: {other}"))),
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Colon => f.write_str("colon"),
            Self::Tagged => f.write_str("tagged"),
        }
    }
}

/// A typed broker message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerMessage {
    /// `logout:<user_id>[:<email>]`
    Logout {
        /// Opaque user identifier.
        user_id: String,
        /// Optional email (extended logout variant).
        email: Option<String>,
    },
    /// `message:<user_id>:<content>`
    Message {
        /// Opaque user identifier.
        user_id: String,
        /// Message text.
        content: String,
    },
    /// `status:<user_id>:<status>`
    Status {
        /// Opaque user identifier.
        user_id: String,
        /// New status label.
        status: String,
    },
    /// A well-formed message with a type this process does not interpret.
    Other {
        /// The type prefix.
        kind: String,
        /// Remaining fields in order.
        fields: Vec<String>,
    },
}

/// Flat on-the-wire shape of the tagged encoding.
#[derive(Debug, Serialize, Deserialize)]
struct TaggedFrame {
    v: u8,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    fields: Vec<String>,
}

impl BrokerMessage {
    /// Returns the type prefix (`logout`, `message`, `status`, or the raw kind).
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Logout { .. } => "logout",
            Self::Message { .. } => "message",
            Self::Status { .. } => "status",
            Self::Other { kind, .. } => kind,
        }
    }

    /// Returns the user identifier for the known message types.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Logout { user_id, .. }
            | Self::Message { user_id, .. }
            | Self::Status { user_id, .. } => Some(user_id),
            Self::Other { .. } => None,
        }
    }

    /// Encodes the message for publishing.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Parse`] when using [`WireFormat::Colon`] and a
    /// non-final field contains the `:` delimiter, which would make the
    /// message ambiguous to decode.
    pub fn encode(&self, format: WireFormat) -> GatewayResult<String> {
        match format {
            WireFormat::Colon => self.encode_colon(),
            WireFormat::Tagged => Ok(serde_json::to_string(&self.to_frame())?),
        }
    }

    /// Decodes broker text in either encoding.
    ///
    /// Text starting with `{` is tried as a tagged frame first. If it is not a
    /// valid tagged frame it is read with the colon rule like any other text,
    /// so JSON published by other services still decodes (usually as
    /// [`BrokerMessage::Other`]).
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Parse`] only if the text has fewer than two
    /// colon-delimited parts and is not a valid tagged frame.
    pub fn decode(text: &str) -> GatewayResult<Self> {
        if text.trim_start().starts_with('{')
            && let Ok(message) = Self::decode_tagged(text)
        {
            return Ok(message);
        }
        Self::decode_colon(text)
    }

    fn encode_colon(&self) -> GatewayResult<String> {
        let mut parts: Vec<&str> = vec![self.kind()];
        match self {
            Self::Logout { user_id, email } => {
                parts.push(user_id);
                if let Some(email) = email {
                    parts.push(email);
                }
            }
            Self::Message { user_id, content } => {
                parts.push(user_id);
                parts.push(content);
            }
            Self::Status { user_id, status } => {
                parts.push(user_id);
                parts.push(status);
            }
            Self::Other { fields, .. } => parts.extend(fields.iter().map(String::as_str)),
        }

        // Decoding splits on the first two colons only, so the type and the
        // first field must be colon-free and at most two fields fit.
        if parts.len() > 3 {
            return Err(GatewayError::Parse(format!(
                "{} message with {} fields cannot be colon-encoded",
                self.kind(),
                parts.len() - 1
            )));
        }
        if let Some(bad) = parts.iter().take(2).find(|p| p.contains(DELIMITER)) {
            return Err(GatewayError::Parse(format!(
                "field {bad:?} contains the ':' delimiter"
            )));
        }
        Ok(parts.join(":"))
    }

    fn decode_colon(text: &str) -> GatewayResult<Self> {
        let mut parts = text.splitn(3, DELIMITER);
        let kind = parts.next().unwrap_or_default();
        let Some(first) = parts.next() else {
            return Err(GatewayError::Parse(format!(
                "broker message {text:?} has fewer than 2 parts"
            )));
        };
        let second = parts.next();

        let message = match kind {
            "logout" => Self::Logout {
                user_id: first.to_string(),
                email: second.map(str::to_string),
            },
            "message" => Self::Message {
                user_id: first.to_string(),
                content: second.unwrap_or_default().to_string(),
            },
            "status" => Self::Status {
                user_id: first.to_string(),
                status: second.unwrap_or_default().to_string(),
            },
            other => Self::Other {
                kind: other.to_string(),
                fields: std::iter::once(first).chain(second).map(str::to_string).collect(),
            },
        };
        Ok(message)
    }

    /// Strictly decodes a tagged frame.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Parse`] if the text is not valid JSON, carries
    /// an unsupported version, or lacks a field its type requires.
    pub fn decode_tagged(text: &str) -> GatewayResult<Self> {
        let frame: TaggedFrame = serde_json::from_str(text)?;
        if frame.v != TAGGED_WIRE_VERSION {
            return Err(GatewayError::Parse(format!(
                "unsupported wire version {}",
                frame.v
            )));
        }
        let require = |field: Option<String>, name: &str| {
            field.ok_or_else(|| {
                GatewayError::Parse(format!("tagged {} frame is missing {name}", frame.kind))
            })
        };

        let message = match frame.kind.as_str() {
            "logout" => Self::Logout {
                user_id: require(frame.user_id.clone(), "user_id")?,
                email: frame.email.clone(),
            },
            "message" => Self::Message {
                user_id: require(frame.user_id.clone(), "user_id")?,
                content: require(frame.content.clone(), "content")?,
            },
            "status" => Self::Status {
                user_id: require(frame.user_id.clone(), "user_id")?,
                status: require(frame.status.clone(), "status")?,
            },
            _ => Self::Other {
                kind: frame.kind.clone(),
                fields: frame.fields.clone(),
            },
        };
        Ok(message)
    }

    fn to_frame(&self) -> TaggedFrame {
        let mut frame = TaggedFrame {
            v: TAGGED_WIRE_VERSION,
            kind: self.kind().to_string(),
            user_id: self.user_id().map(str::to_string),
            email: None,
            content: None,
            status: None,
            fields: Vec::new(),
        };
        match self {
            Self::Logout { email, .. } => frame.email.clone_from(email),
            Self::Message { content, .. } => frame.content = Some(content.clone()),
            Self::Status { status, .. } => frame.status = Some(status.clone()),
            Self::Other { fields, .. } => frame.fields.clone_from(fields),
        }
        frame
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn message(user_id: &str, content: &str) -> BrokerMessage {
        BrokerMessage::Message {
            user_id: user_id.into(),
            content: content.into(),
        }
    }

    #[test]
    fn colon_encoding_matches_legacy_format() {
        assert_eq!(message("u1", "hi").encode(WireFormat::Colon).ok().as_deref(), Some("message:u1:hi"));

        let logout = BrokerMessage::Logout {
            user_id: "u1".into(),
            email: Some("u1@example.com".into()),
        };
        assert_eq!(
            logout.encode(WireFormat::Colon).ok().as_deref(),
            Some("logout:u1:u1@example.com")
        );

        let status = BrokerMessage::Status {
            user_id: "u1".into(),
            status: "away".into(),
        };
        assert_eq!(status.encode(WireFormat::Colon).ok().as_deref(), Some("status:u1:away"));
    }

    #[test]
    fn final_field_may_contain_delimiter() {
        let Ok(text) = message("u1", "see you at 10:30").encode(WireFormat::Colon) else {
            panic!("content may contain colons");
        };
        let Ok(decoded) = BrokerMessage::decode(&text) else {
            panic!("decodes");
        };
        assert_eq!(decoded, message("u1", "see you at 10:30"));
    }

    #[test]
    fn leading_field_with_delimiter_is_rejected_in_colon_format() {
        let result = message("tenant:u1", "hi").encode(WireFormat::Colon);
        assert!(matches!(result, Err(GatewayError::Parse(_))));
        // The tagged format has no such restriction.
        assert!(message("tenant:u1", "hi").encode(WireFormat::Tagged).is_ok());
    }

    #[test]
    fn decode_requires_two_parts() {
        assert!(BrokerMessage::decode("logout").is_err());
        assert!(BrokerMessage::decode("").is_err());
        assert!(BrokerMessage::decode("logout:u1").is_ok());
    }

    #[test]
    fn decode_keeps_unknown_kinds() {
        let Ok(decoded) = BrokerMessage::decode("login:u1:now") else {
            panic!("two or more parts decode");
        };
        assert_eq!(
            decoded,
            BrokerMessage::Other {
                kind: "login".into(),
                fields: vec!["u1".into(), "now".into()],
            }
        );
        assert_eq!(decoded.user_id(), None);
    }

    #[test]
    fn tagged_encoding_is_versioned() {
        let Ok(text) = message("u1", "hi").encode(WireFormat::Tagged) else {
            panic!("encodes");
        };
        assert_eq!(text, r#"{"v":1,"type":"message","user_id":"u1","content":"hi"}"#);
        let Ok(decoded) = BrokerMessage::decode(&text) else {
            panic!("decodes");
        };
        assert_eq!(decoded, message("u1", "hi"));
    }

    #[test]
    fn strict_tagged_rejects_unknown_version_and_missing_fields() {
        assert!(BrokerMessage::decode_tagged(r#"{"v":2,"type":"logout","user_id":"u1"}"#).is_err());
        assert!(BrokerMessage::decode_tagged(r#"{"v":1,"type":"status","user_id":"u1"}"#).is_err());
        assert!(BrokerMessage::decode_tagged(r#"{"v":1,"type":"message""#).is_err());
    }

    #[test]
    fn foreign_json_falls_back_to_colon_rule() {
        let Ok(decoded) = BrokerMessage::decode(r#"{"event":"order_created","id":"42"}"#) else {
            panic!("three colon parts decode");
        };
        assert!(matches!(decoded, BrokerMessage::Other { .. }));

        let Ok(decoded) = BrokerMessage::decode(r#"{"v":9,"type":"logout"}"#) else {
            panic!("unsupported tagged version still has colon parts");
        };
        assert!(matches!(decoded, BrokerMessage::Other { .. }));

        assert!(BrokerMessage::decode("{}").is_err());
    }

    #[test]
    fn user_id_with_delimiter_is_rejected_without_email() {
        let logout = BrokerMessage::Logout {
            user_id: "tenant:u1".into(),
            email: None,
        };
        assert!(matches!(
            logout.encode(WireFormat::Colon),
            Err(GatewayError::Parse(_))
        ));

        let with_email = BrokerMessage::Logout {
            user_id: "u1".into(),
            email: Some("odd:mail@example.com".into()),
        };
        let Ok(text) = with_email.encode(WireFormat::Colon) else {
            panic!("email is the final field");
        };
        assert_eq!(BrokerMessage::decode(&text).ok(), Some(with_email));
    }

    #[test]
    fn other_with_more_than_two_fields_is_not_colon_encodable() {
        let other = BrokerMessage::Other {
            kind: "login".into(),
            fields: vec!["u1".into(), "a".into(), "b".into()],
        };
        assert!(other.encode(WireFormat::Colon).is_err());
        assert!(other.encode(WireFormat::Tagged).is_ok());
    }

    #[test]
    fn wire_format_from_str() {
        assert_eq!("colon".parse::<WireFormat>().ok(), Some(WireFormat::Colon));
        assert_eq!("TAGGED".parse::<WireFormat>().ok(), Some(WireFormat::Tagged));
        assert!("xml".parse::<WireFormat>().is_err());
    }
}
