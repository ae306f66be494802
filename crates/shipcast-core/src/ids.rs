//! Branded ID newtypes.
//!
//! Connection and message IDs are UUID v7 strings wrapped in distinct
//! types so one cannot be passed where the other is expected. Shipment IDs
//! come from the persistent store and are plain integers on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

fn new_v7() -> String {
    Uuid::now_v7().to_string()
}

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new random ID (prefixed UUID v7, time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(format!("{}{}", $prefix, new_v7()))
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

branded_id! {
    /// Unique identifier for a live WebSocket connection.
    ConnectionId, "conn_"
}

branded_id! {
    /// Unique identifier carried by every wire message.
    MessageId, "msg_"
}

/// Identifier of a trackable shipment, as assigned by the persistent store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShipmentId(i64);

impl ShipmentId {
    /// Wrap a raw store identifier.
    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// The raw integer value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for ShipmentId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ShipmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_is_prefixed_uuid_v7() {
        let id = ConnectionId::new();
        let raw = id.as_str().strip_prefix("conn_").expect("prefix");
        let parsed = Uuid::parse_str(raw).expect("should be valid UUID");
        assert_eq!(parsed.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn message_ids_are_unique() {
        let a = MessageId::new();
        let b = MessageId::new();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("msg_"));
    }

    #[test]
    fn from_client_supplied_string() {
        let id = MessageId::from("client-42");
        assert_eq!(id.as_str(), "client-42");
        assert_eq!(format!("{id}"), "client-42");
    }

    #[test]
    fn message_id_serializes_transparently() {
        let id = MessageId::from("m-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"m-1\"");
    }

    #[test]
    fn shipment_id_is_a_bare_integer_on_the_wire() {
        let id = ShipmentId::new(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
        let back: ShipmentId = serde_json::from_str("7").unwrap();
        assert_eq!(back.get(), 7);
    }

    #[test]
    fn shipment_id_rejects_strings() {
        assert!(serde_json::from_str::<ShipmentId>("\"7\"").is_err());
    }
}
