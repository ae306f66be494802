//! Wire protocol: JSON messages exchanged over the tracking WebSocket.
//!
//! Every frame is a [`Message`]: a `type`-tagged [`MessageKind`] flattened
//! next to the common `timestamp` (RFC3339) and `messageId` fields.
//!
//! ```json
//! {"type":"subscribe_shipment","shipmentId":7,"timestamp":"2026-01-01T00:00:00Z","messageId":"m-1"}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::RelayError;
use crate::ids::{MessageId, ShipmentId};
use crate::shipment::{GeoLocation, ShipmentUpdate};

/// Topic category every tracking connection is subscribed to.
pub const TRACKING_TOPIC: &str = "shipment_tracking";

/// A complete wire message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Kind tag plus kind-specific fields.
    #[serde(flatten)]
    pub kind: MessageKind,
    /// When the message was created.
    pub timestamp: DateTime<Utc>,
    /// Unique id of this message.
    pub message_id: MessageId,
}

/// The closed set of message kinds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum MessageKind {
    /// Client request to start receiving updates for a shipment.
    #[serde(rename = "subscribe_shipment")]
    Subscribe {
        /// Target shipment.
        shipment_id: ShipmentId,
    },

    /// Client request to stop receiving updates for a shipment.
    #[serde(rename = "unsubscribe_shipment")]
    Unsubscribe {
        /// Target shipment.
        shipment_id: ShipmentId,
    },

    /// A new status update for a shipment.
    #[serde(rename = "shipment_update")]
    Update {
        /// Shipment the update belongs to.
        shipment_id: ShipmentId,
        /// The update record.
        update: ShipmentUpdate,
    },

    /// A status transition.
    #[serde(rename = "shipment_status_change")]
    StatusChange {
        /// Shipment that changed status.
        shipment_id: ShipmentId,
        /// Status before the transition.
        previous_status: String,
        /// Status after the transition.
        new_status: String,
        /// Free-text description of the transition.
        description: String,
    },

    /// A geolocation ping.
    #[serde(rename = "shipment_location_update")]
    LocationUpdate {
        /// Shipment that moved.
        shipment_id: ShipmentId,
        /// Where it is now.
        location: GeoLocation,
    },

    /// Several self-describing update messages delivered together.
    #[serde(rename = "batch_update")]
    BatchUpdate {
        /// Update, status-change, or location messages. Subscribe replays
        /// are newest first; producer batches keep the producer's order.
        updates: Vec<Message>,
    },

    /// Failure report, correlated to a request when possible.
    #[serde(rename = "error")]
    Error {
        /// Human-readable description.
        error: String,
        /// Numeric error code (400, 401, 404, 500).
        code: u16,
        /// Id of the message that caused the error.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        original_message_id: Option<MessageId>,
    },

    /// Positive acknowledgement of a request.
    #[serde(rename = "ack")]
    Ack {
        /// Id of the acknowledged request.
        original_message_id: MessageId,
    },
}

impl MessageKind {
    /// Wire tag for this kind.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Subscribe { .. } => "subscribe_shipment",
            Self::Unsubscribe { .. } => "unsubscribe_shipment",
            Self::Update { .. } => "shipment_update",
            Self::StatusChange { .. } => "shipment_status_change",
            Self::LocationUpdate { .. } => "shipment_location_update",
            Self::BatchUpdate { .. } => "batch_update",
            Self::Error { .. } => "error",
            Self::Ack { .. } => "ack",
        }
    }

    /// Shipment referenced by this kind, if any.
    pub fn shipment_id(&self) -> Option<ShipmentId> {
        match self {
            Self::Subscribe { shipment_id }
            | Self::Unsubscribe { shipment_id }
            | Self::Update { shipment_id, .. }
            | Self::StatusChange { shipment_id, .. }
            | Self::LocationUpdate { shipment_id, .. } => Some(*shipment_id),
            Self::BatchUpdate { .. } | Self::Error { .. } | Self::Ack { .. } => None,
        }
    }

    /// Whether this kind may appear inside a batch (and in the update cache).
    pub fn is_update(&self) -> bool {
        matches!(
            self,
            Self::Update { .. } | Self::StatusChange { .. } | Self::LocationUpdate { .. }
        )
    }
}

impl Message {
    /// Wrap a kind with a fresh id and the current UTC time.
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            message_id: MessageId::new(),
        }
    }

    /// Build a `shipment_update` message.
    pub fn update(shipment_id: ShipmentId, update: ShipmentUpdate) -> Self {
        Self::new(MessageKind::Update {
            shipment_id,
            update,
        })
    }

    /// Build a `shipment_status_change` message.
    pub fn status_change(
        shipment_id: ShipmentId,
        previous_status: impl Into<String>,
        new_status: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self::new(MessageKind::StatusChange {
            shipment_id,
            previous_status: previous_status.into(),
            new_status: new_status.into(),
            description: description.into(),
        })
    }

    /// Build a `shipment_location_update` message.
    pub fn location_update(shipment_id: ShipmentId, location: GeoLocation) -> Self {
        Self::new(MessageKind::LocationUpdate {
            shipment_id,
            location,
        })
    }

    /// Build a `batch_update` message.
    pub fn batch(updates: Vec<Message>) -> Self {
        Self::new(MessageKind::BatchUpdate { updates })
    }

    /// Build an `ack` for the given request id.
    pub fn ack(original_message_id: MessageId) -> Self {
        Self::new(MessageKind::Ack {
            original_message_id,
        })
    }

    /// Build an `error` reply from a relay error.
    pub fn error(err: &RelayError, original_message_id: Option<MessageId>) -> Self {
        Self::new(MessageKind::Error {
            error: err.to_string(),
            code: err.code(),
            original_message_id,
        })
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// An inbound frame that could not be decoded into a [`Message`].
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedMessage {
    /// The sender's `messageId`, when it could be recovered from the frame.
    pub original_message_id: Option<MessageId>,
    /// What went wrong.
    pub reason: String,
}

impl MalformedMessage {
    /// Convert into the protocol error reported to the client.
    pub fn into_error(self) -> (RelayError, Option<MessageId>) {
        (RelayError::protocol(self.reason), self.original_message_id)
    }
}

/// Decode raw inbound text.
///
/// On failure the original `messageId` is salvaged from the JSON object if
/// one is present as a string, so the error reply can be correlated.
pub fn decode(text: &str) -> Result<Message, MalformedMessage> {
    let value: Value = serde_json::from_str(text).map_err(|e| MalformedMessage {
        original_message_id: None,
        reason: format!("Invalid JSON: {e}"),
    })?;

    let original_message_id = value
        .get("messageId")
        .and_then(Value::as_str)
        .map(MessageId::from);

    serde_json::from_value(value).map_err(|e| MalformedMessage {
        original_message_id,
        reason: format!("Invalid message: {e}"),
    })
}
