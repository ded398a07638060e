use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::types::{OutboundMessage, RoomId, SignalingError};

/// Messages sent from client to server.
///
/// Fields other than the ones listed (`from`, for example) are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Create a room under a caller-chosen id (becomes its provider)
    CreateRoom {
        #[serde(rename = "roomId", default, deserialize_with = "lenient_room_id")]
        room_id: Option<RoomId>,
    },

    /// Join an existing room as its inspector
    JoinRoom {
        #[serde(rename = "roomId", default, deserialize_with = "lenient_room_id")]
        room_id: Option<RoomId>,
    },

    Offer {
        #[serde(rename = "roomId", default, deserialize_with = "lenient_room_id")]
        room_id: Option<RoomId>,
        #[serde(default)]
        offer: Option<Value>,
    },

    Answer {
        #[serde(rename = "roomId", default, deserialize_with = "lenient_room_id")]
        room_id: Option<RoomId>,
        #[serde(default)]
        answer: Option<Value>,
    },

    IceCandidate {
        #[serde(rename = "roomId", default, deserialize_with = "lenient_room_id")]
        room_id: Option<RoomId>,
        #[serde(default)]
        candidate: Option<Value>,
    },

    /// Provider-side motion notification; relayed as a bare `{type}`
    MotionDetected {
        #[serde(rename = "roomId", default, deserialize_with = "lenient_room_id")]
        room_id: Option<RoomId>,
    },
}

/// Only non-empty strings count as a room id.
fn lenient_room_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<RoomId>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.is_empty() => Some(RoomId::from(s)),
        _ => None,
    })
}

impl ClientMessage {
    /// Parse a text frame. Unparseable JSON and an unrecognized or missing
    /// `type` are told apart so the client gets the right error.
    pub fn parse(text: &str) -> Result<Self, SignalingError> {
        let value: Value = serde_json::from_str(text).map_err(|_| SignalingError::InvalidJson)?;
        Self::deserialize(value).map_err(|_| SignalingError::UnknownType)
    }
}

/// A relayed negotiation message as the counterpart receives it.
///
/// Holds only the type tag and the field that type carries, so nothing
/// identifying the sender or the room survives the hop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Signal {
    Offer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        offer: Option<Value>,
    },
    Answer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        answer: Option<Value>,
    },
    IceCandidate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        candidate: Option<Value>,
    },
    MotionDetected,
}

impl Signal {
    pub fn kind(&self) -> &'static str {
        match self {
            Signal::Offer { .. } => "offer",
            Signal::Answer { .. } => "answer",
            Signal::IceCandidate { .. } => "ice-candidate",
            Signal::MotionDetected => "motion-detected",
        }
    }

    pub fn to_outbound(&self) -> OutboundMessage {
        encode(self)
    }
}

/// Messages originated by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    RoomCreated {
        #[serde(rename = "roomId")]
        room_id: RoomId,
    },

    RoomJoined {
        #[serde(rename = "roomId")]
        room_id: RoomId,
    },

    /// Sent to the provider when an inspector attaches
    InspectorJoined,

    /// Sent to the provider when its inspector disconnects
    InspectorLeft,

    /// Sent to the inspector right before the relay closes it
    ProviderLeft,

    Error { message: String },
}

impl ServerMessage {
    pub fn error(err: &SignalingError) -> Self {
        ServerMessage::Error {
            message: err.to_string(),
        }
    }

    pub fn to_outbound(&self) -> OutboundMessage {
        encode(self)
    }
}

fn encode<T: Serialize>(msg: &T) -> OutboundMessage {
    let json =
        serde_json::to_string(msg).expect("signaling message serialization should never fail");
    OutboundMessage::from(json)
}
