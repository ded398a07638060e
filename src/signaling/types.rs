use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Utf8Bytes;

/// Signaling server errors.
///
/// The `Display` text is what the client receives in `error{message}`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalingError {
    #[error("Invalid JSON payload")]
    InvalidJson,

    #[error("Unknown message type")]
    UnknownType,

    #[error("Room ID required")]
    RoomIdRequired,

    #[error("Room already exists")]
    RoomExists,

    #[error("Room not found")]
    RoomNotFound,

    #[error("Room already has an inspector")]
    InspectorPresent,

    #[error("Join a room before sending signals")]
    NotInRoom,

    #[error("Already in a room")]
    AlreadyInRoom,

    #[error("internal error: {0}")]
    Internal(String),
}

const ROOM_ID_MIN: u32 = 100_000;
const ROOM_ID_MAX: u32 = 999_999;

/// Opaque room token chosen by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Six decimal digits, the code a provider shares with its inspector.
    pub fn generate() -> Self {
        let value = rand::rng().random_range(ROOM_ID_MIN..=ROOM_ID_MAX);
        Self(value.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for RoomId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Process-unique id for one WebSocket connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn_{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Provider,
    Inspector,
}

impl Role {
    /// The role on the other end of a room.
    pub fn counterpart(self) -> Self {
        match self {
            Role::Provider => Role::Inspector,
            Role::Inspector => Role::Provider,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Provider => f.write_str("provider"),
            Role::Inspector => f.write_str("inspector"),
        }
    }
}

/// Wrapper for outbound WebSocket messages using tungstenite's Utf8Bytes.
#[derive(Debug, Clone)]
pub struct OutboundMessage(Utf8Bytes);

impl OutboundMessage {
    /// Create a new outbound message from any string type
    pub fn new(s: impl Into<Utf8Bytes>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Get the inner Utf8Bytes for tungstenite Message::Text
    pub fn into_inner(self) -> Utf8Bytes {
        self.0
    }
}

impl From<String> for OutboundMessage {
    fn from(s: String) -> Self {
        Self(Utf8Bytes::from(s))
    }
}

/// What the writer task of a connection should do next.
#[derive(Debug, Clone)]
pub enum Outbound {
    Message(OutboundMessage),
    /// Send a close frame and stop writing.
    Close,
}

pub type PeerSender = mpsc::UnboundedSender<Outbound>;

/// A room member as seen from the room table.
#[derive(Debug, Clone)]
pub(crate) struct PeerHandle {
    pub id: ConnectionId,
    pub tx: PeerSender,
}

impl PeerHandle {
    pub fn new(id: ConnectionId, tx: PeerSender) -> Self {
        Self { id, tx }
    }

    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Hand the message back if the connection's writer is gone.
    /// Cloning only bumps the refcount of the shared bytes.
    pub fn deliver(&self, msg: OutboundMessage) -> Result<(), OutboundMessage> {
        self.tx.send(Outbound::Message(msg.clone())).map_err(|_| msg)
    }

    /// Best-effort send; a closed peer is ignored.
    pub fn notify(&self, msg: OutboundMessage) {
        let _ = self.tx.send(Outbound::Message(msg));
    }

    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Sent,
    /// Queued; carries the queue length afterwards.
    Queued(usize),
}

#[derive(Debug)]
pub(crate) struct Room {
    pub provider: PeerHandle,
    pub inspector: Option<PeerHandle>,
    pub pending_for_inspector: VecDeque<OutboundMessage>,
    /// Only fills if the provider's writer dies before its disconnect is processed.
    pub pending_for_provider: VecDeque<OutboundMessage>,
}

impl Room {
    pub fn new(provider: PeerHandle) -> Self {
        Self {
            provider,
            inspector: None,
            pending_for_inspector: VecDeque::new(),
            pending_for_provider: VecDeque::new(),
        }
    }

    /// Send to the member holding `role`, or queue for it.
    pub fn forward(&mut self, role: Role, msg: OutboundMessage) -> Delivery {
        let (peer, queue) = match role {
            Role::Provider => (Some(&self.provider), &mut self.pending_for_provider),
            Role::Inspector => (self.inspector.as_ref(), &mut self.pending_for_inspector),
        };

        let msg = match peer {
            Some(peer) => match peer.deliver(msg) {
                Ok(()) => return Delivery::Sent,
                Err(msg) => msg,
            },
            None => msg,
        };

        queue.push_back(msg);
        Delivery::Queued(queue.len())
    }

    /// Drain the inspector queue in order. Stops at the first failed send,
    /// leaving the rest queued. Returns how many were sent.
    pub fn flush_to_inspector(&mut self) -> usize {
        let Some(inspector) = self.inspector.as_ref() else {
            return 0;
        };

        let mut sent = 0;
        while let Some(msg) = self.pending_for_inspector.pop_front() {
            if let Err(msg) = inspector.deliver(msg) {
                self.pending_for_inspector.push_front(msg);
                break;
            }
            sent += 1;
        }
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> (PeerHandle, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (PeerHandle::new(ConnectionId::next(), tx), rx)
    }

    fn texts(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            if let Outbound::Message(msg) = item {
                out.push(msg.as_str().to_owned());
            }
        }
        out
    }

    #[test]
    fn room_id_generate_is_six_digits() {
        for _ in 0..100 {
            let id = RoomId::generate();
            assert_eq!(id.as_str().len(), 6);
            assert!(id.as_str().chars().all(|c| c.is_ascii_digit()));
            assert_ne!(id.as_str().as_bytes()[0], b'0');
        }
    }

    #[test]
    fn room_id_display() {
        let id = RoomId::from("482913");
        assert_eq!(format!("{}", id), "482913");
    }

    #[test]
    fn room_id_serialization() {
        let id = RoomId::from("482913");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"482913\"");
        let back: RoomId = serde_json::from_str("\"482913\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn connection_ids_are_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("conn_"));
    }

    #[test]
    fn role_counterpart() {
        assert_eq!(Role::Provider.counterpart(), Role::Inspector);
        assert_eq!(Role::Inspector.counterpart(), Role::Provider);
        assert_eq!(Role::Inspector.to_string(), "inspector");
    }

    #[test]
    fn error_messages_match_wire_text() {
        assert_eq!(SignalingError::RoomIdRequired.to_string(), "Room ID required");
        assert_eq!(SignalingError::RoomExists.to_string(), "Room already exists");
        assert_eq!(SignalingError::RoomNotFound.to_string(), "Room not found");
        assert_eq!(
            SignalingError::InspectorPresent.to_string(),
            "Room already has an inspector"
        );
        assert_eq!(
            SignalingError::NotInRoom.to_string(),
            "Join a room before sending signals"
        );
        assert_eq!(SignalingError::InvalidJson.to_string(), "Invalid JSON payload");
        assert_eq!(SignalingError::UnknownType.to_string(), "Unknown message type");
    }

    #[test]
    fn forward_queues_without_inspector() {
        let (provider, _prx) = peer();
        let mut room = Room::new(provider);

        assert_eq!(
            room.forward(Role::Inspector, OutboundMessage::new("a")),
            Delivery::Queued(1)
        );
        assert_eq!(
            room.forward(Role::Inspector, OutboundMessage::new("b")),
            Delivery::Queued(2)
        );
        assert_eq!(room.pending_for_inspector.len(), 2);
    }

    #[test]
    fn forward_sends_to_open_inspector() {
        let (provider, _prx) = peer();
        let (inspector, mut irx) = peer();
        let mut room = Room::new(provider);
        room.inspector = Some(inspector);

        assert_eq!(
            room.forward(Role::Inspector, OutboundMessage::new("a")),
            Delivery::Sent
        );
        assert!(room.pending_for_inspector.is_empty());
        assert_eq!(texts(&mut irx), vec!["a"]);
    }

    #[test]
    fn forward_queues_when_target_closed() {
        let (provider, prx) = peer();
        let mut room = Room::new(provider);
        drop(prx);

        assert_eq!(
            room.forward(Role::Provider, OutboundMessage::new("late")),
            Delivery::Queued(1)
        );
        assert_eq!(room.pending_for_provider[0].as_str(), "late");
    }

    #[test]
    fn flush_preserves_order_and_empties_queue() {
        let (provider, _prx) = peer();
        let (inspector, mut irx) = peer();
        let mut room = Room::new(provider);
        for s in ["1", "2", "3"] {
            room.forward(Role::Inspector, OutboundMessage::new(s));
        }

        room.inspector = Some(inspector);
        assert_eq!(room.flush_to_inspector(), 3);
        assert!(room.pending_for_inspector.is_empty());
        assert_eq!(texts(&mut irx), vec!["1", "2", "3"]);
    }

    #[test]
    fn flush_keeps_messages_for_closed_inspector() {
        let (provider, _prx) = peer();
        let (inspector, irx) = peer();
        let mut room = Room::new(provider);
        room.forward(Role::Inspector, OutboundMessage::new("1"));
        room.forward(Role::Inspector, OutboundMessage::new("2"));
        drop(irx);

        room.inspector = Some(inspector);
        assert_eq!(room.flush_to_inspector(), 0);
        assert_eq!(room.pending_for_inspector.len(), 2);
        assert_eq!(room.pending_for_inspector[0].as_str(), "1");
    }
}
