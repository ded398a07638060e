//! WebSocket signaling relay pairing one provider with one inspector per room

mod actor;
mod messages;
mod server;
mod types;

pub use actor::{RoomManagerHandle, RoomSnapshot};
pub use messages::{ClientMessage, ServerMessage, Signal};
pub use server::{DEFAULT_SIGNALING_PORT, SignalingServer};
pub use types::{ConnectionId, Outbound, OutboundMessage, PeerSender, Role, RoomId, SignalingError};
