use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use super::messages::{ServerMessage, Signal};
use super::types::{
    ConnectionId, Delivery, PeerHandle, PeerSender, Role, Room, RoomId, SignalingError,
};

type Reply = oneshot::Sender<Result<(), SignalingError>>;

/// Commands sent to the room manager actor
pub(crate) enum RoomCommand {
    Create {
        conn: ConnectionId,
        room_id: Option<RoomId>,
        peer_tx: PeerSender,
        reply: Reply,
    },
    Join {
        conn: ConnectionId,
        room_id: Option<RoomId>,
        peer_tx: PeerSender,
        reply: Reply,
    },
    Relay {
        conn: ConnectionId,
        room_id: Option<RoomId>,
        signal: Signal,
        reply: Reply,
    },
    Disconnect {
        conn: ConnectionId,
    },
    RoomCount {
        reply: oneshot::Sender<usize>,
    },
    Snapshot {
        room_id: RoomId,
        reply: oneshot::Sender<Option<RoomSnapshot>>,
    },
}

/// Point-in-time view of one room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub has_inspector: bool,
    pub pending_for_inspector: usize,
    pub pending_for_provider: usize,
}

/// Room and role a connection acquired via create/join.
#[derive(Debug, Clone)]
struct Binding {
    room_id: RoomId,
    role: Role,
}

/// The room table. Owned by exactly one actor task, so every mutation is
/// serialized and nothing here awaits.
#[derive(Debug, Default)]
pub(crate) struct RoomTable {
    rooms: HashMap<RoomId, Room>,
    bindings: HashMap<ConnectionId, Binding>,
}

impl RoomTable {
    pub fn create(
        &mut self,
        conn: ConnectionId,
        room_id: Option<RoomId>,
        peer_tx: PeerSender,
    ) -> Result<(), SignalingError> {
        if self.bindings.contains_key(&conn) {
            return Err(SignalingError::AlreadyInRoom);
        }
        let room_id = room_id.ok_or(SignalingError::RoomIdRequired)?;
        if self.rooms.contains_key(&room_id) {
            return Err(SignalingError::RoomExists);
        }

        let provider = PeerHandle::new(conn, peer_tx);
        provider.notify(
            ServerMessage::RoomCreated {
                room_id: room_id.clone(),
            }
            .to_outbound(),
        );

        self.rooms.insert(room_id.clone(), Room::new(provider));
        self.bindings.insert(
            conn,
            Binding {
                room_id: room_id.clone(),
                role: Role::Provider,
            },
        );

        info!("Room {} created by {}", room_id, conn);
        Ok(())
    }

    pub fn join(
        &mut self,
        conn: ConnectionId,
        room_id: Option<RoomId>,
        peer_tx: PeerSender,
    ) -> Result<(), SignalingError> {
        if self.bindings.contains_key(&conn) {
            return Err(SignalingError::AlreadyInRoom);
        }
        let room_id = room_id.ok_or(SignalingError::RoomNotFound)?;
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or(SignalingError::RoomNotFound)?;

        if let Some(stale) = room.inspector.take() {
            if stale.is_open() {
                room.inspector = Some(stale);
                return Err(SignalingError::InspectorPresent);
            }
            // writer already gone, its disconnect just hasn't reached us yet
            self.bindings.remove(&stale.id);
            room.provider
                .notify(ServerMessage::InspectorLeft.to_outbound());
            debug!("Replacing stale inspector {} in room {}", stale.id, room_id);
        }

        let inspector = PeerHandle::new(conn, peer_tx);
        inspector.notify(
            ServerMessage::RoomJoined {
                room_id: room_id.clone(),
            }
            .to_outbound(),
        );
        room.provider
            .notify(ServerMessage::InspectorJoined.to_outbound());
        room.inspector = Some(inspector);

        let queued = room.pending_for_inspector.len();
        let flushed = room.flush_to_inspector();
        self.bindings.insert(
            conn,
            Binding {
                room_id: room_id.clone(),
                role: Role::Inspector,
            },
        );

        info!(
            "Inspector {} joined room {}, flushed {}/{} queued messages",
            conn, room_id, flushed, queued
        );
        Ok(())
    }

    pub fn relay(
        &mut self,
        conn: ConnectionId,
        room_id: Option<RoomId>,
        signal: Signal,
    ) -> Result<(), SignalingError> {
        let binding = self
            .bindings
            .get(&conn)
            .ok_or(SignalingError::NotInRoom)?;
        let room_id = room_id.ok_or(SignalingError::RoomNotFound)?;
        if room_id != binding.room_id {
            return Err(SignalingError::RoomNotFound);
        }
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or(SignalingError::RoomNotFound)?;

        let from = binding.role;
        let to = from.counterpart();
        let delivery = room.forward(to, signal.to_outbound());

        // motion events are operator-visible, negotiation chatter is not
        if matches!(signal, Signal::MotionDetected) {
            match delivery {
                Delivery::Sent => {
                    info!("Motion-detected sent from {} to {} in room {}", from, to, room_id)
                }
                Delivery::Queued(len) => info!(
                    "Motion-detected queued for {} in room {} (queue length: {})",
                    to, room_id, len
                ),
            }
        } else {
            match delivery {
                Delivery::Sent => debug!(
                    "Relayed {} from {} to {} in room {}",
                    signal.kind(),
                    from,
                    to,
                    room_id
                ),
                Delivery::Queued(len) => debug!(
                    "Queued {} for {} in room {} (queue length: {})",
                    signal.kind(),
                    to,
                    room_id,
                    len
                ),
            }
        }
        Ok(())
    }

    /// Runs once per connection close. Unbound connections are a no-op.
    pub fn disconnect(&mut self, conn: ConnectionId) {
        let Some(binding) = self.bindings.remove(&conn) else {
            return;
        };

        match binding.role {
            Role::Provider => {
                let Some(room) = self.rooms.remove(&binding.room_id) else {
                    return;
                };
                if let Some(inspector) = room.inspector {
                    inspector.notify(ServerMessage::ProviderLeft.to_outbound());
                    self.bindings.remove(&inspector.id);
                    inspector.close();
                }
                info!("Room {} closed", binding.room_id);
            }
            Role::Inspector => {
                let Some(room) = self.rooms.get_mut(&binding.room_id) else {
                    return;
                };
                if room.inspector.as_ref().map(|p| p.id) != Some(conn) {
                    return;
                }
                room.inspector = None;
                room.pending_for_inspector.clear();
                room.provider
                    .notify(ServerMessage::InspectorLeft.to_outbound());
                info!("Inspector {} left room {}", conn, binding.room_id);
            }
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn snapshot(&self, room_id: &RoomId) -> Option<RoomSnapshot> {
        self.rooms.get(room_id).map(|room| RoomSnapshot {
            has_inspector: room.inspector.is_some(),
            pending_for_inspector: room.pending_for_inspector.len(),
            pending_for_provider: room.pending_for_provider.len(),
        })
    }
}

pub(crate) async fn room_manager_actor(mut rx: mpsc::Receiver<RoomCommand>) {
    let mut table = RoomTable::default();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            RoomCommand::Create {
                conn,
                room_id,
                peer_tx,
                reply,
            } => {
                let _ = reply.send(table.create(conn, room_id, peer_tx));
            }

            RoomCommand::Join {
                conn,
                room_id,
                peer_tx,
                reply,
            } => {
                let _ = reply.send(table.join(conn, room_id, peer_tx));
            }

            RoomCommand::Relay {
                conn,
                room_id,
                signal,
                reply,
            } => {
                let _ = reply.send(table.relay(conn, room_id, signal));
            }

            RoomCommand::Disconnect { conn } => table.disconnect(conn),

            RoomCommand::RoomCount { reply } => {
                let _ = reply.send(table.room_count());
            }

            RoomCommand::Snapshot { room_id, reply } => {
                let _ = reply.send(table.snapshot(&room_id));
            }
        }
    }
}

/// Handle to communicate with the room manager actor
#[derive(Clone)]
pub struct RoomManagerHandle {
    pub(crate) tx: mpsc::Sender<RoomCommand>,
}

impl RoomManagerHandle {
    /// Spawn the actor on the current runtime
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel::<RoomCommand>(1024);
        tokio::spawn(room_manager_actor(rx));
        Self { tx }
    }

    /// Create a room and become its provider. `room-created` is written to
    /// `peer_tx` on success.
    pub async fn create_room(
        &self,
        conn: ConnectionId,
        room_id: Option<RoomId>,
        peer_tx: PeerSender,
    ) -> Result<(), SignalingError> {
        self.request(|reply| RoomCommand::Create {
            conn,
            room_id,
            peer_tx,
            reply,
        })
        .await?
    }

    /// Join a room as its inspector. `room-joined` and any queued signals
    /// are written to `peer_tx` on success, in that order.
    pub async fn join_room(
        &self,
        conn: ConnectionId,
        room_id: Option<RoomId>,
        peer_tx: PeerSender,
    ) -> Result<(), SignalingError> {
        self.request(|reply| RoomCommand::Join {
            conn,
            room_id,
            peer_tx,
            reply,
        })
        .await?
    }

    /// Forward a signal to the other member of the caller's room
    pub async fn relay(
        &self,
        conn: ConnectionId,
        room_id: Option<RoomId>,
        signal: Signal,
    ) -> Result<(), SignalingError> {
        self.request(|reply| RoomCommand::Relay {
            conn,
            room_id,
            signal,
            reply,
        })
        .await?
    }

    pub async fn disconnect(&self, conn: ConnectionId) {
        let _ = self.tx.send(RoomCommand::Disconnect { conn }).await;
    }

    pub async fn room_count(&self) -> Result<usize, SignalingError> {
        self.request(|reply| RoomCommand::RoomCount { reply }).await
    }

    pub async fn room_snapshot(
        &self,
        room_id: RoomId,
    ) -> Result<Option<RoomSnapshot>, SignalingError> {
        self.request(|reply| RoomCommand::Snapshot { room_id, reply })
            .await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Result<T, SignalingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self.tx.send(make(reply_tx)).await;
        reply_rx
            .await
            .map_err(|_| SignalingError::Internal("actor channel closed".to_string()))
    }
}
