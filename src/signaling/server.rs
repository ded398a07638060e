use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tracing::{debug, error, info, warn};

use super::actor::RoomManagerHandle;
use super::messages::{ClientMessage, ServerMessage, Signal};
use super::types::{ConnectionId, Outbound, PeerSender, SignalingError};

pub const DEFAULT_SIGNALING_PORT: u16 = 8080;
const PING_INTERVAL: Duration = Duration::from_secs(30);
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SignalingServer {
    listener: TcpListener,
    handle: RoomManagerHandle,
    keepalive: Keepalive,
}

/// Ping cadence and how long a pong may take before the connection is dropped.
#[derive(Debug, Clone, Copy)]
struct Keepalive {
    interval: Duration,
    timeout: Duration,
}

impl SignalingServer {
    /// Bind the listener and start the room manager
    pub async fn bind(addr: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Signaling server listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            handle: RoomManagerHandle::spawn(),
            keepalive: Keepalive {
                interval: PING_INTERVAL,
                timeout: PONG_TIMEOUT,
            },
        })
    }

    /// Override the keepalive ping interval and pong timeout
    pub fn with_keepalive(mut self, interval: Duration, timeout: Duration) -> Self {
        self.keepalive = Keepalive { interval, timeout };
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle to the room table this server routes through
    pub fn handle(&self) -> RoomManagerHandle {
        self.handle.clone()
    }

    pub async fn run(self) -> std::io::Result<()> {
        loop {
            let (stream, addr) = self.listener.accept().await?;
            let handle = self.handle.clone();
            let keepalive = self.keepalive;

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, handle, keepalive).await {
                    error!("Connection error from {}: {}", addr, e);
                }
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    handle: RoomManagerHandle,
    keepalive: Keepalive,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let conn = ConnectionId::next();
    info!("WebSocket connection {} from {}", conn, addr);

    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    let (ctrl_tx, mut ctrl_rx) = mpsc::unbounded_channel::<Message>();

    let mut ping_interval = tokio::time::interval(keepalive.interval);
    let mut waiting_for_pong = false;
    let mut pong_deadline: Option<tokio::time::Instant> = None;

    let mut send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(out) = rx.recv() => match out {
                    Outbound::Message(msg) => {
                        if ws_tx.send(Message::Text(msg.into_inner())).await.is_err() {
                            break;
                        }
                    }
                    Outbound::Close => {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                },
                Some(ctrl_msg) = ctrl_rx.recv() => {
                    if ws_tx.send(ctrl_msg).await.is_err() {
                        break;
                    }
                }
                else => break,
            }
        }
    });

    loop {
        let pong_timeout = async {
            match pong_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = &mut send_task => {
                debug!("Writer for {} finished", conn);
                break;
            }

            _ = ping_interval.tick() => {
                if waiting_for_pong {
                    warn!("No Pong received, disconnecting {}", conn);
                    break;
                }
                if ctrl_tx.send(Message::Ping(Bytes::new())).is_err() {
                    break;
                }
                waiting_for_pong = true;
                pong_deadline = Some(tokio::time::Instant::now() + keepalive.timeout);
                debug!("Ping sent to {}", conn);
            }

            _ = pong_timeout => {
                warn!("Pong timeout, disconnecting {}", conn);
                break;
            }

            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        warn!("WebSocket error on {}: {}", conn, e);
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => {
                        handle_text_message(&text, conn, &tx, &handle).await;
                    }
                    Message::Binary(data) => match std::str::from_utf8(&data) {
                        Ok(text) => handle_text_message(text, conn, &tx, &handle).await,
                        Err(_) => reply_error(&tx, conn, SignalingError::InvalidJson),
                    },
                    Message::Pong(_) => {
                        waiting_for_pong = false;
                        pong_deadline = None;
                        debug!("Pong received from {}", conn);
                    }
                    Message::Close(_) => {
                        info!("Close received from {}", conn);
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    handle.disconnect(conn).await;

    send_task.abort();
    info!("WebSocket disconnected: {} ({})", conn, addr);

    Ok(())
}

/// Parse one frame's text and dispatch it. Every failure is answered with
/// `error{message}` and the connection stays open.
async fn handle_text_message(
    text: &str,
    conn: ConnectionId,
    tx: &PeerSender,
    handle: &RoomManagerHandle,
) {
    let result = match ClientMessage::parse(text) {
        Ok(msg) => dispatch(msg, conn, tx, handle).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        reply_error(tx, conn, e);
    }
}

fn reply_error(tx: &PeerSender, conn: ConnectionId, e: SignalingError) {
    debug!("Rejected message from {}: {}", conn, e);
    let err = ServerMessage::error(&e);
    let _ = tx.send(Outbound::Message(err.to_outbound()));
}

async fn dispatch(
    msg: ClientMessage,
    conn: ConnectionId,
    tx: &PeerSender,
    handle: &RoomManagerHandle,
) -> Result<(), SignalingError> {
    match msg {
        ClientMessage::CreateRoom { room_id } => {
            handle.create_room(conn, room_id, tx.clone()).await
        }
        ClientMessage::JoinRoom { room_id } => handle.join_room(conn, room_id, tx.clone()).await,
        ClientMessage::Offer { room_id, offer } => {
            handle.relay(conn, room_id, Signal::Offer { offer }).await
        }
        ClientMessage::Answer { room_id, answer } => {
            handle.relay(conn, room_id, Signal::Answer { answer }).await
        }
        ClientMessage::IceCandidate { room_id, candidate } => {
            handle
                .relay(conn, room_id, Signal::IceCandidate { candidate })
                .await
        }
        ClientMessage::MotionDetected { room_id } => {
            handle.relay(conn, room_id, Signal::MotionDetected).await
        }
    }
}
