//! Minimal relay client.
//!
//! ```text
//! signal_cli [URL] [ROOM]
//! ```
//!
//! Without ROOM a fresh code is generated and the room is created (provider).
//! With ROOM the room is joined (inspector). Each stdin line is a JSON object
//! such as `{"type": "offer", "offer": {"sdp": "..."}}`; `roomId` is filled in.

use std::error::Error;

use futures_util::{SinkExt, StreamExt};
use rendezvous::signaling::{DEFAULT_SIGNALING_PORT, RoomId};
use serde_json::{Value, json};
use tokio::io::{self, AsyncBufReadExt};
use tokio_tungstenite::tungstenite::Message;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let mut args = std::env::args().skip(1);
    let url = args
        .next()
        .unwrap_or_else(|| format!("ws://127.0.0.1:{}", DEFAULT_SIGNALING_PORT));

    let (room_id, hello) = match args.next() {
        Some(code) => {
            let room_id = RoomId::from(code);
            let hello = json!({ "type": "join-room", "roomId": room_id });
            (room_id, hello)
        }
        None => {
            let room_id = RoomId::generate();
            let hello = json!({ "type": "create-room", "roomId": room_id });
            (room_id, hello)
        }
    };

    let (ws, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
    let (mut ws_tx, mut ws_rx) = ws.split();
    println!("Connected to {}, room {}", url, room_id);

    ws_tx.send(Message::Text(hello.to_string().into())).await?;

    // print whatever the relay sends us
    let listener = tokio::spawn(async move {
        while let Some(msg) = ws_rx.next().await {
            match msg {
                Ok(Message::Text(text)) => println!("< {}", text.as_str()),
                Ok(Message::Close(_)) => {
                    println!("Relay closed the connection");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    eprintln!("Read error: {}", e);
                    break;
                }
            }
        }
    });

    let mut stdin = io::BufReader::new(io::stdin()).lines();
    while let Ok(Some(line)) = stdin.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut payload: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                eprintln!("Not JSON: {}", e);
                continue;
            }
        };
        if let Some(obj) = payload.as_object_mut() {
            obj.insert("roomId".to_string(), json!(room_id));
        }
        if ws_tx
            .send(Message::Text(payload.to_string().into()))
            .await
            .is_err()
        {
            break;
        }
        if listener.is_finished() {
            break;
        }
    }

    Ok(())
}
