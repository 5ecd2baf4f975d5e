use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::input::{Action, KeyEvent};
use crate::state::SharedServerState;

/// Client -> server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Key { action: String, pressed: bool },
    Ping,
}

/// Server -> client, besides snapshots and the layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Welcome { client_id: String },
    Pong,
    Error { message: String },
}

impl ServerMessage {
    fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

/// What to do with one text frame from a client.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Key(KeyEvent),
    Reply(ServerMessage),
    Ignore,
}

pub fn parse_inbound(text: &str) -> Inbound {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Ping) => Inbound::Reply(ServerMessage::Pong),
        Ok(ClientMessage::Key { action, pressed }) => match action.parse::<Action>() {
            Ok(action) => Inbound::Key(KeyEvent { action, pressed }),
            Err(err) => Inbound::Reply(ServerMessage::Error { message: err.to_string() }),
        },
        Err(_) => Inbound::Ignore,
    }
}

pub async fn start_websocket_server(
    bind: String,
    state: Arc<Mutex<SharedServerState>>,
    keys: mpsc::UnboundedSender<KeyEvent>,
) -> Result<()> {
    let listener = TcpListener::bind(&bind).await?;
    info!(%bind, "websocket listening");

    loop {
        let (raw, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(err) => {
                warn!(%err, "accept failed");
                continue;
            }
        };
        debug!(%peer, "tcp connection");
        tokio::spawn(handle_client(raw, Arc::clone(&state), keys.clone()));
    }
}

async fn handle_client(raw: TcpStream, state: Arc<Mutex<SharedServerState>>, keys: mpsc::UnboundedSender<KeyEvent>) {
    let ws = match accept_async(raw).await {
        Ok(ws) => ws,
        Err(err) => {
            warn!(%err, "websocket handshake failed");
            return;
        }
    };
    let (mut write, mut read) = ws.split();

    // -------------------------------
    // 1) outgoing channel + registration
    // -------------------------------
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let (client_id, layout) = {
        let mut st = state.lock().await;
        (st.register_client(tx.clone()), st.layout.clone())
    };

    // -------------------------------
    // 2) send loop
    // -------------------------------
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if write.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    info!(client = %client_id, "client connected");
    if let Some(welcome) = (ServerMessage::Welcome { client_id: client_id.to_string() }).to_json() {
        let _ = tx.send(welcome);
    }
    if let Some(layout) = layout {
        let _ = tx.send(layout);
    }

    // -------------------------------
    // 3) receive loop
    // -------------------------------
    while let Some(msg) = read.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(_) => break,
        };
        if !msg.is_text() {
            continue;
        }
        let Ok(text) = msg.to_text() else {
            continue;
        };

        match parse_inbound(text) {
            Inbound::Key(event) => {
                if keys.send(event).is_err() {
                    // simulation loop is gone
                    break;
                }
            }
            Inbound::Reply(reply) => {
                if let Some(json) = reply.to_json() {
                    let _ = tx.send(json);
                }
            }
            Inbound::Ignore => debug!(client = %client_id, "ignored message"),
        }
    }

    info!(client = %client_id, "client disconnected");
    state.lock().await.remove_client(&client_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_message_by_name_or_code() {
        assert_eq!(
            parse_inbound(r#"{"type":"key","action":"accelerate","pressed":true}"#),
            Inbound::Key(KeyEvent::press(Action::Accelerate))
        );
        assert_eq!(
            parse_inbound(r#"{"type":"key","action":"Space","pressed":false}"#),
            Inbound::Key(KeyEvent::release(Action::Jump))
        );
    }

    #[test]
    fn ping_gets_pong() {
        assert_eq!(parse_inbound(r#"{"type":"ping"}"#), Inbound::Reply(ServerMessage::Pong));
        assert_eq!(ServerMessage::Pong.to_json().unwrap(), r#"{"type":"pong"}"#);
    }

    #[test]
    fn unknown_action_is_reported() {
        let reply = parse_inbound(r#"{"type":"key","action":"fly","pressed":true}"#);
        assert!(matches!(reply, Inbound::Reply(ServerMessage::Error { .. })));
    }

    #[test]
    fn garbage_is_ignored() {
        assert_eq!(parse_inbound("not json"), Inbound::Ignore);
        assert_eq!(parse_inbound(r#"{"type":"input","throttle":1}"#), Inbound::Ignore);
    }

    #[test]
    fn welcome_shape() {
        let json = ServerMessage::Welcome { client_id: "abc".into() }.to_json().unwrap();
        assert_eq!(json, r#"{"type":"welcome","client_id":"abc"}"#);
    }
}
