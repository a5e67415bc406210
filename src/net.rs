use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::accept_async;
use tracing::{debug, info, warn};
use tungstenite::Message;

use crate::control::FollowControl;
use crate::state::{ServerMessage, SpectatorRegistry};

/// Everything a spectator may send. Anything else is ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpectatorMessage {
    Ping,
    Select { index: usize },
    FollowLeader,
    AutoFollow { enabled: bool },
}

impl SpectatorMessage {
    pub fn from_json(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    /// Apply to the shared follow control. Returns a direct reply, if any.
    pub fn apply(self, control: &FollowControl) -> Option<ServerMessage> {
        match self {
            Self::Ping => Some(ServerMessage::Pong),
            Self::Select { index } => {
                control.select_racer(index);
                None
            }
            Self::FollowLeader => {
                control.follow_leader();
                None
            }
            Self::AutoFollow { enabled } => {
                control.set_auto_follow(enabled);
                None
            }
        }
    }
}

pub async fn serve(
    listener: TcpListener,
    spectators: Arc<Mutex<SpectatorRegistry>>,
    control: Arc<FollowControl>,
) {
    loop {
        let (raw, addr) = match listener.accept().await {
            Ok(conn) => conn,
            Err(err) => {
                warn!("Accept failed: {err}");
                continue;
            }
        };
        debug!("TCP connection from {addr}");

        tokio::spawn(handle_connection(
            raw,
            Arc::clone(&spectators),
            Arc::clone(&control),
        ));
    }
}

async fn handle_connection(
    raw: TcpStream,
    spectators: Arc<Mutex<SpectatorRegistry>>,
    control: Arc<FollowControl>,
) {
    let ws = match accept_async(raw).await {
        Ok(ws) => ws,
        Err(err) => {
            warn!("WebSocket handshake failed: {err}");
            return;
        }
    };
    let (mut write, mut read) = ws.split();

    // -------------------------------
    // 1) Outgoing channel + send loop
    // -------------------------------
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if write.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    // -------------------------------
    // 2) Register + welcome
    // -------------------------------
    let (spectator_id, watching) = {
        let mut registry = spectators.lock().await;
        let id = registry.register(tx.clone());
        (id, registry.len())
    };
    info!("Spectator connected: {spectator_id} ({watching} watching)");

    if let Some(welcome) = (ServerMessage::Welcome { spectator_id }).to_json() {
        let _ = tx.send(welcome);
    }

    // -------------------------------
    // 3) Receive loop
    // -------------------------------
    while let Some(msg) = read.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(_) => break,
        };

        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let Some(parsed) = SpectatorMessage::from_json(&text) else {
            debug!("Ignoring message from {spectator_id}: {text}");
            continue;
        };

        if let Some(reply) = parsed.apply(&control).and_then(|r| r.to_json()) {
            let _ = tx.send(reply);
        }
    }

    info!("Spectator disconnected: {spectator_id}");
    spectators.lock().await.remove(&spectator_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_messages() {
        assert_eq!(SpectatorMessage::from_json(r#"{"type":"ping"}"#), Some(SpectatorMessage::Ping));
        assert_eq!(
            SpectatorMessage::from_json(r#"{"type":"select","index":4}"#),
            Some(SpectatorMessage::Select { index: 4 })
        );
        assert_eq!(
            SpectatorMessage::from_json(r#"{"type":"follow_leader"}"#),
            Some(SpectatorMessage::FollowLeader)
        );
        assert_eq!(
            SpectatorMessage::from_json(r#"{"type":"auto_follow","enabled":false}"#),
            Some(SpectatorMessage::AutoFollow { enabled: false })
        );
    }

    #[test]
    fn ignores_unknown_and_malformed() {
        assert!(SpectatorMessage::from_json(r#"{"type":"input","throttle":1}"#).is_none());
        assert!(SpectatorMessage::from_json(r#"{"type":"select"}"#).is_none());
        assert!(SpectatorMessage::from_json("not json").is_none());
    }

    #[test]
    fn messages_drive_follow_control() {
        let control = FollowControl::new();

        assert!(SpectatorMessage::Select { index: 5 }.apply(&control).is_none());
        let selection = control.load();
        assert_eq!(selection.selected, 5);
        assert!(!selection.auto_follow);

        SpectatorMessage::AutoFollow { enabled: true }.apply(&control);
        assert!(control.load().auto_follow);

        SpectatorMessage::FollowLeader.apply(&control);
        assert_eq!(control.load().selected, 0);

        assert!(matches!(SpectatorMessage::Ping.apply(&control), Some(ServerMessage::Pong)));
    }
}
