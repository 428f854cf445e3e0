//! Outbound fan-out. Every session owns an unbounded channel drained by its
//! socket writer task; producers here never touch a socket. A zone
//! broadcast serializes the frame once and clones the text per recipient.
//! Sends to a closed channel are ignored: the session is already tearing
//! down and the heartbeat cycle finishes the cleanup.

use std::collections::HashMap;

use log::{debug, warn};
use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::tungstenite::Message;

use shared::ServerFrame;

use crate::state::ServerState;

pub struct Connection {
    pub tx: UnboundedSender<Message>,
    /// Set when a heartbeat ping goes out; cleared by the pong. A second
    /// ping finding it still set terminates the session.
    pub awaiting_pong: bool,
}

pub struct ConnectionTable {
    map: HashMap<u32, Connection>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        ConnectionTable {
            map: HashMap::new(),
        }
    }

    pub fn insert(&mut self, session: u32, tx: UnboundedSender<Message>) {
        self.map.insert(
            session,
            Connection {
                tx,
                awaiting_pong: false,
            },
        );
    }

    pub fn remove(&mut self, session: u32) -> Option<Connection> {
        self.map.remove(&session)
    }

    pub fn get(&self, session: u32) -> Option<&Connection> {
        self.map.get(&session)
    }

    pub fn get_mut(&mut self, session: u32) -> Option<&mut Connection> {
        self.map.get_mut(&session)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&u32, &mut Connection)> {
        self.map.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Default for ConnectionTable {
    fn default() -> Self {
        Self::new()
    }
}

fn encode(frame: &ServerFrame) -> Option<String> {
    match serde_json::to_string(frame) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!("failed to serialize outbound frame: {}", e);
            None
        }
    }
}

/// Sends one frame to one session. A missing or closed connection is not an
/// error.
pub async fn to_session(state: &ServerState, session: u32, frame: &ServerFrame) {
    let Some(text) = encode(frame) else { return };
    let connections = state.connections.lock().await;
    if let Some(conn) = connections.get(session) {
        let _ = conn.tx.send(Message::Text(text));
    }
}

/// Sends one frame to every open session in a zone, optionally excluding
/// one id. The member list is a point-in-time snapshot; a session removed
/// mid-broadcast simply misses the frame.
pub async fn to_zone(state: &ServerState, zone: &str, frame: &ServerFrame, exclude: Option<u32>) {
    let Some(text) = encode(frame) else { return };

    let members = state.zones.lock().await.members(zone);
    if members.is_empty() {
        return;
    }

    let connections = state.connections.lock().await;
    for session in members {
        if Some(session) == exclude {
            continue;
        }
        match connections.get(session) {
            Some(conn) => {
                let _ = conn.tx.send(Message::Text(text.clone()));
            }
            None => debug!("zone {} member {} has no open connection", zone, session),
        }
    }
}
