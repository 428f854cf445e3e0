//! Session lifecycle: accept, handshake, read loop, heartbeat, teardown.
//!
//! Each connection gets two tasks: a reader owning the inbound half and a
//! writer draining the session's outbound channel into the sink. All
//! teardown paths (peer close, read error, write failure, heartbeat
//! timeout) converge on [`disconnect`], which is idempotent.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::interval;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use shared::{ClientFrame, ServerFrame, WorldConfig, MIN_MESSAGE_INTERVAL_MS};

use crate::broadcast;
use crate::registry::Player;
use crate::router;
use crate::state::ServerState;
use crate::terrain::chunk_coord;
use crate::world::WorldStore;

/// Column probed for a standable spawn surface.
pub const SPAWN_X: i64 = 0;

/// Creates the player, assigns its zone, registers the outbound channel and
/// performs the welcome exchange. Returns the session id and the receiving
/// end of the outbound channel for the writer task (or a test harness).
pub async fn begin_session(state: &ServerState) -> (u32, UnboundedReceiver<Message>) {
    let id = state.allocate_session_id();
    let (tx, rx) = mpsc::unbounded_channel();

    let (welcome, joined, existing, zone) = {
        let mut registry = state.registry.lock().await;
        let world = state.world.read().await;
        let spawn_y = world.spawn_y(SPAWN_X);
        let zone = state
            .zones
            .lock()
            .await
            .assign(id, SPAWN_X as f64, spawn_y as f64);

        let player = Player::new(id, SPAWN_X as f64, spawn_y as f64, zone.clone());
        let welcome = build_welcome(&world, &player);
        let joined = ServerFrame::PlayerJoined {
            id: player.id,
            name: player.name.clone(),
            color: player.color.clone(),
            x: player.x,
            y: player.y,
        };
        let existing = ServerFrame::ExistingPlayers {
            players: registry.snapshots_except(id),
        };
        registry.insert(player);
        (welcome, joined, existing, zone)
    };

    state.connections.lock().await.insert(id, tx);

    broadcast::to_session(state, id, &welcome).await;
    broadcast::to_zone(state, &zone, &joined, Some(id)).await;
    broadcast::to_session(state, id, &existing).await;

    info!("session {} spawned in {}", id, zone);
    (id, rx)
}

/// The welcome frame: identity, spawn position and the 3×3 merged-chunk
/// grid around it.
fn build_welcome(world: &WorldStore, player: &Player) -> ServerFrame {
    let spawn_cx = chunk_coord(player.x.floor() as i64);
    let spawn_cy = chunk_coord(player.y.floor() as i64);

    let mut chunks = std::collections::HashMap::new();
    for cy in spawn_cy - 1..=spawn_cy + 1 {
        for cx in spawn_cx - 1..=spawn_cx + 1 {
            chunks.insert(format!("{},{}", cx, cy), world.chunk_merged(cx, cy));
        }
    }

    ServerFrame::Welcome {
        id: player.id,
        name: player.name.clone(),
        color: player.color.clone(),
        x: player.x,
        y: player.y,
        zone: player.zone.clone(),
        chunks,
        world_config: WorldConfig::default(),
    }
}

/// Removes every trace of a session and announces the departure to its last
/// zone. Safe to call from any teardown path, any number of times.
pub async fn disconnect(state: &ServerState, session: u32) {
    let connection = state.connections.lock().await.remove(session);
    let player = state.registry.lock().await.remove(session);
    state.zones.lock().await.remove(session);
    // Dropping the channel ends the writer task, which closes the sink.
    drop(connection);

    let Some(player) = player else { return };
    broadcast::to_zone(
        state,
        &player.zone,
        &ServerFrame::PlayerLeft {
            id: player.id,
            name: player.name.clone(),
            color: player.color.clone(),
        },
        None,
    )
    .await;
    info!("session {} ({}) disconnected", session, player.name);
}

/// Full connection lifetime: WebSocket handshake, welcome exchange, reader
/// loop, teardown.
pub async fn handle_connection(state: Arc<ServerState>, stream: TcpStream, addr: SocketAddr) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };
    info!("connection established: {}", addr);

    let (mut sink, mut source) = ws.split();
    let (id, mut rx) = begin_session(&state).await;

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                // The session is torn down by the heartbeat or reader exit.
                break;
            }
        }
        let _ = sink.close().await;
    });

    let min_interval = Duration::from_millis(MIN_MESSAGE_INTERVAL_MS);
    let mut last_accepted: Option<Instant> = None;

    while let Some(result) = source.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if last_accepted.is_some_and(|t| t.elapsed() < min_interval) {
                    debug!("session {} rate-limited, frame dropped", id);
                    continue;
                }
                last_accepted = Some(Instant::now());
                dispatch_text(&state, id, &text).await;
            }
            Ok(Message::Pong(_)) => {
                if let Some(conn) = state.connections.lock().await.get_mut(id) {
                    conn.awaiting_pong = false;
                }
            }
            Ok(Message::Close(_)) => break,
            // Pings are answered by tungstenite; binary frames are not part
            // of the protocol.
            Ok(_) => {}
            Err(e) => {
                debug!("session {} read error: {}", id, e);
                break;
            }
        }
    }

    disconnect(&state, id).await;
    let _ = writer.await;
}

/// Parses one text frame and routes it. Non-JSON input or a frame without a
/// string `type` is logged and dropped; a known shape that fails to decode
/// gets an `error` reply.
async fn dispatch_text(state: &ServerState, session: u32, text: &str) {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            debug!("session {} sent undecodable frame: {}", session, e);
            return;
        }
    };
    if !value.get("type").map_or(false, |t| t.is_string()) {
        debug!("session {} sent frame without a type", session);
        return;
    }

    match serde_json::from_value::<ClientFrame>(value) {
        Ok(frame) => router::handle_frame(state, session, frame).await,
        Err(e) => {
            debug!("session {} sent invalid frame: {}", session, e);
            broadcast::to_session(
                state,
                session,
                &ServerFrame::Error {
                    message: "Unknown or malformed message type".to_string(),
                },
            )
            .await;
        }
    }
}

/// Periodic liveness check. A session whose previous ping is still
/// unacknowledged is closed hard; everyone else gets the next ping.
pub async fn run_heartbeat(state: Arc<ServerState>) {
    let mut ticker = interval(state.config.heartbeat);
    // The first interval tick fires immediately; sessions deserve a full
    // period before their first ping.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let mut stale = Vec::new();
        {
            let mut connections = state.connections.lock().await;
            for (&id, conn) in connections.iter_mut() {
                if conn.awaiting_pong {
                    stale.push(id);
                } else {
                    conn.awaiting_pong = true;
                    let _ = conn.tx.send(Message::Ping(Vec::new()));
                }
            }
        }

        for id in stale {
            info!("session {} missed heartbeat, closing", id);
            disconnect(&state, id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ServerConfig, ServerState};
    use shared::CHUNK_SIZE;

    fn text_frames(rx: &mut UnboundedReceiver<Message>) -> Vec<ServerFrame> {
        let mut frames = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let Message::Text(text) = msg {
                frames.push(serde_json::from_str(&text).unwrap());
            }
        }
        frames
    }

    #[tokio::test]
    async fn welcome_carries_identity_and_nine_chunks() {
        let state = ServerState::new(ServerConfig::default());
        let (id, mut rx) = begin_session(&state).await;

        let frames = text_frames(&mut rx);
        match &frames[0] {
            ServerFrame::Welcome {
                id: wid,
                chunks,
                world_config,
                zone,
                ..
            } => {
                assert_eq!(*wid, id);
                assert_eq!(chunks.len(), 9);
                assert!(chunks.contains_key("0,0"));
                assert_eq!(world_config.chunk_size as usize, CHUNK_SIZE);
                assert_eq!(zone, "zone_central");
                for chunk in chunks.values() {
                    assert_eq!(chunk.tiles.len(), CHUNK_SIZE);
                    assert_eq!(chunk.tiles[0].len(), CHUNK_SIZE);
                }
            }
            other => panic!("first frame should be welcome, got {:?}", other),
        }
        assert!(matches!(&frames[1], ServerFrame::ExistingPlayers { players } if players.is_empty()));
    }

    #[tokio::test]
    async fn second_session_sees_first_in_existing_players() {
        let state = ServerState::new(ServerConfig::default());
        let (a, mut rx_a) = begin_session(&state).await;
        text_frames(&mut rx_a);

        let (_b, mut rx_b) = begin_session(&state).await;

        // A hears about B joining.
        let to_a = text_frames(&mut rx_a);
        assert!(to_a.iter().any(|f| matches!(f, ServerFrame::PlayerJoined { .. })));

        // B's roster lists A.
        let to_b = text_frames(&mut rx_b);
        let existing = to_b
            .iter()
            .find_map(|f| match f {
                ServerFrame::ExistingPlayers { players } => Some(players),
                _ => None,
            })
            .expect("existingPlayers frame");
        assert_eq!(existing.len(), 1);
        assert_eq!(existing[0].id, a);
    }

    #[tokio::test]
    async fn disconnect_announces_player_left_and_is_idempotent() {
        let state = ServerState::new(ServerConfig::default());
        let (a, mut rx_a) = begin_session(&state).await;
        let (b, _rx_b) = begin_session(&state).await;
        text_frames(&mut rx_a);

        disconnect(&state, b).await;
        let to_a = text_frames(&mut rx_a);
        assert!(to_a
            .iter()
            .any(|f| matches!(f, ServerFrame::PlayerLeft { id, .. } if *id == b)));

        assert!(state.registry.lock().await.get(b).is_none());
        assert!(state.zones.lock().await.zone_of_session(b).is_none());

        // A second call must be a no-op.
        disconnect(&state, b).await;
        assert!(text_frames(&mut rx_a).is_empty());
    }

    #[tokio::test]
    async fn malformed_and_unknown_frames() {
        let state = ServerState::new(ServerConfig::default());
        let (id, mut rx) = begin_session(&state).await;
        text_frames(&mut rx);

        // Non-JSON and type-less frames are dropped without a reply.
        dispatch_text(&state, id, "not json at all").await;
        dispatch_text(&state, id, r#"{"x": 3}"#).await;
        assert!(text_frames(&mut rx).is_empty());

        // Unknown type gets an error reply.
        dispatch_text(&state, id, r#"{"type":"fly","up":true}"#).await;
        let frames = text_frames(&mut rx);
        assert!(matches!(&frames[0], ServerFrame::Error { .. }));

        // Known type with missing fields gets an error reply too.
        dispatch_text(&state, id, r#"{"type":"placeBlock","x":1}"#).await;
        let frames = text_frames(&mut rx);
        assert!(matches!(&frames[0], ServerFrame::Error { .. }));
    }
}
