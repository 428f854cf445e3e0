//! Inbound message dispatch. One exhaustive match over [`ClientFrame`];
//! every arm validates first, mutates second, broadcasts last. Validation
//! failures reply `error` to the sender only and never change state or
//! reach other sessions.

use log::{debug, info};

use shared::{
    sanitize_chat, sanitize_name, valid_color, ClientFrame, ServerFrame, Tile, AGENT_BLOCK_RANGE,
    BLOCK_RANGE, CHUNK_REQUEST_RADIUS, JUMP_VELOCITY, MAX_MOVE_DELTA,
};

use crate::broadcast;
use crate::physics;
use crate::state::ServerState;
use crate::terrain::chunk_coord;
use crate::util::now_millis;

pub async fn handle_frame(state: &ServerState, session: u32, frame: ClientFrame) {
    match frame {
        ClientFrame::Move { x, jump, y } => handle_move(state, session, x, jump, y).await,
        ClientFrame::Chat { message } => handle_chat(state, session, &message).await,
        ClientFrame::RequestChunk { chunk_x, chunk_y } => {
            handle_request_chunk(state, session, chunk_x, chunk_y).await
        }
        ClientFrame::PlaceBlock { x, y, tile } => {
            handle_place_block(state, session, x, y, tile).await
        }
        ClientFrame::RemoveBlock { x, y } => handle_remove_block(state, session, x, y).await,
        ClientFrame::SetProfile { name, color } => {
            handle_set_profile(state, session, name, color).await
        }
        ClientFrame::Identify { is_ai } => handle_identify(state, session, is_ai).await,
        ClientFrame::Interact { target, action } => {
            handle_interact(state, session, &target, &action).await
        }
    }
}

async fn reply_error(state: &ServerState, session: u32, message: &str) {
    broadcast::to_session(
        state,
        session,
        &ServerFrame::Error {
            message: message.to_string(),
        },
    )
    .await;
}

/// Horizontal movement with jump intent. The proposed x is delta-limited
/// and collision-checked; y is only a hint inside the join-grace window.
/// Accepting a move recomputes the zone and may hand the session over.
async fn handle_move(state: &ServerState, session: u32, x: f64, jump: bool, y_hint: Option<f64>) {
    struct ZoneTransfer {
        old_zone: String,
        new_zone: String,
    }

    let (snapshot, zone_now, transfer) = {
        let mut registry = state.registry.lock().await;
        let Some(player) = registry.get_mut(session) else {
            return;
        };

        if (x - player.x).abs() > MAX_MOVE_DELTA {
            drop(registry);
            debug!("session {} rejected move: delta too large", session);
            reply_error(state, session, "Movement too large").await;
            return;
        }

        {
            let world = state.world.read().await;
            if !physics::horizontally_blocked(&world, x, player.y) {
                player.x = x;
            }
        }

        if jump && player.on_ground {
            player.vertical_velocity = JUMP_VELOCITY;
            player.on_ground = false;
        }

        // The legacy y field is honored only before the first physics tick.
        if let Some(y) = y_hint {
            if player.ticks_simulated == 0 {
                player.y = y;
            }
        }

        let mut zones = state.zones.lock().await;
        let new_zone = zones.zone_of(player.x, player.y).to_string();
        let transfer = if new_zone != player.zone {
            zones.assign(session, player.x, player.y);
            Some(ZoneTransfer {
                old_zone: std::mem::replace(&mut player.zone, new_zone.clone()),
                new_zone,
            })
        } else {
            None
        };
        (player.snapshot(), player.zone.clone(), transfer)
    };

    if let Some(t) = transfer {
        info!(
            "session {} crossed from {} to {}",
            session, t.old_zone, t.new_zone
        );
        broadcast::to_zone(
            state,
            &t.old_zone,
            &ServerFrame::PlayerLeft {
                id: snapshot.id,
                name: snapshot.name.clone(),
                color: snapshot.color.clone(),
            },
            None,
        )
        .await;
        broadcast::to_zone(
            state,
            &t.new_zone,
            &ServerFrame::PlayerJoined {
                id: snapshot.id,
                name: snapshot.name.clone(),
                color: snapshot.color.clone(),
                x: snapshot.x,
                y: snapshot.y,
            },
            Some(session),
        )
        .await;
        broadcast::to_session(state, session, &ServerFrame::ZoneChanged { zone: t.new_zone.clone() })
            .await;
        broadcast::to_zone(
            state,
            &t.new_zone,
            &ServerFrame::PlayerMoved {
                id: snapshot.id,
                x: snapshot.x,
                y: snapshot.y,
            },
            Some(session),
        )
        .await;
    } else {
        broadcast::to_zone(
            state,
            &zone_now,
            &ServerFrame::PlayerMoved {
                id: snapshot.id,
                x: snapshot.x,
                y: snapshot.y,
            },
            Some(session),
        )
        .await;
    }
}

async fn snapshot_zone(state: &ServerState, session: u32) -> String {
    state
        .registry
        .lock()
        .await
        .get(session)
        .map(|p| p.zone.clone())
        .unwrap_or_default()
}

async fn handle_chat(state: &ServerState, session: u32, raw: &str) {
    let Some(message) = sanitize_chat(raw) else {
        // Nothing displayable: dropped without a reply.
        return;
    };

    let zone = snapshot_zone(state, session).await;
    if zone.is_empty() {
        return;
    }
    broadcast::to_zone(
        state,
        &zone,
        &ServerFrame::ChatMessage {
            id: session,
            message,
            timestamp: now_millis(),
        },
        None,
    )
    .await;
}

async fn handle_request_chunk(state: &ServerState, session: u32, chunk_x: i32, chunk_y: i32) {
    let position = {
        let registry = state.registry.lock().await;
        registry.get(session).map(|p| (p.x, p.y))
    };
    let Some((px, py)) = position else { return };

    let pcx = chunk_coord(px.floor() as i64);
    let pcy = chunk_coord(py.floor() as i64);
    let distance = (chunk_x - pcx).abs().max((chunk_y - pcy).abs());
    if distance > CHUNK_REQUEST_RADIUS {
        reply_error(state, session, "Chunk too far away").await;
        return;
    }

    let chunk = state.world.read().await.chunk_merged(chunk_x, chunk_y);
    broadcast::to_session(state, session, &ServerFrame::ChunkData { chunk }).await;
}

/// Chebyshev reach check shared by block placement and removal.
async fn block_in_range(state: &ServerState, session: u32, x: i64, y: i64) -> Option<bool> {
    let registry = state.registry.lock().await;
    let player = registry.get(session)?;
    let range = if player.is_agent {
        AGENT_BLOCK_RANGE
    } else {
        BLOCK_RANGE
    };
    let dx = (x - player.x.round() as i64).abs();
    let dy = (y - player.y.round() as i64).abs();
    Some(dx.max(dy) <= range)
}

async fn handle_place_block(state: &ServerState, session: u32, x: i64, y: i64, tile_id: i64) {
    let Some(tile) = Tile::from_id(tile_id) else {
        reply_error(state, session, "Invalid tile type").await;
        return;
    };

    match block_in_range(state, session, x, y).await {
        Some(true) => {}
        Some(false) => {
            reply_error(state, session, "Block out of reach").await;
            return;
        }
        None => return,
    }

    state.world.write().await.place_tile(x, y, tile);
    let zone = snapshot_zone(state, session).await;
    broadcast::to_zone(
        state,
        &zone,
        &ServerFrame::BlockUpdate {
            x,
            y,
            tile: tile.id(),
            placed_by: session,
        },
        None,
    )
    .await;
}

async fn handle_remove_block(state: &ServerState, session: u32, x: i64, y: i64) {
    match block_in_range(state, session, x, y).await {
        Some(true) => {}
        Some(false) => {
            reply_error(state, session, "Block out of reach").await;
            return;
        }
        None => return,
    }

    {
        let mut world = state.world.write().await;
        if world.get_tile(x, y) == Tile::Air {
            drop(world);
            reply_error(state, session, "No block to remove at that position").await;
            return;
        }
        world.remove_tile(x, y);
    }

    let zone = snapshot_zone(state, session).await;
    broadcast::to_zone(
        state,
        &zone,
        &ServerFrame::BlockUpdate {
            x,
            y,
            tile: Tile::Air.id(),
            placed_by: session,
        },
        None,
    )
    .await;
}

/// Profile changes are clipped or ignored rather than rejected: an invalid
/// color or a name that sanitizes to nothing keeps the old value silently.
async fn handle_set_profile(
    state: &ServerState,
    session: u32,
    name: Option<String>,
    color: Option<String>,
) {
    let snapshot = {
        let mut registry = state.registry.lock().await;
        let Some(player) = registry.get_mut(session) else {
            return;
        };
        if let Some(sanitized) = name.as_deref().and_then(sanitize_name) {
            player.name = sanitized;
        }
        if let Some(c) = color {
            if valid_color(&c) {
                player.color = c;
            }
        }
        player.snapshot()
    };

    broadcast::to_zone(
        state,
        &snapshot_zone(state, session).await,
        &ServerFrame::ProfileUpdate {
            id: snapshot.id,
            name: snapshot.name,
            color: snapshot.color,
        },
        None,
    )
    .await;
}

async fn handle_identify(state: &ServerState, session: u32, is_ai: bool) {
    let mut registry = state.registry.lock().await;
    if let Some(player) = registry.get_mut(session) {
        player.is_agent = is_ai;
        info!("session {} identified as agent: {}", session, is_ai);
    }
}

async fn handle_interact(state: &ServerState, session: u32, target: &str, action: &str) {
    debug!(
        "session {} interact target={} action={} (not implemented)",
        session, target, action
    );
    broadcast::to_session(
        state,
        session,
        &ServerFrame::InteractResult {
            result: "not_implemented".to_string(),
        },
    )
    .await;
}
