//! Fixed-tick vertical physics. The server owns Y absolutely: this loop is
//! the only writer of vertical position, velocity and the ground flag after
//! a player's first tick. Clients propose horizontal motion and jump intent
//! through the router; everything vertical originates here.

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::time::interval;

use shared::{ServerFrame, GRAVITY, MAX_FALL_SPEED, TICK_INTERVAL_MS};

use crate::broadcast;
use crate::registry::Player;
use crate::state::ServerState;
use crate::world::WorldStore;

/// Seconds per physics tick.
pub const DT: f64 = TICK_INTERVAL_MS as f64 / 1000.0;

/// Horizontal sampling offsets of the avatar's solid footprint.
const FOOT_LEFT: f64 = 0.1;
const FOOT_RIGHT: f64 = 0.9;

/// Vertical movement below this threshold is not worth a correction frame.
const CORRECTION_THRESHOLD: f64 = 0.01;

/// How many rows the unstick scan climbs looking for open space.
const UNSTICK_SCAN_ROWS: i64 = 10;

pub struct StepOutcome {
    /// The avatar moved far enough vertically to broadcast.
    pub moved: bool,
}

/// Advances one player by one tick against the current world.
pub fn step(player: &mut Player, world: &WorldStore) -> StepOutcome {
    let y_prev = player.y;

    let mut v = (player.vertical_velocity + GRAVITY * DT).min(MAX_FALL_SPEED);
    let y_candidate = player.y + v * DT;

    if v > 0.0 {
        // Descending: feet probe one row below the candidate position.
        let row = (y_candidate + 1.0).floor() as i64;
        if footprint_solid(world, player.x, row) {
            player.y = (row - 1) as f64;
            v = 0.0;
            player.on_ground = true;
        } else {
            player.y = y_candidate;
            player.on_ground = false;
        }
    } else if v < 0.0 {
        // Ascending: head probe at the candidate row.
        let row = y_candidate.floor() as i64;
        if footprint_solid(world, player.x, row) {
            player.y = (row + 1) as f64;
            v = 0.0;
        } else {
            player.y = y_candidate;
            player.on_ground = false;
        }
    } else {
        player.y = y_candidate;
        player.on_ground = supported(world, player.x, player.y);
    }

    // Unstick: an avatar whose center sits inside a solid tile climbs to
    // the first open row above, up to the scan limit.
    let center_x = (player.x + 0.5).floor() as i64;
    let center_row = (player.y + 0.5).floor() as i64;
    if world.is_solid(center_x, center_row) {
        for i in 1..=UNSTICK_SCAN_ROWS {
            let row = center_row - i;
            if !world.is_solid(center_x, row) {
                player.y = row as f64;
                v = 0.0;
                player.on_ground = false;
                break;
            }
        }
    }

    player.vertical_velocity = v;
    player.ticks_simulated += 1;

    StepOutcome {
        moved: (player.y - y_prev).abs() > CORRECTION_THRESHOLD,
    }
}

/// Solid test at both footprint offsets on one row.
fn footprint_solid(world: &WorldStore, x: f64, row: i64) -> bool {
    world.is_solid((x + FOOT_LEFT).floor() as i64, row)
        || world.is_solid((x + FOOT_RIGHT).floor() as i64, row)
}

/// Whether the tile directly beneath the avatar's feet is solid.
pub fn supported(world: &WorldStore, x: f64, y: f64) -> bool {
    footprint_solid(world, x, (y + 1.0).floor() as i64)
}

/// Horizontal collision test for a proposed x: the avatar's head and feet
/// rows at both footprint offsets of the candidate column.
pub fn horizontally_blocked(world: &WorldStore, x_candidate: f64, y: f64) -> bool {
    let head = y.floor() as i64;
    let feet = (y + 0.9).floor() as i64;
    footprint_solid(world, x_candidate, head) || footprint_solid(world, x_candidate, feet)
}

/// The 50 ms physics task. Ticks every connected player under the registry
/// lock, then fans out corrections and zone-scoped movement.
pub async fn run(state: Arc<ServerState>) {
    let mut ticker = interval(Duration::from_millis(TICK_INTERVAL_MS));
    debug!("physics loop running at {} ms per tick", TICK_INTERVAL_MS);
    loop {
        ticker.tick().await;
        tick_once(&state).await;
    }
}

/// One tick over the whole registry. Split from [`run`] so tests can drive
/// the simulation synchronously.
pub async fn tick_once(state: &ServerState) {
    struct Emission {
        session: u32,
        zone: String,
        x: f64,
        y: f64,
        on_ground: bool,
    }

    let mut emissions: Vec<Emission> = Vec::new();
    {
        let mut registry = state.registry.lock().await;
        let world = state.world.read().await;
        for player in registry.iter_mut() {
            let outcome = step(player, &world);
            if outcome.moved {
                emissions.push(Emission {
                    session: player.id,
                    zone: player.zone.clone(),
                    x: player.x,
                    y: player.y,
                    on_ground: player.on_ground,
                });
            }
        }
    }

    for e in emissions {
        broadcast::to_session(
            state,
            e.session,
            &ServerFrame::PositionCorrection {
                x: e.x,
                y: e.y,
                on_ground: e.on_ground,
            },
        )
        .await;
        broadcast::to_zone(
            state,
            &e.zone,
            &ServerFrame::PlayerMoved {
                id: e.session,
                x: e.x,
                y: e.y,
            },
            Some(e.session),
        )
        .await;
    }
}
