//! Player lifecycle and canonical avatar state.
//!
//! The registry is the single source of truth for player fields. Structural
//! mutations (insert/remove) and per-player updates both happen under the
//! registry-wide lock held by [`crate::state::ServerState`]; the physics
//! loop is the only writer of vertical motion after a player's first tick.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use shared::PlayerSnapshot;

use crate::util::default_color;

/// One inventory stack. `quantity` is strictly positive; a stack reaching
/// zero is removed from the inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemStack {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub quantity: u32,
}

impl ItemStack {
    pub fn new(name: &str, kind: &str, quantity: u32) -> Self {
        ItemStack {
            name: name.to_string(),
            kind: kind.to_string(),
            quantity,
        }
    }
}

/// The avatar owned by one session. Created on accept, destroyed on close.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: u32,
    pub name: String,
    pub color: String,
    /// Position in tile units. Y grows downward.
    pub x: f64,
    pub y: f64,
    /// Tiles/s, positive = falling.
    pub vertical_velocity: f64,
    pub on_ground: bool,
    /// Id of the zone containing the floored position. Recomputed on each
    /// accepted move.
    pub zone: String,
    pub inventory: Vec<ItemStack>,
    /// Set by `identify {isAI: true}`; grants extended block reach.
    pub is_agent: bool,
    /// Physics ticks applied so far. Zero means the join-grace window is
    /// still open and a client `y` hint may be honored.
    pub ticks_simulated: u64,
}

impl Player {
    pub fn new(id: u32, x: f64, y: f64, zone: String) -> Self {
        Player {
            id,
            name: format!("Player{}", id),
            color: default_color(id),
            x,
            y,
            vertical_velocity: 0.0,
            on_ground: true,
            zone,
            inventory: starter_inventory(),
            is_agent: false,
            ticks_simulated: 0,
        }
    }

    /// Atomic snapshot of the publicly visible fields.
    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            id: self.id,
            name: self.name.clone(),
            color: self.color.clone(),
            x: self.x,
            y: self.y,
        }
    }

    /// Adds to an existing stack of the same name or appends a new one.
    /// Zero-quantity grants are ignored.
    pub fn grant(&mut self, name: &str, kind: &str, quantity: u32) {
        if quantity == 0 {
            return;
        }
        if let Some(stack) = self.inventory.iter_mut().find(|s| s.name == name) {
            stack.quantity = stack.quantity.saturating_add(quantity);
        } else {
            self.inventory.push(ItemStack::new(name, kind, quantity));
        }
    }

    /// Takes `quantity` from the named stack. Fails without change when the
    /// stack is missing or short; a stack drained to zero is removed.
    pub fn consume(&mut self, name: &str, quantity: u32) -> bool {
        let Some(idx) = self.inventory.iter().position(|s| s.name == name) else {
            return false;
        };
        if self.inventory[idx].quantity < quantity {
            return false;
        }
        self.inventory[idx].quantity -= quantity;
        if self.inventory[idx].quantity == 0 {
            self.inventory.remove(idx);
        }
        true
    }
}

fn starter_inventory() -> Vec<ItemStack> {
    vec![
        ItemStack::new("Dirt", "block", 64),
        ItemStack::new("Stone", "block", 64),
        ItemStack::new("Wood", "block", 32),
    ]
}

/// Session-keyed table of players.
pub struct PlayerRegistry {
    players: HashMap<u32, Player>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        PlayerRegistry {
            players: HashMap::new(),
        }
    }

    pub fn insert(&mut self, player: Player) {
        self.players.insert(player.id, player);
    }

    pub fn remove(&mut self, id: u32) -> Option<Player> {
        self.players.remove(&id)
    }

    pub fn get(&self, id: u32) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.players.values_mut()
    }

    /// Snapshots of every player except `exclude`, for the
    /// `existingPlayers` payload.
    pub fn snapshots_except(&self, exclude: u32) -> Vec<PlayerSnapshot> {
        self.players
            .values()
            .filter(|p| p.id != exclude)
            .map(Player::snapshot)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

impl Default for PlayerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
