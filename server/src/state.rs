//! The server value owning every shared table.
//!
//! One `Arc<ServerState>` is threaded through all tasks instead of
//! module-level singletons, so handlers are explicit about what they touch
//! and tests can build as many independent servers as they like.
//!
//! Lock order, where more than one guard is needed: registry → world →
//! zones → connections. Guards are held only long enough to read or mutate;
//! outbound sends go through the per-session channels and never block on a
//! socket while a table is locked.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};

use shared::{DEFAULT_HEARTBEAT_MS, DEFAULT_PORT, DEFAULT_SEED};

use crate::broadcast::ConnectionTable;
use crate::registry::PlayerRegistry;
use crate::world::WorldStore;
use crate::zones::ZoneIndex;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub seed: u64,
    pub heartbeat: Duration,
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: DEFAULT_PORT,
            seed: DEFAULT_SEED,
            heartbeat: Duration::from_millis(DEFAULT_HEARTBEAT_MS),
            debug: false,
        }
    }
}

pub struct ServerState {
    pub config: ServerConfig,
    pub world: RwLock<WorldStore>,
    pub registry: Mutex<PlayerRegistry>,
    pub zones: Mutex<ZoneIndex>,
    pub connections: Mutex<ConnectionTable>,
    next_session_id: AtomicU32,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Self {
        let world = WorldStore::new(config.seed);
        ServerState {
            config,
            world: RwLock::new(world),
            registry: Mutex::new(PlayerRegistry::new()),
            zones: Mutex::new(ZoneIndex::new()),
            connections: Mutex::new(ConnectionTable::new()),
            next_session_id: AtomicU32::new(1),
        }
    }

    /// Fresh opaque session id. Never reused for the process lifetime.
    pub fn allocate_session_id(&self) -> u32 {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }
}
