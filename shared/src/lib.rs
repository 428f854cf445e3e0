//! # Aetharia Shared Library
//!
//! Everything both sides of the wire must agree on: the tile set, the
//! physics and world constants, the JSON frame protocol, and the string
//! sanitization rules applied to user-supplied text.
//!
//! ## Wire Protocol
//!
//! Every frame is a JSON object with a `type` discriminator. The two closed
//! enums [`ClientFrame`] and [`ServerFrame`] are the complete protocol;
//! their serde attributes pin the external contract (camelCase field names,
//! the exact `type` strings) so the Rust names can stay idiomatic.
//!
//! Unknown fields inside a known frame are ignored. A missing required
//! field or an unknown `type` fails deserialization, which the server
//! answers with an `error` frame. Numbers that are not representable in the
//! declared field type (a fractional chunk coordinate, for instance) fail
//! the same way. JSON itself cannot carry NaN or infinities, so every
//! float that parses is finite.
//!
//! ## Determinism
//!
//! All constants that feed the simulation (gravity, tick rate, chunk size)
//! live here in one place. Terrain generation depends only on these values
//! and the world seed, so two server instances with equal seeds answer
//! chunk requests byte-for-byte identically.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Side length of a chunk in tiles. Chunks are square.
pub const CHUNK_SIZE: usize = 32;

/// On-screen size of one tile in pixels, advertised to clients in the
/// welcome frame. The server itself never renders.
pub const TILE_SIZE: u32 = 32;

/// Downward gravitational acceleration in tiles/s². Y grows downward, so
/// gravity is positive.
pub const GRAVITY: f64 = 30.0;

/// Terminal fall speed in tiles/s. Vertical velocity is clamped here.
pub const MAX_FALL_SPEED: f64 = 25.0;

/// Vertical velocity set by a jump, in tiles/s. Negative = upward.
pub const JUMP_VELOCITY: f64 = -14.0;

/// Period of the physics loop in milliseconds (20 ticks per second).
pub const TICK_INTERVAL_MS: u64 = 50;

/// Largest horizontal displacement a single `move` frame may carry, in
/// tiles. Anything larger is rejected as an impossible teleport.
pub const MAX_MOVE_DELTA: f64 = 20.0;

/// Minimum spacing between accepted inbound frames from one session, in
/// milliseconds. Frames arriving faster are dropped silently.
pub const MIN_MESSAGE_INTERVAL_MS: u64 = 50;

/// Block placement/removal reach for human players, in tiles (Chebyshev).
pub const BLOCK_RANGE: i64 = 10;

/// Extended reach for sessions that identified themselves as agents.
pub const AGENT_BLOCK_RANGE: i64 = 50;

/// How far from the player's own chunk a `requestChunk` may point, in
/// chunks (Chebyshev).
pub const CHUNK_REQUEST_RADIUS: i32 = 5;

/// World row of the water surface. Cells below it (y > SEA_LEVEL) that
/// generate as air are flooded.
pub const SEA_LEVEL: i64 = -2;

/// Chat messages are clipped to this many characters after trimming.
pub const MAX_CHAT_LEN: usize = 500;

/// Display names are clipped to this many characters after trimming.
pub const MAX_NAME_LEN: usize = 16;

/// Default listening port, overridden by `PORT`.
pub const DEFAULT_PORT: u16 = 8080;

/// Default world seed, overridden by `AETHARIA_WORLD_SEED`.
pub const DEFAULT_SEED: u64 = 12345;

/// Default heartbeat period in milliseconds, overridden by
/// `AETHARIA_HEARTBEAT`.
pub const DEFAULT_HEARTBEAT_MS: u64 = 30_000;

/// The eight tile materials. The wire carries the numeric id; nothing
/// outside [0, 7] ever enters the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tile {
    Air = 0,
    Dirt = 1,
    Stone = 2,
    Grass = 3,
    Water = 4,
    Sand = 5,
    Wood = 6,
    Leaves = 7,
}

impl Tile {
    /// Parses a wire tile id. Returns `None` for anything outside [0, 7];
    /// this is the single validation point for tile values entering the
    /// world.
    pub fn from_id(id: i64) -> Option<Tile> {
        match id {
            0 => Some(Tile::Air),
            1 => Some(Tile::Dirt),
            2 => Some(Tile::Stone),
            3 => Some(Tile::Grass),
            4 => Some(Tile::Water),
            5 => Some(Tile::Sand),
            6 => Some(Tile::Wood),
            7 => Some(Tile::Leaves),
            _ => None,
        }
    }

    /// The numeric id carried on the wire.
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Whether an avatar collides with this tile. Air and water are the
    /// only pass-through materials.
    pub fn is_solid(self) -> bool {
        !matches!(self, Tile::Air | Tile::Water)
    }
}

/// Public fields of a player as other clients see them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: u32,
    pub name: String,
    pub color: String,
    pub x: f64,
    pub y: f64,
}

/// One merged chunk as transmitted to clients. `tiles[row][col]` holds the
/// tile id at local (col, row); both axes run 0..CHUNK_SIZE.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub x: i32,
    pub y: i32,
    pub tiles: Vec<Vec<u8>>,
}

/// Static world parameters sent once in the welcome frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldConfig {
    #[serde(rename = "chunkSize")]
    pub chunk_size: u32,
    #[serde(rename = "tileSize")]
    pub tile_size: u32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        WorldConfig {
            chunk_size: CHUNK_SIZE as u32,
            tile_size: TILE_SIZE,
        }
    }
}

/// Frames a client may send. The `type` string on the wire is the serde
/// rename; routing is an exhaustive match over this enum so an unhandled
/// message cannot slip through silently.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    /// Horizontal movement proposal plus jump intent. `y` is honored only
    /// as a hint before the player's first physics tick, never after.
    #[serde(rename = "move")]
    Move {
        x: f64,
        #[serde(default)]
        jump: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        y: Option<f64>,
    },
    #[serde(rename = "chat")]
    Chat { message: String },
    #[serde(rename = "requestChunk")]
    RequestChunk {
        #[serde(rename = "chunkX")]
        chunk_x: i32,
        #[serde(rename = "chunkY")]
        chunk_y: i32,
    },
    /// `tile` is deliberately wide (i64) so out-of-range ids parse and get
    /// a proper `error` reply instead of a dropped frame.
    #[serde(rename = "placeBlock")]
    PlaceBlock { x: i64, y: i64, tile: i64 },
    #[serde(rename = "removeBlock")]
    RemoveBlock { x: i64, y: i64 },
    #[serde(rename = "setProfile")]
    SetProfile {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
    },
    #[serde(rename = "identify")]
    Identify {
        #[serde(rename = "isAI")]
        is_ai: bool,
    },
    /// Reserved for future object interactions.
    #[serde(rename = "interact")]
    Interact { target: String, action: String },
}

/// Frames the server emits. Serialized once per broadcast and fanned out
/// to every recipient in the target zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    #[serde(rename = "welcome")]
    Welcome {
        id: u32,
        name: String,
        color: String,
        x: f64,
        y: f64,
        zone: String,
        /// 3×3 grid of merged chunks around spawn, keyed "cx,cy".
        chunks: HashMap<String, ChunkPayload>,
        #[serde(rename = "worldConfig")]
        world_config: WorldConfig,
    },
    #[serde(rename = "existingPlayers")]
    ExistingPlayers { players: Vec<PlayerSnapshot> },
    #[serde(rename = "playerJoined")]
    PlayerJoined {
        id: u32,
        name: String,
        color: String,
        x: f64,
        y: f64,
    },
    #[serde(rename = "playerLeft")]
    PlayerLeft { id: u32, name: String, color: String },
    #[serde(rename = "playerMoved")]
    PlayerMoved { id: u32, x: f64, y: f64 },
    #[serde(rename = "positionCorrection")]
    PositionCorrection {
        x: f64,
        y: f64,
        #[serde(rename = "onGround")]
        on_ground: bool,
    },
    #[serde(rename = "profileUpdate")]
    ProfileUpdate { id: u32, name: String, color: String },
    #[serde(rename = "chunkData")]
    ChunkData { chunk: ChunkPayload },
    #[serde(rename = "chatMessage")]
    ChatMessage {
        id: u32,
        message: String,
        timestamp: u64,
    },
    #[serde(rename = "blockUpdate")]
    BlockUpdate {
        x: i64,
        y: i64,
        tile: u8,
        #[serde(rename = "placedBy")]
        placed_by: u32,
    },
    #[serde(rename = "zoneChanged")]
    ZoneChanged { zone: String },
    #[serde(rename = "interactResult")]
    InteractResult { result: String },
    #[serde(rename = "error")]
    Error { message: String },
}

/// Removes the control code points U+0000..U+001F and U+007F. Applied to
/// every user-supplied string before it is stored or echoed.
pub fn strip_control(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '\u{0000}'..='\u{001F}' | '\u{007F}'))
        .collect()
}

/// Chat sanitization: strip control codes, trim, clip to [`MAX_CHAT_LEN`]
/// characters. Returns `None` when nothing displayable remains.
pub fn sanitize_chat(raw: &str) -> Option<String> {
    let cleaned = strip_control(raw);
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_CHAT_LEN).collect())
}

/// Name sanitization: same pipeline as chat with the [`MAX_NAME_LEN`] clip.
pub fn sanitize_name(raw: &str) -> Option<String> {
    let cleaned = strip_control(raw);
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_NAME_LEN).collect())
}

/// Accepts exactly `#RRGGBB` with hex digits of either case.
pub fn valid_color(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 7 && bytes[0] == b'#' && bytes[1..].iter().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_ids_round_trip() {
        for id in 0..=7 {
            let tile = Tile::from_id(id).unwrap();
            assert_eq!(tile.id() as i64, id);
        }
    }

    #[test]
    fn tile_ids_out_of_range_rejected() {
        assert!(Tile::from_id(-1).is_none());
        assert!(Tile::from_id(8).is_none());
        assert!(Tile::from_id(255).is_none());
    }

    #[test]
    fn solid_set_matches_material_semantics() {
        assert!(!Tile::Air.is_solid());
        assert!(!Tile::Water.is_solid());
        for tile in [Tile::Dirt, Tile::Stone, Tile::Grass, Tile::Sand, Tile::Wood, Tile::Leaves] {
            assert!(tile.is_solid(), "{:?} should be solid", tile);
        }
    }

    #[test]
    fn client_frame_wire_names() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"requestChunk","chunkX":3,"chunkY":-1}"#).unwrap();
        match frame {
            ClientFrame::RequestChunk { chunk_x, chunk_y } => {
                assert_eq!(chunk_x, 3);
                assert_eq!(chunk_y, -1);
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn client_frame_unknown_fields_ignored() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"chat","message":"hi","extra":42}"#).unwrap();
        match frame {
            ClientFrame::Chat { message } => assert_eq!(message, "hi"),
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn client_frame_missing_field_fails() {
        let result: Result<ClientFrame, _> = serde_json::from_str(r#"{"type":"chat"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn client_frame_unknown_type_fails() {
        let result: Result<ClientFrame, _> = serde_json::from_str(r#"{"type":"teleport","x":0}"#);
        assert!(result.is_err());
    }

    #[test]
    fn move_frame_optional_fields_default() {
        let frame: ClientFrame = serde_json::from_str(r#"{"type":"move","x":4.5}"#).unwrap();
        match frame {
            ClientFrame::Move { x, jump, y } => {
                assert_eq!(x, 4.5);
                assert!(!jump);
                assert!(y.is_none());
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn server_frame_type_tags() {
        let json = serde_json::to_value(ServerFrame::BlockUpdate {
            x: 2,
            y: 0,
            tile: 2,
            placed_by: 7,
        })
        .unwrap();
        assert_eq!(json["type"], "blockUpdate");
        assert_eq!(json["placedBy"], 7);

        let json = serde_json::to_value(ServerFrame::PositionCorrection {
            x: 1.0,
            y: 2.0,
            on_ground: true,
        })
        .unwrap();
        assert_eq!(json["type"], "positionCorrection");
        assert_eq!(json["onGround"], true);
    }

    #[test]
    fn strip_control_removes_c0_and_del() {
        assert_eq!(strip_control("a\u{0000}b\u{001F}c\u{007F}d"), "abcd");
        assert_eq!(strip_control("plain"), "plain");
    }

    #[test]
    fn sanitize_chat_trims_clips_and_drops_empty() {
        assert_eq!(sanitize_chat("  hello  ").as_deref(), Some("hello"));
        assert!(sanitize_chat("   ").is_none());
        assert!(sanitize_chat("\u{0001}\u{0002}").is_none());

        let long: String = std::iter::repeat('x').take(MAX_CHAT_LEN + 50).collect();
        assert_eq!(sanitize_chat(&long).unwrap().chars().count(), MAX_CHAT_LEN);
    }

    #[test]
    fn sanitize_name_clips_to_sixteen() {
        assert_eq!(
            sanitize_name("a_rather_long_display_name").as_deref(),
            Some("a_rather_long_di")
        );
        assert!(sanitize_name("").is_none());
    }

    #[test]
    fn color_validation() {
        assert!(valid_color("#00FF7f"));
        assert!(valid_color("#abcdef"));
        assert!(!valid_color("00FF7f"));
        assert!(!valid_color("#00FF7"));
        assert!(!valid_color("#00FF7ff"));
        assert!(!valid_color("#00GG7f"));
    }
}
