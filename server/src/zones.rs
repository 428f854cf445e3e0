//! Spatial partitioning of sessions into broadcast zones.
//!
//! Zones are rectangles in chunk-coordinate space with inclusive bounds.
//! Named regions must not overlap; every position they miss belongs to the
//! default zone, so each position maps to exactly one zone. The index also
//! tracks which zone each session currently occupies, guaranteeing a
//! session appears in at most one member set at any observable instant.

use std::collections::{HashMap, HashSet};

use crate::terrain::chunk_coord;

/// Zone absorbing every position outside the named regions.
pub const DEFAULT_ZONE: &str = "zone_wilds";

/// A named rectangular region in chunk coordinates, bounds inclusive.
#[derive(Debug, Clone)]
pub struct ZoneDef {
    pub id: String,
    pub min_x: i32,
    pub max_x: i32,
    pub min_y: i32,
    pub max_y: i32,
}

impl ZoneDef {
    fn contains(&self, cx: i32, cy: i32) -> bool {
        cx >= self.min_x && cx <= self.max_x && cy >= self.min_y && cy <= self.max_y
    }
}

fn named_zone(id: &str, min_x: i32, max_x: i32, min_y: i32, max_y: i32) -> ZoneDef {
    ZoneDef {
        id: id.to_string(),
        min_x,
        max_x,
        min_y,
        max_y,
    }
}

/// The fixed zone map: a central region ringed by four compass regions,
/// with the wilds beyond. North is negative y.
fn default_zones() -> Vec<ZoneDef> {
    vec![
        named_zone("zone_central", -2, 2, -2, 2),
        named_zone("zone_north", -2, 2, -8, -3),
        named_zone("zone_south", -2, 2, 3, 8),
        named_zone("zone_west", -8, -3, -2, 2),
        named_zone("zone_east", 3, 8, -2, 2),
    ]
}

pub struct ZoneIndex {
    defs: Vec<ZoneDef>,
    members: HashMap<String, HashSet<u32>>,
    zone_by_session: HashMap<u32, String>,
}

impl ZoneIndex {
    pub fn new() -> Self {
        Self::with_defs(default_zones())
    }

    pub fn with_defs(defs: Vec<ZoneDef>) -> Self {
        ZoneIndex {
            defs,
            members: HashMap::new(),
            zone_by_session: HashMap::new(),
        }
    }

    /// Zone id containing a world tile position. Linear scan of the named
    /// regions, default for the remainder.
    pub fn zone_of(&self, x: f64, y: f64) -> &str {
        let cx = chunk_coord(x.floor() as i64);
        let cy = chunk_coord(y.floor() as i64);
        self.defs
            .iter()
            .find(|def| def.contains(cx, cy))
            .map(|def| def.id.as_str())
            .unwrap_or(DEFAULT_ZONE)
    }

    /// Moves a session into the zone containing `(x, y)`, removing it from
    /// its previous zone first. Idempotent when the zone is unchanged.
    /// Returns the new zone id.
    pub fn assign(&mut self, session: u32, x: f64, y: f64) -> String {
        let zone = self.zone_of(x, y).to_string();
        if let Some(previous) = self.zone_by_session.get(&session) {
            if *previous == zone {
                return zone;
            }
            let previous = previous.clone();
            if let Some(set) = self.members.get_mut(&previous) {
                set.remove(&session);
                if set.is_empty() {
                    self.members.remove(&previous);
                }
            }
        }
        self.members.entry(zone.clone()).or_default().insert(session);
        self.zone_by_session.insert(session, zone.clone());
        zone
    }

    /// Drops a session from the index entirely. Returns the zone it was in.
    pub fn remove(&mut self, session: u32) -> Option<String> {
        let zone = self.zone_by_session.remove(&session)?;
        if let Some(set) = self.members.get_mut(&zone) {
            set.remove(&session);
            if set.is_empty() {
                self.members.remove(&zone);
            }
        }
        Some(zone)
    }

    /// Point-in-time snapshot of a zone's member sessions.
    pub fn members(&self, zone: &str) -> Vec<u32> {
        self.members
            .get(zone)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn zone_of_session(&self, session: u32) -> Option<&str> {
        self.zone_by_session.get(&session).map(String::as_str)
    }
}

impl Default for ZoneIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_maps_to_central() {
        let index = ZoneIndex::new();
        assert_eq!(index.zone_of(0.0, 0.0), "zone_central");
        // Chunk (2, 2) upper corner is still central; one tile further east
        // crosses into chunk 3 territory, which is zone_east.
        assert_eq!(index.zone_of(95.9, 0.0), "zone_central");
        assert_eq!(index.zone_of(96.0, 0.0), "zone_east");
    }

    #[test]
    fn compass_regions_and_default() {
        let index = ZoneIndex::new();
        assert_eq!(index.zone_of(0.0, -100.0), "zone_north");
        assert_eq!(index.zone_of(0.0, 100.0), "zone_south");
        assert_eq!(index.zone_of(-100.0, 0.0), "zone_west");
        assert_eq!(index.zone_of(100.0, 0.0), "zone_east");
        // Far corner matched by no named region.
        assert_eq!(index.zone_of(1000.0, 1000.0), DEFAULT_ZONE);
        // Diagonal neighborhoods fall through to the wilds too.
        assert_eq!(index.zone_of(100.0, 100.0), DEFAULT_ZONE);
    }

    #[test]
    fn negative_positions_use_floor_semantics() {
        let index = ZoneIndex::new();
        // -0.5 floors to tile -1, chunk -1: still central.
        assert_eq!(index.zone_of(-0.5, -0.5), "zone_central");
        // Tile -65 is chunk -3: west.
        assert_eq!(index.zone_of(-65.0, 0.0), "zone_west");
    }

    #[test]
    fn assign_moves_between_member_sets() {
        let mut index = ZoneIndex::new();
        let zone = index.assign(1, 0.0, 0.0);
        assert_eq!(zone, "zone_central");
        assert_eq!(index.members("zone_central"), vec![1]);

        let zone = index.assign(1, 0.0, -100.0);
        assert_eq!(zone, "zone_north");
        assert!(index.members("zone_central").is_empty());
        assert_eq!(index.members("zone_north"), vec![1]);
    }

    #[test]
    fn assign_is_idempotent_within_zone() {
        let mut index = ZoneIndex::new();
        index.assign(1, 0.0, 0.0);
        index.assign(1, 5.0, 5.0);
        assert_eq!(index.members("zone_central"), vec![1]);
        assert_eq!(index.zone_of_session(1), Some("zone_central"));
    }

    #[test]
    fn session_in_at_most_one_zone() {
        let mut index = ZoneIndex::new();
        index.assign(1, 0.0, 0.0);
        index.assign(2, 0.0, 0.0);
        index.assign(1, 0.0, -100.0);

        let zones = ["zone_central", "zone_north", "zone_south", "zone_west", "zone_east", DEFAULT_ZONE];
        for session in [1u32, 2] {
            let containing = zones
                .iter()
                .filter(|z| index.members(z).contains(&session))
                .count();
            assert_eq!(containing, 1, "session {} in {} zones", session, containing);
        }
    }

    #[test]
    fn remove_clears_membership() {
        let mut index = ZoneIndex::new();
        index.assign(1, 0.0, 0.0);
        assert_eq!(index.remove(1).as_deref(), Some("zone_central"));
        assert!(index.members("zone_central").is_empty());
        assert!(index.remove(1).is_none());
    }
}
