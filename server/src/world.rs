//! World state: sparse tile overrides layered over generated terrain.
//!
//! The override map is the only mutable world state. Reads prefer the
//! override and otherwise fall through to the generator, which computes a
//! single cell in O(1); there is no generated-chunk cache to keep coherent.
//! Removing a block stores an AIR override rather than deleting the entry,
//! so reads stay O(1) and stable even where the generated tile is also AIR.

use std::collections::HashMap;

use shared::{ChunkPayload, Tile};

use crate::terrain::{chunk_coord, local_index, TerrainGenerator};

/// How far the spawn probe scans a column for a standable surface.
const SPAWN_SCAN_MIN_Y: i64 = -64;
const SPAWN_SCAN_MAX_Y: i64 = 64;

pub struct WorldStore {
    generator: TerrainGenerator,
    overrides: HashMap<(i64, i64), Tile>,
}

impl WorldStore {
    pub fn new(seed: u64) -> Self {
        WorldStore {
            generator: TerrainGenerator::new(seed),
            overrides: HashMap::new(),
        }
    }

    pub fn generator(&self) -> &TerrainGenerator {
        &self.generator
    }

    /// Authoritative tile at a world coordinate: the override if one
    /// exists, else the generated value.
    pub fn get_tile(&self, x: i64, y: i64) -> Tile {
        match self.overrides.get(&(x, y)) {
            Some(tile) => *tile,
            None => self.generator.tile_at(x, y),
        }
    }

    pub fn is_solid(&self, x: i64, y: i64) -> bool {
        self.get_tile(x, y).is_solid()
    }

    /// Writes an override. Tile validity is enforced by the [`Tile`] type
    /// at the wire boundary, so a write here always succeeds.
    pub fn place_tile(&mut self, x: i64, y: i64, tile: Tile) {
        self.overrides.insert((x, y), tile);
    }

    /// Equivalent to placing AIR: the override persists so later reads do
    /// not fall back to the generated tile.
    pub fn remove_tile(&mut self, x: i64, y: i64) {
        self.place_tile(x, y, Tile::Air);
    }

    /// A fresh chunk grid with every applicable override layered in.
    pub fn chunk_merged(&self, chunk_x: i32, chunk_y: i32) -> ChunkPayload {
        let mut chunk = self.generator.generate(chunk_x, chunk_y);
        for (&(x, y), &tile) in &self.overrides {
            if chunk_coord(x) == chunk_x && chunk_coord(y) == chunk_y {
                chunk.set(local_index(x), local_index(y), tile);
            }
        }
        ChunkPayload {
            x: chunk_x,
            y: chunk_y,
            tiles: chunk.rows_as_ids(),
        }
    }

    /// Number of live overrides. Exposed for the persistence hook and for
    /// tests.
    pub fn override_count(&self) -> usize {
        self.overrides.len()
    }

    /// Iterates the override map for a persistence snapshot.
    pub fn overrides(&self) -> impl Iterator<Item = ((i64, i64), Tile)> + '_ {
        self.overrides.iter().map(|(&pos, &tile)| (pos, tile))
    }

    /// Scans the spawn column for the first AIR cell resting on a solid
    /// tile. Falls back to y = 0 when the probe finds nothing; the physics
    /// unstick rule corrects a buried avatar on its first tick.
    pub fn spawn_y(&self, spawn_x: i64) -> i64 {
        for y in SPAWN_SCAN_MIN_Y..SPAWN_SCAN_MAX_Y {
            if self.get_tile(spawn_x, y) == Tile::Air && self.is_solid(spawn_x, y + 1) {
                return y;
            }
        }
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::DEFAULT_SEED;

    #[test]
    fn reads_without_override_match_generator() {
        let world = WorldStore::new(DEFAULT_SEED);
        for &(x, y) in &[(0i64, 0i64), (-5, 12), (40, -9), (-100, -100)] {
            assert_eq!(world.get_tile(x, y), world.generator().tile_at(x, y));
        }
    }

    #[test]
    fn override_shadows_generated_tile() {
        let mut world = WorldStore::new(DEFAULT_SEED);
        world.place_tile(2, 0, Tile::Stone);
        assert_eq!(world.get_tile(2, 0), Tile::Stone);

        world.place_tile(2, 0, Tile::Wood);
        assert_eq!(world.get_tile(2, 0), Tile::Wood);
    }

    #[test]
    fn remove_stores_air_override() {
        let mut world = WorldStore::new(DEFAULT_SEED);
        world.place_tile(7, 3, Tile::Dirt);
        world.remove_tile(7, 3);
        assert_eq!(world.get_tile(7, 3), Tile::Air);
        // The override entry persists rather than being deleted.
        assert_eq!(world.override_count(), 1);
    }

    #[test]
    fn place_then_remove_yields_air_regardless_of_terrain() {
        let mut world = WorldStore::new(DEFAULT_SEED);
        // Deep underground, where the generated tile is certainly not AIR.
        let (x, y) = (11, 30);
        world.place_tile(x, y, Tile::Leaves);
        world.remove_tile(x, y);
        assert_eq!(world.get_tile(x, y), Tile::Air);
    }

    #[test]
    fn merged_chunk_layers_overrides() {
        let mut world = WorldStore::new(DEFAULT_SEED);
        world.place_tile(2, 0, Tile::Stone);
        world.place_tile(-1, -1, Tile::Wood);

        let chunk = world.chunk_merged(0, 0);
        assert_eq!(chunk.tiles[0][2], Tile::Stone.id());

        // The (-1, -1) override lands in chunk (-1, -1) at local (31, 31).
        let neighbor = world.chunk_merged(-1, -1);
        assert_eq!(neighbor.tiles[31][31], Tile::Wood.id());

        // Untouched cells still match pure generation.
        let fresh = world.generator().generate(0, 0);
        assert_eq!(chunk.tiles[5][5], fresh.get(5, 5).id());
    }

    #[test]
    fn reapplied_mutations_match_live_merged_read() {
        let mut world = WorldStore::new(DEFAULT_SEED);
        let edits = [
            ((1i64, 2i64), Tile::Stone),
            ((3, 2), Tile::Wood),
            ((1, 2), Tile::Air),
        ];
        for &((x, y), tile) in &edits {
            world.place_tile(x, y, tile);
        }
        let live = world.chunk_merged(0, 0);

        let mut replay = WorldStore::new(DEFAULT_SEED);
        for &((x, y), tile) in &edits {
            replay.place_tile(x, y, tile);
        }
        assert_eq!(live.tiles, replay.chunk_merged(0, 0).tiles);
    }

    #[test]
    fn spawn_probe_finds_air_above_solid() {
        let world = WorldStore::new(DEFAULT_SEED);
        let y = world.spawn_y(0);
        if y != 0 {
            assert_eq!(world.get_tile(0, y), Tile::Air);
            assert!(world.is_solid(0, y + 1));
        }
    }

    #[test]
    fn spawn_probe_respects_overrides() {
        let mut world = WorldStore::new(DEFAULT_SEED);
        // Build a platform high above everything the generator makes.
        world.place_tile(0, -50, Tile::Stone);
        for y in SPAWN_SCAN_MIN_Y..-50 {
            // Ensure the column above the platform is clear.
            assert_eq!(world.get_tile(0, y), Tile::Air);
        }
        assert_eq!(world.spawn_y(0), -51);
    }
}
