//! Atlas Tile Planning
//!
//! Packs 2D shadow tiles for spot lights into a fixed shared atlas
//! texture. This is a separate physical resource from the layer array:
//! spot lights that render into a layer also get a tile here for the
//! atlas sampling path.
//!
//! The planner mirrors the layer allocator's budget discipline: tiles
//! are sticky per light, capacity is never exceeded, and overflow evicts
//! the least-recently-placed tile rather than failing the frame.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use crate::light::LightKey;

/// One placed tile
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TilePlacement {
    /// Top-left corner in texels
    pub offset: [u32; 2],
    /// Tile side length in texels
    pub size: u32,
    /// Frame the tile was placed; drives least-recently-placed eviction
    pub placed: u64,
}

/// A tile granted to a light this frame
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct AtlasTile {
    /// Owning light
    pub key: LightKey,
    /// Tile side length in texels
    pub size: u32,
    /// Top-left corner in texels
    pub offset: [u32; 2],
}

/// Per-frame atlas plan for the texture binding layer
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AtlasPlan {
    /// Tiles allocated this frame, in key order
    pub tiles: Vec<AtlasTile>,
    /// Total atlas area in texels
    pub capacity_area: u64,
    /// Allocated area over capacity area (0-1)
    pub utilization: f32,
    /// Lights whose tiles were evicted this frame
    pub evicted: Vec<LightKey>,
}

/// Stateful 2D tile packer over a fixed square atlas
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AtlasTilePlanner {
    size: u32,
    placements: BTreeMap<LightKey, TilePlacement>,
    frame: u64,
    evicted: Vec<LightKey>,
    requested: BTreeSet<LightKey>,
}

impl AtlasTilePlanner {
    /// Planner over a `size` x `size` texel atlas
    pub fn new(size: u32) -> Self {
        Self {
            size,
            placements: BTreeMap::new(),
            frame: 0,
            evicted: Vec::new(),
            requested: BTreeSet::new(),
        }
    }

    /// Begin a new frame; an atlas resize drops every placement
    pub fn begin_frame(&mut self, size: u32) {
        if size != self.size {
            log::debug!("shadow atlas: resized {} -> {}, placements dropped", self.size, size);
            self.size = size;
            self.placements.clear();
        }
        self.frame += 1;
        self.evicted.clear();
        self.requested.clear();
    }

    /// Request a tile for a light, reusing its previous placement when the
    /// requested size still matches
    ///
    /// Returns the tile offset, or `None` when the tile cannot fit even
    /// after evicting every stale placement.
    pub fn request(&mut self, key: LightKey, tile_size: u32) -> Option<[u32; 2]> {
        let tile_size = tile_size.clamp(1, self.size);

        match self.placements.get(&key) {
            Some(placement) if placement.size == tile_size => {
                let offset = placement.offset;
                self.requested.insert(key);
                return Some(offset);
            }
            Some(_) => {
                // Size changed; give the old spot back before repacking
                self.placements.remove(&key);
            }
            None => {}
        }

        loop {
            if let Some(offset) = self.find_free_slot(tile_size) {
                self.placements.insert(
                    key,
                    TilePlacement {
                        offset,
                        size: tile_size,
                        placed: self.frame,
                    },
                );
                self.requested.insert(key);
                return Some(offset);
            }

            if !self.evict_least_recently_placed() {
                log::warn!("shadow atlas: no room for {}x{} tile", tile_size, tile_size);
                return None;
            }
        }
    }

    /// Build the plan for this frame's requests
    pub fn plan(&self) -> AtlasPlan {
        let tiles = self
            .placements
            .iter()
            .filter(|(key, _)| self.requested.contains(key))
            .map(|(key, placement)| AtlasTile {
                key: *key,
                size: placement.size,
                offset: placement.offset,
            })
            .collect();

        AtlasPlan {
            tiles,
            capacity_area: self.capacity_area(),
            utilization: self.utilization(),
            evicted: self.evicted.clone(),
        }
    }

    /// Allocated area over capacity area (0-1)
    pub fn utilization(&self) -> f32 {
        let capacity = self.capacity_area();
        if capacity == 0 {
            return 0.0;
        }
        let allocated: u64 = self
            .placements
            .values()
            .map(|p| p.size as u64 * p.size as u64)
            .sum();
        allocated as f32 / capacity as f32
    }

    /// Total atlas area in texels
    pub fn capacity_area(&self) -> u64 {
        self.size as u64 * self.size as u64
    }

    /// Number of currently placed tiles
    pub fn placed_count(&self) -> usize {
        self.placements.len()
    }

    /// Full reset for scene teardown or resource rebuild
    pub fn reset(&mut self) {
        self.placements.clear();
        self.frame = 0;
        self.evicted.clear();
        self.requested.clear();
    }

    /// First grid slot not overlapping any current placement
    fn find_free_slot(&self, tile_size: u32) -> Option<[u32; 2]> {
        let cells = self.size / tile_size;
        for row in 0..cells {
            for col in 0..cells {
                let offset = [col * tile_size, row * tile_size];
                let overlaps = self
                    .placements
                    .values()
                    .any(|p| rects_overlap(offset, tile_size, p.offset, p.size));
                if !overlaps {
                    return Some(offset);
                }
            }
        }
        None
    }

    /// Evict the oldest placement not requested this frame
    fn evict_least_recently_placed(&mut self) -> bool {
        let victim = self
            .placements
            .iter()
            .filter(|(key, _)| !self.requested.contains(key))
            .min_by_key(|(_, placement)| placement.placed)
            .map(|(key, _)| *key);

        match victim {
            Some(key) => {
                self.placements.remove(&key);
                self.evicted.push(key);
                true
            }
            None => false,
        }
    }
}

fn rects_overlap(a_offset: [u32; 2], a_size: u32, b_offset: [u32; 2], b_size: u32) -> bool {
    a_offset[0] < b_offset[0] + b_size
        && b_offset[0] < a_offset[0] + a_size
        && a_offset[1] < b_offset[1] + b_size
        && b_offset[1] < a_offset[1] + a_size
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u64) -> LightKey {
        LightKey::from_bits(n)
    }

    #[test]
    fn test_tiles_pack_row_major() {
        let mut planner = AtlasTilePlanner::new(4096);
        planner.begin_frame(4096);

        assert_eq!(planner.request(key(1), 2048), Some([0, 0]));
        assert_eq!(planner.request(key(2), 2048), Some([2048, 0]));
        assert_eq!(planner.request(key(3), 2048), Some([0, 2048]));
        assert_eq!(planner.request(key(4), 2048), Some([2048, 2048]));
    }

    #[test]
    fn test_sticky_tile_reuse() {
        let mut planner = AtlasTilePlanner::new(4096);

        planner.begin_frame(4096);
        planner.request(key(1), 2048);
        let offset = planner.request(key(2), 2048).unwrap();

        planner.begin_frame(4096);
        assert_eq!(planner.request(key(2), 2048), Some(offset));
        assert_eq!(planner.placed_count(), 2);
    }

    #[test]
    fn test_least_recently_placed_eviction() {
        let mut planner = AtlasTilePlanner::new(4096);

        planner.begin_frame(4096); // frame 1
        planner.request(key(1), 2048);
        planner.request(key(2), 2048);
        planner.request(key(3), 2048);

        planner.begin_frame(4096); // frame 2
        planner.request(key(4), 2048);

        // Atlas now full; a new request must evict one frame-1 tile
        planner.begin_frame(4096); // frame 3
        planner.request(key(5), 2048);

        let plan = planner.plan();
        assert_eq!(plan.evicted, alloc::vec![key(1)]);
        assert_eq!(plan.tiles.len(), 1);
    }

    #[test]
    fn test_current_frame_tiles_never_evicted() {
        let mut planner = AtlasTilePlanner::new(2048);
        planner.begin_frame(2048);

        assert!(planner.request(key(1), 2048).is_some());
        // Second full-size tile cannot evict the live one
        assert!(planner.request(key(2), 2048).is_none());
    }

    #[test]
    fn test_utilization_ratio() {
        let mut planner = AtlasTilePlanner::new(4096);
        planner.begin_frame(4096);

        assert_eq!(planner.utilization(), 0.0);

        planner.request(key(1), 2048);
        assert!((planner.utilization() - 0.25).abs() < 0.01);

        planner.request(key(2), 2048);
        assert!((planner.utilization() - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_size_change_repacks() {
        let mut planner = AtlasTilePlanner::new(4096);
        planner.begin_frame(4096);
        planner.request(key(1), 2048).unwrap();

        planner.begin_frame(4096);
        let offset = planner.request(key(1), 1024).unwrap();
        assert_eq!(offset, [0, 0]);
        assert_eq!(planner.placed_count(), 1);
    }

    #[test]
    fn test_oversize_tile_clamped() {
        let mut planner = AtlasTilePlanner::new(2048);
        planner.begin_frame(2048);

        assert!(planner.request(key(1), 8192).is_some());
        assert!((planner.utilization() - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_plan_lists_frame_requests_only() {
        let mut planner = AtlasTilePlanner::new(4096);

        planner.begin_frame(4096);
        planner.request(key(1), 2048);
        planner.request(key(2), 2048);

        planner.begin_frame(4096);
        planner.request(key(1), 2048);

        let plan = planner.plan();
        assert_eq!(plan.tiles.len(), 1);
        assert_eq!(plan.tiles[0].key, key(1));
        assert_eq!(plan.capacity_area, 4096 * 4096);
    }

    #[test]
    fn test_state_serialization() {
        let mut planner = AtlasTilePlanner::new(4096);
        planner.begin_frame(4096);
        planner.request(key(1), 2048);

        let json = serde_json::to_string(&planner).unwrap();
        let mut restored: AtlasTilePlanner = serde_json::from_str(&json).unwrap();

        restored.begin_frame(4096);
        assert_eq!(restored.request(key(1), 2048), Some([0, 0]));
    }
}
