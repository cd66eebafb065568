//! Layer Budget Allocation
//!
//! Bin-packs shadowed lights into a fixed pool of depth render-target
//! layers. Spot lights take one slot, point lights six contiguous slots
//! (one per cubemap face). Layer indices are 1-based; index 0 is never
//! handed out.
//!
//! The allocator is sticky: a light that held a range last frame gets the
//! same range back whenever it is still free, so shadow maps stay put and
//! nothing pops. Fresh placements fall back to first-fit; losing a
//! previously held range counts as an eviction.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use crate::light::LightKey;

/// A granted contiguous layer range
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// First layer index of the range (1-based)
    pub base: u32,
    /// Number of layers in the range
    pub cost: u32,
    /// The light kept the exact range it held last frame
    pub reused: bool,
    /// The light held a different range last frame and lost it
    pub evicted: bool,
}

/// Persistent layer allocation state
///
/// The used bitmap is per-frame scratch, cleared by [`begin_frame`].
/// The sticky map survives frames and drives identity-preserving reuse.
/// Reset fully on scene reload.
///
/// [`begin_frame`]: AllocatorState::begin_frame
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AllocatorState {
    max_layers: u32,
    used: Vec<bool>,
    sticky: BTreeMap<LightKey, u32>,
}

impl AllocatorState {
    /// Allocator over `max_layers` layers
    pub fn new(max_layers: u32) -> Self {
        Self {
            max_layers,
            used: alloc::vec![false; max_layers as usize],
            sticky: BTreeMap::new(),
        }
    }

    /// Clear the frame bitmap; re-sizes if the layer budget changed
    pub fn begin_frame(&mut self, max_layers: u32) {
        if max_layers != self.max_layers {
            self.max_layers = max_layers;
            self.used = alloc::vec![false; max_layers as usize];
            self.sticky.clear();
            log::debug!("shadow layers: budget changed to {}, sticky map dropped", max_layers);
        } else {
            self.used.fill(false);
        }
    }

    /// Layer budget currently in effect
    pub fn max_layers(&self) -> u32 {
        self.max_layers
    }

    /// Layers marked used this frame
    pub fn used_count(&self) -> u32 {
        self.used.iter().filter(|&&u| u).count() as u32
    }

    /// The range a light held last frame, if any
    pub fn sticky_base(&self, key: LightKey) -> Option<u32> {
        self.sticky.get(&key).copied()
    }

    /// Drop sticky entries for lights no longer present
    pub fn retain_sticky<F: FnMut(LightKey) -> bool>(&mut self, mut keep: F) {
        self.sticky.retain(|key, _| keep(*key));
    }

    /// Full reset for scene teardown or resource rebuild
    pub fn reset(&mut self) {
        self.used.fill(false);
        self.sticky.clear();
    }

    /// Reserve the sticky range of a light that is skipped this frame
    ///
    /// Skipped lights keep their depth slices while not refreshing, so
    /// their ranges must stay off-limits to this frame's allocations.
    /// Returns true when a range was reserved.
    pub fn reserve_sticky(&mut self, key: LightKey, cost: u32) -> bool {
        match self.sticky.get(&key).copied() {
            Some(base) if self.range_fits(base, cost) && self.range_free(base, cost) => {
                self.mark_range(base, cost);
                true
            }
            _ => false,
        }
    }

    /// Grant a contiguous range for a light, preferring its previous range
    ///
    /// Returns `None` when no contiguous run of `cost` free layers exists;
    /// the caller defers the light rather than fragmenting the range.
    pub fn allocate(&mut self, key: LightKey, cost: u32) -> Option<Allocation> {
        if cost == 0 || cost > self.max_layers {
            return None;
        }

        // Sticky reuse: the exact previous range, nothing else
        if let Some(base) = self.sticky.get(&key).copied() {
            if self.range_fits(base, cost) && self.range_free(base, cost) {
                self.mark_range(base, cost);
                return Some(Allocation {
                    base,
                    cost,
                    reused: true,
                    evicted: false,
                });
            }
        }

        // First fit from layer 1 upward
        let base = self.find_first_fit(cost)?;
        let evicted = match self.sticky.get(&key) {
            Some(&previous) => previous != base,
            None => false,
        };
        if evicted {
            log::debug!("shadow layers: light {} moved to base {}", key, base);
        }

        self.mark_range(base, cost);
        self.sticky.insert(key, base);

        Some(Allocation {
            base,
            cost,
            reused: false,
            evicted,
        })
    }

    fn range_fits(&self, base: u32, cost: u32) -> bool {
        base >= 1 && base + cost - 1 <= self.max_layers
    }

    fn range_free(&self, base: u32, cost: u32) -> bool {
        (base..base + cost).all(|layer| !self.used[(layer - 1) as usize])
    }

    fn mark_range(&mut self, base: u32, cost: u32) {
        for layer in base..base + cost {
            self.used[(layer - 1) as usize] = true;
        }
    }

    fn find_first_fit(&self, cost: u32) -> Option<u32> {
        let mut base = 1u32;
        while base + cost - 1 <= self.max_layers {
            match (base..base + cost).find(|&layer| self.used[(layer - 1) as usize]) {
                // Jump past the blocking layer; nothing before it can fit
                Some(blocked) => base = blocked + 1,
                None => return Some(base),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::light::{POINT_LAYER_COST, SPOT_LAYER_COST};

    fn key(n: u64) -> LightKey {
        LightKey::from_bits(n)
    }

    #[test]
    fn test_first_fit_from_layer_one() {
        let mut state = AllocatorState::new(7);
        state.begin_frame(7);

        let point = state.allocate(key(1), POINT_LAYER_COST).unwrap();
        assert_eq!(point.base, 1);
        assert_eq!(point.cost, 6);
        assert!(!point.reused);

        let spot = state.allocate(key(2), SPOT_LAYER_COST).unwrap();
        assert_eq!(spot.base, 7);

        // Budget exhausted
        assert!(state.allocate(key(3), SPOT_LAYER_COST).is_none());
    }

    #[test]
    fn test_sticky_reuse_across_frames() {
        let mut state = AllocatorState::new(7);

        state.begin_frame(7);
        state.allocate(key(1), 6).unwrap();
        let first = state.allocate(key(2), 1).unwrap();
        assert_eq!(first.base, 7);

        state.begin_frame(7);
        state.allocate(key(1), 6).unwrap();
        let second = state.allocate(key(2), 1).unwrap();
        assert_eq!(second.base, 7);
        assert!(second.reused);
        assert!(!second.evicted);
    }

    #[test]
    fn test_eviction_recorded_on_move() {
        let mut state = AllocatorState::new(8);

        state.begin_frame(8);
        let spot = state.allocate(key(1), 1).unwrap();
        assert_eq!(spot.base, 1);

        // Next frame a cubemap claims layers 1..6 first; the spot moves
        state.begin_frame(8);
        state.allocate(key(2), 6).unwrap();
        let moved = state.allocate(key(1), 1).unwrap();
        assert_eq!(moved.base, 7);
        assert!(!moved.reused);
        assert!(moved.evicted);

        // The move updates the sticky map
        state.begin_frame(8);
        state.allocate(key(2), 6).unwrap();
        let settled = state.allocate(key(1), 1).unwrap();
        assert_eq!(settled.base, 7);
        assert!(settled.reused);
    }

    #[test]
    fn test_no_force_fit_on_fragmentation() {
        let mut state = AllocatorState::new(8);

        state.begin_frame(8);
        // Occupy layers 1 and 8, leaving a 6-run only at 2..7
        state.allocate(key(1), 1).unwrap();
        state.allocate(key(2), 6).unwrap();
        state.allocate(key(3), 1).unwrap();

        // A second cubemap cannot fit anywhere; it must not fragment
        assert!(state.allocate(key(4), 6).is_none());
        assert_eq!(state.used_count(), 8);
    }

    #[test]
    fn test_contiguous_ranges_never_overlap() {
        let mut state = AllocatorState::new(13);
        state.begin_frame(13);

        let a = state.allocate(key(1), 6).unwrap();
        let b = state.allocate(key(2), 6).unwrap();
        let c = state.allocate(key(3), 1).unwrap();

        let mut seen = alloc::vec![false; 13];
        for alloc in [a, b, c] {
            for layer in alloc.base..alloc.base + alloc.cost {
                assert!(!seen[(layer - 1) as usize], "layer {} double-booked", layer);
                seen[(layer - 1) as usize] = true;
            }
        }
    }

    #[test]
    fn test_reserve_sticky_blocks_takeover() {
        let mut state = AllocatorState::new(7);

        state.begin_frame(7);
        state.allocate(key(1), 1).unwrap(); // layer 1

        // Next frame the light is skipped; its slice stays reserved
        state.begin_frame(7);
        assert!(state.reserve_sticky(key(1), 1));

        let other = state.allocate(key(2), 1).unwrap();
        assert_eq!(other.base, 2);
    }

    #[test]
    fn test_reserve_sticky_without_history() {
        let mut state = AllocatorState::new(7);
        state.begin_frame(7);
        assert!(!state.reserve_sticky(key(9), 1));
        assert_eq!(state.used_count(), 0);
    }

    #[test]
    fn test_budget_resize_drops_sticky() {
        let mut state = AllocatorState::new(7);
        state.begin_frame(7);
        state.allocate(key(1), 1).unwrap();

        state.begin_frame(13);
        assert_eq!(state.sticky_base(key(1)), None);
        assert_eq!(state.max_layers(), 13);
    }

    #[test]
    fn test_retain_sticky_prunes_departed_lights() {
        let mut state = AllocatorState::new(7);
        state.begin_frame(7);
        state.allocate(key(1), 1).unwrap();
        state.allocate(key(2), 1).unwrap();

        state.retain_sticky(|k| k == key(1));
        assert!(state.sticky_base(key(1)).is_some());
        assert!(state.sticky_base(key(2)).is_none());
    }

    #[test]
    fn test_state_serialization() {
        let mut state = AllocatorState::new(7);
        state.begin_frame(7);
        state.allocate(key(1), 6).unwrap();

        let json = serde_json::to_string(&state).unwrap();
        let mut restored: AllocatorState = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.sticky_base(key(1)), Some(1));

        // Sticky survives the snapshot; the next frame reuses it
        restored.begin_frame(7);
        let alloc = restored.allocate(key(1), 6).unwrap();
        assert!(alloc.reused);
    }
}
