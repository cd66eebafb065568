//! Temporal Cadence Scheduling
//!
//! Decides how often each ranked candidate refreshes its shadow map.
//! Rank tiers map to refresh periods (hero/mid/distant); the rank offset
//! inside the due test staggers same-period lights across frames so their
//! renders do not pile up on one tick.
//!
//! A staleness bypass bounds the worst case: a light that keeps missing
//! its window (budget pressure, rank churn) is forced through once its
//! unrendered age reaches twice its period.

use alloc::collections::BTreeMap;
use serde::{Deserialize, Serialize};

use crate::config::ShadowConfig;
use crate::light::LightKey;

/// Unrendered age assumed for lights that never rendered; also the cap
/// used by the ranker's age boost
pub const NEVER_RENDERED_AGE: u64 = 64;

/// Per-light render history plus the frame tick counter
///
/// Owned by the render thread, mutated in place every frame, reset on
/// scene reload. Serializable for state snapshots.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CadenceState {
    frame: u64,
    last_rendered: BTreeMap<LightKey, u64>,
}

impl CadenceState {
    /// Fresh state with the tick at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the tick; returns the new frame number
    pub fn begin_frame(&mut self) -> u64 {
        self.frame += 1;
        self.frame
    }

    /// Current frame tick
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Tick at which the light last rendered, if ever
    pub fn last_rendered(&self, key: LightKey) -> Option<u64> {
        self.last_rendered.get(&key).copied()
    }

    /// Frames since the light last rendered, capped for scoring
    ///
    /// Never-rendered lights report [`NEVER_RENDERED_AGE`] so they rank as
    /// maximally stale.
    pub fn age(&self, key: LightKey) -> u64 {
        match self.last_rendered.get(&key) {
            Some(&tick) => (self.frame.saturating_sub(tick)).min(NEVER_RENDERED_AGE),
            None => NEVER_RENDERED_AGE,
        }
    }

    /// Record a successful render at the current tick
    pub fn mark_rendered(&mut self, key: LightKey) {
        self.last_rendered.insert(key, self.frame);
    }

    /// Drop history for lights no longer in the candidate set
    pub fn retain<F: FnMut(LightKey) -> bool>(&mut self, mut keep: F) {
        self.last_rendered.retain(|key, _| keep(*key));
    }

    /// Full reset for scene teardown or resource rebuild
    pub fn reset(&mut self) {
        self.frame = 0;
        self.last_rendered.clear();
    }
}

/// Outcome of the per-candidate cadence test
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CadenceDecision {
    /// On schedule this frame; proceeds to allocation
    Due,
    /// Off schedule but too stale to skip again; proceeds to allocation
    StaleBypass,
    /// Off schedule; deferred without touching the allocator
    Skip,
}

/// Refresh period for a rank tier: 0 = hero, 1-2 = mid, 3+ = distant
pub fn tier_period(rank: usize, config: &ShadowConfig) -> u64 {
    let period = match rank {
        0 => config.hero_period,
        1 | 2 => config.mid_period,
        _ => config.distant_period,
    };
    period.max(1)
}

/// Decide whether a ranked candidate renders this frame
///
/// Due iff `(frame + rank) % period == 0`, or the scheduler is disabled.
/// Otherwise the staleness bypass fires once the unrendered age reaches
/// `max(2, 2 * period)`, which bounds staleness to twice the period.
pub fn evaluate(
    state: &CadenceState,
    config: &ShadowConfig,
    key: LightKey,
    rank: usize,
) -> CadenceDecision {
    if !config.scheduler_enabled {
        return CadenceDecision::Due;
    }

    let period = tier_period(rank, config);
    if (state.frame() + rank as u64) % period == 0 {
        return CadenceDecision::Due;
    }

    let stale_bound = (period * 2).max(2);
    let stale = match state.last_rendered(key) {
        Some(tick) => state.frame().saturating_sub(tick) >= stale_bound,
        None => true,
    };

    if stale {
        CadenceDecision::StaleBypass
    } else {
        CadenceDecision::Skip
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QualityTier;

    fn key(n: u64) -> LightKey {
        LightKey::from_bits(n)
    }

    fn config() -> ShadowConfig {
        QualityTier::Medium.to_config()
    }

    #[test]
    fn test_hero_due_every_frame() {
        let mut state = CadenceState::new();
        let config = config();

        for _ in 0..8 {
            state.begin_frame();
            state.mark_rendered(key(1));
            assert_eq!(evaluate(&state, &config, key(1), 0), CadenceDecision::Due);
        }
    }

    #[test]
    fn test_due_formula_period_four() {
        let mut state = CadenceState::new();
        let mut config = config();
        config.distant_period = 4;

        // Keep the light fresh so only the formula decides
        for _ in 0..16 {
            let tick = state.begin_frame();
            let decision = evaluate(&state, &config, key(7), 3);
            if (tick + 3) % 4 == 0 {
                assert_eq!(decision, CadenceDecision::Due, "tick {}", tick);
            } else {
                assert_ne!(decision, CadenceDecision::Due, "tick {}", tick);
            }
            state.mark_rendered(key(7));
        }
    }

    #[test]
    fn test_due_set_at_tick_five() {
        // heroPeriod=1, midPeriod=2, distantPeriod=4, five ranked candidates
        let mut state = CadenceState::new();
        let config = config();

        // Render everything at tick 4 so nothing is stale at tick 5
        for _ in 0..4 {
            state.begin_frame();
        }
        for n in 0..5 {
            state.mark_rendered(key(n));
        }
        assert_eq!(state.begin_frame(), 5);

        let decisions: alloc::vec::Vec<_> = (0..5)
            .map(|rank| evaluate(&state, &config, key(rank as u64), rank))
            .collect();

        assert_eq!(decisions[0], CadenceDecision::Due); // (5+0)%1 == 0
        assert_eq!(decisions[1], CadenceDecision::Due); // (5+1)%2 == 0
        assert_eq!(decisions[2], CadenceDecision::Skip); // (5+2)%2 == 1
        assert_eq!(decisions[3], CadenceDecision::Due); // (5+3)%4 == 0
        assert_eq!(decisions[4], CadenceDecision::Skip); // (5+4)%4 == 1
    }

    #[test]
    fn test_scheduler_disabled_always_due() {
        let mut state = CadenceState::new();
        let mut config = config();
        config.scheduler_enabled = false;

        state.begin_frame();
        for rank in 0..6 {
            assert_eq!(
                evaluate(&state, &config, key(9), rank),
                CadenceDecision::Due
            );
        }
    }

    #[test]
    fn test_stale_bypass_fires_at_twice_period() {
        let mut state = CadenceState::new();
        let mut config = config();
        config.distant_period = 4;

        state.begin_frame(); // tick 1
        state.mark_rendered(key(3));

        // rank 3, period 4: due at ticks where (tick+3)%4 == 0, i.e. 5, 9...
        // Walk to tick 8: not due ((8+3)%4=3), age 7 >= 8? no -> 7 < 8, skip
        for _ in 0..7 {
            state.begin_frame();
        }
        assert_eq!(state.frame(), 8);
        assert_eq!(
            evaluate(&state, &config, key(3), 3),
            CadenceDecision::Skip
        );

        // Tick 10: not due ((10+3)%4=1), age 9 >= 8 -> bypass
        state.begin_frame();
        state.begin_frame();
        assert_eq!(
            evaluate(&state, &config, key(3), 3),
            CadenceDecision::StaleBypass
        );
    }

    #[test]
    fn test_never_rendered_bypasses_on_off_frames() {
        let mut state = CadenceState::new();
        let mut config = config();
        config.mid_period = 2;

        state.begin_frame(); // tick 1; rank 1: (1+1)%2 == 0 -> due
        assert_eq!(evaluate(&state, &config, key(5), 1), CadenceDecision::Due);

        state.begin_frame(); // tick 2; rank 1 off schedule, never rendered
        assert_eq!(
            evaluate(&state, &config, key(5), 1),
            CadenceDecision::StaleBypass
        );
    }

    #[test]
    fn test_age_caps_for_scoring() {
        let mut state = CadenceState::new();
        for _ in 0..200 {
            state.begin_frame();
        }
        assert_eq!(state.age(key(1)), NEVER_RENDERED_AGE);

        state.mark_rendered(key(1));
        assert_eq!(state.age(key(1)), 0);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut state = CadenceState::new();
        state.begin_frame();
        state.mark_rendered(key(1));

        state.reset();
        assert_eq!(state.frame(), 0);
        assert_eq!(state.last_rendered(key(1)), None);
    }

    #[test]
    fn test_state_serialization() {
        let mut state = CadenceState::new();
        state.begin_frame();
        state.mark_rendered(key(42));

        let json = serde_json::to_string(&state).unwrap();
        let restored: CadenceState = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.frame(), 1);
        assert_eq!(restored.last_rendered(key(42)), Some(1));
    }
}
