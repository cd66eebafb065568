//! Candidate Ranking and Type Parity
//!
//! Orders shadow-casting local lights by a priority heuristic so the
//! downstream budget admits the most important ones first. The score mixes
//! static importance (intensity, reach, type) with time-since-last-render
//! so starved lights climb the order instead of flickering in and out.
//!
//! The parity balancer runs after ranking: when the admission window would
//! hold only one light type while the other exists just outside it, one
//! boundary element is swapped to keep a representative of each type.
//! Fairness never overrides the hard budget; a swap that cannot fit is
//! skipped.

use alloc::vec::Vec;

use crate::cadence::{CadenceState, NEVER_RENDERED_AGE};
use crate::config::ShadowConfig;
use crate::light::{LightCandidate, LightKey, LightKind, POINT_LAYER_COST};

/// Flat boost applied to every shadow-casting candidate
const SHADOW_BOOST: f32 = 1.15;
/// Extra boost for spot lights; their maps are cheap and focused
const SPOT_BOOST: f32 = 1.05;
/// Score weight of the light range
const RANGE_WEIGHT: f32 = 0.08;
/// Score weight per frame of unrendered age
const AGE_WEIGHT: f32 = 0.02;

/// A candidate with its computed priority and position in the order
#[derive(Clone, Debug)]
pub struct RankedCandidate {
    /// The normalized candidate
    pub candidate: LightCandidate,
    /// Priority score; higher renders first
    pub score: f32,
    /// Position in the ranked order; 0 is the hero light
    pub rank: usize,
}

/// Priority score for one candidate given its unrendered age
pub fn priority_score(candidate: &LightCandidate, age: u64) -> f32 {
    let age_boost = 1.0 + age.min(NEVER_RENDERED_AGE) as f32 * AGE_WEIGHT;
    let spot_boost = if candidate.kind == LightKind::Spot {
        SPOT_BOOST
    } else {
        1.0
    };

    candidate.intensity * (1.0 + candidate.range * RANGE_WEIGHT) * SHADOW_BOOST * spot_boost
        * age_boost
}

/// Score and order local shadow candidates, highest priority first
///
/// The sort is stable: equal scores keep their input order, which keeps
/// the schedule deterministic across frames. Pure function; cadence state
/// is only read for ages.
pub fn rank_candidates(
    candidates: &[LightCandidate],
    cadence: &CadenceState,
) -> Vec<RankedCandidate> {
    let mut ranked: Vec<RankedCandidate> = candidates
        .iter()
        .map(|candidate| RankedCandidate {
            score: priority_score(candidate, cadence.age(candidate.key)),
            candidate: candidate.clone(),
            rank: 0,
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(core::cmp::Ordering::Equal)
    });

    for (index, entry) in ranked.iter_mut().enumerate() {
        entry.rank = index;
    }

    ranked
}

/// Result of the parity pass
#[derive(Clone, Debug, Default)]
pub struct ParityOutcome {
    /// Whether a boundary swap happened
    pub swapped: bool,
    /// Point light guaranteed a slot behind admitted spots; the allocator
    /// reserves layer and light budget for it
    pub reservation: Option<LightKey>,
}

/// Rebalance the ranked order so both local light types survive into the
/// admission window when budget allows
pub fn apply_type_parity(
    ranked: &mut [RankedCandidate],
    config: &ShadowConfig,
) -> ParityOutcome {
    let outcome = ParityOutcome::default();

    if ranked.len() < 2
        || config.max_shadowed_lights < config.parity_min_lights
        || config.max_layers < config.parity_min_layers
    {
        return outcome;
    }

    // Admission window: the ranked prefix the downstream budget would take
    let mut window_len = 0usize;
    let mut window_layers = 0u32;
    for entry in ranked.iter() {
        let cost = entry.candidate.layer_cost();
        if window_len as u32 >= config.max_shadowed_lights
            || window_layers + cost > config.max_layers
        {
            break;
        }
        window_len += 1;
        window_layers += cost;
    }

    if window_len == 0 || window_len == ranked.len() {
        return outcome;
    }

    let window_has = |kind: LightKind| ranked[..window_len].iter().any(|e| e.candidate.kind == kind);
    let outside_first = |kind: LightKind| {
        ranked[window_len..]
            .iter()
            .position(|e| e.candidate.kind == kind)
            .map(|offset| window_len + offset)
    };

    let missing = if !window_has(LightKind::Point) {
        LightKind::Point
    } else if !window_has(LightKind::Spot) {
        LightKind::Spot
    } else {
        return outcome;
    };

    let incoming = match outside_first(missing) {
        Some(index) => index,
        None => return outcome,
    };

    // Swap the lowest-ranked window element for the candidate just outside,
    // but only when the reshaped window still fits the layer budget.
    let boundary = window_len - 1;
    let boundary_cost = ranked[boundary].candidate.layer_cost();
    let incoming_cost = ranked[incoming].candidate.layer_cost();
    if window_layers - boundary_cost + incoming_cost > config.max_layers {
        return outcome;
    }

    ranked.swap(boundary, incoming);
    for (index, entry) in ranked.iter_mut().enumerate() {
        entry.rank = index;
    }

    let reservation = if incoming_cost == POINT_LAYER_COST {
        log::debug!(
            "shadow parity: reserved point light {} at rank {}",
            ranked[boundary].candidate.key,
            boundary
        );
        Some(ranked[boundary].candidate.key)
    } else {
        None
    };

    ParityOutcome {
        swapped: true,
        reservation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QualityTier;
    use crate::light::LightDesc;

    fn candidate(desc: LightDesc) -> LightCandidate {
        LightCandidate::from_desc(&desc)
    }

    fn spot(id: &str, intensity: f32) -> LightCandidate {
        candidate(
            LightDesc::spot([0.0; 3], [0.0, -1.0, 0.0], 10.0, intensity, 0.4, 0.6).with_id(id),
        )
    }

    fn point(id: &str, intensity: f32) -> LightCandidate {
        candidate(LightDesc::point([0.0; 3], 10.0, intensity).with_id(id))
    }

    #[test]
    fn test_ranking_descends_by_score() {
        let cadence = CadenceState::new();
        let candidates = [point("dim", 1.0), point("bright", 100.0), point("mid", 10.0)];

        let ranked = rank_candidates(&candidates, &cadence);

        assert_eq!(ranked[0].candidate.key, LightKey::from_name("bright"));
        assert_eq!(ranked[1].candidate.key, LightKey::from_name("mid"));
        assert_eq!(ranked[2].candidate.key, LightKey::from_name("dim"));
        assert_eq!(ranked[0].rank, 0);
        assert!(ranked[0].score > ranked[1].score);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let cadence = CadenceState::new();
        let candidates = [point("first", 5.0), point("second", 5.0), point("third", 5.0)];

        let ranked = rank_candidates(&candidates, &cadence);

        assert_eq!(ranked[0].candidate.key, LightKey::from_name("first"));
        assert_eq!(ranked[1].candidate.key, LightKey::from_name("second"));
        assert_eq!(ranked[2].candidate.key, LightKey::from_name("third"));
    }

    #[test]
    fn test_age_boost_lifts_starved_lights() {
        let mut cadence = CadenceState::new();
        let candidates = [point("fresh", 10.0), point("starved", 9.0)];

        cadence.begin_frame();
        cadence.mark_rendered(candidates[0].key);
        cadence.mark_rendered(candidates[1].key);

        // Equal ages: intensity wins
        let ranked = rank_candidates(&candidates, &cadence);
        assert_eq!(ranked[0].candidate.key, LightKey::from_name("fresh"));

        // Starve the weaker light for a while; only "fresh" keeps rendering
        for _ in 0..16 {
            cadence.begin_frame();
            cadence.mark_rendered(candidates[0].key);
        }

        let ranked = rank_candidates(&candidates, &cadence);
        assert_eq!(ranked[0].candidate.key, LightKey::from_name("starved"));
    }

    #[test]
    fn test_spot_boost_applied() {
        let s = spot("s", 10.0);
        let p = point("p", 10.0);

        let spot_score = priority_score(&s, 0);
        let point_score = priority_score(&p, 0);

        assert!((spot_score / point_score - SPOT_BOOST).abs() < 1e-4);
    }

    #[test]
    fn test_parity_swaps_point_into_spot_window() {
        let mut config = QualityTier::Medium.to_config();
        config.max_shadowed_lights = 3;
        config.max_layers = 8;

        let cadence = CadenceState::new();
        let candidates = [
            spot("s1", 40.0),
            spot("s2", 30.0),
            spot("s3", 20.0),
            point("p1", 10.0),
        ];
        let mut ranked = rank_candidates(&candidates, &cadence);

        let outcome = apply_type_parity(&mut ranked, &config);

        assert!(outcome.swapped);
        assert_eq!(outcome.reservation, Some(LightKey::from_name("p1")));
        assert_eq!(ranked[2].candidate.key, LightKey::from_name("p1"));
        assert_eq!(ranked[3].candidate.key, LightKey::from_name("s3"));
        // Ranks reassigned to match the new order
        assert_eq!(ranked[2].rank, 2);
        assert_eq!(ranked[3].rank, 3);
    }

    #[test]
    fn test_parity_never_violates_layer_budget() {
        // Window of three spots, but seven layers cannot hold two spots
        // plus a cubemap; the swap must not be forced.
        let mut config = QualityTier::Medium.to_config();
        config.max_shadowed_lights = 3;
        config.max_layers = 7;

        let cadence = CadenceState::new();
        let candidates = [
            spot("s1", 40.0),
            spot("s2", 30.0),
            spot("s3", 20.0),
            point("p1", 10.0),
        ];
        let mut ranked = rank_candidates(&candidates, &cadence);

        let outcome = apply_type_parity(&mut ranked, &config);

        assert!(!outcome.swapped);
        assert_eq!(ranked[2].candidate.key, LightKey::from_name("s3"));
    }

    #[test]
    fn test_parity_swaps_spot_into_point_window() {
        let mut config = QualityTier::Medium.to_config();
        config.max_shadowed_lights = 2;
        config.max_layers = 12;

        let cadence = CadenceState::new();
        let candidates = [point("p1", 40.0), point("p2", 30.0), spot("s1", 5.0)];
        let mut ranked = rank_candidates(&candidates, &cadence);

        let outcome = apply_type_parity(&mut ranked, &config);

        assert!(outcome.swapped);
        assert_eq!(outcome.reservation, None);
        assert_eq!(ranked[1].candidate.key, LightKey::from_name("s1"));
    }

    #[test]
    fn test_parity_skipped_below_policy_thresholds() {
        let mut config = QualityTier::Medium.to_config();
        config.max_shadowed_lights = 1;
        config.max_layers = 8;

        let cadence = CadenceState::new();
        let candidates = [spot("s1", 40.0), point("p1", 10.0)];
        let mut ranked = rank_candidates(&candidates, &cadence);

        let outcome = apply_type_parity(&mut ranked, &config);

        assert!(!outcome.swapped);
        assert_eq!(ranked[0].candidate.key, LightKey::from_name("s1"));
    }

    #[test]
    fn test_parity_noop_when_both_types_inside() {
        let mut config = QualityTier::Medium.to_config();
        config.max_shadowed_lights = 2;
        config.max_layers = 7;

        let cadence = CadenceState::new();
        let candidates = [point("p1", 40.0), spot("s1", 30.0), spot("s2", 5.0)];
        let mut ranked = rank_candidates(&candidates, &cadence);

        let outcome = apply_type_parity(&mut ranked, &config);

        assert!(!outcome.swapped);
    }
}
