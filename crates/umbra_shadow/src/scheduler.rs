//! Per-Frame Shadow Scheduling Pipeline
//!
//! Ties the stages together: rank -> parity -> cadence -> layer
//! allocation -> matrix and atlas building, strictly in that order. The
//! whole pass runs once per frame on the thread that owns the state; no
//! stage suspends or blocks.
//!
//! Running out of budget is a normal outcome here, not an error: every
//! candidate ends the frame either rendered or deferred with a reason,
//! and a frame that went badly heals itself on the next tick because
//! everything is recomputed from fresh inputs.

use alloc::collections::BTreeSet;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use crate::atlas::{AtlasPlan, AtlasTilePlanner};
use crate::cadence::{self, CadenceDecision, CadenceState};
use crate::cascade::{self, CascadeMatrixSet};
use crate::config::ShadowConfig;
use crate::layers::{Allocation, AllocatorState};
use crate::light::{LightCandidate, LightDesc, LightKey, LightKind, POINT_LAYER_COST};
use crate::rank;

/// Why a candidate did not render this frame
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeferReason {
    /// Off its refresh cadence; will come due on a later tick
    Cadence,
    /// No light, layer, or face budget left this frame
    Budget,
}

/// Per-candidate outcome of a scheduling pass
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SelectionEntry {
    /// Stable light identity
    pub key: LightKey,
    /// Light type
    pub kind: LightKind,
    /// Rank after parity balancing; 0 is the hero light
    pub rank: usize,
    /// Priority score the rank was derived from
    pub score: f32,
    /// Granted layer range when rendered this frame
    pub assignment: Option<Allocation>,
    /// Set when the candidate was deferred instead
    pub defer_reason: Option<DeferReason>,
    /// Rendered through the staleness bypass rather than on cadence
    pub stale_bypass: bool,
}

impl SelectionEntry {
    /// Whether this candidate renders a shadow map this frame
    pub fn rendered(&self) -> bool {
        self.assignment.is_some()
    }
}

/// Aggregate counters for telemetry consumers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionStats {
    /// Lights rendering a shadow map this frame
    pub rendered: u32,
    /// Lights deferred this frame
    pub deferred: u32,
    /// Layer slots granted this frame
    pub assigned_layers: u32,
    /// Allocations that kept their previous range
    pub reuses: u32,
    /// Allocations that lost their previous range
    pub evictions: u32,
    /// Renders forced by the staleness bypass
    pub stale_bypass_renders: u32,
}

/// Full selection result for the draw-submission layer
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ShadowSelection {
    /// One entry per selectable candidate, in rank order
    pub entries: Vec<SelectionEntry>,
    /// Rendered lights in render order
    pub rendered: Vec<LightKey>,
    /// Deferred lights
    pub deferred: Vec<LightKey>,
    /// Aggregate counters
    pub stats: SelectionStats,
}

/// A rendered local light with its granted range and matrices
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LightShadow {
    /// Stable light identity
    pub key: LightKey,
    /// Light type
    pub kind: LightKind,
    /// Granted layer range
    pub allocation: Allocation,
    /// View-projection matrices for each granted slot
    pub matrices: CascadeMatrixSet,
}

/// The always-on directional cascade result
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DirectionalShadow {
    /// Stable light identity
    pub key: LightKey,
    /// Cascade matrices and split depths
    pub matrices: CascadeMatrixSet,
}

/// Everything one scheduling pass produces
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FrameSchedule {
    /// Frame tick this schedule belongs to
    pub frame: u64,
    /// Admission decisions and counters
    pub selection: ShadowSelection,
    /// Rendered local lights in render order
    pub lights: Vec<LightShadow>,
    /// Directional cascades; `None` without a shadow-casting directional
    pub directional: Option<DirectionalShadow>,
    /// Spot-light tile plan for the atlas sampling path
    pub atlas: AtlasPlan,
}

/// Scene and camera inputs for one frame
#[derive(Clone, Debug)]
pub struct FrameInputs<'a> {
    /// Ordered light descriptors from the scene layer
    pub lights: &'a [LightDesc],
    /// Camera view matrix (column-major)
    pub camera_view: [[f32; 4]; 4],
    /// Camera projection matrix (column-major)
    pub camera_proj: [[f32; 4]; 4],
    /// Camera near plane
    pub camera_near: f32,
    /// Camera far plane
    pub camera_far: f32,
}

impl<'a> FrameInputs<'a> {
    /// Inputs with an identity camera; enough for scheduling tests and
    /// scenes that only use local lights
    pub fn new(lights: &'a [LightDesc]) -> Self {
        let identity = [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        Self {
            lights,
            camera_view: identity,
            camera_proj: identity,
            camera_near: 0.1,
            camera_far: 100.0,
        }
    }
}

/// Persistent scheduler state, owned exclusively by the render thread
///
/// Created once at scene-resource init, mutated in place every frame,
/// and reset wholesale on scene teardown. There are no hidden globals;
/// callers pass this into [`schedule_frame`] explicitly.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShadowSchedulerState {
    /// Layer bitmap and sticky ranges
    pub allocator: AllocatorState,
    /// Render history and the frame tick
    pub cadence: CadenceState,
    /// Spot-tile packer
    pub atlas: AtlasTilePlanner,
}

impl ShadowSchedulerState {
    /// Fresh state sized for a configuration
    pub fn new(config: &ShadowConfig) -> Self {
        Self {
            allocator: AllocatorState::new(config.max_layers),
            cadence: CadenceState::new(),
            atlas: AtlasTilePlanner::new(config.atlas_size),
        }
    }

    /// Full reset for scene teardown or resource rebuild
    pub fn reset(&mut self) {
        self.allocator.reset();
        self.cadence.reset();
        self.atlas.reset();
    }
}

/// Run one scheduling pass
///
/// The result is atomic from the consumer's point of view: either the
/// whole schedule is adopted or, on scene reload, discarded together
/// with a state reset.
pub fn schedule_frame(
    state: &mut ShadowSchedulerState,
    config: &ShadowConfig,
    inputs: &FrameInputs<'_>,
) -> FrameSchedule {
    let frame = state.cadence.begin_frame();

    if !config.enabled {
        return FrameSchedule {
            frame,
            ..Default::default()
        };
    }

    // Normalize descriptors; the first shadow-casting directional light
    // takes the dedicated cascade path, everything else competes for the
    // layer budget
    let mut directional_candidate: Option<LightCandidate> = None;
    let mut locals: Vec<LightCandidate> = Vec::new();
    for desc in inputs.lights {
        if !desc.casts_shadows {
            continue;
        }
        let candidate = LightCandidate::from_desc(desc);
        match candidate.kind {
            LightKind::Directional => {
                if directional_candidate.is_none() {
                    directional_candidate = Some(candidate);
                }
            }
            LightKind::Point | LightKind::Spot => locals.push(candidate),
        }
    }

    // Drop history for lights that left the scene
    let present: BTreeSet<LightKey> = locals.iter().map(|c| c.key).collect();
    state.allocator.retain_sticky(|key| present.contains(&key));
    state.cadence.retain(|key| present.contains(&key));

    let mut ranked = rank::rank_candidates(&locals, &state.cadence);
    let parity = rank::apply_type_parity(&mut ranked, config);

    state.allocator.begin_frame(config.max_layers);

    // Cadence pass; skipped lights keep their slices reserved so nothing
    // renders over a map that is still being sampled
    let decisions: Vec<CadenceDecision> = ranked
        .iter()
        .map(|rc| cadence::evaluate(&state.cadence, config, rc.candidate.key, rc.rank))
        .collect();
    for (rc, decision) in ranked.iter().zip(&decisions) {
        if *decision == CadenceDecision::Skip {
            state
                .allocator
                .reserve_sticky(rc.candidate.key, rc.candidate.layer_cost());
        }
    }

    // Allocation pass in rank order
    let mut selection = ShadowSelection::default();
    let mut lights: Vec<LightShadow> = Vec::new();
    let mut assigned_lights = 0u32;
    let mut assigned_faces = 0u32;
    let mut parity_pending = parity.reservation;

    for (rc, decision) in ranked.iter().zip(&decisions) {
        let key = rc.candidate.key;
        let cost = rc.candidate.layer_cost();
        let mut entry = SelectionEntry {
            key,
            kind: rc.candidate.kind,
            rank: rc.rank,
            score: rc.score,
            assignment: None,
            defer_reason: None,
            stale_bypass: false,
        };

        if parity_pending == Some(key) {
            parity_pending = None;
        }

        if *decision == CadenceDecision::Skip {
            entry.defer_reason = Some(DeferReason::Cadence);
            selection.deferred.push(key);
            selection.stats.deferred += 1;
            selection.entries.push(entry);
            continue;
        }

        let over_lights = assigned_lights >= config.max_shadowed_lights;
        let over_faces = assigned_faces + cost > config.max_faces_per_frame;
        let blocks_reservation = parity_pending.is_some()
            && rc.candidate.kind == LightKind::Spot
            && !reservation_fits_after(state, config, assigned_lights, assigned_faces, cost);

        let allocation = if over_lights || over_faces || blocks_reservation {
            None
        } else {
            state.allocator.allocate(key, cost)
        };

        match allocation {
            Some(allocation) => {
                state.cadence.mark_rendered(key);
                assigned_lights += 1;
                assigned_faces += allocation.cost;
                selection.stats.rendered += 1;
                selection.stats.assigned_layers += allocation.cost;
                if allocation.reused {
                    selection.stats.reuses += 1;
                }
                if allocation.evicted {
                    selection.stats.evictions += 1;
                }
                if *decision == CadenceDecision::StaleBypass {
                    entry.stale_bypass = true;
                    selection.stats.stale_bypass_renders += 1;
                }

                entry.assignment = Some(allocation);
                selection.rendered.push(key);

                let matrices = match rc.candidate.kind {
                    LightKind::Point => {
                        cascade::point_matrix_set(rc.candidate.position, rc.candidate.range)
                    }
                    LightKind::Spot => cascade::spot_matrix_set(&rc.candidate),
                    // Directional lights never reach the allocator
                    LightKind::Directional => CascadeMatrixSet::default(),
                };
                lights.push(LightShadow {
                    key,
                    kind: rc.candidate.kind,
                    allocation,
                    matrices,
                });
            }
            None => {
                entry.defer_reason = Some(DeferReason::Budget);
                // A resident light that missed the cut keeps its slice
                state.allocator.reserve_sticky(key, cost);
                selection.deferred.push(key);
                selection.stats.deferred += 1;
            }
        }

        selection.entries.push(entry);
    }

    // Dedicated always-on path for the directional light
    let directional = directional_candidate.map(|candidate| DirectionalShadow {
        key: candidate.key,
        matrices: cascade::directional_cascades(
            &inputs.camera_view,
            &inputs.camera_proj,
            inputs.camera_near,
            inputs.camera_far,
            candidate.direction,
            config,
        ),
    });

    // Independent atlas pass over the rendered spot lights
    state.atlas.begin_frame(config.atlas_size);
    for light in &lights {
        if light.kind == LightKind::Spot {
            state.atlas.request(light.key, config.resolution);
        }
    }
    let atlas = state.atlas.plan();

    debug_assert_eq!(
        selection.stats.rendered + selection.stats.deferred,
        selection.entries.len() as u32
    );
    debug_assert!(selection.stats.assigned_layers <= config.max_layers);

    log::debug!(
        "shadow schedule: frame {} rendered {} deferred {} layers {} reuse {} evict {}",
        frame,
        selection.stats.rendered,
        selection.stats.deferred,
        selection.stats.assigned_layers,
        selection.stats.reuses,
        selection.stats.evictions,
    );

    FrameSchedule {
        frame,
        selection,
        lights,
        directional,
        atlas,
    }
}

/// Whether admitting a `cost`-slot spot still leaves room for the
/// parity-reserved point light
fn reservation_fits_after(
    state: &ShadowSchedulerState,
    config: &ShadowConfig,
    assigned_lights: u32,
    assigned_faces: u32,
    cost: u32,
) -> bool {
    let lights_left = config.max_shadowed_lights.saturating_sub(assigned_lights + 1);
    let faces_left = config
        .max_faces_per_frame
        .saturating_sub(assigned_faces + cost);
    let layers_left = config
        .max_layers
        .saturating_sub(state.allocator.used_count() + cost);

    lights_left >= 1 && faces_left >= POINT_LAYER_COST && layers_left >= POINT_LAYER_COST
}
