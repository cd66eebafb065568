//! # umbra_shadow - Per-Frame Shadow Resource Scheduling
//!
//! Backend-agnostic shadow scheduling for a real-time renderer: given a
//! scene's shadow-casting lights and a hard budget of depth render-target
//! layers and atlas space, decide which lights get a shadow map this
//! frame, where each renders, how often each refreshes, and what
//! light-space matrices to use.
//!
//! # Architecture
//!
//! The scheduler is a strict per-frame pipeline:
//!
//! 1. **Rank**: score candidates by priority and time-since-last-render
//! 2. **Parity**: keep a representative of each light type in the window
//! 3. **Cadence**: refresh-period tiers with a staleness bypass
//! 4. **Layers**: sticky bin-packing into the fixed layer budget
//! 5. **Matrices / Atlas**: cascade, spot, and cubemap-face projections,
//!    plus 2D tile planning for the spot atlas path
//!
//! Directional lights bypass the allocator entirely on a dedicated
//! cascade path.
//!
//! # Usage
//!
//! ```ignore
//! use umbra_shadow::*;
//!
//! // Resolve a configuration from a quality tier plus scene overrides
//! let config = QualityTier::High.to_config().with_overrides(&overrides);
//!
//! // Persistent state, created once per scene
//! let mut state = ShadowSchedulerState::new(&config);
//!
//! // Once per frame
//! let schedule = schedule_frame(&mut state, &config, &FrameInputs {
//!     lights: &scene_lights,
//!     camera_view,
//!     camera_proj,
//!     camera_near: 0.1,
//!     camera_far: 500.0,
//! });
//!
//! // Hand the results to the draw and upload layers
//! for light in &schedule.lights {
//!     record_depth_passes(light.key, light.allocation, &light.matrices);
//! }
//! let uniforms = ShadowUniformSet::from_schedule(&schedule, &config);
//! queue.write_buffer(&shadow_buffer, 0, uniforms.slots_bytes());
//!
//! // On scene reload
//! state.reset();
//! ```
//!
//! # Error Handling
//!
//! Scheduling never fails: running out of budget defers lights, malformed
//! inputs are normalized, and a degenerate camera degrades directional
//! cascades to identity matrices. Every anomaly means fewer shadows this
//! frame, never a lost frame.
//!
//! # Hot-Reload Support
//!
//! Configuration and persistent state support serde serialization so a
//! reloaded scene can resume with its layer assignments intact.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod atlas;
pub mod cadence;
pub mod cascade;
pub mod config;
pub mod data;
pub mod layers;
pub mod light;
pub mod rank;
pub mod scheduler;

// Re-exports
pub use config::{QualityTier, ShadowConfig, ShadowOverrides};

pub use light::{
    LightCandidate, LightDesc, LightKey, LightKind, POINT_LAYER_COST, SPOT_LAYER_COST,
};

pub use rank::{apply_type_parity, priority_score, rank_candidates, ParityOutcome, RankedCandidate};

pub use cadence::{tier_period, CadenceDecision, CadenceState, NEVER_RENDERED_AGE};

pub use layers::{Allocation, AllocatorState};

pub use cascade::{
    calculate_splits, directional_cascades, point_matrix_set, spot_matrix, spot_matrix_set,
    CascadeMatrixSet, MAX_CASCADES, MAX_SHADOW_MATRICES,
};

pub use atlas::{AtlasPlan, AtlasTile, AtlasTilePlanner, TilePlacement};

pub use scheduler::{
    schedule_frame, DeferReason, DirectionalShadow, FrameInputs, FrameSchedule, LightShadow,
    SelectionEntry, SelectionStats, ShadowSchedulerState, ShadowSelection,
};

pub use data::{GpuCascadeShadow, GpuShadowHeader, GpuShadowSlot, ShadowUniformSet};
