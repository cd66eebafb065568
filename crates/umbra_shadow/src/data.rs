//! GPU Shadow Data Structures
//!
//! GPU-compatible mirrors of a frame schedule for uniform upload. All
//! structures are bytemuck Pod/Zeroable for direct byte casting; the
//! backend owns the actual buffers.

use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use crate::cascade::MAX_CASCADES;
use crate::config::ShadowConfig;
use crate::scheduler::FrameSchedule;

/// One shadowed layer slot: a spot map or a single cubemap face
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuShadowSlot {
    /// Light-space view-projection matrix
    pub matrix: [[f32; 4]; 4],

    /// Render-target layer index (0-based for the GPU)
    pub layer: i32,

    /// Texel size for filtering (1.0 / resolution)
    pub texel_size: f32,

    /// Shadow strength (0-1)
    pub strength: f32,

    /// Padding to 16-byte alignment
    pub _pad: f32,
}

/// Directional cascade data for shader uniforms
#[repr(C)]
#[derive(Clone, Copy, Debug, Serialize, Deserialize, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuCascadeShadow {
    /// View-projection matrices for each cascade
    pub matrices: [[[f32; 4]; 4]; MAX_CASCADES],

    /// Cascade end distances (view-space depth)
    pub splits: [f32; MAX_CASCADES],

    /// Target layer per cascade; -1 when inactive
    pub layers: [i32; MAX_CASCADES],

    /// Number of active cascades
    pub cascade_count: u32,

    /// Padding to 16-byte alignment
    pub _pad: [f32; 3],
}

impl Default for GpuCascadeShadow {
    fn default() -> Self {
        Self {
            matrices: [[[0.0; 4]; 4]; MAX_CASCADES],
            splits: [0.0; MAX_CASCADES],
            layers: [-1; MAX_CASCADES],
            cascade_count: 0,
            _pad: [0.0; 3],
        }
    }
}

impl GpuCascadeShadow {
    /// Whether the directional path produced cascades this frame
    pub fn is_enabled(&self) -> bool {
        self.cascade_count > 0 && self.layers[0] >= 0
    }
}

/// Header with counts and dimensions for the shadow uniform block
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuShadowHeader {
    /// Number of populated layer slots
    pub slot_count: u32,
    /// Number of rendered local lights
    pub light_count: u32,
    /// 1 when directional cascades are active
    pub directional_count: u32,
    /// Shadow map resolution
    pub resolution: u32,
    /// Atlas texture side length
    pub atlas_size: u32,
    /// Atlas tiles allocated this frame
    pub tile_count: u32,
    /// Padding to 16-byte alignment
    pub _pad: [u32; 2],
}

/// All shadow uniform data for one frame, ready for upload
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ShadowUniformSet {
    /// Block header
    pub header: GpuShadowHeader,
    /// Per-slot records in render order
    pub slots: Vec<GpuShadowSlot>,
    /// Directional cascades
    pub directional: GpuCascadeShadow,
}

impl ShadowUniformSet {
    /// Flatten a frame schedule into upload-ready records
    pub fn from_schedule(schedule: &FrameSchedule, config: &ShadowConfig) -> Self {
        let texel_size = 1.0 / config.resolution.max(1) as f32;

        let mut slots = Vec::new();
        for light in &schedule.lights {
            for face in 0..light.allocation.cost as usize {
                slots.push(GpuShadowSlot {
                    matrix: light.matrices.matrices[face],
                    layer: (light.allocation.base - 1) as i32 + face as i32,
                    texel_size,
                    strength: 1.0,
                    _pad: 0.0,
                });
            }
        }

        let directional = match &schedule.directional {
            Some(shadow) => {
                let count = (shadow.matrices.count as usize).min(MAX_CASCADES);
                let mut gpu = GpuCascadeShadow {
                    cascade_count: count as u32,
                    ..Default::default()
                };
                for cascade in 0..count {
                    gpu.matrices[cascade] = shadow.matrices.matrices[cascade];
                    gpu.splits[cascade] = shadow.matrices.splits[cascade + 1];
                    gpu.layers[cascade] = cascade as i32;
                }
                gpu
            }
            None => GpuCascadeShadow::default(),
        };

        let header = GpuShadowHeader {
            slot_count: slots.len() as u32,
            light_count: schedule.lights.len() as u32,
            directional_count: if directional.is_enabled() { 1 } else { 0 },
            resolution: config.resolution,
            atlas_size: config.atlas_size,
            tile_count: schedule.atlas.tiles.len() as u32,
            _pad: [0; 2],
        };

        Self {
            header,
            slots,
            directional,
        }
    }

    /// Per-slot records as bytes
    pub fn slots_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.slots)
    }

    /// Directional cascade record as bytes
    pub fn directional_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(&self.directional)
    }

    /// Header as bytes
    pub fn header_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(&self.header)
    }
}
