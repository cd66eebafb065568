//! Shadow Scheduler Configuration
//!
//! Budgets, cadence periods, and quality presets. Quality tiers provide
//! defaults for every knob; the scene layer can override individual values
//! through [`ShadowOverrides`] without touching the rest of the tier.

use serde::{Deserialize, Serialize};

use crate::cascade::MAX_CASCADES;

/// Global shadow scheduling configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShadowConfig {
    /// Enable shadow scheduling globally
    pub enabled: bool,

    /// Enable the cadence scheduler; when false every candidate is due
    /// every frame
    pub scheduler_enabled: bool,

    /// Maximum local (point/spot) lights shadowed per frame
    pub max_shadowed_lights: u32,

    /// Depth render-target layers available to local lights
    pub max_layers: u32,

    /// Layer/face renders allowed per frame; bounds render work
    /// independently of layer residency
    pub max_faces_per_frame: u32,

    /// Refresh period for the rank-0 light, in frames
    pub hero_period: u64,

    /// Refresh period for ranks 1-2, in frames
    pub mid_period: u64,

    /// Refresh period for ranks 3 and beyond, in frames
    pub distant_period: u64,

    /// Minimum light budget before type parity is considered
    pub parity_min_lights: u32,

    /// Minimum layer budget before type parity is considered
    pub parity_min_layers: u32,

    /// Cascade count for directional lights (1-4)
    pub cascade_count: u32,

    /// Cascade split lambda (0 = linear, 1 = logarithmic)
    pub cascade_lambda: f32,

    /// Maximum shadow distance from camera
    pub shadow_distance: f32,

    /// Target shadow map resolution; also the atlas tile size
    pub resolution: u32,

    /// Side length of the shared 2D spot-shadow atlas
    pub atlas_size: u32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        QualityTier::Medium.to_config()
    }
}

impl ShadowConfig {
    /// Configuration with shadows disabled
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..QualityTier::Medium.to_config()
        }
    }

    /// Apply scene-layer overrides on top of this configuration
    pub fn with_overrides(mut self, overrides: &ShadowOverrides) -> Self {
        if let Some(v) = overrides.max_shadowed_lights {
            self.max_shadowed_lights = v;
        }
        if let Some(v) = overrides.max_layers {
            self.max_layers = v;
        }
        if let Some(v) = overrides.max_faces_per_frame {
            self.max_faces_per_frame = v;
        }
        if let Some(v) = overrides.hero_period {
            self.hero_period = v;
        }
        if let Some(v) = overrides.mid_period {
            self.mid_period = v;
        }
        if let Some(v) = overrides.distant_period {
            self.distant_period = v;
        }
        if let Some(v) = overrides.scheduler_enabled {
            self.scheduler_enabled = v;
        }
        self.validate();
        self
    }

    /// Clamp every field into its documented range
    pub fn validate(&mut self) {
        self.max_shadowed_lights = self.max_shadowed_lights.clamp(1, 64);
        self.max_layers = self.max_layers.clamp(1, 256);
        self.max_faces_per_frame = self.max_faces_per_frame.clamp(1, self.max_layers);
        self.hero_period = self.hero_period.max(1);
        self.mid_period = self.mid_period.max(1);
        self.distant_period = self.distant_period.max(1);
        self.parity_min_lights = self.parity_min_lights.max(1);
        self.parity_min_layers = self.parity_min_layers.max(1);
        self.cascade_count = self.cascade_count.clamp(1, MAX_CASCADES as u32);
        self.cascade_lambda = self.cascade_lambda.clamp(0.0, 1.0);
        self.shadow_distance = self.shadow_distance.max(1.0);
        self.resolution = self.resolution.clamp(256, 8192).next_power_of_two();
        self.atlas_size = self.atlas_size.clamp(512, 16384).next_power_of_two();
        self.resolution = self.resolution.min(self.atlas_size);
    }
}

/// Optional per-scene knobs layered over a quality tier
///
/// Unset fields keep their tier defaults.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ShadowOverrides {
    /// Override for [`ShadowConfig::max_shadowed_lights`]
    pub max_shadowed_lights: Option<u32>,
    /// Override for [`ShadowConfig::max_layers`]
    pub max_layers: Option<u32>,
    /// Override for [`ShadowConfig::max_faces_per_frame`]
    pub max_faces_per_frame: Option<u32>,
    /// Override for [`ShadowConfig::hero_period`]
    pub hero_period: Option<u64>,
    /// Override for [`ShadowConfig::mid_period`]
    pub mid_period: Option<u64>,
    /// Override for [`ShadowConfig::distant_period`]
    pub distant_period: Option<u64>,
    /// Override for [`ShadowConfig::scheduler_enabled`]
    pub scheduler_enabled: Option<bool>,
}

/// Shadow quality preset selecting default budgets
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityTier {
    /// No shadows
    Off,
    /// One hero light plus change
    Low,
    /// Balanced quality and performance
    Medium,
    /// Generous budgets for desktop GPUs
    High,
    /// Everything shadowed that fits
    Ultra,
}

impl QualityTier {
    /// Convert to a full configuration
    pub fn to_config(self) -> ShadowConfig {
        let base = ShadowConfig {
            enabled: true,
            scheduler_enabled: true,
            max_shadowed_lights: 4,
            max_layers: 13,
            max_faces_per_frame: 12,
            hero_period: 1,
            mid_period: 2,
            distant_period: 4,
            parity_min_lights: 2,
            parity_min_layers: 7,
            cascade_count: 4,
            cascade_lambda: 0.7,
            shadow_distance: 100.0,
            resolution: 2048,
            atlas_size: 4096,
        };

        match self {
            Self::Off => ShadowConfig {
                enabled: false,
                ..base
            },
            Self::Low => ShadowConfig {
                max_shadowed_lights: 2,
                max_layers: 7,
                max_faces_per_frame: 7,
                cascade_count: 2,
                shadow_distance: 50.0,
                resolution: 1024,
                atlas_size: 2048,
                ..base
            },
            Self::Medium => base,
            Self::High => ShadowConfig {
                max_shadowed_lights: 8,
                max_layers: 25,
                max_faces_per_frame: 18,
                shadow_distance: 150.0,
                ..base
            },
            Self::Ultra => ShadowConfig {
                max_shadowed_lights: 16,
                max_layers: 49,
                max_faces_per_frame: 24,
                shadow_distance: 200.0,
                resolution: 4096,
                atlas_size: 8192,
                ..base
            },
        }
    }
}
