//! Light Candidate Model
//!
//! Normalized per-frame light records for shadow scheduling. Scene-layer
//! descriptors are sanitized into [`LightCandidate`]s once per frame; the
//! candidate set is immutable for the remainder of the frame.
//!
//! Candidates carry a [`LightKey`] that stays stable across frames so the
//! allocator can preserve layer assignments without relying on object
//! identity. Explicit ids hash directly; lights without one get a key
//! synthesized from their kind and quantized position.

use alloc::string::String;
use core::fmt;
use serde::{Deserialize, Serialize};

/// Light type, dispatched by `match` throughout the scheduler
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LightKind {
    /// Sun-style light; always-on cascade path, never enters the allocator
    Directional,
    /// Omnidirectional light; renders six cubemap faces
    Point,
    /// Cone light; renders a single perspective map
    Spot,
}

/// A spot light renders into a single render-target layer
pub const SPOT_LAYER_COST: u32 = 1;
/// A point light needs six contiguous layers, one per cubemap face
pub const POINT_LAYER_COST: u32 = 6;

impl LightKind {
    /// Layer slots consumed when this light renders a shadow map
    pub fn layer_cost(&self) -> u32 {
        match self {
            LightKind::Directional => 0,
            LightKind::Point => POINT_LAYER_COST,
            LightKind::Spot => SPOT_LAYER_COST,
        }
    }
}

/// Raw light descriptor handed over by the scene layer
///
/// Fields may be missing or out of range; [`LightCandidate::from_desc`]
/// normalizes everything before scheduling.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LightDesc {
    /// Explicit stable id; empty or missing ids get a synthesized key
    pub id: Option<String>,
    /// Light type
    pub kind: LightKind,
    /// World-space position
    pub position: [f32; 3],
    /// World-space direction (directional/spot)
    pub direction: [f32; 3],
    /// Effective range in world units
    pub range: f32,
    /// Luminous intensity
    pub intensity: f32,
    /// Inner cone angle in radians (spot)
    pub inner_angle: f32,
    /// Outer cone angle in radians (spot)
    pub outer_angle: f32,
    /// Participates in shadow scheduling at all
    pub casts_shadows: bool,
}

impl LightDesc {
    /// Descriptor for a directional light
    pub fn directional(direction: [f32; 3], intensity: f32) -> Self {
        Self {
            id: None,
            kind: LightKind::Directional,
            position: [0.0; 3],
            direction,
            range: 0.0,
            intensity,
            inner_angle: 0.0,
            outer_angle: 0.0,
            casts_shadows: true,
        }
    }

    /// Descriptor for a point light
    pub fn point(position: [f32; 3], range: f32, intensity: f32) -> Self {
        Self {
            id: None,
            kind: LightKind::Point,
            position,
            direction: [0.0, -1.0, 0.0],
            range,
            intensity,
            inner_angle: 0.0,
            outer_angle: 0.0,
            casts_shadows: true,
        }
    }

    /// Descriptor for a spot light
    pub fn spot(
        position: [f32; 3],
        direction: [f32; 3],
        range: f32,
        intensity: f32,
        inner_angle: f32,
        outer_angle: f32,
    ) -> Self {
        Self {
            id: None,
            kind: LightKind::Spot,
            position,
            direction,
            range,
            intensity,
            inner_angle,
            outer_angle,
            casts_shadows: true,
        }
    }

    /// Attach an explicit stable id
    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(String::from(id));
        self
    }

    /// Set the shadow-casting flag
    pub fn with_shadows(mut self, casts: bool) -> Self {
        self.casts_shadows = casts;
        self
    }
}

/// Opaque stable key identifying a light across frames
///
/// The key replaces reference identity: the same scene light yields the
/// same key every frame, which is what the allocator's sticky map and the
/// cadence history are keyed on.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LightKey(u64);

impl LightKey {
    /// Derive a key from an explicit id string (FNV-1a)
    pub fn from_name(name: &str) -> Self {
        let mut hash = 0xcbf29ce484222325u64;
        for byte in name.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        Self(hash)
    }

    /// Synthesize a key from kind plus position quantized to a 0.01 grid
    ///
    /// Deterministic for lights that keep their transform between frames,
    /// which is the common case for ids the scene layer never assigned.
    pub fn synthesize(kind: LightKind, position: [f32; 3]) -> Self {
        let tag: u8 = match kind {
            LightKind::Directional => 0,
            LightKind::Point => 1,
            LightKind::Spot => 2,
        };

        let mut hash = 0xcbf29ce484222325u64;
        let mut mix = |byte: u8| {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        };

        mix(tag);
        for component in position {
            let quantized = if component.is_finite() {
                (component * 100.0) as i64
            } else {
                0
            };
            for byte in quantized.to_le_bytes() {
                mix(byte);
            }
        }

        Self(hash)
    }

    /// Raw key bits
    pub const fn to_bits(&self) -> u64 {
        self.0
    }

    /// Reconstruct a key from raw bits
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }
}

impl fmt::Debug for LightKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LightKey({:016x})", self.0)
    }
}

impl fmt::Display for LightKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Normalized, frame-immutable shadow candidate
#[derive(Clone, Debug)]
pub struct LightCandidate {
    /// Stable identity across frames
    pub key: LightKey,
    /// Light type
    pub kind: LightKind,
    /// Sanitized world position
    pub position: [f32; 3],
    /// Unit direction; defaults to straight down when degenerate
    pub direction: [f32; 3],
    /// Range clamped to be non-negative and finite
    pub range: f32,
    /// Intensity clamped to be non-negative and finite
    pub intensity: f32,
    /// Cosine of the inner cone angle (spot)
    pub inner_cos: f32,
    /// Cosine of the outer cone angle (spot)
    pub outer_cos: f32,
    /// Shadow-casting flag
    pub casts_shadows: bool,
}

/// Fallback cone half-angle for spots with a missing or degenerate cone
const DEFAULT_OUTER_ANGLE: f32 = 0.785398; // 45 degrees

impl LightCandidate {
    /// Normalize a raw descriptor into a candidate
    ///
    /// Malformed inputs are repaired, never rejected: bad scheduling input
    /// degrades to fewer or coarser shadows, not a dropped frame.
    pub fn from_desc(desc: &LightDesc) -> Self {
        let position = sanitize_vec(desc.position);
        let direction = normalize_or_down(desc.direction);
        let range = sanitize_scalar(desc.range);
        let intensity = sanitize_scalar(desc.intensity);

        let outer = if desc.outer_angle.is_finite() && desc.outer_angle > 0.0 {
            desc.outer_angle.min(core::f32::consts::FRAC_PI_2)
        } else {
            DEFAULT_OUTER_ANGLE
        };
        let inner = if desc.inner_angle.is_finite() && desc.inner_angle > 0.0 {
            desc.inner_angle.min(outer)
        } else {
            outer * 0.8
        };

        let key = match desc.id.as_deref() {
            Some(id) if !id.trim().is_empty() => LightKey::from_name(id),
            _ => LightKey::synthesize(desc.kind, position),
        };

        Self {
            key,
            kind: desc.kind,
            position,
            direction,
            range,
            intensity,
            inner_cos: inner.cos(),
            outer_cos: outer.cos(),
            casts_shadows: desc.casts_shadows,
        }
    }

    /// Layer slots this candidate occupies when rendered
    pub fn layer_cost(&self) -> u32 {
        self.kind.layer_cost()
    }
}

fn sanitize_scalar(value: f32) -> f32 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

fn sanitize_vec(v: [f32; 3]) -> [f32; 3] {
    [
        if v[0].is_finite() { v[0] } else { 0.0 },
        if v[1].is_finite() { v[1] } else { 0.0 },
        if v[2].is_finite() { v[2] } else { 0.0 },
    ]
}

fn normalize_or_down(v: [f32; 3]) -> [f32; 3] {
    let v = sanitize_vec(v);
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len > 1e-4 {
        [v[0] / len, v[1] / len, v[2] / len]
    } else {
        [0.0, -1.0, 0.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_from_name_deterministic() {
        let a = LightKey::from_name("hall_lamp");
        let b = LightKey::from_name("hall_lamp");
        let c = LightKey::from_name("hall_lamp2");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_key_synthesis_quantized() {
        // Sub-grid jitter maps to the same key
        let a = LightKey::synthesize(LightKind::Point, [1.0, 2.0, 3.0]);
        let b = LightKey::synthesize(LightKind::Point, [1.001, 2.001, 3.001]);
        assert_eq!(a, b);

        // A grid step away is a different key
        let c = LightKey::synthesize(LightKind::Point, [1.05, 2.0, 3.0]);
        assert_ne!(a, c);

        // Same position, different kind
        let d = LightKey::synthesize(LightKind::Spot, [1.0, 2.0, 3.0]);
        assert_ne!(a, d);
    }

    #[test]
    fn test_explicit_id_wins_over_synthesis() {
        let desc = LightDesc::point([5.0, 1.0, 0.0], 10.0, 100.0).with_id("torch");
        let candidate = LightCandidate::from_desc(&desc);
        assert_eq!(candidate.key, LightKey::from_name("torch"));

        let blank = LightDesc::point([5.0, 1.0, 0.0], 10.0, 100.0).with_id("   ");
        let candidate = LightCandidate::from_desc(&blank);
        assert_eq!(
            candidate.key,
            LightKey::synthesize(LightKind::Point, [5.0, 1.0, 0.0])
        );
    }

    #[test]
    fn test_normalization_repairs_bad_input() {
        let mut desc = LightDesc::spot(
            [f32::NAN, 1.0, 2.0],
            [0.0, 0.0, 0.0],
            -5.0,
            f32::INFINITY,
            -1.0,
            f32::NAN,
        );
        desc.casts_shadows = true;

        let candidate = LightCandidate::from_desc(&desc);

        assert_eq!(candidate.position, [0.0, 1.0, 2.0]);
        assert_eq!(candidate.direction, [0.0, -1.0, 0.0]);
        assert_eq!(candidate.range, 0.0);
        assert_eq!(candidate.intensity, 0.0);
        assert!((candidate.outer_cos - DEFAULT_OUTER_ANGLE.cos()).abs() < 1e-5);
        assert!(candidate.inner_cos >= candidate.outer_cos);
    }

    #[test]
    fn test_layer_costs() {
        assert_eq!(LightKind::Spot.layer_cost(), 1);
        assert_eq!(LightKind::Point.layer_cost(), 6);
        assert_eq!(LightKind::Directional.layer_cost(), 0);
    }

    #[test]
    fn test_direction_normalized() {
        let desc = LightDesc::spot([0.0; 3], [0.0, 0.0, 10.0], 5.0, 1.0, 0.3, 0.6);
        let candidate = LightCandidate::from_desc(&desc);
        let d = candidate.direction;
        let len = (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt();
        assert!((len - 1.0).abs() < 1e-5);
    }
}
