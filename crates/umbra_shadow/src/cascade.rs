//! Cascade and Light-Space Matrix Building
//!
//! Computes the view-projection matrices for every granted shadow slot:
//! frustum-split cascades for directional lights, a single perspective
//! matrix for spot lights, and six cubemap-face matrices for point lights.
//! Backend-agnostic; only the mathematical calculations live here.
//!
//! Matrices are column-major with Vulkan/wgpu depth range [0, 1]. Every
//! slot of a returned [`CascadeMatrixSet`] is always written: slots past
//! the active count replicate the last valid matrix so consumers never
//! read uninitialized data.

use serde::{Deserialize, Serialize};

use crate::config::ShadowConfig;
use crate::light::LightCandidate;

/// Maximum supported cascade count
pub const MAX_CASCADES: usize = 4;

/// Matrix slots per light: the cubemap face budget
pub const MAX_SHADOW_MATRICES: usize = 6;

/// Near plane for spot and point shadow projections
const LOCAL_SHADOW_NEAR: f32 = 0.05;

/// Spot field-of-view clamp, radians (20 to 120 degrees)
const SPOT_FOV_MIN: f32 = 0.349066;
const SPOT_FOV_MAX: f32 = 2.094395;

/// Minimum depth pad applied to directional cascade fitting
const CASCADE_DEPTH_PAD: f32 = 10.0;

const IDENTITY_MATRIX: [[f32; 4]; 4] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// View-projection matrices for one light's shadow slots
///
/// Fixed length regardless of how many slots are active; split depths are
/// populated for directional cascades only.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CascadeMatrixSet {
    /// View-projection matrices, one per granted slot (column-major)
    pub matrices: [[[f32; 4]; 4]; MAX_SHADOW_MATRICES],

    /// Split distances: [0] = near plane, [1..count] = cascade ends
    pub splits: [f32; MAX_CASCADES + 1],

    /// Number of active slots (cascades or faces)
    pub count: u32,
}

impl Default for CascadeMatrixSet {
    fn default() -> Self {
        Self {
            matrices: [IDENTITY_MATRIX; MAX_SHADOW_MATRICES],
            splits: [0.0; MAX_CASCADES + 1],
            count: 0,
        }
    }
}

impl CascadeMatrixSet {
    /// Build a set from up to [`MAX_SHADOW_MATRICES`] active matrices
    ///
    /// Slots past the active count replicate the last valid matrix; an
    /// empty input yields all-identity.
    pub fn from_matrices(active: &[[[f32; 4]; 4]]) -> Self {
        let mut set = Self::default();
        let count = active.len().min(MAX_SHADOW_MATRICES);

        let mut last = IDENTITY_MATRIX;
        for slot in 0..MAX_SHADOW_MATRICES {
            if slot < count {
                last = active[slot];
            }
            set.matrices[slot] = last;
        }
        set.count = count as u32;
        set
    }

    /// True when every element of every slot is a finite number
    pub fn all_finite(&self) -> bool {
        self.matrices
            .iter()
            .flatten()
            .flatten()
            .all(|v| v.is_finite())
    }
}

/// Calculate cascade splits using the practical split scheme
///
/// Blends between logarithmic and linear splits based on lambda:
/// lambda = 0 gives uniform view-space splits, lambda = 1 gives
/// screen-space-uniform logarithmic splits.
pub fn calculate_splits(near: f32, far: f32, cascade_count: u32, lambda: f32) -> [f32; MAX_CASCADES + 1] {
    let mut splits = [0.0f32; MAX_CASCADES + 1];
    let count = cascade_count.clamp(1, MAX_CASCADES as u32) as usize;
    let lambda = lambda.clamp(0.0, 1.0);
    let near = near.max(0.001);
    let far = far.max(near + 0.001);

    splits[0] = near;

    for i in 1..=count {
        let p = i as f32 / count as f32;

        let log_split = near * (far / near).powf(p);
        let lin_split = near + (far - near) * p;

        splits[i] = lambda * log_split + (1.0 - lambda) * lin_split;
    }

    for i in (count + 1)..=MAX_CASCADES {
        splits[i] = far;
    }

    splits
}

/// Build the cascade matrix set for a directional light
///
/// Splits the camera frustum between the near plane and the shadow
/// distance, fits a light-space orthographic projection around each
/// slice, and snaps translation to the texel grid. A non-invertible
/// camera view-projection degrades to identity matrices for the frame.
pub fn directional_cascades(
    camera_view: &[[f32; 4]; 4],
    camera_proj: &[[f32; 4]; 4],
    camera_near: f32,
    camera_far: f32,
    light_direction: [f32; 3],
    config: &ShadowConfig,
) -> CascadeMatrixSet {
    let cascades = config.cascade_count.clamp(1, MAX_CASCADES as u32);
    let camera_near = camera_near.max(0.001);
    let camera_far = camera_far.max(camera_near + 0.001);
    let shadow_far = config.shadow_distance.clamp(camera_near + 0.001, camera_far);

    let splits = calculate_splits(camera_near, shadow_far, cascades, config.cascade_lambda);

    let mut set = CascadeMatrixSet {
        splits,
        count: cascades,
        ..Default::default()
    };

    let view_proj = multiply_mat4(camera_proj, camera_view);
    let inv_view_proj = match try_invert_mat4(&view_proj) {
        Some(inv) => inv,
        None => {
            log::warn!("shadow cascades: degenerate camera view-projection, using identity");
            return set;
        }
    };

    let frustum = frustum_corners_world(&inv_view_proj);
    let light_direction = normalize_or(light_direction, [0.0, -1.0, 0.0]);
    let up = find_up_vector(light_direction);

    let mut last = IDENTITY_MATRIX;
    for cascade in 0..cascades as usize {
        let corners = slice_corners(
            &frustum,
            camera_near,
            camera_far,
            splits[cascade],
            splits[cascade + 1],
        );
        let matrix = fit_cascade(&corners, light_direction, up, config.resolution);
        set.matrices[cascade] = matrix;
        last = matrix;
    }
    for slot in cascades as usize..MAX_SHADOW_MATRICES {
        set.matrices[slot] = last;
    }

    set
}

/// Single perspective matrix for a spot light
///
/// Field of view is twice the outer cone angle, clamped to a sane range
/// so degenerate cones still produce a usable projection.
pub fn spot_matrix(candidate: &LightCandidate) -> [[f32; 4]; 4] {
    let outer_cos = candidate.outer_cos.clamp(-1.0, 1.0);
    let fov = (2.0 * outer_cos.acos()).clamp(SPOT_FOV_MIN, SPOT_FOV_MAX);
    let far = candidate.range.max(1.0);

    let target = [
        candidate.position[0] + candidate.direction[0],
        candidate.position[1] + candidate.direction[1],
        candidate.position[2] + candidate.direction[2],
    ];
    let view = look_at(
        candidate.position,
        target,
        find_up_vector(candidate.direction),
    );
    let proj = perspective(fov, 1.0, LOCAL_SHADOW_NEAR, far);

    multiply_mat4(&proj, &view)
}

/// Matrix set for a spot light: one active slot, replicated
pub fn spot_matrix_set(candidate: &LightCandidate) -> CascadeMatrixSet {
    CascadeMatrixSet::from_matrices(&[spot_matrix(candidate)])
}

/// Cubemap-face view directions: +X, -X, +Y, -Y, +Z, -Z
const FACE_DIRECTIONS: [[f32; 3]; 6] = [
    [1.0, 0.0, 0.0],
    [-1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, -1.0, 0.0],
    [0.0, 0.0, 1.0],
    [0.0, 0.0, -1.0],
];

/// Matrix set for a point light: six 90-degree cubemap faces
pub fn point_matrix_set(position: [f32; 3], range: f32) -> CascadeMatrixSet {
    let far = range.max(1.0);
    let proj = perspective(core::f32::consts::FRAC_PI_2, 1.0, LOCAL_SHADOW_NEAR, far);

    let mut faces = [[[0.0f32; 4]; 4]; MAX_SHADOW_MATRICES];
    for (face, direction) in FACE_DIRECTIONS.iter().enumerate() {
        let target = [
            position[0] + direction[0],
            position[1] + direction[1],
            position[2] + direction[2],
        ];
        let view = look_at(position, target, find_up_vector(*direction));
        faces[face] = multiply_mat4(&proj, &view);
    }

    CascadeMatrixSet::from_matrices(&faces)
}

// ============================================================================
// Cascade fitting
// ============================================================================

/// Unproject the eight NDC frustum corners to world space
///
/// First four corners lie on the near plane, last four on the far plane,
/// paired by index for slice interpolation.
fn frustum_corners_world(inv_view_proj: &[[f32; 4]; 4]) -> [[f32; 3]; 8] {
    let ndc_corners = [
        // Near plane (z = 0 in Vulkan/wgpu NDC)
        [-1.0, -1.0, 0.0, 1.0],
        [1.0, -1.0, 0.0, 1.0],
        [-1.0, 1.0, 0.0, 1.0],
        [1.0, 1.0, 0.0, 1.0],
        // Far plane (z = 1)
        [-1.0, -1.0, 1.0, 1.0],
        [1.0, -1.0, 1.0, 1.0],
        [-1.0, 1.0, 1.0, 1.0],
        [1.0, 1.0, 1.0, 1.0],
    ];

    let mut world_corners = [[0.0f32; 3]; 8];

    for (i, ndc) in ndc_corners.iter().enumerate() {
        let world = transform_vec4(inv_view_proj, *ndc);
        let w = if world[3].abs() > 1e-10 { world[3] } else { 1.0 };
        world_corners[i] = [world[0] / w, world[1] / w, world[2] / w];
    }

    world_corners
}

/// Corners of the sub-frustum between two view depths
///
/// Frustum edges are straight lines, so the corner at depth `d` is a
/// linear blend of the paired near and far corners.
fn slice_corners(
    frustum: &[[f32; 3]; 8],
    camera_near: f32,
    camera_far: f32,
    slice_near: f32,
    slice_far: f32,
) -> [[f32; 3]; 8] {
    let span = (camera_far - camera_near).max(0.001);
    let t_near = ((slice_near - camera_near) / span).clamp(0.0, 1.0);
    let t_far = ((slice_far - camera_near) / span).clamp(0.0, 1.0);

    let mut corners = [[0.0f32; 3]; 8];
    for edge in 0..4 {
        let near = frustum[edge];
        let far = frustum[edge + 4];
        corners[edge] = lerp_vec3(near, far, t_near);
        corners[edge + 4] = lerp_vec3(near, far, t_far);
    }
    corners
}

/// Fit an orthographic light projection around one cascade slice
fn fit_cascade(
    corners: &[[f32; 3]; 8],
    light_direction: [f32; 3],
    up: [f32; 3],
    resolution: u32,
) -> [[f32; 4]; 4] {
    let (center, radius) = bounding_sphere(corners);

    let eye = [
        center[0] - light_direction[0] * radius * 2.0,
        center[1] - light_direction[1] * radius * 2.0,
        center[2] - light_direction[2] * radius * 2.0,
    ];
    let view = look_at(eye, center, up);

    // Light-space AABB of the slice corners
    let mut min = [f32::MAX; 3];
    let mut max = [f32::MIN; 3];
    for corner in corners {
        let p = transform_vec4(&view, [corner[0], corner[1], corner[2], 1.0]);
        for axis in 0..3 {
            min[axis] = min[axis].min(p[axis]);
            max[axis] = max[axis].max(p[axis]);
        }
    }

    // Guard against a collapsed slice
    for axis in 0..2 {
        if max[axis] - min[axis] < 0.01 {
            min[axis] -= 0.005;
            max[axis] += 0.005;
        }
    }

    // Depth pad pulls the near plane back to catch casters outside the
    // slice; z is negative ahead of the light in view space
    let pad = radius.max(CASCADE_DEPTH_PAD);
    let near = -max[2] - pad;
    let far = -min[2] + pad;

    let proj = orthographic(min[0], max[0], min[1], max[1], near, far);
    let matrix = multiply_mat4(&proj, &view);

    snap_to_texel(matrix, resolution)
}

// ============================================================================
// Matrix Math Utilities
// ============================================================================

/// Multiply two 4x4 matrices (column-major)
pub fn multiply_mat4(a: &[[f32; 4]; 4], b: &[[f32; 4]; 4]) -> [[f32; 4]; 4] {
    let mut result = [[0.0f32; 4]; 4];

    for i in 0..4 {
        for j in 0..4 {
            result[i][j] = a[0][j] * b[i][0]
                + a[1][j] * b[i][1]
                + a[2][j] * b[i][2]
                + a[3][j] * b[i][3];
        }
    }

    result
}

/// Invert a 4x4 matrix (column-major); `None` when singular
pub fn try_invert_mat4(m: &[[f32; 4]; 4]) -> Option<[[f32; 4]; 4]> {
    let m00 = m[0][0]; let m01 = m[0][1]; let m02 = m[0][2]; let m03 = m[0][3];
    let m10 = m[1][0]; let m11 = m[1][1]; let m12 = m[1][2]; let m13 = m[1][3];
    let m20 = m[2][0]; let m21 = m[2][1]; let m22 = m[2][2]; let m23 = m[2][3];
    let m30 = m[3][0]; let m31 = m[3][1]; let m32 = m[3][2]; let m33 = m[3][3];

    let a2323 = m22 * m33 - m23 * m32;
    let a1323 = m21 * m33 - m23 * m31;
    let a1223 = m21 * m32 - m22 * m31;
    let a0323 = m20 * m33 - m23 * m30;
    let a0223 = m20 * m32 - m22 * m30;
    let a0123 = m20 * m31 - m21 * m30;
    let a2313 = m12 * m33 - m13 * m32;
    let a1313 = m11 * m33 - m13 * m31;
    let a1213 = m11 * m32 - m12 * m31;
    let a2312 = m12 * m23 - m13 * m22;
    let a1312 = m11 * m23 - m13 * m21;
    let a1212 = m11 * m22 - m12 * m21;
    let a0313 = m10 * m33 - m13 * m30;
    let a0213 = m10 * m32 - m12 * m30;
    let a0312 = m10 * m23 - m13 * m20;
    let a0212 = m10 * m22 - m12 * m20;
    let a0113 = m10 * m31 - m11 * m30;
    let a0112 = m10 * m21 - m11 * m20;

    let det = m00 * (m11 * a2323 - m12 * a1323 + m13 * a1223)
        - m01 * (m10 * a2323 - m12 * a0323 + m13 * a0223)
        + m02 * (m10 * a1323 - m11 * a0323 + m13 * a0123)
        - m03 * (m10 * a1223 - m11 * a0223 + m12 * a0123);

    if det.abs() < 1e-10 || !det.is_finite() {
        return None;
    }

    let inv_det = 1.0 / det;

    Some([
        [
            inv_det * (m11 * a2323 - m12 * a1323 + m13 * a1223),
            inv_det * -(m01 * a2323 - m02 * a1323 + m03 * a1223),
            inv_det * (m01 * a2313 - m02 * a1313 + m03 * a1213),
            inv_det * -(m01 * a2312 - m02 * a1312 + m03 * a1212),
        ],
        [
            inv_det * -(m10 * a2323 - m12 * a0323 + m13 * a0223),
            inv_det * (m00 * a2323 - m02 * a0323 + m03 * a0223),
            inv_det * -(m00 * a2313 - m02 * a0313 + m03 * a0213),
            inv_det * (m00 * a2312 - m02 * a0312 + m03 * a0212),
        ],
        [
            inv_det * (m10 * a1323 - m11 * a0323 + m13 * a0123),
            inv_det * -(m00 * a1323 - m01 * a0323 + m03 * a0123),
            inv_det * (m00 * a1313 - m01 * a0313 + m03 * a0113),
            inv_det * -(m00 * a1312 - m01 * a0312 + m03 * a0112),
        ],
        [
            inv_det * -(m10 * a1223 - m11 * a0223 + m12 * a0123),
            inv_det * (m00 * a1223 - m01 * a0223 + m02 * a0123),
            inv_det * -(m00 * a1213 - m01 * a0213 + m02 * a0113),
            inv_det * (m00 * a1212 - m01 * a0212 + m02 * a0112),
        ],
    ])
}

/// Transform a vec4 by a matrix
pub fn transform_vec4(m: &[[f32; 4]; 4], v: [f32; 4]) -> [f32; 4] {
    [
        m[0][0] * v[0] + m[1][0] * v[1] + m[2][0] * v[2] + m[3][0] * v[3],
        m[0][1] * v[0] + m[1][1] * v[1] + m[2][1] * v[2] + m[3][1] * v[3],
        m[0][2] * v[0] + m[1][2] * v[1] + m[2][2] * v[2] + m[3][2] * v[3],
        m[0][3] * v[0] + m[1][3] * v[1] + m[2][3] * v[2] + m[3][3] * v[3],
    ]
}

/// Create a look-at view matrix (column-major)
pub fn look_at(eye: [f32; 3], target: [f32; 3], up: [f32; 3]) -> [[f32; 4]; 4] {
    let f = normalize_or(
        [
            target[0] - eye[0],
            target[1] - eye[1],
            target[2] - eye[2],
        ],
        [0.0, 0.0, -1.0],
    );

    let s = normalize_or(cross(f, up), [1.0, 0.0, 0.0]);
    let u = cross(s, f);

    [
        [s[0], u[0], -f[0], 0.0],
        [s[1], u[1], -f[1], 0.0],
        [s[2], u[2], -f[2], 0.0],
        [-dot(s, eye), -dot(u, eye), dot(f, eye), 1.0],
    ]
}

/// Create an orthographic projection matrix (column-major, depth [0, 1])
pub fn orthographic(
    left: f32,
    right: f32,
    bottom: f32,
    top: f32,
    near: f32,
    far: f32,
) -> [[f32; 4]; 4] {
    let rml = right - left;
    let tmb = top - bottom;
    let fmn = far - near;

    [
        [2.0 / rml, 0.0, 0.0, 0.0],
        [0.0, 2.0 / tmb, 0.0, 0.0],
        [0.0, 0.0, -1.0 / fmn, 0.0],
        [
            -(right + left) / rml,
            -(top + bottom) / tmb,
            -near / fmn,
            1.0,
        ],
    ]
}

/// Create a perspective projection matrix (column-major, depth [0, 1])
pub fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> [[f32; 4]; 4] {
    let f = 1.0 / (fov_y * 0.5).tan();
    let nmf = near - far;

    [
        [f / aspect, 0.0, 0.0, 0.0],
        [0.0, f, 0.0, 0.0],
        [0.0, 0.0, far / nmf, -1.0],
        [0.0, 0.0, near * far / nmf, 0.0],
    ]
}

/// Calculate the bounding sphere of a set of points
fn bounding_sphere(points: &[[f32; 3]; 8]) -> ([f32; 3], f32) {
    let mut center = [0.0f32; 3];
    for p in points {
        center[0] += p[0];
        center[1] += p[1];
        center[2] += p[2];
    }
    center[0] /= 8.0;
    center[1] /= 8.0;
    center[2] /= 8.0;

    let mut radius = 0.0f32;
    for p in points {
        let dx = p[0] - center[0];
        let dy = p[1] - center[1];
        let dz = p[2] - center[2];
        radius = radius.max((dx * dx + dy * dy + dz * dz).sqrt());
    }

    (center, radius)
}

/// Find a suitable up vector, flipping near the parallel degeneracy
pub fn find_up_vector(direction: [f32; 3]) -> [f32; 3] {
    if direction[1].abs() > 0.9 {
        [0.0, 0.0, 1.0]
    } else {
        [0.0, 1.0, 0.0]
    }
}

/// Snap matrix translation to the texel grid to prevent shadow swimming
fn snap_to_texel(mut matrix: [[f32; 4]; 4], resolution: u32) -> [[f32; 4]; 4] {
    if resolution == 0 {
        return matrix;
    }

    let origin = transform_vec4(&matrix, [0.0, 0.0, 0.0, 1.0]);
    let texel_size = 2.0 / resolution as f32;

    let snapped_x = (origin[0] / texel_size).round() * texel_size;
    let snapped_y = (origin[1] / texel_size).round() * texel_size;

    matrix[3][0] += snapped_x - origin[0];
    matrix[3][1] += snapped_y - origin[1];

    matrix
}

fn normalize_or(v: [f32; 3], fallback: [f32; 3]) -> [f32; 3] {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len > 1e-10 && len.is_finite() {
        [v[0] / len, v[1] / len, v[2] / len]
    } else {
        fallback
    }
}

fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn dot(a: [f32; 3], b: [f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn lerp_vec3(a: [f32; 3], b: [f32; 3], t: f32) -> [f32; 3] {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
    ]
}
