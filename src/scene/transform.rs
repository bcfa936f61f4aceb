use crate::engine::interpolation::Lerp;
use glam::{Mat3, Mat4};
use serde::{Deserialize, Serialize};

pub use glam::{Quat, Vec3};

pub const WORLD_UP: Vec3 = Vec3::Y;
pub const LOCAL_FORWARD: Vec3 = Vec3::Z;
pub const LOCAL_RIGHT: Vec3 = Vec3::X;

const DIRECTION_EPSILON: f32 = 1e-6;

/// Local translation, rotation and scale of a scene node.
///
/// Serialized as `{position: [x, y, z], rotation: [x, y, z, w], scale: [x, y, z]}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = normalize_rotation(rotation);
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Applies `child` in this transform's space.
    pub fn compose(&self, child: &Transform) -> Transform {
        Transform {
            position: self.transform_point(child.position),
            rotation: normalize_rotation(self.rotation * child.rotation),
            scale: self.scale * child.scale,
        }
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.position + self.rotation * (self.scale * point)
    }

    pub fn forward(&self) -> Vec3 {
        (self.rotation * LOCAL_FORWARD).normalize_or_zero()
    }

    pub fn up(&self) -> Vec3 {
        (self.rotation * WORLD_UP).normalize_or_zero()
    }

    pub fn right(&self) -> Vec3 {
        (self.rotation * LOCAL_RIGHT).normalize_or_zero()
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

impl Lerp for Transform {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        Transform {
            position: Lerp::lerp(&self.position, &other.position, t),
            rotation: slerp(self.rotation, other.rotation, t),
            scale: Lerp::lerp(&self.scale, &other.scale, t),
        }
    }
}

/// Unit rotation, or identity for a zero quaternion.
pub fn normalize_rotation(rotation: Quat) -> Quat {
    if rotation.length_squared() > 0.0 {
        rotation.normalize()
    } else {
        Quat::IDENTITY
    }
}

/// Rotation whose local +Z points along `forward` with +Y as close to `up`
/// as possible.
pub fn look_rotation(forward: Vec3, up: Vec3) -> Quat {
    let f = forward.normalize_or_zero();
    let mut r = up.cross(f);
    if r.length() <= DIRECTION_EPSILON {
        r = LOCAL_RIGHT;
    }
    let r = r.normalize();
    let u = f.cross(r);
    normalize_rotation(Quat::from_mat3(&Mat3::from_cols(r, u, f)))
}

/// Shortest-path spherical interpolation; `t` outside `(0, 1)` returns the
/// matching endpoint unchanged.
pub fn slerp(a: Quat, b: Quat, t: f32) -> Quat {
    if t <= 0.0 {
        return a;
    }
    if t >= 1.0 {
        return b;
    }
    normalize_rotation(a.slerp(b, t))
}
