//! Mathematical structs and functions.

use cgmath::{InnerSpace, Point3, Vector3};

/// A 3D point.
pub type Point3d = Point3<f64>;

/// A 3D vector.
pub type Vector3d = Vector3<f64>;

/// The world up axis.
pub fn up() -> Vector3d {
    Vector3d::unit_y()
}

/// Clamps a value to the `[0, 1]` interval.
pub fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// The position and heading of a vehicle in world space.
/// The world is Y-up; headings are unit vectors, normally in the XZ plane.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pose {
    /// The world space position.
    pub position: Point3d,
    /// A unit vector aligned with the heading.
    pub forward: Vector3d,
}

impl Pose {
    /// Creates a pose at `position` looking along `direction`.
    /// A degenerate direction falls back to the world Z axis.
    pub fn looking_along(position: Point3d, direction: Vector3d) -> Self {
        let forward = if direction.magnitude2() > f64::EPSILON {
            direction.normalize()
        } else {
            Vector3d::unit_z()
        };
        Self { position, forward }
    }

    /// A unit vector pointing to the right of the heading.
    pub fn right(&self) -> Vector3d {
        up().cross(self.forward)
    }

    /// Projects a world space point into the pose's local frame,
    /// ignoring any height difference. `x` is lateral (positive right),
    /// `z` is longitudinal (positive ahead).
    pub fn local_offset(&self, point: Point3d) -> Vector3d {
        let delta = Vector3d::new(
            point.x - self.position.x,
            0.0,
            point.z - self.position.z,
        );
        Vector3d::new(delta.dot(self.right()), 0.0, delta.dot(self.forward))
    }
}

/// Rotates a vector about the world up axis.
/// Positive angles rotate towards the right of the original heading.
pub fn rotate_about_up(v: Vector3d, radians: f64) -> Vector3d {
    let (sin, cos) = radians.sin_cos();
    Vector3d::new(v.x * cos + v.z * sin, v.y, v.z * cos - v.x * sin)
}

/// The unsigned angle in degrees between two directions,
/// measured about the up axis with heights ignored.
pub fn turn_angle(a: Vector3d, b: Vector3d) -> f64 {
    let a = Vector3d::new(a.x, 0.0, a.z);
    let b = Vector3d::new(b.x, 0.0, b.z);
    let cross = a.x * b.z - a.z * b.x;
    let dot = a.dot(b);
    if cross == 0.0 && dot == 0.0 {
        return 0.0;
    }
    cross.atan2(dot).abs().to_degrees()
}

/// Critically damps `current` towards `target` over roughly `smooth_time`
/// seconds, never overshooting. `velocity` carries the rate of change
/// between calls and must be zeroed when the value is reset.
pub fn smooth_damp(
    current: f64,
    target: f64,
    velocity: &mut f64,
    smooth_time: f64,
    dt: f64,
) -> f64 {
    let smooth_time = smooth_time.max(1e-4);
    let omega = 2.0 / smooth_time;
    let x = omega * dt;
    let exp = 1.0 / (1.0 + x + 0.48 * x * x + 0.235 * x * x * x);
    let change = current - target;
    let temp = (*velocity + omega * change) * dt;
    *velocity = (*velocity - omega * temp) * exp;
    let mut output = target + (change + temp) * exp;
    if (target - current > 0.0) == (output > target) {
        output = target;
        *velocity = (output - target) / dt;
    }
    output
}
