//! Math utilities
//!
//! Re-exports from glam plus the 2-D rigid transform types used by the
//! physics pipeline: rotations stored as a sine/cosine pair, rigid
//! transforms, motion sweeps and axis-aligned boxes.

use serde::{Deserialize, Serialize};

pub use glam::{Mat2, Mat3, Vec2, Vec3};

/// Smallest positive value such that `1.0 + EPSILON != 1.0`.
pub const EPSILON: f32 = f32::EPSILON;

/// 2-D cross product of two vectors (a scalar).
#[inline]
pub fn cross(a: Vec2, b: Vec2) -> f32 {
    a.x * b.y - a.y * b.x
}

/// Cross product of a vector and a scalar: `(s * v.y, -s * v.x)`.
#[inline]
pub fn cross_vs(v: Vec2, s: f32) -> Vec2 {
    Vec2::new(s * v.y, -s * v.x)
}

/// Cross product of a scalar and a vector: `(-s * v.y, s * v.x)`.
#[inline]
pub fn cross_sv(s: f32, v: Vec2) -> Vec2 {
    Vec2::new(-s * v.y, s * v.x)
}

/// Reciprocal that collapses to zero for denominators at or below `EPSILON`.
#[inline]
pub fn inv_or_zero(value: f32) -> f32 {
    if value > EPSILON { 1.0 / value } else { 0.0 }
}

/// Solve `K x = b` for a 2x2 system. A singular matrix yields zero.
pub fn solve22(k: Mat2, b: Vec2) -> Vec2 {
    let (a11, a12, a21, a22) = (k.x_axis.x, k.y_axis.x, k.x_axis.y, k.y_axis.y);
    let mut det = a11 * a22 - a12 * a21;
    if det != 0.0 {
        det = 1.0 / det;
    }
    Vec2::new(det * (a22 * b.x - a12 * b.y), det * (a11 * b.y - a21 * b.x))
}

/// Inverse of a 2x2 matrix, or the zero matrix when singular.
pub fn inverse22(k: Mat2) -> Mat2 {
    let (a, b, c, d) = (k.x_axis.x, k.y_axis.x, k.x_axis.y, k.y_axis.y);
    let mut det = a * d - b * c;
    if det != 0.0 {
        det = 1.0 / det;
    }
    Mat2::from_cols(Vec2::new(det * d, -det * c), Vec2::new(-det * b, det * a))
}

/// Solve `K x = b` for a 3x3 system by Cramer's rule. A singular matrix yields zero.
pub fn solve33(k: Mat3, b: Vec3) -> Vec3 {
    let (ex, ey, ez) = (k.x_axis, k.y_axis, k.z_axis);
    let mut det = ex.dot(ey.cross(ez));
    if det != 0.0 {
        det = 1.0 / det;
    }
    Vec3::new(
        det * b.dot(ey.cross(ez)),
        det * ex.dot(b.cross(ez)),
        det * ex.dot(ey.cross(b)),
    )
}

/// Solve only the upper-left 2x2 block of a 3x3 system.
pub fn solve33_as_22(k: Mat3, b: Vec2) -> Vec2 {
    let m = Mat2::from_cols(k.x_axis.truncate(), k.y_axis.truncate());
    solve22(m, b)
}

/// Symmetric inverse of a 3x3 matrix, or zero when singular.
pub fn sym_inverse33(k: Mat3) -> Mat3 {
    let (ex, ey, ez) = (k.x_axis, k.y_axis, k.z_axis);
    let mut det = ex.dot(ey.cross(ez));
    if det != 0.0 {
        det = 1.0 / det;
    }

    let (a11, a12, a13) = (ex.x, ey.x, ez.x);
    let (a22, a23) = (ey.y, ez.y);
    let a33 = ez.z;

    let m11 = det * (a22 * a33 - a23 * a23);
    let m12 = det * (a13 * a23 - a12 * a33);
    let m13 = det * (a12 * a23 - a13 * a22);
    let m22 = det * (a11 * a33 - a13 * a13);
    let m23 = det * (a13 * a12 - a11 * a23);
    let m33 = det * (a11 * a22 - a12 * a12);

    Mat3::from_cols(
        Vec3::new(m11, m12, m13),
        Vec3::new(m12, m22, m23),
        Vec3::new(m13, m23, m33),
    )
}

/// Rotation stored as sine and cosine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rot {
    /// Sine of the angle
    pub s: f32,
    /// Cosine of the angle
    pub c: f32,
}

impl Rot {
    /// The identity rotation
    pub const IDENTITY: Self = Self { s: 0.0, c: 1.0 };

    /// Create a rotation from an angle in radians
    pub fn from_angle(angle: f32) -> Self {
        let (s, c) = angle.sin_cos();
        Self { s, c }
    }

    /// The angle in radians, in `[-pi, pi]`
    pub fn angle(&self) -> f32 {
        self.s.atan2(self.c)
    }

    /// The rotated x-axis
    pub fn x_axis(&self) -> Vec2 {
        Vec2::new(self.c, self.s)
    }

    /// The rotated y-axis
    pub fn y_axis(&self) -> Vec2 {
        Vec2::new(-self.s, self.c)
    }

    /// Rotate a vector
    #[inline]
    pub fn apply(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x - self.s * v.y, self.s * v.x + self.c * v.y)
    }

    /// Inverse rotate a vector
    #[inline]
    pub fn apply_inv(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x + self.s * v.y, -self.s * v.x + self.c * v.y)
    }

    /// Compose two rotations: `self * other`
    pub fn mul(&self, other: Rot) -> Rot {
        Rot {
            s: self.s * other.c + self.c * other.s,
            c: self.c * other.c - self.s * other.s,
        }
    }

    /// Transpose-compose two rotations: `self^T * other`
    pub fn mul_t(&self, other: Rot) -> Rot {
        Rot {
            s: self.c * other.s - self.s * other.c,
            c: self.c * other.c + self.s * other.s,
        }
    }
}

impl Default for Rot {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Rigid transform: translation plus rotation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Transform {
    /// Translation
    pub p: Vec2,
    /// Rotation
    pub q: Rot,
}

impl Transform {
    /// The identity transform
    pub const IDENTITY: Self = Self {
        p: Vec2::ZERO,
        q: Rot::IDENTITY,
    };

    /// Create a transform from a position and an angle
    pub fn new(position: Vec2, angle: f32) -> Self {
        Self {
            p: position,
            q: Rot::from_angle(angle),
        }
    }

    /// Map a local point to world space
    #[inline]
    pub fn apply(&self, v: Vec2) -> Vec2 {
        self.q.apply(v) + self.p
    }

    /// Map a world point to local space
    #[inline]
    pub fn apply_inv(&self, v: Vec2) -> Vec2 {
        self.q.apply_inv(v - self.p)
    }

    /// Compose: `self * other`
    pub fn mul(&self, other: &Transform) -> Transform {
        Transform {
            q: self.q.mul(other.q),
            p: self.q.apply(other.p) + self.p,
        }
    }

    /// Relative transform: `self^-1 * other`
    pub fn mul_t(&self, other: &Transform) -> Transform {
        Transform {
            q: self.q.mul_t(other.q),
            p: self.q.apply_inv(other.p - self.p),
        }
    }
}

/// Motion of a body's centre of mass over one step.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sweep {
    /// Centre of mass in body-local coordinates
    pub local_center: Vec2,
    /// World centre at the start of the step
    pub c0: Vec2,
    /// Current world centre
    pub c: Vec2,
    /// Angle at the start of the step
    pub a0: f32,
    /// Current angle
    pub a: f32,
}

impl Sweep {
    /// Interpolated transform at `beta` in `[0, 1]` between start and current state
    pub fn transform_at(&self, beta: f32) -> Transform {
        let c = self.c0 * (1.0 - beta) + self.c * beta;
        let q = Rot::from_angle((1.0 - beta) * self.a0 + beta * self.a);
        Transform {
            p: c - q.apply(self.local_center),
            q,
        }
    }

    /// Keep the angles bounded without changing the orientation
    pub fn normalize(&mut self) {
        let two_pi = std::f32::consts::TAU;
        let d = two_pi * (self.a0 / two_pi).floor();
        self.a0 -= d;
        self.a -= d;
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec2,
    /// Maximum corner
    pub max: Vec2,
}

impl Aabb {
    /// Create an AABB from min and max corners
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Create an AABB from center and half-extents
    pub fn from_center_half_extents(center: Vec2, half_extents: Vec2) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Smallest box holding both points
    pub fn from_points(a: Vec2, b: Vec2) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    /// Get the half-extents of the AABB
    pub fn half_extents(&self) -> Vec2 {
        (self.max - self.min) * 0.5
    }

    /// Perimeter, used as the surface-area cost in 2-D
    pub fn perimeter(&self) -> f32 {
        2.0 * ((self.max.x - self.min.x) + (self.max.y - self.min.y))
    }

    /// Min not above max and all coordinates finite
    pub fn is_valid(&self) -> bool {
        let d = self.max - self.min;
        d.x >= 0.0 && d.y >= 0.0 && self.min.is_finite() && self.max.is_finite()
    }

    /// Grow uniformly by `amount` on every side
    pub fn inflate(&self, amount: f32) -> Aabb {
        let r = Vec2::splat(amount);
        Aabb {
            min: self.min - r,
            max: self.max + r,
        }
    }

    /// Union with another AABB
    pub fn combine(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Whether `other` lies completely inside this box
    pub fn contains(&self, other: &Aabb) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && other.max.x <= self.max.x
            && other.max.y <= self.max.y
    }

    /// Check if a point is inside the AABB
    pub fn contains_point(&self, point: Vec2) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }

    /// Check if this AABB overlaps another (touching counts)
    pub fn overlaps(&self, other: &Aabb) -> bool {
        let d1 = other.min - self.max;
        let d2 = self.min - other.max;
        !(d1.x > 0.0 || d1.y > 0.0 || d2.x > 0.0 || d2.y > 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn close(a: Vec2, b: Vec2) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn test_rot_roundtrip_angle() {
        let q = Rot::from_angle(0.75);
        assert!((q.angle() - 0.75).abs() < 1e-6);
        assert!(close(q.apply_inv(q.apply(Vec2::new(3.0, -2.0))), Vec2::new(3.0, -2.0)));
    }

    #[test]
    fn test_rot_quarter_turn() {
        let q = Rot::from_angle(FRAC_PI_2);
        assert!(close(q.apply(Vec2::X), Vec2::Y));
        assert!(close(q.x_axis(), Vec2::Y));
        assert!(close(q.y_axis(), -Vec2::X));
    }

    #[test]
    fn test_transform_relative() {
        let a = Transform::new(Vec2::new(1.0, 2.0), 0.3);
        let b = Transform::new(Vec2::new(-4.0, 0.5), -1.1);
        let rel = a.mul_t(&b);
        let p = Vec2::new(0.25, 0.75);
        // a * (a^-1 * b) == b
        assert!(close(a.apply(rel.apply(p)), b.apply(p)));
        assert!(close(a.mul(&rel).p, b.p));
    }

    #[test]
    fn test_cross_helpers() {
        let v = Vec2::new(2.0, 3.0);
        assert_eq!(cross(Vec2::X, Vec2::Y), 1.0);
        assert_eq!(cross_vs(v, 1.0), Vec2::new(3.0, -2.0));
        assert_eq!(cross_sv(1.0, v), Vec2::new(-3.0, 2.0));
    }

    #[test]
    fn test_solve22_singular_is_zero() {
        let k = Mat2::from_cols(Vec2::new(1.0, 2.0), Vec2::new(2.0, 4.0));
        assert_eq!(solve22(k, Vec2::ONE), Vec2::ZERO);

        let k = Mat2::from_cols(Vec2::new(2.0, 0.0), Vec2::new(0.0, 4.0));
        assert!(close(solve22(k, Vec2::new(2.0, 2.0)), Vec2::new(1.0, 0.5)));
        assert!(close(inverse22(k) * Vec2::new(2.0, 2.0), Vec2::new(1.0, 0.5)));
    }

    #[test]
    fn test_solve33() {
        let k = Mat3::from_cols(
            Vec3::new(4.0, 1.0, 0.0),
            Vec3::new(1.0, 3.0, 0.5),
            Vec3::new(0.0, 0.5, 2.0),
        );
        let x = Vec3::new(1.0, -2.0, 0.5);
        let b = k * x;
        assert!((solve33(k, b) - x).length() < 1e-4);
        assert!((sym_inverse33(k) * b - x).length() < 1e-4);
    }

    #[test]
    fn test_inv_or_zero() {
        assert_eq!(inv_or_zero(0.0), 0.0);
        assert_eq!(inv_or_zero(EPSILON * 0.5), 0.0);
        assert_eq!(inv_or_zero(4.0), 0.25);
    }

    #[test]
    fn test_sweep_transform_at_start() {
        let sweep = Sweep {
            local_center: Vec2::new(0.5, 0.0),
            c0: Vec2::new(1.0, 1.0),
            c: Vec2::new(3.0, 1.0),
            a0: 0.0,
            a: 0.0,
        };
        assert!(close(sweep.transform_at(0.0).p, Vec2::new(0.5, 1.0)));
        assert!(close(sweep.transform_at(1.0).p, Vec2::new(2.5, 1.0)));
    }

    #[test]
    fn test_aabb_queries() {
        let a = Aabb::new(Vec2::ZERO, Vec2::ONE);
        let b = Aabb::new(Vec2::splat(0.5), Vec2::splat(1.5));
        let c = Aabb::new(Vec2::splat(2.0), Vec2::splat(3.0));

        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(a.combine(&c).contains(&b));
        assert!(!a.contains(&b));
        assert_eq!(a.perimeter(), 4.0);
        assert_eq!(a.center(), Vec2::splat(0.5));
        assert!(a.inflate(0.1).contains(&a));
    }
}
