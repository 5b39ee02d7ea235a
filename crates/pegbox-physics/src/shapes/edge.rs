use pegbox_core::math::{Aabb, Transform, Vec2};

use super::{MassData, ShapeGeometry};
use crate::collision::{RayCastInput, RayCastOutput};
use crate::error::{PhysicsError, PhysicsResult};
use crate::settings::DEFAULT_POLYGON_RADIUS;

/// Line segment from `vertex1` to `vertex2`.
///
/// A one-sided edge carries ghost neighbours `vertex0` and `vertex3` and
/// only collides on its right-hand side (for travel from `vertex1` to
/// `vertex2`). Chains hand out one-sided edges so that shapes slide across
/// joints between segments without catching on interior vertices.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeShape {
    pub vertex0: Vec2,
    pub vertex1: Vec2,
    pub vertex2: Vec2,
    pub vertex3: Vec2,
    pub one_sided: bool,
    pub radius: f32,
}

impl EdgeShape {
    /// Two-sided segment
    pub fn new(v1: Vec2, v2: Vec2) -> PhysicsResult<Self> {
        if !(v1.is_finite() && v2.is_finite()) {
            return Err(PhysicsError::NonFiniteGeometry);
        }
        Ok(Self {
            vertex0: v1,
            vertex1: v1,
            vertex2: v2,
            vertex3: v2,
            one_sided: false,
            radius: DEFAULT_POLYGON_RADIUS,
        })
    }

    /// One-sided segment `v1 -> v2` with ghost vertices `v0` and `v3`
    pub fn new_one_sided(v0: Vec2, v1: Vec2, v2: Vec2, v3: Vec2) -> PhysicsResult<Self> {
        if !(v0.is_finite() && v1.is_finite() && v2.is_finite() && v3.is_finite()) {
            return Err(PhysicsError::NonFiniteGeometry);
        }
        Ok(Self {
            vertex0: v0,
            vertex1: v1,
            vertex2: v2,
            vertex3: v3,
            one_sided: true,
            radius: DEFAULT_POLYGON_RADIUS,
        })
    }

    pub fn length(&self) -> f32 {
        (self.vertex2 - self.vertex1).length()
    }
}

impl ShapeGeometry for EdgeShape {
    fn child_count(&self) -> usize {
        1
    }

    fn compute_aabb(&self, xf: &Transform, _child: usize) -> Aabb {
        let v1 = xf.apply(self.vertex1);
        let v2 = xf.apply(self.vertex2);
        Aabb::from_points(v1, v2).inflate(self.radius)
    }

    fn compute_mass(&self, _density: f32) -> MassData {
        MassData {
            mass: 0.0,
            center: 0.5 * (self.vertex1 + self.vertex2),
            inertia: 0.0,
        }
    }

    fn test_point(&self, _xf: &Transform, _point: Vec2) -> bool {
        false
    }

    // p = p1 + t * d
    // v = v1 + s * e
    // p1 + t * d = v1 + s * e
    fn raycast(&self, input: &RayCastInput, xf: &Transform, _child: usize) -> Option<RayCastOutput> {
        // Put the ray into the edge's frame of reference.
        let p1 = xf.q.apply_inv(input.p1 - xf.p);
        let p2 = xf.q.apply_inv(input.p2 - xf.p);
        let d = p2 - p1;

        let v1 = self.vertex1;
        let v2 = self.vertex2;
        let e = v2 - v1;
        let normal = Vec2::new(e.y, -e.x).normalize_or_zero();

        // q = p1 + t * d
        // dot(normal, q - v1) = 0
        let numerator = normal.dot(v1 - p1);
        if self.one_sided && numerator > 0.0 {
            return None;
        }

        let denominator = normal.dot(d);
        if denominator == 0.0 {
            return None;
        }

        let t = numerator / denominator;
        if t < 0.0 || input.max_fraction < t {
            return None;
        }

        let q = p1 + t * d;

        // q = v1 + s * r
        // s = dot(q - v1, r) / dot(r, r)
        let r = v2 - v1;
        let rr = r.dot(r);
        if rr == 0.0 {
            return None;
        }

        let s = (q - v1).dot(r) / rr;
        if !(0.0..=1.0).contains(&s) {
            return None;
        }

        let normal = if numerator > 0.0 { -normal } else { normal };
        Some(RayCastOutput {
            fraction: t,
            normal: xf.q.apply(normal),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_edge() -> EdgeShape {
        EdgeShape::new(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0)).unwrap()
    }

    #[test]
    fn test_raycast_through_midpoint() {
        let edge = unit_edge();
        let input = RayCastInput::new(Vec2::new(0.0, 1.0), Vec2::new(0.0, -1.0));
        let hit = edge.raycast(&input, &Transform::IDENTITY, 0).unwrap();

        assert!((hit.fraction - 0.5).abs() < 1e-6);
        assert!((hit.normal.length() - 1.0).abs() < 1e-6);
        assert!(hit.normal.dot(Vec2::X).abs() < 1e-6);
        // facing the ray origin
        assert!(hit.normal.y > 0.0);
    }

    #[test]
    fn test_raycast_from_below_flips_normal() {
        let edge = unit_edge();
        let input = RayCastInput::new(Vec2::new(0.5, -2.0), Vec2::new(0.5, 2.0));
        let hit = edge.raycast(&input, &Transform::IDENTITY, 0).unwrap();
        assert!((hit.fraction - 0.5).abs() < 1e-6);
        assert!((hit.normal - Vec2::new(0.0, -1.0)).length() < 1e-6);
    }

    #[test]
    fn test_raycast_parallel_misses() {
        let edge = unit_edge();
        let input = RayCastInput::new(Vec2::new(-2.0, 0.5), Vec2::new(2.0, 0.5));
        assert!(edge.raycast(&input, &Transform::IDENTITY, 0).is_none());

        let along = RayCastInput::new(Vec2::new(-2.0, 0.0), Vec2::new(2.0, 0.0));
        assert!(edge.raycast(&along, &Transform::IDENTITY, 0).is_none());
    }

    #[test]
    fn test_raycast_outside_span_misses() {
        let edge = unit_edge();
        // crosses the supporting line beyond vertex2
        let beside = RayCastInput::new(Vec2::new(3.0, 1.0), Vec2::new(3.0, -1.0));
        assert!(edge.raycast(&beside, &Transform::IDENTITY, 0).is_none());

        // stops short of the line
        let short = RayCastInput::new(Vec2::new(0.0, 2.0), Vec2::new(0.0, 1.0));
        assert!(edge.raycast(&short, &Transform::IDENTITY, 0).is_none());

        // max_fraction clips the hit
        let clipped = RayCastInput {
            max_fraction: 0.25,
            ..RayCastInput::new(Vec2::new(0.0, 1.0), Vec2::new(0.0, -1.0))
        };
        assert!(edge.raycast(&clipped, &Transform::IDENTITY, 0).is_none());
    }

    #[test]
    fn test_zero_length_edge_never_hits() {
        let edge = EdgeShape::new(Vec2::ONE, Vec2::ONE).unwrap();
        let input = RayCastInput::new(Vec2::new(1.0, 3.0), Vec2::new(1.0, -3.0));
        assert!(edge.raycast(&input, &Transform::IDENTITY, 0).is_none());
    }

    #[test]
    fn test_one_sided_ignores_back_face() {
        let edge = EdgeShape::new_one_sided(
            Vec2::new(-2.0, 0.0),
            Vec2::new(-1.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(2.0, 0.0),
        )
        .unwrap();
        // solid side is below for left-to-right travel
        let from_below = RayCastInput::new(Vec2::new(0.0, -1.0), Vec2::new(0.0, 1.0));
        assert!(edge.raycast(&from_below, &Transform::IDENTITY, 0).is_some());
        let from_above = RayCastInput::new(Vec2::new(0.0, 1.0), Vec2::new(0.0, -1.0));
        assert!(edge.raycast(&from_above, &Transform::IDENTITY, 0).is_none());
    }

    #[test]
    fn test_mass_and_point() {
        let edge = EdgeShape::new(Vec2::new(0.0, 0.0), Vec2::new(4.0, 2.0)).unwrap();
        let mass = edge.compute_mass(10.0);
        assert_eq!(mass.mass, 0.0);
        assert_eq!(mass.inertia, 0.0);
        assert_eq!(mass.center, Vec2::new(2.0, 1.0));
        assert!(!edge.test_point(&Transform::IDENTITY, Vec2::new(2.0, 1.0)));
        assert!((edge.length() - 20.0_f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_non_finite() {
        assert_eq!(
            EdgeShape::new(Vec2::new(f32::NAN, 0.0), Vec2::ZERO),
            Err(PhysicsError::NonFiniteGeometry)
        );
    }
}
