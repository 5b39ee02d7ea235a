use std::f32::consts::PI;

use pegbox_core::math::{Aabb, EPSILON, Transform, Vec2};

use super::{MassData, ShapeGeometry};
use crate::collision::{RayCastInput, RayCastOutput};
use crate::error::{PhysicsError, PhysicsResult};

/// Solid disc
#[derive(Debug, Clone, PartialEq)]
pub struct CircleShape {
    /// Centre in body-local coordinates
    pub center: Vec2,
    pub radius: f32,
}

impl CircleShape {
    pub fn new(center: Vec2, radius: f32) -> PhysicsResult<Self> {
        if !center.is_finite() {
            return Err(PhysicsError::NonFiniteGeometry);
        }
        if !radius.is_finite() || radius < 0.0 {
            return Err(PhysicsError::NegativeRadius(radius));
        }
        Ok(Self { center, radius })
    }
}

impl ShapeGeometry for CircleShape {
    fn child_count(&self) -> usize {
        1
    }

    fn compute_aabb(&self, xf: &Transform, _child: usize) -> Aabb {
        let p = xf.apply(self.center);
        Aabb::from_center_half_extents(p, Vec2::splat(self.radius))
    }

    fn compute_mass(&self, density: f32) -> MassData {
        let rr = self.radius * self.radius;
        let mass = density * PI * rr;
        MassData {
            mass,
            center: self.center,
            // inertia about the local origin
            inertia: mass * (0.5 * rr + self.center.dot(self.center)),
        }
    }

    fn test_point(&self, xf: &Transform, point: Vec2) -> bool {
        let center = xf.apply(self.center);
        let d = point - center;
        d.dot(d) <= self.radius * self.radius
    }

    fn raycast(&self, input: &RayCastInput, xf: &Transform, _child: usize) -> Option<RayCastOutput> {
        let position = xf.apply(self.center);
        let s = input.p1 - position;
        let b = s.dot(s) - self.radius * self.radius;

        // Solve the quadratic |s + t r|^2 = radius^2.
        let r = input.p2 - input.p1;
        let c = s.dot(r);
        let rr = r.dot(r);
        let sigma = c * c - rr * b;

        if sigma < 0.0 || rr < EPSILON {
            return None;
        }

        let a = -(c + sigma.sqrt());
        if 0.0 <= a && a <= input.max_fraction * rr {
            let fraction = a / rr;
            Some(RayCastOutput {
                fraction,
                normal: (s + fraction * r).normalize_or_zero(),
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_radius() {
        assert_eq!(
            CircleShape::new(Vec2::ZERO, -1.0),
            Err(PhysicsError::NegativeRadius(-1.0))
        );
        assert!(CircleShape::new(Vec2::ZERO, f32::NAN).is_err());
        assert!(CircleShape::new(Vec2::new(f32::INFINITY, 0.0), 1.0).is_err());
    }

    #[test]
    fn test_mass() {
        let circle = CircleShape::new(Vec2::ZERO, 1.0).unwrap();
        let mass = circle.compute_mass(1.0);
        assert!((mass.mass - PI).abs() < 1e-5);
        assert!((mass.inertia - 0.5 * PI).abs() < 1e-5);

        let offset = CircleShape::new(Vec2::new(2.0, 0.0), 1.0).unwrap();
        let mass = offset.compute_mass(2.0);
        assert_eq!(mass.center, Vec2::new(2.0, 0.0));
        assert!((mass.inertia - 2.0 * PI * 4.5).abs() < 1e-4);
    }

    #[test]
    fn test_point_and_raycast() {
        let circle = CircleShape::new(Vec2::ZERO, 1.0).unwrap();
        let xf = Transform::new(Vec2::new(3.0, 0.0), 0.0);
        assert!(circle.test_point(&xf, Vec2::new(3.5, 0.5)));
        assert!(!circle.test_point(&xf, Vec2::new(4.5, 0.0)));

        let input = RayCastInput::new(Vec2::ZERO, Vec2::new(6.0, 0.0));
        let hit = circle.raycast(&input, &xf, 0).unwrap();
        assert!((hit.fraction - 2.0 / 6.0).abs() < 1e-6);
        assert!((hit.normal - Vec2::new(-1.0, 0.0)).length() < 1e-6);

        let miss = RayCastInput::new(Vec2::new(0.0, 2.0), Vec2::new(6.0, 2.0));
        assert!(circle.raycast(&miss, &xf, 0).is_none());

        let degenerate = RayCastInput::new(Vec2::ZERO, Vec2::ZERO);
        assert!(circle.raycast(&degenerate, &xf, 0).is_none());
    }
}
