use pegbox_core::math::{Aabb, EPSILON, Rot, Transform, Vec2, cross, cross_vs};
use smallvec::SmallVec;

use super::{MassData, ShapeGeometry};
use crate::collision::{RayCastInput, RayCastOutput};
use crate::error::{PhysicsError, PhysicsResult};
use crate::settings::{DEFAULT_LINEAR_SLOP, DEFAULT_POLYGON_RADIUS, MAX_POLYGON_VERTICES};

pub(crate) type VertexList = SmallVec<[Vec2; MAX_POLYGON_VERTICES]>;

/// Convex polygon with counter-clockwise winding and unit outward normals
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonShape {
    pub(crate) vertices: VertexList,
    pub(crate) normals: VertexList,
    pub(crate) centroid: Vec2,
    pub radius: f32,
}

impl PolygonShape {
    /// Convex hull of up to eight points.
    ///
    /// Points closer than half the linear slop are welded. Fewer than three
    /// distinct points, or a collinear set, is rejected.
    pub fn new(points: &[Vec2]) -> PhysicsResult<Self> {
        if points.len() < 3 {
            return Err(PhysicsError::TooFewVertices {
                shape: "polygon",
                count: points.len(),
                min: 3,
            });
        }
        if points.len() > MAX_POLYGON_VERTICES {
            return Err(PhysicsError::TooManyVertices {
                count: points.len(),
                max: MAX_POLYGON_VERTICES,
            });
        }
        if points.iter().any(|p| !p.is_finite()) {
            return Err(PhysicsError::NonFiniteGeometry);
        }

        let vertices = compute_hull(points).ok_or(PhysicsError::DegenerateHull)?;
        Self::from_hull(vertices)
    }

    /// Axis-aligned box with half-widths `hx` and `hy`, centred on the origin
    pub fn new_box(hx: f32, hy: f32) -> PhysicsResult<Self> {
        Self::new_oriented_box(hx, hy, Vec2::ZERO, 0.0)
    }

    /// Box with half-widths `hx` and `hy`, centred at `center` and rotated by `angle`
    pub fn new_oriented_box(hx: f32, hy: f32, center: Vec2, angle: f32) -> PhysicsResult<Self> {
        if !(hx.is_finite() && hy.is_finite() && center.is_finite() && angle.is_finite()) {
            return Err(PhysicsError::NonFiniteGeometry);
        }
        if hx <= 0.0 || hy <= 0.0 {
            return Err(PhysicsError::DegenerateHull);
        }

        let xf = Transform {
            p: center,
            q: Rot::from_angle(angle),
        };
        let corners = [
            Vec2::new(-hx, -hy),
            Vec2::new(hx, -hy),
            Vec2::new(hx, hy),
            Vec2::new(-hx, hy),
        ];
        let local_normals = [Vec2::new(0.0, -1.0), Vec2::X, Vec2::Y, Vec2::new(-1.0, 0.0)];

        Ok(Self {
            vertices: corners.iter().map(|&v| xf.apply(v)).collect(),
            normals: local_normals.iter().map(|&n| xf.q.apply(n)).collect(),
            centroid: center,
            radius: DEFAULT_POLYGON_RADIUS,
        })
    }

    fn from_hull(vertices: VertexList) -> PhysicsResult<Self> {
        let count = vertices.len();
        let mut normals = VertexList::new();
        for i in 0..count {
            let edge = vertices[(i + 1) % count] - vertices[i];
            if edge.length_squared() <= EPSILON * EPSILON {
                return Err(PhysicsError::DegenerateHull);
            }
            normals.push(cross_vs(edge, 1.0).normalize());
        }

        let centroid = compute_centroid(&vertices).ok_or(PhysicsError::DegenerateHull)?;
        Ok(Self {
            vertices,
            normals,
            centroid,
            radius: DEFAULT_POLYGON_RADIUS,
        })
    }

    /// Hull vertices in counter-clockwise order
    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices
    }

    /// Outward normal of the edge starting at each vertex
    pub fn normals(&self) -> &[Vec2] {
        &self.normals
    }

    pub fn centroid(&self) -> Vec2 {
        self.centroid
    }

    pub fn count(&self) -> usize {
        self.vertices.len()
    }
}

/// Gift-wrapping hull over welded points, or `None` when degenerate.
fn compute_hull(points: &[Vec2]) -> Option<VertexList> {
    let weld = 0.5 * DEFAULT_LINEAR_SLOP;
    let mut ps = VertexList::new();
    for &p in points {
        if ps.iter().all(|q| p.distance_squared(*q) >= weld * weld) {
            ps.push(p);
        }
    }

    let n = ps.len();
    if n < 3 {
        return None;
    }

    // Start from the right-most point, lowest on ties.
    let mut i0 = 0;
    let mut x0 = ps[0].x;
    for (i, p) in ps.iter().enumerate().skip(1) {
        if p.x > x0 || (p.x == x0 && p.y < ps[i0].y) {
            i0 = i;
            x0 = p.x;
        }
    }

    let mut hull: SmallVec<[usize; MAX_POLYGON_VERTICES]> = SmallVec::new();
    let mut ih = i0;
    loop {
        if hull.len() >= n {
            return None;
        }
        hull.push(ih);

        let current = ps[ih];
        let mut ie = 0;
        for j in 1..n {
            if ie == ih {
                ie = j;
                continue;
            }
            let r = ps[ie] - current;
            let v = ps[j] - current;
            let c = cross(r, v);
            if c < 0.0 {
                ie = j;
            }
            // Collinear: keep the farthest point.
            if c == 0.0 && v.length_squared() > r.length_squared() {
                ie = j;
            }
        }

        ih = ie;
        if ie == i0 {
            break;
        }
    }

    if hull.len() < 3 {
        return None;
    }

    let vertices: VertexList = hull.iter().map(|&i| ps[i]).collect();

    // Reject slivers whose area vanishes.
    let area: f32 = (1..vertices.len() - 1)
        .map(|i| cross(vertices[i] - vertices[0], vertices[i + 1] - vertices[0]))
        .sum();
    if area <= EPSILON {
        return None;
    }
    Some(vertices)
}

fn compute_centroid(vertices: &[Vec2]) -> Option<Vec2> {
    let count = vertices.len();
    let s = vertices[0];
    let inv3 = 1.0 / 3.0;
    let mut c = Vec2::ZERO;
    let mut area = 0.0;

    for i in 0..count {
        let p1 = Vec2::ZERO;
        let p2 = vertices[i] - s;
        let p3 = vertices[(i + 1) % count] - s;
        let a = 0.5 * cross(p2 - p1, p3 - p1);
        area += a;
        c += a * inv3 * (p1 + p2 + p3);
    }

    if area <= EPSILON {
        return None;
    }
    Some(c / area + s)
}

impl ShapeGeometry for PolygonShape {
    fn child_count(&self) -> usize {
        1
    }

    fn compute_aabb(&self, xf: &Transform, _child: usize) -> Aabb {
        let first = xf.apply(self.vertices[0]);
        let (min, max) = self.vertices[1..]
            .iter()
            .map(|&v| xf.apply(v))
            .fold((first, first), |(min, max), v| (min.min(v), max.max(v)));
        Aabb::new(min, max).inflate(self.radius)
    }

    fn compute_mass(&self, density: f32) -> MassData {
        // Triangle fan from the first vertex keeps the round-off small.
        let count = self.vertices.len();
        let s = self.vertices[0];
        let inv3 = 1.0 / 3.0;

        let mut center = Vec2::ZERO;
        let mut area = 0.0;
        let mut inertia = 0.0;

        for i in 0..count {
            let e1 = self.vertices[i] - s;
            let e2 = self.vertices[(i + 1) % count] - s;

            let d = cross(e1, e2);
            let triangle_area = 0.5 * d;
            area += triangle_area;
            center += triangle_area * inv3 * (e1 + e2);

            let intx2 = e1.x * e1.x + e2.x * e1.x + e2.x * e2.x;
            let inty2 = e1.y * e1.y + e2.y * e1.y + e2.y * e2.y;
            inertia += (0.25 * inv3 * d) * (intx2 + inty2);
        }

        if area <= EPSILON {
            return MassData {
                mass: 0.0,
                center: self.centroid,
                inertia: 0.0,
            };
        }

        let mass = density * area;
        center /= area;
        let world_center = center + s;

        // Inertia about `s`, shifted to the centre of mass and then to the body origin.
        let inertia = density * inertia + mass * (world_center.dot(world_center) - center.dot(center));

        MassData {
            mass,
            center: world_center,
            inertia,
        }
    }

    fn test_point(&self, xf: &Transform, point: Vec2) -> bool {
        let local = xf.q.apply_inv(point - xf.p);
        self.vertices
            .iter()
            .zip(&self.normals)
            .all(|(&v, &n)| n.dot(local - v) <= 0.0)
    }

    fn raycast(&self, input: &RayCastInput, xf: &Transform, _child: usize) -> Option<RayCastOutput> {
        // Put the ray into the polygon's frame of reference.
        let p1 = xf.q.apply_inv(input.p1 - xf.p);
        let p2 = xf.q.apply_inv(input.p2 - xf.p);
        let d = p2 - p1;

        let mut lower = 0.0;
        let mut upper = input.max_fraction;
        let mut index = None;

        for (i, (&v, &n)) in self.vertices.iter().zip(&self.normals).enumerate() {
            // dot(normal, p1 + a * d - v) = 0
            let numerator = n.dot(v - p1);
            let denominator = n.dot(d);

            if denominator == 0.0 {
                if numerator < 0.0 {
                    return None;
                }
            } else if denominator < 0.0 && numerator < lower * denominator {
                // Entering this half-space.
                lower = numerator / denominator;
                index = Some(i);
            } else if denominator > 0.0 && numerator < upper * denominator {
                // Leaving this half-space.
                upper = numerator / denominator;
            }

            if upper < lower {
                return None;
            }
        }

        index.map(|i| RayCastOutput {
            fraction: lower,
            normal: xf.q.apply(self.normals[i]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_mass() {
        let square = PolygonShape::new_box(1.0, 1.0).unwrap();
        let mass = square.compute_mass(1.0);
        assert!((mass.mass - 4.0).abs() < 1e-5);
        assert!(mass.center.length() < 1e-6);
        // m (w^2 + h^2) / 12
        assert!((mass.inertia - 4.0 * 8.0 / 12.0).abs() < 1e-4);
    }

    #[test]
    fn test_offset_box_inertia_about_origin() {
        let shifted = PolygonShape::new_oriented_box(1.0, 1.0, Vec2::new(3.0, 0.0), 0.0).unwrap();
        let mass = shifted.compute_mass(1.0);
        assert!((mass.center - Vec2::new(3.0, 0.0)).length() < 1e-5);
        assert!((mass.inertia - (4.0 * 8.0 / 12.0 + 4.0 * 9.0)).abs() < 1e-3);
    }

    #[test]
    fn test_hull_orders_ccw_and_drops_interior() {
        let points = [
            Vec2::new(1.0, 1.0),
            Vec2::new(-1.0, -1.0),
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, -1.0),
            Vec2::new(-1.0, 1.0),
        ];
        let polygon = PolygonShape::new(&points).unwrap();
        assert_eq!(polygon.count(), 4);
        for i in 0..4 {
            let a = polygon.vertices()[i];
            let b = polygon.vertices()[(i + 1) % 4];
            let c = polygon.vertices()[(i + 2) % 4];
            assert!(cross(b - a, c - b) > 0.0);
            assert!((polygon.normals()[i].length() - 1.0).abs() < 1e-6);
        }
        assert!(polygon.centroid().length() < 1e-6);
    }

    #[test]
    fn test_degenerate_polygons_rejected() {
        let collinear = [Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(2.0, 0.0)];
        assert_eq!(PolygonShape::new(&collinear), Err(PhysicsError::DegenerateHull));

        let welded = [Vec2::ZERO, Vec2::splat(0.0001), Vec2::new(1.0, 0.0)];
        assert_eq!(PolygonShape::new(&welded), Err(PhysicsError::DegenerateHull));

        assert!(matches!(
            PolygonShape::new(&[Vec2::ZERO, Vec2::X]),
            Err(PhysicsError::TooFewVertices { count: 2, .. })
        ));
        assert!(matches!(
            PolygonShape::new(&[Vec2::ZERO; 9]),
            Err(PhysicsError::TooManyVertices { count: 9, .. })
        ));
        assert!(PolygonShape::new_box(0.0, 1.0).is_err());
    }

    #[test]
    fn test_point_inside() {
        let polygon = PolygonShape::new_box(1.0, 0.5).unwrap();
        let xf = Transform::new(Vec2::new(2.0, 0.0), std::f32::consts::FRAC_PI_2);
        assert!(polygon.test_point(&xf, Vec2::new(2.0, 0.9)));
        assert!(!polygon.test_point(&xf, Vec2::new(2.9, 0.0)));
    }

    #[test]
    fn test_raycast_hits_nearest_face() {
        let polygon = PolygonShape::new_box(1.0, 1.0).unwrap();
        let input = RayCastInput::new(Vec2::new(-3.0, 0.0), Vec2::new(3.0, 0.0));
        let hit = polygon.raycast(&input, &Transform::IDENTITY, 0).unwrap();
        assert!((hit.fraction - 2.0 / 6.0).abs() < 1e-6);
        assert!((hit.normal - Vec2::new(-1.0, 0.0)).length() < 1e-6);

        let miss = RayCastInput::new(Vec2::new(-3.0, 2.0), Vec2::new(3.0, 2.0));
        assert!(polygon.raycast(&miss, &Transform::IDENTITY, 0).is_none());

        // Starting inside reports nothing.
        let inside = RayCastInput::new(Vec2::ZERO, Vec2::new(3.0, 0.0));
        assert!(polygon.raycast(&inside, &Transform::IDENTITY, 0).is_none());
    }
}
