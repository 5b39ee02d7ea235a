use pegbox_core::math::{Aabb, Transform, Vec2};

use super::{EdgeShape, MassData, ShapeGeometry};
use crate::collision::{RayCastInput, RayCastOutput};
use crate::error::{PhysicsError, PhysicsResult};
use crate::settings::{DEFAULT_LINEAR_SLOP, DEFAULT_POLYGON_RADIUS};

/// Polyline of one-sided edges, open or closed.
///
/// Each child edge collides on the right-hand side of its travel
/// direction, so a counter-clockwise loop is solid from the outside and a
/// clockwise loop from the inside. Chains carry no mass and belong on
/// static or kinematic bodies.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainShape {
    vertices: Vec<Vec2>,
    prev_vertex: Vec2,
    next_vertex: Vec2,
    is_loop: bool,
    pub radius: f32,
}

impl ChainShape {
    /// Open chain. Missing ghost vertices are extended straight out of the end segments.
    pub fn new_chain(points: &[Vec2], prev: Option<Vec2>, next: Option<Vec2>) -> PhysicsResult<Self> {
        validate(points, 2, "chain")?;

        let n = points.len();
        let prev_vertex = prev.unwrap_or(2.0 * points[0] - points[1]);
        let next_vertex = next.unwrap_or(2.0 * points[n - 1] - points[n - 2]);
        if !(prev_vertex.is_finite() && next_vertex.is_finite()) {
            return Err(PhysicsError::NonFiniteGeometry);
        }

        Ok(Self {
            vertices: points.to_vec(),
            prev_vertex,
            next_vertex,
            is_loop: false,
            radius: DEFAULT_POLYGON_RADIUS,
        })
    }

    /// Closed loop; the last point connects back to the first.
    pub fn new_loop(points: &[Vec2]) -> PhysicsResult<Self> {
        validate(points, 3, "chain loop")?;
        let n = points.len();
        if points[0].distance_squared(points[n - 1]) <= DEFAULT_LINEAR_SLOP * DEFAULT_LINEAR_SLOP {
            return Err(PhysicsError::VerticesTooClose(n - 1, 0));
        }

        let mut vertices = points.to_vec();
        vertices.push(points[0]);
        let count = vertices.len();
        Ok(Self {
            prev_vertex: vertices[count - 2],
            next_vertex: vertices[1],
            vertices,
            is_loop: true,
            radius: DEFAULT_POLYGON_RADIUS,
        })
    }

    /// Vertices; a loop repeats its first vertex at the end
    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices
    }

    pub fn is_loop(&self) -> bool {
        self.is_loop
    }

    /// The one-sided edge for child `index`, with its ghost neighbours
    pub fn child_edge(&self, index: usize) -> EdgeShape {
        let count = self.vertices.len();
        let vertex0 = if index > 0 {
            self.vertices[index - 1]
        } else {
            self.prev_vertex
        };
        let vertex3 = if index + 2 < count {
            self.vertices[index + 2]
        } else {
            self.next_vertex
        };
        EdgeShape {
            vertex0,
            vertex1: self.vertices[index],
            vertex2: self.vertices[index + 1],
            vertex3,
            one_sided: true,
            radius: self.radius,
        }
    }
}

fn validate(points: &[Vec2], min: usize, shape: &'static str) -> PhysicsResult<()> {
    if points.len() < min {
        return Err(PhysicsError::TooFewVertices {
            shape,
            count: points.len(),
            min,
        });
    }
    if points.iter().any(|p| !p.is_finite()) {
        return Err(PhysicsError::NonFiniteGeometry);
    }
    for i in 1..points.len() {
        if points[i - 1].distance_squared(points[i]) <= DEFAULT_LINEAR_SLOP * DEFAULT_LINEAR_SLOP {
            return Err(PhysicsError::VerticesTooClose(i - 1, i));
        }
    }
    Ok(())
}

impl ShapeGeometry for ChainShape {
    fn child_count(&self) -> usize {
        self.vertices.len() - 1
    }

    fn compute_aabb(&self, xf: &Transform, child: usize) -> Aabb {
        let v1 = xf.apply(self.vertices[child]);
        let v2 = xf.apply(self.vertices[child + 1]);
        Aabb::from_points(v1, v2).inflate(self.radius)
    }

    fn compute_mass(&self, _density: f32) -> MassData {
        MassData::default()
    }

    fn test_point(&self, _xf: &Transform, _point: Vec2) -> bool {
        false
    }

    /// Rays hit chain segments from either side.
    fn raycast(&self, input: &RayCastInput, xf: &Transform, child: usize) -> Option<RayCastOutput> {
        let mut edge = self.child_edge(child);
        edge.one_sided = false;
        edge.raycast(input, xf, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_chain_children() {
        let points = [Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(2.0, 1.0)];
        let chain = ChainShape::new_chain(&points, None, None).unwrap();
        assert_eq!(chain.child_count(), 2);

        let first = chain.child_edge(0);
        assert!(first.one_sided);
        assert_eq!(first.vertex0, Vec2::new(-1.0, 0.0));
        assert_eq!(first.vertex3, Vec2::new(2.0, 1.0));

        let last = chain.child_edge(1);
        assert_eq!(last.vertex0, Vec2::new(0.0, 0.0));
        assert_eq!(last.vertex3, Vec2::new(3.0, 2.0));
    }

    #[test]
    fn test_loop_wraps_ghosts() {
        let points = [Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(1.0, 1.0), Vec2::new(0.0, 1.0)];
        let chain = ChainShape::new_loop(&points).unwrap();
        assert!(chain.is_loop());
        assert_eq!(chain.child_count(), 4);

        let closing = chain.child_edge(3);
        assert_eq!(closing.vertex1, Vec2::new(0.0, 1.0));
        assert_eq!(closing.vertex2, Vec2::new(0.0, 0.0));
        assert_eq!(closing.vertex3, Vec2::new(1.0, 0.0));
        assert_eq!(chain.child_edge(0).vertex0, Vec2::new(0.0, 1.0));
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            ChainShape::new_chain(&[Vec2::ZERO], None, None),
            Err(PhysicsError::TooFewVertices { min: 2, .. })
        ));
        assert_eq!(
            ChainShape::new_chain(&[Vec2::ZERO, Vec2::splat(0.001), Vec2::ONE], None, None),
            Err(PhysicsError::VerticesTooClose(0, 1))
        );
        assert!(ChainShape::new_loop(&[Vec2::ZERO, Vec2::X]).is_err());
    }

    #[test]
    fn test_raycast_either_side() {
        let chain = ChainShape::new_chain(&[Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0)], None, None).unwrap();
        let down = RayCastInput::new(Vec2::new(0.0, 1.0), Vec2::new(0.0, -1.0));
        let up = RayCastInput::new(Vec2::new(0.0, -1.0), Vec2::new(0.0, 1.0));
        assert!(chain.raycast(&down, &Transform::IDENTITY, 0).is_some());
        assert!(chain.raycast(&up, &Transform::IDENTITY, 0).is_some());
        assert_eq!(chain.compute_mass(3.0), MassData::default());
    }
}
