//! Collision shapes
//!
//! A closed set of convex primitives plus chains of edges. Shapes live in
//! body-local coordinates; transforms are supplied by the caller.

mod chain;
mod circle;
mod edge;
mod polygon;

pub use chain::ChainShape;
pub use circle::CircleShape;
pub use edge::EdgeShape;
pub use polygon::PolygonShape;

use pegbox_core::math::{Aabb, Transform, Vec2};
use serde::{Deserialize, Serialize};

use crate::collision::{RayCastInput, RayCastOutput};

/// Shape discriminant, ordered the way collide routines are registered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShapeType {
    Circle,
    Edge,
    Polygon,
    Chain,
}

/// Mass properties of a shape
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MassData {
    /// Mass in kilograms
    pub mass: f32,
    /// Centre of mass relative to the shape origin
    pub center: Vec2,
    /// Rotational inertia about the shape origin
    pub inertia: f32,
}

/// Geometry queries every shape answers
pub trait ShapeGeometry {
    /// Number of independently collidable children
    fn child_count(&self) -> usize;

    /// World-space bound of one child, inflated by the skin radius
    fn compute_aabb(&self, xf: &Transform, child: usize) -> Aabb;

    /// Mass properties for a uniform density
    fn compute_mass(&self, density: f32) -> MassData;

    /// Whether a world point lies inside the shape
    fn test_point(&self, xf: &Transform, point: Vec2) -> bool;

    /// Earliest intersection of a segment with one child
    fn raycast(&self, input: &RayCastInput, xf: &Transform, child: usize) -> Option<RayCastOutput>;
}

/// Any collision shape
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Circle(CircleShape),
    Edge(EdgeShape),
    Polygon(PolygonShape),
    Chain(ChainShape),
}

impl Shape {
    pub fn shape_type(&self) -> ShapeType {
        match self {
            Shape::Circle(_) => ShapeType::Circle,
            Shape::Edge(_) => ShapeType::Edge,
            Shape::Polygon(_) => ShapeType::Polygon,
            Shape::Chain(_) => ShapeType::Chain,
        }
    }

    /// Skin radius
    pub fn radius(&self) -> f32 {
        match self {
            Shape::Circle(circle) => circle.radius,
            Shape::Edge(edge) => edge.radius,
            Shape::Polygon(polygon) => polygon.radius,
            Shape::Chain(chain) => chain.radius,
        }
    }

    /// Replace the skin radius of polygonal shapes. Circles keep their radius.
    pub(crate) fn set_skin_radius(&mut self, radius: f32) {
        match self {
            Shape::Circle(_) => {}
            Shape::Edge(edge) => edge.radius = radius,
            Shape::Polygon(polygon) => polygon.radius = radius,
            Shape::Chain(chain) => chain.radius = radius,
        }
    }

    fn geometry(&self) -> &dyn ShapeGeometry {
        match self {
            Shape::Circle(circle) => circle,
            Shape::Edge(edge) => edge,
            Shape::Polygon(polygon) => polygon,
            Shape::Chain(chain) => chain,
        }
    }
}

impl ShapeGeometry for Shape {
    fn child_count(&self) -> usize {
        self.geometry().child_count()
    }

    fn compute_aabb(&self, xf: &Transform, child: usize) -> Aabb {
        self.geometry().compute_aabb(xf, child)
    }

    fn compute_mass(&self, density: f32) -> MassData {
        self.geometry().compute_mass(density)
    }

    fn test_point(&self, xf: &Transform, point: Vec2) -> bool {
        self.geometry().test_point(xf, point)
    }

    fn raycast(&self, input: &RayCastInput, xf: &Transform, child: usize) -> Option<RayCastOutput> {
        self.geometry().raycast(input, xf, child)
    }
}

impl From<CircleShape> for Shape {
    fn from(shape: CircleShape) -> Self {
        Shape::Circle(shape)
    }
}

impl From<EdgeShape> for Shape {
    fn from(shape: EdgeShape) -> Self {
        Shape::Edge(shape)
    }
}

impl From<PolygonShape> for Shape {
    fn from(shape: PolygonShape) -> Self {
        Shape::Polygon(shape)
    }
}

impl From<ChainShape> for Shape {
    fn from(shape: ChainShape) -> Self {
        Shape::Chain(shape)
    }
}
