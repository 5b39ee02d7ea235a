//! Collision detection
//!
//! Broad phase (dynamic AABB tree with a pair cache) and narrow phase
//! (per shape-pair manifold routines).

pub mod broad_phase;
mod collide_circle;
mod collide_edge;
mod collide_polygon;
pub mod dynamic_tree;
mod manifold;

pub use broad_phase::BroadPhase;
pub use collide_circle::{collide_circles, collide_polygon_and_circle};
pub use collide_edge::{collide_edge_and_circle, collide_edge_and_polygon};
pub use collide_polygon::collide_polygons;
pub use dynamic_tree::{DynamicTree, ProxyId};
pub use manifold::{ContactId, FeatureType, Manifold, ManifoldPoint, ManifoldType, WorldManifold};

use pegbox_core::math::Vec2;

/// Segment `p1 -> p2`, considered up to `p1 + max_fraction * (p2 - p1)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayCastInput {
    pub p1: Vec2,
    pub p2: Vec2,
    pub max_fraction: f32,
}

impl RayCastInput {
    pub fn new(p1: Vec2, p2: Vec2) -> Self {
        Self {
            p1,
            p2,
            max_fraction: 1.0,
        }
    }
}

/// Ray hit: `p1 + fraction * (p2 - p1)`, with the surface normal there
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayCastOutput {
    pub normal: Vec2,
    pub fraction: f32,
}
