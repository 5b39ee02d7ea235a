//! Contacts between fixture children

use bitflags::bitflags;
use pegbox_core::math::Transform;

use super::fixture::{Fixture, ProxyKey};
use super::{BodyHandle, FixtureHandle};
use crate::collision::{
    Manifold, collide_circles, collide_edge_and_circle, collide_edge_and_polygon, collide_polygon_and_circle,
    collide_polygons,
};
use crate::settings::{mix_friction, mix_restitution};
use crate::shapes::{Shape, ShapeType};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct ContactFlags: u8 {
        /// Visited by the island flood fill
        const ISLAND = 1 << 0;
        const TOUCHING = 1 << 1;
        /// Cleared by the pre-solve callback for one step
        const ENABLED = 1 << 2;
        /// Filtering changed; re-check before the next update
        const FILTER = 1 << 3;
    }
}

/// Whether a collide routine exists for this pair of shape kinds, and if
/// so whether the fixtures must be swapped to match its argument order.
pub(crate) fn pair_order(a: ShapeType, b: ShapeType) -> Option<bool> {
    use ShapeType::*;
    match (a, b) {
        (Circle, Circle)
        | (Polygon, Circle)
        | (Polygon, Polygon)
        | (Edge, Circle)
        | (Edge, Polygon)
        | (Chain, Circle)
        | (Chain, Polygon) => Some(false),
        (Circle, Polygon) | (Circle, Edge) | (Polygon, Edge) | (Circle, Chain) | (Polygon, Chain) => Some(true),
        _ => None,
    }
}

fn evaluate(shape_a: &Shape, xf_a: &Transform, child_a: usize, shape_b: &Shape, xf_b: &Transform) -> Manifold {
    match (shape_a, shape_b) {
        (Shape::Circle(a), Shape::Circle(b)) => collide_circles(a, xf_a, b, xf_b),
        (Shape::Polygon(a), Shape::Circle(b)) => collide_polygon_and_circle(a, xf_a, b, xf_b),
        (Shape::Polygon(a), Shape::Polygon(b)) => collide_polygons(a, xf_a, b, xf_b),
        (Shape::Edge(a), Shape::Circle(b)) => collide_edge_and_circle(a, xf_a, b, xf_b),
        (Shape::Edge(a), Shape::Polygon(b)) => collide_edge_and_polygon(a, xf_a, b, xf_b),
        (Shape::Chain(a), Shape::Circle(b)) => collide_edge_and_circle(&a.child_edge(child_a), xf_a, b, xf_b),
        (Shape::Chain(a), Shape::Polygon(b)) => collide_edge_and_polygon(&a.child_edge(child_a), xf_a, b, xf_b),
        _ => Manifold::default(),
    }
}

/// Touching state before and after an update
#[derive(Debug, Clone, Copy)]
pub(crate) struct ContactUpdate {
    pub was_touching: bool,
    pub touching: bool,
    pub sensor: bool,
    pub old_manifold: Manifold,
}

/// Potential or actual contact between two fixture children.
///
/// Exists while the fat boxes of the two proxies overlap; `is_touching`
/// tells whether the shapes themselves do.
#[derive(Debug, Clone)]
pub struct Contact {
    pub(crate) flags: ContactFlags,
    pub(crate) fixture_a: FixtureHandle,
    pub(crate) fixture_b: FixtureHandle,
    pub(crate) child_a: usize,
    pub(crate) child_b: usize,
    pub(crate) body_a: BodyHandle,
    pub(crate) body_b: BodyHandle,
    pub(crate) manifold: Manifold,
    pub(crate) friction: f32,
    pub(crate) restitution: f32,
    pub(crate) tangent_speed: f32,
}

impl Contact {
    pub(crate) fn new(key_a: ProxyKey, fixture_a: &Fixture, key_b: ProxyKey, fixture_b: &Fixture) -> Self {
        Self {
            flags: ContactFlags::ENABLED,
            fixture_a: key_a.fixture,
            fixture_b: key_b.fixture,
            child_a: key_a.child,
            child_b: key_b.child,
            body_a: fixture_a.body,
            body_b: fixture_b.body,
            manifold: Manifold::default(),
            friction: mix_friction(fixture_a.friction, fixture_b.friction),
            restitution: mix_restitution(fixture_a.restitution, fixture_b.restitution),
            tangent_speed: 0.0,
        }
    }

    pub fn fixture_a(&self) -> FixtureHandle {
        self.fixture_a
    }

    pub fn fixture_b(&self) -> FixtureHandle {
        self.fixture_b
    }

    pub fn child_index_a(&self) -> usize {
        self.child_a
    }

    pub fn child_index_b(&self) -> usize {
        self.child_b
    }

    pub fn body_a(&self) -> BodyHandle {
        self.body_a
    }

    pub fn body_b(&self) -> BodyHandle {
        self.body_b
    }

    /// Local manifold from the last update
    pub fn manifold(&self) -> &Manifold {
        &self.manifold
    }

    pub fn is_touching(&self) -> bool {
        self.flags.contains(ContactFlags::TOUCHING)
    }

    /// False when the last pre-solve callback disabled the contact
    pub fn is_enabled(&self) -> bool {
        self.flags.contains(ContactFlags::ENABLED)
    }

    /// Mixed friction of the two fixtures
    pub fn friction(&self) -> f32 {
        self.friction
    }

    /// Mixed restitution of the two fixtures
    pub fn restitution(&self) -> f32 {
        self.restitution
    }

    /// Surface speed along the tangent, for conveyor belts
    pub fn tangent_speed(&self) -> f32 {
        self.tangent_speed
    }

    pub(crate) fn key_a(&self) -> ProxyKey {
        ProxyKey {
            fixture: self.fixture_a,
            child: self.child_a,
        }
    }

    pub(crate) fn key_b(&self) -> ProxyKey {
        ProxyKey {
            fixture: self.fixture_b,
            child: self.child_b,
        }
    }

    /// Recompute the manifold and touching state at the given poses.
    ///
    /// Sensors only record whether the shapes overlap and keep no points.
    /// Other contacts carry accumulated impulses over by feature id.
    pub(crate) fn update(
        &mut self,
        fixture_a: &Fixture,
        xf_a: &Transform,
        fixture_b: &Fixture,
        xf_b: &Transform,
    ) -> ContactUpdate {
        let old_manifold = self.manifold;

        // Re-enable every step; pre-solve may switch it off again.
        self.flags |= ContactFlags::ENABLED;

        let was_touching = self.is_touching();
        let sensor = fixture_a.is_sensor || fixture_b.is_sensor;

        let mut manifold = evaluate(&fixture_a.shape, xf_a, self.child_a, &fixture_b.shape, xf_b);
        let touching = manifold.point_count() > 0;

        if sensor {
            manifold.clear();
        } else {
            manifold.carry_impulses_from(&old_manifold);
        }
        self.manifold = manifold;
        self.flags.set(ContactFlags::TOUCHING, touching);

        ContactUpdate {
            was_touching,
            touching,
            sensor,
            old_manifold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::fixture::FixtureDef;
    use crate::settings::DEFAULT_POLYGON_RADIUS;
    use crate::shapes::{CircleShape, EdgeShape};
    use pegbox_core::math::Vec2;
    use pegbox_core::pool::Pool;

    fn fixtures(sensor: bool) -> (ProxyKey, Fixture, ProxyKey, Fixture) {
        let mut pool: Pool<()> = Pool::new();
        let body_a = BodyHandle(pool.insert(()));
        let body_b = BodyHandle(pool.insert(()));
        let key_a = ProxyKey {
            fixture: FixtureHandle(pool.insert(())),
            child: 0,
        };
        let key_b = ProxyKey {
            fixture: FixtureHandle(pool.insert(())),
            child: 0,
        };

        let ground = FixtureDef::new(EdgeShape::new(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0)).unwrap())
            .with_friction(0.4)
            .with_restitution(0.1);
        let ball = FixtureDef::new(CircleShape::new(Vec2::ZERO, 0.5).unwrap())
            .with_friction(0.9)
            .with_restitution(0.6)
            .with_sensor(sensor);
        (
            key_a,
            Fixture::new(body_a, &ground, DEFAULT_POLYGON_RADIUS),
            key_b,
            Fixture::new(body_b, &ball, DEFAULT_POLYGON_RADIUS),
        )
    }

    #[test]
    fn test_pair_order() {
        assert_eq!(pair_order(ShapeType::Circle, ShapeType::Circle), Some(false));
        assert_eq!(pair_order(ShapeType::Circle, ShapeType::Edge), Some(true));
        assert_eq!(pair_order(ShapeType::Chain, ShapeType::Polygon), Some(false));
        assert_eq!(pair_order(ShapeType::Edge, ShapeType::Edge), None);
        assert_eq!(pair_order(ShapeType::Edge, ShapeType::Chain), None);
        assert_eq!(pair_order(ShapeType::Chain, ShapeType::Chain), None);
    }

    #[test]
    fn test_mixing_at_creation() {
        let (key_a, a, key_b, b) = fixtures(false);
        let contact = Contact::new(key_a, &a, key_b, &b);
        assert!((contact.friction() - (0.4f32 * 0.9).sqrt()).abs() < 1e-6);
        assert_eq!(contact.restitution(), 0.6);
        assert!(contact.is_enabled());
        assert!(!contact.is_touching());
    }

    #[test]
    fn test_update_tracks_touching() {
        let (key_a, a, key_b, b) = fixtures(false);
        let mut contact = Contact::new(key_a, &a, key_b, &b);

        let resting = Transform::new(Vec2::new(0.0, 0.49), 0.0);
        let update = contact.update(&a, &Transform::IDENTITY, &b, &resting);
        assert!(!update.was_touching && update.touching);
        assert_eq!(contact.manifold().point_count(), 1);

        let lifted = Transform::new(Vec2::new(0.0, 2.0), 0.0);
        let update = contact.update(&a, &Transform::IDENTITY, &b, &lifted);
        assert!(update.was_touching && !update.touching);
        assert_eq!(update.old_manifold.point_count(), 1);
    }

    #[test]
    fn test_sensor_keeps_no_points() {
        let (key_a, a, key_b, b) = fixtures(true);
        let mut contact = Contact::new(key_a, &a, key_b, &b);
        let update = contact.update(&a, &Transform::IDENTITY, &b, &Transform::new(Vec2::new(0.0, 0.2), 0.0));
        assert!(update.sensor && update.touching);
        assert!(contact.is_touching());
        assert_eq!(contact.manifold().point_count(), 0);
    }
}
