//! Fixtures attach shapes to bodies

use pegbox_core::math::{Aabb, Transform, Vec2};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::{BodyHandle, FixtureHandle};
use crate::collision::{ProxyId, RayCastInput, RayCastOutput};
use crate::error::{PhysicsError, PhysicsResult};
use crate::shapes::{MassData, Shape, ShapeGeometry, ShapeType};

/// Collision filtering data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filter {
    /// Category bits of this fixture
    pub category_bits: u16,
    /// Categories this fixture accepts collisions with
    pub mask_bits: u16,
    /// Equal non-zero groups always collide (positive) or never (negative)
    pub group_index: i16,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            category_bits: 0x0001,
            mask_bits: 0xFFFF,
            group_index: 0,
        }
    }
}

impl Filter {
    pub fn should_collide(&self, other: &Filter) -> bool {
        if self.group_index == other.group_index && self.group_index != 0 {
            return self.group_index > 0;
        }
        (self.mask_bits & other.category_bits) != 0 && (other.mask_bits & self.category_bits) != 0
    }
}

/// Construction parameters for a fixture
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureDef {
    pub shape: Shape,
    pub friction: f32,
    pub restitution: f32,
    /// kg/m²
    pub density: f32,
    /// Sensors report overlaps but never produce a collision response
    pub is_sensor: bool,
    pub filter: Filter,
    pub user_data: u64,
}

impl FixtureDef {
    pub fn new(shape: impl Into<Shape>) -> Self {
        Self {
            shape: shape.into(),
            friction: 0.2,
            restitution: 0.0,
            density: 0.0,
            is_sensor: false,
            filter: Filter::default(),
            user_data: 0,
        }
    }

    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }

    pub fn with_sensor(mut self, is_sensor: bool) -> Self {
        self.is_sensor = is_sensor;
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_user_data(mut self, user_data: u64) -> Self {
        self.user_data = user_data;
        self
    }

    pub(crate) fn validate(&self) -> PhysicsResult<()> {
        if !self.density.is_finite() || self.density < 0.0 {
            return Err(PhysicsError::InvalidDensity(self.density));
        }
        if !self.friction.is_finite() || self.friction < 0.0 {
            return Err(PhysicsError::InvalidFriction(self.friction));
        }
        if !self.restitution.is_finite() || self.restitution < 0.0 {
            return Err(PhysicsError::InvalidRestitution(self.restitution));
        }
        Ok(())
    }
}

/// Tree user data: which fixture child a broad-phase proxy belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct ProxyKey {
    pub fixture: FixtureHandle,
    pub child: usize,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct FixtureProxy {
    pub aabb: Aabb,
    pub proxy_id: ProxyId,
    pub child_index: usize,
}

/// A shape bound to a body with material and filtering properties
#[derive(Debug, Clone)]
pub struct Fixture {
    pub(crate) body: BodyHandle,
    pub(crate) shape: Shape,
    pub(crate) density: f32,
    pub(crate) friction: f32,
    pub(crate) restitution: f32,
    pub(crate) is_sensor: bool,
    pub(crate) filter: Filter,
    pub(crate) user_data: u64,
    pub(crate) proxies: SmallVec<[FixtureProxy; 1]>,
}

impl Fixture {
    pub(crate) fn new(body: BodyHandle, def: &FixtureDef, skin_radius: f32) -> Self {
        let mut shape = def.shape.clone();
        shape.set_skin_radius(skin_radius);
        Self {
            body,
            shape,
            density: def.density,
            friction: def.friction,
            restitution: def.restitution,
            is_sensor: def.is_sensor,
            filter: def.filter,
            user_data: def.user_data,
            proxies: SmallVec::new(),
        }
    }

    pub fn body(&self) -> BodyHandle {
        self.body
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn shape_type(&self) -> ShapeType {
        self.shape.shape_type()
    }

    pub fn density(&self) -> f32 {
        self.density
    }

    pub fn friction(&self) -> f32 {
        self.friction
    }

    /// Affects contacts created after the change
    pub fn set_friction(&mut self, friction: f32) {
        self.friction = friction;
    }

    pub fn restitution(&self) -> f32 {
        self.restitution
    }

    /// Affects contacts created after the change
    pub fn set_restitution(&mut self, restitution: f32) {
        self.restitution = restitution;
    }

    pub fn is_sensor(&self) -> bool {
        self.is_sensor
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn user_data(&self) -> u64 {
        self.user_data
    }

    pub fn set_user_data(&mut self, user_data: u64) {
        self.user_data = user_data;
    }

    pub fn mass_data(&self) -> MassData {
        self.shape.compute_mass(self.density)
    }

    /// Swept bound of one child from the last synchronisation
    pub fn aabb(&self, child: usize) -> Option<Aabb> {
        self.proxies.get(child).map(|proxy| proxy.aabb)
    }

    pub fn test_point(&self, xf: &Transform, point: Vec2) -> bool {
        self.shape.test_point(xf, point)
    }

    pub fn raycast(&self, input: &RayCastInput, xf: &Transform, child: usize) -> Option<RayCastOutput> {
        self.shape.raycast(input, xf, child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::CircleShape;

    fn circle_def() -> FixtureDef {
        FixtureDef::new(CircleShape::new(Vec2::ZERO, 0.5).unwrap())
    }

    #[test]
    fn test_fixture_def_defaults() {
        let def = circle_def();
        assert_eq!(def.friction, 0.2);
        assert_eq!(def.restitution, 0.0);
        assert_eq!(def.density, 0.0);
        assert!(!def.is_sensor);
        assert_eq!(def.filter, Filter::default());
    }

    #[test]
    fn test_fixture_def_validation() {
        assert!(circle_def().with_density(1.0).validate().is_ok());
        assert_eq!(
            circle_def().with_density(-1.0).validate(),
            Err(PhysicsError::InvalidDensity(-1.0))
        );
        assert_eq!(
            circle_def().with_friction(-0.1).validate(),
            Err(PhysicsError::InvalidFriction(-0.1))
        );
        assert!(matches!(
            circle_def().with_restitution(f32::NAN).validate(),
            Err(PhysicsError::InvalidRestitution(_))
        ));
    }

    #[test]
    fn test_filter_categories() {
        let player = Filter {
            category_bits: 0x0002,
            mask_bits: 0xFFFF & !0x0004,
            group_index: 0,
        };
        let ghost = Filter {
            category_bits: 0x0004,
            ..Filter::default()
        };
        assert!(!player.should_collide(&ghost));
        assert!(!ghost.should_collide(&player));
        assert!(player.should_collide(&Filter::default()));
    }

    #[test]
    fn test_filter_groups_override_masks() {
        let friends = Filter {
            group_index: 3,
            mask_bits: 0,
            ..Filter::default()
        };
        let rivals = Filter {
            group_index: -3,
            ..Filter::default()
        };
        assert!(friends.should_collide(&friends));
        assert!(!rivals.should_collide(&rivals));
    }
}
