//! Contact callbacks and filtering hooks

use pegbox_core::math::Transform;

use super::{Contact, ContactHandle, Fixture};
use crate::collision::{Manifold, WorldManifold};
use crate::settings::MAX_MANIFOLD_POINTS;

/// Read-only view of a contact handed to listeners
#[derive(Debug, Clone, Copy)]
pub struct ContactRef<'a> {
    pub handle: ContactHandle,
    pub contact: &'a Contact,
    pub fixture_a: &'a Fixture,
    pub fixture_b: &'a Fixture,
    pub(crate) xf_a: Transform,
    pub(crate) xf_b: Transform,
}

impl ContactRef<'_> {
    pub fn is_sensor(&self) -> bool {
        self.fixture_a.is_sensor() || self.fixture_b.is_sensor()
    }

    /// Contact points and normal in world space at the current body poses
    pub fn world_manifold(&self) -> WorldManifold {
        WorldManifold::new(
            self.contact.manifold(),
            &self.xf_a,
            self.fixture_a.shape().radius(),
            &self.xf_b,
            self.fixture_b.shape().radius(),
        )
    }
}

/// Listener storage inside the world
pub(crate) type ListenerSlot = Option<Box<dyn ContactListener>>;

/// Impulses applied by the solver to one contact during a step
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ContactImpulse {
    pub normal_impulses: [f32; MAX_MANIFOLD_POINTS],
    pub tangent_impulses: [f32; MAX_MANIFOLD_POINTS],
    pub count: usize,
}

/// Receives contact events during `World::step`.
///
/// Callbacks cannot reach the world; record what you need and act on it
/// after the step returns.
pub trait ContactListener {
    /// Two fixtures started touching (or overlapping, for sensors)
    fn begin_contact(&mut self, _contact: ContactRef<'_>) {}

    /// Two fixtures stopped touching. Also raised when a touching contact is
    /// destroyed along with its fixture or body.
    fn end_contact(&mut self, _contact: ContactRef<'_>) {}

    /// Called before a touching non-sensor contact is solved, with the
    /// manifold of the previous step. Return false to disable the contact
    /// for this step.
    fn pre_solve(&mut self, _contact: ContactRef<'_>, _old_manifold: &Manifold) -> bool {
        true
    }

    /// Impulses applied to a touching contact by the solver
    fn post_solve(&mut self, _contact: ContactRef<'_>, _impulse: &ContactImpulse) {}
}

/// Decides whether two fixtures may create a contact
pub trait ContactFilter {
    fn should_collide(&self, fixture_a: &Fixture, fixture_b: &Fixture) -> bool;
}

/// Category, mask and group filtering
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultContactFilter;

impl ContactFilter for DefaultContactFilter {
    fn should_collide(&self, fixture_a: &Fixture, fixture_b: &Fixture) -> bool {
        fixture_a.filter().should_collide(fixture_b.filter())
    }
}
