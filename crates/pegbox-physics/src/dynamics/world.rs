//! The physics world
//!
//! Owns every body, fixture, joint and contact, and advances them with
//! [`World::step`]. Each step runs collision, island solving and proxy
//! synchronisation in that order.

use std::fmt;

use bitflags::bitflags;
use pegbox_core::math::{Aabb, Transform, Vec2, cross_sv};
use pegbox_core::pool::Pool;
use pegbox_core::time::FixedUpdate;
use serde::{Deserialize, Serialize};

use super::body::{Body, BodyDef, BodyFlags, BodyType, JointEdge};
use super::contact::{Contact, ContactFlags};
use super::contact_manager::{ContactManager, contact_ref};
use super::fixture::{Filter, Fixture, FixtureDef, FixtureProxy, ProxyKey};
use super::island::Island;
use super::joints::{Joint, JointDef};
use super::listener::{ContactFilter, ContactListener, ListenerSlot};
use super::time_step::TimeStep;
use super::{BodyHandle, ContactHandle, FixtureHandle, JointHandle};
use crate::collision::{BroadPhase, RayCastInput, WorldManifold};
use crate::error::{PhysicsError, PhysicsResult};
use crate::settings::Settings;
use crate::shapes::ShapeGeometry;

/// World-wide simulation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub gravity: Vec2,
    /// Velocity solver iterations per step
    pub velocity_iterations: u32,
    /// Position solver iterations per step
    pub position_iterations: u32,
    /// Seed the solver with last step's impulses
    pub warm_starting: bool,
    /// Let resting islands sleep
    pub allow_sleep: bool,
    /// Clear accumulated forces after every step
    pub auto_clear_forces: bool,
    /// Solve two-point manifolds as a 2x2 block
    pub block_solve: bool,
    pub settings: Settings,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: Vec2::new(0.0, -10.0),
            velocity_iterations: 8,
            position_iterations: 3,
            warm_starting: true,
            allow_sleep: true,
            auto_clear_forces: true,
            block_solve: true,
            settings: Settings::default(),
        }
    }
}

impl WorldConfig {
    pub fn with_gravity(mut self, gravity: Vec2) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_iterations(mut self, velocity: u32, position: u32) -> Self {
        self.velocity_iterations = velocity;
        self.position_iterations = position;
        self
    }

    pub fn with_warm_starting(mut self, enabled: bool) -> Self {
        self.warm_starting = enabled;
        self
    }

    pub fn with_allow_sleep(mut self, allow: bool) -> Self {
        self.allow_sleep = allow;
        self
    }

    pub fn with_auto_clear_forces(mut self, enabled: bool) -> Self {
        self.auto_clear_forces = enabled;
        self
    }

    pub fn with_block_solve(mut self, enabled: bool) -> Self {
        self.block_solve = enabled;
        self
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct WorldFlags: u8 {
        /// Fixtures were added since the last pair update
        const NEW_FIXTURE = 1 << 0;
    }
}

/// A fixture hit by a ray
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayCastHit {
    pub fixture: FixtureHandle,
    pub point: Vec2,
    pub normal: Vec2,
    /// Fraction along the ray, 0 at `p1` and 1 at `p2`
    pub fraction: f32,
}

/// Move one fixture's proxies to cover its motion from `xf1` to `xf2`
fn synchronize_fixture(
    fixture: &mut Fixture,
    broad_phase: &mut BroadPhase<ProxyKey>,
    xf1: &Transform,
    xf2: &Transform,
) {
    for proxy in fixture.proxies.iter_mut() {
        let aabb1 = fixture.shape.compute_aabb(xf1, proxy.child_index);
        let aabb2 = fixture.shape.compute_aabb(xf2, proxy.child_index);
        proxy.aabb = aabb1.combine(&aabb2);

        let displacement = aabb2.center() - aabb1.center();
        broad_phase.move_proxy(proxy.proxy_id, &proxy.aabb, displacement);
    }
}

/// Rigid body simulation
pub struct World {
    config: WorldConfig,
    flags: WorldFlags,

    bodies: Pool<Body>,
    fixtures: Pool<Fixture>,
    joints: Pool<Joint>,
    contact_manager: ContactManager,
    listener: ListenerSlot,

    island: Island,
    stack: Vec<BodyHandle>,
    seeds: Vec<BodyHandle>,

    /// Inverse of the previous step's dt, for warm-start scaling
    inv_dt0: f32,
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("config", &self.config)
            .field("bodies", &self.bodies.len())
            .field("fixtures", &self.fixtures.len())
            .field("joints", &self.joints.len())
            .field("contacts", &self.contact_manager.contact_count())
            .field("has_listener", &self.listener.is_some())
            .finish()
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new(WorldConfig::default())
    }
}

impl World {
    pub fn new(config: WorldConfig) -> Self {
        log::debug!(
            "creating world: gravity {:?}, {} velocity / {} position iterations",
            config.gravity,
            config.velocity_iterations,
            config.position_iterations
        );
        Self {
            contact_manager: ContactManager::new(&config.settings),
            config,
            flags: WorldFlags::empty(),
            bodies: Pool::new(),
            fixtures: Pool::new(),
            joints: Pool::new(),
            listener: None,
            island: Island::new(),
            stack: Vec::new(),
            seeds: Vec::new(),
            inv_dt0: 0.0,
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.config.settings
    }

    pub fn gravity(&self) -> Vec2 {
        self.config.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec2) {
        self.config.gravity = gravity;
    }

    /// Disabling sleep wakes every body
    pub fn set_allow_sleep(&mut self, allow: bool) {
        if allow == self.config.allow_sleep {
            return;
        }
        self.config.allow_sleep = allow;
        if !allow {
            for (_, body) in self.bodies.iter_mut() {
                body.set_awake(true);
            }
        }
    }

    pub fn set_auto_clear_forces(&mut self, enabled: bool) {
        self.config.auto_clear_forces = enabled;
    }

    pub fn set_contact_listener(&mut self, listener: Box<dyn ContactListener>) {
        self.listener = Some(listener);
    }

    /// Remove and return the current listener
    pub fn take_contact_listener(&mut self) -> Option<Box<dyn ContactListener>> {
        self.listener.take()
    }

    pub fn set_contact_filter(&mut self, filter: Box<dyn ContactFilter>) {
        self.contact_manager.filter = filter;
    }

    pub fn create_body(&mut self, def: &BodyDef) -> BodyHandle {
        let handle = BodyHandle(self.bodies.insert(Body::new(def)));
        log::debug!("created {:?} body {:?}", def.body_type, handle.0);
        handle
    }

    /// Destroy a body along with its fixtures, joints and contacts. Touching
    /// contacts raise `end_contact`.
    pub fn destroy_body(&mut self, handle: BodyHandle) -> PhysicsResult<()> {
        let body = self.bodies.get(handle.0).ok_or(PhysicsError::StaleBody)?;
        let joints: Vec<JointHandle> = body.joints.iter().map(|edge| edge.joint).collect();
        let contacts: Vec<ContactHandle> = body.contacts.iter().map(|edge| edge.contact).collect();
        let fixtures = body.fixtures.clone();

        for joint in joints {
            self.remove_joint(joint);
        }
        for contact in contacts {
            self.contact_manager
                .destroy(contact, &mut self.bodies, &self.fixtures, &mut self.listener);
        }
        for fixture in fixtures {
            if let Some(fixture) = self.fixtures.remove(fixture.0) {
                for proxy in &fixture.proxies {
                    self.contact_manager.broad_phase.destroy_proxy(proxy.proxy_id);
                }
            }
        }

        self.bodies.remove(handle.0);
        log::debug!("destroyed body {:?}", handle.0);
        Ok(())
    }

    /// Attach a shape to a body. A fixture with density updates the body's
    /// mass. Contacts for it appear at the next step.
    pub fn create_fixture(&mut self, body_handle: BodyHandle, def: &FixtureDef) -> PhysicsResult<FixtureHandle> {
        def.validate()?;
        let body = self.bodies.get(body_handle.0).ok_or(PhysicsError::StaleBody)?;
        let xf = body.xf;

        let fixture = Fixture::new(body_handle, def, self.config.settings.polygon_radius());
        let handle = FixtureHandle(self.fixtures.insert(fixture));

        let fixture = &mut self.fixtures[handle.0];
        for child in 0..fixture.shape.child_count() {
            let aabb = fixture.shape.compute_aabb(&xf, child);
            let proxy_id = self
                .contact_manager
                .broad_phase
                .create_proxy(&aabb, ProxyKey { fixture: handle, child });
            fixture.proxies.push(FixtureProxy {
                aabb,
                proxy_id,
                child_index: child,
            });
        }

        self.bodies[body_handle.0].fixtures.push(handle);
        if def.density > 0.0 {
            self.reset_mass_data(body_handle);
        }
        self.flags |= WorldFlags::NEW_FIXTURE;

        log::debug!(
            "created {:?} fixture {:?} on body {:?}",
            def.shape.shape_type(),
            handle.0,
            body_handle.0
        );
        Ok(handle)
    }

    pub fn destroy_fixture(&mut self, handle: FixtureHandle) -> PhysicsResult<()> {
        let fixture = self.fixtures.get(handle.0).ok_or(PhysicsError::StaleFixture)?;
        let body_handle = fixture.body;

        let contacts: Vec<ContactHandle> = self.bodies[body_handle.0]
            .contacts
            .iter()
            .map(|edge| edge.contact)
            .filter(|&contact| {
                self.contact_manager
                    .contacts
                    .get(contact.0)
                    .is_some_and(|c| c.fixture_a == handle || c.fixture_b == handle)
            })
            .collect();
        for contact in contacts {
            self.contact_manager
                .destroy(contact, &mut self.bodies, &self.fixtures, &mut self.listener);
        }

        if let Some(fixture) = self.fixtures.remove(handle.0) {
            for proxy in &fixture.proxies {
                self.contact_manager.broad_phase.destroy_proxy(proxy.proxy_id);
            }
        }
        self.bodies[body_handle.0].fixtures.retain(|&f| f != handle);
        self.reset_mass_data(body_handle);

        log::debug!("destroyed fixture {:?}", handle.0);
        Ok(())
    }

    pub fn create_joint(&mut self, def: &JointDef) -> PhysicsResult<JointHandle> {
        def.validate()?;
        let (body_a, body_b) = def.bodies();
        if body_a == body_b {
            return Err(PhysicsError::JointSameBody);
        }
        if !self.bodies.contains(body_a.0) || !self.bodies.contains(body_b.0) {
            return Err(PhysicsError::StaleBody);
        }

        let handle = JointHandle(self.joints.insert(Joint::new(def)));
        self.bodies[body_a.0].joints.push(JointEdge {
            other: body_b,
            joint: handle,
        });
        self.bodies[body_b.0].joints.push(JointEdge {
            other: body_a,
            joint: handle,
        });

        if !def.collide_connected() {
            self.contact_manager.flag_for_filtering(&self.bodies, body_a, body_b);
        }

        log::debug!("created joint {:?} between {:?} and {:?}", handle.0, body_a.0, body_b.0);
        Ok(handle)
    }

    /// Destroy a joint, waking both bodies
    pub fn destroy_joint(&mut self, handle: JointHandle) -> PhysicsResult<()> {
        if !self.remove_joint(handle) {
            return Err(PhysicsError::StaleJoint);
        }
        log::debug!("destroyed joint {:?}", handle.0);
        Ok(())
    }

    fn remove_joint(&mut self, handle: JointHandle) -> bool {
        let Some(joint) = self.joints.remove(handle.0) else {
            return false;
        };

        for body in [joint.body_a, joint.body_b] {
            if let Some(body) = self.bodies.get_mut(body.0) {
                body.joints.retain(|edge| edge.joint != handle);
                body.set_awake(true);
            }
        }

        if !joint.collide_connected {
            self.contact_manager
                .flag_for_filtering(&self.bodies, joint.body_a, joint.body_b);
        }
        true
    }

    /// Advance the simulation by `dt` seconds. Zero, negative or non-finite
    /// steps do nothing.
    pub fn step(&mut self, dt: f32) {
        if !dt.is_finite() || dt < 0.0 {
            log::warn!("ignoring invalid time step {dt}");
            return;
        }
        if dt == 0.0 {
            log::trace!("ignoring zero time step");
            return;
        }

        let _step = tracing::debug_span!("step", dt).entered();

        if self.flags.contains(WorldFlags::NEW_FIXTURE) {
            self.contact_manager
                .find_new_contacts(&mut self.bodies, &self.fixtures, &self.joints);
            self.flags -= WorldFlags::NEW_FIXTURE;
        }

        let inv_dt = 1.0 / dt;
        let step = TimeStep {
            dt,
            inv_dt,
            dt_ratio: self.inv_dt0 * dt,
            velocity_iterations: self.config.velocity_iterations,
            position_iterations: self.config.position_iterations,
            warm_starting: self.config.warm_starting,
            block_solve: self.config.block_solve,
            settings: self.config.settings,
        };

        {
            let _span = tracing::trace_span!("collide").entered();
            self.contact_manager
                .collide(&mut self.bodies, &self.fixtures, &self.joints, &mut self.listener);
        }

        {
            let _span = tracing::trace_span!("solve").entered();
            self.solve(&step);
        }

        {
            let _span = tracing::trace_span!("synchronize").entered();
            self.synchronize_fixtures();
            self.contact_manager
                .find_new_contacts(&mut self.bodies, &self.fixtures, &self.joints);
        }

        if self.config.auto_clear_forces {
            self.clear_forces();
        }

        self.inv_dt0 = inv_dt;
    }

    /// Build islands by flood fill from awake bodies and solve each one
    fn solve(&mut self, step: &TimeStep) {
        for (_, body) in self.bodies.iter_mut() {
            body.flags -= BodyFlags::ISLAND;
        }
        for (_, contact) in self.contact_manager.contacts.iter_mut() {
            contact.flags -= ContactFlags::ISLAND;
        }
        for (_, joint) in self.joints.iter_mut() {
            joint.island_flag = false;
        }

        self.seeds.clear();
        self.seeds
            .extend(self.bodies.iter().map(|(handle, _)| BodyHandle(handle)));

        let mut islands = 0usize;
        let mut sleeping = 0usize;

        for &seed in &self.seeds {
            let body = &self.bodies[seed.0];
            if body.flags.contains(BodyFlags::ISLAND) || !body.is_awake() || body.body_type == BodyType::Static {
                continue;
            }

            self.island.clear();
            self.stack.clear();
            self.stack.push(seed);
            self.bodies[seed.0].flags |= BodyFlags::ISLAND;

            while let Some(handle) = self.stack.pop() {
                let body = &mut self.bodies[handle.0];
                self.island.add_body(handle, body);

                // Keep the sleep timer running.
                if body.body_type != BodyType::Static {
                    body.flags |= BodyFlags::AWAKE;
                } else {
                    // Static bodies do not propagate the island.
                    continue;
                }

                for i in 0..self.bodies[handle.0].contacts.len() {
                    let edge = self.bodies[handle.0].contacts[i];
                    let contact = &self.contact_manager.contacts[edge.contact.0];

                    if contact.flags.contains(ContactFlags::ISLAND)
                        || !contact.flags.contains(ContactFlags::ENABLED | ContactFlags::TOUCHING)
                    {
                        continue;
                    }

                    let sensor = self.fixtures[contact.fixture_a.0].is_sensor
                        || self.fixtures[contact.fixture_b.0].is_sensor;
                    if sensor {
                        continue;
                    }

                    self.island.add_contact(edge.contact);
                    self.contact_manager.contacts[edge.contact.0].flags |= ContactFlags::ISLAND;

                    let other = &mut self.bodies[edge.other.0];
                    if other.flags.contains(BodyFlags::ISLAND) {
                        continue;
                    }
                    other.flags |= BodyFlags::ISLAND;
                    self.stack.push(edge.other);
                }

                for i in 0..self.bodies[handle.0].joints.len() {
                    let edge = self.bodies[handle.0].joints[i];
                    let joint = &mut self.joints[edge.joint.0];
                    if joint.island_flag {
                        continue;
                    }

                    self.island.add_joint(edge.joint);
                    joint.island_flag = true;

                    let other = &mut self.bodies[edge.other.0];
                    if other.flags.contains(BodyFlags::ISLAND) {
                        continue;
                    }
                    other.flags |= BodyFlags::ISLAND;
                    self.stack.push(edge.other);
                }
            }

            let slept = self.island.solve(
                step,
                self.config.gravity,
                self.config.allow_sleep,
                &mut self.bodies,
                &mut self.contact_manager.contacts,
                &self.fixtures,
                &mut self.joints,
                &mut self.listener,
            );
            islands += 1;
            if slept {
                sleeping += 1;
            }

            // Static bodies may join other islands.
            for &handle in &self.island.bodies {
                let body = &mut self.bodies[handle.0];
                if body.body_type == BodyType::Static {
                    body.flags -= BodyFlags::ISLAND;
                }
            }
        }

        log::trace!("solved {islands} islands, {sleeping} fell asleep");
    }

    /// Update broad-phase proxies of every body that moved this step
    fn synchronize_fixtures(&mut self) {
        for (_, body) in self.bodies.iter() {
            if !body.flags.contains(BodyFlags::ISLAND) || body.body_type == BodyType::Static {
                continue;
            }

            let xf1 = body.sweep.transform_at(0.0);
            let xf2 = body.xf;
            for &handle in &body.fixtures {
                synchronize_fixture(
                    &mut self.fixtures[handle.0],
                    &mut self.contact_manager.broad_phase,
                    &xf1,
                    &xf2,
                );
            }
        }
    }

    /// Zero the accumulated force and torque of every body
    pub fn clear_forces(&mut self) {
        for (_, body) in self.bodies.iter_mut() {
            body.force = Vec2::ZERO;
            body.torque = 0.0;
        }
    }

    /// Recompute mass, centre of mass and inertia from the body's fixtures
    pub fn reset_mass_data(&mut self, handle: BodyHandle) {
        let Some(body) = self.bodies.get_mut(handle.0) else {
            return;
        };

        body.mass = 0.0;
        body.inv_mass = 0.0;
        body.inertia = 0.0;
        body.inv_inertia = 0.0;
        body.sweep.local_center = Vec2::ZERO;

        if body.body_type != BodyType::Dynamic {
            body.sweep.c0 = body.xf.p;
            body.sweep.c = body.xf.p;
            body.sweep.a0 = body.sweep.a;
            return;
        }

        let mut local_center = Vec2::ZERO;
        for &fixture in &body.fixtures {
            let fixture = &self.fixtures[fixture.0];
            if fixture.density == 0.0 {
                continue;
            }
            let mass_data = fixture.mass_data();
            body.mass += mass_data.mass;
            local_center += mass_data.mass * mass_data.center;
            body.inertia += mass_data.inertia;
        }

        if body.mass > 0.0 {
            body.inv_mass = 1.0 / body.mass;
            local_center *= body.inv_mass;
        } else {
            // Dynamic bodies always have mass.
            body.mass = 1.0;
            body.inv_mass = 1.0;
        }

        if body.inertia > 0.0 && !body.is_fixed_rotation() {
            // Shift inertia to the centre of mass.
            body.inertia -= body.mass * local_center.dot(local_center);
            body.inv_inertia = 1.0 / body.inertia;
        } else {
            body.inertia = 0.0;
            body.inv_inertia = 0.0;
        }

        let old_center = body.sweep.c;
        body.sweep.local_center = local_center;
        body.sweep.c = body.xf.apply(local_center);
        body.sweep.c0 = body.sweep.c;

        // Keep the velocity of the origin.
        body.linear_velocity += cross_sv(body.angular_velocity, body.sweep.c - old_center);
    }

    /// Teleport a body. Contacts are refreshed against the new pose.
    pub fn set_transform(&mut self, handle: BodyHandle, position: Vec2, angle: f32) -> PhysicsResult<()> {
        let body = self.bodies.get_mut(handle.0).ok_or(PhysicsError::StaleBody)?;
        body.xf = Transform::new(position, angle);
        body.sweep.c = body.xf.apply(body.sweep.local_center);
        body.sweep.a = angle;
        body.sweep.c0 = body.sweep.c;
        body.sweep.a0 = angle;

        let xf = body.xf;
        for &fixture in &body.fixtures {
            synchronize_fixture(
                &mut self.fixtures[fixture.0],
                &mut self.contact_manager.broad_phase,
                &xf,
                &xf,
            );
        }

        self.contact_manager
            .find_new_contacts(&mut self.bodies, &self.fixtures, &self.joints);
        Ok(())
    }

    /// Change a body between static, kinematic and dynamic. Existing
    /// contacts are dropped and rebuilt on the next step.
    pub fn set_body_type(&mut self, handle: BodyHandle, body_type: BodyType) -> PhysicsResult<()> {
        let body = self.bodies.get_mut(handle.0).ok_or(PhysicsError::StaleBody)?;
        if body.body_type == body_type {
            return Ok(());
        }
        body.body_type = body_type;
        self.reset_mass_data(handle);

        let body = &mut self.bodies[handle.0];
        if body_type == BodyType::Static {
            body.linear_velocity = Vec2::ZERO;
            body.angular_velocity = 0.0;
            body.sweep.a0 = body.sweep.a;
            body.sweep.c0 = body.sweep.c;
            body.flags -= BodyFlags::AWAKE;

            let xf = body.xf;
            for &fixture in &body.fixtures {
                synchronize_fixture(
                    &mut self.fixtures[fixture.0],
                    &mut self.contact_manager.broad_phase,
                    &xf,
                    &xf,
                );
            }
        } else {
            body.set_awake(true);
        }

        let body = &mut self.bodies[handle.0];
        body.force = Vec2::ZERO;
        body.torque = 0.0;

        let contacts: Vec<ContactHandle> = body.contacts.iter().map(|edge| edge.contact).collect();
        for contact in contacts {
            self.contact_manager
                .destroy(contact, &mut self.bodies, &self.fixtures, &mut self.listener);
        }

        // Let the broad phase pair the body again.
        for &fixture in &self.bodies[handle.0].fixtures {
            for proxy in &self.fixtures[fixture.0].proxies {
                self.contact_manager.broad_phase.touch_proxy(proxy.proxy_id);
            }
        }
        self.flags |= WorldFlags::NEW_FIXTURE;

        log::debug!("body {:?} is now {:?}", handle.0, body_type);
        Ok(())
    }

    /// Replace a fixture's collision filter. Existing contacts are
    /// re-filtered on the next step.
    pub fn set_filter(&mut self, handle: FixtureHandle, filter: Filter) -> PhysicsResult<()> {
        let fixture = self.fixtures.get_mut(handle.0).ok_or(PhysicsError::StaleFixture)?;
        fixture.filter = filter;
        let body = fixture.body;

        for edge in &self.bodies[body.0].contacts {
            if let Some(contact) = self.contact_manager.contacts.get_mut(edge.contact.0) {
                if contact.fixture_a == handle || contact.fixture_b == handle {
                    contact.flags |= ContactFlags::FILTER;
                }
            }
        }

        for proxy in &self.fixtures[handle.0].proxies {
            self.contact_manager.broad_phase.touch_proxy(proxy.proxy_id);
        }
        self.flags |= WorldFlags::NEW_FIXTURE;
        Ok(())
    }

    /// Move the world origin to `new_origin`. Useful for large worlds.
    pub fn shift_origin(&mut self, new_origin: Vec2) {
        for (_, body) in self.bodies.iter_mut() {
            body.xf.p -= new_origin;
            body.sweep.c0 -= new_origin;
            body.sweep.c -= new_origin;
        }
        for (_, fixture) in self.fixtures.iter_mut() {
            for proxy in fixture.proxies.iter_mut() {
                proxy.aabb = Aabb::new(proxy.aabb.min - new_origin, proxy.aabb.max - new_origin);
            }
        }
        self.contact_manager.broad_phase.shift_origin(new_origin);
    }

    /// Visit every fixture whose fat AABB overlaps `aabb`. Return false from
    /// the callback to stop early.
    pub fn query_aabb<F>(&self, aabb: &Aabb, mut callback: F)
    where
        F: FnMut(FixtureHandle) -> bool,
    {
        let broad_phase = &self.contact_manager.broad_phase;
        broad_phase.query(aabb, |proxy| match broad_phase.user_data(proxy) {
            Some(key) => callback(key.fixture),
            None => true,
        });
    }

    /// Cast a ray from `p1` to `p2`. The callback's return value steers the
    /// cast: a negative value ignores the hit, zero stops, a fraction clips
    /// the ray to that point and one continues unchanged.
    pub fn raycast<F>(&self, p1: Vec2, p2: Vec2, mut callback: F)
    where
        F: FnMut(RayCastHit) -> f32,
    {
        let input = RayCastInput::new(p1, p2);
        let broad_phase = &self.contact_manager.broad_phase;
        broad_phase.raycast(&input, |sub_input, proxy| {
            let Some(key) = broad_phase.user_data(proxy) else {
                return sub_input.max_fraction;
            };
            let Some(fixture) = self.fixtures.get(key.fixture.0) else {
                return sub_input.max_fraction;
            };
            let Some(body) = self.bodies.get(fixture.body.0) else {
                return sub_input.max_fraction;
            };

            match fixture.raycast(sub_input, &body.xf, key.child) {
                Some(output) => callback(RayCastHit {
                    fixture: key.fixture,
                    point: p1 + output.fraction * (p2 - p1),
                    normal: output.normal,
                    fraction: output.fraction,
                }),
                None => sub_input.max_fraction,
            }
        });
    }

    /// Nearest fixture hit by the segment `p1 -> p2`
    pub fn raycast_closest(&self, p1: Vec2, p2: Vec2) -> Option<RayCastHit> {
        let mut closest = None;
        self.raycast(p1, p2, |hit| {
            closest = Some(hit);
            hit.fraction
        });
        closest
    }

    /// World-space points and normal of a contact
    pub fn world_manifold(&self, handle: ContactHandle) -> Option<WorldManifold> {
        contact_ref(handle, &self.contact_manager.contacts, &self.fixtures, &self.bodies)
            .map(|view| view.world_manifold())
    }

    pub fn body(&self, handle: BodyHandle) -> Option<&Body> {
        self.bodies.get(handle.0)
    }

    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut Body> {
        self.bodies.get_mut(handle.0)
    }

    pub fn fixture(&self, handle: FixtureHandle) -> Option<&Fixture> {
        self.fixtures.get(handle.0)
    }

    pub fn fixture_mut(&mut self, handle: FixtureHandle) -> Option<&mut Fixture> {
        self.fixtures.get_mut(handle.0)
    }

    pub fn joint(&self, handle: JointHandle) -> Option<&Joint> {
        self.joints.get(handle.0)
    }

    pub fn joint_mut(&mut self, handle: JointHandle) -> Option<&mut Joint> {
        self.joints.get_mut(handle.0)
    }

    pub fn contact(&self, handle: ContactHandle) -> Option<&Contact> {
        self.contact_manager.contacts.get(handle.0)
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &Body)> {
        self.bodies.iter().map(|(handle, body)| (BodyHandle(handle), body))
    }

    pub fn joints(&self) -> impl Iterator<Item = (JointHandle, &Joint)> {
        self.joints.iter().map(|(handle, joint)| (JointHandle(handle), joint))
    }

    pub fn contacts(&self) -> impl Iterator<Item = (ContactHandle, &Contact)> {
        self.contact_manager
            .contacts
            .iter()
            .map(|(handle, contact)| (ContactHandle(handle), contact))
    }

    /// Contacts of one body
    pub fn body_contacts(&self, handle: BodyHandle) -> impl Iterator<Item = ContactHandle> + '_ {
        self.bodies
            .get(handle.0)
            .into_iter()
            .flat_map(|body| body.contacts.iter().map(|edge| edge.contact))
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn fixture_count(&self) -> usize {
        self.fixtures.len()
    }

    pub fn contact_count(&self) -> usize {
        self.contact_manager.contact_count()
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn proxy_count(&self) -> usize {
        self.contact_manager.broad_phase.proxy_count()
    }

    pub fn tree_height(&self) -> i32 {
        self.contact_manager.broad_phase.tree_height()
    }

    pub fn tree_balance(&self) -> i32 {
        self.contact_manager.broad_phase.tree_balance()
    }

    pub fn tree_quality(&self) -> f32 {
        self.contact_manager.broad_phase.tree_quality()
    }
}

impl FixedUpdate for World {
    fn fixed_update(&mut self, dt: f32) {
        self.step(dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::{CircleShape, EdgeShape, PolygonShape};

    fn ground(world: &mut World) -> BodyHandle {
        let ground = world.create_body(&BodyDef::default());
        let edge = EdgeShape::new(Vec2::new(-20.0, 0.0), Vec2::new(20.0, 0.0)).unwrap();
        world.create_fixture(ground, &FixtureDef::new(edge)).unwrap();
        ground
    }

    fn ball(world: &mut World, position: Vec2) -> BodyHandle {
        let body = world.create_body(&BodyDef::dynamic().with_position(position));
        let circle = CircleShape::new(Vec2::ZERO, 0.5).unwrap();
        world
            .create_fixture(body, &FixtureDef::new(circle).with_density(1.0))
            .unwrap();
        body
    }

    #[test]
    fn test_config_json_defaults() {
        let config: WorldConfig = serde_json::from_str(r#"{ "velocity_iterations": 12 }"#).unwrap();
        assert_eq!(config.velocity_iterations, 12);
        assert_eq!(config.gravity, Vec2::new(0.0, -10.0));
        assert!(config.allow_sleep);
    }

    #[test]
    fn test_fixture_density_sets_mass() {
        let mut world = World::default();
        let body = world.create_body(&BodyDef::dynamic().with_position(Vec2::new(3.0, 0.0)));
        let square = PolygonShape::new_box(0.5, 0.5).unwrap();
        world
            .create_fixture(body, &FixtureDef::new(square).with_density(2.0))
            .unwrap();

        let body = world.body(body).unwrap();
        assert!((body.mass() - 2.0).abs() < 1e-5);
        assert!(body.inv_mass() > 0.0);
        assert!((body.world_center() - Vec2::new(3.0, 0.0)).length() < 1e-5);
        assert_eq!(world.proxy_count(), 1);
    }

    #[test]
    fn test_zero_density_dynamic_body_keeps_unit_mass() {
        let mut world = World::default();
        let body = world.create_body(&BodyDef::dynamic());
        world
            .create_fixture(body, &FixtureDef::new(CircleShape::new(Vec2::ZERO, 1.0).unwrap()))
            .unwrap();
        assert_eq!(world.body(body).unwrap().mass(), 1.0);
    }

    #[test]
    fn test_invalid_time_steps_are_ignored() {
        let mut world = World::default();
        let body = ball(&mut world, Vec2::new(0.0, 5.0));
        for dt in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            world.step(dt);
        }
        let body = world.body(body).unwrap();
        assert_eq!(body.position(), Vec2::new(0.0, 5.0));
        assert_eq!(body.linear_velocity(), Vec2::ZERO);
    }

    #[test]
    fn test_contact_created_on_first_step() {
        let mut world = World::default();
        ground(&mut world);
        ball(&mut world, Vec2::new(0.0, 0.4));
        assert_eq!(world.contact_count(), 0);

        world.step(1.0 / 60.0);
        assert_eq!(world.contact_count(), 1);
        let (handle, contact) = world.contacts().next().unwrap();
        assert!(contact.is_touching());
        let manifold = world.world_manifold(handle).unwrap();
        assert!((manifold.normal.y.abs() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_stale_handles_are_errors() {
        let mut world = World::default();
        let body = world.create_body(&BodyDef::dynamic());
        world.destroy_body(body).unwrap();

        assert_eq!(world.destroy_body(body), Err(PhysicsError::StaleBody));
        let def = FixtureDef::new(CircleShape::new(Vec2::ZERO, 1.0).unwrap());
        assert_eq!(world.create_fixture(body, &def), Err(PhysicsError::StaleBody));
        assert!(world.body(body).is_none());
    }

    #[test]
    fn test_destroy_body_removes_proxies_and_contacts() {
        let mut world = World::default();
        ground(&mut world);
        let ball = ball(&mut world, Vec2::new(0.0, 0.4));
        world.step(1.0 / 60.0);
        assert_eq!(world.contact_count(), 1);

        world.destroy_body(ball).unwrap();
        assert_eq!(world.contact_count(), 0);
        assert_eq!(world.proxy_count(), 1);
        assert_eq!(world.fixture_count(), 1);
    }

    #[test]
    fn test_set_body_type_to_static_stops_motion() {
        let mut world = World::default();
        let body = ball(&mut world, Vec2::new(0.0, 5.0));
        world.step(1.0 / 60.0);
        world.set_body_type(body, BodyType::Static).unwrap();

        let static_body = world.body(body).unwrap();
        assert_eq!(static_body.mass(), 0.0);
        assert!(!static_body.is_awake());
        let y = static_body.position().y;

        world.step(1.0 / 60.0);
        assert_eq!(world.body(body).unwrap().position().y, y);
    }

    #[test]
    fn test_set_transform_moves_proxies() {
        let mut world = World::default();
        let body = ball(&mut world, Vec2::ZERO);
        world.set_transform(body, Vec2::new(10.0, 10.0), 0.0).unwrap();

        let mut found = Vec::new();
        world.query_aabb(&Aabb::new(Vec2::new(9.0, 9.0), Vec2::new(11.0, 11.0)), |fixture| {
            found.push(fixture);
            true
        });
        assert_eq!(found.len(), 1);
        assert_eq!(world.body(body).unwrap().world_center(), Vec2::new(10.0, 10.0));
    }

    #[test]
    fn test_shift_origin_moves_bodies_and_queries() {
        let mut world = World::default();
        let body = ball(&mut world, Vec2::new(5.0, 5.0));
        world.shift_origin(Vec2::new(5.0, 0.0));

        assert_eq!(world.body(body).unwrap().position(), Vec2::new(0.0, 5.0));
        let hit = world.raycast_closest(Vec2::new(0.0, 10.0), Vec2::new(0.0, 0.0)).unwrap();
        assert!((hit.point.y - 5.5).abs() < 1e-4);
    }

    #[test]
    fn test_fixed_update_steps_world() {
        let mut world = World::default();
        let body = ball(&mut world, Vec2::new(0.0, 5.0));
        FixedUpdate::fixed_update(&mut world, 1.0 / 60.0);
        assert!(world.body(body).unwrap().linear_velocity().y < 0.0);
    }
}
